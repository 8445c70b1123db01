//! Device Code Emission Integration Tests
//!
//! Runs emitted instruction streams through the wavefront simulator:
//! - Shuffle-down is bit-exact for every width, type and offset, complex included
//! - The block 0 / thread 0 predicate selects exactly one lane
//! - printf packs its arguments and shares one declaration
//!
//! Run with: cargo test --test emission_tests

mod common;

use common::{lane_bits, masked, sim_value};
use proptest::prelude::*;
use rocmlower::emit::shuffle::{join_segments, split_segments};
use rocmlower::emit::{
    emit_device_function_call, emit_full_warp_shuffle_down, emit_printf, is_block0_thread0,
    segment_count, ShufflePlan,
};
use rocmlower::hlo::PrimitiveType;
use rocmlower::ir::{
    primitive_to_ir_type, DeviceBuilder, DeviceValue, FnAttribute, InstructionBuilder, IrType,
    LaneId, LaunchDims, SimValue, WavefrontSimulator,
};
use rocmlower::target::GpuArchitecture;
use rocmlower::LowerError;

/// Lane whose value `thread` should receive from a shuffle-down by `offset`.
fn expected_source(thread: u32, offset: u32, wave_size: u32, block_threads: u32) -> u32 {
    let wave_start = (thread / wave_size) * wave_size;
    let wave_end = (wave_start + wave_size).min(block_threads);
    let source = u64::from(thread) + u64::from(offset);
    if source < u64::from(wave_end) {
        source as u32
    } else {
        thread
    }
}

/// Emit `arg -> shuffle(offset)` for a value of type `ty`.
fn shuffle_program(ty: IrType, offset: u32) -> (InstructionBuilder, DeviceValue, DeviceValue) {
    let mut b = InstructionBuilder::amdgpu("shuffle");
    let value = b.argument(ty);
    let offset = b.const_int(IrType::i32(), u128::from(offset)).unwrap();
    let out = emit_full_warp_shuffle_down(&mut b, &value, &offset).unwrap();
    (b, value, out)
}

fn check_shuffle(ty: IrType, offset: u32, arch: GpuArchitecture, threads: u32, salt: u128) {
    let (b, value, out) = shuffle_program(ty.clone(), offset);
    let sim = WavefrontSimulator::new(&b, arch);
    let result = sim
        .run(LaunchDims::new(1, threads), |lane, _| {
            sim_value(&ty, lane_bits(lane, salt))
        })
        .unwrap();

    for lane in result.lanes() {
        let source = LaneId::new(lane.block, expected_source(lane.thread, offset, sim.wave_size(), threads));
        let expected = result.value(source, &value).unwrap();
        let got = result.value(lane, &out).unwrap();
        assert_eq!(
            got, expected,
            "{} shuffle by {}: lane {} expected bits of lane {}",
            ty, offset, lane, source
        );
        assert_eq!(*got, sim_value(&ty, lane_bits(source, salt)));
    }
}

// ============================================================================
// Segment arithmetic
// ============================================================================

#[test]
fn test_64_bit_value_uses_two_segments() {
    assert_eq!(segment_count(64), 2);
    let plan = ShufflePlan::for_type(&IrType::int(64)).unwrap();
    assert_eq!(plan.segments, 2);
    assert!(!plan.fast_path);

    let bits = 0xdead_beef_0bad_f00du128;
    let segments = split_segments(bits, 64);
    assert_eq!(segments.len(), 2);
    assert_eq!(join_segments(&segments, 64), bits);
}

// ============================================================================
// Shuffle-down through the simulator
// ============================================================================

#[test]
fn test_identity_read_preserves_i64_bits() {
    let (b, value, out) = shuffle_program(IrType::int(64), 0);
    assert_eq!(b.call_count("__ockl_readuplane_i32"), 2);

    let sim = WavefrontSimulator::new(&b, GpuArchitecture::Gcn5);
    let result = sim
        .run(LaunchDims::new(1, 4), |lane, _| {
            SimValue::int(64, 0xffff_0000_1234_5678u128 + u128::from(lane.thread))
        })
        .unwrap();
    for lane in result.lanes() {
        assert_eq!(
            result.value(lane, &out).and_then(SimValue::bits),
            result.value(lane, &value).and_then(SimValue::bits)
        );
    }
}

#[test]
fn test_identity_read_preserves_f64_bits() {
    let (b, value, out) = shuffle_program(IrType::Double, 0);
    let sim = WavefrontSimulator::new(&b, GpuArchitecture::Gcn5);
    let inputs = [-0.0f64, 1.0 / 3.0, f64::MIN_POSITIVE, f64::NAN];
    let result = sim
        .run(LaunchDims::new(1, inputs.len() as u32), |lane, _| {
            SimValue::from_f64(inputs[lane.thread as usize])
        })
        .unwrap();
    for lane in result.lanes() {
        let input = result.value(lane, &value).unwrap();
        let output = result.value(lane, &out).unwrap();
        assert_eq!(output.bits(), input.bits());
        assert_eq!(
            output.as_f64().map(f64::to_bits),
            Some(inputs[lane.thread as usize].to_bits())
        );
    }
}

#[test]
fn test_f32_shuffle_moves_values_down() {
    let (b, _, out) = shuffle_program(IrType::Float, 1);
    let sim = WavefrontSimulator::new(&b, GpuArchitecture::Rdna3);
    let result = sim
        .run(LaunchDims::new(1, 32), |lane, _| {
            SimValue::from_f32(lane.thread as f32 * 0.5)
        })
        .unwrap();
    assert_eq!(
        result.value(LaneId::new(0, 0), &out).and_then(SimValue::as_f32),
        Some(0.5)
    );
    assert_eq!(
        result.value(LaneId::new(0, 30), &out).and_then(SimValue::as_f32),
        Some(15.5)
    );
    // no lane above the last one: it keeps its own value
    assert_eq!(
        result.value(LaneId::new(0, 31), &out).and_then(SimValue::as_f32),
        Some(15.5)
    );
}

#[test]
fn test_shuffle_stays_within_wavefront() {
    // 48 threads on wave32: lanes 32..48 form a second, partial wavefront
    check_shuffle(IrType::int(64), 4, GpuArchitecture::Rdna2, 48, 7);
    check_shuffle(IrType::Double, 20, GpuArchitecture::Gcn5, 100, 11);
}

#[test]
fn test_vector_value_shuffle() {
    let mut b = InstructionBuilder::amdgpu("shuffle");
    let raw = b.argument(IrType::int(64));
    let vector = b
        .bitcast(&raw, IrType::vector(IrType::Float, 2))
        .unwrap();
    let offset = b.const_int(IrType::i32(), 3).unwrap();
    let moved = emit_full_warp_shuffle_down(&mut b, &vector, &offset).unwrap();
    assert_eq!(moved.ty, IrType::vector(IrType::Float, 2));
    let back = b.bitcast(&moved, IrType::int(64)).unwrap();

    let sim = WavefrontSimulator::new(&b, GpuArchitecture::Gcn5);
    let result = sim
        .run(LaunchDims::new(1, 8), |lane, _| {
            SimValue::int(64, lane_bits(lane, 0))
        })
        .unwrap();
    let got = result.value(LaneId::new(0, 2), &back).and_then(SimValue::bits);
    assert_eq!(got, Some(masked(lane_bits(LaneId::new(0, 5), 0), 64)));
}

#[test]
fn test_complex_shuffle_is_bit_exact() {
    let c64 = primitive_to_ir_type(PrimitiveType::C64);
    let c128 = primitive_to_ir_type(PrimitiveType::C128);
    check_shuffle(c64.clone(), 1, GpuArchitecture::Gcn5, 16, 3);
    check_shuffle(c128.clone(), 5, GpuArchitecture::Rdna2, 40, 5);

    // NaN payloads and signed zeros survive the exchange
    let (b, _, out) = shuffle_program(c64, 1);
    let sim = WavefrontSimulator::new(&b, GpuArchitecture::Gcn5);
    let nan = f32::from_bits(0x7fc0_1234);
    let result = sim
        .run(LaunchDims::new(1, 2), |lane, _| {
            let re = if lane.thread == 1 { nan } else { 1.0 };
            SimValue::Struct(vec![SimValue::from_f32(re), SimValue::from_f32(-0.0)])
        })
        .unwrap();
    assert_eq!(
        result.value(LaneId::new(0, 0), &out),
        Some(&SimValue::Struct(vec![
            SimValue::int(32, 0x7fc0_1234),
            SimValue::int(32, 0x8000_0000),
        ]))
    );
}

#[test]
fn test_value_without_bit_width_rejected() {
    let mut b = InstructionBuilder::amdgpu("shuffle");
    let value = b.alloca(IrType::Struct(vec![IrType::Float, IrType::Float]));
    let offset = b.const_int(IrType::i32(), 1).unwrap();
    let err = emit_full_warp_shuffle_down(&mut b, &value, &offset).unwrap_err();
    assert!(matches!(err, LowerError::TypeMismatch(_)));
}

// ============================================================================
// Single-lane predicate
// ============================================================================

#[test]
fn test_block0_thread0_selects_one_lane() {
    let mut b = InstructionBuilder::amdgpu("lane0");
    let pred = is_block0_thread0(&mut b).unwrap();
    let sim = WavefrontSimulator::new(&b, GpuArchitecture::Gcn5);

    for (blocks, threads) in [(2, 2), (3, 5), (4, 130)] {
        let result = sim.run(LaunchDims::new(blocks, threads), |_, _| SimValue::Void).unwrap();
        assert_eq!(result.lanes().count(), (blocks * threads) as usize);
        assert_eq!(result.lanes_where(&pred), vec![LaneId::new(0, 0)]);
    }
}

// ============================================================================
// printf
// ============================================================================

#[test]
fn test_printf_captures_arguments_per_lane() {
    let mut b = InstructionBuilder::amdgpu("print");
    let x = b.argument(IrType::Float);
    let n = b.argument(IrType::int(64));
    emit_printf(&mut b, "x=%f n=%ld\n", &[x, n]).unwrap();

    let sim = WavefrontSimulator::new(&b, GpuArchitecture::Gcn5);
    let result = sim
        .run(LaunchDims::new(1, 3), |lane, index| match index {
            0 => SimValue::from_f32(lane.thread as f32 + 0.25),
            _ => SimValue::int(64, u128::from(lane.thread) * 1000),
        })
        .unwrap();

    let prints = result.prints();
    assert_eq!(prints.len(), 3);
    assert_eq!(prints[2].lane, LaneId::new(0, 2));
    assert_eq!(prints[2].format, "x=%f n=%ld\n");
    assert_eq!(
        prints[2].args,
        vec![SimValue::from_f32(2.25), SimValue::int(64, 2000)]
    );
}

#[test]
fn test_printf_without_arguments() {
    let mut b = InstructionBuilder::amdgpu("print");
    emit_printf(&mut b, "hello\n", &[]).unwrap();
    let sim = WavefrontSimulator::new(&b, GpuArchitecture::Gcn5);
    let result = sim.run(LaunchDims::new(1, 1), |_, _| SimValue::Void).unwrap();
    assert_eq!(result.prints().len(), 1);
    assert!(result.prints()[0].args.is_empty());
}

// ============================================================================
// Device calls
// ============================================================================

#[test]
fn test_device_call_declaration_is_idempotent() {
    let mut b = InstructionBuilder::amdgpu("calls");
    let x = b.argument(IrType::Float);
    for _ in 0..3 {
        emit_device_function_call(
            &mut b,
            "__ocml_sqrt_f32",
            &[x.clone()],
            &[PrimitiveType::F32],
            PrimitiveType::F32,
            &[FnAttribute::ReadNone, FnAttribute::NoUnwind],
        )
        .unwrap();
    }
    let module = b.into_module();
    assert_eq!(module.functions().len(), 1);
    assert_eq!(module.functions()[0].attributes().len(), 2);
}

#[test]
fn test_device_call_signature_mismatch() {
    let mut b = InstructionBuilder::amdgpu("calls");
    let x = b.argument(IrType::Float);
    emit_device_function_call(
        &mut b,
        "__ocml_floor",
        &[x.clone()],
        &[PrimitiveType::F32],
        PrimitiveType::F32,
        &[],
    )
    .unwrap();
    let err = emit_device_function_call(
        &mut b,
        "__ocml_floor",
        &[x],
        &[PrimitiveType::F32],
        PrimitiveType::F64,
        &[],
    )
    .unwrap_err();
    match err {
        LowerError::SignatureMismatch { name, .. } => assert_eq!(name, "__ocml_floor"),
        other => panic!("expected signature mismatch, got {:?}", other),
    }
}

// ============================================================================
// Properties
// ============================================================================

fn shuffle_type() -> impl Strategy<Value = IrType> {
    prop_oneof![
        (1u32..=128).prop_map(IrType::int),
        Just(IrType::Half),
        Just(IrType::Float),
        Just(IrType::Double),
        Just(primitive_to_ir_type(PrimitiveType::C64)),
        Just(primitive_to_ir_type(PrimitiveType::C128)),
    ]
}

fn architecture() -> impl Strategy<Value = GpuArchitecture> {
    prop_oneof![Just(GpuArchitecture::Gcn5), Just(GpuArchitecture::Rdna2)]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_shuffle_is_bit_exact(
        ty in shuffle_type(),
        offset in 0u32..40,
        threads in 1u32..80,
        arch in architecture(),
        salt in any::<u128>(),
    ) {
        check_shuffle(ty, offset, arch, threads, salt);
    }

    #[test]
    fn prop_segments_round_trip(bits in any::<u128>(), width in 1u32..=128) {
        let segments = split_segments(bits, width);
        prop_assert_eq!(segments.len() as u32, segment_count(width));
        prop_assert_eq!(join_segments(&segments, width), masked(bits, width));
    }
}
