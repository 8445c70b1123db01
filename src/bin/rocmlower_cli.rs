use anyhow::{anyhow, Context};
use clap::{Parser, Subcommand};
use rocmlower::dispatch::DispatchPlanner;
use rocmlower::emit::emit_full_warp_shuffle_down;
use rocmlower::hlo::{HloGraph, PrimitiveType};
use rocmlower::ir::{
    primitive_to_ir_type, DeviceBuilder, InstructionBuilder, IrType, LaneId, LaunchDims, SimValue,
    WavefrontSimulator,
};
use rocmlower::logging::{init_with_config, LogLevel, LoggingConfig};
use rocmlower::target::{BackendConfig, GpuArchitecture};
use serde::Serialize;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "rocmlower-cli", version)]
#[command(about = "Inspect AMDGPU lowering decisions and emitted device code", long_about = None)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Classify every instruction of an HLO graph file
    Classify {
        /// Path to the graph JSON
        graph: PathBuf,
        /// Print the plan as JSON
        #[arg(long)]
        json: bool,
    },
    /// Emit a full-wavefront shuffle-down and print the device code
    Shuffle {
        /// Element type of the shuffled value (f32, f64, s64, c64, pred, ...)
        #[arg(long = "type", default_value = "f32")]
        ty: String,
        /// Lane offset to read from
        #[arg(long, default_value_t = 1)]
        offset: u32,
        /// Run the emitted code over one block and print per-lane results
        #[arg(long)]
        simulate: bool,
        /// GPU used for simulation (determines the wavefront size)
        #[arg(long, default_value = "gfx900")]
        arch: String,
        /// Threads in the simulated block
        #[arg(long, default_value_t = 8)]
        threads: u32,
    },
    /// Show the backend configuration and device library paths
    Target {
        /// Override the gfx version (e.g. 906)
        #[arg(long)]
        amdgpu_version: Option<u32>,
    },
}

#[derive(Debug, Serialize)]
struct PlanEntry {
    instr: usize,
    opcode: String,
    strategy: String,
}

#[derive(Debug, Serialize)]
struct PlanReport {
    decisions: Vec<PlanEntry>,
    summary: rocmlower::dispatch::DispatchSummary,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut logging = LoggingConfig::from_env();
    if cli.verbose > 0 {
        logging = logging.with_level(LogLevel::from_verbosity(cli.verbose));
    }
    init_with_config(&logging)?;

    match cli.command {
        Commands::Classify { graph, json } => classify(graph, json),
        Commands::Shuffle {
            ty,
            offset,
            simulate,
            arch,
            threads,
        } => shuffle(&ty, offset, simulate, &arch, threads),
        Commands::Target { amdgpu_version } => target(amdgpu_version),
    }
}

fn classify(path: PathBuf, json: bool) -> anyhow::Result<()> {
    let graph = HloGraph::load(&path)
        .with_context(|| format!("failed to load graph {}", path.display()))?;
    let plan = DispatchPlanner::new().plan(&graph)?;

    if json {
        let report = PlanReport {
            decisions: plan
                .decisions
                .iter()
                .map(|d| PlanEntry {
                    instr: d.instr.0,
                    opcode: d.opcode.clone(),
                    strategy: d.strategy.label(),
                })
                .collect(),
            summary: plan.summary.clone(),
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    for decision in &plan.decisions {
        println!(
            "{:>6}  {:<14} {}",
            decision.instr.to_string(),
            decision.opcode,
            decision.strategy
        );
    }
    println!();
    println!(
        "{} instructions, {} library calls ({:.1}%), {} generic",
        plan.summary.total_instructions,
        plan.summary.library_calls,
        plan.summary.library_call_percent(),
        plan.summary.generic
    );
    Ok(())
}

fn shuffle(ty: &str, offset: u32, simulate: bool, arch: &str, threads: u32) -> anyhow::Result<()> {
    let element = PrimitiveType::from_name(ty).ok_or_else(|| anyhow!("unknown element type {}", ty))?;
    let value_ty = primitive_to_ir_type(element);

    let mut builder = InstructionBuilder::amdgpu("shuffle");
    let value = builder.argument(value_ty.clone());
    let offset_value = builder.const_int(IrType::i32(), u128::from(offset))?;
    let shuffled = emit_full_warp_shuffle_down(&mut builder, &value, &offset_value)?;
    println!("{}", builder.dump());

    if !simulate {
        return Ok(());
    }

    let inputs = (0..threads)
        .map(|thread| SimValue::from_bits(lane_pattern(LaneId::new(0, thread)), &value_ty))
        .collect::<Result<Vec<_>, _>>()?;
    let architecture = GpuArchitecture::from_gfx_ip(arch);
    let simulator = WavefrontSimulator::new(&builder, architecture);
    let result = simulator.run(LaunchDims::new(1, threads), |lane, _| {
        inputs[lane.thread as usize].clone()
    })?;

    println!(
        "; {} ({}), wavefront size {}",
        arch,
        architecture,
        simulator.wave_size()
    );
    for lane in result.lanes() {
        let input = result.value(lane, &value).map(ToString::to_string);
        let output = result.value(lane, &shuffled).map(ToString::to_string);
        println!(
            "lane {:>3}: {} -> {}",
            lane.thread,
            input.unwrap_or_default(),
            output.unwrap_or_default()
        );
    }
    Ok(())
}

/// Distinct, recognizable bits for every lane.
fn lane_pattern(lane: LaneId) -> u128 {
    let seed = u128::from(lane.thread) + 1;
    seed.wrapping_mul(0x0101_0101_0101_0101_0101_0101_0101_0101)
}

fn target(amdgpu_version: Option<u32>) -> anyhow::Result<()> {
    let mut config = BackendConfig::from_env();
    if let Some(version) = amdgpu_version {
        config = config.with_amdgpu_version(version);
    }
    config.validate()?;

    let pipeline = config.pass_pipeline();
    println!("target cpu:       {} ({})", config.target_cpu(), config.architecture());
    println!("wavefront size:   {}", config.architecture().wave_size());
    println!("default triple:   {}", config.target_triple);
    println!("features:         {}", config.target_features());
    println!("opt level:        {} ({:?})", config.opt_level, config.codegen_opt_level());
    println!("inliner:          {:?}", pipeline.inliner);
    println!(
        "vectorize:        loop={} slp={}",
        pipeline.loop_vectorize, pipeline.slp_vectorize
    );
    println!("device libraries: {}", config.rocdl_dir.display());
    let missing = config.missing_rocdl_bitcodes();
    for path in config.rocdl_bitcode_paths() {
        let marker = if missing.contains(&path) { "missing" } else { "ok" };
        println!("  [{:>7}] {}", marker, path.display());
    }
    Ok(())
}
