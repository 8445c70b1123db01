//! Graph File Integration Tests
//!
//! Loads HLO graphs from JSON files the way `rocmlower-cli classify` does
//! and plans them.
//!
//! Run with: cargo test --test cli_graph_tests

mod common;

use common::fixtures::mixed_graph;
use common::tempfile_helpers::{create_temp_dir, save_graph, write_graph_json};
use rocmlower::dispatch::{ConvKind, DispatchPlanner, LoweringStrategy};
use rocmlower::hlo::{HloGraph, InstrId};
use rocmlower::LowerError;

const HAND_WRITTEN_GRAPH: &str = r#"{
  "instructions": [
    { "id": 0, "opcode": "parameter", "number": 0,
      "shape": { "element_type": "f32", "dimensions": [2, 3] } },
    { "id": 1, "opcode": "parameter", "number": 1,
      "shape": { "element_type": "f32", "dimensions": [3, 4] } },
    { "id": 2, "opcode": "dot", "operands": [0, 1],
      "lhs_contracting_dimensions": [1], "rhs_contracting_dimensions": [0],
      "shape": { "element_type": "f32", "dimensions": [2, 4] } },
    { "id": 3, "opcode": "custom-call", "target": "__cudnn$convBackwardFilter", "operands": [2],
      "shape": { "element_type": "f32", "dimensions": [2, 4] } },
    { "id": 4, "opcode": "reduce", "dimensions": [1], "operands": [2],
      "shape": { "element_type": "f32", "dimensions": [2] } },
    { "id": 5, "opcode": "other", "name": "transpose", "operands": [2],
      "shape": { "element_type": "f32", "dimensions": [4, 2], "minor_to_major": [0, 1] } }
  ]
}"#;

#[test]
fn test_plan_hand_written_graph() -> anyhow::Result<()> {
    let file = write_graph_json(HAND_WRITTEN_GRAPH)?;
    let graph = HloGraph::load(file.path())?;
    assert_eq!(graph.len(), 6);

    let plan = DispatchPlanner::new().plan(&graph)?;
    assert_eq!(plan.strategy_of(InstrId(2)), Some(LoweringStrategy::Gemm));
    assert_eq!(
        plan.strategy_of(InstrId(3)),
        Some(LoweringStrategy::Convolution(ConvKind::BackwardFilter))
    );
    assert_eq!(
        plan.strategy_of(InstrId(4)),
        Some(LoweringStrategy::ReductionToVector)
    );
    assert_eq!(plan.strategy_of(InstrId(5)), Some(LoweringStrategy::Generic));
    assert_eq!(plan.strategy_of(InstrId(0)), None);
    Ok(())
}

#[test]
fn test_saved_graph_plans_identically() -> anyhow::Result<()> {
    let dir = create_temp_dir()?;
    let graph = mixed_graph();
    let path = save_graph(&dir, "mixed.json", &graph)?;

    let loaded = HloGraph::load(&path)?;
    let before = DispatchPlanner::new().plan(&graph)?;
    let after = DispatchPlanner::new().plan(&loaded)?;
    assert_eq!(before.decisions, after.decisions);
    assert_eq!(before.summary, after.summary);
    Ok(())
}

#[test]
fn test_summary_serializes() -> anyhow::Result<()> {
    let plan = DispatchPlanner::new().plan(&mixed_graph())?;
    let json: serde_json::Value = serde_json::to_value(&plan.summary)?;
    assert_eq!(json["total_instructions"], 5);
    assert_eq!(json["library_calls"], 3);
    assert_eq!(json["by_strategy"]["convolution(forward)"], 1);
    Ok(())
}

#[test]
fn test_forward_reference_rejected() -> anyhow::Result<()> {
    let json = r#"{ "instructions": [
        { "id": 0, "opcode": "add", "operands": [1, 1],
          "shape": { "element_type": "f32", "dimensions": [2] } },
        { "id": 1, "opcode": "parameter", "number": 0,
          "shape": { "element_type": "f32", "dimensions": [2] } }
    ] }"#;
    let file = write_graph_json(json)?;
    let err = HloGraph::load(file.path()).unwrap_err();
    assert!(matches!(err, LowerError::InvalidGraph(_)), "got {:?}", err);
    Ok(())
}

#[test]
fn test_out_of_range_contracting_dimension_rejected() -> anyhow::Result<()> {
    let json = r#"{ "instructions": [
        { "id": 0, "opcode": "parameter", "number": 0,
          "shape": { "element_type": "f32", "dimensions": [2, 3] } },
        { "id": 1, "opcode": "parameter", "number": 1,
          "shape": { "element_type": "f32", "dimensions": [5, 4] } },
        { "id": 2, "opcode": "dot", "operands": [0, 1],
          "lhs_contracting_dimensions": [7], "rhs_contracting_dimensions": [9],
          "shape": { "element_type": "f32", "dimensions": [2, 4] } }
    ] }"#;
    let file = write_graph_json(json)?;
    let err = HloGraph::load(file.path()).unwrap_err();
    assert!(matches!(err, LowerError::InvalidGraph(_)), "got {:?}", err);
    assert!(err.to_string().contains("dimension 7"));
    Ok(())
}

#[test]
fn test_bad_layout_rejected() -> anyhow::Result<()> {
    let json = r#"{ "instructions": [
        { "id": 0, "opcode": "parameter", "number": 0,
          "shape": { "element_type": "f32", "dimensions": [2, 3], "minor_to_major": [0, 0] } }
    ] }"#;
    let file = write_graph_json(json)?;
    let err = HloGraph::load(file.path()).unwrap_err();
    assert!(matches!(err, LowerError::Json(_)), "got {:?}", err);
    assert!(err.is_user_error());
    Ok(())
}

#[test]
fn test_missing_file() -> anyhow::Result<()> {
    let dir = create_temp_dir()?;
    let err = HloGraph::load(dir.path().join("absent.json")).unwrap_err();
    assert!(matches!(err, LowerError::Io(_)));
    Ok(())
}
