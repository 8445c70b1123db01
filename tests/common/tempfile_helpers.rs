//! Helper functions for tempfile/tempdir usage in tests

use anyhow::Context;
use rocmlower::hlo::HloGraph;
use std::io::Write;
use std::path::PathBuf;

/// Create a temp directory with a helpful error message.
pub fn create_temp_dir() -> anyhow::Result<tempfile::TempDir> {
    tempfile::tempdir().context("Failed to create temporary directory for test")
}

/// Write raw JSON text to a `.json` temp file.
pub fn write_graph_json(text: &str) -> anyhow::Result<tempfile::NamedTempFile> {
    let mut file = tempfile::NamedTempFile::with_suffix(".json")
        .context("Failed to create temporary graph file")?;
    file.write_all(text.as_bytes())
        .context("Failed to write graph JSON")?;
    file.flush()?;
    Ok(file)
}

/// Save `graph` into `dir` under `name` and return the path.
pub fn save_graph(dir: &tempfile::TempDir, name: &str, graph: &HloGraph) -> anyhow::Result<PathBuf> {
    let path = dir.path().join(name);
    graph
        .save(&path)
        .with_context(|| format!("Failed to save graph to {}", path.display()))?;
    Ok(path)
}
