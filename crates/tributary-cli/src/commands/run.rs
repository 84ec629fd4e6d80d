use std::path::Path;

use anyhow::{Context, Result};
use serde_json::json;

use tributary_engine::config;

/// Execute the `run` command: load the run file, run the pipeline once and
/// print the invocation status.
pub async fn execute(config_path: &Path, dry_run: bool) -> Result<()> {
    // 1. Parse and validate
    let run_config = config::load_run(config_path)
        .with_context(|| format!("Failed to load run file: {}", config_path.display()))?;

    // 2. Build collaborators
    let handler = config::assemble(&run_config)?;

    tracing::info!(
        dataset = %handler.descriptor().name,
        destination = run_config.destination.kind(),
        dry_run,
        "Run file validated"
    );

    if dry_run {
        let preview = handler
            .pipeline()
            .preview(handler.request(), handler.descriptor())
            .await?;
        println!("{}", serde_json::to_string_pretty(&preview.cleaned.records)?);
        eprintln!(
            "Dry run: {} of {} records kept ({} raw bytes). Nothing was written.",
            preview.cleaned.stats.emitted, preview.cleaned.stats.parsed, preview.raw_bytes
        );
        return Ok(());
    }

    // 3. Invoke
    let status = handler.handle(&json!({})).await;
    println!("{}", serde_json::to_string(&status)?);

    if status.is_success() {
        Ok(())
    } else {
        anyhow::bail!("Run failed with status {}", status.code)
    }
}
