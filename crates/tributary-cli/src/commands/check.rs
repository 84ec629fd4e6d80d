use std::path::Path;

use anyhow::{Context, Result};

use tributary_engine::config;

/// Execute the `check` command: validate the run file and describe what a run
/// would do. No network or database access.
pub fn execute(config_path: &Path) -> Result<()> {
    let run_config = config::load_run(config_path)
        .with_context(|| format!("Failed to load run file: {}", config_path.display()))?;
    println!("Run file:          OK");

    let handler = config::assemble(&run_config)?;
    let descriptor = handler.descriptor();

    println!("Dataset:           {}", descriptor.name);
    println!("Source:            {}", run_config.source.url);
    println!("Raw snapshot:      {} -> {}", run_config.archive.raw, descriptor.raw_key);
    println!("Clean snapshot:    {} -> {}", run_config.archive.clean, descriptor.clean_key);
    println!(
        "Destination:       {} table {} ({} columns)",
        run_config.destination.kind(),
        descriptor.table.display_name(),
        descriptor.table.columns.len()
    );
    println!("\nAll checks passed.");
    Ok(())
}
