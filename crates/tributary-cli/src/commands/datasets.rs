use anyhow::Result;

use tributary_types::{presets, validate_registry};

/// Execute the `datasets` command: list built-in dataset presets.
pub fn execute() -> Result<()> {
    let descriptors = presets::all();
    validate_registry(&descriptors)?;

    for descriptor in &descriptors {
        let columns: Vec<&str> = descriptor.table.column_names().collect();
        println!("{}", descriptor.name);
        println!("  Raw key:   {}", descriptor.raw_key);
        println!("  Clean key: {}", descriptor.clean_key);
        println!("  Table:     {}", descriptor.table.display_name());
        println!("  Columns:   {}", columns.join(", "));
        println!();
    }
    Ok(())
}
