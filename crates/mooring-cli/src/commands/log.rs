use crate::commands::common::{format_change_lines, print_json, Core};
use crate::error::CliError;

pub async fn run_log(core: &Core, limit: usize, as_json: bool) -> Result<(), CliError> {
    let entries = core.recent_changes(limit).await?;

    if as_json {
        return print_json(&entries);
    }
    if entries.is_empty() {
        println!("No local changes recorded.");
        return Ok(());
    }
    for line in format_change_lines(&entries) {
        println!("{line}");
    }
    Ok(())
}
