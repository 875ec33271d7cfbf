use mooring_core::sync::Resolution;

use crate::cli::ConflictCommands;
use crate::commands::common::{entity_preview, format_queue_lines, print_json, require_remote, Core};
use crate::error::CliError;

pub async fn run_conflicts(core: &Core, command: ConflictCommands) -> Result<(), CliError> {
    match command {
        ConflictCommands::List { json } => {
            let conflicts = core.conflicts().await?;
            if json {
                return print_json(&conflicts);
            }
            if conflicts.is_empty() {
                println!("No sync conflicts.");
                return Ok(());
            }
            for line in format_queue_lines(&conflicts) {
                println!("{line}");
            }
        }
        ConflictCommands::KeepLocal { id } => {
            let resolution = core.keep_local(id).await?;
            print_resolution("Kept local state", &resolution);
            if let Some(requeued) = resolution.requeued.as_ref() {
                println!("Queued #{} ({})", requeued.id, requeued.action);
            }
        }
        ConflictCommands::AcceptRemote { id } => {
            require_remote(core)?;
            let resolution = core.accept_remote(id).await?;
            print_resolution("Accepted remote state", &resolution);
        }
    }
    Ok(())
}

fn print_resolution(verb: &str, resolution: &Resolution) {
    let target = resolution.resolved.entity_id().unwrap_or("-");
    match resolution.entity.as_ref() {
        Some(entity) => println!(
            "{verb} for {target}: {}",
            entity_preview(entity, 60)
        ),
        None => println!("{verb} for {target}: entity no longer exists"),
    }
}
