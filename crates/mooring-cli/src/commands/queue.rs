use chrono::{Duration, Utc};

use crate::cli::QueueCommands;
use crate::commands::common::{format_queue_lines, print_json, Core};
use crate::error::CliError;

pub async fn run_queue(core: &Core, command: QueueCommands) -> Result<(), CliError> {
    match command {
        QueueCommands::List { status, json } => {
            let items = core.queue_items(status).await?;
            if json {
                return print_json(&items);
            }
            if items.is_empty() {
                println!("Queue is empty.");
                return Ok(());
            }
            for line in format_queue_lines(&items) {
                println!("{line}");
            }
        }
        QueueCommands::Retry { id } => {
            let item = core.retry(id).await?;
            println!("Queued #{} ({}) for another push", item.id, item.action);
        }
        QueueCommands::Discard { id } => {
            let item = core.discard(id).await?;
            println!("Discarded #{} ({})", item.id, item.action);
        }
        QueueCommands::Prune { older_than_days } => {
            let cutoff = Utc::now() - Duration::days(i64::from(older_than_days));
            let removed = core.prune_synced(cutoff).await?;
            println!("Pruned {removed} synced item(s)");
        }
    }
    Ok(())
}
