use std::env;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use mooring_core::models::ChangeLogEntry;
use mooring_core::{Entity, HttpRemote, QueueItem, RemoteConfig, SyncCore};
use serde_json::{Map, Value};

use crate::config_profiles::{remote_config_from, CliProfilesConfig, ENV_API_TOKEN, ENV_API_URL};
use crate::error::CliError;

pub type Core = SyncCore<Option<HttpRemote>>;

const PREVIEW_KEYS: [&str; 5] = ["title", "name", "body", "content", "message"];

pub fn resolve_db_path(cli_db_path: Option<PathBuf>) -> Result<PathBuf, CliError> {
    match cli_db_path.or_else(|| env::var_os("MOORING_DB_PATH").map(PathBuf::from)) {
        Some(path) => Ok(path),
        None => default_db_path(),
    }
}

pub fn default_db_path() -> Result<PathBuf, CliError> {
    dirs::data_dir()
        .map(|dir| dir.join("mooring").join("mooring.db"))
        .ok_or_else(|| CliError::Config("Failed to resolve CLI data directory".to_string()))
}

/// Resolve the remote for a profile. Environment variables override stored values.
pub fn load_remote_config(profile: Option<&str>) -> Result<Option<RemoteConfig>, CliError> {
    let config = CliProfilesConfig::load().map_err(CliError::Config)?;
    let profile_name = config.resolve_profile_name(profile);
    remote_config_from(
        env::var(ENV_API_URL).ok(),
        env::var(ENV_API_TOKEN).ok(),
        config.profile(&profile_name),
    )
    .map_err(CliError::Config)
}

pub async fn open_core(
    db_path: &Path,
    profile: Option<&str>,
    online: bool,
) -> Result<Core, CliError> {
    let remote = load_remote_config(profile)?
        .map(HttpRemote::new)
        .transpose()?;
    if online && remote.is_none() {
        return Err(CliError::SyncNotConfigured);
    }

    let core = SyncCore::open(db_path, remote).await?;
    if online {
        match core.set_online(true).await {
            Ok(Some(report)) if report.submitted > 0 => {
                tracing::info!(
                    submitted = report.submitted,
                    synced = report.synced,
                    "Drained queue on startup"
                );
            }
            Ok(_) => {}
            Err(error) => tracing::warn!(%error, "Queue drain failed; continuing offline work"),
        }
    }
    Ok(core)
}

pub fn require_remote(core: &Core) -> Result<(), CliError> {
    if core.remote().is_none() {
        Err(CliError::SyncNotConfigured)
    } else {
        Ok(())
    }
}

/// Parse `key=value` arguments. Values that are valid JSON keep their type.
pub fn parse_fields(raw_fields: &[String]) -> Result<Map<String, Value>, CliError> {
    let mut fields = Map::new();
    for raw in raw_fields {
        let Some((key, value)) = raw.split_once('=') else {
            return Err(CliError::InvalidField(raw.clone()));
        };
        let key = key.trim();
        if key.is_empty() {
            return Err(CliError::InvalidField(raw.clone()));
        }
        fields.insert(key.to_string(), parse_field_value(value));
    }
    Ok(fields)
}

pub fn parse_field_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

pub fn normalize_entity_id(id: &str) -> Result<String, CliError> {
    let trimmed = id.trim();
    if trimmed.is_empty() {
        Err(CliError::EmptyEntityId)
    } else {
        Ok(trimmed.to_string())
    }
}

pub fn entity_preview(entity: &Entity, max_chars: usize) -> String {
    let text = PREVIEW_KEYS
        .iter()
        .find_map(|key| entity.field(key).and_then(Value::as_str))
        .map_or_else(
            || Value::Object(entity.fields.clone()).to_string(),
            str::to_string,
        );
    truncate_preview(&text, max_chars)
}

pub fn truncate_preview(text: &str, max_chars: usize) -> String {
    let first_line = text.lines().next().unwrap_or("").trim();
    let collapsed = first_line.split_whitespace().collect::<Vec<_>>().join(" ");

    if collapsed.chars().count() <= max_chars {
        collapsed
    } else {
        let take_len = max_chars.saturating_sub(3);
        let mut truncated = collapsed.chars().take(take_len).collect::<String>();
        truncated.push_str("...");
        truncated
    }
}

pub fn short_id(id: &str) -> String {
    id.chars().take(13).collect()
}

pub fn format_entity_lines(entities: &[Entity]) -> Vec<String> {
    let now_ms = Utc::now().timestamp_millis();
    entities
        .iter()
        .map(|entity| {
            let short_id = short_id(&entity.id);
            let preview = entity_preview(entity, 40);
            let relative_time =
                format_relative_time(entity.updated_at.timestamp_millis(), now_ms);
            format!("{short_id:<13}  {preview:<40}  {relative_time}")
        })
        .collect()
}

pub fn format_queue_lines(items: &[QueueItem]) -> Vec<String> {
    items
        .iter()
        .map(|item| {
            let entity_id = item.entity_id().unwrap_or("-");
            let mut line = format!(
                "#{:<5} {:<9} {:<15} {}  {}",
                item.id,
                item.status.as_str(),
                item.action.to_string(),
                short_id(entity_id),
                format_sync_timestamp(item.created_at)
            );
            if let Some(error) = item.error.as_deref() {
                line.push_str("  ");
                line.push_str(&truncate_preview(error, 60));
            }
            line
        })
        .collect()
}

pub fn format_change_lines(entries: &[ChangeLogEntry]) -> Vec<String> {
    entries
        .iter()
        .map(|entry| {
            format!(
                "{}  {:<6} {:<7} {}",
                format_sync_timestamp(entry.timestamp),
                entry.operation.as_str(),
                entry.entity_type.as_str(),
                entry.entity_id
            )
        })
        .collect()
}

pub fn format_sync_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

pub fn format_relative_time(timestamp_ms: i64, now_ms: i64) -> String {
    let diff = now_ms.saturating_sub(timestamp_ms);
    let minute = 60_000;
    let hour = 60 * minute;
    let day = 24 * hour;
    let week = 7 * day;
    let month = 30 * day;
    let year = 365 * day;

    if diff < minute {
        "just now".to_string()
    } else if diff < hour {
        format!("{}m ago", diff / minute)
    } else if diff < day {
        format!("{}h ago", diff / hour)
    } else if diff < week {
        format!("{}d ago", diff / day)
    } else if diff < month {
        format!("{}w ago", diff / week)
    } else if diff < year {
        format!("{}mo ago", diff / month)
    } else {
        format!("{}y ago", diff / year)
    }
}

pub fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<(), CliError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
