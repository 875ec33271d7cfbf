use mooring_core::{Entity, EntityKind, HttpRemote, QueueStatus, SyncCore};
use pretty_assertions::assert_eq;
use serde_json::{json, Map, Value};

use crate::cli::{CompletionShell, QueueCommands};
use crate::commands::common::{
    entity_preview, format_relative_time, normalize_entity_id, parse_field_value, parse_fields,
    truncate_preview, Core,
};
use crate::commands::completions::run_completions;
use crate::commands::config::merge_profile;
use crate::commands::entity::{run_add, run_delete, run_update};
use crate::commands::queue::run_queue;
use crate::commands::sync::{run_push, run_sync};
use crate::config_profiles::CliProfile;
use crate::error::CliError;

async fn offline_core() -> Core {
    SyncCore::open_in_memory(None::<HttpRemote>).await.unwrap()
}

fn fields(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap()
}

#[test]
fn parse_fields_keeps_json_types() {
    let parsed = parse_fields(&[
        "title=Buy milk".to_string(),
        "done=false".to_string(),
        "priority=3".to_string(),
        "tags=[\"home\"]".to_string(),
        "note=a=b".to_string(),
    ])
    .unwrap();

    assert_eq!(
        Value::Object(parsed),
        json!({
            "title": "Buy milk",
            "done": false,
            "priority": 3,
            "tags": ["home"],
            "note": "a=b"
        })
    );
}

#[test]
fn parse_fields_rejects_missing_separator_or_key() {
    assert!(matches!(
        parse_fields(&["title".to_string()]),
        Err(CliError::InvalidField(field)) if field == "title"
    ));
    assert!(matches!(
        parse_fields(&["=value".to_string()]),
        Err(CliError::InvalidField(_))
    ));
}

#[test]
fn parse_field_value_falls_back_to_string() {
    assert_eq!(parse_field_value("null"), Value::Null);
    assert_eq!(parse_field_value("{broken"), json!("{broken"));
    assert_eq!(parse_field_value(""), json!(""));
}

#[test]
fn normalize_entity_id_rejects_blank() {
    assert_eq!(normalize_entity_id("  t1 ").unwrap(), "t1");
    assert!(matches!(normalize_entity_id(" "), Err(CliError::EmptyEntityId)));
}

#[test]
fn entity_preview_prefers_text_fields() {
    let titled = Entity::with_id("t1", fields(json!({ "title": "  Ship\nrelease " })));
    assert_eq!(entity_preview(&titled, 40), "Ship");

    let untitled = Entity::with_id("t2", fields(json!({ "severity": 2 })));
    assert_eq!(entity_preview(&untitled, 40), "{\"severity\":2}");
}

#[test]
fn truncate_preview_adds_ellipsis() {
    assert_eq!(truncate_preview("abcdefghij", 6), "abc...");
    assert_eq!(truncate_preview("a  b   c", 10), "a b c");
}

#[test]
fn format_relative_time_buckets() {
    let now = 10 * 365 * 24 * 60 * 60 * 1000_i64;
    assert_eq!(format_relative_time(now - 5_000, now), "just now");
    assert_eq!(format_relative_time(now - 5 * 60_000, now), "5m ago");
    assert_eq!(format_relative_time(now - 3 * 3_600_000, now), "3h ago");
    assert_eq!(format_relative_time(now - 2 * 86_400_000, now), "2d ago");
    assert_eq!(format_relative_time(now - 400 * 86_400_000, now), "1y ago");
}

#[test]
fn merge_profile_prefers_flags_then_env_then_existing() {
    let existing = CliProfile {
        api_base_url: Some("https://stored.example.com".to_string()),
        auth_token: Some("stored-token".to_string()),
        timeout_secs: Some(30),
    };

    let merged = merge_profile(
        &existing,
        None,
        None,
        None,
        Some("https://env.example.com".to_string()),
    );
    assert_eq!(merged.api_base_url.as_deref(), Some("https://env.example.com"));
    assert_eq!(merged.auth_token.as_deref(), Some("stored-token"));
    assert_eq!(merged.timeout_secs, Some(30));

    let merged = merge_profile(
        &existing,
        Some("https://flag.example.com".to_string()),
        Some(" ".to_string()),
        Some(5),
        Some("https://env.example.com".to_string()),
    );
    assert_eq!(merged.api_base_url.as_deref(), Some("https://flag.example.com"));
    assert_eq!(merged.auth_token.as_deref(), Some("stored-token"));
    assert_eq!(merged.timeout_secs, Some(5));
}

#[test]
fn completions_are_written_to_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("mooring.bash");

    run_completions(CompletionShell::Bash, Some(&path)).unwrap();

    let script = std::fs::read_to_string(&path).unwrap();
    assert!(script.contains("mooring"));
}

#[tokio::test(flavor = "multi_thread")]
async fn offline_writes_queue_in_order() {
    let core = offline_core().await;

    let created = run_add(
        &core,
        EntityKind::Task,
        &["title=Draft".to_string()],
        Some(" t1 "),
    )
    .await
    .unwrap();
    assert_eq!(created.id, "t1");

    run_update(&core, EntityKind::Task, "t1", &["title=Final".to_string()])
        .await
        .unwrap();
    run_delete(&core, EntityKind::Task, "t1").await.unwrap();

    let pending = core.queue_items(Some(QueueStatus::Pending)).await.unwrap();
    let actions = pending
        .iter()
        .map(|item| item.action.to_string())
        .collect::<Vec<_>>();
    assert_eq!(actions, ["CREATE_TASK", "UPDATE_TASK", "DELETE_TASK"]);
    assert_eq!(core.get(EntityKind::Task, "t1").await.unwrap(), None);
}

#[tokio::test(flavor = "multi_thread")]
async fn update_requires_changes() {
    let core = offline_core().await;
    let result = run_update(&core, EntityKind::Project, "p1", &[]).await;
    assert!(matches!(result, Err(CliError::EmptyChanges)));
}

#[tokio::test(flavor = "multi_thread")]
async fn update_of_missing_entity_is_core_not_found() {
    let core = offline_core().await;
    let result = run_update(&core, EntityKind::Alert, "missing", &["level=2".to_string()]).await;
    assert!(matches!(
        result,
        Err(CliError::Core(mooring_core::Error::NotFound { .. }))
    ));
}

#[tokio::test(flavor = "multi_thread")]
async fn sync_commands_require_remote() {
    let core = offline_core().await;
    run_add(&core, EntityKind::Post, &["body=hi".to_string()], None)
        .await
        .unwrap();

    assert!(matches!(run_sync(&core).await, Err(CliError::SyncNotConfigured)));
    assert!(matches!(run_push(&core).await, Err(CliError::SyncNotConfigured)));
    assert_eq!(core.queue_counts().await.unwrap().pending, 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn retry_of_pending_item_is_rejected() {
    let core = offline_core().await;
    run_add(&core, EntityKind::Report, &["name=weekly".to_string()], None)
        .await
        .unwrap();
    let item_id = core.queue_items(None).await.unwrap()[0].id;

    let result = run_queue(&core, QueueCommands::Retry { id: item_id }).await;
    assert!(matches!(result, Err(CliError::Core(_))));
}
