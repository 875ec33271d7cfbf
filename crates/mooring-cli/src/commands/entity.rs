use mooring_core::{Entity, EntityKind};
use serde_json::json;

use crate::commands::common::{
    entity_preview, format_change_lines, format_entity_lines, normalize_entity_id, parse_fields,
    print_json, Core,
};
use crate::error::CliError;

pub async fn run_add(
    core: &Core,
    kind: EntityKind,
    raw_fields: &[String],
    id: Option<&str>,
) -> Result<Entity, CliError> {
    let fields = parse_fields(raw_fields)?;
    let entity = match id {
        Some(id) => Entity::with_id(normalize_entity_id(id)?, fields),
        None => Entity::new(fields),
    };

    let created = core.create(kind, entity).await?;
    println!("Created {kind} {}", created.id);
    Ok(created)
}

pub async fn run_update(
    core: &Core,
    kind: EntityKind,
    id: &str,
    raw_changes: &[String],
) -> Result<Entity, CliError> {
    let id = normalize_entity_id(id)?;
    let changes = parse_fields(raw_changes)?;
    if changes.is_empty() {
        return Err(CliError::EmptyChanges);
    }

    let updated = core.update(kind, &id, &changes).await?;
    println!("Updated {kind} {}: {}", updated.id, entity_preview(&updated, 60));
    Ok(updated)
}

pub async fn run_delete(core: &Core, kind: EntityKind, id: &str) -> Result<(), CliError> {
    let id = normalize_entity_id(id)?;
    core.delete(kind, &id).await?;
    println!("Deleted {kind} {id}");
    Ok(())
}

pub async fn run_list(
    core: &Core,
    kind: EntityKind,
    limit: usize,
    as_json: bool,
) -> Result<(), CliError> {
    let mut entities = core.list(kind).await?;
    entities.truncate(limit);

    if as_json {
        return print_json(&entities);
    }

    if entities.is_empty() {
        println!("No {} stored.", kind.collection());
        return Ok(());
    }
    for line in format_entity_lines(&entities) {
        println!("{line}");
    }
    Ok(())
}

pub async fn run_show(
    core: &Core,
    kind: EntityKind,
    id: &str,
    with_history: bool,
    as_json: bool,
) -> Result<(), CliError> {
    let id = normalize_entity_id(id)?;
    let entity = core
        .get(kind, &id)
        .await?
        .ok_or_else(|| CliError::EntityNotFound(kind.to_string(), id.clone()))?;
    let history = if with_history {
        core.history(kind, &id).await?
    } else {
        Vec::new()
    };

    if as_json {
        if with_history {
            return print_json(&json!({ "entity": entity, "history": history }));
        }
        return print_json(&entity);
    }

    println!("{}", serde_json::to_string_pretty(&entity)?);
    if with_history {
        println!();
        for line in format_change_lines(&history) {
            println!("{line}");
        }
    }
    Ok(())
}
