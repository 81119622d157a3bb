use chrono::{Datelike, NaiveDate, Weekday};
use serde_json::{json, Value};
use tracing::warn;
use uuid::Uuid;

use crate::calc;
use crate::gateway::GatewayClient;
use crate::ipc::error::ok;
use crate::ipc::helpers::{
    class_scope, get_optional_str, get_required_record, get_required_str, not_configured,
    HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::model::JournalEntry;
use crate::store::Dataset;

fn weekday_name(date: &str) -> Option<&'static str> {
    let weekday = NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()?.weekday();
    Some(match weekday {
        Weekday::Mon => "Senin",
        Weekday::Tue => "Selasa",
        Weekday::Wed => "Rabu",
        Weekday::Thu => "Kamis",
        Weekday::Fri => "Jumat",
        Weekday::Sat => "Sabtu",
        Weekday::Sun => "Minggu",
    })
}

fn journal_load(
    client: &GatewayClient,
    data: &mut Dataset,
    class_id: &str,
) -> Result<Value, HandlerErr> {
    let rows = client.journal(class_id)?;
    data.journal.replace_all(rows);
    data.journal.sort_by(calc::journal_slot_order);
    Ok(json!({ "entries": data.journal.items() }))
}

fn journal_list(data: &Dataset, params: &Value) -> Value {
    let date = get_optional_str(params, "date");
    let mut entries: Vec<JournalEntry> = data
        .journal
        .items()
        .iter()
        .filter(|entry| date.as_deref().map_or(true, |d| entry.date == d))
        .cloned()
        .collect();
    entries.sort_by(calc::journal_slot_order);
    json!({ "entries": entries })
}

/// One gateway call for the whole batch. Rows missing a subject are dropped
/// before anything is written; draft ids are replaced by stable ones on the
/// refetch that follows a successful save.
fn journal_save_batch(
    client: &GatewayClient,
    data: &mut Dataset,
    params: &Value,
    class_id: &str,
) -> Result<Value, HandlerErr> {
    let mut entries: Vec<JournalEntry> = get_required_record(params, "entries")?;
    entries.retain(|entry| !entry.subject.trim().is_empty());
    if entries.is_empty() {
        return Ok(json!({ "saved": 0 }));
    }
    for entry in &mut entries {
        if entry.id.is_empty() {
            entry.id = Uuid::new_v4().to_string();
        }
        if entry.class_id.is_empty() {
            entry.class_id = class_id.to_string();
        }
        if entry.day.is_empty() {
            if let Some(day) = weekday_name(&entry.date) {
                entry.day = day.to_string();
            }
        }
    }

    let snapshot = data.journal.items().to_vec();
    for entry in &entries {
        data.journal.upsert(entry.clone());
    }
    data.journal.sort_by(calc::journal_slot_order);

    if let Err(error) = client.save_journal_batch(&entries) {
        data.journal.replace_all(snapshot);
        return Err(HandlerErr::from(error));
    }

    // The batch envelope carries no per-row ids, so drafts keep their local
    // ids until a refetch succeeds. A failed refetch is not a failed save.
    match client.journal(class_id) {
        Ok(rows) => {
            data.journal.replace_all(rows);
            data.journal.sort_by(calc::journal_slot_order);
        }
        Err(error) => {
            warn!(code = error.code(), "journal refetch after save failed");
        }
    }
    Ok(json!({ "saved": entries.len() }))
}

fn journal_delete(
    client: &GatewayClient,
    data: &mut Dataset,
    id: &str,
    class_id: &str,
) -> Result<Value, HandlerErr> {
    if !data.journal.contains(id) {
        return Err(HandlerErr::not_found("journal entry not found"));
    }
    client.delete_journal(id, class_id)?;
    data.journal.remove(id);
    Ok(json!({ "ok": true }))
}

fn handle_load(state: &mut AppState, req: &Request) -> Value {
    if state.client.is_none() {
        state.data.journal.replace_all(Vec::new());
        return ok(&req.id, json!({ "entries": state.data.journal.items() }));
    }
    let class_id = match class_scope(state, &req.params) {
        Ok(v) => v,
        Err(error) => return error.response(&req.id),
    };
    let AppState { client, data, .. } = state;
    let Some(client) = client.as_ref() else {
        return not_configured().response(&req.id);
    };
    match journal_load(client, data, &class_id) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

fn handle_list(state: &mut AppState, req: &Request) -> Value {
    ok(&req.id, journal_list(&state.data, &req.params))
}

fn handle_save_batch(state: &mut AppState, req: &Request) -> Value {
    let class_id = match class_scope(state, &req.params) {
        Ok(v) => v,
        Err(error) => return error.response(&req.id),
    };
    let AppState { client, data, .. } = state;
    let Some(client) = client.as_ref() else {
        return not_configured().response(&req.id);
    };
    match journal_save_batch(client, data, &req.params, &class_id) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

fn handle_delete(state: &mut AppState, req: &Request) -> Value {
    let id = match get_required_str(&req.params, "id") {
        Ok(v) => v,
        Err(error) => return error.response(&req.id),
    };
    // Drafts never reached the gateway, so deleting one is purely local and
    // works in demo mode too.
    if JournalEntry::is_draft_id(&id) {
        state.data.journal.remove(&id);
        return ok(&req.id, json!({ "ok": true, "draft": true }));
    }
    let class_id = match class_scope(state, &req.params) {
        Ok(v) => v,
        Err(error) => return error.response(&req.id),
    };
    let AppState { client, data, .. } = state;
    let Some(client) = client.as_ref() else {
        return not_configured().response(&req.id);
    };
    match journal_delete(client, data, &id, &class_id) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "journal.load" => Some(handle_load(state, req)),
        "journal.list" => Some(handle_list(state, req)),
        "journal.saveBatch" => Some(handle_save_batch(state, req)),
        "journal.delete" => Some(handle_delete(state, req)),
        _ => None,
    }
}
