use serde_json::{json, Value};
use uuid::Uuid;

use crate::gateway::GatewayClient;
use crate::ipc::error::ok;
use crate::ipc::helpers::{
    class_scope, get_required_record, get_required_str, not_configured, outcome_json, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::model::{AgendaItem, Holiday, User};
use crate::store::Dataset;
use crate::sync::{self, MutationMode};

const AGENDA_KINDS: [&str; 3] = ["urgent", "warning", "info"];

fn agenda_load(
    client: Option<&GatewayClient>,
    session: Option<&User>,
    data: &mut Dataset,
) -> Result<Value, HandlerErr> {
    let rows = match client {
        Some(client) => client.agendas(session)?,
        None => Vec::new(),
    };
    data.agendas.replace_all(rows);
    data.agendas
        .sort_by(|a, b| a.date.cmp(&b.date).then_with(|| a.time.cmp(&b.time)));
    Ok(json!({ "agendas": data.agendas.items() }))
}

fn agenda_save(
    client: &GatewayClient,
    data: &mut Dataset,
    params: &Value,
    class_id: &str,
) -> Result<Value, HandlerErr> {
    let mut agenda: AgendaItem = get_required_record(params, "agenda")?;
    if agenda.title.trim().is_empty() {
        return Err(HandlerErr::bad_params("agenda title must not be empty"));
    }
    if !AGENDA_KINDS.contains(&agenda.kind.as_str()) {
        agenda.kind = "info".to_string();
    }
    if agenda.class_id.is_empty() {
        agenda.class_id = class_id.to_string();
    }
    let pending = sync::begin_save(&mut data.agendas, agenda, None);
    let result = match pending.mode() {
        MutationMode::Created => client.create_agenda(&pending.record),
        MutationMode::Updated => client.update_agenda(&pending.record),
    };
    let outcome = sync::complete_save(&mut data.agendas, pending, result)?;
    Ok(outcome_json(&outcome))
}

fn agenda_delete(
    client: &GatewayClient,
    data: &mut Dataset,
    params: &Value,
) -> Result<Value, HandlerErr> {
    let id = get_required_str(params, "id")?;
    if !data.agendas.contains(&id) {
        return Err(HandlerErr::not_found("agenda not found"));
    }
    client.delete_agenda(&id)?;
    data.agendas.remove(&id);
    Ok(json!({ "ok": true }))
}

fn holidays_load(
    client: Option<&GatewayClient>,
    session: Option<&User>,
    data: &mut Dataset,
) -> Result<Value, HandlerErr> {
    let rows = match client {
        Some(client) => client.holidays(session)?,
        None => Vec::new(),
    };
    data.holidays.replace_all(rows);
    data.holidays.sort_by(|a, b| a.date.cmp(&b.date));
    Ok(json!({ "holidays": data.holidays.items() }))
}

/// The calendar editor always submits its whole working set; one gateway
/// call lands all of it or none of it.
fn holidays_save(
    client: &GatewayClient,
    data: &mut Dataset,
    params: &Value,
    class_id: &str,
) -> Result<Value, HandlerErr> {
    let mut holidays: Vec<Holiday> = get_required_record(params, "holidays")?;
    holidays.retain(|holiday| !holiday.date.trim().is_empty());
    if holidays.is_empty() {
        return Ok(json!({ "saved": 0 }));
    }
    for holiday in &mut holidays {
        if holiday.id.is_empty() {
            holiday.id = Uuid::new_v4().to_string();
        }
        if holiday.class_id.is_empty() {
            holiday.class_id = class_id.to_string();
        }
    }

    let snapshot = data.holidays.items().to_vec();
    for holiday in &holidays {
        data.holidays.upsert(holiday.clone());
    }
    data.holidays.sort_by(|a, b| a.date.cmp(&b.date));

    if let Err(error) = client.save_holiday_batch(&holidays) {
        data.holidays.replace_all(snapshot);
        return Err(HandlerErr::from(error));
    }
    Ok(json!({ "saved": holidays.len() }))
}

fn holidays_delete(
    client: &GatewayClient,
    data: &mut Dataset,
    params: &Value,
) -> Result<Value, HandlerErr> {
    let id = get_required_str(params, "id")?;
    if !data.holidays.contains(&id) {
        return Err(HandlerErr::not_found("holiday not found"));
    }
    client.delete_holiday(&id)?;
    data.holidays.remove(&id);
    Ok(json!({ "ok": true }))
}

fn handle_agenda_load(state: &mut AppState, req: &Request) -> Value {
    let AppState {
        client,
        session,
        data,
        ..
    } = state;
    match agenda_load(client.as_ref(), session.as_ref(), data) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

fn handle_agenda_list(state: &mut AppState, req: &Request) -> Value {
    ok(&req.id, json!({ "agendas": state.data.agendas.items() }))
}

fn handle_agenda_save(state: &mut AppState, req: &Request) -> Value {
    let class_id = match class_scope(state, &req.params) {
        Ok(v) => v,
        Err(error) => return error.response(&req.id),
    };
    let AppState { client, data, .. } = state;
    let Some(client) = client.as_ref() else {
        return not_configured().response(&req.id);
    };
    match agenda_save(client, data, &req.params, &class_id) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

fn handle_agenda_delete(state: &mut AppState, req: &Request) -> Value {
    let AppState { client, data, .. } = state;
    let Some(client) = client.as_ref() else {
        return not_configured().response(&req.id);
    };
    match agenda_delete(client, data, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

fn handle_holidays_load(state: &mut AppState, req: &Request) -> Value {
    let AppState {
        client,
        session,
        data,
        ..
    } = state;
    match holidays_load(client.as_ref(), session.as_ref(), data) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

fn handle_holidays_list(state: &mut AppState, req: &Request) -> Value {
    ok(&req.id, json!({ "holidays": state.data.holidays.items() }))
}

fn handle_holidays_save(state: &mut AppState, req: &Request) -> Value {
    let class_id = match class_scope(state, &req.params) {
        Ok(v) => v,
        Err(error) => return error.response(&req.id),
    };
    let AppState { client, data, .. } = state;
    let Some(client) = client.as_ref() else {
        return not_configured().response(&req.id);
    };
    match holidays_save(client, data, &req.params, &class_id) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

fn handle_holidays_delete(state: &mut AppState, req: &Request) -> Value {
    let AppState { client, data, .. } = state;
    let Some(client) = client.as_ref() else {
        return not_configured().response(&req.id);
    };
    match holidays_delete(client, data, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "agenda.load" => Some(handle_agenda_load(state, req)),
        "agenda.list" => Some(handle_agenda_list(state, req)),
        "agenda.save" => Some(handle_agenda_save(state, req)),
        "agenda.delete" => Some(handle_agenda_delete(state, req)),
        "holidays.load" => Some(handle_holidays_load(state, req)),
        "holidays.list" => Some(handle_holidays_list(state, req)),
        "holidays.save" => Some(handle_holidays_save(state, req)),
        "holidays.delete" => Some(handle_holidays_delete(state, req)),
        _ => None,
    }
}
