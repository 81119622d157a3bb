use chrono::Local;
use serde_json::{json, Value};

use crate::calc;
use crate::gateway::GatewayClient;
use crate::ipc::error::ok;
use crate::ipc::helpers::{
    class_scope, get_required_record, get_required_str, not_configured, outcome_json, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::model::Guest;
use crate::store::Dataset;
use crate::sync;

fn guests_load(
    client: &GatewayClient,
    data: &mut Dataset,
    class_id: &str,
) -> Result<Value, HandlerErr> {
    let rows = client.guests(class_id)?;
    data.guests.replace_all(rows);
    data.guests.sort_by(calc::guest_order);
    Ok(json!({ "guests": data.guests.items() }))
}

fn guests_save(
    client: &GatewayClient,
    data: &mut Dataset,
    params: &Value,
    class_id: &str,
) -> Result<Value, HandlerErr> {
    let mut guest: Guest = get_required_record(params, "guest")?;
    if guest.name.trim().is_empty() {
        return Err(HandlerErr::bad_params("guest name must not be empty"));
    }
    if guest.class_id.is_empty() {
        guest.class_id = class_id.to_string();
    }
    // The visitor book defaults to "now" when the form leaves these blank.
    if guest.date.is_empty() {
        guest.date = Local::now().format("%Y-%m-%d").to_string();
    }
    if guest.time.is_empty() {
        guest.time = Local::now().format("%H:%M").to_string();
    }
    let pending = sync::begin_save(&mut data.guests, guest, Some(calc::guest_order));
    let result = client.save_guest(&pending.record);
    let outcome = sync::complete_save(&mut data.guests, pending, result)?;
    Ok(outcome_json(&outcome))
}

fn guests_delete(
    client: &GatewayClient,
    data: &mut Dataset,
    params: &Value,
    class_id: &str,
) -> Result<Value, HandlerErr> {
    let id = get_required_str(params, "id")?;
    if !data.guests.contains(&id) {
        return Err(HandlerErr::not_found("guest not found"));
    }
    client.delete_guest(&id, class_id)?;
    data.guests.remove(&id);
    Ok(json!({ "ok": true }))
}

fn handle_load(state: &mut AppState, req: &Request) -> Value {
    if state.client.is_none() {
        state.data.guests.replace_all(Vec::new());
        return ok(&req.id, json!({ "guests": state.data.guests.items() }));
    }
    let class_id = match class_scope(state, &req.params) {
        Ok(v) => v,
        Err(error) => return error.response(&req.id),
    };
    let AppState { client, data, .. } = state;
    let Some(client) = client.as_ref() else {
        return not_configured().response(&req.id);
    };
    match guests_load(client, data, &class_id) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

fn handle_list(state: &mut AppState, req: &Request) -> Value {
    ok(&req.id, json!({ "guests": state.data.guests.items() }))
}

fn handle_save(state: &mut AppState, req: &Request) -> Value {
    let class_id = match class_scope(state, &req.params) {
        Ok(v) => v,
        Err(error) => return error.response(&req.id),
    };
    let AppState { client, data, .. } = state;
    let Some(client) = client.as_ref() else {
        return not_configured().response(&req.id);
    };
    match guests_save(client, data, &req.params, &class_id) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

fn handle_delete(state: &mut AppState, req: &Request) -> Value {
    let class_id = match class_scope(state, &req.params) {
        Ok(v) => v,
        Err(error) => return error.response(&req.id),
    };
    let AppState { client, data, .. } = state;
    let Some(client) = client.as_ref() else {
        return not_configured().response(&req.id);
    };
    match guests_delete(client, data, &req.params, &class_id) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "guests.load" => Some(handle_load(state, req)),
        "guests.list" => Some(handle_list(state, req)),
        "guests.save" => Some(handle_save(state, req)),
        "guests.delete" => Some(handle_delete(state, req)),
        _ => None,
    }
}
