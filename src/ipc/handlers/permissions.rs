use serde_json::{json, Value};

use crate::gateway::GatewayClient;
use crate::ipc::error::ok;
use crate::ipc::helpers::{
    class_scope, get_required_record, get_required_str, not_configured, outcome_json, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::model::{PermissionRequest, PermissionStatus, User};
use crate::store::Dataset;
use crate::sync;

const PERMISSION_KINDS: [&str; 3] = ["sick", "permit", "dispensation"];

fn permissions_load(
    client: Option<&GatewayClient>,
    session: Option<&User>,
    data: &mut Dataset,
) -> Result<Value, HandlerErr> {
    let rows = match client {
        Some(client) => client.permission_requests(session)?,
        None => Vec::new(),
    };
    data.permissions.replace_all(rows);
    Ok(json!({ "requests": data.permissions.items() }))
}

fn permissions_save(
    client: &GatewayClient,
    data: &mut Dataset,
    params: &Value,
    class_id: &str,
) -> Result<Value, HandlerErr> {
    let mut request: PermissionRequest = get_required_record(params, "request")?;
    if !PERMISSION_KINDS.contains(&request.kind.as_str()) {
        return Err(HandlerErr::bad_params(format!(
            "unknown permission type: {}",
            request.kind
        )));
    }
    if request.date.trim().is_empty() {
        return Err(HandlerErr::bad_params("missing date"));
    }
    if request.class_id.is_empty() {
        request.class_id = class_id.to_string();
    }
    let pending = sync::begin_save(&mut data.permissions, request, None);
    let result = client.save_permission_request(&pending.record);
    let outcome = sync::complete_save(&mut data.permissions, pending, result)?;
    Ok(outcome_json(&outcome))
}

/// Approve or reject happens on the server first; the local row is patched
/// only once the decision is confirmed.
fn permissions_process(
    client: &GatewayClient,
    data: &mut Dataset,
    params: &Value,
) -> Result<Value, HandlerErr> {
    let id = get_required_str(params, "id")?;
    let decision = get_required_str(params, "decision")?;
    let status = match decision.as_str() {
        "approve" => PermissionStatus::Approved,
        "reject" => PermissionStatus::Rejected,
        _ => {
            return Err(HandlerErr::bad_params(
                "decision must be approve or reject",
            ))
        }
    };
    if !data.permissions.contains(&id) {
        return Err(HandlerErr::not_found("permission request not found"));
    }
    client.process_permission_request(&id, &decision)?;
    if let Some(mut request) = data.permissions.get(&id).cloned() {
        request.status = status;
        data.permissions.upsert(request);
    }
    Ok(json!({ "ok": true, "status": status }))
}

fn handle_load(state: &mut AppState, req: &Request) -> Value {
    let AppState {
        client,
        session,
        data,
        ..
    } = state;
    match permissions_load(client.as_ref(), session.as_ref(), data) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

fn handle_list(state: &mut AppState, req: &Request) -> Value {
    ok(&req.id, json!({ "requests": state.data.permissions.items() }))
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
    match permissions_save(client, data, &req.params, &class_id) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

fn handle_process(state: &mut AppState, req: &Request) -> Value {
    let AppState { client, data, .. } = state;
    let Some(client) = client.as_ref() else {
        return not_configured().response(&req.id);
    };
    match permissions_process(client, data, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "permissions.load" => Some(handle_load(state, req)),
        "permissions.list" => Some(handle_list(state, req)),
        "permissions.save" => Some(handle_save(state, req)),
        "permissions.process" => Some(handle_process(state, req)),
        _ => None,
    }
}
