use chrono::Local;
use serde_json::{json, Value};

use crate::calc;
use crate::gateway::GatewayClient;
use crate::ipc::error::ok;
use crate::ipc::helpers::{
    class_scope, get_required_record, get_required_str, not_configured, outcome_json, report_json,
    HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::model::{LiaisonLog, LiaisonStatus, User};
use crate::store::Dataset;
use crate::sync::{self, BatchReport, MutationMode, MutationOutcome};

fn liaison_load(
    client: Option<&GatewayClient>,
    session: Option<&User>,
    data: &mut Dataset,
) -> Result<Value, HandlerErr> {
    let rows = match client {
        Some(client) => client.liaison_logs(session)?,
        None => Vec::new(),
    };
    data.liaison.replace_all(rows);
    data.liaison.sort_by(calc::liaison_order);
    Ok(json!({ "logs": data.liaison.items() }))
}

fn liaison_save(
    client: &GatewayClient,
    data: &mut Dataset,
    params: &Value,
    class_id: &str,
) -> Result<Value, HandlerErr> {
    let mut log: LiaisonLog = get_required_record(params, "log")?;
    if log.message.trim().is_empty() {
        return Err(HandlerErr::bad_params("log message must not be empty"));
    }
    if log.class_id.is_empty() {
        log.class_id = class_id.to_string();
    }
    if log.date.is_empty() {
        log.date = Local::now().format("%Y-%m-%d").to_string();
    }
    let pending = sync::begin_save(&mut data.liaison, log, Some(calc::liaison_order));
    let result = client.save_liaison_log(&pending.record);
    let outcome = sync::complete_save(&mut data.liaison, pending, result)?;
    Ok(outcome_json(&outcome))
}

/// Status transitions for many logs in one gateway call. Rows that fail
/// validation never reach the gateway; the valid remainder stands or falls
/// together.
fn liaison_update_status(
    client: &GatewayClient,
    data: &mut Dataset,
    params: &Value,
) -> Result<Value, HandlerErr> {
    let ids: Vec<String> = get_required_record(params, "ids")?;
    let status_name = get_required_str(params, "status")?;
    let Some(status) = LiaisonStatus::parse(&status_name) else {
        return Err(HandlerErr::bad_params(format!(
            "unknown status: {}",
            status_name
        )));
    };

    let mut report = BatchReport::default();
    let mut valid: Vec<(usize, String)> = Vec::new();
    for (index, id) in ids.iter().enumerate() {
        let Some(log) = data.liaison.get(id) else {
            report.record_rejected(index, "not_found", format!("log not found: {}", id));
            continue;
        };
        let current = log.effective_status();
        if !current.can_become(status) {
            report.record_rejected(
                index,
                "bad_params",
                format!(
                    "cannot move {} from {} to {}",
                    id,
                    current.as_str(),
                    status.as_str()
                ),
            );
            continue;
        }
        valid.push((index, id.clone()));
    }

    if valid.is_empty() {
        return Ok(report_json(&report, 0));
    }

    let valid_ids: Vec<String> = valid.iter().map(|(_, id)| id.clone()).collect();
    match client.update_liaison_status(&valid_ids, status) {
        Ok(_) => {
            for (index, id) in valid {
                if let Some(mut log) = data.liaison.get(&id).cloned() {
                    log.status = Some(status);
                    data.liaison.upsert(log);
                }
                report.record_success(
                    index,
                    &MutationOutcome {
                        mode: MutationMode::Updated,
                        id,
                        stale: false,
                    },
                );
            }
        }
        Err(error) => {
            for (index, _) in valid {
                report.record_failure(index, &error);
            }
        }
    }
    Ok(report_json(&report, 0))
}

fn handle_load(state: &mut AppState, req: &Request) -> Value {
    let AppState {
        client,
        session,
        data,
        ..
    } = state;
    match liaison_load(client.as_ref(), session.as_ref(), data) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

fn handle_list(state: &mut AppState, req: &Request) -> Value {
    ok(&req.id, json!({ "logs": state.data.liaison.items() }))
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
    match liaison_save(client, data, &req.params, &class_id) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

fn handle_update_status(state: &mut AppState, req: &Request) -> Value {
    let AppState { client, data, .. } = state;
    let Some(client) = client.as_ref() else {
        return not_configured().response(&req.id);
    };
    match liaison_update_status(client, data, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "liaison.load" => Some(handle_load(state, req)),
        "liaison.list" => Some(handle_list(state, req)),
        "liaison.save" => Some(handle_save(state, req)),
        "liaison.updateStatus" => Some(handle_update_status(state, req)),
        _ => None,
    }
}
