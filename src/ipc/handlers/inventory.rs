use serde_json::{json, Value};
use tracing::warn;

use crate::gateway::GatewayClient;
use crate::ipc::error::ok;
use crate::ipc::helpers::{
    class_scope, get_required_record, get_required_rows, get_required_str, not_configured,
    outcome_json, report_json, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::model::InventoryItem;
use crate::sheets;
use crate::store::Dataset;
use crate::sync::{self, BatchReport};

fn inventory_load(
    client: &GatewayClient,
    data: &mut Dataset,
    class_id: &str,
) -> Result<Value, HandlerErr> {
    let rows = client.inventory(class_id)?;
    data.inventory.replace_all(rows);
    Ok(json!({ "items": data.inventory.items() }))
}

/// `saveInventory` upserts on the server side, so create and update share
/// one action; the mode in the outcome still tells the caller which it was.
fn inventory_save(
    client: &GatewayClient,
    data: &mut Dataset,
    params: &Value,
    class_id: &str,
) -> Result<Value, HandlerErr> {
    let mut item: InventoryItem = get_required_record(params, "item")?;
    if item.name.trim().is_empty() {
        return Err(HandlerErr::bad_params("item name must not be empty"));
    }
    if item.class_id.is_empty() {
        item.class_id = class_id.to_string();
    }
    if item.qty <= 0 {
        item.qty = 1;
    }
    let pending = sync::begin_save(&mut data.inventory, item, None);
    let result = client.save_inventory(&pending.record);
    let outcome = sync::complete_save(&mut data.inventory, pending, result)?;
    Ok(outcome_json(&outcome))
}

fn inventory_delete(
    client: &GatewayClient,
    data: &mut Dataset,
    params: &Value,
    class_id: &str,
) -> Result<Value, HandlerErr> {
    let id = get_required_str(params, "id")?;
    if !data.inventory.contains(&id) {
        return Err(HandlerErr::not_found("inventory item not found"));
    }
    client.delete_inventory(&id, class_id)?;
    data.inventory.remove(&id);
    Ok(json!({ "ok": true }))
}

/// Shared import core used by `inventory.importRows` and the exchange
/// import. Rows without a usable name are skipped, not failed.
pub(super) fn import_inventory_rows(
    client: &GatewayClient,
    data: &mut Dataset,
    rows: &[Vec<String>],
    class_id: &str,
) -> Value {
    let mut report = BatchReport::default();
    let mut skipped = 0usize;
    for (index, fields) in rows.iter().enumerate() {
        let Some(item) = sheets::inventory_from_row(fields, class_id) else {
            skipped += 1;
            continue;
        };
        let pending = sync::begin_save(&mut data.inventory, item, None);
        let result = client.save_inventory(&pending.record);
        match sync::complete_save(&mut data.inventory, pending, result) {
            Ok(outcome) => report.record_success(index, &outcome),
            Err(error) => {
                warn!(code = error.code(), index, "inventory import row failed");
                report.record_failure(index, &error);
            }
        }
    }
    report_json(&report, skipped)
}

fn handle_load(state: &mut AppState, req: &Request) -> Value {
    if state.client.is_none() {
        state.data.inventory.replace_all(Vec::new());
        return ok(&req.id, json!({ "items": state.data.inventory.items() }));
    }
    let class_id = match class_scope(state, &req.params) {
        Ok(v) => v,
        Err(error) => return error.response(&req.id),
    };
    let AppState { client, data, .. } = state;
    let Some(client) = client.as_ref() else {
        return not_configured().response(&req.id);
    };
    match inventory_load(client, data, &class_id) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

fn handle_list(state: &mut AppState, req: &Request) -> Value {
    ok(&req.id, json!({ "items": state.data.inventory.items() }))
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
    match inventory_save(client, data, &req.params, &class_id) {
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
    match inventory_delete(client, data, &req.params, &class_id) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

fn handle_import_rows(state: &mut AppState, req: &Request) -> Value {
    let class_id = match class_scope(state, &req.params) {
        Ok(v) => v,
        Err(error) => return error.response(&req.id),
    };
    let rows = match get_required_rows(&req.params, "rows") {
        Ok(v) => v,
        Err(error) => return error.response(&req.id),
    };
    let AppState { client, data, .. } = state;
    let Some(client) = client.as_ref() else {
        return not_configured().response(&req.id);
    };
    ok(&req.id, import_inventory_rows(client, data, &rows, &class_id))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "inventory.load" => Some(handle_load(state, req)),
        "inventory.list" => Some(handle_list(state, req)),
        "inventory.save" => Some(handle_save(state, req)),
        "inventory.delete" => Some(handle_delete(state, req)),
        "inventory.importRows" => Some(handle_import_rows(state, req)),
        _ => None,
    }
}
