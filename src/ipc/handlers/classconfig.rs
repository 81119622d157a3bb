use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use crate::calc;
use crate::gateway::GatewayClient;
use crate::ipc::error::ok;
use crate::ipc::helpers::{
    class_scope, get_optional_str, get_required_str, not_configured, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::model::{ClassConfig, CONFIG_SECTIONS};
use crate::store::Dataset;

fn parse_section<T: DeserializeOwned>(payload: &Value, key: &str) -> Result<T, HandlerErr> {
    serde_json::from_value(payload.clone())
        .map_err(|error| HandlerErr::bad_params(format!("invalid {}: {}", key, error)))
}

/// Applies one section payload to a config document. The payload shape is
/// the section's own type, not a whole-config patch.
fn apply_section(config: &mut ClassConfig, key: &str, payload: &Value) -> Result<(), HandlerErr> {
    match key {
        "SCHEDULE" => config.schedule = parse_section(payload, key)?,
        "PIKET" => config.piket = parse_section(payload, key)?,
        "SEATING" => config.seats = parse_section(payload, key)?,
        "KKTP" => config.kktp = parse_section(payload, key)?,
        "ACADEMIC_CALENDAR" => config.academic_calendar = parse_section(payload, key)?,
        "TIME_SLOTS" => config.time_slots = parse_section(payload, key)?,
        "ORGANIZATION" => config.organization = parse_section(payload, key)?,
        _ => {
            return Err(HandlerErr::bad_params(format!(
                "unknown config section: {}",
                key
            )))
        }
    }
    Ok(())
}

/// All config writes funnel through here: apply locally, push one section,
/// roll back the document if the gateway refuses it.
fn save_section(
    client: &GatewayClient,
    data: &mut Dataset,
    class_id: &str,
    key: &str,
    payload: Value,
) -> Result<Value, HandlerErr> {
    let previous = data.class_config.clone();
    let mut next = previous.clone().unwrap_or_default();
    apply_section(&mut next, key, &payload)?;
    data.class_config = Some(next);
    if let Err(error) = client.save_class_config(key, payload, class_id) {
        data.class_config = previous;
        return Err(HandlerErr::from(error));
    }
    Ok(json!({ "ok": true, "key": key }))
}

fn encode<T: serde::Serialize>(value: &T) -> Result<Value, HandlerErr> {
    serde_json::to_value(value).map_err(|error| HandlerErr {
        code: "internal",
        message: error.to_string(),
        details: None,
    })
}

fn config_load(
    client: &GatewayClient,
    data: &mut Dataset,
    class_id: &str,
) -> Result<Value, HandlerErr> {
    let fetched = client.class_config(class_id)?;
    data.class_config = fetched;
    Ok(json!({
        "config": data.class_config.clone().unwrap_or_default(),
    }))
}

fn config_save(
    client: &GatewayClient,
    data: &mut Dataset,
    params: &Value,
    class_id: &str,
) -> Result<Value, HandlerErr> {
    let key = get_required_str(params, "key")?;
    if !CONFIG_SECTIONS.contains(&key.as_str()) {
        return Err(HandlerErr::bad_params(format!(
            "unknown config section: {}",
            key
        )));
    }
    let Some(payload) = params.get("data") else {
        return Err(HandlerErr::bad_params("missing data"));
    };
    save_section(client, data, class_id, &key, payload.clone())
}

fn seating_resize(
    client: &GatewayClient,
    data: &mut Dataset,
    params: &Value,
    class_id: &str,
) -> Result<Value, HandlerErr> {
    let Some(count) = params.get("count").and_then(Value::as_u64) else {
        return Err(HandlerErr::bad_params("missing count"));
    };
    let current = data.class_config.clone().unwrap_or_default();
    let resized = calc::resize_layouts(&current.seats, count as usize);
    let payload = encode(&resized)?;
    save_section(client, data, class_id, "SEATING", payload)
}

fn seating_assign(
    client: &GatewayClient,
    data: &mut Dataset,
    params: &Value,
    class_id: &str,
) -> Result<Value, HandlerErr> {
    let layout = get_required_str(params, "layout")?;
    let Some(seat_index) = params.get("seatIndex").and_then(Value::as_u64) else {
        return Err(HandlerErr::bad_params("missing seatIndex"));
    };
    let seat_index = seat_index as usize;
    let student_id = get_optional_str(params, "studentId");

    let mut seats = data.class_config.clone().unwrap_or_default().seats;
    let layout_seats = match layout.as_str() {
        "classical" => &mut seats.classical,
        "groups" => &mut seats.groups,
        "ushape" => &mut seats.ushape,
        other => {
            return Err(HandlerErr::bad_params(format!("unknown layout: {}", other)));
        }
    };
    if seat_index >= layout_seats.len() {
        return Err(HandlerErr::bad_params(format!(
            "seatIndex out of range: {}",
            seat_index
        )));
    }
    // A student holds at most one seat per layout; assigning moves them.
    if let Some(student_id) = &student_id {
        for seat in layout_seats.iter_mut() {
            if seat.as_deref() == Some(student_id.as_str()) {
                *seat = None;
            }
        }
    }
    layout_seats[seat_index] = student_id;

    let payload = encode(&seats)?;
    save_section(client, data, class_id, "SEATING", payload)
}

fn piket_move(
    client: &GatewayClient,
    data: &mut Dataset,
    params: &Value,
    class_id: &str,
) -> Result<Value, HandlerErr> {
    let student_id = get_required_str(params, "studentId")?;
    let day = get_optional_str(params, "day");

    let mut groups = data.class_config.clone().unwrap_or_default().piket;
    calc::move_piket_student(&mut groups, &student_id, day.as_deref());

    let payload = encode(&groups)?;
    save_section(client, data, class_id, "PIKET", payload)?;

    // The drag-drop panel needs the leftover pool without re-deriving it.
    let unassigned: Vec<String> = calc::unassigned_students(data.students.items(), &groups)
        .into_iter()
        .map(|student| student.id.clone())
        .collect();
    Ok(json!({ "ok": true, "key": "PIKET", "unassigned": unassigned }))
}

fn handle_load(state: &mut AppState, req: &Request) -> Value {
    if state.client.is_none() {
        state.data.class_config = None;
        return ok(&req.id, json!({ "config": ClassConfig::default() }));
    }
    let class_id = match class_scope(state, &req.params) {
        Ok(v) => v,
        Err(error) => return error.response(&req.id),
    };
    let AppState { client, data, .. } = state;
    let Some(client) = client.as_ref() else {
        return not_configured().response(&req.id);
    };
    match config_load(client, data, &class_id) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

fn handle_get(state: &mut AppState, req: &Request) -> Value {
    ok(
        &req.id,
        json!({ "config": state.data.class_config.clone().unwrap_or_default() }),
    )
}

fn write_op(
    state: &mut AppState,
    req: &Request,
    op: fn(&GatewayClient, &mut Dataset, &Value, &str) -> Result<Value, HandlerErr>,
) -> Value {
    let class_id = match class_scope(state, &req.params) {
        Ok(v) => v,
        Err(error) => return error.response(&req.id),
    };
    let AppState { client, data, .. } = state;
    let Some(client) = client.as_ref() else {
        return not_configured().response(&req.id);
    };
    match op(client, data, &req.params, &class_id) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "classconfig.load" => Some(handle_load(state, req)),
        "classconfig.get" => Some(handle_get(state, req)),
        "classconfig.save" => Some(write_op(state, req, config_save)),
        "seating.resize" => Some(write_op(state, req, seating_resize)),
        "seating.assign" => Some(write_op(state, req, seating_assign)),
        "piket.move" => Some(write_op(state, req, piket_move)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn section_payloads_apply_by_key() {
        let mut config = ClassConfig::default();
        apply_section(&mut config, "KKTP", &json!({ "mtk": 72.0 })).unwrap();
        assert_eq!(config.kktp.get("mtk"), Some(&72.0));

        apply_section(
            &mut config,
            "SEATING",
            &json!({ "classical": ["s1", null], "groups": [], "ushape": [] }),
        )
        .unwrap();
        assert_eq!(config.seats.classical.len(), 2);
        assert_eq!(config.seats.classical[0].as_deref(), Some("s1"));
    }

    #[test]
    fn unknown_section_is_rejected() {
        let mut config = ClassConfig::default();
        let err = apply_section(&mut config, "WALLPAPER", &json!([])).unwrap_err();
        assert_eq!(err.code, "bad_params");
    }

    #[test]
    fn malformed_payload_is_rejected() {
        let mut config = ClassConfig::default();
        let err = apply_section(&mut config, "TIME_SLOTS", &json!({ "nope": 1 })).unwrap_err();
        assert_eq!(err.code, "bad_params");
        assert!(err.message.contains("TIME_SLOTS"));
    }
}
