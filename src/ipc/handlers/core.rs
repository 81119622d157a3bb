use crate::config::{save_config, GatewayConfig};
use crate::ipc::error::ok;
use crate::ipc::types::{AppState, Request};
use crate::ipc::helpers::{get_optional_str, get_required_str, HandlerErr};
use serde_json::json;
use std::path::PathBuf;
use tracing::info;

fn handle_health(state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(
        &req.id,
        json!({
            "service": "kelasd",
            "version": env!("CARGO_PKG_VERSION"),
            "mode": state.mode().as_str(),
        }),
    )
}

/// Validates, persists, and applies a new endpoint URL. A placeholder URL is
/// accepted and simply leaves the sidecar in demo mode; only an empty one is
/// rejected.
fn gateway_configure(
    state: &mut AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let url = get_required_str(params, "url")?;
    let url = url.trim();
    if url.is_empty() {
        return Err(HandlerErr::bad_params("url must not be empty"));
    }
    if let Some(path) = get_optional_str(params, "configPath") {
        state.config_path = PathBuf::from(path);
    }
    let cfg = GatewayConfig::new(url);
    save_config(&state.config_path, &cfg).map_err(|e| HandlerErr {
        code: "config_write_failed",
        message: e.to_string(),
        details: None,
    })?;
    state.apply_config(cfg);
    info!(mode = state.mode().as_str(), "gateway reconfigured");
    Ok(json!({ "mode": state.mode().as_str() }))
}

fn handle_gateway_configure(state: &mut AppState, req: &Request) -> serde_json::Value {
    match gateway_configure(state, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

fn handle_gateway_status(state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(
        &req.id,
        json!({
            "mode": state.mode().as_str(),
            "endpointUrl": state.config.as_ref().map(|cfg| cfg.endpoint_url.clone()),
            "loggedIn": state.session.is_some(),
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "health" => Some(handle_health(state, req)),
        "gateway.configure" => Some(handle_gateway_configure(state, req)),
        "gateway.status" => Some(handle_gateway_status(state, req)),
        _ => None,
    }
}
