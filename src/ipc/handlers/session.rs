use crate::ipc::error::ok;
use crate::ipc::helpers::{get_required_str, not_configured, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::model::User;
use serde_json::json;
use tracing::info;

/// The hidden bypass account. It is checked before any gateway traffic, so
/// it opens the app whether or not an endpoint is configured.
fn demo_user() -> User {
    User {
        id: "demo".to_string(),
        username: "demo".to_string(),
        full_name: "Bpk. Guru Demo".to_string(),
        position: "Wali Kelas 4B".to_string(),
        role: "guru".to_string(),
        ..User::default()
    }
}

fn login(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let username = get_required_str(params, "username")?;
    let password = get_required_str(params, "password")?;

    if username.to_lowercase() == "demo" && password == "demo" {
        let user = demo_user();
        info!(user = %user.username, "bypass login");
        state.session = Some(user.clone());
        return Ok(json!({ "user": user }));
    }

    let Some(client) = state.client.as_ref() else {
        return Err(not_configured());
    };
    match client.login(&username, &password)? {
        Some(user) => {
            info!(user = %user.username, role = %user.role, "login");
            state.session = Some(user.clone());
            Ok(json!({ "user": user }))
        }
        // The gateway answered but refused the credentials.
        None => Err(HandlerErr {
            code: "login_failed",
            message: "Username atau Password tidak valid.".to_string(),
            details: None,
        }),
    }
}

fn handle_login(state: &mut AppState, req: &Request) -> serde_json::Value {
    match login(state, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

/// Logout drops the session and every collection loaded under it.
fn handle_logout(state: &mut AppState, req: &Request) -> serde_json::Value {
    if let Some(user) = state.session.take() {
        info!(user = %user.username, "logout");
    }
    state.data.clear();
    ok(&req.id, json!({ "ok": true }))
}

fn handle_current(state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(&req.id, json!({ "user": state.session }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "session.login" => Some(handle_login(state, req)),
        "session.logout" => Some(handle_logout(state, req)),
        "session.current" => Some(handle_current(state, req)),
        _ => None,
    }
}
