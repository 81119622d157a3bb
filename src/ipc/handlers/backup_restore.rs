use std::path::PathBuf;

use serde_json::{json, Value};
use tracing::{info, warn};

use crate::backup;
use crate::calc;
use crate::gateway::{GatewayClient, GatewayError};
use crate::ipc::error::ok;
use crate::ipc::helpers::{class_scope, get_required_str, not_configured, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::model::User;
use crate::store::{Collection, Dataset, Keyed};

fn required_path(params: &Value, key: &str) -> Result<PathBuf, HandlerErr> {
    let raw = get_required_str(params, key)?;
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(HandlerErr::bad_params(format!("{} must not be empty", key)));
    }
    Ok(PathBuf::from(trimmed))
}

/// The bundle payload: every collection under the key the gateway's
/// restore action expects.
fn dataset_json(data: &Dataset) -> Value {
    json!({
        "students": data.students.items(),
        "grades": data.grades.items(),
        "attendance": data.attendance.items(),
        "inventory": data.inventory.items(),
        "guests": data.guests.items(),
        "learningJournal": data.journal.items(),
        "liaisonLogs": data.liaison.items(),
        "permissionRequests": data.permissions.items(),
        "agendas": data.agendas.items(),
        "holidays": data.holidays.items(),
        "classConfig": data.class_config,
    })
}

fn export_bundle(data: &Dataset, params: &Value) -> Result<Value, HandlerErr> {
    let out_path = required_path(params, "outPath")?;
    let summary =
        backup::export_data_bundle(&dataset_json(data), &out_path).map_err(|error| HandlerErr {
            code: "io_failed",
            message: format!("{:#}", error),
            details: Some(json!({ "path": out_path.to_string_lossy() })),
        })?;
    info!(path = %out_path.to_string_lossy(), sha256 = %summary.sha256, "data bundle written");
    Ok(json!({
        "ok": true,
        "path": out_path.to_string_lossy(),
        "bundleFormat": summary.bundle_format,
        "entries": summary.entry_count,
        "sha256": summary.sha256,
    }))
}

fn refill<T: Keyed + Clone>(
    collection: &mut Collection<T>,
    fetched: Result<Vec<T>, GatewayError>,
    what: &'static str,
) {
    match fetched {
        Ok(rows) => collection.replace_all(rows),
        Err(error) => warn!(code = error.code(), what, "refetch after restore failed"),
    }
}

/// After the gateway accepts a restore, the local collections are refetched
/// so the caller sees the restored server state instead of a guess. Refetch
/// failures degrade to warnings; the restore itself already succeeded.
fn refetch_all(
    client: &GatewayClient,
    session: Option<&User>,
    data: &mut Dataset,
    class_id: Option<&str>,
) {
    refill(&mut data.students, client.students(session), "students");
    refill(&mut data.grades, client.grades(session), "grades");
    refill(&mut data.attendance, client.attendance(session), "attendance");
    refill(&mut data.agendas, client.agendas(session), "agendas");
    refill(&mut data.holidays, client.holidays(session), "holidays");
    refill(&mut data.liaison, client.liaison_logs(session), "liaison");
    refill(
        &mut data.permissions,
        client.permission_requests(session),
        "permissions",
    );
    data.holidays.sort_by(|a, b| a.date.cmp(&b.date));
    data.liaison.sort_by(calc::liaison_order);

    let Some(class_id) = class_id else {
        warn!("no class scope; skipping class-scoped refetch after restore");
        return;
    };
    refill(&mut data.inventory, client.inventory(class_id), "inventory");
    refill(&mut data.guests, client.guests(class_id), "guests");
    refill(&mut data.journal, client.journal(class_id), "journal");
    data.guests.sort_by(calc::guest_order);
    data.journal.sort_by(calc::journal_slot_order);
    match client.class_config(class_id) {
        Ok(config) => data.class_config = config,
        Err(error) => warn!(code = error.code(), "class config refetch after restore failed"),
    }
}

fn handle_export(state: &mut AppState, req: &Request) -> Value {
    match export_bundle(&state.data, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

fn handle_restore(state: &mut AppState, req: &Request) -> Value {
    let in_path = match required_path(&req.params, "inPath") {
        Ok(v) => v,
        Err(error) => return error.response(&req.id),
    };
    if state.client.is_none() {
        return not_configured().response(&req.id);
    }
    let class_id = class_scope(state, &req.params).ok();

    let (dataset, summary) = match backup::read_data_bundle(&in_path) {
        Ok(v) => v,
        Err(error) => {
            return HandlerErr {
                code: "io_failed",
                message: format!("{:#}", error),
                details: Some(json!({ "path": in_path.to_string_lossy() })),
            }
            .response(&req.id)
        }
    };

    let AppState {
        client,
        session,
        data,
        ..
    } = state;
    let Some(client) = client.as_ref() else {
        return not_configured().response(&req.id);
    };
    if let Err(error) = client.restore_data(&dataset) {
        return HandlerErr::from(error).response(&req.id);
    }
    info!(
        path = %in_path.to_string_lossy(),
        format = %summary.bundle_format_detected,
        "restore accepted by gateway"
    );
    refetch_all(client, session.as_ref(), data, class_id.as_deref());
    ok(
        &req.id,
        json!({
            "ok": true,
            "bundleFormat": summary.bundle_format_detected,
            "sha256": summary.sha256,
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "backup.exportDataBundle" => Some(handle_export(state, req)),
        "backup.restoreDataBundle" => Some(handle_restore(state, req)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Student;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!(
            "kelasd-restore-{}-{}",
            name,
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .expect("clock")
                .as_nanos()
        ))
    }

    #[test]
    fn bundle_round_trips_the_dataset() {
        let mut data = Dataset::default();
        data.students.replace_all(vec![Student {
            id: "s1".to_string(),
            name: "Ahmad".to_string(),
            ..Default::default()
        }]);

        let path = temp_path("roundtrip.zip");
        let exported = export_bundle(&data, &json!({ "outPath": path.to_string_lossy() })).unwrap();
        assert_eq!(exported["ok"], true);
        assert_eq!(exported["bundleFormat"], backup::BUNDLE_FORMAT_V1);

        let (dataset, summary) = backup::read_data_bundle(&path).unwrap();
        assert_eq!(dataset["students"][0]["name"], "Ahmad");
        assert_eq!(summary.sha256, exported["sha256"].as_str().unwrap());
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn export_requires_a_real_path() {
        let data = Dataset::default();
        let err = export_bundle(&data, &json!({ "outPath": "" })).unwrap_err();
        assert_eq!(err.code, "bad_params");
    }
}
