use rusqlite::Connection;
use serde_json::{json, Value};

use crate::grades::{self, GradeRow, ValueDomain};
use crate::ipc::error::{err, ok, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::ledger::CgpaData;
use crate::remote::RemoteClient;
use crate::session::Session;
use crate::store;

fn parse_rows(params: &Value, key: &str) -> Result<Vec<GradeRow>, HandlerErr> {
    let Some(raw) = params.get(key) else {
        return Err(HandlerErr::bad_params(format!("missing {key}")));
    };
    serde_json::from_value(raw.clone())
        .map_err(|e| HandlerErr::bad_params(format!("{key} must be an array of rows: {e}")))
}

fn parse_decimal_param(params: &Value, key: &str) -> Result<Option<f64>, HandlerErr> {
    match params.get(key) {
        None => Ok(None),
        Some(v) if v.is_null() => Ok(None),
        Some(v) => {
            let Some(s) = v.as_str() else {
                return Err(HandlerErr::bad_params(format!("{key} must be a string")));
            };
            if s.trim().is_empty() {
                return Ok(None);
            }
            Ok(s.trim().parse::<f64>().ok())
        }
    }
}

fn sgpa_compute(params: &Value) -> Result<Value, HandlerErr> {
    let rows = parse_rows(params, "subjects")?;
    let summary = grades::weighted_average(&rows, ValueDomain::GradePoints);
    Ok(json!({
        "sgpa": grades::format_sgpa(summary.average),
        "totalGradePoints": summary.total_points,
        "totalCredits": summary.total_weight,
        "calculable": summary.calculable,
        "flags": summary.flags,
    }))
}

fn cgpa_compute(params: &Value) -> Result<Value, HandlerErr> {
    let rows = parse_rows(params, "semesters")?;
    let summary = grades::weighted_average(&rows, ValueDomain::Sgpa);
    Ok(json!({
        "cgpa": grades::format_cgpa(summary.average),
        "totalCredits": summary.total_weight,
        "calculable": summary.calculable,
        "flags": summary.flags,
    }))
}

fn cgpa_predict(params: &Value) -> Result<Value, HandlerErr> {
    let rows = parse_rows(params, "semesters")?;
    let summary = grades::weighted_average(&rows, ValueDomain::Sgpa);
    let future_sgpa = parse_decimal_param(params, "futureSgpa")?;
    let future_credits = parse_decimal_param(params, "futureCredits")?;

    let predicted = match (future_sgpa, future_credits) {
        (Some(v), Some(w)) => grades::predict_cgpa(summary.average, summary.total_weight, v, w),
        _ => None,
    };

    Ok(json!({
        "current": grades::format_cgpa(summary.average),
        "totalCredits": summary.total_weight,
        "available": predicted.is_some(),
        "predicted": predicted.map(grades::format_cgpa),
    }))
}

fn local_cgpa(conn: &Connection) -> CgpaData {
    store::settings_get_json(conn, store::KEY_CGPA_DATA)
        .unwrap_or_default()
        .unwrap_or_default()
}

fn cgpa_load(
    conn: &Connection,
    session: &mut Session,
    remote: &RemoteClient,
) -> Result<Value, HandlerErr> {
    if let Some(token) = session.token().map(str::to_string) {
        match remote.fetch_cgpa(&token) {
            Ok(data) => {
                let data = data.with_placeholder();
                return Ok(json!({ "semesters": data.semesters, "source": "remote" }));
            }
            Err(e) => {
                if e.is_unauthorized() {
                    session.clear(conn)?;
                }
                tracing::warn!(error = %e, "cgpa fetch failed, falling back to local copy");
            }
        }
    }
    let data = local_cgpa(conn).with_placeholder();
    Ok(json!({ "semesters": data.semesters, "source": "local" }))
}

fn cgpa_save(
    conn: &Connection,
    session: &mut Session,
    remote: &RemoteClient,
    params: &Value,
) -> Result<Value, HandlerErr> {
    let semesters = params
        .get("semesters")
        .cloned()
        .ok_or_else(|| HandlerErr::bad_params("missing semesters"))?;
    let data: CgpaData = serde_json::from_value(json!({ "semesters": semesters }))
        .map_err(|e| HandlerErr::bad_params(format!("semesters must be semester rows: {e}")))?;

    // Local copy is authoritative for the session; it is written first and
    // kept even when the remote mirror fails.
    let filtered = data.filtered_for_save();
    store::settings_set_json(conn, store::KEY_CGPA_DATA, &filtered)?;

    let mut saved_remote = false;
    if let Some(token) = session.token().map(str::to_string) {
        match remote.save_cgpa(&token, &filtered) {
            Ok(()) => saved_remote = true,
            Err(e) => {
                if e.is_unauthorized() {
                    session.clear(conn)?;
                }
                tracing::warn!(error = %e, "cgpa remote save failed, local copy kept");
            }
        }
    }

    Ok(json!({ "semesters": filtered.semesters, "savedRemote": saved_remote }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "sgpa.compute" => Some(match sgpa_compute(&req.params) {
            Ok(result) => ok(&req.id, result),
            Err(e) => e.response(&req.id),
        }),
        "cgpa.compute" => Some(match cgpa_compute(&req.params) {
            Ok(result) => ok(&req.id, result),
            Err(e) => e.response(&req.id),
        }),
        "cgpa.predict" => Some(match cgpa_predict(&req.params) {
            Ok(result) => ok(&req.id, result),
            Err(e) => e.response(&req.id),
        }),
        "cgpa.load" | "cgpa.save" => {
            let AppState {
                db,
                session,
                remote,
                ..
            } = state;
            let Some(conn) = db.as_ref() else {
                return Some(err(&req.id, "no_workspace", "select a workspace first", None));
            };
            let outcome = if req.method == "cgpa.load" {
                cgpa_load(conn, session, remote)
            } else {
                cgpa_save(conn, session, remote, &req.params)
            };
            Some(match outcome {
                Ok(result) => ok(&req.id, result),
                Err(e) => e.response(&req.id),
            })
        }
        _ => None,
    }
}
