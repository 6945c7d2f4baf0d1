use serde_json::{json, Value};

use crate::ipc::error::{err, ok, HandlerErr};
use crate::ipc::types::{AppState, Request};

fn get_required_str(params: &Value, key: &str) -> Result<String, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {key}")))
}

fn handle_login(state: &mut AppState, req: &Request) -> serde_json::Value {
    let AppState {
        db,
        session,
        remote,
        ..
    } = state;
    let Some(conn) = db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let creds = get_required_str(&req.params, "email")
        .and_then(|email| get_required_str(&req.params, "password").map(|pw| (email, pw)));
    let (email, password) = match creds {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };

    match remote.login(&email, &password) {
        Ok(resp) => {
            let user = resp.user.clone();
            if let Err(e) = session.login(conn, resp.token, resp.user) {
                return err(&req.id, "store_failed", e.to_string(), None);
            }
            ok(&req.id, json!({ "user": user }))
        }
        Err(e) => err(&req.id, "login_failed", e.to_string(), None),
    }
}

fn handle_logout(state: &mut AppState, req: &Request) -> serde_json::Value {
    let AppState {
        db,
        session,
        remote,
        courses,
        ..
    } = state;
    let Some(conn) = db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    if let Err(e) = session.logout(conn, remote) {
        return err(&req.id, "store_failed", e.to_string(), None);
    }
    courses.clear();
    ok(&req.id, json!({ "authenticated": false }))
}

fn handle_refresh(state: &mut AppState, req: &Request) -> serde_json::Value {
    let AppState {
        db,
        session,
        remote,
        ..
    } = state;
    let Some(conn) = db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match session.refresh(conn, remote) {
        Ok(user) => ok(
            &req.id,
            json!({
                "authenticated": session.is_authenticated(),
                "user": user,
            }),
        ),
        Err(e) => err(&req.id, "store_failed", e.to_string(), None),
    }
}

fn handle_current(state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(
        &req.id,
        json!({
            "authenticated": state.session.is_authenticated(),
            "user": state.session.user(),
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "session.login" => Some(handle_login(state, req)),
        "session.logout" => Some(handle_logout(state, req)),
        "session.refresh" => Some(handle_refresh(state, req)),
        "session.current" => Some(handle_current(state, req)),
        _ => None,
    }
}
