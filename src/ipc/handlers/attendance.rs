use chrono::{Datelike, NaiveDate};
use rusqlite::Connection;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::calendar::{self, DayClass};
use crate::gesture::{Press, TapCommit, TapKey, TapResolver};
use crate::ipc::error::{err, ok, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::ledger::{Course, MarkStatus};
use crate::remote::{RemoteClient, RemoteError};
use crate::session::Session;
use crate::store;

/// Display colors handed out round-robin when a new course omits one.
const COURSE_COLORS: [&str; 8] = [
    "#8B5CF6", "#EC4899", "#10B981", "#F59E0B", "#3B82F6", "#EF4444", "#6366F1", "#D946EF",
];

struct Ctx<'a> {
    conn: &'a Connection,
    session: &'a mut Session,
    remote: &'a RemoteClient,
    courses: &'a mut Vec<Course>,
    taps: &'a mut TapResolver,
}

fn get_required_str(params: &Value, key: &str) -> Result<String, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {key}")))
}

fn parse_date(params: &Value, key: &str) -> Result<NaiveDate, HandlerErr> {
    let raw = get_required_str(params, key)?;
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|_| HandlerErr::bad_params(format!("{key} must be YYYY-MM-DD")))
}

fn parse_status(params: &Value) -> Result<MarkStatus, HandlerErr> {
    let raw = params
        .get("status")
        .cloned()
        .ok_or_else(|| HandlerErr::bad_params("missing status"))?;
    serde_json::from_value(raw)
        .map_err(|_| HandlerErr::bad_params("status must be 'attended' or 'missed'"))
}

fn parse_at_ms(params: &Value) -> Result<u64, HandlerErr> {
    params
        .get("atMs")
        .and_then(|v| v.as_u64())
        .ok_or_else(|| HandlerErr::bad_params("missing atMs"))
}

fn map_remote_err(ctx: &mut Ctx<'_>, e: RemoteError) -> HandlerErr {
    if e.is_unauthorized() {
        if let Err(se) = ctx.session.clear(ctx.conn) {
            return se.into();
        }
        HandlerErr::new("unauthorized", "session expired, sign in again")
    } else {
        HandlerErr::new("remote_unavailable", e.to_string())
    }
}

fn offline_courses(conn: &Connection) -> Result<Vec<Course>, HandlerErr> {
    Ok(store::settings_get_json(conn, store::KEY_COURSES)?.unwrap_or_default())
}

fn save_offline_courses(conn: &Connection, list: &[Course]) -> Result<(), HandlerErr> {
    store::settings_set_json(conn, store::KEY_COURSES, &list)?;
    Ok(())
}

/// Authenticated: the server list replaces the cache wholesale. Otherwise
/// (including right after an expiry-triggered session clear) the offline
/// ledger in the workspace store backs the same view.
fn load_courses(ctx: &mut Ctx<'_>) -> Result<Vec<Course>, HandlerErr> {
    if let Some(token) = ctx.session.token().map(str::to_string) {
        match ctx.remote.fetch_courses(&token) {
            Ok(list) => {
                *ctx.courses = list.clone();
                return Ok(list);
            }
            Err(e) if e.is_unauthorized() => {
                ctx.session.clear(ctx.conn)?;
                tracing::info!("session expired, serving offline course list");
            }
            Err(e) => return Err(HandlerErr::new("remote_unavailable", e.to_string())),
        }
    }
    let list = offline_courses(ctx.conn)?;
    *ctx.courses = list.clone();
    Ok(list)
}

fn list_courses(ctx: &mut Ctx<'_>) -> Result<Value, HandlerErr> {
    let list = load_courses(ctx)?;
    Ok(json!({ "courses": list }))
}

fn add_course(ctx: &mut Ctx<'_>, params: &Value) -> Result<Value, HandlerErr> {
    let name = get_required_str(params, "name")?;
    let name = name.trim().to_string();
    if name.is_empty() {
        return Err(HandlerErr::bad_params("course name must not be blank"));
    }
    let existing = load_courses(ctx)?;
    let color = params
        .get("color")
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .unwrap_or_else(|| COURSE_COLORS[existing.len() % COURSE_COLORS.len()].to_string());

    if let Some(token) = ctx.session.token().map(str::to_string) {
        match ctx.remote.add_course(&token, &name, &color) {
            Ok(course) => {
                ctx.courses.push(course.clone());
                return Ok(serde_json::to_value(course).unwrap_or_default());
            }
            Err(e) => return Err(map_remote_err(ctx, e)),
        }
    }

    let course = Course::new(format!("course-{}", Uuid::new_v4()), name, color);
    let mut list = existing;
    list.push(course.clone());
    save_offline_courses(ctx.conn, &list)?;
    *ctx.courses = list;
    Ok(serde_json::to_value(course).unwrap_or_default())
}

fn delete_course(ctx: &mut Ctx<'_>, params: &Value) -> Result<Value, HandlerErr> {
    let course_id = get_required_str(params, "courseId")?;

    if let Some(token) = ctx.session.token().map(str::to_string) {
        match ctx.remote.delete_course(&token, &course_id) {
            Ok(()) => {
                ctx.courses.retain(|c| c.id != course_id);
                return Ok(json!({ "ok": true }));
            }
            Err(e) => return Err(map_remote_err(ctx, e)),
        }
    }

    let mut list = offline_courses(ctx.conn)?;
    let before = list.len();
    list.retain(|c| c.id != course_id);
    if list.len() == before {
        return Err(HandlerErr::not_found("course not found"));
    }
    save_offline_courses(ctx.conn, &list)?;
    *ctx.courses = list;
    Ok(json!({ "ok": true }))
}

/// The one mutation path for a day's status. Future dates are rejected here
/// as well as at the tap layer. Authenticated marks trust only the server's
/// echoed Course; the local cache is never mutated speculatively.
fn perform_mark(
    ctx: &mut Ctx<'_>,
    course_id: &str,
    date: NaiveDate,
    status: MarkStatus,
) -> Result<Course, HandlerErr> {
    if date > calendar::today() {
        return Err(HandlerErr::bad_params("cannot mark a date after today"));
    }

    if let Some(token) = ctx.session.token().map(str::to_string) {
        match ctx.remote.mark_attendance(&token, course_id, date, status) {
            Ok(echo) => {
                if !echo.sets_disjoint() {
                    tracing::warn!(course = course_id, "server returned overlapping day sets");
                }
                match ctx.courses.iter_mut().find(|c| c.id == course_id) {
                    Some(slot) => *slot = echo.clone(),
                    None => ctx.courses.push(echo.clone()),
                }
                return Ok(echo);
            }
            Err(e) => return Err(map_remote_err(ctx, e)),
        }
    }

    let mut list = offline_courses(ctx.conn)?;
    let Some(course) = list.iter_mut().find(|c| c.id == course_id) else {
        return Err(HandlerErr::not_found("course not found"));
    };
    course.apply_mark(date, status);
    let updated = course.clone();
    save_offline_courses(ctx.conn, &list)?;
    *ctx.courses = list;
    Ok(updated)
}

fn mark(ctx: &mut Ctx<'_>, params: &Value) -> Result<Value, HandlerErr> {
    let course_id = get_required_str(params, "courseId")?;
    let date = parse_date(params, "date")?;
    let status = parse_status(params)?;
    let course = perform_mark(ctx, &course_id, date, status)?;
    let percentage = course.percentage();
    Ok(json!({ "course": course, "percentage": percentage }))
}

fn summary(ctx: &mut Ctx<'_>, params: &Value) -> Result<Value, HandlerErr> {
    let course_id = get_required_str(params, "courseId")?;
    let list = load_courses(ctx)?;
    let Some(course) = list.iter().find(|c| c.id == course_id) else {
        return Err(HandlerErr::not_found("course not found"));
    };
    Ok(json!({
        "courseId": course.id,
        "name": course.name,
        "color": course.color,
        "attendedCount": course.attended_days.len(),
        "missedCount": course.missed_days.len(),
        "percentage": course.percentage(),
    }))
}

fn month_grid(params: &Value) -> Result<Value, HandlerErr> {
    let year = params
        .get("year")
        .and_then(|v| v.as_i64())
        .and_then(|v| i32::try_from(v).ok())
        .ok_or_else(|| HandlerErr::bad_params("year must be a 32-bit integer"))?;
    let month = params
        .get("month")
        .and_then(|v| v.as_u64())
        .and_then(|v| u32::try_from(v).ok())
        .ok_or_else(|| HandlerErr::bad_params("month must be 1-12"))?;

    let Some(grid) = calendar::build_month_grid(year, month) else {
        return Err(HandlerErr::bad_params("month out of range"));
    };
    let today = calendar::today();

    let weeks: Vec<Value> = grid
        .iter()
        .map(|week| {
            week.iter()
                .map(|cell| match cell {
                    None => Value::Null,
                    Some(date) => {
                        let class = DayClass::of(*date, today);
                        json!({
                            "date": calendar::iso(*date),
                            "day": date.day(),
                            "class": class,
                            "markable": class.accepts_marking(),
                        })
                    }
                })
                .collect::<Vec<_>>()
                .into()
        })
        .collect();

    Ok(json!({
        "year": year,
        "month": month,
        "today": calendar::iso(today),
        "weeks": weeks,
    }))
}

fn commit_entry(ctx: &mut Ctx<'_>, commit: TapCommit) -> Result<Value, HandlerErr> {
    let TapCommit { key, status } = commit;
    let course = perform_mark(ctx, &key.course_id, key.date, status)?;
    Ok(json!({
        "courseId": key.course_id,
        "date": calendar::iso(key.date),
        "status": status,
        "course": course,
    }))
}

fn tap(ctx: &mut Ctx<'_>, params: &Value) -> Result<Value, HandlerErr> {
    let course_id = get_required_str(params, "courseId")?;
    let date = parse_date(params, "date")?;
    let at_ms = parse_at_ms(params)?;

    // Future cells take no interaction at all; the tap is swallowed before
    // it can arm or cancel anything.
    if !DayClass::of(date, calendar::today()).accepts_marking() {
        return Ok(json!({ "ignored": true, "committed": [], "pendingDeadlineMs": null }));
    }

    let mut committed = Vec::new();
    if let Some(stale) = ctx.taps.elapsed(at_ms) {
        committed.push(commit_entry(ctx, stale)?);
    }

    let key = TapKey { course_id, date };
    let mut pending_deadline = None;
    match ctx.taps.press(key, at_ms) {
        Press::Commit(commit) => committed.push(commit_entry(ctx, commit)?),
        Press::Armed { deadline_ms } => pending_deadline = Some(deadline_ms),
    }

    Ok(json!({
        "ignored": false,
        "committed": committed,
        "pendingDeadlineMs": pending_deadline,
    }))
}

fn tap_elapsed(ctx: &mut Ctx<'_>, params: &Value) -> Result<Value, HandlerErr> {
    let at_ms = parse_at_ms(params)?;
    let mut committed = Vec::new();
    if let Some(commit) = ctx.taps.elapsed(at_ms) {
        committed.push(commit_entry(ctx, commit)?);
    }
    Ok(json!({ "committed": committed }))
}

fn tap_cancel(ctx: &mut Ctx<'_>) -> Result<Value, HandlerErr> {
    ctx.taps.cancel();
    Ok(json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    if !req.method.starts_with("attendance.") {
        return None;
    }
    let AppState {
        db,
        session,
        remote,
        courses,
        taps,
        ..
    } = state;
    let Some(conn) = db.as_ref() else {
        return Some(err(&req.id, "no_workspace", "select a workspace first", None));
    };
    let mut ctx = Ctx {
        conn,
        session,
        remote,
        courses,
        taps,
    };

    let outcome = match req.method.as_str() {
        "attendance.listCourses" => list_courses(&mut ctx),
        "attendance.addCourse" => add_course(&mut ctx, &req.params),
        "attendance.deleteCourse" => delete_course(&mut ctx, &req.params),
        "attendance.mark" => mark(&mut ctx, &req.params),
        "attendance.summary" => summary(&mut ctx, &req.params),
        "attendance.monthGrid" => month_grid(&req.params),
        "attendance.tap" => tap(&mut ctx, &req.params),
        "attendance.tapElapsed" => tap_elapsed(&mut ctx, &req.params),
        "attendance.tapCancel" => tap_cancel(&mut ctx),
        _ => return None,
    };

    Some(match outcome {
        Ok(result) => ok(&req.id, result),
        Err(e) => e.response(&req.id),
    })
}
