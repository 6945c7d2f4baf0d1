use std::time::Duration;

use chrono::NaiveDate;
use reqwest::blocking::Client;
use reqwest::Method;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::calendar;
use crate::ledger::{CgpaData, Course, MarkStatus};

pub const DEFAULT_API_URL: &str = "http://localhost:5001/api";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{message} (HTTP {status})")]
    Api { status: u16, message: String },
    #[error("malformed response payload: {0}")]
    Decode(#[from] serde_json::Error),
}

impl RemoteError {
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, RemoteError::Api { status: 401, .. })
    }
}

/// Every endpoint answers with this JSON envelope.
#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    message: String,
    #[serde(default)]
    data: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginResponse {
    pub user: Value,
    pub token: String,
}

/// Blocking client for the community-site backend. The backend is opaque:
/// everything goes through the envelope and comes back as typed data or a
/// `RemoteError`.
pub struct RemoteClient {
    base_url: String,
    http: Client,
}

/// Map an HTTP status plus (possibly absent) envelope body onto the caller's
/// view: success yields the `data` payload, anything else a typed error.
fn interpret(status: u16, body: Option<Envelope>) -> Result<Value, RemoteError> {
    let ok = (200..300).contains(&status);
    match body {
        Some(envelope) => {
            if ok && envelope.success {
                Ok(envelope.data.unwrap_or(Value::Null))
            } else {
                let message = if envelope.message.is_empty() {
                    format!("An unexpected error occurred (HTTP {status}).")
                } else {
                    envelope.message
                };
                Err(RemoteError::Api { status, message })
            }
        }
        // 204-style success carries no envelope at all.
        None if ok => Ok(Value::Null),
        None => Err(RemoteError::Api {
            status,
            message: format!("An unexpected error occurred (HTTP {status})."),
        }),
    }
}

impl RemoteClient {
    pub fn new(base_url: impl Into<String>) -> anyhow::Result<Self> {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        let http = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self { base_url, http })
    }

    pub fn from_env() -> anyhow::Result<Self> {
        let base = std::env::var("CAMPUSD_API_URL").unwrap_or_else(|_| DEFAULT_API_URL.to_string());
        Self::new(base)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn call(
        &self,
        method: Method,
        path: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> Result<Value, RemoteError> {
        let url = format!("{}{}", self.base_url, path);
        let mut req = self
            .http
            .request(method, url)
            .header(reqwest::header::ACCEPT, "application/json");
        if let Some(t) = token {
            req = req.bearer_auth(t);
        }
        if let Some(b) = &body {
            req = req.json(b);
        }
        let resp = req.send()?;
        let status = resp.status().as_u16();
        let is_json = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.contains("application/json"))
            .unwrap_or(false);
        let envelope = if is_json { resp.json::<Envelope>().ok() } else { None };
        interpret(status, envelope)
    }

    pub fn fetch_courses(&self, token: &str) -> Result<Vec<Course>, RemoteError> {
        let data = self.call(Method::GET, "/attendance/courses", Some(token), None)?;
        Ok(serde_json::from_value(data)?)
    }

    pub fn add_course(&self, token: &str, name: &str, color: &str) -> Result<Course, RemoteError> {
        let data = self.call(
            Method::POST,
            "/attendance/courses",
            Some(token),
            Some(json!({ "name": name, "color": color })),
        )?;
        Ok(serde_json::from_value(data)?)
    }

    pub fn delete_course(&self, token: &str, course_id: &str) -> Result<(), RemoteError> {
        self.call(
            Method::DELETE,
            &format!("/attendance/courses/{course_id}"),
            Some(token),
            None,
        )?;
        Ok(())
    }

    /// The server's echoed Course is the post-mutation source of truth.
    pub fn mark_attendance(
        &self,
        token: &str,
        course_id: &str,
        date: NaiveDate,
        status: MarkStatus,
    ) -> Result<Course, RemoteError> {
        let data = self.call(
            Method::PATCH,
            &format!("/attendance/courses/{course_id}/mark"),
            Some(token),
            Some(json!({ "date": calendar::iso(date), "status": status })),
        )?;
        Ok(serde_json::from_value(data)?)
    }

    pub fn fetch_cgpa(&self, token: &str) -> Result<CgpaData, RemoteError> {
        let data = self.call(Method::GET, "/cgpa", Some(token), None)?;
        if data.is_null() {
            return Ok(CgpaData::default());
        }
        Ok(serde_json::from_value(data)?)
    }

    pub fn save_cgpa(&self, token: &str, data: &CgpaData) -> Result<(), RemoteError> {
        self.call(
            Method::POST,
            "/cgpa",
            Some(token),
            Some(serde_json::to_value(data)?),
        )?;
        Ok(())
    }

    pub fn login(&self, email: &str, password: &str) -> Result<LoginResponse, RemoteError> {
        let data = self.call(
            Method::POST,
            "/auth/login",
            None,
            Some(json!({ "email": email, "password": password })),
        )?;
        Ok(serde_json::from_value(data)?)
    }

    pub fn logout(&self, token: &str) -> Result<(), RemoteError> {
        self.call(Method::POST, "/auth/logout", Some(token), None)?;
        Ok(())
    }

    pub fn current_user(&self, token: &str) -> Result<Value, RemoteError> {
        self.call(Method::GET, "/user/me", Some(token), None)
    }
}
