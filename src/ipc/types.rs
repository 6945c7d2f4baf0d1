use std::path::PathBuf;

use rusqlite::Connection;
use serde::Deserialize;

use crate::gesture::TapResolver;
use crate::ledger::Course;
use crate::remote::RemoteClient;
use crate::session::Session;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub db: Option<Connection>,
    pub session: Session,
    pub remote: RemoteClient,
    /// Cached mirror of the course list; replaced wholesale on fetch and
    /// patched with the server echo after each mutation.
    pub courses: Vec<Course>,
    pub taps: TapResolver,
}

impl AppState {
    pub fn new(remote: RemoteClient) -> Self {
        Self {
            workspace: None,
            db: None,
            session: Session::default(),
            remote,
            courses: Vec::new(),
            taps: TapResolver::new(),
        }
    }
}
