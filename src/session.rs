use rusqlite::Connection;
use serde_json::Value;

use crate::remote::RemoteClient;
use crate::store;

/// Explicit auth context: token plus cached user profile, mirrored to the
/// local store. Passed by reference through `AppState`; there is no ambient
/// session state anywhere else. The profile itself stays an opaque JSON
/// value; the daemon never interprets it.
#[derive(Debug, Default)]
pub struct Session {
    token: Option<String>,
    user: Option<Value>,
}

impl Session {
    /// Restore a persisted session from the workspace store. A user blob
    /// without a token is stale and ignored.
    pub fn init(conn: &Connection) -> Self {
        let token: Option<String> =
            store::settings_get_json(conn, store::KEY_AUTH_TOKEN).unwrap_or_default();
        if token.is_none() {
            return Self::default();
        }
        let user: Option<Value> =
            store::settings_get_json(conn, store::KEY_AUTH_USER).unwrap_or_default();
        Self { token, user }
    }

    pub fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn user(&self) -> Option<&Value> {
        self.user.as_ref()
    }

    /// Adopt freshly issued credentials and persist them.
    pub fn login(&mut self, conn: &Connection, token: String, user: Value) -> anyhow::Result<()> {
        store::settings_set_json(conn, store::KEY_AUTH_TOKEN, &token)?;
        store::settings_set_json(conn, store::KEY_AUTH_USER, &user)?;
        self.token = Some(token);
        self.user = Some(user);
        Ok(())
    }

    /// Best-effort server-side logout, then an unconditional local clear.
    pub fn logout(&mut self, conn: &Connection, remote: &RemoteClient) -> anyhow::Result<()> {
        if let Some(token) = &self.token {
            if let Err(e) = remote.logout(token) {
                tracing::warn!(error = %e, "logout request failed, clearing locally anyway");
            }
        }
        self.clear(conn)
    }

    /// Re-validate the cached credentials against the backend. Any failure
    /// clears the session, matching the "token invalid, drop it" startup
    /// behaviour; `None` means the caller is now logged out.
    pub fn refresh(
        &mut self,
        conn: &Connection,
        remote: &RemoteClient,
    ) -> anyhow::Result<Option<Value>> {
        let Some(token) = self.token.clone() else {
            return Ok(None);
        };
        match remote.current_user(&token) {
            Ok(user) => {
                store::settings_set_json(conn, store::KEY_AUTH_USER, &user)?;
                self.user = Some(user.clone());
                Ok(Some(user))
            }
            Err(e) => {
                tracing::info!(error = %e, "session no longer valid, clearing");
                self.clear(conn)?;
                Ok(None)
            }
        }
    }

    /// Drop cached credentials. Idempotent, so a 401 arriving when already
    /// logged out cannot start a clear/redirect loop.
    pub fn clear(&mut self, conn: &Connection) -> anyhow::Result<()> {
        if self.token.is_none() && self.user.is_none() {
            return Ok(());
        }
        store::settings_delete(conn, store::KEY_AUTH_TOKEN)?;
        store::settings_delete(conn, store::KEY_AUTH_USER)?;
        self.token = None;
        self.user = None;
        Ok(())
    }
}
