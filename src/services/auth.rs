use std::sync::{Arc, Mutex};

use base64::Engine;
use hmac::{Hmac, Mac};
use rusqlite::Connection;
use sha1::{Digest, Sha1};
use uuid::Uuid;

use crate::db::queries;
use crate::errors::AppError;
use crate::models::{Actor, Role};

/// Resolves a bearer credential to the caller. Issuing credentials is someone else's job.
pub trait AuthProvider: Send + Sync {
    fn authenticate(&self, token: &str) -> Result<Option<Actor>, AppError>;
}

/// Sessions are stored by digest only, so a leaked database does not leak live tokens.
pub fn hash_token(token: &str) -> String {
    let digest = Sha1::digest(token.as_bytes());
    base64::engine::general_purpose::STANDARD.encode(digest)
}

/// Opens (or replaces) the session for one device and returns the raw bearer token.
pub fn create_session(
    conn: &Connection,
    user_id: &str,
    device_id: &str,
    role: Role,
) -> anyhow::Result<String> {
    let token = format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple());
    queries::upsert_session(conn, user_id, device_id, role, &hash_token(&token))?;
    tracing::info!(user_id, device_id, "session opened");
    Ok(token)
}

pub fn invalidate_session(conn: &Connection, user_id: &str, device_id: &str) -> anyhow::Result<bool> {
    let removed = queries::delete_session(conn, user_id, device_id)?;
    if removed {
        tracing::info!(user_id, device_id, "session invalidated");
    }
    Ok(removed)
}

pub fn invalidate_all(conn: &Connection, user_id: &str) -> anyhow::Result<usize> {
    let removed = queries::delete_user_sessions(conn, user_id)?;
    tracing::info!(user_id, removed, "all sessions invalidated");
    Ok(removed)
}

pub const BOOTSTRAP_ADMIN_ID: &str = "admin";

type HmacSha1 = Hmac<Sha1>;

const ADMIN_TAG_KEY: &[u8] = b"pitchbook-bootstrap-admin";

fn admin_mac(token: &str) -> Option<HmacSha1> {
    let mut mac = HmacSha1::new_from_slice(ADMIN_TAG_KEY).ok()?;
    Mac::update(&mut mac, token.as_bytes());
    Some(mac)
}

/// Looks tokens up in the `sessions` table; the configured admin token maps to a built-in admin.
pub struct SessionAuth {
    db: Arc<Mutex<Connection>>,
    /// MAC of the bootstrap token, `None` when no token is configured.
    admin_tag: Option<Vec<u8>>,
}

impl SessionAuth {
    pub fn new(db: Arc<Mutex<Connection>>, admin_token: String) -> Self {
        let admin_tag = if admin_token.is_empty() {
            None
        } else {
            admin_mac(&admin_token).map(|mac| mac.finalize().into_bytes().to_vec())
        };
        Self { db, admin_tag }
    }

    // verify_slice compares in constant time.
    fn is_admin_token(&self, token: &str) -> bool {
        match (&self.admin_tag, admin_mac(token)) {
            (Some(tag), Some(mac)) => mac.verify_slice(tag).is_ok(),
            _ => false,
        }
    }
}

impl AuthProvider for SessionAuth {
    fn authenticate(&self, token: &str) -> Result<Option<Actor>, AppError> {
        if token.is_empty() {
            return Ok(None);
        }
        if self.is_admin_token(token) {
            return Ok(Some(Actor {
                user_id: BOOTSTRAP_ADMIN_ID.to_string(),
                role: Role::Admin,
                device_id: None,
            }));
        }

        let hash = hash_token(token);
        let db = self
            .db
            .lock()
            .map_err(|_| AppError::Internal(anyhow::anyhow!("database mutex poisoned")))?;
        let Some(session) = queries::find_session(&db, &hash)? else {
            return Ok(None);
        };
        if let Err(e) = queries::touch_session(&db, &hash) {
            tracing::warn!(error = %e, "failed to record session activity");
        }

        Ok(Some(Actor {
            user_id: session.user_id,
            role: session.role,
            device_id: Some(session.device_id),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    fn setup() -> (Arc<Mutex<Connection>>, SessionAuth) {
        let conn = Arc::new(Mutex::new(db::init_db(":memory:").unwrap()));
        let auth = SessionAuth::new(Arc::clone(&conn), "root-token".to_string());
        (conn, auth)
    }

    #[test]
    fn test_hash_is_stable_and_not_the_token() {
        assert_eq!(hash_token("abc"), hash_token("abc"));
        assert_ne!(hash_token("abc"), "abc");
        assert_ne!(hash_token("abc"), hash_token("abd"));
    }

    #[test]
    fn test_admin_token_bootstrap() {
        let (_, auth) = setup();
        let actor = auth.authenticate("root-token").unwrap().unwrap();
        assert!(actor.is_admin());
        assert!(actor.device_id.is_none());
        assert!(auth.authenticate("").unwrap().is_none());
        assert!(auth.authenticate("guess").unwrap().is_none());
        assert!(auth.authenticate("root-toke").unwrap().is_none());
        assert!(auth.authenticate("root-token ").unwrap().is_none());
    }

    #[test]
    fn test_empty_admin_token_disables_bootstrap() {
        let conn = Arc::new(Mutex::new(db::init_db(":memory:").unwrap()));
        let auth = SessionAuth::new(conn, String::new());
        assert!(auth.authenticate("changeme").unwrap().is_none());
        assert!(auth.authenticate("admin").unwrap().is_none());
    }

    #[test]
    fn test_session_token_resolves_to_actor() {
        let (conn, auth) = setup();
        let token = {
            let db = conn.lock().unwrap();
            create_session(&db, "u-7", "phone", Role::User).unwrap()
        };

        let actor = auth.authenticate(&token).unwrap().unwrap();
        assert_eq!(actor.user_id, "u-7");
        assert_eq!(actor.role, Role::User);
        assert_eq!(actor.device_id.as_deref(), Some("phone"));
    }

    #[test]
    fn test_relogin_only_replaces_same_device() {
        let (conn, auth) = setup();
        let (phone_old, laptop, phone_new) = {
            let db = conn.lock().unwrap();
            let phone_old = create_session(&db, "u-7", "phone", Role::User).unwrap();
            let laptop = create_session(&db, "u-7", "laptop", Role::User).unwrap();
            let phone_new = create_session(&db, "u-7", "phone", Role::User).unwrap();
            (phone_old, laptop, phone_new)
        };

        assert!(auth.authenticate(&phone_old).unwrap().is_none());
        assert!(auth.authenticate(&laptop).unwrap().is_some());
        assert!(auth.authenticate(&phone_new).unwrap().is_some());

        {
            let db = conn.lock().unwrap();
            assert!(invalidate_session(&db, "u-7", "laptop").unwrap());
        }
        assert!(auth.authenticate(&laptop).unwrap().is_none());

        {
            let db = conn.lock().unwrap();
            assert_eq!(invalidate_all(&db, "u-7").unwrap(), 1);
        }
        assert!(auth.authenticate(&phone_new).unwrap().is_none());
    }
}
