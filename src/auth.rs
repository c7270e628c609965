//! Credential check backed by a configuration file.
//!
//! The file is a JSON array of
//! `{ "user", "password_sha256", "display_name", "role" }` entries. Plain
//! passwords are never stored or logged.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::{Digest, Sha256};

use crate::logging::{log, obj, ts_now, v_str, Domain, Level};

#[derive(Debug, Clone, Deserialize)]
struct CredentialEntry {
    user: String,
    password_sha256: String,
    display_name: String,
    role: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Session {
    pub user: String,
    pub display_name: String,
    pub role: String,
    pub started_at: String,
}

#[derive(Debug, Clone, Default)]
pub struct CredentialStore {
    entries: Vec<CredentialEntry>,
}

pub fn password_digest(password: &str) -> String {
    hex::encode(Sha256::digest(password.as_bytes()))
}

impl CredentialStore {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        let entries: Vec<CredentialEntry> =
            serde_json::from_str(text).context("parsing credential store")?;
        Ok(Self { entries })
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading credential store {}", path.display()))?;
        Self::from_json_str(&text)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn login(&self, user: &str, password: &str) -> Option<Session> {
        let digest = password_digest(password);
        let entry = self
            .entries
            .iter()
            .find(|e| e.user == user && e.password_sha256.eq_ignore_ascii_case(&digest));

        match entry {
            Some(e) => {
                log(
                    Level::Info,
                    Domain::Auth,
                    "login_ok",
                    obj(&[("user", v_str(user)), ("role", v_str(&e.role))]),
                );
                Some(Session {
                    user: e.user.clone(),
                    display_name: e.display_name.clone(),
                    role: e.role.clone(),
                    started_at: ts_now(),
                })
            }
            None => {
                log(
                    Level::Warn,
                    Domain::Auth,
                    "login_refused",
                    obj(&[
                        ("user", v_str(user)),
                        ("store_entries", json!(self.entries.len())),
                    ]),
                );
                None
            }
        }
    }
}
