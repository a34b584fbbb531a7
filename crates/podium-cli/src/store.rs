//! Session persistence on disk.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use podium_client_core::auth::{AuthSession, SessionStore};

const SESSION_SCHEMA_VERSION: u32 = 1;
const SESSION_FILE_NAME: &str = "podium-session.v1.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SessionDocument {
    version: u32,
    session: AuthSession,
}

/// One JSON file holding the current login. An unreadable or
/// wrong-version file reads back as logged out rather than failing.
#[derive(Debug, Clone)]
pub struct FileSessionStore {
    path: PathBuf,
}

impl FileSessionStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn default_path() -> PathBuf {
        if let Some(mut data_dir) = dirs::data_local_dir() {
            data_dir.push("podium");
            data_dir.push(SESSION_FILE_NAME);
            return data_dir;
        }

        if let Some(mut home_dir) = dirs::home_dir() {
            home_dir.push(".podium");
            home_dir.push(SESSION_FILE_NAME);
            return home_dir;
        }

        PathBuf::from(SESSION_FILE_NAME)
    }
}

impl SessionStore for FileSessionStore {
    type Error = String;

    fn load_session(&self) -> Result<Option<AuthSession>, Self::Error> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(_) => return Ok(None),
        };
        let parsed = serde_json::from_str::<SessionDocument>(raw.as_str());
        if let Ok(document) = parsed
            && document.version == SESSION_SCHEMA_VERSION
        {
            return Ok(Some(document.session));
        }
        Ok(None)
    }

    fn persist_session(&self, session: &AuthSession) -> Result<(), Self::Error> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|error| format!("session mkdir failed: {error}"))?;
        }
        let encoded = serde_json::to_string_pretty(&SessionDocument {
            version: SESSION_SCHEMA_VERSION,
            session: session.clone(),
        })
        .map_err(|error| format!("session encode failed: {error}"))?;
        fs::write(&self.path, encoded).map_err(|error| format!("session write failed: {error}"))
    }

    fn clear_session(&self) -> Result<(), Self::Error> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(error) => Err(format!("session clear failed: {error}")),
        }
    }
}
