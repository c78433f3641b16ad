use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::api::http::TokenPair;

/// Tokens saved by `tb login` (written to session.json)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub access: String,
    #[serde(default)]
    pub refresh: String,
    /// Who logged in, for display only
    #[serde(default)]
    pub username: Option<String>,
}

impl Session {
    pub fn from_tokens(tokens: TokenPair, username: &str) -> Self {
        Session {
            access: tokens.access,
            refresh: tokens.refresh,
            username: Some(username.to_string()),
        }
    }
}

pub fn session_path(dir: &Path) -> PathBuf {
    dir.join("session.json")
}

/// A missing or unreadable session reads as logged out.
pub fn read_session(dir: &Path) -> Option<Session> {
    let content = fs::read_to_string(session_path(dir)).ok()?;
    serde_json::from_str(&content).ok()
}

pub fn write_session(dir: &Path, session: &Session) -> io::Result<()> {
    fs::create_dir_all(dir)?;
    let content = serde_json::to_string_pretty(session)?;
    super::atomic_write(&session_path(dir), content.as_bytes())
}

/// Returns whether a session existed.
pub fn clear_session(dir: &Path) -> io::Result<bool> {
    match fs::remove_file(session_path(dir)) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn session() -> Session {
        Session::from_tokens(
            TokenPair {
                access: "a.b.c".into(),
                refresh: "r.s.t".into(),
            },
            "ana",
        )
    }

    #[test]
    fn write_read_clear() {
        let dir = TempDir::new().unwrap();
        write_session(dir.path(), &session()).unwrap();
        assert_eq!(read_session(dir.path()), Some(session()));
        assert!(clear_session(dir.path()).unwrap());
        assert!(read_session(dir.path()).is_none());
        assert!(!clear_session(dir.path()).unwrap());
    }

    #[test]
    fn malformed_session_reads_as_none() {
        let dir = TempDir::new().unwrap();
        fs::write(session_path(dir.path()), "{ nope").unwrap();
        assert!(read_session(dir.path()).is_none());
    }

    #[test]
    fn refresh_and_username_are_optional() {
        let s: Session = serde_json::from_str(r#"{"access":"tok"}"#).unwrap();
        assert_eq!(s.access, "tok");
        assert_eq!(s.refresh, "");
        assert!(s.username.is_none());
    }
}
