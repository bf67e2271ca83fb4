//! Durable persistence of the current identity across reloads.
//!
//! A `SessionStore` reads and writes one serialized `Identity` under a fixed key of a
//! `SessionBackend`, the server-side stand-in for browser local storage. Stored payloads
//! that fail to parse (including unknown roles) are treated as absent and removed.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use base64::Engine;
use parking_lot::Mutex;
use tracing::{debug, warn};

use super::principal::Identity;
use crate::error::AuthError;
use crate::tprintln;

/// Storage key holding the serialized identity.
pub const SESSION_KEY: &str = "hackathon_user";

/// String key/value storage scoped to one browser profile (or a namespace of one).
pub trait SessionBackend: Send + Sync {
    fn read(&self, key: &str) -> Result<Option<String>, AuthError>;
    fn write(&self, key: &str, value: &str) -> Result<(), AuthError>;
    fn remove(&self, key: &str) -> Result<(), AuthError>;
}

/// Process-local backend; contents vanish with the process.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryBackend {
    pub fn new() -> Self { Self::default() }

    pub fn len(&self) -> usize { self.entries.lock().len() }

    pub fn is_empty(&self) -> bool { self.entries.lock().is_empty() }
}

impl SessionBackend for MemoryBackend {
    fn read(&self, key: &str) -> Result<Option<String>, AuthError> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn write(&self, key: &str, value: &str) -> Result<(), AuthError> {
        self.entries.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), AuthError> {
        self.entries.lock().remove(key);
        Ok(())
    }
}

fn sanitize_filename(s: &str) -> String {
    s.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

/// One JSON file per key under a root directory.
///
/// Writes go to a temp file first and are renamed into place, so a crash mid-write
/// leaves either the old value or the new one.
#[derive(Debug, Clone)]
pub struct FileBackend {
    root: PathBuf,
}

impl FileBackend {
    /// Create a backend rooted at `root`, creating the directory if needed.
    pub fn new<P: AsRef<Path>>(root: P) -> anyhow::Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)
            .map_err(|e| anyhow::anyhow!("failed to create session directory {}: {}", root.display(), e))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path { &self.root }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(format!("{}.json", sanitize_filename(key)))
    }
}

impl SessionBackend for FileBackend {
    fn read(&self, key: &str) -> Result<Option<String>, AuthError> {
        let p = self.path_for(key);
        match fs::read_to_string(&p) {
            Ok(s) => Ok(Some(s)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            // Non-UTF-8 content is garbage to us, not an I/O failure.
            Err(e) if e.kind() == std::io::ErrorKind::InvalidData => Ok(Some(String::new())),
            Err(e) => Err(AuthError::Storage(format!("read {}: {}", p.display(), e))),
        }
    }

    fn write(&self, key: &str, value: &str) -> Result<(), AuthError> {
        let p = self.path_for(key);
        let tmp = p.with_extension("json.tmp");
        fs::write(&tmp, value).map_err(|e| AuthError::Storage(format!("write {}: {}", tmp.display(), e)))?;
        fs::rename(&tmp, &p).map_err(|e| AuthError::Storage(format!("rename {}: {}", p.display(), e)))
    }

    fn remove(&self, key: &str) -> Result<(), AuthError> {
        let p = self.path_for(key);
        match fs::remove_file(&p) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(AuthError::Storage(format!("remove {}: {}", p.display(), e))),
        }
    }
}

#[derive(Clone)]
pub struct SessionStore {
    backend: Arc<dyn SessionBackend>,
    key: String,
}

impl SessionStore {
    pub fn new(backend: Arc<dyn SessionBackend>) -> Self {
        Self { backend, key: SESSION_KEY.to_string() }
    }

    /// Store scoped to one session id, so many sessions can share a backend.
    pub fn namespaced(backend: Arc<dyn SessionBackend>, namespace: &str) -> Self {
        Self { backend, key: format!("{}.{}", namespace, SESSION_KEY) }
    }

    /// Read the persisted identity. Never fails outward: storage errors read as
    /// absence, and a malformed payload is cleared before returning `None`.
    pub fn restore(&self) -> Option<Identity> {
        let raw = match self.backend.read(&self.key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!(target: "hackchain::session", "session restore failed: {}", e);
                return None;
            }
        };
        match parse_identity(&raw) {
            Ok(identity) => {
                tprintln!("session.restore user={}", identity.id);
                Some(identity)
            }
            Err(e) => {
                debug!(target: "hackchain::session", "discarding stored session: {}", e);
                self.clear();
                None
            }
        }
    }

    /// Overwrite the stored identity. Write failures are logged, not returned.
    pub fn persist(&self, identity: &Identity) {
        let payload = match serde_json::to_string(identity) {
            Ok(p) => p,
            Err(e) => {
                warn!(target: "hackchain::session", "failed to serialize identity: {}", e);
                return;
            }
        };
        if let Err(e) = self.backend.write(&self.key, &payload) {
            warn!(target: "hackchain::session", "session persist failed: {}", e);
        }
    }

    pub fn clear(&self) {
        if let Err(e) = self.backend.remove(&self.key) {
            warn!(target: "hackchain::session", "session clear failed: {}", e);
        }
    }
}

fn parse_identity(raw: &str) -> Result<Identity, AuthError> {
    serde_json::from_str::<Identity>(raw).map_err(|e| AuthError::MalformedPersistedSession(e.to_string()))
}

/// 256-bit random token, base64url without padding (43 characters).
pub fn gen_token() -> Result<String, AuthError> {
    let mut buf = [0u8; 32];
    getrandom::getrandom(&mut buf).map_err(|e| AuthError::Storage(format!("entropy unavailable: {}", e)))?;
    Ok(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(buf))
}

/// True when `s` has the shape produced by [`gen_token`]. Session ids arrive in cookies,
/// so anything else is ignored rather than used as a storage namespace.
pub fn is_well_formed_token(s: &str) -> bool {
    s.len() == 43 && s.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod session_tests;
