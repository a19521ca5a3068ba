//! Per-directory `.env` key/value store.
//!
//! One `key=value` pair per line, no quoting, no comments. Reads fail soft:
//! a missing or unreadable file is simply an empty store. Writes
//! read-modify-write the whole file and mirror the value into the live
//! process environment.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::utils::io;

pub const ENV_FILE_NAME: &str = ".env";

/// Why a store could not be read. Never surfaced by [`get`].
#[derive(Debug)]
pub enum StoreReadError {
    NotFound,
    Unreadable(std::io::Error),
}

impl std::fmt::Display for StoreReadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound => write!(f, "env file does not exist"),
            Self::Unreadable(err) => write!(f, "env file is unreadable: {}", err),
        }
    }
}

impl std::error::Error for StoreReadError {}

/// Parsed store contents in file order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvEntries {
    entries: Vec<(String, String)>,
}

impl EnvEntries {
    /// Parse store text. Empty lines and lines without `=` are skipped;
    /// values stop at the next `=`.
    pub fn parse(content: &str) -> Self {
        let mut parsed = Self::default();
        for line in content.split('\n').filter(|l| !l.trim().is_empty()) {
            let mut parts = line.split('=');
            let key = parts.next().unwrap_or_default().trim();
            let Some(value) = parts.next() else {
                continue;
            };
            if key.is_empty() {
                continue;
            }
            parsed.insert(key, value.trim());
        }
        parsed
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Overwrite in place, or append when the key is new.
    pub fn insert(&mut self, key: &str, value: &str) {
        match self.entries.iter_mut().find(|(k, _)| k == key) {
            Some(entry) => entry.1 = value.to_string(),
            None => self.entries.push((key.to_string(), value.to_string())),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn serialize(&self) -> String {
        self.entries
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Path of the store file for a working directory.
pub fn env_file_path(dir: &Path) -> PathBuf {
    dir.join(ENV_FILE_NAME)
}

/// Load and parse a directory's store.
pub fn load(dir: &Path) -> std::result::Result<EnvEntries, StoreReadError> {
    match fs::read_to_string(env_file_path(dir)) {
        Ok(content) => Ok(EnvEntries::parse(&content)),
        Err(e) if e.kind() == ErrorKind::NotFound => Err(StoreReadError::NotFound),
        Err(e) => Err(StoreReadError::Unreadable(e)),
    }
}

/// Read one key. Any read failure counts as absent.
pub fn get(key: &str, dir: &Path) -> Option<String> {
    load(dir).ok()?.get(key).map(String::from)
}

/// Persist one key and mirror it into the process environment.
///
/// A missing file starts an empty store and is created with a trailing
/// newline. An existing file that cannot be read is an error rather than
/// being overwritten.
pub fn set(key: &str, value: &str, dir: &Path) -> Result<()> {
    std::env::set_var(key, value);

    let path = env_file_path(dir);
    let content = match load(dir) {
        Ok(mut entries) => {
            entries.insert(key, value);
            entries.serialize()
        }
        Err(StoreReadError::NotFound) => format!("{}={}\n", key, value),
        Err(err) => {
            return Err(Error::internal_io(
                format!("{}: {}", path.display(), err),
                Some("read env file".to_string()),
            ))
        }
    };

    io::write_file_atomic(&path, &content, "write env file")
}
