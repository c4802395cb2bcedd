use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::error::ApiError;
use crate::models::{normalize_login, timestamp, Note, User, UserDocument};

const ACCESS_FILE: &str = ".htaccess";
const ACCESS_RULES: &str =
    "Options -Indexes\nServerSignature Off\n<Files \"*\">\n  Require all denied\n</Files>\n";
const USER_KEYS: [&str; 4] = ["login", "password_hash", "recovery_code", "created_at"];

/// One pretty-printed JSON file per user under `dir`.
#[derive(Debug, Clone)]
pub struct UserStore {
    dir: PathBuf,
}

impl UserStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Creates the directory, with an access file denying web access, on
    /// first use.
    pub fn ensure_dir(&self) -> Result<(), ApiError> {
        if !self.dir.exists() {
            fs::create_dir_all(&self.dir)?;
            fs::write(self.dir.join(ACCESS_FILE), ACCESS_RULES)?;
            info!(dir = %self.dir.display(), "created notes directory");
        }
        if fs::metadata(&self.dir)?.permissions().readonly() {
            return Err(ApiError::NotWritable(self.dir.display().to_string()));
        }
        Ok(())
    }

    pub fn user_file(&self, login: &str) -> PathBuf {
        let digest = md5::compute(normalize_login(login));
        self.dir.join(format!("user_{:x}.json", digest))
    }

    /// `None` when the user has no file or the file is not a JSON object.
    /// Incomplete documents are repaired and written back.
    pub fn load(&self, login: &str) -> Result<Option<UserDocument>, ApiError> {
        let path = self.user_file(login);
        if !path.is_file() {
            return Ok(None);
        }
        let raw = fs::read_to_string(&path)?;
        let Some((mut doc, mut repaired)) = parse_document(&raw, login) else {
            warn!(file = %path.display(), "ignoring unreadable user file");
            return Ok(None);
        };
        // The file name is derived from the login, so the two must agree.
        let requested = normalize_login(login);
        if doc.user.login != requested {
            warn!(stored = %doc.user.login, login = %requested, "stored login does not match file");
            doc.user.login = requested;
            repaired = true;
        }
        if repaired {
            info!(login = %doc.user.login, "repaired user file");
            self.save(&doc)?;
        }
        Ok(Some(doc))
    }

    pub fn save(&self, doc: &UserDocument) -> Result<PathBuf, ApiError> {
        self.ensure_dir()?;
        let path = self.user_file(&doc.user.login);
        fs::write(&path, serde_json::to_string_pretty(doc)?)?;
        Ok(path)
    }

    /// Reports whether a file was removed.
    pub fn delete(&self, login: &str) -> Result<bool, ApiError> {
        let path = self.user_file(login);
        if !path.is_file() {
            return Ok(false);
        }
        fs::remove_file(path)?;
        Ok(true)
    }

    /// Every readable user document, sorted by login.
    pub fn list(&self) -> Result<Vec<UserDocument>, ApiError> {
        if !self.dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut docs = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            let is_user_file = path
                .file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.starts_with("user_") && name.ends_with(".json"));
            if !is_user_file {
                continue;
            }
            let raw = match fs::read_to_string(&path) {
                Ok(raw) => raw,
                Err(e) => {
                    warn!(file = %path.display(), error = %e, "skipping unreadable user file");
                    continue;
                }
            };
            match serde_json::from_str::<Value>(&raw) {
                Ok(Value::Object(map)) if map.get("user").is_some_and(Value::is_object) => {
                    let login = map["user"]["login"].as_str().unwrap_or_default().to_string();
                    if let Some((doc, _)) = parse_document(&raw, &login) {
                        docs.push(doc);
                    }
                }
                _ => warn!(file = %path.display(), "skipping unreadable user file"),
            }
        }
        docs.sort_by(|a, b| a.user.login.cmp(&b.user.login));
        Ok(docs)
    }
}

/// Decodes a stored document, filling in whatever is missing. The flag is
/// set when anything had to be filled in or dropped.
fn parse_document(raw: &str, login: &str) -> Option<(UserDocument, bool)> {
    let Value::Object(root) = serde_json::from_str::<Value>(raw).ok()? else {
        return None;
    };
    let mut repaired = false;

    let user = match root.get("user") {
        Some(Value::Object(fields)) => repair_user(fields, login, &mut repaired),
        _ => {
            repaired = true;
            User::new(login)
        }
    };

    let notes = match root.get("notes") {
        Some(Value::Array(items)) => {
            let notes: Vec<Note> = items
                .iter()
                .filter_map(|item| serde_json::from_value(item.clone()).ok())
                .collect();
            repaired |= notes.len() != items.len();
            notes
        }
        _ => {
            repaired = true;
            Vec::new()
        }
    };

    Some((UserDocument { user, notes }, repaired))
}

/// Repairs one field at a time so a single bad value never costs the
/// password hash or the recovery code.
fn repair_user(fields: &Map<String, Value>, login: &str, repaired: &mut bool) -> User {
    *repaired |= USER_KEYS.iter().any(|key| !fields.contains_key(*key));

    let text = |key: &str| {
        fields
            .get(key)
            .and_then(Value::as_str)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
    };
    let secret = |key: &str, repaired: &mut bool| match fields.get(key) {
        Some(Value::String(value)) => Some(value.clone()),
        Some(Value::Null) | None => None,
        Some(_) => {
            *repaired = true;
            None
        }
    };

    let stored_login = text("login").map(|stored| normalize_login(&stored));
    let login = match stored_login.filter(|stored| !stored.is_empty()) {
        Some(stored) => stored,
        None => {
            *repaired = true;
            normalize_login(login)
        }
    };
    let created_at = text("created_at").unwrap_or_else(|| {
        *repaired = true;
        timestamp()
    });

    User {
        login,
        password_hash: secret("password_hash", &mut *repaired),
        recovery_code: secret("recovery_code", &mut *repaired),
        created_at,
    }
}
