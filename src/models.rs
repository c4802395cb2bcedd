use chrono::{Local, SecondsFormat};
use serde::{Deserialize, Serialize};

/// Current local time as RFC 3339 with offset, e.g. `2025-12-01T10:00:00+01:00`.
pub fn timestamp() -> String {
    Local::now().to_rfc3339_opts(SecondsFormat::Secs, false)
}

/// Logins are compared lowercased with surrounding whitespace removed.
pub fn normalize_login(login: &str) -> String {
    login.trim().to_lowercase()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct User {
    pub login: String,
    pub password_hash: Option<String>,
    /// bcrypt hash of the current recovery code.
    pub recovery_code: Option<String>,
    pub created_at: String,
}

impl Default for User {
    fn default() -> Self {
        Self {
            login: String::new(),
            password_hash: None,
            recovery_code: None,
            created_at: timestamp(),
        }
    }
}

impl User {
    pub fn new(login: &str) -> Self {
        Self {
            login: normalize_login(login),
            ..Self::default()
        }
    }

    /// `false` while the account is pending its first password.
    pub fn has_password(&self) -> bool {
        self.password_hash.is_some()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Note {
    pub id: String,
    pub title: String,
    pub content: String,
    pub created_at: String,
    pub updated_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_ip: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_ip: Option<String>,
}

/// Everything stored about one user: one file per document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserDocument {
    pub user: User,
    pub notes: Vec<Note>,
}

impl UserDocument {
    pub fn new(login: &str) -> Self {
        Self {
            user: User::new(login),
            notes: Vec::new(),
        }
    }

    pub fn find_note_mut(&mut self, id: &str) -> Option<&mut Note> {
        self.notes.iter_mut().find(|note| note.id == id)
    }

    /// Removes the note and reports whether it existed.
    pub fn remove_note(&mut self, id: &str) -> bool {
        match self.notes.iter().position(|note| note.id == id) {
            Some(index) => {
                self.notes.remove(index);
                true
            }
            None => false,
        }
    }
}

/// Form-encoded body of `POST /api`.
#[derive(Debug, Default, Deserialize)]
pub struct ApiRequest {
    pub action: Option<String>,
    pub login: Option<String>,
    pub secret: Option<String>,
    pub global_code: Option<String>,
    pub recovery_code: Option<String>,
    pub new_password: Option<String>,
    pub data: Option<String>,
    pub api_key: Option<String>,
}

fn trimmed(field: &Option<String>) -> String {
    field.as_deref().map(str::trim).unwrap_or_default().to_string()
}

impl ApiRequest {
    pub fn login(&self) -> String {
        self.login.as_deref().map(normalize_login).unwrap_or_default()
    }

    pub fn secret(&self) -> String {
        trimmed(&self.secret)
    }

    pub fn global_code(&self) -> String {
        trimmed(&self.global_code)
    }

    pub fn recovery_code(&self) -> String {
        trimmed(&self.recovery_code).to_uppercase()
    }

    pub fn new_password(&self) -> String {
        trimmed(&self.new_password)
    }

    /// The `data` field decoded as a note payload; anything unreadable
    /// becomes an empty payload and fails field validation.
    pub fn note_input(&self) -> NoteInput {
        self.data
            .as_deref()
            .and_then(|data| serde_json::from_str::<NoteInput>(data).ok())
            .map(|input| NoteInput {
                id: input.id.trim().to_string(),
                title: input.title.trim().to_string(),
                content: input.content.trim().to_string(),
            })
            .unwrap_or_default()
    }
}

#[derive(Debug, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct NoteInput {
    pub id: String,
    pub title: String,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PublicConfig {
    pub enable_pwa: bool,
    pub enable_offline_mode: bool,
    pub require_global_code: bool,
    pub store_ip: bool,
}

/// JSON body of every API answer. Only the fields an action sets are
/// serialized.
#[derive(Debug, Default, Serialize)]
pub struct ApiResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub firewall: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lockout: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub login_error: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code_error: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key_error: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config: Option<PublicConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_exists: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_password: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub require_global_code: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recovery_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<Vec<Note>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<Note>,
}

impl ApiResponse {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
            ..Self::default()
        }
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
            ..Self::default()
        }
    }

    pub fn login_error(message: impl Into<String>) -> Self {
        Self {
            login_error: Some(true),
            ..Self::fail(message)
        }
    }
}
