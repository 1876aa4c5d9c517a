//! The authenticated user as seen by the chat client.
//!
//! Sign-in happens elsewhere; the identity provider leaves a profile document
//! behind and we only read a display field from it to label outgoing messages.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("failed to read profile {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse profile {path}: {source}")]
    Parse {
        path: String,
        source: serde_json::Error,
    },
    #[error("no sender name available; sign in or pass --sender")]
    Anonymous,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Profile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nickname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub picture: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Profile {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, IdentityError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| IdentityError::Read {
            path: path.display().to_string(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| IdentityError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    /// First non-blank of `name`, `nickname`, `email`.
    pub fn display_name(&self) -> Option<&str> {
        [&self.name, &self.nickname, &self.email]
            .into_iter()
            .filter_map(|field| field.as_deref())
            .map(str::trim)
            .find(|value| !value.is_empty())
    }

    pub fn to_pretty_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Pick the sender label: an explicit override wins, then the profile.
pub fn resolve_sender(
    explicit: Option<&str>,
    profile_path: &str,
) -> Result<String, IdentityError> {
    if let Some(name) = explicit.map(str::trim).filter(|name| !name.is_empty()) {
        return Ok(name.to_string());
    }

    match Profile::load(profile_path) {
        Ok(profile) => profile
            .display_name()
            .map(str::to_string)
            .ok_or(IdentityError::Anonymous),
        Err(IdentityError::Read { source, .. })
            if source.kind() == std::io::ErrorKind::NotFound =>
        {
            log::debug!("No profile at {profile_path}");
            Err(IdentityError::Anonymous)
        }
        Err(err) => Err(err),
    }
}
