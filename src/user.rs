//! Signed-in user identity

use std::fmt;

use crate::error::ProgressError;

/// Non-empty user identifier, used as the document key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UserId(String);

impl UserId {
    pub fn parse(raw: &str) -> Result<Self, ProgressError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ProgressError::InvalidUser);
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Guard for callers holding an optional signed-in user
    pub fn from_session(uid: Option<&str>) -> Result<Self, ProgressError> {
        uid.map_or(Err(ProgressError::InvalidUser), Self::parse)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
