use crate::shortcode::ShortCode;
use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// Identifier of the account that owns a short URL.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A stored short URL. Created once by the allocation service, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShortUrlRecord {
    pub owner: UserId,
    pub long_url: String,
    pub short_code: ShortCode,
    pub created_at: Timestamp,
}

/// A single resolution of a short code.
///
/// Lives only in the visit pipeline's buffer between `record` and the next
/// batch flush.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisitEvent {
    pub short_code: ShortCode,
    pub visitor_ip: String,
    pub visited_at: Timestamp,
}

impl VisitEvent {
    pub fn new(short_code: ShortCode, visitor_ip: impl Into<String>, visited_at: Timestamp) -> Self {
        Self {
            short_code,
            visitor_ip: visitor_ip.into(),
            visited_at,
        }
    }
}
