//! The stable request identifier that flows through logs, error envelopes
//! and the `x-request-id` response header (spec.md §4.5, §4.6).

use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct RequestId(String);

impl RequestId {
    /// Use the client-supplied id if present and non-empty, otherwise mint
    /// a fresh one.
    pub fn from_header_or_new(header_value: Option<&str>) -> Self {
        match header_value.map(str::trim) {
            Some(v) if !v.is_empty() => Self(v.to_string()),
            _ => Self::new(),
        }
    }

    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uses_client_supplied_id() {
        let id = RequestId::from_header_or_new(Some("client-123"));
        assert_eq!(id.as_str(), "client-123");
    }

    #[test]
    fn mints_new_id_when_absent_or_blank() {
        assert_ne!(
            RequestId::from_header_or_new(None).as_str(),
            RequestId::from_header_or_new(Some("   ")).as_str()
        );
    }
}
