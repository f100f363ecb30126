//! The error envelope shape every failed response carries (spec.md §4.6).

use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub code: u16,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorEnvelope {
    pub error: ErrorBody,
    pub request_id: String,
}

impl ErrorEnvelope {
    pub fn new(code: u16, message: impl Into<String>, request_id: impl Into<String>) -> Self {
        Self {
            error: ErrorBody {
                code,
                message: message.into(),
            },
            request_id: request_id.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_nested_error_object() {
        let env = ErrorEnvelope::new(404, "model_not_found: m1", "req-1");
        let json = serde_json::to_value(&env).unwrap();
        assert_eq!(json["error"]["code"], 404);
        assert_eq!(json["request_id"], "req-1");
    }
}
