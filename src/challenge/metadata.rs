//! Challenge metadata codec.
//!
//! The issuer mirrors expiry and attempt number into an opaque string so the
//! decision engine can read them back without access to the private
//! parameters. The string travels inside attacker-reachable session history,
//! so decoding is total: malformed, absent or non-object input decodes to the
//! empty value instead of failing.

use serde_json::Value;

/// Decoded per-attempt state. Both fields are optional; upstream serializers
/// are not under our control.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChallengeMetadata {
    /// Unix timestamp after which the challenge can no longer be satisfied.
    pub exp: Option<i64>,
    /// 1-based attempt counter, monotonically non-decreasing per session.
    pub attempt: Option<u32>,
}

impl ChallengeMetadata {
    #[must_use]
    pub const fn new(expires_at: i64, attempt: u32) -> Self {
        Self {
            exp: Some(expires_at),
            attempt: Some(attempt),
        }
    }

    /// Lossless JSON serialization of the known fields.
    #[must_use]
    pub fn encode(&self) -> String {
        let mut object = serde_json::Map::new();
        if let Some(exp) = self.exp {
            object.insert("exp".to_string(), Value::from(exp));
        }
        if let Some(attempt) = self.attempt {
            object.insert("attempt".to_string(), Value::from(attempt));
        }
        Value::Object(object).to_string()
    }

    /// Total decode: never fails, anything unusable becomes the empty value.
    #[must_use]
    pub fn decode(raw: Option<&str>) -> Self {
        let Some(raw) = raw else {
            return Self::default();
        };

        let Ok(Value::Object(object)) = serde_json::from_str::<Value>(raw) else {
            return Self::default();
        };

        Self {
            exp: object.get("exp").and_then(lenient_i64),
            attempt: object
                .get("attempt")
                .and_then(lenient_i64)
                .and_then(|attempt| u32::try_from(attempt).ok()),
        }
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.exp.is_none() && self.attempt.is_none()
    }

    /// Whether the carried expiry, if any, has passed.
    #[must_use]
    pub fn expired(&self, now: i64) -> bool {
        self.exp.is_some_and(|exp| now > exp)
    }
}

// Numbers sometimes arrive as JSON strings after a round-trip through the
// private parameter map, which is string-typed end to end.
fn lenient_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(number) => number.as_i64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}
