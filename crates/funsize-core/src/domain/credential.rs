//! Credential envelopes: encrypted, task- and time-scoped secrets.

use serde::{Deserialize, Serialize};

/// Claims bound into every envelope. The executing environment checks them
/// before it trusts the decrypted value.
///
/// Times are milliseconds since the Unix epoch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialClaims {
    pub task_id: String,
    #[serde(rename = "startTime")]
    pub not_before: i64,
    #[serde(rename = "endTime")]
    pub not_after: i64,
    pub name: String,
}

impl CredentialClaims {
    pub fn is_valid_at(&self, now_ms: i64) -> bool {
        self.not_before <= now_ms && now_ms <= self.not_after
    }
}

/// An encrypted secret addressed to exactly one task.
///
/// `ciphertext` is opaque base64; the other fields mirror the sealed claims so
/// schedulers can route and expire envelopes without decrypting them.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialEnvelope {
    pub recipient_task_id: String,
    pub not_before: i64,
    pub not_after: i64,
    pub name: String,
    pub ciphertext: String,
}

impl CredentialEnvelope {
    pub fn claims(&self) -> CredentialClaims {
        CredentialClaims {
            task_id: self.recipient_task_id.clone(),
            not_before: self.not_before,
            not_after: self.not_after,
            name: self.name.clone(),
        }
    }
}

// ciphertext stays out of logs
impl std::fmt::Debug for CredentialEnvelope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialEnvelope")
            .field("recipient_task_id", &self.recipient_task_id)
            .field("not_before", &self.not_before)
            .field("not_after", &self.not_after)
            .field("name", &self.name)
            .field("ciphertext", &"<sealed>")
            .finish()
    }
}

/// Sealing and opening failures.
///
/// Sealing failures are fatal for the graph being built: a publish node
/// without valid credentials is never emitted.
#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error("invalid key material: {0}")]
    KeyMaterial(String),

    #[error("encryption failed: {0}")]
    Seal(String),

    #[error("envelope could not be decrypted: {0}")]
    Open(String),

    #[error("envelope addressed to {expected}, opened by {actual}")]
    WrongRecipient { expected: String, actual: String },

    #[error("envelope not valid at {now_ms} (window {not_before}..={not_after})")]
    OutsideWindow {
        now_ms: i64,
        not_before: i64,
        not_after: i64,
    },

    #[error("envelope claims do not match the sealed message")]
    ClaimsMismatch,
}

/// Username/password pair the publish stage uses against the update-metadata
/// service.
#[derive(Clone)]
pub struct SubmissionCredentials {
    username: String,
    password: String,
}

impl SubmissionCredentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// `(env name, value)` pairs, in the order they are sealed.
    pub fn secrets(&self) -> [(&'static str, &str); 2] {
        [
            ("UPDATE_API_USERNAME", self.username.as_str()),
            ("UPDATE_API_PASSWORD", self.password.as_str()),
        ]
    }
}

impl std::fmt::Debug for SubmissionCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubmissionCredentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn claims_use_the_worker_message_field_names() {
        let claims = CredentialClaims {
            task_id: "T1".into(),
            not_before: 1000,
            not_after: 2000,
            name: "N".into(),
        };
        let json = serde_json::to_value(&claims).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"taskId": "T1", "startTime": 1000, "endTime": 2000, "name": "N"})
        );
    }

    #[test]
    fn validity_window_is_inclusive() {
        let claims = CredentialClaims {
            task_id: "T1".into(),
            not_before: 1000,
            not_after: 2000,
            name: "N".into(),
        };
        assert!(claims.is_valid_at(1000));
        assert!(claims.is_valid_at(2000));
        assert!(!claims.is_valid_at(999));
        assert!(!claims.is_valid_at(2001));
    }

    #[test]
    fn debug_output_hides_secrets() {
        let creds = SubmissionCredentials::new("ffxbld", "hunter2");
        let rendered = format!("{creds:?}");
        assert!(rendered.contains("ffxbld"));
        assert!(!rendered.contains("hunter2"));
    }
}
