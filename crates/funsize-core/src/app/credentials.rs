//! Credential sealing for the publish stage.
//!
//! Envelopes are sealed to the task-execution environment's X25519 public
//! key (ephemeral-static ECDH, HKDF-SHA256, ChaCha20-Poly1305). Claims are
//! carried both inside the sealed message and as associated data, so an
//! envelope whose outer fields were edited fails to open.
//!
//! Wire form of `ciphertext`: `base64(ephemeral_public || nonce || sealed)`.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chacha20poly1305::aead::{Aead, KeyInit, Payload};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use hkdf::Hkdf;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use x25519_dalek::{EphemeralSecret, PublicKey, StaticSecret};

use crate::domain::credential::{CredentialClaims, CredentialEnvelope, CredentialError};

const KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;
const MESSAGE_VERSION: &str = "1";

/// Sealed plaintext.
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SealedMessage {
    message_version: String,
    #[serde(flatten)]
    claims: CredentialClaims,
    value: String,
}

fn decode_key(b64: &str) -> Result<[u8; KEY_LEN], CredentialError> {
    let raw = STANDARD
        .decode(b64.trim())
        .map_err(|e| CredentialError::KeyMaterial(format!("not base64: {e}")))?;
    raw.as_slice().try_into().map_err(|_| {
        CredentialError::KeyMaterial(format!("expected {KEY_LEN} bytes, got {}", raw.len()))
    })
}

fn derive_cipher(
    shared: &[u8; KEY_LEN],
    ephemeral: &PublicKey,
    recipient: &PublicKey,
) -> Result<ChaCha20Poly1305, CredentialError> {
    let mut info = [0u8; KEY_LEN * 2];
    info[..KEY_LEN].copy_from_slice(ephemeral.as_bytes());
    info[KEY_LEN..].copy_from_slice(recipient.as_bytes());

    let mut okm = [0u8; KEY_LEN];
    Hkdf::<Sha256>::new(None, shared)
        .expand(&info, &mut okm)
        .map_err(|e| CredentialError::KeyMaterial(e.to_string()))?;
    Ok(ChaCha20Poly1305::new(Key::from_slice(&okm)))
}

fn claims_aad(claims: &CredentialClaims) -> Result<Vec<u8>, CredentialError> {
    serde_json::to_vec(claims).map_err(|e| CredentialError::Seal(e.to_string()))
}

/// Seals secrets to the task-execution environment.
#[derive(Clone)]
pub struct CredentialEncryptor {
    recipient: PublicKey,
}

impl CredentialEncryptor {
    pub fn new(recipient: PublicKey) -> Self {
        Self { recipient }
    }

    /// Parses a base64 X25519 public key.
    pub fn from_base64(b64: &str) -> Result<Self, CredentialError> {
        let bytes = decode_key(b64)?;
        Ok(Self::new(PublicKey::from(bytes)))
    }

    /// Seals `value` for `recipient_task_id`, valid in `[not_before, not_after]`
    /// (ms since epoch). Every call uses a fresh ephemeral key and nonce.
    pub fn encrypt(
        &self,
        recipient_task_id: &str,
        not_before: i64,
        not_after: i64,
        name: &str,
        value: &str,
    ) -> Result<CredentialEnvelope, CredentialError> {
        let claims = CredentialClaims {
            task_id: recipient_task_id.to_string(),
            not_before,
            not_after,
            name: name.to_string(),
        };
        let aad = claims_aad(&claims)?;
        let message = SealedMessage {
            message_version: MESSAGE_VERSION.to_string(),
            claims: claims.clone(),
            value: value.to_string(),
        };
        let plaintext =
            serde_json::to_vec(&message).map_err(|e| CredentialError::Seal(e.to_string()))?;

        let ephemeral = EphemeralSecret::random_from_rng(rand::rngs::OsRng);
        let ephemeral_public = PublicKey::from(&ephemeral);
        let shared = ephemeral.diffie_hellman(&self.recipient);
        if !shared.was_contributory() {
            return Err(CredentialError::KeyMaterial(
                "recipient key is a low-order point".into(),
            ));
        }
        let cipher = derive_cipher(shared.as_bytes(), &ephemeral_public, &self.recipient)?;

        let nonce_bytes: [u8; NONCE_LEN] = rand::random();
        let sealed = cipher
            .encrypt(
                Nonce::from_slice(&nonce_bytes),
                Payload {
                    msg: &plaintext,
                    aad: &aad,
                },
            )
            .map_err(|e| CredentialError::Seal(e.to_string()))?;

        let mut wire = Vec::with_capacity(KEY_LEN + NONCE_LEN + sealed.len());
        wire.extend_from_slice(ephemeral_public.as_bytes());
        wire.extend_from_slice(&nonce_bytes);
        wire.extend_from_slice(&sealed);

        Ok(CredentialEnvelope {
            recipient_task_id: claims.task_id,
            not_before,
            not_after,
            name: claims.name,
            ciphertext: STANDARD.encode(wire),
        })
    }
}

/// Decrypted and verified envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenedCredential {
    pub claims: CredentialClaims,
    pub value: String,
}

/// Recipient side: what the task-execution environment does before
/// exposing a secret to a task.
pub struct CredentialOpener {
    secret: StaticSecret,
}

impl CredentialOpener {
    pub fn new(secret: StaticSecret) -> Self {
        Self { secret }
    }

    pub fn from_base64(b64: &str) -> Result<Self, CredentialError> {
        Ok(Self::new(StaticSecret::from(decode_key(b64)?)))
    }

    pub fn public_key(&self) -> PublicKey {
        PublicKey::from(&self.secret)
    }

    /// Decrypts `envelope` on behalf of `self_task_id` at `now_ms`.
    ///
    /// Rejects envelopes addressed to another task, outside their validity
    /// window, or whose outer claims disagree with the sealed ones.
    pub fn open(
        &self,
        envelope: &CredentialEnvelope,
        self_task_id: &str,
        now_ms: i64,
    ) -> Result<OpenedCredential, CredentialError> {
        let wire = STANDARD
            .decode(&envelope.ciphertext)
            .map_err(|e| CredentialError::Open(format!("not base64: {e}")))?;
        if wire.len() < KEY_LEN + NONCE_LEN {
            return Err(CredentialError::Open("ciphertext too short".into()));
        }
        let (ephemeral_bytes, rest) = wire.split_at(KEY_LEN);
        let (nonce_bytes, sealed) = rest.split_at(NONCE_LEN);

        let mut ephemeral = [0u8; KEY_LEN];
        ephemeral.copy_from_slice(ephemeral_bytes);
        let ephemeral_public = PublicKey::from(ephemeral);

        let shared = self.secret.diffie_hellman(&ephemeral_public);
        if !shared.was_contributory() {
            return Err(CredentialError::Open("ephemeral key is a low-order point".into()));
        }
        let cipher = derive_cipher(shared.as_bytes(), &ephemeral_public, &self.public_key())?;

        let outer = envelope.claims();
        let aad = serde_json::to_vec(&outer).map_err(|e| CredentialError::Open(e.to_string()))?;
        let plaintext = cipher
            .decrypt(
                Nonce::from_slice(nonce_bytes),
                Payload {
                    msg: sealed,
                    aad: &aad,
                },
            )
            .map_err(|_| CredentialError::Open("authentication failed".into()))?;

        let message: SealedMessage = serde_json::from_slice(&plaintext)
            .map_err(|e| CredentialError::Open(e.to_string()))?;
        if message.message_version != MESSAGE_VERSION {
            return Err(CredentialError::Open(format!(
                "unsupported message version {}",
                message.message_version
            )));
        }
        if message.claims != outer {
            return Err(CredentialError::ClaimsMismatch);
        }
        if message.claims.task_id != self_task_id {
            return Err(CredentialError::WrongRecipient {
                expected: message.claims.task_id,
                actual: self_task_id.to_string(),
            });
        }
        if !message.claims.is_valid_at(now_ms) {
            return Err(CredentialError::OutsideWindow {
                now_ms,
                not_before: message.claims.not_before,
                not_after: message.claims.not_after,
            });
        }

        Ok(OpenedCredential {
            claims: message.claims,
            value: message.value,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keypair() -> (CredentialEncryptor, CredentialOpener) {
        let secret = StaticSecret::random_from_rng(rand::rngs::OsRng);
        let opener = CredentialOpener::new(secret);
        (CredentialEncryptor::new(opener.public_key()), opener)
    }

    #[test]
    fn claims_round_trip_exactly() {
        let (encryptor, opener) = keypair();
        let envelope = encryptor.encrypt("T1", 1000, 2000, "N", "V").unwrap();

        let opened = opener.open(&envelope, "T1", 1500).unwrap();
        assert_eq!(
            opened.claims,
            CredentialClaims {
                task_id: "T1".into(),
                not_before: 1000,
                not_after: 2000,
                name: "N".into(),
            }
        );
        assert_eq!(opened.value, "V");
        assert_eq!(envelope.claims(), opened.claims);
    }

    #[test]
    fn same_inputs_produce_different_ciphertext() {
        let (encryptor, _) = keypair();
        let a = encryptor.encrypt("T1", 1000, 2000, "N", "V").unwrap();
        let b = encryptor.encrypt("T1", 1000, 2000, "N", "V").unwrap();
        assert_ne!(a.ciphertext, b.ciphertext);
        assert_eq!(a.claims(), b.claims());
    }

    #[test]
    fn ciphertext_does_not_contain_the_value() {
        let (encryptor, _) = keypair();
        let envelope = encryptor
            .encrypt("T1", 1000, 2000, "UPDATE_API_PASSWORD", "hunter2")
            .unwrap();
        let raw = STANDARD.decode(&envelope.ciphertext).unwrap();
        assert!(!raw.windows(7).any(|w| w == b"hunter2"));
    }

    #[test]
    fn other_task_is_rejected() {
        let (encryptor, opener) = keypair();
        let envelope = encryptor.encrypt("T1", 1000, 2000, "N", "V").unwrap();
        let err = opener.open(&envelope, "T2", 1500).unwrap_err();
        assert!(matches!(err, CredentialError::WrongRecipient { .. }));
    }

    #[test]
    fn outside_window_is_rejected() {
        let (encryptor, opener) = keypair();
        let envelope = encryptor.encrypt("T1", 1000, 2000, "N", "V").unwrap();
        assert!(matches!(
            opener.open(&envelope, "T1", 999).unwrap_err(),
            CredentialError::OutsideWindow { .. }
        ));
        assert!(matches!(
            opener.open(&envelope, "T1", 2001).unwrap_err(),
            CredentialError::OutsideWindow { .. }
        ));
        assert!(opener.open(&envelope, "T1", 2000).is_ok());
    }

    #[test]
    fn edited_outer_claims_fail_to_open() {
        let (encryptor, opener) = keypair();
        let mut envelope = encryptor.encrypt("T1", 1000, 2000, "N", "V").unwrap();
        envelope.not_after = 9_999_999;
        envelope.recipient_task_id = "T2".into();
        assert!(matches!(
            opener.open(&envelope, "T2", 1500).unwrap_err(),
            CredentialError::Open(_)
        ));
    }

    #[test]
    fn wrong_private_key_cannot_open() {
        let (encryptor, _) = keypair();
        let (_, stranger) = keypair();
        let envelope = encryptor.encrypt("T1", 1000, 2000, "N", "V").unwrap();
        assert!(stranger.open(&envelope, "T1", 1500).is_err());
    }

    #[test]
    fn malformed_key_material_is_rejected() {
        assert!(matches!(
            CredentialEncryptor::from_base64("not base64!!").err(),
            Some(CredentialError::KeyMaterial(_))
        ));
        assert!(matches!(
            CredentialEncryptor::from_base64(&STANDARD.encode([1u8; 16])).err(),
            Some(CredentialError::KeyMaterial(_))
        ));
    }

    #[test]
    fn low_order_recipient_key_is_fatal() {
        let encryptor = CredentialEncryptor::from_base64(&STANDARD.encode([0u8; 32])).unwrap();
        assert!(matches!(
            encryptor.encrypt("T1", 1000, 2000, "N", "V").unwrap_err(),
            CredentialError::KeyMaterial(_)
        ));
    }
}
