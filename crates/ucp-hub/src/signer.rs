//! Ed25519 request signing.
//!
//! The signing key is loaded once at startup and owned by [`Signer`]. Every
//! other component holds an `Arc<Signer>` and only ever sees signatures,
//! tokens and the public key.

use std::fmt;
use std::path::Path;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD as B64URL, Engine};
use ed25519_dalek::{Signature, Signer as _, SigningKey, Verifier, VerifyingKey};
use pkcs8::{DecodePrivateKey, EncodePrivateKey, EncodePublicKey, LineEnding};
use rand::RngCore;

use crate::config::HubConfig;
use crate::digest::sha256_hex_bytes;
use crate::error::{HubError, HubResult};

/// Bytes of entropy in an idempotency key.
const IDEMPOTENCY_KEY_BYTES: usize = 32;

/// Process-wide signer.
pub struct Signer {
    signing_key: SigningKey,
    key_id: String,
}

impl fmt::Debug for Signer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signer")
            .field("key_id", &self.key_id)
            .field("signing_key", &"<redacted>")
            .finish()
    }
}

impl Signer {
    pub fn new(signing_key: SigningKey) -> HubResult<Self> {
        let key_id = compute_key_id_from_key(&signing_key.verifying_key())?;
        Ok(Self {
            signing_key,
            key_id,
        })
    }

    /// Fresh ephemeral key. Signatures die with the process.
    pub fn generate() -> HubResult<Self> {
        Self::new(SigningKey::generate(&mut rand::thread_rng()))
    }

    pub fn from_pkcs8_pem(pem: &str) -> HubResult<Self> {
        let signing_key = SigningKey::from_pkcs8_pem(pem).map_err(|e| HubError::KeyMaterial {
            message: format!("invalid PKCS#8 Ed25519 key: {}", e),
        })?;
        Self::new(signing_key)
    }

    pub fn from_pem_file(path: &Path) -> HubResult<Self> {
        let pem = std::fs::read_to_string(path).map_err(|e| HubError::KeyMaterial {
            message: format!("failed to read {}: {}", path.display(), e),
        })?;
        Self::from_pkcs8_pem(&pem)
    }

    /// Load the configured key, or generate an ephemeral one.
    pub fn from_config(config: &HubConfig) -> HubResult<Self> {
        match &config.signing_key_path {
            Some(path) => {
                let signer = Self::from_pem_file(path)?;
                tracing::info!(key_id = %signer.key_id, "loaded signing key");
                Ok(signer)
            }
            None => {
                let signer = Self::generate()?;
                tracing::warn!(
                    key_id = %signer.key_id,
                    "no signing_key_path configured, using ephemeral signing key"
                );
                Ok(signer)
            }
        }
    }

    /// `sha256:<hex>` of the SPKI DER public key.
    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing_key.verifying_key()
    }

    /// Detached signature over `message`, base64url without padding.
    pub fn sign(&self, message: &[u8]) -> String {
        let signature: Signature = self.signing_key.sign(message);
        B64URL.encode(signature.to_bytes())
    }

    /// Cryptographically random token, unique per logical call.
    pub fn new_idempotency_key() -> String {
        let mut bytes = [0_u8; IDEMPOTENCY_KEY_BYTES];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        B64URL.encode(bytes)
    }

    /// Public key as an RFC 8037 OKP JWK.
    pub fn public_jwk(&self) -> serde_json::Value {
        serde_json::json!({
            "kty": "OKP",
            "crv": "Ed25519",
            "x": B64URL.encode(self.verifying_key().as_bytes()),
            "kid": self.key_id,
            "alg": "EdDSA",
            "use": "sig",
        })
    }

    /// Write the private key as PKCS#8 PEM (mode 0600 on unix).
    pub fn write_pkcs8_pem(&self, path: &Path) -> HubResult<()> {
        let pem = self
            .signing_key
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|e| HubError::KeyMaterial {
                message: format!("failed to encode private key: {}", e),
            })?;

        std::fs::write(path, pem.as_bytes()).map_err(|e| HubError::KeyMaterial {
            message: format!("failed to write {}: {}", path.display(), e),
        })?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)).map_err(
                |e| HubError::KeyMaterial {
                    message: format!("failed to set permissions on {}: {}", path.display(), e),
                },
            )?;
        }

        Ok(())
    }
}

/// Compute key ID from a VerifyingKey.
pub fn compute_key_id_from_key(key: &VerifyingKey) -> HubResult<String> {
    let doc = key.to_public_key_der().map_err(|e| HubError::KeyMaterial {
        message: format!("failed to encode public key: {}", e),
    })?;
    Ok(sha256_hex_bytes(doc.as_bytes()))
}

/// Verify a base64url detached signature.
pub fn verify_signature(key: &VerifyingKey, message: &[u8], signature_b64: &str) -> HubResult<()> {
    let bytes = B64URL
        .decode(signature_b64)
        .map_err(|e| HubError::SignatureInvalid {
            reason: format!("invalid base64url signature: {}", e),
        })?;

    let signature = Signature::from_slice(&bytes).map_err(|e| HubError::SignatureInvalid {
        reason: format!("invalid signature bytes: {}", e),
    })?;

    key.verify(message, &signature)
        .map_err(|_| HubError::SignatureInvalid {
            reason: "ed25519 verification failed".to_string(),
        })
}
