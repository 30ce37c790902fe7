//! Ed25519 signatures over descriptor digests.

use std::path::Path;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use ed25519_dalek::{Signature as Ed25519Signature, Signer as _, SigningKey, Verifier as _, VerifyingKey};

use super::{decode_digest_value, Signer, Verifier};
use crate::descriptor::{ComponentDescriptor, DigestSpec, Signature, SignatureSpec};
use crate::digest::Hasher;
use crate::error::{IntegrityError, IntegrityResult};

pub const ED25519_ALGORITHM: &str = "ED25519";

pub const ED25519_SIGNATURE_MEDIA_TYPE: &str = "application/vnd.cdsign.signature.ed25519+hex";

fn key_error(message: String) -> IntegrityError {
    IntegrityError::Key { message }
}

fn read_pem(path: &Path) -> IntegrityResult<String> {
    std::fs::read_to_string(path)
        .map_err(|e| key_error(format!("failed to read key file {}: {e}", path.display())))
}

/// Key ID: `sha256:` plus the hex SHA-256 of the SPKI DER encoding.
pub fn compute_key_id(key: &VerifyingKey) -> IntegrityResult<String> {
    use pkcs8::EncodePublicKey;
    let doc = key
        .to_public_key_der()
        .map_err(|e| key_error(format!("failed to encode public key: {e}")))?;
    Ok(format!("sha256:{}", Hasher::sha256().hash(doc.as_bytes()).value))
}

/// Signs with a local Ed25519 key.
pub struct Ed25519Signer {
    key: SigningKey,
}

impl Ed25519Signer {
    pub fn new(key: SigningKey) -> Self {
        Self { key }
    }

    pub fn from_pkcs8_pem(pem: &str) -> IntegrityResult<Self> {
        use pkcs8::DecodePrivateKey;
        let key = SigningKey::from_pkcs8_pem(pem)
            .map_err(|e| key_error(format!("invalid Ed25519 private key: {e}")))?;
        Ok(Self::new(key))
    }

    pub fn from_key_file(path: &Path) -> IntegrityResult<Self> {
        Self::from_pkcs8_pem(&read_pem(path)?)
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        self.key.verifying_key()
    }
}

#[async_trait]
impl Signer for Ed25519Signer {
    async fn sign(
        &self,
        descriptor: &ComponentDescriptor,
        digest: &DigestSpec,
    ) -> IntegrityResult<SignatureSpec> {
        let message = decode_digest_value(descriptor, digest)?;
        let signature = self.key.sign(&message);
        Ok(SignatureSpec {
            algorithm: ED25519_ALGORITHM.to_string(),
            value: hex::encode(signature.to_bytes()),
            media_type: ED25519_SIGNATURE_MEDIA_TYPE.to_string(),
        })
    }
}

/// Verifies Ed25519 signatures against a single public key.
#[derive(Debug, Clone)]
pub struct Ed25519Verifier {
    key: VerifyingKey,
}

impl Ed25519Verifier {
    pub fn new(key: VerifyingKey) -> Self {
        Self { key }
    }

    /// Load an SPKI `PUBLIC KEY` PEM.
    pub fn from_public_key_pem(pem: &str) -> IntegrityResult<Self> {
        use pkcs8::DecodePublicKey;
        let key = VerifyingKey::from_public_key_pem(pem)
            .map_err(|e| key_error(format!("invalid Ed25519 public key: {e}")))?;
        Ok(Self::new(key))
    }

    /// Decode a Base64-encoded SPKI public key.
    pub fn from_spki_base64(b64: &str) -> IntegrityResult<Self> {
        use pkcs8::DecodePublicKey;
        let bytes = BASE64
            .decode(b64.trim())
            .map_err(|e| key_error(format!("invalid base64 public key: {e}")))?;
        let key = VerifyingKey::from_public_key_der(&bytes)
            .map_err(|e| key_error(format!("invalid SPKI public key: {e}")))?;
        Ok(Self::new(key))
    }

    /// Accepts either a PEM file or a file holding Base64 SPKI.
    pub fn from_key_file(path: &Path) -> IntegrityResult<Self> {
        let content = read_pem(path)?;
        if content.contains("-----BEGIN") {
            Self::from_public_key_pem(&content)
        } else {
            Self::from_spki_base64(&content)
        }
    }

    pub fn key_id(&self) -> IntegrityResult<String> {
        compute_key_id(&self.key)
    }
}

#[async_trait]
impl Verifier for Ed25519Verifier {
    async fn verify(
        &self,
        descriptor: &ComponentDescriptor,
        signature: &Signature,
    ) -> IntegrityResult<()> {
        let invalid = |reason: String| IntegrityError::SignatureInvalid {
            node: descriptor.node(),
            reason,
        };

        if signature.signature.algorithm != ED25519_ALGORITHM {
            return Err(invalid(format!(
                "unexpected signature algorithm {:?}",
                signature.signature.algorithm
            )));
        }

        let message = hex::decode(&signature.digest.value)
            .map_err(|e| invalid(format!("digest value is not hex: {e}")))?;
        let raw = hex::decode(&signature.signature.value)
            .map_err(|e| invalid(format!("signature value is not hex: {e}")))?;
        let raw: [u8; 64] = raw
            .try_into()
            .map_err(|_| invalid("signature must be 64 bytes".to_string()))?;

        self.key
            .verify(&message, &Ed25519Signature::from_bytes(&raw))
            .map_err(|_| invalid("signature does not match key".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::digest::hash_descriptor;
    use pkcs8::{EncodePrivateKey, EncodePublicKey, LineEnding};

    fn generate() -> SigningKey {
        SigningKey::generate(&mut rand::thread_rng())
    }

    async fn signed(key: &SigningKey) -> (ComponentDescriptor, Signature) {
        let cd = ComponentDescriptor::new("c", "v1");
        let digest = hash_descriptor(&cd, &mut Hasher::sha256()).unwrap();
        let spec = Ed25519Signer::new(key.clone())
            .sign(&cd, &digest)
            .await
            .unwrap();
        (
            cd,
            Signature {
                name: "sig".to_string(),
                digest,
                signature: spec,
            },
        )
    }

    #[tokio::test]
    async fn sign_and_verify() {
        let key = generate();
        let (cd, signature) = signed(&key).await;
        assert_eq!(signature.signature.value.len(), 128);

        Ed25519Verifier::new(key.verifying_key())
            .verify(&cd, &signature)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn wrong_key_is_rejected() {
        let (cd, signature) = signed(&generate()).await;
        let err = Ed25519Verifier::new(generate().verifying_key())
            .verify(&cd, &signature)
            .await
            .unwrap_err();
        assert!(matches!(err, IntegrityError::SignatureInvalid { .. }));
    }

    #[tokio::test]
    async fn truncated_signature_is_rejected() {
        let key = generate();
        let (cd, mut signature) = signed(&key).await;
        signature.signature.value.truncate(64);
        let err = Ed25519Verifier::new(key.verifying_key())
            .verify(&cd, &signature)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("64 bytes"));
    }

    #[test]
    fn key_files_in_pem_and_base64() {
        let key = generate();
        let dir = tempfile::tempdir().unwrap();

        let private = dir.path().join("ed.pem");
        std::fs::write(&private, key.to_pkcs8_pem(LineEnding::LF).unwrap().as_bytes()).unwrap();
        let signer = Ed25519Signer::from_key_file(&private).unwrap();
        assert_eq!(signer.verifying_key(), key.verifying_key());

        let pem = dir.path().join("ed.pub");
        std::fs::write(&pem, key.verifying_key().to_public_key_pem(LineEnding::LF).unwrap()).unwrap();
        let from_pem = Ed25519Verifier::from_key_file(&pem).unwrap();

        let b64 = dir.path().join("ed.b64");
        let der = key.verifying_key().to_public_key_der().unwrap();
        std::fs::write(&b64, BASE64.encode(der.as_bytes())).unwrap();
        let from_b64 = Ed25519Verifier::from_key_file(&b64).unwrap();

        assert_eq!(from_pem.key_id().unwrap(), from_b64.key_id().unwrap());
        assert!(from_pem.key_id().unwrap().starts_with("sha256:"));
    }
}
