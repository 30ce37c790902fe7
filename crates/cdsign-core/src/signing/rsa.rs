//! RSASSA-PKCS1-v1_5 signatures over descriptor digests.

use std::path::Path;

use async_trait::async_trait;
use rsa::pkcs1::{DecodeRsaPrivateKey, DecodeRsaPublicKey};
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey};
use rsa::{Pkcs1v15Sign, RsaPrivateKey, RsaPublicKey};

use super::server::SIGNING_SERVER_RSA_ALGORITHM;
use super::{decode_digest_value, Signer, Verifier};
use crate::descriptor::{ComponentDescriptor, DigestSpec, Signature, SignatureSpec};
use crate::digest::{SHA256, SHA512};
use crate::error::{IntegrityError, IntegrityResult};

pub const RSA_ALGORITHM: &str = "RSASSA-PKCS1-V1_5-SIGN";

pub const RSA_SIGNATURE_MEDIA_TYPE: &str = "application/vnd.cdsign.signature.rsa+hex";

fn padding_for(algorithm: &str) -> Option<Pkcs1v15Sign> {
    if algorithm.eq_ignore_ascii_case(SHA256) {
        Some(Pkcs1v15Sign::new::<sha2::Sha256>())
    } else if algorithm.eq_ignore_ascii_case(SHA512) {
        Some(Pkcs1v15Sign::new::<sha2::Sha512>())
    } else {
        None
    }
}

fn read_key_file(path: &Path) -> IntegrityResult<String> {
    std::fs::read_to_string(path).map_err(|e| IntegrityError::Key {
        message: format!("failed to read key file {}: {e}", path.display()),
    })
}

/// Signs with a local RSA private key.
pub struct RsaSigner {
    key: RsaPrivateKey,
}

impl RsaSigner {
    pub fn new(key: RsaPrivateKey) -> Self {
        Self { key }
    }

    /// Load a PKCS#1 (`RSA PRIVATE KEY`) or PKCS#8 (`PRIVATE KEY`) PEM.
    pub fn from_pem(pem: &str) -> IntegrityResult<Self> {
        let key = RsaPrivateKey::from_pkcs1_pem(pem)
            .or_else(|_| RsaPrivateKey::from_pkcs8_pem(pem))
            .map_err(|e| IntegrityError::Key {
                message: format!("invalid RSA private key: {e}"),
            })?;
        Ok(Self::new(key))
    }

    pub fn from_key_file(path: &Path) -> IntegrityResult<Self> {
        Self::from_pem(&read_key_file(path)?)
    }

    pub fn public_key(&self) -> RsaPublicKey {
        self.key.to_public_key()
    }
}

#[async_trait]
impl Signer for RsaSigner {
    async fn sign(
        &self,
        descriptor: &ComponentDescriptor,
        digest: &DigestSpec,
    ) -> IntegrityResult<SignatureSpec> {
        let padding = padding_for(&digest.hash_algorithm).ok_or_else(|| {
            IntegrityError::UnsupportedHashAlgorithm {
                algorithm: digest.hash_algorithm.clone(),
            }
        })?;
        let hashed = decode_digest_value(descriptor, digest)?;

        let signature = self
            .key
            .sign(padding, &hashed)
            .map_err(|e| IntegrityError::Signing {
                node: descriptor.node(),
                message: e.to_string(),
            })?;

        Ok(SignatureSpec {
            algorithm: RSA_ALGORITHM.to_string(),
            value: hex::encode(signature),
            media_type: RSA_SIGNATURE_MEDIA_TYPE.to_string(),
        })
    }
}

/// Verifies RSA signatures made locally or by a signing server.
pub struct RsaVerifier {
    key: RsaPublicKey,
}

impl RsaVerifier {
    pub fn new(key: RsaPublicKey) -> Self {
        Self { key }
    }

    /// Load an SPKI (`PUBLIC KEY`) or PKCS#1 (`RSA PUBLIC KEY`) PEM.
    pub fn from_pem(pem: &str) -> IntegrityResult<Self> {
        let key = RsaPublicKey::from_public_key_pem(pem)
            .or_else(|_| RsaPublicKey::from_pkcs1_pem(pem))
            .map_err(|e| IntegrityError::Key {
                message: format!("invalid RSA public key: {e}"),
            })?;
        Ok(Self::new(key))
    }

    pub fn from_key_file(path: &Path) -> IntegrityResult<Self> {
        Self::from_pem(&read_key_file(path)?)
    }
}

#[async_trait]
impl Verifier for RsaVerifier {
    async fn verify(
        &self,
        descriptor: &ComponentDescriptor,
        signature: &Signature,
    ) -> IntegrityResult<()> {
        let invalid = |reason: String| IntegrityError::SignatureInvalid {
            node: descriptor.node(),
            reason,
        };

        let algorithm = &signature.signature.algorithm;
        if algorithm != RSA_ALGORITHM && algorithm != SIGNING_SERVER_RSA_ALGORITHM {
            return Err(invalid(format!("unexpected signature algorithm {algorithm:?}")));
        }
        let padding = padding_for(&signature.digest.hash_algorithm).ok_or_else(|| {
            IntegrityError::UnsupportedHashAlgorithm {
                algorithm: signature.digest.hash_algorithm.clone(),
            }
        })?;

        let hashed = hex::decode(&signature.digest.value)
            .map_err(|e| invalid(format!("digest value is not hex: {e}")))?;
        let raw = hex::decode(&signature.signature.value)
            .map_err(|e| invalid(format!("signature value is not hex: {e}")))?;

        self.key
            .verify(padding, &hashed, &raw)
            .map_err(|e| invalid(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::digest::{hash_descriptor, Hasher};
    use rsa::pkcs1::{EncodeRsaPrivateKey, LineEnding};
    use rsa::pkcs8::EncodePublicKey;

    fn keypair() -> RsaPrivateKey {
        let mut rng = rand::thread_rng();
        RsaPrivateKey::new(&mut rng, 1024).unwrap()
    }

    async fn signed(signer: &RsaSigner, hasher: &mut Hasher) -> (ComponentDescriptor, Signature) {
        let cd = ComponentDescriptor::new("c", "v1");
        let digest = hash_descriptor(&cd, hasher).unwrap();
        let spec = signer.sign(&cd, &digest).await.unwrap();
        let signature = Signature {
            name: "sig".to_string(),
            digest,
            signature: spec,
        };
        (cd, signature)
    }

    #[tokio::test]
    async fn sign_and_verify_sha256() {
        let key = keypair();
        let signer = RsaSigner::new(key.clone());
        let verifier = RsaVerifier::new(key.to_public_key());

        let (cd, signature) = signed(&signer, &mut Hasher::sha256()).await;
        assert_eq!(signature.signature.algorithm, RSA_ALGORITHM);
        assert_eq!(signature.signature.media_type, RSA_SIGNATURE_MEDIA_TYPE);
        verifier.verify(&cd, &signature).await.unwrap();
    }

    #[tokio::test]
    async fn sign_and_verify_sha512() {
        let key = keypair();
        let signer = RsaSigner::new(key.clone());
        let verifier = RsaVerifier::new(key.to_public_key());

        let (cd, signature) = signed(&signer, &mut Hasher::for_name("sha512").unwrap()).await;
        verifier.verify(&cd, &signature).await.unwrap();
    }

    #[tokio::test]
    async fn wrong_key_is_rejected() {
        let signer = RsaSigner::new(keypair());
        let verifier = RsaVerifier::new(keypair().to_public_key());

        let (cd, signature) = signed(&signer, &mut Hasher::sha256()).await;
        let err = verifier.verify(&cd, &signature).await.unwrap_err();
        assert!(matches!(err, IntegrityError::SignatureInvalid { .. }));
    }

    #[tokio::test]
    async fn tampered_digest_is_rejected() {
        let key = keypair();
        let signer = RsaSigner::new(key.clone());
        let verifier = RsaVerifier::new(key.to_public_key());

        let (cd, mut signature) = signed(&signer, &mut Hasher::sha256()).await;
        signature.digest.value = "00".repeat(32);
        assert!(verifier.verify(&cd, &signature).await.is_err());
    }

    #[tokio::test]
    async fn foreign_algorithm_is_rejected() {
        let key = keypair();
        let signer = RsaSigner::new(key.clone());
        let verifier = RsaVerifier::new(key.to_public_key());

        let (cd, mut signature) = signed(&signer, &mut Hasher::sha256()).await;
        signature.signature.algorithm = "ED25519".to_string();
        let err = verifier.verify(&cd, &signature).await.unwrap_err();
        assert!(err.to_string().contains("unexpected signature algorithm"));
    }

    #[test]
    fn pem_round_trip_through_files() {
        let key = keypair();
        let dir = tempfile::tempdir().unwrap();
        let private = dir.path().join("key.pem");
        let public = dir.path().join("key.pub");
        std::fs::write(&private, key.to_pkcs1_pem(LineEnding::LF).unwrap().as_bytes()).unwrap();
        std::fs::write(
            &public,
            key.to_public_key().to_public_key_pem(LineEnding::LF).unwrap(),
        )
        .unwrap();

        let signer = RsaSigner::from_key_file(&private).unwrap();
        assert_eq!(signer.public_key(), key.to_public_key());
        RsaVerifier::from_key_file(&public).unwrap();
    }

    #[test]
    fn missing_key_file_is_a_key_error() {
        let err = RsaSigner::from_key_file(Path::new("/nonexistent/key.pem")).err().unwrap();
        assert!(matches!(err, IntegrityError::Key { .. }));
    }
}
