//! Hash functions and digest construction.

use std::fmt;
use std::io::Read;

use sha2::digest::DynDigest;
use sha2::{Sha256, Sha512};

use crate::canonicalize::canonicalize;
use crate::descriptor::{ComponentDescriptor, DigestSpec};
use crate::error::{IntegrityError, IntegrityResult};

pub const SHA256: &str = "sha256";
pub const SHA512: &str = "sha512";

/// Normalisation of canonicalized component descriptors.
pub const JSON_NORMALISATION_V1: &str = "jsonNormalisationV1";

/// Normalisation of OCI artifacts (JCS re-marshalled manifest).
pub const OCI_ARTIFACT_DIGEST_V1: &str = "ociArtifactDigestV1";

/// Normalisation of raw local blobs.
pub const LOCAL_OCI_BLOB_DIGEST_V1: &str = "localOciBlobDigestV1";

/// A named hash function. State is reset before every digest.
pub struct Hasher {
    algorithm: &'static str,
    inner: Box<dyn DynDigest + Send + Sync>,
}

impl Hasher {
    /// Look up a hash function by name (case-insensitive).
    pub fn for_name(name: &str) -> IntegrityResult<Self> {
        let (algorithm, inner): (&'static str, Box<dyn DynDigest + Send + Sync>) =
            match name.to_ascii_lowercase().as_str() {
                SHA256 => (SHA256, Box::new(Sha256::default())),
                SHA512 => (SHA512, Box::new(Sha512::default())),
                _ => {
                    return Err(IntegrityError::UnsupportedHashAlgorithm {
                        algorithm: name.to_string(),
                    })
                }
            };
        Ok(Self { algorithm, inner })
    }

    pub fn sha256() -> Self {
        Self {
            algorithm: SHA256,
            inner: Box::new(Sha256::default()),
        }
    }

    pub fn algorithm(&self) -> &str {
        self.algorithm
    }

    /// Digest `bytes` with `jsonNormalisationV1`.
    pub fn hash(&mut self, bytes: &[u8]) -> DigestSpec {
        self.digest_bytes(bytes, JSON_NORMALISATION_V1)
    }

    pub fn digest_bytes(&mut self, bytes: &[u8], normalisation: &str) -> DigestSpec {
        self.inner.reset();
        self.inner.update(bytes);
        self.finish(normalisation)
    }

    /// Digest a stream without buffering it.
    pub fn digest_reader<R: Read>(
        &mut self,
        mut reader: R,
        normalisation: &str,
    ) -> std::io::Result<DigestSpec> {
        self.inner.reset();
        let mut buf = [0_u8; 8192];

        loop {
            let n = reader.read(&mut buf)?;
            if n == 0 {
                break;
            }
            self.inner.update(&buf[..n]);
        }

        Ok(self.finish(normalisation))
    }

    fn finish(&mut self, normalisation: &str) -> DigestSpec {
        let sum = self.inner.finalize_reset();
        DigestSpec::new(self.algorithm, normalisation, hex::encode(sum))
    }
}

impl Clone for Hasher {
    fn clone(&self) -> Self {
        // Fresh state; a hasher is never cloned mid-stream.
        match self.algorithm {
            SHA512 => Self {
                algorithm: SHA512,
                inner: Box::new(Sha512::default()),
            },
            _ => Self::sha256(),
        }
    }
}

impl fmt::Debug for Hasher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hasher")
            .field("algorithm", &self.algorithm)
            .finish()
    }
}

/// Digest of the canonical form of `cd`.
pub fn hash_descriptor(cd: &ComponentDescriptor, hasher: &mut Hasher) -> IntegrityResult<DigestSpec> {
    let canonical = canonicalize(cd)?;
    Ok(hasher.hash(&canonical))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    struct ChunkedReader<'a> {
        data: &'a [u8],
        pos: usize,
        max_chunk: usize,
    }

    impl Read for ChunkedReader<'_> {
        fn read(&mut self, out: &mut [u8]) -> std::io::Result<usize> {
            if self.pos >= self.data.len() {
                return Ok(0);
            }
            let n = out
                .len()
                .min(self.max_chunk)
                .min(self.data.len().saturating_sub(self.pos));
            out[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
            self.pos += n;
            Ok(n)
        }
    }

    #[test]
    fn sha256_known_vector() {
        let digest = Hasher::sha256().hash(b"abc");
        assert_eq!(digest.hash_algorithm, "sha256");
        assert_eq!(digest.normalisation_algorithm, JSON_NORMALISATION_V1);
        assert_eq!(
            digest.value,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn sha512_is_selected_by_name() {
        let digest = Hasher::for_name("SHA512").unwrap().hash(b"abc");
        assert_eq!(digest.hash_algorithm, "sha512");
        assert_eq!(digest.value.len(), 128);
    }

    #[test]
    fn unknown_algorithm_is_rejected() {
        let err = Hasher::for_name("md5").unwrap_err();
        assert!(matches!(err, IntegrityError::UnsupportedHashAlgorithm { .. }));
    }

    #[test]
    fn state_does_not_leak_between_uses() {
        let mut hasher = Hasher::sha256();
        let first = hasher.hash(b"data-parent");
        hasher.hash(b"something else");
        assert_eq!(hasher.hash(b"data-parent"), first);
    }

    #[test]
    fn reader_matches_bytes_digest() {
        let payload = b"\x00\x01hello\xffbinary\n";
        let mut hasher = Hasher::sha256();
        let from_bytes = hasher.digest_bytes(payload, LOCAL_OCI_BLOB_DIGEST_V1);
        let from_reader = hasher
            .digest_reader(Cursor::new(payload), LOCAL_OCI_BLOB_DIGEST_V1)
            .unwrap();
        assert_eq!(from_bytes, from_reader);
    }

    #[test]
    fn chunked_stream_parity() {
        let payload = b"abcdefghijklmnopqrstuvwxyz0123456789";
        let mut hasher = Hasher::sha256();
        let from_bytes = hasher.digest_bytes(payload, LOCAL_OCI_BLOB_DIGEST_V1);
        let chunked = ChunkedReader {
            data: payload,
            pos: 0,
            max_chunk: 3,
        };
        let from_stream = hasher
            .digest_reader(chunked, LOCAL_OCI_BLOB_DIGEST_V1)
            .unwrap();
        assert_eq!(from_bytes, from_stream);
    }

    #[test]
    fn descriptor_hash_is_lowercase_hex() {
        let cd = ComponentDescriptor::new("c", "v1");
        let digest = hash_descriptor(&cd, &mut Hasher::sha256()).unwrap();
        assert_eq!(digest.value.len(), 64);
        assert!(digest
            .value
            .chars()
            .all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }
}
