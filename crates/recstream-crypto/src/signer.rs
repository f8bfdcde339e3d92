use serde::{Deserialize, Serialize};

/// Signature schemes that can appear in a signature file.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignatureType {
    /// RSA over SHA-384, the scheme used by HSM-backed node keys.
    Sha384WithRsa,
    /// Ed25519 over the raw digest bytes.
    Ed25519,
}

impl SignatureType {
    /// Wire identifier.
    pub const fn id(self) -> i32 {
        match self {
            Self::Sha384WithRsa => 1,
            Self::Ed25519 => 2,
        }
    }

    pub fn from_id(id: i32) -> Option<Self> {
        match id {
            1 => Some(Self::Sha384WithRsa),
            2 => Some(Self::Ed25519),
            _ => None,
        }
    }
}

/// Produces signatures over stream digests.
///
/// Called synchronously from the stream writer, twice per completed file.
/// Implementations may be slow (an HSM round trip); no timeout is imposed
/// by the writer.
pub trait Signer: Send + Sync {
    /// Sign `data`, which is always the raw bytes of a digest.
    fn sign(&self, data: &[u8]) -> Result<Vec<u8>, SignerError>;

    /// Scheme recorded next to the signature.
    fn signature_type(&self) -> SignatureType {
        SignatureType::Sha384WithRsa
    }
}

/// Ed25519 signing key (private).
pub struct SigningKey(ed25519_dalek::SigningKey);

/// Ed25519 verifying key (public).
#[derive(Clone, PartialEq, Eq)]
pub struct VerifyingKey(ed25519_dalek::VerifyingKey);

impl SigningKey {
    /// Generate a new random signing key.
    pub fn generate() -> Self {
        let mut csprng = rand::thread_rng();
        Self(ed25519_dalek::SigningKey::generate(&mut csprng))
    }

    /// Create from raw 32-byte secret.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(ed25519_dalek::SigningKey::from_bytes(&bytes))
    }

    /// The corresponding public verifying key.
    pub fn verifying_key(&self) -> VerifyingKey {
        VerifyingKey(self.0.verifying_key())
    }

    /// Raw secret key bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        self.0.as_bytes()
    }
}

impl Signer for SigningKey {
    fn sign(&self, data: &[u8]) -> Result<Vec<u8>, SignerError> {
        use ed25519_dalek::Signer as _;
        Ok(self.0.sign(data).to_bytes().to_vec())
    }

    fn signature_type(&self) -> SignatureType {
        SignatureType::Ed25519
    }
}

impl VerifyingKey {
    /// Verify a detached signature over `message`.
    pub fn verify(&self, message: &[u8], signature: &[u8]) -> Result<(), SignerError> {
        use ed25519_dalek::Verifier;
        let sig = ed25519_dalek::Signature::from_slice(signature)
            .map_err(|_| SignerError::InvalidSignature)?;
        self.0
            .verify(message, &sig)
            .map_err(|_| SignerError::InvalidSignature)
    }

    /// Raw public key bytes.
    pub fn as_bytes(&self) -> [u8; 32] {
        self.0.to_bytes()
    }

    /// Create from raw 32-byte public key.
    pub fn from_bytes(bytes: [u8; 32]) -> Result<Self, SignerError> {
        let key = ed25519_dalek::VerifyingKey::from_bytes(&bytes)
            .map_err(|_| SignerError::InvalidKey)?;
        Ok(Self(key))
    }
}

impl std::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SigningKey(<redacted>)")
    }
}

impl std::fmt::Debug for VerifyingKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "VerifyingKey({})", hex::encode(self.0.to_bytes()))
    }
}

/// Errors from signing operations.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SignerError {
    #[error("invalid signature")]
    InvalidSignature,
    #[error("invalid key")]
    InvalidKey,
    #[error("signing failed: {0}")]
    Failed(String),
}
