//! Cryptographic primitives for the record stream.
//!
//! Provides SHA-384 digest writers, running-hash chain computation and
//! verification, and the signer seam used to sign record files, with an
//! Ed25519 implementation.
//!
//! All crypto operations wrap established libraries; there is no custom cryptography.

pub mod chain;
pub mod hasher;
pub mod signer;

pub use chain::{ChainError, ChainSegment, RunningHashChain};
pub use hasher::{digest_reader, HashingWriter};
pub use signer::{SignatureType, Signer, SignerError, SigningKey, VerifyingKey};
