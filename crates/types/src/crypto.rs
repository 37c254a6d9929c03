//! One-time hash-based (Lamport) signatures.
//!
//! A key pair holds two arrays of [`KEY_BITS`] random 32-byte preimages, one
//! for each value a message bit can take. The public key is the Blake3 hash of
//! every preimage. Signing reveals one preimage per message bit, so a private
//! key is consumed by the first signature it produces: [`OneTimePrivateKey::sign`]
//! takes `self`.
//!
//! Messages longer than [`MESSAGE_BYTES`] are truncated; shorter ones are
//! padded with zero bits. Bit `i` of a message is `(m[i / 8] >> (i % 8)) & 1`.

use crate::Hash;
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of message bits covered by a signature.
pub const KEY_BITS: usize = Hash::BYTES * 8;

/// Number of message bytes covered by a signature.
pub const MESSAGE_BYTES: usize = KEY_BITS / 8;

/// A secret preimage revealed by a signature.
pub type Preimage = [u8; 32];

/// Errors raised by key generation and signing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignatureError {
    /// The randomness source could not produce key material.
    #[error("Entropy source unavailable: {0}")]
    Entropy(String),

    /// A key array does not hold one component per message bit.
    #[error("Key has {actual} components, expected {expected}")]
    KeyLength {
        /// Expected length.
        expected: usize,
        /// Actual length.
        actual: usize,
    },

    /// A signature does not hold one preimage per message bit.
    #[error("Signature has {actual} preimages, expected {expected}")]
    SignatureLength {
        /// Expected length.
        expected: usize,
        /// Actual length.
        actual: usize,
    },
}

/// Outcome of checking a signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verification {
    /// Every revealed preimage hashes to the matching public component.
    Valid,
    /// At least one preimage does not match.
    Invalid,
    /// The key or signature has the wrong number of components.
    Malformed,
}

impl Verification {
    /// True only for [`Verification::Valid`].
    pub fn is_valid(self) -> bool {
        matches!(self, Verification::Valid)
    }
}

fn message_bit(message: &[u8], index: usize) -> bool {
    message
        .get(index / 8)
        .is_some_and(|byte| (byte >> (index % 8)) & 1 == 1)
}

fn check_len(actual: usize) -> Result<(), SignatureError> {
    if actual == KEY_BITS {
        Ok(())
    } else {
        Err(SignatureError::KeyLength {
            expected: KEY_BITS,
            actual,
        })
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Keys
// ═══════════════════════════════════════════════════════════════════════════

/// Secret half of a one-time key. Never serialized and never cloned.
pub struct OneTimePrivateKey {
    zeros: Vec<Preimage>,
    ones: Vec<Preimage>,
}

impl OneTimePrivateKey {
    /// Sign `message`, consuming the key.
    pub fn sign(self, message: &[u8]) -> Result<OneTimeSignature, SignatureError> {
        check_len(self.zeros.len())?;
        check_len(self.ones.len())?;

        let preimages = (0..KEY_BITS)
            .map(|i| {
                if message_bit(message, i) {
                    self.ones[i]
                } else {
                    self.zeros[i]
                }
            })
            .collect();

        Ok(OneTimeSignature { preimages })
    }
}

impl fmt::Debug for OneTimePrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OneTimePrivateKey(..)")
    }
}

/// Public half of a one-time key: the hash of every preimage.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawPublicKey", into = "RawPublicKey")]
pub struct OneTimePublicKey {
    zeros: Vec<Hash>,
    ones: Vec<Hash>,
}

#[derive(Serialize, Deserialize)]
struct RawPublicKey {
    zeros: Vec<Hash>,
    ones: Vec<Hash>,
}

impl TryFrom<RawPublicKey> for OneTimePublicKey {
    type Error = SignatureError;

    fn try_from(raw: RawPublicKey) -> Result<Self, Self::Error> {
        OneTimePublicKey::from_components(raw.zeros, raw.ones)
    }
}

impl From<OneTimePublicKey> for RawPublicKey {
    fn from(key: OneTimePublicKey) -> Self {
        RawPublicKey {
            zeros: key.zeros,
            ones: key.ones,
        }
    }
}

impl OneTimePublicKey {
    /// Build a public key from its two component lists, checking their lengths.
    pub fn from_components(zeros: Vec<Hash>, ones: Vec<Hash>) -> Result<Self, SignatureError> {
        check_len(zeros.len())?;
        check_len(ones.len())?;
        Ok(Self { zeros, ones })
    }

    /// Components for zero bits, then components for one bits.
    pub fn components(&self) -> impl Iterator<Item = &Hash> {
        self.zeros.iter().chain(self.ones.iter())
    }

    /// Single hash committing to the whole key.
    pub fn fingerprint(&self) -> Hash {
        let parts: Vec<&[u8]> = self.components().map(|h| h.as_bytes().as_slice()).collect();
        Hash::from_parts(&parts)
    }

    /// Check a signature over `message` against this key.
    pub fn verify(&self, message: &[u8], signature: &OneTimeSignature) -> Verification {
        verify(message, signature, self)
    }
}

impl fmt::Debug for OneTimePublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OneTimePublicKey({})", self.fingerprint().short())
    }
}

/// A one-time key pair.
pub struct OneTimeKeyPair {
    private_key: OneTimePrivateKey,
    public_key: OneTimePublicKey,
}

impl OneTimeKeyPair {
    /// Generate a key pair from the operating system's entropy source.
    pub fn generate() -> Result<Self, SignatureError> {
        Self::generate_with(&mut rand::rngs::OsRng)
    }

    /// Generate a key pair from the given cryptographic RNG.
    pub fn generate_with<R: RngCore + CryptoRng>(rng: &mut R) -> Result<Self, SignatureError> {
        let mut draw = || -> Result<Vec<Preimage>, SignatureError> {
            (0..KEY_BITS)
                .map(|_| {
                    let mut preimage = [0u8; 32];
                    rng.try_fill_bytes(&mut preimage)
                        .map_err(|e| SignatureError::Entropy(e.to_string()))?;
                    Ok(preimage)
                })
                .collect()
        };
        let zeros = draw()?;
        let ones = draw()?;

        let public_key = OneTimePublicKey {
            zeros: zeros.iter().map(|p| Hash::from_bytes(p)).collect(),
            ones: ones.iter().map(|p| Hash::from_bytes(p)).collect(),
        };

        Ok(Self {
            private_key: OneTimePrivateKey { zeros, ones },
            public_key,
        })
    }

    /// Deterministic key pair for tests and simulation.
    #[cfg(any(test, feature = "test-utils"))]
    pub fn from_seed(seed: u64) -> Self {
        use rand::SeedableRng;
        let mut rng = rand_chacha::ChaCha8Rng::seed_from_u64(seed);
        match Self::generate_with(&mut rng) {
            Ok(pair) => pair,
            Err(e) => panic!("seeded RNG cannot fail: {e}"),
        }
    }

    /// The public half.
    pub fn public_key(&self) -> &OneTimePublicKey {
        &self.public_key
    }

    /// Sign `message`, consuming the pair.
    pub fn sign(self, message: &[u8]) -> Result<OneTimeSignature, SignatureError> {
        self.private_key.sign(message)
    }

    /// Split into private and public halves.
    pub fn into_parts(self) -> (OneTimePrivateKey, OneTimePublicKey) {
        (self.private_key, self.public_key)
    }
}

impl fmt::Debug for OneTimeKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OneTimeKeyPair")
            .field("public_key", &self.public_key)
            .finish_non_exhaustive()
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Signatures
// ═══════════════════════════════════════════════════════════════════════════

/// One revealed preimage per message bit.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Preimage>", into = "Vec<Preimage>")]
pub struct OneTimeSignature {
    preimages: Vec<Preimage>,
}

impl TryFrom<Vec<Preimage>> for OneTimeSignature {
    type Error = SignatureError;

    fn try_from(preimages: Vec<Preimage>) -> Result<Self, Self::Error> {
        if preimages.len() != KEY_BITS {
            return Err(SignatureError::SignatureLength {
                expected: KEY_BITS,
                actual: preimages.len(),
            });
        }
        Ok(Self { preimages })
    }
}

impl From<OneTimeSignature> for Vec<Preimage> {
    fn from(signature: OneTimeSignature) -> Self {
        signature.preimages
    }
}

impl OneTimeSignature {
    /// Revealed preimages in bit order.
    pub fn preimages(&self) -> &[Preimage] {
        &self.preimages
    }
}

impl fmt::Debug for OneTimeSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.preimages.first() {
            Some(first) => write!(f, "OneTimeSignature({}..)", hex::encode(&first[..4])),
            None => write!(f, "OneTimeSignature(empty)"),
        }
    }
}

/// Check `signature` over `message` against `public_key`.
pub fn verify(
    message: &[u8],
    signature: &OneTimeSignature,
    public_key: &OneTimePublicKey,
) -> Verification {
    if signature.preimages.len() != KEY_BITS
        || public_key.zeros.len() != KEY_BITS
        || public_key.ones.len() != KEY_BITS
    {
        return Verification::Malformed;
    }

    let matches = signature
        .preimages
        .iter()
        .enumerate()
        .all(|(i, preimage)| {
            let expected = if message_bit(message, i) {
                &public_key.ones[i]
            } else {
                &public_key.zeros[i]
            };
            Hash::from_bytes(preimage) == *expected
        });

    if matches {
        Verification::Valid
    } else {
        Verification::Invalid
    }
}
