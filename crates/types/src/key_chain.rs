//! Forward key chains built from one-time keys.
//!
//! Every signed object discloses the public key its signer will use next.
//! [`ForwardSigner`] is the signing side: it always holds the next key pair
//! before signing with the current one. [`KeyChain`] is the receiving side:
//! it remembers the last key each signer disclosed and checks the signer's
//! following signature against it.

use crate::{
    OneTimeKeyPair, OneTimePrivateKey, OneTimePublicKey, OneTimeSignature, SignatureError,
    Verification,
};
use std::collections::BTreeMap;
use std::fmt::Debug;

/// Signing side of a forward key chain.
#[derive(Debug)]
pub struct ForwardSigner {
    next: OneTimeKeyPair,
}

impl ForwardSigner {
    /// Start a chain with a freshly generated key pair.
    pub fn new() -> Result<Self, SignatureError> {
        Ok(Self {
            next: OneTimeKeyPair::generate()?,
        })
    }

    /// Start a chain from a given first key pair.
    pub fn from_key_pair(next: OneTimeKeyPair) -> Self {
        Self { next }
    }

    /// Key that the next signature will be checked against.
    pub fn next_public_key(&self) -> &OneTimePublicKey {
        self.next.public_key()
    }

    /// Advance the chain.
    ///
    /// Returns the private key to sign with now and the public key of its
    /// successor, which must be disclosed in the signed content.
    pub fn rotate(&mut self) -> Result<(OneTimePrivateKey, OneTimePublicKey), SignatureError> {
        let fresh = OneTimeKeyPair::generate()?;
        let (current, _) = std::mem::replace(&mut self.next, fresh).into_parts();
        Ok((current, self.next.public_key().clone()))
    }
}

/// Result of checking a signature against a signer's chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainCheck {
    /// Nothing recorded for this signer yet. Accepted on first use.
    FirstContact,
    /// Checked against the key the signer disclosed last time.
    Checked {
        /// The recorded key the signature was checked against.
        key: OneTimePublicKey,
        /// Outcome of the check.
        verification: Verification,
    },
    /// The signer's previous message disclosed no successor key.
    Exhausted,
}

impl ChainCheck {
    /// Whether the signature may be trusted.
    pub fn is_accepted(&self) -> bool {
        match self {
            ChainCheck::FirstContact => true,
            ChainCheck::Checked { verification, .. } => verification.is_valid(),
            ChainCheck::Exhausted => false,
        }
    }

    /// The key the signature was checked against, if any.
    pub fn verifying_key(&self) -> Option<&OneTimePublicKey> {
        match self {
            ChainCheck::Checked { key, .. } => Some(key),
            _ => None,
        }
    }
}

/// Receiving side of forward key chains, keyed by signer.
#[derive(Debug, Clone)]
pub struct KeyChain<K> {
    keys: BTreeMap<K, Option<OneTimePublicKey>>,
}

impl<K> Default for KeyChain<K> {
    fn default() -> Self {
        Self {
            keys: BTreeMap::new(),
        }
    }
}

impl<K: Ord + Copy + Debug> KeyChain<K> {
    /// Create an empty chain tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Check `signature` against the key recorded for `signer`, then record
    /// `next_key` as the signer's new expected key.
    ///
    /// The disclosed key is recorded whatever the outcome, so one bad or lost
    /// message does not lock a signer out of later rounds.
    pub fn check_and_advance(
        &mut self,
        signer: K,
        message: &[u8],
        signature: &OneTimeSignature,
        next_key: Option<&OneTimePublicKey>,
    ) -> ChainCheck {
        let check = match self.keys.get(&signer) {
            None => ChainCheck::FirstContact,
            Some(None) => ChainCheck::Exhausted,
            Some(Some(key)) => ChainCheck::Checked {
                verification: key.verify(message, signature),
                key: key.clone(),
            },
        };
        self.keys.insert(signer, next_key.cloned());
        check
    }

    /// The key `signer` is expected to sign with next.
    pub fn expected_key(&self, signer: K) -> Option<&OneTimePublicKey> {
        self.keys.get(&signer).and_then(Option::as_ref)
    }

    /// Whether anything has been recorded for `signer`.
    pub fn knows(&self, signer: K) -> bool {
        self.keys.contains_key(&signer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ValidatorId;

    fn signed(signer: &mut ForwardSigner, message: &[u8]) -> (OneTimeSignature, OneTimePublicKey) {
        let (current, next) = signer.rotate().unwrap();
        (current.sign(message).unwrap(), next)
    }

    #[test]
    fn test_chain_accepts_sequential_signatures() {
        let mut signer = ForwardSigner::from_key_pair(OneTimeKeyPair::from_seed(1));
        let mut chain = KeyChain::new();
        let id = ValidatorId(1);

        for message in [b"first".as_slice(), b"second", b"third"] {
            let (signature, next) = signed(&mut signer, message);
            let check = chain.check_and_advance(id, message, &signature, Some(&next));
            assert!(check.is_accepted());
            assert_eq!(chain.expected_key(id), Some(&next));
        }
    }

    #[test]
    fn test_first_contact_is_trusted() {
        let mut signer = ForwardSigner::from_key_pair(OneTimeKeyPair::from_seed(2));
        let mut chain = KeyChain::new();
        let (signature, next) = signed(&mut signer, b"hello");

        let check = chain.check_and_advance(ValidatorId(9), b"hello", &signature, Some(&next));
        assert_eq!(check, ChainCheck::FirstContact);
        assert!(check.verifying_key().is_none());
    }

    #[test]
    fn test_skipped_message_breaks_then_resyncs() {
        let mut signer = ForwardSigner::from_key_pair(OneTimeKeyPair::from_seed(3));
        let mut chain = KeyChain::new();
        let id = ValidatorId(2);

        let (sig1, next1) = signed(&mut signer, b"one");
        assert!(chain
            .check_and_advance(id, b"one", &sig1, Some(&next1))
            .is_accepted());

        // Lost in transit.
        let _ = signed(&mut signer, b"two");

        let (sig3, next3) = signed(&mut signer, b"three");
        let check = chain.check_and_advance(id, b"three", &sig3, Some(&next3));
        assert!(!check.is_accepted());
        assert_eq!(check.verifying_key(), Some(&next1));

        // Key disclosed by the rejected message is still recorded.
        let (sig4, next4) = signed(&mut signer, b"four");
        assert!(chain
            .check_and_advance(id, b"four", &sig4, Some(&next4))
            .is_accepted());
    }

    #[test]
    fn test_missing_successor_exhausts_chain() {
        let mut signer = ForwardSigner::from_key_pair(OneTimeKeyPair::from_seed(4));
        let mut chain = KeyChain::new();
        let id = ValidatorId(3);

        let (sig1, _) = signed(&mut signer, b"one");
        chain.check_and_advance(id, b"one", &sig1, None);
        assert!(chain.knows(id));
        assert!(chain.expected_key(id).is_none());

        let (sig2, next2) = signed(&mut signer, b"two");
        let check = chain.check_and_advance(id, b"two", &sig2, Some(&next2));
        assert_eq!(check, ChainCheck::Exhausted);
    }
}
