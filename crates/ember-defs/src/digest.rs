// SPDX-License-Identifier: Apache-2.0
//! Content identity for validated definitions.
//!
//! The digest commits to the canonical JSON rendering of a definition under
//! a domain-separated prefix, so two packs with identical content hash
//! identically regardless of how they were loaded. Savers and telemetry use
//! it to pin which content a snapshot belongs to.

use std::fmt;

use blake3::Hasher;

/// Domain prefix for definition digests.
const DEFINITION_DIGEST_V1: &[u8] = b"ember:definition:v1\0";

/// Stable 256-bit content digest of a game definition.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct DefinitionDigest([u8; 32]);

impl DefinitionDigest {
    /// Raw digest bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Hex rendering of the digest.
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for DefinitionDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for DefinitionDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DefinitionDigest({})", self.to_hex())
    }
}

/// Computes the content digest of a definition.
#[must_use]
pub fn definition_digest(definition: &crate::definition::GameDefinition) -> DefinitionDigest {
    let mut hasher = Hasher::new();
    hasher.update(DEFINITION_DIGEST_V1);
    // The definition model serializes infallibly (string keys throughout);
    // fail loudly rather than hash partial content if that ever changes.
    match serde_json::to_vec(definition) {
        Ok(bytes) => {
            hasher.update(&bytes);
        }
        Err(_) => unreachable!("definition serialization is infallible"),
    }
    DefinitionDigest(hasher.finalize().into())
}
