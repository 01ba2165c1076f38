use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::params::SimulationParameters;

/// SHA-256 of a simulation's canonical parameter string, as lowercase hex.
///
/// Equal fingerprints mean the cached result can stand in for a fresh run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Hash already-canonicalised fields, joined with `,` in the given order.
    pub fn from_fields<S: AsRef<str>>(fields: &[S]) -> Self {
        let mut hasher = Sha256::new();
        for (i, field) in fields.iter().enumerate() {
            if i > 0 {
                hasher.update(b",");
            }
            hasher.update(field.as_ref().as_bytes());
        }
        Fingerprint(hex::encode(hasher.finalize()))
    }

    pub fn of(params: &SimulationParameters) -> Self {
        Fingerprint::from_fields(&params.canonical_fields())
    }

    /// Wrap a stored hex digest. Returns `None` unless it is 64 hex chars.
    pub fn from_hex(hex_digest: &str) -> Option<Self> {
        let valid = hex_digest.len() == 64 && hex::decode(hex_digest).is_ok();
        valid.then(|| Fingerprint(hex_digest.to_ascii_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl PartialEq<str> for Fingerprint {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for Fingerprint {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

impl PartialEq<str> for SimulationParameters {
    fn eq(&self, other: &str) -> bool {
        Fingerprint::of(self) == other
    }
}

impl PartialEq<&str> for SimulationParameters {
    fn eq(&self, other: &&str) -> bool {
        Fingerprint::of(self) == *other
    }
}
