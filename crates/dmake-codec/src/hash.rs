//! Descriptor fingerprints
//!
//! A [`Fingerprint`] is the Blake3 digest of a descriptor's URL base. Every
//! output URL of one computation shares it, so it ties together the log
//! lines of the compute run and of any later retrieval of its outputs.

use std::fmt::{self, Display, Formatter};

/// Blake3 digest identifying one computation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    /// Digest an encoded computation
    #[inline]
    #[must_use]
    pub fn compute(encoded: &[u8]) -> Self {
        Self(*blake3::hash(encoded).as_bytes())
    }

    /// First 16 hex characters, enough to tell jobs apart in logs
    #[inline]
    #[must_use]
    pub fn short(&self) -> String {
        hex::encode(&self.0[..8])
    }
}

impl Display for Fingerprint {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_depends_on_every_byte() {
        assert_eq!(Fingerprint::compute(b"abc"), Fingerprint::compute(b"abc"));
        assert_ne!(Fingerprint::compute(b"abc"), Fingerprint::compute(b"abd"));
    }

    #[test]
    fn short_form_prefixes_full_form() {
        let fp = Fingerprint::compute(b"datalad-make:///?root_id=x");
        assert_eq!(fp.to_string().len(), 64);
        assert_eq!(fp.short().len(), 16);
        assert!(fp.to_string().starts_with(&fp.short()));
    }
}
