//! dmake Provenance Codec
//!
//! Pure data transformation between computation descriptors and the strings
//! stored as content locations of computed files. Nothing here executes.
//!
//! # Core Concepts
//!
//! - [`Descriptor`]: method, parameters, inputs, outputs and pinned revision
//! - [`ProvenanceUrl`]: a decoded `datalad-make:` URL, optionally naming `this` output
//! - [`Record`]: the per-key record spread over `compute://` URLs
//! - [`DatasetPath`]: validated dataset-relative path
//! - [`Fingerprint`]: Blake3 digest correlating the log lines of one computation
//!
//! # Example
//!
//! ```rust
//! use dmake_codec::{DatasetPath, Descriptor, ProvenanceUrl};
//!
//! let out: DatasetPath = "out.txt".parse().unwrap();
//! let descriptor = Descriptor::new("ds-id", "abc123", "double.sh")
//!     .with_inputs(vec!["in.txt".parse().unwrap()])
//!     .with_outputs(vec![out.clone()]);
//!
//! let url = descriptor.url_for(&out);
//! let decoded: ProvenanceUrl = url.parse().unwrap();
//! assert_eq!(decoded.descriptor, descriptor);
//! assert_eq!(decoded.this, Some(out));
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod descriptor;
mod error;
mod hash;
mod params;
mod path;
mod record;

pub use descriptor::{specialize, template_path, validate_method, Descriptor, ProvenanceUrl};
pub use error::CodecError;
pub use hash::Fingerprint;
pub use params::Parameters;
pub use path::{DatasetPath, PathError};
pub use record::{
    is_record_url, Category, Record, LEGACY_RECORD_PREFIX, NO_DEPENDENCIES, RECORD_SCHEME,
};

/// Scheme of write-side provenance URLs
pub const URL_SCHEME: &str = "datalad-make";

/// Dataset-relative directory holding computation templates
pub const TEMPLATE_DIR: &str = ".datalad/compute/methods";

/// Dataset-relative directory reserved for stored computation specifications
pub const SPECIFICATION_DIR: &str = ".datalad/compute/specifications";

/// Check whether a URL belongs to any provenance scheme this crate decodes
#[inline]
#[must_use]
pub fn is_provenance_url(url: &str) -> bool {
    ProvenanceUrl::matches_scheme(url) || is_record_url(url)
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod integration_tests {
    use super::*;

    #[test]
    fn template_dir_is_dataset_relative() {
        let dir: DatasetPath = TEMPLATE_DIR.parse().unwrap();
        let spec: DatasetPath = SPECIFICATION_DIR.parse().unwrap();
        assert_eq!(dir.parent(), spec.parent());
    }

    #[test]
    fn provenance_url_detection() {
        assert!(is_provenance_url("datalad-make:///?root_id=x"));
        assert!(is_provenance_url("compute://x/method/abc"));
        assert!(is_provenance_url("URL--compute:x"));
        assert!(!is_provenance_url("https://example.org/compute:x"));
    }
}
