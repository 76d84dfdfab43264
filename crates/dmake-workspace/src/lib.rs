//! dmake Workspace Provisioner
//!
//! Creates isolated working trees of a dataset pinned to one revision,
//! materializes only what a computation needs, and removes them again.
//! Everything touching the version-control store goes through [`Backend`];
//! [`GitAnnexBackend`] implements it over the `git` command line.
//!
//! # Example
//!
//! ```rust,no_run
//! use dmake_workspace::{GitAnnexBackend, Provisioner};
//! use std::path::Path;
//!
//! let provisioner = Provisioner::new(GitAnnexBackend::new());
//! let dataset = Path::new("/data/ds");
//! let guard = provisioner
//!     .provision_scoped(dataset, None, &["in.txt".parse().unwrap()])
//!     .unwrap();
//! println!("workspace at {}", guard.path().display());
//! guard.release().unwrap();
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod backend;
mod error;
mod git;
mod lock;
mod provision;
mod unlock;

pub use backend::Backend;
pub use error::{BackendError, ProvisionError};
pub use git::{GitAnnexBackend, DATASET_CONFIG, DATASET_ID_KEY};
pub use lock::{DatasetLock, LOCK_FILE};
pub use provision::{Provisioner, Workspace, WorkspaceGuard, WORKSPACE_PREFIX};
pub use unlock::{placeholder_content, unlock_file, unlock_outputs, Unlocked};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
