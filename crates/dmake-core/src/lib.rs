//! dmake Core
//!
//! Ties the codec, runner and provisioner together:
//! - [`Orchestrator`]: compute outputs in a workspace, collect them and
//!   register their provenance URLs
//! - [`ComputeRemote`]: regenerate a file's content from its provenance on
//!   demand
//! - [`protocol`]: serve [`ComputeRemote`] to git-annex as a special remote
//!
//! # Example
//!
//! ```rust,no_run
//! use dmake_core::{ComputeRequest, Orchestrator};
//! use dmake_workspace::GitAnnexBackend;
//!
//! let request = ComputeRequest::new("/data/ds", "double.sh")
//!     .with_inputs(vec!["in.txt".parse().unwrap()])
//!     .with_outputs(vec!["out.txt".parse().unwrap()]);
//!
//! for record in Orchestrator::new(GitAnnexBackend::new()).run(&request).unwrap() {
//!     println!("{}: {:?}", record.path.display(), record.url);
//! }
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod config;
mod error;
mod orchestrator;
pub mod protocol;
mod remote;

pub use config::{ComputeConfig, LogConfig, RemoteConfig, CONFIG_FILE, WORKSPACE_ROOT_ENV};
pub use error::ComputeError;
pub use orchestrator::{read_list_file, ComputeRequest, Orchestrator, Status, StatusRecord};
pub use remote::{claimed_prefixes, AnnexHost, ComputeRemote, OUTPUT_PARAMETER};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
