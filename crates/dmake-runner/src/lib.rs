//! dmake Template Runner
//!
//! Resolves a computation template against a parameter mapping and runs it
//! as a child process in a given working directory. Parameters always reach
//! the process as discrete arguments or environment values, never through a
//! shell string built here.
//!
//! # Example
//!
//! ```rust,no_run
//! use dmake_codec::Parameters;
//! use dmake_runner::TemplateRunner;
//! use std::path::Path;
//!
//! let params = Parameters::parse_assignments(["factor=2"]).unwrap();
//! let outcome = TemplateRunner::new()
//!     .run(
//!         Path::new("/ds/.datalad/compute/methods/double.sh"),
//!         &params,
//!         Path::new("/ds"),
//!     )
//!     .unwrap();
//! println!("ran {} in {:?}", outcome.program, outcome.duration);
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod error;
mod runner;
mod template;

pub use error::{ExitState, RunnerError};
pub use runner::{RunOutcome, TemplateRunner};
pub use template::{substitute, Invocation, Recipe, Template, RECIPE_EXTENSION};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
