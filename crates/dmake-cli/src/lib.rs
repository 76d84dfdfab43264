//! dmake Command Line
//!
//! Shared by the `dmake` binary and the `git-annex-remote-compute` special
//! remote:
//! - [`cli`] and [`dispatch`]: the `compute` and `provision` subcommands
//! - [`logging`]: stderr diagnostics filtered by `DMAKE_LOG`

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod commands;
pub mod logging;

pub use commands::{cli, compute_request, dispatch, render, Subcommand, SUBCOMMANDS};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
