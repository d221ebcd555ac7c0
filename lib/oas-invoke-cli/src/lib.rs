//! Command line front-end for `oas-invoke-core`.
//!
//! - `call` performs a single invocation and prints the outbound message,
//! - `assets` serves static client assets from a directory.

mod args;
pub mod assets;
mod call;

pub use self::args::{ASSETS_DIR_ENV, Command, HELP, SPEC_ENV};
pub use self::call::{CallArgs, run as run_call, write_output};
