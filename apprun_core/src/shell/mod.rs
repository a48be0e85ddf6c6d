//! Command-line front end for the `apprun` binary.

pub mod cli;

pub use cli::{Cli, Command, run};
