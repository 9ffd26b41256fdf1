//! pbapd CLI library
//!
//! Runs the phonebook access server coordinator against in-memory
//! collaborators and drives it from line-oriented commands, so the lifecycle
//! can be exercised without a Bluetooth stack.

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;

pub use cli::{Cli, Commands};
pub use commands::{CommandDispatcher, SimCommand};
pub use config::AppConfig;
pub use error::{CliError, Result};
