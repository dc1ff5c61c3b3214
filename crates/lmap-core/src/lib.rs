//! # lmap-core
//!
//! Foundational types shared by the lmap directory object-mapper.
//!
//! ## Modules
//!
//! - [`error`] - Error type covering cache, tree and remote directory failures
//! - [`config`] - Connection configuration for directory clients

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod error;

// Re-export commonly used types
pub use config::{BindCredentials, DirectoryConfig};
pub use error::{Error, Result};
