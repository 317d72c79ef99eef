//! # Sonic Map Common Library
//!
//! Shared code for the Sonic Map crates:
//! - Preview catalog records (key → clip locator + gain)
//! - Configuration file resolution
//! - Common error type

pub mod catalog;
pub mod config;
pub mod error;

pub use catalog::{AudioResourceDescriptor, Catalog};
pub use error::{Error, Result};
