//! Multiarch Core - Foundational Types and Abstractions
//!
//! This module provides the error type and shared constants used across
//! the multiarch workspace.

pub mod error;

// Re-export commonly used types
pub use error::{MultiarchError, Result};

/// Multiarch version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
