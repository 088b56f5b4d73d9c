//! # vela-core
//!
//! Core abstractions for the Vela asset reconciliation engine.
//!
//! This crate provides the foundational types used across all Vela
//! components:
//!
//! - **Asset Identity**: Strongly-typed, totally ordered asset keys
//! - **Error Types**: Shared error definitions and result types
//! - **Observability**: Structured logging bootstrap and span helpers
//!
//! ## Crate Boundary
//!
//! `vela-core` is the **only** crate allowed to define shared primitives.
//! Cross-component interaction happens via the types defined here.
//!
//! ## Example
//!
//! ```rust
//! use vela_core::prelude::*;
//!
//! let key = AssetKey::from_user_string("analytics/users").unwrap();
//! assert_eq!(key.segments(), ["analytics", "users"]);
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod asset_key;
pub mod error;
pub mod observability;

/// Prelude module for convenient imports.
///
/// # Example
///
/// ```rust
/// use vela_core::prelude::*;
/// ```
pub mod prelude {
    pub use crate::asset_key::{AssetKey, AssetKeyPartitionKey};
    pub use crate::error::{Error, Result};
    pub use crate::observability::{init_logging, LogFormat};
}

// Re-export key types at crate root for ergonomics
pub use asset_key::{AssetKey, AssetKeyPartitionKey};
pub use error::{Error, Result};
pub use observability::{init_logging, LogFormat};
