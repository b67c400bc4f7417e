//! # relsync Testkit
//!
//! Test utilities for relsync.
//!
//! This crate provides:
//! - A sample staff schema and workspace fixtures over an in-memory driver
//! - Property-based test generators using proptest
//! - Concurrency stress helpers for the identity caches
//!
//! ## Usage
//!
//! ```rust,ignore
//! use relsync_testkit::prelude::*;
//!
//! #[test]
//! fn test_with_workspace() {
//!     with_workspace(|fx| {
//!         let rows = fx.load_departments(&[(1, "Research", "RD")]);
//!         // ... test operations
//!     });
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod stress;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::stress::*;
}

pub use fixtures::*;
pub use generators::*;
pub use stress::*;
