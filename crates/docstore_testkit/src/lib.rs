//! # Docstore Testkit
//!
//! Test utilities for the docstore client.
//!
//! This crate provides:
//! - An in-memory search cluster implementing `HttpClient`
//! - Fixtures wiring a connection to that cluster
//! - Property-based test generators using proptest
//!
//! ## Usage
//!
//! ```rust,ignore
//! use docstore_testkit::prelude::*;
//!
//! #[tokio::test]
//! async fn counts_documents() {
//!     let test = scenarios::seeded_cluster("adverts", 10);
//!     let count = test.collection("adverts").count(&background(), &match_all()).await.unwrap();
//!     assert_eq!(count.count, 10);
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fake;
pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fake::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
}

pub use fake::*;
pub use fixtures::*;
pub use generators::*;
