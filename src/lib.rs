//! JSON Schema Validator
//!
//! A compiler and validation engine for JSON Schema draft 2020-12.
//!
//! ## Features
//!
//! - **Reference resolution**: `$ref`, `$dynamicRef`, `$id`, `$anchor`,
//!   `$dynamicAnchor` and JSON Pointer fragments, with on-demand fetching
//!   of remote schema documents through a pluggable [`SchemaFetcher`]
//! - **Cycle-safe compilation**: recursive schemas compile into a finite
//!   instruction graph via placeholder memoization
//! - **Full applicator semantics**: `allOf`/`anyOf`/`oneOf`/`not`,
//!   `if`/`then`/`else`, and the cross-keyword evaluation tracking behind
//!   `unevaluatedProperties` / `unevaluatedItems`
//! - **Shareable compiled form**: a [`Validator`] is immutable and can be
//!   used from any number of threads concurrently
//!
//! ## Architecture
//!
//! ```text
//! schema JSON ──> Indexer ──> Reference resolver ──> Compiler ──> Validator
//!                 (URI map)   (node links, fetch)    (instructions)   │
//!                                                                     ▼
//! instance JSON ─────────────────────────────────────────────> {ok, errors}
//! ```
//!
//! ## Example
//!
//! ```
//! use serde_json::json;
//! use schema_validate::Validator;
//!
//! let validator = Validator::new(json!({
//!     "type": "object",
//!     "properties": { "name": { "type": "string" } },
//!     "required": ["name"]
//! }))?;
//!
//! assert!(validator.validate(&json!({"name": "box"})).ok);
//! assert!(!validator.validate(&json!({})).ok);
//! # Ok::<(), schema_validate::SchemaError>(())
//! ```

mod compiler;
mod engine;
pub mod error;
pub mod fetch;
mod format;
mod index;
mod instr;
mod resolver;
mod uri;
mod validator;

pub use error::{Result, SchemaError};
#[cfg(feature = "remote")]
pub use fetch::HttpFetcher;
pub use fetch::{DirFetcher, NoNetworkFetcher, SchemaFetcher};
pub use uri::DEFAULT_ROOT;
pub use validator::{is_valid, Validation, Validator};
