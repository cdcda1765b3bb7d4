//! # sourcery-rs
//!
//! Resolves chains of source maps (compile → bundle → minify) into a single
//! map from the final artifact back to the original sources.
//!
//! ## Example
//!
//! ```rust,no_run
//! use sourcery_rs::{Options, load_sync};
//!
//! let options = Options::default();
//! if let Some(mut chain) = load_sync("dist/app.min.js", &options).expect("load failed") {
//!     let traced = chain.trace(1, Some(31), &options);
//!     println!("{traced:?}");
//!     chain.write_sync(None, &options).expect("write failed");
//! }
//! ```

pub mod chain;
pub mod codec;
pub mod comment;
pub mod loader;
pub mod node;
pub mod options;
pub mod path;
pub mod sourcemap;
pub mod trace;
pub mod writer;

use std::path::PathBuf;

pub use chain::{Chain, Stats};
pub use codec::{DecodeCache, Mappings, Origin, Segment};
pub use loader::{Loader, load, load_content, load_sync};
pub use node::{Node, NodeGraph, NodeId};
pub use options::{Flatten, Options, SourceMappingUrl};
pub use sourcemap::SourceMap;
pub use trace::Trace;
pub use writer::Emit;

#[derive(Debug, thiserror::Error)]
pub enum SourceryError {
    #[error("malformed mappings: {reason}")]
    MalformedMapping { reason: String },

    #[error("invalid source map ({url}): {reason}")]
    InvalidSourceMap { url: String, reason: String },

    #[error("a source must specify either a file or content")]
    MissingInput,

    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize source map: {0}")]
    Serialize(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, SourceryError>;
