//! qcc-util - Core Utilities and Foundation Types
//!
//! This crate provides the foundation types shared by every phase of the
//! QCC compiler:
//!
//! - [`span`]: source locations ([`Span`], [`FileId`]) and the
//!   [`SourceMap`] owning every loaded file
//! - [`diagnostic`]: the shared [`Handler`] with `file:line:col` rendering
//! - [`symbol`]: 4-byte interned-string handles ([`Symbol`])
//! - [`arena`]: the compile-job bump region ([`CompileArena`])
//! - [`index_vec`]: typed indices for IR tables
//! - [`features`]: the per-standard language feature matrix
//! - [`target`]: architecture enumeration and data models
//!
//! Everything here is a leaf: no other qcc crate is a dependency, and all
//! of them depend on this one.

pub mod arena;
pub mod diagnostic;
pub mod error;
pub mod features;
pub mod index_vec;
pub mod span;
pub mod symbol;
pub mod target;

pub use arena::CompileArena;
pub use diagnostic::{Diagnostic, Handler, Level};
pub use error::{ConfigError, ConfigResult};
pub use features::{Feature, FeatureSet, Standard};
pub use index_vec::{Idx, IndexVec};
pub use span::{FileId, SourceFile, SourceMap, Span};
pub use symbol::Symbol;
pub use target::{Arch, DataModel};
