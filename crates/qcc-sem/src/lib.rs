//! qcc-sem - Semantic Analyzer
//!
//! Resolves identifiers and types over the parsed AST and enforces C
//! static semantics. The crate is organized as:
//!
//! - [`types`]: the C type system — primitive singletons, derived type
//!   constructors, in-place record completion, layout, integer
//!   promotion, and the usual arithmetic conversions
//! - [`scope`]: scoped symbol tables with the three C namespaces
//!   (ordinary names, tags, labels) and stack-slot assignment
//! - [`analysis`]: the [`SemanticAnalyzer`] walking the tree and
//!   annotating every expression node with its resolved type
//! - [`fold`]: the integer constant folder shared by case labels,
//!   enumerators, array bounds, and static initializers
//!
//! After a clean `run`, every expression `NodeId` in the unit maps to a
//! [`Type`] in [`TypeContext::expr_types`]; downstream phases (the AST
//! optimizer and the IR lowering) read that table rather than the tree.

pub mod analysis;
mod convert;
mod fold;
pub mod scope;
pub mod types;

pub use analysis::SemanticAnalyzer;
pub use scope::{Binding, BindingId, BindingKind, ScopeKind, StorageSlot, SymbolTable};
pub use types::{
    Assignability, EnumRef, Field, FloatKind, FuncType, IntKind, RecordBody, RecordData,
    RecordRef, Type, TypeContext, TypeKind,
};
