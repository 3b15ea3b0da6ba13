//! Query documents and their compilation into predicates.
//!
//! Compilation runs in two passes. The document is first parsed and checked
//! for shape only ([`QueryNode::parse`]), then every atom is resolved,
//! permission-checked and cleaned before the predicate tree is rebuilt
//! ([`QueryCompiler::compile`]).

mod atoms;
mod compiler;
mod document;
mod predicate;

pub use atoms::{AtomRef, Combinator, Shape, flatten, layers};
pub use compiler::{CompiledQuery, QueryCompiler};
pub use document::{AND, NOT, OR, QueryAtom, QueryDocument, QueryNode, RESERVED_PARAMS, XOR};
pub use predicate::{Comparison, FieldRef, Operator, Predicate, Transform};
