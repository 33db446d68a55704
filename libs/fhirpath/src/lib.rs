//! FHIRPath parser and evaluation engine
//!
//! The pipeline: source text → `parser` → AST → `compile` (bind against
//! the invocation table) → bound tree → `eval` against a resource and an
//! `EvalContext`, yielding a flat `Collection`.
//!
//! ```text
//! Expression String
//!      |
//!   Parser -> AST (grammar-labeled)
//!      |
//!   Compiler -> bound tree (functions resolved, arity checked)
//!      |
//!   Evaluator -> result Collection
//! ```
//!
//! The value algebra covers the System primitives, partial-precision
//! temporals, UCUM/calendar quantities and resource nodes; navigation is
//! model-aware (choice types, recursive paths, the type hierarchy).
//! Terminology scoring (`weight()`/`ordinal()`) is asynchronous and
//! opt-in; everything else evaluates synchronously.

pub mod ast;
pub mod compile;
pub mod context;
mod distinct;
pub mod engine;
pub mod error;
mod eval;
mod lexer;
pub mod node;
mod ops;
pub mod parser;
pub mod registry;
mod temporal;
mod temporal_parse;
mod token;
pub mod value;

pub use ast::AstNode;
pub use compile::CompiledExpression;
pub use context::{AsyncMode, EvalContext, NowSnapshot, TraceFn};
pub use engine::{resolve_internal_types, types, Engine, EvalOptions};
pub use error::{Error, Result, SyntaxIssue, SyntaxReport};
pub use node::ResourceNode;
pub use parser::parse;
pub use registry::{ParamKind, UserFunctionSpec, UserInvocationTable};
pub use value::{Collection, Value, ValueData};

pub use corten_terminology::CancelSignal;
