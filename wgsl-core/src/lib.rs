#![forbid(unsafe_code)]

//! Semantic analysis and lowering for WGSL: name resolution, type checking,
//! overload selection, constant evaluation and the AST-to-IR builder.

mod error;
mod lower;
mod prune;
mod resolve;
pub mod builtins;
pub mod const_eval;
pub mod dependency;
pub mod features;
pub mod info;
pub mod overload;
pub mod symbols;

pub use builtins::{BuiltinTable, Overload};
pub use error::{LowerError, ResolveError};
pub use features::{Feature, FeatureSet};
pub use info::{CallTarget, EvalStage, ExprInfo, FunctionInfo, GlobalInfo, SemanticInfo};
pub use lower::lower;
pub use prune::single_entry_point;
pub use resolve::{resolve, resolve_with_builtins};
pub use symbols::{Symbol, SymbolTable};
