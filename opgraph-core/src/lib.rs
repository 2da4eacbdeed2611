//! Opgraph Core
//!
//! This crate provides the core of the opgraph symbolic computation engine.
//! It implements:
//!
//! - A typed graph of variables and apply nodes
//! - Traversal, ancestry and topological scheduling
//! - Cloning with substitution and structural equivalence checks
//! - Linkers that turn a graph into a runnable program
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `graph`: The node arena and every algorithm over it
//! - `op` and `types`: The capabilities ops and types plug in through
//! - `link`: Storage, thunks and the linkers
//! - `value` and `config`: Runtime data and linker settings
//!
//! # Example
//!
//! ```rust,ignore
//! use opgraph_core::graph::{FunctionGraph, Graph};
//! use opgraph_core::link::{Linker, PerformLinker};
//!
//! let mut graph = Graph::new();
//! let x = graph.variable(scalar_type(), Some("x"));
//! let y = graph.variable(scalar_type(), Some("y"));
//! let sum = graph.call(add_op(), &[x, y])?;
//!
//! let fgraph = FunctionGraph::new(&graph, vec![x, y], vec![sum])?;
//! let mut program = PerformLinker::new().make_thunk(&fgraph)?;
//! let outputs = program.call(vec![two, three])?;
//! ```

pub mod config;
pub mod error;
pub mod graph;
pub mod link;
pub mod op;
pub mod types;
pub mod value;

#[cfg(test)]
mod test_utils;

pub use config::LinkerConfig;
pub use error::{GraphError, Result, TypeError};
pub use graph::{ApplyId, FunctionGraph, Graph, VarId};
pub use op::{Op, OpRef};
pub use types::{TensorType, Type, TypeRef};
pub use value::{DType, Value};
