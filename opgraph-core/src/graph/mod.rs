//! Computation Graph
//!
//! This module implements the symbolic graph: typed variables connected by
//! apply nodes, plus the algorithms that walk, order, copy and compare it.
//!
//! # Overview
//!
//! The graph is a bipartite directed acyclic graph where:
//!
//! - Variables represent values (graph inputs, constants, op outputs)
//! - Apply nodes represent one use of an op, reading input variables and
//!   owning output variables
//!
//! A graph is whatever is reachable from a set of outputs by following
//! owners and inputs backwards. There is no separate edge list.
//!
//! # Design Decisions
//!
//! 1. Nodes live in a [`Graph`] arena and refer to each other by handle
//!    ([`VarId`], [`ApplyId`]). This avoids reference cycles between an
//!    apply and its outputs and makes handles cheap map keys.
//!
//! 2. The arena is append-only. Cloning and substitution create new nodes
//!    next to the old ones; nothing reachable is rewritten in place.
//!
//! 3. Nominal variables are interned by the arena's own
//!    [`NominalRegistry`] rather than a process-wide table.

mod arena;
mod clone;
mod equal;
mod fgraph;
mod node;
mod nominal;
mod printing;
mod toposort;
mod walk;

pub use arena::Graph;
pub use clone::{
    clone, clone_get_equiv, clone_get_equiv_into, clone_node_and_cache,
    replace_nominals_with_dummies, CloneOptions, Equiv,
};
pub use equal::equal_computations;
pub use fgraph::FunctionGraph;
pub use node::{Apply, ApplyId, Owner, Serial, Tag, VarId, VarKind, Variable};
pub use nominal::NominalRegistry;
pub use printing::{as_string, as_string_with, default_node_formatter, op_as_string};
pub use toposort::{general_toposort, io_toposort, GraphNode};
pub use walk::{
    ancestors, apply_depends_on, applys_between, explicit_graph_inputs, graph_inputs,
    io_connection_pattern, orphans_between, truncated_graph_inputs, variable_depends_on,
    vars_between, view_roots, walk, walk_with_children, Walk, WalkOrder, WalkWithChildren,
};
