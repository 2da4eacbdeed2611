//! Linking and Execution
//!
//! Linkers turn a [`FunctionGraph`](crate::graph::FunctionGraph) into a
//! [`Linked`] program. Values move between thunks through shared
//! [`Storage`] cells, and callers set inputs and read outputs through typed
//! [`Container`]s.
//!
//! # Linkers
//!
//! - [`PerformLinker`] runs one thunk per node in schedule order and can
//!   free intermediates after their last use.
//! - [`WrapLinker`] links the same graph with several local linkers and
//!   hands each node's thunks to a user wrapper, which decides how to run
//!   them.

mod container;
mod linker;
mod perform;
mod storage;
mod wrap;

pub use container::{Container, Storage};
pub use linker::{
    Linked, LinkedGraph, Linker, LocalLinker, Program, ScheduledNode, Scheduler, Thunk,
};
pub use perform::PerformLinker;
pub use storage::{gc_helper, map_storage, StorageMap};
pub use wrap::{WrapLinker, Wrapper};
