//! The Op Capability
//!
//! An [`Op`] is what an apply node applies. The core asks it for output
//! types when building nodes, for aliasing information when planning
//! storage, and for a runnable implementation when linking.
//!
//! Ops are shared as [`OpRef`]. Two `OpRef`s compare through
//! [`Op::equals`], which defaults to identity; ops with parameters should
//! override it with [`props_eq`].

use std::any::Any;
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::error::{GraphError, Result};
use crate::graph::{self, ApplyId, CloneOptions, Equiv, Graph, VarId};
use crate::link::{Storage, Thunk};
use crate::types::TypeRef;
use crate::value::Value;

/// `output index -> input indices` the output aliases.
pub type ViewMap = IndexMap<usize, Vec<usize>>;

/// `output index -> input indices` the output overwrites in place.
pub type DestroyMap = IndexMap<usize, Vec<usize>>;

pub trait Op: fmt::Debug + Send + Sync + 'static {
    fn name(&self) -> &str;

    fn as_any(&self) -> &dyn Any;

    /// Whether `other` computes the same function. Defaults to identity.
    fn equals(&self, other: &dyn Op) -> bool {
        std::ptr::addr_eq(self, other)
    }

    /// Types of the outputs produced when applied to `inputs`.
    ///
    /// Validates the inputs (arity, types) and fails if they are not
    /// acceptable.
    fn output_types(&self, graph: &Graph, inputs: &[VarId]) -> Result<Vec<TypeRef>>;

    /// Compute outputs from concrete inputs. `outputs` holds whatever the
    /// storage held before the call and may be reused.
    fn perform(&self, inputs: &[Value], outputs: &mut [Option<Value>]) -> Result<()>;

    /// Index of the output returned when the op is used as a function.
    fn default_output(&self) -> Option<usize> {
        None
    }

    /// `[input][output]` dependency pattern of `node`, `None` for fully
    /// connected.
    fn connection_pattern(&self, _graph: &Graph, _node: ApplyId) -> Option<Vec<Vec<bool>>> {
        None
    }

    fn view_map(&self) -> ViewMap {
        ViewMap::new()
    }

    fn destroy_map(&self) -> DestroyMap {
        DestroyMap::new()
    }

    /// Output types are a function of input values, not only input types.
    /// Substituting any input then always rebuilds the node.
    fn output_type_depends_on_input_value(&self) -> bool {
        false
    }

    fn inner_graph(&self) -> Option<&InnerGraph> {
        None
    }

    /// A copy of this op with its inner graph cloned, for ops that have one.
    fn clone_inner(&self) -> Option<OpRef> {
        None
    }

    /// A specialised thunk bound to the given storages. `None` makes the
    /// linker fall back to [`Op::perform`].
    fn make_thunk(&self, _inputs: &[Storage], _outputs: &[Storage]) -> Option<Thunk> {
        None
    }
}

/// [`Op::equals`] for ops whose parameters fully determine their function.
pub fn props_eq<T: Op + PartialEq>(this: &T, other: &dyn Op) -> bool {
    other.as_any().downcast_ref::<T>().is_some_and(|o| o == this)
}

/// Identity of an `OpRef` allocation, usable as a map key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OpKey(usize);

/// Shared handle to an [`Op`].
#[derive(Clone)]
pub struct OpRef(Arc<dyn Op>);

impl OpRef {
    pub fn new<O: Op>(op: O) -> Self {
        Self(Arc::new(op))
    }

    /// Same allocation, not just equal.
    pub fn ptr_eq(&self, other: &OpRef) -> bool {
        self.key() == other.key()
    }

    pub fn key(&self) -> OpKey {
        OpKey(Arc::as_ptr(&self.0) as *const () as usize)
    }

    pub fn downcast_ref<O: Op>(&self) -> Option<&O> {
        self.0.as_any().downcast_ref::<O>()
    }
}

impl Deref for OpRef {
    type Target = dyn Op;

    fn deref(&self) -> &Self::Target {
        &*self.0
    }
}

impl PartialEq for OpRef {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other) || self.0.equals(&*other.0)
    }
}

impl fmt::Debug for OpRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.0, f)
    }
}

impl fmt::Display for OpRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0.name())
    }
}

/// A graph nested inside an op, e.g. the body of a loop.
///
/// Built with [`InnerGraph::with_nominal_inputs`], the inputs are nominal
/// variables numbered by position, so two inner graphs computing the same
/// function from the same input types are structurally equal.
#[derive(Debug, Clone)]
pub struct InnerGraph {
    pub graph: Graph,
    pub inputs: Vec<VarId>,
    pub outputs: Vec<VarId>,
}

impl InnerGraph {
    pub fn new(graph: Graph, inputs: Vec<VarId>, outputs: Vec<VarId>) -> Self {
        Self {
            graph,
            inputs,
            outputs,
        }
    }

    /// Rewrite the graph so input `i` is the nominal variable `i` of its
    /// type.
    pub fn with_nominal_inputs(
        mut graph: Graph,
        inputs: &[VarId],
        outputs: &[VarId],
    ) -> Result<Self> {
        let (inputs, outputs) = graph::replace_nominals_with_dummies(&mut graph, inputs, outputs)?;

        let mut memo = Equiv::new();
        let mut nominal_inputs = Vec::with_capacity(inputs.len());
        for (position, &input) in inputs.iter().enumerate() {
            let ty = graph.var(input)?.ty().clone();
            let nominal = graph.nominal(ty, position as u64);
            memo.insert_var(input, nominal);
            nominal_inputs.push(nominal);
        }

        let options = CloneOptions {
            copy_inputs: false,
            copy_orphans: Some(false),
            ..CloneOptions::default()
        };
        graph::clone_get_equiv_into(&mut graph, &inputs, &outputs, options, &mut memo)?;

        let outputs = outputs
            .iter()
            .map(|o| memo.var(*o).ok_or(GraphError::Unmapped(*o)))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self::new(graph, nominal_inputs, outputs))
    }

    /// Deep copy with fresh node identities for everything but the
    /// (atomic) inputs.
    pub fn fresh_copy(&self) -> Result<Self> {
        let mut graph = self.graph.clone();
        let (inputs, outputs) = graph::clone(
            &mut graph,
            &self.inputs,
            &self.outputs,
            CloneOptions::default(),
        )?;
        Ok(Self::new(graph, inputs, outputs))
    }
}
