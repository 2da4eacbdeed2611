//! The Linker Protocol
//!
//! A linker turns a [`FunctionGraph`] into something runnable. It decides
//! the execution order ([`Linker::schedule`]), allocates storage, asks each
//! op for a [`Thunk`] bound to that storage, and packs the result into a
//! [`Linked`] program with input and output containers.
//!
//! [`LocalLinker`]s build one thunk per apply node and expose them (with
//! the schedule and the storage map) through [`LocalLinker::make_all`], so
//! they can be composed by a [`WrapLinker`](super::WrapLinker).

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use tracing::warn;

use super::container::{Container, Storage};
use crate::error::{GraphError, Result};
use crate::graph::{ApplyId, FunctionGraph, Graph, VarId};
use crate::op::OpRef;
use crate::value::Value;

/// Custom scheduling function: returns the apply nodes of a function graph
/// in execution order.
pub type Scheduler = Arc<dyn Fn(&FunctionGraph<'_>) -> Result<Vec<ApplyId>> + Send + Sync>;

/// A runnable unit bound to fixed input and output storages.
pub struct Thunk {
    run: Box<dyn FnMut() -> Result<()> + Send>,
    inputs: Vec<Storage>,
    outputs: Vec<Storage>,
}

impl Thunk {
    pub fn new(
        inputs: Vec<Storage>,
        outputs: Vec<Storage>,
        run: impl FnMut() -> Result<()> + Send + 'static,
    ) -> Self {
        Self {
            run: Box::new(run),
            inputs,
            outputs,
        }
    }

    /// The default thunk of an op: read inputs, call
    /// [`perform`](crate::op::Op::perform), write outputs.
    pub fn from_perform(op: OpRef, inputs: Vec<Storage>, outputs: Vec<Storage>) -> Self {
        let (ins, outs) = (inputs.clone(), outputs.clone());
        Self::new(inputs, outputs, move || {
            let values = ins
                .iter()
                .enumerate()
                .map(|(position, storage)| {
                    storage.get().ok_or_else(|| GraphError::MissingValue {
                        op: op.name().to_string(),
                        position,
                    })
                })
                .collect::<Result<Vec<Value>>>()?;
            let mut results: Vec<Option<Value>> = outs.iter().map(Storage::get).collect();
            op.perform(&values, &mut results)?;
            for (storage, value) in outs.iter().zip(results) {
                storage.set(value);
            }
            Ok(())
        })
    }

    pub fn call(&mut self) -> Result<()> {
        (self.run)()
    }

    pub fn inputs(&self) -> &[Storage] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[Storage] {
        &self.outputs
    }
}

impl fmt::Debug for Thunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Thunk")
            .field("inputs", &self.inputs.len())
            .field("outputs", &self.outputs.len())
            .finish()
    }
}

/// The composite callable produced by a linker.
pub struct Program {
    run: Box<dyn FnMut() -> Result<()> + Send>,
}

impl Program {
    pub fn new(run: impl FnMut() -> Result<()> + Send + 'static) -> Self {
        Self { run: Box::new(run) }
    }

    pub fn call(&mut self) -> Result<()> {
        (self.run)()
    }
}

impl fmt::Debug for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Program")
    }
}

/// A scheduled apply node with what is needed to report errors about it.
#[derive(Debug, Clone)]
pub struct ScheduledNode {
    pub apply: ApplyId,
    pub op: OpRef,
    pub inputs: Vec<VarId>,
    pub outputs: Vec<VarId>,
    input_types: Vec<String>,
}

impl ScheduledNode {
    pub fn new(graph: &Graph, apply: ApplyId) -> Result<Self> {
        let node = graph.apply(apply)?;
        let input_types = node
            .inputs()
            .iter()
            .map(|v| graph.var(*v).map(|var| var.ty().to_string()))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            apply,
            op: node.op().clone(),
            inputs: node.inputs().to_vec(),
            outputs: node.outputs().to_vec(),
            input_types,
        })
    }

    /// Wrap an error raised while running this node.
    pub fn annotate(&self, source: GraphError) -> GraphError {
        warn!(apply = %self.apply, op = %self.op, error = %source, "thunk failed");
        GraphError::Execution {
            apply: self.apply,
            op: self.op.name().to_string(),
            inputs: self.input_types.join(", "),
            source: Box::new(source),
        }
    }
}

impl PartialEq for ScheduledNode {
    fn eq(&self, other: &Self) -> bool {
        self.apply == other.apply
    }
}

/// A linked program with its input and output containers.
#[derive(Debug)]
pub struct Linked {
    pub program: Program,
    pub inputs: Vec<Container>,
    pub outputs: Vec<Container>,
}

impl Linked {
    /// Run the program once without touching the inputs.
    pub fn run(&mut self) -> Result<()> {
        self.program.call()
    }

    /// Set the inputs to `args`, run, and return the outputs.
    pub fn call(&mut self, args: Vec<Value>) -> Result<Vec<Option<Value>>> {
        if args.len() != self.inputs.len() {
            return Err(GraphError::ArgumentCount {
                expected: self.inputs.len(),
                got: args.len(),
            });
        }
        for (container, arg) in self.inputs.iter().zip(args) {
            container.set(Some(arg))?;
        }
        self.program.call()?;
        Ok(self.outputs.iter().map(Container::get).collect())
    }
}

/// Everything a local linker built, before it is streamlined into a
/// single program.
#[derive(Debug)]
pub struct LinkedGraph {
    pub inputs: Vec<Container>,
    pub outputs: Vec<Container>,
    pub thunks: Vec<Thunk>,
    pub order: Vec<ScheduledNode>,
    pub storage_map: IndexMap<VarId, Storage>,
    /// Per node, storages to clear right after it runs.
    pub gc_plan: Option<Vec<Vec<Storage>>>,
    /// Storages cleared before every run.
    pub no_recycling: Vec<Storage>,
}

impl LinkedGraph {
    /// Fold the thunks into one program that runs them in order, applying
    /// the GC plan and wrapping errors with the failing node.
    pub fn streamline(self) -> Linked {
        let LinkedGraph {
            inputs,
            outputs,
            mut thunks,
            order,
            gc_plan,
            no_recycling,
            ..
        } = self;

        let program = Program::new(move || {
            for storage in &no_recycling {
                storage.clear();
            }
            for (position, (thunk, node)) in thunks.iter_mut().zip(&order).enumerate() {
                thunk.call().map_err(|e| node.annotate(e))?;
                if let Some(plan) = &gc_plan {
                    for storage in &plan[position] {
                        storage.clear();
                    }
                }
            }
            Ok(())
        });
        Linked {
            program,
            inputs,
            outputs,
        }
    }
}

/// Turns function graphs into programs.
pub trait Linker {
    /// Whether intermediate storage is freed as soon as possible.
    fn allow_gc(&self) -> bool;

    fn scheduler(&self) -> Option<&Scheduler> {
        None
    }

    /// Execution order: the custom scheduler if any, else a toposort.
    fn schedule(&self, fgraph: &FunctionGraph<'_>) -> Result<Vec<ApplyId>> {
        match self.scheduler() {
            Some(scheduler) => scheduler(fgraph),
            None => fgraph.toposort(),
        }
    }

    fn make_thunk(&self, fgraph: &FunctionGraph<'_>) -> Result<Linked>;
}

/// A linker that builds one thunk per apply node.
pub trait LocalLinker: Linker {
    fn make_all(
        &self,
        fgraph: &FunctionGraph<'_>,
        input_storage: Option<Vec<Storage>>,
    ) -> Result<LinkedGraph>;

    /// A boxed copy, with `allow_gc` overridden when given.
    fn clone_local(&self, allow_gc: Option<bool>) -> Box<dyn LocalLinker>;
}
