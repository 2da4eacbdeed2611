//! The sequential linker.

use std::fmt;

use tracing::{debug, instrument};

use super::container::{Container, Storage};
use super::linker::{Linked, LinkedGraph, Linker, LocalLinker, ScheduledNode, Scheduler, Thunk};
use super::storage::{gc_helper, map_storage};
use crate::config::LinkerConfig;
use crate::error::Result;
use crate::graph::FunctionGraph;

/// Runs one thunk per apply node, in schedule order, on the calling thread.
///
/// Ops supply their own thunk through
/// [`Op::make_thunk`](crate::op::Op::make_thunk); otherwise the node is run
/// through [`Op::perform`](crate::op::Op::perform). With `allow_gc` an
/// intermediate value is dropped right after its last reader has run.
#[derive(Clone, Default)]
pub struct PerformLinker {
    config: LinkerConfig,
    scheduler: Option<Scheduler>,
}

impl PerformLinker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: LinkerConfig) -> Self {
        Self {
            config,
            scheduler: None,
        }
    }

    pub fn with_scheduler(mut self, scheduler: Scheduler) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    /// A copy with `allow_gc` overridden when given.
    pub fn clone_with_gc(&self, allow_gc: Option<bool>) -> Self {
        let mut linker = self.clone();
        if let Some(allow_gc) = allow_gc {
            linker.config.allow_gc = allow_gc;
        }
        linker
    }

    pub fn config(&self) -> &LinkerConfig {
        &self.config
    }
}

impl fmt::Debug for PerformLinker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PerformLinker")
            .field("config", &self.config)
            .field("custom_scheduler", &self.scheduler.is_some())
            .finish()
    }
}

impl Linker for PerformLinker {
    fn allow_gc(&self) -> bool {
        self.config.allow_gc
    }

    fn scheduler(&self) -> Option<&Scheduler> {
        self.scheduler.as_ref()
    }

    fn make_thunk(&self, fgraph: &FunctionGraph<'_>) -> Result<Linked> {
        Ok(self.make_all(fgraph, None)?.streamline())
    }
}

impl LocalLinker for PerformLinker {
    #[instrument(level = "debug", skip_all, fields(inputs = fgraph.inputs().len(), outputs = fgraph.outputs().len()))]
    fn make_all(
        &self,
        fgraph: &FunctionGraph<'_>,
        input_storage: Option<Vec<Storage>>,
    ) -> Result<LinkedGraph> {
        let graph = fgraph.graph();
        let schedule = self.schedule(fgraph)?;
        let storage = map_storage(fgraph, &schedule, input_storage, None)?;

        let mut thunks = Vec::with_capacity(schedule.len());
        let mut order = Vec::with_capacity(schedule.len());
        for &apply in &schedule {
            let node = ScheduledNode::new(graph, apply)?;
            let inputs: Vec<Storage> = node
                .inputs
                .iter()
                .map(|v| storage.cells[v].clone())
                .collect();
            let outputs: Vec<Storage> = node
                .outputs
                .iter()
                .map(|v| storage.cells[v].clone())
                .collect();
            let thunk = match node.op.make_thunk(&inputs, &outputs) {
                Some(thunk) => thunk,
                None => Thunk::from_perform(node.op.clone(), inputs, outputs),
            };
            thunks.push(thunk);
            order.push(node);
        }

        let gc_plan = if self.allow_gc() {
            let (computed, last_user) = gc_helper(graph, &schedule)?;
            let plan: Vec<Vec<Storage>> = order
                .iter()
                .enumerate()
                .map(|(position, node)| {
                    let mut freed: Vec<Storage> = Vec::new();
                    for input in &node.inputs {
                        let last_read_here = last_user.get(input) == Some(&position);
                        if computed.contains(input)
                            && !fgraph.outputs().contains(input)
                            && last_read_here
                            && !freed.iter().any(|s| s.ptr_eq(&storage.cells[input]))
                        {
                            freed.push(storage.cells[input].clone());
                        }
                    }
                    freed
                })
                .collect();
            debug!(
                freed = plan.iter().map(Vec::len).sum::<usize>(),
                "gc plan built"
            );
            Some(plan)
        } else {
            None
        };

        let no_recycling: Vec<Storage> = fgraph
            .no_recycling()
            .iter()
            .filter(|v| !fgraph.inputs().contains(*v))
            .filter_map(|v| storage.cells.get(v).cloned())
            .collect();

        let inputs = fgraph
            .inputs()
            .iter()
            .zip(&storage.inputs)
            .map(|(var, cell)| {
                let v = graph.var(*var)?;
                Ok(Container::new(v.ty().clone(), cell.clone())
                    .named(v.name())
                    .strict(self.config.strict_inputs)
                    .allow_downcast(self.config.allow_downcast))
            })
            .collect::<Result<Vec<_>>>()?;
        let outputs = fgraph
            .outputs()
            .iter()
            .zip(&storage.outputs)
            .map(|(var, cell)| {
                let v = graph.var(*var)?;
                Ok(Container::new(v.ty().clone(), cell.clone())
                    .named(v.name())
                    .readonly(true))
            })
            .collect::<Result<Vec<_>>>()?;

        debug!(nodes = thunks.len(), cells = storage.cells.len(), "linked");
        Ok(LinkedGraph {
            inputs,
            outputs,
            thunks,
            order,
            storage_map: storage.cells,
            gc_plan,
            no_recycling,
        })
    }

    fn clone_local(&self, allow_gc: Option<bool>) -> Box<dyn LocalLinker> {
        Box::new(self.clone_with_gc(allow_gc))
    }
}
