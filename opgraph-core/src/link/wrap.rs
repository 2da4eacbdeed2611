//! Running several local linkers side by side.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, instrument};

use super::container::Storage;
use super::linker::{Linked, Linker, LocalLinker, Program, ScheduledNode, Thunk};
use crate::error::{GraphError, Result};
use crate::graph::FunctionGraph;

/// Called once per scheduled node with its position, the node and the
/// thunk of every wrapped linker for that node. It is responsible for
/// calling the thunks it wants run.
pub type Wrapper = Arc<dyn Fn(usize, &ScheduledNode, &mut [Thunk]) -> Result<()> + Send + Sync>;

/// Links a function graph with every linker in `linkers` and runs their
/// programs in lockstep through `wrapper`.
///
/// Each linker gets storage of its own. Before every run the values of the
/// first linker's inputs are copied into the others, and the first
/// linker's containers are the ones handed back to the caller.
pub struct WrapLinker {
    linkers: Vec<Box<dyn LocalLinker>>,
    wrapper: Wrapper,
}

impl WrapLinker {
    pub fn new(linkers: Vec<Box<dyn LocalLinker>>, wrapper: Wrapper) -> Self {
        Self { linkers, wrapper }
    }

    /// A wrap linker whose wrapper calls each of `wrappers` in turn,
    /// stopping at the first error.
    pub fn many(linkers: Vec<Box<dyn LocalLinker>>, wrappers: Vec<Wrapper>) -> Self {
        let wrapper: Wrapper = Arc::new(move |position: usize, node: &ScheduledNode, thunks: &mut [Thunk]| {
            for wrapper in &wrappers {
                wrapper(position, node, &mut *thunks)?;
            }
            Ok(())
        });
        Self::new(linkers, wrapper)
    }

    /// A wrapper that calls every thunk of the group in order.
    pub fn run_all() -> Wrapper {
        Arc::new(|_: usize, _: &ScheduledNode, thunks: &mut [Thunk]| {
            for thunk in thunks {
                thunk.call()?;
            }
            Ok(())
        })
    }

    /// A copy whose wrapped linkers have `allow_gc` overridden when given.
    pub fn clone_with_gc(&self, allow_gc: Option<bool>) -> Self {
        Self {
            linkers: self
                .linkers
                .iter()
                .map(|linker| linker.clone_local(allow_gc))
                .collect(),
            wrapper: Arc::clone(&self.wrapper),
        }
    }

    pub fn linkers(&self) -> &[Box<dyn LocalLinker>] {
        &self.linkers
    }
}

impl Clone for WrapLinker {
    fn clone(&self) -> Self {
        self.clone_with_gc(None)
    }
}

impl fmt::Debug for WrapLinker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WrapLinker")
            .field("linkers", &self.linkers.len())
            .finish()
    }
}

impl Linker for WrapLinker {
    fn allow_gc(&self) -> bool {
        self.linkers.first().is_some_and(|linker| linker.allow_gc())
    }

    #[instrument(level = "debug", skip_all, fields(linkers = self.linkers.len()))]
    fn make_thunk(&self, fgraph: &FunctionGraph<'_>) -> Result<Linked> {
        if self.linkers.is_empty() {
            return Err(GraphError::NoLinkers);
        }
        let builds = self
            .linkers
            .iter()
            .map(|linker| linker.make_all(fgraph, None))
            .collect::<Result<Vec<_>>>()?;

        let order = builds[0].order.clone();
        for build in &builds[1..] {
            if build.order != order {
                return Err(GraphError::OrderMismatch);
            }
        }

        let mut builds = builds.into_iter();
        let Some(primary) = builds.next() else {
            return Err(GraphError::NoLinkers);
        };
        let mut secondary_inputs: Vec<Vec<Storage>> = Vec::new();
        let mut thunk_lists = vec![primary.thunks];
        for build in builds {
            secondary_inputs.push(build.inputs.iter().map(|c| c.storage().clone()).collect());
            thunk_lists.push(build.thunks);
        }

        // Transpose per-linker thunk lists into per-node groups.
        let mut groups: Vec<Vec<Thunk>> = order.iter().map(|_| Vec::new()).collect();
        for thunks in thunk_lists {
            for (group, thunk) in groups.iter_mut().zip(thunks) {
                group.push(thunk);
            }
        }

        let mut to_reset: Vec<Storage> = Vec::new();
        for (group, node) in groups.iter().zip(&order) {
            for (j, output) in node.outputs.iter().enumerate() {
                if fgraph.no_recycling().contains(output) {
                    to_reset.extend(group.iter().filter_map(|t| t.outputs().get(j).cloned()));
                }
            }
        }
        debug!(nodes = order.len(), reset = to_reset.len(), "wrapped");

        let primary_inputs: Vec<Storage> =
            primary.inputs.iter().map(|c| c.storage().clone()).collect();
        let wrapper = Arc::clone(&self.wrapper);
        let program = Program::new(move || {
            for inputs in &secondary_inputs {
                for (from, to) in primary_inputs.iter().zip(inputs) {
                    to.set(from.get());
                }
            }
            for storage in &to_reset {
                storage.clear();
            }
            for (position, (group, node)) in groups.iter_mut().zip(&order).enumerate() {
                wrapper(position, node, group.as_mut_slice()).map_err(|e| node.annotate(e))?;
            }
            Ok(())
        });

        Ok(Linked {
            program,
            inputs: primary.inputs,
            outputs: primary.outputs,
        })
    }
}

#[cfg(test)]
mod tests {
    use parking_lot::Mutex;

    use super::*;
    use crate::graph::{ApplyId, Graph};
    use crate::link::PerformLinker;
    use crate::test_utils::{add, fscalar, mul, neg};
    use crate::value::{DType, Value};

    fn scalar(v: f64) -> Value {
        Value::scalar(DType::Float64, v)
    }

    fn perform_linkers(n: usize) -> Vec<Box<dyn LocalLinker>> {
        (0..n)
            .map(|_| Box::new(PerformLinker::new()) as Box<dyn LocalLinker>)
            .collect()
    }

    #[test]
    fn runs_every_linker_in_lockstep() {
        let mut graph = Graph::new();
        let x = graph.variable(fscalar(), Some("x"));
        let y = graph.variable(fscalar(), Some("y"));
        let xy = add(&mut graph, x, y);
        let out = mul(&mut graph, xy, x);
        let fgraph = FunctionGraph::new(&graph, vec![x, y], vec![out]).unwrap();

        let seen: Arc<Mutex<Vec<(usize, usize)>>> = Arc::default();
        let record = Arc::clone(&seen);
        let wrapper: Wrapper = Arc::new(move |position: usize, _: &ScheduledNode, thunks: &mut [Thunk]| {
            record.lock().push((position, thunks.len()));
            for thunk in thunks.iter_mut() {
                thunk.call()?;
            }
            // Every linker computed the same value.
            let values: Vec<_> = thunks.iter().map(|t| t.outputs()[0].get()).collect();
            assert!(values.windows(2).all(|w| w[0] == w[1]));
            Ok(())
        });

        let mut linked = WrapLinker::new(perform_linkers(2), wrapper)
            .make_thunk(&fgraph)
            .unwrap();
        let result = linked.call(vec![scalar(2.0), scalar(3.0)]).unwrap();
        assert_eq!(result, vec![Some(scalar(10.0))]);
        assert_eq!(*seen.lock(), vec![(0, 2), (1, 2)]);
    }

    #[test]
    fn many_runs_wrappers_in_turn() {
        let mut graph = Graph::new();
        let x = graph.variable(fscalar(), None);
        let out = neg(&mut graph, x);
        let fgraph = FunctionGraph::new(&graph, vec![x], vec![out]).unwrap();

        let visits: Arc<Mutex<Vec<ApplyId>>> = Arc::default();
        let record = Arc::clone(&visits);
        let log: Wrapper = Arc::new(move |_: usize, node: &ScheduledNode, _: &mut [Thunk]| {
            record.lock().push(node.apply);
            Ok(())
        });

        let mut linked = WrapLinker::many(perform_linkers(1), vec![log, WrapLinker::run_all()])
            .make_thunk(&fgraph)
            .unwrap();
        assert_eq!(linked.call(vec![scalar(4.0)]).unwrap(), vec![Some(scalar(-4.0))]);
        assert_eq!(visits.lock().len(), 1);
    }

    #[test]
    fn needs_a_linker() {
        let mut graph = Graph::new();
        let x = graph.variable(fscalar(), None);
        let fgraph = FunctionGraph::new(&graph, vec![x], vec![x]).unwrap();
        assert!(matches!(
            WrapLinker::new(Vec::new(), WrapLinker::run_all()).make_thunk(&fgraph),
            Err(GraphError::NoLinkers)
        ));
    }

    fn reverse_toposort(fgraph: &FunctionGraph<'_>) -> Result<Vec<ApplyId>> {
        let mut order = fgraph.toposort()?;
        order.reverse();
        Ok(order)
    }

    #[test]
    fn schedules_must_agree() {
        let mut graph = Graph::new();
        let x = graph.variable(fscalar(), None);
        let l = neg(&mut graph, x);
        let r = neg(&mut graph, x);
        let fgraph = FunctionGraph::new(&graph, vec![x], vec![l, r]).unwrap();

        let reversed = PerformLinker::new().with_scheduler(Arc::new(reverse_toposort));
        let linkers: Vec<Box<dyn LocalLinker>> =
            vec![Box::new(PerformLinker::new()), Box::new(reversed)];
        assert!(matches!(
            WrapLinker::new(linkers, WrapLinker::run_all()).make_thunk(&fgraph),
            Err(GraphError::OrderMismatch)
        ));
    }

    #[test]
    fn clone_with_gc_reaches_wrapped_linkers() {
        let linker = WrapLinker::new(perform_linkers(2), WrapLinker::run_all());
        assert!(linker.allow_gc());
        let no_gc = linker.clone_with_gc(Some(false));
        assert!(!no_gc.allow_gc());
        assert!(no_gc.linkers().iter().all(|l| !l.allow_gc()));
    }
}
