//! Topological Scheduler
//!
//! Orders apply nodes so every node comes after the nodes computing its
//! inputs.
//!
//! # Algorithm
//!
//! [`general_toposort`] is Kahn's algorithm over an arbitrary dependency
//! function:
//!
//! 1. Walk depth-first from the outputs, asking `deps` once per node
//! 2. Build the reverse (client) map from the collected dependencies
//! 3. Seed a FIFO queue with nodes that have no dependencies
//! 4. Pop a node, emit it, and release clients whose last dependency it was
//!
//! If fewer nodes are emitted than were discovered, something was never
//! released: the graph has a cycle.
//!
//! [`io_toposort`] specialises this to the bipartite variable/apply graph.
//! Without extra orderings or a clients request it uses a cheaper explicit
//! stack instead, which detects cycles with an in-progress set.

use std::collections::{HashMap, HashSet, VecDeque};
use std::hash::Hash;
use std::ops::ControlFlow;

use tracing::{debug, trace};

use super::walk::{walk_with_children, WalkOrder};
use super::{ApplyId, Graph, VarId};
use crate::error::{GraphError, Result};

/// A node of the bipartite graph seen by [`io_toposort`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GraphNode {
    Var(VarId),
    Apply(ApplyId),
}

/// Sort everything reachable from `outputs` so that each node comes after
/// all of `deps(node)`.
///
/// `deps` is called at most once per node. When `clients` is given it is
/// extended with the reverse adjacency (`node -> nodes depending on it`).
pub fn general_toposort<T, I, F>(
    outputs: I,
    mut deps: F,
    clients: Option<&mut HashMap<T, Vec<T>>>,
) -> Result<Vec<T>>
where
    T: Copy + Eq + Hash,
    I: IntoIterator<Item = T>,
    F: FnMut(T) -> Vec<T>,
{
    let mut remaining: HashMap<T, Vec<T>> = HashMap::new();
    let search: Vec<(T, Vec<T>)> = walk_with_children(
        outputs,
        |node: &T| {
            let node_deps = remaining.entry(*node).or_insert_with(|| deps(*node));
            if node_deps.is_empty() {
                None
            } else {
                Some(node_deps.clone())
            }
        },
        WalkOrder::DepthFirst,
    )
    .map(|(node, children)| (node, children.unwrap_or_default()))
    .collect();

    let mut client_map: HashMap<T, Vec<T>> = HashMap::new();
    let mut ready: VecDeque<T> = VecDeque::new();
    for (node, node_deps) in &search {
        for dep in node_deps {
            client_map.entry(*dep).or_default().push(*node);
        }
        if node_deps.is_empty() {
            ready.push_back(*node);
        }
    }

    let mut done: HashSet<T> = HashSet::with_capacity(search.len());
    let mut order: Vec<T> = Vec::with_capacity(search.len());
    while let Some(node) = ready.pop_front() {
        if !done.insert(node) {
            continue;
        }
        order.push(node);
        let Some(node_clients) = client_map.get(&node) else {
            continue;
        };
        for client in node_clients {
            let left = remaining.entry(*client).or_default();
            left.retain(|d| *d != node);
            if left.is_empty() {
                ready.push_back(*client);
            }
        }
    }

    if order.len() != search.len() {
        debug!(
            sorted = order.len(),
            discovered = search.len(),
            "cycle detected in toposort"
        );
        return Err(GraphError::Cycle);
    }

    if let Some(clients) = clients {
        for (node, node_clients) in client_map {
            clients.entry(node).or_default().extend(node_clients);
        }
    }
    trace!(nodes = order.len(), "general toposort complete");
    Ok(order)
}

/// Apply nodes between `inputs` and `outputs` in a valid execution order.
///
/// Variables in `inputs` are treated as having no dependencies, so nodes
/// above them are not scheduled. `orderings` adds extra constraints
/// (`apply -> applies that must run before it`). When `clients` is given it
/// receives the reverse adjacency of the bipartite graph.
pub fn io_toposort(
    graph: &Graph,
    inputs: &[VarId],
    outputs: &[VarId],
    orderings: Option<&HashMap<ApplyId, Vec<ApplyId>>>,
    clients: Option<&mut HashMap<GraphNode, Vec<GraphNode>>>,
) -> Result<Vec<ApplyId>> {
    let orderings = orderings.filter(|o| !o.is_empty());

    if orderings.is_none() && clients.is_none() {
        let roots: Vec<ApplyId> = outputs
            .iter()
            .rev()
            .filter(|o| !inputs.contains(*o))
            .filter_map(|o| graph.owner_of(*o))
            .map(|owner| owner.apply)
            .collect();
        let mut order = Vec::new();
        // The visitor never breaks, so the traversal always runs to the end.
        let _ = stack_order(graph, roots, inputs.iter().copied().collect(), |apply| {
            order.push(apply);
            ControlFlow::Continue(())
        })?;
        debug!(nodes = order.len(), "io toposort (stack)");
        return Ok(order);
    }

    let input_set: HashSet<VarId> = inputs.iter().copied().collect();
    let deps = |node: GraphNode| -> Vec<GraphNode> {
        match node {
            GraphNode::Var(var) if input_set.contains(&var) => Vec::new(),
            GraphNode::Var(var) => graph
                .owner_of(var)
                .map(|owner| vec![GraphNode::Apply(owner.apply)])
                .unwrap_or_default(),
            GraphNode::Apply(apply) => {
                let mut deps: Vec<GraphNode> = graph
                    .inputs_of(apply)
                    .iter()
                    .map(|v| GraphNode::Var(*v))
                    .collect();
                if let Some(extra) = orderings.and_then(|o| o.get(&apply)) {
                    deps.extend(extra.iter().map(|a| GraphNode::Apply(*a)));
                }
                deps
            }
        }
    };

    let sorted = general_toposort(outputs.iter().map(|v| GraphNode::Var(*v)), deps, clients)?;
    let order: Vec<ApplyId> = sorted
        .into_iter()
        .filter_map(|node| match node {
            GraphNode::Apply(apply) => Some(apply),
            GraphNode::Var(_) => None,
        })
        .collect();
    debug!(nodes = order.len(), "io toposort (kahn)");
    Ok(order)
}

/// Explicit-stack post-order over apply nodes starting at `roots` (the last
/// root is expanded first). Variables in `computed` count as available.
///
/// `visit` is called for each apply once its inputs are available and can
/// stop the traversal early; the return value tells whether it did.
pub(crate) fn stack_order(
    graph: &Graph,
    roots: Vec<ApplyId>,
    mut computed: HashSet<VarId>,
    mut visit: impl FnMut(ApplyId) -> ControlFlow<()>,
) -> Result<ControlFlow<()>> {
    let mut todo: Vec<(ApplyId, bool)> = roots.into_iter().map(|a| (a, false)).collect();
    let mut in_progress: HashSet<ApplyId> = HashSet::new();
    let mut visited: HashSet<ApplyId> = HashSet::new();

    while let Some((current, expanded)) = todo.pop() {
        let node = graph.apply(current)?;
        let outputs_known =
            !node.outputs().is_empty() && node.outputs().iter().all(|o| computed.contains(o));
        if visited.contains(&current) || outputs_known {
            continue;
        }

        let ready = node
            .inputs()
            .iter()
            .all(|i| computed.contains(i) || graph.owner_of(*i).is_none());
        if ready {
            computed.extend(node.outputs().iter().copied());
            visited.insert(current);
            in_progress.remove(&current);
            if visit(current).is_break() {
                return Ok(ControlFlow::Break(()));
            }
        } else if expanded || !in_progress.insert(current) {
            debug!(apply = %current, "cycle detected in stack toposort");
            return Err(GraphError::Cycle);
        } else {
            todo.push((current, true));
            todo.extend(
                node.inputs()
                    .iter()
                    .filter(|i| !computed.contains(*i))
                    .filter_map(|i| graph.owner_of(*i))
                    .map(|owner| (owner.apply, false)),
            );
        }
    }
    Ok(ControlFlow::Continue(()))
}
