//! Graph Traversal
//!
//! A generic lazy walk plus the graph queries built on it.
//!
//! # Walk order
//!
//! [`WalkOrder::DepthFirst`] keeps pending nodes on a stack: the children of
//! the most recently expanded node are visited first, last child first.
//! This is not the pre-order of a recursive DFS. Queries that want to visit
//! inputs left to right (such as [`ancestors`]) therefore push them
//! reversed.
//!
//! # Lenient handles
//!
//! The queries here never fail on an unknown handle; such a variable reads
//! as a root. Functions that need the scheduler (and can hit a cycle)
//! return [`Result`].

use std::collections::{HashMap, HashSet, VecDeque};
use std::hash::Hash;
use std::ops::ControlFlow;

use super::toposort::{io_toposort, stack_order};
use super::{ApplyId, Graph, VarId};
use crate::error::Result;

/// Discipline used by [`walk`] for pending nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WalkOrder {
    /// FIFO queue.
    #[default]
    BreadthFirst,
    /// LIFO stack.
    DepthFirst,
}

/// Iterator returned by [`walk_with_children`].
pub struct WalkWithChildren<T, F> {
    pending: VecDeque<T>,
    seen: HashSet<T>,
    expand: F,
    order: WalkOrder,
}

impl<T, F> Iterator for WalkWithChildren<T, F>
where
    T: Copy + Eq + Hash,
    F: FnMut(&T) -> Option<Vec<T>>,
{
    type Item = (T, Option<Vec<T>>);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let node = match self.order {
                WalkOrder::BreadthFirst => self.pending.pop_front(),
                WalkOrder::DepthFirst => self.pending.pop_back(),
            }?;
            if !self.seen.insert(node) {
                continue;
            }
            let children = (self.expand)(&node);
            if let Some(children) = &children {
                self.pending.extend(children.iter().copied());
            }
            return Some((node, children));
        }
    }
}

/// Iterator returned by [`walk`].
pub struct Walk<T, F>(WalkWithChildren<T, F>);

impl<T, F> Iterator for Walk<T, F>
where
    T: Copy + Eq + Hash,
    F: FnMut(&T) -> Option<Vec<T>>,
{
    type Item = T;

    fn next(&mut self) -> Option<T> {
        self.0.next().map(|(node, _)| node)
    }
}

/// Lazily visit every node reachable from `nodes` through `expand`, each
/// exactly once.
pub fn walk<T, I, F>(nodes: I, expand: F, order: WalkOrder) -> Walk<T, F>
where
    T: Copy + Eq + Hash,
    I: IntoIterator<Item = T>,
    F: FnMut(&T) -> Option<Vec<T>>,
{
    Walk(walk_with_children(nodes, expand, order))
}

/// Like [`walk`] but also yields what `expand` returned for each node.
pub fn walk_with_children<T, I, F>(nodes: I, expand: F, order: WalkOrder) -> WalkWithChildren<T, F>
where
    T: Copy + Eq + Hash,
    I: IntoIterator<Item = T>,
    F: FnMut(&T) -> Option<Vec<T>>,
{
    WalkWithChildren {
        pending: nodes.into_iter().collect(),
        seen: HashSet::new(),
        expand,
        order,
    }
}

/// Every variable `outputs` depend on, depth-first. Descent stops at
/// `blockers`, which are still yielded.
pub fn ancestors<'g>(
    graph: &'g Graph,
    outputs: &[VarId],
    blockers: &[VarId],
) -> impl Iterator<Item = VarId> + 'g {
    let blockers: HashSet<VarId> = blockers.iter().copied().collect();
    walk(
        outputs.to_vec(),
        move |var: &VarId| {
            if blockers.contains(var) {
                return None;
            }
            let owner = graph.owner_of(*var)?;
            Some(graph.inputs_of(owner.apply).iter().rev().copied().collect())
        },
        WalkOrder::DepthFirst,
    )
}

/// Ancestors without an owner.
pub fn graph_inputs<'g>(
    graph: &'g Graph,
    outputs: &[VarId],
    blockers: &[VarId],
) -> impl Iterator<Item = VarId> + 'g {
    ancestors(graph, outputs, blockers).filter(move |v| graph.owner_of(*v).is_none())
}

/// Graph inputs that must be supplied by a caller: constants and shared
/// variables are excluded.
pub fn explicit_graph_inputs<'g>(
    graph: &'g Graph,
    outputs: &[VarId],
) -> impl Iterator<Item = VarId> + 'g {
    graph_inputs(graph, outputs, &[]).filter(move |v| {
        graph
            .var(*v)
            .map_or(true, |var| !var.is_constant() && !var.is_shared())
    })
}

/// Variables on some path from `ins` to `outs`, including sibling outputs
/// of the applies crossed. Breadth-first.
pub fn vars_between<'g>(
    graph: &'g Graph,
    ins: &[VarId],
    outs: &[VarId],
) -> impl Iterator<Item = VarId> + 'g {
    let ins: HashSet<VarId> = ins.iter().copied().collect();
    walk(
        outs.to_vec(),
        move |var: &VarId| {
            if ins.contains(var) {
                return None;
            }
            let owner = graph.owner_of(*var)?;
            let mut next: Vec<VarId> = graph.inputs_of(owner.apply).to_vec();
            next.extend_from_slice(graph.outputs_of(owner.apply));
            next.reverse();
            Some(next)
        },
        WalkOrder::BreadthFirst,
    )
}

/// Roots reached by [`vars_between`] that are not in `ins`.
pub fn orphans_between<'g>(
    graph: &'g Graph,
    ins: &[VarId],
    outs: &[VarId],
) -> impl Iterator<Item = VarId> + 'g {
    let in_set: HashSet<VarId> = ins.iter().copied().collect();
    vars_between(graph, ins, outs)
        .filter(move |v| graph.owner_of(*v).is_none() && !in_set.contains(v))
}

/// Owners of the variables reached by [`vars_between`], each once, in
/// first-seen order.
pub fn applys_between<'g>(
    graph: &'g Graph,
    ins: &[VarId],
    outs: &[VarId],
) -> impl Iterator<Item = ApplyId> + 'g {
    let mut seen = HashSet::new();
    vars_between(graph, ins, outs)
        .filter_map(move |v| graph.owner_of(v))
        .filter_map(move |owner| seen.insert(owner.apply).then_some(owner.apply))
}

/// Whether any of `depends_on` is an ancestor of `var` (or `var` itself).
pub fn variable_depends_on(graph: &Graph, var: VarId, depends_on: &[VarId]) -> bool {
    let targets: HashSet<VarId> = depends_on.iter().copied().collect();
    depends_on_any(graph, var, &targets)
}

fn depends_on_any(graph: &Graph, var: VarId, targets: &HashSet<VarId>) -> bool {
    !targets.is_empty() && ancestors(graph, &[var], &[]).any(|v| targets.contains(&v))
}

/// Whether any of `depends_on` must run before (or is) `apply`.
///
/// Fails with [`Cycle`](crate::error::GraphError::Cycle) on a cyclic graph.
pub fn apply_depends_on(graph: &Graph, apply: ApplyId, depends_on: &[ApplyId]) -> Result<bool> {
    let targets: HashSet<ApplyId> = depends_on.iter().copied().collect();
    let flow = stack_order(graph, vec![apply], HashSet::new(), |node| {
        if targets.contains(&node) {
            ControlFlow::Break(())
        } else {
            ControlFlow::Continue(())
        }
    })?;
    Ok(flow.is_break())
}

/// The closest variables to `outputs` that are independent of
/// `ancestors_to_include`, plus those of `ancestors_to_include` the outputs
/// actually reach.
///
/// Everything needed to compute `outputs` can be computed from the result,
/// and no returned variable depends on another returned variable except
/// through `ancestors_to_include`.
pub fn truncated_graph_inputs(
    graph: &Graph,
    outputs: &[VarId],
    ancestors_to_include: &[VarId],
) -> Vec<VarId> {
    let mut truncated: Vec<VarId> = Vec::new();
    if ancestors_to_include.is_empty() {
        for &output in outputs {
            if !truncated.contains(&output) {
                truncated.push(output);
            }
        }
        return truncated;
    }

    let to_include: HashSet<VarId> = ancestors_to_include.iter().copied().collect();
    let mut blockers = to_include.clone();
    let mut seen: HashSet<VarId> = HashSet::new();
    let mut candidates: Vec<VarId> = outputs.to_vec();

    while let Some(var) = candidates.pop() {
        if seen.contains(&var) {
            continue;
        }
        let dependent = if to_include.contains(&var) {
            let mut others = to_include.clone();
            others.remove(&var);
            truncated.push(var);
            depends_on_any(graph, var, &others)
        } else {
            let dependent = depends_on_any(graph, var, &blockers);
            blockers.insert(var);
            if !dependent {
                truncated.push(var);
            }
            dependent
        };
        if dependent {
            if let Some(owner) = graph.owner_of(var) {
                candidates.extend(
                    graph
                        .inputs_of(owner.apply)
                        .iter()
                        .copied()
                        .filter(|v| !seen.contains(v)),
                );
            }
        }
        seen.insert(var);
    }
    truncated
}

/// `[input][output]` flags telling which `outputs` depend on which
/// `inputs`, combining the connection patterns of the ops in between.
pub fn io_connection_pattern(
    graph: &Graph,
    inputs: &[VarId],
    outputs: &[VarId],
) -> Result<Vec<Vec<bool>>> {
    let n_inputs = inputs.len();
    let mut by_var: HashMap<VarId, Vec<bool>> = HashMap::new();
    for (i, &input) in inputs.iter().enumerate() {
        let mut pattern = vec![false; n_inputs];
        pattern[i] = true;
        by_var.insert(input, pattern);
    }

    for apply in io_toposort(graph, inputs, outputs, None, None)? {
        let node = graph.apply(apply)?;
        let op_pattern = node
            .op()
            .connection_pattern(graph, apply)
            .unwrap_or_else(|| vec![vec![true; node.nout()]; node.nin()]);

        for (out_idx, &out) in node.outputs().iter().enumerate() {
            let mut pattern = vec![false; n_inputs];
            for (in_idx, input) in node.inputs().iter().enumerate() {
                let connected = op_pattern
                    .get(in_idx)
                    .and_then(|row| row.get(out_idx))
                    .copied()
                    .unwrap_or(true);
                if let (true, Some(input_pattern)) = (connected, by_var.get(input)) {
                    for (flag, from_input) in pattern.iter_mut().zip(input_pattern) {
                        *flag |= *from_input;
                    }
                }
            }
            by_var.insert(out, pattern);
        }
    }

    let mut global = vec![Vec::with_capacity(outputs.len()); n_inputs];
    for out in outputs {
        let pattern = by_var
            .get(out)
            .cloned()
            .unwrap_or_else(|| vec![false; n_inputs]);
        for (row, flag) in global.iter_mut().zip(pattern) {
            row.push(flag);
        }
    }
    Ok(global)
}

/// The variables `var` ultimately aliases, following op view maps.
pub fn view_roots(graph: &Graph, var: VarId) -> Vec<VarId> {
    let mut roots = Vec::new();
    let mut pending = vec![var];
    while let Some(var) = pending.pop() {
        let viewed = graph.owner_of(var).and_then(|owner| {
            let node = graph.apply(owner.apply).ok()?;
            let inputs: Vec<VarId> = node
                .op()
                .view_map()
                .get(&owner.index)?
                .iter()
                .filter_map(|&i| node.inputs().get(i).copied())
                .collect();
            Some(inputs)
        });
        match viewed {
            Some(inputs) => pending.extend(inputs.into_iter().rev()),
            None => roots.push(var),
        }
    }
    roots
}

impl Graph {
    /// Every ancestor of `outputs` whose name, or auto-name, is `name`.
    pub fn get_var_by_name(&self, outputs: &[VarId], name: &str) -> Vec<VarId> {
        ancestors(self, outputs, &[])
            .filter(|v| {
                self.var(*v).is_ok_and(|var| {
                    var.name() == Some(name) || var.auto_name() == name
                })
            })
            .collect()
    }
}
