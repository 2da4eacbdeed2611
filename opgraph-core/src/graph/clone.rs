//! Cloning & Substitution
//!
//! Copies subgraphs inside an arena while tracking what became what.
//!
//! # Overview
//!
//! All cloning goes through an [`Equiv`] memo. Seeding the memo before a
//! clone is how substitution works: a variable already mapped is used as is
//! instead of being copied, so `clone_get_equiv_into` with a pre-filled
//! memo rebuilds the graph on top of the replacements.
//!
//! Constants and nominals are never copied. Ops are only copied when inner
//! graphs are cloned, and then once per op: every node sharing an op in the
//! original shares the copy.

use std::collections::HashMap;

use tracing::trace;

use super::toposort::io_toposort;
use super::{ApplyId, Graph, VarId};
use crate::error::{GraphError, Result};
use crate::op::{OpKey, OpRef};

/// Memo of original -> clone for variables, applies and ops.
#[derive(Debug, Clone, Default)]
pub struct Equiv {
    vars: HashMap<VarId, VarId>,
    applies: HashMap<ApplyId, ApplyId>,
    ops: HashMap<OpKey, OpRef>,
}

impl Equiv {
    /// An empty memo.
    pub fn new() -> Self {
        Self::default()
    }

    /// What `original` was cloned to (or replaced by).
    pub fn var(&self, original: VarId) -> Option<VarId> {
        self.vars.get(&original).copied()
    }

    /// The copy of `original`.
    pub fn apply(&self, original: ApplyId) -> Option<ApplyId> {
        self.applies.get(&original).copied()
    }

    /// The copy shared by every clone of a node applying `original`.
    pub fn op(&self, original: &OpRef) -> Option<&OpRef> {
        self.ops.get(&original.key())
    }

    /// Map `original` to `replacement`, overwriting any previous entry.
    pub fn insert_var(&mut self, original: VarId, replacement: VarId) {
        self.vars.insert(original, replacement);
    }

    /// Whether `original` already has an entry.
    pub fn contains_var(&self, original: VarId) -> bool {
        self.vars.contains_key(&original)
    }

    pub fn num_vars(&self) -> usize {
        self.vars.len()
    }

    pub fn num_applies(&self) -> usize {
        self.applies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty() && self.applies.is_empty() && self.ops.is_empty()
    }

    /// Map every variable of `vars`, failing on the first one missing.
    pub fn map_vars(&self, vars: &[VarId]) -> Result<Vec<VarId>> {
        vars.iter()
            .map(|v| self.var(*v).ok_or(GraphError::Unmapped(*v)))
            .collect()
    }
}

/// How [`clone`] and [`clone_get_equiv`] treat the frontier of the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CloneOptions {
    /// Copy the given inputs instead of reusing them.
    pub copy_inputs: bool,
    /// Copy roots that are not among the given inputs. `None` follows
    /// `copy_inputs`.
    pub copy_orphans: Option<bool>,
    /// Clone ops that carry inner graphs.
    pub clone_inner_graphs: bool,
    /// Convert substituted inputs through the old input's type rather than
    /// rebuilding nodes.
    pub strict: bool,
}

impl Default for CloneOptions {
    fn default() -> Self {
        Self {
            copy_inputs: true,
            copy_orphans: None,
            clone_inner_graphs: false,
            strict: true,
        }
    }
}

impl CloneOptions {
    fn copy_orphans(&self) -> bool {
        self.copy_orphans.unwrap_or(self.copy_inputs)
    }
}

/// Copy the subgraph between `inputs` and `outputs` and return the copies
/// of both.
pub fn clone(
    graph: &mut Graph,
    inputs: &[VarId],
    outputs: &[VarId],
    options: CloneOptions,
) -> Result<(Vec<VarId>, Vec<VarId>)> {
    let equiv = clone_get_equiv(graph, inputs, outputs, options)?;
    Ok((equiv.map_vars(inputs)?, equiv.map_vars(outputs)?))
}

/// Copy the subgraph between `inputs` and `outputs` and return the full
/// memo.
pub fn clone_get_equiv(
    graph: &mut Graph,
    inputs: &[VarId],
    outputs: &[VarId],
    options: CloneOptions,
) -> Result<Equiv> {
    let mut memo = Equiv::new();
    clone_get_equiv_into(graph, inputs, outputs, options, &mut memo)?;
    Ok(memo)
}

/// [`clone_get_equiv`] on top of an existing memo. Variables already in
/// `memo` are used as replacements instead of being copied.
pub fn clone_get_equiv_into(
    graph: &mut Graph,
    inputs: &[VarId],
    outputs: &[VarId],
    options: CloneOptions,
    memo: &mut Equiv,
) -> Result<()> {
    let before = memo.num_vars();

    for &input in inputs {
        if memo.contains_var(input) {
            continue;
        }
        let copy = if options.copy_inputs {
            graph.clone_variable(input)?
        } else {
            input
        };
        memo.insert_var(input, copy);
    }

    let copy_orphans = options.copy_orphans();
    for apply in io_toposort(graph, inputs, outputs, None, None)? {
        let node_inputs = graph.apply(apply)?.inputs().to_vec();
        for input in node_inputs {
            if memo.contains_var(input) {
                continue;
            }
            let copy = if copy_orphans {
                graph.clone_variable(input)?
            } else {
                input
            };
            memo.insert_var(input, copy);
        }
        clone_node_and_cache(
            graph,
            apply,
            memo,
            options.clone_inner_graphs,
            options.strict,
        )?;
    }

    // Outputs the schedule never reached are roots of their own; they are
    // always copied (atomic ones come back unchanged).
    for &output in outputs {
        if memo.contains_var(output) {
            continue;
        }
        let copy = graph.clone_variable(output)?;
        memo.insert_var(output, copy);
    }

    trace!(
        new_vars = memo.num_vars() - before,
        applies = memo.num_applies(),
        "cloned graph"
    );
    Ok(())
}

/// Clone one apply on top of `memo`, which must already map all its inputs.
///
/// Returns `None` without cloning when every output is already mapped. The
/// memo is extended with the new apply, its outputs and (if it changed) its
/// op.
pub fn clone_node_and_cache(
    graph: &mut Graph,
    apply: ApplyId,
    memo: &mut Equiv,
    clone_inner_graphs: bool,
    strict: bool,
) -> Result<Option<ApplyId>> {
    let node = graph.apply(apply)?.clone();
    if node.outputs().iter().all(|o| memo.contains_var(*o)) {
        return Ok(None);
    }

    let cached_op = memo.op(node.op()).cloned();
    let new_inputs = memo.map_vars(node.inputs())?;
    let new_apply = graph.clone_with_new_inputs(
        apply,
        &new_inputs,
        strict,
        clone_inner_graphs && cached_op.is_none(),
    )?;
    if let Some(op) = cached_op {
        graph.set_apply_op(new_apply, op)?;
    }
    memo.applies.insert(apply, new_apply);

    let new_node = graph.apply(new_apply)?;
    if !new_node.op().ptr_eq(node.op()) {
        memo.ops
            .entry(node.op().key())
            .or_insert_with(|| new_node.op().clone());
    }
    for (old, new) in node.outputs().iter().zip(new_node.outputs()) {
        memo.vars.entry(*old).or_insert(*new);
    }
    Ok(Some(new_apply))
}

impl Graph {
    /// A copy of `apply` reading `inputs` instead of its current inputs.
    ///
    /// When an input's type changes the node may need its output types
    /// re-inferred. In `strict` mode the new input is first converted with
    /// the old input's [`filter_variable`](crate::types::Type::filter_variable)
    /// and the node is rebuilt only if the converted type still differs.
    /// Without `strict` any type change rebuilds. Ops whose output types
    /// depend on input values always rebuild, after the same conversion.
    pub fn clone_with_new_inputs(
        &mut self,
        apply: ApplyId,
        inputs: &[VarId],
        strict: bool,
        clone_inner_graph: bool,
    ) -> Result<ApplyId> {
        let node = self.apply(apply)?.clone();
        if inputs.len() != node.nin() {
            return Err(GraphError::Arity {
                op: node.op().name().to_string(),
                expected: node.nin(),
                got: inputs.len(),
            });
        }

        let mut new_inputs = inputs.to_vec();
        let mut rebuild = node.op().output_type_depends_on_input_value();
        for (slot, &current) in new_inputs.iter_mut().zip(node.inputs()) {
            let current_ty = self.var(current)?.ty().clone();
            if *self.var(*slot)?.ty() == current_ty {
                continue;
            }
            if strict {
                *slot = current_ty.filter_variable(self, *slot)?;
                if *self.var(*slot)?.ty() != current_ty {
                    rebuild = true;
                }
            } else {
                rebuild = true;
            }
        }

        if rebuild {
            let op = if clone_inner_graph {
                node.op().clone_inner().unwrap_or_else(|| node.op().clone())
            } else {
                node.op().clone()
            };
            let new_apply = self.make_node(op, &new_inputs)?;
            let mut tag = node.tag().clone();
            tag.update(self.apply(new_apply)?.tag());
            *self.apply_tag_mut(new_apply)? = tag;
            Ok(new_apply)
        } else {
            let new_apply = self.clone_apply(apply, clone_inner_graph)?;
            self.set_apply_inputs(new_apply, &new_inputs)?;
            Ok(new_apply)
        }
    }
}

/// Replace nominal variables among `inputs` with fresh dummies of the same
/// type, rebuilding whatever depends on them.
///
/// Needed before renumbering nominal inputs by position: without it, mapping
/// nominal `1` to nominal `0` while also mapping `0` to `1` would chase its
/// own tail.
pub fn replace_nominals_with_dummies(
    graph: &mut Graph,
    inputs: &[VarId],
    outputs: &[VarId],
) -> Result<(Vec<VarId>, Vec<VarId>)> {
    let mut memo = Equiv::new();
    for &input in inputs {
        let var = graph.var(input)?;
        if var.is_nominal() {
            let ty = var.ty().clone();
            let dummy = graph.dummy(ty);
            memo.insert_var(input, dummy);
        }
    }
    if memo.is_empty() {
        return Ok((inputs.to_vec(), outputs.to_vec()));
    }

    let options = CloneOptions {
        copy_inputs: false,
        copy_orphans: Some(false),
        ..CloneOptions::default()
    };
    clone_get_equiv_into(graph, inputs, outputs, options, &mut memo)?;
    Ok((memo.map_vars(inputs)?, memo.map_vars(outputs)?))
}
