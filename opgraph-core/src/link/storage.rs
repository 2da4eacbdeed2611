//! Storage allocation and last-use analysis for linkers.

use std::collections::{HashMap, HashSet};

use indexmap::IndexMap;

use super::container::Storage;
use crate::error::{GraphError, Result};
use crate::graph::{ApplyId, FunctionGraph, Graph, VarId, VarKind};

/// Storage cells allocated for a function graph.
#[derive(Debug, Clone)]
pub struct StorageMap {
    pub inputs: Vec<Storage>,
    pub outputs: Vec<Storage>,
    /// Every variable touched by the schedule, in allocation order.
    pub cells: IndexMap<VarId, Storage>,
}

/// Give every variable of the schedule a storage cell.
///
/// Inputs use `input_storage` when given, outputs use `output_storage` when
/// given, constants get a cell pre-filled with their data, shared
/// variables reuse their own cell, and everything else gets an empty one.
pub fn map_storage(
    fgraph: &FunctionGraph<'_>,
    order: &[ApplyId],
    input_storage: Option<Vec<Storage>>,
    output_storage: Option<Vec<Storage>>,
) -> Result<StorageMap> {
    let graph = fgraph.graph();
    let inputs = match input_storage {
        Some(storage) if storage.len() != fgraph.inputs().len() => {
            return Err(GraphError::ArgumentCount {
                expected: fgraph.inputs().len(),
                got: storage.len(),
            })
        }
        Some(storage) => storage,
        None => fgraph.inputs().iter().map(|_| Storage::new()).collect(),
    };

    let mut cells: IndexMap<VarId, Storage> = IndexMap::new();
    for (var, storage) in fgraph.inputs().iter().zip(&inputs) {
        cells.entry(*var).or_insert_with(|| storage.clone());
    }

    if let Some(storage) = &output_storage {
        if storage.len() != fgraph.outputs().len() {
            return Err(GraphError::ArgumentCount {
                expected: fgraph.outputs().len(),
                got: storage.len(),
            });
        }
        for (var, storage) in fgraph.outputs().iter().zip(storage) {
            cells.entry(*var).or_insert_with(|| storage.clone());
        }
    }

    for &apply in order {
        let node = graph.apply(apply)?;
        for &input in node.inputs() {
            if !cells.contains_key(&input) {
                cells.insert(input, root_storage(graph, input)?);
            }
        }
        for &output in node.outputs() {
            cells.entry(output).or_default();
        }
    }
    for &output in fgraph.outputs() {
        if !cells.contains_key(&output) {
            cells.insert(output, root_storage(graph, output)?);
        }
    }

    let outputs = match output_storage {
        Some(storage) => storage,
        None => fgraph
            .outputs()
            .iter()
            .map(|o| cells.get(o).cloned().unwrap_or_default())
            .collect(),
    };
    Ok(StorageMap {
        inputs,
        outputs,
        cells,
    })
}

fn root_storage(graph: &Graph, var: VarId) -> Result<Storage> {
    Ok(match graph.var(var)?.kind() {
        VarKind::Constant(value) => Storage::with_value(value.clone()),
        VarKind::Shared(storage) => storage.clone(),
        _ => Storage::new(),
    })
}

/// Last-use analysis over a schedule.
///
/// Returns the set of variables computed by some node of `order`, and for
/// each variable read by the schedule, the position of the last node that
/// reads it.
pub fn gc_helper(
    graph: &Graph,
    order: &[ApplyId],
) -> Result<(HashSet<VarId>, HashMap<VarId, usize>)> {
    let mut computed = HashSet::new();
    let mut last_user = HashMap::new();
    for (position, &apply) in order.iter().enumerate() {
        let node = graph.apply(apply)?;
        for &input in node.inputs() {
            last_user.insert(input, position);
        }
        computed.extend(node.outputs().iter().copied());
    }
    Ok((computed, last_user))
}
