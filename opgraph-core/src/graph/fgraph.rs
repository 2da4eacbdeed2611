//! Function Graphs
//!
//! A [`FunctionGraph`] marks which variables of an arena are the inputs
//! and outputs of a function. It is what linkers compile.

use super::toposort::io_toposort;
use super::walk::ancestors;
use super::{ApplyId, Graph, VarId};
use crate::error::{GraphError, Result};

/// A view of `graph` as a function from `inputs` to `outputs`.
#[derive(Debug, Clone)]
pub struct FunctionGraph<'g> {
    graph: &'g Graph,
    inputs: Vec<VarId>,
    outputs: Vec<VarId>,
    no_recycling: Vec<VarId>,
}

impl<'g> FunctionGraph<'g> {
    /// Fails if any handle is unknown, or if the outputs depend on a root
    /// that is neither an input, a constant nor a shared variable.
    pub fn new(graph: &'g Graph, inputs: Vec<VarId>, outputs: Vec<VarId>) -> Result<Self> {
        for &var in inputs.iter().chain(&outputs) {
            graph.var(var)?;
        }
        for var in ancestors(graph, &outputs, &inputs) {
            if inputs.contains(&var) {
                continue;
            }
            let v = graph.var(var)?;
            if v.owner().is_none() && !v.is_constant() && !v.is_shared() {
                return Err(GraphError::MissingInput { var });
            }
        }
        Ok(Self {
            graph,
            inputs,
            outputs,
            no_recycling: Vec::new(),
        })
    }

    /// Variables whose storage is cleared before every run, so a program
    /// never hands back a buffer it also returned last time.
    pub fn with_no_recycling(mut self, vars: Vec<VarId>) -> Self {
        self.no_recycling = vars;
        self
    }

    /// The arena this function lives in.
    pub fn graph(&self) -> &'g Graph {
        self.graph
    }

    /// Variables supplied by the caller, in argument order.
    pub fn inputs(&self) -> &[VarId] {
        &self.inputs
    }

    /// Variables handed back, in result order.
    pub fn outputs(&self) -> &[VarId] {
        &self.outputs
    }

    pub fn no_recycling(&self) -> &[VarId] {
        &self.no_recycling
    }

    /// Apply nodes in a valid execution order.
    pub fn toposort(&self) -> Result<Vec<ApplyId>> {
        io_toposort(self.graph, &self.inputs, &self.outputs, None, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{add, fscalar, neg};
    use crate::value::{DType, Value};

    #[test]
    fn missing_inputs_are_rejected() {
        let mut graph = Graph::new();
        let x = graph.variable(fscalar(), Some("x"));
        let y = graph.variable(fscalar(), Some("y"));
        let out = add(&mut graph, x, y);

        let err = FunctionGraph::new(&graph, vec![x], vec![out]).unwrap_err();
        assert!(matches!(err, GraphError::MissingInput { var } if var == y));
        assert!(FunctionGraph::new(&graph, vec![x, y], vec![out]).is_ok());
    }

    #[test]
    fn constants_and_shared_need_no_input() {
        let mut graph = Graph::new();
        let x = graph.variable(fscalar(), None);
        let c = graph
            .constant(fscalar(), Value::scalar(DType::Float64, 1.0), None)
            .unwrap();
        let s = graph
            .shared(fscalar(), Value::scalar(DType::Float64, 2.0), None)
            .unwrap();
        let xc = add(&mut graph, x, c);
        let out = add(&mut graph, xc, s);

        let fgraph = FunctionGraph::new(&graph, vec![x], vec![out]).unwrap();
        assert_eq!(fgraph.toposort().unwrap().len(), 2);
    }

    #[test]
    fn owned_inputs_cut_the_schedule() {
        let mut graph = Graph::new();
        let x = graph.variable(fscalar(), None);
        let mid = neg(&mut graph, x);
        let out = neg(&mut graph, mid);

        let fgraph = FunctionGraph::new(&graph, vec![mid], vec![out]).unwrap();
        assert_eq!(
            fgraph.toposort().unwrap(),
            vec![graph.var(out).unwrap().owner().unwrap().apply]
        );
    }
}
