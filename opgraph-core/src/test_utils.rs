//! Small ops and types shared by the unit tests.

use std::any::Any;

use crate::error::{GraphError, Result};
use crate::graph::{ApplyId, Graph, VarId};
use crate::op::{props_eq, InnerGraph, Op, OpRef, ViewMap};
use crate::types::{TensorType, TypeRef};
use crate::value::{DType, Value};

pub fn fscalar() -> TypeRef {
    TypeRef::new(TensorType::scalar(DType::Float64))
}

pub fn f64v() -> TypeRef {
    TypeRef::new(TensorType::vector(DType::Float64, None))
}

fn check_arity(op: &str, expected: usize, inputs: &[VarId]) -> Result<()> {
    if inputs.len() != expected {
        return Err(GraphError::Arity {
            op: op.to_string(),
            expected,
            got: inputs.len(),
        });
    }
    Ok(())
}

fn input_type(graph: &Graph, var: VarId) -> Result<TypeRef> {
    Ok(graph.var(var)?.ty().clone())
}

/// Elementwise arithmetic over same-shape inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Elemwise {
    Add,
    Mul,
    Neg,
}

impl Elemwise {
    fn arity(self) -> usize {
        match self {
            Elemwise::Neg => 1,
            Elemwise::Add | Elemwise::Mul => 2,
        }
    }
}

impl Op for Elemwise {
    fn name(&self) -> &str {
        match self {
            Elemwise::Add => "add",
            Elemwise::Mul => "mul",
            Elemwise::Neg => "neg",
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn equals(&self, other: &dyn Op) -> bool {
        props_eq(self, other)
    }

    fn output_types(&self, graph: &Graph, inputs: &[VarId]) -> Result<Vec<TypeRef>> {
        check_arity(self.name(), self.arity(), inputs)?;
        Ok(vec![input_type(graph, inputs[0])?])
    }

    fn perform(&self, inputs: &[Value], outputs: &mut [Option<Value>]) -> Result<()> {
        let result = match (self, inputs) {
            (Elemwise::Neg, [x]) => x.map(|v| -v),
            (Elemwise::Add | Elemwise::Mul, [a, b]) => {
                if a.shape() != b.shape() {
                    return Err(GraphError::perform(
                        self.name(),
                        format!("shape mismatch {:?} vs {:?}", a.shape(), b.shape()),
                    ));
                }
                let data = a
                    .data()
                    .iter()
                    .zip(b.data())
                    .map(|(x, y)| if *self == Elemwise::Add { x + y } else { x * y })
                    .collect();
                Value::from_shape(a.dtype(), a.shape(), data)?
            }
            _ => return Err(GraphError::perform(self.name(), "wrong number of inputs")),
        };
        outputs[0] = Some(result);
        Ok(())
    }
}

pub fn add(graph: &mut Graph, a: VarId, b: VarId) -> VarId {
    graph.call(OpRef::new(Elemwise::Add), &[a, b]).unwrap()
}

pub fn mul(graph: &mut Graph, a: VarId, b: VarId) -> VarId {
    graph.call(OpRef::new(Elemwise::Mul), &[a, b]).unwrap()
}

pub fn neg(graph: &mut Graph, x: VarId) -> VarId {
    graph.call(OpRef::new(Elemwise::Neg), &[x]).unwrap()
}

/// `x -> (x, -x)` with no default output.
#[derive(Debug)]
pub struct Split;

impl Op for Split {
    fn name(&self) -> &str {
        "split"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn output_types(&self, graph: &Graph, inputs: &[VarId]) -> Result<Vec<TypeRef>> {
        check_arity(self.name(), 1, inputs)?;
        let ty = input_type(graph, inputs[0])?;
        Ok(vec![ty.clone(), ty])
    }

    fn perform(&self, inputs: &[Value], outputs: &mut [Option<Value>]) -> Result<()> {
        outputs[0] = Some(inputs[0].clone());
        outputs[1] = Some(inputs[0].map(|v| -v));
        Ok(())
    }
}

/// `(x, y) -> (y, x)`.
#[derive(Debug)]
pub struct Swap;

impl Op for Swap {
    fn name(&self) -> &str {
        "swap"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn output_types(&self, graph: &Graph, inputs: &[VarId]) -> Result<Vec<TypeRef>> {
        check_arity(self.name(), 2, inputs)?;
        Ok(vec![input_type(graph, inputs[1])?, input_type(graph, inputs[0])?])
    }

    fn connection_pattern(&self, _graph: &Graph, _node: ApplyId) -> Option<Vec<Vec<bool>>> {
        Some(vec![vec![false, true], vec![true, false]])
    }

    fn perform(&self, inputs: &[Value], outputs: &mut [Option<Value>]) -> Result<()> {
        outputs[0] = Some(inputs[1].clone());
        outputs[1] = Some(inputs[0].clone());
        Ok(())
    }
}

/// Identity whose output aliases its input.
#[derive(Debug)]
pub struct View;

impl Op for View {
    fn name(&self) -> &str {
        "view"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn output_types(&self, graph: &Graph, inputs: &[VarId]) -> Result<Vec<TypeRef>> {
        check_arity(self.name(), 1, inputs)?;
        Ok(vec![input_type(graph, inputs[0])?])
    }

    fn view_map(&self) -> ViewMap {
        ViewMap::from([(0, vec![0])])
    }

    fn perform(&self, inputs: &[Value], outputs: &mut [Option<Value>]) -> Result<()> {
        outputs[0] = Some(inputs[0].clone());
        Ok(())
    }
}

/// `(vector, length) -> vector` whose static length is read from a constant
/// second input.
#[derive(Debug)]
pub struct Reshape;

impl Op for Reshape {
    fn name(&self) -> &str {
        "reshape"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn output_types(&self, graph: &Graph, inputs: &[VarId]) -> Result<Vec<TypeRef>> {
        check_arity(self.name(), 2, inputs)?;
        let source = input_type(graph, inputs[0])?;
        let dtype = source
            .downcast_ref::<TensorType>()
            .map(|t| t.dtype)
            .unwrap_or(DType::Float64);
        let len = graph
            .var(inputs[1])?
            .constant_value()
            .and_then(Value::as_scalar)
            .map(|n| n as usize);
        Ok(vec![TypeRef::new(TensorType::vector(dtype, len))])
    }

    fn output_type_depends_on_input_value(&self) -> bool {
        true
    }

    fn perform(&self, inputs: &[Value], outputs: &mut [Option<Value>]) -> Result<()> {
        outputs[0] = Some(inputs[0].clone());
        Ok(())
    }
}

/// Negation carried out by an inner graph.
#[derive(Debug)]
pub struct WithInner {
    inner: InnerGraph,
}

impl WithInner {
    pub fn op() -> OpRef {
        let mut graph = Graph::new();
        let x = graph.variable(fscalar(), None);
        let out = neg(&mut graph, x);
        let inner = InnerGraph::with_nominal_inputs(graph, &[x], &[out]).unwrap();
        OpRef::new(WithInner { inner })
    }
}

impl Op for WithInner {
    fn name(&self) -> &str {
        "with_inner"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn output_types(&self, graph: &Graph, inputs: &[VarId]) -> Result<Vec<TypeRef>> {
        check_arity(self.name(), 1, inputs)?;
        Ok(vec![input_type(graph, inputs[0])?])
    }

    fn inner_graph(&self) -> Option<&InnerGraph> {
        Some(&self.inner)
    }

    fn clone_inner(&self) -> Option<OpRef> {
        let inner = self.inner.fresh_copy().ok()?;
        Some(OpRef::new(WithInner { inner }))
    }

    fn perform(&self, inputs: &[Value], outputs: &mut [Option<Value>]) -> Result<()> {
        outputs[0] = Some(inputs[0].map(|v| -v));
        Ok(())
    }
}

/// Adds one to whatever its output storage held before the call.
#[derive(Debug)]
pub struct Counted;

impl Op for Counted {
    fn name(&self) -> &str {
        "counted"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn output_types(&self, graph: &Graph, inputs: &[VarId]) -> Result<Vec<TypeRef>> {
        check_arity(self.name(), 1, inputs)?;
        Ok(vec![input_type(graph, inputs[0])?])
    }

    fn perform(&self, inputs: &[Value], outputs: &mut [Option<Value>]) -> Result<()> {
        let previous = outputs[0]
            .as_ref()
            .and_then(Value::as_scalar)
            .unwrap_or(0.0);
        outputs[0] = Some(Value::scalar(inputs[0].dtype(), previous + 1.0));
        Ok(())
    }
}

/// Always fails at run time.
#[derive(Debug)]
pub struct Fail;

impl Op for Fail {
    fn name(&self) -> &str {
        "fail"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn output_types(&self, graph: &Graph, inputs: &[VarId]) -> Result<Vec<TypeRef>> {
        check_arity(self.name(), 1, inputs)?;
        Ok(vec![input_type(graph, inputs[0])?])
    }

    fn perform(&self, _inputs: &[Value], _outputs: &mut [Option<Value>]) -> Result<()> {
        Err(GraphError::perform(self.name(), "always fails"))
    }
}
