//! The Node Arena
//!
//! [`Graph`] stores every variable and apply node created for one
//! computation. Edges are not stored separately: a variable knows its
//! owner, an apply knows its inputs and outputs, and everything else is
//! derived from those two links.
//!
//! Construction enforces ownership (an output belongs to exactly one apply,
//! at exactly one position; atomic variables are never owned). Acyclicity
//! is not checked here; the scheduler reports cycles.

use std::collections::HashSet;

use smallvec::SmallVec;

use super::node::{Apply, ApplyId, Owner, Tag, VarId, VarKind, Variable};
use super::nominal::NominalRegistry;
use crate::error::{GraphError, Result};
use crate::link::Storage;
use crate::op::OpRef;
use crate::types::TypeRef;
use crate::value::Value;

/// Arena of variables and apply nodes.
#[derive(Debug, Clone, Default)]
pub struct Graph {
    vars: Vec<Variable>,
    applies: Vec<Apply>,
    nominals: NominalRegistry,
}

impl Graph {
    /// An empty arena.
    pub fn new() -> Self {
        Self::default()
    }

    /// The variable behind `id`, or [`GraphError::UnknownVariable`].
    pub fn var(&self, id: VarId) -> Result<&Variable> {
        self.vars
            .get(id.index())
            .ok_or(GraphError::UnknownVariable(id))
    }

    /// The apply node behind `id`, or [`GraphError::UnknownApply`].
    pub fn apply(&self, id: ApplyId) -> Result<&Apply> {
        self.applies
            .get(id.index())
            .ok_or(GraphError::UnknownApply(id))
    }

    /// Number of variables ever created, reachable or not.
    pub fn num_vars(&self) -> usize {
        self.vars.len()
    }

    pub fn num_applies(&self) -> usize {
        self.applies.len()
    }

    /// Every variable handle, in creation order.
    pub fn var_ids(&self) -> impl Iterator<Item = VarId> {
        (0..self.vars.len()).map(VarId::new)
    }

    /// Every apply handle, in creation order.
    pub fn apply_ids(&self) -> impl Iterator<Item = ApplyId> {
        (0..self.applies.len()).map(ApplyId::new)
    }

    /// The nominal variables interned so far.
    pub fn nominals(&self) -> &NominalRegistry {
        &self.nominals
    }

    // Lenient accessors for traversal code: an unknown handle reads as a
    // root with no inputs.

    pub(crate) fn owner_of(&self, var: VarId) -> Option<Owner> {
        self.vars.get(var.index()).and_then(Variable::owner)
    }

    pub(crate) fn inputs_of(&self, apply: ApplyId) -> &[VarId] {
        self.applies
            .get(apply.index())
            .map(|a| a.inputs())
            .unwrap_or(&[])
    }

    pub(crate) fn outputs_of(&self, apply: ApplyId) -> &[VarId] {
        self.applies
            .get(apply.index())
            .map(|a| a.outputs())
            .unwrap_or(&[])
    }

    fn push_var(&mut self, var: Variable) -> VarId {
        let id = VarId::new(self.vars.len());
        self.vars.push(var);
        id
    }

    /// A new root variable.
    pub fn variable(&mut self, ty: TypeRef, name: Option<&str>) -> VarId {
        self.push_var(Variable::new(
            ty,
            VarKind::Plain { owner: None },
            name.map(str::to_owned),
        ))
    }

    /// A fresh unnamed root variable of `ty`.
    pub fn dummy(&mut self, ty: TypeRef) -> VarId {
        self.variable(ty, None)
    }

    /// A constant. `value` is filtered through `ty` first.
    pub fn constant(&mut self, ty: TypeRef, value: Value, name: Option<&str>) -> Result<VarId> {
        let value = ty.filter(value, false, None)?;
        Ok(self.push_var(Variable::new(
            ty,
            VarKind::Constant(value),
            name.map(str::to_owned),
        )))
    }

    /// A root whose value lives in a fresh storage cell holding `value`.
    pub fn shared(&mut self, ty: TypeRef, value: Value, name: Option<&str>) -> Result<VarId> {
        let value = ty.filter(value, false, None)?;
        Ok(self.push_var(Variable::new(
            ty,
            VarKind::Shared(Storage::with_value(value)),
            name.map(str::to_owned),
        )))
    }

    /// The nominal variable `id` of `ty`, created on first request.
    pub fn nominal(&mut self, ty: TypeRef, id: u64) -> VarId {
        if let Some(existing) = self.nominals.get(&ty, id) {
            return existing;
        }
        let var = self.push_var(Variable::new(ty.clone(), VarKind::Nominal(id), None));
        self.nominals.insert(ty, id, var);
        var
    }

    /// Rename `var`; `None` clears the name.
    pub fn set_name(&mut self, var: VarId, name: Option<&str>) -> Result<()> {
        self.var(var)?;
        self.vars[var.index()].name = name.map(str::to_owned);
        Ok(())
    }

    /// Mutable access to a variable's debugging tag.
    pub fn var_tag_mut(&mut self, var: VarId) -> Result<&mut Tag> {
        self.var(var)?;
        Ok(&mut self.vars[var.index()].tag)
    }

    /// Mutable access to an apply's debugging tag.
    pub fn apply_tag_mut(&mut self, apply: ApplyId) -> Result<&mut Tag> {
        self.apply(apply)?;
        Ok(&mut self.applies[apply.index()].tag)
    }

    /// Attach a test value, validated against the variable's type.
    pub fn set_test_value(&mut self, var: VarId, value: Value) -> Result<()> {
        let value = self.var(var)?.ty.filter(value, false, None)?;
        self.vars[var.index()].tag.set_test_value(Some(value));
        Ok(())
    }

    /// Create an apply node from existing variables.
    ///
    /// Every output must be unowned (it becomes owned by the new node at its
    /// position) and must not be atomic. Nothing is modified on error.
    pub fn add_apply(
        &mut self,
        op: OpRef,
        inputs: impl IntoIterator<Item = VarId>,
        outputs: impl IntoIterator<Item = VarId>,
    ) -> Result<ApplyId> {
        let inputs: SmallVec<[VarId; 4]> = inputs.into_iter().collect();
        let outputs: SmallVec<[VarId; 2]> = outputs.into_iter().collect();

        for &input in &inputs {
            self.var(input)?;
        }
        let mut claimed = HashSet::with_capacity(outputs.len());
        for &output in &outputs {
            let var = self.var(output)?;
            if var.is_atomic() {
                return Err(GraphError::AtomicOutput { var: output });
            }
            // Shared variables are roots by construction.
            if var.is_shared() || var.owner().is_some() || !claimed.insert(output) {
                return Err(GraphError::ForeignOutput { var: output });
            }
        }

        let id = ApplyId::new(self.applies.len());
        for (index, &output) in outputs.iter().enumerate() {
            self.vars[output.index()].kind = VarKind::Plain {
                owner: Some(Owner { apply: id, index }),
            };
        }
        self.applies.push(Apply {
            op,
            inputs,
            outputs,
            tag: Tag::new(),
        });
        Ok(id)
    }

    /// Apply `op` to `inputs`, creating fresh outputs of the types the op
    /// infers.
    pub fn make_node(&mut self, op: OpRef, inputs: &[VarId]) -> Result<ApplyId> {
        for &input in inputs {
            self.var(input)?;
        }
        let types = op.output_types(self, inputs)?;
        let outputs: Vec<VarId> = types.into_iter().map(|ty| self.variable(ty, None)).collect();
        self.add_apply(op, inputs.iter().copied(), outputs)
    }

    /// [`Graph::make_node`] followed by [`Graph::default_output`].
    pub fn call(&mut self, op: OpRef, inputs: &[VarId]) -> Result<VarId> {
        let apply = self.make_node(op, inputs)?;
        self.default_output(apply)
    }

    /// The output an apply stands for when used as a value.
    pub fn default_output(&self, apply: ApplyId) -> Result<VarId> {
        self.apply(apply)?.out()
    }

    /// Unowned copy of `var` with the same type, name and tag. Atomic
    /// variables are returned unchanged; shared variables keep their
    /// storage cell.
    pub fn clone_variable(&mut self, var: VarId) -> Result<VarId> {
        let original = self.var(var)?;
        if original.is_atomic() {
            return Ok(var);
        }
        let kind = match &original.kind {
            VarKind::Shared(storage) => VarKind::Shared(storage.clone()),
            _ => VarKind::Plain { owner: None },
        };
        let mut copy = Variable::new(original.ty.clone(), kind, original.name.clone());
        copy.tag = original.tag.clone();
        Ok(self.push_var(copy))
    }

    /// Same op and inputs, fresh outputs.
    ///
    /// With `clone_inner_graph` an op carrying an inner graph is replaced by
    /// its [`clone_inner`](crate::op::Op::clone_inner) copy.
    pub fn clone_apply(&mut self, apply: ApplyId, clone_inner_graph: bool) -> Result<ApplyId> {
        let node = self.apply(apply)?.clone();
        let op = if clone_inner_graph {
            node.op.clone_inner().unwrap_or(node.op)
        } else {
            node.op
        };
        let outputs = node
            .outputs
            .iter()
            .map(|&o| self.clone_variable(o))
            .collect::<Result<Vec<_>>>()?;
        let new_apply = self.add_apply(op, node.inputs, outputs)?;
        self.applies[new_apply.index()].tag = node.tag;
        Ok(new_apply)
    }

    pub(crate) fn set_apply_op(&mut self, apply: ApplyId, op: OpRef) -> Result<()> {
        self.apply(apply)?;
        self.applies[apply.index()].op = op;
        Ok(())
    }

    pub(crate) fn set_apply_inputs(&mut self, apply: ApplyId, inputs: &[VarId]) -> Result<()> {
        self.apply(apply)?;
        self.applies[apply.index()].inputs = SmallVec::from_slice(inputs);
        Ok(())
    }
}

impl Apply {
    /// The default output: the op's designated one, or the only output.
    pub fn out(&self) -> Result<VarId> {
        match self.op.default_output() {
            Some(index) => self.outputs.get(index).copied().ok_or_else(|| {
                GraphError::DefaultOutputOutOfRange {
                    op: self.op.name().to_string(),
                    index,
                    nout: self.outputs.len(),
                }
            }),
            None if self.outputs.len() == 1 => Ok(self.outputs[0]),
            None => Err(GraphError::AmbiguousOutput {
                op: self.op.name().to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TypeError;
    use crate::test_utils::{add, f64v, fscalar, Elemwise, Split};
    use crate::value::DType;

    #[test]
    fn make_node_sets_owners() {
        let mut graph = Graph::new();
        let x = graph.variable(fscalar(), Some("x"));
        let y = graph.variable(fscalar(), Some("y"));
        let apply = graph.make_node(OpRef::new(Elemwise::Add), &[x, y]).unwrap();

        let node = graph.apply(apply).unwrap();
        assert_eq!(node.inputs(), &[x, y]);
        assert_eq!(node.nout(), 1);
        let out = node.outputs()[0];
        assert_eq!(graph.var(out).unwrap().owner(), Some(Owner { apply, index: 0 }));
    }

    #[test]
    fn owned_output_is_rejected() {
        let mut graph = Graph::new();
        let x = graph.variable(fscalar(), None);
        let out = add(&mut graph, x, x);

        let err = graph
            .add_apply(OpRef::new(Elemwise::Neg), [x], [out])
            .unwrap_err();
        assert!(matches!(err, GraphError::ForeignOutput { var } if var == out));
    }

    #[test]
    fn duplicated_output_is_rejected_atomically() {
        let mut graph = Graph::new();
        let x = graph.variable(fscalar(), None);
        let o = graph.variable(fscalar(), None);

        let err = graph
            .add_apply(OpRef::new(Split), [x], [o, o])
            .unwrap_err();
        assert!(matches!(err, GraphError::ForeignOutput { .. }));
        assert!(graph.var(o).unwrap().owner().is_none());
        assert_eq!(graph.num_applies(), 0);
    }

    #[test]
    fn atomic_output_is_rejected() {
        let mut graph = Graph::new();
        let x = graph.variable(fscalar(), None);
        let c = graph
            .constant(fscalar(), Value::scalar(DType::Float64, 1.0), None)
            .unwrap();
        let n = graph.nominal(fscalar(), 0);

        for atomic in [c, n] {
            let err = graph
                .add_apply(OpRef::new(Elemwise::Neg), [x], [atomic])
                .unwrap_err();
            assert!(matches!(err, GraphError::AtomicOutput { .. }));
        }
    }

    #[test]
    fn unknown_handles_are_reported() {
        let mut graph = Graph::new();
        let mut other = Graph::new();
        other.variable(fscalar(), None);
        let foreign = other.variable(fscalar(), None);

        let err = graph.make_node(OpRef::new(Elemwise::Neg), &[foreign]).unwrap_err();
        assert!(matches!(err, GraphError::UnknownVariable(_)));
    }

    #[test]
    fn constants_are_filtered() {
        let mut graph = Graph::new();
        let ok = graph
            .constant(fscalar(), Value::scalar(DType::Int32, 2.0), None)
            .unwrap();
        assert_eq!(
            graph.var(ok).unwrap().constant_value().unwrap().dtype(),
            DType::Float64
        );

        let err = graph
            .constant(fscalar(), Value::vector(DType::Float64, vec![1.0]), None)
            .unwrap_err();
        assert!(matches!(err, GraphError::Type(TypeError::Shape { .. })));
    }

    #[test]
    fn nominals_are_interned() {
        let mut graph = Graph::new();
        let a = graph.nominal(fscalar(), 0);
        let b = graph.nominal(fscalar(), 0);
        let c = graph.nominal(fscalar(), 1);
        let d = graph.nominal(f64v(), 0);

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, d);
        assert_eq!(graph.nominals().len(), 3);
    }

    #[test]
    fn default_output_rules() {
        let mut graph = Graph::new();
        let x = graph.variable(fscalar(), None);

        let single = graph.make_node(OpRef::new(Elemwise::Neg), &[x]).unwrap();
        assert_eq!(
            graph.default_output(single).unwrap(),
            graph.apply(single).unwrap().outputs()[0]
        );

        let split = graph.make_node(OpRef::new(Split), &[x]).unwrap();
        assert!(matches!(
            graph.default_output(split),
            Err(GraphError::AmbiguousOutput { .. })
        ));
    }

    #[test]
    fn clone_variable_keeps_metadata() {
        let mut graph = Graph::new();
        let x = graph.variable(fscalar(), Some("x"));
        graph
            .var_tag_mut(x)
            .unwrap()
            .insert("trace", serde_json::json!("line 3"));
        let out = add(&mut graph, x, x);

        let copy = graph.clone_variable(out).unwrap();
        assert_ne!(copy, out);
        assert!(graph.var(copy).unwrap().owner().is_none());

        let xc = graph.clone_variable(x).unwrap();
        let var = graph.var(xc).unwrap();
        assert_eq!(var.name(), Some("x"));
        assert_eq!(var.tag().get("trace"), Some(&serde_json::json!("line 3")));
        assert_ne!(var.auto_name(), graph.var(x).unwrap().auto_name());
    }

    #[test]
    fn shared_clone_keeps_storage() {
        let mut graph = Graph::new();
        let s = graph
            .shared(fscalar(), Value::scalar(DType::Float64, 4.0), Some("s"))
            .unwrap();
        let copy = graph.clone_variable(s).unwrap();
        assert_ne!(s, copy);

        let a = graph.var(s).unwrap().shared_storage().unwrap();
        let b = graph.var(copy).unwrap().shared_storage().unwrap();
        assert!(a.ptr_eq(b));
    }

    #[test]
    fn clone_apply_has_fresh_outputs() {
        let mut graph = Graph::new();
        let x = graph.variable(fscalar(), None);
        let y = graph.variable(fscalar(), None);
        let out = add(&mut graph, x, y);
        let apply = graph.var(out).unwrap().owner().unwrap().apply;

        let copy = graph.clone_apply(apply, false).unwrap();
        let node = graph.apply(copy).unwrap();
        assert_eq!(node.inputs(), &[x, y]);
        assert_ne!(node.outputs()[0], out);
        assert!(node.op().ptr_eq(graph.apply(apply).unwrap().op()));
    }

    #[test]
    fn test_values_are_filtered() {
        let mut graph = Graph::new();
        let x = graph.variable(fscalar(), None);
        graph
            .set_test_value(x, Value::scalar(DType::Int32, 3.0))
            .unwrap();
        assert_eq!(
            graph.var(x).unwrap().tag().test_value(),
            Some(&Value::scalar(DType::Float64, 3.0))
        );
        assert!(graph
            .set_test_value(x, Value::vector(DType::Float64, vec![1.0]))
            .is_err());
    }
}
