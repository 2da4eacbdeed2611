//! Graph Nodes
//!
//! The two node kinds of a computation graph and the handles used to refer
//! to them. Nodes are stored in a [`Graph`](super::Graph) arena; a handle is
//! only meaningful for the arena that issued it.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexMap;
use smallvec::SmallVec;

use crate::link::Storage;
use crate::op::OpRef;
use crate::types::TypeRef;
use crate::value::Value;

/// Handle to a variable in a [`Graph`](super::Graph).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VarId(u32);

impl VarId {
    pub(crate) fn new(index: usize) -> Self {
        Self(index as u32)
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for VarId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// Handle to an apply node in a [`Graph`](super::Graph).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ApplyId(u32);

impl ApplyId {
    pub(crate) fn new(index: usize) -> Self {
        Self(index as u32)
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ApplyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "a{}", self.0)
    }
}

/// Process-wide sequence number of a variable, used for auto-names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Serial(u64);

impl Serial {
    /// The next unused serial.
    pub fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// Back-reference from an output variable to the apply that computes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Owner {
    pub apply: ApplyId,
    /// Position of the variable in the apply's outputs.
    pub index: usize,
}

/// What a variable is.
#[derive(Debug, Clone)]
pub enum VarKind {
    /// A graph input (no owner) or the output of an apply.
    Plain { owner: Option<Owner> },

    /// Fixed data. Atomic: never owned, never copied by cloning.
    Constant(Value),

    /// Placeholder identified by `(type, id)`, interned per graph. Atomic.
    Nominal(u64),

    /// Root whose value lives in a storage cell visible outside the graph.
    Shared(Storage),
}

/// Scratchpad of debugging metadata attached to a node.
#[derive(Debug, Clone, Default)]
pub struct Tag {
    entries: IndexMap<String, serde_json::Value>,
    test_value: Option<Value>,
}

impl Tag {
    pub fn new() -> Self {
        Self::default()
    }

    /// The entry stored under `key`.
    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.entries.get(key)
    }

    /// Store `value` under `key`, returning the previous entry.
    pub fn insert(&mut self, key: impl Into<String>, value: serde_json::Value) -> Option<serde_json::Value> {
        self.entries.insert(key.into(), value)
    }

    pub fn remove(&mut self, key: &str) -> Option<serde_json::Value> {
        self.entries.shift_remove(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &serde_json::Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Example data used to check shapes while building.
    pub fn test_value(&self) -> Option<&Value> {
        self.test_value.as_ref()
    }

    pub(crate) fn set_test_value(&mut self, value: Option<Value>) {
        self.test_value = value;
    }

    /// Merge `other` into `self`; entries of `other` win.
    pub fn update(&mut self, other: &Tag) {
        for (k, v) in &other.entries {
            self.entries.insert(k.clone(), v.clone());
        }
        if other.test_value.is_some() {
            self.test_value = other.test_value.clone();
        }
    }
}

/// A typed value-producing node.
#[derive(Debug, Clone)]
pub struct Variable {
    pub(crate) ty: TypeRef,
    pub(crate) kind: VarKind,
    pub(crate) name: Option<String>,
    pub(crate) serial: Serial,
    pub(crate) tag: Tag,
}

impl Variable {
    pub(crate) fn new(ty: TypeRef, kind: VarKind, name: Option<String>) -> Self {
        Self {
            ty,
            kind,
            name,
            serial: Serial::next(),
            tag: Tag::new(),
        }
    }

    /// The type every value of this variable belongs to.
    pub fn ty(&self) -> &TypeRef {
        &self.ty
    }

    /// Root, owned output, constant, nominal or shared.
    pub fn kind(&self) -> &VarKind {
        &self.kind
    }

    /// User-given name, if any.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn serial(&self) -> Serial {
        self.serial
    }

    /// `auto_<n>`, unique within the process.
    pub fn auto_name(&self) -> String {
        format!("auto_{}", self.serial.raw())
    }

    /// Debugging metadata.
    pub fn tag(&self) -> &Tag {
        &self.tag
    }

    /// The apply computing this variable and the output position.
    pub fn owner(&self) -> Option<Owner> {
        match self.kind {
            VarKind::Plain { owner } => owner,
            _ => None,
        }
    }

    /// Constants and nominals. Atomic variables are never owned and are
    /// shared rather than copied by cloning.
    pub fn is_atomic(&self) -> bool {
        matches!(self.kind, VarKind::Constant(_) | VarKind::Nominal(_))
    }

    pub fn is_constant(&self) -> bool {
        matches!(self.kind, VarKind::Constant(_))
    }

    pub fn is_nominal(&self) -> bool {
        matches!(self.kind, VarKind::Nominal(_))
    }

    pub fn is_shared(&self) -> bool {
        matches!(self.kind, VarKind::Shared(_))
    }

    /// The data of a constant.
    pub fn constant_value(&self) -> Option<&Value> {
        match &self.kind {
            VarKind::Constant(value) => Some(value),
            _ => None,
        }
    }

    pub fn nominal_id(&self) -> Option<u64> {
        match self.kind {
            VarKind::Nominal(id) => Some(id),
            _ => None,
        }
    }

    /// The storage cell of a shared variable.
    pub fn shared_storage(&self) -> Option<&Storage> {
        match &self.kind {
            VarKind::Shared(storage) => Some(storage),
            _ => None,
        }
    }
}

/// One application of an [`Op`](crate::op::Op) to input variables.
#[derive(Debug, Clone)]
pub struct Apply {
    pub(crate) op: OpRef,
    pub(crate) inputs: SmallVec<[VarId; 4]>,
    pub(crate) outputs: SmallVec<[VarId; 2]>,
    pub(crate) tag: Tag,
}

impl Apply {
    /// The op this node applies.
    pub fn op(&self) -> &OpRef {
        &self.op
    }

    /// Input variables, in argument order.
    pub fn inputs(&self) -> &[VarId] {
        &self.inputs
    }

    /// Output variables, each owned by this node at its position.
    pub fn outputs(&self) -> &[VarId] {
        &self.outputs
    }

    /// Number of inputs.
    pub fn nin(&self) -> usize {
        self.inputs.len()
    }

    /// Number of outputs.
    pub fn nout(&self) -> usize {
        self.outputs.len()
    }

    pub fn tag(&self) -> &Tag {
        &self.tag
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::fscalar;

    #[test]
    fn serials_are_unique() {
        let a = Serial::next();
        let b = Serial::next();
        assert_ne!(a, b);
    }

    #[test]
    fn auto_names_follow_serials() {
        let var = Variable::new(fscalar(), VarKind::Plain { owner: None }, None);
        assert_eq!(var.auto_name(), format!("auto_{}", var.serial().raw()));
    }

    #[test]
    fn atomic_kinds() {
        let constant = Variable::new(
            fscalar(),
            VarKind::Constant(Value::scalar(crate::value::DType::Float64, 1.0)),
            None,
        );
        let nominal = Variable::new(fscalar(), VarKind::Nominal(3), None);
        let shared = Variable::new(fscalar(), VarKind::Shared(Storage::new()), None);

        assert!(constant.is_atomic());
        assert!(nominal.is_atomic());
        assert_eq!(nominal.nominal_id(), Some(3));
        assert!(!shared.is_atomic());
        assert!(shared.owner().is_none());
    }

    #[test]
    fn tag_update_prefers_incoming() {
        let mut base = Tag::new();
        base.insert("trace", serde_json::json!("old"));
        base.insert("keep", serde_json::json!(1));

        let mut incoming = Tag::new();
        incoming.insert("trace", serde_json::json!("new"));

        base.update(&incoming);
        assert_eq!(base.get("trace"), Some(&serde_json::json!("new")));
        assert_eq!(base.get("keep"), Some(&serde_json::json!(1)));
    }
}
