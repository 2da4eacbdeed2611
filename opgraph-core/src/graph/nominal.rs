//! Nominal variable interning.

use indexmap::IndexMap;

use super::VarId;
use crate::types::TypeRef;

/// Interns nominal variables by `(type, id)`.
///
/// Each [`Graph`](super::Graph) owns one registry, so asking the same graph
/// twice for nominal `id` of a type yields the same handle. Entries are
/// never evicted.
#[derive(Debug, Clone, Default)]
pub struct NominalRegistry {
    entries: IndexMap<(TypeRef, u64), VarId>,
}

impl NominalRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, ty: &TypeRef, id: u64) -> Option<VarId> {
        self.entries.get(&(ty.clone(), id)).copied()
    }

    pub(crate) fn insert(&mut self, ty: TypeRef, id: u64, var: VarId) {
        self.entries.insert((ty, id), var);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Registered nominals in creation order.
    pub fn iter(&self) -> impl Iterator<Item = (&TypeRef, u64, VarId)> {
        self.entries.iter().map(|((ty, id), var)| (ty, *id, *var))
    }
}
