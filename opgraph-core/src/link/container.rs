//! Storage Cells and Containers
//!
//! A [`Storage`] is a single shared slot holding at most one [`Value`].
//! Thunks read their inputs from and write their outputs to storages, and
//! the linker wires them together by handing the same storage to the
//! producer and the consumers of a variable.
//!
//! A [`Container`] is how callers touch a storage from outside: it knows
//! the variable's type and filters every assigned value through it.

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::{GraphError, Result};
use crate::types::TypeRef;
use crate::value::Value;

/// Shared single-value cell.
#[derive(Debug, Clone, Default)]
pub struct Storage(Arc<RwLock<Option<Value>>>);

impl Storage {
    /// An empty cell.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_value(value: Value) -> Self {
        Self(Arc::new(RwLock::new(Some(value))))
    }

    pub fn get(&self) -> Option<Value> {
        self.0.read().clone()
    }

    pub fn set(&self, value: Option<Value>) {
        *self.0.write() = value;
    }

    pub fn clear(&self) {
        self.set(None);
    }

    pub fn is_empty(&self) -> bool {
        self.0.read().is_none()
    }

    /// Same cell, not just equal contents.
    pub fn ptr_eq(&self, other: &Storage) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

/// A typed, validated handle on a storage cell.
#[derive(Debug, Clone)]
pub struct Container {
    ty: TypeRef,
    storage: Storage,
    name: Option<String>,
    readonly: bool,
    strict: bool,
    allow_downcast: Option<bool>,
}

impl Container {
    pub fn new(ty: TypeRef, storage: Storage) -> Self {
        Self {
            ty,
            storage,
            name: None,
            readonly: false,
            strict: false,
            allow_downcast: None,
        }
    }

    pub fn named(mut self, name: Option<&str>) -> Self {
        self.name = name.map(str::to_owned);
        self
    }

    pub fn readonly(mut self, readonly: bool) -> Self {
        self.readonly = readonly;
        self
    }

    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn allow_downcast(mut self, allow_downcast: Option<bool>) -> Self {
        self.allow_downcast = allow_downcast;
        self
    }

    /// The type assigned values are filtered through.
    pub fn ty(&self) -> &TypeRef {
        &self.ty
    }

    /// The underlying cell.
    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn is_readonly(&self) -> bool {
        self.readonly
    }

    /// A copy of the current value.
    pub fn get(&self) -> Option<Value> {
        self.storage.get()
    }

    /// Store `value` after filtering it through the container's type.
    /// `None` empties the cell.
    pub fn set(&self, value: Option<Value>) -> Result<()> {
        if self.readonly {
            return Err(GraphError::ReadOnly {
                name: self.display_name(),
            });
        }
        let filtered = match value {
            None => None,
            Some(value) => Some(
                self.ty
                    .filter(value, self.strict, self.allow_downcast)
                    .map_err(|source| GraphError::Container {
                        name: self.display_name(),
                        source,
                    })?,
            ),
        };
        self.storage.set(filtered);
        Ok(())
    }

    /// A container with the same settings over a new cell holding a copy of
    /// the current value.
    pub fn deep_copy(&self) -> Self {
        let storage = match self.storage.get() {
            Some(value) => Storage::with_value(value),
            None => Storage::new(),
        };
        Self {
            storage,
            ..self.clone()
        }
    }

    fn display_name(&self) -> String {
        self.name.clone().unwrap_or_else(|| "<unnamed>".to_string())
    }
}

impl fmt::Display for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.storage.get() {
            Some(value) => write!(f, "<{value}>"),
            None => f.write_str("<None>"),
        }
    }
}
