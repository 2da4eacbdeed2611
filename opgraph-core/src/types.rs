//! The Type Capability
//!
//! A [`Type`] describes the domain of a variable's data. The graph core only
//! needs a handful of questions answered: is this value acceptable (and
//! what does it become after conversion), can this variable stand in for
//! one of my type, and are two types interchangeable.
//!
//! Types are shared as [`TypeRef`], which compares and hashes through the
//! trait so it can key maps such as the nominal registry.
//!
//! [`TensorType`] is a small reference implementation (dtype plus a
//! partially known shape) used by the crate's own tests and benches.

use std::any::Any;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Deref;
use std::sync::Arc;

use smallvec::SmallVec;

use crate::error::{GraphError, Result, TypeError};
use crate::graph::{Graph, VarId};
use crate::value::{DType, Value};

/// Domain of a variable's data.
pub trait Type: fmt::Debug + fmt::Display + Send + Sync + 'static {
    fn as_any(&self) -> &dyn Any;

    /// Structural equality with another type.
    fn equals(&self, other: &dyn Type) -> bool;

    /// Feed the type's identity into `state`. Must agree with [`Type::equals`].
    fn hash_key(&self, state: &mut dyn Hasher);

    /// Validate `value` and return it converted to this type.
    ///
    /// With `strict` no conversion at all is allowed. `allow_downcast`
    /// permits lossy conversions when `Some(true)`.
    fn filter(
        &self,
        value: Value,
        strict: bool,
        allow_downcast: Option<bool>,
    ) -> std::result::Result<Value, TypeError>;

    fn is_valid_value(&self, value: &Value) -> bool {
        self.filter(value.clone(), true, None).is_ok()
    }

    /// Whether every variable of type `other` is also a valid variable of
    /// this type.
    fn is_super(&self, other: &dyn Type) -> bool {
        self.equals(other)
    }

    /// Whether `other` belongs to the same family of types, so that
    /// variables of the two can be compared structurally.
    fn in_same_class(&self, other: &dyn Type) -> bool {
        self.equals(other)
    }

    fn values_eq(&self, a: &Value, b: &Value) -> bool {
        a == b
    }

    /// Produce a variable of this type from `var`, if possible without
    /// changing its meaning. May add nodes to `graph`.
    fn convert_variable(&self, graph: &mut Graph, var: VarId) -> Option<VarId> {
        let other = graph.var(var).ok()?.ty().clone();
        self.is_super(&*other).then_some(var)
    }

    /// Like [`Type::convert_variable`] but fails when no conversion exists.
    fn filter_variable(&self, graph: &mut Graph, var: VarId) -> Result<VarId> {
        let other = graph.var(var)?.ty().clone();
        if self.equals(&*other) {
            return Ok(var);
        }
        self.convert_variable(graph, var).ok_or_else(|| {
            GraphError::Type(TypeError::Incompatible {
                expected: self.to_string(),
                got: other.to_string(),
            })
        })
    }
}

/// Shared handle to a [`Type`].
#[derive(Clone)]
pub struct TypeRef(Arc<dyn Type>);

impl TypeRef {
    pub fn new<T: Type>(ty: T) -> Self {
        Self(Arc::new(ty))
    }

    pub fn downcast_ref<T: Type>(&self) -> Option<&T> {
        self.0.as_any().downcast_ref::<T>()
    }
}

impl Deref for TypeRef {
    type Target = dyn Type;

    fn deref(&self) -> &Self::Target {
        &*self.0
    }
}

impl PartialEq for TypeRef {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0) || self.0.equals(&*other.0)
    }
}

impl Eq for TypeRef {}

impl Hash for TypeRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.hash_key(state);
    }
}

impl fmt::Debug for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.0, f)
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&*self.0, f)
    }
}

/// Dense arrays of a fixed dtype and rank. `None` dimensions are unknown
/// until runtime.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TensorType {
    pub dtype: DType,
    pub shape: SmallVec<[Option<usize>; 4]>,
}

impl TensorType {
    pub fn new(dtype: DType, shape: &[Option<usize>]) -> Self {
        Self {
            dtype,
            shape: SmallVec::from_slice(shape),
        }
    }

    pub fn scalar(dtype: DType) -> Self {
        Self::new(dtype, &[])
    }

    pub fn vector(dtype: DType, len: Option<usize>) -> Self {
        Self::new(dtype, &[len])
    }

    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    fn accepts_shape(&self, shape: &[usize]) -> bool {
        shape.len() == self.shape.len()
            && self
                .shape
                .iter()
                .zip(shape)
                .all(|(want, got)| want.map_or(true, |w| w == *got))
    }

    fn shape_string(&self) -> String {
        let dims: Vec<String> = self
            .shape
            .iter()
            .map(|d| d.map_or_else(|| "?".to_string(), |d| d.to_string()))
            .collect();
        format!("({})", dims.join(", "))
    }
}

impl fmt::Display for TensorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TensorType({}, {})", self.dtype, self.shape_string())
    }
}

impl Type for TensorType {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn equals(&self, other: &dyn Type) -> bool {
        other
            .as_any()
            .downcast_ref::<TensorType>()
            .is_some_and(|o| o == self)
    }

    fn hash_key(&self, mut state: &mut dyn Hasher) {
        self.hash(&mut state);
    }

    fn filter(
        &self,
        value: Value,
        strict: bool,
        allow_downcast: Option<bool>,
    ) -> std::result::Result<Value, TypeError> {
        let value = if value.dtype() == self.dtype {
            value
        } else if strict {
            return Err(TypeError::DType {
                expected: self.dtype,
                got: value.dtype(),
            });
        } else if value.dtype().can_cast_safely(self.dtype) || allow_downcast == Some(true) {
            value.cast(self.dtype)
        } else {
            return Err(TypeError::Downcast {
                from: value.dtype(),
                to: self.dtype,
            });
        };

        if !self.accepts_shape(value.shape()) {
            return Err(TypeError::Shape {
                expected: self.shape_string(),
                got: value.shape().to_vec(),
            });
        }
        Ok(value)
    }

    fn is_super(&self, other: &dyn Type) -> bool {
        let Some(other) = other.as_any().downcast_ref::<TensorType>() else {
            return false;
        };
        self.dtype == other.dtype
            && self.ndim() == other.ndim()
            && self
                .shape
                .iter()
                .zip(&other.shape)
                .all(|(mine, theirs)| mine.is_none() || mine == theirs)
    }

    fn in_same_class(&self, other: &dyn Type) -> bool {
        other
            .as_any()
            .downcast_ref::<TensorType>()
            .is_some_and(|o| o.dtype == self.dtype && o.ndim() == self.ndim())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    fn fvec(len: Option<usize>) -> TypeRef {
        TypeRef::new(TensorType::vector(DType::Float64, len))
    }

    #[test]
    fn typeref_equality_is_structural() {
        assert_eq!(fvec(Some(3)), fvec(Some(3)));
        assert_ne!(fvec(Some(3)), fvec(None));

        let set: HashSet<TypeRef> = [fvec(Some(3)), fvec(Some(3)), fvec(None)].into_iter().collect();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn filter_upcasts_unless_strict() {
        let ty = TensorType::scalar(DType::Float64);
        let int = Value::scalar(DType::Int32, 3.0);

        let out = ty.filter(int.clone(), false, None).unwrap();
        assert_eq!(out.dtype(), DType::Float64);

        assert!(matches!(
            ty.filter(int, true, None),
            Err(TypeError::DType { .. })
        ));
    }

    #[test]
    fn filter_downcast_needs_permission() {
        let ty = TensorType::scalar(DType::Float32);
        let wide = Value::scalar(DType::Float64, 0.5);

        assert!(matches!(
            ty.filter(wide.clone(), false, None),
            Err(TypeError::Downcast { .. })
        ));
        let out = ty.filter(wide, false, Some(true)).unwrap();
        assert_eq!(out.dtype(), DType::Float32);
    }

    #[test]
    fn filter_checks_known_dims() {
        let ty = TensorType::vector(DType::Float64, Some(2));
        let bad = Value::vector(DType::Float64, vec![1.0, 2.0, 3.0]);
        assert!(matches!(ty.filter(bad, false, None), Err(TypeError::Shape { .. })));

        let any_len = TensorType::vector(DType::Float64, None);
        assert!(any_len.is_valid_value(&Value::vector(DType::Float64, vec![1.0; 7])));
    }

    #[test]
    fn unknown_dims_are_super() {
        let general = TensorType::vector(DType::Float64, None);
        let specific = TensorType::vector(DType::Float64, Some(4));
        assert!(general.is_super(&specific));
        assert!(!specific.is_super(&general));
        assert!(specific.in_same_class(&general));
    }

    #[test]
    fn filter_variable_accepts_subtypes_only() {
        let mut graph = Graph::new();
        let specific = graph.variable(fvec(Some(4)), None);
        let general = graph.variable(fvec(None), None);

        let general_ty = fvec(None);
        assert_eq!(general_ty.filter_variable(&mut graph, specific).unwrap(), specific);

        let specific_ty = fvec(Some(4));
        let err = specific_ty.filter_variable(&mut graph, general).unwrap_err();
        assert!(matches!(err, GraphError::Type(TypeError::Incompatible { .. })));
    }
}
