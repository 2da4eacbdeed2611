//! Concrete Values
//!
//! A [`Value`] is the data moved through storage cells when a linked
//! program runs. The graph core never inspects it beyond equality; ops
//! and types give it meaning.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::error::TypeError;

/// Element type of a [`Value`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DType {
    Bool,
    Int32,
    Int64,
    Float32,
    Float64,
}

impl DType {
    pub fn name(self) -> &'static str {
        match self {
            DType::Bool => "bool",
            DType::Int32 => "int32",
            DType::Int64 => "int64",
            DType::Float32 => "float32",
            DType::Float64 => "float64",
        }
    }

    pub fn is_float(self) -> bool {
        matches!(self, DType::Float32 | DType::Float64)
    }

    /// Whether every value of `self` is exactly representable in `to`.
    pub fn can_cast_safely(self, to: DType) -> bool {
        use DType::*;
        match (self, to) {
            (a, b) if a == b => true,
            (Bool, _) => true,
            (Int32, Int64 | Float64) => true,
            (Float32, Float64) => true,
            _ => false,
        }
    }

    /// Round `value` to what this dtype can hold.
    pub fn coerce(self, value: f64) -> f64 {
        match self {
            DType::Bool => {
                if value != 0.0 {
                    1.0
                } else {
                    0.0
                }
            }
            DType::Int32 => (value.trunc() as i32) as f64,
            DType::Int64 => (value.trunc() as i64) as f64,
            DType::Float32 => (value as f32) as f64,
            DType::Float64 => value,
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A dense, immutable array of elements with a dtype and a shape.
///
/// Scalars have an empty shape. Elements are stored as `f64` regardless of
/// dtype and are coerced on construction, so two values with different
/// dtypes can still be compared element-wise with [`Value::same_data`].
#[derive(Debug, Clone, PartialEq)]
pub struct Value {
    dtype: DType,
    shape: SmallVec<[usize; 4]>,
    data: Arc<[f64]>,
}

impl Value {
    pub fn scalar(dtype: DType, value: f64) -> Self {
        Self {
            dtype,
            shape: SmallVec::new(),
            data: Arc::from(vec![dtype.coerce(value)]),
        }
    }

    pub fn vector(dtype: DType, data: Vec<f64>) -> Self {
        let len = data.len();
        Self {
            dtype,
            shape: SmallVec::from_slice(&[len]),
            data: data.into_iter().map(|v| dtype.coerce(v)).collect(),
        }
    }

    /// Build a value of arbitrary rank. `data` is in row-major order.
    pub fn from_shape(dtype: DType, shape: &[usize], data: Vec<f64>) -> Result<Self, TypeError> {
        let expected: usize = shape.iter().product();
        if expected != data.len() {
            return Err(TypeError::Size {
                expected,
                got: data.len(),
            });
        }
        Ok(Self {
            dtype,
            shape: SmallVec::from_slice(shape),
            data: data.into_iter().map(|v| dtype.coerce(v)).collect(),
        })
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn data(&self) -> &[f64] {
        &self.data
    }

    /// The element of a rank-0 value.
    pub fn as_scalar(&self) -> Option<f64> {
        if self.shape.is_empty() {
            self.data.first().copied()
        } else {
            None
        }
    }

    /// Convert to another dtype, coercing every element.
    pub fn cast(&self, dtype: DType) -> Self {
        if dtype == self.dtype {
            return self.clone();
        }
        Self {
            dtype,
            shape: self.shape.clone(),
            data: self.data.iter().map(|v| dtype.coerce(*v)).collect(),
        }
    }

    /// Element-wise map that keeps dtype and shape.
    pub fn map(&self, f: impl Fn(f64) -> f64) -> Self {
        Self {
            dtype: self.dtype,
            shape: self.shape.clone(),
            data: self.data.iter().map(|v| self.dtype.coerce(f(*v))).collect(),
        }
    }

    /// Equal shape and elements, ignoring dtype.
    pub fn same_data(&self, other: &Value) -> bool {
        self.shape == other.shape && self.data == other.data
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(v) = self.as_scalar() {
            return write!(f, "{v}");
        }
        f.write_str("[")?;
        for (i, v) in self.data.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{v}")?;
        }
        f.write_str("]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_is_coerced_to_dtype() {
        let v = Value::scalar(DType::Int32, 2.7);
        assert_eq!(v.as_scalar(), Some(2.0));
        assert_eq!(v.ndim(), 0);
    }

    #[test]
    fn from_shape_checks_size() {
        let err = Value::from_shape(DType::Float64, &[2, 3], vec![1.0; 5]).unwrap_err();
        assert_eq!(err, TypeError::Size { expected: 6, got: 5 });

        let ok = Value::from_shape(DType::Float64, &[2, 3], vec![1.0; 6]).unwrap();
        assert_eq!(ok.shape(), &[2, 3]);
    }

    #[test]
    fn same_data_ignores_dtype() {
        let a = Value::vector(DType::Int64, vec![1.0, 2.0]);
        let b = Value::vector(DType::Float64, vec![1.0, 2.0]);
        assert_ne!(a, b);
        assert!(a.same_data(&b));
    }

    #[test]
    fn safe_casts() {
        assert!(DType::Int32.can_cast_safely(DType::Float64));
        assert!(!DType::Float64.can_cast_safely(DType::Float32));
        assert!(!DType::Int64.can_cast_safely(DType::Int32));
    }

    #[test]
    fn display() {
        assert_eq!(Value::scalar(DType::Float64, 1.5).to_string(), "1.5");
        assert_eq!(Value::vector(DType::Int64, vec![1.0, 2.0]).to_string(), "[1, 2]");
    }
}
