//! Declared and resolved tensor specifications

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::shape::{DimensionOrder, Shape};

/// Element type of a tensor buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ElementType {
    /// 32-bit floating point
    Float32,
    /// 64-bit floating point
    Float64,
    /// 32-bit signed integer
    Int32,
    /// 64-bit signed integer
    Int64,
    /// 8-bit unsigned integer
    UInt8,
}

impl ElementType {
    /// Size of one element in bytes
    pub fn size_bytes(&self) -> usize {
        match self {
            ElementType::UInt8 => 1,
            ElementType::Float32 | ElementType::Int32 => 4,
            ElementType::Float64 | ElementType::Int64 => 8,
        }
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ElementType::Float32 => write!(f, "Float32"),
            ElementType::Float64 => write!(f, "Float64"),
            ElementType::Int32 => write!(f, "Int32"),
            ElementType::Int64 => write!(f, "Int64"),
            ElementType::UInt8 => write!(f, "UInt8"),
        }
    }
}

/// Stable identifier of one network tensor, usable as a map key and as a
/// persisted lookup key across save/reload cycles. Distinct from the
/// human-readable display name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TensorId(String);

impl TensorId {
    /// Create a new tensor identifier
    pub fn new(id: &str) -> Self {
        Self(id.to_string())
    }

    /// The identifier string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TensorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Declared description of one named network input, output or hidden output.
///
/// Constructed once per declared network interface, immutable, and shared
/// read-only across the pipeline. Equality and hashing are value-based over
/// all fields.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TensorSpec {
    id: TensorId,
    name: String,
    batch_size: Option<usize>,
    shape: Shape,
    element_type: ElementType,
    dimension_order: DimensionOrder,
}

impl TensorSpec {
    /// Create a new tensor spec. A declared batch size must be positive.
    pub fn new(
        id: TensorId,
        name: &str,
        batch_size: Option<usize>,
        shape: Shape,
        element_type: ElementType,
        dimension_order: DimensionOrder,
    ) -> Result<Self> {
        if batch_size == Some(0) {
            return Err(Error::InvalidArgument(
                "A declared batch size must be positive".into(),
            ));
        }
        Ok(Self {
            id,
            name: name.to_string(),
            batch_size,
            shape,
            element_type,
            dimension_order,
        })
    }

    /// Stable identifier of this tensor
    pub fn id(&self) -> &TensorId {
        &self.id
    }

    /// Display name of this tensor
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared batch size, if any
    pub fn batch_size(&self) -> Option<usize> {
        self.batch_size
    }

    /// Declared shape
    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    /// Element type of this tensor's buffer
    pub fn element_type(&self) -> ElementType {
        self.element_type
    }

    /// Semantic axis ordering
    pub fn dimension_order(&self) -> DimensionOrder {
        self.dimension_order
    }

    /// Serialize this spec to a binary format
    pub fn serialize(&self) -> Result<Vec<u8>> {
        bincode::serialize(self).map_err(Error::Serialization)
    }

    /// Deserialize a spec from a binary format
    pub fn deserialize(data: &[u8]) -> Result<Self> {
        bincode::deserialize(data).map_err(Error::Serialization)
    }
}

impl fmt::Display for TensorSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ('{}', shape {}, {})",
            self.name, self.id, self.shape, self.element_type
        )
    }
}

/// A tensor spec with batch size and shape fully resolved to concrete
/// numbers, derived at the start of an execution session. Never partial.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExecutionTensorSpec {
    id: TensorId,
    name: String,
    batch_size: usize,
    shape: Vec<usize>,
    element_type: ElementType,
    dimension_order: DimensionOrder,
}

impl ExecutionTensorSpec {
    /// Create a new execution tensor spec from concrete numbers
    pub fn new(
        id: TensorId,
        name: &str,
        batch_size: usize,
        shape: Vec<usize>,
        element_type: ElementType,
        dimension_order: DimensionOrder,
    ) -> Result<Self> {
        if batch_size == 0 {
            return Err(Error::InvalidArgument(
                "An execution batch size must be positive".into(),
            ));
        }
        if shape.is_empty() || shape.iter().any(|&d| d == 0) {
            return Err(Error::InvalidArgument(format!(
                "An execution shape must have positive dimensions, got {:?}",
                shape
            )));
        }
        Ok(Self {
            id,
            name: name.to_string(),
            batch_size,
            shape,
            element_type,
            dimension_order,
        })
    }

    /// Stable identifier of this tensor
    pub fn id(&self) -> &TensorId {
        &self.id
    }

    /// Display name of this tensor
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Resolved batch size
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Resolved concrete shape
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Element type of this tensor's buffer
    pub fn element_type(&self) -> ElementType {
        self.element_type
    }

    /// Semantic axis ordering
    pub fn dimension_order(&self) -> DimensionOrder {
        self.dimension_order
    }

    /// Element count of one example
    pub fn example_size(&self) -> usize {
        self.shape.iter().product()
    }

    /// Total element capacity of a tensor bound to this spec
    pub fn capacity(&self) -> usize {
        self.batch_size * self.example_size()
    }

    /// This spec with a different batch size, used to size tensors to a
    /// short final batch.
    pub fn with_batch_size(&self, batch_size: usize) -> Result<Self> {
        Self::new(
            self.id.clone(),
            &self.name,
            batch_size,
            self.shape.clone(),
            self.element_type,
            self.dimension_order,
        )
    }
}

impl fmt::Display for ExecutionTensorSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ('{}', shape {:?}, batch size {}, {})",
            self.name, self.id, self.shape, self.batch_size, self.element_type
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> TensorSpec {
        TensorSpec::new(
            TensorId::new("input:0"),
            "input",
            Some(4),
            Shape::fixed(vec![10, 10]).unwrap(),
            ElementType::Float32,
            DimensionOrder::Tdhwc,
        )
        .unwrap()
    }

    #[test]
    fn test_value_equality_and_hash_key() {
        use std::collections::HashMap;

        let a = spec();
        let b = spec();
        assert_eq!(a, b);

        let mut map = HashMap::new();
        map.insert(a.id().clone(), a.clone());
        assert_eq!(map.get(&TensorId::new("input:0")), Some(&a));
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let result = TensorSpec::new(
            TensorId::new("t"),
            "t",
            Some(0),
            Shape::Unknown,
            ElementType::Float32,
            DimensionOrder::Unknown,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_execution_spec_sizes() {
        let exec = ExecutionTensorSpec::new(
            TensorId::new("input:0"),
            "input",
            4,
            vec![10, 10],
            ElementType::Float32,
            DimensionOrder::Tdhwc,
        )
        .unwrap();
        assert_eq!(exec.example_size(), 100);
        assert_eq!(exec.capacity(), 400);

        let short = exec.with_batch_size(3).unwrap();
        assert_eq!(short.capacity(), 300);
        assert_eq!(short.shape(), &[10, 10]);
    }

    #[test]
    fn test_execution_spec_rejects_degenerate_shapes() {
        assert!(ExecutionTensorSpec::new(
            TensorId::new("t"),
            "t",
            1,
            vec![],
            ElementType::Float32,
            DimensionOrder::Unknown,
        )
        .is_err());
        assert!(ExecutionTensorSpec::new(
            TensorId::new("t"),
            "t",
            1,
            vec![3, 0],
            ElementType::Float32,
            DimensionOrder::Unknown,
        )
        .is_err());
    }

    #[test]
    fn test_spec_binary_roundtrip() {
        let spec = spec();
        let bytes = spec.serialize().unwrap();
        assert_eq!(TensorSpec::deserialize(&bytes).unwrap(), spec);
    }
}
