//! External column value model
//!
//! Cells are what the surrounding host hands over per table column. A
//! dedicated `Missing` marker is part of the model because missing values
//! must fail conversion loudly instead of being defaulted away.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Type of an external column value
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColumnType {
    /// Boolean value
    Boolean,
    /// 32-bit signed integer
    Int,
    /// 64-bit signed integer
    Long,
    /// 32-bit floating point
    Float,
    /// 64-bit floating point
    Double,
    /// UTF-8 encoded string
    String,
    /// Collection of values of one element type
    Collection(Box<ColumnType>),
}

impl ColumnType {
    /// Check if this type is a numeric type
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            ColumnType::Int | ColumnType::Long | ColumnType::Float | ColumnType::Double
        )
    }

    /// Check if this type is a collection type
    pub fn is_collection(&self) -> bool {
        matches!(self, ColumnType::Collection(_))
    }

    /// Element type of a collection type, `None` otherwise
    pub fn element_type(&self) -> Option<&ColumnType> {
        match self {
            ColumnType::Collection(inner) => Some(inner),
            _ => None,
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnType::Boolean => write!(f, "Boolean"),
            ColumnType::Int => write!(f, "Int"),
            ColumnType::Long => write!(f, "Long"),
            ColumnType::Float => write!(f, "Float"),
            ColumnType::Double => write!(f, "Double"),
            ColumnType::String => write!(f, "String"),
            ColumnType::Collection(inner) => write!(f, "Collection({})", inner),
        }
    }
}

/// One external column value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DataCell {
    /// Missing value marker
    Missing,
    /// Boolean value
    Boolean(bool),
    /// 32-bit signed integer
    Int(i32),
    /// 64-bit signed integer
    Long(i64),
    /// 32-bit floating point
    Float(f32),
    /// 64-bit floating point
    Double(f64),
    /// UTF-8 encoded string
    String(String),
    /// Collection of 32-bit floats
    FloatVector(Vec<f32>),
    /// Collection of 64-bit floats
    DoubleVector(Vec<f64>),
    /// Collection of 32-bit integers
    IntVector(Vec<i32>),
}

impl DataCell {
    /// Whether this cell is the missing marker
    pub fn is_missing(&self) -> bool {
        matches!(self, DataCell::Missing)
    }

    /// The column type of this cell, `None` for the missing marker
    pub fn column_type(&self) -> Option<ColumnType> {
        match self {
            DataCell::Missing => None,
            DataCell::Boolean(_) => Some(ColumnType::Boolean),
            DataCell::Int(_) => Some(ColumnType::Int),
            DataCell::Long(_) => Some(ColumnType::Long),
            DataCell::Float(_) => Some(ColumnType::Float),
            DataCell::Double(_) => Some(ColumnType::Double),
            DataCell::String(_) => Some(ColumnType::String),
            DataCell::FloatVector(_) => Some(ColumnType::Collection(Box::new(ColumnType::Float))),
            DataCell::DoubleVector(_) => Some(ColumnType::Collection(Box::new(ColumnType::Double))),
            DataCell::IntVector(_) => Some(ColumnType::Collection(Box::new(ColumnType::Int))),
        }
    }

    /// Number of elements this cell contributes to a tensor
    pub fn element_count(&self) -> usize {
        match self {
            DataCell::Missing => 0,
            DataCell::FloatVector(v) => v.len(),
            DataCell::DoubleVector(v) => v.len(),
            DataCell::IntVector(v) => v.len(),
            _ => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_type_predicates() {
        assert!(ColumnType::Double.is_numeric());
        assert!(!ColumnType::String.is_numeric());
        let coll = ColumnType::Collection(Box::new(ColumnType::Float));
        assert!(coll.is_collection());
        assert_eq!(coll.element_type(), Some(&ColumnType::Float));
        assert_eq!(ColumnType::Float.element_type(), None);
    }

    #[test]
    fn test_cell_types_and_counts() {
        assert!(DataCell::Missing.is_missing());
        assert_eq!(DataCell::Missing.column_type(), None);
        assert_eq!(DataCell::Double(1.0).element_count(), 1);
        assert_eq!(DataCell::FloatVector(vec![1.0, 2.0, 3.0]).element_count(), 3);
        assert_eq!(
            DataCell::FloatVector(vec![]).column_type(),
            Some(ColumnType::Collection(Box::new(ColumnType::Float)))
        );
    }
}
