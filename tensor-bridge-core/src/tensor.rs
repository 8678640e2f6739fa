//! Typed, batch-aware tensor buffers
//!
//! A tensor owns one buffer bound to an execution spec. Writes are
//! append-only and checked against the declared capacity; a write past
//! capacity is a reportable overflow, never a silent truncation. Reads
//! advance a separate cursor and fail on underflow.

use crate::error::{Error, Result};
use crate::spec::{ElementType, ExecutionTensorSpec};

/// Storage for one tensor, tagged by element type
#[derive(Debug, Clone, PartialEq)]
pub enum TensorData {
    /// 32-bit floating point storage
    Float32(Vec<f32>),
    /// 64-bit floating point storage
    Float64(Vec<f64>),
    /// 32-bit signed integer storage
    Int32(Vec<i32>),
    /// 64-bit signed integer storage
    Int64(Vec<i64>),
    /// 8-bit unsigned integer storage
    UInt8(Vec<u8>),
}

impl TensorData {
    fn with_capacity(element_type: ElementType, capacity: usize) -> Self {
        match element_type {
            ElementType::Float32 => TensorData::Float32(Vec::with_capacity(capacity)),
            ElementType::Float64 => TensorData::Float64(Vec::with_capacity(capacity)),
            ElementType::Int32 => TensorData::Int32(Vec::with_capacity(capacity)),
            ElementType::Int64 => TensorData::Int64(Vec::with_capacity(capacity)),
            ElementType::UInt8 => TensorData::UInt8(Vec::with_capacity(capacity)),
        }
    }

    /// Number of elements currently stored
    pub fn len(&self) -> usize {
        match self {
            TensorData::Float32(v) => v.len(),
            TensorData::Float64(v) => v.len(),
            TensorData::Int32(v) => v.len(),
            TensorData::Int64(v) => v.len(),
            TensorData::UInt8(v) => v.len(),
        }
    }

    /// Check if no elements are stored
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Element type of this storage
    pub fn element_type(&self) -> ElementType {
        match self {
            TensorData::Float32(_) => ElementType::Float32,
            TensorData::Float64(_) => ElementType::Float64,
            TensorData::Int32(_) => ElementType::Int32,
            TensorData::Int64(_) => ElementType::Int64,
            TensorData::UInt8(_) => ElementType::UInt8,
        }
    }

    fn clear(&mut self) {
        match self {
            TensorData::Float32(v) => v.clear(),
            TensorData::Float64(v) => v.clear(),
            TensorData::Int32(v) => v.clear(),
            TensorData::Int64(v) => v.clear(),
            TensorData::UInt8(v) => v.clear(),
        }
    }
}

/// One concrete, shaped, in-memory tensor buffer
#[derive(Debug, Clone)]
pub struct Tensor {
    spec: ExecutionTensorSpec,
    data: TensorData,
    read_cursor: usize,
}

impl Tensor {
    /// Allocate a tensor for the given execution spec
    pub fn new(spec: ExecutionTensorSpec) -> Self {
        let data = TensorData::with_capacity(spec.element_type(), spec.capacity());
        Self {
            spec,
            data,
            read_cursor: 0,
        }
    }

    /// The execution spec this tensor is bound to
    pub fn spec(&self) -> &ExecutionTensorSpec {
        &self.spec
    }

    /// Number of elements written so far
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Declared element capacity (`batch_size * example_size`)
    pub fn capacity(&self) -> usize {
        self.spec.capacity()
    }

    /// Number of elements left to read
    pub fn remaining(&self) -> usize {
        self.data.len() - self.read_cursor
    }

    /// The underlying storage
    pub fn data(&self) -> &TensorData {
        &self.data
    }

    /// Clear all written elements and the read cursor for reuse
    pub fn reset(&mut self) {
        self.data.clear();
        self.read_cursor = 0;
    }

    fn check_capacity(&self, additional: usize) -> Result<()> {
        let attempted = self.data.len() + additional;
        if attempted > self.capacity() {
            return Err(Error::BufferOverflow {
                capacity: self.capacity(),
                attempted,
            });
        }
        Ok(())
    }

    /// Append 32-bit floats, widening to a wider float storage if needed
    pub fn write_f32(&mut self, values: &[f32]) -> Result<()> {
        self.check_capacity(values.len())?;
        match &mut self.data {
            TensorData::Float32(v) => v.extend_from_slice(values),
            TensorData::Float64(v) => v.extend(values.iter().map(|&x| f64::from(x))),
            other => {
                return Err(Error::TypeMismatch(format!(
                    "cannot write Float32 values into a {} buffer",
                    other.element_type()
                )))
            }
        }
        Ok(())
    }

    /// Append 64-bit floats
    pub fn write_f64(&mut self, values: &[f64]) -> Result<()> {
        self.check_capacity(values.len())?;
        match &mut self.data {
            TensorData::Float64(v) => v.extend_from_slice(values),
            other => {
                return Err(Error::TypeMismatch(format!(
                    "cannot write Float64 values into a {} buffer",
                    other.element_type()
                )))
            }
        }
        Ok(())
    }

    /// Append 32-bit integers, widening losslessly where possible
    pub fn write_i32(&mut self, values: &[i32]) -> Result<()> {
        self.check_capacity(values.len())?;
        match &mut self.data {
            TensorData::Int32(v) => v.extend_from_slice(values),
            TensorData::Int64(v) => v.extend(values.iter().map(|&x| i64::from(x))),
            TensorData::Float64(v) => v.extend(values.iter().map(|&x| f64::from(x))),
            other => {
                return Err(Error::TypeMismatch(format!(
                    "cannot write Int32 values into a {} buffer",
                    other.element_type()
                )))
            }
        }
        Ok(())
    }

    /// Append 64-bit integers
    pub fn write_i64(&mut self, values: &[i64]) -> Result<()> {
        self.check_capacity(values.len())?;
        match &mut self.data {
            TensorData::Int64(v) => v.extend_from_slice(values),
            other => {
                return Err(Error::TypeMismatch(format!(
                    "cannot write Int64 values into a {} buffer",
                    other.element_type()
                )))
            }
        }
        Ok(())
    }

    /// Append unsigned bytes, widening losslessly into any storage
    pub fn write_u8(&mut self, values: &[u8]) -> Result<()> {
        self.check_capacity(values.len())?;
        match &mut self.data {
            TensorData::UInt8(v) => v.extend_from_slice(values),
            TensorData::Int32(v) => v.extend(values.iter().map(|&x| i32::from(x))),
            TensorData::Int64(v) => v.extend(values.iter().map(|&x| i64::from(x))),
            TensorData::Float32(v) => v.extend(values.iter().map(|&x| f32::from(x))),
            TensorData::Float64(v) => v.extend(values.iter().map(|&x| f64::from(x))),
        }
        Ok(())
    }

    fn check_remaining(&self, count: usize) -> Result<()> {
        if self.remaining() < count {
            return Err(Error::BufferUnderflow);
        }
        Ok(())
    }

    /// Read `count` elements as 64-bit floats, widening from any storage
    pub fn read_f64(&mut self, count: usize) -> Result<Vec<f64>> {
        self.check_remaining(count)?;
        let start = self.read_cursor;
        let end = start + count;
        let values = match &self.data {
            TensorData::Float32(v) => v[start..end].iter().map(|&x| f64::from(x)).collect(),
            TensorData::Float64(v) => v[start..end].to_vec(),
            TensorData::Int32(v) => v[start..end].iter().map(|&x| f64::from(x)).collect(),
            TensorData::Int64(v) => v[start..end].iter().map(|&x| x as f64).collect(),
            TensorData::UInt8(v) => v[start..end].iter().map(|&x| f64::from(x)).collect(),
        };
        self.read_cursor = end;
        Ok(values)
    }

    /// Read `count` elements as 32-bit floats from a Float32 buffer
    pub fn read_f32(&mut self, count: usize) -> Result<Vec<f32>> {
        self.check_remaining(count)?;
        let start = self.read_cursor;
        let end = start + count;
        let values = match &self.data {
            TensorData::Float32(v) => v[start..end].to_vec(),
            TensorData::UInt8(v) => v[start..end].iter().map(|&x| f32::from(x)).collect(),
            other => {
                return Err(Error::TypeMismatch(format!(
                    "cannot read Float32 values from a {} buffer",
                    other.element_type()
                )))
            }
        };
        self.read_cursor = end;
        Ok(values)
    }

    /// Read `count` elements as 32-bit integers from an Int32 or UInt8 buffer
    pub fn read_i32(&mut self, count: usize) -> Result<Vec<i32>> {
        self.check_remaining(count)?;
        let start = self.read_cursor;
        let end = start + count;
        let values = match &self.data {
            TensorData::Int32(v) => v[start..end].to_vec(),
            TensorData::UInt8(v) => v[start..end].iter().map(|&x| i32::from(x)).collect(),
            other => {
                return Err(Error::TypeMismatch(format!(
                    "cannot read Int32 values from a {} buffer",
                    other.element_type()
                )))
            }
        };
        self.read_cursor = end;
        Ok(values)
    }

    /// Raw byte view of the filled region, for handing to a backend
    pub fn as_bytes(&self) -> &[u8] {
        match &self.data {
            TensorData::Float32(v) => bytemuck::cast_slice(v),
            TensorData::Float64(v) => bytemuck::cast_slice(v),
            TensorData::Int32(v) => bytemuck::cast_slice(v),
            TensorData::Int64(v) => bytemuck::cast_slice(v),
            TensorData::UInt8(v) => v,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shape::DimensionOrder;
    use crate::spec::TensorId;

    fn tensor(element_type: ElementType, batch_size: usize, shape: Vec<usize>) -> Tensor {
        Tensor::new(
            ExecutionTensorSpec::new(
                TensorId::new("t"),
                "t",
                batch_size,
                shape,
                element_type,
                DimensionOrder::Unknown,
            )
            .unwrap(),
        )
    }

    #[test]
    fn test_capacity_and_size() {
        let mut t = tensor(ElementType::Float32, 2, vec![5]);
        assert_eq!(t.capacity(), 10);
        t.write_f32(&[1.0; 10]).unwrap();
        assert_eq!(t.size(), 10);
    }

    #[test]
    fn test_overflow_detection() {
        let mut t = tensor(ElementType::Float32, 1, vec![10]);
        let result = t.write_f32(&[0.5; 11]);
        assert!(matches!(
            result,
            Err(Error::BufferOverflow {
                capacity: 10,
                attempted: 11
            })
        ));
        // Nothing was committed
        assert_eq!(t.size(), 0);
    }

    #[test]
    fn test_overflow_across_writes() {
        let mut t = tensor(ElementType::Float32, 1, vec![10]);
        t.write_f32(&[0.5; 8]).unwrap();
        assert!(t.write_f32(&[0.5; 3]).is_err());
        assert_eq!(t.size(), 8);
    }

    #[test]
    fn test_widening_writes() {
        let mut t = tensor(ElementType::Float64, 1, vec![4]);
        t.write_f32(&[1.5, 2.5]).unwrap();
        t.write_i32(&[3, 4]).unwrap();
        assert_eq!(t.read_f64(4).unwrap(), vec![1.5, 2.5, 3.0, 4.0]);
    }

    #[test]
    fn test_lossy_write_rejected() {
        let mut t = tensor(ElementType::Int32, 1, vec![2]);
        assert!(matches!(
            t.write_f32(&[1.0]),
            Err(Error::TypeMismatch(_))
        ));
    }

    #[test]
    fn test_read_underflow() {
        let mut t = tensor(ElementType::Float32, 1, vec![4]);
        t.write_f32(&[1.0, 2.0]).unwrap();
        assert_eq!(t.read_f32(2).unwrap(), vec![1.0, 2.0]);
        assert!(matches!(t.read_f32(1), Err(Error::BufferUnderflow)));
    }

    #[test]
    fn test_reset_clears_cursors() {
        let mut t = tensor(ElementType::Float32, 1, vec![2]);
        t.write_f32(&[1.0, 2.0]).unwrap();
        t.read_f32(1).unwrap();
        t.reset();
        assert_eq!(t.size(), 0);
        assert_eq!(t.remaining(), 0);
    }

    #[test]
    fn test_byte_view() {
        let mut t = tensor(ElementType::Float32, 1, vec![2]);
        t.write_f32(&[1.0, 2.0]).unwrap();
        assert_eq!(t.as_bytes().len(), 8);
    }
}
