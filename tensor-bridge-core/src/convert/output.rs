//! Built-in tensor-to-value converter factories

use std::sync::Arc;

use crate::cell::{ColumnType, DataCell};
use crate::error::{Error, Result};
use crate::spec::{ElementType, ExecutionTensorSpec};
use crate::tensor::Tensor;

use super::{ConverterTier, TensorToValueConverter, TensorToValueConverterFactory};

fn slot_error(needed: usize, available: usize) -> Error {
    Error::InvalidNetworkOutput(format!(
        "output conversion needs {} cell slots but only {} are available",
        needed, available
    ))
}

/// Produces one numeric cell per tensor element
#[derive(Debug, Clone, Copy)]
pub struct ScalarOutputFactory {
    element_type: ElementType,
}

impl ScalarOutputFactory {
    /// Create a factory reading buffers of the given element type
    pub fn new(element_type: ElementType) -> Self {
        Self { element_type }
    }
}

struct ScalarOutputConverter;

impl TensorToValueConverter for ScalarOutputConverter {
    fn convert(&self, tensor: &mut Tensor, out: &mut [DataCell], offset: usize) -> Result<()> {
        let count = tensor.remaining();
        if out.len() < offset + count {
            return Err(slot_error(offset + count, out.len()));
        }
        let values = tensor.read_f64(count)?;
        for (slot, value) in out[offset..offset + count].iter_mut().zip(values) {
            *slot = DataCell::Double(value);
        }
        Ok(())
    }
}

impl TensorToValueConverterFactory for ScalarOutputFactory {
    fn identifier(&self) -> String {
        format!("builtin.to-double.{}", self.element_type)
    }

    fn name(&self) -> String {
        "Number (double)".into()
    }

    fn source_element_type(&self) -> ElementType {
        self.element_type
    }

    fn dest_type(&self) -> ColumnType {
        ColumnType::Double
    }

    fn tier(&self) -> ConverterTier {
        ConverterTier::BuiltInElement
    }

    fn dest_count(&self, spec: &ExecutionTensorSpec) -> Result<usize> {
        Ok(spec.example_size())
    }

    fn create_converter(&self) -> Box<dyn TensorToValueConverter> {
        Box::new(ScalarOutputConverter)
    }
}

/// Produces one vector cell per tensor example
#[derive(Debug, Clone, Copy)]
pub struct VectorOutputFactory {
    element_type: ElementType,
}

impl VectorOutputFactory {
    /// Create a factory reading buffers of the given element type
    pub fn new(element_type: ElementType) -> Self {
        Self { element_type }
    }
}

struct VectorOutputConverter;

impl TensorToValueConverter for VectorOutputConverter {
    fn convert(&self, tensor: &mut Tensor, out: &mut [DataCell], offset: usize) -> Result<()> {
        let example_size = tensor.spec().example_size();
        let examples = tensor.remaining() / example_size;
        if out.len() < offset + examples {
            return Err(slot_error(offset + examples, out.len()));
        }
        for slot in out[offset..offset + examples].iter_mut() {
            *slot = DataCell::DoubleVector(tensor.read_f64(example_size)?);
        }
        Ok(())
    }
}

impl TensorToValueConverterFactory for VectorOutputFactory {
    fn identifier(&self) -> String {
        format!("builtin.to-double-vector.{}", self.element_type)
    }

    fn name(&self) -> String {
        "Vector of numbers (double)".into()
    }

    fn source_element_type(&self) -> ElementType {
        self.element_type
    }

    fn dest_type(&self) -> ColumnType {
        ColumnType::Collection(Box::new(ColumnType::Double))
    }

    fn tier(&self) -> ConverterTier {
        ConverterTier::BuiltInCollection
    }

    fn dest_count(&self, _spec: &ExecutionTensorSpec) -> Result<usize> {
        Ok(1)
    }

    fn create_converter(&self) -> Box<dyn TensorToValueConverter> {
        Box::new(VectorOutputConverter)
    }
}

/// The built-in tensor-to-value factories registered at process start
pub fn builtin_output_factories() -> Vec<Arc<dyn TensorToValueConverterFactory>> {
    let element_types = [
        ElementType::Float32,
        ElementType::Float64,
        ElementType::Int32,
        ElementType::Int64,
        ElementType::UInt8,
    ];
    let mut factories: Vec<Arc<dyn TensorToValueConverterFactory>> = Vec::new();
    for element_type in element_types {
        factories.push(Arc::new(ScalarOutputFactory::new(element_type)));
        factories.push(Arc::new(VectorOutputFactory::new(element_type)));
    }
    factories
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shape::DimensionOrder;
    use crate::spec::TensorId;

    fn filled_tensor() -> Tensor {
        let spec = ExecutionTensorSpec::new(
            TensorId::new("out"),
            "out",
            2,
            vec![3],
            ElementType::Float64,
            DimensionOrder::Unknown,
        )
        .unwrap();
        let mut tensor = Tensor::new(spec);
        tensor
            .write_f64(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0])
            .unwrap();
        tensor
    }

    #[test]
    fn test_scalar_output() {
        let mut tensor = filled_tensor();
        let factory = ScalarOutputFactory::new(ElementType::Float64);
        assert_eq!(factory.dest_count(tensor.spec()).unwrap(), 3);

        let mut out = vec![DataCell::Missing; 6];
        factory
            .create_converter()
            .convert(&mut tensor, &mut out, 0)
            .unwrap();
        assert_eq!(out[0], DataCell::Double(1.0));
        assert_eq!(out[5], DataCell::Double(6.0));
    }

    #[test]
    fn test_vector_output() {
        let mut tensor = filled_tensor();
        let factory = VectorOutputFactory::new(ElementType::Float64);
        assert_eq!(factory.dest_count(tensor.spec()).unwrap(), 1);

        let mut out = vec![DataCell::Missing; 2];
        factory
            .create_converter()
            .convert(&mut tensor, &mut out, 0)
            .unwrap();
        assert_eq!(out[0], DataCell::DoubleVector(vec![1.0, 2.0, 3.0]));
        assert_eq!(out[1], DataCell::DoubleVector(vec![4.0, 5.0, 6.0]));
    }

    #[test]
    fn test_insufficient_slots() {
        let mut tensor = filled_tensor();
        let mut out = vec![DataCell::Missing; 1];
        let result = VectorOutputFactory::new(ElementType::Float64)
            .create_converter()
            .convert(&mut tensor, &mut out, 0);
        assert!(matches!(result, Err(Error::InvalidNetworkOutput(_))));
    }
}
