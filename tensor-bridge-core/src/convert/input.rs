//! Built-in value-to-tensor converter factories

use std::sync::Arc;

use crate::cell::{ColumnType, DataCell};
use crate::error::{Error, Result};
use crate::spec::ElementType;
use crate::tensor::Tensor;

use super::{ConverterTier, ValueToTensorConverter, ValueToTensorConverterFactory};

fn missing_value_error() -> Error {
    Error::InvalidNetworkInput("Conversion encountered a missing value".into())
}

fn cell_type_error(cell: &DataCell, expected: ColumnType) -> Error {
    Error::TypeMismatch(format!(
        "expected a {} cell, got {:?}",
        expected, cell
    ))
}

macro_rules! scalar_input_factory {
    ($factory:ident, $converter:ident, $id:literal, $name:literal,
     $column_type:expr, $element_type:expr, $variant:ident, $write:ident) => {
        /// Built-in factory converting scalar cells of one column type
        #[derive(Debug, Default, Clone, Copy)]
        pub struct $factory;

        struct $converter;

        impl ValueToTensorConverter for $converter {
            fn convert(&self, values: &[DataCell], tensor: &mut Tensor) -> Result<()> {
                for cell in values {
                    match cell {
                        DataCell::Missing => return Err(missing_value_error()),
                        DataCell::$variant(x) => tensor.$write(&[*x])?,
                        other => return Err(cell_type_error(other, $column_type)),
                    }
                }
                Ok(())
            }
        }

        impl ValueToTensorConverterFactory for $factory {
            fn identifier(&self) -> String {
                $id.into()
            }

            fn name(&self) -> String {
                $name.into()
            }

            fn source_type(&self) -> ColumnType {
                $column_type
            }

            fn element_type(&self) -> ElementType {
                $element_type
            }

            fn tier(&self) -> ConverterTier {
                ConverterTier::BuiltInElement
            }

            fn data_shape(&self, values: &[DataCell]) -> Result<Vec<usize>> {
                if values.is_empty() {
                    return Err(Error::MissingDependency(
                        "cannot derive a data shape from an empty value selection".into(),
                    ));
                }
                Ok(vec![values.len()])
            }

            fn create_converter(&self) -> Box<dyn ValueToTensorConverter> {
                Box::new($converter)
            }
        }
    };
}

scalar_input_factory!(
    DoubleInputFactory,
    DoubleInputConverter,
    "builtin.double",
    "Number (double)",
    ColumnType::Double,
    ElementType::Float64,
    Double,
    write_f64
);

scalar_input_factory!(
    FloatInputFactory,
    FloatInputConverter,
    "builtin.float",
    "Number (float)",
    ColumnType::Float,
    ElementType::Float32,
    Float,
    write_f32
);

scalar_input_factory!(
    IntInputFactory,
    IntInputConverter,
    "builtin.int",
    "Number (integer)",
    ColumnType::Int,
    ElementType::Int32,
    Int,
    write_i32
);

scalar_input_factory!(
    LongInputFactory,
    LongInputConverter,
    "builtin.long",
    "Number (long)",
    ColumnType::Long,
    ElementType::Int64,
    Long,
    write_i64
);

/// Built-in factory converting boolean cells to 0/1 bytes
#[derive(Debug, Default, Clone, Copy)]
pub struct BooleanInputFactory;

struct BooleanInputConverter;

impl ValueToTensorConverter for BooleanInputConverter {
    fn convert(&self, values: &[DataCell], tensor: &mut Tensor) -> Result<()> {
        for cell in values {
            match cell {
                DataCell::Missing => return Err(missing_value_error()),
                DataCell::Boolean(x) => tensor.write_u8(&[u8::from(*x)])?,
                other => return Err(cell_type_error(other, ColumnType::Boolean)),
            }
        }
        Ok(())
    }
}

impl ValueToTensorConverterFactory for BooleanInputFactory {
    fn identifier(&self) -> String {
        "builtin.boolean".into()
    }

    fn name(&self) -> String {
        "Boolean".into()
    }

    fn source_type(&self) -> ColumnType {
        ColumnType::Boolean
    }

    fn element_type(&self) -> ElementType {
        ElementType::UInt8
    }

    fn tier(&self) -> ConverterTier {
        ConverterTier::BuiltInElement
    }

    fn data_shape(&self, values: &[DataCell]) -> Result<Vec<usize>> {
        if values.is_empty() {
            return Err(Error::MissingDependency(
                "cannot derive a data shape from an empty value selection".into(),
            ));
        }
        Ok(vec![values.len()])
    }

    fn create_converter(&self) -> Box<dyn ValueToTensorConverter> {
        Box::new(BooleanInputConverter)
    }
}

/// Adapts an element factory to collection cells by decomposing each
/// collection into its elements and delegating to the wrapped converter.
pub struct CollectionInputFactory {
    inner: Arc<dyn ValueToTensorConverterFactory>,
}

impl CollectionInputFactory {
    /// Wrap an element factory
    pub fn new(inner: Arc<dyn ValueToTensorConverterFactory>) -> Self {
        Self { inner }
    }

    /// Identifier of a collection wrapper around the given element identifier
    pub fn wrap_identifier(inner: &str) -> String {
        format!("collection({})", inner)
    }

    /// The wrapped element identifier, if `identifier` names a wrapper
    pub fn unwrap_identifier(identifier: &str) -> Option<&str> {
        identifier
            .strip_prefix("collection(")
            .and_then(|rest| rest.strip_suffix(')'))
    }
}

struct CollectionInputConverter {
    inner: Box<dyn ValueToTensorConverter>,
}

fn decompose(cell: &DataCell) -> Result<Vec<DataCell>> {
    match cell {
        DataCell::Missing => Err(missing_value_error()),
        DataCell::FloatVector(v) => Ok(v.iter().map(|&x| DataCell::Float(x)).collect()),
        DataCell::DoubleVector(v) => Ok(v.iter().map(|&x| DataCell::Double(x)).collect()),
        DataCell::IntVector(v) => Ok(v.iter().map(|&x| DataCell::Int(x)).collect()),
        other => Err(Error::TypeMismatch(format!(
            "expected a collection cell, got {:?}",
            other
        ))),
    }
}

impl ValueToTensorConverter for CollectionInputConverter {
    fn convert(&self, values: &[DataCell], tensor: &mut Tensor) -> Result<()> {
        for cell in values {
            let elements = decompose(cell)?;
            self.inner.convert(&elements, tensor)?;
        }
        Ok(())
    }
}

impl ValueToTensorConverterFactory for CollectionInputFactory {
    fn identifier(&self) -> String {
        Self::wrap_identifier(&self.inner.identifier())
    }

    fn name(&self) -> String {
        format!("Collection of {}", self.inner.name())
    }

    fn source_type(&self) -> ColumnType {
        ColumnType::Collection(Box::new(self.inner.source_type()))
    }

    fn element_type(&self) -> ElementType {
        self.inner.element_type()
    }

    fn tier(&self) -> ConverterTier {
        self.inner.tier().as_collection()
    }

    fn data_shape(&self, values: &[DataCell]) -> Result<Vec<usize>> {
        if values.is_empty() {
            return Err(Error::MissingDependency(
                "cannot derive a data shape from an empty value selection".into(),
            ));
        }
        let mut total = 0;
        for cell in values {
            if cell.is_missing() {
                return Err(missing_value_error());
            }
            total += cell.element_count();
        }
        Ok(vec![total])
    }

    fn create_converter(&self) -> Box<dyn ValueToTensorConverter> {
        Box::new(CollectionInputConverter {
            inner: self.inner.create_converter(),
        })
    }
}

/// The built-in value-to-tensor factories registered at process start
pub fn builtin_input_factories() -> Vec<Arc<dyn ValueToTensorConverterFactory>> {
    vec![
        Arc::new(DoubleInputFactory),
        Arc::new(FloatInputFactory),
        Arc::new(IntInputFactory),
        Arc::new(LongInputFactory),
        Arc::new(BooleanInputFactory),
    ]
}
