//! Resolution of declared tensor specs into concrete execution specs
//!
//! At session start every declared input shape is reconciled against the
//! per-example data shape of the actual column selection, observed on a
//! sample row. The resolved specs carry the explicit session batch size
//! and are what tensors are allocated from.

use std::collections::HashMap;
use std::sync::Arc;

use crate::cell::DataCell;
use crate::convert::ValueToTensorConverterFactory;
use crate::error::{Error, Result};
use crate::spec::{ExecutionTensorSpec, TensorId, TensorSpec};
use crate::table::Row;

/// Resolve one declared spec using the data shape the converter factory
/// derives from the sample values.
///
/// If the factory cannot derive a shape, a fully known declared shape is
/// used as-is; otherwise the spec stays unresolvable and the error is
/// `MissingDependency`.
pub fn create_execution_tensor_spec(
    declared: &TensorSpec,
    batch_size: usize,
    factory: &dyn ValueToTensorConverterFactory,
    sample_values: &[DataCell],
) -> Result<ExecutionTensorSpec> {
    let shape = match factory.data_shape(sample_values) {
        Ok(data_shape) => declared.shape().reconcile(&data_shape)?,
        Err(_) => match declared.shape().fixed_size() {
            Some(_) => declared.shape().reconcile(&[declared.shape().known_size()])?,
            None => {
                return Err(Error::MissingDependency(format!(
                    "Could not resolve the shape of network tensor '{}': the \
                     converter derives no data shape and the declared shape is \
                     not fully known.",
                    declared.name()
                )))
            }
        },
    };
    ExecutionTensorSpec::new(
        declared.id().clone(),
        declared.name(),
        batch_size,
        shape,
        declared.element_type(),
        declared.dimension_order(),
    )
}

/// Resolve every declared input spec from a single sample row.
///
/// `columns` maps each tensor to the table column indices feeding it and
/// `factories` to its configured converter factory. Each tensor without a
/// configured factory is an invalid configuration.
pub fn create_execution_specs(
    declared: &[TensorSpec],
    batch_size: usize,
    factories: &HashMap<TensorId, Arc<dyn ValueToTensorConverterFactory>>,
    columns: &HashMap<TensorId, Vec<usize>>,
    sample_row: &Row,
) -> Result<HashMap<TensorId, ExecutionTensorSpec>> {
    let mut resolved = HashMap::with_capacity(declared.len());
    for spec in declared {
        let factory = factories.get(spec.id()).ok_or_else(|| {
            Error::InvalidConfiguration(format!(
                "No converter is configured for network tensor '{}'.",
                spec.name()
            ))
        })?;
        let indices = columns.get(spec.id()).ok_or_else(|| {
            Error::InvalidConfiguration(format!(
                "No input columns are configured for network tensor '{}'.",
                spec.name()
            ))
        })?;
        let mut sample_values = Vec::with_capacity(indices.len());
        for &column in indices {
            sample_values.push(sample_row.cell(column)?.clone());
        }
        resolved.insert(
            spec.id().clone(),
            create_execution_tensor_spec(spec, batch_size, factory.as_ref(), &sample_values)?,
        );
    }
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::{CollectionInputFactory, DoubleInputFactory, FloatInputFactory};
    use crate::shape::{DimensionOrder, Shape};
    use crate::spec::ElementType;

    fn declared(shape: Shape) -> TensorSpec {
        TensorSpec::new(
            TensorId::new("input:0"),
            "input",
            None,
            shape,
            ElementType::Float32,
            DimensionOrder::Unknown,
        )
        .unwrap()
    }

    #[test]
    fn test_partial_shape_is_filled_from_the_data() {
        let spec = declared(Shape::partial(vec![Some(3), None, Some(4)]).unwrap());
        let factory = CollectionInputFactory::new(Arc::new(FloatInputFactory));
        let resolved = create_execution_tensor_spec(
            &spec,
            16,
            &factory,
            &[DataCell::FloatVector(vec![0.0; 24])],
        )
        .unwrap();
        assert_eq!(resolved.shape(), &[3, 2, 4]);
        assert_eq!(resolved.batch_size(), 16);
        assert_eq!(resolved.capacity(), 16 * 24);
    }

    #[test]
    fn test_indivisible_data_is_a_shape_mismatch() {
        let spec = declared(Shape::partial(vec![Some(3), None, Some(4)]).unwrap());
        let factory = CollectionInputFactory::new(Arc::new(FloatInputFactory));
        let result = create_execution_tensor_spec(
            &spec,
            16,
            &factory,
            &[DataCell::FloatVector(vec![0.0; 25])],
        );
        assert!(matches!(result, Err(Error::ShapeMismatch(_))));
    }

    #[test]
    fn test_fixed_shape_survives_an_undecidable_data_shape() {
        let spec = declared(Shape::fixed(vec![5, 2]).unwrap());
        // An empty selection has no derivable data shape
        let resolved =
            create_execution_tensor_spec(&spec, 4, &DoubleInputFactory, &[]).unwrap();
        assert_eq!(resolved.shape(), &[5, 2]);
    }

    #[test]
    fn test_unknown_shape_without_data_shape_is_unresolvable() {
        let spec = declared(Shape::Unknown);
        let result = create_execution_tensor_spec(&spec, 4, &DoubleInputFactory, &[]);
        assert!(matches!(result, Err(Error::MissingDependency(_))));
    }

    #[test]
    fn test_batch_resolution_from_a_sample_row() {
        let specs = vec![declared(Shape::fixed(vec![2]).unwrap())];
        let mut factories: HashMap<TensorId, Arc<dyn ValueToTensorConverterFactory>> =
            HashMap::new();
        factories.insert(TensorId::new("input:0"), Arc::new(DoubleInputFactory));
        let mut columns = HashMap::new();
        columns.insert(TensorId::new("input:0"), vec![0, 1]);
        let row = Row::new("r0", vec![DataCell::Double(1.0), DataCell::Double(2.0)]);

        let resolved = create_execution_specs(&specs, 8, &factories, &columns, &row).unwrap();
        let spec = &resolved[&TensorId::new("input:0")];
        assert_eq!(spec.shape(), &[2]);
        assert_eq!(spec.batch_size(), 8);
    }

    #[test]
    fn test_unconfigured_tensor_is_rejected() {
        let specs = vec![declared(Shape::fixed(vec![2]).unwrap())];
        let row = Row::new("r0", vec![DataCell::Double(1.0)]);
        let result =
            create_execution_specs(&specs, 8, &HashMap::new(), &HashMap::new(), &row);
        assert!(matches!(result, Err(Error::InvalidConfiguration(_))));
    }
}
