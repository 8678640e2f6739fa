//! Converter factory registries and the per-tensor converter refresher
//!
//! Registries are explicit registration tables built once at process start
//! from the built-in factories plus any externally supplied plugins.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::cell::ColumnType;
use crate::error::{Error, Result};
use crate::spec::{ElementType, TensorSpec};
use crate::table::TableSchema;

use super::input::CollectionInputFactory;
use super::{
    builtin_input_factories, builtin_output_factories, writes_into, ConverterTier,
    TensorToValueConverterFactory, ValueToTensorConverterFactory,
};

fn duplicate_error(identifier: &str) -> Error {
    Error::InvalidArgument(format!(
        "A converter factory with identifier '{}' is already registered",
        identifier
    ))
}

fn sort_key(tier: ConverterTier, name: &str, identifier: &str) -> (usize, String, String) {
    (tier.rank(), name.to_string(), identifier.to_string())
}

/// Registry of value-to-tensor converter factories
pub struct InputConverterRegistry {
    factories: BTreeMap<String, Arc<dyn ValueToTensorConverterFactory>>,
}

impl InputConverterRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            factories: BTreeMap::new(),
        }
    }

    /// Create a registry holding the built-in factories
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for factory in builtin_input_factories() {
            // Built-in identifiers are distinct
            registry
                .register(factory)
                .unwrap_or_else(|e| unreachable!("{}", e));
        }
        registry
    }

    /// Register a factory. Fails if a factory with the same identifier is
    /// already registered.
    pub fn register(&mut self, factory: Arc<dyn ValueToTensorConverterFactory>) -> Result<()> {
        let identifier = factory.identifier();
        if self.factories.contains_key(&identifier) {
            return Err(duplicate_error(&identifier));
        }
        self.factories.insert(identifier, factory);
        Ok(())
    }

    /// All registered factories applicable to the given source column type
    /// and destination element type, in preference order.
    pub fn factories_for(
        &self,
        source_type: &ColumnType,
        dest: ElementType,
    ) -> Vec<Arc<dyn ValueToTensorConverterFactory>> {
        let mut candidates: Vec<Arc<dyn ValueToTensorConverterFactory>> = Vec::new();
        for factory in self.factories.values() {
            if factory.source_type() == *source_type && writes_into(factory.element_type(), dest) {
                candidates.push(factory.clone());
            }
        }
        if let Some(element_type) = source_type.element_type() {
            for factory in self.factories.values() {
                if factory.source_type() == *element_type
                    && writes_into(factory.element_type(), dest)
                {
                    candidates.push(Arc::new(CollectionInputFactory::new(factory.clone())));
                }
            }
        }
        candidates.sort_by_key(|f| sort_key(f.tier(), &f.name(), &f.identifier()));
        candidates.dedup_by_key(|f| f.identifier());
        candidates
    }

    /// The deterministic single choice among all applicable factories:
    /// built-in element-wise before built-in collection before extension
    /// element-wise before extension collection, ties broken by name.
    pub fn preferred_factory_for(
        &self,
        source_type: &ColumnType,
        dest: ElementType,
    ) -> Option<Arc<dyn ValueToTensorConverterFactory>> {
        self.factories_for(source_type, dest).into_iter().next()
    }

    /// Resolve a persisted factory identifier, transparently handling
    /// collection wrapper identifiers.
    pub fn factory_by_id(&self, identifier: &str) -> Result<Arc<dyn ValueToTensorConverterFactory>> {
        if let Some(inner) = CollectionInputFactory::unwrap_identifier(identifier) {
            let element = self.factory_by_id(inner)?;
            return Ok(Arc::new(CollectionInputFactory::new(element)));
        }
        self.factories
            .get(identifier)
            .cloned()
            .ok_or_else(|| Error::MissingExtension {
                identifier: identifier.to_string(),
            })
    }

    /// All factories able to write the given element type, regardless of
    /// source column type.
    pub fn factories_for_element_type(
        &self,
        dest: ElementType,
    ) -> Vec<Arc<dyn ValueToTensorConverterFactory>> {
        let mut candidates: Vec<_> = self
            .factories
            .values()
            .filter(|f| writes_into(f.element_type(), dest))
            .cloned()
            .collect();
        candidates.sort_by_key(|f| sort_key(f.tier(), &f.name(), &f.identifier()));
        candidates
    }
}

impl Default for InputConverterRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

/// Registry of tensor-to-value converter factories
pub struct OutputConverterRegistry {
    factories: BTreeMap<String, Arc<dyn TensorToValueConverterFactory>>,
}

impl OutputConverterRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            factories: BTreeMap::new(),
        }
    }

    /// Create a registry holding the built-in factories
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for factory in builtin_output_factories() {
            registry
                .register(factory)
                .unwrap_or_else(|e| unreachable!("{}", e));
        }
        registry
    }

    /// Register a factory. Fails if a factory with the same identifier is
    /// already registered.
    pub fn register(&mut self, factory: Arc<dyn TensorToValueConverterFactory>) -> Result<()> {
        let identifier = factory.identifier();
        if self.factories.contains_key(&identifier) {
            return Err(duplicate_error(&identifier));
        }
        self.factories.insert(identifier, factory);
        Ok(())
    }

    /// All registered factories reading the given element type, in
    /// preference order.
    pub fn factories_for(
        &self,
        source: ElementType,
    ) -> Vec<Arc<dyn TensorToValueConverterFactory>> {
        let mut candidates: Vec<_> = self
            .factories
            .values()
            .filter(|f| f.source_element_type() == source)
            .cloned()
            .collect();
        candidates.sort_by_key(|f| sort_key(f.tier(), &f.name(), &f.identifier()));
        candidates
    }

    /// The deterministic single choice among all applicable factories
    pub fn preferred_factory_for(
        &self,
        source: ElementType,
    ) -> Option<Arc<dyn TensorToValueConverterFactory>> {
        self.factories_for(source).into_iter().next()
    }

    /// Resolve a persisted factory identifier
    pub fn factory_by_id(&self, identifier: &str) -> Result<Arc<dyn TensorToValueConverterFactory>> {
        self.factories
            .get(identifier)
            .cloned()
            .ok_or_else(|| Error::MissingExtension {
                identifier: identifier.to_string(),
            })
    }
}

impl Default for OutputConverterRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

/// Collect every converter factory applicable to a tensor given the current
/// table schema, sorted into the documented four-tier preference order.
///
/// Scans every distinct column type of the schema once and deduplicates
/// factories by identity. Fails with `NoConverterAvailable` when nothing
/// applies, distinguishing "no factory exists for this element type at all"
/// from "factories exist but none match any column type present".
pub fn refresh_converters(
    table_schema: &TableSchema,
    dest: ElementType,
    tensor_spec: &TensorSpec,
    is_target: bool,
    registry: &InputConverterRegistry,
) -> Result<Vec<Arc<dyn ValueToTensorConverterFactory>>> {
    let input_or_target = if is_target { "target" } else { "input" };

    let column_types = table_schema.distinct_column_types();
    let mut converters: Vec<Arc<dyn ValueToTensorConverterFactory>> = Vec::new();
    for column_type in &column_types {
        for factory in registry.factories_for(column_type, dest) {
            if !converters.iter().any(|c| c.identifier() == factory.identifier()) {
                converters.push(factory);
            }
        }
    }
    converters.sort_by_key(|f| sort_key(f.tier(), &f.name(), &f.identifier()));

    if !converters.is_empty() {
        return Ok(converters);
    }

    let for_buffer = registry.factories_for_element_type(dest);
    if for_buffer.is_empty() {
        // No converters available at all, user can't do much
        let message = format!(
            "No converter available for the expected {} data type ({}) of network {} '{}'.",
            input_or_target,
            dest,
            input_or_target,
            tensor_spec.name()
        );
        let long_message = format!(
            "{} Please make sure you are not missing a converter extension and/or \
             try to use a network that expects different {} data types.",
            message, input_or_target
        );
        Err(Error::NoConverterAvailable {
            message,
            long_message,
        })
    } else {
        // Converters available but the table holds no compatible columns
        let supplied: Vec<String> = column_types.iter().map(|t| t.to_string()).collect();
        let mut supported: Vec<String> = for_buffer
            .iter()
            .map(|f| f.source_type().to_string())
            .collect();
        supported.sort();
        supported.dedup();
        let message = format!(
            "None of the data types present in the input table can be converted into \
             the data type ({}) accepted by network {} '{}'.",
            dest,
            input_or_target,
            tensor_spec.name()
        );
        let long_message = format!(
            "None of the data types present in the input table ({}) can be converted \
             into the data type ({}) accepted by network {} '{}'. Please include \
             columns of compatible types (e.g. {}) or collections of those types in \
             the input table.",
            supplied.join(", "),
            dest,
            input_or_target,
            tensor_spec.name(),
            supported.join(", ")
        );
        Err(Error::NoConverterAvailable {
            message,
            long_message,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::DataCell;
    use crate::error::Result;
    use crate::shape::{DimensionOrder, Shape};
    use crate::spec::TensorId;
    use crate::table::ColumnSpec;
    use crate::tensor::Tensor;
    use super::super::{ValueToTensorConverter, ValueToTensorConverterFactory};

    struct ExtensionDoubleFactory;

    struct PassthroughConverter;

    impl ValueToTensorConverter for PassthroughConverter {
        fn convert(&self, _values: &[DataCell], _tensor: &mut Tensor) -> Result<()> {
            Ok(())
        }
    }

    impl ValueToTensorConverterFactory for ExtensionDoubleFactory {
        fn identifier(&self) -> String {
            "ext.double".into()
        }

        fn name(&self) -> String {
            // Sorts before the built-in name; the tier must still win
            "A very eager converter".into()
        }

        fn source_type(&self) -> ColumnType {
            ColumnType::Double
        }

        fn element_type(&self) -> ElementType {
            ElementType::Float64
        }

        fn tier(&self) -> ConverterTier {
            ConverterTier::ExtensionElement
        }

        fn data_shape(&self, values: &[DataCell]) -> Result<Vec<usize>> {
            Ok(vec![values.len()])
        }

        fn create_converter(&self) -> Box<dyn ValueToTensorConverter> {
            Box::new(PassthroughConverter)
        }
    }

    fn tensor_spec(element_type: ElementType) -> TensorSpec {
        TensorSpec::new(
            TensorId::new("input:0"),
            "input",
            None,
            Shape::fixed(vec![4]).unwrap(),
            element_type,
            DimensionOrder::Unknown,
        )
        .unwrap()
    }

    #[test]
    fn test_duplicate_registration_fails() {
        let mut registry = InputConverterRegistry::with_builtins();
        let result = registry.register(Arc::new(super::super::DoubleInputFactory));
        assert!(matches!(result, Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn test_builtin_preferred_over_extension() {
        let mut registry = InputConverterRegistry::with_builtins();
        registry.register(Arc::new(ExtensionDoubleFactory)).unwrap();

        let preferred = registry
            .preferred_factory_for(&ColumnType::Double, ElementType::Float64)
            .unwrap();
        assert_eq!(preferred.identifier(), "builtin.double");

        let all = registry.factories_for(&ColumnType::Double, ElementType::Float64);
        let ids: Vec<String> = all.iter().map(|f| f.identifier()).collect();
        assert_eq!(ids, vec!["builtin.double", "ext.double"]);
    }

    #[test]
    fn test_collection_columns_get_wrapped_factories() {
        let registry = InputConverterRegistry::with_builtins();
        let collection = ColumnType::Collection(Box::new(ColumnType::Float));
        let factories = registry.factories_for(&collection, ElementType::Float32);
        assert_eq!(factories.len(), 1);
        assert_eq!(factories[0].identifier(), "collection(builtin.float)");
    }

    #[test]
    fn test_factory_by_id_resolves_wrappers() {
        let registry = InputConverterRegistry::with_builtins();
        let factory = registry.factory_by_id("collection(builtin.float)").unwrap();
        assert_eq!(
            factory.source_type(),
            ColumnType::Collection(Box::new(ColumnType::Float))
        );
    }

    #[test]
    fn test_missing_identifier_is_reported() {
        let registry = InputConverterRegistry::with_builtins();
        match registry.factory_by_id("vendor.fancy") {
            Err(Error::MissingExtension { identifier }) => assert_eq!(identifier, "vendor.fancy"),
            other => panic!("expected MissingExtension, got {:?}", other.map(|f| f.identifier())),
        }
    }

    #[test]
    fn test_refresher_orders_by_tier() {
        let mut registry = InputConverterRegistry::with_builtins();
        registry.register(Arc::new(ExtensionDoubleFactory)).unwrap();

        let schema = TableSchema::new(vec![
            ColumnSpec::new("a", ColumnType::Double),
            ColumnSpec::new(
                "b",
                ColumnType::Collection(Box::new(ColumnType::Double)),
            ),
        ]);
        let converters = refresh_converters(
            &schema,
            ElementType::Float64,
            &tensor_spec(ElementType::Float64),
            false,
            &registry,
        )
        .unwrap();
        let ids: Vec<String> = converters.iter().map(|f| f.identifier()).collect();
        assert_eq!(
            ids,
            vec![
                "builtin.double",
                "collection(builtin.double)",
                "ext.double",
                "collection(ext.double)",
            ]
        );
    }

    #[test]
    fn test_refresher_no_compatible_columns() {
        let registry = InputConverterRegistry::with_builtins();
        let schema = TableSchema::new(vec![ColumnSpec::new("text", ColumnType::String)]);
        let result = refresh_converters(
            &schema,
            ElementType::Float64,
            &tensor_spec(ElementType::Float64),
            false,
            &registry,
        );
        match result {
            Err(Error::NoConverterAvailable {
                message,
                long_message,
            }) => {
                assert!(message.contains("None of the data types"));
                assert!(long_message.contains("String"));
                assert!(long_message.contains("compatible types"));
            }
            other => panic!("expected NoConverterAvailable, got {:?}", other.is_ok()),
        }
    }

    #[test]
    fn test_refresher_no_factory_for_buffer_type() {
        // An empty registry has no factory for any element type at all
        let registry = InputConverterRegistry::new();
        let schema = TableSchema::new(vec![ColumnSpec::new("a", ColumnType::Double)]);
        let result = refresh_converters(
            &schema,
            ElementType::Float64,
            &tensor_spec(ElementType::Float64),
            true,
            &registry,
        );
        match result {
            Err(Error::NoConverterAvailable { message, .. }) => {
                assert!(message.contains("No converter available"));
                assert!(message.contains("target"));
            }
            other => panic!("expected NoConverterAvailable, got {:?}", other.is_ok()),
        }
    }

    #[test]
    fn test_output_registry_lookup() {
        let registry = OutputConverterRegistry::with_builtins();
        let preferred = registry.preferred_factory_for(ElementType::Float64).unwrap();
        assert_eq!(preferred.identifier(), "builtin.to-double.Float64");
        assert!(registry.factory_by_id("nope").is_err());
    }
}
