//! Persisted session configuration
//!
//! Converters and input columns are stored under stable identifiers and
//! column names so a saved configuration survives registry and table
//! changes until it is resolved against them again.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::convert::{InputConverterRegistry, ValueToTensorConverterFactory};
use crate::error::{Error, Result};
use crate::spec::TensorId;
use crate::table::TableSchema;

/// Configuration of one execution session, as saved and reloaded
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Rows per batch
    pub batch_size: usize,
    /// Full passes over the source. The host drives one session run per
    /// epoch; a single run never re-reads the table.
    pub epochs: usize,
    /// Converter factory identifier per input tensor
    pub converters: HashMap<TensorId, String>,
    /// Selected column names per input tensor, in feed order
    pub input_columns: HashMap<TensorId, Vec<String>>,
    /// Free-form backend parameters
    pub hyperparameters: HashMap<String, String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            batch_size: 32,
            epochs: 1,
            converters: HashMap::new(),
            input_columns: HashMap::new(),
            hyperparameters: HashMap::new(),
        }
    }
}

impl SessionConfig {
    /// A configuration with the given batch size and defaults otherwise
    pub fn new(batch_size: usize) -> Self {
        Self {
            batch_size,
            ..Self::default()
        }
    }

    /// Record the converter for an input tensor
    pub fn set_converter(&mut self, id: TensorId, identifier: &str) {
        self.converters.insert(id, identifier.to_string());
    }

    /// Record the column selection for an input tensor
    pub fn set_input_columns(&mut self, id: TensorId, columns: Vec<String>) {
        self.input_columns.insert(id, columns);
    }

    /// Record a backend parameter
    pub fn set_hyperparameter(&mut self, key: &str, value: &str) {
        self.hyperparameters
            .insert(key.to_string(), value.to_string());
    }

    /// Check structural validity independent of any table or registry
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(Error::InvalidConfiguration(
                "the batch size must be positive".into(),
            ));
        }
        if self.epochs == 0 {
            return Err(Error::InvalidConfiguration(
                "the number of epochs must be positive".into(),
            ));
        }
        for (id, columns) in &self.input_columns {
            if columns.is_empty() {
                return Err(Error::InvalidConfiguration(format!(
                    "No input columns are selected for network tensor '{}'.",
                    id
                )));
            }
        }
        Ok(())
    }

    /// Resolve the saved column names against a table schema.
    ///
    /// A saved column the table no longer has is an invalid configuration.
    pub fn resolve_columns(
        &self,
        schema: &TableSchema,
    ) -> Result<HashMap<TensorId, Vec<usize>>> {
        let mut resolved = HashMap::with_capacity(self.input_columns.len());
        for (id, names) in &self.input_columns {
            let mut indices = Vec::with_capacity(names.len());
            for name in names {
                let index = schema.index_of(name).map_err(|_| {
                    Error::InvalidConfiguration(format!(
                        "Selected input column '{}' is missing from the input table.",
                        name
                    ))
                })?;
                indices.push(index);
            }
            resolved.insert(id.clone(), indices);
        }
        Ok(resolved)
    }

    /// Resolve the saved converter identifiers against a registry.
    ///
    /// A saved identifier the registry no longer knows means the
    /// providing extension is missing.
    pub fn resolve_converters(
        &self,
        registry: &InputConverterRegistry,
    ) -> Result<HashMap<TensorId, Arc<dyn ValueToTensorConverterFactory>>> {
        let mut resolved = HashMap::with_capacity(self.converters.len());
        for (id, identifier) in &self.converters {
            resolved.insert(id.clone(), registry.factory_by_id(identifier)?);
        }
        Ok(resolved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::ColumnType;
    use crate::table::ColumnSpec;

    fn config() -> SessionConfig {
        let mut config = SessionConfig::new(16);
        config.set_converter(TensorId::new("in"), "builtin.double");
        config.set_input_columns(
            TensorId::new("in"),
            vec!["x".to_string(), "y".to_string()],
        );
        config.set_hyperparameter("learning_rate", "0.001");
        config
    }

    #[test]
    fn test_validation() {
        assert!(config().validate().is_ok());
        assert!(SessionConfig::new(0).validate().is_err());

        let mut no_columns = config();
        no_columns.set_input_columns(TensorId::new("in"), Vec::new());
        assert!(no_columns.validate().is_err());
    }

    #[test]
    fn test_column_resolution() {
        let schema = TableSchema::new(vec![
            ColumnSpec::new("y", ColumnType::Double),
            ColumnSpec::new("x", ColumnType::Double),
        ]);
        let resolved = config().resolve_columns(&schema).unwrap();
        // feed order is the saved order, not the table order
        assert_eq!(resolved[&TensorId::new("in")], vec![1, 0]);
    }

    #[test]
    fn test_missing_column_is_rejected() {
        let schema = TableSchema::new(vec![ColumnSpec::new("x", ColumnType::Double)]);
        assert!(matches!(
            config().resolve_columns(&schema),
            Err(Error::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_converter_resolution() {
        let registry = InputConverterRegistry::with_builtins();
        let resolved = config().resolve_converters(&registry).unwrap();
        assert_eq!(
            resolved[&TensorId::new("in")].identifier(),
            "builtin.double"
        );

        let mut stale = config();
        stale.set_converter(TensorId::new("in"), "vendor.gone");
        assert!(matches!(
            stale.resolve_converters(&registry),
            Err(Error::MissingExtension { .. })
        ));
    }

    #[test]
    fn test_json_roundtrip() {
        let config = config();
        let json = serde_json::to_string(&config).unwrap();
        let restored: SessionConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, config);
    }
}
