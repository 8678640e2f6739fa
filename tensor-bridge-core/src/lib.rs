//! Core types and abstractions for bridging tabular data and network tensors
//!
//! This crate covers the full path from typed table rows to batched tensor
//! buffers and back: declared and resolved tensor specs, a shape model with
//! partial and unknown shapes, a registry of bidirectional value converters,
//! row batching, and the batched execution session that ties them together.
//! Network backends plug in behind the [`session::NetworkBackend`] trait.

#![warn(missing_docs)]

pub mod cell;
pub mod config;
pub mod convert;
pub mod error;
pub mod exec_spec;
pub mod rows;
pub mod session;
pub mod shape;
pub mod spec;
pub mod table;
pub mod tensor;

// Re-export key types for convenience
pub use cell::{ColumnType, DataCell};
pub use config::SessionConfig;
pub use convert::{InputConverterRegistry, OutputConverterRegistry};
pub use error::{Error, Result};
pub use exec_spec::{create_execution_specs, create_execution_tensor_spec};
pub use rows::{RowBatch, TensorRowIterator};
pub use session::{ExecutionMonitor, ExecutionSession, NetworkBackend, SessionStats};
pub use shape::{Dimension, DimensionOrder, Shape};
pub use spec::{ElementType, ExecutionTensorSpec, TensorId, TensorSpec};
pub use table::{ColumnSpec, Row, RowSource, TableSchema};
pub use tensor::Tensor;
