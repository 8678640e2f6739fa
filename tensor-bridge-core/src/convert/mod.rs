//! Bidirectional converters between external column values and tensor
//! buffer elements
//!
//! Converters are stateless and produced by factories. Factories carry a
//! stable identifier usable as a persisted lookup key, and a tier that
//! drives the deterministic preference ordering of the registry.

mod input;
mod output;
mod registry;

pub use input::{
    builtin_input_factories, BooleanInputFactory, CollectionInputFactory, DoubleInputFactory,
    FloatInputFactory, IntInputFactory, LongInputFactory,
};
pub use output::{
    builtin_output_factories, ScalarOutputFactory, VectorOutputFactory,
};
pub use registry::{
    refresh_converters, InputConverterRegistry, OutputConverterRegistry,
};

use crate::cell::{ColumnType, DataCell};
use crate::error::Result;
use crate::spec::{ElementType, ExecutionTensorSpec};
use crate::tensor::Tensor;

/// Preference tier of a converter factory. Lower ranks win ties in
/// preferred-factory lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ConverterTier {
    /// Built-in converter operating on single-value cells
    BuiltInElement,
    /// Built-in converter operating on collection cells
    BuiltInCollection,
    /// Externally supplied converter operating on single-value cells
    ExtensionElement,
    /// Externally supplied converter operating on collection cells
    ExtensionCollection,
}

impl ConverterTier {
    /// Rank within the documented tie-break ordering
    pub fn rank(&self) -> usize {
        match self {
            ConverterTier::BuiltInElement => 0,
            ConverterTier::BuiltInCollection => 1,
            ConverterTier::ExtensionElement => 2,
            ConverterTier::ExtensionCollection => 3,
        }
    }

    /// The collection variant of this tier
    pub fn as_collection(&self) -> ConverterTier {
        match self {
            ConverterTier::BuiltInElement | ConverterTier::BuiltInCollection => {
                ConverterTier::BuiltInCollection
            }
            _ => ConverterTier::ExtensionCollection,
        }
    }
}

/// Whether values of element type `source` can be appended losslessly into
/// a buffer of element type `dest`. Mirrors the widening writes of
/// [`Tensor`].
pub fn writes_into(source: ElementType, dest: ElementType) -> bool {
    match source {
        ElementType::Float32 => matches!(dest, ElementType::Float32 | ElementType::Float64),
        ElementType::Float64 => dest == ElementType::Float64,
        ElementType::Int32 => matches!(
            dest,
            ElementType::Int32 | ElementType::Int64 | ElementType::Float64
        ),
        ElementType::Int64 => dest == ElementType::Int64,
        ElementType::UInt8 => true,
    }
}

/// A stateless converter from external values into a writable tensor
pub trait ValueToTensorConverter {
    /// Append the elements of `values` to `tensor` in iteration order.
    ///
    /// Fails with `InvalidNetworkInput` on a missing cell and with
    /// `BufferOverflow` when the tensor's capacity would be exceeded;
    /// conversion never substitutes defaults or truncates.
    fn convert(&self, values: &[DataCell], tensor: &mut Tensor) -> Result<()>;
}

/// Factory for value-to-tensor converters
pub trait ValueToTensorConverterFactory: Send + Sync {
    /// Stable identifier, usable as a persisted lookup key
    fn identifier(&self) -> String;

    /// Human-readable display name
    fn name(&self) -> String;

    /// Column type this factory accepts
    fn source_type(&self) -> ColumnType;

    /// Element type this factory writes
    fn element_type(&self) -> ElementType;

    /// Preference tier
    fn tier(&self) -> ConverterTier;

    /// Per-example shape contribution of the given sample values
    fn data_shape(&self, values: &[DataCell]) -> Result<Vec<usize>>;

    /// Create a stateless converter instance
    fn create_converter(&self) -> Box<dyn ValueToTensorConverter>;
}

/// A stateless converter from a readable tensor into external value slots
pub trait TensorToValueConverter {
    /// Read every example currently held by `tensor` and write the
    /// resulting cells into `out`, starting at `offset`. Each example
    /// produces the factory's `dest_count` cells.
    fn convert(&self, tensor: &mut Tensor, out: &mut [DataCell], offset: usize) -> Result<()>;
}

/// Factory for tensor-to-value converters
pub trait TensorToValueConverterFactory: Send + Sync {
    /// Stable identifier, usable as a persisted lookup key
    fn identifier(&self) -> String;

    /// Human-readable display name
    fn name(&self) -> String;

    /// Element type this factory reads
    fn source_element_type(&self) -> ElementType;

    /// Column type of the produced cells
    fn dest_type(&self) -> ColumnType;

    /// Preference tier
    fn tier(&self) -> ConverterTier;

    /// Number of cells produced per example of the given spec
    fn dest_count(&self, spec: &ExecutionTensorSpec) -> Result<usize>;

    /// Create a stateless converter instance
    fn create_converter(&self) -> Box<dyn TensorToValueConverter>;
}
