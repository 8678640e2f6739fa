//! Tensor shape model
//!
//! Declared network shapes may be fully fixed, partially known, or entirely
//! unknown until sample data is observed. Reconciliation fills the gap
//! between a declared shape and the shape contributed by actual data.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A declared tensor shape
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Shape {
    /// Fully known shape; every dimension size is positive
    Fixed(Vec<usize>),

    /// Partially known shape; `None` marks a dimension only known at runtime.
    /// Well-formed partial shapes contain at least one unknown dimension.
    Partial(Vec<Option<usize>>),

    /// Entirely unknown shape
    Unknown,
}

impl Shape {
    /// Create a fixed shape, validating that it has at least one dimension
    /// and that all dimension sizes are positive.
    pub fn fixed(dimensions: Vec<usize>) -> Result<Self> {
        if dimensions.is_empty() {
            return Err(Error::InvalidArgument(
                "A fixed shape must have at least one dimension".into(),
            ));
        }
        if dimensions.iter().any(|&d| d == 0) {
            return Err(Error::InvalidArgument(
                "All dimension sizes of a fixed shape must be positive".into(),
            ));
        }
        Ok(Shape::Fixed(dimensions))
    }

    /// Create a partial shape, validating that it contains at least one
    /// unknown dimension and that all known dimension sizes are positive.
    pub fn partial(dimensions: Vec<Option<usize>>) -> Result<Self> {
        if dimensions.iter().all(Option::is_some) {
            return Err(Error::InvalidArgument(
                "A partial shape must contain at least one unknown dimension".into(),
            ));
        }
        if dimensions.iter().any(|d| *d == Some(0)) {
            return Err(Error::InvalidArgument(
                "All known dimension sizes of a partial shape must be positive".into(),
            ));
        }
        Ok(Shape::Partial(dimensions))
    }

    /// Whether every dimension of this shape is known
    pub fn is_fixed(&self) -> bool {
        matches!(self, Shape::Fixed(_))
    }

    /// Whether this shape has known dimensionality but unknown dimensions
    pub fn is_partial(&self) -> bool {
        matches!(self, Shape::Partial(_))
    }

    /// Whether anything at all is known about this shape
    pub fn is_known(&self) -> bool {
        !matches!(self, Shape::Unknown)
    }

    /// Number of dimensions, if the dimensionality is known
    pub fn num_dimensions(&self) -> Option<usize> {
        match self {
            Shape::Fixed(dims) => Some(dims.len()),
            Shape::Partial(dims) => Some(dims.len()),
            Shape::Unknown => None,
        }
    }

    /// Number of unknown dimensions
    pub fn num_unknown_dimensions(&self) -> usize {
        match self {
            Shape::Fixed(_) => 0,
            Shape::Partial(dims) => dims.iter().filter(|d| d.is_none()).count(),
            Shape::Unknown => 0,
        }
    }

    /// Product of all known dimension sizes
    pub fn known_size(&self) -> usize {
        match self {
            Shape::Fixed(dims) => dims.iter().product(),
            Shape::Partial(dims) => dims.iter().flatten().product(),
            Shape::Unknown => 1,
        }
    }

    /// Total element count of a fixed shape, `None` otherwise
    pub fn fixed_size(&self) -> Option<usize> {
        match self {
            Shape::Fixed(dims) => Some(dims.iter().product()),
            _ => None,
        }
    }

    /// Reconcile this declared shape with the shape observed from actual
    /// data, yielding a concrete execution shape.
    ///
    /// For fixed shapes the observed element count must match exactly. For
    /// partial shapes the unknown dimensions are filled from the observed
    /// data in declaration order, requiring the observed count to divide
    /// evenly by the product of the known dimensions. A fully unknown shape
    /// accepts the observed shape verbatim.
    pub fn reconcile(&self, observed: &[usize]) -> Result<Vec<usize>> {
        let observed_size: usize = observed.iter().product();
        match self {
            Shape::Fixed(dims) => {
                let fixed_size: usize = dims.iter().product();
                if observed_size != fixed_size {
                    return Err(Error::ShapeMismatch(format!(
                        "the data shape {:?} ({} elements) does not match the declared shape {} ({} elements)",
                        observed, observed_size, self, fixed_size
                    )));
                }
                Ok(dims.clone())
            }
            Shape::Partial(dims) => {
                if observed.len() == dims.len() {
                    // Dimensionality matches, fill unknowns positionally
                    let mut resolved = Vec::with_capacity(dims.len());
                    for (declared, &actual) in dims.iter().zip(observed) {
                        match declared {
                            Some(known) if *known != actual => {
                                return Err(Error::ShapeMismatch(format!(
                                    "the data shape {:?} does not match the declared shape {}",
                                    observed, self
                                )));
                            }
                            _ => resolved.push(actual),
                        }
                    }
                    Ok(resolved)
                } else if observed.len() == 1 && self.num_unknown_dimensions() == 1 {
                    // Flat element count, a single unknown dimension absorbs it
                    let known = self.known_size();
                    if observed_size % known != 0 {
                        return Err(Error::ShapeMismatch(format!(
                            "{} elements cannot be distributed over the declared shape {} (known size {})",
                            observed_size, self, known
                        )));
                    }
                    let inferred = observed_size / known;
                    Ok(dims
                        .iter()
                        .map(|d| d.unwrap_or(inferred))
                        .collect())
                } else {
                    Err(Error::ShapeMismatch(format!(
                        "the data shape {:?} does not match the declared shape {}",
                        observed, self
                    )))
                }
            }
            Shape::Unknown => {
                if observed.is_empty() {
                    return Err(Error::ShapeMismatch(
                        "cannot derive an execution shape from empty data".into(),
                    ));
                }
                Ok(observed.to_vec())
            }
        }
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Shape::Fixed(dims) => {
                write!(f, "[")?;
                for (i, d) in dims.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", d)?;
                }
                write!(f, "]")
            }
            Shape::Partial(dims) => {
                write!(f, "[")?;
                for (i, d) in dims.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    match d {
                        Some(d) => write!(f, "{}", d)?,
                        None => write!(f, "?")?,
                    }
                }
                write!(f, "]")
            }
            Shape::Unknown => write!(f, "[unknown]"),
        }
    }
}

/// Semantic meaning of one tensor axis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Dimension {
    /// Time or sequence axis
    Time,
    /// Depth axis
    Depth,
    /// Height axis
    Height,
    /// Width axis
    Width,
    /// Channel axis
    Channel,
}

/// Semantic ordering of tensor axes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DimensionOrder {
    /// Time, Depth, Height, Width, Channel ("channels last")
    Tdhwc,
    /// Time, Channel, Depth, Height, Width ("channels first")
    Tcdhw,
    /// The ordering is unknown; mapping requests fail explicitly
    Unknown,
}

impl DimensionOrder {
    /// The full axis sequence of this ordering
    pub fn dimensions(&self) -> Result<&'static [Dimension]> {
        match self {
            DimensionOrder::Tdhwc => Ok(&[
                Dimension::Time,
                Dimension::Depth,
                Dimension::Height,
                Dimension::Width,
                Dimension::Channel,
            ]),
            DimensionOrder::Tcdhw => Ok(&[
                Dimension::Time,
                Dimension::Channel,
                Dimension::Depth,
                Dimension::Height,
                Dimension::Width,
            ]),
            DimensionOrder::Unknown => Err(Error::UnsupportedOperation(
                "the dimension order is unknown".into(),
            )),
        }
    }

    /// Infer the permutation that maps each source axis index to its
    /// destination index under this ordering.
    ///
    /// An unknown ordering is not permutable and fails explicitly rather
    /// than falling back to an identity mapping.
    pub fn infer_mapping(&self, dimensions: &[Dimension]) -> Result<Vec<usize>> {
        let order = self.dimensions()?;
        let mut ranks = Vec::with_capacity(dimensions.len());
        for dim in dimensions {
            let rank = order.iter().position(|d| d == dim).ok_or_else(|| {
                Error::InvalidArgument(format!("dimension {:?} is not part of {:?}", dim, self))
            })?;
            if ranks.contains(&rank) {
                return Err(Error::InvalidArgument(format!(
                    "dimension {:?} occurs more than once",
                    dim
                )));
            }
            ranks.push(rank);
        }
        // Compress the rank sequence to destination indices
        let mut sorted = ranks.clone();
        sorted.sort_unstable();
        Ok(ranks
            .iter()
            .map(|r| sorted.iter().position(|s| s == r).unwrap_or(0))
            .collect())
    }
}
