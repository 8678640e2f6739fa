//! Reference network backends
//!
//! These backends implement the [`NetworkBackend`] seam without any real
//! network behind it. They are meant for wiring tests and as a template
//! for real integrations: each one reads every input tensor in full and
//! fills the paired output tensor with one value per input element.

#![warn(missing_docs)]

use std::collections::HashMap;

use tracing::debug;

use tensor_bridge_core::error::{Error, Result};
use tensor_bridge_core::session::NetworkBackend;
use tensor_bridge_core::spec::TensorId;
use tensor_bridge_core::tensor::Tensor;

fn paired_tensors<'a>(
    inputs: &'a mut HashMap<TensorId, Tensor>,
    outputs: &'a mut HashMap<TensorId, Tensor>,
    pair: &(TensorId, TensorId),
) -> Result<(&'a mut Tensor, &'a mut Tensor)> {
    let input = inputs.get_mut(&pair.0).ok_or_else(|| {
        Error::InvalidNetworkInput(format!("no tensor was provided for input '{}'", pair.0))
    })?;
    let output = outputs.get_mut(&pair.1).ok_or_else(|| {
        Error::InvalidNetworkOutput(format!("no tensor was allocated for output '{}'", pair.1))
    })?;
    Ok((input, output))
}

/// Backend that multiplies every input element by a constant factor.
///
/// Inputs are read as 64-bit floats regardless of their storage type;
/// the paired outputs must be `Float64` tensors.
pub struct ScalingBackend {
    factor: f64,
    pairs: Vec<(TensorId, TensorId)>,
}

impl ScalingBackend {
    /// Create a backend scaling each input/output pair by `factor`
    pub fn new(factor: f64, pairs: Vec<(TensorId, TensorId)>) -> Self {
        Self { factor, pairs }
    }
}

impl NetworkBackend for ScalingBackend {
    fn execute(
        &mut self,
        inputs: &mut HashMap<TensorId, Tensor>,
        outputs: &mut HashMap<TensorId, Tensor>,
    ) -> Result<()> {
        for pair in &self.pairs {
            let (input, output) = paired_tensors(inputs, outputs, pair)?;
            let values = input.read_f64(input.remaining())?;
            debug!(
                input = %pair.0,
                output = %pair.1,
                elements = values.len(),
                factor = self.factor,
                "scaling batch"
            );
            let scaled: Vec<f64> = values.iter().map(|v| v * self.factor).collect();
            output.write_f64(&scaled)?;
        }
        Ok(())
    }
}

/// Backend that copies every input element to its paired output unchanged.
///
/// The paired outputs must be `Float64` tensors.
pub struct IdentityBackend {
    pairs: Vec<(TensorId, TensorId)>,
}

impl IdentityBackend {
    /// Create a backend passing each input through to its paired output
    pub fn new(pairs: Vec<(TensorId, TensorId)>) -> Self {
        Self { pairs }
    }
}

impl NetworkBackend for IdentityBackend {
    fn execute(
        &mut self,
        inputs: &mut HashMap<TensorId, Tensor>,
        outputs: &mut HashMap<TensorId, Tensor>,
    ) -> Result<()> {
        for pair in &self.pairs {
            let (input, output) = paired_tensors(inputs, outputs, pair)?;
            let values = input.read_f64(input.remaining())?;
            output.write_f64(&values)?;
        }
        Ok(())
    }
}
