//! Batched execution session
//!
//! A session drives one full pass over a row source: rows are staged in
//! batches, converted into freshly allocated input tensors, handed to the
//! network backend, and the produced output tensors are converted back
//! into rows. Tensors live for exactly one batch.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet, VecDeque};
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::cell::DataCell;
use crate::convert::{TensorToValueConverter, ValueToTensorConverter};
use crate::error::{Error, Result};
use crate::rows::TensorRowIterator;
use crate::spec::{ExecutionTensorSpec, TensorId};
use crate::table::Row;
use crate::tensor::Tensor;

/// Supplies input tensors one batch at a time.
///
/// `stage_next` fixes the row count of the upcoming batch so the caller
/// can allocate tensors of exactly that size before calling `prepare`.
pub trait InputPreparer {
    /// Whether another batch can be staged
    fn has_next(&mut self) -> bool;

    /// Total number of rows of the pass, if known
    fn total_rows(&self) -> Option<usize>;

    /// Stage the next batch and return its row count
    fn stage_next(&mut self) -> Result<usize>;

    /// Fill the given tensors from the staged batch. Every tensor must
    /// come out exactly full.
    fn prepare(&mut self, tensors: &mut HashMap<TensorId, Tensor>) -> Result<()>;
}

/// Receives output tensors batch by batch
pub trait OutputConsumer {
    /// Consume the outputs of one executed batch
    fn accept(&mut self, tensors: &mut HashMap<TensorId, Tensor>) -> Result<()>;

    /// Called once after the last batch with the total row count the
    /// session processed.
    fn finish(&mut self, rows_consumed: usize) -> Result<()>;
}

/// The network execution seam. Reads every input tensor and fills every
/// output tensor with one converted example per input example.
pub trait NetworkBackend {
    /// Execute one batch
    fn execute(
        &mut self,
        inputs: &mut HashMap<TensorId, Tensor>,
        outputs: &mut HashMap<TensorId, Tensor>,
    ) -> Result<()>;
}

/// Cancellation flag and progress reporting for a running session.
///
/// The flag is shared; any holder of a clone can cancel. Cancellation is
/// observed at batch boundaries.
#[derive(Debug, Clone, Default)]
pub struct ExecutionMonitor {
    cancelled: Arc<AtomicBool>,
    progress: Option<f64>,
}

impl ExecutionMonitor {
    /// Create a monitor with an unset cancellation flag
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation of the session this monitor is attached to
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    /// Whether cancellation has been requested
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    /// Record that `rows_done` rows have been processed out of `total`
    pub fn report(&mut self, rows_done: usize, total: Option<usize>) {
        self.progress = total
            .filter(|&t| t > 0)
            .map(|t| rows_done as f64 / t as f64);
        match self.progress {
            Some(progress) => debug!(rows_done, progress, "batch processed"),
            None => debug!(rows_done, "batch processed"),
        }
    }

    /// Fraction of the pass completed, if the total row count is known
    pub fn progress(&self) -> Option<f64> {
        self.progress
    }
}

/// Counters of one completed session run
#[derive(Debug, Clone, Default)]
pub struct SessionStats {
    /// Number of executed batches
    pub batches: usize,
    /// Number of processed rows
    pub rows: usize,
    /// Wall-clock duration of the run
    pub execution_time: Duration,
}

/// Rows shared between an input preparer and an output consumer so the
/// consumer can append output cells to the rows that produced them.
pub type SharedRows = Rc<RefCell<VecDeque<Row>>>;

/// Input preparer converting table rows batch by batch
pub struct BatchInputPreparer<'a> {
    iterator: TensorRowIterator<'a>,
    converters: HashMap<TensorId, Box<dyn ValueToTensorConverter>>,
    base_rows: SharedRows,
    batch_size: usize,
    staged: Option<HashMap<TensorId, Vec<DataCell>>>,
}

impl<'a> BatchInputPreparer<'a> {
    /// Create a preparer over `iterator` with one converter per input
    /// tensor.
    pub fn new(
        iterator: TensorRowIterator<'a>,
        converters: HashMap<TensorId, Box<dyn ValueToTensorConverter>>,
        batch_size: usize,
    ) -> Self {
        if let Some(total) = iterator.size() {
            if total % batch_size != 0 {
                warn!(
                    total,
                    batch_size, "row count is not a multiple of the batch size, the final batch will be short"
                );
            }
        }
        Self {
            iterator,
            converters,
            base_rows: Rc::new(RefCell::new(VecDeque::new())),
            batch_size,
            staged: None,
        }
    }

    /// Handle to the rows of staged batches, for an appending consumer
    pub fn base_rows(&self) -> SharedRows {
        Rc::clone(&self.base_rows)
    }
}

impl InputPreparer for BatchInputPreparer<'_> {
    fn has_next(&mut self) -> bool {
        self.staged.is_some() || self.iterator.has_next()
    }

    fn total_rows(&self) -> Option<usize> {
        self.iterator.size()
    }

    fn stage_next(&mut self) -> Result<usize> {
        if self.staged.is_some() {
            return Err(Error::InvalidArgument(
                "a staged batch has not been prepared yet".into(),
            ));
        }
        let batch = self.iterator.next_batch(self.batch_size)?.ok_or_else(|| {
            Error::InvalidArgument("no rows are left to stage".into())
        })?;
        let rows = batch.len();
        self.base_rows.borrow_mut().extend(batch.rows);
        self.staged = Some(batch.values_by_tensor);
        Ok(rows)
    }

    fn prepare(&mut self, tensors: &mut HashMap<TensorId, Tensor>) -> Result<()> {
        let staged = self.staged.take().ok_or_else(|| {
            Error::InvalidArgument("no batch has been staged".into())
        })?;
        for (id, values) in staged {
            let converter = self.converters.get(&id).ok_or_else(|| {
                Error::InvalidConfiguration(format!(
                    "No converter is configured for network tensor '{}'.",
                    id
                ))
            })?;
            let tensor = tensors.get_mut(&id).ok_or_else(|| {
                Error::InvalidNetworkInput(format!(
                    "No tensor was allocated for network input '{}'.",
                    id
                ))
            })?;
            converter.convert(&values, tensor)?;
            if tensor.size() != tensor.capacity() {
                return Err(Error::InvalidNetworkInput(format!(
                    "Network input '{}' was filled with {} elements but its \
                     shape requires {}.",
                    id,
                    tensor.size(),
                    tensor.capacity()
                )));
            }
        }
        Ok(())
    }
}

/// One output tensor with its converter and per-example cell count
pub struct OutputBinding {
    /// Tensor this binding reads
    pub id: TensorId,
    /// Converter producing the cells
    pub converter: Box<dyn TensorToValueConverter>,
    /// Cells produced per example
    pub dest_count: usize,
}

/// Output consumer collecting converted cells into rows.
///
/// With base rows attached the output cells are appended to the input row
/// that produced each example; without, fresh rows are created.
pub struct CollectingOutputConsumer {
    bindings: Vec<OutputBinding>,
    base_rows: Option<SharedRows>,
    collected: Rc<RefCell<Vec<Row>>>,
}

impl CollectingOutputConsumer {
    /// Create a consumer over the given ordered bindings
    pub fn new(bindings: Vec<OutputBinding>, base_rows: Option<SharedRows>) -> Self {
        Self {
            bindings,
            base_rows,
            collected: Rc::new(RefCell::new(Vec::new())),
        }
    }

    /// Handle to the collected rows
    pub fn collected_rows(&self) -> Rc<RefCell<Vec<Row>>> {
        Rc::clone(&self.collected)
    }
}

impl OutputConsumer for CollectingOutputConsumer {
    fn accept(&mut self, tensors: &mut HashMap<TensorId, Tensor>) -> Result<()> {
        let mut examples = None;
        let mut per_binding = Vec::with_capacity(self.bindings.len());
        for binding in &self.bindings {
            let tensor = tensors.get_mut(&binding.id).ok_or_else(|| {
                Error::InvalidNetworkOutput(format!(
                    "The backend produced no tensor for network output '{}'.",
                    binding.id
                ))
            })?;
            let batch = tensor.spec().batch_size();
            if *examples.get_or_insert(batch) != batch {
                return Err(Error::InvalidNetworkOutput(
                    "output tensors disagree on the batch row count".into(),
                ));
            }
            // Every output value must be present; a partially filled tensor
            // would leak missing cells into the emitted rows.
            if tensor.remaining() != tensor.capacity() {
                return Err(Error::InvalidNetworkOutput(format!(
                    "Network output '{}' holds {} elements but its shape \
                     requires {}.",
                    binding.id,
                    tensor.remaining(),
                    tensor.capacity()
                )));
            }
            let mut cells = vec![DataCell::Missing; binding.dest_count * batch];
            binding.converter.convert(tensor, &mut cells, 0)?;
            per_binding.push(cells);
        }
        let examples = examples.unwrap_or(0);

        let mut collected = self.collected.borrow_mut();
        for example in 0..examples {
            let (key, mut cells) = match &self.base_rows {
                Some(rows) => {
                    let row = rows.borrow_mut().pop_front().ok_or_else(|| {
                        Error::InvalidNetworkOutput(
                            "the backend produced more output examples than input rows".into(),
                        )
                    })?;
                    (row.key, row.cells)
                }
                None => (format!("Row{}", collected.len()), Vec::new()),
            };
            for (binding, converted) in self.bindings.iter().zip(&per_binding) {
                let start = example * binding.dest_count;
                cells.extend_from_slice(&converted[start..start + binding.dest_count]);
            }
            collected.push(Row { key, cells });
        }
        Ok(())
    }

    fn finish(&mut self, rows_consumed: usize) -> Result<()> {
        let collected = self.collected.borrow().len();
        if collected != rows_consumed {
            return Err(Error::InvalidNetworkOutput(format!(
                "the session processed {} rows but the outputs produced {}",
                rows_consumed, collected
            )));
        }
        Ok(())
    }
}

/// One full batched pass of a network over a row source
pub struct ExecutionSession<'a> {
    backend: Box<dyn NetworkBackend + 'a>,
    preparer: Box<dyn InputPreparer + 'a>,
    consumer: Box<dyn OutputConsumer + 'a>,
    input_specs: HashMap<TensorId, ExecutionTensorSpec>,
    output_specs: HashMap<TensorId, ExecutionTensorSpec>,
}

impl<'a> ExecutionSession<'a> {
    /// Create a session over resolved input and output specs.
    ///
    /// There must be at least one input, all inputs must agree on the
    /// batch size, and tensor identifiers must be distinct across inputs
    /// and outputs.
    pub fn new(
        backend: Box<dyn NetworkBackend + 'a>,
        preparer: Box<dyn InputPreparer + 'a>,
        consumer: Box<dyn OutputConsumer + 'a>,
        input_specs: Vec<ExecutionTensorSpec>,
        output_specs: Vec<ExecutionTensorSpec>,
    ) -> Result<Self> {
        if input_specs.is_empty() {
            return Err(Error::InvalidConfiguration(
                "a session needs at least one network input".into(),
            ));
        }
        let batch_size = input_specs[0].batch_size();
        if input_specs.iter().any(|s| s.batch_size() != batch_size) {
            return Err(Error::InvalidConfiguration(
                "all network inputs must agree on the batch size".into(),
            ));
        }
        let mut seen = HashSet::new();
        for spec in input_specs.iter().chain(&output_specs) {
            if !seen.insert(spec.id().clone()) {
                return Err(Error::InvalidConfiguration(format!(
                    "duplicate tensor identifier '{}'",
                    spec.id()
                )));
            }
        }
        Ok(Self {
            backend,
            preparer,
            consumer,
            input_specs: input_specs.into_iter().map(|s| (s.id().clone(), s)).collect(),
            output_specs: output_specs
                .into_iter()
                .map(|s| (s.id().clone(), s))
                .collect(),
        })
    }

    fn allocate(
        specs: &HashMap<TensorId, ExecutionTensorSpec>,
        rows: usize,
    ) -> Result<HashMap<TensorId, Tensor>> {
        specs
            .iter()
            .map(|(id, spec)| Ok((id.clone(), Tensor::new(spec.with_batch_size(rows)?))))
            .collect()
    }

    /// Run the pass to completion.
    ///
    /// Cancellation is checked before each batch; a cancelled run returns
    /// `Cancelled` without invoking the consumer for pending batches.
    pub fn run(&mut self, monitor: &mut ExecutionMonitor) -> Result<SessionStats> {
        let start = Instant::now();
        let total = self.preparer.total_rows();
        let mut stats = SessionStats::default();

        while self.preparer.has_next() {
            if monitor.is_cancelled() {
                info!(batches = stats.batches, "session cancelled");
                return Err(Error::Cancelled);
            }
            let rows = self.preparer.stage_next()?;
            let mut inputs = Self::allocate(&self.input_specs, rows)?;
            self.preparer.prepare(&mut inputs)?;
            let mut outputs = Self::allocate(&self.output_specs, rows)?;
            self.backend.execute(&mut inputs, &mut outputs)?;
            self.consumer.accept(&mut outputs)?;
            stats.batches += 1;
            stats.rows += rows;
            monitor.report(stats.rows, total);
        }
        self.consumer.finish(stats.rows)?;
        stats.execution_time = start.elapsed();
        info!(
            batches = stats.batches,
            rows = stats.rows,
            elapsed_ms = stats.execution_time.as_millis() as u64,
            "session finished"
        );
        Ok(stats)
    }
}
