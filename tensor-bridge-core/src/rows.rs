//! Row iteration and batch windowing
//!
//! Walks a table exactly once per pass, producing per-tensor column value
//! groupings in bounded-size batches. The iterator owns the single
//! underlying cursor; a pass is restarted by resetting, not by cloning.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::cell::DataCell;
use crate::error::{Error, Result};
use crate::spec::TensorId;
use crate::table::{Row, RowCursor, RowSource, TableSchema};

/// One bounded-size unit of iteration: an ordered group of rows together
/// with the column values gathered per tensor, concatenated row-major.
/// Created fresh per iteration step and discarded after conversion.
#[derive(Debug, Clone)]
pub struct RowBatch {
    /// Rows of this batch, in table order
    pub rows: Vec<Row>,

    /// Gathered column values per tensor, concatenated row-major
    pub values_by_tensor: HashMap<TensorId, Vec<DataCell>>,
}

impl RowBatch {
    /// Number of rows in this batch
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Check if this batch is empty
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Iterator over a row source producing per-tensor value groupings
pub struct TensorRowIterator<'a> {
    source: &'a dyn RowSource,
    schema: Arc<TableSchema>,
    columns: HashMap<TensorId, Vec<usize>>,
    cursor: Box<dyn RowCursor + 'a>,
    peeked: Option<Row>,
    last_index: Option<usize>,
}

impl<'a> TensorRowIterator<'a> {
    /// Create an iterator over `source` with the configured column indices
    /// per tensor.
    pub fn new(source: &'a dyn RowSource, columns: HashMap<TensorId, Vec<usize>>) -> Self {
        let cursor = source.cursor();
        Self {
            source,
            schema: source.schema(),
            columns,
            cursor,
            peeked: None,
            last_index: None,
        }
    }

    /// Total number of rows, if the source knows it
    pub fn size(&self) -> Option<usize> {
        self.source.row_count()
    }

    fn fill_peek(&mut self) {
        if self.peeked.is_none() {
            self.peeked = self.cursor.next_row();
        }
    }

    /// Whether another row is available
    pub fn has_next(&mut self) -> bool {
        self.fill_peek();
        self.peeked.is_some()
    }

    /// The next row without consuming it. Repeated calls return the same
    /// row until `next_row` is called.
    pub fn peek(&mut self) -> Option<&Row> {
        self.fill_peek();
        self.peeked.as_ref()
    }

    /// Consume and return the next row (the peeked one if present)
    pub fn next_row(&mut self) -> Option<Row> {
        self.fill_peek();
        let row = self.peeked.take();
        if row.is_some() {
            self.last_index = Some(self.last_index.map_or(0, |i| i + 1));
        }
        row
    }

    /// Close the current cursor and reopen it at the start of the table,
    /// clearing any peeked row.
    pub fn reset(&mut self) {
        self.cursor = self.source.cursor();
        self.peeked = None;
        self.last_index = None;
    }

    /// Row access by index, supporting only index 0 (reset and read) and
    /// the next sequential index. True random access is not implemented;
    /// any other index is an unsupported operation.
    pub fn get(&mut self, index: usize) -> Result<Row> {
        let sequential = self.last_index.map_or(index == 0, |last| index == last + 1);
        if sequential {
            return self
                .next_row()
                .ok_or_else(|| Error::InvalidArgument(format!("No row at index {}", index)));
        }
        if index == 0 {
            self.reset();
            return self
                .next_row()
                .ok_or_else(|| Error::InvalidArgument("No row at index 0".into()));
        }
        debug!(
            index,
            "random access requested; only sequential reads are implemented"
        );
        Err(Error::UnsupportedOperation(
            "Random access is not yet implemented.".into(),
        ))
    }

    /// Gather the configured column values of `row` per tensor. A missing
    /// cell in any configured column is fatal.
    pub fn group_by_tensor(&self, row: &Row) -> Result<HashMap<TensorId, Vec<DataCell>>> {
        let mut grouped = HashMap::with_capacity(self.columns.len());
        for (id, indices) in &self.columns {
            let mut values = Vec::with_capacity(indices.len());
            for &column in indices {
                let cell = row.cell(column)?;
                if cell.is_missing() {
                    return Err(Error::InvalidNetworkInput(format!(
                        "Missing cell in input row '{}', column '{}'.",
                        row.key,
                        self.schema.column(column).name
                    )));
                }
                values.push(cell.clone());
            }
            grouped.insert(id.clone(), values);
        }
        Ok(grouped)
    }

    /// Accumulate up to `batch_size` rows into the next batch. The final,
    /// possibly shorter, batch is still produced; `None` only once the
    /// source is exhausted.
    pub fn next_batch(&mut self, batch_size: usize) -> Result<Option<RowBatch>> {
        if !self.has_next() {
            return Ok(None);
        }
        let mut rows = Vec::with_capacity(batch_size);
        let mut values_by_tensor: HashMap<TensorId, Vec<DataCell>> = self
            .columns
            .keys()
            .map(|id| (id.clone(), Vec::new()))
            .collect();
        while rows.len() < batch_size {
            let Some(row) = self.next_row() else { break };
            let grouped = self.group_by_tensor(&row)?;
            for (id, mut values) in grouped {
                values_by_tensor
                    .get_mut(&id)
                    .map(|all| all.append(&mut values));
            }
            rows.push(row);
        }
        Ok(Some(RowBatch {
            rows,
            values_by_tensor,
        }))
    }

    /// Number of batches a full pass produces for the given batch size,
    /// if the source knows its row count.
    pub fn num_batches(&self, batch_size: usize) -> Option<usize> {
        self.size().map(|n| n.div_ceil(batch_size))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::ColumnType;
    use crate::table::{ColumnSpec, InMemoryTable};
    use proptest::prelude::*;

    fn table(rows: usize) -> InMemoryTable {
        let schema = Arc::new(TableSchema::new(vec![
            ColumnSpec::new("x", ColumnType::Double),
            ColumnSpec::new("y", ColumnType::Double),
        ]));
        let rows = (0..rows)
            .map(|i| {
                Row::new(
                    &format!("r{}", i),
                    vec![DataCell::Double(i as f64), DataCell::Double(-(i as f64))],
                )
            })
            .collect();
        InMemoryTable::new(schema, rows).unwrap()
    }

    fn columns() -> HashMap<TensorId, Vec<usize>> {
        let mut columns = HashMap::new();
        columns.insert(TensorId::new("in"), vec![0, 1]);
        columns
    }

    #[test]
    fn test_peek_idempotence() {
        let table = table(3);
        let mut iter = TensorRowIterator::new(&table, columns());

        for _ in 0..5 {
            assert_eq!(iter.peek().unwrap().key, "r0");
        }
        assert_eq!(iter.next_row().unwrap().key, "r0");
        assert_eq!(iter.peek().unwrap().key, "r1");
    }

    #[test]
    fn test_reset_restarts_the_pass() {
        let table = table(3);
        let mut iter = TensorRowIterator::new(&table, columns());
        iter.next_row();
        iter.next_row();
        iter.reset();
        assert_eq!(iter.next_row().unwrap().key, "r0");
    }

    #[test]
    fn test_get_supports_sequential_access_only() {
        let table = table(4);
        let mut iter = TensorRowIterator::new(&table, columns());

        assert_eq!(iter.get(0).unwrap().key, "r0");
        assert_eq!(iter.get(1).unwrap().key, "r1");
        // Restart from the beginning is the other supported fast path
        assert_eq!(iter.get(0).unwrap().key, "r0");
        assert!(matches!(
            iter.get(3),
            Err(Error::UnsupportedOperation(_))
        ));
    }

    #[test]
    fn test_missing_cell_is_fatal_and_names_the_location() {
        let schema = Arc::new(TableSchema::new(vec![ColumnSpec::new(
            "feature",
            ColumnType::Double,
        )]));
        let table = InMemoryTable::new(
            schema,
            vec![
                Row::new("r0", vec![DataCell::Double(1.0)]),
                Row::new("r1", vec![DataCell::Missing]),
            ],
        )
        .unwrap();
        let mut columns = HashMap::new();
        columns.insert(TensorId::new("in"), vec![0]);
        let mut iter = TensorRowIterator::new(&table, columns);

        assert!(iter.next_batch(1).unwrap().is_some());
        match iter.next_batch(1) {
            Err(Error::InvalidNetworkInput(message)) => {
                assert!(message.contains("r1"));
                assert!(message.contains("feature"));
            }
            other => panic!("expected InvalidNetworkInput, got {:?}", other.is_ok()),
        }
    }

    #[test]
    fn test_batch_values_are_grouped_row_major() {
        let table = table(2);
        let mut iter = TensorRowIterator::new(&table, columns());
        let batch = iter.next_batch(2).unwrap().unwrap();
        assert_eq!(
            batch.values_by_tensor[&TensorId::new("in")],
            vec![
                DataCell::Double(0.0),
                DataCell::Double(-0.0),
                DataCell::Double(1.0),
                DataCell::Double(-1.0),
            ]
        );
    }

    proptest! {
        #[test]
        fn prop_batch_completeness(rows in 1usize..40, batch_size in 1usize..10) {
            let table = table(rows);
            let mut iter = TensorRowIterator::new(&table, columns());

            let mut sizes = Vec::new();
            while let Some(batch) = iter.next_batch(batch_size).unwrap() {
                sizes.push(batch.len());
            }

            prop_assert_eq!(sizes.len(), rows.div_ceil(batch_size));
            prop_assert_eq!(sizes.iter().sum::<usize>(), rows);
            let expected_last = if rows % batch_size == 0 { batch_size } else { rows % batch_size };
            prop_assert_eq!(*sizes.last().unwrap(), expected_last);
            prop_assert!(sizes[..sizes.len() - 1].iter().all(|&s| s == batch_size));
        }

        #[test]
        fn prop_peek_then_next_consumes_one_row(peeks in 0usize..6) {
            let table = table(3);
            let mut iter = TensorRowIterator::new(&table, columns());
            for _ in 0..peeks {
                iter.peek();
            }
            iter.next_row();
            prop_assert_eq!(iter.peek().unwrap().key.as_str(), "r1");
        }
    }
}
