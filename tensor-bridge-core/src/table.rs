//! Table schema and row source abstractions

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::cell::{ColumnType, DataCell};
use crate::error::{Error, Result};

/// A column in a table schema
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSpec {
    /// Name of the column
    pub name: String,

    /// Value type of the column
    pub column_type: ColumnType,
}

impl ColumnSpec {
    /// Create a new column spec
    pub fn new(name: &str, column_type: ColumnType) -> Self {
        Self {
            name: name.to_string(),
            column_type,
        }
    }
}

impl fmt::Display for ColumnSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.column_type)
    }
}

/// A schema describing a table's structure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    /// Columns in this schema
    columns: Vec<ColumnSpec>,

    /// Column indices by name for faster lookup
    #[serde(skip)]
    column_indices: HashMap<String, usize>,
}

impl TableSchema {
    /// Create a new schema with the given columns
    pub fn new(columns: Vec<ColumnSpec>) -> Self {
        let mut column_indices = HashMap::with_capacity(columns.len());
        for (i, column) in columns.iter().enumerate() {
            column_indices.insert(column.name.clone(), i);
        }

        Self {
            columns,
            column_indices,
        }
    }

    /// Get all columns in this schema
    pub fn columns(&self) -> &[ColumnSpec] {
        &self.columns
    }

    /// Get a column by index
    pub fn column(&self, index: usize) -> &ColumnSpec {
        &self.columns[index]
    }

    /// Get the index of a column by name
    pub fn index_of(&self, name: &str) -> Result<usize> {
        self.column_indices
            .get(name)
            .copied()
            .ok_or_else(|| Error::InvalidArgument(format!("Column not found: {}", name)))
    }

    /// Get the number of columns in this schema
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Check if this schema is empty
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// The distinct column types present in this schema, in first-seen order
    pub fn distinct_column_types(&self) -> Vec<ColumnType> {
        let mut types = Vec::new();
        for column in &self.columns {
            if !types.contains(&column.column_type) {
                types.push(column.column_type.clone());
            }
        }
        types
    }

    /// Serialize this schema to a binary format
    pub fn serialize(&self) -> Result<Vec<u8>> {
        bincode::serialize(self).map_err(Error::Serialization)
    }

    /// Deserialize a schema from a binary format
    pub fn deserialize(data: &[u8]) -> Result<Self> {
        let schema: Self = bincode::deserialize(data).map_err(Error::Serialization)?;

        // Rebuild the column indices
        let mut schema = schema;
        schema.column_indices.clear();
        for (i, column) in schema.columns.iter().enumerate() {
            schema.column_indices.insert(column.name.clone(), i);
        }

        Ok(schema)
    }
}

impl fmt::Display for TableSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "TableSchema: {} columns", self.columns.len())?;
        for column in &self.columns {
            writeln!(f, "  {}", column)?;
        }
        Ok(())
    }
}

/// One table row with a stable key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Row {
    /// Stable row key
    pub key: String,

    /// Cells, one per schema column
    pub cells: Vec<DataCell>,
}

impl Row {
    /// Create a new row
    pub fn new(key: &str, cells: Vec<DataCell>) -> Self {
        Self {
            key: key.to_string(),
            cells,
        }
    }

    /// Get a cell by column index
    pub fn cell(&self, index: usize) -> Result<&DataCell> {
        self.cells
            .get(index)
            .ok_or_else(|| Error::InvalidArgument(format!("Cell index out of bounds: {}", index)))
    }
}

/// A cursor over the rows of one pass through a table
pub trait RowCursor {
    /// Retrieve the next row, `None` when exhausted
    fn next_row(&mut self) -> Option<Row>;
}

/// A source of rows for the pipeline
pub trait RowSource {
    /// Get the schema of this source
    fn schema(&self) -> Arc<TableSchema>;

    /// Open a fresh cursor positioned at the first row
    fn cursor(&self) -> Box<dyn RowCursor + '_>;

    /// Provides a hint about the total number of rows (if known)
    fn row_count(&self) -> Option<usize>;
}

/// An immutable in-memory table
#[derive(Debug, Clone)]
pub struct InMemoryTable {
    schema: Arc<TableSchema>,
    rows: Vec<Row>,
}

impl InMemoryTable {
    /// Create a new table, verifying that every row matches the schema width
    pub fn new(schema: Arc<TableSchema>, rows: Vec<Row>) -> Result<Self> {
        for row in &rows {
            if row.cells.len() != schema.len() {
                return Err(Error::InvalidArgument(format!(
                    "Row '{}' has {} cells but the schema has {} columns",
                    row.key,
                    row.cells.len(),
                    schema.len()
                )));
            }
        }
        Ok(Self { schema, rows })
    }

    /// Number of rows in this table
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Check if this table is empty
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Get all rows
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }
}

struct InMemoryCursor<'a> {
    rows: &'a [Row],
    position: usize,
}

impl RowCursor for InMemoryCursor<'_> {
    fn next_row(&mut self) -> Option<Row> {
        let row = self.rows.get(self.position).cloned();
        if row.is_some() {
            self.position += 1;
        }
        row
    }
}

impl RowSource for InMemoryTable {
    fn schema(&self) -> Arc<TableSchema> {
        self.schema.clone()
    }

    fn cursor(&self) -> Box<dyn RowCursor + '_> {
        Box::new(InMemoryCursor {
            rows: &self.rows,
            position: 0,
        })
    }

    fn row_count(&self) -> Option<usize> {
        Some(self.rows.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> Arc<TableSchema> {
        Arc::new(TableSchema::new(vec![
            ColumnSpec::new("id", ColumnType::Int),
            ColumnSpec::new("value", ColumnType::Double),
        ]))
    }

    #[test]
    fn test_schema_lookup() {
        let schema = schema();
        assert_eq!(schema.index_of("value").unwrap(), 1);
        assert!(schema.index_of("missing").is_err());
        assert_eq!(schema.len(), 2);
    }

    #[test]
    fn test_schema_distinct_types() {
        let schema = TableSchema::new(vec![
            ColumnSpec::new("a", ColumnType::Double),
            ColumnSpec::new("b", ColumnType::Double),
            ColumnSpec::new("c", ColumnType::Int),
        ]);
        assert_eq!(
            schema.distinct_column_types(),
            vec![ColumnType::Double, ColumnType::Int]
        );
    }

    #[test]
    fn test_schema_binary_roundtrip() {
        let schema = schema();
        let bytes = schema.serialize().unwrap();
        let restored = TableSchema::deserialize(&bytes).unwrap();
        assert_eq!(*schema, restored);
        assert_eq!(restored.index_of("id").unwrap(), 0);
    }

    #[test]
    fn test_table_validates_row_width() {
        let schema = schema();
        let ok = InMemoryTable::new(
            schema.clone(),
            vec![Row::new("r0", vec![DataCell::Int(1), DataCell::Double(2.0)])],
        );
        assert!(ok.is_ok());

        let bad = InMemoryTable::new(schema, vec![Row::new("r0", vec![DataCell::Int(1)])]);
        assert!(bad.is_err());
    }

    #[test]
    fn test_cursor_iterates_in_order() {
        let table = InMemoryTable::new(
            schema(),
            vec![
                Row::new("r0", vec![DataCell::Int(0), DataCell::Double(0.0)]),
                Row::new("r1", vec![DataCell::Int(1), DataCell::Double(1.0)]),
            ],
        )
        .unwrap();

        let mut cursor = table.cursor();
        assert_eq!(cursor.next_row().unwrap().key, "r0");
        assert_eq!(cursor.next_row().unwrap().key, "r1");
        assert!(cursor.next_row().is_none());
    }
}
