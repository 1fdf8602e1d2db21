use std::ops::Range;

use crate::column::Value;
use crate::{
    Error,
    Result,
};

/// Block metadata sent ahead of the columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockInfo {
    /// Set on the extra "overflows" row of GROUP BY ... WITH TOTALS when
    /// `max_rows_to_group_by` was hit.
    pub is_overflows: bool,
    /// Two-level aggregation bucket, -1 when not bucketed.
    pub bucket_num: i32,
}

impl Default for BlockInfo {
    fn default() -> Self {
        Self { is_overflows: false, bucket_num: -1 }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct ColumnItem {
    name: String,
    type_name: String,
    values: Vec<Value>,
}

/// Named, typed columns of equal length. Values are stored column-major,
/// the way they travel on the wire.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Block {
    info: BlockInfo,
    columns: Vec<ColumnItem>,
    rows: usize,
}

impl Block {
    pub fn new() -> Self {
        Self::default()
    }

    /// Block with columns but no rows: the shape of a table.
    pub fn with_structure<N, T>(columns_with_types: &[(N, T)]) -> Self
    where
        N: AsRef<str>,
        T: AsRef<str>,
    {
        Self {
            info: BlockInfo::default(),
            columns: columns_with_types
                .iter()
                .map(|(name, ty)| ColumnItem {
                    name: name.as_ref().to_string(),
                    type_name: ty.as_ref().to_string(),
                    values: Vec::new(),
                })
                .collect(),
            rows: 0,
        }
    }

    /// Build from `(name, type, values)` columns of equal length.
    pub fn from_columns(
        columns: impl IntoIterator<Item = (String, String, Vec<Value>)>,
    ) -> Result<Self> {
        let mut block = Block::new();
        for (name, type_name, values) in columns {
            block.append_column(name, type_name, values)?;
        }
        Ok(block)
    }

    /// Build from rows, each with one value per column.
    pub fn from_rows<N, T>(
        columns_with_types: &[(N, T)],
        rows: impl IntoIterator<Item = Vec<Value>>,
    ) -> Result<Self>
    where
        N: AsRef<str>,
        T: AsRef<str>,
    {
        let mut block = Block::with_structure(columns_with_types);
        for (index, row) in rows.into_iter().enumerate() {
            if row.len() != block.columns.len() {
                return Err(Error::InvalidArgument(format!(
                    "row {} has {} values, expected {}",
                    index,
                    row.len(),
                    block.columns.len()
                )));
            }
            for (column, value) in block.columns.iter_mut().zip(row) {
                column.values.push(value);
            }
            block.rows += 1;
        }
        Ok(block)
    }

    /// Append a named column; its length must match the existing columns.
    pub fn append_column(
        &mut self,
        name: impl Into<String>,
        type_name: impl Into<String>,
        values: Vec<Value>,
    ) -> Result<()> {
        let name = name.into();
        if self.columns.is_empty() {
            self.rows = values.len();
        } else if values.len() != self.rows {
            return Err(Error::InvalidArgument(format!(
                "All columns in block must have same count of rows. Name: \
                 '{}', expected rows: {}, got: {}",
                name,
                self.rows,
                values.len()
            )));
        }
        self.columns.push(ColumnItem {
            name,
            type_name: type_name.into(),
            values,
        });
        Ok(())
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn row_count(&self) -> usize {
        self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    pub fn info(&self) -> &BlockInfo {
        &self.info
    }

    pub fn set_info(&mut self, info: BlockInfo) {
        self.info = info;
    }

    pub fn column(&self, index: usize) -> Option<&[Value]> {
        self.columns.get(index).map(|item| item.values.as_slice())
    }

    pub fn column_name(&self, index: usize) -> Option<&str> {
        self.columns.get(index).map(|item| item.name.as_str())
    }

    pub fn column_type(&self, index: usize) -> Option<&str> {
        self.columns.get(index).map(|item| item.type_name.as_str())
    }

    pub fn column_by_name(&self, name: &str) -> Option<&[Value]> {
        self.columns
            .iter()
            .find(|item| item.name == name)
            .map(|item| item.values.as_slice())
    }

    /// `(name, type)` of every column, in order.
    pub fn columns_with_types(&self) -> Vec<(String, String)> {
        self.columns
            .iter()
            .map(|item| (item.name.clone(), item.type_name.clone()))
            .collect()
    }

    /// Iterate over `(name, type, values)` of each column.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str, &[Value])> {
        self.columns.iter().map(|item| {
            (item.name.as_str(), item.type_name.as_str(), item.values.as_slice())
        })
    }

    /// Values of row `index`, one per column.
    pub fn row(&self, index: usize) -> Option<Vec<Value>> {
        (index < self.rows).then(|| {
            self.columns.iter().map(|item| item.values[index].clone()).collect()
        })
    }

    /// Rows in order, transposed from the column-major storage.
    pub fn into_rows(self) -> Vec<Vec<Value>> {
        let mut rows: Vec<Vec<Value>> = (0..self.rows)
            .map(|_| Vec::with_capacity(self.columns.len()))
            .collect();
        for item in self.columns {
            for (row, value) in rows.iter_mut().zip(item.values) {
                row.push(value);
            }
        }
        rows
    }

    /// Copy of a row range with the same structure.
    pub fn slice(&self, range: Range<usize>) -> Block {
        let range = range.start.min(self.rows)..range.end.min(self.rows);
        Block {
            info: self.info,
            columns: self
                .columns
                .iter()
                .map(|item| ColumnItem {
                    name: item.name.clone(),
                    type_name: item.type_name.clone(),
                    values: item.values[range.clone()].to_vec(),
                })
                .collect(),
            rows: range.len(),
        }
    }

    /// Split into blocks of at most `size` rows. An empty block yields
    /// nothing.
    pub fn chunks(&self, size: usize) -> impl Iterator<Item = Block> + '_ {
        let size = size.max(1);
        (0..self.rows)
            .step_by(size)
            .map(move |start| self.slice(start..start + size))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Block {
        Block::from_rows(
            &[("id", "UInt64"), ("name", "String")],
            (0..5u64).map(|i| vec![Value::UInt64(i), Value::from(format!("n{}", i))]),
        )
        .unwrap()
    }

    #[test]
    fn test_block_info_default() {
        let info = BlockInfo::default();
        assert!(!info.is_overflows);
        assert_eq!(info.bucket_num, -1);
    }

    #[test]
    fn test_from_rows_is_column_major() {
        let block = sample();
        assert_eq!(block.column_count(), 2);
        assert_eq!(block.row_count(), 5);
        assert_eq!(block.column(0).unwrap()[3], Value::UInt64(3));
        assert_eq!(block.column_by_name("name").unwrap()[1], Value::from("n1"));
        assert_eq!(block.column_type(1), Some("String"));
        assert_eq!(
            block.row(2),
            Some(vec![Value::UInt64(2), Value::from("n2")])
        );
        assert_eq!(block.row(5), None);
        assert_eq!(block.clone().into_rows().len(), 5);
    }

    #[test]
    fn test_ragged_rows_rejected() {
        let err = Block::from_rows(&[("a", "Int8")], vec![vec![]]).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn test_mismatched_columns_rejected() {
        let result = Block::from_columns(vec![
            ("a".into(), "Int8".into(), vec![Value::Int8(1)]),
            ("b".into(), "Int8".into(), vec![]),
        ]);
        assert!(matches!(result, Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn test_chunks() {
        let block = sample();
        let chunks: Vec<Block> = block.chunks(2).collect();
        assert_eq!(
            chunks.iter().map(Block::row_count).collect::<Vec<_>>(),
            vec![2, 2, 1]
        );
        assert_eq!(chunks[2].row(0).unwrap()[0], Value::UInt64(4));
        assert_eq!(chunks[0].columns_with_types(), block.columns_with_types());
        assert_eq!(Block::with_structure(&[("a", "Int8")]).chunks(10).count(), 0);
    }

    #[test]
    fn test_iter() {
        let block = sample();
        let names: Vec<&str> = block.iter().map(|(name, _, _)| name).collect();
        assert_eq!(names, vec!["id", "name"]);
    }
}
