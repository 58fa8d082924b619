use std::fmt;

use indexmap::IndexMap;
use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::error::LearnError;

/// A single dataframe value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Cell {
    /// Missing value.
    Null,
    /// Boolean value.
    Bool(bool),
    /// Integer value.
    Int(i64),
    /// Floating point value.
    Float(f64),
    /// Text value.
    Text(String),
}

impl Cell {
    /// Numeric view of the cell; booleans map to 0/1, text and nulls have none.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Bool(flag) => Some(f64::from(u8::from(*flag))),
            Self::Int(value) => Some(*value as f64),
            Self::Float(value) => Some(*value),
            Self::Null | Self::Text(_) => None,
        }
    }

    /// Text view of the cell.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Bool(flag) => write!(f, "{flag}"),
            Self::Int(value) => write!(f, "{value}"),
            Self::Float(value) => write!(f, "{value}"),
            Self::Text(text) => f.write_str(text),
        }
    }
}

impl From<bool> for Cell {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for Cell {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for Cell {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for Cell {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<String> for Cell {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

/// Column-oriented table with ordered, uniquely named columns of equal length.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataFrame {
    columns: IndexMap<String, Vec<Cell>>,
    n_rows: usize,
}

impl DataFrame {
    /// Builds a frame from row-major data.
    pub fn from_rows<I, S>(columns: I, rows: Vec<Vec<Cell>>) -> Result<Self, LearnError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = columns.into_iter().map(Into::into).collect();
        let mut table: IndexMap<String, Vec<Cell>> = IndexMap::with_capacity(names.len());
        for name in &names {
            if table
                .insert(name.clone(), Vec::with_capacity(rows.len()))
                .is_some()
            {
                return Err(LearnError::DuplicateColumn(name.clone()));
            }
        }
        let n_rows = rows.len();
        for (row_idx, row) in rows.into_iter().enumerate() {
            if row.len() != names.len() {
                return Err(LearnError::RaggedRow {
                    row: row_idx,
                    found: row.len(),
                    expected: names.len(),
                });
            }
            for (column, cell) in table.values_mut().zip(row) {
                column.push(cell);
            }
        }
        Ok(Self {
            columns: table,
            n_rows,
        })
    }

    /// Number of rows.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.n_rows
    }

    /// Whether the frame has no rows.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.n_rows == 0
    }

    /// Number of columns.
    #[must_use]
    pub fn n_columns(&self) -> usize {
        self.columns.len()
    }

    /// Column names in order.
    pub fn column_names(&self) -> impl Iterator<Item = &str> + '_ {
        self.columns.keys().map(String::as_str)
    }

    /// Cells of a column.
    #[must_use]
    pub fn column(&self, name: &str) -> Option<&[Cell]> {
        self.columns.get(name).map(Vec::as_slice)
    }

    /// Renames a column in place, keeping its position.
    pub fn rename_column(&mut self, from: &str, to: impl Into<String>) -> Result<(), LearnError> {
        let to = to.into();
        if from == to {
            return self
                .columns
                .contains_key(from)
                .then_some(())
                .ok_or_else(|| LearnError::UnknownColumn(from.to_owned()));
        }
        if self.columns.contains_key(&to) {
            return Err(LearnError::DuplicateColumn(to));
        }
        let idx = self
            .columns
            .get_index_of(from)
            .ok_or_else(|| LearnError::UnknownColumn(from.to_owned()))?;
        let (_, cells) = self
            .columns
            .shift_remove_index(idx)
            .ok_or_else(|| LearnError::UnknownColumn(from.to_owned()))?;
        self.columns.shift_insert(idx, to, cells);
        Ok(())
    }

    /// Removes a column, returning its cells.
    pub fn drop_column(&mut self, name: &str) -> Result<Vec<Cell>, LearnError> {
        self.columns
            .shift_remove(name)
            .ok_or_else(|| LearnError::UnknownColumn(name.to_owned()))
    }

    /// Replaces every cell of a column with `func(cell)`.
    pub fn map_column<F>(&mut self, name: &str, func: F) -> Result<(), LearnError>
    where
        F: Fn(&Cell) -> Cell,
    {
        let column = self
            .columns
            .get_mut(name)
            .ok_or_else(|| LearnError::UnknownColumn(name.to_owned()))?;
        for cell in column.iter_mut() {
            *cell = func(cell);
        }
        Ok(())
    }

    /// Splits the frame into its feature columns and the label column.
    pub fn split_label(&self, lbl_col: &str) -> Result<(Self, Vec<Cell>), LearnError> {
        let mut features = self.clone();
        let labels = features.drop_column(lbl_col)?;
        Ok((features, labels))
    }

    /// Row-major numeric matrix of every column.
    pub fn to_feature_matrix(&self) -> Result<Array2<f64>, LearnError> {
        let mut matrix = Array2::zeros((self.n_rows, self.columns.len()));
        for (col_idx, (name, cells)) in self.columns.iter().enumerate() {
            for (row_idx, cell) in cells.iter().enumerate() {
                matrix[[row_idx, col_idx]] =
                    cell.as_f64().ok_or_else(|| LearnError::NonNumericFeature {
                        column: name.clone(),
                        row: row_idx,
                        value: cell.to_string(),
                    })?;
            }
        }
        Ok(matrix)
    }
}
