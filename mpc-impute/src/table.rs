//! Columnar view of a CSV dataset with null tracking.

use crate::error::TaskError;
use std::{fmt, fs, path::Path};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DataType {
    Int64,
    Float64,
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::Int64 => write!(f, "int64"),
            DataType::Float64 => write!(f, "float64"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Field {
    pub name:      String,
    pub data_type: DataType,
}

impl Field {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Column {
    Int64(Vec<Option<i64>>),
    Float64(Vec<Option<f64>>),
}

impl Column {
    pub fn len(&self) -> usize {
        match self {
            Column::Int64(v) => v.len(),
            Column::Float64(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn data_type(&self) -> DataType {
        match self {
            Column::Int64(_) => DataType::Int64,
            Column::Float64(_) => DataType::Float64,
        }
    }

    pub fn is_null(&self, row: usize) -> bool {
        match self {
            Column::Int64(v) => matches!(v.get(row), Some(None)),
            Column::Float64(v) => matches!(v.get(row), Some(None)),
        }
    }

    pub fn null_count(&self) -> usize {
        match self {
            Column::Int64(v) => v.iter().filter(|x| x.is_none()).count(),
            Column::Float64(v) => v.iter().filter(|x| x.is_none()).count(),
        }
    }

    /// Non-null values widened to `f64`.
    pub fn values_f64(&self) -> Vec<Option<f64>> {
        match self {
            Column::Int64(v) => v.iter().map(|x| x.map(|x| x as f64)).collect(),
            Column::Float64(v) => v.clone(),
        }
    }

    /// Sum of the non-null values; floats are rounded to the nearest integer.
    pub fn sum_i64(&self) -> i64 {
        match self {
            Column::Int64(v) => v.iter().flatten().fold(0_i64, |acc, x| acc.wrapping_add(*x)),
            Column::Float64(v) => v.iter().flatten().sum::<f64>().round() as i64,
        }
    }

    pub fn sum_f64(&self) -> f64 {
        self.values_f64().into_iter().flatten().sum()
    }

    fn render(&self, row: usize) -> String {
        match self {
            Column::Int64(v) => v[row].map(|x| x.to_string()).unwrap_or_default(),
            Column::Float64(v) => v[row].map(|x| x.to_string()).unwrap_or_default(),
        }
    }
}

/// Ordered named columns, all of the same length.
#[derive(Clone, Debug, PartialEq)]
pub struct Table {
    fields:  Vec<Field>,
    columns: Vec<Column>,
}

fn infer_column(name: &str, raw: Vec<Option<String>>) -> Result<Column, TaskError> {
    let ints: Option<Vec<Option<i64>>> = raw
        .iter()
        .map(|cell| match cell {
            None => Some(None),
            Some(s) => s.parse::<i64>().ok().map(Some),
        })
        .collect();
    if let Some(ints) = ints {
        return Ok(Column::Int64(ints));
    }
    raw.iter()
        .map(|cell| match cell {
            None => Ok(None),
            Some(s) => s.parse::<f64>().map(Some).map_err(|_| {
                TaskError::DatasetInconsistent(format!("column {name} has non-numeric value {s:?}"))
            }),
        })
        .collect::<Result<Vec<_>, _>>()
        .map(Column::Float64)
}

impl Table {
    /// Builds a table, rejecting columns of different lengths.
    pub fn try_new(fields: Vec<Field>, columns: Vec<Column>) -> Result<Self, TaskError> {
        if fields.len() != columns.len() {
            return Err(TaskError::DatasetInconsistent(format!(
                "{} fields for {} columns",
                fields.len(),
                columns.len()
            )));
        }
        if let Some(first) = columns.first() {
            for (field, column) in fields.iter().zip(&columns) {
                if column.len() != first.len() {
                    return Err(TaskError::DatasetInconsistent(format!(
                        "column {} has {} rows, column {} has {}",
                        field.name,
                        column.len(),
                        fields[0].name,
                        first.len()
                    )));
                }
            }
        }
        Ok(Self { fields, columns })
    }

    /// Reads a CSV file with a header row. Empty fields are nulls.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, TaskError> {
        let path = path.as_ref();
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::All)
            .from_path(path)
            .map_err(|e| TaskError::Param(format!("cannot open {}: {e}", path.display())))?;

        let names: Vec<String> = reader
            .headers()
            .map_err(|e| TaskError::DatasetInconsistent(e.to_string()))?
            .iter()
            .map(str::to_string)
            .collect();
        if names.is_empty() || names.iter().all(String::is_empty) {
            return Err(TaskError::DatasetInconsistent(format!(
                "{} has no columns",
                path.display()
            )));
        }

        let mut raw: Vec<Vec<Option<String>>> = vec![Vec::new(); names.len()];
        for (line, record) in reader.records().enumerate() {
            let record = record.map_err(|e| TaskError::DatasetInconsistent(e.to_string()))?;
            if record.len() > names.len() {
                return Err(TaskError::DatasetInconsistent(format!(
                    "row {} has {} fields, header has {}",
                    line + 1,
                    record.len(),
                    names.len()
                )));
            }
            for (cells, value) in raw.iter_mut().zip(record.iter()) {
                cells.push((!value.is_empty()).then(|| value.to_string()));
            }
        }

        let mut fields = Vec::with_capacity(names.len());
        let mut columns = Vec::with_capacity(names.len());
        for (name, cells) in names.into_iter().zip(raw) {
            let column = infer_column(&name, cells)?;
            fields.push(Field::new(name, column.data_type()));
            columns.push(column);
        }
        let table = Self::try_new(fields, columns)?;
        tracing::debug!(
            "loaded {} with {} columns and {} rows",
            path.display(),
            table.num_columns(),
            table.num_rows()
        );
        Ok(table)
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn num_rows(&self) -> usize {
        self.columns.first().map(Column::len).unwrap_or(0)
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.name.as_str()).collect()
    }

    pub fn field(&self, index: usize) -> Option<&Field> {
        self.fields.get(index)
    }

    pub fn column(&self, index: usize) -> Option<&Column> {
        self.columns.get(index)
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    /// Swaps the column at `index` for one of the same length.
    pub fn replace_column(
        &mut self,
        index: usize,
        field: Field,
        column: Column,
    ) -> Result<(), TaskError> {
        if index >= self.columns.len() {
            return Err(TaskError::DatasetInconsistent(format!(
                "no column at position {index}"
            )));
        }
        if column.len() != self.num_rows() {
            return Err(TaskError::DatasetInconsistent(format!(
                "replacement for {} has {} rows, table has {}",
                field.name,
                column.len(),
                self.num_rows()
            )));
        }
        if field.data_type != column.data_type() {
            return Err(TaskError::DatasetInconsistent(format!(
                "field {} declared {} for a {} column",
                field.name,
                field.data_type,
                column.data_type()
            )));
        }
        self.fields[index] = field;
        self.columns[index] = column;
        Ok(())
    }

    /// Writes the table as CSV, creating parent directories as needed.
    pub fn write(&self, path: impl AsRef<Path>) -> Result<(), TaskError> {
        let path = path.as_ref();
        let persist_err = |e: &dyn fmt::Display| {
            TaskError::Persist(format!("writing {}: {e}", path.display()))
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| persist_err(&e))?;
        }
        let mut writer = csv::Writer::from_path(path).map_err(|e| persist_err(&e))?;
        writer
            .write_record(self.fields.iter().map(|f| f.name.as_str()))
            .map_err(|e| persist_err(&e))?;
        for row in 0..self.num_rows() {
            writer
                .write_record(self.columns.iter().map(|c| c.render(row)))
                .map_err(|e| persist_err(&e))?;
        }
        writer.flush().map_err(|e| persist_err(&e))
    }
}
