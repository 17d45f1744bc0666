use crate::table::{Column, ColumnData, TableError};

/// Coarse type tag from a `dtypes` entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DType {
    /// `int`: nullable 64-bit integer.
    Int,
    /// `float`: nullable 64-bit float.
    Float,
    /// Any other tag, including `str`.
    Text,
}

impl DType {
    pub fn from_tag(tag: &str) -> DType {
        match tag {
            "int" => DType::Int,
            "float" => DType::Float,
            _ => DType::Text,
        }
    }
}

pub(super) fn cast_column(column: &mut Column, dtype: DType) -> Result<(), TableError> {
    let data = match (&column.data, dtype) {
        (ColumnData::Text(values), DType::Int) => ColumnData::Int(cast_each(&column.name, values, "int", parse_int)?),
        (ColumnData::Text(values), DType::Float) => {
            ColumnData::Float(cast_each(&column.name, values, "float", parse_float)?)
        }
        (ColumnData::Int(values), DType::Float) => ColumnData::Float(values.iter().map(|v| v.map(|n| n as f64)).collect()),
        _ => return Ok(()),
    };
    column.data = data;
    Ok(())
}

fn cast_each<T>(
    column: &str,
    values: &[Option<String>],
    dtype: &'static str,
    parse: fn(&str) -> Option<T>,
) -> Result<Vec<Option<T>>, TableError> {
    values
        .iter()
        .enumerate()
        .map(|(row, value)| match value.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(text) => parse(text).map(Some).ok_or_else(|| TableError::Cast {
                column: column.to_string(),
                row: row + 1,
                value: text.to_string(),
                dtype,
            }),
        })
        .collect()
}

/// Integers, plus integral float text such as `3.0`.
fn parse_int(text: &str) -> Option<i64> {
    if let Ok(n) = text.parse::<i64>() {
        return Some(n);
    }
    let x = text.parse::<f64>().ok()?;
    (x.is_finite() && x.fract() == 0.0 && x.abs() < i64::MAX as f64).then_some(x as i64)
}

fn parse_float(text: &str) -> Option<f64> {
    text.parse::<f64>().ok()
}
