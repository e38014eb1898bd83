//! Cell and tuple types produced by the decoder.

use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};
use std::fmt;

/// A scalar leaf value, keeping its native JSON type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    String(String),
    Number(Number),
    Bool(bool),
}

/// One tuple cell.
///
/// Nested objects and arrays are kept as [`Cell::Structured`] so downstream
/// operators can still inspect them.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Cell {
    #[default]
    Null,
    Scalar(Scalar),
    Structured(Value),
}

impl Cell {
    pub fn is_null(&self) -> bool {
        matches!(self, Cell::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Cell::Scalar(Scalar::String(s)) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Cell::Scalar(Scalar::Number(n)) => n.as_i64(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Cell::Scalar(Scalar::Number(n)) => n.as_f64(),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Cell::Scalar(Scalar::Bool(b)) => Some(*b),
            _ => None,
        }
    }

    pub fn as_structured(&self) -> Option<&Value> {
        match self {
            Cell::Structured(v) => Some(v),
            _ => None,
        }
    }

    /// Convert back into a JSON value.
    pub fn to_json(&self) -> Value {
        match self {
            Cell::Null => Value::Null,
            Cell::Scalar(Scalar::String(s)) => Value::String(s.clone()),
            Cell::Scalar(Scalar::Number(n)) => Value::Number(n.clone()),
            Cell::Scalar(Scalar::Bool(b)) => Value::Bool(*b),
            Cell::Structured(v) => v.clone(),
        }
    }
}

impl From<&Value> for Cell {
    fn from(value: &Value) -> Self {
        match value {
            Value::Null => Cell::Null,
            Value::String(s) => Cell::Scalar(Scalar::String(s.clone())),
            Value::Number(n) => Cell::Scalar(Scalar::Number(n.clone())),
            Value::Bool(b) => Cell::Scalar(Scalar::Bool(*b)),
            Value::Array(_) | Value::Object(_) => Cell::Structured(value.clone()),
        }
    }
}

impl From<&str> for Cell {
    fn from(s: &str) -> Self {
        Cell::Scalar(Scalar::String(s.to_string()))
    }
}

impl From<i64> for Cell {
    fn from(n: i64) -> Self {
        Cell::Scalar(Scalar::Number(n.into()))
    }
}

impl From<bool> for Cell {
    fn from(b: bool) -> Self {
        Cell::Scalar(Scalar::Bool(b))
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Null => Ok(()),
            Cell::Scalar(Scalar::String(s)) => write!(f, "{}", s),
            Cell::Scalar(Scalar::Number(n)) => write!(f, "{}", n),
            Cell::Scalar(Scalar::Bool(b)) => write!(f, "{}", b),
            Cell::Structured(v) => write!(f, "{}", v),
        }
    }
}

/// An ordered, fixed-arity record.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Tuple {
    cells: Vec<Cell>,
}

impl Tuple {
    pub fn new(cells: Vec<Cell>) -> Self {
        Self { cells }
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn get(&self, pos: usize) -> Option<&Cell> {
        self.cells.get(pos)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Cell> {
        self.cells.iter()
    }

    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    /// True when no cell is null
    pub fn is_complete(&self) -> bool {
        self.cells.iter().all(|c| !c.is_null())
    }

    pub fn to_json(&self) -> Value {
        Value::Array(self.cells.iter().map(Cell::to_json).collect())
    }
}

impl From<Vec<Cell>> for Tuple {
    fn from(cells: Vec<Cell>) -> Self {
        Self::new(cells)
    }
}

impl IntoIterator for Tuple {
    type Item = Cell;
    type IntoIter = std::vec::IntoIter<Cell>;

    fn into_iter(self) -> Self::IntoIter {
        self.cells.into_iter()
    }
}

/// Tab-separated text line, nulls rendered empty.
impl fmt::Display for Tuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, cell) in self.cells.iter().enumerate() {
            if i > 0 {
                f.write_str("\t")?;
            }
            write!(f, "{}", cell)?;
        }
        Ok(())
    }
}
