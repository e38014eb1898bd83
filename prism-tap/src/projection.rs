//! Ordered tuple schema.
//!
//! A projection is either declared up front or left empty, in which case it
//! is fixed exactly once from the first document of the session. Later
//! documents never change the shape of the tuples.

use std::collections::HashSet;

use crate::decoder::Document;
use crate::error::{Result, TapError};
use crate::mapping::FieldMapping;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
    Declared,
    Pending,
    Inferred,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Projection {
    columns: Vec<String>,
    origin: Origin,
}

impl Projection {
    /// A projection with a fixed column list.
    ///
    /// An empty list is the same as [`Projection::infer_from_first`].
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let columns: Vec<String> = columns.into_iter().map(Into::into).collect();
        let origin = if columns.is_empty() {
            Origin::Pending
        } else {
            Origin::Declared
        };
        Self { columns, origin }
    }

    /// An empty projection whose columns come from the first document.
    pub fn infer_from_first() -> Self {
        Self {
            columns: Vec::new(),
            origin: Origin::Pending,
        }
    }

    /// Parse a comma-separated column list. Blank input means "infer".
    pub fn parse(list: &str) -> Self {
        Self::new(
            list.split(',')
                .map(str::trim)
                .filter(|c| !c.is_empty()),
        )
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// True until [`Projection::infer`] ran on a projection built empty
    pub fn needs_inference(&self) -> bool {
        self.origin == Origin::Pending
    }

    pub fn is_inferred(&self) -> bool {
        self.origin == Origin::Inferred
    }

    /// Fix the columns from the top-level keys of `first`, in the document's
    /// own key order. Keys that are the physical side of a mapping entry are
    /// reported under their logical name.
    pub fn infer(&mut self, first: &Document, mapping: &FieldMapping) -> Result<()> {
        match self.origin {
            Origin::Pending => {}
            Origin::Declared => {
                return Err(TapError::illegal_state(
                    "projection was declared, nothing to infer",
                ))
            }
            Origin::Inferred => {
                return Err(TapError::illegal_state("projection already inferred"));
            }
        }

        let mut columns = Vec::new();
        for key in first.keys() {
            let column = mapping.reverse(key);
            // A key that is itself a logical name mapped elsewhere would decode
            // the other field and hide its own value
            if mapping.contains_logical(column) && mapping.resolve_or_literal(column) != key {
                return Err(TapError::config(format!(
                    "document field '{}' is shadowed by mapping entry {}:{}; declare the projection explicitly",
                    key,
                    column,
                    mapping.resolve_or_literal(column)
                )));
            }
            columns.push(column.to_string());
        }

        self.columns = columns;
        self.origin = Origin::Inferred;
        tracing::debug!(columns = ?self.columns, "Inferred projection from first document");
        Ok(())
    }

    /// Check every column resolves through `mapping` or is a usable literal
    /// path, and that no column repeats.
    pub fn validate(&self, mapping: &FieldMapping) -> Result<()> {
        let mut seen = HashSet::new();
        for column in &self.columns {
            if !seen.insert(column.as_str()) {
                return Err(TapError::config(format!(
                    "column '{}' appears more than once in projection",
                    column
                )));
            }
            let path = mapping.resolve_or_literal(column);
            if !is_valid_path(path) {
                return Err(TapError::config(format!(
                    "projection column '{}' does not resolve to a field path",
                    column
                )));
            }
        }
        Ok(())
    }

    /// Distinct top-level source fields the columns read from.
    ///
    /// `None` while the projection is still pending, since everything must be
    /// fetched to infer it.
    pub fn source_roots(&self, mapping: &FieldMapping) -> Option<Vec<String>> {
        if self.needs_inference() {
            return None;
        }
        let mut roots: Vec<String> = Vec::new();
        for column in &self.columns {
            let path = mapping.resolve_or_literal(column);
            let root = path.split('.').next().unwrap_or(path);
            if !roots.iter().any(|r| r == root) {
                roots.push(root.to_string());
            }
        }
        Some(roots)
    }
}

impl Default for Projection {
    fn default() -> Self {
        Self::infer_from_first()
    }
}

fn is_valid_path(path: &str) -> bool {
    !path.is_empty() && path.split('.').all(|segment| !segment.trim().is_empty())
}
