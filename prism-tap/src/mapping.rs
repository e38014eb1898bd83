//! Logical field name ↔ physical document path aliasing.
//!
//! A mapping is declared as `logical:physical` pairs separated by `;` or `,`:
//!
//! ```text
//! address:url, artist:meta.name
//! ```
//!
//! Both sides must be unique. The table is immutable once built and is shared
//! by reference across every decode call of a session.

use std::collections::HashMap;
use std::fmt;

use crate::error::{Result, TapError};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldMapping {
    entries: Vec<(String, String)>,
    by_logical: HashMap<String, usize>,
    by_physical: HashMap<String, usize>,
}

impl FieldMapping {
    /// An empty table: every name resolves to itself.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Parse `logical:physical` pairs separated by `;` or `,`.
    pub fn parse(spec: &str) -> Result<Self> {
        let mut pairs = Vec::new();
        for raw in spec.split([';', ',']) {
            let entry = raw.trim();
            if entry.is_empty() {
                continue;
            }
            let (logical, physical) = entry.split_once(':').ok_or_else(|| {
                TapError::config(format!(
                    "malformed mapping entry '{}', expected logical:physical",
                    entry
                ))
            })?;
            pairs.push((logical.trim().to_string(), physical.trim().to_string()));
        }
        Self::from_pairs(pairs)
    }

    pub fn from_pairs<I, L, P>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (L, P)>,
        L: Into<String>,
        P: Into<String>,
    {
        let mut mapping = Self::default();
        for (logical, physical) in pairs {
            let logical = logical.into();
            let physical = physical.into();

            if logical.is_empty() || physical.is_empty() {
                return Err(TapError::config(format!(
                    "malformed mapping entry '{}:{}', both sides must be non-empty",
                    logical, physical
                )));
            }
            if mapping.by_logical.contains_key(&logical) {
                return Err(TapError::config(format!(
                    "duplicate logical name '{}' in field mapping",
                    logical
                )));
            }
            if let Some(&idx) = mapping.by_physical.get(&physical) {
                return Err(TapError::config(format!(
                    "ambiguous field mapping: '{}' and '{}' both map to '{}'",
                    mapping.entries[idx].0, logical, physical
                )));
            }

            let idx = mapping.entries.len();
            mapping.by_logical.insert(logical.clone(), idx);
            mapping.by_physical.insert(physical.clone(), idx);
            mapping.entries.push((logical, physical));
        }
        Ok(mapping)
    }

    /// Physical path registered for `logical`.
    pub fn resolve(&self, logical: &str) -> Result<&str> {
        self.by_logical
            .get(logical)
            .map(|&idx| self.entries[idx].1.as_str())
            .ok_or_else(|| TapError::UnmappedField(logical.to_string()))
    }

    /// Physical path for `logical`, or `logical` itself when it is unmapped.
    pub fn resolve_or_literal<'a>(&'a self, logical: &'a str) -> &'a str {
        match self.by_logical.get(logical) {
            Some(&idx) => &self.entries[idx].1,
            None => logical,
        }
    }

    /// Logical name registered for `physical`, identity when unmapped.
    pub fn reverse<'a>(&'a self, physical: &'a str) -> &'a str {
        match self.by_physical.get(physical) {
            Some(&idx) => &self.entries[idx].0,
            None => physical,
        }
    }

    pub fn contains_logical(&self, logical: &str) -> bool {
        self.by_logical.contains_key(logical)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in declaration order as `(logical, physical)`.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(l, p)| (l.as_str(), p.as_str()))
    }
}

impl fmt::Display for FieldMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (logical, physical)) in self.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{}:{}", logical, physical)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_resolve() {
        let mapping = FieldMapping::parse("address:url; artist : meta.name").unwrap();
        assert_eq!(mapping.len(), 2);
        assert_eq!(mapping.resolve("address").unwrap(), "url");
        assert_eq!(mapping.resolve("artist").unwrap(), "meta.name");
        assert_eq!(mapping.reverse("meta.name"), "artist");
    }

    #[test]
    fn test_comma_separator_and_empty_entries() {
        let mapping = FieldMapping::parse("a:x,,b:y;").unwrap();
        assert_eq!(mapping.to_string(), "a:x,b:y");
    }

    #[test]
    fn test_unmapped() {
        let mapping = FieldMapping::parse("address:url").unwrap();
        assert!(matches!(
            mapping.resolve("name"),
            Err(TapError::UnmappedField(ref n)) if n == "name"
        ));
        assert_eq!(mapping.resolve_or_literal("name"), "name");
        assert_eq!(mapping.reverse("name"), "name");
    }

    #[test]
    fn test_malformed_entry() {
        let err = FieldMapping::parse("address").unwrap_err();
        assert!(matches!(err, TapError::Config(_)));

        let err = FieldMapping::parse("address:").unwrap_err();
        assert!(matches!(err, TapError::Config(_)));
    }

    #[test]
    fn test_duplicate_logical() {
        let err = FieldMapping::parse("a:x,a:y").unwrap_err();
        assert!(err.to_string().contains("duplicate logical name 'a'"));
    }

    #[test]
    fn test_ambiguous_physical() {
        let err = FieldMapping::parse("a:x,b:x").unwrap_err();
        assert!(err.to_string().contains("ambiguous"));
    }

    #[test]
    fn test_empty_table() {
        let mapping = FieldMapping::parse("  ").unwrap();
        assert!(mapping.is_empty());
        assert_eq!(mapping, FieldMapping::empty());
    }
}
