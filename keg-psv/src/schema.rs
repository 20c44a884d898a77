//! PSV header schema

use crate::error::{Error, Result};
use crate::field_type::FieldType;
use std::collections::HashMap;

/// A single column in a PSV header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PsvField {
    /// Clean column name (annotation stripped)
    pub name: String,
    /// Raw header cell, e.g. `BuildConfig!HEX:16`
    pub raw: String,
    /// Type annotation, if the header carried one
    pub field_type: Option<FieldType>,
    /// Positional index in each row
    pub index: usize,
}

/// The parsed header of a PSV document.
///
/// The clean name of a column is the raw cell split on `!`, keeping the
/// prefix. Lookup by name is offered both exact and case-insensitive; the
/// latter papers over remotes that disagree on `BuildId` vs `BuildID`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PsvSchema {
    fields: Vec<PsvField>,
    by_name: HashMap<String, usize>,
}

impl PsvSchema {
    /// Parse the raw header line.
    pub fn parse_header(line: &str) -> Result<Self> {
        let mut schema = Self::default();

        for (index, raw) in line.split('|').enumerate() {
            let (name, annotation) = match raw.split_once('!') {
                Some((name, annotation)) => (name, Some(annotation)),
                None => (raw, None),
            };

            let field_type = annotation.map(FieldType::parse).transpose()?;
            let key = name.to_ascii_lowercase();
            if schema.by_name.contains_key(&key) {
                return Err(Error::DuplicateField {
                    field: name.to_string(),
                });
            }

            schema.by_name.insert(key, index);
            schema.fields.push(PsvField {
                name: name.to_string(),
                raw: raw.to_string(),
                field_type,
                index,
            });
        }

        Ok(schema)
    }

    /// Number of columns.
    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    /// All columns, in header order.
    pub fn fields(&self) -> &[PsvField] {
        &self.fields
    }

    /// Look up a column by clean name (case-insensitive).
    pub fn get_field(&self, name: &str) -> Option<&PsvField> {
        self.by_name
            .get(&name.to_ascii_lowercase())
            .map(|&i| &self.fields[i])
    }

    /// True if a column with this clean name exists.
    pub fn has_field(&self, name: &str) -> bool {
        self.by_name.contains_key(&name.to_ascii_lowercase())
    }

    /// Clean column names, in header order.
    pub fn clean_names(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.name.as_str()).collect()
    }

    /// Reconstruct the raw header line.
    pub fn to_header_line(&self) -> String {
        self.fields
            .iter()
            .map(|f| f.raw.as_str())
            .collect::<Vec<_>>()
            .join("|")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_annotated_header() {
        let schema =
            PsvSchema::parse_header("Region!STRING:0|BuildConfig!HEX:16|BuildId!DEC:4").unwrap();

        assert_eq!(schema.field_count(), 3);
        assert_eq!(
            schema.clean_names(),
            vec!["Region", "BuildConfig", "BuildId"]
        );
        assert_eq!(
            schema.get_field("BuildConfig").unwrap().field_type,
            Some(FieldType::Hex(16))
        );
    }

    #[test]
    fn test_parse_plain_header() {
        // Old remotes serve headers without annotations.
        let schema = PsvSchema::parse_header("Region|BuildConfig|CDNConfig").unwrap();
        assert_eq!(schema.field_count(), 3);
        assert!(schema.get_field("Region").unwrap().field_type.is_none());
    }

    #[test]
    fn test_case_insensitive_lookup() {
        let schema = PsvSchema::parse_header("BuildId!DEC:4").unwrap();
        assert!(schema.has_field("BuildID"));
        assert_eq!(schema.get_field("buildid").unwrap().index, 0);
    }

    #[test]
    fn test_duplicate_field() {
        let result = PsvSchema::parse_header("Region!STRING:0|Region!STRING:0");
        assert!(matches!(result, Err(Error::DuplicateField { .. })));
    }

    #[test]
    fn test_header_round_trip() {
        let line = "Region!STRING:0|BuildConfig!HEX:16|BuildId!DEC:4";
        let schema = PsvSchema::parse_header(line).unwrap();
        assert_eq!(schema.to_header_line(), line);
    }
}
