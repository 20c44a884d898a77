//! PSV document representation

use crate::error::Result;
use crate::schema::PsvSchema;

/// A single data row. Values are stored positionally, exactly as served.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PsvRow {
    values: Vec<String>,
}

impl PsvRow {
    pub(crate) fn new(values: Vec<String>) -> Self {
        Self { values }
    }

    /// Number of values in this row.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Get a value by positional index.
    pub fn get(&self, index: usize) -> Option<&str> {
        self.values.get(index).map(String::as_str)
    }

    /// Get a value by clean column name (case-insensitive).
    pub fn get_by_name(&self, name: &str, schema: &PsvSchema) -> Option<&str> {
        schema.get_field(name).and_then(|f| self.get(f.index))
    }

    /// All values, in column order.
    pub fn values(&self) -> &[String] {
        &self.values
    }

    /// Reconstruct the PSV line for this row.
    pub fn to_psv_line(&self) -> String {
        self.values.join("|")
    }
}

/// A parsed PSV document: header schema, optional sequence number, rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PsvDocument {
    schema: PsvSchema,
    sequence_number: Option<u32>,
    rows: Vec<PsvRow>,
}

impl PsvDocument {
    pub(crate) fn new(schema: PsvSchema) -> Self {
        Self {
            schema,
            sequence_number: None,
            rows: Vec::new(),
        }
    }

    /// Parse a PSV document from string content.
    ///
    /// # Examples
    ///
    /// ```
    /// use keg_psv::PsvDocument;
    ///
    /// let content = "Region!STRING:0|BuildId!DEC:4\n## seqn = 12345\nus|1234\neu|5678";
    /// let doc = PsvDocument::parse(content)?;
    /// assert_eq!(doc.sequence_number(), Some(12345));
    /// assert_eq!(doc.rows().len(), 2);
    /// # Ok::<(), keg_psv::Error>(())
    /// ```
    pub fn parse(content: &str) -> Result<Self> {
        crate::parser::parse(content)
    }

    pub fn schema(&self) -> &PsvSchema {
        &self.schema
    }

    /// The `## seqn = N` value, if the document carried one.
    pub fn sequence_number(&self) -> Option<u32> {
        self.sequence_number
    }

    pub(crate) fn set_sequence_number(&mut self, seqn: u32) {
        self.sequence_number = Some(seqn);
    }

    pub fn rows(&self) -> &[PsvRow] {
        &self.rows
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub(crate) fn push_row(&mut self, values: Vec<String>) {
        self.rows.push(PsvRow::new(values));
    }

    /// All values of one column, in row order.
    pub fn get_column(&self, name: &str) -> Result<Vec<&str>> {
        let field = self
            .schema
            .get_field(name)
            .ok_or_else(|| crate::Error::FieldNotFound {
                field: name.to_string(),
            })?;

        Ok(self
            .rows
            .iter()
            .filter_map(|row| row.get(field.index))
            .collect())
    }

    /// Serialize the document back to PSV.
    pub fn to_psv_string(&self) -> String {
        let mut lines = vec![self.schema.to_header_line()];
        if let Some(seqn) = self.sequence_number {
            lines.push(format!("## seqn = {seqn}"));
        }
        for row in &self.rows {
            lines.push(row.to_psv_line());
        }
        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    const VERSIONS: &str = "\
Region!STRING:0|BuildConfig!HEX:16|CDNConfig!HEX:16|KeyRing!HEX:16|BuildId!DEC:4|VersionsName!String:0|ProductConfig!HEX:16
## seqn = 43
us|4eb3986466ec004ffa1755642b375a87|fb445ca0526699c61a92830ab894a985||27291|8.0.1.27291|19a26886b5b1c264de1177ae6aa7fbf5
eu|4eb3986466ec004ffa1755642b375a87|fb445ca0526699c61a92830ab894a985||27291|8.0.1.27291|19a26886b5b1c264de1177ae6aa7fbf5
";

    #[test]
    fn test_parse_versions() {
        let doc = PsvDocument::parse(VERSIONS).unwrap();

        assert_eq!(
            doc.schema().clean_names(),
            vec![
                "Region",
                "BuildConfig",
                "CDNConfig",
                "KeyRing",
                "BuildId",
                "VersionsName",
                "ProductConfig",
            ]
        );
        assert_eq!(doc.sequence_number(), Some(43));
        assert_eq!(doc.row_count(), 2);

        let row = &doc.rows()[0];
        assert_eq!(
            row.values(),
            &[
                "us",
                "4eb3986466ec004ffa1755642b375a87",
                "fb445ca0526699c61a92830ab894a985",
                "",
                "27291",
                "8.0.1.27291",
                "19a26886b5b1c264de1177ae6aa7fbf5",
            ]
        );
        assert_eq!(row.get_by_name("BuildId", doc.schema()), Some("27291"));
    }

    #[test]
    fn test_rows_match_split() {
        // Parsing must agree with a plain split on '|' of the data lines.
        let doc = PsvDocument::parse(VERSIONS).unwrap();
        let data_lines: Vec<&str> = VERSIONS
            .lines()
            .skip(1)
            .filter(|l| !l.is_empty() && !l.starts_with('#'))
            .collect();

        assert_eq!(doc.row_count(), data_lines.len());
        for (row, line) in doc.rows().iter().zip(data_lines) {
            let split: Vec<&str> = line.split('|').collect();
            assert_eq!(row.values(), &split[..]);
        }
    }

    #[test]
    fn test_get_column() {
        let doc = PsvDocument::parse(VERSIONS).unwrap();
        assert_eq!(doc.get_column("Region").unwrap(), vec!["us", "eu"]);
        assert!(matches!(
            doc.get_column("Nope"),
            Err(Error::FieldNotFound { .. })
        ));
    }

    #[test]
    fn test_to_psv_string_round_trip() {
        let doc = PsvDocument::parse(VERSIONS).unwrap();
        let reparsed = PsvDocument::parse(&doc.to_psv_string()).unwrap();
        assert_eq!(doc, reparsed);
    }
}
