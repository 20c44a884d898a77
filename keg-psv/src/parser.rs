//! PSV document parser

use crate::document::PsvDocument;
use crate::error::{Error, Result};
use crate::schema::PsvSchema;

const SEQN_PREFIX: &str = "## seqn = ";

/// Parse a complete PSV document.
///
/// Lines starting with `#` are comments, except `## seqn = <integer>` which
/// sets the document's sequence number. The first non-comment line is the
/// header. Data rows are positional and must match the header width.
pub fn parse(content: &str) -> Result<PsvDocument> {
    let mut doc: Option<PsvDocument> = None;
    let mut row_index = 0usize;

    for line in content.lines() {
        if line.is_empty() {
            continue;
        }

        if line.starts_with('#') {
            if let Some(rest) = line.strip_prefix(SEQN_PREFIX) {
                let seqn = rest
                    .trim()
                    .parse::<u32>()
                    .map_err(|_| Error::InvalidSequenceNumber {
                        line: line.to_string(),
                    })?;

                let doc = doc.get_or_insert_with(|| PsvDocument::new(PsvSchema::default()));
                if doc.sequence_number().is_some() {
                    return Err(Error::DuplicateSequenceNumber {
                        line: line.to_string(),
                    });
                }
                doc.set_sequence_number(seqn);
            }
            continue;
        }

        match &mut doc {
            None => {
                doc = Some(PsvDocument::new(PsvSchema::parse_header(line)?));
            }
            Some(doc) if doc.schema().field_count() == 0 => {
                // A seqn line preceded the header.
                let seqn = doc.sequence_number();
                let mut fresh = PsvDocument::new(PsvSchema::parse_header(line)?);
                if let Some(seqn) = seqn {
                    fresh.set_sequence_number(seqn);
                }
                *doc = fresh;
            }
            Some(doc) => {
                let values: Vec<String> = line.split('|').map(str::to_string).collect();
                if values.len() != doc.schema().field_count() {
                    return Err(Error::SchemaMismatch {
                        row: row_index,
                        expected: doc.schema().field_count(),
                        actual: values.len(),
                    });
                }
                doc.push_row(values);
                row_index += 1;
            }
        }
    }

    doc.filter(|d| d.schema().field_count() > 0)
        .ok_or(Error::EmptyDocument)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_basic() {
        let doc = parse("Region!STRING:0|BuildId!DEC:4\nus|1234\neu|5678").unwrap();
        assert_eq!(doc.row_count(), 2);
        assert_eq!(doc.sequence_number(), None);
    }

    #[test]
    fn test_comments_skipped() {
        let doc = parse("# preamble\nRegion!STRING:0\n# mid comment\nus\n").unwrap();
        assert_eq!(doc.row_count(), 1);
    }

    #[test]
    fn test_seqn_before_header() {
        let doc = parse("## seqn = 7\nRegion!STRING:0\nus\n").unwrap();
        assert_eq!(doc.sequence_number(), Some(7));
        assert_eq!(doc.row_count(), 1);
    }

    #[test]
    fn test_duplicate_seqn() {
        let result = parse("Region!STRING:0\n## seqn = 1\n## seqn = 2\nus\n");
        assert!(matches!(
            result,
            Err(Error::DuplicateSequenceNumber { .. })
        ));
    }

    #[test]
    fn test_invalid_seqn() {
        let result = parse("Region!STRING:0\n## seqn = abc\nus\n");
        assert!(matches!(result, Err(Error::InvalidSequenceNumber { .. })));
    }

    #[test]
    fn test_empty_document() {
        assert!(matches!(parse(""), Err(Error::EmptyDocument)));
        assert!(matches!(parse("# only comments\n"), Err(Error::EmptyDocument)));
    }

    #[test]
    fn test_schema_mismatch() {
        let result = parse("A!STRING:0|B!STRING:0\nx|y|z\n");
        assert!(matches!(result, Err(Error::SchemaMismatch { .. })));
    }

    #[test]
    fn test_empty_values_preserved() {
        let doc = parse("A!STRING:0|B!STRING:0|C!STRING:0\na||c\n|b|\n").unwrap();
        assert_eq!(doc.rows()[0].values(), &["a", "", "c"]);
        assert_eq!(doc.rows()[1].values(), &["", "b", ""]);
    }
}
