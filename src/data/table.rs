use crate::error::{ExtractionError, StoreError};

/// Header plus string rows, as read from a CSV block.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RawTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl RawTable {
    /// Parses CSV text with the first record as header.
    ///
    /// Header names are trimmed. Any record whose width differs from the
    /// header fails with `MalformedTable`.
    pub fn parse_csv(text: &str) -> Result<Self, ExtractionError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(text.as_bytes());

        let headers: Vec<String> = reader
            .headers()
            .map_err(|e| ExtractionError::UnreadableTable(e.to_string()))?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();

        if headers.iter().all(|h| h.is_empty()) {
            return Err(ExtractionError::MissingHeader);
        }

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record.map_err(|e| ExtractionError::UnreadableTable(e.to_string()))?;
            if record.len() != headers.len() {
                let line = record.position().map(|p| p.line()).unwrap_or(0);
                return Err(ExtractionError::MalformedTable {
                    line,
                    expected: headers.len(),
                    found: record.len(),
                });
            }
            rows.push(record.iter().map(str::to_string).collect());
        }

        Ok(Self { headers, rows })
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn to_csv(&self) -> Result<String, StoreError> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record(&self.headers)?;
        for row in &self.rows {
            writer.write_record(row)?;
        }
        let bytes = writer
            .into_inner()
            .map_err(|e| StoreError::Csv(e.into_error().into()))?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_names_are_trimmed() {
        let table = RawTable::parse_csv(" a , b ,c\n1,2,3\n").unwrap();
        assert_eq!(table.headers, vec!["a", "b", "c"]);
        assert_eq!(table.rows, vec![vec!["1", "2", "3"]]);
    }

    #[test]
    fn quoted_fields_keep_commas_and_quotes() {
        let csv = "id,steps\n\"TC001\",\"Click the \"\"Submit\"\" button, then wait\"\n";
        let table = RawTable::parse_csv(csv).unwrap();
        assert_eq!(table.rows[0][1], "Click the \"Submit\" button, then wait");
    }

    #[test]
    fn width_mismatch_is_malformed() {
        let err = RawTable::parse_csv("a,b\n1,2\n3,4,5\n").unwrap_err();
        match err {
            ExtractionError::MalformedTable { line, expected, found } => {
                assert_eq!(line, 3);
                assert_eq!(expected, 2);
                assert_eq!(found, 3);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn empty_text_has_no_header() {
        assert!(matches!(
            RawTable::parse_csv(""),
            Err(ExtractionError::MissingHeader)
        ));
    }

    #[test]
    fn csv_output_reads_back() {
        let table = RawTable {
            headers: vec!["x".into(), "y".into()],
            rows: vec![vec!["a, b".into(), "line1\nline2".into()]],
        };
        let text = table.to_csv().unwrap();
        assert_eq!(RawTable::parse_csv(&text).unwrap(), table);
    }
}
