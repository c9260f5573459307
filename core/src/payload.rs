//! Delimited payload reader for data operations.
//!
//! Payload rows are UTF-8 text, one row per line, values separated by `|`
//! in the live table's column order. An empty value is NULL; blank lines
//! are ignored and trailing `\r` is stripped.

use crate::error::Result;

/// Field separator within a payload row.
pub const DELIMITER: char = '|';

/// One payload row; `None` stands for NULL.
pub type Row = Vec<Option<String>>;

/// Reads all rows of a payload.
///
/// # Examples
///
/// ```
/// use schema_sync_core::read_rows;
///
/// let rows = read_rows(b"1|Alice|\r\n\n2|Bob|bob@example.com\n").unwrap();
/// assert_eq!(rows.len(), 2);
/// assert_eq!(rows[0], vec![Some("1".to_string()), Some("Alice".to_string()), None]);
/// ```
pub fn read_rows(payload: &[u8]) -> Result<Vec<Row>> {
    let text = std::str::from_utf8(payload)?;
    Ok(text
        .lines()
        .map(|line| line.trim_end_matches('\r'))
        .filter(|line| !line.trim().is_empty())
        .map(split_row)
        .collect())
}

fn split_row(line: &str) -> Row {
    line.split(DELIMITER)
        .map(|value| (!value.is_empty()).then(|| value.to_string()))
        .collect()
}

/// Parsed payload of a delete operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeletePayload {
    /// The `*` sentinel: delete every row.
    All,
    /// Primary key values to delete, one per payload row.
    Keys(Vec<String>),
}

impl DeletePayload {
    /// Parses a delete payload.
    ///
    /// The payload means "delete all" when its first non-blank line is `*`.
    /// Otherwise the first value of each row is taken as a key; rows whose
    /// first value is empty are skipped.
    ///
    /// # Examples
    ///
    /// ```
    /// use schema_sync_core::DeletePayload;
    ///
    /// assert_eq!(DeletePayload::parse(b" * \n").unwrap(), DeletePayload::All);
    /// assert_eq!(
    ///     DeletePayload::parse(b"7|ignored\n9\n").unwrap(),
    ///     DeletePayload::Keys(vec!["7".to_string(), "9".to_string()])
    /// );
    /// ```
    pub fn parse(payload: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(payload)?;
        let first = text.lines().map(str::trim).find(|line| !line.is_empty());
        if first == Some("*") {
            return Ok(Self::All);
        }
        let keys = read_rows(payload)?
            .into_iter()
            .filter_map(|row| row.into_iter().next().flatten())
            .collect();
        Ok(Self::Keys(keys))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ParseError;

    #[test]
    fn test_read_rows_keeps_trailing_nulls() {
        let rows = read_rows(b"a||\n").unwrap();
        assert_eq!(rows, vec![vec![Some("a".to_string()), None, None]]);
    }

    #[test]
    fn test_read_rows_empty_payload() {
        assert!(read_rows(b"").unwrap().is_empty());
        assert!(read_rows(b"\n\r\n  \n").unwrap().is_empty());
    }

    #[test]
    fn test_read_rows_rejects_invalid_utf8() {
        assert!(matches!(
            read_rows(&[0xff, 0xfe]),
            Err(ParseError::Encoding(_))
        ));
    }

    #[test]
    fn test_delete_payload_skips_rows_without_key() {
        assert_eq!(
            DeletePayload::parse(b"|x\n3\n").unwrap(),
            DeletePayload::Keys(vec!["3".to_string()])
        );
    }

    #[test]
    fn test_delete_payload_star_only_counts_on_first_line() {
        assert_eq!(
            DeletePayload::parse(b"4\n*\n").unwrap(),
            DeletePayload::Keys(vec!["4".to_string(), "*".to_string()])
        );
    }
}
