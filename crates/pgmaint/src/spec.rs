use std::fmt;
use std::str::FromStr;

use crate::error::{MaintenanceError, Result};
use crate::ident::is_valid_identifier;

pub const DEFAULT_TIMESTAMP_COLUMN: &str = "created_at";
pub const SEGMENT_DELIMITER: char = ':';

/// One cleanup target: `table[:timestamp_column[:retention_days]]`.
///
/// Both identifiers are validated on construction and may be spliced into
/// SQL text downstream without re-checking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSpec {
    table_name: String,
    timestamp_column: String,
    retention_days: u32,
}

impl TableSpec {
    pub fn parse(raw: &str) -> Result<Self> {
        let parts: Vec<&str> = raw.split(SEGMENT_DELIMITER).collect();
        if parts.len() > 3 {
            return Err(MaintenanceError::invalid_spec(
                raw,
                format!("expected at most 3 segments, got {}", parts.len()),
            ));
        }

        let table_name = parts[0];
        if table_name.is_empty() {
            return Err(MaintenanceError::invalid_spec(raw, "table name is empty"));
        }
        if !is_valid_identifier(table_name) {
            return Err(MaintenanceError::invalid_spec(
                raw,
                format!("invalid table name {table_name:?}"),
            ));
        }

        let timestamp_column = match parts.get(1).filter(|s| !s.is_empty()) {
            Some(col) if is_valid_identifier(col) => col.to_string(),
            Some(col) => {
                return Err(MaintenanceError::invalid_spec(
                    raw,
                    format!("invalid timestamp column {col:?}"),
                ))
            }
            None => DEFAULT_TIMESTAMP_COLUMN.to_string(),
        };

        let retention_days = match parts.get(2).filter(|s| !s.is_empty()) {
            Some(days) => parse_days(days).ok_or_else(|| {
                MaintenanceError::invalid_spec(raw, format!("invalid days {days:?}"))
            })?,
            None => 0,
        };

        Ok(Self {
            table_name: table_name.to_string(),
            timestamp_column,
            retention_days,
        })
    }

    /// Parse every spec, stopping at the first bad one.
    pub fn parse_all<I, S>(raws: I) -> Result<Vec<Self>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        raws.into_iter().map(|raw| Self::parse(raw.as_ref())).collect()
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    pub fn timestamp_column(&self) -> &str {
        &self.timestamp_column
    }

    pub fn retention_days(&self) -> u32 {
        self.retention_days
    }
}

// `u32::from_str` tolerates a leading '+', which the grammar does not.
fn parse_days(s: &str) -> Option<u32> {
    if !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

impl FromStr for TableSpec {
    type Err = MaintenanceError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for TableSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}",
            self.table_name, self.timestamp_column, self.retention_days
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn spec(raw: &str) -> TableSpec {
        TableSpec::parse(raw).unwrap()
    }

    #[test]
    fn defaults_fill_missing_segments() {
        let t = spec("t");
        assert_eq!(t.table_name(), "t");
        assert_eq!(t.timestamp_column(), "created_at");
        assert_eq!(t.retention_days(), 0);

        let t = spec("t:c");
        assert_eq!(t.timestamp_column(), "c");
        assert_eq!(t.retention_days(), 0);

        let t = spec("t:c:5");
        assert_eq!(t.timestamp_column(), "c");
        assert_eq!(t.retention_days(), 5);

        let t = spec("t::5");
        assert_eq!(t.timestamp_column(), "created_at");
        assert_eq!(t.retention_days(), 5);
    }

    #[test]
    fn empty_optional_segments_mean_default() {
        assert_eq!(spec("t:"), spec("t"));
        assert_eq!(spec("t::"), spec("t"));
        assert_eq!(spec("t:c:"), spec("t:c"));
    }

    #[test]
    fn rejects_malformed_specs() {
        for raw in [
            "",
            "::5",
            ":c:5",
            "t:c:-1",
            "t:c:+1",
            "t:c:five",
            "t:c:1.5",
            "t:c:99999999999",
            "t:c:5:extra",
            "bad name",
            "t:bad col",
            "public.t",
            "t;drop table x",
        ] {
            let err = TableSpec::parse(raw).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Config, "{raw:?}");
        }
    }

    #[test]
    fn error_names_the_offending_spec() {
        let err = TableSpec::parse("events:ts col:3").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("events:ts col:3"), "{msg}");
        assert!(msg.contains("ts col"), "{msg}");
    }

    #[test]
    fn parse_all_fails_on_first_bad_spec() {
        let ok = TableSpec::parse_all(["a", "b:ts:3"]).unwrap();
        assert_eq!(ok.len(), 2);
        assert_eq!(ok[1].to_string(), "b:ts:3");

        assert!(TableSpec::parse_all(["a", "bad name", "c"]).is_err());
    }

    #[test]
    fn from_str_matches_parse() {
        let t: TableSpec = "dev:updated_at:7".parse().unwrap();
        assert_eq!(t, spec("dev:updated_at:7"));
    }
}
