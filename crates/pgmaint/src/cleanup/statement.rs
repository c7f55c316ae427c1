use crate::ident::quote_identifier;
use crate::spec::TableSpec;

/// The DELETE issued for every batch of one table.
///
/// Rows are picked by `ctid` through an ordered subquery, oldest first, so
/// a bounded batch never relies on `DELETE ... LIMIT`. `$1` is the cutoff and
/// `$2`, present only in bounded mode, is the batch size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteStatement {
    table: String,
    column: String,
    sql: String,
    limit: Option<i64>,
}

impl DeleteStatement {
    pub fn new(spec: &TableSpec, batch_size: u32) -> Self {
        let table = quote_identifier(spec.table_name());
        let column = quote_identifier(spec.timestamp_column());
        let limit = (batch_size > 0).then_some(i64::from(batch_size));

        let mut subquery =
            format!("SELECT ctid FROM {table} WHERE {column} < $1 ORDER BY {column} ASC");
        if limit.is_some() {
            subquery.push_str(" LIMIT $2");
        }

        Self {
            table: spec.table_name().to_string(),
            column: spec.timestamp_column().to_string(),
            sql: format!("DELETE FROM {table} WHERE ctid IN ({subquery})"),
            limit,
        }
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Batch size bound as `$2`; `None` deletes every qualifying row at once.
    pub fn limit(&self) -> Option<i64> {
        self.limit
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn column(&self) -> &str {
        &self.column
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounded_statement_limits_the_subquery() {
        let spec = TableSpec::parse("dev:ts:7").unwrap();
        let stmt = DeleteStatement::new(&spec, 500);
        assert_eq!(
            stmt.sql(),
            r#"DELETE FROM "dev" WHERE ctid IN (SELECT ctid FROM "dev" WHERE "ts" < $1 ORDER BY "ts" ASC LIMIT $2)"#
        );
        assert_eq!(stmt.limit(), Some(500));
    }

    #[test]
    fn unbounded_statement_binds_only_the_cutoff() {
        let spec = TableSpec::parse("dev").unwrap();
        let stmt = DeleteStatement::new(&spec, 0);
        assert_eq!(
            stmt.sql(),
            r#"DELETE FROM "dev" WHERE ctid IN (SELECT ctid FROM "dev" WHERE "created_at" < $1 ORDER BY "created_at" ASC)"#
        );
        assert!(!stmt.sql().contains("$2"));
        assert_eq!(stmt.limit(), None);
        assert_eq!(stmt.table(), "dev");
        assert_eq!(stmt.column(), "created_at");
    }
}
