//! A result-set handler that decodes every row into an owned [`Row`] and
//! collects them into a `Vec`, for the `fetch_one`/`fetch_optional`/
//! `fetch_value` convenience methods on [`crate::pool::PooledConn`] and
//! [`crate::transaction::Transaction`] that don't need streaming.
//!
//! Grounded on [`crate::handler::FirstRowHandler`]'s wrapper-handler style,
//! generalized from "keep the first row" to "keep every row".

use crate::error::Result;
use crate::protocol::command::ColumnDefinition;
use crate::protocol::r#trait::{BinaryResultSetHandler, TextResultSetHandler};
use crate::protocol::response::{OkPayload, OkPayloadBytes};
use crate::protocol::{BinaryRowPayload, TextRowPayload};
use crate::row::Row;

#[derive(Default)]
pub struct RowCollector {
    pub rows: Vec<Row>,
    pub affected_rows: u64,
    pub last_insert_id: u64,
}

impl RowCollector {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&mut self, ok: OkPayloadBytes<'_>) -> Result<()> {
        let payload = OkPayload::try_from(ok)?;
        self.affected_rows = payload.affected_rows;
        self.last_insert_id = payload.last_insert_id;
        Ok(())
    }
}

impl TextResultSetHandler for RowCollector {
    fn no_result_set(&mut self, ok: OkPayloadBytes<'_>) -> Result<()> {
        self.record(ok)
    }

    fn resultset_start(&mut self, _cols: &[ColumnDefinition<'_>]) -> Result<()> {
        Ok(())
    }

    fn row(&mut self, cols: &[ColumnDefinition<'_>], row: &TextRowPayload<'_>) -> Result<()> {
        self.rows.push(Row::from_text(cols, row)?);
        Ok(())
    }

    fn resultset_end(&mut self, eof: OkPayloadBytes<'_>) -> Result<()> {
        self.record(eof)
    }
}

impl BinaryResultSetHandler for RowCollector {
    fn no_result_set(&mut self, ok: OkPayloadBytes<'_>) -> Result<()> {
        self.record(ok)
    }

    fn resultset_start(&mut self, _cols: &[ColumnDefinition<'_>]) -> Result<()> {
        Ok(())
    }

    fn row(&mut self, cols: &[ColumnDefinition<'_>], row: BinaryRowPayload<'_>) -> Result<()> {
        self.rows.push(Row::from_binary(cols, row)?);
        Ok(())
    }

    fn resultset_end(&mut self, eof: OkPayloadBytes<'_>) -> Result<()> {
        self.record(eof)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_empty() {
        let c = RowCollector::new();
        assert!(c.rows.is_empty());
        assert_eq!(c.affected_rows, 0);
    }
}
