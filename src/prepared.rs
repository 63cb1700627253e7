use crate::protocol::command::ColumnDefinition;
use crate::protocol::command::ColumnDefinitions;

/// A server-side prepared statement.
///
/// Holds the statement ID returned by `COM_STMT_PREPARE` along with the
/// parameter/column counts reported at prepare time. Column metadata for the
/// result set is filled in lazily: MariaDB's `MARIADB_CLIENT_CACHE_METADATA`
/// capability lets the server omit column definitions on subsequent
/// `COM_STMT_EXECUTE` calls once they have already been sent once, so the
/// first resultset received caches them here for reuse.
pub struct PreparedStatement {
    id: u32,
    num_params: u16,
    num_columns: u16,
    /// Identity of the connection this statement was prepared on. Used to
    /// detect a statement being executed against the wrong connection (the
    /// pool hands out distinct connections per acquire, and statement IDs
    /// are not portable across them) and to route `COM_STMT_CLOSE` on drop.
    connection_id: u64,
    /// Cache populated by the first resultset's column metadata, reused on
    /// later executes when the server elides it (see
    /// [`ColumnDefinitions`]/`MARIADB_CLIENT_CACHE_METADATA`).
    column_definitions: Option<ColumnDefinitions>,
}

impl PreparedStatement {
    pub fn new(id: u32, num_params: u16, num_columns: u16, connection_id: u64) -> Self {
        Self {
            id,
            num_params,
            num_columns,
            connection_id,
            column_definitions: None,
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn num_params(&self) -> u16 {
        self.num_params
    }

    pub fn num_columns(&self) -> u16 {
        self.num_columns
    }

    pub fn connection_id(&self) -> u64 {
        self.connection_id
    }

    pub fn column_definitions(&self) -> Option<&[ColumnDefinition<'_>]> {
        self.column_definitions.as_ref().map(ColumnDefinitions::definitions)
    }

    pub fn set_column_definitions(&mut self, defs: ColumnDefinitions) {
        self.column_definitions = Some(defs);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn caches_column_definitions_once_set() {
        let stmt = PreparedStatement::new(7, 2, 0, 1);
        assert_eq!(stmt.id(), 7);
        assert_eq!(stmt.num_params(), 2);
        assert!(stmt.column_definitions().is_none());
    }
}
