mod buffer;
mod buffer_pool;
mod compression;
pub mod conn;
pub mod constant;
pub mod error;
pub mod handler;
mod io;
mod opts;
mod pool;
mod prepared;
pub mod protocol;
pub mod raw;
pub mod ref_row;
mod row;
mod row_collector;
mod statement_cache;
mod stream;
mod transaction;

pub use buffer::BufferSet;
pub use buffer_pool::{BufferPool, GLOBAL_BUFFER_POOL};
pub use conn::{Connection, ConnectionState, PreparedStatementHandle};
pub use handler::{DropHandler, FirstRowHandler};
pub use opts::{ConnectOptions, OnConnectFuture, OnConnectHook, PoolOptions};
pub use pool::{Pool, PoolSnapshot, PoolStats, PooledConn};
pub use prepared::PreparedStatement;
pub use raw::{FromRawRow, FromRawValue};
pub use ref_row::{FixedWireSize, RefFromRow};
pub use row::{ColumnIndex, FromValue, Row, Value};
pub use row_collector::RowCollector;
pub use statement_cache::StatementCache;
pub use stream::{RowStream, StreamSummary};
pub use transaction::{IsolationLevel, Transaction, TransactionOptions};
