//! The connection engine: owns the socket, drives the handshake, and runs
//! commands to completion against the `Action`/`step()` state machines in
//! [`crate::protocol::command`].
//!
//! Grounded on the teacher's `tokio::conn::Conn` (same buffered reader/writer
//! split, the same `read_payload`/`write_all_vectored_async` I/O idiom,
//! re-homed in [`crate::io`]) but driven directly by `&mut self` instead of
//! held behind an actor task: since every public method takes `&mut self`,
//! Rust's borrow checker already gives the single-writer-at-a-time guarantee
//! the original's command queue existed to provide, so the FIFO queue
//! collapses into ordinary sequential `.await`s. [`crate::pool::Pool`] and
//! [`crate::transaction::Transaction`] are what hand connections out one
//! caller at a time.

use std::time::Instant;

use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tracing::{debug, instrument, warn};

use crate::buffer::BufferSet;
use crate::compression::Compressor;
use crate::constant::CapabilityFlags;
use crate::error::{Error, Result};
use crate::io as wire;
use crate::opts::ConnectOptions;
use crate::prepared::PreparedStatement;
use crate::protocol::command::prepared::{
    Exec, read_prepare_ok, write_close_statement, write_execute, write_prepare,
};
use crate::protocol::command::query::Query;
use crate::protocol::command::utility::{
    write_init_db, write_ping, write_quit, write_reset_connection,
};
use crate::protocol::command::Action;
use crate::protocol::connection::{
    AuthSwitchRequest, CachingSha2PasswordFastAuthResult, HandshakeResponse41,
    auth_caching_sha2_password, auth_mysql_native_password, read_auth_switch_request,
    read_caching_sha2_password_fast_auth_result, read_initial_handshake,
    write_auth_switch_response, write_handshake_response,
};
use crate::protocol::r#trait::{BinaryResultSetHandler, Params, TextResultSetHandler};
use crate::stream::RowStream;
use crate::protocol::response::{OkPayload, OkPayloadBytes};
use crate::statement_cache::StatementCache;

/// Lifecycle state of a connection, mirrored closely from the spec's engine
/// states. Most states are only observable for the duration of one `.await`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Handshaking,
    Authenticating,
    Ready,
    Querying,
    Preparing,
    Executing,
    Pinging,
    Resetting,
    Closed,
}

/// A single MySQL connection: socket, buffers, and negotiated session state.
pub struct Connection {
    pub(crate) reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    pub(crate) buffers: BufferSet,
    opts: ConnectOptions,
    thread_id: u32,
    state: ConnectionState,
    /// Set by [`Connection::absorb_cancellation`] after a stream cancellation
    /// dispatched `KILL QUERY`: the next command first sends `DO SLEEP(0)` to
    /// drain a stray result set the kill may have left in flight.
    pub(crate) was_query_cancelled: bool,
    pub(crate) read_compressor: Option<Compressor>,
    pub(crate) write_compressor: Option<Compressor>,
    pub(crate) statement_cache: Option<StatementCache>,
    /// Statements prepared while no statement cache is enabled; owned
    /// privately by whichever [`PreparedStatementHandle`] named them.
    pub(crate) uncached_statements: std::collections::HashMap<String, PreparedStatement>,
    /// Statement ids evicted from the cache, awaiting a `COM_STMT_CLOSE` on
    /// this connection's next command.
    pending_closes: Vec<u32>,
    created_at: Instant,
    last_used_at: Instant,
}

impl Connection {
    #[instrument(skip_all, fields(host = %opts.host, port = opts.port))]
    pub async fn connect(opts: ConnectOptions) -> Result<Self> {
        let stream = tokio::time::timeout(opts.connect_timeout, TcpStream::connect((opts.host.as_str(), opts.port)))
            .await
            .map_err(|_| Error::Timeout("connect".to_string()))??;
        stream.set_nodelay(opts.tcp_nodelay)?;
        let (read_half, write_half) = stream.into_split();
        let mut conn = Self {
            reader: BufReader::new(read_half),
            writer: write_half,
            buffers: BufferSet::new(),
            opts,
            thread_id: 0,
            state: ConnectionState::Connecting,
            was_query_cancelled: false,
            read_compressor: None,
            write_compressor: None,
            statement_cache: None,
            uncached_statements: std::collections::HashMap::new(),
            pending_closes: Vec::new(),
            created_at: Instant::now(),
            last_used_at: Instant::now(),
        };
        conn.handshake().await?;
        Ok(conn)
    }

    pub fn enable_statement_cache(&mut self, capacity: usize) {
        self.statement_cache = Some(StatementCache::new(capacity));
    }

    pub fn thread_id(&self) -> u32 {
        self.thread_id
    }

    pub fn is_closed(&self) -> bool {
        self.state == ConnectionState::Closed
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    pub fn last_used_at(&self) -> Instant {
        self.last_used_at
    }

    pub fn touch(&mut self) {
        self.last_used_at = Instant::now();
    }

    pub fn options(&self) -> &ConnectOptions {
        &self.opts
    }

    // ------------------------------------------------------------------
    // Handshake
    // ------------------------------------------------------------------

    #[instrument(skip_all)]
    async fn handshake(&mut self) -> Result<()> {
        self.state = ConnectionState::Handshaking;

        let seq = wire::read_payload(&mut self.reader, &mut self.buffers.initial_handshake).await?;
        let handshake = read_initial_handshake(&self.buffers.initial_handshake)?;
        self.thread_id = handshake.connection_id;

        let mut capabilities = self.opts.capabilities & handshake.capability_flags;
        capabilities |= CapabilityFlags::CLIENT_PROTOCOL_41;
        if self.opts.db.is_some() {
            capabilities |= CapabilityFlags::CLIENT_CONNECT_WITH_DB;
        }
        if self.opts.compress && handshake.capability_flags.contains(CapabilityFlags::CLIENT_COMPRESS) {
            capabilities |= CapabilityFlags::CLIENT_COMPRESS;
        }

        self.state = ConnectionState::Authenticating;

        let mut plugin_name = handshake.auth_plugin_name.to_vec();
        let mut auth_response = compute_auth_response(&plugin_name, &self.opts, &handshake.auth_plugin_data)?;

        let buf = self.buffers.new_write_buffer();
        let response = HandshakeResponse41 {
            capability_flags: capabilities,
            max_packet_size: 0x0100_0000,
            charset: 45, // utf8mb4_general_ci
            username: &self.opts.user,
            auth_response: &auth_response,
            database: self.opts.db.as_deref(),
            auth_plugin_name: Some(std::str::from_utf8(&plugin_name).unwrap_or("mysql_native_password")),
        };
        write_handshake_response(buf, &response);
        let payload = buf[4..].to_vec();
        wire::write_payload(&mut self.writer, seq.wrapping_add(1), &payload).await?;

        loop {
            let seq = wire::read_payload(&mut self.reader, &mut self.buffers.read_buffer).await?;
            let payload = &self.buffers.read_buffer;
            match payload.first() {
                Some(0x00) => break,
                Some(0xFF) => return Err(payload_as_err(payload)),
                Some(0xFE) => {
                    let switch: AuthSwitchRequest<'_> = read_auth_switch_request(payload)?;
                    plugin_name = switch.plugin_name.to_vec();
                    auth_response = compute_auth_response(&plugin_name, &self.opts, switch.plugin_data)?;
                    let buf = self.buffers.new_write_buffer();
                    write_auth_switch_response(buf, &auth_response);
                    let out = buf[4..].to_vec();
                    wire::write_payload(&mut self.writer, seq.wrapping_add(1), &out).await?;
                }
                Some(0x01) if plugin_name == b"caching_sha2_password" => {
                    match read_caching_sha2_password_fast_auth_result(payload)? {
                        CachingSha2PasswordFastAuthResult::Success => {
                            // server still owes us the terminal OK packet.
                        }
                        CachingSha2PasswordFastAuthResult::FullAuthRequired => {
                            return Err(Error::Unsupported(
                                "caching_sha2_password full authentication requires TLS or RSA key exchange, neither of which this client implements".to_string(),
                            ));
                        }
                    }
                }
                _ => return Err(Error::InvalidPacket),
            }
        }

        if self.opts.compress && capabilities.contains(CapabilityFlags::CLIENT_COMPRESS) {
            self.read_compressor = Some(Compressor::new());
            self.write_compressor = Some(Compressor::new());
        }

        self.state = ConnectionState::Ready;
        debug!(thread_id = self.thread_id, "handshake complete");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Commands
    // ------------------------------------------------------------------

    #[instrument(skip_all)]
    pub async fn ping(&mut self) -> Result<()> {
        self.require_ready()?;
        self.state = ConnectionState::Pinging;
        let buf = self.buffers.new_write_buffer();
        write_ping(buf);
        self.send_command().await?;
        let seq = self.read_response().await?;
        let _ = seq;
        self.expect_ok()?;
        self.state = ConnectionState::Ready;
        self.touch();
        Ok(())
    }

    /// Issues `COM_INIT_DB`, switching the session's default database.
    #[instrument(skip_all)]
    pub async fn use_db(&mut self, db: &str) -> Result<()> {
        self.require_ready()?;
        let buf = self.buffers.new_write_buffer();
        write_init_db(buf, db);
        self.send_command().await?;
        self.read_response().await?;
        self.expect_ok()?;
        self.touch();
        Ok(())
    }

    /// Issue `COM_RESET_CONNECTION`. Clears the statement cache (the server
    /// invalidates every prepared statement on reset) but leaves the session
    /// otherwise reusable.
    #[instrument(skip_all)]
    pub async fn reset(&mut self) -> Result<()> {
        self.require_ready()?;
        self.state = ConnectionState::Resetting;
        let buf = self.buffers.new_write_buffer();
        write_reset_connection(buf);
        self.send_command().await?;
        self.read_response().await?;
        self.expect_ok()?;
        if let Some(cache) = &mut self.statement_cache {
            cache.clear();
        }
        self.state = ConnectionState::Ready;
        self.touch();
        Ok(())
    }

    /// Absorbs a stray result from a `KILL QUERY` that raced the server's own
    /// completion, matching the spec's `DO SLEEP(0)` idiom.
    #[instrument(skip_all)]
    pub async fn absorb_cancellation(&mut self) -> Result<()> {
        if !self.was_query_cancelled {
            return Ok(());
        }
        self.was_query_cancelled = false;
        use crate::handler::DropHandler;
        let mut handler = DropHandler::default();
        self.query("DO SLEEP(0)", &mut handler).await
    }

    #[instrument(skip_all, fields(sql))]
    pub async fn query<H: TextResultSetHandler>(&mut self, sql: &str, handler: &mut H) -> Result<()> {
        self.require_ready()?;
        self.state = ConnectionState::Querying;
        let result = self.run_text_query(sql, handler).await;
        self.state = ConnectionState::Ready;
        self.touch();
        result
    }

    async fn run_text_query<H: TextResultSetHandler>(&mut self, sql: &str, handler: &mut H) -> Result<()> {
        use crate::protocol::command::query::write_query;
        let buf = self.buffers.new_write_buffer();
        write_query(buf, sql);
        self.send_command().await?;

        let mut machine = Query::new(handler);
        loop {
            match machine.step(&mut self.buffers)? {
                Action::NeedPacket(buf) => {
                    wire::read_payload_compressed(&mut self.reader, buf, self.read_compressor.as_mut()).await?;
                }
                Action::ReadColumnMetadata { num_columns } => {
                    self.read_column_metadata(num_columns).await?;
                }
                Action::Finished => return Ok(()),
            }
        }
    }

    /// Prepares `sql`, reusing a cached statement for this connection if the
    /// statement cache is enabled and a previous prepare of the identical SQL
    /// text is still cached.
    #[instrument(skip_all, fields(sql))]
    pub async fn prepare(&mut self, sql: &str) -> Result<PreparedStatementHandle> {
        if self.statement_cache.is_some() {
            if self.statement_cache.as_mut().unwrap().get(sql).is_some() {
                return Ok(PreparedStatementHandle { sql: sql.to_string(), cached: true });
            }
        }

        self.require_ready()?;
        self.state = ConnectionState::Preparing;
        let stmt = self.run_prepare(sql).await;
        self.state = ConnectionState::Ready;
        self.touch();
        let stmt = stmt?;

        if let Some(cache) = &mut self.statement_cache {
            let evicted_id = cache.insert(sql.to_string(), stmt);
            if let Some(evicted_id) = evicted_id {
                self.close_statement_fire_and_forget(evicted_id);
            }
            Ok(PreparedStatementHandle { sql: sql.to_string(), cached: true })
        } else {
            self.uncached_statements.insert(sql.to_string(), stmt);
            Ok(PreparedStatementHandle { sql: sql.to_string(), cached: false })
        }
    }

    async fn run_prepare(&mut self, sql: &str) -> Result<PreparedStatement> {
        let buf = self.buffers.new_write_buffer();
        write_prepare(buf, sql);
        self.send_command().await?;

        wire::read_payload_compressed(&mut self.reader, &mut self.buffers.read_buffer, self.read_compressor.as_mut()).await?;
        if self.buffers.read_buffer.first() == Some(&0xFF) {
            return Err(payload_as_err(&self.buffers.read_buffer));
        }
        let ok = read_prepare_ok(&self.buffers.read_buffer)?;
        let (id, num_params, num_columns) = (ok.statement_id(), ok.num_params(), ok.num_columns());

        if num_params > 0 {
            for _ in 0..num_params {
                wire::read_payload_compressed(&mut self.reader, &mut self.buffers.read_buffer, self.read_compressor.as_mut()).await?;
            }
        }
        if num_columns > 0 {
            for _ in 0..num_columns {
                wire::read_payload_compressed(&mut self.reader, &mut self.buffers.read_buffer, self.read_compressor.as_mut()).await?;
            }
        }

        Ok(PreparedStatement::new(id, num_params, num_columns, self.thread_id as u64))
    }

    #[instrument(skip_all)]
    pub async fn exec<H: BinaryResultSetHandler, P: Params>(
        &mut self,
        handle: &PreparedStatementHandle,
        params: P,
        handler: &mut H,
    ) -> Result<()> {
        self.require_ready()?;
        self.state = ConnectionState::Executing;
        let result = self.run_exec(handle, params, handler).await;
        self.state = ConnectionState::Ready;
        self.touch();
        result
    }

    /// Consumes the connection to stream `sql`'s rows instead of buffering
    /// the whole result set. See [`crate::stream::RowStream`]'s module docs.
    pub fn into_stream(self, sql: impl Into<String>) -> RowStream {
        RowStream::spawn_text(self, sql.into(), None)
    }

    /// Consumes the connection to stream a prepared statement's rows.
    pub fn into_stream_exec<P: Params + Send + 'static>(self, handle: PreparedStatementHandle, params: P) -> RowStream {
        RowStream::spawn_exec(self, handle, params, None)
    }

    async fn run_exec<H: BinaryResultSetHandler, P: Params>(
        &mut self,
        handle: &PreparedStatementHandle,
        params: P,
        handler: &mut H,
    ) -> Result<()> {
        // MARIADB_CLIENT_CACHE_METADATA is never negotiated, so the server
        // always sends full column metadata on every execute.
        let cache_metadata = false;
        let statement_id;
        {
            let stmt = Self::statement_mut(&mut self.statement_cache, &mut self.uncached_statements, handle)?;
            if params.len() != stmt.num_params() as usize {
                return Err(Error::ParamCountMismatch {
                    expected: stmt.num_params() as usize,
                    actual: params.len(),
                });
            }
            statement_id = stmt.id();
        }

        let buf = self.buffers.new_write_buffer();
        write_execute(buf, statement_id, params)?;
        self.send_command().await?;

        // Borrowed disjointly from `self.buffers`/`self.reader` below: both
        // `statement_cache`/`uncached_statements` and `buffers`/`reader` are
        // named directly rather than through a `&mut self` method, so the
        // borrow checker sees them as independent fields.
        let stmt = Self::statement_mut(&mut self.statement_cache, &mut self.uncached_statements, handle)?;
        let mut machine = Exec::new(handler, stmt, cache_metadata);
        loop {
            match machine.step(&mut self.buffers)? {
                Action::NeedPacket(buf) => {
                    wire::read_payload_compressed(&mut self.reader, buf, self.read_compressor.as_mut()).await?;
                }
                Action::ReadColumnMetadata { num_columns } => {
                    Self::collect_column_metadata(
                        &mut self.reader,
                        &mut self.buffers,
                        self.read_compressor.as_mut(),
                        num_columns,
                    )
                    .await?;
                }
                Action::Finished => return Ok(()),
            }
        }
    }

    pub(crate) fn statement_mut<'a>(
        statement_cache: &'a mut Option<StatementCache>,
        uncached_statements: &'a mut std::collections::HashMap<String, PreparedStatement>,
        handle: &PreparedStatementHandle,
    ) -> Result<&'a mut PreparedStatement> {
        if handle.cached {
            statement_cache
                .as_mut()
                .and_then(|c| c.get(&handle.sql))
                .ok_or(Error::StatementClosed)
        } else {
            uncached_statements.get_mut(&handle.sql).ok_or(Error::StatementClosed)
        }
    }

    /// Drops an uncached prepared statement handle, issuing `COM_STMT_CLOSE`.
    /// No-op for cached handles, which stay resident until LRU-evicted.
    #[instrument(skip_all)]
    pub async fn close_statement(&mut self, handle: PreparedStatementHandle) -> Result<()> {
        if handle.cached {
            return Ok(());
        }
        if let Some(stmt) = self.uncached_statements.remove(&handle.sql) {
            self.require_ready()?;
            let buf = self.buffers.new_write_buffer();
            write_close_statement(buf, stmt.id());
            self.send_command().await?;
            self.touch();
        }
        Ok(())
    }

    /// Defers a `COM_STMT_CLOSE` for a statement evicted from the cache; sent
    /// ahead of this connection's next command rather than inline, so a cache
    /// eviction never fails the foreground call that triggered it.
    fn close_statement_fire_and_forget(&mut self, statement_id: u32) {
        self.pending_closes.push(statement_id);
    }

    #[instrument(skip_all)]
    pub async fn close(mut self) {
        if self.state == ConnectionState::Closed {
            return;
        }
        let buf = self.buffers.new_write_buffer();
        write_quit(buf);
        let payload = buf[4..].to_vec();
        let _ = wire::write_payload(&mut self.writer, 0, &payload).await;
        let _ = self.writer.shutdown().await;
        self.state = ConnectionState::Closed;
    }

    // ------------------------------------------------------------------
    // Internal helpers
    // ------------------------------------------------------------------

    /// Marks the connection busy with a long-running streamed command. Used
    /// by [`crate::stream::RowStream`], which drives the wire protocol
    /// directly instead of going through [`Connection::query`]/[`Connection::exec`]
    /// so it can await channel backpressure between rows.
    pub(crate) fn mark_busy(&mut self, state: ConnectionState) -> Result<()> {
        self.require_ready()?;
        self.state = state;
        Ok(())
    }

    pub(crate) fn mark_ready(&mut self) {
        self.state = ConnectionState::Ready;
        self.touch();
    }

    pub(crate) fn require_ready(&self) -> Result<()> {
        match self.state {
            ConnectionState::Ready => Ok(()),
            ConnectionState::Closed => Err(Error::BadConnection("connection is closed".to_string())),
            other => Err(Error::LibraryBug(crate::error::eyre!(
                "command issued while connection is in state {other:?}"
            ))),
        }
    }

    /// Sends `self.buffers.write_buffer()`'s staged payload, first flushing
    /// any deferred `COM_STMT_CLOSE`s from cache eviction. Built into a
    /// standalone `Vec` rather than `self.buffers` so the staged command
    /// payload, already written by the caller, is never clobbered.
    pub(crate) async fn send_command(&mut self) -> Result<()> {
        for statement_id in std::mem::take(&mut self.pending_closes) {
            let mut payload = Vec::new();
            write_close_statement(&mut payload, statement_id);
            wire::write_payload_compressed(&mut self.writer, 0, &payload, self.write_compressor.as_mut()).await?;
        }

        let payload = self.buffers.write_buffer()[4..].to_vec();
        wire::write_payload_compressed(&mut self.writer, 0, &payload, self.write_compressor.as_mut()).await?;
        Ok(())
    }

    async fn read_response(&mut self) -> Result<u8> {
        wire::read_payload_compressed(&mut self.reader, &mut self.buffers.read_buffer, self.read_compressor.as_mut()).await
    }

    fn expect_ok(&self) -> Result<()> {
        match self.buffers.read_buffer.first() {
            Some(0x00) | Some(0xFE) => {
                let _ = OkPayload::try_from(OkPayloadBytes(&self.buffers.read_buffer))?;
                Ok(())
            }
            Some(0xFF) => Err(payload_as_err(&self.buffers.read_buffer)),
            _ => Err(Error::InvalidPacket),
        }
    }

    async fn read_column_metadata(&mut self, num_columns: usize) -> Result<()> {
        Self::collect_column_metadata(&mut self.reader, &mut self.buffers, self.read_compressor.as_mut(), num_columns).await
    }

    /// Reads `num_columns` consecutive column-definition packets and
    /// concatenates them into `buffers.column_definition_buffer` as
    /// `[len: u32 native][payload]...`, the format [`ColumnDefinitions::new`]
    /// expects. Takes explicit field references rather than `&mut self` so it
    /// can be called while another field of `Connection` (e.g. a prepared
    /// statement borrowed out of the statement cache) is borrowed for the
    /// same scope — see its call site in `run_exec`.
    pub(crate) async fn collect_column_metadata(
        reader: &mut BufReader<OwnedReadHalf>,
        buffers: &mut BufferSet,
        mut compressor: Option<&mut Compressor>,
        num_columns: usize,
    ) -> Result<()> {
        buffers.column_definition_buffer.clear();
        let mut tmp = std::mem::take(&mut buffers.read_buffer);
        for _ in 0..num_columns {
            wire::read_payload_compressed(reader, &mut tmp, compressor.as_deref_mut()).await?;
            let len = tmp.len() as u32;
            buffers.column_definition_buffer.extend_from_slice(&len.to_ne_bytes());
            buffers.column_definition_buffer.extend_from_slice(&tmp);
        }
        buffers.read_buffer = tmp;
        Ok(())
    }
}

/// A reference to a prepared statement living inside a [`Connection`] — either
/// cached (keyed by SQL text, LRU-managed) or held privately by the caller.
pub struct PreparedStatementHandle {
    pub(crate) sql: String,
    pub(crate) cached: bool,
}

fn payload_as_err(payload: &[u8]) -> Error {
    crate::protocol::response::ErrPayloadBytes(payload).into()
}

fn compute_auth_response(plugin_name: &[u8], opts: &ConnectOptions, challenge: &[u8]) -> Result<Vec<u8>> {
    let password = opts.password.as_deref().unwrap_or("");
    match plugin_name {
        b"mysql_native_password" => Ok(auth_mysql_native_password(password, challenge).to_vec()),
        b"caching_sha2_password" => Ok(auth_caching_sha2_password(password, challenge).to_vec()),
        other => Err(Error::UnsupportedAuthPlugin(
            String::from_utf8_lossy(other).into_owned(),
        )),
    }
}

/// Opens a throwaway connection with the same [`ConnectOptions`] and issues
/// `KILL QUERY <thread_id>`, bounded by `opts.kill_timeout`. Used by the
/// cancellation side channel; failures are logged and swallowed, since a
/// failed kill should not be surfaced as the cancelling caller's error.
#[instrument(skip(opts))]
pub async fn kill_query(opts: &ConnectOptions, thread_id: u32) {
    let result = tokio::time::timeout(opts.kill_timeout, async {
        let mut killer = Connection::connect(opts.clone()).await?;
        let mut handler = crate::handler::DropHandler::default();
        killer.query(&format!("KILL QUERY {thread_id}"), &mut handler).await?;
        killer.close().await;
        Ok::<(), Error>(())
    })
    .await;

    match result {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(thread_id, error = %e, "KILL QUERY failed"),
        Err(_) => warn!(thread_id, "KILL QUERY timed out"),
    }
}
