use foundation::{Address, AddressError, TimeSource, Viewpoint};
use runtime::metrics::Metrics;
use tracing::{debug, error, info, warn};

use crate::cache::{CacheError, SessionCache};
use crate::cell::Cell;
use crate::codec::CodecError;
use crate::config::StreamingConfig;
use crate::protocol::{Handshake, HandshakeError, ServerParams, client_hello, encode_query};
use crate::reassembly::{DecodedArray, Reassembler};
use crate::traversal::{Traversal, TraversalParams};

/// Ordered, message-oriented binary connection to the server.
///
/// Implementations only send; inbound messages are pushed into
/// [`Session::on_message`] by whoever owns the receiving side.
pub trait Transport {
    fn send(&mut self, frame: Vec<u8>) -> Result<(), TransportError>;
}

/// Consumer of decoded cells.
pub trait Renderer {
    fn add_cell(&mut self, cell: Cell);
    fn remove_cell(&mut self, address: &Address);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportError {
    pub message: String,
}

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "transport error: {}", self.message)
    }
}

impl std::error::Error for TransportError {}

#[derive(Debug)]
pub enum SessionError {
    CorruptStream(CodecError),
    ProtocolViolation(String),
    HandshakeFailed(HandshakeError),
    Transport(TransportError),
    AlreadyConnected,
    /// The handshake has not completed yet.
    NotReady,
    Closed,
    Traversal(AddressError),
}

impl SessionError {
    /// Whether this error tears the connection down.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SessionError::CorruptStream(_)
                | SessionError::ProtocolViolation(_)
                | SessionError::HandshakeFailed(_)
                | SessionError::Transport(_)
        )
    }
}

impl std::fmt::Display for SessionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionError::CorruptStream(e) => write!(f, "{e}"),
            SessionError::ProtocolViolation(reason) => write!(f, "protocol violation: {reason}"),
            SessionError::HandshakeFailed(e) => write!(f, "{e}"),
            SessionError::Transport(e) => write!(f, "{e}"),
            SessionError::AlreadyConnected => write!(f, "a session is already connected"),
            SessionError::NotReady => write!(f, "session is still handshaking"),
            SessionError::Closed => write!(f, "session is closed"),
            SessionError::Traversal(e) => write!(f, "traversal failed: {e}"),
        }
    }
}

impl std::error::Error for SessionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SessionError::CorruptStream(e) => Some(e),
            SessionError::HandshakeFailed(e) => Some(e),
            SessionError::Transport(e) => Some(e),
            SessionError::Traversal(e) => Some(e),
            _ => None,
        }
    }
}

impl From<CodecError> for SessionError {
    fn from(e: CodecError) -> Self {
        SessionError::CorruptStream(e)
    }
}

impl From<HandshakeError> for SessionError {
    fn from(e: HandshakeError) -> Self {
        SessionError::HandshakeFailed(e)
    }
}

impl From<TransportError> for SessionError {
    fn from(e: TransportError) -> Self {
        SessionError::Transport(e)
    }
}

impl From<CacheError> for SessionError {
    fn from(e: CacheError) -> Self {
        SessionError::ProtocolViolation(e.to_string())
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SessionState {
    Handshaking,
    Ready(ServerParams),
    Closed,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SessionMetric {
    Passes,
    QueriesSent,
    BytesReceived,
    ArraysDecoded,
    CellsEmpty,
    CellsPopulated,
    CellsEvicted,
    /// Gauge: queries awaiting a response.
    Outstanding,
    /// Histogram: candidates per traversal pass.
    PassCandidates,
}

impl SessionMetric {
    pub fn name(self) -> &'static str {
        match self {
            SessionMetric::Passes => "passes",
            SessionMetric::QueriesSent => "queries_sent",
            SessionMetric::BytesReceived => "bytes_received",
            SessionMetric::ArraysDecoded => "arrays_decoded",
            SessionMetric::CellsEmpty => "cells_empty",
            SessionMetric::CellsPopulated => "cells_populated",
            SessionMetric::CellsEvicted => "cells_evicted",
            SessionMetric::Outstanding => "outstanding",
            SessionMetric::PassCandidates => "pass_candidates",
        }
    }
}

/// One connection's worth of streaming state.
///
/// Single threaded and event driven: the owner feeds inbound messages with
/// [`Session::on_message`] and viewpoint changes with [`Session::refresh`].
/// Fatal errors close the session; every later call returns
/// [`SessionError::Closed`].
#[derive(Debug)]
pub struct Session<T: Transport> {
    transport: T,
    config: StreamingConfig,
    state: SessionState,
    handshake: Handshake,
    reassembler: Reassembler,
    cache: SessionCache,
    metrics: Metrics<SessionMetric>,
}

impl<T: Transport> Session<T> {
    /// Sends the client hello and waits for the server in `Handshaking`.
    pub fn open(mut transport: T, config: StreamingConfig) -> Result<Self, SessionError> {
        transport.send(client_hello())?;
        debug!("sent client hello");
        Ok(Self {
            transport,
            reassembler: Reassembler::new(config.max_array_bytes),
            cache: SessionCache::new(config.max_cells, config.max_outstanding),
            config,
            state: SessionState::Handshaking,
            handshake: Handshake::new(),
            metrics: Metrics::new(),
        })
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn server_params(&self) -> Option<ServerParams> {
        match self.state {
            SessionState::Ready(params) => Some(params),
            _ => None,
        }
    }

    pub fn config(&self) -> &StreamingConfig {
        &self.config
    }

    pub fn cache(&self) -> &SessionCache {
        &self.cache
    }

    pub fn metrics(&self) -> &Metrics<SessionMetric> {
        &self.metrics
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Handles one inbound message; returns how many arrays it completed.
    pub fn on_message(
        &mut self,
        bytes: &[u8],
        renderer: &mut impl Renderer,
    ) -> Result<usize, SessionError> {
        let result = self.handle_message(bytes, renderer);
        self.close_on_fatal(result)
    }

    /// Runs one traversal pass from `viewpoint` and sends its candidates as a
    /// single query frame. Returns how many addresses were queried.
    ///
    /// At most as many candidates as there is room for under the
    /// outstanding-query bound are collected; the rest wait for a later pass.
    pub fn refresh(
        &mut self,
        viewpoint: &Viewpoint,
        time: &impl TimeSource,
    ) -> Result<usize, SessionError> {
        let result = self.run_pass(viewpoint, time);
        self.close_on_fatal(result)
    }

    /// The transport reported the connection closed.
    pub fn on_close(&mut self) {
        if self.state != SessionState::Closed {
            info!(
                outstanding = self.cache.outstanding_len(),
                "connection closed"
            );
        }
        self.state = SessionState::Closed;
    }

    fn handle_message(
        &mut self,
        bytes: &[u8],
        renderer: &mut impl Renderer,
    ) -> Result<usize, SessionError> {
        let mut rest = bytes;
        match self.state {
            SessionState::Closed => return Err(SessionError::Closed),
            SessionState::Handshaking => {
                let Some((params, consumed)) = self.handshake.feed(rest)? else {
                    return Ok(0);
                };
                info!(
                    space_param = params.space_param,
                    time_param = params.time_param,
                    "handshake complete"
                );
                self.state = SessionState::Ready(params);
                rest = &rest[consumed..];
            }
            SessionState::Ready(_) => {}
        }

        self.metrics
            .inc_counter(SessionMetric::BytesReceived, bytes.len() as u64);

        let arrays = self.reassembler.feed(rest)?;
        let count = arrays.len();
        for array in arrays {
            self.dispatch(array, renderer)?;
        }
        self.metrics.set_gauge(
            SessionMetric::Outstanding,
            self.cache.outstanding_len() as i64,
        );
        Ok(count)
    }

    fn dispatch(
        &mut self,
        array: DecodedArray,
        renderer: &mut impl Renderer,
    ) -> Result<(), SessionError> {
        let Some(address) = self.cache.next_outstanding() else {
            return Err(SessionError::ProtocolViolation(
                "response array without an outstanding query".to_string(),
            ));
        };
        self.metrics.inc_counter(SessionMetric::ArraysDecoded, 1);

        if array.bytes.is_empty() {
            self.cache.mark_empty(address)?;
            self.metrics.inc_counter(SessionMetric::CellsEmpty, 1);
            debug!(%address, "cell empty");
            return Ok(());
        }

        let cell = Cell::decode(address, &array.bytes)?;
        let evicted = self.cache.mark_populated(address)?;
        debug!(%address, points = cell.len(), "cell populated");
        renderer.add_cell(cell);
        self.metrics.inc_counter(SessionMetric::CellsPopulated, 1);

        for old in &evicted {
            renderer.remove_cell(old);
        }
        self.metrics
            .inc_counter(SessionMetric::CellsEvicted, evicted.len() as u64);
        Ok(())
    }

    fn run_pass(
        &mut self,
        viewpoint: &Viewpoint,
        time: &impl TimeSource,
    ) -> Result<usize, SessionError> {
        let server = match self.state {
            SessionState::Closed => return Err(SessionError::Closed),
            SessionState::Handshaking => return Err(SessionError::NotReady),
            SessionState::Ready(params) => params,
        };

        let selection = time.selection();
        if !selection.mode.is_set() {
            return Err(SessionError::Traversal(AddressError::InvalidMode(
                selection.mode.as_u8(),
            )));
        }

        let params = TraversalParams::new(server, &self.config);
        let seed = Address::root(selection, self.config.span);
        let limit = self.cache.remaining_capacity();
        let candidates = Traversal::new(&self.cache, *viewpoint, params)
            .run(seed, limit)
            .map_err(SessionError::Traversal)?;

        self.metrics.inc_counter(SessionMetric::Passes, 1);
        self.metrics
            .record_histogram(SessionMetric::PassCandidates, candidates.len() as i64);

        if candidates.is_empty() {
            debug!(
                outstanding = self.cache.outstanding_len(),
                "traversal pass found nothing new"
            );
            return Ok(0);
        }
        if limit <= candidates.len() {
            warn!(limit, "outstanding-query bound reached; pass truncated");
        }

        for address in &candidates {
            self.cache.enqueue(*address)?;
        }
        self.transport.send(encode_query(&candidates))?;

        self.metrics
            .inc_counter(SessionMetric::QueriesSent, candidates.len() as u64);
        self.metrics.set_gauge(
            SessionMetric::Outstanding,
            self.cache.outstanding_len() as i64,
        );
        debug!(
            queried = candidates.len(),
            outstanding = self.cache.outstanding_len(),
            "traversal pass sent"
        );
        Ok(candidates.len())
    }

    fn close_on_fatal<R>(&mut self, result: Result<R, SessionError>) -> Result<R, SessionError> {
        if let Err(e) = &result
            && e.is_fatal()
        {
            error!(error = %e, "closing session");
            self.state = SessionState::Closed;
        }
        result
    }
}

/// Owns at most one live session.
#[derive(Debug)]
pub struct Client<T: Transport> {
    config: StreamingConfig,
    session: Option<Session<T>>,
}

impl<T: Transport> Client<T> {
    pub fn new(config: StreamingConfig) -> Self {
        Self {
            config,
            session: None,
        }
    }

    /// Opens a session over `transport`.
    ///
    /// Fails with `AlreadyConnected` while a previous session is not closed.
    pub fn connect(&mut self, transport: T) -> Result<&mut Session<T>, SessionError> {
        if let Some(session) = &self.session
            && session.state() != SessionState::Closed
        {
            return Err(SessionError::AlreadyConnected);
        }
        let session = Session::open(transport, self.config.clone())?;
        Ok(self.session.insert(session))
    }

    /// Closes and releases the current session, if any.
    pub fn disconnect(&mut self) -> Option<Session<T>> {
        let mut session = self.session.take()?;
        session.on_close();
        Some(session)
    }

    pub fn session(&self) -> Option<&Session<T>> {
        self.session.as_ref()
    }

    pub fn session_mut(&mut self) -> Option<&mut Session<T>> {
        self.session.as_mut()
    }
}
