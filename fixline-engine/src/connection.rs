/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! One FIX connection: the read loop, the serialized write path and the
//! session-level protocol around them.
//!
//! A [`Connection`] owns the read half of the stream and is driven by
//! [`Connection::run`] on its own task. Everything else goes through the
//! cloneable [`ConnectionHandle`]: sends from any task, handler
//! registration, logout and close.

use crate::dispatcher::Dispatcher;
use crate::engine::Engine;
use crate::handler::{MessageHandler, panic_message};
use bytes::{Bytes, BytesMut};
use fixline_core::error::{DecodeError, FixError, SessionError};
use fixline_core::message::{Message, MsgType};
use fixline_core::tags;
use fixline_core::types::{CompId, Direction, SeqNum, SessionId};
use fixline_session::admin::{self, RejectReason};
use fixline_session::registry::{HandlerId, MessageFilter};
use fixline_session::session::{LogonTerms, Session, SessionAction, required_header};
use fixline_session::state::{ConnectionState, StateMachine};
use fixline_store::SequenceSnapshot;
use fixline_tagvalue::Codec;
use fixline_transport::{CodecError, FrameCodec};
use futures::FutureExt;
use parking_lot::{Mutex, RwLock};
use std::fmt;
use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::codec::Decoder as _;
use tracing::{debug, info, trace, warn};

type BoxReader = Box<dyn AsyncRead + Send + Unpin>;
type BoxWriter = Box<dyn AsyncWrite + Send + Unpin>;

tokio::task_local! {
    /// Id of the connection whose read loop is running on this task.
    static READ_LOOP: u64;
}

/// Which side of the logon handshake a connection plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Waits for the counterparty's Logon.
    Acceptor,
    /// Sends the Logon.
    Initiator,
}

struct Shared {
    id: u64,
    role: Role,
    peer_addr: Option<SocketAddr>,
    engine: Engine,
    state: Mutex<StateMachine>,
    state_tx: watch::Sender<ConnectionState>,
    session: RwLock<Option<Arc<Session>>>,
    dispatcher: Dispatcher,
    writer: tokio::sync::Mutex<Option<BoxWriter>>,
    close_tx: watch::Sender<bool>,
    done_tx: watch::Sender<bool>,
    logout_sent: Mutex<Option<Instant>>,
    started: Instant,
}

/// Cloneable handle to a running connection.
#[derive(Clone)]
pub struct ConnectionHandle {
    shared: Arc<Shared>,
}

/// A connection waiting to be run.
pub struct Connection {
    handle: ConnectionHandle,
    reader: BoxReader,
    frames: FrameCodec,
    buffer: BytesMut,
    close_rx: watch::Receiver<bool>,
}

impl Connection {
    pub(crate) fn new<S>(engine: Engine, stream: S, role: Role, peer_addr: Option<SocketAddr>) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let (reader, writer) = tokio::io::split(stream);
        let (close_tx, close_rx) = watch::channel(false);
        let config = engine.config();
        let frames = FrameCodec::new()
            .with_max_message_size(config.max_message_size)
            .with_checksum_validation(config.validate_checksum);

        let dispatcher = Dispatcher::new();
        for (handler, direction, filter) in engine.default_handlers() {
            dispatcher.add(handler, direction, filter);
        }

        let shared = Shared {
            id: engine.next_connection_id(),
            role,
            peer_addr,
            state: Mutex::new(StateMachine::new()),
            state_tx: watch::Sender::new(ConnectionState::Disconnected),
            session: RwLock::new(None),
            dispatcher,
            writer: tokio::sync::Mutex::new(Some(Box::new(writer))),
            close_tx,
            done_tx: watch::Sender::new(false),
            logout_sent: Mutex::new(None),
            started: Instant::now(),
            engine,
        };
        Self {
            handle: ConnectionHandle {
                shared: Arc::new(shared),
            },
            reader: Box::new(reader),
            frames,
            buffer: BytesMut::with_capacity(4096),
            close_rx,
        }
    }

    /// Returns a handle to this connection.
    #[must_use]
    pub fn handle(&self) -> ConnectionHandle {
        self.handle.clone()
    }

    /// Runs the connection until it is closed.
    ///
    /// The stream is always shut down and the session's sequence numbers
    /// persisted before this returns.
    ///
    /// # Errors
    /// Returns the transport or store error that ended the connection.
    pub async fn run(mut self) -> Result<(), FixError> {
        let id = self.handle.id();
        let serve = async {
            self.handle.start().await?;
            self.read_loop().await
        };
        let result = match AssertUnwindSafe(READ_LOOP.scope(id, serve))
            .catch_unwind()
            .await
        {
            Ok(result) => result,
            Err(panic) => Err(SessionError::Connection(format!(
                "connection task panicked: {}",
                panic_message(&*panic)
            ))
            .into()),
        };
        if let Err(err) = &result {
            warn!(connection = self.handle.id(), error = %err, "connection failed");
        }
        self.handle.shutdown().await;
        result
    }

    async fn read_loop(&mut self) -> Result<(), FixError> {
        let resolution = self.handle.shared.engine.config().timer_resolution;
        let mut ticker = tokio::time::interval(resolution);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let closing = *self.close_rx.borrow_and_update();
            if closing {
                return Ok(());
            }
            tokio::select! {
                changed = self.close_rx.changed() => {
                    if changed.is_err() {
                        return Ok(());
                    }
                }
                _ = ticker.tick() => self.handle.on_tick().await?,
                read = self.reader.read_buf(&mut self.buffer) => {
                    if read? == 0 {
                        info!(connection = self.handle.id(), "counterparty closed the connection");
                        return Ok(());
                    }
                    self.drain_frames().await?;
                }
            }
        }
    }

    async fn drain_frames(&mut self) -> Result<(), FixError> {
        loop {
            let frame = match self.frames.decode(&mut self.buffer) {
                Ok(Some(frame)) => frame.freeze(),
                Ok(None) => return Ok(()),
                Err(err) => {
                    self.buffer.clear();
                    self.handle.on_frame_error(&err).await;
                    return Ok(());
                }
            };
            self.handle.on_frame(frame).await?;
            if self.handle.is_closing() {
                return Ok(());
            }
        }
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("handle", &self.handle)
            .field("buffered", &self.buffer.len())
            .finish_non_exhaustive()
    }
}

impl ConnectionHandle {
    /// Connection id, unique within the engine.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.shared.id
    }

    /// Acceptor or initiator.
    #[must_use]
    pub fn role(&self) -> Role {
        self.shared.role
    }

    /// Address of the counterparty, when the transport has one.
    #[must_use]
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.shared.peer_addr
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.shared.state.lock().state()
    }

    /// The session bound to this connection, once logon started.
    #[must_use]
    pub fn session(&self) -> Option<Arc<Session>> {
        self.shared.session.read().clone()
    }

    /// Identity of the bound session.
    #[must_use]
    pub fn session_id(&self) -> Option<SessionId> {
        self.shared.session.read().as_ref().map(|s| s.id().clone())
    }

    /// The engine this connection belongs to.
    #[must_use]
    pub fn engine(&self) -> &Engine {
        &self.shared.engine
    }

    /// Registers a message handler on this connection.
    pub fn add_message_handler(
        &self,
        handler: Arc<dyn MessageHandler>,
        direction: Direction,
        filter: impl Into<MessageFilter>,
    ) -> HandlerId {
        self.shared.dispatcher.add(handler, direction, filter.into())
    }

    /// Removes one registration of `handler`. Returns false if the triple
    /// was never registered.
    pub fn remove_message_handler(
        &self,
        handler: &Arc<dyn MessageHandler>,
        direction: Direction,
        filter: impl Into<MessageFilter>,
    ) -> bool {
        self.shared
            .dispatcher
            .remove(handler, direction, &filter.into())
    }

    /// Removes a registration by id.
    pub fn remove_handler(&self, id: HandlerId) -> bool {
        self.shared.dispatcher.remove_id(id)
    }

    /// Sends a message, returning the sequence number it went out with.
    ///
    /// The header (49, 56, 34, 52) is stamped here. The bytes are in the
    /// store before they reach the wire.
    ///
    /// # Errors
    /// Returns `SessionError::InvalidState` for an application message
    /// outside `Connected`, or the encode, store or I/O error that stopped
    /// the send.
    pub async fn send(&self, message: Message) -> Result<SeqNum, FixError> {
        let state = self.state();
        if message.msg_type().is_app() && state != ConnectionState::Connected {
            return Err(SessionError::InvalidState {
                expected: ConnectionState::Connected.to_string(),
                current: state.to_string(),
            }
            .into());
        }
        self.write_message(message).await
    }

    /// Sends Logout and waits up to the logout timeout for the
    /// counterparty's reply, then closes.
    ///
    /// Called from a handler, it returns once the Logout is sent; the read
    /// loop then waits for the reply and enforces the same timeout.
    ///
    /// # Errors
    /// Returns `SessionError::InvalidState` unless `Connected`, or the error
    /// that stopped the Logout from being sent.
    pub async fn logout(&self, text: Option<&str>) -> Result<(), FixError> {
        self.shared
            .state
            .lock()
            .require(ConnectionState::Connected)?;
        *self.shared.logout_sent.lock() = Some(Instant::now());
        self.write_message(admin::logout(text)).await?;
        if let Err(err) = self.transition(ConnectionState::Disconnecting).await {
            debug!(connection = self.id(), error = %err, "connection already closing");
        }

        if self.on_read_loop() {
            return Ok(());
        }
        let timeout = self.shared.engine.config().logout_timeout;
        if tokio::time::timeout(timeout, self.closed()).await.is_err() {
            warn!(connection = self.id(), "no Logout reply, closing");
            self.close();
        }
        Ok(())
    }

    /// Closes the connection without a Logout exchange.
    pub fn close(&self) {
        self.shared.close_tx.send_replace(true);
    }

    /// Returns true once a close has been requested.
    #[must_use]
    pub fn is_closing(&self) -> bool {
        *self.shared.close_tx.borrow()
    }

    /// Waits until the connection has fully shut down.
    pub async fn closed(&self) {
        let mut done = self.shared.done_tx.subscribe();
        let _ = done.wait_for(|done| *done).await;
    }

    /// Waits until the connection reaches `state`.
    ///
    /// Only the latest state is observed: a state entered and left before
    /// the waiter runs is missed.
    pub async fn wait_for_state(&self, state: ConnectionState) {
        let mut states = self.shared.state_tx.subscribe();
        let _ = states.wait_for(|current| *current == state).await;
    }

    /// True when called from this connection's own read loop, i.e. from a
    /// handler or listener.
    fn on_read_loop(&self) -> bool {
        READ_LOOP.try_with(|id| *id == self.id()).unwrap_or(false)
    }

    async fn start(&self) -> Result<(), FixError> {
        self.transition(ConnectionState::Connecting).await?;
        if self.shared.role == Role::Initiator {
            self.send_logon().await?;
        }
        Ok(())
    }

    async fn send_logon(&self) -> Result<(), FixError> {
        let config = self.shared.engine.config();
        let target = config.target_comp_id.clone().ok_or_else(|| {
            SessionError::Configuration("an initiator needs a target CompID".to_string())
        })?;
        let id = SessionId::new(config.sender_comp_id.clone(), target);
        self.shared.engine.sessions().bind(&id, self.id())?;

        let session = self.load_bound_session(id, config.reset_on_logon).await?;
        self.install(session);
        self.write_message(admin::logon(
            config.heartbeat_interval_secs(),
            config.reset_on_logon,
        ))
        .await?;
        self.transition(ConnectionState::LogonPending).await?;
        Ok(())
    }

    /// Loads the session just bound to this connection, releasing the
    /// binding if the store fails.
    async fn load_bound_session(
        &self,
        id: SessionId,
        reset: bool,
    ) -> Result<Arc<Session>, FixError> {
        match self.load_session(id.clone(), reset).await {
            Ok(session) => Ok(session),
            Err(err) => {
                self.shared.engine.sessions().release(&id, self.id());
                Err(err)
            }
        }
    }

    async fn load_session(&self, id: SessionId, reset: bool) -> Result<Arc<Session>, FixError> {
        let engine = &self.shared.engine;
        let config = engine.config().clone();
        let session = if reset {
            engine.store().reset(&id).await?;
            Session::new(id, config)
        } else {
            let snapshot = engine.store().load_sequences(&id).await?.unwrap_or_default();
            debug!(
                session = %id,
                next_sender_seq = snapshot.next_sender_seq,
                next_target_seq = snapshot.next_target_seq,
                "resuming sequence numbers"
            );
            Session::with_sequences(
                id,
                config,
                snapshot.next_sender_seq,
                snapshot.next_target_seq,
            )
        };
        Ok(Arc::new(session))
    }

    fn install(&self, session: Arc<Session>) {
        *self.shared.session.write() = Some(session);
    }

    async fn transition(&self, to: ConnectionState) -> Result<(), SessionError> {
        let from = {
            let mut machine = self.shared.state.lock();
            if machine.state() == to {
                return Ok(());
            }
            machine.transition(to)?
        };
        self.shared.state_tx.send_replace(to);
        match self.session_id() {
            Some(session) => info!(connection = self.id(), %session, %from, %to, "state change"),
            None => info!(connection = self.id(), %from, %to, "state change"),
        }
        for listener in self.shared.engine.listeners(to) {
            let outcome = AssertUnwindSafe(listener.on_state_change(self, from, to))
                .catch_unwind()
                .await;
            let err = match outcome {
                Ok(Ok(())) => continue,
                Ok(Err(err)) => err.to_string(),
                Err(panic) => format!("panicked: {}", panic_message(&*panic)),
            };
            warn!(connection = self.id(), state = %to, error = %err, "connection listener failed");
        }
        Ok(())
    }

    /// Stamps, encodes, stores and writes one message under the write lock,
    /// then runs the outbound handlers.
    async fn write_message(&self, mut message: Message) -> Result<SeqNum, FixError> {
        let session = self.session().ok_or_else(|| SessionError::InvalidState {
            expected: ConnectionState::LogonPending.to_string(),
            current: self.state().to_string(),
        })?;
        let engine = &self.shared.engine;

        let seq = {
            let mut writer = self.shared.writer.lock().await;
            let Some(stream) = writer.as_mut() else {
                return Err(SessionError::Connection("connection closed".to_string()).into());
            };
            let seq = session.next_sender_seq();
            session.stamp_header(&mut message, seq);
            let frame = engine.codec().encode(&message)?.freeze();
            engine
                .store()
                .append(session.id(), Direction::Outbound, seq.value(), frame.clone())
                .await?;
            session.sequences().increment_sender_seq();
            stream.write_all(&frame).await?;
            stream.flush().await?;
            session.on_message_sent();
            seq
        };

        debug!(
            session = %session.id(),
            seq = seq.value(),
            msg_type = engine.codec().msg_type_name(message.msg_type()),
            "sent"
        );
        self.shared
            .dispatcher
            .dispatch(self, Direction::Outbound, &message)
            .await;
        Ok(seq)
    }

    async fn on_frame(&self, frame: Bytes) -> Result<(), FixError> {
        let message = match self.shared.engine.codec().decode(&frame) {
            Ok(message) => message,
            Err(err) => {
                self.reject_and_logout(None, None, &err).await;
                return Ok(());
            }
        };
        trace!(connection = self.id(), msg = %message, "received");

        match (self.state(), self.shared.role) {
            (ConnectionState::Connecting, Role::Acceptor) => {
                self.on_logon_request(frame, message).await
            }
            (ConnectionState::LogonPending, Role::Initiator) => {
                self.on_logon_response(frame, message).await
            }
            (ConnectionState::Connected | ConnectionState::Disconnecting, _) => {
                self.on_session_message(frame, message).await
            }
            (state, _) => {
                warn!(
                    connection = self.id(),
                    %state,
                    msg_type = %message.msg_type(),
                    "message outside the session lifecycle, discarding"
                );
                Ok(())
            }
        }
    }

    async fn on_frame_error(&self, err: &CodecError) {
        warn!(connection = self.id(), error = %err, "unreadable frame");
        self.fail(&err.to_string()).await;
    }

    async fn on_logon_request(&self, frame: Bytes, logon: Message) -> Result<(), FixError> {
        if logon.msg_type() != &MsgType::Logon {
            warn!(
                connection = self.id(),
                msg_type = %logon.msg_type(),
                "first message is not a Logon, closing"
            );
            self.begin_close().await;
            return Ok(());
        }
        let seq = match required_header(&logon) {
            Ok(seq) => seq,
            Err(err) => {
                warn!(connection = self.id(), error = %err, "malformed Logon, closing");
                self.begin_close().await;
                return Ok(());
            }
        };
        self.transition(ConnectionState::LogonPending).await?;

        let (id, terms) = match self.validate_logon(&logon).await {
            Ok(accepted) => accepted,
            Err(err) => {
                warn!(connection = self.id(), peer = ?self.peer_addr(), error = %err, "logon refused");
                self.transition(ConnectionState::Disconnected).await?;
                self.close();
                return Ok(());
            }
        };

        let session = self.load_bound_session(id, terms.reset_seq_num).await?;
        session.set_heartbeat_interval(terms.heartbeat_interval);
        self.install(Arc::clone(&session));
        self.record_inbound(&session, seq, frame).await;

        let actions = match session.on_message(seq, logon) {
            Ok(actions) => actions,
            Err(err) => {
                warn!(session = %session.id(), error = %err, "Logon out of sequence");
                self.fail(&err.to_string()).await;
                return Ok(());
            }
        };
        self.write_message(admin::logon(
            terms.heartbeat_interval.as_secs(),
            terms.reset_seq_num,
        ))
        .await?;
        self.transition(ConnectionState::Connected).await?;
        info!(
            session = %session.id(),
            heartbeat_secs = terms.heartbeat_interval.as_secs(),
            reset = terms.reset_seq_num,
            "logon accepted"
        );
        self.run_actions(actions).await
    }

    /// Checks a counterparty's Logon and binds the session it names.
    async fn validate_logon(&self, logon: &Message) -> Result<(SessionId, LogonTerms), SessionError> {
        let engine = &self.shared.engine;
        let config = engine.config();
        let their_sender = logon.field(tags::SENDER_COMP_ID).unwrap_or_default();
        let their_target = logon.field(tags::TARGET_COMP_ID).unwrap_or_default();
        let rejected = |reason: String| SessionError::LogonRejected { reason };

        if their_target != config.sender_comp_id.as_str() {
            return Err(rejected(format!(
                "TargetCompID {their_target} is not {}",
                config.sender_comp_id
            )));
        }
        if let Some(expected) = &config.target_comp_id {
            if their_sender != expected.as_str() {
                return Err(rejected(format!(
                    "SenderCompID {their_sender} is not {expected}"
                )));
            }
        }
        if !engine.validator().validate(their_sender, their_target).await {
            return Err(rejected(format!("{their_sender} is not authorized")));
        }
        let terms = LogonTerms::from_logon(logon, config).map_err(|e| rejected(e.to_string()))?;

        let ours = CompId::new(their_target)
            .ok_or_else(|| rejected(format!("invalid CompID {their_target}")))?;
        let theirs = CompId::new(their_sender)
            .ok_or_else(|| rejected(format!("invalid CompID {their_sender}")))?;
        let id = SessionId::new(ours, theirs);
        engine.sessions().bind(&id, self.id())?;
        Ok((id, terms))
    }

    async fn on_logon_response(&self, frame: Bytes, message: Message) -> Result<(), FixError> {
        let Some(session) = self.session() else {
            return Ok(());
        };
        let seq = match session.check_header(&message) {
            Ok(seq) => seq,
            Err(err) => {
                let seq = message.seq_num().ok().map(SeqNum::value);
                self.reject_and_logout(seq, Some(message.msg_type()), &err).await;
                return Ok(());
            }
        };

        match message.msg_type() {
            MsgType::Logon => {
                if let Err(err) = message.field_as::<u64>(tags::HEART_BT_INT) {
                    self.reject_and_logout(Some(seq), Some(&MsgType::Logon), &err).await;
                    return Ok(());
                }
                let config = self.shared.engine.config();
                if message.flag(tags::RESET_SEQ_NUM_FLAG).unwrap_or(false) && !config.reset_on_logon
                {
                    info!(session = %session.id(), "counterparty reset its sequence numbers");
                    session.sequences().set_target_seq(1);
                }
                self.record_inbound(&session, seq, frame).await;
                let actions = match session.on_message(seq, message) {
                    Ok(actions) => actions,
                    Err(err) => {
                        warn!(session = %session.id(), error = %err, "Logon ack out of sequence");
                        self.fail(&err.to_string()).await;
                        return Ok(());
                    }
                };
                self.transition(ConnectionState::Connected).await?;
                info!(session = %session.id(), "logon acknowledged");
                self.run_actions(actions).await
            }
            MsgType::Logout => {
                warn!(
                    session = %session.id(),
                    text = message.field(tags::TEXT).unwrap_or_default(),
                    "logon refused by counterparty"
                );
                self.begin_close().await;
                Ok(())
            }
            other => {
                warn!(session = %session.id(), msg_type = %other, "expected a Logon ack");
                self.fail("expected Logon").await;
                Ok(())
            }
        }
    }

    async fn on_session_message(&self, frame: Bytes, message: Message) -> Result<(), FixError> {
        let Some(session) = self.session() else {
            return Ok(());
        };
        let seq = match session.check_header(&message) {
            Ok(seq) => seq,
            Err(err) => {
                let seq = message.seq_num().ok().map(SeqNum::value);
                self.reject_and_logout(seq, Some(message.msg_type()), &err).await;
                return Ok(());
            }
        };
        if seq >= session.next_target_seq().value() {
            self.record_inbound(&session, seq, frame).await;
        }

        match session.on_message(seq, message) {
            Ok(actions) => self.run_actions(actions).await,
            Err(err) => {
                warn!(session = %session.id(), error = %err, "session error");
                self.fail(&err.to_string()).await;
                Ok(())
            }
        }
    }

    async fn record_inbound(&self, session: &Session, seq: u64, frame: Bytes) {
        if let Err(err) = self
            .shared
            .engine
            .store()
            .append(session.id(), Direction::Inbound, seq, frame)
            .await
        {
            debug!(session = %session.id(), seq, error = %err, "inbound message not recorded");
        }
    }

    async fn run_actions(&self, actions: Vec<SessionAction>) -> Result<(), FixError> {
        for action in actions {
            match action {
                SessionAction::Send(message) => {
                    self.write_message(message).await?;
                }
                SessionAction::Process(message) => self.process(message).await?,
            }
            if self.is_closing() {
                break;
            }
        }
        Ok(())
    }

    /// Inbound dispatch plus the session-level reaction to admin messages.
    async fn process(&self, message: Message) -> Result<(), FixError> {
        let state = self.state();
        if message.msg_type().is_app() && state != ConnectionState::Connected {
            warn!(
                connection = self.id(),
                %state,
                msg_type = %message.msg_type(),
                "application message outside Connected, discarding"
            );
            return Ok(());
        }

        self.shared
            .dispatcher
            .dispatch(self, Direction::Inbound, &message)
            .await;

        match message.msg_type() {
            MsgType::TestRequest => {
                self.write_message(admin::heartbeat(message.field(tags::TEST_REQ_ID)))
                    .await?;
            }
            MsgType::ResendRequest => self.serve_resend(&message).await?,
            MsgType::Logout => self.on_logout(&message).await?,
            MsgType::Reject => warn!(
                connection = self.id(),
                ref_seq = message.field(tags::REF_SEQ_NUM).unwrap_or_default(),
                text = message.field(tags::TEXT).unwrap_or_default(),
                "counterparty rejected a message"
            ),
            _ => {}
        }
        Ok(())
    }

    async fn on_logout(&self, logout: &Message) -> Result<(), FixError> {
        let initiated = self.shared.logout_sent.lock().is_some();
        if initiated {
            info!(connection = self.id(), "Logout confirmed");
        } else {
            info!(
                connection = self.id(),
                text = logout.field(tags::TEXT).unwrap_or_default(),
                "counterparty logged out"
            );
            if let Err(err) = self.write_message(admin::logout(None)).await {
                debug!(connection = self.id(), error = %err, "could not answer Logout");
            }
            self.transition(ConnectionState::Disconnecting).await?;
        }

        if let Some(session) = self.session() {
            if session.config().reset_on_logout {
                session.reset_sequences();
                self.shared.engine.store().reset(session.id()).await?;
            }
        }
        self.close();
        Ok(())
    }

    /// Retransmits `[BeginSeqNo, EndSeqNo]` from the store.
    ///
    /// Application messages go out again with PossDup; session-level or
    /// missing runs become one SequenceReset-GapFill each. The write lock is
    /// held throughout so new sends queue behind the replay.
    async fn serve_resend(&self, request: &Message) -> Result<(), FixError> {
        let Some(session) = self.session() else {
            return Ok(());
        };
        let range = request
            .field_as::<u64>(tags::BEGIN_SEQ_NO)
            .and_then(|begin| Ok((begin, request.field_as::<u64>(tags::END_SEQ_NO)?)));
        let (begin, end) = match range {
            Ok(range) => range,
            Err(err) => {
                let reason = RejectReason::from(&err).with_ref_msg_type(MsgType::ResendRequest);
                let ref_seq = request.seq_num().map(SeqNum::value).unwrap_or_default();
                self.write_message(admin::reject(ref_seq, &reason)).await?;
                return Ok(());
            }
        };

        let engine = &self.shared.engine;
        let codec = engine.codec().as_ref();
        let mut writer = self.shared.writer.lock().await;
        let Some(stream) = writer.as_mut() else {
            return Ok(());
        };

        let last_sent = session.next_sender_seq().value().saturating_sub(1);
        let end = if end == 0 || end > last_sent { last_sent } else { end };
        if begin == 0 || begin > end {
            debug!(session = %session.id(), begin, end, "nothing to resend");
            return Ok(());
        }
        info!(session = %session.id(), begin, end, "serving resend request");

        let stored = engine
            .store()
            .range_lookup(session.id(), Direction::Outbound, begin, end)
            .await?;
        let mut stored = stored.into_iter().peekable();
        let mut gap_start: Option<u64> = None;
        let mut resent = 0usize;

        for seq in begin..=end {
            let raw = stored
                .next_if(|(stored_seq, _)| *stored_seq == seq)
                .map(|(_, raw)| raw);
            let replay = raw.and_then(|raw| match codec.decode(&raw) {
                Ok(original) if original.msg_type().is_app() => Some(original),
                Ok(_) => None,
                Err(err) => {
                    warn!(session = %session.id(), seq, error = %err, "stored message unreadable, filling gap");
                    None
                }
            });
            match replay {
                Some(original) => {
                    if let Some(start) = gap_start.take() {
                        write_gap_fill(codec, stream, &session, start, seq).await?;
                    }
                    let frame = codec.encode(&admin::as_retransmission(original))?;
                    stream.write_all(&frame).await?;
                    resent += 1;
                }
                None => {
                    gap_start.get_or_insert(seq);
                }
            }
        }
        if let Some(start) = gap_start {
            write_gap_fill(codec, stream, &session, start, end + 1).await?;
        }
        stream.flush().await?;
        session.on_message_sent();
        debug!(session = %session.id(), resent, "resend complete");
        Ok(())
    }

    async fn on_tick(&self) -> Result<(), FixError> {
        let config = self.shared.engine.config();
        match self.state() {
            ConnectionState::Connecting | ConnectionState::LogonPending => {
                if self.shared.started.elapsed() >= config.logon_timeout {
                    warn!(connection = self.id(), "logon timed out");
                    self.begin_close().await;
                }
            }
            ConnectionState::Connected => {
                let Some(session) = self.session() else {
                    return Ok(());
                };
                match session.on_tick() {
                    Ok(Some(message)) => {
                        self.write_message(message).await?;
                    }
                    Ok(None) => {}
                    Err(err) => {
                        warn!(session = %session.id(), error = %err, "counterparty unresponsive");
                        self.fail(&err.to_string()).await;
                    }
                }
            }
            ConnectionState::Disconnecting => {
                let sent = *self.shared.logout_sent.lock();
                if sent.is_some_and(|at| at.elapsed() >= config.logout_timeout) {
                    warn!(connection = self.id(), "no Logout reply, closing");
                    self.close();
                }
            }
            ConnectionState::Disconnected => {}
        }
        Ok(())
    }

    /// Rejects a malformed message when its MsgSeqNum is known, then
    /// logs out.
    async fn reject_and_logout(
        &self,
        seq: Option<u64>,
        msg_type: Option<&MsgType>,
        err: &DecodeError,
    ) {
        warn!(connection = self.id(), error = %err, "malformed message");
        let can_write = matches!(
            self.state(),
            ConnectionState::LogonPending | ConnectionState::Connected
        );
        if let (Some(seq), true) = (seq, can_write) {
            let mut reason = RejectReason::from(err);
            if let Some(msg_type) = msg_type {
                reason = reason.with_ref_msg_type(msg_type.clone());
            }
            if let Err(send_err) = self.write_message(admin::reject(seq, &reason)).await {
                debug!(connection = self.id(), error = %send_err, "could not send Reject");
            }
        }
        self.fail(&err.to_string()).await;
    }

    /// Sends Logout with `text` if a session is up, then closes.
    async fn fail(&self, text: &str) {
        let can_write = matches!(
            self.state(),
            ConnectionState::LogonPending | ConnectionState::Connected
        );
        if can_write && self.session().is_some() {
            if let Err(err) = self.write_message(admin::logout(Some(text))).await {
                debug!(connection = self.id(), error = %err, "could not send Logout");
            }
        }
        self.begin_close().await;
    }

    async fn begin_close(&self) {
        if matches!(
            self.state(),
            ConnectionState::Connecting | ConnectionState::LogonPending | ConnectionState::Connected
        ) {
            if let Err(err) = self.transition(ConnectionState::Disconnecting).await {
                debug!(connection = self.id(), error = %err, "already leaving");
            }
        }
        self.close();
    }

    async fn shutdown(&self) {
        self.close();
        if self.state() != ConnectionState::Disconnected {
            self.begin_close().await;
        }

        if let Some(mut stream) = self.shared.writer.lock().await.take() {
            if let Err(err) = stream.shutdown().await {
                debug!(connection = self.id(), error = %err, "stream shutdown failed");
            }
        }

        if let Some(session) = self.session() {
            let store = self.shared.engine.store();
            let saved = if session.config().reset_on_disconnect {
                session.reset_sequences();
                store.reset(session.id()).await
            } else {
                store
                    .save_sequences(
                        session.id(),
                        SequenceSnapshot {
                            next_sender_seq: session.next_sender_seq().value(),
                            next_target_seq: session.next_target_seq().value(),
                        },
                    )
                    .await
            };
            if let Err(err) = saved {
                warn!(session = %session.id(), error = %err, "could not persist sequence numbers");
            }
            self.shared.engine.sessions().release(session.id(), self.id());
        }

        self.shared.dispatcher.clear();
        if let Err(err) = self.transition(ConnectionState::Disconnected).await {
            debug!(connection = self.id(), error = %err, "unexpected final transition");
        }
        self.shared.done_tx.send_replace(true);
    }
}

async fn write_gap_fill(
    codec: &dyn Codec,
    stream: &mut BoxWriter,
    session: &Session,
    seq: u64,
    new_seq_no: u64,
) -> Result<(), FixError> {
    let mut fill = admin::sequence_reset(new_seq_no, true);
    session.stamp_header(&mut fill, SeqNum::new(seq));
    fill.set_field(tags::POSS_DUP_FLAG, "Y");
    let frame = codec.encode(&fill)?;
    stream.write_all(&frame).await?;
    trace!(session = %session.id(), seq, new_seq_no, "gap fill");
    Ok(())
}

impl fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("id", &self.shared.id)
            .field("role", &self.shared.role)
            .field("state", &self.state())
            .field("session", &self.session_id())
            .finish()
    }
}
