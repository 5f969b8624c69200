/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Scripted counterparty and helpers shared by the engine tests.

#![allow(dead_code)]

use bytes::BytesMut;
use fixline_core::error::HandlerError;
use fixline_core::message::{Message, MsgType};
use fixline_core::tags;
use fixline_core::types::{CompId, Timestamp};
use fixline_engine::{ConnectionHandle, Engine, MessageHandler, Role, handler_fn, listener_fn};
use fixline_session::admin;
use fixline_session::config::SessionConfig;
use fixline_session::state::ConnectionState;
use fixline_store::MemoryStore;
use fixline_tagvalue::{Codec, TagValueCodec};
use fixline_transport::FrameCodec;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::sync::mpsc::{UnboundedReceiver, unbounded_channel};
use tokio_util::codec::Decoder;

pub const WAIT: Duration = Duration::from_secs(5);

/// The far end of a duplex pipe, speaking raw FIX.
pub struct Peer {
    stream: DuplexStream,
    codec: TagValueCodec,
    frames: FrameCodec,
    buffer: BytesMut,
    pub sender: String,
    pub target: String,
    pub next_seq: u64,
}

impl Peer {
    pub fn new(stream: DuplexStream) -> Self {
        Self {
            stream,
            codec: TagValueCodec::default(),
            frames: FrameCodec::new(),
            buffer: BytesMut::new(),
            sender: "CLIENT".to_string(),
            target: "SERVER".to_string(),
            next_seq: 1,
        }
    }

    pub fn stamp(&self, msg: Message, seq: u64) -> Message {
        msg.with_field(tags::SENDER_COMP_ID, self.sender.as_str())
            .with_field(tags::TARGET_COMP_ID, self.target.as_str())
            .with_field(tags::MSG_SEQ_NUM, seq.to_string())
            .with_field(tags::SENDING_TIME, Timestamp::now().format_millis().as_str())
    }

    /// Sends with the next sequence number and returns it.
    pub async fn send(&mut self, msg: Message) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.send_at(msg, seq).await;
        seq
    }

    /// Sends with an explicit sequence number, leaving `next_seq` alone.
    pub async fn send_at(&mut self, msg: Message, seq: u64) {
        let msg = self.stamp(msg, seq);
        let bytes = self.codec.encode(&msg).unwrap();
        self.send_raw(&bytes).await;
    }

    pub async fn send_raw(&mut self, bytes: &[u8]) {
        self.stream.write_all(bytes).await.unwrap();
    }

    /// Next message from the engine, or `None` once it closed the stream.
    pub async fn next_message(&mut self) -> Option<Message> {
        loop {
            if let Some(frame) = self.frames.decode(&mut self.buffer).unwrap() {
                return Some(self.codec.decode(&frame).unwrap());
            }
            let read = self.stream.read_buf(&mut self.buffer).await.ok()?;
            if read == 0 {
                return None;
            }
        }
    }

    pub async fn recv(&mut self) -> Message {
        tokio::time::timeout(WAIT, self.next_message())
            .await
            .expect("timed out waiting for the engine")
            .expect("engine closed the connection")
    }

    /// Receives the next message that is not a Heartbeat.
    pub async fn recv_skipping_heartbeats(&mut self) -> Message {
        loop {
            let msg = self.recv().await;
            if msg.msg_type() != &MsgType::Heartbeat {
                return msg;
            }
        }
    }

    /// Collects everything until the engine closes the stream.
    pub async fn until_closed(&mut self) -> Vec<Message> {
        let mut seen = Vec::new();
        loop {
            let next = tokio::time::timeout(WAIT, self.next_message())
                .await
                .expect("engine did not close the connection");
            match next {
                Some(msg) => seen.push(msg),
                None => return seen,
            }
        }
    }

    /// Logs on and returns the acknowledgement.
    pub async fn logon(&mut self, heartbeat_secs: u64) -> Message {
        self.send(admin::logon(heartbeat_secs, false)).await;
        let ack = self.recv().await;
        assert_eq!(ack.msg_type(), &MsgType::Logon);
        ack
    }

    /// Round-trips a TestRequest; everything the engine sent before the
    /// Heartbeat is returned.
    pub async fn sync(&mut self, id: &str) -> Vec<Message> {
        self.send(admin::test_request(id)).await;
        let mut before = Vec::new();
        loop {
            let msg = self.recv().await;
            if msg.msg_type() == &MsgType::Heartbeat && msg.field(tags::TEST_REQ_ID) == Some(id) {
                return before;
            }
            before.push(msg);
        }
    }
}

pub fn server_config() -> SessionConfig {
    SessionConfig::new(CompId::new("SERVER").unwrap(), "FIX.4.4")
}

pub fn client_config() -> SessionConfig {
    SessionConfig::new(CompId::new("CLIENT").unwrap(), "FIX.4.4")
        .with_target_comp_id(CompId::new("SERVER").unwrap())
}

pub fn build_engine(config: SessionConfig) -> (Engine, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let engine = Engine::builder(config)
        .with_store(store.clone())
        .build()
        .unwrap();
    (engine, store)
}

/// Spawns an acceptor connection with a scripted peer on the other end.
pub fn accept(engine: &Engine) -> (ConnectionHandle, Peer) {
    let (local, remote) = tokio::io::duplex(64 * 1024);
    let handle = engine.spawn(local, Role::Acceptor, None);
    (handle, Peer::new(remote))
}

/// Handler forwarding every message it sees to a channel.
pub fn forward() -> (Arc<dyn MessageHandler>, UnboundedReceiver<Message>) {
    let (tx, rx) = unbounded_channel();
    let handler = handler_fn(move |_connection, message| {
        let tx = tx.clone();
        async move {
            let _ = tx.send(message);
            Ok::<(), HandlerError>(())
        }
    });
    (handler, rx)
}

pub async fn next(rx: &mut UnboundedReceiver<Message>) -> Message {
    tokio::time::timeout(WAIT, rx.recv())
        .await
        .expect("handler was not called")
        .expect("handler channel closed")
}

pub fn seq_of(msg: &Message) -> u64 {
    msg.seq_num().unwrap().value()
}

/// Records every state transition of every connection on the engine.
pub fn record_states(engine: &Engine) -> UnboundedReceiver<ConnectionState> {
    let (tx, rx) = unbounded_channel();
    let listener = listener_fn(move |_connection, _from, to| {
        let tx = tx.clone();
        async move {
            let _ = tx.send(to);
            Ok::<(), HandlerError>(())
        }
    });
    for state in [
        ConnectionState::Connecting,
        ConnectionState::LogonPending,
        ConnectionState::Connected,
        ConnectionState::Disconnecting,
        ConnectionState::Disconnected,
    ] {
        engine.add_connection_listener(Arc::clone(&listener), state);
    }
    rx
}

pub fn drain_states(rx: &mut UnboundedReceiver<ConnectionState>) -> Vec<ConnectionState> {
    let mut states = Vec::new();
    while let Ok(state) = rx.try_recv() {
        states.push(state);
    }
    states
}

pub async fn wait_closed(handle: &ConnectionHandle) {
    tokio::time::timeout(WAIT, handle.closed())
        .await
        .expect("connection did not shut down");
}

pub async fn wait_connected(handle: &ConnectionHandle) {
    tokio::time::timeout(WAIT, handle.wait_for_state(ConnectionState::Connected))
        .await
        .expect("connection did not log on");
}

pub fn new_order(cl_ord_id: &str) -> Message {
    Message::new(MsgType::NewOrderSingle)
        .with_field(tags::CL_ORD_ID, cl_ord_id)
        .with_field(tags::SYMBOL, "ACME")
        .with_field(tags::SIDE, "1")
        .with_field(tags::ORDER_QTY, "100")
        .with_field(tags::PRICE, "10.5")
}
