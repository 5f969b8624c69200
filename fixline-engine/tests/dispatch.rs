/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

mod common;

use async_trait::async_trait;
use common::*;
use fixline_core::error::HandlerError;
use fixline_core::message::{Message, MsgType};
use fixline_core::tags;
use fixline_core::types::Direction;
use fixline_engine::{ConnectionHandle, ConnectionListener, MessageHandler, handler_fn};
use fixline_session::admin;
use fixline_session::registry::MessageFilter;
use fixline_session::state::ConnectionState;
use fixline_store::MessageStore;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

fn execution_report(order: &Message) -> Result<Message, HandlerError> {
    Ok(Message::new(MsgType::ExecutionReport)
        .with_field(tags::ORDER_ID, "ORD-SRV-1")
        .with_field(tags::EXEC_ID, "EXEC-1")
        .with_field(tags::CL_ORD_ID, order.require(tags::CL_ORD_ID)?)
        .with_field(tags::EXEC_TYPE, "0")
        .with_field(tags::ORD_STATUS, "0")
        .with_field(tags::SIDE, order.require(tags::SIDE)?)
        .with_field(tags::LEAVES_QTY, order.require(tags::ORDER_QTY)?)
        .with_field(tags::CUM_QTY, "0")
        .with_field(tags::AVG_PX, "0"))
}

#[tokio::test]
async fn test_order_is_acknowledged_and_handlers_end_with_connection() {
    let (engine, _store) = build_engine(server_config());
    let mut states = record_states(&engine);
    let (handle, mut peer) = accept(&engine);

    let (seen, mut orders) = forward();
    let (outbound, mut reports) = forward();
    let responder = handler_fn(|connection: ConnectionHandle, order: Message| async move {
        let report = execution_report(&order)?;
        connection.send(report).await?;
        Ok::<(), HandlerError>(())
    });
    handle.add_message_handler(Arc::clone(&seen), Direction::Inbound, MsgType::NewOrderSingle);
    handle.add_message_handler(responder, Direction::Inbound, MsgType::NewOrderSingle);
    handle.add_message_handler(outbound, Direction::Outbound, MsgType::ExecutionReport);

    let ack = peer.logon(30).await;
    assert_eq!(seq_of(&ack), 1);
    assert_eq!(ack.field(tags::HEART_BT_INT), Some("30"));
    assert_eq!(ack.field(tags::SENDER_COMP_ID), Some("SERVER"));
    assert_eq!(ack.field(tags::TARGET_COMP_ID), Some("CLIENT"));
    wait_connected(&handle).await;

    assert_eq!(peer.send(new_order("ORD-1")).await, 2);
    let order = next(&mut orders).await;
    assert_eq!(seq_of(&order), 2);
    assert_eq!(order.field(tags::PRICE), Some("10.5"));

    let report = peer.recv().await;
    assert_eq!(report.msg_type(), &MsgType::ExecutionReport);
    assert_eq!(seq_of(&report), 2);
    assert_eq!(report.field(tags::ORD_STATUS), Some("0"));
    assert_eq!(report.field(tags::CL_ORD_ID), Some("ORD-1"));
    assert_eq!(seq_of(&next(&mut reports).await), 2);

    drop(peer);
    wait_closed(&handle).await;
    assert_eq!(handle.state(), ConnectionState::Disconnected);
    assert_eq!(
        drain_states(&mut states),
        vec![
            ConnectionState::Connecting,
            ConnectionState::LogonPending,
            ConnectionState::Connected,
            ConnectionState::Disconnecting,
            ConnectionState::Disconnected,
        ]
    );
    assert!(orders.try_recv().is_err());
    assert!(handle.send(new_order("ORD-2")).await.is_err());
    assert!(!handle.remove_message_handler(&seen, Direction::Inbound, MsgType::NewOrderSingle));
}

#[tokio::test]
async fn test_consecutive_messages_dispatched_once_each() {
    let (engine, _store) = build_engine(server_config());
    let (handle, mut peer) = accept(&engine);
    let (all, mut seen) = forward();
    handle.add_message_handler(all, Direction::Inbound, MessageFilter::Any);

    peer.logon(30).await;
    assert_eq!(next(&mut seen).await.msg_type(), &MsgType::Logon);

    for i in 0..5 {
        peer.send(new_order(&format!("ORD-{i}"))).await;
    }
    for expected in 2..=6 {
        assert_eq!(seq_of(&next(&mut seen).await), expected);
    }

    assert!(peer.sync("barrier").await.is_empty());
    assert_eq!(next(&mut seen).await.msg_type(), &MsgType::TestRequest);
    assert!(seen.try_recv().is_err());

    let session = handle.session().unwrap();
    assert_eq!(session.next_target_seq().value(), 8);
}

#[tokio::test]
async fn test_engine_level_handlers_reach_new_connections() {
    let (engine, _store) = build_engine(server_config());
    let (all, mut seen) = forward();
    engine.add_message_handler(all, Direction::Inbound, MessageFilter::Any);

    let (_handle, mut peer) = accept(&engine);
    peer.logon(30).await;
    let logon = next(&mut seen).await;
    assert_eq!(logon.msg_type(), &MsgType::Logon);
    assert_eq!(logon.field(tags::SENDER_COMP_ID), Some("CLIENT"));
}

struct Rewire {
    victim: Arc<dyn MessageHandler>,
    late: Arc<dyn MessageHandler>,
    armed: AtomicBool,
}

#[async_trait]
impl MessageHandler for Rewire {
    async fn handle(&self, connection: &ConnectionHandle, _message: &Message) -> Result<(), HandlerError> {
        if self.armed.swap(false, Ordering::SeqCst) {
            assert!(connection.remove_message_handler(
                &self.victim,
                Direction::Inbound,
                MsgType::NewOrderSingle
            ));
            connection.add_message_handler(
                Arc::clone(&self.late),
                Direction::Inbound,
                MsgType::NewOrderSingle,
            );
        }
        Ok(())
    }
}

#[tokio::test]
async fn test_registry_changes_during_dispatch_apply_to_later_messages() {
    let (engine, _store) = build_engine(server_config());
    let (handle, mut peer) = accept(&engine);
    let (victim, mut victim_seen) = forward();
    let (late, mut late_seen) = forward();

    let rewire = Arc::new(Rewire {
        victim: Arc::clone(&victim),
        late,
        armed: AtomicBool::new(true),
    });
    handle.add_message_handler(rewire, Direction::Inbound, MsgType::NewOrderSingle);
    handle.add_message_handler(victim, Direction::Inbound, MsgType::NewOrderSingle);

    peer.logon(30).await;
    peer.send(new_order("ORD-1")).await;
    peer.send(new_order("ORD-2")).await;
    peer.sync("barrier").await;

    assert_eq!(seq_of(&next(&mut victim_seen).await), 2);
    assert!(victim_seen.try_recv().is_err());
    assert_eq!(seq_of(&next(&mut late_seen).await), 3);
    assert!(late_seen.try_recv().is_err());
}

#[tokio::test]
async fn test_failing_handler_does_not_stop_the_others() {
    let (engine, _store) = build_engine(server_config());
    let (handle, mut peer) = accept(&engine);
    let failing = handler_fn(|_connection, _message| async {
        Err::<(), _>(HandlerError::failed("order book unavailable"))
    });
    let (after, mut seen) = forward();
    handle.add_message_handler(failing, Direction::Inbound, MsgType::NewOrderSingle);
    handle.add_message_handler(after, Direction::Inbound, MsgType::NewOrderSingle);

    peer.logon(30).await;
    peer.send(new_order("ORD-1")).await;
    assert_eq!(seq_of(&next(&mut seen).await), 2);
    assert!(peer.sync("still-up").await.is_empty());
    assert_eq!(handle.state(), ConnectionState::Connected);
}

struct PanickingHandler;

#[async_trait]
impl MessageHandler for PanickingHandler {
    async fn handle(
        &self,
        _connection: &ConnectionHandle,
        _message: &Message,
    ) -> Result<(), HandlerError> {
        panic!("order book corrupted");
    }
}

struct PanickingListener;

#[async_trait]
impl ConnectionListener for PanickingListener {
    async fn on_state_change(
        &self,
        _connection: &ConnectionHandle,
        _from: ConnectionState,
        _to: ConnectionState,
    ) -> Result<(), HandlerError> {
        panic!("listener bug");
    }
}

#[tokio::test]
async fn test_panicking_handler_does_not_take_down_the_connection() {
    let (engine, store) = build_engine(server_config());
    let (handle, mut peer) = accept(&engine);
    let (after, mut seen) = forward();
    handle.add_message_handler(
        Arc::new(PanickingHandler),
        Direction::Inbound,
        MsgType::NewOrderSingle,
    );
    handle.add_message_handler(after, Direction::Inbound, MsgType::NewOrderSingle);

    peer.logon(30).await;
    peer.send(new_order("ORD-1")).await;
    assert_eq!(seq_of(&next(&mut seen).await), 2);
    assert!(peer.sync("still-up").await.is_empty());
    assert_eq!(handle.state(), ConnectionState::Connected);

    drop(peer);
    wait_closed(&handle).await;
    assert!(engine.sessions().is_empty());
    let session = handle.session_id().unwrap();
    let saved = store.load_sequences(&session).await.unwrap().unwrap();
    assert_eq!(saved.next_target_seq, 4);

    // the pair can log on again
    let (again, mut peer) = accept(&engine);
    peer.next_seq = 4;
    peer.logon(30).await;
    wait_connected(&again).await;
}

#[tokio::test]
async fn test_panicking_listener_does_not_block_transitions() {
    let (engine, _store) = build_engine(server_config());
    engine.add_connection_listener(Arc::new(PanickingListener), ConnectionState::Connected);
    engine.add_connection_listener(Arc::new(PanickingListener), ConnectionState::Disconnected);
    let (handle, mut peer) = accept(&engine);

    peer.logon(30).await;
    wait_connected(&handle).await;
    assert!(peer.sync("alive").await.is_empty());

    drop(peer);
    wait_closed(&handle).await;
    assert_eq!(handle.state(), ConnectionState::Disconnected);
    assert!(engine.sessions().is_empty());
}

#[tokio::test]
async fn test_logout_from_a_handler_returns_once_sent() {
    let config = server_config().with_logout_timeout(Duration::from_secs(60));
    let (engine, _store) = build_engine(config);
    let (handle, mut peer) = accept(&engine);
    let (done_tx, mut done_rx) = tokio::sync::mpsc::unbounded_channel();
    let closer = handler_fn(move |connection: ConnectionHandle, _order: Message| {
        let done_tx = done_tx.clone();
        async move {
            connection.logout(Some("desk closed")).await?;
            let _ = done_tx.send(connection.state());
            Ok::<(), HandlerError>(())
        }
    });
    handle.add_message_handler(closer, Direction::Inbound, MsgType::NewOrderSingle);

    peer.logon(30).await;
    peer.send(new_order("ORD-1")).await;
    let request = peer.recv().await;
    assert_eq!(request.msg_type(), &MsgType::Logout);
    assert_eq!(request.field(tags::TEXT), Some("desk closed"));

    // returned without waiting for the reply
    let state = tokio::time::timeout(WAIT, done_rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(state, ConnectionState::Disconnecting);

    peer.send(admin::logout(None)).await;
    assert!(peer.until_closed().await.is_empty());
    wait_closed(&handle).await;
}

#[tokio::test]
async fn test_handler_removed_by_id() {
    let (engine, _store) = build_engine(server_config());
    let (handle, mut peer) = accept(&engine);
    let (orders, mut seen) = forward();
    let id = handle.add_message_handler(orders, Direction::Inbound, MsgType::NewOrderSingle);

    peer.logon(30).await;
    peer.send(new_order("ORD-1")).await;
    assert_eq!(seq_of(&next(&mut seen).await), 2);

    assert!(handle.remove_handler(id));
    assert!(!handle.remove_handler(id));
    peer.send(new_order("ORD-2")).await;
    peer.sync("barrier").await;
    assert!(seen.try_recv().is_err());
}

#[tokio::test]
async fn test_concurrent_sends_get_distinct_stored_sequence_numbers() {
    let (engine, store) = build_engine(server_config());
    let (handle, mut peer) = accept(&engine);
    peer.logon(30).await;
    wait_connected(&handle).await;
    let session = handle.session_id().unwrap();

    let mut tasks = Vec::new();
    for task in 0..2 {
        let handle = handle.clone();
        tasks.push(tokio::spawn(async move {
            let mut seqs = Vec::new();
            for i in 0..25 {
                let report = Message::new(MsgType::ExecutionReport)
                    .with_field(tags::EXEC_ID, format!("T{task}-{i}"));
                seqs.push(handle.send(report).await.unwrap().value());
            }
            seqs
        }));
    }

    let mut on_wire = Vec::new();
    for _ in 0..50 {
        let report = peer.recv().await;
        let seq = seq_of(&report);
        assert!(store.contains(&session, Direction::Outbound, seq));
        on_wire.push(seq);
    }
    assert_eq!(on_wire, (2..=51).collect::<Vec<_>>());

    let mut assigned = Vec::new();
    for task in tasks {
        let seqs = task.await.unwrap();
        assert!(seqs.windows(2).all(|w| w[0] < w[1]));
        assigned.extend(seqs);
    }
    assigned.sort_unstable();
    assert_eq!(assigned, (2..=51).collect::<Vec<_>>());
}

#[tokio::test]
async fn test_application_send_before_logon_fails() {
    let (engine, _store) = build_engine(server_config());
    let (handle, _peer) = accept(&engine);
    let err = handle.send(new_order("EARLY")).await.unwrap_err();
    assert!(err.to_string().contains("invalid session state"));
}
