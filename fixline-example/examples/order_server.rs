/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Order-acknowledgment server.
//!
//! Accepts FIX 4.4 sessions and answers every NewOrderSingle with an
//! ExecutionReport: New when the order reads cleanly, Canceled with the
//! reason in Text when it does not.

mod common;

use async_trait::async_trait;
use common::{ExampleConfig, init_logging};
use fixline::prelude::*;
use std::result::Result;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Accepts every counterparty, logging who asked.
struct LoggingValidator;

#[async_trait]
impl SessionValidator for LoggingValidator {
    async fn validate(&self, sender_comp_id: &str, target_comp_id: &str) -> bool {
        info!(sender = sender_comp_id, counterparty = target_comp_id, "logon request");
        true
    }
}

async fn on_logon_sent(connection: ConnectionHandle, logon: Message) -> Result<(), HandlerError> {
    let codec = connection.engine().codec();
    info!(
        peer = ?connection.peer_addr(),
        counterparty = logon.field(tags::TARGET_COMP_ID).unwrap_or_default(),
        "----> {}",
        codec.msg_type_name(logon.msg_type())
    );
    Ok(())
}

async fn on_new_order(connection: ConnectionHandle, order: Message) -> Result<(), HandlerError> {
    let cl_ord_id = order.field(tags::CL_ORD_ID).unwrap_or("0").to_string();
    let report = match acknowledge(&order) {
        Ok(report) => report,
        Err(err) => {
            warn!(%cl_ord_id, error = %err, "order refused");
            Message::new(MsgType::ExecutionReport)
                .with_field(tags::ORDER_ID, "NONE")
                .with_field(tags::EXEC_ID, format!("EX-{cl_ord_id}"))
                .with_field(tags::CL_ORD_ID, cl_ord_id.as_str())
                .with_field(tags::ORD_STATUS, "4")
                .with_field(tags::EXEC_TYPE, "4")
                .with_field(tags::LEAVES_QTY, "0")
                .with_field(tags::TEXT, err.to_string())
        }
    };
    let seq = connection.send(report).await?;
    debug!(%cl_ord_id, seq = seq.value(), "ExecutionReport sent");
    Ok(())
}

fn acknowledge(order: &Message) -> Result<Message, DecodeError> {
    let cl_ord_id = order.require(tags::CL_ORD_ID)?;
    let side: Side = order.field_as(tags::SIDE)?;
    let quantity = order.require(tags::ORDER_QTY)?;
    let symbol = order.require(tags::SYMBOL)?;
    let price = order.field(tags::PRICE).unwrap_or("MKT");
    debug!(cl_ord_id, symbol, %side, quantity, price, "<---- NewOrderSingle");

    let mut report = Message::new(MsgType::ExecutionReport)
        .with_field(tags::ORDER_ID, format!("ORD-{cl_ord_id}"))
        .with_field(tags::CL_ORD_ID, cl_ord_id)
        .with_field(tags::EXEC_ID, format!("EX-{cl_ord_id}"))
        .with_field(tags::EXEC_TYPE, "0")
        .with_field(tags::ORD_STATUS, "0")
        .with_field(tags::SYMBOL, symbol)
        .with_field(tags::SECURITY_ID, "GB00BH4HKS39")
        .with_field(tags::SECURITY_ID_SOURCE, "4")
        .with_field(tags::SIDE, side.to_string())
        .with_field(tags::ORDER_QTY, quantity)
        .with_field(tags::LEAVES_QTY, "0")
        .with_field(tags::CUM_QTY, "0")
        .with_field(tags::AVG_PX, "0")
        .with_field(tags::HANDL_INST, "1");
    for tag in [tags::PRICE, tags::ACCOUNT, tags::CURRENCY] {
        if let Some(value) = order.field(tag) {
            report.set_field(tag, value);
        }
    }
    Ok(report)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();
    let cfg = ExampleConfig::server();

    let logon_sent = handler_fn(on_logon_sent);
    let new_order = handler_fn(on_new_order);
    let on_connect = listener_fn(move |connection, _from, _to| {
        let logon_sent = Arc::clone(&logon_sent);
        let new_order = Arc::clone(&new_order);
        async move {
            info!(peer = ?connection.peer_addr(), "accepted connection");
            connection.add_message_handler(logon_sent, Direction::Outbound, MsgType::Logon);
            connection.add_message_handler(new_order, Direction::Inbound, MsgType::NewOrderSingle);
            Ok::<(), HandlerError>(())
        }
    });
    let on_disconnected = listener_fn(|connection, from, _to| async move {
        info!(peer = ?connection.peer_addr(), %from, "disconnected");
        Ok::<(), HandlerError>(())
    });

    let engine = Engine::builder(cfg.session_config(false)?)
        .with_validator(Arc::new(LoggingValidator))
        .with_listener(ConnectionState::Connecting, on_connect)
        .with_listener(ConnectionState::Disconnected, on_disconnected)
        .build()?;

    let acceptor = Acceptor::bind(engine, cfg.addr()).await?;
    info!(addr = %acceptor.local_addr()?, "order server listening");
    acceptor
        .run_until(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;
    Ok(())
}
