/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Order client: logs on, sends a handful of orders, waits for their
//! acknowledgments and logs out.

mod common;

use anyhow::{Context, bail};
use common::{ExampleConfig, init_logging};
use fixline::prelude::*;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::info;

const ORDERS: usize = 5;

fn new_order(n: usize) -> Message {
    let side = if n % 2 == 0 { Side::Buy } else { Side::Sell };
    Message::new(MsgType::NewOrderSingle)
        .with_field(tags::CL_ORD_ID, format!("CL-{n}"))
        .with_field(tags::SYMBOL, "VOD.L")
        .with_field(tags::SIDE, side.to_string())
        .with_field(tags::HANDL_INST, "1")
        .with_field(tags::ORD_TYPE, "2")
        .with_field(tags::ORDER_QTY, "100")
        .with_field(tags::PRICE, format!("{}.25", 100 + n))
        .with_field(tags::CURRENCY, "GBP")
        .with_field(tags::TRANSACT_TIME, Timestamp::now().format_millis().as_str())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();
    let cfg = ExampleConfig::client();

    let (tx, mut reports) = mpsc::unbounded_channel();
    let engine = Engine::builder(cfg.session_config(true)?).build()?;
    engine.add_message_handler(
        handler_fn(move |_connection, report| {
            let tx = tx.clone();
            async move {
                let _ = tx.send(report);
                Ok::<(), HandlerError>(())
            }
        }),
        Direction::Inbound,
        MsgType::ExecutionReport,
    );

    info!(addr = %cfg.addr(), "connecting");
    let connection = Initiator::new(engine).connect(cfg.addr()).await?;
    tokio::time::timeout(
        Duration::from_secs(10),
        connection.wait_for_state(ConnectionState::Connected),
    )
    .await
    .context("logon was not acknowledged")?;
    if connection.state() != ConnectionState::Connected {
        bail!("session ended during logon");
    }

    for n in 1..=ORDERS {
        let seq = connection.send(new_order(n)).await?;
        info!(seq = seq.value(), cl_ord_id = %format!("CL-{n}"), "order sent");
    }
    for _ in 0..ORDERS {
        let report = tokio::time::timeout(Duration::from_secs(10), reports.recv())
            .await
            .context("no ExecutionReport")?
            .context("connection closed")?;
        info!(
            cl_ord_id = report.field(tags::CL_ORD_ID).unwrap_or_default(),
            status = report.field(tags::ORD_STATUS).unwrap_or_default(),
            text = report.field(tags::TEXT).unwrap_or_default(),
            "execution report"
        );
    }

    connection.logout(Some("done")).await?;
    info!("logged out");
    Ok(())
}
