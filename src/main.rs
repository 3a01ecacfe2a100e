//! Terminal harness: connects the sync engine to a game server over
//! WebSocket and renders snapshots as log lines. Press `b` + Enter to buzz,
//! a digit + Enter to answer.

use std::{env, sync::Arc};

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_stream::StreamExt;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use trivia_sync::{EngineConfig, transport::ws::WsTransport};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let url =
        env::var("TRIVIA_SERVER_URL").unwrap_or_else(|_| "ws://localhost:8080/game".into());
    let room_code = env::var("TRIVIA_ROOM_CODE").context("TRIVIA_ROOM_CODE must be set")?;
    let user_id = env::var("TRIVIA_USER_ID").unwrap_or_else(|_| {
        let guest = Uuid::new_v4().to_string();
        info!(%guest, "TRIVIA_USER_ID not set; playing as a guest");
        guest
    });

    let config = EngineConfig::new(room_code, user_id)?;
    let (transport, events) = WsTransport::connect(&url).await?;
    let engine = trivia_sync::spawn(config, Arc::new(transport), events);

    let mut snapshots = engine.snapshot_stream();
    let mut input = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            maybe_snapshot = snapshots.next() => match maybe_snapshot {
                Some(snapshot) => {
                    info!(
                        phase = ?snapshot.phase,
                        question = ?snapshot.question_text,
                        remaining_secs = snapshot.remaining_secs(),
                        show_buzzer = snapshot.show_buzzer,
                        scores = ?snapshot.scores,
                        "state"
                    );
                    if snapshot.ended {
                        info!(winner = ?snapshot.winner, "game over");
                        break;
                    }
                }
                None => break,
            },
            line = input.next_line() => match line {
                Ok(Some(line)) => handle_line(&engine, line.trim()),
                Ok(None) | Err(_) => break,
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    engine.shutdown().await;
    Ok(())
}

/// Map a terminal line onto an engine command.
fn handle_line(engine: &trivia_sync::EngineHandle, line: &str) {
    if line.eq_ignore_ascii_case("b") {
        if engine.press_buzzer().is_err() {
            warn!("engine stopped");
        }
        return;
    }
    match line.parse::<usize>() {
        Ok(selected_index) => {
            if engine.submit_answer(selected_index).is_err() {
                warn!("engine stopped");
            }
        }
        Err(_) => warn!(%line, "unrecognized input; use `b` or an option index"),
    }
}

/// Configure tracing subscribers so logs include spans by default.
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,trivia_sync=debug".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
