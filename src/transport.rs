//! WebSocket transport connector.
//!
//! Owns one streaming connection's lifecycle: open with a deadline,
//! replay the subscription after every successful open, deliver
//! inbound text frames in arrival order, and reconnect after abnormal
//! closures with linearly increasing delay against a fixed retry
//! budget. Failure is signalled at most once per connector; a closed
//! handle suppresses all further delivery.

use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::TransportConfig;
use crate::error::TransportError;

/// Events delivered to the connector's owner.
#[derive(Debug)]
pub enum TransportEvent {
    /// One inbound text frame, in arrival order.
    Message(String),
    /// The connector gave up. Fired at most once; the connector is
    /// finished afterwards.
    Failed(TransportError),
}

pub struct WsConnector;

impl WsConnector {
    /// Open a connector. `init_message` is sent exactly once after
    /// each successful open; events arrive on `events` until the
    /// handle is closed or the connector fails.
    pub fn open(
        url: &str,
        init_message: serde_json::Value,
        config: TransportConfig,
        events: mpsc::Sender<TransportEvent>,
    ) -> Result<ConnectorHandle, TransportError> {
        let url = Url::parse(url)?;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(run(url, init_message.to_string(), config, events, shutdown_rx));
        Ok(ConnectorHandle {
            shutdown: shutdown_tx,
            task,
        })
    }
}

/// Close handle for one connector instance. Closing cancels pending
/// timers, closes the connection gracefully, and permanently disables
/// further event delivery.
pub struct ConnectorHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl ConnectorHandle {
    /// Signal shutdown without waiting for teardown.
    pub fn close(&self) {
        let _ = self.shutdown.send(true);
    }

    /// Signal shutdown and wait until the connector task has exited.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        let _ = self.task.await;
    }
}

enum LoopEnd {
    /// Server closed with a normal status. Terminal, no failure.
    NormalClose,
    /// Anything else: error frames, transport errors, silent EOF.
    Abnormal(TransportError),
}

async fn run(
    url: Url,
    init: String,
    config: TransportConfig,
    events: mpsc::Sender<TransportEvent>,
    mut shutdown: watch::Receiver<bool>,
) {
    // Monotonic per connector: consecutive abnormal closures accumulate
    // toward the budget even across successful re-opens.
    let mut attempts: u32 = 0;

    loop {
        if *shutdown.borrow() {
            return;
        }

        debug!(%url, "opening websocket");
        let connect = tokio::time::timeout(config.connect_timeout(), connect_async(url.as_str()));
        let connected = tokio::select! {
            _ = shutdown.changed() => return,
            result = connect => result,
        };

        let ws = match connected {
            Ok(Ok((ws, _response))) => ws,
            Ok(Err(e)) => {
                if !backoff_or_fail(&mut attempts, &config, &events, &mut shutdown, e.into()).await
                {
                    return;
                }
                continue;
            }
            Err(_elapsed) => {
                // No open acknowledgment within the deadline: fail now
                // rather than burning the retry budget against a dead
                // endpoint.
                fail_once(
                    &events,
                    &shutdown,
                    TransportError::ConnectTimeout(config.connect_timeout()),
                )
                .await;
                return;
            }
        };

        info!(%url, "websocket connected");
        let (mut write, mut read) = ws.split();

        if let Err(e) = write.send(Message::text(init.clone())).await {
            if !backoff_or_fail(&mut attempts, &config, &events, &mut shutdown, e.into()).await {
                return;
            }
            continue;
        }

        let end = loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    let frame = CloseFrame {
                        code: CloseCode::Normal,
                        reason: "client disconnect".into(),
                    };
                    let _ = write.send(Message::Close(Some(frame))).await;
                    return;
                }
                frame = read.next() => match frame {
                    Some(Ok(Message::Text(text))) => {
                        if events.send(TransportEvent::Message(text.to_string())).await.is_err() {
                            // Receiver gone: the owner is shutting down.
                            let frame = CloseFrame {
                                code: CloseCode::Normal,
                                reason: "client disconnect".into(),
                            };
                            let _ = write.send(Message::Close(Some(frame))).await;
                            return;
                        }
                    }
                    Some(Ok(Message::Ping(payload))) => {
                        let _ = write.send(Message::Pong(payload)).await;
                    }
                    Some(Ok(Message::Close(frame))) => {
                        let normal = frame
                            .as_ref()
                            .map(|f| f.code == CloseCode::Normal)
                            .unwrap_or(false);
                        if normal {
                            break LoopEnd::NormalClose;
                        }
                        break LoopEnd::Abnormal(TransportError::Ws(
                            tokio_tungstenite::tungstenite::Error::ConnectionClosed,
                        ));
                    }
                    Some(Ok(_)) => {
                        // Binary, pong, raw frames: not part of the feed.
                    }
                    Some(Err(e)) => break LoopEnd::Abnormal(e.into()),
                    None => break LoopEnd::Abnormal(TransportError::Ws(
                        tokio_tungstenite::tungstenite::Error::ConnectionClosed,
                    )),
                }
            }
        };

        match end {
            LoopEnd::NormalClose => {
                info!(%url, "websocket closed by server");
                return;
            }
            LoopEnd::Abnormal(e) => {
                if !backoff_or_fail(&mut attempts, &config, &events, &mut shutdown, e).await {
                    return;
                }
            }
        }
    }
}

/// Sleep out the linear backoff for the next attempt, or report
/// failure once the budget is spent. Returns false when the caller
/// must stop (budget exhausted or shutdown observed).
async fn backoff_or_fail(
    attempts: &mut u32,
    config: &TransportConfig,
    events: &mpsc::Sender<TransportEvent>,
    shutdown: &mut watch::Receiver<bool>,
    cause: TransportError,
) -> bool {
    *attempts += 1;
    if *attempts > config.max_retries {
        fail_once(
            events,
            shutdown,
            TransportError::RetriesExhausted {
                attempts: *attempts,
                last: cause.to_string(),
            },
        )
        .await;
        return false;
    }

    let delay = config.backoff_step() * *attempts;
    warn!(error = %cause, attempt = *attempts, ?delay, "abnormal closure, reconnecting");
    tokio::select! {
        _ = shutdown.changed() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}

/// Deliver the single failure signal, unless the handle was closed
/// first (a closed connector never reports anything).
async fn fail_once(
    events: &mpsc::Sender<TransportEvent>,
    shutdown: &watch::Receiver<bool>,
    error: TransportError,
) {
    if *shutdown.borrow() {
        return;
    }
    warn!(error = %error, "transport failed");
    let _ = events.send(TransportEvent::Failed(error)).await;
}
