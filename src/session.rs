//! One feed session: the live pairing of a venue adapter with its
//! transport resources.
//!
//! The session task drives the connector, reconciles inbound frames
//! into its book buffer, and emits normalized snapshots. When the
//! connector signals failure it swaps in the REST poller with the
//! same instrument and the same emit channel — callers cannot tell
//! the difference except through [`FeedKind`]. Shutting the session
//! down releases whichever resource is active on every path.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::book::BookBuffer;
use crate::config::FeedConfig;
use crate::domain::{FeedKind, OrderBookSnapshot, Symbol};
use crate::poller::{PollEvent, RestPoller};
use crate::transport::{TransportEvent, WsConnector};
use crate::venues::VenueFeed;

/// Session output consumed by the store's publish stage.
#[derive(Debug)]
pub enum SessionEvent {
    /// A reconciled book update, tagged with the transport that
    /// produced it.
    Book {
        feed: FeedKind,
        snapshot: OrderBookSnapshot,
    },
    /// The streaming transport gave up; the fallback is starting.
    StreamFailed { error: String },
    /// One fallback fetch failed; polling continues.
    PollFailed { error: String },
}

pub struct FeedSession {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl FeedSession {
    /// Spawn a session for `symbol` on `feed`. Snapshots and failure
    /// notices arrive on `events` until shutdown.
    pub fn spawn(
        feed: Arc<dyn VenueFeed>,
        symbol: &Symbol,
        config: &FeedConfig,
        events: mpsc::Sender<SessionEvent>,
    ) -> FeedSession {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let instrument = feed.instrument(symbol);
        let task = tokio::spawn(run(feed, instrument, config.clone(), events, shutdown_rx));
        FeedSession {
            shutdown: shutdown_tx,
            task,
        }
    }

    /// Tear the session down: close the connector or poller and wait
    /// until the task has exited. After this returns, the session can
    /// never emit again.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        let _ = self.task.await;
    }
}

async fn run(
    feed: Arc<dyn VenueFeed>,
    instrument: String,
    config: FeedConfig,
    events: mpsc::Sender<SessionEvent>,
    mut shutdown: watch::Receiver<bool>,
) {
    let venue = feed.venue();
    info!(%venue, %instrument, "session starting");

    match stream_phase(&feed, &instrument, &config, &events, &mut shutdown).await {
        StreamEnd::Shutdown | StreamEnd::Closed => return,
        StreamEnd::Failed => {}
    }

    poll_phase(&feed, &instrument, &config, &events, &mut shutdown).await;
}

enum StreamEnd {
    /// Shutdown observed; everything already released.
    Shutdown,
    /// Stream over without failure (server closed normally or the
    /// consumer went away). No fallback.
    Closed,
    /// Transport failure signalled; fall back to polling.
    Failed,
}

async fn stream_phase(
    feed: &Arc<dyn VenueFeed>,
    instrument: &str,
    config: &FeedConfig,
    events: &mpsc::Sender<SessionEvent>,
    shutdown: &mut watch::Receiver<bool>,
) -> StreamEnd {
    let venue = feed.venue();
    let (transport_tx, mut transport_rx) = mpsc::channel(64);
    let subscribe = feed.subscribe_message(instrument);

    let connector = match WsConnector::open(
        feed.ws_url(),
        subscribe,
        config.transport.clone(),
        transport_tx,
    ) {
        Ok(handle) => handle,
        Err(e) => {
            warn!(%venue, error = %e, "could not open transport, falling back to polling");
            let _ = events
                .send(SessionEvent::StreamFailed {
                    error: e.to_string(),
                })
                .await;
            return StreamEnd::Failed;
        }
    };

    let mut book = BookBuffer::new();

    let end = loop {
        tokio::select! {
            _ = shutdown.changed() => break StreamEnd::Shutdown,
            event = transport_rx.recv() => match event {
                Some(TransportEvent::Message(raw)) => {
                    match feed.handle_message(&mut book, &raw) {
                        Ok(Some(snapshot)) => {
                            let update = SessionEvent::Book {
                                feed: FeedKind::Streaming,
                                snapshot,
                            };
                            if events.send(update).await.is_err() {
                                break StreamEnd::Closed;
                            }
                        }
                        Ok(None) => {}
                        Err(e) => {
                            // One bad frame never ends the stream.
                            warn!(%venue, error = %e, "discarding malformed message");
                        }
                    }
                }
                Some(TransportEvent::Failed(e)) => {
                    warn!(%venue, error = %e, "stream failed, engaging polling fallback");
                    let _ = events
                        .send(SessionEvent::StreamFailed { error: e.to_string() })
                        .await;
                    break StreamEnd::Failed;
                }
                None => {
                    debug!(%venue, "stream ended without failure");
                    break StreamEnd::Closed;
                }
            }
        }
    };

    // Streaming resources go away on every exit path, including the
    // switch to polling. Dropping the receiver first unblocks a
    // connector that is mid-send.
    drop(transport_rx);
    connector.shutdown().await;
    end
}

async fn poll_phase(
    feed: &Arc<dyn VenueFeed>,
    instrument: &str,
    config: &FeedConfig,
    events: &mpsc::Sender<SessionEvent>,
    shutdown: &mut watch::Receiver<bool>,
) {
    let (poll_tx, mut poll_rx) = mpsc::channel(16);
    let poller = RestPoller::start(
        Arc::clone(feed),
        instrument.to_string(),
        config.poll_interval(),
        reqwest::Client::new(),
        poll_tx,
    );

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            event = poll_rx.recv() => match event {
                Some(PollEvent::Snapshot(snapshot)) => {
                    let update = SessionEvent::Book {
                        feed: FeedKind::Polling,
                        snapshot,
                    };
                    if events.send(update).await.is_err() {
                        break;
                    }
                }
                Some(PollEvent::FetchFailed(error)) => {
                    let _ = events.send(SessionEvent::PollFailed { error }).await;
                }
                None => break,
            }
        }
    }

    drop(poll_rx);
    poller.shutdown().await;
}
