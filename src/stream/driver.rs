//! Task that owns the streaming worker.
//!
//! Everything that touches [`StreamWorker`] runs inside one tokio task:
//! caller commands, fetch completions and pump ticks are multiplexed with
//! `select!`, so the worker never needs a lock of its own.

use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{self, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::StreamConfig;
use crate::error::{StreamError, TransportError};
use crate::io::Transport;
use crate::pyramid::SharedPyramid;

use super::events::{StreamEvent, StreamProgress, StreamState};
use super::handshake::{self, HandshakeResult, Resource};
use super::viewport::Viewport;
use super::worker::{FetchOrder, StreamWorker};

/// Caller → worker messages.
pub(crate) enum Command {
    SetConnection(Arc<dyn Transport>),
    BindImage(SharedPyramid),
    Handshake {
        resource: Resource,
        reply: oneshot::Sender<HandshakeResult>,
    },
    StartStreaming,
    ViewportChanged(Viewport),
    Abort,
    Progress(oneshot::Sender<StreamProgress>),
}

/// Results of spawned transport requests, fed back into the task.
enum Completion {
    Fetch {
        request_id: u64,
        result: Result<Bytes, TransportError>,
    },
    Handshake {
        connection: u64,
        resource: Resource,
        result: HandshakeResult,
        reply: oneshot::Sender<HandshakeResult>,
    },
}

pub(crate) struct Driver {
    worker: StreamWorker,
    transport: Option<Arc<dyn Transport>>,
    /// Bumped on every new connection so late handshake failures from an
    /// older one are not held against it
    connection: u64,
    fetch_task: Option<JoinHandle<()>>,
    pump: Interval,
    commands: mpsc::UnboundedReceiver<Command>,
    completions_tx: mpsc::UnboundedSender<Completion>,
    completions_rx: mpsc::UnboundedReceiver<Completion>,
    events: mpsc::UnboundedSender<StreamEvent>,
}

impl Driver {
    pub(crate) fn new(
        config: &StreamConfig,
        commands: mpsc::UnboundedReceiver<Command>,
        events: mpsc::UnboundedSender<StreamEvent>,
    ) -> Self {
        let mut pump = time::interval(config.pump_interval);
        pump.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();

        Self {
            worker: StreamWorker::new(config.notify_policy),
            transport: None,
            connection: 0,
            fetch_task: None,
            pump,
            commands,
            completions_tx,
            completions_rx,
            events,
        }
    }

    /// Run until every handle has been dropped.
    pub(crate) async fn run(mut self) {
        debug!("Stream driver started");
        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => break,
                },
                Some(completion) = self.completions_rx.recv() => {
                    self.handle_completion(completion);
                }
                _ = self.pump.tick(), if self.worker.state() == StreamState::Streaming => {
                    self.on_tick();
                }
            }
        }

        self.cancel_fetch();
        debug!("Stream driver stopped");
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::SetConnection(transport) => {
                self.cancel_fetch();
                self.connection += 1;
                info!(location = transport.location(), "Connecting");
                self.transport = Some(transport);
                self.worker.set_connection();
            }
            Command::BindImage(image) => {
                self.cancel_fetch();
                self.worker.bind_image(image);
            }
            Command::Handshake { resource, reply } => self.start_handshake(resource, reply),
            Command::StartStreaming => match self.worker.start_streaming() {
                Ok(events) => {
                    self.pump.reset();
                    self.emit(events);
                }
                Err(e) => {
                    warn!(error = %e, "Cannot start streaming");
                    self.emit([StreamEvent::Error(e.to_string())]);
                }
            },
            Command::ViewportChanged(viewport) => self.worker.on_viewport_changed(viewport),
            Command::Abort => {
                self.worker.abort();
                self.cancel_fetch();
            }
            Command::Progress(reply) => {
                let _ = reply.send(self.worker.progress());
            }
        }
    }

    fn handle_completion(&mut self, completion: Completion) {
        match completion {
            Completion::Fetch { request_id, result } => {
                let events = self.worker.on_fetch_completed(request_id, result);
                self.emit(events);
            }
            Completion::Handshake {
                connection,
                resource,
                result,
                reply,
            } => {
                if let Err(e) = &result {
                    warn!(resource = resource.path(), error = %e, "Handshake failed");
                    // Only the live, non-aborted connection is marked.
                    if connection == self.connection
                        && self.worker.state() != StreamState::Aborted
                    {
                        self.worker.mark_handshake_failed();
                        self.emit([StreamEvent::Error(e.to_string())]);
                    }
                } else {
                    debug!(resource = resource.path(), "Handshake completed");
                }
                let _ = reply.send(result);
            }
        }
    }

    fn on_tick(&mut self) {
        let Some(order) = self.worker.poll_fetch() else {
            return;
        };
        let Some(transport) = self.transport.clone() else {
            let events = self
                .worker
                .on_fetch_completed(order.request_id, Err(TransportError::Aborted));
            self.emit(events);
            return;
        };
        self.fetch_task = Some(spawn_fetch(transport, order, self.completions_tx.clone()));
    }

    fn start_handshake(&mut self, resource: Resource, reply: oneshot::Sender<HandshakeResult>) {
        let Some(transport) = self.transport.clone() else {
            let _ = reply.send(Err(StreamError::NotConnected));
            return;
        };
        let connection = self.connection;
        let completions = self.completions_tx.clone();

        debug!(resource = resource.path(), "Requesting");
        tokio::spawn(async move {
            let result = handshake::perform(transport.as_ref(), resource).await;
            let _ = completions.send(Completion::Handshake {
                connection,
                resource,
                result,
                reply,
            });
        });
    }

    fn cancel_fetch(&mut self) {
        if let Some(task) = self.fetch_task.take() {
            task.abort();
        }
    }

    fn emit(&self, events: impl IntoIterator<Item = StreamEvent>) {
        for event in events {
            // Nobody listening is not an error.
            let _ = self.events.send(event);
        }
    }
}

fn spawn_fetch(
    transport: Arc<dyn Transport>,
    order: FetchOrder,
    completions: mpsc::UnboundedSender<Completion>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let result = transport.get(&order.path).await;
        let _ = completions.send(Completion::Fetch {
            request_id: order.request_id,
            result,
        });
    })
}
