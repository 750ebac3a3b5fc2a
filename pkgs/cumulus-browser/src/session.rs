//! Async driver for the [`Engine`]
//!
//! A single task owns the engine and applies commands and outcomes one at a
//! time. Remote calls run in their own tasks and report back through the
//! same channel, so they overlap freely while state changes stay serialized.

use cumulus_fs::{ApiError, ProgressCallback, RemoteFs};
use futures::channel::mpsc;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc::{
    unbounded_channel, UnboundedReceiver, UnboundedSender, WeakUnboundedSender,
};
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::config::BrowserConfig;
use crate::engine::{Command, Effect, Engine, Outcome};
use crate::error::{BrowserError, Result};
use crate::events::BrowserEvent;
use crate::ids::TimerId;
use crate::snapshot::BrowserSnapshot;

pub enum Message {
    Command {
        command: Command,
        reply: oneshot::Sender<Result<()>>,
    },
    Outcome(Outcome),
    Shutdown,
}

/// The event loop that owns an [`Engine`]
pub struct BrowserSession {
    engine: Engine,
    remote: Arc<dyn RemoteFs>,
    messages: WeakUnboundedSender<Message>,
    snapshots: watch::Sender<BrowserSnapshot>,
    events: mpsc::UnboundedSender<BrowserEvent>,
    timers: HashMap<TimerId, JoinHandle<()>>,
}

impl BrowserSession {
    /// Start a session on the current tokio runtime.
    ///
    /// The loop stops on [`SessionHandle::shutdown`] or once every handle
    /// and in-flight call is gone.
    pub fn spawn(
        config: BrowserConfig,
        remote: Arc<dyn RemoteFs>,
    ) -> Result<(SessionHandle, mpsc::UnboundedReceiver<BrowserEvent>)> {
        let engine = Engine::new(config)?;
        let (message_sender, message_receiver) = unbounded_channel();
        let (event_sender, event_receiver) = mpsc::unbounded();
        let (snapshot_sender, snapshot_receiver) = watch::channel(engine.snapshot());

        let session = BrowserSession {
            engine,
            remote,
            messages: message_sender.downgrade(),
            snapshots: snapshot_sender,
            events: event_sender,
            timers: HashMap::new(),
        };
        tokio::spawn(session.run(message_receiver));

        let handle = SessionHandle {
            messages: message_sender,
            snapshots: snapshot_receiver,
        };
        Ok((handle, event_receiver))
    }

    async fn run(mut self, mut messages: UnboundedReceiver<Message>) {
        info!("Browser session started");

        while let Some(message) = messages.recv().await {
            match message {
                Message::Command { command, reply } => {
                    let result = self.handle_command(command);
                    self.publish();
                    if reply.send(result).is_err() {
                        debug!("Command caller went away before the reply");
                    }
                }
                Message::Outcome(outcome) => {
                    self.handle_outcome(outcome);
                    self.publish();
                }
                Message::Shutdown => break,
            }
        }

        for (_, timer) in self.timers.drain() {
            timer.abort();
        }
        info!("Browser session stopped");
    }

    #[instrument(skip_all, fields(command = command.name()))]
    fn handle_command(&mut self, command: Command) -> Result<()> {
        match self.engine.dispatch(command) {
            Ok(effects) => {
                self.execute(effects);
                Ok(())
            }
            Err(e) => {
                warn!("Rejected command: {}", e);
                Err(e)
            }
        }
    }

    #[instrument(level = "debug", skip_all)]
    fn handle_outcome(&mut self, outcome: Outcome) {
        if let Outcome::TimerFired { timer } = &outcome {
            self.timers.remove(timer);
        }
        let effects = self.engine.resolve(outcome);
        self.execute(effects);
    }

    fn publish(&self) {
        self.snapshots.send_replace(self.engine.snapshot());
    }

    fn execute(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::FetchDirectory { request, path } => {
                    self.spawn_remote(move |remote| async move {
                        let result = remote.fetch_directory(&path).await;
                        Outcome::DirectoryLoaded { request, result }
                    });
                }
                Effect::FetchContentPage {
                    request,
                    directory_id,
                    offset,
                    limit,
                } => {
                    self.spawn_remote(move |remote| async move {
                        let result = remote
                            .fetch_content_page(&directory_id, offset, limit, None)
                            .await;
                        Outcome::ContentPageLoaded { request, result }
                    });
                }
                Effect::SearchPage {
                    request,
                    path,
                    search,
                    offset,
                    limit,
                } => {
                    self.spawn_remote(move |remote| async move {
                        let result = remote.search_page(&path, &search, offset, limit).await;
                        Outcome::SearchPageLoaded { request, result }
                    });
                }
                Effect::UploadFile {
                    task,
                    target_path,
                    file,
                    options,
                } => {
                    let Some(progress_sender) = self.messages.upgrade() else {
                        debug!("Session is closing, failing upload {}", task);
                        let effects = self.engine.resolve(Outcome::UploadFinished {
                            task,
                            result: Err(ApiError::transport(
                                "Session closed before the upload started",
                            )),
                        });
                        self.execute(effects);
                        continue;
                    };
                    let on_progress: ProgressCallback = Arc::new(move |progress: u8| {
                        let outcome = Outcome::UploadProgress {
                            task,
                            progress,
                            at: Instant::now(),
                        };
                        let _ = progress_sender.send(Message::Outcome(outcome));
                    });
                    self.spawn_remote(move |remote| async move {
                        let result = remote
                            .upload_file(&target_path, &file, &options, on_progress)
                            .await;
                        Outcome::UploadFinished { task, result }
                    });
                }
                Effect::MoveNodes {
                    request,
                    node_ids,
                    destination,
                } => {
                    self.spawn_remote(move |remote| async move {
                        let result = remote.move_nodes(&node_ids, &destination).await;
                        Outcome::MoveFinished { request, result }
                    });
                }
                Effect::CreateDirectory { request, path } => {
                    self.spawn_remote(move |remote| async move {
                        let result = remote.create_directory(&path).await;
                        Outcome::DirectoryCreated { request, result }
                    });
                }
                Effect::DeleteNodes {
                    request,
                    node_ids,
                    delete_content,
                } => {
                    self.spawn_remote(move |remote| async move {
                        let result = remote.delete_nodes(&node_ids, delete_content).await;
                        Outcome::NodesDeleted { request, result }
                    });
                }
                Effect::StartTimer { timer, delay } => {
                    let Some(sender) = self.messages.upgrade() else {
                        continue;
                    };
                    let handle = tokio::spawn(async move {
                        tokio::time::sleep(delay).await;
                        let _ = sender.send(Message::Outcome(Outcome::TimerFired { timer }));
                    });
                    if let Some(previous) = self.timers.insert(timer, handle) {
                        previous.abort();
                    }
                }
                Effect::CancelTimer { timer } => {
                    if let Some(handle) = self.timers.remove(&timer) {
                        debug!("Cancelled timer {}", timer);
                        handle.abort();
                    }
                }
                Effect::Notify(event) => {
                    if let Err(e) = self.events.unbounded_send(event) {
                        debug!("No listener for browser event: {}", e);
                    }
                }
            }
        }
    }

    /// Run a remote call in its own task and feed its outcome back
    fn spawn_remote<F, Fut>(&self, call: F)
    where
        F: FnOnce(Arc<dyn RemoteFs>) -> Fut,
        Fut: Future<Output = Outcome> + Send + 'static,
    {
        let Some(sender) = self.messages.upgrade() else {
            debug!("Session is closing, dropping remote call");
            return;
        };
        let call = call(self.remote.clone());
        tokio::spawn(async move {
            let outcome = call.await;
            if sender.send(Message::Outcome(outcome)).is_err() {
                debug!("Session closed before the outcome arrived");
            }
        });
    }
}

/// The UI's handle on a running session
#[derive(Clone)]
pub struct SessionHandle {
    messages: UnboundedSender<Message>,
    snapshots: watch::Receiver<BrowserSnapshot>,
}

impl SessionHandle {
    /// Send a command and wait until the engine has applied it.
    ///
    /// The snapshot observed after this returns already reflects the command.
    pub async fn dispatch(&self, command: Command) -> Result<()> {
        let (reply, response) = oneshot::channel();
        self.messages
            .send(Message::Command { command, reply })
            .map_err(|_| BrowserError::SessionClosed)?;
        response.await.map_err(|_| BrowserError::SessionClosed)?
    }

    pub fn snapshot(&self) -> BrowserSnapshot {
        self.snapshots.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<BrowserSnapshot> {
        self.snapshots.clone()
    }

    /// Wait until a published snapshot satisfies `predicate`
    pub async fn wait_for<F>(&self, mut predicate: F) -> Result<BrowserSnapshot>
    where
        F: FnMut(&BrowserSnapshot) -> bool,
    {
        let mut snapshots = self.snapshots.clone();
        loop {
            {
                let snapshot = snapshots.borrow_and_update();
                if predicate(&snapshot) {
                    return Ok(snapshot.clone());
                }
            }
            snapshots
                .changed()
                .await
                .map_err(|_| BrowserError::SessionClosed)?;
        }
    }

    pub fn shutdown(&self) -> Result<()> {
        self.messages
            .send(Message::Shutdown)
            .map_err(|_| BrowserError::SessionClosed)
    }
}
