// THEORY:
// The `SessionActor` runs a `RegionSession` on its own tokio task behind a
// mailbox. All access goes through `SessionMessage`s; requests that need an
// answer carry a `oneshot` reply.
//
// Key architectural principles:
// 1.  **One Owner, No Locks**: The actor task is the only code touching the
//     session. Pointer events, timer expiries and classification requests are
//     serialized by the mailbox.
// 2.  **Timers Post Messages**: The settle delay and the threshold debounce are
//     `Debouncer`s whose jobs send a message back into the mailbox. A timer
//     never touches the session itself.
// 3.  **Weak Self-Address**: Timer jobs hold a weak sender. When every
//     `SessionHandle` is dropped the mailbox closes and the actor winds down,
//     even with timers still pending.
// 4.  **Snapshots Out of Band**: Classifier and overlay snapshots are exposed
//     through `watch` receivers, so readers never queue behind edits.

use crate::core_modules::bin_mask::BinMask;
use crate::core_modules::debounce::Debouncer;
use crate::core_modules::editor::{EditOutcome, EditorCommand};
use crate::core_modules::polygon::Vertex;
use crate::core_modules::raster::LabelRaster;
use crate::error::{RegionError, Result};
use crate::session::{LoadOutcome, RegionSession};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

const MAILBOX_CAPACITY: usize = 64;

/// Message type for the session actor.
pub enum SessionMessage {
    Edit(EditorCommand, oneshot::Sender<EditOutcome>),
    /// A release's settle delay has expired.
    Settle(Vertex),
    /// A new threshold value; applied once the control goes quiet.
    SetThreshold(f64),
    /// The debounced threshold is due.
    ApplyThreshold(f64),
    SetSamples {
        xs: Vec<f64>,
        ys: Vec<f64>,
        scores: Vec<f64>,
        reply: oneshot::Sender<Result<()>>,
    },
    Classify {
        xs: Vec<f64>,
        ys: Vec<f64>,
        reply: oneshot::Sender<Result<Vec<u8>>>,
    },
    SaveRegion(PathBuf, oneshot::Sender<Result<PathBuf>>),
    LoadRegion(PathBuf, oneshot::Sender<Result<LoadOutcome>>),
    Shutdown,
}

/// The task-side state of a running session.
pub struct SessionActor {
    session: RegionSession,
    mailbox: mpsc::WeakSender<SessionMessage>,
    settle: Debouncer,
    threshold: Debouncer,
}

impl SessionActor {
    /// Spawns the actor on the current tokio runtime.
    pub fn spawn(session: RegionSession) -> (SessionHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(MAILBOX_CAPACITY);
        let handle = SessionHandle {
            tx: tx.clone(),
            mask_rx: session.subscribe_mask(),
            overlay_rx: session.subscribe_overlay(),
        };
        let actor = SessionActor {
            settle: Debouncer::new(session.config().settle_delay()),
            threshold: Debouncer::new(session.config().debounce_interval()),
            mailbox: tx.downgrade(),
            session,
        };
        let task = tokio::spawn(actor.run(rx));
        (handle, task)
    }

    async fn run(mut self, mut rx: mpsc::Receiver<SessionMessage>) {
        while let Some(message) = rx.recv().await {
            match message {
                SessionMessage::Edit(command, reply) => {
                    let outcome = self.edit(command);
                    let _ = reply.send(outcome);
                }
                SessionMessage::Settle(at) => {
                    self.edit(EditorCommand::Settle(at));
                }
                SessionMessage::SetThreshold(value) => {
                    let mailbox = self.mailbox.clone();
                    self.threshold.trigger(async move {
                        post(mailbox, SessionMessage::ApplyThreshold(value)).await;
                    });
                }
                SessionMessage::ApplyThreshold(value) => {
                    if let Err(err) = self.session.apply_threshold(value) {
                        log::warn!("threshold {value} not applied: {err}");
                    }
                }
                SessionMessage::SetSamples { xs, ys, scores, reply } => {
                    let _ = reply.send(self.session.set_samples(xs, ys, scores));
                }
                SessionMessage::Classify { xs, ys, reply } => {
                    let _ = reply.send(self.session.classify(&xs, &ys));
                }
                SessionMessage::SaveRegion(path, reply) => {
                    let _ = reply.send(self.session.save_region(path));
                }
                SessionMessage::LoadRegion(path, reply) => {
                    let _ = reply.send(self.session.load_region(path));
                }
                SessionMessage::Shutdown => break,
            }
        }
        self.settle.cancel();
        self.threshold.cancel();
        log::debug!("session actor stopped");
    }

    /// Applies a command and arms the settle timer when a release asks for it.
    fn edit(&mut self, command: EditorCommand) -> EditOutcome {
        let outcome = self.session.apply(command);
        if let EditOutcome::SettleRequested(at) = outcome {
            let mailbox = self.mailbox.clone();
            self.settle.trigger(async move {
                post(mailbox, SessionMessage::Settle(at)).await;
            });
        }
        outcome
    }
}

async fn post(mailbox: mpsc::WeakSender<SessionMessage>, message: SessionMessage) {
    if let Some(tx) = mailbox.upgrade() {
        let _ = tx.send(message).await;
    }
}

/// A cloneable front door to a running `SessionActor`.
#[derive(Clone)]
pub struct SessionHandle {
    tx: mpsc::Sender<SessionMessage>,
    mask_rx: watch::Receiver<Arc<BinMask>>,
    overlay_rx: watch::Receiver<Arc<LabelRaster>>,
}

impl SessionHandle {
    async fn request<T>(&self, build: impl FnOnce(oneshot::Sender<T>) -> SessionMessage) -> Result<T> {
        let (reply, response) = oneshot::channel();
        self.tx
            .send(build(reply))
            .await
            .map_err(|_| RegionError::SessionClosed)?;
        response.await.map_err(|_| RegionError::SessionClosed)
    }

    pub async fn edit(&self, command: EditorCommand) -> Result<EditOutcome> {
        self.request(|reply| SessionMessage::Edit(command, reply)).await
    }

    /// Reports a threshold change; only the last of a quick burst is applied.
    pub async fn set_threshold(&self, value: f64) -> Result<()> {
        self.tx
            .send(SessionMessage::SetThreshold(value))
            .await
            .map_err(|_| RegionError::SessionClosed)
    }

    pub async fn set_samples(&self, xs: Vec<f64>, ys: Vec<f64>, scores: Vec<f64>) -> Result<()> {
        self.request(|reply| SessionMessage::SetSamples { xs, ys, scores, reply })
            .await?
    }

    pub async fn classify(&self, xs: Vec<f64>, ys: Vec<f64>) -> Result<Vec<u8>> {
        self.request(|reply| SessionMessage::Classify { xs, ys, reply }).await?
    }

    pub async fn save_region(&self, path: impl Into<PathBuf>) -> Result<PathBuf> {
        let path = path.into();
        self.request(|reply| SessionMessage::SaveRegion(path, reply)).await?
    }

    pub async fn load_region(&self, path: impl Into<PathBuf>) -> Result<LoadOutcome> {
        let path = path.into();
        self.request(|reply| SessionMessage::LoadRegion(path, reply)).await?
    }

    /// The latest classifier snapshot, without going through the mailbox.
    pub fn mask(&self) -> Arc<BinMask> {
        Arc::clone(&self.mask_rx.borrow())
    }

    pub fn mask_updates(&self) -> watch::Receiver<Arc<BinMask>> {
        self.mask_rx.clone()
    }

    pub fn overlay_updates(&self) -> watch::Receiver<Arc<LabelRaster>> {
        self.overlay_rx.clone()
    }

    pub async fn shutdown(&self) {
        let _ = self.tx.send(SessionMessage::Shutdown).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::bin_mask::{BinGeometry, ChannelPair};
    use crate::session::SessionConfig;
    use std::time::Duration;

    fn spawn_session() -> (SessionHandle, JoinHandle<()>) {
        let geometry = BinGeometry::from_bounds(0.0, 40.0, 1.0, 0.0, 40.0, 1.0).unwrap();
        let config = SessionConfig::new(ChannelPair::new("04", "08"), geometry, 2);
        SessionActor::spawn(RegionSession::new(config).unwrap())
    }

    async fn draw_square(handle: &SessionHandle) {
        for command in [
            EditorCommand::SelectLayer(1),
            EditorCommand::BeginPolygon,
            EditorCommand::Click(Vertex::new(10, 10)),
            EditorCommand::Click(Vertex::new(20, 10)),
            EditorCommand::Click(Vertex::new(20, 20)),
            EditorCommand::Click(Vertex::new(10, 20)),
            EditorCommand::Finish,
        ] {
            handle.edit(command).await.unwrap();
        }
    }

    #[tokio::test(start_paused = true)]
    async fn release_settles_after_the_delay() {
        let (handle, _task) = spawn_session();
        draw_square(&handle).await;
        assert_eq!(handle.classify(vec![25.5], vec![15.5]).await.unwrap(), vec![0]);

        handle.edit(EditorCommand::Click(Vertex::new(20, 10))).await.unwrap();
        let outcome = handle.edit(EditorCommand::Release(Vertex::new(30, 10))).await.unwrap();
        assert_eq!(outcome, EditOutcome::SettleRequested(Vertex::new(30, 10)));
        assert_eq!(handle.classify(vec![25.5], vec![12.5]).await.unwrap(), vec![0]);

        tokio::time::sleep(Duration::from_millis(350)).await;
        assert_eq!(handle.classify(vec![25.5], vec![12.5]).await.unwrap(), vec![1]);
    }

    #[tokio::test(start_paused = true)]
    async fn double_click_wins_over_the_pending_settle() {
        let (handle, _task) = spawn_session();
        draw_square(&handle).await;

        handle.edit(EditorCommand::Click(Vertex::new(20, 15))).await.unwrap();
        handle.edit(EditorCommand::Release(Vertex::new(20, 15))).await.unwrap();
        let outcome = handle.edit(EditorCommand::DoubleClick(Vertex::new(20, 15))).await.unwrap();
        assert_eq!(outcome, EditOutcome::Changed { layer: 1 });
        handle.edit(EditorCommand::Release(Vertex::new(20, 15))).await.unwrap();

        tokio::time::sleep(Duration::from_millis(350)).await;
        assert_eq!(handle.mask().raster().covered_cells(), 0);
        assert_eq!(handle.classify(vec![15.0], vec![15.0]).await.unwrap(), vec![0]);
    }

    #[tokio::test(start_paused = true)]
    async fn threshold_burst_applies_only_the_last_value() {
        let (handle, _task) = spawn_session();
        handle
            .set_samples(vec![1.5, 2.5, 3.5], vec![1.5, 2.5, 3.5], vec![0.2, 0.5, 0.8])
            .await
            .unwrap();
        let mut overlay = handle.overlay_updates();
        overlay.borrow_and_update();

        for value in [0.1, 0.3, 0.6] {
            handle.set_threshold(value).await.unwrap();
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(!overlay.has_changed().unwrap());

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(overlay.has_changed().unwrap());
        let latest = overlay.borrow_and_update().clone();
        assert_eq!(latest.covered_cells(), 1);
        assert_eq!(latest.get(3, 3), 1);
    }

    #[tokio::test]
    async fn mask_updates_follow_edits() {
        let (handle, _task) = spawn_session();
        let mut updates = handle.mask_updates();
        draw_square(&handle).await;
        assert!(updates.has_changed().unwrap());
        assert_eq!(updates.borrow_and_update().classify_pair(15.0, 15.0), 1);
    }

    #[tokio::test]
    async fn requests_after_shutdown_report_a_closed_session() {
        let (handle, task) = spawn_session();
        handle.shutdown().await;
        task.await.unwrap();
        let err = handle.edit(EditorCommand::Finish).await.unwrap_err();
        assert!(matches!(err, RegionError::SessionClosed));
    }
}
