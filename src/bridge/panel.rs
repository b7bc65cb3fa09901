//! Panel lifecycle.
//!
//! A [`Panel`] pairs one [`PresentationSurface`] with the [`HostBridge`]
//! through two FIFO channels of serialized boundary messages. Each panel
//! holds two subscriptions (tokio tasks):
//!
//! - the bridge task drains surface → host messages and calls the backend,
//!   one message at a time
//! - the surface task drains host → surface messages, applies them and
//!   publishes a fresh render
//!
//! [`PanelManager`] owns at most one live panel and implements the
//! `Uninitialized → Active → Disposed` state machine.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use serde::Serialize;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{BridgeError, Result};
use crate::protocol::{self, HostMessage, SurfaceMessage};
use crate::surface::{PresentationSurface, RenderedSurface};
use crate::transcript::Transcript;

use super::HostBridge;

/// Frames buffered per viewer before it starts skipping.
const UPDATE_CAPACITY: usize = 16;

/// Lifecycle of the panel slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PanelState {
    Uninitialized,
    Active,
    Disposed,
}

/// Serializable view of a panel, also used to revive one.
#[derive(Debug, Clone, Serialize)]
pub struct PanelSnapshot {
    pub id: Uuid,
    pub title: String,
    pub state: PanelState,
    pub busy: bool,
    pub reveals: usize,
    pub transcript: Transcript,
}

/// Handle to a chat panel. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Panel {
    inner: Arc<PanelInner>,
}

#[derive(Debug)]
struct PanelInner {
    id: Uuid,
    title: String,
    surface: Mutex<PresentationSurface>,
    disposed: AtomicBool,
    reveals: AtomicUsize,
    to_host: mpsc::UnboundedSender<String>,
    updates: Mutex<Option<broadcast::Sender<RenderedSurface>>>,
    subscriptions: Mutex<Vec<JoinHandle<()>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Panel {
    /// Open a panel and start its relay tasks.
    ///
    /// Must be called within a Tokio runtime.
    fn open(title: String, bridge: HostBridge, transcript: Transcript) -> Self {
        let (to_host, from_surface) = mpsc::unbounded_channel();
        let (to_surface, from_host) = mpsc::unbounded_channel();
        let (updates, _) = broadcast::channel(UPDATE_CAPACITY);

        let inner = Arc::new(PanelInner {
            id: Uuid::new_v4(),
            title,
            surface: Mutex::new(PresentationSurface::from_transcript(transcript)),
            disposed: AtomicBool::new(false),
            reveals: AtomicUsize::new(0),
            to_host,
            updates: Mutex::new(Some(updates)),
            subscriptions: Mutex::new(Vec::new()),
        });

        let bridge_task = tokio::spawn(run_bridge(bridge, from_surface, to_surface));
        let surface_task = tokio::spawn(run_surface(Arc::downgrade(&inner), from_host));
        lock(&inner.subscriptions).extend([bridge_task, surface_task]);

        info!(name: "panel.created", panel_id = %inner.id, title = %inner.title, "Panel created");
        Self { inner }
    }

    #[must_use]
    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.inner.title
    }

    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn state(&self) -> PanelState {
        if self.is_disposed() {
            PanelState::Disposed
        } else {
            PanelState::Active
        }
    }

    /// Number of times the panel was re-focused instead of recreated.
    #[must_use]
    pub fn reveals(&self) -> usize {
        self.inner.reveals.load(Ordering::Relaxed)
    }

    /// Submit user input to the surface.
    ///
    /// Returns `Ok(false)` when the surface ignored it (blank or busy).
    pub fn submit(&self, text: &str) -> Result<bool> {
        self.ensure_active()?;
        // Frames are published under the surface lock so viewers see them
        // in the same order as the state changes.
        let mut surface = lock(&self.inner.surface);
        let Some(message) = surface.submit(text)? else {
            debug!(panel_id = %self.inner.id, "Submission ignored");
            return Ok(false);
        };
        self.inner.publish(surface.render());
        self.inner.post(&message)?;
        Ok(true)
    }

    /// Raise a host-level alert from the surface.
    pub fn alert(&self, text: &str) -> Result<()> {
        self.ensure_active()?;
        let message = lock(&self.inner.surface).alert(text);
        self.inner.post(&message)
    }

    /// Current frame, without publishing it.
    #[must_use]
    pub fn render(&self) -> RenderedSurface {
        lock(&self.inner.surface).render()
    }

    /// Re-render and push the full transcript (the view became visible).
    pub fn refresh(&self) -> Result<RenderedSurface> {
        self.ensure_active()?;
        let surface = lock(&self.inner.surface);
        let frame = surface.render();
        self.inner.publish(frame.clone());
        Ok(frame)
    }

    /// Current frame plus a receiver for every later one.
    pub fn subscribe(&self) -> Result<(RenderedSurface, broadcast::Receiver<RenderedSurface>)> {
        let receiver = lock(&self.inner.updates)
            .as_ref()
            .map(broadcast::Sender::subscribe)
            .ok_or(BridgeError::PanelDisposed)?;
        let frame = lock(&self.inner.surface).render();
        Ok((frame, receiver))
    }

    #[must_use]
    pub fn snapshot(&self) -> PanelSnapshot {
        let surface = lock(&self.inner.surface);
        PanelSnapshot {
            id: self.inner.id,
            title: self.inner.title.clone(),
            state: self.state(),
            busy: surface.is_busy(),
            reveals: self.reveals(),
            transcript: surface.transcript().clone(),
        }
    }

    /// Close the panel and release its subscriptions.
    ///
    /// Returns `false` if it was already disposed.
    pub fn dispose(&self) -> bool {
        if self.inner.disposed.swap(true, Ordering::AcqRel) {
            return false;
        }
        for task in lock(&self.inner.subscriptions).drain(..) {
            task.abort();
        }
        // Dropping the sender ends every open event stream.
        lock(&self.inner.updates).take();
        info!(name: "panel.disposed", panel_id = %self.inner.id, "Panel disposed");
        true
    }

    fn reveal(&self) {
        let reveals = self.inner.reveals.fetch_add(1, Ordering::Relaxed) + 1;
        info!(name: "panel.revealed", panel_id = %self.inner.id, reveals, "Panel revealed");
    }

    fn ensure_active(&self) -> Result<()> {
        if self.is_disposed() {
            Err(BridgeError::PanelDisposed)
        } else {
            Ok(())
        }
    }
}

impl PanelInner {
    fn post(&self, message: &SurfaceMessage) -> Result<()> {
        let raw = protocol::encode(message)?;
        if self.to_host.send(raw).is_err() {
            return Err(BridgeError::PanelDisposed);
        }
        Ok(())
    }

    fn publish(&self, frame: RenderedSurface) {
        if let Some(updates) = lock(&self.updates).as_ref() {
            // No viewers is fine.
            let _ = updates.send(frame);
        }
    }

    fn apply(&self, message: HostMessage) {
        let alert = {
            let mut surface = lock(&self.surface);
            let alert = surface.on_host_message(message);
            self.publish(surface.render());
            alert
        };
        if let Some(alert) = alert
            && let Err(e) = self.post(&alert)
        {
            warn!(panel_id = %self.id, error = %e, "Failed to post alert");
        }
    }
}

async fn run_bridge(
    bridge: HostBridge,
    mut from_surface: mpsc::UnboundedReceiver<String>,
    to_surface: mpsc::UnboundedSender<String>,
) {
    while let Some(raw) = from_surface.recv().await {
        let message = match protocol::decode::<SurfaceMessage>(&raw) {
            Ok(message) => message,
            Err(e) => {
                warn!(error = %e, "Undecodable surface message");
                continue;
            }
        };
        let Some(reply) = bridge.handle(message).await else {
            continue;
        };
        match protocol::encode(&reply) {
            Ok(raw) => {
                if to_surface.send(raw).is_err() {
                    break;
                }
            }
            Err(e) => warn!(error = %e, "Failed to encode host message"),
        }
    }
    debug!("Bridge task finished");
}

async fn run_surface(panel: Weak<PanelInner>, mut from_host: mpsc::UnboundedReceiver<String>) {
    while let Some(raw) = from_host.recv().await {
        let Some(inner) = panel.upgrade() else {
            break;
        };
        match protocol::decode::<HostMessage>(&raw) {
            Ok(message) => inner.apply(message),
            Err(e) => warn!(panel_id = %inner.id, error = %e, "Undecodable host message"),
        }
    }
    debug!("Surface task finished");
}

// ─────────────────────────────────────────────────────────────────────────────
// Panel manager
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug)]
enum Slot {
    Uninitialized,
    Active(Panel),
    Disposed,
}

/// Owns the single live panel of a window.
#[derive(Debug)]
pub struct PanelManager {
    bridge: HostBridge,
    title: String,
    slot: Mutex<Slot>,
}

impl PanelManager {
    #[must_use]
    pub fn new(bridge: HostBridge, title: impl Into<String>) -> Self {
        Self {
            bridge,
            title: title.into(),
            slot: Mutex::new(Slot::Uninitialized),
        }
    }

    /// Return the live panel, focusing it, or open a new one.
    ///
    /// Must be called within a Tokio runtime.
    pub fn create_or_show(&self) -> Panel {
        let mut slot = lock(&self.slot);
        if let Slot::Active(panel) = &*slot
            && !panel.is_disposed()
        {
            panel.reveal();
            return panel.clone();
        }
        let panel = Panel::open(self.title.clone(), self.bridge.clone(), Transcript::new());
        *slot = Slot::Active(panel.clone());
        panel
    }

    /// Recreate the panel from a saved transcript, replacing any live one.
    pub fn revive(&self, transcript: Transcript) -> Panel {
        let mut slot = lock(&self.slot);
        if let Slot::Active(previous) = &*slot {
            previous.dispose();
        }
        info!(name: "panel.revived", entries = transcript.len(), "Reviving panel");
        let panel = Panel::open(self.title.clone(), self.bridge.clone(), transcript);
        *slot = Slot::Active(panel.clone());
        panel
    }

    /// The live panel.
    pub fn current(&self) -> Result<Panel> {
        match &*lock(&self.slot) {
            Slot::Uninitialized => Err(BridgeError::NoPanel),
            Slot::Active(panel) if !panel.is_disposed() => Ok(panel.clone()),
            Slot::Active(_) | Slot::Disposed => Err(BridgeError::PanelDisposed),
        }
    }

    /// Dispose the live panel.
    pub fn dispose(&self) -> Result<()> {
        let mut slot = lock(&self.slot);
        match &*slot {
            Slot::Uninitialized => Err(BridgeError::NoPanel),
            Slot::Disposed => Err(BridgeError::PanelDisposed),
            Slot::Active(panel) => {
                panel.dispose();
                *slot = Slot::Disposed;
                Ok(())
            }
        }
    }

    #[must_use]
    pub fn state(&self) -> PanelState {
        match &*lock(&self.slot) {
            Slot::Uninitialized => PanelState::Uninitialized,
            Slot::Active(panel) => panel.state(),
            Slot::Disposed => PanelState::Disposed,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::bridge::testing::{Script, bridge};
    use crate::transcript::{Role, TranscriptEntry};

    fn manager(script: Script) -> PanelManager {
        let (bridge, _backend, _log) = bridge(script);
        PanelManager::new(bridge, "Air Chat")
    }

    async fn next_idle_frame(rx: &mut broadcast::Receiver<RenderedSurface>) -> RenderedSurface {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let frame = rx.recv().await.unwrap();
                if !frame.busy {
                    return frame;
                }
            }
        })
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_singleton_lifecycle() {
        let panels = manager(Script::Echo);
        assert_eq!(panels.state(), PanelState::Uninitialized);
        assert!(matches!(panels.current(), Err(BridgeError::NoPanel)));

        let first = panels.create_or_show();
        assert_eq!(panels.state(), PanelState::Active);

        let again = panels.create_or_show();
        assert_eq!(again.id(), first.id());
        assert_eq!(first.reveals(), 1);

        panels.dispose().unwrap();
        assert_eq!(panels.state(), PanelState::Disposed);
        assert!(first.is_disposed());
        assert!(matches!(panels.current(), Err(BridgeError::PanelDisposed)));
        assert!(matches!(first.submit("hi"), Err(BridgeError::PanelDisposed)));
        assert!(matches!(panels.dispose(), Err(BridgeError::PanelDisposed)));

        let fresh = panels.create_or_show();
        assert_ne!(fresh.id(), first.id());
        assert_eq!(fresh.state(), PanelState::Active);
    }

    #[tokio::test]
    async fn test_round_trip_through_bridge() {
        let panels = manager(Script::Echo);
        let panel = panels.create_or_show();
        let (initial, mut rx) = panel.subscribe().unwrap();
        assert!(initial.html.is_empty());

        assert!(panel.submit("hello").unwrap());
        let frame = next_idle_frame(&mut rx).await;

        assert!(frame.html.contains("echo: hello"));
        let snapshot = panel.snapshot();
        assert!(!snapshot.busy);
        assert_eq!(
            snapshot.transcript.entries(),
            [
                TranscriptEntry::user("hello"),
                TranscriptEntry::assistant("echo: hello")
            ]
        );
    }

    #[tokio::test]
    async fn test_second_submit_blocked_until_reply() {
        let panels = manager(Script::Echo);
        let panel = panels.create_or_show();
        let (_, mut rx) = panel.subscribe().unwrap();

        assert!(panel.submit("one").unwrap());
        assert!(!panel.submit("two").unwrap());

        next_idle_frame(&mut rx).await;
        assert!(panel.submit("two").unwrap());
    }

    #[tokio::test]
    async fn test_backend_error_renders_error_entry() {
        let panels = manager(Script::Reject("model offline".to_string()));
        let panel = panels.create_or_show();
        let (_, mut rx) = panel.subscribe().unwrap();

        panel.submit("hello").unwrap();
        let frame = next_idle_frame(&mut rx).await;

        assert!(frame.html.contains("Error: model offline"));
        let last = panel.snapshot().transcript.last().cloned().unwrap();
        assert_eq!(last.role, Role::Error);
    }

    #[tokio::test]
    async fn test_dispose_closes_event_stream() {
        let panels = manager(Script::Echo);
        let panel = panels.create_or_show();
        let (_, mut rx) = panel.subscribe().unwrap();

        assert!(panel.dispose());
        assert!(!panel.dispose());

        assert!(matches!(
            rx.recv().await,
            Err(broadcast::error::RecvError::Closed)
        ));
        assert!(matches!(panel.subscribe(), Err(BridgeError::PanelDisposed)));
    }

    #[tokio::test]
    async fn test_revive_restores_transcript() {
        let panels = manager(Script::Echo);
        let old = panels.create_or_show();

        let saved = Transcript::from_entries(vec![
            TranscriptEntry::user("hello"),
            TranscriptEntry::assistant("hi"),
        ]);
        let revived = panels.revive(saved.clone());

        assert!(old.is_disposed());
        assert_eq!(revived.snapshot().transcript, saved);
        assert_eq!(panels.current().unwrap().id(), revived.id());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_last_published_frame_matches_surface() {
        let panels = manager(Script::Echo);
        let panel = panels.create_or_show();
        let (_, mut rx) = panel.subscribe().unwrap();

        for round in 0..200 {
            assert!(panel.submit(&format!("hello {round}")).unwrap());
            tokio::time::timeout(Duration::from_secs(5), async {
                while panel.snapshot().busy {
                    tokio::task::yield_now().await;
                }
            })
            .await
            .unwrap();

            let mut last = None;
            loop {
                match rx.try_recv() {
                    Ok(frame) => last = Some(frame),
                    Err(broadcast::error::TryRecvError::Lagged(_)) => {}
                    Err(_) => break,
                }
            }
            assert_eq!(last, Some(panel.render()), "stale frame in round {round}");
        }
    }

    #[tokio::test]
    async fn test_alert_reaches_host_notifications() {
        let (bridge, backend, log) = bridge(Script::Echo);
        let panels = PanelManager::new(bridge, "Air Chat");
        let panel = panels.create_or_show();

        panel.alert("view lost its stream").unwrap();
        tokio::time::timeout(Duration::from_secs(5), async {
            while log.recent().is_empty() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();

        assert_eq!(log.recent()[0].message, "view lost its stream");
        assert!(backend.received.lock().unwrap().is_empty());
        assert!(!panel.snapshot().busy);

        panel.dispose();
        assert!(matches!(panel.alert("late"), Err(BridgeError::PanelDisposed)));
    }

    #[tokio::test]
    async fn test_refresh_pushes_current_frame() {
        let panels = manager(Script::Echo);
        let panel = panels.revive(Transcript::from_entries(vec![TranscriptEntry::user("x")]));
        let (_, mut rx) = panel.subscribe().unwrap();

        let frame = panel.refresh().unwrap();
        assert_eq!(rx.recv().await.unwrap(), frame);
        assert!(frame.html.contains("user-message"));
    }
}
