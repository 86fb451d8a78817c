// ── Update coordinator ──
//
// Batches structural-change notifications during bulk loads and tracks
// the single global UI-lock flag. While a bulk region is active,
// NodeChanged notifications are coalesced; closing the region flushes
// exactly one BulkUpdateComplete carrying the stopwatch reading.
//
// Regions do not stack: a second begin_bulk while one is active is a
// no-op, matching the single global suppression flag of the UI it backs.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use tokio::sync::broadcast;

use crate::event::{NodePath, TreeEvent};

const EVENT_CHANNEL_SIZE: usize = 256;

#[derive(Debug, Default)]
struct CoordinatorInner {
    bulk_active: bool,
    ui_locked: bool,
    stopwatch: Option<Instant>,
}

/// Shared notification hub for the tree. Cheaply cloneable.
#[derive(Clone)]
pub struct UpdateCoordinator {
    inner: Arc<Mutex<CoordinatorInner>>,
    events: broadcast::Sender<TreeEvent>,
}

impl UpdateCoordinator {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_SIZE);
        Self {
            inner: Arc::new(Mutex::new(CoordinatorInner::default())),
            events,
        }
    }

    /// Subscribe to tree notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<TreeEvent> {
        self.events.subscribe()
    }

    /// Emit an event directly, bypassing bulk suppression. Used for
    /// non-structural notifications (locks, errors, open requests).
    pub(crate) fn emit(&self, event: TreeEvent) {
        // No receivers is fine; the send result is deliberately ignored.
        let _ = self.events.send(event);
    }

    /// Report a structural change at `path`. Coalesced while a bulk
    /// region is active, emitted immediately otherwise.
    pub fn node_changed(&self, path: NodePath) {
        let suppressed = self.locked().bulk_active;
        if !suppressed {
            self.emit(TreeEvent::NodeChanged { path });
        }
    }

    // ── Bulk regions ─────────────────────────────────────────────────

    /// Open the suppression region and start the stopwatch. Returns
    /// `true` if this call activated the region; `false` means one was
    /// already active and this call was a no-op.
    pub fn begin_bulk(&self) -> bool {
        let mut inner = self.locked();
        if inner.bulk_active {
            return false;
        }
        inner.bulk_active = true;
        inner.stopwatch = Some(Instant::now());
        true
    }

    /// Close the region: flush one coalesced notification plus the
    /// stopwatch reading. A no-op when no region is active.
    pub fn end_bulk(&self) {
        let elapsed = {
            let mut inner = self.locked();
            if !inner.bulk_active {
                return;
            }
            inner.bulk_active = false;
            inner.stopwatch.take().map(|started| started.elapsed())
        };
        self.emit(TreeEvent::BulkUpdateComplete { elapsed });
    }

    /// Scoped bulk region: the flush is guaranteed on every exit path,
    /// early failure included.
    pub fn bulk_region(&self) -> BulkRegion {
        let owner = self.begin_bulk();
        BulkRegion {
            coordinator: self.clone(),
            owner,
        }
    }

    // ── Global UI lock ───────────────────────────────────────────────

    pub fn lock_ui(&self) {
        self.locked().ui_locked = true;
    }

    pub fn unlock_ui(&self) {
        self.locked().ui_locked = false;
    }

    pub fn is_ui_locked(&self) -> bool {
        self.locked().ui_locked
    }

    fn locked(&self) -> MutexGuard<'_, CoordinatorInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for UpdateCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

/// Guard for a scoped bulk region. Only the guard that actually opened
/// the region flushes on drop; nested guards are inert.
pub struct BulkRegion {
    coordinator: UpdateCoordinator,
    owner: bool,
}

impl Drop for BulkRegion {
    fn drop(&mut self) {
        if self.owner {
            self.coordinator.end_bulk();
        }
    }
}
