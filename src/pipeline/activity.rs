//! Transient, in-process activity flags.
//!
//! Nothing here is persisted.  [`Activity`] counts running splits and
//! generations per document (each document behind its own lock) and keeps a
//! process-wide busy counter so callers can wait for quiescence.
//!
//! Every `begin_*` call returns an [`ActivityGuard`]; the count is released
//! when the guard drops, whether the task succeeded, failed or panicked.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::Notify;

use crate::store::DocumentId;

/// Counters for one document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DocActivity {
    pub splitting: u32,
    pub in_flight: u32,
}

impl DocActivity {
    fn is_idle(&self) -> bool {
        self.splitting == 0 && self.in_flight == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Split,
    Generation,
    /// Queued dispatch work; counts toward [`Activity::wait_idle`] only.
    Dispatch,
}

/// A document has a slot only while one of its counters is non-zero.
#[derive(Debug, Default)]
pub struct Activity {
    docs: Mutex<HashMap<DocumentId, Arc<Mutex<DocActivity>>>>,
    busy: AtomicUsize,
    idle: Notify,
}

impl Activity {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn snapshot(&self, document: DocumentId) -> DocActivity {
        let docs = self.docs.lock().unwrap_or_else(|e| e.into_inner());
        docs.get(&document)
            .map(|slot| *slot.lock().unwrap_or_else(|e| e.into_inner()))
            .unwrap_or_default()
    }

    fn begin(self: &Arc<Self>, document: DocumentId, kind: Kind) -> ActivityGuard {
        if kind != Kind::Dispatch {
            let mut docs = self.docs.lock().unwrap_or_else(|e| e.into_inner());
            let mut counts = docs
                .entry(document)
                .or_default()
                .lock()
                .unwrap_or_else(|e| e.into_inner());
            match kind {
                Kind::Split => counts.splitting += 1,
                Kind::Generation => counts.in_flight += 1,
                Kind::Dispatch => {}
            }
        }
        self.busy.fetch_add(1, Ordering::SeqCst);
        ActivityGuard {
            activity: Arc::clone(self),
            document,
            kind,
        }
    }

    fn end(&self, document: DocumentId, kind: Kind) {
        if kind != Kind::Dispatch {
            // Map lock first, then the slot, same order as `begin`.
            let mut docs = self.docs.lock().unwrap_or_else(|e| e.into_inner());
            let emptied = docs.get(&document).is_some_and(|slot| {
                let mut counts = slot.lock().unwrap_or_else(|e| e.into_inner());
                match kind {
                    Kind::Split => counts.splitting = counts.splitting.saturating_sub(1),
                    Kind::Generation => counts.in_flight = counts.in_flight.saturating_sub(1),
                    Kind::Dispatch => {}
                }
                counts.is_idle()
            });
            if emptied {
                docs.remove(&document);
            }
        }
        if self.busy.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.idle.notify_waiters();
        }
    }

    pub fn begin_split(self: &Arc<Self>, document: DocumentId) -> ActivityGuard {
        self.begin(document, Kind::Split)
    }

    pub fn begin_generation(self: &Arc<Self>, document: DocumentId) -> ActivityGuard {
        self.begin(document, Kind::Generation)
    }

    pub fn begin_dispatch(self: &Arc<Self>, document: DocumentId) -> ActivityGuard {
        self.begin(document, Kind::Dispatch)
    }

    /// Generations of `document` currently scheduled or running here.
    pub fn in_flight(&self, document: DocumentId) -> u32 {
        self.snapshot(document).in_flight
    }

    pub fn is_splitting(&self, document: DocumentId) -> bool {
        self.snapshot(document).splitting > 0
    }

    /// Number of guards alive across all documents.
    pub fn busy(&self) -> usize {
        self.busy.load(Ordering::SeqCst)
    }

    /// Resolve once no split, generation or queued dispatch is outstanding.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            tokio::pin!(notified);
            // Register before checking so a release in between is not missed.
            notified.as_mut().enable();
            if self.busy() == 0 {
                return;
            }
            notified.await;
        }
    }

    /// Drop the bookkeeping of a deleted document.
    ///
    /// Guards still alive for it release into nothing.
    pub fn forget(&self, document: DocumentId) {
        let mut docs = self.docs.lock().unwrap_or_else(|e| e.into_inner());
        docs.remove(&document);
    }

    #[cfg(test)]
    fn tracked(&self) -> usize {
        self.docs.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

/// Releases one unit of activity on drop.
#[derive(Debug)]
#[must_use = "activity is released as soon as the guard is dropped"]
pub struct ActivityGuard {
    activity: Arc<Activity>,
    document: DocumentId,
    kind: Kind,
}

impl ActivityGuard {
    pub fn document(&self) -> DocumentId {
        self.document
    }
}

impl Drop for ActivityGuard {
    fn drop(&mut self) {
        self.activity.end(self.document, self.kind);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    const DOC: DocumentId = DocumentId(1);

    #[test]
    fn guards_count_per_document() {
        let activity = Activity::new();
        let a = activity.begin_generation(DOC);
        let b = activity.begin_generation(DOC);
        let other = activity.begin_generation(DocumentId(2));

        assert_eq!(activity.in_flight(DOC), 2);
        assert_eq!(activity.in_flight(DocumentId(2)), 1);
        assert_eq!(activity.busy(), 3);

        drop(a);
        assert_eq!(activity.in_flight(DOC), 1);
        drop(b);
        drop(other);
        assert_eq!(activity.in_flight(DOC), 0);
        assert_eq!(activity.busy(), 0);
    }

    #[test]
    fn split_flag_follows_guard() {
        let activity = Activity::new();
        assert!(!activity.is_splitting(DOC));
        let guard = activity.begin_split(DOC);
        assert!(activity.is_splitting(DOC));
        assert_eq!(activity.in_flight(DOC), 0);
        drop(guard);
        assert!(!activity.is_splitting(DOC));
    }

    #[test]
    fn dispatch_guard_only_counts_as_busy() {
        let activity = Activity::new();
        let guard = activity.begin_dispatch(DOC);
        assert_eq!(activity.busy(), 1);
        assert_eq!(activity.in_flight(DOC), 0);
        assert!(!activity.is_splitting(DOC));
        drop(guard);
        assert_eq!(activity.busy(), 0);
    }

    #[test]
    fn idle_documents_are_not_tracked() {
        let activity = Activity::new();
        for id in 1..=50 {
            let split = activity.begin_split(DocumentId(id));
            let generation = activity.begin_generation(DocumentId(id));
            drop(split);
            assert_eq!(activity.tracked(), 1);
            drop(generation);
        }
        assert_eq!(activity.tracked(), 0);
        assert_eq!(activity.busy(), 0);
    }

    #[test]
    fn forgotten_document_is_not_recreated_by_a_late_guard() {
        let activity = Activity::new();
        let guard = activity.begin_generation(DOC);
        activity.forget(DOC);
        assert_eq!(activity.in_flight(DOC), 0);

        drop(guard);
        assert_eq!(activity.tracked(), 0);
        assert_eq!(activity.busy(), 0);
    }

    #[tokio::test]
    async fn wait_idle_returns_immediately_when_idle() {
        let activity = Activity::new();
        tokio::time::timeout(Duration::from_secs(1), activity.wait_idle())
            .await
            .expect("should already be idle");
    }

    #[tokio::test]
    async fn wait_idle_resolves_after_last_guard() {
        let activity = Activity::new();
        let guard = activity.begin_generation(DOC);

        let waiter = {
            let activity = Arc::clone(&activity);
            tokio::spawn(async move { activity.wait_idle().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(guard);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should wake")
            .unwrap();
    }
}
