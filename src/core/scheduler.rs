//! Debounces bursts of edits into one processing request per document.

use super::text_document::TextDocument;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

#[derive(Debug)]
struct PendingDocument {
    document: Arc<TextDocument>,
    created_at: Instant,
    /// Sent to the processor, which has not taken it yet.
    dispatched: bool,
}

#[derive(Debug, Default)]
struct SchedulerState {
    pending: HashMap<String, PendingDocument>,
    ticking: bool,
}

/// Holds edited documents until they have been quiet for `timeout`, then
/// hands their URI to the processor through an mpsc channel.
///
/// A document stays pending until the processor [`take`](Self::take)s it,
/// so [`is_scheduled`](Self::is_scheduled) is true right up to the moment
/// processing starts.
#[derive(Debug)]
pub struct DocumentScheduler {
    timeout: Mutex<Duration>,
    state: Mutex<SchedulerState>,
    sender: mpsc::UnboundedSender<Arc<TextDocument>>,
}

impl DocumentScheduler {
    pub fn new(timeout: Duration) -> (Arc<Self>, mpsc::UnboundedReceiver<Arc<TextDocument>>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let scheduler = Arc::new(Self {
            timeout: Mutex::new(timeout),
            state: Mutex::new(SchedulerState::default()),
            sender,
        });
        (scheduler, receiver)
    }

    pub fn set_timeout(&self, timeout: Duration) {
        *self.timeout.lock() = timeout;
    }

    /// Mark `document` pending. Returns `false` if its URI already was, in
    /// which case the newer content replaces the pending one but the original
    /// timestamp is kept.
    pub fn schedule(self: &Arc<Self>, document: Arc<TextDocument>) -> bool {
        let mut state = self.state.lock();
        if let Some(pending) = state.pending.get_mut(&document.uri) {
            if document.version >= pending.document.version {
                pending.document = document;
            }
            return false;
        }

        tracing::debug!("Scheduled {} (version {})", document.uri, document.version);
        state.pending.insert(
            document.uri.clone(),
            PendingDocument {
                document,
                created_at: Instant::now(),
                dispatched: false,
            },
        );

        if !state.ticking {
            match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    state.ticking = true;
                    handle.spawn(Self::tick(Arc::downgrade(self)));
                }
                Err(err) => tracing::warn!("Cannot start scheduler outside a runtime: {}", err),
            }
        }
        true
    }

    pub fn is_scheduled(&self, uri: &str) -> bool {
        self.state.lock().pending.contains_key(uri)
    }

    /// Drop the pending entry without processing it.
    pub fn cancel(&self, uri: &str) -> bool {
        self.state.lock().pending.remove(uri).is_some()
    }

    /// Remove the pending entry and return its newest content.
    pub fn take(&self, uri: &str) -> Option<Arc<TextDocument>> {
        self.state
            .lock()
            .pending
            .remove(uri)
            .map(|pending| pending.document)
    }

    pub fn pending_count(&self) -> usize {
        self.state.lock().pending.len()
    }

    async fn tick(scheduler: Weak<Self>) {
        loop {
            let Some(this) = scheduler.upgrade() else {
                return;
            };
            let Some(deadline) = this.dispatch_due() else {
                return;
            };
            drop(this);
            tokio::time::sleep_until(deadline).await;
        }
    }

    /// Dispatch every undispatched entry older than the timeout and return the
    /// next deadline, or stop ticking when nothing is left to wait for.
    fn dispatch_due(&self) -> Option<Instant> {
        let timeout = *self.timeout.lock();
        let now = Instant::now();
        let mut state = self.state.lock();
        let mut next: Option<Instant> = None;

        for pending in state.pending.values_mut().filter(|p| !p.dispatched) {
            let deadline = pending.created_at + timeout;
            if deadline <= now {
                pending.dispatched = true;
                if self.sender.send(Arc::clone(&pending.document)).is_err() {
                    tracing::debug!("Processor gone, dropping {}", pending.document.uri);
                }
            } else {
                next = Some(next.map_or(deadline, |n| n.min(deadline)));
            }
        }

        if next.is_none() {
            state.ticking = false;
        }
        next
    }
}
