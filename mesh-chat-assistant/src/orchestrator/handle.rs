//! Stream handle state (spec.md §3).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use uuid::Uuid;

use crate::runner::CancelSignal;

/// Server-side state for one inference, created at `create_message` time
/// and removed from the registry when the subscribed stream terminates.
pub struct StreamHandle {
    pub id: Uuid,
    pub chat_id: u64,
    pub assistant_message_id: u64,
    is_running: AtomicBool,
    subscribed: AtomicBool,
    pub cancel: Arc<CancelSignal>,
}

impl StreamHandle {
    pub fn new(chat_id: u64, assistant_message_id: u64) -> Self {
        Self {
            id: Uuid::new_v4(),
            chat_id,
            assistant_message_id,
            is_running: AtomicBool::new(true),
            subscribed: AtomicBool::new(false),
            cancel: CancelSignal::new(),
        }
    }

    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::Acquire)
    }

    /// `stop()`'s effect on the handle: idempotent, safe after termination.
    pub fn stop(&self) {
        self.is_running.store(false, Ordering::Release);
        self.cancel.cancel();
    }

    /// Claims the single expected subscriber slot. A second call returns
    /// `false` — "a second subscription on the same handle is an error".
    pub fn claim_subscriber(&self) -> bool {
        self.subscribed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}
