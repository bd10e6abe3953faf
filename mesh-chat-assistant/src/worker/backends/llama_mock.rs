use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::Sender;

use super::ChatBackend;
use crate::error::Result;
use crate::models::{Role, TokenChunk};

/// Fixed canned prose, split on whitespace into one chunk per word —
/// mirrors `LlamaMock` in the original source: same chat-shaped streaming
/// contract as the real `llama` backend (role on the first chunk only),
/// fixed content, used for integration tests that want realistic prose
/// without the weight of loading a model.
const CANNED: &str = "Sure, here's a quick summary of what you asked for. \
Let me know if you'd like any adjustments.";
const CADENCE: Duration = Duration::from_millis(10);

#[derive(Default)]
pub struct LlamaMockBackend;

impl ChatBackend for LlamaMockBackend {
    fn generate(
        &mut self,
        _history: &[TokenChunk],
        outbound: &Sender<TokenChunk>,
        cancel: &Arc<AtomicBool>,
    ) -> Result<()> {
        for (i, word) in CANNED.split_inclusive(' ').enumerate() {
            if cancel.load(Ordering::Relaxed) {
                return Ok(());
            }
            let chunk = if i == 0 {
                TokenChunk::new(Role::Assistant, word)
            } else {
                TokenChunk {
                    role: None,
                    content: word.to_string(),
                }
            };
            if outbound.send(chunk).is_err() {
                return Ok(());
            }
            std::thread::sleep(CADENCE);
        }
        Ok(())
    }
}
