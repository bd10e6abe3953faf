use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::Sender;

use super::ChatBackend;
use crate::error::Result;
use crate::models::{Role, TokenChunk};

/// Numbered tokens on a fixed cadence, with no reference to the request's
/// history — exercises the pool/runner/orchestrator plumbing without
/// loading anything, the way `MockChatAssistant` in the original source
/// stands in for a real model during development.
const TOKEN_COUNT: usize = 12;
const CADENCE: Duration = Duration::from_millis(15);

#[derive(Default)]
pub struct MockBackend;

impl ChatBackend for MockBackend {
    fn generate(
        &mut self,
        _history: &[TokenChunk],
        outbound: &Sender<TokenChunk>,
        cancel: &Arc<AtomicBool>,
    ) -> Result<()> {
        for i in 0..TOKEN_COUNT {
            if cancel.load(Ordering::Relaxed) {
                return Ok(());
            }
            let content = format!("token{i} ");
            let chunk = if i == 0 {
                TokenChunk::new(Role::Assistant, content)
            } else {
                TokenChunk {
                    role: None,
                    content,
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
