use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::Sender;

use super::ChatBackend;
use crate::error::Result;
use crate::models::{Role, TokenChunk};

/// Replays a fixed token list containing one fenced mesh block, used to
/// exercise the parser end-to-end without a real model — mirrors
/// `ObjChatAssistant` in the original source.
const TOKENS: &[&str] = &[
    "here ", "is", " ", "your ", "obj", " ", "model:", "\n", "```", "obj", "\n", "v", " ", "1",
    " ", "2", " ", "3", "\n", "f", " ", "1", " ", "2", " ", "3", "\n", "```", "\n", "done", "?",
];
const CADENCE: Duration = Duration::from_millis(5);

#[derive(Default)]
pub struct ObjBackend;

impl ChatBackend for ObjBackend {
    fn generate(
        &mut self,
        _history: &[TokenChunk],
        outbound: &Sender<TokenChunk>,
        cancel: &Arc<AtomicBool>,
    ) -> Result<()> {
        for (i, token) in TOKENS.iter().enumerate() {
            if cancel.load(Ordering::Relaxed) {
                return Ok(());
            }
            let chunk = if i == 0 {
                TokenChunk::new(Role::Assistant, *token)
            } else {
                TokenChunk {
                    role: None,
                    content: token.to_string(),
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
