//! Concrete chat backends selected by `assistant.implementation`.
//!
//! Every backend implements [`ChatBackend`], the in-process mirror of the
//! C1 contract from the design doc: given the chat history, push
//! role/content chunks to `outbound` as they are produced, polling `cancel`
//! between chunks. The caller (see `worker::process`) is responsible for
//! emitting the `Error`-then-`Done` / plain `Done` terminator sequence —
//! a backend only ever reports success or an error from `generate`.

mod llama;
mod llama_mock;
mod mock;
mod obj;

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use crossbeam_channel::Sender;

pub use llama::LlamaBackend;
pub use llama_mock::LlamaMockBackend;
pub use mock::MockBackend;
pub use obj::ObjBackend;

use crate::error::Result;
use crate::models::TokenChunk;

/// One request's worth of generation, run synchronously on a dedicated
/// thread inside the worker process.
pub trait ChatBackend: Send {
    fn generate(
        &mut self,
        history: &[TokenChunk],
        outbound: &Sender<TokenChunk>,
        cancel: &Arc<AtomicBool>,
    ) -> Result<()>;
}

/// Builds the configured backend. `model_path`/`lora_path` are only
/// consulted by `llama`.
pub fn build(
    implementation: &str,
    model_path: Option<&std::path::Path>,
    lora_path: Option<&std::path::Path>,
) -> Result<Box<dyn ChatBackend>> {
    match implementation {
        "llama" => Ok(Box::new(LlamaBackend::load(model_path, lora_path)?)),
        "llama_mock" => Ok(Box::new(LlamaMockBackend::default())),
        "mock" => Ok(Box::new(MockBackend::default())),
        "obj" => Ok(Box::new(ObjBackend::default())),
        other => Err(crate::error::AssistantError::WorkerFailure(format!(
            "unknown assistant.implementation {other:?}"
        ))),
    }
}
