//! Real local-model backend: Candle + a safetensors Llama checkpoint,
//! optionally merged with a LoRA adapter.
//!
//! Grounded on `continuum-core/src/inference/backends/llama_safetensors.rs`
//! (device selection, `Cache`/`Llama::load`, forward-pass GPU sync) and
//! `continuum-core/src/inference/backends/mod.rs::generate` (prefill, greedy/
//! temperature sampling loop, EOS check), generalized from a single-prompt
//! completion call to a streaming chat-history request. The LoRA merge path
//! is grounded on `continuum-core/src/inference/lora.rs`
//! (`load_lora_adapter`, `merge_lora_weight`, `map_lora_name_to_model_name`)
//! and `continuum-core/src/inference/model.rs::rebuild_with_stacked_lora`,
//! narrowed from the teacher's multi-adapter "genome" stack to the single
//! `assistant.lora_path` this spec's configuration names.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::generation::LogitsProcessor;
use candle_transformers::models::llama::{Cache, Config as LlamaConfig, Llama, LlamaEosToks};
use crossbeam_channel::Sender;
use safetensors::SafeTensors;
use tokenizers::Tokenizer;
use tracing::{info, warn};

use super::ChatBackend;
use crate::error::{AssistantError, Result};
use crate::models::{Role, TokenChunk};

const MAX_NEW_TOKENS: usize = 512;
const TEMPERATURE: f64 = 0.7;

pub struct LlamaBackend {
    model: Llama,
    config: LlamaConfig,
    tokenizer: Tokenizer,
    device: Device,
    dtype: DType,
    eos_token_ids: Vec<u32>,
}

impl LlamaBackend {
    /// Loads `config.json` + `tokenizer.json` + safetensors weights from
    /// `model_path` (a local directory, not a HuggingFace Hub download —
    /// the teacher's `model::load_model_by_id` downloads by repo id, but
    /// this spec's configuration only names a filesystem path). Applies a
    /// LoRA merge from `lora_path` when present.
    pub fn load(model_path: Option<&Path>, lora_path: Option<&Path>) -> Result<Self> {
        let model_path = model_path.ok_or_else(|| {
            AssistantError::WorkerFailure(
                "assistant.implementation=llama requires assistant.model_path".to_string(),
            )
        })?;

        let device = select_best_device();
        let dtype = DType::BF16;

        let config_path = model_path.join("config.json");
        let config_text = std::fs::read_to_string(&config_path)?;
        let llama_config: candle_transformers::models::llama::LlamaConfig =
            serde_json::from_str(&config_text)
                .map_err(|e| AssistantError::WorkerFailure(format!("bad config.json: {e}")))?;
        let config = llama_config.into_config(false);

        let tokenizer_path = model_path.join("tokenizer.json");
        let tokenizer = Tokenizer::from_file(&tokenizer_path).map_err(|e| {
            AssistantError::WorkerFailure(format!("failed to load tokenizer: {e}"))
        })?;

        let weight_paths = collect_weight_paths(model_path)?;

        let model = if let Some(lora_path) = lora_path {
            build_model_with_lora(&weight_paths, &device, dtype, &config, lora_path)?
        } else {
            let vb = unsafe {
                VarBuilder::from_mmaped_safetensors(&weight_paths, dtype, &device).map_err(|e| {
                    AssistantError::WorkerFailure(format!("failed to load weights: {e}"))
                })?
            };
            Llama::load(vb, &config)
                .map_err(|e| AssistantError::WorkerFailure(format!("failed to build model: {e}")))?
        };

        let eos_token_ids = match &config.eos_token_id {
            Some(LlamaEosToks::Single(id)) => vec![*id],
            Some(LlamaEosToks::Multiple(ids)) => ids.clone(),
            None => vec![128001, 128009],
        };

        Ok(Self {
            model,
            config,
            tokenizer,
            device,
            dtype,
            eos_token_ids,
        })
    }
}

impl ChatBackend for LlamaBackend {
    fn generate(
        &mut self,
        history: &[TokenChunk],
        outbound: &Sender<TokenChunk>,
        cancel: &Arc<AtomicBool>,
    ) -> Result<()> {
        let prompt = render_prompt(history);
        let encoding = self
            .tokenizer
            .encode(prompt, true)
            .map_err(|e| AssistantError::WorkerFailure(format!("tokenization failed: {e}")))?;
        let mut all_tokens = encoding.get_ids().to_vec();
        if all_tokens.is_empty() {
            return Err(AssistantError::WorkerFailure("empty prompt".to_string()));
        }

        let mut cache = Cache::new(true, self.dtype, &self.config, &self.device)
            .map_err(|e| AssistantError::WorkerFailure(format!("cache init failed: {e}")))?;

        let seed = rand::random::<u64>();
        let mut logits_processor = LogitsProcessor::new(seed, Some(TEMPERATURE), None);

        let mut index_pos = 0usize;
        let mut first_chunk = true;

        for step in 0..MAX_NEW_TOKENS {
            if cancel.load(Ordering::Relaxed) {
                return Ok(());
            }

            let context = if step == 0 {
                &all_tokens[..]
            } else {
                &all_tokens[all_tokens.len() - 1..]
            };
            let input = Tensor::new(context, &self.device)
                .and_then(|t| t.unsqueeze(0))
                .map_err(|e| AssistantError::WorkerFailure(format!("tensor build failed: {e}")))?;
            let logits = self
                .model
                .forward(&input, index_pos, &mut cache)
                .map_err(|e| AssistantError::WorkerFailure(format!("forward pass failed: {e}")))?;
            let logits = logits
                .squeeze(0)
                .and_then(|l| l.squeeze(0))
                .map_err(|e| AssistantError::WorkerFailure(format!("logits reshape failed: {e}")))?;

            let next = logits_processor
                .sample(&logits)
                .map_err(|e| AssistantError::WorkerFailure(format!("sampling failed: {e}")))?;
            index_pos += context.len();

            if self.eos_token_ids.contains(&next) {
                break;
            }
            all_tokens.push(next);

            let text = self
                .tokenizer
                .decode(&[next], false)
                .map_err(|e| AssistantError::WorkerFailure(format!("decode failed: {e}")))?;

            let chunk = if first_chunk {
                first_chunk = false;
                TokenChunk::new(Role::Assistant, text)
            } else {
                TokenChunk {
                    role: None,
                    content: text,
                }
            };
            if outbound.send(chunk).is_err() {
                return Ok(());
            }
        }

        Ok(())
    }
}

/// Flattens the chat history into the model's plain-text chat format. A
/// real deployment would use the checkpoint's chat template; this spec
/// does not define one, so the turns are rendered as `role: content` lines
/// the way a base-model completion prompt would be built.
fn render_prompt(history: &[TokenChunk]) -> String {
    let mut prompt = String::new();
    for chunk in history {
        if let Some(role) = chunk.role {
            prompt.push_str(role.as_str());
            prompt.push_str(": ");
        }
        prompt.push_str(&chunk.content);
        prompt.push('\n');
    }
    prompt.push_str("assistant: ");
    prompt
}

fn collect_weight_paths(model_path: &Path) -> Result<Vec<std::path::PathBuf>> {
    let single = model_path.join("model.safetensors");
    if single.exists() {
        return Ok(vec![single]);
    }

    let index_path = model_path.join("model.safetensors.index.json");
    let index_text = std::fs::read_to_string(&index_path).map_err(|_| {
        AssistantError::WorkerFailure(
            "no model.safetensors or model.safetensors.index.json found".to_string(),
        )
    })?;
    let index: serde_json::Value = serde_json::from_str(&index_text)
        .map_err(|e| AssistantError::WorkerFailure(format!("bad weights index: {e}")))?;
    let weight_map = index
        .get("weight_map")
        .and_then(|v| v.as_object())
        .ok_or_else(|| AssistantError::WorkerFailure("weights index missing weight_map".to_string()))?;

    let mut shards: Vec<String> = weight_map
        .values()
        .filter_map(|v| v.as_str().map(str::to_string))
        .collect();
    shards.sort();
    shards.dedup();
    Ok(shards.into_iter().map(|s| model_path.join(s)).collect())
}

/// One LoRA adapter's A/B matrix pair for a single base-model tensor,
/// mirroring `continuum-core/src/inference/lora.rs`'s `LoRAWeights`.
struct LoraWeights {
    lora_a: Tensor,
    lora_b: Tensor,
    scale: f64,
}

/// Loads base weights from `weight_paths`, merges the single LoRA adapter at
/// `lora_path` into every tensor it names, and builds the `Llama` from the
/// merged tensor map. Narrowed from `rebuild_with_stacked_lora` (which folds
/// in a list of named, independently-scaled adapters) to the one adapter
/// `assistant.lora_path` names.
fn build_model_with_lora(
    weight_paths: &[std::path::PathBuf],
    device: &Device,
    dtype: DType,
    config: &LlamaConfig,
    lora_path: &Path,
) -> Result<Llama> {
    let mut base_tensors = load_base_tensors(weight_paths, device, dtype)?;
    let lora_weights = load_lora_adapter(lora_path, device, dtype)?;

    let mut merged_count = 0;
    let mut skipped_count = 0;
    for (lora_name, lora) in &lora_weights {
        let model_name = map_lora_name_to_model_name(lora_name);
        match base_tensors.get(&model_name) {
            Some(base_weight) => {
                let merged = merge_lora_weight(base_weight, lora)
                    .map_err(|e| AssistantError::WorkerFailure(format!("LoRA merge failed for {model_name}: {e}")))?;
                base_tensors.insert(model_name, merged);
                merged_count += 1;
            }
            None => {
                warn!(tensor = %model_name, "LoRA weight has no matching base tensor, skipping");
                skipped_count += 1;
            }
        }
    }
    info!(
        adapter = %lora_path.display(),
        merged = merged_count,
        skipped = skipped_count,
        "merged LoRA adapter into base model"
    );

    let vb = VarBuilder::from_tensors(base_tensors, dtype, device);
    Llama::load(vb, config)
        .map_err(|e| AssistantError::WorkerFailure(format!("failed to build model with LoRA: {e}")))
}

/// Reads every tensor out of `weight_paths`' safetensors files into a
/// name-keyed map, converting to `dtype` — the same shape `VarBuilder::
/// from_mmaped_safetensors` builds internally, done explicitly here because
/// the LoRA path needs to mutate individual tensors before handing the map
/// to `VarBuilder::from_tensors`.
fn load_base_tensors(
    weight_paths: &[std::path::PathBuf],
    device: &Device,
    dtype: DType,
) -> Result<HashMap<String, Tensor>> {
    let mut tensors = HashMap::new();
    for path in weight_paths {
        let data = std::fs::read(path)?;
        let file = SafeTensors::deserialize(&data)
            .map_err(|e| AssistantError::WorkerFailure(format!("bad safetensors file {}: {e}", path.display())))?;
        for (name, view) in file.tensors() {
            let tensor = safetensor_view_to_tensor(&view, device, dtype)?;
            tensors.insert(name.to_string(), tensor);
        }
    }
    Ok(tensors)
}

/// Loads one LoRA adapter file (or a directory containing
/// `adapter_model.safetensors`) and pairs up its `lora_A`/`lora_B` matrices
/// per base layer name.
fn load_lora_adapter(
    lora_path: &Path,
    device: &Device,
    dtype: DType,
) -> Result<HashMap<String, LoraWeights>> {
    let resolved = if lora_path.is_dir() {
        let candidate = lora_path.join("adapter_model.safetensors");
        if !candidate.exists() {
            return Err(AssistantError::WorkerFailure(format!(
                "no adapter_model.safetensors found in {}",
                lora_path.display()
            )));
        }
        candidate
    } else {
        lora_path.to_path_buf()
    };

    let data = std::fs::read(&resolved)?;
    let file = SafeTensors::deserialize(&data)
        .map_err(|e| AssistantError::WorkerFailure(format!("bad LoRA adapter file {}: {e}", resolved.display())))?;

    let mut pending_a: HashMap<String, Tensor> = HashMap::new();
    let mut pending_b: HashMap<String, Tensor> = HashMap::new();
    for (name, view) in file.tensors() {
        let (base_name, is_a) = if let Some(stripped) = name.strip_suffix(".lora_A.weight") {
            (stripped.to_string(), true)
        } else if let Some(stripped) = name.strip_suffix(".lora_B.weight") {
            (stripped.to_string(), false)
        } else {
            continue;
        };
        let tensor = safetensor_view_to_tensor(&view, device, dtype)?;
        if is_a {
            pending_a.insert(base_name, tensor);
        } else {
            pending_b.insert(base_name, tensor);
        }
    }

    let mut weights = HashMap::new();
    for (base_name, lora_a) in pending_a {
        if let Some(lora_b) = pending_b.remove(&base_name) {
            weights.insert(
                base_name,
                LoraWeights {
                    lora_a,
                    lora_b,
                    scale: 1.0,
                },
            );
        } else {
            warn!(layer = %base_name, "LoRA A matrix has no matching B matrix, skipping");
        }
    }
    for base_name in pending_b.keys() {
        warn!(layer = %base_name, "LoRA B matrix has no matching A matrix, skipping");
    }
    Ok(weights)
}

/// `W' = W + scale * (B @ A)`.
fn merge_lora_weight(base_weight: &Tensor, lora: &LoraWeights) -> std::result::Result<Tensor, candle_core::Error> {
    let delta = lora.lora_b.matmul(&lora.lora_a)?;
    let scaled_delta = (delta * lora.scale)?;
    base_weight.add(&scaled_delta)
}

/// Maps a PEFT/HuggingFace LoRA layer name (`base_model.model.model.layers.
/// 0...`) to the Candle Llama weight name it targets (`model.layers.0....
/// weight`).
fn map_lora_name_to_model_name(lora_name: &str) -> String {
    let cleaned = lora_name.strip_prefix("base_model.").unwrap_or(lora_name);
    let cleaned = cleaned
        .strip_prefix("model.model.")
        .map(|s| format!("model.{s}"))
        .unwrap_or_else(|| cleaned.to_string());
    if cleaned.ends_with(".weight") {
        cleaned
    } else {
        format!("{cleaned}.weight")
    }
}

fn safetensor_view_to_tensor(
    view: &safetensors::tensor::TensorView<'_>,
    device: &Device,
    dtype: DType,
) -> Result<Tensor> {
    let shape = view.shape().to_vec();
    let tensor = match view.dtype() {
        safetensors::Dtype::F32 => {
            let data: Vec<f32> = view
                .data()
                .chunks_exact(4)
                .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                .collect();
            Tensor::from_vec(data, shape.as_slice(), device)
        }
        safetensors::Dtype::F16 => {
            let data: Vec<f32> = view
                .data()
                .chunks_exact(2)
                .map(|b| half::f16::from_le_bytes([b[0], b[1]]).to_f32())
                .collect();
            Tensor::from_vec(data, shape.as_slice(), device)
        }
        safetensors::Dtype::BF16 => {
            let data: Vec<f32> = view
                .data()
                .chunks_exact(2)
                .map(|b| half::bf16::from_le_bytes([b[0], b[1]]).to_f32())
                .collect();
            Tensor::from_vec(data, shape.as_slice(), device)
        }
        other => {
            return Err(AssistantError::WorkerFailure(format!(
                "unsupported safetensors dtype {other:?}"
            )))
        }
    }
    .map_err(|e| AssistantError::WorkerFailure(format!("failed to build tensor: {e}")))?;

    if tensor.dtype() != dtype {
        tensor
            .to_dtype(dtype)
            .map_err(|e| AssistantError::WorkerFailure(format!("failed to cast tensor dtype: {e}")))
    } else {
        Ok(tensor)
    }
}

fn select_best_device() -> Device {
    #[cfg(feature = "cuda")]
    {
        if let Ok(device) = Device::new_cuda(0) {
            return device;
        }
    }
    #[cfg(feature = "metal")]
    {
        if let Ok(device) = Device::new_metal(0) {
            return device;
        }
    }
    Device::Cpu
}
