//! Model metadata registry
//!
//! Lookup tables for known LLM and embedding models: embedding dimensions,
//! context window sizes, and per-1K-token pricing. Tables are kept as ordered
//! lists (not maps) so fuzzy substring matching is reproducible: the first
//! declared entry that matches wins.
//!
//! The registry is shared state: create one instance at startup, wrap it in
//! an `Arc`, and hand it to the detector and the span writer. Custom models
//! registered at runtime are in-memory only; restarts require
//! re-registration.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Cost per 1K tokens in USD
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelPricing {
    pub input_cost_per_1k: f64,
    pub output_cost_per_1k: f64,
}

/// Providers that never incur cost, regardless of pricing-table contents
pub const FREE_PROVIDERS: &[&str] = &["ollama", "lm_studio", "llama_cpp", "localai"];

/// Fallback embedding dimension (OpenAI ada-002/3-small standard)
pub const DEFAULT_EMBEDDING_DIM: usize = 1536;

/// Registry of known models and their metadata
pub struct ModelRegistry {
    embedding_dims: RwLock<Vec<(String, usize)>>,
    token_limits: RwLock<Vec<(String, u32)>>,
    pricing: RwLock<Vec<(String, ModelPricing)>>,
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ModelRegistry {
    pub fn new() -> Self {
        let embedding_dims = vec![
            // OpenAI
            ("text-embedding-3-small", 1536),
            ("text-embedding-3-large", 3072),
            ("text-embedding-ada-002", 1536),
            // Open source models (common in local setups)
            ("bge-base", 768),
            ("bge-large", 1024),
            ("bge-small", 384),
            ("all-minilm-l6-v2", 384),
            ("all-minilm-l12-v2", 384),
            ("all-mpnet-base-v2", 768),
            ("gte-small", 384),
            ("gte-base", 768),
            ("gte-large", 1024),
            ("e5-small", 384),
            ("e5-base", 768),
            ("e5-large", 1024),
            // Sentence transformers
            ("sentence-transformers/all-minilm-l6-v2", 384),
            ("sentence-transformers/all-mpnet-base-v2", 768),
        ];

        let token_limits = vec![
            // OpenAI
            ("gpt-4", 8192),
            ("gpt-4-32k", 32768),
            ("gpt-4-turbo", 128_000),
            ("gpt-4o", 128_000),
            ("gpt-3.5-turbo", 16385),
            ("o1-preview", 128_000),
            ("o1-mini", 128_000),
            // Anthropic
            ("claude-3-opus", 200_000),
            ("claude-3-sonnet", 200_000),
            ("claude-3-haiku", 200_000),
            ("claude-2", 100_000),
            // Common local models
            ("llama-2-7b", 4096),
            ("llama-2-13b", 4096),
            ("llama-2-70b", 4096),
            ("llama-3-8b", 8192),
            ("llama-3-70b", 8192),
            ("mistral-7b", 8192),
            ("mixtral-8x7b", 32768),
            ("phi-2", 2048),
            ("phi-3", 4096),
        ];

        let pricing = vec![
            // OpenAI GPT-4
            ("gpt-4", ModelPricing { input_cost_per_1k: 0.03, output_cost_per_1k: 0.06 }),
            ("gpt-4-32k", ModelPricing { input_cost_per_1k: 0.06, output_cost_per_1k: 0.12 }),
            ("gpt-4-turbo", ModelPricing { input_cost_per_1k: 0.01, output_cost_per_1k: 0.03 }),
            ("gpt-4o", ModelPricing { input_cost_per_1k: 0.005, output_cost_per_1k: 0.015 }),
            // OpenAI GPT-3.5
            ("gpt-3.5-turbo", ModelPricing { input_cost_per_1k: 0.0005, output_cost_per_1k: 0.0015 }),
            // Anthropic Claude
            ("claude-3-opus", ModelPricing { input_cost_per_1k: 0.015, output_cost_per_1k: 0.075 }),
            ("claude-3-sonnet", ModelPricing { input_cost_per_1k: 0.003, output_cost_per_1k: 0.015 }),
            ("claude-3-haiku", ModelPricing { input_cost_per_1k: 0.00025, output_cost_per_1k: 0.00125 }),
        ];

        Self {
            embedding_dims: RwLock::new(
                embedding_dims.into_iter().map(|(k, v)| (k.to_string(), v)).collect(),
            ),
            token_limits: RwLock::new(
                token_limits.into_iter().map(|(k, v)| (k.to_string(), v)).collect(),
            ),
            pricing: RwLock::new(
                pricing.into_iter().map(|(k, v)| (k.to_string(), v)).collect(),
            ),
        }
    }

    /// Embedding dimension for a model.
    ///
    /// Exact match first, then the first declared entry whose key contains
    /// (or is contained in) the lowercased model name. Unknown models fall
    /// back to [`DEFAULT_EMBEDDING_DIM`].
    pub fn embedding_dim(&self, model_name: &str) -> usize {
        let dims = self.embedding_dims.read();

        if let Some((_, dim)) = dims.iter().find(|(k, _)| k == model_name) {
            return *dim;
        }

        let model_lower = model_name.to_lowercase();
        for (key, dim) in dims.iter() {
            if model_lower.contains(key.as_str()) || key.contains(&model_lower) {
                return *dim;
            }
        }

        DEFAULT_EMBEDDING_DIM
    }

    /// Context window size for a model, if known
    pub fn token_limit(&self, model_name: &str) -> Option<u32> {
        let limits = self.token_limits.read();

        if let Some((_, limit)) = limits.iter().find(|(k, _)| k == model_name) {
            return Some(*limit);
        }

        let model_lower = model_name.to_lowercase();
        limits
            .iter()
            .find(|(key, _)| model_lower.contains(key.as_str()))
            .map(|(_, limit)| *limit)
    }

    /// Pricing for a model. Always `None` for free/local providers.
    pub fn pricing(&self, model_name: &str, provider: &str) -> Option<ModelPricing> {
        if FREE_PROVIDERS.contains(&provider) {
            return None;
        }

        let pricing = self.pricing.read();

        if let Some((_, p)) = pricing.iter().find(|(k, _)| k == model_name) {
            return Some(*p);
        }

        let model_lower = model_name.to_lowercase();
        pricing
            .iter()
            .find(|(key, _)| model_lower.contains(key.as_str()))
            .map(|(_, p)| *p)
    }

    /// Categorize a model into a family (GPT, Claude, Llama, ...)
    pub fn model_family(&self, model_name: &str) -> &'static str {
        let model_lower = model_name.to_lowercase();

        if model_lower.contains("gpt") {
            "GPT"
        } else if model_lower.contains("claude") {
            "Claude"
        } else if model_lower.contains("llama") {
            "Llama"
        } else if model_lower.contains("mistral") || model_lower.contains("mixtral") {
            "Mistral"
        } else if model_lower.contains("phi") {
            "Phi"
        } else if model_lower.contains("gemini") {
            "Gemini"
        } else {
            "Other"
        }
    }

    /// Register a custom model at runtime.
    ///
    /// Useful for proprietary or newly released models. An exact-name entry
    /// is updated in place; otherwise the model is appended, so the declared
    /// order of the built-in tables (and therefore fuzzy-match precedence)
    /// is preserved.
    pub fn register_custom_model(
        &self,
        name: &str,
        embedding_dim: Option<usize>,
        token_limit: Option<u32>,
        pricing: Option<ModelPricing>,
    ) {
        if let Some(dim) = embedding_dim {
            upsert(&mut self.embedding_dims.write(), name, dim);
        }
        if let Some(limit) = token_limit {
            upsert(&mut self.token_limits.write(), name, limit);
        }
        if let Some(p) = pricing {
            upsert(&mut self.pricing.write(), name, p);
        }
    }
}

fn upsert<V>(table: &mut Vec<(String, V)>, name: &str, value: V) {
    match table.iter_mut().find(|(k, _)| k == name) {
        Some(entry) => entry.1 = value,
        None => table.push((name.to_string(), value)),
    }
}
