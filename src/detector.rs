//! Universal LLM provider detection
//!
//! Resolves a provider identifier and token usage/cost figures from a span's
//! attribute map. Detection never fails: a span that cannot be attributed to
//! a provider comes back as `"unknown"`, never as an error, so telemetry is
//! never dropped over an enrichment gap.

use std::sync::Arc;

use crate::registry::ModelRegistry;
use crate::store::span::AttrMap;

/// Attribute carrying the provider, per the GenAI semantic conventions
pub const ATTR_SYSTEM: &str = "gen_ai.system";
/// Attribute carrying the requested model name
pub const ATTR_REQUEST_MODEL: &str = "gen_ai.request.model";
/// Attribute carrying the model name echoed by the response
pub const ATTR_RESPONSE_MODEL: &str = "gen_ai.response.model";

/// URL-bearing attribute keys checked for endpoint patterns, in order
const URL_ATTRIBUTE_KEYS: &[&str] = &["server.address", "url.full", "http.url", "base_url"];

/// Endpoint substrings per provider. Iteration order is significant: the
/// first declared provider with a matching pattern wins.
const PROVIDER_PATTERNS: &[(&str, &[&str])] = &[
    ("ollama", &["localhost:11434", "127.0.0.1:11434", "/ollama"]),
    ("lm_studio", &["localhost:1234", "/lm-studio"]),
    ("openai", &["api.openai.com", "/openai/"]),
    ("azure_openai", &[".openai.azure.com", "/openai/deployments/"]),
    ("anthropic", &["api.anthropic.com"]),
    ("localai", &["/localai", "localhost:8080"]),
];

/// Providers whose calls are billed; only these ever receive a cost estimate
const PAID_PROVIDERS: &[&str] = &["openai", "anthropic", "google"];

/// Token usage and estimated cost extracted from span attributes.
///
/// Absent attributes stay `None`; `estimated_cost_usd` is only set for paid
/// providers with both token counts and a resolvable pricing entry.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct UsageInfo {
    pub prompt_tokens: Option<i64>,
    pub completion_tokens: Option<i64>,
    pub total_tokens: Option<i64>,
    pub reasoning_tokens: Option<i64>,
    pub estimated_cost_usd: Option<f64>,
}

/// Detects the LLM provider behind a span and extracts usage figures
#[derive(Clone)]
pub struct ProviderDetector {
    registry: Arc<ModelRegistry>,
}

impl ProviderDetector {
    pub fn new(registry: Arc<ModelRegistry>) -> Self {
        Self { registry }
    }

    /// Detect the provider from span attributes.
    ///
    /// Priority:
    /// 1. `gen_ai.system` attribute (official convention), lowercased
    /// 2. Endpoint pattern matching over URL-bearing attributes
    /// 3. Inference from the request model name
    /// 4. `"unknown"`
    pub fn detect_provider(&self, attributes: &AttrMap) -> String {
        if let Some(system) = attr_str(attributes, ATTR_SYSTEM) {
            return system.to_lowercase();
        }

        for key in URL_ATTRIBUTE_KEYS {
            if let Some(url) = attr_str(attributes, key) {
                if let Some(provider) = detect_from_url(&url) {
                    return provider.to_string();
                }
            }
        }

        if let Some(model) = attr_str(attributes, ATTR_REQUEST_MODEL) {
            return infer_from_model_name(&model).to_string();
        }

        "unknown".to_string()
    }

    /// Extract token counts and estimate cost where applicable.
    ///
    /// The cost formula is `prompt * input_rate / 1000 + completion *
    /// output_rate / 1000`, rounded to six decimal places. Local/free
    /// providers never receive a cost.
    pub fn extract_cost_info(&self, attributes: &AttrMap, provider: &str) -> UsageInfo {
        let mut usage = UsageInfo {
            prompt_tokens: attr_i64(attributes, "gen_ai.usage.prompt_tokens"),
            completion_tokens: attr_i64(attributes, "gen_ai.usage.completion_tokens"),
            total_tokens: attr_i64(attributes, "gen_ai.usage.total_tokens"),
            // o1/o3-style reasoning models report these separately
            reasoning_tokens: attr_i64(attributes, "gen_ai.usage.reasoning_tokens"),
            estimated_cost_usd: None,
        };

        if PAID_PROVIDERS.contains(&provider) {
            let model = attr_str(attributes, ATTR_REQUEST_MODEL).unwrap_or_default();
            if let (Some(pricing), Some(prompt), Some(completion)) = (
                self.registry.pricing(&model, provider),
                usage.prompt_tokens,
                usage.completion_tokens,
            ) {
                let cost = prompt as f64 * pricing.input_cost_per_1k / 1000.0
                    + completion as f64 * pricing.output_cost_per_1k / 1000.0;
                usage.estimated_cost_usd = Some(round6(cost));
            }
        }

        usage
    }
}

fn detect_from_url(url: &str) -> Option<&'static str> {
    let url_lower = url.to_lowercase();

    for (provider, patterns) in PROVIDER_PATTERNS {
        if patterns.iter().any(|p| url_lower.contains(p)) {
            return Some(provider);
        }
    }

    None
}

fn infer_from_model_name(model: &str) -> &'static str {
    let model_lower = model.to_lowercase();

    if model_lower.starts_with("gpt-") {
        "openai"
    } else if model_lower.contains("claude") {
        "anthropic"
    } else if ["llama", "mistral", "mixtral", "phi"]
        .iter()
        .any(|x| model_lower.contains(x))
    {
        // Common local models
        "ollama"
    } else if model_lower.contains("gemini") || model_lower.contains("palm") {
        "google"
    } else {
        "unknown"
    }
}

fn round6(value: f64) -> f64 {
    (value * 1_000_000.0).round() / 1_000_000.0
}

/// Read a string-valued attribute
pub(crate) fn attr_str(attributes: &AttrMap, key: &str) -> Option<String> {
    attributes.get(key).and_then(|v| v.as_str()).map(|s| s.to_string())
}

/// Read an integer-valued attribute, accepting numeric strings
pub(crate) fn attr_i64(attributes: &AttrMap, key: &str) -> Option<i64> {
    match attributes.get(key)? {
        serde_json::Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Read a float-valued attribute, accepting numeric strings
pub(crate) fn attr_f64(attributes: &AttrMap, key: &str) -> Option<f64> {
    match attributes.get(key)? {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Read a boolean-valued attribute
pub(crate) fn attr_bool(attributes: &AttrMap, key: &str) -> Option<bool> {
    attributes.get(key)?.as_bool()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn attrs(pairs: &[(&str, serde_json::Value)]) -> AttrMap {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    fn detector() -> ProviderDetector {
        ProviderDetector::new(Arc::new(ModelRegistry::new()))
    }

    #[test]
    fn test_explicit_system_attribute_wins() {
        let d = detector();
        // Conflicting URL pattern must not override the explicit attribute
        let a = attrs(&[
            ("gen_ai.system", json!("OpenAI")),
            ("url.full", json!("http://localhost:11434/api/chat")),
        ]);
        assert_eq!(d.detect_provider(&a), "openai");
    }

    #[test]
    fn test_url_pattern_detection() {
        let d = detector();
        let a = attrs(&[("url.full", json!("https://api.anthropic.com/v1/messages"))]);
        assert_eq!(d.detect_provider(&a), "anthropic");

        let a = attrs(&[("server.address", json!("localhost:11434"))]);
        assert_eq!(d.detect_provider(&a), "ollama");

        let a = attrs(&[("http.url", json!("http://localhost:1234/v1/chat/completions"))]);
        assert_eq!(d.detect_provider(&a), "lm_studio");
    }

    #[test]
    fn test_model_name_inference() {
        let d = detector();
        assert_eq!(d.detect_provider(&attrs(&[("gen_ai.request.model", json!("gpt-4o"))])), "openai");
        assert_eq!(
            d.detect_provider(&attrs(&[("gen_ai.request.model", json!("claude-3-haiku"))])),
            "anthropic"
        );
        assert_eq!(
            d.detect_provider(&attrs(&[("gen_ai.request.model", json!("mixtral-8x7b"))])),
            "ollama"
        );
        assert_eq!(
            d.detect_provider(&attrs(&[("gen_ai.request.model", json!("gemini-1.5-flash"))])),
            "google"
        );
    }

    #[test]
    fn test_unknown_when_nothing_matches() {
        let d = detector();
        assert_eq!(d.detect_provider(&attrs(&[])), "unknown");
        assert_eq!(
            d.detect_provider(&attrs(&[("gen_ai.request.model", json!("command-r"))])),
            "unknown"
        );
    }

    #[test]
    fn test_cost_calculation_gpt4() {
        let d = detector();
        let a = attrs(&[
            ("gen_ai.request.model", json!("gpt-4")),
            ("gen_ai.usage.prompt_tokens", json!(1000)),
            ("gen_ai.usage.completion_tokens", json!(500)),
        ]);

        let usage = d.extract_cost_info(&a, "openai");
        assert_eq!(usage.prompt_tokens, Some(1000));
        assert_eq!(usage.completion_tokens, Some(500));
        // 1000 * 0.03/1000 + 500 * 0.06/1000 = 0.06
        assert_eq!(usage.estimated_cost_usd, Some(0.06));
    }

    #[test]
    fn test_free_provider_never_gets_cost() {
        let d = detector();
        let a = attrs(&[
            ("gen_ai.request.model", json!("gpt-4")),
            ("gen_ai.usage.prompt_tokens", json!(1000)),
            ("gen_ai.usage.completion_tokens", json!(500)),
        ]);

        let usage = d.extract_cost_info(&a, "ollama");
        assert_eq!(usage.prompt_tokens, Some(1000));
        assert!(usage.estimated_cost_usd.is_none());
    }

    #[test]
    fn test_cost_requires_both_token_counts() {
        let d = detector();
        let a = attrs(&[
            ("gen_ai.request.model", json!("gpt-4")),
            ("gen_ai.usage.prompt_tokens", json!(1000)),
        ]);

        let usage = d.extract_cost_info(&a, "openai");
        assert!(usage.estimated_cost_usd.is_none());
    }

    #[test]
    fn test_token_counts_accept_numeric_strings() {
        let d = detector();
        let a = attrs(&[("gen_ai.usage.prompt_tokens", json!("128"))]);
        let usage = d.extract_cost_info(&a, "unknown");
        assert_eq!(usage.prompt_tokens, Some(128));
    }

    #[test]
    fn test_cost_rounded_to_six_places() {
        let d = detector();
        let a = attrs(&[
            ("gen_ai.request.model", json!("claude-3-haiku")),
            ("gen_ai.usage.prompt_tokens", json!(7)),
            ("gen_ai.usage.completion_tokens", json!(3)),
        ]);

        // 7 * 0.00025/1000 + 3 * 0.00125/1000 = 0.00000550
        let usage = d.extract_cost_info(&a, "anthropic");
        assert_eq!(usage.estimated_cost_usd, Some(0.000006));
    }
}
