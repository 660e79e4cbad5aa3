use crate::providers::ProviderKind;

/// OpenAI chat completions endpoint
pub const OPENAI_CHAT_URL: &str = "https://api.openai.com/v1/chat/completions";

/// Google Generative Language API base (model name and key are appended)
pub const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// Anthropic messages endpoint
pub const ANTHROPIC_MESSAGES_URL: &str = "https://api.anthropic.com/v1/messages";

/// Anthropic API version header value
pub const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Output cap passed to providers that require an explicit max_tokens
pub const DEFAULT_MAX_OUTPUT_TOKENS: u32 = 1024;

/// System prompt used when the caller does not supply one
pub const DEFAULT_SYSTEM_PROMPT: &str =
    "You are a helpful AI assistant. Provide clear, accurate, and helpful responses.";

/// Built-in rate-limit defaults for one model
#[derive(Debug, Clone, Copy)]
pub struct ModelDefaults {
    pub model: &'static str,
    pub requests_per_minute: u64,
    pub requests_per_day: u64,
    pub tokens_per_minute: u64,
    pub max_tokens_per_request: u64,
}

const fn defaults(
    model: &'static str,
    rpm: u64,
    rpd: u64,
    tpm: u64,
    max_per_request: u64,
) -> ModelDefaults {
    ModelDefaults {
        model,
        requests_per_minute: rpm,
        requests_per_day: rpd,
        tokens_per_minute: tpm,
        max_tokens_per_request: max_per_request,
    }
}

/// Per-model defaults, ordered: the first entry is the fallback for unknown
/// models under the same provider.
pub static OPENAI_DEFAULTS: &[ModelDefaults] = &[
    defaults("gpt-4o", 20, 1000, 100_000, 128_000),
    defaults("gpt-4o-mini", 25, 1200, 120_000, 128_000),
    defaults("gpt-4-turbo", 15, 800, 75_000, 128_000),
    defaults("gpt-4", 10, 500, 50_000, 8_192),
    defaults("gpt-3.5-turbo", 20, 1000, 100_000, 4_096),
    defaults("gpt-3.5-turbo-16k", 15, 800, 150_000, 16_384),
];

pub static GEMINI_DEFAULTS: &[ModelDefaults] = &[
    defaults("gemini-2.0-flash", 15, 1500, 80_000, 100_000),
    defaults("gemini-2.0-flash-lite", 30, 1500, 100_000, 100_000),
    defaults("gemini-2.5-flash", 10, 500, 60_000, 100_000),
];

pub static CLAUDE_DEFAULTS: &[ModelDefaults] = &[
    defaults("claude-3-5-sonnet-20241022", 15, 800, 200_000, 200_000),
    defaults("claude-3-5-haiku-20241022", 25, 1200, 150_000, 200_000),
    defaults("claude-3-opus-20240229", 5, 300, 200_000, 200_000),
    defaults("claude-3-sonnet-20240229", 10, 600, 150_000, 200_000),
    defaults("claude-3-haiku-20240307", 20, 1000, 100_000, 200_000),
];

/// Fallback quadruple when a provider has no registered defaults at all
pub static GLOBAL_DEFAULTS: ModelDefaults = defaults("", 10, 500, 50_000, 4_000);

pub fn provider_defaults(provider: ProviderKind) -> &'static [ModelDefaults] {
    match provider {
        ProviderKind::Openai => OPENAI_DEFAULTS,
        ProviderKind::Gemini => GEMINI_DEFAULTS,
        ProviderKind::Claude => CLAUDE_DEFAULTS,
    }
}

/// Defaults for (provider, model): exact model match, then the provider's
/// first-registered model, then the global quadruple.
pub fn model_defaults(provider: ProviderKind, model: &str) -> &'static ModelDefaults {
    let table = provider_defaults(provider);
    table
        .iter()
        .find(|d| d.model == model)
        .or_else(|| table.first())
        .unwrap_or(&GLOBAL_DEFAULTS)
}

/// Model assigned at key registration when the caller omits one
pub fn default_model(provider: ProviderKind) -> &'static str {
    match provider {
        ProviderKind::Openai => "gpt-4o",
        ProviderKind::Gemini => "gemini-2.0-flash",
        ProviderKind::Claude => "claude-3-5-sonnet-20241022",
    }
}
