//! Model context-window limits.

/// Context limit used when no model is known yet or no table entry matches.
pub const DEFAULT_CONTEXT_LIMIT: u64 = 200_000;

/// Known model substrings and their context windows. Full model ids carry
/// date suffixes (`claude-sonnet-4-5-20250929`), so entries are matched as
/// substrings; the `[1m]` suffix marks the long-context variant.
const MODEL_CONTEXT_LIMITS: &[(&str, u64)] = &[
    ("claude-opus-4", 200_000),
    ("claude-sonnet-4", 200_000),
    ("claude-sonnet-4-5[1m]", 1_000_000),
    ("claude-haiku-3-5", 200_000),
    ("claude-haiku-4-5", 200_000),
];

/// Resolve the context limit for a model id.
///
/// The longest table entry contained in the model id wins, so the
/// long-context variant beats the base-model entry it extends.
pub fn context_limit(model: Option<&str>) -> u64 {
    let Some(model) = model else {
        return DEFAULT_CONTEXT_LIMIT;
    };

    MODEL_CONTEXT_LIMITS
        .iter()
        .filter(|(key, _)| model.contains(key))
        .max_by_key(|(key, _)| key.len())
        .map(|(_, limit)| *limit)
        .unwrap_or(DEFAULT_CONTEXT_LIMIT)
}
