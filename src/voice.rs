//! Voice profile registry.
//!
//! Each profile maps a stable key to the natural-language style description
//! the description encoder conditions on. Unknown keys fall back to the
//! default profile so a bad `voice` field never fails a whole batch.

/// Key of the profile used when a request omits or misspells `voice`.
pub const DEFAULT_VOICE: &str = "aryan_default";

/// Static profile table: `(key, style description)`.
const VOICE_PROFILES: &[(&str, &str)] = &[
    (
        "aryan_default",
        "Aryan speaks with a clear, natural Sanskrit pronunciation at a moderate pace, \
         with very clear audio quality and no background noise.",
    ),
    (
        "aryan_scholarly",
        "Aryan recites in a formal, scholarly tone with precise Sanskrit diction, \
         slightly slow pace, and very clear audio quality.",
    ),
    (
        "aryan_meditative",
        "Aryan chants in a calm, meditative voice with a slow, even rhythm, \
         soft intonation, and very clear audio quality.",
    ),
    (
        "priya_default",
        "Priya speaks with a warm, expressive Sanskrit pronunciation at a moderate pace, \
         with very clear audio quality and no background noise.",
    ),
];

/// Resolve a voice key to its style description.
///
/// Unknown keys resolve to [`DEFAULT_VOICE`]; the caller can detect the
/// fallback by comparing keys if it cares.
pub fn resolve_style(voice: &str) -> &'static str {
    VOICE_PROFILES
        .iter()
        .find(|(key, _)| *key == voice)
        .or_else(|| VOICE_PROFILES.iter().find(|(key, _)| *key == DEFAULT_VOICE))
        .map(|(_, style)| *style)
        .unwrap_or("")
}

/// True when `voice` names a registered profile.
pub fn is_known_voice(voice: &str) -> bool {
    VOICE_PROFILES.iter().any(|(key, _)| *key == voice)
}

/// All registered profile keys, in registry order.
pub fn voice_keys() -> impl Iterator<Item = &'static str> {
    VOICE_PROFILES.iter().map(|(key, _)| *key)
}
