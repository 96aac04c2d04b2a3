//! Tunable constants for the character-based token estimator.

/// Characters per token, used as a deterministic approximation across
/// providers (consistent with common tokenizer averages for English text).
pub const CHARS_PER_TOKEN: u32 = 4;

/// Minimum tokens attributed to any single image, regardless of size.
pub const MIN_IMAGE_TOKENS: u32 = 85;

/// Flat token estimate for URL-referenced images (no data to size from),
/// calibrated to a typical 1024x1024 image.
pub const DEFAULT_URL_IMAGE_TOKENS: u32 = 1500;

/// Fixed per-message overhead (role marker + structural framing) in
/// characters, added before the chars-per-token conversion.
pub const MESSAGE_OVERHEAD_CHARS: usize = 10;
