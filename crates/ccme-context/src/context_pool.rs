//! Context Pool: decides and clamps the active context-window
//! size from VRAM telemetry and model facts, and tracks current usage for
//! external observers.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

use ccme_core::SessionId;
use ccme_settings::{ContextSettings, KvQuantization};

use crate::events::{Event, EventBus};
use crate::vram::VramInfo;

/// Facts about the loaded model needed to convert a VRAM budget into a
/// token count.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ModelInfo {
    /// Bytes the model weights themselves occupy (subtracted before sizing
    /// the KV cache).
    pub loaded_bytes: u64,
    /// Estimated bytes of KV cache per token at f16 precision; scaled by
    /// the configured [`KvQuantization`] factor.
    pub bytes_per_token_f16: f64,
}

/// Clamp a VRAM-derived token budget into `[min_size, max_size]`.
///
/// Pure: no I/O, no shared state. `vram_buffer` bytes and the model's own
/// weight footprint are reserved before converting the remaining bytes into
/// a token count at the configured KV-cache quantization factor.
#[must_use]
pub fn calculate_optimal_size(
    vram: &VramInfo,
    model: &ModelInfo,
    settings: &ContextSettings,
) -> u64 {
    if !settings.auto_size {
        return settings.target_size.clamp(settings.min_size, settings.max_size);
    }
    let usable_bytes = vram
        .available_bytes
        .saturating_sub(settings.vram_buffer)
        .saturating_sub(model.loaded_bytes);
    let bytes_per_token = (model.bytes_per_token_f16 * settings.kv_quantization.factor()).max(1.0);
    let derived_tokens = if vram.available_bytes == u64::MAX {
        settings.max_size
    } else {
        (usable_bytes as f64 / bytes_per_token) as u64
    };
    derived_tokens.clamp(settings.min_size, settings.max_size)
}

/// Tracks the active window size and current token usage, serializing
/// resizes so concurrent requests coalesce onto the latest one.
pub struct ContextPool {
    current_size: AtomicU64,
    current_tokens: AtomicU64,
    resizing: AtomicBool,
    pending_size: AtomicU64,
    resize_callback: Mutex<Box<dyn FnMut(u64) + Send>>,
}

impl ContextPool {
    #[must_use]
    pub fn new(initial_size: u64, resize_callback: Box<dyn FnMut(u64) + Send>) -> Self {
        Self {
            current_size: AtomicU64::new(initial_size),
            current_tokens: AtomicU64::new(0),
            resizing: AtomicBool::new(false),
            pending_size: AtomicU64::new(initial_size),
            resize_callback: Mutex::new(resize_callback),
        }
    }

    #[must_use]
    pub fn current_size(&self) -> u64 {
        self.current_size.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn current_tokens(&self) -> u64 {
        self.current_tokens.load(Ordering::Acquire)
    }

    /// Pure accounting: record the window's current token usage. Never
    /// suspends, never touches VRAM.
    pub fn set_current_tokens(&self, n: u64) {
        self.current_tokens.store(n, Ordering::Release);
    }

    /// Change the active size, invoking the resize callback and emitting a
    /// `resize` event exactly once per settled value. If a resize is
    /// already in flight, this call's target replaces the pending one and
    /// returns without blocking — the in-flight resize picks it up.
    pub fn resize(&self, new_size: u64, min_size: u64, max_size: u64, session_id: SessionId, events: &EventBus) {
        let clamped_target = new_size.clamp(min_size, max_size);
        self.pending_size.store(clamped_target, Ordering::SeqCst);
        if self.resizing.swap(true, Ordering::AcqRel) {
            return;
        }
        loop {
            let target = self.pending_size.load(Ordering::SeqCst);
            self.current_size.store(target, Ordering::Release);
            (self.resize_callback.lock().unwrap_or_else(|e| e.into_inner()))(target);
            events.emit(&Event::Resize {
                session_id: session_id.clone(),
                new_size: target,
            });
            if self.pending_size.load(Ordering::SeqCst) == target {
                self.resizing.store(false, Ordering::Release);
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn settings() -> ContextSettings {
        ContextSettings {
            target_size: 32_000,
            min_size: 4_000,
            max_size: 128_000,
            auto_size: true,
            vram_buffer: 1_000_000,
            kv_quantization: KvQuantization::F16,
        }
    }

    #[test]
    fn calculate_optimal_size_clamps_to_min() {
        let vram = VramInfo {
            total_bytes: 2_000_000,
            used_bytes: 1_990_000,
            available_bytes: 10_000,
            model_loaded_bytes: 0,
        };
        let model = ModelInfo {
            loaded_bytes: 0,
            bytes_per_token_f16: 100.0,
        };
        let size = calculate_optimal_size(&vram, &model, &settings());
        assert_eq!(size, settings().min_size);
    }

    #[test]
    fn calculate_optimal_size_clamps_to_max_on_abundant_vram() {
        let vram = VramInfo::abundant();
        let model = ModelInfo {
            loaded_bytes: 0,
            bytes_per_token_f16: 100.0,
        };
        assert_eq!(
            calculate_optimal_size(&vram, &model, &settings()),
            settings().max_size
        );
    }

    #[test]
    fn quantization_factor_increases_derivable_tokens() {
        let vram = VramInfo {
            total_bytes: 20_000_000,
            used_bytes: 0,
            available_bytes: 20_000_000,
            model_loaded_bytes: 0,
        };
        let model = ModelInfo {
            loaded_bytes: 0,
            bytes_per_token_f16: 100.0,
        };
        let mut s = settings();
        s.kv_quantization = KvQuantization::F16;
        let f16_size = calculate_optimal_size(&vram, &model, &s);
        s.kv_quantization = KvQuantization::Q4_0;
        let q4_size = calculate_optimal_size(&vram, &model, &s);
        assert!(q4_size >= f16_size);
    }

    #[test]
    fn manual_sizing_ignores_vram_when_auto_size_disabled() {
        let mut s = settings();
        s.auto_size = false;
        let vram = VramInfo {
            total_bytes: 1,
            used_bytes: 1,
            available_bytes: 0,
            model_loaded_bytes: 0,
        };
        let model = ModelInfo {
            loaded_bytes: 0,
            bytes_per_token_f16: 100.0,
        };
        assert_eq!(calculate_optimal_size(&vram, &model, &s), s.target_size);
    }

    #[test]
    fn resize_invokes_callback_and_emits_event() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);
        let pool = ContextPool::new(
            10_000,
            Box::new(move |size| seen_clone.lock().unwrap().push(size)),
        );
        let events = EventBus::new();
        pool.resize(20_000, 4_000, 128_000, SessionId::new(), &events);
        assert_eq!(pool.current_size(), 20_000);
        assert_eq!(*seen.lock().unwrap(), vec![20_000]);
    }

    #[test]
    fn resize_clamps_into_bounds() {
        let pool = ContextPool::new(10_000, Box::new(|_| {}));
        let events = EventBus::new();
        pool.resize(999_999, 4_000, 128_000, SessionId::new(), &events);
        assert_eq!(pool.current_size(), 128_000);
    }

    #[test]
    fn set_current_tokens_is_pure_accounting() {
        let pool = ContextPool::new(10_000, Box::new(|_| {}));
        pool.set_current_tokens(42);
        assert_eq!(pool.current_tokens(), 42);
    }
}
