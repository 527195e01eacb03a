//! State and logic behind the `NativeBridge` JNI class
//!
//! The exported JNI functions in `lib.rs` only unpack arguments and turn
//! results into sentinels; everything they do is here so it can be tested
//! without a JVM.

use parking_lot::Mutex;

use crate::error::Result;
use crate::hardware_buffer::{BufferBackend, BufferMetadata, SubmitSlot, SubmitStats};

/// Constant Java uses to confirm the library is loaded
pub const MAGIC_NUMBER: i32 = 12345;

/// 32-bit addition that wraps like Java's `int`
pub fn add(a: i32, b: i32) -> i32 {
    a.wrapping_add(b)
}

/// The single buffer slot and its status counters
pub struct NativeBridge<B: BufferBackend> {
    slot: Mutex<SubmitSlot<B>>,
    stats: SubmitStats,
}

impl<B: BufferBackend> NativeBridge<B> {
    pub fn new(backend: B) -> Self {
        Self {
            slot: Mutex::new(SubmitSlot::new(backend)),
            stats: SubmitStats::default(),
        }
    }

    /// Convert and submit one buffer, recording the outcome.
    ///
    /// # Safety
    /// A pointer produced by `convert` must point to a live buffer of `B`.
    pub unsafe fn submit_with<F>(&self, convert: F, metadata: BufferMetadata) -> Result<()>
    where
        F: FnOnce() -> Result<*mut B::Buffer>,
    {
        let result = convert().and_then(|buffer| self.slot.lock().submit(buffer, metadata));
        self.stats.record(&result, metadata.timestamp);
        if result.is_ok() {
            log::debug!(
                "Holding buffer {}x{} ts={}",
                metadata.width,
                metadata.height,
                metadata.timestamp
            );
        }
        result
    }

    /// Release the held buffer. Returns whether one was held.
    pub fn release_held(&self) -> bool {
        self.slot.lock().clear()
    }

    pub fn held_metadata(&self) -> Option<BufferMetadata> {
        self.slot.lock().metadata()
    }

    pub fn stats(&self) -> &SubmitStats {
        &self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PluginError;
    use std::ptr::NonNull;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Clone, Default)]
    struct RefCounts {
        acquired: Arc<AtomicUsize>,
        released: Arc<AtomicUsize>,
    }

    impl BufferBackend for RefCounts {
        type Buffer = u32;

        unsafe fn acquire(&self, _buffer: NonNull<u32>) {
            self.acquired.fetch_add(1, Ordering::SeqCst);
        }

        unsafe fn release(&self, _buffer: NonNull<u32>) {
            self.released.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_add() {
        assert_eq!(add(2, 3), 5);
        assert_eq!(add(-1, 1), 0);
        assert_eq!(add(i32::MAX, 1), i32::MIN);
        assert_eq!(MAGIC_NUMBER, 12345);
    }

    #[test]
    fn test_submit_then_supersede() {
        let counts = RefCounts::default();
        let bridge = NativeBridge::new(counts.clone());
        let mut b1 = 1u32;
        let mut b2 = 2u32;

        let first = BufferMetadata { width: 512, height: 512, timestamp: 100 };
        let second = BufferMetadata { width: 256, height: 128, timestamp: 200 };
        unsafe {
            bridge.submit_with(|| Ok(&mut b1 as *mut u32), first).unwrap();
            bridge.submit_with(|| Ok(&mut b2 as *mut u32), second).unwrap();
        }

        assert_eq!(counts.acquired.load(Ordering::SeqCst), 2);
        assert_eq!(counts.released.load(Ordering::SeqCst), 1);
        assert_eq!(bridge.held_metadata(), Some(second));
        assert_eq!(bridge.stats().last_ok(), 1);
        assert_eq!(bridge.stats().last_timestamp(), 200);

        assert!(bridge.release_held());
        assert_eq!(counts.released.load(Ordering::SeqCst), 2);
        assert_eq!(bridge.held_metadata(), None);
    }

    #[test]
    fn test_conversion_failure_keeps_held_buffer() {
        let counts = RefCounts::default();
        let bridge = NativeBridge::new(counts.clone());
        let mut b1 = 1u32;
        let held = BufferMetadata { width: 64, height: 64, timestamp: 5 };

        unsafe {
            bridge.submit_with(|| Ok(&mut b1 as *mut u32), held).unwrap();
            let err = bridge
                .submit_with(
                    || Err(PluginError::ConversionFailure("closed".into())),
                    BufferMetadata { width: 1, height: 1, timestamp: 6 },
                )
                .unwrap_err();
            assert!(matches!(err, PluginError::ConversionFailure(_)));
        }

        assert_eq!(bridge.held_metadata(), Some(held));
        assert_eq!(counts.released.load(Ordering::SeqCst), 0);
        assert_eq!(bridge.stats().last_ok(), 0);
        assert_eq!(bridge.stats().last_timestamp(), 5);
    }

    #[test]
    fn test_null_buffer_rejected() {
        let counts = RefCounts::default();
        let bridge = NativeBridge::new(counts.clone());

        let result = unsafe {
            bridge.submit_with(
                || Ok(std::ptr::null_mut()),
                BufferMetadata { width: 100, height: 100, timestamp: 0 },
            )
        };

        assert!(matches!(result, Err(PluginError::InvalidArgument { .. })));
        assert_eq!(bridge.held_metadata(), None);
        assert_eq!(counts.acquired.load(Ordering::SeqCst), 0);
    }
}
