//! Single-slot hand-off of Android hardware buffers from Java
//!
//! Java submits the `HardwareBuffer` of each captured frame. The native side
//! keeps exactly one reference: submitting a new buffer releases the previous
//! one first, and unloading releases whatever is held. There is no queue.

use std::ptr::NonNull;
use std::sync::atomic::{AtomicI32, AtomicI64, Ordering};

use log::debug;

use crate::error::{PluginError, Result, SENTINEL_FAILED, SENTINEL_OK};

/// Reference counting for one kind of native buffer.
pub trait BufferBackend: Clone {
    type Buffer;

    /// Take one reference on `buffer`.
    ///
    /// # Safety
    /// `buffer` must point to a live buffer of this backend.
    unsafe fn acquire(&self, buffer: NonNull<Self::Buffer>);

    /// Drop one reference previously taken with [`BufferBackend::acquire`].
    ///
    /// # Safety
    /// Must be paired with exactly one earlier `acquire` of the same buffer.
    unsafe fn release(&self, buffer: NonNull<Self::Buffer>);
}

/// Size and capture time submitted with a buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferMetadata {
    pub width: i32,
    pub height: i32,
    /// Capture timestamp in nanoseconds, as reported by `Image.getTimestamp()`
    pub timestamp: i64,
}

/// One acquired reference, released on drop.
pub struct HeldBuffer<B: BufferBackend> {
    backend: B,
    buffer: NonNull<B::Buffer>,
    metadata: BufferMetadata,
}

impl<B: BufferBackend> HeldBuffer<B> {
    /// # Safety
    /// `buffer` must point to a live buffer of `backend`.
    unsafe fn acquire(backend: B, buffer: NonNull<B::Buffer>, metadata: BufferMetadata) -> Self {
        backend.acquire(buffer);
        Self {
            backend,
            buffer,
            metadata,
        }
    }

    #[cfg(test)]
    pub fn buffer(&self) -> NonNull<B::Buffer> {
        self.buffer
    }

    pub fn metadata(&self) -> BufferMetadata {
        self.metadata
    }
}

impl<B: BufferBackend> Drop for HeldBuffer<B> {
    fn drop(&mut self) {
        unsafe { self.backend.release(self.buffer) };
    }
}

/// Holds at most one submitted buffer.
pub struct SubmitSlot<B: BufferBackend> {
    backend: B,
    held: Option<HeldBuffer<B>>,
}

// SAFETY: buffers handed to a slot are thread-safe reference-counted
// objects, and the slot is only reached through a mutex.
unsafe impl<B: BufferBackend + Send> Send for SubmitSlot<B> {}

impl<B: BufferBackend> SubmitSlot<B> {
    pub fn new(backend: B) -> Self {
        Self { backend, held: None }
    }

    /// Replace the held buffer with `buffer`.
    ///
    /// A null `buffer` is rejected before anything is touched.
    ///
    /// # Safety
    /// A non-null `buffer` must point to a live buffer of this slot's backend.
    pub unsafe fn submit(&mut self, buffer: *mut B::Buffer, metadata: BufferMetadata) -> Result<()> {
        let buffer = NonNull::new(buffer)
            .ok_or_else(|| PluginError::invalid_argument("buffer", "null hardware buffer"))?;

        if let Some(previous) = self.held.take() {
            debug!("Releasing superseded buffer ts={}", previous.metadata().timestamp);
        }
        self.held = Some(HeldBuffer::acquire(self.backend.clone(), buffer, metadata));
        Ok(())
    }

    /// Release the held buffer, if any. Returns whether one was held.
    pub fn clear(&mut self) -> bool {
        self.held.take().is_some()
    }

    #[cfg(test)]
    pub fn held(&self) -> Option<&HeldBuffer<B>> {
        self.held.as_ref()
    }

    pub fn metadata(&self) -> Option<BufferMetadata> {
        self.held.as_ref().map(HeldBuffer::metadata)
    }
}

/// Result of the most recent submit, polled by the Java status HUD.
#[derive(Debug, Default)]
pub struct SubmitStats {
    last_ok: AtomicI32,
    last_timestamp: AtomicI64,
}

impl SubmitStats {
    pub fn record(&self, result: &Result<()>, timestamp: i64) {
        match result {
            Ok(()) => {
                self.last_timestamp.store(timestamp, Ordering::Relaxed);
                self.last_ok.store(SENTINEL_OK, Ordering::Relaxed);
            }
            Err(_) => self.last_ok.store(SENTINEL_FAILED, Ordering::Relaxed),
        }
    }

    /// 1 if the last submit succeeded, 0 otherwise (or before any submit)
    pub fn last_ok(&self) -> i32 {
        self.last_ok.load(Ordering::Relaxed)
    }

    /// Timestamp of the last successful submit (0 before any)
    pub fn last_timestamp(&self) -> i64 {
        self.last_timestamp.load(Ordering::Relaxed)
    }
}

#[cfg(target_os = "android")]
pub use ndk::{from_java, NdkBuffers as PlatformBuffers};

#[cfg(target_os = "android")]
mod ndk {
    use std::ptr::NonNull;

    use jni::objects::JObject;
    use jni::sys::{jobject, JNIEnv as RawEnv};
    use jni::JNIEnv;

    use super::BufferBackend;
    use crate::error::{PluginError, Result};

    /// `AHardwareBuffer` from the NDK (opaque)
    #[repr(C)]
    pub struct AHardwareBuffer {
        _private: [u8; 0],
    }

    #[link(name = "nativewindow")]
    extern "C" {
        fn AHardwareBuffer_fromHardwareBuffer(env: *mut RawEnv, hardware_buffer: jobject)
            -> *mut AHardwareBuffer;
        fn AHardwareBuffer_acquire(buffer: *mut AHardwareBuffer);
        fn AHardwareBuffer_release(buffer: *mut AHardwareBuffer);
    }

    /// Reference counting through `AHardwareBuffer_acquire`/`_release`
    #[derive(Debug, Clone, Copy, Default)]
    pub struct NdkBuffers;

    impl BufferBackend for NdkBuffers {
        type Buffer = AHardwareBuffer;

        unsafe fn acquire(&self, buffer: NonNull<AHardwareBuffer>) {
            AHardwareBuffer_acquire(buffer.as_ptr());
        }

        unsafe fn release(&self, buffer: NonNull<AHardwareBuffer>) {
            AHardwareBuffer_release(buffer.as_ptr());
        }
    }

    /// Native pointer behind a Java `android.hardware.HardwareBuffer`.
    ///
    /// The pointer is borrowed from the Java object; take a reference
    /// before the object can be closed.
    pub fn from_java(env: &JNIEnv, buffer: &JObject) -> Result<*mut AHardwareBuffer> {
        let raw = unsafe { AHardwareBuffer_fromHardwareBuffer(env.get_raw(), buffer.as_raw()) };
        if raw.is_null() {
            return Err(PluginError::ConversionFailure(
                "AHardwareBuffer_fromHardwareBuffer returned null".into(),
            ));
        }
        Ok(raw)
    }
}

#[cfg(not(target_os = "android"))]
pub use host::{from_java, HostBuffers as PlatformBuffers};

#[cfg(not(target_os = "android"))]
mod host {
    use std::ptr::NonNull;

    use jni::objects::JObject;
    use jni::JNIEnv;

    use super::BufferBackend;
    use crate::error::{PluginError, Result};

    /// Stand-in buffer type where the NDK is unavailable
    pub enum HostBuffer {}

    /// Never holds anything: [`from_java`] always fails off Android.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct HostBuffers;

    impl BufferBackend for HostBuffers {
        type Buffer = HostBuffer;

        unsafe fn acquire(&self, _buffer: NonNull<HostBuffer>) {}

        unsafe fn release(&self, _buffer: NonNull<HostBuffer>) {}
    }

    pub fn from_java(_env: &JNIEnv, _buffer: &JObject) -> Result<*mut HostBuffer> {
        Err(PluginError::ConversionFailure(
            "HardwareBuffer is only available on Android".into(),
        ))
    }
}
