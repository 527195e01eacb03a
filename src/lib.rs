#![allow(clippy::missing_safety_doc)]
#![allow(non_snake_case)]

//! Native side of the WebView GPU viewer.
//!
//! Two hosts load this library:
//! - Unity, which drives a GL texture from its render thread through the
//!   exports in [`unity`];
//! - Java, through the `com.example.webviewgpu.NativeBridge` JNI methods
//!   exported below.

mod bridge;
mod error;
mod gles;
mod hardware_buffer;
mod jni;
mod logger;
mod render_event;
mod texture;
mod unity;
mod unity_ffi;

use std::ffi::c_void;
use std::os::raw::c_int;

use ::jni::objects::{JClass, JObject, JObjectArray};
use ::jni::sys::{jint, jlong, JavaVM, JNI_VERSION_1_6};
use ::jni::JNIEnv;
use log::{error, info, warn};
use once_cell::sync::Lazy;

use crate::bridge::{NativeBridge, MAGIC_NUMBER};
use crate::error::{to_sentinel, SENTINEL_FAILED};
use crate::hardware_buffer::{BufferMetadata, PlatformBuffers};

pub use crate::unity::{
    GetRenderEventFunc, GetRenderEventFuncGl, GetTextureId, SetTextureSize, UnityPluginLoad,
    UnityPluginUnload,
};

/// Buffer slot shared by every `NativeBridge` call
static BRIDGE: Lazy<NativeBridge<PlatformBuffers>> =
    Lazy::new(|| NativeBridge::new(PlatformBuffers::default()));

/// Called by the VM from `System.loadLibrary("webview_gpu")`
#[no_mangle]
pub extern "system" fn JNI_OnLoad(_vm: *mut JavaVM, _reserved: *mut c_void) -> jint {
    logger::init_logging();
    info!("JNI_OnLoad");
    JNI_VERSION_1_6
}

/// Called by the VM when the class loader that loaded the library is collected
#[no_mangle]
pub extern "system" fn JNI_OnUnload(_vm: *mut JavaVM, _reserved: *mut c_void) {
    let held = BRIDGE.held_metadata();
    if BRIDGE.release_held() {
        if let Some(BufferMetadata { width, height, timestamp }) = held {
            info!("Released held {}x{} buffer (ts={}) on unload", width, height, timestamp);
        }
    }
}

/// Plain C export of the magic number, for hosts that bypass JNI
#[no_mangle]
pub extern "C" fn GetMagicNumber() -> c_int {
    MAGIC_NUMBER
}

/// `static native int nativeAdd(int a, int b)`
#[no_mangle]
pub extern "system" fn Java_com_example_webviewgpu_NativeBridge_nativeAdd(
    _env: JNIEnv,
    _class: JClass,
    a: jint,
    b: jint,
) -> jint {
    info!("nativeAdd called: a={}, b={}", a, b);
    let result = bridge::add(a, b);
    info!("nativeAdd result={}", result);
    result
}

/// `static native int nativeGetMagicNumber()`
#[no_mangle]
pub extern "system" fn Java_com_example_webviewgpu_NativeBridge_nativeGetMagicNumber(
    _env: JNIEnv,
    _class: JClass,
) -> jint {
    MAGIC_NUMBER
}

/// `static native int nativeSubmitHardwareBuffer(HardwareBuffer hb, int w, int h, long ts)`
///
/// Returns 1 once the buffer is held, 0 on a null or unconvertible buffer.
#[no_mangle]
pub extern "system" fn Java_com_example_webviewgpu_NativeBridge_nativeSubmitHardwareBuffer(
    env: JNIEnv,
    _class: JClass,
    buffer: JObject,
    width: jint,
    height: jint,
    timestamp: jlong,
) -> jint {
    if buffer.is_null() {
        warn!("nativeSubmitHardwareBuffer: null buffer");
        return SENTINEL_FAILED;
    }

    let metadata = BufferMetadata {
        width,
        height,
        timestamp,
    };
    let result = unsafe {
        BRIDGE.submit_with(|| hardware_buffer::from_java(&env, &buffer), metadata)
    };
    to_sentinel("nativeSubmitHardwareBuffer", result)
}

/// `static native int nativeGetLastSubmitOk()`
#[no_mangle]
pub extern "system" fn Java_com_example_webviewgpu_NativeBridge_nativeGetLastSubmitOk(
    _env: JNIEnv,
    _class: JClass,
) -> jint {
    BRIDGE.stats().last_ok()
}

/// `static native long nativeGetLastSubmitTs()`
#[no_mangle]
pub extern "system" fn Java_com_example_webviewgpu_NativeBridge_nativeGetLastSubmitTs(
    _env: JNIEnv,
    _class: JClass,
) -> jlong {
    BRIDGE.stats().last_timestamp()
}

/// `static native String[] nativeGetLastDebugMessages()`
/// Returns stored warnings and errors as "[LEVEL] message", oldest first
#[no_mangle]
pub extern "system" fn Java_com_example_webviewgpu_NativeBridge_nativeGetLastDebugMessages<'local>(
    mut env: JNIEnv<'local>,
    _class: JClass<'local>,
) -> JObjectArray<'local> {
    let messages: Vec<String> = logger::last_debug_messages()
        .iter()
        .map(|m| m.formatted())
        .collect();

    match jni::new_string_array(&mut env, &messages) {
        Ok(array) => array,
        Err(e) => {
            error!("nativeGetLastDebugMessages failed: {}", e);
            JObjectArray::from(JObject::null())
        }
    }
}
