//! C-repr mirrors of the Unity native plugin interface headers.
//!
//! Sourced from `IUnityInterface.h` and `IUnityGraphics.h`. Only the parts
//! this plugin touches are declared. `UNITY_INTERFACE_API` is `__stdcall`
//! on 32-bit Windows and the C convention elsewhere, which is what
//! `extern "system"` selects.

#![allow(non_upper_case_globals)]
#![allow(non_camel_case_types)]
#![allow(non_snake_case)]

use std::os::raw::c_int;

// =====================================================================
// IUnityInterface.h
// =====================================================================

/// 128-bit interface identifier, split in two halves.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct UnityInterfaceGUID {
    pub m_GUIDHigh: u64,
    pub m_GUIDLow: u64,
}

/// Opaque base of every Unity interface.
#[repr(C)]
pub struct IUnityInterface {
    _private: [u8; 0],
}

/// Interface registry handed to `UnityPluginLoad`.
#[repr(C)]
pub struct IUnityInterfaces {
    pub GetInterface:
        Option<unsafe extern "system" fn(guid: UnityInterfaceGUID) -> *mut IUnityInterface>,
    pub RegisterInterface:
        Option<unsafe extern "system" fn(guid: UnityInterfaceGUID, ptr: *mut IUnityInterface)>,
    pub GetInterfaceSplit:
        Option<unsafe extern "system" fn(guidHigh: u64, guidLow: u64) -> *mut IUnityInterface>,
    pub RegisterInterfaceSplit: Option<
        unsafe extern "system" fn(guidHigh: u64, guidLow: u64, ptr: *mut IUnityInterface),
    >,
}

// =====================================================================
// IUnityGraphics.h
// =====================================================================

pub type UnityGfxRenderer = c_int;

pub const kUnityGfxRendererD3D11: UnityGfxRenderer = 2;
pub const kUnityGfxRendererNull: UnityGfxRenderer = 4;
pub const kUnityGfxRendererOpenGLES20: UnityGfxRenderer = 8;
pub const kUnityGfxRendererOpenGLES30: UnityGfxRenderer = 11;
pub const kUnityGfxRendererMetal: UnityGfxRenderer = 16;
pub const kUnityGfxRendererOpenGLCore: UnityGfxRenderer = 17;
pub const kUnityGfxRendererD3D12: UnityGfxRenderer = 18;
pub const kUnityGfxRendererVulkan: UnityGfxRenderer = 21;

pub type UnityGfxDeviceEventType = c_int;

pub const kUnityGfxDeviceEventInitialize: UnityGfxDeviceEventType = 0;
pub const kUnityGfxDeviceEventShutdown: UnityGfxDeviceEventType = 1;
pub const kUnityGfxDeviceEventBeforeReset: UnityGfxDeviceEventType = 2;
pub const kUnityGfxDeviceEventAfterReset: UnityGfxDeviceEventType = 3;

pub type IUnityGraphicsDeviceEventCallback = extern "system" fn(eventType: UnityGfxDeviceEventType);

/// Callback the host invokes on its render thread via `GL.IssuePluginEvent`.
pub type UnityRenderingEvent = extern "system" fn(eventId: c_int);

pub const IUnityGraphics_GUID: UnityInterfaceGUID = UnityInterfaceGUID {
    m_GUIDHigh: 0x7CBA0A9CA4DDB544,
    m_GUIDLow: 0x8C5AD4926EB17B11,
};

#[repr(C)]
pub struct IUnityGraphics {
    pub GetRenderer: Option<unsafe extern "system" fn() -> UnityGfxRenderer>,
    pub RegisterDeviceEventCallback:
        Option<unsafe extern "system" fn(callback: IUnityGraphicsDeviceEventCallback)>,
    pub UnregisterDeviceEventCallback:
        Option<unsafe extern "system" fn(callback: IUnityGraphicsDeviceEventCallback)>,
    pub ReserveEventIDRange: Option<unsafe extern "system" fn(count: c_int) -> c_int>,
}

/// Human-readable renderer name for logs.
pub fn renderer_name(renderer: UnityGfxRenderer) -> &'static str {
    match renderer {
        kUnityGfxRendererD3D11 => "Direct3D 11",
        kUnityGfxRendererNull => "Null",
        kUnityGfxRendererOpenGLES20 => "OpenGL ES 2.0",
        kUnityGfxRendererOpenGLES30 => "OpenGL ES 3.x",
        kUnityGfxRendererMetal => "Metal",
        kUnityGfxRendererOpenGLCore => "OpenGL Core",
        kUnityGfxRendererD3D12 => "Direct3D 12",
        kUnityGfxRendererVulkan => "Vulkan",
        _ => "Unknown",
    }
}

/// Whether GL calls are valid on the host's render thread.
pub fn is_gl_renderer(renderer: UnityGfxRenderer) -> bool {
    matches!(
        renderer,
        kUnityGfxRendererOpenGLES20 | kUnityGfxRendererOpenGLES30 | kUnityGfxRendererOpenGLCore
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_renderer_classification() {
        assert!(is_gl_renderer(kUnityGfxRendererOpenGLES30));
        assert!(is_gl_renderer(kUnityGfxRendererOpenGLCore));
        assert!(!is_gl_renderer(kUnityGfxRendererVulkan));
        assert_eq!(renderer_name(kUnityGfxRendererVulkan), "Vulkan");
        assert_eq!(renderer_name(99), "Unknown");
    }

    #[test]
    fn test_interface_layout() {
        // Four function pointers, matching the C headers
        let ptr = std::mem::size_of::<usize>();
        assert_eq!(std::mem::size_of::<IUnityInterfaces>(), 4 * ptr);
        assert_eq!(std::mem::size_of::<IUnityGraphics>(), 4 * ptr);
        assert_eq!(std::mem::size_of::<UnityInterfaceGUID>(), 16);
    }
}
