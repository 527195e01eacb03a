//! Unity native plugin surface
//!
//! Unity loads the library, calls `UnityPluginLoad` with its interface
//! registry, and later drives the texture through the function pointer
//! returned by [`GetRenderEventFunc`] (`GL.IssuePluginEvent`) on its render
//! thread. The C# side wraps [`GetTextureId`] with
//! `Texture2D.CreateExternalTexture`.
//!
//! Unity's callbacks carry no user data, so the loaded [`UnityPlugin`]
//! lives in a process-wide slot that only the load/unload hooks fill and
//! empty.

#![allow(non_upper_case_globals)]

use std::os::raw::c_int;
use std::ptr::NonNull;
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use log::{debug, error, info, warn};
use parking_lot::Mutex;

use crate::error::{PluginError, Result};
use crate::gles::{GlApi, GlesApi};
use crate::logger;
use crate::render_event::{RenderEvent, RenderEventStats};
use crate::texture::{TextureController, TextureDescriptor, TextureIdCell};
use crate::unity_ffi::*;

/// The plugin instance between `UnityPluginLoad` and `UnityPluginUnload`
static PLUGIN: ArcSwapOption<UnityPlugin> = ArcSwapOption::const_empty();

/// Borrowed `IUnityGraphics` table, valid while the plugin is loaded.
struct GraphicsInterface(NonNull<IUnityGraphics>);

// SAFETY: the table is immutable host memory that Unity keeps alive and
// callable from any thread until the plugin is unloaded.
unsafe impl Send for GraphicsInterface {}
unsafe impl Sync for GraphicsInterface {}

impl GraphicsInterface {
    /// # Safety
    /// `interfaces` must be null or the registry Unity passed to `UnityPluginLoad`.
    unsafe fn from_interfaces(interfaces: *mut IUnityInterfaces) -> Result<Self> {
        let interfaces = interfaces
            .as_ref()
            .ok_or_else(|| PluginError::null_pointer("IUnityInterfaces"))?;
        let get_interface = interfaces
            .GetInterface
            .ok_or_else(|| PluginError::null_pointer("IUnityInterfaces::GetInterface"))?;

        let graphics = get_interface(IUnityGraphics_GUID) as *mut IUnityGraphics;
        NonNull::new(graphics)
            .map(Self)
            .ok_or_else(|| PluginError::null_pointer("IUnityGraphics"))
    }

    fn table(&self) -> &IUnityGraphics {
        unsafe { self.0.as_ref() }
    }

    fn renderer(&self) -> Option<UnityGfxRenderer> {
        self.table().GetRenderer.map(|get| unsafe { get() })
    }

    fn register_device_callback(&self, callback: IUnityGraphicsDeviceEventCallback) {
        match self.table().RegisterDeviceEventCallback {
            Some(register) => unsafe { register(callback) },
            None => warn!("IUnityGraphics has no RegisterDeviceEventCallback"),
        }
    }

    fn unregister_device_callback(&self, callback: IUnityGraphicsDeviceEventCallback) {
        if let Some(unregister) = self.table().UnregisterDeviceEventCallback {
            unsafe { unregister(callback) };
        }
    }
}

/// Texture state shared by the render thread and the host's control thread.
pub struct PluginState {
    controller: Mutex<TextureController>,
    texture_id: TextureIdCell,
    stats: RenderEventStats,
}

impl PluginState {
    pub fn new(descriptor: TextureDescriptor) -> Self {
        let controller = TextureController::new(descriptor);
        let texture_id = controller.texture_id_cell();
        Self {
            controller: Mutex::new(controller),
            texture_id,
            stats: RenderEventStats::default(),
        }
    }

    pub fn texture_id(&self) -> u32 {
        self.texture_id.get()
    }

    pub fn stats(&self) -> &RenderEventStats {
        &self.stats
    }

    /// Texture that would be left behind if this state were dropped now.
    ///
    /// Dropping issues no GL call, so the name is only reclaimed by a
    /// device Shutdown event that reaches this state first.
    pub fn live_texture(&self) -> Option<u32> {
        self.controller.lock().handle()
    }

    /// Run one render event. `acquire_gl` is only called for known events.
    pub fn render_event<G, F>(&self, event_id: c_int, acquire_gl: F)
    where
        G: GlApi,
        F: FnOnce() -> Result<G>,
    {
        let event = RenderEvent::from_id(event_id);
        self.stats.record(event_id, event);

        let Some(event) = event else {
            debug!("Ignoring unknown render event {}", event_id);
            return;
        };

        let mut gl = match acquire_gl() {
            Ok(gl) => gl,
            Err(e) => {
                error!("Render event {:?} skipped: {}", event, e);
                return;
            }
        };

        if let Err(e) = self.controller.lock().dispatch(&mut gl, event) {
            error!("Render event {:?}: {}", event, e);
            if let Some(code) = e.gl_code() {
                self.stats.record_gl_error(code);
            }
        }
    }

    /// Change the texture size. GL is only touched when a texture is live.
    pub fn resize<G, F>(&self, width: c_int, height: c_int, acquire_gl: F) -> Result<()>
    where
        G: GlApi,
        F: FnOnce() -> Result<G>,
    {
        let mut controller = self.controller.lock();
        if let Some((w, h)) = controller.allocated_size() {
            debug!("Resizing live {}x{} texture", w, h);
            let mut gl = acquire_gl()?;
            controller.request_resize(&mut gl, width, height)?;
        } else {
            controller.set_target_size(width, height)?;
        }

        let (w, h) = controller.target_size();
        info!("Texture size set to {}x{}", w, h);
        Ok(())
    }

    /// Delete the texture on device shutdown.
    pub fn device_shutdown<G, F>(&self, acquire_gl: F) -> Result<()>
    where
        G: GlApi,
        F: FnOnce() -> Result<G>,
    {
        let mut controller = self.controller.lock();
        if controller.handle().is_none() {
            return Ok(());
        }
        let mut gl = acquire_gl()?;
        controller.shutdown(&mut gl);
        info!("Texture released after {} update frames", controller.frame_counter());
        Ok(())
    }
}

/// Everything owned between `UnityPluginLoad` and `UnityPluginUnload`
pub struct UnityPlugin {
    graphics: GraphicsInterface,
    state: PluginState,
}

impl UnityPlugin {
    /// The texture name is leaked: there is no render-thread context here.
    fn warn_if_leaking(&self, context: &str) {
        if let Some(texture) = self.state.live_texture() {
            warn!("{}: texture {} dropped without glDeleteTextures", context, texture);
        }
    }

    fn log_renderer(&self) {
        match self.graphics.renderer() {
            Some(renderer) if is_gl_renderer(renderer) => {
                info!("Graphics renderer: {}", renderer_name(renderer));
            }
            Some(renderer) => {
                warn!(
                    "Graphics renderer {} ({}) is not OpenGL; render events will not produce a texture",
                    renderer_name(renderer),
                    renderer
                );
            }
            None => warn!("IUnityGraphics has no GetRenderer"),
        }
    }
}

/// GL for the calling thread. Only reached from host callbacks that run
/// on Unity's render thread with its context current.
fn render_thread_gl() -> Result<GlesApi> {
    unsafe { GlesApi::current() }
}

extern "system" fn on_render_event(event_id: c_int) {
    match PLUGIN.load_full() {
        Some(plugin) => plugin.state.render_event(event_id, render_thread_gl),
        None => warn!("Render event {} before UnityPluginLoad", event_id),
    }
}

extern "system" fn on_graphics_device_event(event_type: UnityGfxDeviceEventType) {
    let Some(plugin) = PLUGIN.load_full() else {
        warn!("Device event {} without a loaded plugin", event_type);
        return;
    };

    match event_type {
        kUnityGfxDeviceEventInitialize => {
            info!("Gfx Initialize");
            plugin.log_renderer();
        }
        kUnityGfxDeviceEventShutdown => {
            info!("Gfx Shutdown");
            if let Err(e) = plugin.state.device_shutdown(render_thread_gl) {
                error!("Texture teardown on shutdown failed: {}", e);
            }
        }
        kUnityGfxDeviceEventBeforeReset | kUnityGfxDeviceEventAfterReset => {
            debug!("Gfx reset event {}", event_type);
        }
        other => debug!("Unhandled device event {}", other),
    }
}

/// Plugin entry point called by Unity right after loading the library.
///
/// # Safety
///
/// `interfaces` must be the registry pointer Unity passes to this hook.
#[no_mangle]
pub unsafe extern "system" fn UnityPluginLoad(interfaces: *mut IUnityInterfaces) {
    logger::init_logging();

    let graphics = match GraphicsInterface::from_interfaces(interfaces) {
        Ok(graphics) => graphics,
        Err(e) => {
            error!("UnityPluginLoad failed: {}", e);
            return;
        }
    };

    let plugin = Arc::new(UnityPlugin {
        graphics,
        state: PluginState::new(TextureDescriptor::default()),
    });

    if let Some(previous) = PLUGIN.swap(Some(plugin.clone())) {
        warn!("UnityPluginLoad called twice; replacing the previous instance");
        previous.graphics.unregister_device_callback(on_graphics_device_event);
        previous.warn_if_leaking("UnityPluginLoad");
    }

    plugin.graphics.register_device_callback(on_graphics_device_event);
    on_graphics_device_event(kUnityGfxDeviceEventInitialize);
    info!("UnityPluginLoad done");
}

/// Plugin exit point called by Unity before unloading the library.
#[no_mangle]
pub extern "system" fn UnityPluginUnload() {
    if let Some(plugin) = PLUGIN.swap(None) {
        plugin.graphics.unregister_device_callback(on_graphics_device_event);
        plugin.warn_if_leaking("UnityPluginUnload");
    }
    info!("UnityPluginUnload");
}

/// Function pointer for `GL.IssuePluginEvent` (1 = init, 2 = update).
#[no_mangle]
pub extern "system" fn GetRenderEventFunc() -> UnityRenderingEvent {
    on_render_event
}

/// Same callback, under the name the render-event health HUD imports.
#[no_mangle]
pub extern "system" fn GetRenderEventFuncGl() -> UnityRenderingEvent {
    on_render_event
}

/// Current GL texture name for `CreateExternalTexture` (0 = none yet).
#[no_mangle]
pub extern "system" fn GetTextureId() -> usize {
    match &*PLUGIN.load() {
        Some(plugin) => plugin.state.texture_id() as usize,
        None => 0,
    }
}

/// Set the texture size; a live texture is deleted and recreated on the
/// next render event. Deleting issues a GL call on the calling thread.
#[no_mangle]
pub extern "system" fn SetTextureSize(width: c_int, height: c_int) {
    let Some(plugin) = PLUGIN.load_full() else {
        warn!("SetTextureSize({}, {}) before UnityPluginLoad", width, height);
        return;
    };
    if let Err(e) = plugin.state.resize(width, height, render_thread_gl) {
        error!("SetTextureSize({}, {}) failed: {}", width, height, e);
    }
}

fn with_stats(read: impl FnOnce(&RenderEventStats) -> c_int) -> c_int {
    match &*PLUGIN.load() {
        Some(plugin) => read(plugin.state.stats()),
        None => 0,
    }
}

#[no_mangle]
pub extern "system" fn VkCheckGl_GetLastEventId() -> c_int {
    with_stats(RenderEventStats::last_event_id)
}

#[no_mangle]
pub extern "system" fn VkCheckGl_GetInitCount() -> c_int {
    with_stats(RenderEventStats::init_count)
}

#[no_mangle]
pub extern "system" fn VkCheckGl_GetTickCount() -> c_int {
    with_stats(RenderEventStats::update_count)
}

#[no_mangle]
pub extern "system" fn VkCheckGl_GetLastErrorCode() -> c_int {
    with_stats(RenderEventStats::last_error_code)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gles::recording::{GlCall, RecordingGl};
    use std::cell::RefCell;

    fn no_gl() -> Result<RecordingGl> {
        panic!("GL must not be touched here")
    }

    #[test]
    fn test_render_events_drive_texture() {
        let state = PluginState::new(TextureDescriptor::default());
        let gl = RefCell::new(RecordingGl::default());
        let borrow = || Ok(GlRef(&gl));

        state.render_event(1, borrow);
        assert_eq!(state.texture_id(), 1);
        state.render_event(2, borrow);
        state.render_event(2, borrow);

        assert_eq!(state.stats().init_count(), 1);
        assert_eq!(state.stats().update_count(), 2);
        assert_eq!(state.stats().last_event_id(), 2);
        assert_eq!(gl.borrow().count(|c| matches!(c, GlCall::SubImage { .. })), 2);
    }

    #[test]
    fn test_unknown_event_is_counted_but_ignored() {
        let state = PluginState::new(TextureDescriptor::default());
        state.render_event(7, no_gl);

        assert_eq!(state.stats().last_event_id(), 7);
        assert_eq!(state.stats().init_count(), 0);
        assert_eq!(state.texture_id(), 0);
    }

    #[test]
    fn test_gl_unavailable_skips_dispatch() {
        let state = PluginState::new(TextureDescriptor::default());
        state.render_event(1, || -> Result<RecordingGl> {
            Err(PluginError::gl_load("libGLESv2.so", "not found"))
        });

        assert_eq!(state.stats().init_count(), 1);
        assert_eq!(state.texture_id(), 0);
    }

    #[test]
    fn test_allocation_error_is_recorded() {
        let state = PluginState::new(TextureDescriptor::default());
        let gl = RefCell::new(RecordingGl {
            pending_errors: vec![gl::OUT_OF_MEMORY],
            ..Default::default()
        });

        state.render_event(1, || Ok(GlRef(&gl)));

        assert_eq!(state.stats().last_error_code(), gl::OUT_OF_MEMORY as c_int);
        assert_eq!(state.texture_id(), 1);
    }

    #[test]
    fn test_resize_without_texture_skips_gl() {
        let state = PluginState::new(TextureDescriptor::default());
        state.resize(128, 64, no_gl).unwrap();
        assert!(state.resize(-1, 64, no_gl).is_err());
        state.device_shutdown(no_gl).unwrap();
    }

    #[test]
    fn test_resize_and_shutdown_delete_texture() {
        let state = PluginState::new(TextureDescriptor::default());
        let gl = RefCell::new(RecordingGl::default());

        state.render_event(1, || Ok(GlRef(&gl)));
        state.resize(128, 64, || Ok(GlRef(&gl))).unwrap();
        assert_eq!(state.texture_id(), 0);
        assert_eq!(gl.borrow().calls.last(), Some(&GlCall::Delete(1)));

        state.render_event(1, || Ok(GlRef(&gl)));
        assert!(gl
            .borrow()
            .calls
            .contains(&GlCall::Image { width: 128, height: 64, len: 128 * 64 * 4 }));

        state.device_shutdown(|| Ok(GlRef(&gl))).unwrap();
        assert_eq!(state.texture_id(), 0);
        assert_eq!(gl.borrow().calls.last(), Some(&GlCall::Delete(2)));
    }

    #[test]
    fn test_live_texture_reports_undeleted_name() {
        let state = PluginState::new(TextureDescriptor::default());
        let gl = RefCell::new(RecordingGl::default());
        assert_eq!(state.live_texture(), None);

        state.render_event(1, || Ok(GlRef(&gl)));
        assert_eq!(state.live_texture(), Some(1));

        state.device_shutdown(|| Ok(GlRef(&gl))).unwrap();
        assert_eq!(state.live_texture(), None);
    }

    #[test]
    fn test_resize_live_texture_then_reject_oversized() {
        let state = PluginState::new(TextureDescriptor::default());
        let gl = RefCell::new(RecordingGl::default());
        state.render_event(1, || Ok(GlRef(&gl)));

        assert!(state.resize(i32::MAX, i32::MAX, || Ok(GlRef(&gl))).is_err());
        assert_eq!(state.live_texture(), Some(1));

        // Oversized requests never reach the pixel buffer on the next event
        state.render_event(2, || Ok(GlRef(&gl)));
        assert_eq!(state.stats().update_count(), 1);
        assert_eq!(gl.borrow().count(|c| matches!(c, GlCall::SubImage { .. })), 1);
    }

    #[test]
    fn test_exports_without_plugin() {
        // Nothing in the test binary calls UnityPluginLoad
        assert_eq!(GetTextureId(), 0);
        assert_eq!(VkCheckGl_GetInitCount(), 0);
        SetTextureSize(64, 64);
        (GetRenderEventFunc())(1);
        assert_eq!(GetTextureId(), 0);
    }

    /// Lets several acquisitions share one recording.
    struct GlRef<'a>(&'a RefCell<RecordingGl>);

    impl GlApi for GlRef<'_> {
        fn gen_texture(&mut self) -> u32 {
            self.0.borrow_mut().gen_texture()
        }
        fn bind_texture_2d(&mut self, texture: u32) {
            self.0.borrow_mut().bind_texture_2d(texture)
        }
        fn set_sampling(&mut self) {
            self.0.borrow_mut().set_sampling()
        }
        fn tex_image_rgba8(&mut self, width: u32, height: u32, pixels: &[u8]) {
            self.0.borrow_mut().tex_image_rgba8(width, height, pixels)
        }
        fn tex_sub_image_rgba8(&mut self, x: u32, y: u32, width: u32, height: u32, pixels: &[u8]) {
            self.0.borrow_mut().tex_sub_image_rgba8(x, y, width, height, pixels)
        }
        fn get_error(&mut self) -> u32 {
            self.0.borrow_mut().get_error()
        }
        fn delete_texture(&mut self, texture: u32) {
            self.0.borrow_mut().delete_texture(texture)
        }
    }
}
