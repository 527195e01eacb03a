//! OpenGL ES access for the texture controller
//!
//! [`GlApi`] is the narrow set of GL calls the controller issues, so the
//! lifecycle logic can run against a recording fake in tests. [`GlesApi`]
//! is the real implementation: entry points are resolved once per process
//! from the platform GL library and cached by the `gl` crate.

use std::ffi::c_void;
use std::marker::PhantomData;

use gl::types::{GLenum, GLint, GLsizei, GLuint};
use libloading::Library;
use log::{debug, info};
use once_cell::sync::OnceCell;

use crate::error::{PluginError, Result};

#[cfg(target_os = "android")]
const GL_LIBRARY_NAME: &str = "libGLESv2.so";
#[cfg(target_os = "windows")]
const GL_LIBRARY_NAME: &str = "opengl32.dll";
#[cfg(target_os = "macos")]
const GL_LIBRARY_NAME: &str = "/System/Library/Frameworks/OpenGL.framework/OpenGL";
#[cfg(not(any(target_os = "android", target_os = "windows", target_os = "macos")))]
const GL_LIBRARY_NAME: &str = "libGL.so.1";

/// Keeps the GL library mapped for the lifetime of the process once the
/// `gl` crate's function table points into it.
static GL_LIBRARY: OnceCell<Library> = OnceCell::new();

/// GL calls issued by the texture controller.
///
/// Every method acts on the `GL_TEXTURE_2D` target of the active texture
/// unit, exactly as the host's render thread leaves it.
pub trait GlApi {
    /// Generate one texture name.
    fn gen_texture(&mut self) -> GLuint;

    /// Bind `texture` to `GL_TEXTURE_2D`.
    fn bind_texture_2d(&mut self, texture: GLuint);

    /// Linear min/mag filtering and clamp-to-edge wrapping on the bound texture.
    fn set_sampling(&mut self);

    /// Allocate level 0 of the bound texture as RGBA8 and upload `pixels`.
    fn tex_image_rgba8(&mut self, width: u32, height: u32, pixels: &[u8]);

    /// Overwrite a region of level 0 of the bound texture with RGBA8 `pixels`.
    fn tex_sub_image_rgba8(&mut self, x: u32, y: u32, width: u32, height: u32, pixels: &[u8]);

    /// Pop the oldest GL error flag (`GL_NO_ERROR` when clear).
    fn get_error(&mut self) -> GLenum;

    /// Delete a texture name.
    fn delete_texture(&mut self, texture: GLuint);
}

/// [`GlApi`] backed by the host's current GL context.
///
/// Not `Send`: a value is only ever created on, and used from, the thread
/// that owns the context.
#[derive(Debug)]
pub struct GlesApi {
    _context_bound: PhantomData<*const ()>,
}

impl GlesApi {
    /// Resolve GL entry points (first call only) and wrap the current context.
    ///
    /// # Safety
    ///
    /// The caller must be on the host's render thread with the host's GL
    /// context current for as long as the returned value is used.
    pub unsafe fn current() -> Result<Self> {
        load_entry_points()?;
        Ok(Self {
            _context_bound: PhantomData,
        })
    }
}

impl GlApi for GlesApi {
    fn gen_texture(&mut self) -> GLuint {
        let mut texture: GLuint = 0;
        unsafe { gl::GenTextures(1, &mut texture) };
        texture
    }

    fn bind_texture_2d(&mut self, texture: GLuint) {
        unsafe { gl::BindTexture(gl::TEXTURE_2D, texture) };
    }

    fn set_sampling(&mut self) {
        unsafe {
            gl::TexParameteri(gl::TEXTURE_2D, gl::TEXTURE_MIN_FILTER, gl::LINEAR as GLint);
            gl::TexParameteri(gl::TEXTURE_2D, gl::TEXTURE_MAG_FILTER, gl::LINEAR as GLint);
            gl::TexParameteri(gl::TEXTURE_2D, gl::TEXTURE_WRAP_S, gl::CLAMP_TO_EDGE as GLint);
            gl::TexParameteri(gl::TEXTURE_2D, gl::TEXTURE_WRAP_T, gl::CLAMP_TO_EDGE as GLint);
        }
    }

    fn tex_image_rgba8(&mut self, width: u32, height: u32, pixels: &[u8]) {
        debug_assert_eq!(pixels.len(), width as usize * height as usize * 4);
        unsafe {
            gl::TexImage2D(
                gl::TEXTURE_2D,
                0,
                gl::RGBA as GLint,
                width as GLsizei,
                height as GLsizei,
                0,
                gl::RGBA,
                gl::UNSIGNED_BYTE,
                pixels.as_ptr() as *const c_void,
            );
        }
    }

    fn tex_sub_image_rgba8(&mut self, x: u32, y: u32, width: u32, height: u32, pixels: &[u8]) {
        debug_assert_eq!(pixels.len(), width as usize * height as usize * 4);
        unsafe {
            gl::TexSubImage2D(
                gl::TEXTURE_2D,
                0,
                x as GLint,
                y as GLint,
                width as GLsizei,
                height as GLsizei,
                gl::RGBA,
                gl::UNSIGNED_BYTE,
                pixels.as_ptr() as *const c_void,
            );
        }
    }

    fn get_error(&mut self) -> GLenum {
        unsafe { gl::GetError() }
    }

    fn delete_texture(&mut self, texture: GLuint) {
        unsafe { gl::DeleteTextures(1, &texture) };
    }
}

/// Open the platform GL library and point the `gl` crate at it, once.
fn load_entry_points() -> Result<()> {
    GL_LIBRARY.get_or_try_init(|| {
        let library = unsafe { Library::new(GL_LIBRARY_NAME) }
            .map_err(|e| PluginError::gl_load(GL_LIBRARY_NAME, e))?;

        gl::load_with(|symbol| resolve(&library, symbol));

        let required = [
            ("glGenTextures", gl::GenTextures::is_loaded()),
            ("glBindTexture", gl::BindTexture::is_loaded()),
            ("glTexParameteri", gl::TexParameteri::is_loaded()),
            ("glTexImage2D", gl::TexImage2D::is_loaded()),
            ("glTexSubImage2D", gl::TexSubImage2D::is_loaded()),
            ("glGetError", gl::GetError::is_loaded()),
            ("glDeleteTextures", gl::DeleteTextures::is_loaded()),
        ];
        if let Some((name, _)) = required.iter().find(|(_, loaded)| !loaded) {
            return Err(PluginError::gl_load(
                GL_LIBRARY_NAME,
                format!("missing entry point {}", name),
            ));
        }

        info!("GL entry points loaded from {}", GL_LIBRARY_NAME);
        Ok(library)
    })?;
    Ok(())
}

fn resolve(library: &Library, symbol: &str) -> *const c_void {
    let mut name = Vec::with_capacity(symbol.len() + 1);
    name.extend_from_slice(symbol.as_bytes());
    name.push(0);

    match unsafe { library.get::<unsafe extern "C" fn()>(&name) } {
        Ok(function) => *function as *const c_void,
        Err(_) => {
            debug!("GL symbol not found: {}", symbol);
            std::ptr::null()
        }
    }
}

#[cfg(test)]
pub(crate) mod recording {
    use super::GlApi;
    use gl::types::GLuint;

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub(crate) enum GlCall {
        Gen(GLuint),
        Bind(GLuint),
        Sampling,
        Image { width: u32, height: u32, len: usize },
        SubImage { x: u32, y: u32, width: u32, height: u32, first: [u8; 4] },
        Delete(GLuint),
    }

    /// Records every call; hands out texture names 1, 2, 3...
    #[derive(Debug, Default)]
    pub(crate) struct RecordingGl {
        pub calls: Vec<GlCall>,
        pub next_name: GLuint,
        pub pending_errors: Vec<u32>,
        pub last_image: Vec<u8>,
    }

    impl RecordingGl {
        pub fn count(&self, pred: impl Fn(&GlCall) -> bool) -> usize {
            self.calls.iter().filter(|c| pred(c)).count()
        }
    }

    impl GlApi for RecordingGl {
        fn gen_texture(&mut self) -> GLuint {
            self.next_name += 1;
            self.calls.push(GlCall::Gen(self.next_name));
            self.next_name
        }

        fn bind_texture_2d(&mut self, texture: GLuint) {
            self.calls.push(GlCall::Bind(texture));
        }

        fn set_sampling(&mut self) {
            self.calls.push(GlCall::Sampling);
        }

        fn tex_image_rgba8(&mut self, width: u32, height: u32, pixels: &[u8]) {
            self.last_image = pixels.to_vec();
            self.calls.push(GlCall::Image { width, height, len: pixels.len() });
        }

        fn tex_sub_image_rgba8(&mut self, x: u32, y: u32, width: u32, height: u32, pixels: &[u8]) {
            assert_eq!(pixels.len(), (width * height * 4) as usize);
            let first = [pixels[0], pixels[1], pixels[2], pixels[3]];
            self.calls.push(GlCall::SubImage { x, y, width, height, first });
        }

        fn get_error(&mut self) -> u32 {
            self.pending_errors.pop().unwrap_or(gl::NO_ERROR)
        }

        fn delete_texture(&mut self, texture: GLuint) {
            self.calls.push(GlCall::Delete(texture));
        }
    }
}
