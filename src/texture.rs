//! Render-thread texture lifecycle
//!
//! [`TextureController`] keeps at most one GL texture alive. The host drives
//! it from its render thread: init events allocate the texture with a
//! gradient, update events overwrite a centred patch with a colour derived
//! from the frame counter, and resize/shutdown tear the texture down so the
//! next event reallocates it.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use gl::types::GLuint;
use log::{debug, info};

use crate::error::{PluginError, Result};
use crate::gles::GlApi;
use crate::render_event::RenderEvent;

/// Blue channel of the initial gradient
const GRADIENT_BLUE: u8 = 32;

/// Largest width or height accepted for the texture
pub const MAX_TEXTURE_SIZE: u32 = 16384;

/// Size and update-patch configuration for the controlled texture
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureDescriptor {
    pub width: u32,
    pub height: u32,
    /// Width of the patch rewritten on every update event
    pub patch_width: u32,
    /// Height of the patch rewritten on every update event
    pub patch_height: u32,
}

impl Default for TextureDescriptor {
    fn default() -> Self {
        Self {
            width: 512,
            height: 512,
            patch_width: 256,
            patch_height: 256,
        }
    }
}

/// Lock-free published copy of the live texture name (0 = absent).
///
/// Readers get a snapshot only; ordering against GL work on the render
/// thread is the reader's problem.
#[derive(Debug, Clone, Default)]
pub struct TextureIdCell(Arc<AtomicU32>);

impl TextureIdCell {
    pub fn get(&self) -> GLuint {
        self.0.load(Ordering::Acquire)
    }

    fn set(&self, texture: GLuint) {
        self.0.store(texture, Ordering::Release);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TextureState {
    Absent,
    Allocated { texture: GLuint, width: u32, height: u32 },
}

/// Outcome of a successful [`TextureController::allocate_if_absent`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Allocation {
    /// A texture already existed; nothing was touched
    Existing(GLuint),
    /// A new texture was generated and filled
    Created(GLuint),
}

/// Owner of the single render-thread texture
#[derive(Debug)]
pub struct TextureController {
    descriptor: TextureDescriptor,
    state: TextureState,
    frame: u32,
    published: TextureIdCell,
}

impl TextureController {
    pub fn new(descriptor: TextureDescriptor) -> Self {
        Self {
            descriptor,
            state: TextureState::Absent,
            frame: 0,
            published: TextureIdCell::default(),
        }
    }

    /// Shared cell other threads can read the live texture name from
    pub fn texture_id_cell(&self) -> TextureIdCell {
        self.published.clone()
    }

    /// Current texture name, `None` while absent
    pub fn handle(&self) -> Option<GLuint> {
        match self.state {
            TextureState::Absent => None,
            TextureState::Allocated { texture, .. } => Some(texture),
        }
    }

    /// Size the next allocation will use
    pub fn target_size(&self) -> (u32, u32) {
        (self.descriptor.width, self.descriptor.height)
    }

    /// Size of the live texture, `None` while absent
    pub fn allocated_size(&self) -> Option<(u32, u32)> {
        match self.state {
            TextureState::Absent => None,
            TextureState::Allocated { width, height, .. } => Some((width, height)),
        }
    }

    pub fn frame_counter(&self) -> u32 {
        self.frame
    }

    /// Handle one render event from the host.
    ///
    /// An allocation failure is returned, but the texture still counts as
    /// allocated and an update still writes its patch.
    pub fn dispatch<G: GlApi>(&mut self, gl: &mut G, event: RenderEvent) -> Result<()> {
        let allocated = self.allocate_if_absent(gl).map(|_| ());
        if event == RenderEvent::Update {
            let written = self.write_frame_patch(gl);
            return allocated.and(written);
        }
        allocated
    }

    /// Generate and fill the texture unless one is already live.
    ///
    /// On a GL error after the upload the state still moves to allocated;
    /// there is no rollback and no retry. If the pixel buffer itself cannot
    /// be allocated, no GL call is made and the texture stays absent.
    pub fn allocate_if_absent<G: GlApi>(&mut self, gl: &mut G) -> Result<Allocation> {
        if let Some(texture) = self.handle() {
            return Ok(Allocation::Existing(texture));
        }

        let TextureDescriptor { width, height, .. } = self.descriptor;
        let pixels = gradient_pixels(width, height)?;

        let texture = gl.gen_texture();
        gl.bind_texture_2d(texture);
        gl.set_sampling();
        gl.tex_image_rgba8(width, height, &pixels);

        self.state = TextureState::Allocated { texture, width, height };
        self.published.set(texture);

        let code = gl.get_error();
        if code != gl::NO_ERROR {
            return Err(PluginError::Allocation { texture, code });
        }

        info!("Texture created: texId={} size={}x{}", texture, width, height);
        Ok(Allocation::Created(texture))
    }

    /// Change the target size; a live texture is deleted right away.
    ///
    /// Issues a GL call when a texture exists, so only call this on the
    /// render thread.
    pub fn request_resize<G: GlApi>(&mut self, gl: &mut G, width: i32, height: i32) -> Result<()> {
        self.set_target_size(width, height)?;
        if self.release(gl) {
            info!("Texture deleted for resize to {}x{}; next init recreates it", width, height);
        }
        Ok(())
    }

    /// Change the size of the next allocation without touching a live texture.
    pub fn set_target_size(&mut self, width: i32, height: i32) -> Result<()> {
        if width <= 0 || height <= 0 {
            return Err(PluginError::invalid_argument(
                "size",
                format!("{}x{} must be positive", width, height),
            ));
        }
        if width as u32 > MAX_TEXTURE_SIZE || height as u32 > MAX_TEXTURE_SIZE {
            return Err(PluginError::invalid_argument(
                "size",
                format!("{}x{} exceeds {}", width, height, MAX_TEXTURE_SIZE),
            ));
        }
        self.descriptor.width = width as u32;
        self.descriptor.height = height as u32;
        Ok(())
    }

    /// Delete the live texture, if any. Returns whether one was deleted.
    pub fn shutdown<G: GlApi>(&mut self, gl: &mut G) -> bool {
        let released = self.release(gl);
        if released {
            info!("Texture deleted on shutdown");
        }
        released
    }

    fn release<G: GlApi>(&mut self, gl: &mut G) -> bool {
        let TextureState::Allocated { texture, .. } = self.state else {
            return false;
        };
        self.state = TextureState::Absent;
        self.published.set(0);
        gl.delete_texture(texture);
        true
    }

    fn write_frame_patch<G: GlApi>(&mut self, gl: &mut G) -> Result<()> {
        let TextureState::Allocated { texture, width, height } = self.state else {
            return Ok(());
        };

        let patch_w = self.descriptor.patch_width.min(width);
        let patch_h = self.descriptor.patch_height.min(height);
        let (x, y) = patch_origin((width, height), (patch_w, patch_h));
        let color = frame_color(self.frame);
        let pixels = solid_pixels(patch_w, patch_h, color)?;

        gl.bind_texture_2d(texture);
        gl.tex_sub_image_rgba8(x, y, patch_w, patch_h, &pixels);

        debug!("Frame {} patch {:?} at ({}, {})", self.frame, color, x, y);
        self.frame = self.frame.wrapping_add(1);
        Ok(())
    }
}

/// Colour of the update patch for frame `n`, RGBA.
pub fn frame_color(n: u32) -> [u8; 4] {
    [
        n.wrapping_mul(3) as u8,
        n.wrapping_mul(7) as u8,
        n.wrapping_mul(11) as u8,
        255,
    ]
}

/// Initial texture contents: red across x, green across y, fixed blue.
pub fn gradient_pixels(width: u32, height: u32) -> Result<Vec<u8>> {
    let mut pixels = pixel_buffer(width, height)?;
    for y in 0..height {
        let g = ramp(y, height);
        for x in 0..width {
            pixels.extend_from_slice(&[ramp(x, width), g, GRADIENT_BLUE, 255]);
        }
    }
    Ok(pixels)
}

/// One RGBA colour repeated over a `width` x `height` block.
pub fn solid_pixels(width: u32, height: u32, color: [u8; 4]) -> Result<Vec<u8>> {
    let mut pixels = pixel_buffer(width, height)?;
    for _ in 0..width as usize * height as usize {
        pixels.extend_from_slice(&color);
    }
    Ok(pixels)
}

/// Empty RGBA8 buffer with room for `width` x `height` pixels.
fn pixel_buffer(width: u32, height: u32) -> Result<Vec<u8>> {
    let failed = || PluginError::PixelBuffer { width, height };
    let len = (width as usize)
        .checked_mul(height as usize)
        .and_then(|n| n.checked_mul(4))
        .ok_or_else(failed)?;

    let mut pixels = Vec::new();
    pixels.try_reserve_exact(len).map_err(|_| failed())?;
    Ok(pixels)
}

/// Lower-left corner of a patch centred in a texture.
pub fn patch_origin((width, height): (u32, u32), (patch_w, patch_h): (u32, u32)) -> (u32, u32) {
    (width.saturating_sub(patch_w) / 2, height.saturating_sub(patch_h) / 2)
}

fn ramp(position: u32, extent: u32) -> u8 {
    if extent <= 1 {
        return 0;
    }
    (position as u64 * 255 / (extent as u64 - 1)) as u8
}
