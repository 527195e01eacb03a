//! Render events issued by the host on its render thread

use std::os::raw::c_int;
use std::sync::atomic::{AtomicI32, Ordering};

/// Event ids understood by the render callback
pub const EVENT_INIT: c_int = 1;
pub const EVENT_UPDATE: c_int = 2;
/// GL ids used by the render-event health HUD
pub const EVENT_GL_INIT: c_int = 1001;
pub const EVENT_GL_UPDATE: c_int = 1002;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderEvent {
    /// Make sure the texture exists
    Init,
    /// Make sure the texture exists, then paint this frame's patch
    Update,
}

impl RenderEvent {
    pub fn from_id(event_id: c_int) -> Option<Self> {
        match event_id {
            EVENT_INIT | EVENT_GL_INIT => Some(Self::Init),
            EVENT_UPDATE | EVENT_GL_UPDATE => Some(Self::Update),
            _ => None,
        }
    }
}

/// Lock-free counters the host polls to check the render callback is alive.
#[derive(Debug, Default)]
pub struct RenderEventStats {
    last_event_id: AtomicI32,
    init_count: AtomicI32,
    update_count: AtomicI32,
    last_error_code: AtomicI32,
}

impl RenderEventStats {
    /// Record an incoming event id, recognised or not.
    pub fn record(&self, event_id: c_int, event: Option<RenderEvent>) {
        self.last_event_id.store(event_id, Ordering::Relaxed);
        match event {
            Some(RenderEvent::Init) => {
                self.init_count.fetch_add(1, Ordering::Relaxed);
            }
            Some(RenderEvent::Update) => {
                self.update_count.fetch_add(1, Ordering::Relaxed);
            }
            None => {}
        }
    }

    /// Record the GL error left by the most recent allocation (0 = none).
    pub fn record_gl_error(&self, code: u32) {
        self.last_error_code.store(code as i32, Ordering::Relaxed);
    }

    pub fn last_event_id(&self) -> c_int {
        self.last_event_id.load(Ordering::Relaxed)
    }

    pub fn init_count(&self) -> c_int {
        self.init_count.load(Ordering::Relaxed)
    }

    pub fn update_count(&self) -> c_int {
        self.update_count.load(Ordering::Relaxed)
    }

    pub fn last_error_code(&self) -> c_int {
        self.last_error_code.load(Ordering::Relaxed)
    }
}
