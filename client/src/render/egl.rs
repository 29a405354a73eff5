use std::{ffi::c_void, fmt, ptr};

use glow::HasContext;
use khronos_egl as egl;
use wayland_client::Proxy;
use wayland_egl::WlEglSurface;

use crate::wayland::WaylandWindow;

use super::{RenderError, RenderTarget, Renderer};

type Egl = egl::Instance<egl::Static>;

/// 8 bit RGBA channels, drawable to windows with desktop OpenGL.
const CONFIG_ATTRIBUTES: [egl::Int; 13] = [
    egl::RENDERABLE_TYPE,
    egl::OPENGL_BIT,
    egl::SURFACE_TYPE,
    egl::WINDOW_BIT,
    egl::RED_SIZE,
    8,
    egl::GREEN_SIZE,
    8,
    egl::BLUE_SIZE,
    8,
    egl::ALPHA_SIZE,
    8,
    egl::NONE,
];

/// Frames are paced by the render tick. Waiting for vblank in `eglSwapBuffers` would block the event loop
/// for as long as the compositor withholds frame callbacks, for example while the window is hidden.
const SWAP_INTERVAL: egl::Int = 0;

/// Creates EGL window surfaces on a Wayland connection.
pub struct EglRenderer {
    egl: Egl,
    native_display: *mut c_void,
}

impl fmt::Debug for EglRenderer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EglRenderer")
            .field("native_display", &self.native_display)
            .finish_non_exhaustive()
    }
}

impl EglRenderer {
    /// # Safety
    ///
    /// `native_display` must point to the `wl_display` of a connection which outlives the renderer and every
    /// target it creates.
    pub unsafe fn new(native_display: *mut c_void) -> Self {
        Self {
            egl: egl::Instance::new(egl::Static),
            native_display,
        }
    }
}

impl Renderer<WaylandWindow> for EglRenderer {
    type Target = EglTarget;

    fn create(&mut self, window: &WaylandWindow, width: u32, height: u32) -> Result<EglTarget, RenderError> {
        // SAFETY: The caller of `new` guaranteed the display pointer is valid.
        let display = unsafe { self.egl.get_display(self.native_display as egl::NativeDisplayType) }
            .ok_or(RenderError::NoDisplay)?;

        let (major, minor) = self.egl.initialize(display).map_err(RenderError::Initialize)?;
        tracing::debug!(major, minor, "Initialized EGL");

        create_on(&self.egl, display, window, width, height).map_err(|err| {
            let _ = self.egl.terminate(display);
            err
        })
    }
}

fn create_on(
    egl: &Egl,
    display: egl::Display,
    window: &WaylandWindow,
    width: u32,
    height: u32,
) -> Result<EglTarget, RenderError> {
    egl.bind_api(egl::OPENGL_API).map_err(RenderError::BindApi)?;

    let config = egl
        .choose_first_config(display, &CONFIG_ATTRIBUTES)
        .map_err(RenderError::ChooseConfig)?
        .ok_or(RenderError::NoMatchingConfig)?;

    let native = WlEglSurface::new(
        window.surface.id(),
        i32::try_from(width).unwrap_or(i32::MAX),
        i32::try_from(height).unwrap_or(i32::MAX),
    )
    .map_err(RenderError::Window)?;

    // SAFETY: The native window stays alive in the target until the EGL surface is destroyed.
    let surface = unsafe {
        egl.create_window_surface(display, config, native.ptr() as egl::NativeWindowType, None)
    }
    .map_err(RenderError::SurfaceCreation)?;

    let context = match egl.create_context(display, config, None, &[egl::NONE]) {
        Ok(context) => context,
        Err(err) => {
            let _ = egl.destroy_surface(display, surface);
            return Err(RenderError::ContextCreation(err));
        }
    };

    if let Err(err) = egl.make_current(display, Some(surface), Some(surface), Some(context)) {
        let _ = egl.destroy_context(display, context);
        let _ = egl.destroy_surface(display, surface);
        return Err(RenderError::MakeCurrent(err));
    }

    if let Err(err) = egl.swap_interval(display, SWAP_INTERVAL) {
        tracing::warn!("Failed to set swap interval, presenting may block: {err}");
    }

    // SAFETY: The context is current on this thread.
    let gl = unsafe {
        glow::Context::from_loader_function(|name| {
            egl.get_proc_address(name)
                .map_or(ptr::null(), |function| function as *const c_void)
        })
    };

    tracing::info!(width, height, "Created EGL window surface");

    Ok(EglTarget {
        egl: egl::Instance::new(egl::Static),
        display,
        surface,
        context,
        gl,
        _native: native,
    })
}

/// An EGL window surface with a current OpenGL context.
pub struct EglTarget {
    egl: Egl,
    display: egl::Display,
    surface: egl::Surface,
    context: egl::Context,
    gl: glow::Context,
    // Dropped after the EGL surface is destroyed.
    _native: WlEglSurface,
}

impl fmt::Debug for EglTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EglTarget").finish_non_exhaustive()
    }
}

impl RenderTarget for EglTarget {
    fn present(&mut self) -> Result<(), RenderError> {
        // SAFETY: The context was made current when the target was created and nothing else uses EGL.
        unsafe {
            self.gl.clear_color(1.0, 0.0, 0.0, 1.0);
            self.gl.clear(glow::COLOR_BUFFER_BIT);
        }

        self.egl
            .swap_buffers(self.display, self.surface)
            .map_err(RenderError::SwapBuffers)
    }
}

impl Drop for EglTarget {
    fn drop(&mut self) {
        let _ = self.egl.make_current(self.display, None, None, None);

        if let Err(err) = self.egl.destroy_surface(self.display, self.surface) {
            tracing::warn!("Failed to destroy EGL surface: {err}");
        }

        if let Err(err) = self.egl.destroy_context(self.display, self.context) {
            tracing::warn!("Failed to destroy EGL context: {err}");
        }

        let _ = self.egl.terminate(self.display);
        tracing::debug!("Destroyed EGL window surface");
    }
}
