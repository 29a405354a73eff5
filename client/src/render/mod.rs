//! The hardware accelerated drawable attached to the window.

mod egl;

pub use self::egl::{EglRenderer, EglTarget};

/// Errors while creating or presenting a render target.
///
/// Each step of setting up a drawable fails separately, so the cause can point at the driver, the compositor or
/// an API mismatch.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    /// No EGL display exists for the display server connection.
    #[error("no EGL display is available for the connection")]
    NoDisplay,

    #[error("could not initialize the EGL display")]
    Initialize(#[source] khronos_egl::Error),

    #[error("could not bind the OpenGL API")]
    BindApi(#[source] khronos_egl::Error),

    /// Selecting a config failed.
    #[error("could not choose a config")]
    ChooseConfig(#[source] khronos_egl::Error),

    /// No config has 8 bit RGBA channels and supports window surfaces.
    #[error("no config matches the required attributes")]
    NoMatchingConfig,

    /// The native window could not be created for the surface.
    #[error("could not create the native window: {0:?}")]
    Window(wayland_egl::Error),

    #[error("could not create the window surface")]
    SurfaceCreation(#[source] khronos_egl::Error),

    #[error("could not create the rendering context")]
    ContextCreation(#[source] khronos_egl::Error),

    #[error("could not make the context current")]
    MakeCurrent(#[source] khronos_egl::Error),

    #[error("could not swap buffers")]
    SwapBuffers(#[source] khronos_egl::Error),
}

/// Creates render targets for windows.
pub trait Renderer<W> {
    type Target: RenderTarget;

    /// Create the single render target of a window and make it current.
    ///
    /// The window must have a committed surface.
    fn create(&mut self, window: &W, width: u32, height: u32) -> Result<Self::Target, RenderError>;
}

/// A drawable which owns its context.
///
/// Dropping the target destroys it, so it must be dropped before the window it draws to.
pub trait RenderTarget {
    /// Clear the framebuffer and swap buffers.
    fn present(&mut self) -> Result<(), RenderError>;
}

/// The render target of the window, if it was created.
#[derive(Debug, Default)]
pub enum RenderState<T> {
    /// Waiting for the first configure.
    #[default]
    Pending,

    Active(T),

    /// Creating or presenting the target failed, nothing is rendered anymore.
    Failed,
}

impl<T> RenderState<T> {
    pub fn is_active(&self) -> bool {
        matches!(self, RenderState::Active(_))
    }

    pub fn target_mut(&mut self) -> Option<&mut T> {
        match self {
            RenderState::Active(target) => Some(target),
            _ => None,
        }
    }

    /// Remove the target, leaving the state failed.
    pub fn take(&mut self) -> Option<T> {
        match std::mem::replace(self, RenderState::Failed) {
            RenderState::Active(target) => Some(target),
            _ => None,
        }
    }
}
