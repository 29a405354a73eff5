//! The window surface and its configure handshake.

use std::{fmt, num::NonZeroU32};

use crate::Transport;

/// Events concerning the window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowEvent {
    /// The compositor proposed a surface state which must be acknowledged with the serial.
    Configure { serial: u32 },

    /// Size suggested by the compositor for the toplevel.
    ///
    /// A zero width or height means the client may choose.
    ToplevelConfigure { width: i32, height: i32 },

    /// The compositor asked the toplevel to close.
    Close,
}

/// State of the configure handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SurfaceState {
    /// No window exists.
    Uninitialized,

    /// The window was committed and waits for its first configure.
    AwaitingConfigure,

    /// A configure was acknowledged.
    Ready,
}

impl fmt::Display for SurfaceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SurfaceState::Uninitialized => "uninitialized",
            SurfaceState::AwaitingConfigure => "awaiting configure",
            SurfaceState::Ready => "ready",
        };

        f.write_str(name)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SurfaceError {
    /// The operation is not valid in the current state.
    #[error("cannot {operation} while the surface is {state}")]
    InvalidState {
        operation: &'static str,
        state: SurfaceState,
    },
}

/// Result of handling a [`WindowEvent::Configure`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Configured {
    /// The first configure was acknowledged, the surface became ready.
    First,

    /// A later configure was acknowledged.
    Again,
}

/// Owns the window and drives the configure/acknowledge handshake.
#[derive(Debug)]
pub struct SurfaceLifecycle<W> {
    title: String,
    state: SurfaceState,
    window: Option<W>,
    suggested_size: Option<(NonZeroU32, NonZeroU32)>,
    last_serial: Option<u32>,
}

impl<W> SurfaceLifecycle<W> {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            state: SurfaceState::Uninitialized,
            window: None,
            suggested_size: None,
            last_serial: None,
        }
    }

    pub fn state(&self) -> SurfaceState {
        self.state
    }

    pub fn window(&self) -> Option<&W> {
        self.window.as_ref()
    }

    /// Serial of the last acknowledged configure.
    pub fn last_serial(&self) -> Option<u32> {
        self.last_serial
    }

    /// The size suggested by the compositor, if it suggested one.
    pub fn suggested_size(&self) -> Option<(NonZeroU32, NonZeroU32)> {
        self.suggested_size
    }

    /// Create the window and commit the base surface.
    pub fn create<T>(&mut self, transport: &mut T, compositor: &T::Compositor, wm_base: &T::WmBase) -> Result<(), SurfaceError>
    where
        T: Transport<Window = W>,
    {
        self.expect_state("create the window", SurfaceState::Uninitialized)?;

        let window = transport.create_window(compositor, wm_base, &self.title);
        self.window = Some(window);
        self.state = SurfaceState::AwaitingConfigure;

        tracing::debug!(title = %self.title, "Committed window surface");
        Ok(())
    }

    /// Acknowledge a configure.
    ///
    /// The serial is echoed back unmodified before anything else references the surface.
    pub fn configure<T>(&mut self, transport: &mut T, serial: u32) -> Result<Configured, SurfaceError>
    where
        T: Transport<Window = W>,
    {
        let Some(window) = self.window.as_ref() else {
            return Err(SurfaceError::InvalidState {
                operation: "acknowledge a configure",
                state: self.state,
            });
        };

        transport.ack_configure(window, serial);
        self.last_serial = Some(serial);

        let configured = match self.state {
            SurfaceState::AwaitingConfigure => {
                self.state = SurfaceState::Ready;
                Configured::First
            }

            _ => Configured::Again,
        };

        tracing::debug!(serial, ?configured, "Acknowledged configure");
        Ok(configured)
    }

    /// Record the size suggested by a toplevel configure.
    pub fn suggest_size(&mut self, width: i32, height: i32) {
        let size = u32::try_from(width)
            .ok()
            .and_then(NonZeroU32::new)
            .zip(u32::try_from(height).ok().and_then(NonZeroU32::new));

        if size.is_some() {
            tracing::debug!(width, height, "Compositor suggested a window size");
        }

        self.suggested_size = size;
    }

    /// The size a render target for the window should have.
    ///
    /// Only available once a configure was acknowledged. If the compositor did not suggest a size, the default
    /// is used.
    pub fn render_size(&self, default: (u32, u32)) -> Result<(u32, u32), SurfaceError> {
        self.expect_state("size a render target", SurfaceState::Ready)?;

        Ok(self
            .suggested_size
            .map(|(width, height)| (width.get(), height.get()))
            .unwrap_or(default))
    }

    /// Destroy the window.
    pub fn destroy<T>(&mut self, transport: &mut T)
    where
        T: Transport<Window = W>,
    {
        if let Some(window) = self.window.take() {
            transport.destroy_window(window);
            tracing::debug!("Destroyed window surface");
        }

        self.state = SurfaceState::Uninitialized;
    }

    fn expect_state(&self, operation: &'static str, expected: SurfaceState) -> Result<(), SurfaceError> {
        if self.state != expected {
            return Err(SurfaceError::InvalidState {
                operation,
                state: self.state,
            });
        }

        Ok(())
    }
}
