//! Remote desktop session negotiation.
//!
//! Injecting synthetic input into a compositor is a privileged operation which is mediated by a broker (the
//! xdg-desktop-portal `RemoteDesktop` interface). Getting a session which may inject events is a multi step
//! asynchronous handshake:
//!
//! 1. A session is requested with the [`Devices`] the client wants to control.
//! 2. The broker answers with a session handle (or an error).
//! 3. The session handle is started, which may involve asking the user for consent.
//! 4. The broker answers with the devices that were actually granted.
//!
//! [`SessionNegotiator`] tracks this handshake as a state machine. It does not perform any IO itself, instead
//! every broker operation goes through the [`Broker`] trait and the result of an asynchronous operation is fed
//! back into the negotiator as a [`Completion`]. The [`PortalBroker`] is the real implementation and delivers
//! completions through a [`CompletionSource`] which may be inserted into a calloop event loop.

mod negotiator;
mod portal;
mod source;

use std::{fmt, num::NonZeroU64};

pub use negotiator::*;
pub use portal::PortalBroker;
pub use source::*;

bitflags::bitflags! {
    /// Input devices a remote desktop session may inject events for.
    ///
    /// The values match the device types used by the portal.
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Devices: u32 {
        const KEYBOARD = 0x1;
        const POINTER = 0x2;
        const TOUCHSCREEN = 0x4;
    }
}

/// The kind of output the session should be associated with.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputSelection {
    /// A whole monitor.
    #[default]
    Monitor,

    /// A single window.
    Window,

    /// A virtual output created for the session.
    Virtual,
}

/// How the cursor is represented to the session.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CursorMode {
    /// The cursor is not part of the session.
    #[default]
    Hidden,

    /// The cursor is embedded in the output.
    Embedded,

    /// The cursor is sent as metadata.
    Metadata,
}

/// Parameters of a session request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionRequest {
    pub devices: Devices,
    pub outputs: OutputSelection,
    pub cursor_mode: CursorMode,
}

impl Default for SessionRequest {
    fn default() -> Self {
        Self {
            devices: Devices::KEYBOARD | Devices::POINTER,
            outputs: OutputSelection::Monitor,
            cursor_mode: CursorMode::Hidden,
        }
    }
}

/// Opaque token identifying one asynchronous broker operation.
///
/// A completion is only applied if the operation it answers is the one the negotiator is waiting for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OpId(NonZeroU64);

impl OpId {
    pub fn get(self) -> u64 {
        self.0.get()
    }
}

impl fmt::Display for OpId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The result of an asynchronous broker operation.
#[derive(Debug)]
pub struct Completion {
    pub op: OpId,
    pub result: Result<Outcome, BrokerError>,
}

/// A successful broker operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The broker created a session handle.
    Created,

    /// The session was started and the specified devices were granted.
    Started(Devices),
}

/// Errors reported by a [`Broker`].
#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    /// The operation was cancelled before it completed.
    #[error("the operation was cancelled")]
    Cancelled,

    /// The user or the broker's policy denied the request.
    #[error("the request was denied")]
    Denied,

    /// The operation needs a session handle but none exists.
    #[error("no session exists")]
    NoSession,

    /// The broker answered an operation with the outcome of a different step.
    #[error("the broker answered out of order")]
    OutOfOrder,

    /// The executor driving broker operations no longer exists.
    #[error("the broker executor is gone")]
    ExecutorGone,

    /// The portal failed.
    #[error(transparent)]
    Portal(#[from] ashpd::Error),
}

/// The remote session broker.
///
/// `create_session` and `start` are asynchronous: the implementation must eventually deliver exactly one
/// [`Completion`] carrying the same [`OpId`], unless the operation is cancelled. The remaining operations act
/// on the session the broker already holds.
pub trait Broker {
    /// Begin creating a session.
    fn create_session(&mut self, op: OpId, request: &SessionRequest);

    /// Begin starting the created session.
    fn start(&mut self, op: OpId);

    /// Cancel an in flight operation.
    ///
    /// No completion needs to be delivered for a cancelled operation.
    fn cancel(&mut self, op: OpId);

    fn pointer_motion(&mut self, dx: f64, dy: f64) -> Result<(), BrokerError>;

    fn pointer_button(&mut self, button: i32, pressed: bool) -> Result<(), BrokerError>;

    fn keyboard_keycode(&mut self, keycode: i32, pressed: bool) -> Result<(), BrokerError>;

    /// Close and release the session handle, if any.
    fn close(&mut self);
}

#[cfg(test)]
mod tests {
    use static_assertions::assert_impl_all;

    use crate::{Completion, Devices, OpId, SessionRequest};

    // Completions cross the calloop channel.
    assert_impl_all!(Completion: Send);
    assert_impl_all!(OpId: Send, Sync);

    #[test]
    fn default_request_matches_remote_input() {
        let request = SessionRequest::default();
        assert_eq!(request.devices, Devices::KEYBOARD | Devices::POINTER);
    }
}
