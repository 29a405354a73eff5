//! [`Broker`] implementation backed by the xdg-desktop-portal `RemoteDesktop` interface.

use std::{cell::RefCell, fmt, future::Future, rc::Rc};

use ashpd::{
    desktop::{
        remote_desktop::{DeviceType, KeyState, RemoteDesktop},
        screencast::{CursorMode as PortalCursorMode, PersistMode, Screencast, SourceType},
        ResponseError, Session,
    },
    enumflags2::BitFlags,
    WindowIdentifier,
};
use calloop::futures::Scheduler;
use futures::future::{self, AbortHandle};

use crate::{
    Broker, BrokerError, Completion, CompletionSender, CursorMode, Devices, OpId, Outcome, OutputSelection,
    SessionRequest,
};

struct PortalSession {
    remote: RemoteDesktop<'static>,
    session: Session<'static>,
}

/// A broker which talks to the desktop portal.
///
/// Portal calls run as tasks on a calloop executor, so the [`Scheduler`] must belong to an executor that is
/// inserted into the same event loop as the [`CompletionSource`](crate::CompletionSource) receiving the
/// completions.
pub struct PortalBroker {
    scheduler: Scheduler<()>,
    sender: CompletionSender,
    session: Rc<RefCell<Option<Rc<PortalSession>>>>,
    in_flight: Option<(OpId, AbortHandle)>,
}

impl fmt::Debug for PortalBroker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PortalBroker")
            .field("has_session", &self.session.borrow().is_some())
            .field("in_flight", &self.in_flight.as_ref().map(|(op, _)| op))
            .finish_non_exhaustive()
    }
}

impl PortalBroker {
    pub fn new(scheduler: Scheduler<()>, sender: CompletionSender) -> Self {
        Self {
            scheduler,
            sender,
            session: Rc::new(RefCell::new(None)),
            in_flight: None,
        }
    }

    fn spawn(&mut self, op: OpId, task: impl Future<Output = ashpd::Result<Outcome>> + 'static) {
        let sender = self.sender.clone();
        let (task, handle) = future::abortable(task);

        let scheduled = self.scheduler.schedule(async move {
            // An aborted task was cancelled and nobody is waiting for the answer.
            if let Ok(result) = task.await {
                let _ = sender.send(Completion {
                    op,
                    result: result.map_err(portal_error),
                });
            }
        });

        if scheduled.is_err() {
            tracing::error!(%op, "Cannot schedule portal request");
            self.deliver(op, Err(BrokerError::ExecutorGone));
            return;
        }

        self.in_flight = Some((op, handle));
    }

    fn deliver(&self, op: OpId, result: Result<Outcome, BrokerError>) {
        if self.sender.send(Completion { op, result }).is_err() {
            tracing::warn!(%op, "Completion channel closed, dropping broker answer");
        }
    }

    fn current(&self) -> Result<Rc<PortalSession>, BrokerError> {
        self.session.borrow().clone().ok_or(BrokerError::NoSession)
    }

    fn notify(
        &self,
        what: &'static str,
        task: impl Future<Output = ashpd::Result<()>> + 'static,
    ) -> Result<(), BrokerError> {
        self.scheduler
            .schedule(async move {
                if let Err(err) = task.await {
                    tracing::warn!("Failed to inject {what}: {err}");
                }
            })
            .map_err(|_| BrokerError::ExecutorGone)
    }
}

impl Broker for PortalBroker {
    fn create_session(&mut self, op: OpId, request: &SessionRequest) {
        let request = *request;
        let slot = self.session.clone();

        self.spawn(op, async move {
            let portal = create(request).await?;
            *slot.borrow_mut() = Some(Rc::new(portal));
            Ok(Outcome::Created)
        });
    }

    fn start(&mut self, op: OpId) {
        let portal = match self.current() {
            Ok(portal) => portal,
            Err(err) => return self.deliver(op, Err(err)),
        };

        self.spawn(op, async move {
            // The client has no exported toplevel handle, so no parent window is given.
            let response = portal
                .remote
                .start(&portal.session, &WindowIdentifier::default())
                .await?
                .response()?;

            Ok(Outcome::Started(granted(response.devices())))
        });
    }

    fn cancel(&mut self, op: OpId) {
        match self.in_flight.take() {
            Some((in_flight, handle)) if in_flight == op => handle.abort(),
            other => self.in_flight = other,
        }
    }

    fn pointer_motion(&mut self, dx: f64, dy: f64) -> Result<(), BrokerError> {
        let portal = self.current()?;
        self.notify("pointer motion", async move {
            portal.remote.notify_pointer_motion(&portal.session, dx, dy).await
        })
    }

    fn pointer_button(&mut self, button: i32, pressed: bool) -> Result<(), BrokerError> {
        let portal = self.current()?;
        self.notify("pointer button", async move {
            portal
                .remote
                .notify_pointer_button(&portal.session, button, key_state(pressed))
                .await
        })
    }

    fn keyboard_keycode(&mut self, keycode: i32, pressed: bool) -> Result<(), BrokerError> {
        let portal = self.current()?;
        self.notify("keyboard keycode", async move {
            portal
                .remote
                .notify_keyboard_keycode(&portal.session, keycode, key_state(pressed))
                .await
        })
    }

    fn close(&mut self) {
        if let Some((_, handle)) = self.in_flight.take() {
            handle.abort();
        }

        let Some(portal) = self.session.borrow_mut().take() else {
            return;
        };

        // Closing is a single method call, the reply is read by the connection's own executor.
        if let Err(err) = futures::executor::block_on(portal.session.close()) {
            tracing::warn!("Failed to close portal session: {err}");
        }
    }
}

async fn create(request: SessionRequest) -> ashpd::Result<PortalSession> {
    let remote = RemoteDesktop::new().await?;
    let session = remote.create_session().await?;

    remote
        .select_devices(&session, device_types(request.devices))
        .await?
        .response()?;

    let screencast = Screencast::new().await?;
    screencast
        .select_sources(
            &session,
            cursor_mode(request.cursor_mode),
            source_types(request.outputs),
            false,
            None,
            PersistMode::DoNot,
        )
        .await?
        .response()?;

    Ok(PortalSession { remote, session })
}

fn portal_error(err: ashpd::Error) -> BrokerError {
    match err {
        ashpd::Error::Response(ResponseError::Cancelled) => BrokerError::Denied,
        err => BrokerError::Portal(err),
    }
}

fn device_types(devices: Devices) -> BitFlags<DeviceType> {
    let mut types = BitFlags::empty();

    if devices.contains(Devices::KEYBOARD) {
        types |= DeviceType::Keyboard;
    }

    if devices.contains(Devices::POINTER) {
        types |= DeviceType::Pointer;
    }

    if devices.contains(Devices::TOUCHSCREEN) {
        types |= DeviceType::Touchscreen;
    }

    types
}

fn granted(types: BitFlags<DeviceType>) -> Devices {
    let mut devices = Devices::empty();

    if types.contains(DeviceType::Keyboard) {
        devices |= Devices::KEYBOARD;
    }

    if types.contains(DeviceType::Pointer) {
        devices |= Devices::POINTER;
    }

    if types.contains(DeviceType::Touchscreen) {
        devices |= Devices::TOUCHSCREEN;
    }

    devices
}

fn source_types(outputs: OutputSelection) -> BitFlags<SourceType> {
    match outputs {
        OutputSelection::Monitor => SourceType::Monitor.into(),
        OutputSelection::Window => SourceType::Window.into(),
        OutputSelection::Virtual => SourceType::Virtual.into(),
    }
}

fn cursor_mode(mode: CursorMode) -> PortalCursorMode {
    match mode {
        CursorMode::Hidden => PortalCursorMode::Hidden,
        CursorMode::Embedded => PortalCursorMode::Embedded,
        CursorMode::Metadata => PortalCursorMode::Metadata,
    }
}

fn key_state(pressed: bool) -> KeyState {
    if pressed {
        KeyState::Pressed
    } else {
        KeyState::Released
    }
}

#[cfg(test)]
mod tests {
    use ashpd::{
        desktop::{
            remote_desktop::DeviceType,
            screencast::{CursorMode as PortalCursorMode, SourceType},
        },
        enumflags2::BitFlags,
    };

    use crate::{CursorMode, Devices, OutputSelection, SessionRequest};

    use super::{cursor_mode, device_types, granted, source_types};

    #[test]
    fn device_flags_map_both_ways() {
        for devices in [
            Devices::empty(),
            Devices::POINTER,
            Devices::KEYBOARD | Devices::POINTER,
            Devices::all(),
        ] {
            assert_eq!(granted(device_types(devices)), devices);
        }

        assert!(device_types(Devices::POINTER).contains(DeviceType::Pointer));
        assert!(!device_types(Devices::POINTER).contains(DeviceType::Keyboard));
    }

    #[test]
    fn default_request_selects_monitor_without_cursor() {
        let request = SessionRequest::default();

        assert_eq!(source_types(request.outputs), BitFlags::from(SourceType::Monitor));
        assert_eq!(cursor_mode(request.cursor_mode), PortalCursorMode::Hidden);
        assert_eq!(source_types(OutputSelection::Window), BitFlags::from(SourceType::Window));
        assert_eq!(cursor_mode(CursorMode::Metadata), PortalCursorMode::Metadata);
    }
}
