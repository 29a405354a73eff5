//! Recording collaborators for tests.

use std::{cell::RefCell, rc::Rc};

use remote_session::{Broker, BrokerError, OpId, SessionRequest};

use crate::{
    registry::{Binder, Bound, BoundGlobals},
    render::{RenderError, RenderTarget, Renderer},
    Transport,
};

/// Shared, ordered record of collaborator calls.
#[derive(Debug, Clone, Default)]
pub struct Journal(Rc<RefCell<Vec<String>>>);

impl Journal {
    pub fn record(&self, entry: impl Into<String>) {
        self.0.borrow_mut().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.borrow().clone()
    }

    /// Number of entries starting with the prefix.
    pub fn count(&self, prefix: &str) -> usize {
        self.0.borrow().iter().filter(|entry| entry.starts_with(prefix)).count()
    }

    pub fn clear(&self) {
        self.0.borrow_mut().clear();
    }
}

/// A protocol object identified by its interface and an id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FakeObject {
    pub interface: &'static str,
    pub id: u32,
}

impl FakeObject {
    pub fn new(interface: &'static str, id: u32) -> Self {
        Self { interface, id }
    }
}

/// A transport which records every request.
///
/// Bound globals use the global name as their id.
#[derive(Debug)]
pub struct FakeTransport {
    journal: Journal,
}

impl FakeTransport {
    pub fn new(journal: Journal) -> Self {
        Self { journal }
    }

    fn bind(&self, interface: &'static str, name: u32, version: u32) -> FakeObject {
        self.journal.record(format!("bind {interface} {name} v{version}"));
        FakeObject::new(interface, name)
    }
}

impl Binder for FakeTransport {
    type Compositor = FakeObject;
    type WmBase = FakeObject;
    type Seat = FakeObject;
    type Pointer = FakeObject;
    type Keyboard = FakeObject;
    type Output = FakeObject;

    fn bind_compositor(&mut self, name: u32, version: u32) -> FakeObject {
        self.bind("wl_compositor", name, version)
    }

    fn bind_wm_base(&mut self, name: u32, version: u32) -> FakeObject {
        self.bind("xdg_wm_base", name, version)
    }

    fn bind_seat(&mut self, name: u32, version: u32) -> FakeObject {
        self.bind("wl_seat", name, version)
    }

    fn subscribe_pointer(&mut self, seat: &FakeObject) -> FakeObject {
        self.journal.record(format!("get_pointer {}", seat.id));
        FakeObject::new("wl_pointer", seat.id)
    }

    fn subscribe_keyboard(&mut self, seat: &FakeObject) -> FakeObject {
        self.journal.record(format!("get_keyboard {}", seat.id));
        FakeObject::new("wl_keyboard", seat.id)
    }

    fn bind_output(&mut self, name: u32, version: u32) -> FakeObject {
        self.bind("wl_output", name, version)
    }
}

impl Transport for FakeTransport {
    type Window = FakeObject;

    fn create_window(&mut self, _compositor: &FakeObject, _wm_base: &FakeObject, title: &str) -> FakeObject {
        self.journal.record(format!("create_window {title}"));
        FakeObject::new("xdg_toplevel", 1000)
    }

    fn ack_configure(&mut self, _window: &FakeObject, serial: u32) {
        self.journal.record(format!("ack_configure {serial}"));
    }

    fn pong(&mut self, _wm_base: &FakeObject, serial: u32) {
        self.journal.record(format!("pong {serial}"));
    }

    fn destroy_window(&mut self, _window: FakeObject) {
        self.journal.record("surface.destroy");
    }

    fn release_globals(&mut self, _globals: BoundGlobals<Self>) {
        self.journal.record("globals.release");
    }

    fn release_output(&mut self, output: Bound<FakeObject>) {
        self.journal.record(format!("release_output {}", output.name));
    }

    fn disconnect(&mut self) {
        self.journal.record("disconnect");
    }
}

/// Creates [`FakeTarget`]s, optionally failing.
#[derive(Debug)]
pub struct FakeRenderer {
    journal: Journal,
    pub fail_create: bool,
    pub fail_present: bool,
}

impl FakeRenderer {
    pub fn new(journal: Journal) -> Self {
        Self {
            journal,
            fail_create: false,
            fail_present: false,
        }
    }
}

impl Renderer<FakeObject> for FakeRenderer {
    type Target = FakeTarget;

    fn create(&mut self, _window: &FakeObject, width: u32, height: u32) -> Result<FakeTarget, RenderError> {
        if self.fail_create {
            return Err(RenderError::NoMatchingConfig);
        }

        self.journal.record(format!("target.create {width}x{height}"));

        Ok(FakeTarget {
            journal: self.journal.clone(),
            fail_present: self.fail_present,
        })
    }
}

#[derive(Debug)]
pub struct FakeTarget {
    journal: Journal,
    fail_present: bool,
}

impl RenderTarget for FakeTarget {
    fn present(&mut self) -> Result<(), RenderError> {
        if self.fail_present {
            return Err(RenderError::SwapBuffers(khronos_egl::Error::BadSurface));
        }

        self.journal.record("present");
        Ok(())
    }
}

impl Drop for FakeTarget {
    fn drop(&mut self) {
        self.journal.record("target.destroy");
    }
}

/// A broker whose completions are delivered by the test.
#[derive(Debug)]
pub struct FakeBroker {
    journal: Journal,
    pub requests: Vec<(OpId, SessionRequest)>,
    pub motions: Vec<(f64, f64)>,
}

impl FakeBroker {
    pub fn new(journal: Journal) -> Self {
        Self {
            journal,
            requests: Vec::new(),
            motions: Vec::new(),
        }
    }
}

impl Broker for FakeBroker {
    fn create_session(&mut self, op: OpId, request: &SessionRequest) {
        self.journal.record("session.create");
        self.requests.push((op, *request));
    }

    fn start(&mut self, _op: OpId) {
        self.journal.record("session.start");
    }

    fn cancel(&mut self, _op: OpId) {
        self.journal.record("session.cancel");
    }

    fn pointer_motion(&mut self, dx: f64, dy: f64) -> Result<(), BrokerError> {
        self.journal.record(format!("inject motion {dx} {dy}"));
        self.motions.push((dx, dy));
        Ok(())
    }

    fn pointer_button(&mut self, button: i32, pressed: bool) -> Result<(), BrokerError> {
        self.journal.record(format!("inject button {button} {pressed}"));
        Ok(())
    }

    fn keyboard_keycode(&mut self, keycode: i32, pressed: bool) -> Result<(), BrokerError> {
        self.journal.record(format!("inject key {keycode} {pressed}"));
        Ok(())
    }

    fn close(&mut self) {
        self.journal.record("session.close");
    }
}
