use std::{fmt, num::NonZeroU64};

use crate::{Broker, BrokerError, Completion, Devices, OpId, Outcome, SessionRequest};

/// State of the remote session.
///
/// ```text
/// Idle -> Requesting -> Created -> Starting -> Started -> Closed
///              \            \          \          \
///               `------------`----------`----------`--> Failed -> Closed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// No session has been requested.
    Idle,

    /// A session was requested and the broker has not answered yet.
    Requesting,

    /// The broker created a session handle which has not been started.
    Created,

    /// The session handle is being started.
    Starting,

    /// The session was started and input may be injected.
    Started,

    /// The negotiation failed or was cancelled.
    Failed,

    /// The session was closed.
    Closed,
}

impl SessionState {
    /// Whether an asynchronous broker operation is outstanding in this state.
    pub fn in_flight(self) -> bool {
        matches!(self, SessionState::Requesting | SessionState::Starting)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::Requesting => "requesting",
            SessionState::Created => "created",
            SessionState::Starting => "starting",
            SessionState::Started => "started",
            SessionState::Failed => "failed",
            SessionState::Closed => "closed",
        };

        f.write_str(name)
    }
}

/// Errors returned when the negotiator is misused or the broker refuses an injection.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The operation is not valid in the current state.
    #[error("cannot {operation} while the session is {state}")]
    InvalidState {
        operation: &'static str,
        state: SessionState,
    },

    /// A session was already requested and has not been closed.
    #[error("a session was already requested and is {0}")]
    AlreadyRequested(SessionState),

    /// The started session was not granted the device the operation needs.
    #[error("the session was not granted {0:?}")]
    MissingCapability(Devices),

    #[error(transparent)]
    Broker(#[from] BrokerError),
}

/// A state change caused by a [`Completion`].
#[derive(Debug)]
pub enum Transition {
    /// The session handle was created and may be started.
    Created,

    /// The session was started with the granted devices.
    Started(Devices),

    /// The negotiation failed.
    Failed(BrokerError),
}

/// Drives the handshake with a [`Broker`].
#[derive(Debug)]
pub struct SessionNegotiator<B> {
    broker: B,
    state: SessionState,
    granted: Devices,
    pending: Option<OpId>,
    next_op: NonZeroU64,
}

impl<B: Broker> SessionNegotiator<B> {
    pub fn new(broker: B) -> Self {
        Self {
            broker,
            state: SessionState::Idle,
            granted: Devices::empty(),
            pending: None,
            next_op: NonZeroU64::MIN,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Devices granted by the broker.
    ///
    /// This is empty unless the session is [`SessionState::Started`].
    pub fn granted(&self) -> Devices {
        self.granted
    }

    /// The operation the negotiator is waiting on.
    pub fn pending(&self) -> Option<OpId> {
        self.pending
    }

    pub fn broker(&self) -> &B {
        &self.broker
    }

    /// Request a new session.
    ///
    /// Only one session may exist at a time: a request is rejected until the previous session is closed.
    pub fn request(&mut self, request: SessionRequest) -> Result<OpId, SessionError> {
        match self.state {
            SessionState::Idle | SessionState::Closed => {}
            state => return Err(SessionError::AlreadyRequested(state)),
        }

        let op = self.next_op();
        self.state = SessionState::Requesting;
        self.granted = Devices::empty();
        self.pending = Some(op);

        tracing::info!(%op, devices = ?request.devices, outputs = ?request.outputs, cursor_mode = ?request.cursor_mode, "Requesting remote desktop session");
        self.broker.create_session(op, &request);

        Ok(op)
    }

    /// Start the created session.
    pub fn start(&mut self) -> Result<OpId, SessionError> {
        self.expect_state("start", SessionState::Created)?;

        let op = self.next_op();
        self.state = SessionState::Starting;
        self.pending = Some(op);

        tracing::info!(%op, "Starting remote desktop session");
        self.broker.start(op);

        Ok(op)
    }

    /// Apply the result of an asynchronous broker operation.
    ///
    /// Completions for operations that are not outstanding (for example after a cancellation) are ignored.
    pub fn complete(&mut self, completion: Completion) -> Option<Transition> {
        let Completion { op, result } = completion;

        if self.pending != Some(op) {
            tracing::debug!(%op, state = %self.state, "Ignoring stale broker completion");
            return None;
        }

        self.pending = None;

        let transition = match (self.state, result) {
            (SessionState::Requesting, Ok(Outcome::Created)) => {
                self.state = SessionState::Created;
                Transition::Created
            }

            (SessionState::Starting, Ok(Outcome::Started(devices))) => {
                self.state = SessionState::Started;
                self.granted = devices;
                Transition::Started(devices)
            }

            (_, Err(err)) => {
                self.state = SessionState::Failed;
                Transition::Failed(err)
            }

            (state, Ok(outcome)) => {
                tracing::error!(%op, %state, ?outcome, "Broker answered with an outcome for a different step");
                self.state = SessionState::Failed;
                Transition::Failed(BrokerError::OutOfOrder)
            }
        };

        tracing::info!(%op, state = %self.state, "Remote desktop session changed state");
        Some(transition)
    }

    /// Cancel the negotiation.
    ///
    /// Valid while the session is requested, created or starting. The session becomes [`SessionState::Failed`].
    pub fn cancel(&mut self) -> Result<(), SessionError> {
        match self.state {
            SessionState::Requesting | SessionState::Created | SessionState::Starting => {}
            state => {
                return Err(SessionError::InvalidState {
                    operation: "cancel",
                    state,
                })
            }
        }

        if let Some(op) = self.pending.take() {
            tracing::info!(%op, "Cancelling broker operation");
            self.broker.cancel(op);
        }

        self.state = SessionState::Failed;
        Ok(())
    }

    /// Close the session.
    ///
    /// Valid from [`SessionState::Started`] and [`SessionState::Failed`]. Closing a closed session does nothing.
    pub fn close(&mut self) -> Result<(), SessionError> {
        match self.state {
            SessionState::Closed => return Ok(()),
            SessionState::Started | SessionState::Failed => {}
            state => {
                return Err(SessionError::InvalidState {
                    operation: "close",
                    state,
                })
            }
        }

        tracing::info!("Closing remote desktop session");
        self.broker.close();
        self.state = SessionState::Closed;
        self.granted = Devices::empty();

        Ok(())
    }

    /// Release the session regardless of its state.
    ///
    /// Any in flight operation is cancelled before the session is closed.
    pub fn shutdown(&mut self) {
        match self.state {
            SessionState::Idle | SessionState::Closed => return,
            SessionState::Requesting | SessionState::Created | SessionState::Starting => {
                // Always valid in these states.
                let _ = self.cancel();
            }
            SessionState::Started | SessionState::Failed => {}
        }

        let _ = self.close();
    }

    /// Inject relative pointer motion.
    ///
    /// If the broker refuses the injection, the session is considered lost and becomes [`SessionState::Failed`].
    pub fn inject_pointer_motion(&mut self, dx: f64, dy: f64) -> Result<(), SessionError> {
        self.require("inject pointer motion", Devices::POINTER)?;
        let result = self.broker.pointer_motion(dx, dy);
        self.injected(result)
    }

    pub fn inject_pointer_button(&mut self, button: i32, pressed: bool) -> Result<(), SessionError> {
        self.require("inject pointer button", Devices::POINTER)?;
        let result = self.broker.pointer_button(button, pressed);
        self.injected(result)
    }

    pub fn inject_keyboard_keycode(&mut self, keycode: i32, pressed: bool) -> Result<(), SessionError> {
        self.require("inject keyboard keycode", Devices::KEYBOARD)?;
        let result = self.broker.keyboard_keycode(keycode, pressed);
        self.injected(result)
    }

    fn injected(&mut self, result: Result<(), BrokerError>) -> Result<(), SessionError> {
        let Err(err) = result else {
            return Ok(());
        };

        tracing::error!("Remote desktop session lost: {err}");
        self.state = SessionState::Failed;
        self.granted = Devices::empty();

        Err(err.into())
    }

    fn require(&self, operation: &'static str, device: Devices) -> Result<(), SessionError> {
        self.expect_state(operation, SessionState::Started)?;

        if !self.granted.contains(device) {
            return Err(SessionError::MissingCapability(device));
        }

        Ok(())
    }

    fn expect_state(&self, operation: &'static str, expected: SessionState) -> Result<(), SessionError> {
        if self.state != expected {
            return Err(SessionError::InvalidState {
                operation,
                state: self.state,
            });
        }

        Ok(())
    }

    fn next_op(&mut self) -> OpId {
        let op = OpId(self.next_op);
        // Overflowing would take billions of years of requests.
        self.next_op = self.next_op.checked_add(1).unwrap_or(NonZeroU64::MIN);
        op
    }
}

#[cfg(test)]
mod tests {
    use crate::{Broker, BrokerError, Completion, Devices, OpId, Outcome, SessionRequest};

    use super::{SessionError, SessionNegotiator, SessionState, Transition};

    #[derive(Debug, Default)]
    struct Recorder {
        calls: Vec<String>,
        /// Injections fail as if the broker dropped the session.
        lost: bool,
    }

    impl Recorder {
        fn inject(&mut self, call: String) -> Result<(), BrokerError> {
            if self.lost {
                return Err(BrokerError::NoSession);
            }

            self.calls.push(call);
            Ok(())
        }
    }

    impl Broker for Recorder {
        fn create_session(&mut self, op: OpId, _request: &SessionRequest) {
            self.calls.push(format!("create {}", op.get()));
        }

        fn start(&mut self, op: OpId) {
            self.calls.push(format!("start {}", op.get()));
        }

        fn cancel(&mut self, op: OpId) {
            self.calls.push(format!("cancel {}", op.get()));
        }

        fn pointer_motion(&mut self, dx: f64, dy: f64) -> Result<(), BrokerError> {
            self.inject(format!("motion {dx} {dy}"))
        }

        fn pointer_button(&mut self, button: i32, pressed: bool) -> Result<(), BrokerError> {
            self.inject(format!("button {button} {pressed}"))
        }

        fn keyboard_keycode(&mut self, keycode: i32, pressed: bool) -> Result<(), BrokerError> {
            self.inject(format!("key {keycode} {pressed}"))
        }

        fn close(&mut self) {
            self.calls.push("close".into());
        }
    }

    fn started(devices: Devices) -> SessionNegotiator<Recorder> {
        let mut negotiator = SessionNegotiator::new(Recorder::default());
        let op = negotiator.request(SessionRequest::default()).unwrap();
        negotiator.complete(Completion {
            op,
            result: Ok(Outcome::Created),
        });
        let op = negotiator.start().unwrap();
        negotiator.complete(Completion {
            op,
            result: Ok(Outcome::Started(devices)),
        });
        assert_eq!(negotiator.state(), SessionState::Started);
        negotiator
    }

    #[test]
    fn full_handshake() {
        let negotiator = started(Devices::POINTER | Devices::KEYBOARD);
        assert_eq!(negotiator.granted(), Devices::POINTER | Devices::KEYBOARD);
        assert_eq!(negotiator.broker().calls, ["create 1", "start 2"]);
        assert_eq!(negotiator.pending(), None);
    }

    #[test]
    fn start_requires_created() {
        let mut negotiator = SessionNegotiator::new(Recorder::default());
        assert!(matches!(
            negotiator.start(),
            Err(SessionError::InvalidState {
                state: SessionState::Idle,
                ..
            })
        ));

        negotiator.request(SessionRequest::default()).unwrap();
        assert!(matches!(
            negotiator.start(),
            Err(SessionError::InvalidState {
                state: SessionState::Requesting,
                ..
            })
        ));
        assert_eq!(negotiator.broker().calls, ["create 1"]);
    }

    #[test]
    fn request_twice_is_rejected() {
        let mut negotiator = SessionNegotiator::new(Recorder::default());
        negotiator.request(SessionRequest::default()).unwrap();

        assert!(matches!(
            negotiator.request(SessionRequest::default()),
            Err(SessionError::AlreadyRequested(SessionState::Requesting))
        ));
        // The duplicate is not queued.
        assert_eq!(negotiator.broker().calls.len(), 1);

        let mut negotiator = started(Devices::all());
        assert!(matches!(
            negotiator.request(SessionRequest::default()),
            Err(SessionError::AlreadyRequested(SessionState::Started))
        ));

        negotiator.close().unwrap();
        negotiator.request(SessionRequest::default()).unwrap();
        assert_eq!(negotiator.state(), SessionState::Requesting);
    }

    #[test]
    fn injection_requires_started() {
        let mut negotiator = SessionNegotiator::new(Recorder::default());
        assert!(matches!(
            negotiator.inject_pointer_motion(10.0, 10.0),
            Err(SessionError::InvalidState { .. })
        ));

        negotiator.request(SessionRequest::default()).unwrap();
        assert!(negotiator.inject_pointer_motion(10.0, 10.0).is_err());
        assert!(negotiator.inject_keyboard_keycode(30, true).is_err());
        assert_eq!(negotiator.broker().calls, ["create 1"]);
    }

    #[test]
    fn injection_requires_capability() {
        let mut negotiator = started(Devices::KEYBOARD);

        assert!(matches!(
            negotiator.inject_pointer_motion(10.0, 10.0),
            Err(SessionError::MissingCapability(devices)) if devices == Devices::POINTER
        ));
        assert!(negotiator.inject_pointer_button(272, true).is_err());

        negotiator.inject_keyboard_keycode(30, true).unwrap();
        assert_eq!(negotiator.broker().calls.last().unwrap(), "key 30 true");
    }

    #[test]
    fn injection_when_started() {
        let mut negotiator = started(Devices::POINTER | Devices::KEYBOARD);
        negotiator.inject_pointer_motion(10.0, 10.0).unwrap();
        negotiator.inject_pointer_button(272, false).unwrap();

        assert_eq!(negotiator.broker().calls[2..], ["motion 10 10", "button 272 false"]);
    }

    #[test]
    fn lost_session_fails_from_started() {
        let mut negotiator = started(Devices::POINTER | Devices::KEYBOARD);
        negotiator.broker.lost = true;

        assert!(matches!(
            negotiator.inject_pointer_motion(10.0, 10.0),
            Err(SessionError::Broker(BrokerError::NoSession))
        ));
        assert_eq!(negotiator.state(), SessionState::Failed);
        assert_eq!(negotiator.granted(), Devices::empty());

        // No further injections reach the broker.
        negotiator.broker.lost = false;
        assert!(matches!(
            negotiator.inject_keyboard_keycode(30, true),
            Err(SessionError::InvalidState {
                state: SessionState::Failed,
                ..
            })
        ));

        negotiator.close().unwrap();
        negotiator.request(SessionRequest::default()).unwrap();
        assert_eq!(negotiator.state(), SessionState::Requesting);
    }

    #[test]
    fn broker_failure() {
        let mut negotiator = SessionNegotiator::new(Recorder::default());
        let op = negotiator.request(SessionRequest::default()).unwrap();

        let transition = negotiator.complete(Completion {
            op,
            result: Err(BrokerError::Denied),
        });
        assert!(matches!(transition, Some(Transition::Failed(BrokerError::Denied))));
        assert_eq!(negotiator.state(), SessionState::Failed);

        // Retrying needs the failed session to be closed first.
        assert!(negotiator.request(SessionRequest::default()).is_err());
        negotiator.close().unwrap();
        assert_eq!(negotiator.state(), SessionState::Closed);
        negotiator.request(SessionRequest::default()).unwrap();
    }

    #[test]
    fn close_is_idempotent() {
        let mut negotiator = started(Devices::all());
        negotiator.close().unwrap();
        negotiator.close().unwrap();

        assert_eq!(negotiator.state(), SessionState::Closed);
        assert_eq!(negotiator.granted(), Devices::empty());
        assert_eq!(negotiator.broker().calls.iter().filter(|c| *c == "close").count(), 1);
    }

    #[test]
    fn close_requires_started_or_failed() {
        let mut negotiator = SessionNegotiator::new(Recorder::default());
        assert!(negotiator.close().is_err());

        negotiator.request(SessionRequest::default()).unwrap();
        assert!(negotiator.close().is_err());
    }

    #[test]
    fn cancel_while_requesting() {
        let mut negotiator = SessionNegotiator::new(Recorder::default());
        let op = negotiator.request(SessionRequest::default()).unwrap();

        negotiator.cancel().unwrap();
        assert_eq!(negotiator.state(), SessionState::Failed);
        assert_eq!(negotiator.broker().calls, ["create 1", "cancel 1"]);

        // A late answer does not resurrect the session.
        let transition = negotiator.complete(Completion {
            op,
            result: Ok(Outcome::Created),
        });
        assert!(transition.is_none());
        assert_eq!(negotiator.state(), SessionState::Failed);
    }

    #[test]
    fn cancel_while_starting() {
        let mut negotiator = SessionNegotiator::new(Recorder::default());
        let op = negotiator.request(SessionRequest::default()).unwrap();
        negotiator.complete(Completion {
            op,
            result: Ok(Outcome::Created),
        });
        negotiator.start().unwrap();

        negotiator.cancel().unwrap();
        assert_eq!(negotiator.state(), SessionState::Failed);
        assert!(negotiator.cancel().is_err());
    }

    #[test]
    fn shutdown_cancels_before_close() {
        let mut negotiator = SessionNegotiator::new(Recorder::default());
        negotiator.request(SessionRequest::default()).unwrap();

        negotiator.shutdown();
        assert_eq!(negotiator.state(), SessionState::Closed);
        assert_eq!(negotiator.broker().calls, ["create 1", "cancel 1", "close"]);

        // Nothing to release.
        let mut idle = SessionNegotiator::new(Recorder::default());
        idle.shutdown();
        assert_eq!(idle.state(), SessionState::Idle);
        assert!(idle.broker().calls.is_empty());
    }

    #[test]
    fn mismatched_outcome_fails() {
        let mut negotiator = SessionNegotiator::new(Recorder::default());
        let op = negotiator.request(SessionRequest::default()).unwrap();

        let transition = negotiator.complete(Completion {
            op,
            result: Ok(Outcome::Started(Devices::all())),
        });
        assert!(matches!(transition, Some(Transition::Failed(BrokerError::OutOfOrder))));
        assert_eq!(negotiator.granted(), Devices::empty());
    }
}
