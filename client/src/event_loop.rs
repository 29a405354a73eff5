//! The event loop driving the client.
//!
//! Three sources are polled on one thread:
//!
//! - the Wayland connection, dispatched whenever it becomes readable,
//! - a timer firing the render tick,
//! - broker completions, which arrive through the executor running portal requests.
//!
//! The loop stops after the client stops running, and then tears the client down.

use std::{
    io,
    time::{Duration, Instant},
};

use calloop::{
    generic::Generic,
    timer::{TimeoutAction, Timer},
    EventLoop, Interest, Mode, PostAction,
};
use remote_session::{completion_channel, PortalBroker};
use wayland_client::{backend::WaylandError, globals, Connection, EventQueue};

use crate::{
    error::Setup,
    registry::Global,
    render::EglRenderer,
    wayland::{App, Wayland},
    Config,
};

/// Paces the render tick.
///
/// Deadlines are a fixed interval apart. If the loop overran a deadline, the next tick fires immediately and
/// later deadlines are counted from then, so missed ticks are never caught up.
#[derive(Debug, Clone, Copy)]
pub struct FrameClock {
    interval: Duration,
    overruns: u64,
}

impl FrameClock {
    pub fn new(interval: Duration) -> Self {
        Self { interval, overruns: 0 }
    }

    /// How many deadlines were missed so far.
    pub fn overruns(&self) -> u64 {
        self.overruns
    }

    /// The deadline following a tick scheduled for `deadline` which finished at `now`.
    pub fn next_deadline(&mut self, deadline: Instant, now: Instant) -> Instant {
        let next = deadline + self.interval;

        if next > now {
            return next;
        }

        self.overruns += 1;
        tracing::trace!(late = ?(now - next), "Render tick overran");
        now
    }
}

struct LoopData {
    app: App,
    queue: EventQueue<App>,
}

impl LoopData {
    /// Read whatever the connection has and dispatch it.
    fn dispatch_connection(&mut self) -> Result<(), Setup> {
        if let Some(guard) = self.queue.prepare_read() {
            match guard.read() {
                Ok(_) => (),
                Err(WaylandError::Io(err)) if err.kind() == io::ErrorKind::WouldBlock => (),
                Err(err) => return Err(err.into()),
            }
        }

        self.dispatch_pending()
    }

    fn dispatch_pending(&mut self) -> Result<(), Setup> {
        self.queue.dispatch_pending(&mut self.app)?;
        Ok(())
    }

    fn flush(&self) {
        match self.queue.flush() {
            Ok(()) => (),
            Err(WaylandError::Io(err)) if err.kind() == io::ErrorKind::WouldBlock => (),
            Err(err) => tracing::warn!("Failed to flush requests: {err}"),
        }
    }

    fn fail(&mut self, err: Setup) {
        tracing::error!("Lost the display server connection: {err}");
        self.app.request_quit();
    }
}

/// Connect to the display server and run the client until it quits.
pub fn run(config: Config) -> Result<(), Setup> {
    let conn = Connection::connect_to_env()?;
    let (globals, mut queue) = globals::registry_queue_init::<App>(&conn)?;

    // SAFETY: The transport keeps the connection alive until after the renderer and its target are dropped
    // during teardown.
    let renderer = unsafe { EglRenderer::new(conn.backend().display_ptr().cast()) };

    let mut event_loop = EventLoop::<LoopData>::try_new()?;
    let handle = event_loop.handle();

    let (executor, scheduler) = calloop::futures::executor::<()>()?;
    handle
        .insert_source(executor, |(), _, _| {})
        .map_err(|err| err.error)?;

    let (sender, completions) = completion_channel();
    handle
        .insert_source(completions, |completion, _, data| {
            data.app.handle_completion(completion);
        })
        .map_err(|err| err.error)?;

    let frame_interval = config.frame_interval;
    let transport = Wayland::new(conn.clone(), globals.registry().clone(), queue.handle());
    let broker = PortalBroker::new(scheduler, sender);
    let mut app = App::new(transport, renderer, broker, config);

    // Globals announced later are dispatched like any other event.
    for global in globals.contents().clone_list() {
        app.handle_global(&Global::new(global.name, global.interface, global.version));
    }

    app.finish_discovery()?;

    // Receive the initial state of the seat and outputs.
    queue.roundtrip(&mut app)?;

    app.create_window()?;

    if let Err(err) = app.request_session() {
        tracing::error!("Failed to request a remote desktop session: {err}");
    }

    queue.flush()?;

    let fd = conn.backend().poll_fd().try_clone_to_owned()?;
    handle
        .insert_source(Generic::new(fd, Interest::READ, Mode::Level), |_, _, data| {
            if let Err(err) = data.dispatch_connection() {
                data.fail(err);
                return Ok(PostAction::Remove);
            }

            Ok(PostAction::Continue)
        })
        .map_err(|err| err.error)?;

    let mut clock = FrameClock::new(frame_interval);
    handle
        .insert_source(Timer::immediate(), move |deadline, _, data| {
            // Events may have been read while dispatching another source.
            if let Err(err) = data.dispatch_pending() {
                data.fail(err);
                return TimeoutAction::Drop;
            }

            data.app.tick();
            TimeoutAction::ToInstant(clock.next_deadline(deadline, Instant::now()))
        })
        .map_err(|err| err.error)?;

    let signal = event_loop.get_signal();
    let mut data = LoopData { app, queue };

    tracing::info!(interval = ?frame_interval, "Running");

    event_loop.run(None, &mut data, |data| {
        data.flush();

        if !data.app.is_running() {
            signal.stop();
        }
    })?;

    let LoopData { app, queue } = data;
    app.teardown();
    drop(queue);

    Ok(())
}
