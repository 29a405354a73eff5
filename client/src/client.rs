use std::fmt;

use remote_session::{Broker, Completion, Devices, OpId, SessionError, SessionNegotiator, SessionState, Transition};

use crate::{
    error::Setup,
    input::{Action, InputDispatcher, InputEvent},
    output::{OutputEvent, OutputInfo, OutputTracker},
    registry::{Binder, Bound, BoundGlobals, Global, Interface, ObjectRegistry, Removed},
    render::{RenderState, RenderTarget, Renderer},
    surface::{Configured, SurfaceLifecycle, WindowEvent},
    Config,
};

/// The display server connection as seen by the client.
///
/// Requests are queued and sent when the connection is flushed.
pub trait Transport: Binder {
    /// A surface with its xdg surface and toplevel.
    type Window;

    /// Create a toplevel window with the title and commit its surface.
    fn create_window(&mut self, compositor: &Self::Compositor, wm_base: &Self::WmBase, title: &str) -> Self::Window;

    fn ack_configure(&mut self, window: &Self::Window, serial: u32);

    fn pong(&mut self, wm_base: &Self::WmBase, serial: u32);

    fn destroy_window(&mut self, window: Self::Window);

    /// Release every global and the objects created from them.
    fn release_globals(&mut self, globals: BoundGlobals<Self>)
    where
        Self: Sized;

    /// Release an output whose global was removed.
    fn release_output(&mut self, output: Bound<Self::Output>);

    /// Flush outstanding requests, after which no more requests are sent.
    fn disconnect(&mut self);
}

/// The state of the client.
///
/// Events from the display server, the broker and the render timer are fed into the client, which forwards
/// them to the component owning the concern and performs the requests that follow.
pub struct Client<T, R, B>
where
    T: Transport,
    R: Renderer<T::Window>,
{
    transport: T,
    registry: ObjectRegistry<T>,
    surface: SurfaceLifecycle<T::Window>,
    renderer: R,
    render: RenderState<R::Target>,
    outputs: OutputTracker,
    input: InputDispatcher,
    session: SessionNegotiator<B>,
    config: Config,
    running: bool,
}

impl<T, R, B> fmt::Debug for Client<T, R, B>
where
    T: Transport,
    R: Renderer<T::Window>,
    B: Broker,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("surface", &self.surface.state())
            .field("rendering", &self.render.is_active())
            .field("outputs", &self.outputs.len())
            .field("session", &self.session.state())
            .field("running", &self.running)
            .finish_non_exhaustive()
    }
}

impl<T, R, B> Client<T, R, B>
where
    T: Transport,
    R: Renderer<T::Window>,
    B: Broker,
{
    pub fn new(transport: T, renderer: R, broker: B, config: Config) -> Self {
        Self {
            transport,
            registry: ObjectRegistry::new(),
            surface: SurfaceLifecycle::new(config.title.clone()),
            renderer,
            render: RenderState::Pending,
            outputs: OutputTracker::new(),
            input: InputDispatcher::new(config.bindings.clone()),
            session: SessionNegotiator::new(broker),
            config,
            running: true,
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn registry(&self) -> &ObjectRegistry<T> {
        &self.registry
    }

    pub fn surface(&self) -> &SurfaceLifecycle<T::Window> {
        &self.surface
    }

    pub fn render_state(&self) -> &RenderState<R::Target> {
        &self.render
    }

    pub fn outputs(&self) -> &OutputTracker {
        &self.outputs
    }

    pub fn input(&self) -> &InputDispatcher {
        &self.input
    }

    pub fn session(&self) -> &SessionNegotiator<B> {
        &self.session
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Stop the event loop after the current dispatch.
    pub fn request_quit(&mut self) {
        if self.running {
            tracing::info!("Quit requested");
        }

        self.running = false;
    }

    pub fn handle_global(&mut self, global: &Global) {
        if self.registry.on_global(&mut self.transport, global) == Some(Interface::Output) {
            self.outputs.insert(global.name);
        }
    }

    pub fn handle_global_remove(&mut self, name: u32) {
        if let Some(Removed::Output(output)) = self.registry.on_removed(name) {
            self.outputs.remove(name);
            self.transport.release_output(output);
        }
    }

    /// Check the initial discovery produced every required global.
    pub fn finish_discovery(&self) -> Result<(), Setup> {
        self.registry.finish_discovery()
    }

    /// Create the window and commit its surface.
    pub fn create_window(&mut self) -> Result<(), Setup> {
        let (Some(compositor), Some(wm_base)) = (self.registry.compositor(), self.registry.wm_base()) else {
            return Err(Setup::MissingGlobals(self.registry.missing()));
        };

        self.surface
            .create(&mut self.transport, compositor, wm_base)
            .map_err(|_| Setup::WindowExists)
    }

    /// Request the configured remote desktop session.
    ///
    /// Returns [`None`] if no session is configured.
    pub fn request_session(&mut self) -> Result<Option<OpId>, SessionError> {
        let Some(request) = self.config.session else {
            tracing::info!("Remote desktop session disabled");
            return Ok(None);
        };

        if self.session_targets().is_empty() {
            tracing::warn!("No monitors are known, the session may have nothing to control");
        } else {
            self.log_session_targets();
        }

        self.session.request(request).map(Some)
    }

    /// Monitors the remote session may control: every output whose description is consistent.
    pub fn session_targets(&self) -> Vec<(u32, &OutputInfo)> {
        self.outputs.consistent()
    }

    /// Close the session, if it is started or failed, and request a new one.
    pub fn reconnect(&mut self) -> Result<Option<OpId>, SessionError> {
        if matches!(self.session.state(), SessionState::Started | SessionState::Failed) {
            self.session.close()?;
        }

        self.request_session()
    }

    pub fn handle_window_event(&mut self, event: WindowEvent) {
        match event {
            WindowEvent::Configure { serial } => match self.surface.configure(&mut self.transport, serial) {
                Ok(Configured::First) => self.create_render_target(),
                Ok(Configured::Again) => (),
                Err(err) => {
                    tracing::error!("Configure for a window that does not exist: {err}");
                    self.request_quit();
                }
            },

            WindowEvent::ToplevelConfigure { width, height } => self.surface.suggest_size(width, height),

            WindowEvent::Close => {
                tracing::info!("Compositor asked the window to close");
                self.request_quit();
            }
        }
    }

    /// Answer a liveness check from the window manager.
    pub fn handle_ping(&mut self, serial: u32) {
        if let Some(wm_base) = self.registry.wm_base() {
            self.transport.pong(wm_base, serial);
        }
    }

    pub fn handle_input(&mut self, event: InputEvent) {
        if let Some(action) = self.input.dispatch(&event) {
            self.perform(action);
        }
    }

    pub fn handle_output(&mut self, name: u32, event: OutputEvent) {
        if self.outputs.handle(name, event) {
            tracing::debug!(name, "Output info is consistent");
        }
    }

    /// Advance the session with the result of a broker operation.
    pub fn handle_completion(&mut self, completion: Completion) {
        match self.session.complete(completion) {
            None => (),

            Some(Transition::Created) => {
                if let Err(err) = self.session.start() {
                    tracing::error!("Failed to start remote desktop session: {err}");
                }
            }

            Some(Transition::Started(granted)) => {
                let required = Devices::POINTER | Devices::KEYBOARD;

                if granted.contains(required) {
                    tracing::info!(?granted, "Remote desktop session started");
                } else {
                    tracing::warn!(
                        ?granted,
                        missing = ?required.difference(granted),
                        "Remote desktop session started without pointer and keyboard"
                    );
                }

                self.log_session_targets();
            }

            Some(Transition::Failed(err)) => {
                tracing::warn!("Remote desktop session failed: {err}");
            }
        }
    }

    /// Present a frame if a render target exists.
    pub fn tick(&mut self) {
        let Some(target) = self.render.target_mut() else {
            return;
        };

        if let Err(err) = target.present() {
            tracing::error!(?err, "Failed to present, rendering stops");
            drop(self.render.take());
        }
    }

    /// Release everything the client holds.
    ///
    /// The session is released first, then the render target, the window, and the globals. The connection is
    /// disconnected last.
    pub fn teardown(self) {
        let Client {
            mut transport,
            registry,
            mut surface,
            renderer,
            mut render,
            mut session,
            ..
        } = self;

        session.shutdown();
        drop(render.take());
        surface.destroy(&mut transport);
        drop(renderer);
        transport.release_globals(registry.into_globals());
        transport.disconnect();

        tracing::info!("Client torn down");
    }

    fn perform(&mut self, action: Action) {
        match action {
            Action::Quit => self.request_quit(),

            Action::Inject => {
                let (dx, dy) = self.config.inject_delta;

                match self.session.inject_pointer_motion(dx, dy) {
                    Ok(()) => tracing::debug!(dx, dy, "Injected pointer motion"),
                    Err(err) => tracing::warn!("Cannot inject pointer motion: {err}"),
                }
            }

            Action::Reconnect => {
                if let Err(err) = self.reconnect() {
                    tracing::warn!("Cannot reconnect remote desktop session: {err}");
                }
            }
        }
    }

    fn log_session_targets(&self) {
        for (name, info) in self.session_targets() {
            tracing::info!(
                name,
                make = %info.make,
                model = %info.model,
                mode = ?info.mode.map(|mode| mode.size),
                position = ?info.position,
                "Remote desktop target"
            );
        }
    }

    fn create_render_target(&mut self) {
        let (width, height) = match self.surface.render_size((self.config.width, self.config.height)) {
            Ok(size) => size,
            Err(err) => {
                tracing::error!("{err}");
                return;
            }
        };

        let Some(window) = self.surface.window() else {
            return;
        };

        self.render = match self.renderer.create(window, width, height) {
            Ok(target) => RenderState::Active(target),
            Err(err) => {
                tracing::error!(?err, "Failed to create render target, rendering is disabled");
                RenderState::Failed
            }
        };
    }
}
