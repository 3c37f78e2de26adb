//! Server side of a remote interface.
//!
//! A [`Skeleton`] owns the implementation object, the method table built from
//! the interface, and the accept loop. Calls arrive one per connection; each
//! is served by its own task while the accept loop keeps running.

use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::net::{TcpListener, TcpSocket};
use tokio::sync::{Mutex as AsyncMutex, watch};

use crate::config::Config;
use crate::contract::{InterfaceDescriptor, RemoteInterface, validate};
use crate::dispatch::MethodTable;
use crate::error::{Error, RemoteCallError, Result};
use crate::listener::{self, Acceptor, Exit, ListenerHandle};
use crate::registry::Registry;

/// Lifecycle of a skeleton's accept loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerState {
    Idle,
    Running,
    /// The accept socket is closed; calls already accepted are finishing.
    Stopping,
    Stopped,
}

/// Callbacks for failures that cannot be reported to a caller.
///
/// All methods have defaults; override the ones you need.
pub trait Hooks: Send + Sync + 'static {
    /// Called when accepting a connection fails.
    ///
    /// Return `true` to keep accepting, `false` to shut the skeleton down. In
    /// the latter case the same error is passed to [`Hooks::stopped`].
    fn listen_error(&self, error: &io::Error) -> bool {
        log::warn!("Accept failed: {error}");
        false
    }

    /// Called when a connection fails before its call could be answered.
    fn service_error(&self, error: &RemoteCallError) {
        log::warn!("Service handler failed: {error}");
    }

    /// Called once the accept loop has exited and every in-flight call has
    /// finished. `cause` is `None` after [`Skeleton::stop`].
    fn stopped(&self, cause: Option<&io::Error>) {
        match cause {
            None => log::info!("Skeleton stopped"),
            Some(cause) => log::error!("Skeleton stopped due to: {cause}"),
        }
    }
}

/// The default hooks: log everything, never resume after an accept failure.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultHooks;

impl Hooks for DefaultHooks {}

/// State shared by the accept loop and the service handlers.
pub(crate) struct Shared<I: ?Sized> {
    pub(crate) server: Arc<I>,
    pub(crate) table: Arc<MethodTable<I>>,
    pub(crate) hooks: Arc<dyn Hooks>,
    pub(crate) registry: Arc<Registry>,
    pub(crate) state: Arc<watch::Sender<ListenerState>>,
    pub(crate) max_frame_len: usize,
}

pub struct Skeleton<I: ?Sized + RemoteInterface> {
    server: Arc<I>,
    descriptor: Arc<InterfaceDescriptor>,
    table: Arc<MethodTable<I>>,
    hooks: Arc<dyn Hooks>,
    config: Config,
    registry: Arc<Registry>,
    state: Arc<watch::Sender<ListenerState>>,
    address: Mutex<Option<SocketAddr>>,
    listener: AsyncMutex<Option<ListenerHandle>>,
}

impl<I: ?Sized + RemoteInterface> Skeleton<I> {
    /// Creates a skeleton whose address is chosen by the system at `start`.
    ///
    /// Fails with [`Error::InvalidContract`] if `I` is not a remote interface
    /// or its method table does not match its descriptor.
    pub fn new(server: Arc<I>) -> Result<Self> {
        Self::build(server, None)
    }

    /// Creates a skeleton that will listen on `address`.
    pub fn with_address(server: Arc<I>, address: SocketAddr) -> Result<Self> {
        Self::build(server, Some(address))
    }

    fn build(server: Arc<I>, address: Option<SocketAddr>) -> Result<Self> {
        let descriptor = validate::<I>()?;
        let mut table = MethodTable::new();
        I::bind(&mut table);
        table.check_against(&descriptor)?;

        let (state, _) = watch::channel(ListenerState::Idle);
        Ok(Self {
            server,
            descriptor,
            table: Arc::new(table),
            hooks: Arc::new(DefaultHooks),
            config: Config::default(),
            registry: Registry::new(),
            state: Arc::new(state),
            address: Mutex::new(address),
            listener: AsyncMutex::new(None),
        })
    }

    pub fn with_hooks<H: Hooks>(mut self, hooks: H) -> Self {
        self.hooks = Arc::new(hooks);
        self
    }

    pub fn with_config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    pub fn descriptor(&self) -> &InterfaceDescriptor {
        &self.descriptor
    }

    /// The address the skeleton listens on, once fixed or assigned.
    pub fn address(&self) -> Option<SocketAddr> {
        *self.address.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> ListenerState {
        *self.state.borrow()
    }

    /// Number of connections currently being served.
    pub fn live_calls(&self) -> usize {
        self.registry.len()
    }

    /// Waits until the skeleton is in `target`.
    pub async fn wait_for_state(&self, target: ListenerState) {
        let mut state = self.state.subscribe();
        let _ = state.wait_for(|s| *s == target).await;
    }

    /// Waits until the skeleton reaches [`ListenerState::Stopped`].
    pub async fn wait_stopped(&self) {
        self.wait_for_state(ListenerState::Stopped).await;
    }

    /// Starts accepting calls and returns the bound address.
    ///
    /// The accept loop runs on its own task; this returns as soon as the
    /// socket is listening. Fails with [`Error::AlreadyRunning`] if the
    /// skeleton is running, leaving the running loop untouched.
    pub async fn start(&self) -> Result<SocketAddr> {
        let mut running = self.listener.lock().await;
        if running.as_ref().is_some_and(ListenerHandle::is_alive) {
            return Err(Error::AlreadyRunning);
        }

        let requested = self
            .address()
            .unwrap_or_else(|| SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)));
        let socket = bind(requested, self.config.backlog)?;
        let local = socket.local_addr()?;
        *self.address.lock().unwrap_or_else(PoisonError::into_inner) = Some(local);
        *running = Some(self.launch(socket));

        log::info!("{} listening on {local}", I::NAME);
        Ok(local)
    }

    fn launch<A: Acceptor>(&self, acceptor: A) -> ListenerHandle {
        let shared = Arc::new(Shared {
            server: Arc::clone(&self.server),
            table: Arc::clone(&self.table),
            hooks: Arc::clone(&self.hooks),
            registry: Arc::clone(&self.registry),
            state: Arc::clone(&self.state),
            max_frame_len: self.config.max_frame_len,
        });
        self.state.send_replace(ListenerState::Running);
        listener::spawn(acceptor, shared)
    }

    /// Stops the skeleton if it is running.
    ///
    /// No connection is accepted once this begins. Calls already accepted run
    /// to completion; this returns after they have, and after
    /// [`Hooks::stopped`] has been called with `None`.
    pub async fn stop(&self) {
        // Held until the stop completes so a concurrent start waits for it.
        let mut running = self.listener.lock().await;
        let Some(handle) = running.take() else {
            return;
        };
        if !handle.is_alive() {
            return;
        }

        if handle.terminate().await == Exit::Failed {
            // The loop escalated on its own while we were signalling it. It has
            // already reached Stopped and reported through `stopped`.
            return;
        }
        // The accept socket is closed by now.
        self.state.send_replace(ListenerState::Stopping);
        self.registry.drained().await;
        self.state.send_replace(ListenerState::Stopped);
        self.hooks.stopped(None);
        log::info!("{} stopped", I::NAME);
    }
}

fn bind(addr: SocketAddr, backlog: u32) -> io::Result<TcpListener> {
    let socket = match addr {
        SocketAddr::V4(_) => TcpSocket::new_v4()?,
        SocketAddr::V6(_) => TcpSocket::new_v6()?,
    };
    socket.set_reuseaddr(true)?;
    socket.bind(addr)?;
    socket.listen(backlog)
}
