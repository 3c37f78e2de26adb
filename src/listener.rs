//! Accept loop of a running skeleton.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::rpc::Stream;
use crate::service;
use crate::skeleton::{ListenerState, Shared};

/// Source of incoming connections.
#[async_trait]
pub(crate) trait Acceptor: Send + 'static {
    type Stream: Stream;

    async fn accept(&mut self) -> io::Result<(Self::Stream, SocketAddr)>;
}

#[async_trait]
impl Acceptor for TcpListener {
    type Stream = TcpStream;

    async fn accept(&mut self) -> io::Result<(TcpStream, SocketAddr)> {
        TcpListener::accept(self).await
    }
}

/// How the accept loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Exit {
    /// Shutdown was signalled, or the skeleton was dropped.
    Requested,
    /// Accepting failed and the hooks declined to resume. The loop has
    /// already drained its handlers and reported through `stopped`.
    Failed,
}

pub(crate) struct ListenerHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<Exit>,
}

impl ListenerHandle {
    pub(crate) fn is_alive(&self) -> bool {
        !self.task.is_finished()
    }

    /// Signals the loop to exit and waits until it has.
    pub(crate) async fn terminate(self) -> Exit {
        let _ = self.shutdown.send(true);
        match self.task.await {
            Ok(exit) => exit,
            Err(e) => {
                log::error!("Accept loop ended abnormally: {e}");
                Exit::Requested
            }
        }
    }
}

pub(crate) fn spawn<A, I>(acceptor: A, shared: Arc<Shared<I>>) -> ListenerHandle
where
    A: Acceptor,
    I: ?Sized + Send + Sync + 'static,
{
    let (shutdown, shutdown_rx) = watch::channel(false);
    let task = tokio::spawn(run(acceptor, shared, shutdown_rx));
    ListenerHandle { shutdown, task }
}

async fn run<A, I>(mut acceptor: A, shared: Arc<Shared<I>>, mut shutdown: watch::Receiver<bool>) -> Exit
where
    A: Acceptor,
    I: ?Sized + Send + Sync + 'static,
{
    loop {
        // A dropped sender also ends the loop.
        let accepted = tokio::select! {
            biased;
            _ = shutdown.changed() => return Exit::Requested,
            accepted = acceptor.accept() => accepted,
        };

        match accepted {
            Ok((stream, peer)) => {
                log::debug!("Accepted connection from {peer}");
                service::spawn(stream, peer, Arc::clone(&shared));
            }
            Err(e) => {
                if *shutdown.borrow() {
                    return Exit::Requested;
                }
                if shared.hooks.listen_error(&e) {
                    continue;
                }
                log::error!("Accept loop giving up: {e}");
                // Close the socket first so no connection completes while draining.
                drop(acceptor);
                shared.state.send_replace(ListenerState::Stopping);
                shared.registry.drained().await;
                shared.state.send_replace(ListenerState::Stopped);
                shared.hooks.stopped(Some(&e));
                return Exit::Failed;
            }
        }
    }
}
