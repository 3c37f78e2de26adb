//! Serving one accepted connection: one call, one reply.

use std::any::Any;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::AsyncWriteExt;

use crate::contract::join;
use crate::error::RemoteCallError;
use crate::rpc::{self, CallRequest, Reply, Stream};
use crate::skeleton::Shared;

/// Registers a handler for `stream` and serves it on its own task.
///
/// Registration happens before this returns, so a stop that begins after
/// the connection was accepted waits for the call.
pub(crate) fn spawn<S, I>(stream: S, peer: SocketAddr, shared: Arc<Shared<I>>)
where
    S: Stream,
    I: ?Sized + Send + Sync + 'static,
{
    let guard = shared.registry.register(peer);
    log::debug!("Handler {:?} serving {peer}", guard.id());
    tokio::spawn(async move {
        let _guard = guard;
        if let Err(e) = serve(stream, &shared).await {
            log::debug!("Call from {peer} failed: {e}");
            shared.hooks.service_error(&e);
        }
    });
}

async fn serve<S, I>(mut stream: S, shared: &Shared<I>) -> Result<(), RemoteCallError>
where
    S: Stream,
    I: ?Sized + Send + Sync + 'static,
{
    rpc::write_header(&mut stream).await?;
    rpc::read_header(&mut stream).await?;

    let request = rpc::read_request(&mut stream, shared.max_frame_len).await?;
    log::debug!(
        "Dispatching {}({})",
        request.method,
        join(&request.signature)
    );
    let reply = dispatch(shared, request).await;

    rpc::write_reply(&mut stream, &reply).await?;
    // The reply is flushed; the stub may already have closed its side.
    let _ = stream.shutdown().await;
    Ok(())
}

async fn dispatch<I>(shared: &Shared<I>, request: CallRequest) -> Reply
where
    I: ?Sized + Send + Sync + 'static,
{
    let Some(handler) = shared.table.resolve(&request.method, &request.signature) else {
        return Reply::remote(RemoteCallError::NoSuchMethod {
            signature: join(&request.signature),
            method: request.method,
        });
    };

    let call = handler(Arc::clone(&shared.server), request.args);
    // Spawned so a panicking implementation fails only this call.
    match tokio::spawn(call).await {
        Ok(reply) => reply,
        Err(e) if e.is_panic() => {
            let message = panic_message(e.into_panic());
            log::error!("Remote method {} panicked: {message}", request.method);
            Reply::remote(RemoteCallError::Panicked(message))
        }
        Err(e) => Reply::remote(RemoteCallError::Transport(e.to_string())),
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
