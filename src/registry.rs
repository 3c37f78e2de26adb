use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::watch;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(pub u128);

/// Live service handlers of one skeleton.
///
/// Handlers register when their connection is accepted and deregister by
/// dropping the returned guard. `drained` completes once none are left.
#[derive(Debug)]
pub(crate) struct Registry {
    live: watch::Sender<HashMap<HandlerId, SocketAddr>>,
}

impl Registry {
    pub(crate) fn new() -> Arc<Self> {
        let (live, _) = watch::channel(HashMap::new());
        Arc::new(Self { live })
    }

    pub(crate) fn register(self: &Arc<Self>, peer: SocketAddr) -> HandlerGuard {
        let id = HandlerId(Uuid::new_v4().as_u128());
        self.live.send_modify(|live| {
            live.insert(id, peer);
        });
        HandlerGuard {
            id,
            registry: Arc::clone(self),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.live.borrow().len()
    }

    pub(crate) async fn drained(&self) {
        let mut live = self.live.subscribe();
        // The sender lives in `self`, so this only returns once the map is empty.
        let _ = live.wait_for(HashMap::is_empty).await;
    }
}

/// Keeps a handler registered until dropped.
#[derive(Debug)]
pub(crate) struct HandlerGuard {
    id: HandlerId,
    registry: Arc<Registry>,
}

impl HandlerGuard {
    pub(crate) fn id(&self) -> HandlerId {
        self.id
    }
}

impl Drop for HandlerGuard {
    fn drop(&mut self) {
        let id = self.id;
        self.registry.live.send_modify(|live| {
            live.remove(&id);
        });
    }
}
