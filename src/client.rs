//! Client side of a remote interface.
//!
//! A [`Stub<dyn Trait>`](Stub) stands in for the remote object. The
//! [`remote_interface!`](crate::remote_interface) macro implements the trait
//! for it; every method call opens a fresh connection, sends one request and
//! reads one reply.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::net::SocketAddr;
use std::sync::Arc;

use serde::de::{self, DeserializeOwned};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

use crate::address::Endpoint;
use crate::config::Config;
use crate::contract::{InterfaceDescriptor, RemoteInterface, validate};
use crate::error::{Error, RemoteCallError, Result};
use crate::rpc::{self, CallRequest, Fault, Reply};
use crate::skeleton::Skeleton;

pub struct Stub<I: ?Sized + RemoteInterface> {
    endpoint: Endpoint,
    contract: Arc<InterfaceDescriptor>,
    config: Config,
    _marker: PhantomData<fn() -> Arc<I>>,
}

impl<I: ?Sized + RemoteInterface> Stub<I> {
    /// Creates a stub for the skeleton listening at `endpoint`.
    ///
    /// Nothing is contacted here; an unreachable endpoint surfaces as a
    /// [`RemoteCallError`] on the first call.
    pub fn new(endpoint: impl Into<Endpoint>) -> Result<Self> {
        Ok(Self {
            endpoint: endpoint.into(),
            contract: validate::<I>()?,
            config: Config::default(),
            _marker: PhantomData,
        })
    }

    /// Creates a stub for a skeleton in this process.
    ///
    /// A skeleton bound to the wildcard address is reached over loopback.
    /// Fails with [`Error::Unbound`] if the skeleton has no port yet.
    pub fn for_skeleton(skeleton: &Skeleton<I>) -> Result<Self> {
        let address = bound_address(skeleton)?;
        Self::new(Endpoint::local(address))
    }

    /// Creates a stub that reaches `skeleton`'s port through `host`.
    ///
    /// Useful when the skeleton's own address is not routable from where the
    /// stub will be used.
    pub fn for_skeleton_with_host(skeleton: &Skeleton<I>, host: &str) -> Result<Self> {
        if host.is_empty() {
            return Err(Error::InvalidArgument("host must not be empty".into()));
        }
        let address = bound_address(skeleton)?;
        Self::new(Endpoint::new(host, address.port()))
    }

    pub fn with_config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Performs one remote call.
    ///
    /// `args` is the parameter tuple. Failures of the call itself come back
    /// as `E::from(RemoteCallError)`; an error returned by the remote method
    /// is decoded as `E`.
    pub async fn invoke<A, R, E>(&self, method: &str, args: A) -> std::result::Result<R, E>
    where
        A: Serialize + Send,
        R: DeserializeOwned + Send,
        E: DeserializeOwned + From<RemoteCallError> + Send,
    {
        let signature = self.contract.find(method).ok_or_else(|| {
            RemoteCallError::Protocol(format!("{} has no method {method}", I::NAME))
        })?;
        let request = CallRequest {
            method: method.to_string(),
            signature: signature.params.clone(),
            args: rpc::arguments(&args)?,
        };

        log::debug!("Calling {method} on {}", self.endpoint);
        match self.round_trip(&request).await? {
            Reply::Success(value) => Ok(decode(value)?),
            Reply::Failure(Fault::Remote(err)) => Err(err.into()),
            Reply::Failure(Fault::Application(value)) => Err(reconstruct(value)),
        }
    }

    async fn round_trip(&self, request: &CallRequest) -> std::result::Result<Reply, RemoteCallError> {
        let mut stream = self.connect().await?;
        rpc::write_header(&mut stream).await?;
        rpc::write_request(&mut stream, request).await?;
        rpc::read_header(&mut stream).await?;
        let reply = rpc::read_reply(&mut stream, self.config.max_frame_len).await?;
        let _ = stream.shutdown().await;
        Ok(reply)
    }

    async fn connect(&self) -> std::result::Result<TcpStream, RemoteCallError> {
        let target = (self.endpoint.host(), self.endpoint.port());
        let connected = match self.config.connect_timeout() {
            Some(limit) => match tokio::time::timeout(limit, TcpStream::connect(target)).await {
                Ok(connected) => connected,
                Err(_) => {
                    return Err(RemoteCallError::Connect {
                        endpoint: self.endpoint.to_string(),
                        reason: format!("timed out after {limit:?}"),
                    });
                }
            },
            None => TcpStream::connect(target).await,
        };
        connected.map_err(|e| RemoteCallError::Connect {
            endpoint: self.endpoint.to_string(),
            reason: e.to_string(),
        })
    }
}

/// The skeleton's address once a port is known. A fixed address with port 0
/// only gets its real port at `start`.
fn bound_address<I: ?Sized + RemoteInterface>(skeleton: &Skeleton<I>) -> Result<SocketAddr> {
    skeleton
        .address()
        .filter(|address| address.port() != 0)
        .ok_or(Error::Unbound)
}

fn decode<R: DeserializeOwned>(value: Value) -> std::result::Result<R, RemoteCallError> {
    serde_json::from_value(value)
        .map_err(|e| RemoteCallError::Codec(format!("cannot decode return value: {e}")))
}

/// Rebuilds the remote method's error, or wraps it when `E` cannot hold it.
fn reconstruct<E>(value: Value) -> E
where
    E: DeserializeOwned + From<RemoteCallError>,
{
    match serde_json::from_value::<E>(value.clone()) {
        Ok(err) => err,
        Err(e) => {
            log::warn!("Cannot reconstruct remote failure {value}: {e}");
            E::from(RemoteCallError::UnrecognizedFault(value.to_string()))
        }
    }
}

impl<I: ?Sized + RemoteInterface> Clone for Stub<I> {
    fn clone(&self) -> Self {
        Self {
            endpoint: self.endpoint.clone(),
            contract: Arc::clone(&self.contract),
            config: self.config.clone(),
            _marker: PhantomData,
        }
    }
}

/// Two stubs are equal when they call the same contract at the same endpoint.
impl<I: ?Sized + RemoteInterface> PartialEq for Stub<I> {
    fn eq(&self, other: &Self) -> bool {
        self.endpoint == other.endpoint
    }
}

impl<I: ?Sized + RemoteInterface> Eq for Stub<I> {}

impl<I: ?Sized + RemoteInterface> Hash for Stub<I> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        I::NAME.hash(state);
        self.endpoint.hash(state);
    }
}

impl<I: ?Sized + RemoteInterface> fmt::Debug for Stub<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stub")
            .field("interface", &I::NAME)
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

impl<I: ?Sized + RemoteInterface> fmt::Display for Stub<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} @ {}", I::NAME, self.endpoint)
    }
}

/// What travels when a stub is passed to or returned from a remote method.
#[derive(Serialize, Deserialize)]
struct StubRef {
    interface: String,
    address: Endpoint,
}

impl<I: ?Sized + RemoteInterface> Serialize for Stub<I> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        StubRef {
            interface: I::NAME.to_string(),
            address: self.endpoint.clone(),
        }
        .serialize(serializer)
    }
}

impl<'de, I: ?Sized + RemoteInterface> Deserialize<'de> for Stub<I> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let stub = StubRef::deserialize(deserializer)?;
        if stub.interface != I::NAME {
            return Err(de::Error::custom(format!(
                "stub for {} cannot be used as {}",
                stub.interface,
                I::NAME
            )));
        }
        Stub::new(stub.address).map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    use crate::contract::MethodSignature;
    use crate::dispatch::MethodTable;

    trait Clock: Send + Sync {}

    impl RemoteInterface for dyn Clock {
        const NAME: &'static str = "test::Clock";

        fn descriptor() -> InterfaceDescriptor {
            InterfaceDescriptor::new(Self::NAME)
                .method(MethodSignature::new("now").returns("u64").throws::<RemoteCallError>())
        }

        fn bind(_table: &mut MethodTable<Self>) {}
    }

    trait Calendar: Send + Sync {}

    impl RemoteInterface for dyn Calendar {
        const NAME: &'static str = "test::Calendar";

        fn descriptor() -> InterfaceDescriptor {
            InterfaceDescriptor::new(Self::NAME)
        }

        fn bind(_table: &mut MethodTable<Self>) {}
    }

    #[test]
    fn identity_is_contract_and_endpoint() {
        let a = Stub::<dyn Clock>::new(Endpoint::new("127.0.0.1", 7000)).unwrap();
        let b = Stub::<dyn Clock>::new(Endpoint::new("127.0.0.1", 7000)).unwrap();
        let c = Stub::<dyn Clock>::new(Endpoint::new("127.0.0.1", 7001)).unwrap();

        assert_eq!(a, b);
        assert_ne!(a, c);
        let set: HashSet<_> = [a.clone(), b, c].into_iter().collect();
        assert_eq!(set.len(), 2);
        assert_eq!(a.to_string(), "test::Clock @ 127.0.0.1:7000");
    }

    #[test]
    fn serialized_stub_keeps_its_contract() {
        let stub = Stub::<dyn Clock>::new(Endpoint::new("10.0.0.5", 9000)).unwrap();
        let json = serde_json::to_value(&stub).unwrap();
        assert_eq!(json["interface"], "test::Clock");

        let back: Stub<dyn Clock> = serde_json::from_value(json.clone()).unwrap();
        assert_eq!(back, stub);

        let err = serde_json::from_value::<Stub<dyn Calendar>>(json).unwrap_err();
        assert!(err.to_string().contains("cannot be used as test::Calendar"));
    }

    #[tokio::test]
    async fn unknown_method_never_connects() {
        let stub = Stub::<dyn Clock>::new(Endpoint::new("127.0.0.1", 1)).unwrap();
        let err = stub
            .invoke::<_, u64, RemoteCallError>("tomorrow", ())
            .await
            .unwrap_err();
        assert!(matches!(err, RemoteCallError::Protocol(_)));
    }

    #[test]
    fn reconstruct_falls_back_to_unrecognized_fault() {
        let err: RemoteCallError = reconstruct(serde_json::json!({"NotAVariant": 1}));
        assert!(matches!(err, RemoteCallError::UnrecognizedFault(_)));

        let err: RemoteCallError =
            reconstruct(serde_json::to_value(RemoteCallError::Transport("reset".into())).unwrap());
        assert_eq!(err, RemoteCallError::Transport("reset".into()));
    }
}
