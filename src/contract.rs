//! Remote interface descriptors and the contract validator.
//!
//! A remote interface is a trait object type (`dyn Trait`) implementing
//! [`RemoteInterface`]. The descriptor lists its methods with their parameter
//! type signatures and declared failures; skeletons and stubs validate it
//! before doing anything else.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::dispatch::MethodTable;
use crate::error::{Error, RemoteCallError, Result};

/// Descriptor of the failure every remote method must declare.
pub const REMOTE_CALL_ERROR: &str = "RemoteCallError";

/// Textual name of a parameter, return or failure type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TypeDescriptor(String);

impl TypeDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Descriptor derived from the compiler's name for `T`.
    pub fn of<T: ?Sized>() -> Self {
        Self(std::any::type_name::<T>().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn is_remote_call_error(&self) -> bool {
        self.0 == REMOTE_CALL_ERROR || self.0.ends_with("::RemoteCallError")
    }
}

impl fmt::Display for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TypeDescriptor {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// One method of a remote interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodSignature {
    pub name: String,
    pub params: Vec<TypeDescriptor>,
    pub returns: TypeDescriptor,
    pub throws: Vec<TypeDescriptor>,
}

impl MethodSignature {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: Vec::new(),
            returns: TypeDescriptor::new("()"),
            throws: Vec::new(),
        }
    }

    pub fn param(mut self, ty: impl Into<TypeDescriptor>) -> Self {
        self.params.push(ty.into());
        self
    }

    pub fn returns(mut self, ty: impl Into<TypeDescriptor>) -> Self {
        self.returns = ty.into();
        self
    }

    /// Declares `E` as the method's failure type.
    ///
    /// `E` must be able to carry a [`RemoteCallError`], so the declared
    /// failure set always includes it.
    pub fn throws<E: From<RemoteCallError>>(mut self) -> Self {
        self.throws.push(TypeDescriptor::of::<E>());
        self.throws.push(TypeDescriptor::new(REMOTE_CALL_ERROR));
        self
    }

    /// Declares a failure by descriptor only.
    pub fn raises(mut self, ty: impl Into<TypeDescriptor>) -> Self {
        self.throws.push(ty.into());
        self
    }

    /// Parameter types joined for display, e.g. `String, u32`.
    pub fn signature_string(&self) -> String {
        join(&self.params)
    }
}

impl fmt::Display for MethodSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({}) -> {}", self.name, join(&self.params), self.returns)
    }
}

pub(crate) fn join(types: &[TypeDescriptor]) -> String {
    types
        .iter()
        .map(TypeDescriptor::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

/// The full description of a remote interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceDescriptor {
    pub name: String,
    pub methods: Vec<MethodSignature>,
}

impl InterfaceDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            methods: Vec::new(),
        }
    }

    pub fn method(mut self, method: MethodSignature) -> Self {
        self.methods.push(method);
        self
    }

    pub fn find(&self, name: &str) -> Option<&MethodSignature> {
        self.methods.iter().find(|m| m.name == name)
    }
}

/// A trait object type usable as a remote contract.
///
/// Normally implemented by [`remote_interface!`](crate::remote_interface) for
/// `dyn Trait`. `descriptor` and `bind` must describe the same methods; the
/// skeleton checks this when it is constructed.
pub trait RemoteInterface: Send + Sync + 'static {
    /// Name that identifies the contract in stub identity and serialization.
    const NAME: &'static str;

    fn descriptor() -> InterfaceDescriptor;

    /// Registers a handler for every method on the server side.
    fn bind(table: &mut MethodTable<Self>);
}

/// Returns true if every method of `descriptor` declares [`RemoteCallError`].
pub fn is_remote_interface(descriptor: &InterfaceDescriptor) -> bool {
    check(descriptor).is_ok()
}

fn check(descriptor: &InterfaceDescriptor) -> std::result::Result<(), String> {
    let mut seen = HashSet::new();
    for method in &descriptor.methods {
        if method.name.is_empty() {
            return Err("method with an empty name".into());
        }
        if !seen.insert(method.name.as_str()) {
            return Err(format!("method {} is declared twice", method.name));
        }
        if !method.throws.iter().any(TypeDescriptor::is_remote_call_error) {
            return Err(format!(
                "method {} does not declare {REMOTE_CALL_ERROR}",
                method.name
            ));
        }
    }
    Ok(())
}

/// Validates `I` and returns its shared descriptor.
pub(crate) fn validate<I: RemoteInterface + ?Sized>() -> Result<Arc<InterfaceDescriptor>> {
    let descriptor = I::descriptor();
    check(&descriptor).map_err(|reason| Error::InvalidContract {
        interface: I::NAME.to_string(),
        reason,
    })?;
    Ok(Arc::new(descriptor))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    #[allow(dead_code)]
    enum PingError {
        Remote(RemoteCallError),
    }

    impl From<RemoteCallError> for PingError {
        fn from(err: RemoteCallError) -> Self {
            PingError::Remote(err)
        }
    }

    fn ping() -> MethodSignature {
        MethodSignature::new("ping")
            .param("u32")
            .returns("String")
            .throws::<PingError>()
    }

    #[test]
    fn typed_failure_declares_remote_call_error() {
        let method = ping();
        assert!(method.throws.iter().any(|t| t.as_str() == REMOTE_CALL_ERROR));
        assert!(method.throws[0].as_str().ends_with("PingError"));
        assert_eq!(method.to_string(), "ping(u32) -> String");
    }

    #[test]
    fn accepts_remote_interface() {
        let descriptor = InterfaceDescriptor::new("PingServer").method(ping());
        assert!(is_remote_interface(&descriptor));

        let qualified = InterfaceDescriptor::new("Bare").method(
            MethodSignature::new("shutdown").raises("tcp_rmi::error::RemoteCallError"),
        );
        assert!(is_remote_interface(&qualified));
    }

    #[test]
    fn rejects_method_without_remote_call_error() {
        let descriptor = InterfaceDescriptor::new("PingServer")
            .method(ping())
            .method(MethodSignature::new("reset").raises("std::io::Error"));
        assert!(!is_remote_interface(&descriptor));
        assert_eq!(
            check(&descriptor).unwrap_err(),
            "method reset does not declare RemoteCallError"
        );
    }

    #[test]
    fn rejects_duplicate_method_names() {
        let descriptor = InterfaceDescriptor::new("PingServer")
            .method(ping())
            .method(ping());
        assert!(!is_remote_interface(&descriptor));
    }

    #[test]
    fn empty_interface_is_remote() {
        assert!(is_remote_interface(&InterfaceDescriptor::new("Marker")));
    }
}
