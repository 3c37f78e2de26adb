//! Remote method invocation over TCP.
//!
//! A contract is a trait declared with [`remote_interface!`]. The server
//! wraps an implementation in a [`Skeleton`] and starts it; clients call it
//! through a [`Stub`], which implements the same trait.

mod macros;

pub mod address;
pub mod client;
pub mod config;
pub mod contract;
pub mod dispatch;
pub mod error;
mod listener;
pub mod logger;
mod registry;
pub mod rpc;
mod service;
pub mod skeleton;

pub use address::Endpoint;
pub use client::Stub;
pub use config::Config;
pub use contract::{
    InterfaceDescriptor, MethodSignature, RemoteInterface, TypeDescriptor, is_remote_interface,
};
pub use dispatch::MethodTable;
pub use error::{Error, RemoteCallError, Result};
pub use skeleton::{DefaultHooks, Hooks, ListenerState, Skeleton};

#[doc(hidden)]
pub mod __private {
    pub use async_trait::async_trait;
}
