use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;

use crate::contract::{InterfaceDescriptor, TypeDescriptor, join};
use crate::error::{Error, RemoteCallError, Result};
use crate::rpc::{Reply, argument_value};

pub(crate) type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;

/// Type-erased method: decodes the argument list, calls the implementation
/// and encodes the outcome.
pub(crate) type Handler<I> = Box<dyn Fn(Arc<I>, Vec<Value>) -> BoxFuture<Reply> + Send + Sync>;

/// Server-side method table of a remote interface.
///
/// Keyed by method name, then by parameter type signature, so resolving a
/// call is two hash lookups and no allocation. Built once per skeleton.
pub struct MethodTable<I: ?Sized> {
    methods: HashMap<String, HashMap<Vec<TypeDescriptor>, Handler<I>>>,
}

impl<I> MethodTable<I>
where
    I: ?Sized + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            methods: HashMap::new(),
        }
    }

    /// Registers `handler` for `name(params...)`.
    ///
    /// `A` is the parameter tuple, e.g. `(String,)`, or `()` for none.
    pub fn insert<A, R, E, F, Fut>(&mut self, name: &str, params: &[&str], handler: F) -> &mut Self
    where
        A: DeserializeOwned + Send + 'static,
        R: Serialize + 'static,
        E: Serialize + 'static,
        F: Fn(Arc<I>, A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<R, E>> + Send + 'static,
    {
        let method = name.to_string();
        let erased = move |server: Arc<I>, args: Vec<Value>| -> BoxFuture<Reply> {
            let args = match serde_json::from_value::<A>(argument_value(args)) {
                Ok(args) => args,
                Err(e) => {
                    let err = RemoteCallError::Codec(format!("bad arguments for {method}: {e}"));
                    return Box::pin(async move { Reply::remote(err) });
                }
            };
            let call = handler(server, args);
            Box::pin(async move { Reply::from_outcome(call.await) })
        };

        let signature = params.iter().map(|p| TypeDescriptor::new(*p)).collect();
        self.methods
            .entry(name.to_string())
            .or_default()
            .insert(signature, Box::new(erased));
        self
    }

    pub(crate) fn resolve(&self, name: &str, signature: &[TypeDescriptor]) -> Option<&Handler<I>> {
        self.methods.get(name)?.get(signature)
    }

    pub fn len(&self) -> usize {
        self.methods.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Checks that the table binds exactly the methods `descriptor` declares.
    pub(crate) fn check_against(&self, descriptor: &InterfaceDescriptor) -> Result<()> {
        let invalid = |reason: String| Error::InvalidContract {
            interface: descriptor.name.clone(),
            reason,
        };
        for method in &descriptor.methods {
            if self.resolve(&method.name, &method.params).is_none() {
                return Err(invalid(format!("{method} has no handler")));
            }
        }
        for (name, overloads) in &self.methods {
            for signature in overloads.keys() {
                let declared = descriptor
                    .methods
                    .iter()
                    .any(|m| &m.name == name && &m.params == signature);
                if !declared {
                    return Err(invalid(format!(
                        "handler {name}({}) is not declared",
                        join(signature)
                    )));
                }
            }
        }
        Ok(())
    }
}

impl<I> Default for MethodTable<I>
where
    I: ?Sized + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::MethodSignature;
    use crate::rpc::Fault;
    use serde_json::json;

    struct Counter {
        step: u32,
    }

    fn table() -> MethodTable<Counter> {
        let mut table = MethodTable::new();
        table
            .insert("add", &["u32"], |c: Arc<Counter>, (n,): (u32,)| async move {
                Ok::<_, String>(n + c.step)
            })
            .insert("fail", &[], |_c: Arc<Counter>, (): ()| async move {
                Err::<(), _>("refused".to_string())
            });
        table
    }

    async fn call(table: &MethodTable<Counter>, name: &str, sig: &[&str], args: Vec<Value>) -> Reply {
        let sig: Vec<TypeDescriptor> = sig.iter().map(|s| TypeDescriptor::new(*s)).collect();
        let handler = table.resolve(name, &sig).expect("method resolves");
        handler(Arc::new(Counter { step: 2 }), args).await
    }

    #[tokio::test]
    async fn dispatches_by_name_and_signature() {
        let table = table();
        assert_eq!(table.len(), 2);
        assert_eq!(call(&table, "add", &["u32"], vec![json!(40)]).await, Reply::Success(json!(42)));
        assert!(table.resolve("add", &[TypeDescriptor::new("i64")]).is_none());
        assert!(table.resolve("sub", &[TypeDescriptor::new("u32")]).is_none());
    }

    #[tokio::test]
    async fn application_error_is_kept_verbatim() {
        assert_eq!(
            call(&table(), "fail", &[], Vec::new()).await,
            Reply::Failure(Fault::Application(json!("refused")))
        );
    }

    #[tokio::test]
    async fn mismatched_arguments_are_a_codec_fault() {
        let reply = call(&table(), "add", &["u32"], vec![json!("forty")]).await;
        assert!(matches!(
            reply,
            Reply::Failure(Fault::Remote(RemoteCallError::Codec(_)))
        ));
    }

    #[test]
    fn table_must_match_descriptor() {
        let add = MethodSignature::new("add").param("u32").raises("RemoteCallError");
        let fail = MethodSignature::new("fail").raises("RemoteCallError");

        let full = InterfaceDescriptor::new("Counter").method(add.clone()).method(fail);
        assert!(table().check_against(&full).is_ok());

        let missing = InterfaceDescriptor::new("Counter").method(add);
        assert!(matches!(
            table().check_against(&missing),
            Err(Error::InvalidContract { .. })
        ));

        let extra = full.method(MethodSignature::new("reset").raises("RemoteCallError"));
        assert!(table().check_against(&extra).is_err());
    }
}
