/// Declares a remote interface.
///
/// Expands to the trait itself (made `Send + Sync + 'static` and async via
/// `async_trait`), a [`RemoteInterface`](crate::RemoteInterface) impl for
/// `dyn Trait` that describes and dispatches every method, and an impl of the
/// trait for [`Stub<dyn Trait>`](crate::Stub) that forwards each call over
/// the network.
///
/// Every method takes `&self` and returns `Result<T, E>` where `T` is
/// `Serialize + DeserializeOwned` and `E` is `Serialize + DeserializeOwned +
/// From<RemoteCallError>`. Arguments must be `Serialize + DeserializeOwned +
/// Send`.
///
/// ```ignore
/// tcp_rmi::remote_interface! {
///     pub trait Echo {
///         async fn greet(&self, name: String) -> Result<String, EchoError>;
///     }
/// }
///
/// let skeleton = Skeleton::<dyn Echo>::new(Arc::new(EchoServer))?;
/// skeleton.start().await?;
/// let echo = Stub::<dyn Echo>::for_skeleton(&skeleton)?;
/// assert_eq!(echo.greet("World".into()).await?, "Hello, World");
/// ```
#[macro_export]
macro_rules! remote_interface {
    (
        $(#[$meta:meta])*
        $vis:vis trait $name:ident {
            $(
                $(#[$mmeta:meta])*
                async fn $method:ident(&self $(, $arg:ident : $arg_ty:ty)* $(,)?) -> Result<$ret:ty, $err:ty>;
            )*
        }
    ) => {
        $(#[$meta])*
        #[$crate::__private::async_trait]
        $vis trait $name: Send + Sync + 'static {
            $(
                $(#[$mmeta])*
                async fn $method(&self $(, $arg: $arg_ty)*) -> ::std::result::Result<$ret, $err>;
            )*
        }

        impl $crate::RemoteInterface for dyn $name {
            const NAME: &'static str = concat!(module_path!(), "::", stringify!($name));

            fn descriptor() -> $crate::InterfaceDescriptor {
                $crate::InterfaceDescriptor::new(<Self as $crate::RemoteInterface>::NAME)
                $(
                    .method(
                        $crate::MethodSignature::new(stringify!($method))
                            $(.param(stringify!($arg_ty)))*
                            .returns(stringify!($ret))
                            .throws::<$err>()
                    )
                )*
            }

            fn bind(table: &mut $crate::MethodTable<Self>) {
                $(
                    table.insert(
                        stringify!($method),
                        &[$(stringify!($arg_ty)),*],
                        |server: ::std::sync::Arc<Self>, ($($arg,)*): ($($arg_ty,)*)| async move {
                            server.$method($($arg),*).await
                        },
                    );
                )*
            }
        }

        #[$crate::__private::async_trait]
        impl $name for $crate::Stub<dyn $name> {
            $(
                async fn $method(&self $(, $arg: $arg_ty)*) -> ::std::result::Result<$ret, $err> {
                    self.invoke(stringify!($method), ($($arg,)*)).await
                }
            )*
        }
    };
}
