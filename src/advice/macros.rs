//! Decorator generator.

/// Generate advice impls for a client capability set.
///
/// The input lists every operation of the trait once, split into `async`
/// and `sync` groups, with the CamelCase name used for span labels. The
/// metric operation name is the method name, unless an `as "name"` suffix
/// overrides it.
///
/// ```ignore
/// instrument_client! {
///     trait DiscoveryClient {
///         async {
///             fn server_version(&self) -> Result<Info> => "ServerVersion";
///         }
///         sync {
///             fn open_api_v3(&self) -> OpenApiV3 => "OpenAPIV3" as "open_apiv3";
///             fn rest_client(&self) -> Client => "RESTClient";
///         }
///     }
/// }
/// ```
///
/// Expands to three impls of the trait:
/// - `Arc<D>` for any `D: ?Sized` implementing it (forwarding)
/// - [`WithMetrics<D>`](crate::advice::WithMetrics)
/// - [`WithTracing<D>`](crate::advice::WithTracing)
///
/// An optional `type Name;` line forwards an associated type from `D`.
/// Every return type must implement
/// [`CallOutcome`](crate::spans::CallOutcome).
macro_rules! instrument_client {
    (@metric $method:ident) => {
        stringify!($method)
    };
    (@metric $method:ident $metric:literal) => {
        $metric
    };
    (
        trait $client:ident {
            $(type $assoc:ident;)?
            async {
                $(
                    fn $method:ident(&self $(, $arg:ident: $arg_ty:ty)*) -> $ret:ty => $operation:literal $(as $metric:literal)?;
                )*
            }
            sync {
                $(
                    fn $smethod:ident(&self $(, $sarg:ident: $sarg_ty:ty)*) -> $sret:ty => $soperation:literal $(as $smetric:literal)?;
                )*
            }
        }
    ) => {
        #[::async_trait::async_trait]
        impl<D> $client for ::std::sync::Arc<D>
        where
            D: $client + ?Sized,
        {
            $(type $assoc = D::$assoc;)?

            $(
                async fn $method(&self $(, $arg: $arg_ty)*) -> $ret {
                    (**self).$method($($arg),*).await
                }
            )*

            $(
                fn $smethod(&self $(, $sarg: $sarg_ty)*) -> $sret {
                    (**self).$smethod($($sarg),*)
                }
            )*
        }

        #[::async_trait::async_trait]
        impl<D> $client for $crate::advice::WithMetrics<D>
        where
            D: $client,
        {
            $(type $assoc = D::$assoc;)?

            $(
                async fn $method(&self $(, $arg: $arg_ty)*) -> $ret {
                    let _recording = $crate::metrics::Recording::start(
                        self.recorder.as_ref(),
                        $crate::advice::instrument_client!(@metric $method $($metric)?),
                    );
                    self.inner.$method($($arg),*).await
                }
            )*

            $(
                fn $smethod(&self $(, $sarg: $sarg_ty)*) -> $sret {
                    let _recording = $crate::metrics::Recording::start(
                        self.recorder.as_ref(),
                        $crate::advice::instrument_client!(@metric $smethod $($smetric)?),
                    );
                    self.inner.$smethod($($sarg),*)
                }
            )*
        }

        #[::async_trait::async_trait]
        impl<D> $client for $crate::advice::WithTracing<D>
        where
            D: $client,
        {
            $(type $assoc = D::$assoc;)?

            $(
                async fn $method(&self $(, $arg: $arg_ty)*) -> $ret {
                    let span = $crate::spans::start_span(&self.client, &self.kind, $operation);
                    let outcome = ::tracing::Instrument::instrument(
                        self.inner.$method($($arg),*),
                        span.span().clone(),
                    )
                    .await;
                    span.observe(&outcome);
                    outcome
                }
            )*

            $(
                fn $smethod(&self $(, $sarg: $sarg_ty)*) -> $sret {
                    let span = $crate::spans::start_span(&self.client, &self.kind, $soperation);
                    let outcome = span.in_scope(|| self.inner.$smethod($($sarg),*));
                    span.observe(&outcome);
                    outcome
                }
            )*
        }
    };
}

pub(crate) use instrument_client;
