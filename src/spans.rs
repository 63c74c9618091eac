//! Client call spans.
//!
//! Thin layer over `tracing` giving each client call a span with a fixed
//! shape:
//!
//! - name: `kube.client`, with `otel.name = "KUBE <client>/<kind>/<operation>"`
//! - attributes: `client`, `kind`, `operation`
//! - status: `otel.status_code` / `otel.status_message`, set only on failure
//!
//! With the `otel` feature, `tracing-opentelemetry` maps the `otel.*` fields
//! onto the exported span's name, kind and status.

use std::error::Error;
use std::fmt;

use tracing::field::Empty;
use tracing::{error, info_span, Span};

/// Protocol prefix of span names.
pub const PROTOCOL: &str = "KUBE";

/// Span name for `operation` on a client labelled `client` / `kind`.
pub fn span_name(client: &str, kind: &str, operation: &str) -> String {
    format!("{PROTOCOL} {client}/{kind}/{operation}")
}

/// Status of a finished client span.
///
/// Only failures are reported. A successful call leaves the status unset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpanStatus {
    Error,
}

impl SpanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SpanStatus::Error => "error",
        }
    }
}

/// Result of a client call, as seen by the tracing decorator.
///
/// Lets the decorator find the error of any return shape without knowing
/// where it sits.
pub trait CallOutcome {
    /// The error carried by this outcome, if the call failed.
    fn failure(&self) -> Option<&(dyn Error + 'static)>;
}

impl<T, E> CallOutcome for Result<T, E>
where
    E: Error + 'static,
{
    fn failure(&self) -> Option<&(dyn Error + 'static)> {
        self.as_ref().err().map(|e| e as &(dyn Error + 'static))
    }
}

/// Mark handle types returned by infallible operations.
macro_rules! infallible_outcome {
    ($($ty:ty),* $(,)?) => {
        $(
            impl $crate::spans::CallOutcome for $ty {
                fn failure(&self) -> Option<&(dyn std::error::Error + 'static)> {
                    None
                }
            }
        )*
    };
}

pub(crate) use infallible_outcome;

/// An open client span. Ends when dropped.
#[derive(Debug)]
pub struct ClientSpan {
    span: Span,
}

/// Start a span for `operation` on a client labelled `client` / `kind`.
pub fn start_span(client: &str, kind: &str, operation: &'static str) -> ClientSpan {
    let span = info_span!(
        target: "kube_advice::client",
        "kube.client",
        otel.name = %span_name(client, kind, operation),
        otel.kind = "client",
        otel.status_code = Empty,
        otel.status_message = Empty,
        client = client,
        kind = kind,
        operation = operation,
    );
    ClientSpan { span }
}

impl ClientSpan {
    /// The underlying `tracing` span, for instrumenting futures.
    pub fn span(&self) -> &Span {
        &self.span
    }

    /// Run `f` inside this span.
    pub fn in_scope<T>(&self, f: impl FnOnce() -> T) -> T {
        self.span.in_scope(f)
    }

    /// Attach `err` to the span as an error event.
    ///
    /// Emitted at `ERROR` so the default `info` filter keeps it.
    pub fn record_error(&self, err: &(dyn Error + 'static)) {
        error!(
            target: "kube_advice::client",
            parent: &self.span,
            error = err,
            "Client call failed"
        );
    }

    pub fn set_status(&self, status: SpanStatus, message: impl fmt::Display) {
        self.span.record("otel.status_code", status.as_str());
        self.span
            .record("otel.status_message", message.to_string().as_str());
    }

    /// Report the outcome of the wrapped call.
    ///
    /// Failures are recorded and mark the span as errored. Success leaves
    /// the status unset.
    pub fn observe<O>(&self, outcome: &O)
    where
        O: CallOutcome + ?Sized,
    {
        if let Some(err) = outcome.failure() {
            self.record_error(err);
            self.set_status(SpanStatus::Error, err);
        }
    }

    /// End the span.
    pub fn end(self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ClientError;
    use crate::test_utils::SpanCapture;
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::EnvFilter;

    #[test]
    fn test_span_name_convention() {
        assert_eq!(
            span_name("Discovery", "", "ServerVersion"),
            "KUBE Discovery//ServerVersion"
        );
        assert_eq!(span_name("X", "Y", "Get"), "KUBE X/Y/Get");
    }

    #[test]
    fn test_start_span_attributes() {
        let capture = SpanCapture::new();
        let _guard = capture.set_default();

        start_span("X", "Y", "ServerVersion").end();

        let spans = capture.spans();
        assert_eq!(spans.len(), 1);
        let span = &spans[0];
        assert_eq!(span.field("client"), Some("X"));
        assert_eq!(span.field("kind"), Some("Y"));
        assert_eq!(span.field("operation"), Some("ServerVersion"));
        assert_eq!(span.field("otel.name"), Some("KUBE X/Y/ServerVersion"));
        assert_eq!(span.field("otel.status_code"), None);
        assert!(span.closed);
    }

    #[test]
    fn test_observe_failure_sets_error_status() {
        let capture = SpanCapture::new();
        let _guard = capture.set_default();

        let outcome: Result<(), ClientError> =
            Err(ClientError::InvalidGroupVersion("/".to_string()));
        let span = start_span("Discovery", "", "ServerResourcesForGroupVersion");
        span.observe(&outcome);
        drop(span);

        let spans = capture.spans();
        assert_eq!(spans[0].field("otel.status_code"), Some("error"));
        assert_eq!(
            spans[0].field("otel.status_message"),
            Some("invalid group version: \"/\"")
        );
        assert_eq!(spans[0].errors, vec!["invalid group version: \"/\"".to_string()]);
    }

    #[test]
    fn test_observe_success_leaves_status_unset() {
        let capture = SpanCapture::new();
        let _guard = capture.set_default();

        let outcome: Result<u32, ClientError> = Ok(7);
        let span = start_span("Discovery", "", "ServerVersion");
        span.observe(&outcome);
        span.end();

        let spans = capture.spans();
        assert_eq!(spans[0].field("otel.status_code"), None);
        assert!(spans[0].errors.is_empty());
    }

    #[test]
    fn test_error_event_survives_info_filter() {
        let capture = SpanCapture::new();
        let subscriber = tracing_subscriber::registry()
            .with(EnvFilter::new("info"))
            .with(capture.clone());
        let _guard = tracing::subscriber::set_default(subscriber);

        let outcome: Result<(), ClientError> =
            Err(ClientError::InvalidGroupVersion("/".to_string()));
        start_span("Discovery", "", "ServerResourcesForGroupVersion").observe(&outcome);

        let spans = capture.spans();
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].field("otel.status_code"), Some("error"));
        assert_eq!(spans[0].errors.len(), 1);
        assert_eq!(spans[0].errors[0], "invalid group version: \"/\"");
        assert!(spans[0].closed);
    }
}
