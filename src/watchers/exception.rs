use super::{keyed, WatcherScope};
use crate::recorder::{bounded_text, bounded_value, family_hash, Entry, ExceptionContent, Extra};
use serde_json::{Map, Value};
use std::error::Error;

/// Error flattened into class, message and trace
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExceptionReport {
    pub class: String,
    pub message: String,
    pub trace: Vec<String>,
}

impl ExceptionReport {
    pub fn new(class: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            class: class.into(),
            message: message.into(),
            trace: Vec::new(),
        }
    }

    pub fn with_trace(mut self, trace: Vec<String>) -> Self {
        self.trace = trace;
        self
    }

    /// Report for any error; the trace is its `source()` chain
    pub fn from_error<E: Error + ?Sized>(error: &E) -> Self {
        let mut trace = Vec::new();
        let mut source = error.source();
        while let Some(cause) = source {
            trace.push(format!("caused by: {}", cause));
            source = cause.source();
        }

        Self {
            class: std::any::type_name::<E>().to_string(),
            message: error.to_string(),
            trace,
        }
    }

    /// Last path segment of the class, generics dropped
    pub fn short_class(&self) -> &str {
        let base = self.class.split('<').next().unwrap_or(&self.class);
        base.rsplit("::").next().unwrap_or(base)
    }
}

/// Records handled and unhandled errors
pub struct ExceptionWatcher<'a> {
    scope: WatcherScope<'a>,
}

impl<'a> ExceptionWatcher<'a> {
    pub(crate) fn new(scope: WatcherScope<'a>) -> Self {
        Self { scope }
    }

    /// Record an error value
    ///
    /// # Example
    ///
    /// ```ignore
    /// if let Err(e) = charge(order).await {
    ///     recorder.exceptions().record_exception(&e, context, true);
    /// }
    /// ```
    pub fn record_exception<E: Error + ?Sized>(
        &self,
        error: &E,
        context: Map<String, Value>,
        handled: bool,
    ) {
        let class = std::any::type_name::<E>();
        // Skip building the report when it would be ignored anyway
        if !self.scope.accepts(class) {
            return;
        }
        self.record_report(ExceptionReport::from_error(error), context, handled);
    }

    /// Record a report built by the caller
    pub fn record_report(&self, report: ExceptionReport, context: Map<String, Value>, handled: bool) {
        self.scope.capture(&report.class, || {
            let settings = self.scope.settings();
            let limit = settings.payload_limit;

            let tags = vec![
                if handled { "handled" } else { "unhandled" }.to_string(),
                keyed("class", report.short_class()),
            ];

            let shape = self
                .scope
                .normalizer()
                .normalize_exception(&report.class, &report.message);

            let content = ExceptionContent {
                class: report.class.clone(),
                message: bounded_text(&report.message, limit),
                trace: report
                    .trace
                    .iter()
                    .take(settings.trace_frame_limit)
                    .map(|frame| bounded_text(frame, limit))
                    .collect(),
                context: bounded_value(Value::Object(context), limit),
                handled,
                extra: Extra::new(),
            };

            Entry::new(content, tags, Some(family_hash(&["exception", &shape])), true)
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fmt;

    #[derive(Debug)]
    struct Inner;

    impl fmt::Display for Inner {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "connection reset")
        }
    }

    impl Error for Inner {}

    #[derive(Debug)]
    struct PaymentFailed(Inner);

    impl fmt::Display for PaymentFailed {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "payment 42 failed")
        }
    }

    impl Error for PaymentFailed {
        fn source(&self) -> Option<&(dyn Error + 'static)> {
            Some(&self.0)
        }
    }

    #[test]
    fn test_report_from_error() {
        let report = ExceptionReport::from_error(&PaymentFailed(Inner));
        assert!(report.class.ends_with("PaymentFailed"));
        assert_eq!(report.short_class(), "PaymentFailed");
        assert_eq!(report.message, "payment 42 failed");
        assert_eq!(report.trace, vec!["caused by: connection reset".to_string()]);
    }

    #[test]
    fn test_short_class_drops_generics() {
        let report = ExceptionReport::new("app::errors::Wrapped<alloc::string::String>", "x");
        assert_eq!(report.short_class(), "Wrapped");
    }
}
