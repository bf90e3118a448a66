// Copyright (c) 2022 MASSA LABS <info@massa.net>

/// Emits a structured trace event: `parex_trace:<event>:<json params>`.
/// Callers need `tracing` and `serde_json` among their dependencies.
#[macro_export]
macro_rules! parex_trace {
    ($evt:expr, $params:tt) => {
        tracing::trace!("parex_trace:{}:{}", $evt, serde_json::json!($params));
    };
}
