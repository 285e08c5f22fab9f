//! Diagnostic sink for non-fatal anomalies.
//!
//! The codec never uses the sink for control flow. It only reports things
//! like a mismatched `blob.size` or a header without one.

use std::fmt;

/// Receives formatted diagnostic messages.
///
/// Any `Fn(fmt::Arguments<'_>)` closure is a sink:
///
/// ```rust
/// use wsbt::utils::trace::Trace;
///
/// let sink = |args: std::fmt::Arguments<'_>| eprintln!("wsbt: {args}");
/// sink.trace(format_args!("blob.size is not found"));
/// ```
pub trait Trace {
    fn trace(&self, args: fmt::Arguments<'_>);
}

impl<F> Trace for F
where
    F: Fn(fmt::Arguments<'_>),
{
    fn trace(&self, args: fmt::Arguments<'_>) {
        self(args)
    }
}

/// Default sink forwarding to `tracing` at warn level
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl Trace for TracingSink {
    fn trace(&self, args: fmt::Arguments<'_>) {
        tracing::warn!(target: "wsbt", "{}", args);
    }
}

/// Sink that drops everything
#[derive(Debug, Clone, Copy, Default)]
pub struct Silent;

impl Trace for Silent {
    fn trace(&self, _args: fmt::Arguments<'_>) {}
}
