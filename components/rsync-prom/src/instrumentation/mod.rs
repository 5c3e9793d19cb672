/// Global `tracing` subscriber and panic hook.
pub mod tracing;
