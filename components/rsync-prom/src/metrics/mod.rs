//! Readings pushed for each rsync invocation and the publishers that ship them.

/// Metric names and reading builders.
pub mod metrics;
/// Publishers.
pub mod push;

pub use metrics::{
    Grouping, Reading, exit_code, exit_code_name, start_timestamp, start_timestamp_name,
    transfer_readings,
};
pub use push::{LogPublisher, PublishError, PushgatewayPublisher};
