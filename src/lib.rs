/// Process configuration: queue and logging sections.
pub mod config;
/// Flexible logging (formatting, filters, sinks).
pub mod logging;
/// Message queue: topic registry, per-topic actors, handlers.
pub mod mq;

// -----------------------------------------------------------------------------
//  Frequently used public types
// -----------------------------------------------------------------------------

/// config
pub use config::Settings;
/// Logging setup and lifecycle.
pub use logging::{init_logging, LoggingConfig, LoggingError, LoggingHandle};
/// Message queue API.
pub use mq::{
    handler_fn, CloseMode, FnHandler, Handler, HandlerResult, MessageQueue, MqConfig, PubsubState,
    QueueSnapshot, TopicStats,
};
/// Error types and helpers.
pub use topiq_error::{
    bail, ErrorExt, GenericError, MqError, MqResult, StackError, StatusCode, TopiqResult,
};
