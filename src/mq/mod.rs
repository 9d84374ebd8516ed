//! Очередь сообщений с ключом-топиком.
//!
//! [`MessageQueue`] хранит по одному актору (`Pubsub`) на топик. У каждого
//! актора ограниченный буфер (обратное давление на продюсеров), ровно один
//! воркер, вызывающий [`Handler`], и таймер простоя.

pub mod config;
pub mod handler;
mod pubsub;
pub mod registry;
pub mod state;
pub mod stats;

pub use config::{CloseMode, MqConfig, DEFAULT_CAPACITY, DEFAULT_IDLE_TIMEOUT, MAX_CAPACITY};
pub use handler::{handler_fn, FnHandler, Handler, HandlerResult};
pub use registry::MessageQueue;
pub use state::PubsubState;
pub use stats::{QueueSnapshot, TopicStats};
