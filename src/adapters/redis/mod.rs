//! Redis adapters.

mod stream_queue;

pub use stream_queue::RedisStreamQueue;
