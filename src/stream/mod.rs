//! Stream layer
//!
//! Validated stream configuration, the open/close/reconfigure state
//! machine, the real-time block exchange, and change notifications.

pub mod audio_stream;
pub mod config;
pub mod exchange;
pub mod notifier;

pub use audio_stream::{AudioStream, EngineLink, StreamState};
pub use config::{
    block_size_label, sample_rate_label, Proposal, StreamConfig, LOCKED_BY_DEVICE_LABEL,
    NO_DEVICE_LABEL,
};
pub use exchange::{
    AudioBlock, BufferExchange, CallbackConsumer, CallbackProducer, EngineHandle, ExchangeMetrics,
};
pub use notifier::{ChangeEvent, ChangeListener, ChangeNotifier, DEFAULT_EVENT_CAPACITY};
