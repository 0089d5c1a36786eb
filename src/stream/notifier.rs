//! Configuration-change notifications.
//!
//! Observers (typically a UI layer) subscribe and poll their own lock-free
//! queue. Publishing is lossy: a subscriber that stopped draining loses
//! events rather than blocking the publisher.

use rtrb::{Consumer, Producer, RingBuffer};

use crate::driver::registry::DriverId;

/// Events each listener's queue can hold before pushes become lossy.
pub const DEFAULT_EVENT_CAPACITY: usize = 64;

/// A configuration change worth refreshing displayed summaries for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeEvent {
    /// A different driver was selected.
    DriverChanged { driver: DriverId },
    /// A different device or channel window was selected.
    DeviceChanged {
        device: Option<usize>,
        offset: usize,
    },
    /// The stream's sample rate changed.
    SampleRateChanged { sample_rate: u32 },
    /// The stream's block size changed.
    BlockSizeChanged { block_size: usize },
    /// The stream opened a device and its callback is running.
    Opened,
    /// The stream has no open device.
    Closed,
    /// An open or teardown attempt failed; the stream needs a retry.
    Failed,
}

/// Publishes change events to any number of subscribers.
pub struct ChangeNotifier {
    subscribers: Vec<Producer<ChangeEvent>>,
}

impl ChangeNotifier {
    pub fn new() -> Self {
        Self {
            subscribers: Vec::new(),
        }
    }

    /// Register a new observer. The listener can move to another thread.
    pub fn subscribe(&mut self) -> ChangeListener {
        let (producer, consumer) = RingBuffer::new(DEFAULT_EVENT_CAPACITY);
        self.subscribers.push(producer);
        ChangeListener { events: consumer }
    }

    /// Publish an event to every live subscriber.
    ///
    /// Dropped listeners are pruned; full queues lose the event.
    pub fn notify(&mut self, event: ChangeEvent) {
        self.subscribers.retain(|tx| !tx.is_abandoned());
        for tx in &mut self.subscribers {
            let _ = tx.push(event.clone());
        }
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}

impl Default for ChangeNotifier {
    fn default() -> Self {
        Self::new()
    }
}

/// An observer's receiving end. Poll or drain on your own schedule.
pub struct ChangeListener {
    events: Consumer<ChangeEvent>,
}

impl ChangeListener {
    /// Next pending event, if any. Non-blocking.
    pub fn poll(&mut self) -> Option<ChangeEvent> {
        self.events.pop().ok()
    }

    /// Iterator over all pending events.
    pub fn drain(&mut self) -> impl Iterator<Item = ChangeEvent> + '_ {
        std::iter::from_fn(|| self.poll())
    }
}
