//! Block exchange between the real-time callback and the engine.
//!
//! One in-flight block per direction, held in a single slot. The callback
//! side only ever uses `try_lock` and has a defined fallback for every miss:
//! silence when output is not ready, dropping a block when the engine has
//! not drained. Blocks rotate between the slot and per-side scratch blocks
//! by `mem::swap`, so the callback never allocates or frees.
//!
//! The engine side takes the lock outright, but only ever holds it for a
//! swap or a block copy, so the callback's wait is bounded.

use std::mem;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, TryLockError};

/// A fixed-capacity block of interleaved samples.
///
/// Sized at creation to the negotiated block size times the active channel
/// count; never resized afterwards.
#[derive(Debug, Clone)]
pub struct AudioBlock {
    /// Interleaved sample data.
    pub samples: Vec<f32>,
    /// Interleaved channel count.
    pub channels: usize,
}

impl AudioBlock {
    pub fn new(block_size: usize, channels: usize) -> Self {
        Self {
            samples: vec![0.0; block_size * channels],
            channels,
        }
    }

    /// Number of frames in the block.
    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            0
        } else {
            self.samples.len() / self.channels
        }
    }

    /// Zero all samples.
    pub fn clear(&mut self) {
        self.samples.fill(0.0);
    }
}

struct Slot {
    block: AudioBlock,
    /// True while the block holds data the other side has not taken yet.
    fresh: bool,
}

/// Underrun and dropped-block counters, shared across both sides.
///
/// Real-time conditions are counted here, never raised as errors across the
/// callback boundary.
#[derive(Debug, Default)]
pub struct ExchangeMetrics {
    underruns: AtomicU64,
    dropped_blocks: AtomicU64,
}

impl ExchangeMetrics {
    /// Times the callback needed an output block that was not ready.
    pub fn underruns(&self) -> u64 {
        self.underruns.load(Ordering::Relaxed)
    }

    /// Input blocks lost because the engine did not drain in time.
    pub fn dropped_blocks(&self) -> u64 {
        self.dropped_blocks.load(Ordering::Relaxed)
    }

    fn count_underrun(&self) {
        self.underruns.fetch_add(1, Ordering::Relaxed);
    }

    fn count_dropped(&self) {
        self.dropped_blocks.fetch_add(1, Ordering::Relaxed);
    }
}

fn lock_slot(slot: &Mutex<Slot>) -> MutexGuard<'_, Slot> {
    match slot.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Both directions of a stream's block exchange, before splitting into the
/// per-thread handles.
pub struct BufferExchange {
    input_slot: Arc<Mutex<Slot>>,
    output_slot: Arc<Mutex<Slot>>,
    block_size: usize,
    input_channels: usize,
    output_channels: usize,
    metrics: Arc<ExchangeMetrics>,
}

impl BufferExchange {
    /// Create an exchange for `block_size` frames per block, with the given
    /// active channel counts per direction. A direction with zero channels
    /// is inert.
    pub fn new(block_size: usize, input_channels: usize, output_channels: usize) -> Self {
        Self {
            input_slot: Arc::new(Mutex::new(Slot {
                block: AudioBlock::new(block_size, input_channels),
                fresh: false,
            })),
            output_slot: Arc::new(Mutex::new(Slot {
                block: AudioBlock::new(block_size, output_channels),
                fresh: false,
            })),
            block_size,
            input_channels,
            output_channels,
            metrics: Arc::new(ExchangeMetrics::default()),
        }
    }

    pub fn metrics(&self) -> Arc<ExchangeMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Split into the callback-side endpoints and the engine-side handle.
    /// The producer and consumer can move into separate callback closures.
    pub fn split(self) -> (CallbackProducer, CallbackConsumer, EngineHandle) {
        let producer = CallbackProducer {
            slot: Arc::clone(&self.input_slot),
            spare: AudioBlock::new(self.block_size, self.input_channels),
            metrics: Arc::clone(&self.metrics),
        };
        let consumer = CallbackConsumer {
            slot: Arc::clone(&self.output_slot),
            metrics: Arc::clone(&self.metrics),
        };
        let engine = EngineHandle {
            input_slot: self.input_slot,
            output_slot: self.output_slot,
            input_spare: AudioBlock::new(self.block_size, self.input_channels),
            output_spare: AudioBlock::new(self.block_size, self.output_channels),
            metrics: self.metrics,
        };
        (producer, consumer, engine)
    }
}

/// Callback-side input endpoint: publishes captured device blocks.
///
/// REAL-TIME SAFE: try-lock only, no allocation; a full or contended slot
/// costs one dropped block, never a stall.
pub struct CallbackProducer {
    slot: Arc<Mutex<Slot>>,
    spare: AudioBlock,
    metrics: Arc<ExchangeMetrics>,
}

impl CallbackProducer {
    /// Copy one captured block out of the device's interleaved buffer and
    /// hand it to the engine.
    ///
    /// `src` holds `src_channels` interleaved channels; the block takes the
    /// stream's window starting at `offset`. If the previous block is still
    /// unconsumed it is replaced (the oldest data is dropped and counted)
    /// and its storage recycled as the next scratch block.
    pub fn produce(&mut self, src: &[f32], src_channels: usize, offset: usize) {
        let channels = self.spare.channels;
        if channels == 0 {
            return;
        }

        let src_frames = if src_channels == 0 {
            0
        } else {
            src.len() / src_channels
        };
        let frames = self.spare.frames().min(src_frames);
        for frame in 0..frames {
            for ch in 0..channels {
                let src_ch = offset + ch;
                self.spare.samples[frame * channels + ch] = if src_ch < src_channels {
                    src[frame * src_channels + src_ch]
                } else {
                    0.0
                };
            }
        }
        for sample in &mut self.spare.samples[frames * channels..] {
            *sample = 0.0;
        }

        match self.slot.try_lock() {
            Ok(mut slot) => {
                if slot.fresh {
                    self.metrics.count_dropped();
                }
                mem::swap(&mut slot.block, &mut self.spare);
                slot.fresh = true;
            }
            // Engine is mid-swap; this block is the one dropped.
            Err(TryLockError::WouldBlock) | Err(TryLockError::Poisoned(_)) => {
                self.metrics.count_dropped();
            }
        }
    }
}

/// Callback-side output endpoint: pulls engine blocks into the device
/// buffer.
///
/// REAL-TIME SAFE: try-lock only; a missing block becomes silence.
pub struct CallbackConsumer {
    slot: Arc<Mutex<Slot>>,
    metrics: Arc<ExchangeMetrics>,
}

impl CallbackConsumer {
    /// Fill the device's interleaved buffer from the engine's latest block.
    ///
    /// `dst` holds `dst_channels` interleaved channels; the block lands in
    /// the stream's window starting at `offset`, everything else is zeroed.
    /// If no fresh block is available the whole buffer stays silent and an
    /// underrun is counted.
    pub fn consume(&mut self, dst: &mut [f32], dst_channels: usize, offset: usize) {
        dst.fill(0.0);
        if dst_channels == 0 {
            return;
        }

        match self.slot.try_lock() {
            Ok(mut slot) if slot.fresh => {
                let channels = slot.block.channels;
                let dst_frames = dst.len() / dst_channels;
                let frames = slot.block.frames().min(dst_frames);
                for frame in 0..frames {
                    for ch in 0..channels {
                        let dst_ch = offset + ch;
                        if dst_ch < dst_channels {
                            dst[frame * dst_channels + dst_ch] =
                                slot.block.samples[frame * channels + ch];
                        }
                    }
                }
                slot.fresh = false;
            }
            _ => self.metrics.count_underrun(),
        }
    }
}

/// Engine-side handle: drains captured input and fills output on the
/// engine's own schedule.
pub struct EngineHandle {
    input_slot: Arc<Mutex<Slot>>,
    output_slot: Arc<Mutex<Slot>>,
    input_spare: AudioBlock,
    output_spare: AudioBlock,
    metrics: Arc<ExchangeMetrics>,
}

impl EngineHandle {
    /// Take the newest captured input block, if one arrived since the last
    /// drain.
    pub fn drain(&mut self) -> Option<&AudioBlock> {
        {
            let mut slot = lock_slot(&self.input_slot);
            if !slot.fresh {
                return None;
            }
            mem::swap(&mut slot.block, &mut self.input_spare);
            slot.fresh = false;
        }
        Some(&self.input_spare)
    }

    /// Render one output block and hand it to the callback side.
    ///
    /// The block is zeroed before `render` runs. An unconsumed previous
    /// block is replaced; the callback always plays the newest block.
    pub fn fill(&mut self, render: impl FnOnce(&mut AudioBlock)) {
        self.output_spare.clear();
        render(&mut self.output_spare);
        let mut slot = lock_slot(&self.output_slot);
        mem::swap(&mut slot.block, &mut self.output_spare);
        slot.fresh = true;
    }

    /// Whether the callback has not yet taken the last filled block.
    pub fn output_pending(&self) -> bool {
        lock_slot(&self.output_slot).fresh
    }

    pub fn metrics(&self) -> Arc<ExchangeMetrics> {
        Arc::clone(&self.metrics)
    }
}
