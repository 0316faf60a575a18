//! One-producer / many-consumer audio broadcast channel.
//!
//! The TTS provider publishes chunks; lip-sync and playback consumers each
//! observe the same stream through their own bounded queue. Overflow drops
//! the oldest frames for that subscriber only, so one slow consumer never
//! stalls the speaker or its siblings.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Frames and sinks
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One event on the audio stream.
#[derive(Debug, Clone)]
pub enum AudioFrame {
    /// A new utterance begins.
    Start { sample_rate: u32, channels: u16 },
    /// Raw PCM bytes.
    Chunk(Arc<Vec<u8>>),
    /// The utterance ended.
    End,
}

/// Callbacks a subscriber implements.
#[async_trait]
pub trait AudioSink: Send + Sync {
    async fn on_start(&self, sample_rate: u32, channels: u16);
    async fn on_chunk(&self, chunk: &[u8]);
    async fn on_end(&self);
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Broadcast channel
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

struct Subscriber {
    queue: Arc<Mutex<VecDeque<AudioFrame>>>,
    notify: Arc<Notify>,
    task: JoinHandle<()>,
    dropped: Arc<Mutex<u64>>,
}

pub struct AudioBroadcast {
    subscribers: Mutex<HashMap<String, Subscriber>>,
    /// Per-subscriber queue capacity.
    capacity: usize,
}

impl AudioBroadcast {
    pub fn new(capacity: usize) -> Self {
        Self {
            subscribers: Mutex::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    /// Register a named subscriber. A previous subscriber under the same
    /// name is replaced (its consumer task is aborted).
    pub fn subscribe(&self, name: &str, sink: Arc<dyn AudioSink>) {
        let queue: Arc<Mutex<VecDeque<AudioFrame>>> = Arc::new(Mutex::new(VecDeque::new()));
        let notify = Arc::new(Notify::new());
        let dropped = Arc::new(Mutex::new(0u64));

        let task = {
            let queue = queue.clone();
            let notify = notify.clone();
            tokio::spawn(async move {
                loop {
                    let frame = queue.lock().pop_front();
                    match frame {
                        Some(AudioFrame::Start {
                            sample_rate,
                            channels,
                        }) => sink.on_start(sample_rate, channels).await,
                        Some(AudioFrame::Chunk(bytes)) => sink.on_chunk(&bytes).await,
                        Some(AudioFrame::End) => sink.on_end().await,
                        None => notify.notified().await,
                    }
                }
            })
        };

        let previous = self.subscribers.lock().insert(
            name.to_string(),
            Subscriber {
                queue,
                notify,
                task,
                dropped,
            },
        );
        if let Some(previous) = previous {
            previous.task.abort();
            tracing::debug!(subscriber = %name, "replaced existing audio subscriber");
        }
        tracing::debug!(subscriber = %name, "audio subscriber registered");
    }

    pub fn unsubscribe(&self, name: &str) {
        if let Some(subscriber) = self.subscribers.lock().remove(name) {
            subscriber.task.abort();
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }

    /// Fan a frame out to every subscriber. Each subscriber's queue is
    /// bounded; the oldest frame is dropped on overflow.
    pub fn publish(&self, frame: AudioFrame) {
        let subscribers = self.subscribers.lock();
        for (name, subscriber) in subscribers.iter() {
            {
                let mut queue = subscriber.queue.lock();
                if queue.len() >= self.capacity {
                    queue.pop_front();
                    let mut dropped = subscriber.dropped.lock();
                    *dropped += 1;
                    if dropped.is_power_of_two() {
                        tracing::warn!(
                            subscriber = %name,
                            total_dropped = *dropped,
                            "audio subscriber lagging, dropping oldest frames"
                        );
                    }
                }
                queue.push_back(frame.clone());
            }
            subscriber.notify.notify_one();
        }
    }

    /// Frames dropped for a subscriber so far.
    pub fn dropped_frames(&self, name: &str) -> u64 {
        self.subscribers
            .lock()
            .get(name)
            .map_or(0, |s| *s.dropped.lock())
    }
}

impl Drop for AudioBroadcast {
    fn drop(&mut self) {
        for (_, subscriber) in self.subscribers.lock().drain() {
            subscriber.task.abort();
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
