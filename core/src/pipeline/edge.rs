//! Stream edges, message channels, and the stop signal shared by stage
//! threads.
//!
//! Stream edges are bounded and apply backpressure: a full edge blocks its
//! producer. Message channels never block their producer; a full channel
//! drops the newest message and counts it.

use crate::telemetry::log::LogManager;
use crate::telemetry::metrics::MetricsRecorder;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};

/// Producer half of a bounded single-producer/single-consumer stream edge.
pub struct EdgeSender<T> {
    tx: mpsc::Sender<T>,
}

/// Consumer half of a stream edge.
pub struct EdgeReceiver<T> {
    rx: mpsc::Receiver<T>,
}

/// Creates a stream edge holding at most `capacity` items (at least one).
pub fn edge<T>(capacity: usize) -> (EdgeSender<T>, EdgeReceiver<T>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (EdgeSender { tx }, EdgeReceiver { rx })
}

impl<T> EdgeSender<T> {
    /// Blocks while the edge is full. Returns `false` once the consumer is
    /// gone.
    pub fn send(&self, item: T) -> bool {
        self.tx.blocking_send(item).is_ok()
    }
}

impl<T> EdgeReceiver<T> {
    /// Blocks until an item arrives; `None` once the producer is gone and the
    /// edge is drained.
    pub fn recv(&mut self) -> Option<T> {
        self.rx.blocking_recv()
    }
}

/// Non-blocking producer of an out-of-band message channel.
pub struct MessageSender<T> {
    tx: mpsc::Sender<T>,
    metrics: Arc<MetricsRecorder>,
    logger: LogManager,
}

/// Consumer of an out-of-band message channel.
pub struct MessageReceiver<T> {
    rx: mpsc::Receiver<T>,
}

pub fn message_channel<T>(
    name: &'static str,
    capacity: usize,
    metrics: Arc<MetricsRecorder>,
) -> (MessageSender<T>, MessageReceiver<T>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (
        MessageSender {
            tx,
            metrics,
            logger: LogManager::for_stage(name),
        },
        MessageReceiver { rx },
    )
}

impl<T> MessageSender<T> {
    /// Offers `message` without waiting. A full channel drops it; a closed
    /// channel discards it silently.
    pub fn publish(&self, message: T) {
        match self.tx.try_send(message) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                self.metrics.record_dropped();
                self.logger.debug("consumer lagging, message dropped");
            }
            Err(TrySendError::Closed(_)) => {}
        }
    }
}

impl<T> MessageReceiver<T> {
    /// Blocks the calling thread until a message arrives.
    pub fn recv(&mut self) -> Option<T> {
        self.rx.blocking_recv()
    }

    /// Takes everything queued right now.
    pub fn drain(&mut self) -> Vec<T> {
        let mut messages = Vec::new();
        while let Ok(message) = self.rx.try_recv() {
            messages.push(message);
        }
        messages
    }
}

/// Process-wide stop flag observed by every stage at frame boundaries.
#[derive(Debug, Clone, Default)]
pub struct StopSignal {
    raised: Arc<AtomicBool>,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self) {
        self.raised.store(true, Ordering::SeqCst);
    }

    pub fn is_raised(&self) -> bool {
        self.raised.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn edge_is_fifo_and_closes_when_producer_leaves() {
        let (tx, mut rx) = edge::<u32>(2);
        let producer = thread::spawn(move || {
            for i in 0..5 {
                assert!(tx.send(i));
            }
        });
        let received: Vec<u32> = std::iter::from_fn(|| rx.recv()).collect();
        producer.join().unwrap();
        assert_eq!(received, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn send_reports_missing_consumer() {
        let (tx, rx) = edge::<u32>(1);
        drop(rx);
        assert!(!tx.send(1));
    }

    #[test]
    fn full_message_channel_drops_newest_without_blocking() {
        let metrics = Arc::new(MetricsRecorder::new());
        let (tx, mut rx) = message_channel::<u32>("test", 2, Arc::clone(&metrics));
        for i in 0..5 {
            tx.publish(i);
        }
        assert_eq!(rx.drain(), vec![0, 1]);
        assert_eq!(metrics.snapshot().dropped_messages, 3);
    }

    #[test]
    fn publishing_to_closed_channel_is_silent() {
        let metrics = Arc::new(MetricsRecorder::new());
        let (tx, rx) = message_channel::<u32>("test", 1, Arc::clone(&metrics));
        drop(rx);
        tx.publish(7);
        assert_eq!(metrics.snapshot().dropped_messages, 0);
    }
}
