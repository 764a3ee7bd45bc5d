//! Delivery channel between the decode task and the consumer, plus the
//! one-shot cancellation signal that unblocks it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use crossbeam_channel::{bounded, select, Receiver, RecvTimeoutError, Sender, TryRecvError};

use crate::models::Frame;

/// Single-fire, broadcast-readable stop flag.
///
/// Firing drops the only sender of an internal channel, so every clone of
/// the receiver observes disconnection and any `select!` waiting on it wakes.
#[derive(Debug)]
pub struct CancellationSignal {
    fired: AtomicBool,
    trigger: Mutex<Option<Sender<()>>>,
    observer: Receiver<()>,
}

impl Default for CancellationSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl CancellationSignal {
    pub fn new() -> Self {
        let (trigger, observer) = bounded(0);
        Self {
            fired: AtomicBool::new(false),
            trigger: Mutex::new(Some(trigger)),
            observer,
        }
    }

    /// Set the signal. Returns `true` only for the call that made the transition.
    pub fn fire(&self) -> bool {
        if self.fired.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.trigger
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        true
    }

    pub fn is_fired(&self) -> bool {
        self.fired.load(Ordering::Acquire)
    }

    /// Receiver that becomes disconnected once the signal fires
    pub fn observer(&self) -> &Receiver<()> {
        &self.observer
    }
}

/// Outcome of a blocking send
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SendOutcome {
    Delivered,
    /// Cancellation won the race; the frame was dropped
    Cancelled,
}

/// Producer half, owned by the decode state. Dropping it closes the channel.
#[derive(Debug)]
pub(crate) struct FrameSender {
    tx: Sender<Frame>,
}

impl FrameSender {
    /// Block until the consumer takes the frame or `stop` fires
    pub fn send(&self, frame: Frame, stop: &CancellationSignal) -> SendOutcome {
        if stop.is_fired() {
            return SendOutcome::Cancelled;
        }
        select! {
            send(self.tx, frame) -> res => match res {
                Ok(()) => SendOutcome::Delivered,
                Err(_) => SendOutcome::Cancelled,
            },
            recv(stop.observer()) -> _ => SendOutcome::Cancelled,
        }
    }

    /// Deliver only if there is room right now
    pub fn try_send(&self, frame: Frame) -> bool {
        self.tx.try_send(frame).is_ok()
    }
}

/// Consumer handle for decoded frames.
///
/// Cloning yields another handle to the same channel. Once the decoder is
/// closed, buffered frames can still be drained and `recv` then returns `None`.
#[derive(Debug, Clone)]
pub struct FrameReceiver {
    rx: Receiver<Frame>,
}

impl FrameReceiver {
    /// Block for the next frame; `None` once the channel is closed and empty
    pub fn recv(&self) -> Option<Frame> {
        self.rx.recv().ok()
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Result<Frame, RecvTimeoutError> {
        self.rx.recv_timeout(timeout)
    }

    pub fn try_recv(&self) -> Result<Frame, TryRecvError> {
        self.rx.try_recv()
    }

    /// Frames currently buffered
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    pub fn capacity(&self) -> Option<usize> {
        self.rx.capacity()
    }

    /// Blocking iterator that ends when the channel closes
    pub fn iter(&self) -> crossbeam_channel::Iter<'_, Frame> {
        self.rx.iter()
    }
}

impl IntoIterator for FrameReceiver {
    type Item = Frame;
    type IntoIter = crossbeam_channel::IntoIter<Frame>;

    fn into_iter(self) -> Self::IntoIter {
        self.rx.into_iter()
    }
}

impl<'a> IntoIterator for &'a FrameReceiver {
    type Item = Frame;
    type IntoIter = crossbeam_channel::Iter<'a, Frame>;

    fn into_iter(self) -> Self::IntoIter {
        self.rx.iter()
    }
}

/// Bounded, ordered frame channel of the given capacity
pub(crate) fn frame_channel(capacity: usize) -> (FrameSender, FrameReceiver) {
    let (tx, rx) = bounded(capacity);
    (FrameSender { tx }, FrameReceiver { rx })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Instant;

    fn frame(value: f32) -> Frame {
        Frame::from_samples(vec![vec![value]])
    }

    #[test]
    fn test_signal_fires_once() {
        let signal = CancellationSignal::new();
        assert!(!signal.is_fired());

        assert!(signal.fire());
        assert!(!signal.fire());
        assert!(signal.is_fired());
        assert!(signal.observer().recv().is_err());
    }

    #[test]
    fn test_signal_visible_across_threads() {
        let signal = Arc::new(CancellationSignal::new());
        let waiters: Vec<_> = (0..4)
            .map(|_| {
                let signal = Arc::clone(&signal);
                thread::spawn(move || signal.observer().recv().is_err())
            })
            .collect();

        let fired: Vec<bool> = (0..4).map(|_| signal.fire()).collect();
        assert_eq!(fired.iter().filter(|&&f| f).count(), 1);

        for waiter in waiters {
            assert!(waiter.join().unwrap());
        }
    }

    #[test]
    fn test_frames_arrive_in_order() {
        let (tx, rx) = frame_channel(8);
        let stop = CancellationSignal::new();

        for i in 0..5 {
            assert_eq!(tx.send(frame(i as f32), &stop), SendOutcome::Delivered);
        }
        drop(tx);

        let values: Vec<f32> = rx.iter().map(|f| f.samples()[0][0]).collect();
        assert_eq!(values, vec![0.0, 1.0, 2.0, 3.0, 4.0]);
        assert_eq!(rx.recv(), None);
    }

    #[test]
    fn test_full_channel_unblocks_on_stop() {
        let (tx, rx) = frame_channel(1);
        let stop = Arc::new(CancellationSignal::new());
        assert_eq!(tx.send(frame(0.0), &stop), SendOutcome::Delivered);

        let producer = {
            let stop = Arc::clone(&stop);
            thread::spawn(move || {
                let started = Instant::now();
                let outcome = tx.send(frame(1.0), &stop);
                (outcome, started.elapsed())
            })
        };

        thread::sleep(Duration::from_millis(50));
        stop.fire();

        let (outcome, elapsed) = producer.join().unwrap();
        assert_eq!(outcome, SendOutcome::Cancelled);
        assert!(elapsed >= Duration::from_millis(40));
        assert_eq!(rx.len(), 1);
    }

    #[test]
    fn test_send_after_stop_is_cancelled() {
        let (tx, rx) = frame_channel(4);
        let stop = CancellationSignal::new();
        stop.fire();

        assert_eq!(tx.send(frame(0.0), &stop), SendOutcome::Cancelled);
        assert!(rx.is_empty());

        assert!(tx.try_send(frame(1.0)));
        assert_eq!(rx.len(), 1);
    }

    #[test]
    fn test_try_send_drops_when_full() {
        let (tx, rx) = frame_channel(1);

        assert!(tx.try_send(frame(0.0)));
        assert!(!tx.try_send(frame(1.0)));
        assert_eq!(rx.capacity(), Some(1));
        assert_eq!(rx.try_recv().unwrap(), frame(0.0));
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
    }

    #[test]
    fn test_recv_timeout_reports_disconnect() {
        let (tx, rx) = frame_channel(2);
        assert!(matches!(
            rx.recv_timeout(Duration::from_millis(10)),
            Err(RecvTimeoutError::Timeout)
        ));

        drop(tx);
        assert!(matches!(
            rx.recv_timeout(Duration::from_millis(10)),
            Err(RecvTimeoutError::Disconnected)
        ));
    }
}
