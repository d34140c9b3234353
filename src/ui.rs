//! One-way hand-off of [`UiState`] updates from the frame-processing thread to the UI thread.
//!
//! The channel holds at most one pending update. Posting never blocks: if the UI has not picked up
//! the previous update yet, the new one is dropped. The UI always gets a fresh [`UiState`] on a
//! later frame, so losing intermediate updates is harmless.

use std::time::Duration;

use crossbeam::channel::{self, TrySendError};

pub use crossbeam::channel::RecvTimeoutError;

use crate::decision::UiState;

/// Creates a connected pair of [`UiSender`] and [`UiReceiver`].
pub fn channel() -> (UiSender, UiReceiver) {
    let (sender, recv) = channel::bounded(1);
    (
        UiSender {
            inner: sender,
            dropped: 0,
        },
        UiReceiver { inner: recv },
    )
}

/// Result of [`UiSender::post`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Posted {
    /// The update is waiting for the UI thread.
    Delivered,
    /// The UI thread was still busy with an earlier update; this one was discarded.
    Dropped,
    /// The [`UiReceiver`] is gone.
    Disconnected,
}

/// The sending half, owned by the frame-processing thread.
pub struct UiSender {
    inner: channel::Sender<UiState>,
    dropped: u64,
}

impl UiSender {
    /// Posts an update to the UI thread without blocking.
    pub fn post(&mut self, state: UiState) -> Posted {
        match self.inner.try_send(state) {
            Ok(()) => Posted::Delivered,
            Err(TrySendError::Full(_)) => {
                self.dropped += 1;
                log::trace!("UI busy, dropped update ({} total)", self.dropped);
                Posted::Dropped
            }
            Err(TrySendError::Disconnected(_)) => Posted::Disconnected,
        }
    }

    /// Returns the number of updates dropped because the UI thread was busy.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

/// The receiving half, owned by the UI thread.
pub struct UiReceiver {
    inner: channel::Receiver<UiState>,
}

impl UiReceiver {
    /// Returns the most recent pending update, if any, without blocking.
    pub fn latest(&self) -> Option<UiState> {
        self.inner.try_iter().last()
    }

    /// Waits up to `timeout` for the next update.
    ///
    /// Returns [`RecvTimeoutError::Disconnected`] once the [`UiSender`] has been dropped and all
    /// pending updates have been received.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<UiState, RecvTimeoutError> {
        self.inner.recv_timeout(timeout)
    }
}

#[cfg(test)]
mod tests {
    use crate::decision::Point;

    use super::*;

    fn state(label: &str) -> UiState {
        UiState {
            label: label.to_string(),
            points: vec![Point::new(1.0, 2.0)],
        }
    }

    #[test]
    fn drops_when_ui_is_busy() {
        let (mut tx, rx) = channel();
        assert_eq!(tx.post(state("Left")), Posted::Delivered);
        assert_eq!(tx.post(state("Right")), Posted::Dropped);
        assert_eq!(tx.dropped(), 1);

        assert_eq!(rx.latest(), Some(state("Left")));
        assert_eq!(rx.latest(), None);

        assert_eq!(tx.post(state("Right")), Posted::Delivered);
        assert_eq!(
            rx.recv_timeout(Duration::from_millis(10)),
            Ok(state("Right"))
        );
        assert_eq!(
            rx.recv_timeout(Duration::from_millis(1)),
            Err(RecvTimeoutError::Timeout)
        );
    }

    #[test]
    fn disconnect() {
        let (mut tx, rx) = channel();
        tx.post(UiState::no_hand());
        drop(tx);
        assert_eq!(rx.latest(), Some(UiState::no_hand()));
        assert_eq!(
            rx.recv_timeout(Duration::from_millis(1)),
            Err(RecvTimeoutError::Disconnected)
        );

        let (mut tx, rx) = channel();
        drop(rx);
        assert_eq!(tx.post(UiState::no_hand()), Posted::Disconnected);
    }

    #[test]
    fn post_from_other_thread() {
        let (mut tx, rx) = channel();
        std::thread::spawn(move || {
            tx.post(state("Left"));
        })
        .join()
        .unwrap();
        assert_eq!(rx.latest(), Some(state("Left")));
    }
}
