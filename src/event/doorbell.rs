//! One-byte wake signals.
//!
//! A [`Ring`] is cloned into producers; the matching [`Bell`] is handed to the
//! multiplexer. Each ring deposits a single byte. The byte carries no payload;
//! the data lives in the queue the bell is paired with.

use std::task::{Context, Poll};

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;

const WAKE: u8 = 1;

/// Create a connected ring/bell pair.
pub fn doorbell() -> (Ring, Bell) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Ring { tx }, Bell { rx })
}

/// Every [`Ring`] for this bell has been dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("doorbell has no producers left")]
pub struct Silenced;

/// Producer half of a doorbell.
#[derive(Debug, Clone)]
pub struct Ring {
    tx: mpsc::UnboundedSender<u8>,
}

impl Ring {
    /// Deposit one wake byte. Returns `false` once the bell is gone.
    pub fn ring(&self) -> bool {
        self.tx.send(WAKE).is_ok()
    }
}

/// Consumer half of a doorbell, polled only by the multiplexer.
#[derive(Debug)]
pub struct Bell {
    rx: mpsc::UnboundedReceiver<u8>,
}

impl Bell {
    /// Poll for one wake byte, consuming it.
    pub(crate) fn poll_ring(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Silenced>> {
        match self.rx.poll_recv(cx) {
            Poll::Ready(Some(_)) => Poll::Ready(Ok(())),
            Poll::Ready(None) => Poll::Ready(Err(Silenced)),
            Poll::Pending => Poll::Pending,
        }
    }

    /// Wait for the next ring. The multiplexer polls instead.
    #[cfg(test)]
    pub async fn wait(&mut self) -> Result<(), Silenced> {
        futures::future::poll_fn(|cx| self.poll_ring(cx)).await
    }

    /// Consume any residual wake bytes without blocking and return how many
    /// were discarded.
    pub fn drain(&mut self) -> Result<usize, Silenced> {
        let mut drained = 0;
        loop {
            match self.rx.try_recv() {
                Ok(_) => drained += 1,
                Err(TryRecvError::Empty) => return Ok(drained),
                Err(TryRecvError::Disconnected) => return Err(Silenced),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drain_counts_residual_bytes() {
        let (ring, mut bell) = doorbell();
        assert!(ring.ring());
        assert!(ring.ring());
        assert!(ring.ring());
        assert_eq!(bell.drain(), Ok(3));
        assert_eq!(bell.drain(), Ok(0));
    }

    #[test]
    fn drain_reports_lost_producers() {
        let (ring, mut bell) = doorbell();
        ring.ring();
        drop(ring);
        // Bytes already deposited are still consumed before the failure.
        assert_eq!(bell.drain(), Err(Silenced));
    }

    #[test]
    fn ring_fails_without_bell() {
        let (ring, bell) = doorbell();
        drop(bell);
        assert!(!ring.ring());
    }

    #[tokio::test]
    async fn wait_wakes_on_ring_from_another_thread() {
        let (ring, mut bell) = doorbell();
        let thread = std::thread::spawn(move || {
            ring.ring();
        });
        assert_eq!(bell.wait().await, Ok(()));
        thread.join().unwrap();
    }
}
