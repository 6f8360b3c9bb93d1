//! Unbounded event queues paired with a doorbell.

use tokio::sync::mpsc;

use super::doorbell::{doorbell, Bell, Ring};

/// Create a queue. The [`Producer`] goes to the background task, the
/// [`Queue`] stays with the component, and the [`Bell`] is registered with
/// the multiplexer.
pub fn queue<T>() -> (Producer<T>, Queue<T>, Bell) {
    let (tx, rx) = mpsc::unbounded_channel();
    let (ring, bell) = doorbell();
    (
        Producer {
            tx,
            ring: ring.clone(),
        },
        Queue { rx, _ring: ring },
        bell,
    )
}

/// Sending half. Pushing never blocks.
#[derive(Debug)]
pub struct Producer<T> {
    tx: mpsc::UnboundedSender<T>,
    ring: Ring,
}

impl<T> Clone for Producer<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            ring: self.ring.clone(),
        }
    }
}

impl<T> Producer<T> {
    /// Enqueue an event and raise one wake signal. Returns `false` if the
    /// queue has been dropped.
    pub fn push(&self, event: T) -> bool {
        if self.tx.send(event).is_err() {
            return false;
        }
        self.ring.ring();
        true
    }
}

/// Receiving half, drained by the consumer without blocking.
///
/// The queue keeps a ring of its own so that its bell only reports lost
/// producers once the queue itself is gone.
#[derive(Debug)]
pub struct Queue<T> {
    rx: mpsc::UnboundedReceiver<T>,
    _ring: Ring,
}

impl<T> Queue<T> {
    /// Take the oldest pending event, if any.
    pub fn pop(&mut self) -> Option<T> {
        self.rx.try_recv().ok()
    }

    /// Iterate over everything pending right now, oldest first.
    pub fn drain(&mut self) -> Drain<'_, T> {
        Drain { queue: self }
    }
}

pub struct Drain<'a, T> {
    queue: &'a mut Queue<T>,
}

impl<T> Iterator for Drain<'_, T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        self.queue.pop()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drain_preserves_arrival_order() {
        let (producer, mut queue, mut bell) = queue();
        let other = producer.clone();
        producer.push("one");
        other.push("two");
        producer.push("three");

        let events: Vec<_> = queue.drain().collect();
        assert_eq!(events, vec!["one", "two", "three"]);
        assert_eq!(bell.drain(), Ok(3));
        assert!(queue.pop().is_none());
    }

    #[test]
    fn bell_survives_producers_while_queue_lives() {
        let (producer, queue, mut bell) = queue::<u8>();
        producer.push(7);
        drop(producer);
        assert_eq!(bell.drain(), Ok(1));

        drop(queue);
        assert!(bell.drain().is_err());
    }

    #[test]
    fn push_fails_after_queue_dropped() {
        let (producer, queue, _bell) = queue::<u8>();
        drop(queue);
        assert!(!producer.push(1));
    }
}
