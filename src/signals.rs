//! OS signals as an event source.

use std::io;

use tokio::signal::unix::{signal, SignalKind};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::event::queue::Drain;
use crate::event::{queue, Bell, Queue};

/// Operating system signal.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Signal {
    /// `SIGINT`.
    Interrupt,
    /// `SIGTERM`.
    Terminate,
    /// `SIGHUP`.
    Hangup,
    /// `SIGWINCH`.
    WindowChanged,
}

impl Signal {
    /// Whether the signal asks the process to leave.
    pub fn is_quit(self) -> bool {
        !matches!(self, Self::WindowChanged)
    }
}

pub struct Signals {
    inbox: Queue<Signal>,
    bell: Option<Bell>,
    task: JoinHandle<()>,
}

impl Signals {
    /// Install handlers for the signals of interest. Must be called inside
    /// a runtime.
    pub fn install() -> io::Result<Self> {
        let mut interrupt = signal(SignalKind::interrupt())?;
        let mut terminate = signal(SignalKind::terminate())?;
        let mut hangup = signal(SignalKind::hangup())?;
        let mut window = signal(SignalKind::window_change())?;
        let (producer, inbox, bell) = queue();

        let task = tokio::spawn(async move {
            loop {
                let received = tokio::select! {
                    Some(()) = interrupt.recv() => Signal::Interrupt,
                    Some(()) = terminate.recv() => Signal::Terminate,
                    Some(()) = hangup.recv() => Signal::Hangup,
                    Some(()) = window.recv() => Signal::WindowChanged,
                    else => break,
                };
                debug!(signal = ?received, "Signal received");
                if !producer.push(received) {
                    break;
                }
            }
        });

        Ok(Self {
            inbox,
            bell: Some(bell),
            task,
        })
    }

    pub fn bell(&mut self) -> Option<Bell> {
        self.bell.take()
    }

    pub fn drain(&mut self) -> Drain<'_, Signal> {
        self.inbox.drain()
    }
}

impl Drop for Signals {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn only_window_change_is_not_a_quit() {
        assert!(Signal::Interrupt.is_quit());
        assert!(Signal::Terminate.is_quit());
        assert!(Signal::Hangup.is_quit());
        assert!(!Signal::WindowChanged.is_quit());
    }

    #[tokio::test]
    async fn window_change_is_queued() {
        let mut signals = Signals::install().unwrap();
        let mut bell = signals.bell().unwrap();

        let status = std::process::Command::new("kill")
            .args(["-WINCH", &std::process::id().to_string()])
            .status()
            .unwrap();
        assert!(status.success());

        tokio::time::timeout(Duration::from_secs(2), bell.wait())
            .await
            .expect("signal should ring the bell")
            .unwrap();
        let received: Vec<Signal> = signals.drain().collect();
        assert!(received.contains(&Signal::WindowChanged));
    }
}
