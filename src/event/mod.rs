//! Readiness-driven event plumbing.
//!
//! Every background producer (socket reader, DCC worker, signal listener,
//! stdin reader) owns a [`Producer`] that pushes an owned event onto an
//! unbounded [`Queue`] and then rings a one-byte doorbell. The
//! [`Multiplexer`] waits on the doorbells and runs exactly one handler per
//! wake; the handler drains the matching queue on the consumer's thread.

pub mod doorbell;
pub mod multiplexer;
pub mod queue;

pub use doorbell::{Bell, Silenced};
pub use multiplexer::{Handle, Multiplexer, SourceId};
pub use queue::{queue, Producer, Queue};

use thiserror::Error;

/// Fatal multiplexer failures. Either one ends [`Multiplexer::run`].
#[derive(Debug, Error)]
pub enum Error {
    /// A handler returned an error while draining its source.
    #[error("handler for source {id} failed: {error:#}")]
    Handler { id: SourceId, error: anyhow::Error },

    /// A registered bell lost every producer, so its source is unusable.
    #[error("source {0} can no longer be drained: {1}")]
    Drain(SourceId, Silenced),
}
