//! Single-threaded readiness multiplexer.
//!
//! Sources are doorbells paired with a handler. [`Multiplexer::run`] waits
//! until the control source or any registered bell is ready and then runs
//! exactly one handler before waiting again. Handlers receive the consumer
//! state explicitly, so everything they touch is owned by the thread that
//! drives `run`.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::future::poll_fn;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use super::doorbell::{Bell, Silenced};
use super::Error;

pub type SourceId = usize;

/// Work to run when a source becomes ready.
pub trait Handler<S>: Send {
    fn on_ready(&mut self, state: &mut S) -> anyhow::Result<()>;
}

impl<S, F> Handler<S> for F
where
    F: FnMut(&mut S) -> anyhow::Result<()> + Send,
{
    fn on_ready(&mut self, state: &mut S) -> anyhow::Result<()> {
        self(state)
    }
}

enum Control<S> {
    Stop,
    Register(SourceId, Bell, Box<dyn Handler<S>>),
    Unregister(SourceId),
}

struct Source<S> {
    id: SourceId,
    bell: Bell,
    handler: Box<dyn Handler<S>>,
}

enum Ready<S> {
    Control(Control<S>),
    Source(usize),
    Silenced(usize),
}

/// Thread-safe control handle for a [`Multiplexer`].
pub struct Handle<S> {
    control: mpsc::UnboundedSender<Control<S>>,
    ids: Arc<AtomicUsize>,
}

impl<S> Clone for Handle<S> {
    fn clone(&self) -> Self {
        Self {
            control: self.control.clone(),
            ids: self.ids.clone(),
        }
    }
}

impl<S> Handle<S> {
    /// Ask the loop to stop. Safe from any thread; no handler runs once the
    /// request has been observed.
    pub fn stop(&self) {
        let _ = self.control.send(Control::Stop);
    }

    /// Register a source with a running (or not yet running) loop.
    pub fn register<H>(&self, bell: Bell, handler: H) -> SourceId
    where
        H: Handler<S> + 'static,
    {
        let id = self.ids.fetch_add(1, Ordering::Relaxed);
        let _ = self
            .control
            .send(Control::Register(id, bell, Box::new(handler)));
        id
    }

    pub fn unregister(&self, id: SourceId) {
        let _ = self.control.send(Control::Unregister(id));
    }
}

pub struct Multiplexer<S> {
    sources: Vec<Source<S>>,
    control: mpsc::UnboundedReceiver<Control<S>>,
    handle: Handle<S>,
    // Index of the source to poll first, so a busy source cannot starve the rest.
    cursor: usize,
    running: bool,
}

impl<S> Default for Multiplexer<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> Multiplexer<S> {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            sources: Vec::new(),
            control: rx,
            handle: Handle {
                control: tx,
                ids: Arc::new(AtomicUsize::new(0)),
            },
            cursor: 0,
            running: false,
        }
    }

    pub fn handle(&self) -> Handle<S> {
        self.handle.clone()
    }

    pub fn register<H>(&mut self, bell: Bell, handler: H) -> SourceId
    where
        H: Handler<S> + 'static,
    {
        let id = self.handle.ids.fetch_add(1, Ordering::Relaxed);
        self.insert(id, bell, Box::new(handler));
        id
    }

    /// Dispatch until stopped. A handler error or a source that can no longer
    /// be drained is fatal and ends the loop.
    pub async fn run(&mut self, state: &mut S) -> Result<(), Error> {
        self.running = true;
        info!(sources = self.sources.len(), "Event loop started");

        let result = self.dispatch_until_stopped(state).await;

        self.running = false;
        match &result {
            Ok(()) => info!("Event loop stopped"),
            Err(e) => error!("Event loop aborted: {e}"),
        }
        result
    }

    async fn dispatch_until_stopped(&mut self, state: &mut S) -> Result<(), Error> {
        while self.running {
            match poll_fn(|cx| self.poll_ready(cx)).await {
                Ready::Control(control) => {
                    self.apply(control);
                    // Apply everything else already posted in one go.
                    while let Ok(control) = self.control.try_recv() {
                        self.apply(control);
                    }
                }
                Ready::Source(index) => self.dispatch(index, state)?,
                Ready::Silenced(index) => {
                    return Err(Error::Drain(self.sources[index].id, Silenced));
                }
            }
        }
        Ok(())
    }

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Ready<S>> {
        // The control source always wins so a pending stop is never outrun.
        if let Poll::Ready(Some(control)) = self.control.poll_recv(cx) {
            return Poll::Ready(Ready::Control(control));
        }

        let count = self.sources.len();
        for offset in 0..count {
            let index = (self.cursor + offset) % count;
            match self.sources[index].bell.poll_ring(cx) {
                Poll::Ready(Ok(())) => {
                    self.cursor = (index + 1) % count;
                    return Poll::Ready(Ready::Source(index));
                }
                Poll::Ready(Err(Silenced)) => return Poll::Ready(Ready::Silenced(index)),
                Poll::Pending => {}
            }
        }
        Poll::Pending
    }

    fn dispatch(&mut self, index: usize, state: &mut S) -> Result<(), Error> {
        let source = &mut self.sources[index];
        let id = source.id;

        // Residual bytes go first: anything pushed while the handler drains
        // its queue rings again and gets its own wake.
        source.bell.drain().map_err(|e| Error::Drain(id, e))?;

        source
            .handler
            .on_ready(state)
            .map_err(|error| Error::Handler { id, error })
    }

    fn apply(&mut self, control: Control<S>) {
        match control {
            Control::Stop => {
                debug!("Stop requested");
                self.running = false;
            }
            Control::Register(id, bell, handler) => self.insert(id, bell, handler),
            Control::Unregister(id) => self.remove(id),
        }
    }

    fn insert(&mut self, id: SourceId, bell: Bell, handler: Box<dyn Handler<S>>) {
        debug!(source = id, "Source registered");
        self.sources.push(Source { id, bell, handler });
    }

    fn remove(&mut self, id: SourceId) {
        if let Some(index) = self.sources.iter().position(|s| s.id == id) {
            debug!(source = id, "Source unregistered");
            self.sources.remove(index);
            if self.cursor >= self.sources.len() {
                self.cursor = 0;
            }
        }
    }
}
