//! Handle to an instance running in the background.

use crate::instance::{Event, Instance};
use crate::observer::{CallbackId, HookId};
use std::sync::mpsc::{self, Sender};
use tidal_core::{Error, Result, Tuple};
use tidal_incremental::Evaluator;

/// Talks to an instance ticking on its own thread. Work handed to the
/// controller runs on that thread between ticks, and is followed by a tick.
#[derive(Clone)]
pub struct Controller {
    instance: Instance,
    events: Sender<Event>,
}

impl Controller {
    pub(crate) fn new(instance: Instance, events: Sender<Event>) -> Self {
        Self { instance, events }
    }

    pub fn instance(&self) -> &Instance {
        &self.instance
    }

    /// Runs `f` on the ticking thread, then ticks. Blocks until the tick is
    /// done and returns what `f` returned, or the tick's error.
    pub fn sync_do<R, F>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&mut Evaluator) -> R + Send + 'static,
        R: Send + 'static,
    {
        let (value_tx, value_rx) = mpsc::sync_channel(1);
        let (reply, ticked) = mpsc::sync_channel(1);
        let work = Box::new(move |ev: &mut Evaluator| {
            let _ = value_tx.send(f(ev));
        });
        self.events
            .send(Event::Run {
                work,
                reply: Some(reply),
            })
            .map_err(|_| Error::Shutdown)?;
        ticked.recv().map_err(|_| Error::Shutdown)??;
        value_rx.recv().map_err(|_| Error::Shutdown)
    }

    /// Like [`sync_do`](Self::sync_do) but returns at once. Work items run in
    /// the order they were handed over.
    pub fn async_do<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&mut Evaluator) + Send + 'static,
    {
        self.events
            .send(Event::Run {
                work: Box::new(f),
                reply: None,
            })
            .map_err(|_| Error::Shutdown)
    }

    /// Stops the instance; see [`Instance::stop`].
    pub fn stop(&self) -> Result<()> {
        self.instance.stop()
    }

    pub fn register_callback<F>(&self, collection: &str, f: F) -> Result<CallbackId>
    where
        F: FnMut(&[Tuple]) + Send + 'static,
    {
        self.instance.register_callback(collection, f)
    }

    pub fn unregister_callback(&self, id: CallbackId) -> Result<()> {
        self.instance.unregister_callback(id)
    }

    pub fn on_shutdown<F>(&self, f: F) -> Result<HookId>
    where
        F: FnOnce() + Send + 'static,
    {
        self.instance.on_shutdown(f)
    }

    pub fn cancel_shutdown(&self, id: HookId) -> Result<()> {
        self.instance.cancel_shutdown(id)
    }

    /// Inserts `tuples` into `input` and blocks until a tick adds tuples to
    /// `output`; returns the contents of `output` after that tick. Fails
    /// with [`Error::Shutdown`] if the instance stops first.
    pub fn sync_callback(
        &self,
        input: Option<(&str, Vec<Tuple>)>,
        output: &str,
    ) -> Result<Vec<Tuple>> {
        let (tx, rx) = mpsc::channel::<Option<Vec<Tuple>>>();
        let on_gain = tx.clone();
        let cb = self.register_callback(output, move |ts| {
            let _ = on_gain.send(Some(ts.to_vec()));
        })?;
        let hook = match self.on_shutdown(move || {
            let _ = tx.send(None);
        }) {
            Ok(id) => id,
            Err(e) => {
                let _ = self.unregister_callback(cb);
                return Err(e);
            }
        };

        if let Some((name, tuples)) = input {
            let name = String::from(name);
            let inserted = self.sync_do(move |ev| -> Result<()> {
                for t in tuples {
                    ev.insert(&name, t)?;
                }
                Ok(())
            });
            if let Err(e) = inserted.and_then(|r| r) {
                let _ = self.unregister_callback(cb);
                let _ = self.cancel_shutdown(hook);
                return Err(e);
            }
        }

        match rx.recv() {
            Ok(Some(tuples)) => {
                self.unregister_callback(cb)?;
                self.cancel_shutdown(hook)?;
                Ok(tuples)
            }
            _ => Err(Error::Shutdown),
        }
    }

    /// Blocks until a tick adds tuples to `collection` and returns its
    /// contents.
    pub fn delta(&self, collection: &str) -> Result<Vec<Tuple>> {
        self.sync_callback(None, collection)
    }
}
