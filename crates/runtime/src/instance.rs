//! A running program.
//!
//! An [`Instance`] owns the evaluator of one program together with the
//! resources that surround it: a network endpoint, periodic timers, the
//! stores of persistent collections, callbacks and shutdown hooks. It can be
//! ticked by hand or handed to a background thread with
//! [`Instance::run_background`], which ticks whenever an event arrives.
//!
//! Callbacks and shutdown hooks run on the ticking thread while the instance
//! is locked; they must not call back into the instance.

use crate::controller::Controller;
use crate::inbox::Inbox;
use crate::observer::{CallbackId, HookId, Observers, ShutdownHooks};
use crate::options::{Options, TransportConfig};
use crate::timer::{now_ms, PeriodicTimer};
use crate::transport::{LocalNetwork, Transport, UdpTransport};
use parking_lot::{Condvar, Mutex};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender, SyncSender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tidal_core::{Error, Result, Schema, Tuple, Value};
use tidal_incremental::{
    CollectionKind, Evaluator, Outbound, Program, TickInput, TickOutput, PERIODICS_TBL,
};
use tidal_storage::{Backend, MirrorSet};

/// Process-unique instance identifier.
pub type InstanceId = u64;

static NEXT_INSTANCE: AtomicU64 = AtomicU64::new(1);

/// Work run on the ticking thread before a tick.
pub(crate) type Work = Box<dyn FnOnce(&mut Evaluator) + Send>;

/// Events consumed by the background driver.
pub(crate) enum Event {
    /// Something was delivered to the inbox.
    Wake,
    /// Run `work`, then tick. The tick result goes to `reply`.
    Run {
        work: Work,
        reply: Option<SyncSender<Result<()>>>,
    },
    Stop {
        reply: SyncSender<()>,
    },
}

/// Lifecycle of an instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Lifecycle {
    /// Nothing bound yet.
    Created,
    /// Endpoint bound and stores open.
    Started,
    /// Resources released; terminal.
    Stopped,
}

#[derive(Default)]
struct Done {
    stopped: Mutex<bool>,
    cv: Condvar,
    failure: Mutex<Option<Error>>,
}

impl Done {
    fn signal(&self) {
        *self.stopped.lock() = true;
        self.cv.notify_all();
    }

    fn wait(&self) {
        let mut stopped = self.stopped.lock();
        while !*stopped {
            self.cv.wait(&mut stopped);
        }
    }
}

struct Core {
    options: Options,
    evaluator: Evaluator,
    inbox: Arc<Inbox>,
    postponed: Vec<(String, Tuple)>,
    transport: Option<Box<dyn Transport>>,
    mirrors: MirrorSet,
    timers: Vec<PeriodicTimer>,
    timers_started: bool,
    observers: Observers,
    hooks: ShutdownHooks,
    lifecycle: Lifecycle,
    done: Arc<Done>,
}

impl Core {
    fn start(&mut self) -> Result<()> {
        match self.lifecycle {
            Lifecycle::Started => return Ok(()),
            Lifecycle::Stopped => return Err(Error::Shutdown),
            Lifecycle::Created => {}
        }
        let (ip, port) = (self.options.ip, self.options.port);
        let inbox = self.inbox.clone();
        let transport: Box<dyn Transport> = match &self.options.transport {
            TransportConfig::Loopback => Box::new(LocalNetwork::new().bind(ip, port, inbox)?),
            TransportConfig::Local(net) => Box::new(net.bind(ip, port, inbox)?),
            TransportConfig::Udp => Box::new(UdpTransport::bind(ip, port, inbox)?),
        };
        let addr = transport.local_addr();
        self.transport = Some(transport);
        self.open_stores()?;
        self.lifecycle = Lifecycle::Started;
        tracing::info!(tag = self.options.label(), %addr, "instance started");
        Ok(())
    }

    /// Opens the store of every persistent collection and queues its
    /// contents for the first tick.
    fn open_stores(&mut self) -> Result<()> {
        let schemas: Vec<Schema> = self
            .evaluator
            .catalog()
            .iter()
            .filter(|c| c.kind() == CollectionKind::Persistent)
            .filter_map(|c| c.as_relation())
            .map(|r| r.schema().clone())
            .collect();
        if schemas.is_empty() {
            return Ok(());
        }
        let backend = Backend::from_dir(self.options.dbm_dir.as_deref());
        let mirrors = MirrorSet::open(&backend, &schemas, self.options.truncate_storage)?;
        for (name, tuples) in mirrors.load_all()? {
            if !tuples.is_empty() {
                tracing::debug!(collection = %name, tuples = tuples.len(), "loading stored tuples");
                self.evaluator.preload(&name, tuples)?;
            }
        }
        self.mirrors = mirrors;
        Ok(())
    }

    /// One timer per periodic collection, plus one per `periodics_tbl` row.
    fn start_timers(&mut self) -> Result<()> {
        let mut periods: BTreeMap<String, u64> = self
            .evaluator
            .catalog()
            .iter()
            .filter_map(|c| match c.kind() {
                CollectionKind::Periodic { period_ms } => Some((String::from(c.name()), period_ms)),
                _ => None,
            })
            .collect();
        for row in self.evaluator.contents(PERIODICS_TBL)? {
            match (row.get(0), row.get(1)) {
                (Some(Value::String(name)), Some(Value::Int64(ms)))
                    if *ms > 0 && self.evaluator.catalog().contains(name) =>
                {
                    periods.entry(name.clone()).or_insert(*ms as u64);
                }
                _ => tracing::warn!(?row, "ignoring malformed periodics_tbl row"),
            }
        }
        for (name, ms) in periods {
            let timer = PeriodicTimer::start(&name, Duration::from_millis(ms), self.inbox.clone())?;
            self.timers.push(timer);
        }
        self.timers_started = true;
        Ok(())
    }

    fn tick(&mut self) -> Result<TickOutput> {
        self.start()?;
        let mut inbound = std::mem::take(&mut self.postponed);
        inbound.extend(self.inbox.drain());
        let mut input = TickInput::new(now_ms());
        input.inbound = self.filter_inbound(inbound);

        let out = self.evaluator.tick(input)?;
        if !self.timers_started {
            self.start_timers()?;
        }
        self.send_outbound(&out.outbound);
        self.mirrors.apply(&out.changes)?;
        let evaluator = &self.evaluator;
        self.observers
            .notify(&out.changed, |name| evaluator.contents(name).ok());

        if out.halted {
            tracing::info!(tag = self.options.label(), budtime = out.budtime, "halt requested");
            if let Err(e) = self.shutdown() {
                tracing::warn!(error = %e, "releasing resources after halt failed");
            }
        }
        Ok(out)
    }

    /// Runs the channel filter over inbound channel messages.
    fn filter_inbound(&mut self, inbound: Vec<(String, Tuple)>) -> Vec<(String, Tuple)> {
        let filter = match &self.options.channel_filter {
            Some(f) => f.clone(),
            None => return inbound,
        };
        let mut accepted = Vec::new();
        let mut channels: BTreeMap<String, Vec<Tuple>> = BTreeMap::new();
        for (name, t) in inbound {
            if self.evaluator.catalog().kind(&name) == Some(CollectionKind::Channel) {
                channels.entry(name).or_default().push(t);
            } else {
                accepted.push((name, t));
            }
        }
        for (name, msgs) in channels {
            let (ok, later) = filter(&name, msgs);
            if !later.is_empty() {
                tracing::trace!(collection = %name, postponed = later.len(), "messages postponed");
            }
            accepted.extend(ok.into_iter().map(|t| (name.clone(), t)));
            self.postponed
                .extend(later.into_iter().map(|t| (name.clone(), t)));
        }
        accepted
    }

    /// Hands channel messages to the transport. Messages without an
    /// address loop back into this instance.
    fn send_outbound(&self, outbound: &[Outbound]) {
        for msg in outbound {
            let address = match &msg.address {
                None => {
                    self.inbox.deliver(msg.collection.clone(), msg.tuple.clone());
                    continue;
                }
                Some(a) => a,
            };
            let sent = match &self.transport {
                Some(t) => t.send(address, &msg.collection, &msg.tuple),
                None => Err(Error::Shutdown),
            };
            if let Err(e) = sent {
                tracing::warn!(%address, collection = %msg.collection, error = %e, "message dropped");
            }
        }
        if !outbound.is_empty() {
            tracing::trace!(messages = outbound.len(), "channels flushed");
        }
    }

    /// Releases every resource once: shutdown hooks, timers, the endpoint,
    /// the stores, then post-shutdown hooks.
    fn shutdown(&mut self) -> Result<()> {
        if self.lifecycle == Lifecycle::Stopped {
            return Ok(());
        }
        self.lifecycle = Lifecycle::Stopped;
        self.hooks.run_shutdown();
        for timer in &mut self.timers {
            timer.cancel();
        }
        self.timers.clear();

        let mut first_err = None;
        if let Some(mut transport) = self.transport.take() {
            if let Err(e) = transport.close() {
                first_err.get_or_insert(e);
            }
        }
        if let Err(e) = self.mirrors.close_all() {
            first_err.get_or_insert(e);
        }
        self.inbox.set_waker(None);
        self.hooks.run_post();
        self.done.signal();
        tracing::info!(
            tag = self.options.label(),
            budtime = self.evaluator.budtime(),
            "instance stopped"
        );
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Records a fatal error of a background run and stops.
    fn fail(&mut self, e: Error) {
        tracing::error!(tag = self.options.label(), error = %e, "tick failed, stopping");
        *self.done.failure.lock() = Some(e);
        if let Err(e) = self.shutdown() {
            tracing::warn!(error = %e, "releasing resources failed");
        }
    }
}

struct Driver {
    events: Sender<Event>,
    handle: Option<JoinHandle<()>>,
}

struct Shared {
    id: InstanceId,
    core: Mutex<Core>,
    inbox: Arc<Inbox>,
    driver: Mutex<Option<Driver>>,
    done: Arc<Done>,
}

/// Handle to a program instance. Clones share the instance.
#[derive(Clone)]
pub struct Instance {
    shared: Arc<Shared>,
}

impl Instance {
    /// Wires `program`. Nothing is bound until [`start`](Self::start) or the
    /// first tick.
    pub fn new(program: Program, options: Options) -> Result<Self> {
        let evaluator = Evaluator::new(program, options.eval_config())?;
        let inbox = Inbox::new();
        let done = Arc::new(Done::default());
        let core = Core {
            options,
            evaluator,
            inbox: inbox.clone(),
            postponed: Vec::new(),
            transport: None,
            mirrors: MirrorSet::new(),
            timers: Vec::new(),
            timers_started: false,
            observers: Observers::new(),
            hooks: ShutdownHooks::new(),
            lifecycle: Lifecycle::Created,
            done: done.clone(),
        };
        Ok(Self {
            shared: Arc::new(Shared {
                id: NEXT_INSTANCE.fetch_add(1, Ordering::Relaxed),
                core: Mutex::new(core),
                inbox,
                driver: Mutex::new(None),
                done,
            }),
        })
    }

    pub fn id(&self) -> InstanceId {
        self.shared.id
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.shared.core.lock().lifecycle
    }

    /// True while a background driver is ticking this instance.
    pub fn is_running(&self) -> bool {
        self.shared.driver.lock().is_some() && self.lifecycle() != Lifecycle::Stopped
    }

    /// Binds the endpoint and opens the stores without ticking.
    pub fn start(&self) -> Result<()> {
        self.shared.core.lock().start()
    }

    /// Address of the bound endpoint.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        match &self.shared.core.lock().transport {
            Some(t) => Ok(t.local_addr()),
            None => Err(Error::usage("ip_port called before the instance was started")),
        }
    }

    /// `ip:port` of the bound endpoint, as peers address it.
    pub fn ip_port(&self) -> Result<String> {
        Ok(self.local_addr()?.to_string())
    }

    /// Runs one timestep, starting the instance first if needed.
    pub fn tick(&self) -> Result<TickOutput> {
        self.shared.core.lock().tick()
    }

    /// Number of completed ticks.
    pub fn budtime(&self) -> u64 {
        self.shared.core.lock().evaluator.budtime()
    }

    /// Queues `t` for `collection` as if it had arrived over the network.
    pub fn deliver(&self, collection: impl Into<String>, t: Tuple) {
        self.shared.inbox.deliver(collection, t);
    }

    /// Queues `t` for the next tick.
    pub fn insert(&self, collection: &str, t: Tuple) -> Result<bool> {
        self.shared.core.lock().evaluator.insert(collection, t)
    }

    /// Marks `t` for removal at the next tick.
    pub fn delete(&self, collection: &str, t: Tuple) -> Result<()> {
        self.shared.core.lock().evaluator.delete(collection, t)
    }

    /// Sorted contents of a collection.
    pub fn contents(&self, collection: &str) -> Result<Vec<Tuple>> {
        self.shared.core.lock().evaluator.contents(collection)
    }

    /// Runs `f` against the evaluator while holding the instance.
    pub fn with_evaluator<R>(&self, f: impl FnOnce(&mut Evaluator) -> R) -> R {
        f(&mut self.shared.core.lock().evaluator)
    }

    /// Calls `f` with the contents of `collection` at the end of every tick
    /// in which it gained tuples.
    pub fn register_callback<F>(&self, collection: &str, f: F) -> Result<CallbackId>
    where
        F: FnMut(&[Tuple]) + Send + 'static,
    {
        let mut core = self.shared.core.lock();
        core.evaluator.collection(collection)?;
        Ok(core.observers.register(collection, Box::new(f)))
    }

    pub fn unregister_callback(&self, id: CallbackId) -> Result<()> {
        self.shared.core.lock().observers.unregister(id)
    }

    /// Runs `f` when the instance stops.
    pub fn on_shutdown<F>(&self, f: F) -> Result<HookId>
    where
        F: FnOnce() + Send + 'static,
    {
        let mut core = self.shared.core.lock();
        if core.lifecycle == Lifecycle::Stopped {
            return Err(Error::Shutdown);
        }
        Ok(core.hooks.on_shutdown(Box::new(f)))
    }

    pub fn cancel_shutdown(&self, id: HookId) -> Result<()> {
        self.shared.core.lock().hooks.cancel(id)
    }

    /// Runs `f` after the instance has released its resources.
    pub fn post_shutdown<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let mut core = self.shared.core.lock();
        if core.lifecycle == Lifecycle::Stopped {
            return Err(Error::Shutdown);
        }
        core.hooks.post_shutdown(Box::new(f));
        Ok(())
    }

    /// Ticks on a background thread from now on: once right away, then
    /// after every delivery and every scheduled piece of work.
    pub fn run_background(&self) -> Result<Controller> {
        let mut driver = self.shared.driver.lock();
        if driver.is_some() {
            return Err(Error::usage(
                "run_background called on an already-running instance",
            ));
        }
        let label = {
            let mut core = self.shared.core.lock();
            core.start()?;
            String::from(core.options.label())
        };

        let (events, rx) = mpsc::channel();
        self.shared.inbox.set_waker(Some(events.clone()));
        let shared = self.shared.clone();
        let handle = thread::Builder::new()
            .name(format!("tidal-{}", label))
            .spawn(move || drive(shared, rx))
            .map_err(|e| Error::usage(format!("cannot start driver thread: {}", e)))?;
        *driver = Some(Driver {
            events: events.clone(),
            handle: Some(handle),
        });
        tracing::debug!(tag = %label, "running in background");
        Ok(Controller::new(self.clone(), events))
    }

    /// Runs in the background and blocks until the instance stops. Returns
    /// the error that stopped it, if any.
    pub fn run_foreground(&self) -> Result<()> {
        let controller = self.run_background()?;
        self.shared.done.wait();
        drop(controller);
        self.join_driver();
        match self.shared.done.failure.lock().take() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Stops the instance and waits until its resources are released.
    /// Stopping a stopped instance is a no-op.
    pub fn stop(&self) -> Result<()> {
        let driver = self.shared.driver.lock().take();
        if let Some(mut d) = driver {
            let (reply, stopped) = mpsc::sync_channel(1);
            if d.events.send(Event::Stop { reply }).is_ok() {
                let _ = stopped.recv();
            }
            if let Some(handle) = d.handle.take() {
                if handle.join().is_err() {
                    tracing::warn!(id = self.id(), "driver thread panicked");
                }
            }
        }
        self.shared.core.lock().shutdown()
    }

    fn join_driver(&self) {
        let driver = self.shared.driver.lock().take();
        if let Some(handle) = driver.and_then(|mut d| d.handle.take()) {
            if handle.join().is_err() {
                tracing::warn!(id = self.id(), "driver thread panicked");
            }
        }
    }
}

/// Background loop: one tick per event until stopped.
fn drive(shared: Arc<Shared>, events: Receiver<Event>) {
    {
        // consume anything queued while not running
        let mut core = shared.core.lock();
        if let Err(e) = core.tick() {
            core.fail(e);
            return;
        }
        if core.lifecycle == Lifecycle::Stopped {
            return;
        }
    }
    while let Ok(event) = events.recv() {
        let mut core = shared.core.lock();
        let (result, reply) = match event {
            Event::Wake => {
                if shared.inbox.is_empty() {
                    continue;
                }
                (core.tick().map(|_| ()), None)
            }
            Event::Run { work, reply } => {
                work(&mut core.evaluator);
                (core.tick().map(|_| ()), reply)
            }
            Event::Stop { reply } => {
                if let Err(e) = core.shutdown() {
                    tracing::warn!(error = %e, "releasing resources failed");
                }
                let _ = reply.send(());
                break;
            }
        };
        match (result, reply) {
            (result, Some(reply)) => {
                let _ = reply.send(result);
            }
            (Err(e), None) => {
                core.fail(e);
                break;
            }
            (Ok(()), None) => {}
        }
        if core.lifecycle == Lifecycle::Stopped {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;
    use tidal_core::tuple;
    use tidal_incremental::{Plan, HALT};

    fn counter() -> Program {
        Program::new()
            .unwrap()
            .table("seen", &["n"], &[])
            .unwrap()
            .channel("inbox", &["n"], &[])
            .unwrap()
            .merge_now("seen", Plan::scan("inbox"))
            .unwrap()
    }

    fn wait_for(mut cond: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            thread::sleep(Duration::from_millis(2));
        }
        false
    }

    #[test]
    fn test_manual_ticks() {
        let inst = Instance::new(counter(), Options::default()).unwrap();
        assert_eq!(inst.lifecycle(), Lifecycle::Created);
        assert!(matches!(inst.ip_port(), Err(Error::Usage { .. })));

        inst.deliver("inbox", tuple![1]);
        inst.tick().unwrap();
        assert_eq!(inst.lifecycle(), Lifecycle::Started);
        assert!(inst.ip_port().unwrap().starts_with("127.0.0.1:"));
        assert_eq!(inst.contents("seen").unwrap(), vec![tuple![1]]);
        assert_eq!(inst.budtime(), 1);
        inst.stop().unwrap();
    }

    #[test]
    fn test_callbacks_fire_on_gain() {
        let inst = Instance::new(counter(), Options::default()).unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = seen.clone();
        let id = inst
            .register_callback("seen", move |ts| s.lock().push(ts.len()))
            .unwrap();
        assert!(matches!(
            inst.register_callback("nope", |_| {}),
            Err(Error::CollectionNotFound { .. })
        ));

        inst.deliver("inbox", tuple![1]);
        inst.tick().unwrap();
        inst.tick().unwrap();
        inst.deliver("inbox", tuple![2]);
        inst.tick().unwrap();
        assert_eq!(*seen.lock(), vec![1, 2]);

        inst.unregister_callback(id).unwrap();
        assert!(inst.unregister_callback(id).is_err());
        inst.stop().unwrap();
    }

    #[test]
    fn test_stop_order_and_idempotence() {
        let inst = Instance::new(counter(), Options::default()).unwrap();
        let log = Arc::new(Mutex::new(Vec::new()));
        let l = log.clone();
        inst.post_shutdown(move || l.lock().push("post")).unwrap();
        let l = log.clone();
        inst.on_shutdown(move || l.lock().push("hook")).unwrap();
        let l = log.clone();
        let cancelled = inst.on_shutdown(move || l.lock().push("cancelled")).unwrap();
        inst.cancel_shutdown(cancelled).unwrap();
        assert!(matches!(inst.cancel_shutdown(99), Err(Error::Usage { .. })));

        inst.tick().unwrap();
        inst.stop().unwrap();
        inst.stop().unwrap();
        assert_eq!(*log.lock(), vec!["hook", "post"]);
        assert_eq!(inst.lifecycle(), Lifecycle::Stopped);
        assert!(matches!(inst.tick(), Err(Error::Shutdown)));
        assert!(matches!(inst.on_shutdown(|| {}), Err(Error::Shutdown)));
    }

    #[test]
    fn test_halt_stops_instance() {
        let program = counter()
            .merge_now(
                HALT,
                Plan::scan("seen")
                    .filter(|t, _| Ok(t.values()[0] == Value::Int64(3)))
                    .map(|_, _| Ok(tuple!["done"])),
            )
            .unwrap();
        let inst = Instance::new(program, Options::default()).unwrap();
        inst.deliver("inbox", tuple![1]);
        assert!(!inst.tick().unwrap().halted);
        inst.deliver("inbox", tuple![3]);
        assert!(inst.tick().unwrap().halted);
        assert_eq!(inst.lifecycle(), Lifecycle::Stopped);
    }

    #[test]
    fn test_background_ticks_on_delivery() {
        let inst = Instance::new(counter(), Options::default()).unwrap();
        let ctl = inst.run_background().unwrap();
        assert!(inst.is_running());
        assert!(matches!(inst.run_background(), Err(Error::Usage { .. })));

        inst.deliver("inbox", tuple![5]);
        assert!(wait_for(|| inst.contents("seen").unwrap() == vec![tuple![5]]));
        ctl.stop().unwrap();
        assert!(!inst.is_running());
        assert!(matches!(inst.run_background(), Err(Error::Shutdown)));
    }

    #[test]
    fn test_foreground_returns_after_halt() {
        let program = counter()
            .merge_now(HALT, Plan::scan("inbox").map(|_, _| Ok(tuple!["stop"])))
            .unwrap();
        let inst = Instance::new(program, Options::default()).unwrap();
        let other = inst.clone();
        let t = thread::spawn(move || other.run_foreground());
        assert!(wait_for(|| inst.is_running() || inst.lifecycle() == Lifecycle::Stopped));
        inst.deliver("inbox", tuple![1]);
        t.join().unwrap().unwrap();
        assert_eq!(inst.lifecycle(), Lifecycle::Stopped);
    }

    #[test]
    fn test_background_failure_reported() {
        let program = Program::new()
            .unwrap()
            .table("kv", &["k"], &["v"])
            .unwrap()
            .channel("put", &["k", "v"], &[])
            .unwrap()
            .merge_now("kv", Plan::scan("put"))
            .unwrap();
        let inst = Instance::new(program, Options::default()).unwrap();
        let other = inst.clone();
        let t = thread::spawn(move || other.run_foreground());
        assert!(wait_for(|| inst.is_running()));
        inst.deliver("put", tuple![1, "a"]);
        inst.deliver("put", tuple![1, "b"]);
        let err = t.join().unwrap().unwrap_err();
        assert!(err.root_cause().is_key_constraint());
    }

    #[test]
    fn test_periodic_timer_feeds_collection() {
        let program = Program::new()
            .unwrap()
            .periodic("beat", 5)
            .unwrap()
            .table("beats", &["key", "val"], &[])
            .unwrap()
            .merge_now("beats", Plan::scan("beat"))
            .unwrap();
        let inst = Instance::new(program, Options::default()).unwrap();
        let _ctl = inst.run_background().unwrap();
        assert!(wait_for(|| inst.contents("beats").unwrap().len() >= 2));
        inst.stop().unwrap();
        let n = inst.contents("beats").unwrap().len();
        thread::sleep(Duration::from_millis(30));
        assert_eq!(inst.contents("beats").unwrap().len(), n);
    }

    #[test]
    fn test_channel_filter_postpones() {
        let opts = Options::default().channel_filter(|_, msgs| {
            msgs.into_iter()
                .partition(|t| matches!(t.get(0), Some(Value::Int64(n)) if n % 2 == 0))
        });
        let inst = Instance::new(counter(), opts).unwrap();
        inst.deliver("inbox", tuple![1]);
        inst.deliver("inbox", tuple![2]);
        inst.tick().unwrap();
        assert_eq!(inst.contents("seen").unwrap(), vec![tuple![2]]);
        // odd messages keep being postponed
        inst.tick().unwrap();
        assert_eq!(inst.contents("seen").unwrap(), vec![tuple![2]]);
        assert_eq!(inst.shared.core.lock().postponed.len(), 1);
        inst.stop().unwrap();
    }
}
