//! The module bus.
//!
//! [`Bus`] owns the module registry and a bounded FIFO queue of
//! [`BusMessage`]s. A single dispatcher task drains the queue and routes
//! every message:
//!
//! 1. Broadcast messages go to every registered module.
//! 2. Targeted messages with a wildcard sub identifier go to every module
//!    of that family.
//! 3. Targeted messages with a concrete sub identifier go to the exact
//!    module, or are dropped silently when it is not registered.
//!
//! Each handler runs inside a guarded call: returned errors and panics are
//! logged with the module's identifier and dispatch moves on.
//!
//! # Backpressure
//!
//! [`Bus::publish`] waits while the queue is full. A module that publishes
//! from inside `on_message` while the queue is full stalls the dispatcher
//! that would drain it; such modules should use [`Bus::try_publish`] or hand
//! the message to their own task.
//!
//! ```rust,ignore
//! let bus = Bus::new();
//! bus.start()?;
//! bus.register(Arc::new(PingModule::default())).await?;
//! bus.publish(incoming_chat).await?;
//! bus.stop().await;
//! ```

use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures::FutureExt;
use parking_lot::Mutex;
use tokio::sync::{RwLock, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

use crate::error::{BusError, BusResult};
use crate::ident::ModuleIdentifier;
use crate::message::BusMessage;
use crate::module::BoxedModule;

/// Default capacity of the bus queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

/// Handle to the module bus.
///
/// Cloning is cheap; every clone refers to the same registry and queue.
#[derive(Clone)]
pub struct Bus {
    inner: Arc<BusInner>,
}

struct BusInner {
    /// Registry. Dispatch holds the read lock, (un)registration the write lock.
    modules: RwLock<HashMap<ModuleIdentifier, BoxedModule>>,
    /// Queue producer; taken on stop so the dispatcher drains and exits.
    sender: Mutex<Option<mpsc::Sender<BusMessage>>>,
    /// Queue consumer, until the dispatcher takes it.
    receiver: Mutex<Option<mpsc::Receiver<BusMessage>>>,
    /// Dispatcher task.
    worker: Mutex<Option<JoinHandle<()>>>,
    stopped: AtomicBool,
}

impl Bus {
    /// Creates a bus with the default queue capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_QUEUE_CAPACITY)
    }

    /// Creates a bus whose queue holds at most `capacity` pending messages.
    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        Self {
            inner: Arc::new(BusInner {
                modules: RwLock::new(HashMap::new()),
                sender: Mutex::new(Some(tx)),
                receiver: Mutex::new(Some(rx)),
                worker: Mutex::new(None),
                stopped: AtomicBool::new(false),
            }),
        }
    }

    // =========================================================================
    // Registry
    // =========================================================================

    /// Registers a module, replacing any module under the same identifier.
    ///
    /// The previous occupant's `on_unregister` runs before the new module's
    /// `on_register`. Once registration completes a
    /// [`BusMessage::ModuleRegistered`] announcement is queued if there is room.
    pub async fn register(&self, module: BoxedModule) -> BusResult<()> {
        let ident = module.identifier();
        if ident.is_wildcard() {
            return Err(BusError::WildcardIdentity(ident));
        }
        if self.is_stopped() {
            return Err(BusError::Stopped);
        }

        {
            let mut modules = self.inner.modules.write().await;
            // `stop` may have drained the registry while we waited for the lock.
            if self.is_stopped() {
                return Err(BusError::Stopped);
            }
            if let Some(previous) = modules.remove(&ident) {
                debug!(module = %ident, "Replacing registered module");
                previous.on_unregister().await;
            }
            modules.insert(ident.clone(), Arc::clone(&module));
            module.on_register(self.clone()).await;
        }

        info!(module = %ident, "Registered module");

        if let Err(e) = self.try_publish(BusMessage::ModuleRegistered(ident.clone())) {
            debug!(module = %ident, error = %e, "Registration announcement not queued");
        }

        Ok(())
    }

    /// Unregisters the module under `ident`.
    ///
    /// Returns `false` if no such module was registered.
    pub async fn unregister(&self, ident: &ModuleIdentifier) -> bool {
        let mut modules = self.inner.modules.write().await;
        match modules.remove(ident) {
            Some(module) => {
                module.on_unregister().await;
                info!(module = %ident, "Unregistered module");
                true
            }
            None => false,
        }
    }

    /// Returns `true` if a module is registered under `ident`.
    pub async fn is_registered(&self, ident: &ModuleIdentifier) -> bool {
        self.inner.modules.read().await.contains_key(ident)
    }

    /// Returns the identifiers of all registered modules.
    pub async fn modules(&self) -> Vec<ModuleIdentifier> {
        self.inner.modules.read().await.keys().cloned().collect()
    }

    // =========================================================================
    // Queue
    // =========================================================================

    /// Queues a message for dispatch, waiting while the queue is full.
    pub async fn publish(&self, message: impl Into<BusMessage>) -> BusResult<()> {
        let sender = self.sender()?;
        sender
            .send(message.into())
            .await
            .map_err(|_| BusError::Stopped)
    }

    /// Queues a message without waiting.
    pub fn try_publish(&self, message: impl Into<BusMessage>) -> BusResult<()> {
        let sender = self.sender()?;
        sender.try_send(message.into()).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => BusError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => BusError::Stopped,
        })
    }

    fn sender(&self) -> BusResult<mpsc::Sender<BusMessage>> {
        self.inner.sender.lock().clone().ok_or(BusError::Stopped)
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Spawns the dispatcher task.
    pub fn start(&self) -> BusResult<()> {
        let receiver = self
            .inner
            .receiver
            .lock()
            .take()
            .ok_or(BusError::AlreadyRunning)?;

        let bus = self.clone();
        let handle = tokio::spawn(async move { bus.run_dispatcher(receiver).await });
        *self.inner.worker.lock() = Some(handle);
        Ok(())
    }

    /// Waits for the dispatcher task to exit.
    pub async fn wait(&self) {
        let handle = self.inner.worker.lock().take();
        if let Some(handle) = handle
            && let Err(e) = handle.await
        {
            error!(error = %e, "Bus dispatcher task failed");
        }
    }

    /// Unregisters every module, closes the queue and waits for the dispatcher.
    ///
    /// Messages still queued are drained against the now empty registry.
    /// Calling this from inside a module handler deadlocks.
    pub async fn stop(&self) {
        if self.inner.stopped.swap(true, Ordering::SeqCst) {
            return;
        }

        {
            let mut modules = self.inner.modules.write().await;
            for (ident, module) in modules.drain() {
                module.on_unregister().await;
                info!(module = %ident, "Unregistered module");
            }
        }

        self.inner.sender.lock().take();
        self.wait().await;
        info!("Bus stopped");
    }

    /// Returns `true` once [`Bus::stop`] has been called.
    pub fn is_stopped(&self) -> bool {
        self.inner.stopped.load(Ordering::SeqCst)
    }

    // =========================================================================
    // Dispatch
    // =========================================================================

    async fn run_dispatcher(&self, mut receiver: mpsc::Receiver<BusMessage>) {
        info!("Bus dispatcher started");
        while let Some(message) = receiver.recv().await {
            self.dispatch(&message).await;
        }
        info!("Bus dispatcher exiting");
    }

    async fn dispatch(&self, message: &BusMessage) {
        let modules = self.inner.modules.read().await;

        match message.target() {
            None => {
                for (ident, module) in modules.iter() {
                    deliver(ident, module, message).await;
                }
            }
            Some(target) if target.is_wildcard() => {
                for (ident, module) in modules.iter().filter(|(ident, _)| target.routes_to(ident)) {
                    deliver(ident, module, message).await;
                }
            }
            Some(target) => match modules.get(target) {
                Some(module) => deliver(target, module, message).await,
                None => trace!(module = %target, kind = message.kind(), "No module for target, dropping"),
            },
        }
    }
}

impl Default for Bus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Bus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bus")
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

/// Runs one handler invocation, converting errors and panics into log lines.
async fn deliver(ident: &ModuleIdentifier, module: &BoxedModule, message: &BusMessage) {
    match AssertUnwindSafe(module.on_message(message)).catch_unwind().await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            warn!(module = %ident, kind = message.kind(), error = %format!("{e:#}"), "Module handler failed");
        }
        Err(panic) => {
            error!(module = %ident, kind = message.kind(), fault = %panic_message(&*panic), "Module handler panicked");
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&'static str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
