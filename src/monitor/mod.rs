// Copyright 2025 Chris Custine
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! The stateful monitoring engine.
//!
//! A [`Monitor`] owns one platform handle, serializes raw flag observations
//! on a dedicated worker task, performs change detection against the cached
//! flags, and hands classified status changes to the delivery context where
//! observers run. The monitor is a cloneable handle; the engine stops when
//! the last clone is dropped or when [`Monitor::stop`] is called.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use log::{info, warn};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::dispatch::{DeliveryExecutor, SerialDelivery};
use crate::flags::{classify, FlagSet, Status};
use crate::observer::{ObserverRegistry, Subscription};
use crate::platform::{open, OpenError, ReachabilityHandle, ReachabilityProvider, Target};

/// Errors surfaced by monitor construction and [`Monitor::start`].
#[derive(Debug, Error)]
pub enum MonitorError {
    /// Platform handle acquisition failed.
    #[error(transparent)]
    Open(#[from] OpenError),

    /// The platform refused to install the flag-change callout.
    #[error("failed to install the flag-change callout")]
    CalloutInstall,

    /// The platform refused to bind flag delivery to the worker queue.
    #[error("failed to bind the reachability worker queue")]
    QueueBind,
}

/// Configuration for a [`Monitor`].
#[derive(Clone)]
pub struct MonitorConfig {
    /// What to monitor.
    pub target: Target,
    /// Environment fact: whether this process runs on physical hardware.
    /// Emulated environments never classify as [`Status::Cellular`].
    pub is_physical_device: bool,
    /// Whether a cellular route counts as reachable. Default `true`.
    pub treat_cellular_as_reachable: bool,
    /// Delivery context for observer callbacks. `None` spawns a dedicated
    /// [`SerialDelivery`] task.
    pub delivery: Option<Arc<dyn DeliveryExecutor>>,
}

impl std::fmt::Debug for MonitorConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MonitorConfig")
            .field("target", &self.target)
            .field("is_physical_device", &self.is_physical_device)
            .field("treat_cellular_as_reachable", &self.treat_cellular_as_reachable)
            .finish_non_exhaustive()
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            target: Target::default(),
            is_physical_device: true,
            treat_cellular_as_reachable: true,
            delivery: None,
        }
    }
}

/// A raw observation queued for the serial worker.
enum RawEvent {
    /// Synthetic initial check scheduled by `start()`; reads the current
    /// flags from the handle and is treated as changed unconditionally.
    Initial,
    /// Flags delivered by the platform callout.
    Flags(FlagSet),
}

struct MonitorInner {
    target: Target,
    ipv6: bool,
    handle: Arc<dyn ReachabilityHandle>,
    is_physical_device: bool,
    treat_cellular_as_reachable: Arc<AtomicBool>,
    last_flags: Arc<Mutex<FlagSet>>,
    running: AtomicBool,
    /// Cancellation token for the current run; `Some` while running.
    run: Mutex<Option<CancellationToken>>,
    observers: Arc<ObserverRegistry>,
    delivery: Arc<dyn DeliveryExecutor>,
}

/// Host reachability monitor.
///
/// Constructed via [`Monitor::spawn`], which acquires the platform handle
/// and starts monitoring immediately. Clones share the same engine.
#[derive(Clone)]
pub struct Monitor {
    inner: Arc<MonitorInner>,
}

impl std::fmt::Debug for Monitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Monitor")
            .field("target", &self.inner.target)
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

impl Monitor {
    /// Acquire a platform handle for the configured target and start
    /// monitoring.
    ///
    /// Fails if the target cannot be acquired or if either collaborator
    /// registration step is refused; on a registration failure the partial
    /// registration is torn down before returning. Must be called from
    /// within a tokio runtime.
    pub fn spawn(
        config: MonitorConfig,
        provider: Arc<dyn ReachabilityProvider>,
    ) -> Result<Self, MonitorError> {
        let opened = open(provider.as_ref(), &config.target)?;
        let delivery: Arc<dyn DeliveryExecutor> = match config.delivery {
            Some(delivery) => delivery,
            None => SerialDelivery::spawn(),
        };

        let monitor = Self {
            inner: Arc::new(MonitorInner {
                target: config.target,
                ipv6: opened.ipv6,
                handle: opened.handle,
                is_physical_device: config.is_physical_device,
                treat_cellular_as_reachable: Arc::new(AtomicBool::new(
                    config.treat_cellular_as_reachable,
                )),
                last_flags: Arc::new(Mutex::new(FlagSet::empty())),
                running: AtomicBool::new(false),
                run: Mutex::new(None),
                observers: Arc::new(ObserverRegistry::new()),
                delivery,
            }),
        };
        monitor.start()?;
        Ok(monitor)
    }

    /// Begin monitoring. No-op when already running; permitted again after
    /// [`stop`](Self::stop).
    pub fn start(&self) -> Result<(), MonitorError> {
        let inner = &self.inner;
        let mut run = inner.run.lock().unwrap();
        if run.is_some() {
            return Ok(());
        }

        let (raw_tx, raw_rx) = mpsc::unbounded_channel();

        let callout_tx = raw_tx.clone();
        let installed = inner.handle.install_callout(Box::new(move |flags| {
            let _ = callout_tx.send(RawEvent::Flags(flags));
        }));
        if !installed {
            inner.deregister();
            return Err(MonitorError::CalloutInstall);
        }
        if !inner.handle.bind_worker() {
            inner.deregister();
            return Err(MonitorError::QueueBind);
        }

        let cancel = CancellationToken::new();
        let worker = Worker {
            handle: Arc::clone(&inner.handle),
            last_flags: Arc::clone(&inner.last_flags),
            observers: Arc::clone(&inner.observers),
            delivery: Arc::clone(&inner.delivery),
            is_physical_device: inner.is_physical_device,
            treat_cellular_as_reachable: Arc::clone(&inner.treat_cellular_as_reachable),
        };
        tokio::spawn(worker_loop(raw_rx, cancel.clone(), worker));

        // Synthetic initial check so subscribers immediately learn the
        // starting status.
        let _ = raw_tx.send(RawEvent::Initial);

        *run = Some(cancel);
        inner.running.store(true, Ordering::SeqCst);
        info!("Started monitoring {}", inner.target);
        Ok(())
    }

    /// Stop monitoring.
    ///
    /// Idempotent and infallible. After this returns no further
    /// notifications are scheduled; notifications already queued on the
    /// delivery context may still fire.
    pub fn stop(&self) {
        self.inner.stop();
    }

    /// Whether the monitor is currently running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    /// The monitored target.
    #[must_use]
    pub fn target(&self) -> &Target {
        &self.inner.target
    }

    /// Whether the zero-route handle was created for IPv6. Diagnostic only.
    #[must_use]
    pub fn is_ipv6_route(&self) -> bool {
        self.inner.ipv6
    }

    /// Snapshot of the most recently observed flags.
    #[must_use]
    pub fn current_flags(&self) -> FlagSet {
        *self.inner.last_flags.lock().unwrap()
    }

    /// Classification of the most recently observed flags.
    #[must_use]
    pub fn current_status(&self) -> Status {
        classify(
            self.current_flags(),
            self.inner.is_physical_device,
            self.inner.treat_cellular_as_reachable.load(Ordering::SeqCst),
        )
    }

    /// Whether the target is currently reachable at all.
    #[must_use]
    pub fn is_reachable(&self) -> bool {
        self.current_status().is_reachable()
    }

    /// Whether the target is currently reachable over a non-cellular route.
    #[must_use]
    pub fn is_reachable_via_wifi(&self) -> bool {
        self.current_status() == Status::Wifi
    }

    /// Whether the target is currently reachable over the cellular route.
    #[must_use]
    pub fn is_reachable_via_cellular(&self) -> bool {
        self.current_status() == Status::Cellular
    }

    /// Whether cellular routes count as reachable.
    #[must_use]
    pub fn treat_cellular_as_reachable(&self) -> bool {
        self.inner.treat_cellular_as_reachable.load(Ordering::SeqCst)
    }

    /// Change the cellular policy. Affects classification of subsequent
    /// observations and [`current_status`](Self::current_status) reads; it
    /// does not re-notify observers for flags already seen.
    pub fn set_treat_cellular_as_reachable(&self, value: bool) {
        self.inner
            .treat_cellular_as_reachable
            .store(value, Ordering::SeqCst);
    }

    /// Register a status observer, invoked on the delivery context for every
    /// detected change.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(Status) + Send + Sync + 'static,
    {
        self.inner.observers.subscribe(callback)
    }
}

impl MonitorInner {
    fn stop(&self) {
        let cancel = self.run.lock().unwrap().take();
        if let Some(cancel) = cancel {
            cancel.cancel();
        }
        self.deregister();
        if self.running.swap(false, Ordering::SeqCst) {
            info!("Stopped monitoring {}", self.target);
        }
    }

    /// Undo collaborator registration. Deregistration cannot fail from the
    /// caller's point of view; there is no corrective action to take.
    fn deregister(&self) {
        self.handle.clear_callout();
        self.handle.unbind_worker();
    }
}

impl Drop for MonitorInner {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Everything the serial worker needs, detached from `MonitorInner` so the
/// worker task does not keep the monitor alive.
struct Worker {
    handle: Arc<dyn ReachabilityHandle>,
    last_flags: Arc<Mutex<FlagSet>>,
    observers: Arc<ObserverRegistry>,
    delivery: Arc<dyn DeliveryExecutor>,
    is_physical_device: bool,
    treat_cellular_as_reachable: Arc<AtomicBool>,
}

impl Worker {
    /// Runs on the serial worker context only; `last_flags` is mutated
    /// nowhere else.
    fn process(&self, event: RawEvent) {
        let (new_flags, forced) = match event {
            RawEvent::Initial => {
                let flags = self.handle.current_flags().unwrap_or_else(|| {
                    warn!("Failed to read reachability flags, treating target as unreachable");
                    FlagSet::empty()
                });
                (flags, true)
            }
            RawEvent::Flags(flags) => (flags, false),
        };

        {
            let mut last = self.last_flags.lock().unwrap();
            if !forced && *last == new_flags {
                return;
            }
            *last = new_flags;
        }

        let status = classify(
            new_flags,
            self.is_physical_device,
            self.treat_cellular_as_reachable.load(Ordering::SeqCst),
        );
        info!("Reachability changed to {} [{}]", status, new_flags);

        let observers = Arc::clone(&self.observers);
        self.delivery.dispatch(Box::new(move || observers.notify(status)));
    }
}

async fn worker_loop(
    mut raw_rx: mpsc::UnboundedReceiver<RawEvent>,
    cancel: CancellationToken,
    worker: Worker,
) {
    loop {
        tokio::select! {
            () = cancel.cancelled() => return,
            event = raw_rx.recv() => {
                match event {
                    Some(event) => worker.process(event),
                    None => return,
                }
            }
        }
    }
}
