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

//! Host reachability monitoring library.
//!
//! This library determines whether a network endpoint (a hostname or the
//! default route) is currently reachable, classifies reachability into a
//! small set of connectivity states, and notifies observers whenever the
//! classification changes. It is organized in layers that can be used
//! independently or composed together:
//!
//! - **Flags layer**: raw connectivity flags and the pure classification
//!   function mapping them to a [`Status`]
//! - **Platform layer**: the monitored [`Target`] and the injected
//!   collaborator traits that produce raw flags (the OS-specific bindings
//!   live outside this crate)
//! - **Monitor layer**: the stateful engine — serialized change detection on
//!   a dedicated worker task, observer registry, and ordered notification
//!   delivery on an injectable delivery context
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use reachability_monitor::{Monitor, MonitorConfig, ReachabilityProvider, Target};
//!
//! # fn platform_provider() -> Arc<dyn ReachabilityProvider> { unimplemented!() }
//! #[tokio::main]
//! async fn main() {
//!     let monitor = Monitor::spawn(
//!         MonitorConfig {
//!             target: Target::Hostname("example.com".to_string()),
//!             ..MonitorConfig::default()
//!         },
//!         platform_provider(),
//!     )
//!     .expect("failed to start monitoring");
//!
//!     let subscription = monitor.subscribe(|status| {
//!         println!("connectivity is now {status}");
//!     });
//!
//!     // ... the observer runs on the delivery context for every change ...
//!
//!     subscription.cancel();
//!     monitor.stop();
//! }
//! ```
//!
//! # Concurrency model
//!
//! Raw flag observations for one monitor are serialized on a dedicated
//! worker task, so change detection against the cached flags is race-free.
//! Observer callbacks run on a single delivery context
//! ([`SerialDelivery`] by default, or any injected [`DeliveryExecutor`]),
//! in the order the changes were detected. [`Monitor::current_status`] is a
//! synchronized read, safe from any thread.

pub mod dispatch;
pub mod flags;
pub mod monitor;
pub mod observer;
pub mod platform;

use std::sync::{Mutex, OnceLock};

pub use dispatch::{DeliveryExecutor, InlineDelivery, Job, SerialDelivery};
pub use flags::{classify, FlagSet, Status};
pub use monitor::{Monitor, MonitorConfig, MonitorError};
pub use observer::{ObserverRegistry, Subscription};
pub use platform::{
    open, AddressFamily, FlagCallout, OpenError, OpenedHandle, ReachabilityHandle,
    ReachabilityProvider, Target,
};

static DEFAULT_MONITOR: OnceLock<Mutex<Option<Monitor>>> = OnceLock::new();

fn default_slot() -> &'static Mutex<Option<Monitor>> {
    DEFAULT_MONITOR.get_or_init(|| Mutex::new(None))
}

/// Install a process-wide default monitor.
///
/// Purely a convenience for applications that want one shared monitor
/// without threading it through every call site; the monitoring engine
/// itself never consults this slot. Replacing the default drops the
/// previous handle.
pub fn set_default(monitor: Monitor) {
    *default_slot().lock().unwrap() = Some(monitor);
}

/// Retrieve a handle to the process-wide default monitor, if one is set.
#[must_use]
pub fn default_monitor() -> Option<Monitor> {
    default_slot().lock().unwrap().clone()
}

/// Remove and return the process-wide default monitor.
pub fn take_default() -> Option<Monitor> {
    default_slot().lock().unwrap().take()
}
