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

//! Platform boundary: monitored targets and the injected collaborator that
//! produces raw reachability flags.
//!
//! The platform-specific socket/API bindings are not part of this crate. They
//! are modeled as the [`ReachabilityProvider`] / [`ReachabilityHandle`] traits
//! and injected into the monitor, which keeps the engine testable and free of
//! any OS-level dependency.

use std::sync::Arc;

use log::info;
use thiserror::Error;

use crate::flags::FlagSet;

/// IP address family for the zero-route sentinel target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressFamily {
    /// IPv4 (0.0.0.0).
    V4,
    /// IPv6 (::).
    V6,
}

/// What a monitor watches: a named host or the default ("any") route.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Target {
    /// Reachability of a specific hostname.
    Hostname(String),
    /// Reachability of the zero route, i.e. "is any route to the
    /// outside world available". IPv4 is attempted first, then IPv6.
    #[default]
    AnyRoute,
}

impl std::fmt::Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Hostname(hostname) => write!(f, "host '{hostname}'"),
            Self::AnyRoute => f.write_str("zero route"),
        }
    }
}

/// Callback invoked by the platform layer when raw flags change.
pub type FlagCallout = Box<dyn Fn(FlagSet) + Send + Sync>;

/// Factory for platform reachability handles.
pub trait ReachabilityProvider: Send + Sync {
    /// Create a handle monitoring the given hostname.
    ///
    /// Returns `None` if the platform cannot create a handle for the name.
    fn handle_for_hostname(&self, hostname: &str) -> Option<Arc<dyn ReachabilityHandle>>;

    /// Create a handle monitoring the zero address of the given family.
    fn handle_for_any_route(&self, family: AddressFamily) -> Option<Arc<dyn ReachabilityHandle>>;
}

/// A live platform handle for one monitored target.
///
/// Exclusively owned by its monitor for the monitor's lifetime.
pub trait ReachabilityHandle: Send + Sync {
    /// Read the current raw flags.
    ///
    /// Returns `None` when retrieval fails; callers substitute
    /// [`FlagSet::empty`] (classified unreachable) rather than propagate.
    fn current_flags(&self) -> Option<FlagSet>;

    /// Install the flag-change callout. Returns `false` on refusal.
    fn install_callout(&self, callout: FlagCallout) -> bool;

    /// Remove a previously installed callout. Must be safe to call when no
    /// callout is installed.
    fn clear_callout(&self);

    /// Bind flag-change delivery to the monitor's worker queue. Returns
    /// `false` on refusal.
    fn bind_worker(&self) -> bool;

    /// Undo [`bind_worker`](Self::bind_worker). Must be safe to call when
    /// nothing is bound.
    fn unbind_worker(&self);
}

/// Errors from platform handle acquisition.
#[derive(Debug, Error)]
pub enum OpenError {
    #[error("hostname must not be empty")]
    EmptyHostname,

    #[error("no reachability handle for hostname '{0}'")]
    CreationFailed(String),

    #[error("no zero-address reachability handle (attempted {attempted:?})")]
    InitializationFailed { attempted: Vec<AddressFamily> },
}

/// A successfully acquired handle plus acquisition diagnostics.
pub struct OpenedHandle {
    /// The platform handle.
    pub handle: Arc<dyn ReachabilityHandle>,
    /// Whether the zero-route handle was created for IPv6. Diagnostic only;
    /// always `false` for hostname targets.
    pub ipv6: bool,
}

impl std::fmt::Debug for OpenedHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenedHandle")
            .field("ipv6", &self.ipv6)
            .finish_non_exhaustive()
    }
}

/// Acquire a platform handle for the given target.
///
/// Hostname targets delegate to the provider's name-based creation. The
/// zero-route target tries the IPv4 zero address first and falls back to
/// IPv6. No retries happen here; callers decide whether to retry.
pub fn open(
    provider: &dyn ReachabilityProvider,
    target: &Target,
) -> Result<OpenedHandle, OpenError> {
    match target {
        Target::Hostname(hostname) => {
            if hostname.is_empty() {
                return Err(OpenError::EmptyHostname);
            }
            let handle = provider
                .handle_for_hostname(hostname)
                .ok_or_else(|| OpenError::CreationFailed(hostname.clone()))?;
            info!("Acquired reachability handle for host '{}'", hostname);
            Ok(OpenedHandle { handle, ipv6: false })
        }
        Target::AnyRoute => {
            if let Some(handle) = provider.handle_for_any_route(AddressFamily::V4) {
                info!("Acquired zero-route reachability handle (IPv4)");
                return Ok(OpenedHandle { handle, ipv6: false });
            }
            if let Some(handle) = provider.handle_for_any_route(AddressFamily::V6) {
                info!("Acquired zero-route reachability handle (IPv6)");
                return Ok(OpenedHandle { handle, ipv6: true });
            }
            Err(OpenError::InitializationFailed {
                attempted: vec![AddressFamily::V4, AddressFamily::V6],
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    struct NullHandle;

    impl ReachabilityHandle for NullHandle {
        fn current_flags(&self) -> Option<FlagSet> {
            Some(FlagSet::empty())
        }

        fn install_callout(&self, _callout: FlagCallout) -> bool {
            true
        }

        fn clear_callout(&self) {}

        fn bind_worker(&self) -> bool {
            true
        }

        fn unbind_worker(&self) {}
    }

    /// Provider that records which families were attempted and can refuse
    /// each acquisition path independently.
    struct RecordingProvider {
        allow_hostname: bool,
        allow_v4: bool,
        allow_v6: bool,
        attempts: Mutex<Vec<AddressFamily>>,
    }

    impl RecordingProvider {
        fn new(allow_hostname: bool, allow_v4: bool, allow_v6: bool) -> Self {
            Self {
                allow_hostname,
                allow_v4,
                allow_v6,
                attempts: Mutex::new(Vec::new()),
            }
        }
    }

    impl ReachabilityProvider for RecordingProvider {
        fn handle_for_hostname(&self, _hostname: &str) -> Option<Arc<dyn ReachabilityHandle>> {
            self.allow_hostname.then(|| Arc::new(NullHandle) as Arc<dyn ReachabilityHandle>)
        }

        fn handle_for_any_route(
            &self,
            family: AddressFamily,
        ) -> Option<Arc<dyn ReachabilityHandle>> {
            self.attempts.lock().unwrap().push(family);
            let allowed = match family {
                AddressFamily::V4 => self.allow_v4,
                AddressFamily::V6 => self.allow_v6,
            };
            allowed.then(|| Arc::new(NullHandle) as Arc<dyn ReachabilityHandle>)
        }
    }

    #[test]
    fn test_open_hostname() {
        let provider = RecordingProvider::new(true, false, false);
        let opened = open(&provider, &Target::Hostname("example.com".to_string())).unwrap();
        assert!(!opened.ipv6);
    }

    #[test]
    fn test_open_empty_hostname_rejected() {
        let provider = RecordingProvider::new(true, false, false);
        let err = open(&provider, &Target::Hostname(String::new())).unwrap_err();
        assert!(matches!(err, OpenError::EmptyHostname));
    }

    #[test]
    fn test_open_hostname_creation_failure() {
        let provider = RecordingProvider::new(false, false, false);
        let err = open(&provider, &Target::Hostname("example.com".to_string())).unwrap_err();
        match err {
            OpenError::CreationFailed(hostname) => assert_eq!(hostname, "example.com"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_open_any_route_prefers_v4() {
        let provider = RecordingProvider::new(false, true, true);
        let opened = open(&provider, &Target::AnyRoute).unwrap();
        assert!(!opened.ipv6);
        assert_eq!(*provider.attempts.lock().unwrap(), vec![AddressFamily::V4]);
    }

    #[test]
    fn test_open_any_route_falls_back_to_v6() {
        let provider = RecordingProvider::new(false, false, true);
        let opened = open(&provider, &Target::AnyRoute).unwrap();
        assert!(opened.ipv6);
        assert_eq!(
            *provider.attempts.lock().unwrap(),
            vec![AddressFamily::V4, AddressFamily::V6]
        );
    }

    #[test]
    fn test_open_any_route_both_families_fail() {
        let provider = RecordingProvider::new(false, false, false);
        let err = open(&provider, &Target::AnyRoute).unwrap_err();
        match err {
            OpenError::InitializationFailed { attempted } => {
                assert_eq!(attempted, vec![AddressFamily::V4, AddressFamily::V6]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_target_default_is_any_route() {
        assert_eq!(Target::default(), Target::AnyRoute);
    }
}
