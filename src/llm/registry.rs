//! Provider registry with one-hop failover.
//!
//! The registry owns every configured provider in discovery order and keeps
//! two references into that list: the active provider and an optional
//! fallback. Both live behind a single lock so readers always see a
//! consistent pair. The lock is never held across an `.await`.
//!
//! Scoped switches are exclusive: a second [`ProviderRegistry::scoped_switch`]
//! waits until the first guard is dropped, so restores always unwind in order.

use std::sync::{Arc, PoisonError, RwLock};
use std::time::Instant;

use futures::future::join_all;
use serde::Serialize;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

use super::{GenerationError, GenerationOptions, GenerationProvider, ProviderDescriptor};

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("No model provider available")]
    NoProviderAvailable,

    #[error("Provider not found: {0}")]
    ProviderNotFound(String),

    #[error(transparent)]
    Generation(#[from] GenerationError),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Selection {
    active: Option<String>,
    fallback: Option<String>,
}

type SharedProvider = Arc<dyn GenerationProvider>;

/// The providers one call is routed to, resolved from a single snapshot.
#[derive(Debug, Clone)]
pub struct Route {
    pub active: SharedProvider,
    /// Set only when a fallback is configured and differs from `active`.
    pub fallback: Option<SharedProvider>,
}

/// Holds all providers and routes generation to the active one.
#[derive(Debug)]
pub struct ProviderRegistry {
    providers: Vec<(String, SharedProvider)>,
    selection: RwLock<Selection>,
    scoped: Mutex<()>,
}

impl ProviderRegistry {
    /// Build a registry and pick the active provider by probing every backend.
    ///
    /// The active provider is `primary` if it is available, else `fallback` if
    /// available, else the first available provider in registration order.
    /// When nothing answers, the registry starts with no active provider and
    /// `generate` reports [`RegistryError::NoProviderAvailable`].
    pub async fn initialize(
        providers: Vec<SharedProvider>,
        primary: Option<&str>,
        fallback: Option<&str>,
    ) -> Self {
        let providers = dedupe(providers);
        let probes = join_all(providers.iter().map(|(_, p)| p.is_available())).await;
        let available: Vec<&str> = providers
            .iter()
            .zip(&probes)
            .filter(|(_, up)| **up)
            .map(|((name, _), _)| name.as_str())
            .collect();

        let active = primary
            .filter(|name| available.contains(name))
            .or_else(|| fallback.filter(|name| available.contains(name)))
            .or_else(|| available.first().copied())
            .map(ToString::to_string);

        let fallback = fallback
            .filter(|name| providers.iter().any(|(n, _)| n == name))
            .map(ToString::to_string);

        match &active {
            Some(name) => info!(
                name: "provider.selected",
                active = %name,
                fallback = ?fallback,
                available = ?available,
                "Active provider selected"
            ),
            None => warn!(
                name: "provider.none_available",
                registered = providers.len(),
                "No model provider answered its liveness probe"
            ),
        }

        Self {
            providers,
            selection: RwLock::new(Selection { active, fallback }),
            scoped: Mutex::new(()),
        }
    }

    /// Build a registry with an explicit selection and no probing.
    pub fn with_selection(
        providers: Vec<SharedProvider>,
        active: Option<&str>,
        fallback: Option<&str>,
    ) -> Result<Self, RegistryError> {
        let providers = dedupe(providers);
        for name in active.iter().chain(fallback.iter()) {
            if !providers.iter().any(|(n, _)| n == name) {
                return Err(RegistryError::ProviderNotFound((*name).to_string()));
            }
        }
        Ok(Self {
            providers,
            selection: RwLock::new(Selection {
                active: active.map(ToString::to_string),
                fallback: fallback.map(ToString::to_string),
            }),
            scoped: Mutex::new(()),
        })
    }

    fn selection(&self) -> Selection {
        self.selection
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Look up a provider by name.
    pub fn get(&self, name: &str) -> Option<SharedProvider> {
        self.providers
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, p)| Arc::clone(p))
    }

    /// Registered provider names in discovery order.
    pub fn names(&self) -> Vec<String> {
        self.providers.iter().map(|(n, _)| n.clone()).collect()
    }

    pub fn active_name(&self) -> Option<String> {
        self.selection().active
    }

    pub fn fallback_name(&self) -> Option<String> {
        self.selection().fallback
    }

    /// Resolve the active and fallback providers from one snapshot.
    pub fn route(&self) -> Result<Route, RegistryError> {
        let Selection { active, fallback } = self.selection();
        let active = active
            .as_deref()
            .and_then(|name| self.get(name))
            .ok_or(RegistryError::NoProviderAvailable)?;
        let fallback = fallback
            .as_deref()
            .filter(|name| *name != active.name())
            .and_then(|name| self.get(name));
        Ok(Route { active, fallback })
    }

    /// Generate with the active provider, retrying once on the fallback.
    ///
    /// Failover never changes the active provider. When both attempts fail,
    /// the fallback's error is returned.
    pub async fn generate(
        &self,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<String, RegistryError> {
        let Route { active, fallback } = self.route()?;

        let err = match active.generate(prompt, options).await {
            Ok(text) => return Ok(text),
            Err(err) => err,
        };

        let Some(fallback) = fallback else {
            return Err(err.into());
        };

        warn!(
            name: "provider.failover",
            from = %active.name(),
            to = %fallback.name(),
            error = %err,
            "Primary generation failed, retrying on fallback"
        );
        Ok(fallback.generate(prompt, options).await?)
    }

    /// Make `name` the active provider. Availability is not probed.
    pub fn switch_active(&self, name: &str) -> Result<(), RegistryError> {
        self.replace_active(name).map(|previous| {
            info!(
                name: "provider.switched",
                from = ?previous,
                to = %name,
                "Active provider switched"
            );
        })
    }

    fn replace_active(&self, name: &str) -> Result<Option<String>, RegistryError> {
        if self.get(name).is_none() {
            return Err(RegistryError::ProviderNotFound(name.to_string()));
        }
        let mut selection = self
            .selection
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        Ok(selection.active.replace(name.to_string()))
    }

    /// Switch to `name` until the returned guard is dropped.
    ///
    /// The switch is visible to every caller of this registry while the guard
    /// lives. Only one scoped switch is held at a time; later callers wait for
    /// the current guard. Holding a guard and asking for another one from the
    /// same task never completes.
    pub async fn scoped_switch(
        &self,
        name: &str,
    ) -> Result<ActiveProviderGuard<'_>, RegistryError> {
        if self.get(name).is_none() {
            return Err(RegistryError::ProviderNotFound(name.to_string()));
        }
        let exclusive = self.scoped.lock().await;
        let previous = self.replace_active(name)?;
        debug!(to = %name, restore = ?previous, "Scoped provider switch");
        Ok(ActiveProviderGuard {
            registry: self,
            previous,
            _exclusive: exclusive,
        })
    }

    /// Names of providers that currently answer their liveness probe.
    pub async fn list_available(&self) -> Vec<String> {
        let probes = join_all(self.providers.iter().map(|(_, p)| p.is_available())).await;
        self.providers
            .iter()
            .zip(probes)
            .filter(|(_, up)| *up)
            .map(|((name, _), _)| name.clone())
            .collect()
    }

    /// Describe one provider, or every provider in registration order.
    pub async fn provider_info(
        &self,
        name: Option<&str>,
    ) -> Result<Vec<ProviderDescriptor>, RegistryError> {
        match name {
            Some(name) => {
                let provider = self
                    .get(name)
                    .ok_or_else(|| RegistryError::ProviderNotFound(name.to_string()))?;
                Ok(vec![provider.describe().await])
            }
            None => Ok(join_all(self.providers.iter().map(|(_, p)| p.describe())).await),
        }
    }

    pub async fn active_descriptor(&self) -> Result<ProviderDescriptor, RegistryError> {
        let provider = self
            .active_name()
            .and_then(|name| self.get(&name))
            .ok_or(RegistryError::NoProviderAvailable)?;
        Ok(provider.describe().await)
    }

    /// Run `prompt` once against every available provider.
    ///
    /// Providers are called directly, so the active selection is untouched.
    pub async fn benchmark(&self, prompt: &str) -> Vec<BenchmarkOutcome> {
        let options = GenerationOptions::default();
        let mut outcomes = Vec::new();

        for (name, provider) in &self.providers {
            if !provider.is_available().await {
                continue;
            }
            let started = Instant::now();
            let result = provider.generate(prompt, &options).await;
            let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

            let outcome = match result {
                Ok(text) => BenchmarkOutcome {
                    provider: name.clone(),
                    status: BenchmarkStatus::Success,
                    response_length: text.chars().count(),
                    elapsed_ms,
                    error: None,
                },
                Err(e) => BenchmarkOutcome {
                    provider: name.clone(),
                    status: BenchmarkStatus::Error,
                    response_length: 0,
                    elapsed_ms,
                    error: Some(e.to_string()),
                },
            };
            info!(
                name: "provider.benchmark",
                provider = %outcome.provider,
                status = ?outcome.status,
                elapsed_ms = outcome.elapsed_ms,
                "Benchmark call finished"
            );
            outcomes.push(outcome);
        }
        outcomes
    }
}

fn dedupe(providers: Vec<SharedProvider>) -> Vec<(String, SharedProvider)> {
    let mut out: Vec<(String, SharedProvider)> = Vec::with_capacity(providers.len());
    for provider in providers {
        let name = provider.name().to_string();
        if out.iter().any(|(n, _)| *n == name) {
            warn!(provider = %name, "Duplicate provider name ignored");
            continue;
        }
        out.push((name, provider));
    }
    out
}

/// Restores the previously active provider when dropped.
///
/// The restore happens before the exclusive lock is released, so the next
/// scoped switch always captures the restored provider.
#[derive(Debug)]
pub struct ActiveProviderGuard<'a> {
    registry: &'a ProviderRegistry,
    previous: Option<String>,
    _exclusive: MutexGuard<'a, ()>,
}

impl Drop for ActiveProviderGuard<'_> {
    fn drop(&mut self) {
        let mut selection = self
            .registry
            .selection
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        selection.active = self.previous.take();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BenchmarkStatus {
    Success,
    Error,
}

/// Result of one benchmark call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BenchmarkOutcome {
    pub provider: String,
    pub status: BenchmarkStatus,
    pub response_length: usize,
    pub elapsed_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
