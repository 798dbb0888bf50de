//! Service registry.
//!
//! Components publish capabilities here and other components look them up
//! by type. A capability may have several providers; lookups return the one
//! with the highest [`ServicePriority`], and the earliest registration wins a
//! tie. Nothing is discovered implicitly: providers are registered and
//! retracted explicitly by their owner.
//!
//! The capability key is the exact type passed to `register`. A provider
//! registered as `Arc<dyn Trait>` is found by `get::<dyn Trait>()`, one
//! registered as its concrete type only by that type, so a provider that
//! should be found both ways is registered under both.

use std::any::{Any, TypeId, type_name};
use std::collections::HashMap;
use std::sync::{Arc, OnceLock, PoisonError, RwLock};
use tracing::debug;

/// Precedence among providers of the same capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum ServicePriority {
    Lowest,
    Low,
    #[default]
    Normal,
    High,
    Highest,
}

struct Registration {
    /// Holds an `Arc<T>` for the capability `T`
    provider: Box<dyn Any + Send + Sync>,
    /// Address of the provider, for removal by identity
    address: usize,
    owner: String,
    priority: ServicePriority,
}

/// Public view of one registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisteredService {
    pub capability: &'static str,
    pub owner: String,
    pub priority: ServicePriority,
}

/// Directory of capability providers keyed by capability type.
#[derive(Default)]
pub struct ServiceRegistry {
    services: RwLock<HashMap<TypeId, (&'static str, Vec<Registration>)>>,
}

static GLOBAL: OnceLock<Arc<ServiceRegistry>> = OnceLock::new();

fn address_of<T: ?Sized>(provider: &Arc<T>) -> usize {
    Arc::as_ptr(provider) as *const () as usize
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide registry.
    pub fn global() -> Arc<ServiceRegistry> {
        Arc::clone(GLOBAL.get_or_init(|| Arc::new(ServiceRegistry::new())))
    }

    /// Publish `provider` as an implementation of capability `T`.
    pub fn register<T>(&self, provider: Arc<T>, owner: &str, priority: ServicePriority)
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let registration = Registration {
            address: address_of(&provider),
            provider: Box::new(provider),
            owner: owner.to_string(),
            priority,
        };

        let mut services = self.services.write().unwrap_or_else(PoisonError::into_inner);
        let (_, entries) = services
            .entry(TypeId::of::<T>())
            .or_insert_with(|| (type_name::<T>(), Vec::new()));
        entries.push(registration);

        debug!(
            capability = type_name::<T>(),
            owner = owner,
            priority = ?priority,
            "Service registered"
        );
    }

    /// The highest-priority provider of capability `T`.
    pub fn get<T>(&self) -> Option<Arc<T>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let services = self.services.read().unwrap_or_else(PoisonError::into_inner);
        let (_, entries) = services.get(&TypeId::of::<T>())?;

        let mut best: Option<&Registration> = None;
        for entry in entries {
            if best.is_none_or(|b| entry.priority > b.priority) {
                best = Some(entry);
            }
        }

        best.and_then(|entry| entry.provider.downcast_ref::<Arc<T>>())
            .cloned()
    }

    /// Every registration of capability `T`, highest priority first.
    pub fn registrations<T>(&self) -> Vec<RegisteredService>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let services = self.services.read().unwrap_or_else(PoisonError::into_inner);
        let Some((capability, entries)) = services.get(&TypeId::of::<T>()) else {
            return Vec::new();
        };

        let mut found: Vec<RegisteredService> = entries
            .iter()
            .map(|entry| RegisteredService {
                capability: *capability,
                owner: entry.owner.clone(),
                priority: entry.priority,
            })
            .collect();
        // Stable, so equal priorities keep registration order
        found.sort_by(|a, b| b.priority.cmp(&a.priority));
        found
    }

    /// Retract one provider of `T`. Returns whether it was registered.
    pub fn unregister<T>(&self, provider: &Arc<T>) -> bool
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let address = address_of(provider);
        let mut services = self.services.write().unwrap_or_else(PoisonError::into_inner);
        let Some((_, entries)) = services.get_mut(&TypeId::of::<T>()) else {
            return false;
        };

        let before = entries.len();
        entries.retain(|entry| entry.address != address);
        let removed = entries.len() != before;
        if entries.is_empty() {
            services.remove(&TypeId::of::<T>());
        }

        if removed {
            debug!(capability = type_name::<T>(), "Service unregistered");
        }
        removed
    }

    /// Retract everything `owner` registered. Returns the number removed.
    pub fn unregister_all(&self, owner: &str) -> usize {
        let mut services = self.services.write().unwrap_or_else(PoisonError::into_inner);
        let mut removed = 0;
        services.retain(|_, (_, entries)| {
            let before = entries.len();
            entries.retain(|entry| entry.owner != owner);
            removed += before - entries.len();
            !entries.is_empty()
        });

        if removed > 0 {
            debug!(owner = owner, removed, "Services unregistered");
        }
        removed
    }

    /// Whether any provider of `T` is registered.
    pub fn is_registered<T>(&self) -> bool
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.services
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&TypeId::of::<T>())
    }
}

impl std::fmt::Debug for ServiceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let services = self.services.read().unwrap_or_else(PoisonError::into_inner);
        let mut map = f.debug_map();
        for (capability, entries) in services.values() {
            map.entry(capability, &entries.len());
        }
        map.finish()
    }
}
