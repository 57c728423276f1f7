// src/routing.rs

//! Capability -> transport address routing.
//!
//! The table is read on every dispatch and written only by administrative
//! registration, so it sits behind a plain `RwLock`. Lookups take the lock
//! briefly and never across an `.await`.

use std::collections::{BTreeMap, HashMap};
use std::sync::{PoisonError, RwLock};

use tracing::{debug, info};

use crate::config::ConfigFile;
use crate::errors::{Result, SchedulerError};
use crate::types::{Address, Capability};

/// Routing table mapping capability tags to agent addresses.
#[derive(Debug, Default)]
pub struct AgentRouter {
    routes: RwLock<HashMap<Capability, Address>>,
}

impl AgentRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a router from the `[routes]` table of a validated config.
    pub fn from_config(cfg: &ConfigFile) -> Self {
        let router = Self::new();
        for (capability, address) in cfg.routes.iter() {
            router.register(capability.clone(), address.clone());
        }
        router
    }

    /// Bind `capability` to `address`, replacing any previous binding.
    pub fn register(&self, capability: Capability, address: Address) -> Option<Address> {
        let mut routes = self.routes.write().unwrap_or_else(PoisonError::into_inner);
        info!(%capability, %address, "registered route");
        routes.insert(capability, address)
    }

    pub fn unregister(&self, capability: &Capability) -> Option<Address> {
        let mut routes = self.routes.write().unwrap_or_else(PoisonError::into_inner);
        let removed = routes.remove(capability);
        if removed.is_some() {
            info!(%capability, "unregistered route");
        }
        removed
    }

    /// Address of the first capability in `capabilities` that has a route.
    pub fn route(&self, capabilities: &[Capability]) -> Result<Address> {
        let routes = self.routes.read().unwrap_or_else(PoisonError::into_inner);

        for capability in capabilities {
            if let Some(address) = routes.get(capability) {
                debug!(%capability, %address, "resolved route");
                return Ok(address.clone());
            }
        }

        Err(SchedulerError::NoCapableAgent(capabilities.to_vec()))
    }

    /// Sorted snapshot of the current table.
    pub fn routes(&self) -> BTreeMap<Capability, Address> {
        let routes = self.routes.read().unwrap_or_else(PoisonError::into_inner);
        routes
            .iter()
            .map(|(c, a)| (c.clone(), a.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.routes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
