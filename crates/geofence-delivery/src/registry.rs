use std::collections::HashMap;
use std::sync::Arc;

use geofence_domain::AutomationKind;

use crate::adapter::Adapter;
use crate::error::DeliveryError;

/// Dispatches delivery calls to the correct [`Adapter`] for an Automation's
/// `kind` (§4.6). Generalizes the teacher's `DriverRegistry`, which performs
/// the same lookup keyed by cloud target rather than automation kind.
pub struct AdapterRegistry {
    adapters: HashMap<String, Arc<dyn Adapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self { adapters: HashMap::new() }
    }

    /// Register an adapter for a kind. Returns `&mut self` for chaining.
    pub fn register(&mut self, kind: impl Into<String>, adapter: Arc<dyn Adapter>) -> &mut Self {
        self.adapters.insert(kind.into(), adapter);
        self
    }

    pub fn for_kind(&self, kind: &AutomationKind) -> Result<Arc<dyn Adapter>, DeliveryError> {
        let key = kind.to_string();
        self.adapters
            .get(&key)
            .cloned()
            .ok_or_else(|| DeliveryError::AdapterNotConfigured(key))
    }

    pub fn active_kinds(&self) -> Vec<String> {
        self.adapters.keys().cloned().collect()
    }
}

impl Default for AdapterRegistry {
    fn default() -> Self {
        Self::new()
    }
}
