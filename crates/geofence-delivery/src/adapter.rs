use async_trait::async_trait;
use geofence_domain::{Automation, Delivery, Device, TransitionEvent, Zone};
use serde_json::Value;

use crate::error::DeliveryError;

/// Everything a dispatch needs: the claimed Delivery plus the rows it was
/// enriched with (§4.5 step 2) so an adapter never has to reach back into
/// the store itself.
pub struct DeliveryContext {
    pub delivery: Delivery,
    pub automation: Automation,
    pub event: TransitionEvent,
    pub device: Device,
    pub zone: Zone,
}

pub struct AdapterSuccess {
    pub response_snapshot: Option<Value>,
}

/// The pluggable delivery backend behind an Automation's `kind` (§4.6),
/// generalizing the teacher's cloud driver abstraction: one async-trait
/// object per kind, looked up through a registry keyed by discriminant
/// instead of a fixed enum of clouds.
#[async_trait]
pub trait Adapter: Send + Sync + 'static {
    fn kind(&self) -> &'static str;

    /// Executes one delivery attempt. The split between retriable and
    /// permanent failure is the caller's retry/DLQ decision (§7); adapters
    /// report it via the `DeliveryError` variant they return.
    async fn dispatch(&self, ctx: &DeliveryContext) -> Result<AdapterSuccess, DeliveryError>;
}
