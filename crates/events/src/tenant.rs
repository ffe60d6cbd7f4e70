use repset_core::TenantId;

use crate::EventEnvelope;

/// Marker for messages that carry a tenant id.
///
/// Lets infrastructure (workers, subscription loops) filter or validate by
/// tenant without knowing the concrete message type.
pub trait TenantScoped {
    fn tenant_id(&self) -> TenantId;
}

impl<E> TenantScoped for EventEnvelope<E> {
    fn tenant_id(&self) -> TenantId {
        self.tenant_id()
    }
}
