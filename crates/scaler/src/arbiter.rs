use tracing::trace;

use crate::host::{ShapeId, ShapeQuery};
use crate::shadow::ShadowStore;

/// Who is behind a write to a shape's active attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOrigin {
    /// The host's own logic. The proposed value is its real intent.
    Host,
    /// The synchronization pass re-asserting a value. The proposed value is
    /// noise; the host's intent comes from the shadow store.
    Plugin,
}

/// Decides the committed value of every active-attribute write on a managed
/// shape: whatever the host wants, and only if the policy gate allows it.
#[derive(Debug, Clone)]
pub struct EnabledArbiter {
    gating_allowed: bool,
    policy_enabled: bool,
}

impl EnabledArbiter {
    pub fn new(gating_allowed: bool) -> Self {
        Self {
            gating_allowed,
            policy_enabled: true,
        }
    }

    pub fn gating_allowed(&self) -> bool {
        self.gating_allowed
    }

    pub fn policy_enabled(&self) -> bool {
        self.policy_enabled
    }

    /// Flips the policy gate. Returns the new gate value, or `None` when the
    /// configuration does not allow gating.
    pub fn toggle(&mut self) -> Option<bool> {
        if !self.gating_allowed {
            return None;
        }
        self.policy_enabled = !self.policy_enabled;
        Some(self.policy_enabled)
    }

    pub fn arbitrate<P: ShapeQuery + ?Sized>(
        &self,
        store: &mut ShadowStore,
        shapes: &P,
        shape: ShapeId,
        proposed: bool,
        origin: WriteOrigin,
    ) -> bool {
        if !self.gating_allowed {
            return proposed;
        }
        // Shapes the sync pass never observed are outside the policy.
        let Some(record) = store.try_get(shapes, shape) else {
            return proposed;
        };

        let host_intent = match origin {
            WriteOrigin::Plugin => record.host_intended_enabled,
            WriteOrigin::Host => {
                store.record_host_intent(shapes, shape, proposed);
                proposed
            }
        };
        let committed = host_intent && self.policy_enabled;
        trace!(
            shape = shape.0,
            ?origin,
            proposed,
            host_intent,
            policy_enabled = self.policy_enabled,
            committed,
            "shape_enabled_arbitrated"
        );
        committed
    }
}
