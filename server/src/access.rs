//! Access-control collaborator.
//!
//! Authentication happens upstream; the engine only asks whether an already
//! identified actor may act on a resource, and at what level of detail.

use crate::models::{Actor, Event, PurchaseTransaction, Role};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    View,
    Refund,
    ManageInventory,
}

#[derive(Debug, Clone, Copy)]
pub enum Resource<'a> {
    Transaction {
        txn: &'a PurchaseTransaction,
        event: &'a Event,
    },
    Tier {
        event: &'a Event,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Denied,
    /// Allowed, but payment details must be redacted.
    Limited,
    Full,
}

impl Access {
    pub fn is_allowed(self) -> bool {
        self != Access::Denied
    }
}

pub trait AccessControl: Send + Sync {
    fn authorize(&self, actor: &Actor, resource: Resource<'_>, action: Action) -> Access;
}

/// Default rules: super admins may do anything, buyers own their
/// transactions, organizers see their events' sales without payment details
/// and manage their events' capacity.
#[derive(Debug, Clone, Copy, Default)]
pub struct RoleBasedAccess;

impl AccessControl for RoleBasedAccess {
    fn authorize(&self, actor: &Actor, resource: Resource<'_>, action: Action) -> Access {
        if actor.role == Role::SuperAdmin {
            return Access::Full;
        }

        match (resource, action) {
            (Resource::Transaction { txn, .. }, Action::View | Action::Refund)
                if txn.buyer_id == actor.id =>
            {
                Access::Full
            }
            (Resource::Transaction { event, .. }, Action::View)
                if actor.role == Role::Organizer && event.organizer_id == actor.id =>
            {
                Access::Limited
            }
            (Resource::Tier { event }, Action::ManageInventory)
                if actor.role == Role::Organizer && event.organizer_id == actor.id =>
            {
                Access::Full
            }
            _ => Access::Denied,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EventStatus;
    use chrono::Utc;
    use rust_decimal::Decimal;
    use uuid::Uuid;

    fn fixtures() -> (Event, PurchaseTransaction) {
        let event = Event {
            id: Uuid::new_v4(),
            organizer_id: Uuid::new_v4(),
            title: "Open air".to_string(),
            status: EventStatus::Published,
            start_time: Utc::now(),
            end_time: None,
        };
        let txn = PurchaseTransaction::pending(
            Uuid::new_v4(),
            Uuid::new_v4(),
            event.id,
            1,
            Decimal::TEN,
            "card",
            None,
            Utc::now(),
        );
        (event, txn)
    }

    #[test]
    fn test_owner_has_full_access() {
        let (event, txn) = fixtures();
        let owner = Actor::user(txn.buyer_id);
        let resource = Resource::Transaction { txn: &txn, event: &event };

        assert_eq!(RoleBasedAccess.authorize(&owner, resource, Action::View), Access::Full);
        assert_eq!(RoleBasedAccess.authorize(&owner, resource, Action::Refund), Access::Full);
    }

    #[test]
    fn test_event_organizer_sees_redacted_and_cannot_refund() {
        let (event, txn) = fixtures();
        let organizer = Actor::new(event.organizer_id, Role::Organizer);
        let resource = Resource::Transaction { txn: &txn, event: &event };

        assert_eq!(
            RoleBasedAccess.authorize(&organizer, resource, Action::View),
            Access::Limited
        );
        assert_eq!(
            RoleBasedAccess.authorize(&organizer, resource, Action::Refund),
            Access::Denied
        );
    }

    #[test]
    fn test_strangers_are_denied() {
        let (event, txn) = fixtures();
        let stranger = Actor::user(Uuid::new_v4());
        let other_organizer = Actor::new(Uuid::new_v4(), Role::Organizer);
        let resource = Resource::Transaction { txn: &txn, event: &event };

        assert!(!RoleBasedAccess.authorize(&stranger, resource, Action::View).is_allowed());
        assert!(!RoleBasedAccess
            .authorize(&other_organizer, resource, Action::View)
            .is_allowed());
        assert!(!RoleBasedAccess
            .authorize(&other_organizer, Resource::Tier { event: &event }, Action::ManageInventory)
            .is_allowed());
    }

    #[test]
    fn test_super_admin_has_full_access() {
        let (event, txn) = fixtures();
        let admin = Actor::new(Uuid::new_v4(), Role::SuperAdmin);
        let resource = Resource::Transaction { txn: &txn, event: &event };
        assert_eq!(RoleBasedAccess.authorize(&admin, resource, Action::Refund), Access::Full);
    }
}
