use tracing::{info, instrument};
use uuid::Uuid;

use super::Engine;
use crate::access::{Action, Resource};
use crate::inventory;
use crate::models::{Actor, TierAvailability};
use crate::utils::error::AppError;

impl Engine {
    /// Changes a tier's capacity under its row lock, so a concurrent
    /// purchase can never push `sold` past the new quantity.
    #[instrument(skip_all, fields(actor_id = %actor.id, tier_id = %tier_id, quantity = quantity))]
    pub async fn adjust_capacity(
        &self,
        actor: &Actor,
        tier_id: Uuid,
        quantity: i32,
    ) -> Result<TierAvailability, AppError> {
        let tier = self
            .store
            .tier(tier_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Ticket tier {} was not found", tier_id)))?;
        let event = self.store.event(tier.event_id).await?.ok_or_else(|| {
            AppError::NotFound(format!("Event {} was not found", tier.event_id))
        })?;

        let access = self
            .access
            .authorize(actor, Resource::Tier { event: &event }, Action::ManageInventory);
        if !access.is_allowed() {
            return Err(AppError::Unauthorized(
                "Only the event organizer can change ticket capacity".to_string(),
            ));
        }

        let mut scope = self.store.begin().await?;
        let tier = inventory::resize(scope.as_mut(), tier_id, quantity).await?;
        scope.commit().await?;

        info!(sold = tier.sold, "Tier capacity updated");
        Ok(tier.availability(self.clock.now()))
    }
}
