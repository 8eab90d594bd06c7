//! Inventory ledger: the only code that moves a tier's `sold` count.
//!
//! Every function takes the tier row lock through the caller's scope before
//! reading `sold`, so the headroom check and the write are one atomic unit
//! for all concurrent callers. Nothing is visible to other scopes until the
//! caller commits.

use tracing::{debug, error};
use uuid::Uuid;

use crate::models::TicketTier;
use crate::store::StoreTx;
use crate::utils::error::AppError;

pub const MAX_TIER_QUANTITY: i32 = 100_000;

fn check_invariant(tier: &TicketTier) -> Result<(), AppError> {
    if tier.sold < 0 || tier.sold > tier.quantity {
        error!(
            tier_id = %tier.id,
            sold = tier.sold,
            quantity = tier.quantity,
            "Ticket tier found outside 0 <= sold <= quantity"
        );
        return Err(AppError::InventoryInvariantViolation(format!(
            "ticket tier {} has sold={} quantity={}",
            tier.id, tier.sold, tier.quantity
        )));
    }
    Ok(())
}

/// Claims `quantity` tickets, failing with [`AppError::SoldOut`] (carrying
/// the remaining count) when the tier cannot fit them.
pub async fn reserve(
    scope: &mut dyn StoreTx,
    tier_id: Uuid,
    quantity: i32,
) -> Result<TicketTier, AppError> {
    if quantity <= 0 {
        return Err(AppError::InvalidInput(
            "Reservation quantity must be positive".to_string(),
        ));
    }

    let mut tier = scope.lock_tier(tier_id).await?;
    check_invariant(&tier)?;

    let remaining = tier.remaining();
    if quantity > remaining {
        debug!(%tier_id, quantity, remaining, "Reservation exceeds remaining inventory");
        return Err(AppError::SoldOut { remaining });
    }

    let sold = tier.sold + quantity;
    scope.set_sold(tier_id, sold).await?;
    tier.sold = sold;

    debug!(%tier_id, quantity, sold, "Reserved tickets");
    Ok(tier)
}

/// Result of a [`release`]. A non-zero `shortfall` means the ledger was
/// already inconsistent: `sold` was clamped to zero instead of going
/// negative.
#[derive(Debug, Clone)]
pub struct Released {
    pub tier: TicketTier,
    pub shortfall: i32,
}

impl Released {
    /// Surfaces a clamped release as the fatal violation it is. Call after
    /// the scope has committed, so the clamp and the caller's status change
    /// are kept.
    pub fn ensure_exact(&self) -> Result<(), AppError> {
        if self.shortfall > 0 {
            return Err(AppError::InventoryInvariantViolation(format!(
                "release on ticket tier {} exceeded sold by {}",
                self.tier.id, self.shortfall
            )));
        }
        Ok(())
    }
}

/// Returns `quantity` tickets to the pool. Must pair with an earlier
/// successful [`reserve`] of the same quantity; `sold` never goes below
/// zero.
pub async fn release(
    scope: &mut dyn StoreTx,
    tier_id: Uuid,
    quantity: i32,
) -> Result<Released, AppError> {
    if quantity <= 0 {
        return Err(AppError::InventoryInvariantViolation(format!(
            "release of {} tickets from ticket tier {}",
            quantity, tier_id
        )));
    }

    let mut tier = scope.lock_tier(tier_id).await?;
    check_invariant(&tier)?;

    let shortfall = (quantity - tier.sold).max(0);
    if shortfall > 0 {
        error!(
            %tier_id,
            quantity,
            sold = tier.sold,
            "Release does not match any outstanding reservation, clamping sold to zero"
        );
    }

    let sold = (tier.sold - quantity).max(0);
    scope.set_sold(tier_id, sold).await?;
    tier.sold = sold;

    debug!(%tier_id, quantity, sold, "Released tickets");
    Ok(Released { tier, shortfall })
}

/// Organizer capacity edit. Capacity may never drop below what is sold.
pub async fn resize(
    scope: &mut dyn StoreTx,
    tier_id: Uuid,
    quantity: i32,
) -> Result<TicketTier, AppError> {
    if !(1..=MAX_TIER_QUANTITY).contains(&quantity) {
        return Err(AppError::InvalidInput(format!(
            "Quantity must be between 1 and {}",
            MAX_TIER_QUANTITY
        )));
    }

    let mut tier = scope.lock_tier(tier_id).await?;
    check_invariant(&tier)?;

    if quantity < tier.sold {
        return Err(AppError::InvalidInput(format!(
            "Quantity cannot be less than already sold tickets ({})",
            tier.sold
        )));
    }

    scope.set_quantity(tier_id, quantity).await?;
    tier.quantity = quantity;
    Ok(tier)
}
