use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "ticket_kind", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TicketKind {
    Free,
    Paid,
    EarlyBird,
}

/// A priced, capacity-limited category of tickets for one event.
///
/// `sold` only ever moves through [`crate::inventory`], which holds the row
/// lock while it checks `0 <= sold <= quantity`.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TicketTier {
    pub id: Uuid,
    pub event_id: Uuid,
    pub name: String,
    pub kind: TicketKind,
    pub price: Decimal,
    pub quantity: i32,
    pub sold: i32,
    pub sale_start: DateTime<Utc>,
    pub sale_end: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TierStatus {
    Upcoming,
    OnSale,
    SoldOut,
    Ended,
}

#[derive(Debug, Clone, Serialize)]
pub struct TierAvailability {
    pub tier_id: Uuid,
    pub event_id: Uuid,
    pub name: String,
    pub kind: TicketKind,
    pub price: Decimal,
    pub quantity: i32,
    pub sold: i32,
    pub remaining: i32,
    pub status: TierStatus,
}

impl TicketTier {
    pub fn remaining(&self) -> i32 {
        (self.quantity - self.sold).max(0)
    }

    /// Both ends of the sale window are inclusive.
    pub fn sale_window_contains(&self, now: DateTime<Utc>) -> bool {
        self.sale_start <= now && now <= self.sale_end
    }

    pub fn total_for(&self, quantity: i32) -> Decimal {
        self.price * Decimal::from(quantity)
    }

    pub fn status_at(&self, now: DateTime<Utc>) -> TierStatus {
        if now > self.sale_end {
            TierStatus::Ended
        } else if self.remaining() == 0 {
            TierStatus::SoldOut
        } else if now < self.sale_start {
            TierStatus::Upcoming
        } else {
            TierStatus::OnSale
        }
    }

    pub fn availability(&self, now: DateTime<Utc>) -> TierAvailability {
        TierAvailability {
            tier_id: self.id,
            event_id: self.event_id,
            name: self.name.clone(),
            kind: self.kind,
            price: self.price,
            quantity: self.quantity,
            sold: self.sold,
            remaining: self.remaining(),
            status: self.status_at(now),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rust_decimal_macros::dec;

    fn tier(quantity: i32, sold: i32) -> TicketTier {
        let now = Utc::now();
        TicketTier {
            id: Uuid::new_v4(),
            event_id: Uuid::new_v4(),
            name: "General admission".to_string(),
            kind: TicketKind::Paid,
            price: dec!(25.50),
            quantity,
            sold,
            sale_start: now - Duration::days(1),
            sale_end: now + Duration::days(1),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_remaining_is_headroom() {
        assert_eq!(tier(10, 9).remaining(), 1);
        assert_eq!(tier(10, 10).remaining(), 0);
    }

    #[test]
    fn test_total_is_exact_decimal() {
        assert_eq!(tier(10, 0).total_for(3), dec!(76.50));
    }

    #[test]
    fn test_sale_window_bounds_are_inclusive() {
        let tier = tier(10, 0);
        assert!(tier.sale_window_contains(tier.sale_start));
        assert!(tier.sale_window_contains(tier.sale_end));
        assert!(!tier.sale_window_contains(tier.sale_end + Duration::seconds(1)));
        assert!(!tier.sale_window_contains(tier.sale_start - Duration::seconds(1)));
    }

    #[test]
    fn test_status_prefers_ended_over_sold_out() {
        let tier = tier(5, 5);
        assert_eq!(tier.status_at(Utc::now()), TierStatus::SoldOut);
        assert_eq!(
            tier.status_at(tier.sale_end + Duration::minutes(1)),
            TierStatus::Ended
        );
    }

    #[test]
    fn test_availability_snapshot() {
        let tier = tier(8, 3);
        let availability = tier.availability(Utc::now());
        assert_eq!(availability.remaining, 5);
        assert_eq!(availability.status, TierStatus::OnSale);
    }
}
