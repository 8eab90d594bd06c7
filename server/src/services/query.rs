use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use super::Engine;
use crate::access::{Access, Action, Resource};
use crate::models::{Actor, PurchaseTransaction, TierAvailability, TransactionStatus};
use crate::store::TransactionFilter;
use crate::utils::error::AppError;
use crate::utils::response::Pagination;

pub const DEFAULT_PER_PAGE: i64 = 15;
pub const MAX_PER_PAGE: i64 = 100;
const MY_TICKETS_LIMIT: i64 = 1_000;

/// Query-string filters for transaction listings. Dates are whole UTC days.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListTransactionsQuery {
    pub status: Option<TransactionStatus>,
    pub event_id: Option<Uuid>,
    pub payment_gateway: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketTiming {
    Upcoming,
    Past,
}

fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::default()).and_utc()
}

fn end_of_day(date: NaiveDate) -> DateTime<Utc> {
    let last = NaiveTime::from_hms_nano_opt(23, 59, 59, 999_999_999).unwrap_or_default();
    date.and_time(last).and_utc()
}

impl Engine {
    /// Loads one transaction. Organizers of the event get the redacted view;
    /// anyone else who is neither owner nor admin is refused.
    pub async fn get_transaction(
        &self,
        actor: &Actor,
        id: Uuid,
    ) -> Result<PurchaseTransaction, AppError> {
        let txn = self
            .store
            .transaction(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Transaction {} was not found", id)))?;
        let event = self.store.event(txn.event_id).await?.ok_or_else(|| {
            AppError::NotFound(format!("Event {} was not found", txn.event_id))
        })?;

        let access = self.access.authorize(
            actor,
            Resource::Transaction {
                txn: &txn,
                event: &event,
            },
            Action::View,
        );
        match access {
            Access::Full => Ok(txn),
            Access::Limited => Ok(txn.redacted()),
            Access::Denied => Err(AppError::Unauthorized(
                "You can only view your own transactions".to_string(),
            )),
        }
    }

    pub async fn list_transactions(
        &self,
        actor: &Actor,
        query: ListTransactionsQuery,
    ) -> Result<(Vec<PurchaseTransaction>, Pagination), AppError> {
        let page = query.page.unwrap_or(1);
        let per_page = query.per_page.unwrap_or(DEFAULT_PER_PAGE);
        if page < 1 {
            return Err(AppError::InvalidInput("Page must be at least 1".to_string()));
        }
        if !(1..=MAX_PER_PAGE).contains(&per_page) {
            return Err(AppError::InvalidInput(format!(
                "per_page must be between 1 and {}",
                MAX_PER_PAGE
            )));
        }
        if let (Some(start), Some(end)) = (query.start_date, query.end_date) {
            if start > end {
                return Err(AppError::InvalidInput(
                    "start_date must not be after end_date".to_string(),
                ));
            }
        }

        let filter = TransactionFilter {
            buyer_id: (!actor.is_super_admin()).then_some(actor.id),
            status: query.status,
            event_id: query.event_id,
            payment_gateway: query.payment_gateway,
            created_from: query.start_date.map(start_of_day),
            created_to: query.end_date.map(end_of_day),
            page,
            per_page,
            ..TransactionFilter::default()
        };

        let (rows, total) = self.store.list_transactions(&filter).await?;
        Ok((rows, Pagination::new(page, per_page, total)))
    }

    /// The actor's completed purchases, newest first.
    pub async fn my_tickets(
        &self,
        actor: &Actor,
        timing: Option<TicketTiming>,
    ) -> Result<Vec<PurchaseTransaction>, AppError> {
        let now = self.clock.now();
        let mut filter = TransactionFilter {
            buyer_id: Some(actor.id),
            status: Some(TransactionStatus::Completed),
            per_page: MY_TICKETS_LIMIT,
            ..TransactionFilter::default()
        };
        match timing {
            Some(TicketTiming::Upcoming) => filter.event_starts_after = Some(now),
            Some(TicketTiming::Past) => filter.event_ended_before = Some(now),
            None => {}
        }

        let (rows, _) = self.store.list_transactions(&filter).await?;
        Ok(rows)
    }

    pub async fn availability(&self, tier_id: Uuid) -> Result<TierAvailability, AppError> {
        let tier = self
            .store
            .tier(tier_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Ticket tier {} was not found", tier_id)))?;
        Ok(tier.availability(self.clock.now()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_day_bounds_cover_the_whole_day() {
        let date = NaiveDate::from_ymd_opt(2026, 3, 14).unwrap();
        let start = start_of_day(date);
        let end = end_of_day(date);

        assert_eq!(start.to_rfc3339(), "2026-03-14T00:00:00+00:00");
        assert!(end > start);
        assert_eq!(end.date_naive(), date);
        assert_eq!((end - start).num_seconds(), 86_399);
    }
}
