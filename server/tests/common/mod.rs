#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use agora_ticketing::access::RoleBasedAccess;
use agora_ticketing::clock::{Clock, FixedClock};
use agora_ticketing::gateway::{GatewayRegistry, ManualTransferGateway, ScriptedGateway};
use agora_ticketing::models::{
    Actor, Event, EventStatus, PurchaseTransaction, Role, TicketKind, TicketTier,
};
use agora_ticketing::services::{Engine, PurchasePolicy, PurchaseReceipt, PurchaseRequest};
use agora_ticketing::store::{InMemoryStore, Store};
use agora_ticketing::utils::error::AppError;
use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use uuid::Uuid;

pub const GATEWAY: &str = "card";

pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 5, 1, 12, 0, 0).unwrap()
}

pub struct Fixture {
    pub engine: Engine,
    pub store: InMemoryStore,
    pub clock: Arc<FixedClock>,
    pub gateway: Arc<ScriptedGateway>,
    pub event: Event,
    pub tier: TicketTier,
    pub organizer: Actor,
    gateways: GatewayRegistry,
    policy: PurchasePolicy,
}

pub struct FixtureBuilder {
    quantity: i32,
    price: Decimal,
    latency: Duration,
    lock_timeout: Duration,
    policy: PurchasePolicy,
    event_status: EventStatus,
}

impl FixtureBuilder {
    pub fn quantity(mut self, quantity: i32) -> Self {
        self.quantity = quantity;
        self
    }

    pub fn price(mut self, price: Decimal) -> Self {
        self.price = price;
        self
    }

    pub fn gateway_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn lock_timeout(mut self, lock_timeout: Duration) -> Self {
        self.lock_timeout = lock_timeout;
        self
    }

    pub fn gateway_timeout(mut self, timeout: Duration) -> Self {
        self.policy.gateway_timeout = timeout;
        self
    }

    pub fn event_status(mut self, status: EventStatus) -> Self {
        self.event_status = status;
        self
    }

    pub fn build(self) -> Fixture {
        let now = start_time();
        let clock = Arc::new(FixedClock::new(now));
        let store = InMemoryStore::with_lock_timeout(self.lock_timeout);

        let organizer = Actor::new(Uuid::new_v4(), Role::Organizer);
        let event = Event {
            id: Uuid::new_v4(),
            organizer_id: organizer.id,
            title: "Harbour Lights Festival".to_string(),
            status: self.event_status,
            start_time: now + chrono::Duration::days(30),
            end_time: Some(now + chrono::Duration::days(30) + chrono::Duration::hours(6)),
        };
        let tier = TicketTier {
            id: Uuid::new_v4(),
            event_id: event.id,
            name: "General admission".to_string(),
            kind: TicketKind::Paid,
            price: self.price,
            quantity: self.quantity,
            sold: 0,
            sale_start: now - chrono::Duration::days(1),
            sale_end: now + chrono::Duration::days(20),
            created_at: now,
            updated_at: now,
        };
        store.insert_event(event.clone());
        store.insert_tier(tier.clone());

        let gateway = Arc::new(ScriptedGateway::new(GATEWAY).with_latency(self.latency));
        let mut gateways = GatewayRegistry::new();
        gateways.register(gateway.clone());
        gateways.register(Arc::new(ManualTransferGateway));

        let engine = Engine::new(
            Arc::new(store.clone()),
            gateways.clone(),
            Arc::new(RoleBasedAccess),
            clock.clone(),
            self.policy,
        );

        Fixture {
            engine,
            store,
            clock,
            gateway,
            event,
            tier,
            organizer,
            gateways,
            policy: self.policy,
        }
    }
}

impl Fixture {
    pub fn builder() -> FixtureBuilder {
        FixtureBuilder {
            quantity: 100,
            price: dec!(25.00),
            latency: Duration::ZERO,
            lock_timeout: Duration::from_secs(2),
            policy: PurchasePolicy {
                gateway_timeout: Duration::from_secs(2),
                ..PurchasePolicy::default()
            },
            event_status: EventStatus::Published,
        }
    }

    pub fn new() -> Fixture {
        Self::builder().build()
    }

    /// An engine sharing this fixture's gateways and clock over another
    /// store, typically one wrapping `self.store`.
    pub fn engine_over(&self, store: Arc<dyn Store>) -> Engine {
        Engine::new(
            store,
            self.gateways.clone(),
            Arc::new(RoleBasedAccess),
            self.clock.clone(),
            self.policy,
        )
    }

    pub fn clock_now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn request(&self, quantity: i32) -> PurchaseRequest {
        PurchaseRequest {
            tier_id: self.tier.id,
            quantity,
            payment_gateway: GATEWAY.to_string(),
            payment_data: None,
        }
    }

    pub async fn buy(&self, buyer: &Actor, quantity: i32) -> Result<PurchaseReceipt, AppError> {
        self.engine.purchase(buyer, self.request(quantity)).await
    }

    pub async fn sold(&self) -> i32 {
        self.store.tier(self.tier.id).await.unwrap().unwrap().sold
    }

    pub async fn transaction(&self, id: Uuid) -> PurchaseTransaction {
        self.store.transaction(id).await.unwrap().unwrap()
    }

    pub async fn all_transactions(&self) -> Vec<PurchaseTransaction> {
        let admin = Actor::new(Uuid::new_v4(), Role::SuperAdmin);
        let query = agora_ticketing::services::ListTransactionsQuery {
            per_page: Some(100),
            ..Default::default()
        };
        self.engine.list_transactions(&admin, query).await.unwrap().0
    }
}

pub fn buyer() -> Actor {
    Actor::user(Uuid::new_v4())
}
