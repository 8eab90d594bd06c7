pub mod access;
pub mod clock;
pub mod config;
pub mod gateway;
pub mod handlers;
pub mod inventory;
pub mod models;
pub mod routes;
pub mod services;
pub mod store;
pub mod utils;
