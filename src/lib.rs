pub mod auth;
pub mod chat;
pub mod clock;
pub mod config;
pub mod database;
pub mod error;
pub mod handlers;
pub mod marketplace;
pub mod message_broker;
pub mod notification;
pub mod query;
pub mod reservation;
pub mod scheduler;
pub mod store;
