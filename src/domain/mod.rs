//! Domain layer: marketplace accounts, listings, crypto, webhooks, audit.

pub mod account;
pub mod audit;
pub mod crypto;
pub mod foundation;
pub mod listing;
pub mod webhook;
