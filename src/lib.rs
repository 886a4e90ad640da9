//! MarketSync - Marketplace Integration Core
//!
//! This crate connects an inventory system to external marketplaces (eBay,
//! Amazon, Facebook): OAuth account lifecycle with credentials encrypted at
//! rest, webhook ingestion, and background listing publish/sync jobs.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;

#[cfg(test)]
pub mod testutil;
