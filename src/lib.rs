//! SunReady lead enrichment and quoting service.
//!
//! Turns a property's coordinates and energy profile into a solar proposal:
//! creates a lead, delegates 3D roof modeling to LightFusion, resolves the
//! property's tariff through Genability and computes financial quotes.
//!
//! # Modules
//!
//! - `api`: HTTP handlers, router and OpenAPI document.
//! - `core`: Lead orchestration, quote engine, models and errors.
//! - `data`: Database pool and record stores.
//! - `integrations`: Vendor and tariff-provider clients.
//! - `obs`: Logging setup.

pub mod api;
pub mod core;
pub mod data;
pub mod integrations;
pub mod obs;

// Re-export primary modules for shared use in tests and other binaries
pub mod circuit_breaker;
pub mod config;
pub mod db;
pub mod errors;
pub mod genability;
pub mod handlers;
pub mod lead_service;
pub mod lightfusion;
pub mod memory_store;
pub mod models;
pub mod openapi;
pub mod quote;
pub mod repo;
pub mod router;
