//! Inbox Sync - realtime notification inbox for a signed-in user
//!
//! Keeps a local inbox consistent with the server while notifications arrive
//! over a push channel, a polling fallback and user actions across several
//! surfaces.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
pub mod telemetry;
