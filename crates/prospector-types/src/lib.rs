//! Shared type definitions for the Prospector agent.
//!
//! This crate is the single source of truth for the data that flows between
//! the pipeline components and the game server client.
//!
//! # Modules
//!
//! - [`ids`] -- Strongly-typed identifiers for coins, permits, and treasures
//! - [`region`] -- Rectangular regions of the coordinate space
//! - [`wire`] -- JSON request/response bodies exchanged with the game server

pub mod ids;
pub mod region;
pub mod wire;

// Re-export all public types at crate root for convenience.
pub use ids::{CoinId, PermitId, TreasureId};
pub use region::{Cell, Region};
pub use wire::{Area, DigRequest, ErrorBody, ExploreReport, License};
