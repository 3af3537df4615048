//! Concurrency and control layer of the Prospector agent.
//!
//! This crate turns independent game server operations into a self-tuning
//! harvesting pipeline. The server itself is reached through the
//! [`GameApi`] trait, implemented by the runner crate.
//!
//! # Modules
//!
//! - [`api`] -- [`GameApi`] trait and the [`ApiError`] taxonomy.
//! - [`config`] -- Configuration loading from `prospector.yaml`.
//! - [`depth_optimizer`] -- Yield-per-time dig depth selection.
//! - [`offer_book`] -- Learned coins-offered to digs-granted table.
//! - [`permit_pool`] -- Bounded pool of shared digging permits.
//! - [`pipeline`] -- Worker pools and the bootstrap sequence.
//! - [`price_controller`] -- Hill-climbing permit price search.
//! - [`region_queue`] -- Max-treasure-first queue with backpressure.
//! - [`stats`] -- Pipeline counters.
//! - [`wallet`] -- Concurrent bag of coins.
//!
//! [`GameApi`]: api::GameApi
//! [`ApiError`]: api::ApiError

pub mod api;
pub mod config;
pub mod depth_optimizer;
pub mod offer_book;
pub mod permit_pool;
pub mod pipeline;
pub mod price_controller;
pub mod region_queue;
pub mod stats;
pub mod wallet;

pub use api::{ApiError, GameApi};
pub use config::{ConfigError, PipelineConfig};
pub use pipeline::{Pipeline, PipelineHandle};
