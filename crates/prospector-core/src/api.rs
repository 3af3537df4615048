//! Remote game server operations consumed by the pipeline.
//!
//! The [`GameApi`] trait abstracts the mechanism by which explore, dig,
//! cash and permit operations reach the server. The production
//! implementation speaks HTTP with bounded retries; tests plug in an
//! in-memory world. The pipeline only relies on the error taxonomy in
//! [`ApiError`], never on a wire format.

use std::future::Future;

use prospector_types::{Area, CoinId, ExploreReport, License, PermitId, TreasureId};
use tokio::time::Instant;

/// Errors surfaced by remote operations.
///
/// Domain errors drive specific pipeline transitions and are never blindly
/// retried. Transport errors are retried by the polling adapter and only
/// surface once its attempt or deadline budget is exhausted.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    /// The permit used for a dig is unknown or spent.
    #[error("no such license")]
    NoSuchLicense,

    /// The dig reached the requested depth and found nothing.
    #[error("no treasure found")]
    TreasureNotFound,

    /// The requested depth is beyond what the server allows.
    #[error("wrong depth")]
    WrongDepth,

    /// The coordinates are outside the world.
    #[error("wrong coordinates")]
    WrongCoordinates,

    /// The server refuses to issue more permits right now.
    #[error("no more licenses allowed")]
    NoMoreLicenses,

    /// A cash attempt referenced a treasure that was never dug.
    #[error("treasure has not been dug")]
    TreasureNotDug,

    /// The request could not be delivered or the connection failed.
    #[error("transport error: {0}")]
    Transport(String),

    /// The server answered with a status the client does not understand.
    #[error("unexpected status {status}")]
    UnexpectedStatus {
        /// HTTP status code.
        status: u16,
    },

    /// The response body could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),

    /// A single attempt exceeded its deadline.
    #[error("attempt timed out")]
    Timeout,

    /// The retry budget ran out before a definitive answer arrived.
    #[error("gave up after {attempts} attempts")]
    AttemptsExhausted {
        /// Attempts performed.
        attempts: u32,
    },

    /// The absolute deadline passed before a definitive answer arrived.
    #[error("deadline reached")]
    DeadlineReached,
}

impl ApiError {
    /// Whether this is a definitive answer from the game rules.
    pub const fn is_domain(&self) -> bool {
        matches!(
            self,
            Self::NoSuchLicense
                | Self::TreasureNotFound
                | Self::WrongDepth
                | Self::WrongCoordinates
                | Self::NoMoreLicenses
                | Self::TreasureNotDug
        )
    }

    /// Whether another attempt of the same call may succeed.
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Transport(_) | Self::UnexpectedStatus { .. } | Self::Decode(_) | Self::Timeout
        )
    }
}

/// The game server as seen by the pipeline.
///
/// All futures are `Send` so workers can be spawned onto the multi-threaded
/// runtime. Implementations apply their own per-operation retry policy.
pub trait GameApi: Send + Sync + 'static {
    /// Startup gate; any error aborts startup.
    fn health_check(&self) -> impl Future<Output = Result<(), ApiError>> + Send;

    /// Count treasures buried in an area.
    fn explore(&self, area: Area) -> impl Future<Output = Result<ExploreReport, ApiError>> + Send;

    /// Like [`explore`](Self::explore) but retries stop at an absolute deadline.
    fn explore_before(
        &self,
        area: Area,
        deadline: Instant,
    ) -> impl Future<Output = Result<ExploreReport, ApiError>> + Send;

    /// Dig one level at a cell, charging one use of the given permit.
    fn dig(
        &self,
        x: i64,
        y: i64,
        depth: u32,
        permit: PermitId,
    ) -> impl Future<Output = Result<Vec<TreasureId>, ApiError>> + Send;

    /// Exchange a treasure for coins.
    fn cash(
        &self,
        treasure: &TreasureId,
    ) -> impl Future<Output = Result<Vec<CoinId>, ApiError>> + Send;

    /// Buy a permit with the given coins (possibly none).
    fn issue_license(
        &self,
        coins: &[CoinId],
    ) -> impl Future<Output = Result<License, ApiError>> + Send;

    /// List permits the server currently considers active.
    fn list_licenses(&self) -> impl Future<Output = Result<Vec<License>, ApiError>> + Send;
}
