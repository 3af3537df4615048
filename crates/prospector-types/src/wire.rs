//! JSON bodies exchanged with the game server.
//!
//! Field names follow the server's camelCase convention. These types carry
//! no behaviour; the HTTP client maps them onto the pipeline's domain types.

use serde::{Deserialize, Serialize};

use crate::ids::PermitId;

/// A rectangle as the explore endpoint expects it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Area {
    /// Left edge.
    pub pos_x: i64,
    /// Top edge.
    pub pos_y: i64,
    /// Width; omitted on the wire when zero.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub size_x: i64,
    /// Height; omitted on the wire when zero.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub size_y: i64,
}

impl Area {
    /// A 1x1 area at the given cell.
    pub const fn cell(x: i64, y: i64) -> Self {
        Self {
            pos_x: x,
            pos_y: y,
            size_x: 1,
            size_y: 1,
        }
    }
}

#[allow(clippy::trivially_copy_pass_by_ref)]
const fn is_zero(v: &i64) -> bool {
    *v == 0
}

/// Response of a successful explore call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExploreReport {
    /// Treasures buried in the explored area.
    pub amount: u64,
    /// The area that was explored.
    pub area: Area,
}

/// Body of a dig call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DigRequest {
    /// Permit to charge the dig against.
    #[serde(rename = "licenseID")]
    pub license_id: PermitId,
    /// Column.
    #[serde(rename = "posX")]
    pub pos_x: i64,
    /// Row.
    #[serde(rename = "posY")]
    pub pos_y: i64,
    /// Depth level, starting at 1.
    pub depth: u32,
}

/// A permit as issued or listed by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct License {
    /// Permit id.
    pub id: PermitId,
    /// Digs granted in total.
    pub dig_allowed: u64,
    /// Digs already charged against the permit.
    pub dig_used: u64,
}

impl License {
    /// Digs that can still be performed with this permit.
    pub const fn digs_remaining(&self) -> u64 {
        self.dig_allowed.saturating_sub(self.dig_used)
    }
}

/// Structured error body returned with HTTP 422.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Server error code (1000 = wrong coordinates, 1001 = wrong depth).
    pub code: i32,
    /// Human-readable message.
    #[serde(default)]
    pub message: String,
}
