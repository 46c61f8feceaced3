//! Tile identities shared by both sides of the worker boundary.
//!
//! The same value type is used as a lookup key on the coordinating side and
//! inside worker contexts. Only the serialized value ever crosses a context,
//! never the memory.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::core::constants::MAX_CANONICAL_ZOOM;

/// Identifier of one tile object on the coordinating side.
///
/// Worker decode state is keyed by this value, not by the tile coordinate, so
/// two tile objects for the same coordinate never share decode state.
pub type TileUid = u64;

static NEXT_TILE_UID: AtomicU64 = AtomicU64::new(1);

/// Allocate a fresh tile uid.
pub fn next_tile_uid() -> TileUid {
    NEXT_TILE_UID.fetch_add(1, Ordering::Relaxed)
}

/// How the `{y}` placeholder of a URL template is filled in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TileScheme {
    /// Slippy map numbering, y grows southwards.
    #[default]
    Xyz,
    /// TMS numbering, y grows northwards.
    Tms,
}

/// A tile in the canonical (non-wrapped, non-overscaled) tile pyramid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CanonicalTileId {
    pub z: u8,
    pub x: u32,
    pub y: u32,
}

impl CanonicalTileId {
    pub fn new(z: u8, x: u32, y: u32) -> Self {
        Self { z, x, y }
    }

    /// Checks if the tile is valid for its zoom level
    pub fn is_valid(&self) -> bool {
        if self.z > MAX_CANONICAL_ZOOM {
            return false;
        }
        let max_coord = 1u64 << self.z;
        (self.x as u64) < max_coord && (self.y as u64) < max_coord
    }

    /// Gets the parent tile at a lower zoom level
    pub fn parent(&self) -> Option<CanonicalTileId> {
        if self.z == 0 {
            None
        } else {
            Some(CanonicalTileId::new(self.z - 1, self.x / 2, self.y / 2))
        }
    }

    /// Gets the child tiles at a higher zoom level
    pub fn children(&self) -> Vec<CanonicalTileId> {
        if self.z >= MAX_CANONICAL_ZOOM {
            Vec::new()
        } else {
            let (z, x, y) = (self.z + 1, self.x.saturating_mul(2), self.y.saturating_mul(2));
            let (x1, y1) = (x.saturating_add(1), y.saturating_add(1));
            vec![
                CanonicalTileId::new(z, x, y),
                CanonicalTileId::new(z, x1, y),
                CanonicalTileId::new(z, x, y1),
                CanonicalTileId::new(z, x1, y1),
            ]
        }
    }

    /// Bing-style quadkey for this tile.
    pub fn quadkey(&self) -> String {
        let mut quadkey = String::with_capacity(self.z as usize);
        for i in (1..=self.z).rev() {
            // Bits past the coordinate width are zero.
            let mask = 1u32.checked_shl(u32::from(i - 1)).unwrap_or(0);
            let mut digit = 0u8;
            if self.x & mask != 0 {
                digit += 1;
            }
            if self.y & mask != 0 {
                digit += 2;
            }
            quadkey.push((b'0' + digit) as char);
        }
        quadkey
    }

    /// Build a URL for this tile from one of `templates`.
    ///
    /// Templates are spread across tiles by `(x + y) % len` so that several
    /// hosts share the load. Returns `None` when no template is configured.
    pub fn url(&self, templates: &[String], pixel_ratio: f32, scheme: TileScheme) -> Option<String> {
        if templates.is_empty() {
            return None;
        }

        let idx = ((self.x as u64 + self.y as u64) % templates.len() as u64) as usize;
        let y = match scheme {
            TileScheme::Xyz => self.y as u64,
            TileScheme::Tms => 1u64
                .checked_shl(u32::from(self.z))
                .unwrap_or(u64::MAX)
                .saturating_sub(self.y as u64 + 1),
        };
        let prefix = format!("{:x}{:x}", self.x % 16, self.y % 16);
        let ratio = if pixel_ratio > 1.0 { "@2x" } else { "" };

        Some(
            templates[idx]
                .replace("{prefix}", &prefix)
                .replace("{z}", &self.z.to_string())
                .replace("{x}", &self.x.to_string())
                .replace("{y}", &y.to_string())
                .replace("{ratio}", ratio)
                .replace("{quadkey}", &self.quadkey()),
        )
    }
}

impl fmt::Display for CanonicalTileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.z, self.x, self.y)
    }
}

/// A tile request at one level of detail: the canonical tile plus the zoom it
/// is drawn at and the world copy it belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverscaledTileId {
    pub overscaled_z: u8,
    pub wrap: i32,
    pub canonical: CanonicalTileId,
}

impl OverscaledTileId {
    pub fn new(overscaled_z: u8, wrap: i32, z: u8, x: u32, y: u32) -> Self {
        Self {
            overscaled_z,
            wrap,
            canonical: CanonicalTileId::new(z, x, y),
        }
    }

    /// Shorthand for a tile drawn at its own zoom in the primary world copy.
    pub fn unwrapped(z: u8, x: u32, y: u32) -> Self {
        Self::new(z, 0, z, x, y)
    }

    pub fn is_valid(&self) -> bool {
        self.overscaled_z >= self.canonical.z && self.canonical.is_valid()
    }

    /// How many times the canonical tile is magnified to reach the overscaled zoom.
    pub fn overscale_factor(&self) -> u32 {
        let shift = self.overscaled_z.saturating_sub(self.canonical.z).min(31);
        1u32 << shift
    }

    /// Compact, stable key string for map lookups. Ids past the deepest zoom
    /// saturate instead of overflowing and may share a key.
    pub fn key(&self) -> String {
        let dim = 1u128
            .checked_shl(u32::from(self.canonical.z))
            .unwrap_or(u128::MAX);
        let wrap = {
            let doubled = self.wrap as i64 * 2;
            if doubled < 0 {
                (-doubled - 1) as u128
            } else {
                doubled as u128
            }
        };
        let index = dim
            .saturating_mul(dim)
            .saturating_mul(wrap)
            .saturating_add(dim.saturating_mul(self.canonical.y as u128))
            .saturating_add(self.canonical.x as u128);
        let mut key = to_base36(index);
        key.push_str(&to_base36(self.canonical.z as u128));
        key.push_str(&to_base36(self.overscaled_z as u128));
        key
    }
}

impl fmt::Display for OverscaledTileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}w{}", self.canonical, self.overscaled_z, self.wrap)
    }
}

fn to_base36(mut n: u128) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if n == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while n > 0 {
        out.push(DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    out.reverse();
    String::from_utf8_lossy(&out).into_owned()
}
