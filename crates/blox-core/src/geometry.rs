//! 2D value types in workspace units.

use serde::{Deserialize, Serialize};
use std::ops::{Add, Sub};

// ─── Coordinate ──────────────────────────────────────────────────────────

/// A point (or offset) in workspace coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Coordinate {
    pub x: f64,
    pub y: f64,
}

impl Coordinate {
    pub const ZERO: Coordinate = Coordinate { x: 0.0, y: 0.0 };

    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// `a + b`.
    pub fn sum(a: Coordinate, b: Coordinate) -> Coordinate {
        Coordinate::new(a.x + b.x, a.y + b.y)
    }

    /// `a - b`.
    pub fn difference(a: Coordinate, b: Coordinate) -> Coordinate {
        Coordinate::new(a.x - b.x, a.y - b.y)
    }

    /// Euclidean distance between two points.
    pub fn distance(a: Coordinate, b: Coordinate) -> f64 {
        (a.x - b.x).hypot(a.y - b.y)
    }

    /// Distance from the origin.
    pub fn magnitude(&self) -> f64 {
        self.x.hypot(self.y)
    }

    #[must_use]
    pub fn scale(&self, s: f64) -> Coordinate {
        Coordinate::new(self.x * s, self.y * s)
    }

    #[must_use]
    pub fn translate(&self, dx: f64, dy: f64) -> Coordinate {
        Coordinate::new(self.x + dx, self.y + dy)
    }
}

impl Add for Coordinate {
    type Output = Coordinate;

    fn add(self, rhs: Coordinate) -> Coordinate {
        Coordinate::sum(self, rhs)
    }
}

impl Sub for Coordinate {
    type Output = Coordinate;

    fn sub(self, rhs: Coordinate) -> Coordinate {
        Coordinate::difference(self, rhs)
    }
}

// ─── Size / Rect ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

impl Size {
    pub const fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }
}

/// Axis-aligned rectangle, stored as edges (y grows downwards).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
    pub top: f64,
    pub bottom: f64,
    pub left: f64,
    pub right: f64,
}

impl Rect {
    pub const fn new(top: f64, bottom: f64, left: f64, right: f64) -> Self {
        Self {
            top,
            bottom,
            left,
            right,
        }
    }

    pub fn from_origin_size(origin: Coordinate, size: Size) -> Self {
        Self::new(
            origin.y,
            origin.y + size.height,
            origin.x,
            origin.x + size.width,
        )
    }

    pub fn width(&self) -> f64 {
        self.right - self.left
    }

    pub fn height(&self) -> f64 {
        self.bottom - self.top
    }

    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.left && x <= self.right && y >= self.top && y <= self.bottom
    }

    /// AABB overlap test (touching edges count as intersecting).
    pub fn intersects(&self, other: &Rect) -> bool {
        self.left <= other.right
            && self.right >= other.left
            && self.top <= other.bottom
            && self.bottom >= other.top
    }

    /// Smallest rect containing both.
    #[must_use]
    pub fn union(&self, other: &Rect) -> Rect {
        Rect::new(
            self.top.min(other.top),
            self.bottom.max(other.bottom),
            self.left.min(other.left),
            self.right.max(other.right),
        )
    }
}

/// Clamp `value` into `[lower, upper]`, swapping the bounds if they are
/// inverted (an object larger than the viewport still gets a position).
pub fn clamp(lower: f64, value: f64, upper: f64) -> f64 {
    let (lo, hi) = if upper < lower {
        (upper, lower)
    } else {
        (lower, upper)
    };
    value.max(lo).min(hi)
}
