use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::geometry::signed_area;

/// A 2D point in image pixel coordinates (y grows downward).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &Point) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

impl std::ops::Add for Point {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self {
            x: self.x + rhs.x,
            y: self.y + rhs.y,
        }
    }
}

impl std::ops::Sub for Point {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Self {
            x: self.x - rhs.x,
            y: self.y - rhs.y,
        }
    }
}

impl std::ops::Mul<f64> for Point {
    type Output = Self;

    fn mul(self, rhs: f64) -> Self::Output {
        Self {
            x: self.x * rhs,
            y: self.y * rhs,
        }
    }
}

/// An axis-aligned box defined by top-left corner, width, and height.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl BoundingBox {
    pub const fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Smallest box containing every point, or `None` for an empty slice.
    pub fn from_points(points: &[Point]) -> Option<Self> {
        let first = points.first()?;
        let (mut min_x, mut min_y, mut max_x, mut max_y) = (first.x, first.y, first.x, first.y);
        for p in &points[1..] {
            min_x = min_x.min(p.x);
            min_y = min_y.min(p.y);
            max_x = max_x.max(p.x);
            max_y = max_y.max(p.y);
        }
        Some(Self::new(min_x, min_y, max_x - min_x, max_y - min_y))
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }
}

/// An ordered set of facial landmarks.
///
/// Index `i` always denotes the same anatomical location for a given
/// landmark model, so the order must be preserved by every transform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LandmarkSet {
    pub points: Vec<Point>,
}

impl LandmarkSet {
    pub fn new(points: Vec<Point>) -> Self {
        Self { points }
    }

    pub fn num_landmarks(&self) -> usize {
        self.points.len()
    }

    pub fn get(&self, idx: usize) -> Option<Point> {
        self.points.get(idx).copied()
    }
}

impl std::ops::Index<usize> for LandmarkSet {
    type Output = Point;

    fn index(&self, idx: usize) -> &Self::Output {
        &self.points[idx]
    }
}

/// Vertex ordering of a closed contour as seen on screen (y down).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Winding {
    /// Outer boundary of a region.
    Clockwise,
    /// Boundary of a hole inside a region.
    CounterClockwise,
}

/// A closed polygonal boundary.
///
/// The closing edge from the last vertex back to the first is implicit; the
/// first vertex is never repeated at the end.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contour {
    points: Vec<Point>,
    /// Index of the enclosing outer contour within the same region, set for holes.
    parent: Option<usize>,
}

impl Contour {
    pub const MIN_VERTICES: usize = 3;

    /// Build a contour, dropping a repeated closing vertex if present.
    pub fn new(mut points: Vec<Point>) -> Result<Self> {
        if points.len() > 1 && points.first() == points.last() {
            points.pop();
        }
        if points.len() < Self::MIN_VERTICES {
            return Err(Error::InvalidInput(format!(
                "contour has {} vertices, need at least {}",
                points.len(),
                Self::MIN_VERTICES
            )));
        }
        Ok(Self {
            points,
            parent: None,
        })
    }

    pub fn with_parent(mut self, parent: Option<usize>) -> Self {
        self.parent = parent;
        self
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn parent(&self) -> Option<usize> {
        self.parent
    }

    /// Shoelace area; positive for clockwise contours in image coordinates.
    pub fn signed_area(&self) -> f64 {
        signed_area(&self.points)
    }

    pub fn area(&self) -> f64 {
        self.signed_area().abs()
    }

    pub fn winding(&self) -> Winding {
        if self.signed_area() >= 0.0 {
            Winding::Clockwise
        } else {
            Winding::CounterClockwise
        }
    }

    pub fn is_hole(&self) -> bool {
        self.winding() == Winding::CounterClockwise
    }

    pub fn bounding_box(&self) -> BoundingBox {
        // Non-empty by construction.
        BoundingBox::from_points(&self.points).unwrap_or(BoundingBox::new(0.0, 0.0, 0.0, 0.0))
    }

    /// Replace the vertices, keeping the parent link.
    pub(crate) fn with_points(&self, points: Vec<Point>) -> Result<Self> {
        Ok(Contour::new(points)?.with_parent(self.parent))
    }
}

/// Contours per region label, iterated in ascending label order.
pub type RegionMap = BTreeMap<u8, Vec<Contour>>;
