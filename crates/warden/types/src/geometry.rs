//! Geometry primitives for region shapes
//!
//! Shapes live on the integer block lattice. Cuboids are inclusive on both
//! bounds; polygons are extruded 2D outlines (x/z plane) between an
//! inclusive `min_y` and `max_y`. Containment and intersection are exact on
//! the lattice, so overlap checks never report a false negative.

use crate::error::{RegionError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A point on the block lattice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlockPoint {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl BlockPoint {
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Component-wise minimum
    pub fn min(self, other: Self) -> Self {
        Self::new(self.x.min(other.x), self.y.min(other.y), self.z.min(other.z))
    }

    /// Component-wise maximum
    pub fn max(self, other: Self) -> Self {
        Self::new(self.x.max(other.x), self.y.max(other.y), self.z.max(other.z))
    }

    /// Projection onto the x/z plane
    pub fn to_2d(self) -> Point2 {
        Point2::new(self.x, self.z)
    }
}

impl fmt::Display for BlockPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

/// A point on the x/z plane
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Point2 {
    pub x: i32,
    pub z: i32,
}

impl Point2 {
    pub const fn new(x: i32, z: i32) -> Self {
        Self { x, z }
    }
}

/// Axis-aligned box with inclusive bounds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Cuboid {
    min: BlockPoint,
    max: BlockPoint,
}

impl Cuboid {
    /// Create a cuboid from two opposite corners in any order.
    pub fn new(a: BlockPoint, b: BlockPoint) -> Self {
        Self {
            min: a.min(b),
            max: a.max(b),
        }
    }

    pub fn min(&self) -> BlockPoint {
        self.min
    }

    pub fn max(&self) -> BlockPoint {
        self.max
    }

    pub fn contains(&self, p: BlockPoint) -> bool {
        p.x >= self.min.x
            && p.x <= self.max.x
            && p.y >= self.min.y
            && p.y <= self.max.y
            && p.z >= self.min.z
            && p.z <= self.max.z
    }

    pub fn intersects(&self, other: &Cuboid) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
            && self.min.z <= other.max.z
            && self.max.z >= other.min.z
    }

    /// Number of lattice points inside the box.
    pub fn volume(&self) -> u64 {
        let dx = (self.max.x as i64 - self.min.x as i64 + 1) as u64;
        let dy = (self.max.y as i64 - self.min.y as i64 + 1) as u64;
        let dz = (self.max.z as i64 - self.min.z as i64 + 1) as u64;
        dx.saturating_mul(dy).saturating_mul(dz)
    }

    /// Footprint corners in winding order.
    pub fn corners_2d(&self) -> [Point2; 4] {
        [
            Point2::new(self.min.x, self.min.z),
            Point2::new(self.max.x, self.min.z),
            Point2::new(self.max.x, self.max.z),
            Point2::new(self.min.x, self.max.z),
        ]
    }
}

#[derive(Deserialize)]
struct PolygonRecord {
    points: Vec<Point2>,
    min_y: i32,
    max_y: i32,
}

/// Simple polygon on the x/z plane extruded between two heights
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "PolygonRecord")]
pub struct Polygon {
    points: Vec<Point2>,
    min_y: i32,
    max_y: i32,
}

impl TryFrom<PolygonRecord> for Polygon {
    type Error = RegionError;

    fn try_from(record: PolygonRecord) -> Result<Self> {
        Polygon::new(record.points, record.min_y, record.max_y)
    }
}

impl Polygon {
    /// Create a polygon, rejecting outlines that enclose no area.
    ///
    /// Heights given in the wrong order are swapped.
    pub fn new(points: Vec<Point2>, min_y: i32, max_y: i32) -> Result<Self> {
        if points.len() < 3 {
            return Err(RegionError::InvalidShape(format!(
                "polygon needs at least 3 points, got {}",
                points.len()
            )));
        }
        if twice_signed_area(&points) == 0 {
            return Err(RegionError::InvalidShape(
                "polygon encloses zero area".to_string(),
            ));
        }
        Ok(Self {
            points,
            min_y: min_y.min(max_y),
            max_y: min_y.max(max_y),
        })
    }

    pub fn points(&self) -> &[Point2] {
        &self.points
    }

    pub fn min_y(&self) -> i32 {
        self.min_y
    }

    pub fn max_y(&self) -> i32 {
        self.max_y
    }

    pub fn bounding_box(&self) -> Cuboid {
        let mut min = BlockPoint::new(i32::MAX, self.min_y, i32::MAX);
        let mut max = BlockPoint::new(i32::MIN, self.max_y, i32::MIN);
        for p in &self.points {
            min.x = min.x.min(p.x);
            min.z = min.z.min(p.z);
            max.x = max.x.max(p.x);
            max.z = max.z.max(p.z);
        }
        Cuboid::new(min, max)
    }

    pub fn contains(&self, p: BlockPoint) -> bool {
        p.y >= self.min_y && p.y <= self.max_y && outline_contains(&self.points, p.to_2d())
    }

    /// Lattice points inside the prism (Pick's theorem on the outline).
    pub fn volume(&self) -> u64 {
        let area2 = twice_signed_area(&self.points).unsigned_abs();
        let n = self.points.len();
        let boundary: u64 = (0..n)
            .map(|i| {
                let a = self.points[i];
                let b = self.points[(i + 1) % n];
                gcd(
                    (b.x as i64 - a.x as i64).unsigned_abs(),
                    (b.z as i64 - a.z as i64).unsigned_abs(),
                )
            })
            .sum();
        let columns = (area2 + u128::from(boundary)) / 2 + 1;
        let height = (self.max_y as i64 - self.min_y as i64 + 1) as u128;
        u64::try_from(columns.saturating_mul(height)).unwrap_or(u64::MAX)
    }

    /// Move the vertical bounds, keeping `min_y <= max_y`.
    pub fn with_heights(&self, min_y: i32, max_y: i32) -> Self {
        Self {
            points: self.points.clone(),
            min_y: min_y.min(max_y),
            max_y: min_y.max(max_y),
        }
    }
}

/// The closed set of shapes a region can take
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Shape {
    Cuboid(Cuboid),
    Polygon(Polygon),
    /// Matches every point of its world
    Global,
}

impl Shape {
    pub fn cuboid(a: BlockPoint, b: BlockPoint) -> Self {
        Shape::Cuboid(Cuboid::new(a, b))
    }

    pub fn polygon(points: Vec<Point2>, min_y: i32, max_y: i32) -> Result<Self> {
        Ok(Shape::Polygon(Polygon::new(points, min_y, max_y)?))
    }

    pub fn contains(&self, p: BlockPoint) -> bool {
        match self {
            Shape::Cuboid(c) => c.contains(p),
            Shape::Polygon(poly) => poly.contains(p),
            Shape::Global => true,
        }
    }

    pub fn intersects(&self, other: &Shape) -> bool {
        match (self, other) {
            (Shape::Global, _) | (_, Shape::Global) => true,
            (Shape::Cuboid(a), Shape::Cuboid(b)) => a.intersects(b),
            (Shape::Cuboid(c), Shape::Polygon(p)) | (Shape::Polygon(p), Shape::Cuboid(c)) => {
                c.min().y <= p.max_y()
                    && c.max().y >= p.min_y()
                    && c.intersects(&p.bounding_box())
                    && outlines_intersect(&c.corners_2d(), p.points())
            }
            (Shape::Polygon(a), Shape::Polygon(b)) => {
                a.min_y() <= b.max_y()
                    && a.max_y() >= b.min_y()
                    && a.bounding_box().intersects(&b.bounding_box())
                    && outlines_intersect(a.points(), b.points())
            }
        }
    }

    /// Number of lattice points covered; the global shape reports zero.
    pub fn volume(&self) -> u64 {
        match self {
            Shape::Cuboid(c) => c.volume(),
            Shape::Polygon(p) => p.volume(),
            Shape::Global => 0,
        }
    }

    /// Axis-aligned bounds, or `None` for the global shape.
    pub fn bounding_box(&self) -> Option<Cuboid> {
        match self {
            Shape::Cuboid(c) => Some(*c),
            Shape::Polygon(p) => Some(p.bounding_box()),
            Shape::Global => None,
        }
    }

    /// Outline vertices on the x/z plane.
    pub fn points(&self) -> Vec<Point2> {
        match self {
            Shape::Cuboid(c) => c.corners_2d().to_vec(),
            Shape::Polygon(p) => p.points().to_vec(),
            Shape::Global => Vec::new(),
        }
    }

    pub fn is_physical_area(&self) -> bool {
        !matches!(self, Shape::Global)
    }

    /// Short lowercase name of the shape kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Shape::Cuboid(_) => "cuboid",
            Shape::Polygon(_) => "polygon",
            Shape::Global => "global",
        }
    }
}

/// Coordinate differences span 33 bits, so their products need i128.
fn twice_signed_area(points: &[Point2]) -> i128 {
    let n = points.len();
    (0..n)
        .map(|i| {
            let a = points[i];
            let b = points[(i + 1) % n];
            a.x as i128 * b.z as i128 - b.x as i128 * a.z as i128
        })
        .sum()
}

fn gcd(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    a
}

fn cross(o: Point2, a: Point2, b: Point2) -> i128 {
    (a.x as i128 - o.x as i128) * (b.z as i128 - o.z as i128)
        - (a.z as i128 - o.z as i128) * (b.x as i128 - o.x as i128)
}

fn within_box(a: Point2, b: Point2, p: Point2) -> bool {
    p.x >= a.x.min(b.x) && p.x <= a.x.max(b.x) && p.z >= a.z.min(b.z) && p.z <= a.z.max(b.z)
}

fn on_segment(a: Point2, b: Point2, p: Point2) -> bool {
    cross(a, b, p) == 0 && within_box(a, b, p)
}

fn segments_intersect(p1: Point2, p2: Point2, q1: Point2, q2: Point2) -> bool {
    let d1 = cross(q1, q2, p1).signum();
    let d2 = cross(q1, q2, p2).signum();
    let d3 = cross(p1, p2, q1).signum();
    let d4 = cross(p1, p2, q2).signum();

    if d1 * d2 < 0 && d3 * d4 < 0 {
        return true;
    }

    (d1 == 0 && within_box(q1, q2, p1))
        || (d2 == 0 && within_box(q1, q2, p2))
        || (d3 == 0 && within_box(p1, p2, q1))
        || (d4 == 0 && within_box(p1, p2, q2))
}

/// Boundary-inclusive point-in-polygon test.
fn outline_contains(points: &[Point2], p: Point2) -> bool {
    let n = points.len();
    let mut inside = false;
    for i in 0..n {
        let a = points[i];
        let b = points[(i + 1) % n];
        if on_segment(a, b, p) {
            return true;
        }
        if (a.z > p.z) != (b.z > p.z) {
            let dz = b.z as i128 - a.z as i128;
            let lhs = (p.x as i128 - a.x as i128) * dz;
            let rhs = (p.z as i128 - a.z as i128) * (b.x as i128 - a.x as i128);
            let crosses = if dz > 0 { lhs < rhs } else { lhs > rhs };
            if crosses {
                inside = !inside;
            }
        }
    }
    inside
}

fn outlines_intersect(a: &[Point2], b: &[Point2]) -> bool {
    let (na, nb) = (a.len(), b.len());
    for i in 0..na {
        let (a1, a2) = (a[i], a[(i + 1) % na]);
        for j in 0..nb {
            if segments_intersect(a1, a2, b[j], b[(j + 1) % nb]) {
                return true;
            }
        }
    }
    // No crossing edges: either one outline encloses the other or they are disjoint.
    outline_contains(b, a[0]) || outline_contains(a, b[0])
}
