//! Collision primitives
//!
//! Pure intersection tests on plain geometry. Rectangles are top-left
//! anchored `(position, size)` pairs unless a [`Rect`] is used.

use crate::game::entity::{Body, CollisionType, Shape};
use crate::util::vec2::Vec2;

/// Errors raised when building geometry
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GeometryError {
    #[error("Polygon needs at least 3 points, got {0}")]
    DegeneratePolygon(usize),
}

/// Axis-aligned rectangle given by its top-left and bottom-right corners
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Rect {
    pub min: Vec2,
    pub max: Vec2,
}

impl Rect {
    pub const fn new(min: Vec2, max: Vec2) -> Self {
        Self { min, max }
    }

    pub fn from_origin_size(origin: Vec2, size: Vec2) -> Self {
        Self {
            min: origin,
            max: origin + size,
        }
    }

    pub fn from_center_size(center: Vec2, size: Vec2) -> Self {
        let half = size / 2.0;
        Self {
            min: center - half,
            max: center + half,
        }
    }

    #[inline]
    pub fn width(&self) -> f64 {
        self.max.x - self.min.x
    }

    #[inline]
    pub fn height(&self) -> f64 {
        self.max.y - self.min.y
    }

    #[inline]
    pub fn size(&self) -> Vec2 {
        self.max - self.min
    }

    #[inline]
    pub fn center(&self) -> Vec2 {
        self.min + self.size() / 2.0
    }

    pub fn area(&self) -> f64 {
        self.width() * self.height()
    }

    pub fn contains(&self, point: Vec2) -> bool {
        point.x >= self.min.x && point.x <= self.max.x && point.y >= self.min.y && point.y <= self.max.y
    }

    pub fn intersects(&self, other: &Rect) -> bool {
        rect_rect(self.min, self.size(), other.min, other.size())
    }

    /// Corners in clockwise order starting at the top-left
    pub fn corners(&self) -> [Vec2; 4] {
        [
            self.min,
            Vec2::new(self.max.x, self.min.y),
            self.max,
            Vec2::new(self.min.x, self.max.y),
        ]
    }

    pub fn to_polygon(&self) -> Polygon {
        Polygon {
            points: self.corners().to_vec(),
        }
    }
}

/// Convex polygon with at least three vertices
#[derive(Debug, Clone, PartialEq)]
pub struct Polygon {
    points: Vec<Vec2>,
}

impl Polygon {
    pub fn new(points: Vec<Vec2>) -> Result<Self, GeometryError> {
        if points.len() < 3 {
            return Err(GeometryError::DegeneratePolygon(points.len()));
        }
        Ok(Self { points })
    }

    pub fn points(&self) -> &[Vec2] {
        &self.points
    }

    /// Quad swept from `start` along `direction` for `length`, `half_width`
    /// to either side of the path
    pub fn swept_quad(start: Vec2, direction: Vec2, length: f64, half_width: f64) -> Self {
        let dir = direction.normalize();
        let side = dir.perpendicular() * half_width;
        let end = start + dir * length;
        Self {
            points: vec![start + side, end + side, end - side, start - side],
        }
    }

    /// Min/max of the vertices projected onto `axis`
    fn project(&self, axis: Vec2) -> (f64, f64) {
        self.points.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), p| {
            let d = axis.dot(*p);
            (lo.min(d), hi.max(d))
        })
    }

    fn edge_normals(&self) -> impl Iterator<Item = Vec2> + '_ {
        let n = self.points.len();
        (0..n).map(move |i| {
            let a = self.points[i];
            let b = self.points[(i + 1) % n];
            Vec2::new(b.y - a.y, a.x - b.x)
        })
    }
}

/// Circles overlap strictly; tangent circles do not collide
#[inline]
pub fn circle_circle(c1: Vec2, r1: f64, c2: Vec2, r2: f64) -> bool {
    let r = r1 + r2;
    r * r > c1.distance_sq_to(c2)
}

/// AABB overlap on top-left anchored rectangles; shared edges do not collide
#[inline]
pub fn rect_rect(a_pos: Vec2, a_size: Vec2, b_pos: Vec2, b_size: Vec2) -> bool {
    if a_pos.x >= b_pos.x + b_size.x {
        return false;
    }
    if a_pos.x + a_size.x <= b_pos.x {
        return false;
    }
    if a_pos.y >= b_pos.y + b_size.y {
        return false;
    }
    if a_pos.y + a_size.y <= b_pos.y {
        return false;
    }
    true
}

/// Top-left anchored rectangle against a circle
pub fn rect_circle(rect_pos: Vec2, rect_size: Vec2, center: Vec2, radius: f64) -> bool {
    let half = rect_size / 2.0;
    let dist = (center - (rect_pos + half)).abs();

    if dist.x > half.x + radius || dist.y > half.y + radius {
        return false;
    }
    if dist.x <= half.x || dist.y <= half.y {
        return true;
    }

    let corner = Vec2::new(dist.x - half.x, dist.y - half.y);
    corner.length_sq() <= radius * radius
}

/// Segment `a`-`b` against a circle
pub fn line_circle(a: Vec2, b: Vec2, center: Vec2, radius: f64) -> bool {
    let ab = b - a;
    let len_sq = ab.length_sq();
    let t = if len_sq > 0.0 {
        ((center - a).dot(ab) / len_sq).clamp(0.0, 1.0)
    } else {
        0.0
    };
    let closest = a + ab * t;
    closest.distance_sq_to(center) < radius * radius
}

/// Intersection point of segments `a1`-`a2` and `b1`-`b2`, if any
pub fn line_line(a1: Vec2, a2: Vec2, b1: Vec2, b2: Vec2) -> Option<Vec2> {
    let r = a2 - a1;
    let s = b2 - b1;
    let denom = r.cross(s);
    if denom == 0.0 {
        return None;
    }

    let qp = b1 - a1;
    let t = qp.cross(s) / denom;
    let u = qp.cross(r) / denom;
    if (0.0..=1.0).contains(&t) && (0.0..=1.0).contains(&u) {
        Some(a1 + r * t)
    } else {
        None
    }
}

/// Separating axis test over every edge of both polygons
pub fn polygon_polygon(a: &Polygon, b: &Polygon) -> bool {
    for axis in a.edge_normals().chain(b.edge_normals()) {
        let (a_min, a_max) = a.project(axis);
        let (b_min, b_max) = b.project(axis);
        if a_max < b_min || b_max < a_min {
            return false;
        }
    }
    true
}

/// Narrow-phase test between two bodies using their collision shapes.
///
/// Circles take their diameter from the body width.
pub fn bodies_overlap(a: &Body, b: &Body) -> bool {
    if a.collision.kind == CollisionType::None || b.collision.kind == CollisionType::None {
        return false;
    }

    match (a.collision.shape, b.collision.shape) {
        (Shape::Rectangle, Shape::Rectangle) => {
            rect_rect(a.position, a.dimensions, b.position, b.dimensions)
        }
        (Shape::Circle, Shape::Circle) => {
            circle_circle(a.center(), a.radius(), b.center(), b.radius())
        }
        (Shape::Rectangle, Shape::Circle) => {
            rect_circle(a.position, a.dimensions, b.center(), b.radius())
        }
        (Shape::Circle, Shape::Rectangle) => {
            rect_circle(b.position, b.dimensions, a.center(), a.radius())
        }
    }
}
