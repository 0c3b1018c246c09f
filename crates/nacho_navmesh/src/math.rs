use glam::{Vec2, Vec3A};

/// An axis-aligned bounding box in world space.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct Aabb3d {
    /// The minimum corner of the box.
    pub min: Vec3A,
    /// The maximum corner of the box.
    pub max: Vec3A,
}

impl Aabb3d {
    /// Creates a box from its center and half extents.
    #[inline]
    pub fn new(center: impl Into<Vec3A>, half_size: impl Into<Vec3A>) -> Self {
        let center = center.into();
        let half_size = half_size.into();
        Self {
            min: center - half_size,
            max: center + half_size,
        }
    }

    /// Computes the smallest box containing all `verts`.
    /// Returns `None` if `verts` is empty.
    pub fn from_verts(verts: &[Vec3A]) -> Option<Self> {
        let mut iter = verts.iter();
        let first = iter.next()?;
        let (min, max) = iter.fold((*first, *first), |(prev_min, prev_max), point| {
            (point.min(prev_min), point.max(prev_max))
        });
        Some(Self { min, max })
    }

    /// The center of the box.
    #[inline]
    pub fn center(&self) -> Vec3A {
        (self.min + self.max) * 0.5
    }

    /// The full extents of the box.
    #[inline]
    pub fn size(&self) -> Vec3A {
        self.max - self.min
    }

    /// Whether `point` lies inside the box or on its surface.
    #[inline]
    pub fn contains(&self, point: Vec3A) -> bool {
        point.cmpge(self.min).all() && point.cmple(self.max).all()
    }

    /// Returns a copy of the box grown by `margin` on every side.
    #[inline]
    pub fn grown(&self, margin: impl Into<Vec3A>) -> Self {
        let margin = margin.into();
        Self {
            min: self.min - margin,
            max: self.max + margin,
        }
    }
}

pub(crate) trait TriangleVertices {
    fn aabb(&self) -> Aabb3d;
    fn normal(&self) -> Vec3A;
}

impl TriangleVertices for [Vec3A; 3] {
    #[inline]
    fn aabb(&self) -> Aabb3d {
        let min = self[0].min(self[1]).min(self[2]);
        let max = self[0].max(self[1]).max(self[2]);
        Aabb3d { min, max }
    }

    #[inline]
    fn normal(&self) -> Vec3A {
        let ab = self[1] - self[0];
        let ac = self[2] - self[0];
        ab.cross(ac).normalize_or_zero()
    }
}

/// Gets the standard width (x-axis) offset for the specified direction.
/// # Arguments
/// - `direction`: The direction. [Limits: 0 <= value < 4]
/// # Returns
///
/// The width offset to apply to the current cell position to move in the direction.
#[inline]
pub(crate) fn dir_offset_x(direction: u8) -> i8 {
    const OFFSET: [i8; 4] = [-1, 0, 1, 0];
    OFFSET[direction as usize & 0x03]
}

/// Gets the standard depth (z-axis) offset for the specified direction.
/// # Arguments
/// - `direction`: The direction. [Limits: 0 <= value < 4]
/// # Returns
///
/// The depth offset to apply to the current cell position to move in the direction.
#[inline]
pub(crate) fn dir_offset_z(direction: u8) -> i8 {
    const OFFSET: [i8; 4] = [0, 1, 0, -1];
    OFFSET[direction as usize & 0x03]
}

/// Rotates a direction clockwise by one step.
#[inline]
pub(crate) fn rotate_cw(direction: u8) -> u8 {
    (direction + 1) & 0x03
}

/// Rotates a direction counter-clockwise by one step.
#[inline]
pub(crate) fn rotate_ccw(direction: u8) -> u8 {
    (direction + 3) & 0x03
}

/// The direction pointing the opposite way.
#[inline]
pub(crate) fn opposite(direction: u8) -> u8 {
    (direction + 2) & 0x03
}

/// Twice the signed area of the triangle `a, b, c` on the xz-plane.
/// Positive when `c` lies to the left of `a -> b` in an x-right, z-up frame.
#[inline]
pub(crate) fn area2(a: [i64; 2], b: [i64; 2], c: [i64; 2]) -> i64 {
    (b[0] - a[0]) * (c[1] - a[1]) - (c[0] - a[0]) * (b[1] - a[1])
}

/// Whether the segments `a -> b` and `c -> d` cross at a point interior to both.
pub(crate) fn segments_intersect_properly(
    a: [i64; 2],
    b: [i64; 2],
    c: [i64; 2],
    d: [i64; 2],
) -> bool {
    let abc = area2(a, b, c);
    let abd = area2(a, b, d);
    let cda = area2(c, d, a);
    let cdb = area2(c, d, b);
    if abc == 0 || abd == 0 || cda == 0 || cdb == 0 {
        return false;
    }
    (abc > 0) != (abd > 0) && (cda > 0) != (cdb > 0)
}

/// Squared distance from `point` to the segment `a -> b` on the plane.
pub(crate) fn distance_squared_point_segment(point: Vec2, a: Vec2, b: Vec2) -> f32 {
    closest_point_on_segment(point, a, b).distance_squared(point)
}

/// The point on segment `a -> b` that is closest to `point`.
pub(crate) fn closest_point_on_segment(point: Vec2, a: Vec2, b: Vec2) -> Vec2 {
    let ab = b - a;
    let length_squared = ab.length_squared();
    if length_squared <= f32::EPSILON {
        return a;
    }
    let t = ((point - a).dot(ab) / length_squared).clamp(0.0, 1.0);
    a + ab * t
}

/// Separating axis test between a triangle and an axis-aligned box.
/// Touching counts as an intersection.
pub(crate) fn triangle_intersects_box(triangle: [Vec3A; 3], aabb: &Aabb3d) -> bool {
    let center = aabb.center();
    let half = aabb.size() * 0.5;
    let v0 = triangle[0] - center;
    let v1 = triangle[1] - center;
    let v2 = triangle[2] - center;

    // Box face normals
    let tri_min = v0.min(v1).min(v2);
    let tri_max = v0.max(v1).max(v2);
    if tri_min.cmpgt(half).any() || tri_max.cmplt(-half).any() {
        return false;
    }

    let edges = [v1 - v0, v2 - v1, v0 - v2];

    // Triangle plane
    let normal = edges[0].cross(edges[1]);
    let radius = half.dot(normal.abs());
    let distance = normal.dot(v0);
    if distance.abs() > radius {
        return false;
    }

    // Cross products of box axes and triangle edges
    for edge in edges {
        for axis in [Vec3A::X, Vec3A::Y, Vec3A::Z] {
            let test_axis = axis.cross(edge);
            if test_axis.length_squared() <= f32::EPSILON * f32::EPSILON {
                continue;
            }
            let p0 = v0.dot(test_axis);
            let p1 = v1.dot(test_axis);
            let p2 = v2.dot(test_axis);
            let radius = half.dot(test_axis.abs());
            let min = p0.min(p1).min(p2);
            let max = p0.max(p1).max(p2);
            if min > radius || max < -radius {
                return false;
            }
        }
    }
    true
}
