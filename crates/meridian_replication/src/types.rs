//! # Core Type Definitions
//!
//! Fundamental types shared by the codec, the entity store and the edit
//! dispatch layer.
//!
//! ## Key Types
//!
//! - [`ServerId`] - Identity of an authoritative entity server
//! - [`EntityId`] / [`CreatorToken`] - Confirmed and provisional entity identities
//! - [`EntityKey`] - Lookup key used by local editors
//! - [`Vec3`] / [`AABox`] - Single-precision geometry
//! - [`OctalCode`] - Path-encoded address of an octree region

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::fmt;
use std::ops::{Add, Mul, Sub};
use uuid::Uuid;

// ============================================================================
// Identities
// ============================================================================

/// Unique identifier for an authoritative entity server.
///
/// Servers announce themselves with a UUID; the jurisdiction directory and the
/// transport are both keyed by it.
///
/// # Examples
///
/// ```rust
/// use meridian_replication::ServerId;
///
/// let server = ServerId::new();
/// let parsed: ServerId = server.to_string().parse()?;
/// assert_eq!(server, parsed);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ServerId(pub Uuid);

impl ServerId {
    /// Creates a new random server ID using UUID v4.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ServerId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::str::FromStr for ServerId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

impl fmt::Display for ServerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Server-assigned numeric identity of a confirmed entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(pub u32);

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Locally generated provisional identity of an entity awaiting confirmation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CreatorToken(pub u32);

impl fmt::Display for CreatorToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "token:{}", self.0)
    }
}

/// Key used by local editors to address an entity that may or may not have
/// been confirmed by a server yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKey {
    /// The entity has a server-assigned id
    Known(EntityId),
    /// The entity is only known by the token its creator gave it
    Pending(CreatorToken),
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKey::Known(id) => write!(f, "{id}"),
            EntityKey::Pending(token) => write!(f, "{token}"),
        }
    }
}

// ============================================================================
// Geometry
// ============================================================================

/// Represents a 3D vector with single-precision floating point components.
///
/// Entity positions, velocities and box corners all use this type.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const ZERO: Vec3 = Vec3 { x: 0.0, y: 0.0, z: 0.0 };

    /// Creates a new vector with the specified components.
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Creates a vector with all three components set to `v`.
    pub const fn splat(v: f32) -> Self {
        Self { x: v, y: v, z: v }
    }

    /// Euclidean length of the vector.
    pub fn length(&self) -> f32 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    /// Euclidean distance to another point.
    pub fn distance(&self, other: Vec3) -> f32 {
        (*self - other).length()
    }
}

impl Add for Vec3 {
    type Output = Vec3;

    fn add(self, rhs: Vec3) -> Vec3 {
        Vec3::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Sub for Vec3 {
    type Output = Vec3;

    fn sub(self, rhs: Vec3) -> Vec3 {
        Vec3::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Mul<f32> for Vec3 {
    type Output = Vec3;

    fn mul(self, rhs: f32) -> Vec3 {
        Vec3::new(self.x * rhs, self.y * rhs, self.z * rhs)
    }
}

/// Axis-aligned cube described by its minimum corner and edge length.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AABox {
    pub corner: Vec3,
    pub scale: f32,
}

impl AABox {
    pub fn new(corner: Vec3, scale: f32) -> Self {
        Self { corner, scale }
    }

    /// Box of edge `2 * radius` centered on `center`.
    pub fn around(center: Vec3, radius: f32) -> Self {
        Self::new(center - Vec3::splat(radius), 2.0 * radius)
    }

    pub fn max_corner(&self) -> Vec3 {
        self.corner + Vec3::splat(self.scale)
    }

    pub fn center(&self) -> Vec3 {
        self.corner + Vec3::splat(self.scale * 0.5)
    }

    /// Returns true if `point` lies inside the box. Max faces are exclusive so
    /// that sibling boxes never both claim a point.
    pub fn contains(&self, point: Vec3) -> bool {
        let max = self.max_corner();
        point.x >= self.corner.x
            && point.y >= self.corner.y
            && point.z >= self.corner.z
            && point.x < max.x
            && point.y < max.y
            && point.z < max.z
    }

    /// Returns true if the two boxes overlap or share a face.
    pub fn touches(&self, other: &AABox) -> bool {
        let a_max = self.max_corner();
        let b_max = other.max_corner();
        self.corner.x <= b_max.x
            && other.corner.x <= a_max.x
            && self.corner.y <= b_max.y
            && other.corner.y <= a_max.y
            && self.corner.z <= b_max.z
            && other.corner.z <= a_max.z
    }
}

// ============================================================================
// Octal codes
// ============================================================================

/// Largest number of octants an address may carry. Keeps the wire form's
/// length byte and packed payload bounded.
pub const MAX_OCTAL_DEPTH: usize = 32;

/// Path-encoded address of a region in the octree.
///
/// Each element is an octant index in `0..8`: bit 2 selects the upper x half,
/// bit 1 the upper y half and bit 0 the upper z half of the parent box. The
/// empty code addresses the root.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct OctalCode(SmallVec<[u8; 16]>);

impl OctalCode {
    /// Address of the root region.
    pub fn root() -> Self {
        Self(SmallVec::new())
    }

    /// Builds a code from raw octants, masking each to three bits.
    pub fn from_octants(octants: &[u8]) -> Self {
        Self(octants.iter().map(|o| o & 0b111).collect())
    }

    pub fn octants(&self) -> &[u8] {
        &self.0
    }

    pub fn depth(&self) -> usize {
        self.0.len()
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn child(&self, octant: u8) -> Self {
        let mut octants = self.0.clone();
        octants.push(octant & 0b111);
        Self(octants)
    }

    pub fn parent(&self) -> Option<Self> {
        if self.0.is_empty() {
            return None;
        }
        let mut octants = self.0.clone();
        octants.pop();
        Some(Self(octants))
    }

    /// True if `self` is `other` or one of its ancestors.
    pub fn is_ancestor_of(&self, other: &OctalCode) -> bool {
        other.0.starts_with(&self.0)
    }

    /// Region addressed by this code inside a root cube of edge `root_scale`
    /// anchored at the origin.
    pub fn bounding_box(&self, root_scale: f32) -> AABox {
        let mut corner = Vec3::ZERO;
        let mut scale = root_scale;
        for octant in self.0.iter() {
            scale *= 0.5;
            corner = corner + octant_offset(*octant) * scale;
        }
        AABox::new(corner, scale)
    }

    /// Address of the depth-`depth` region containing `point`. Points outside
    /// the root cube are clamped onto its nearest region.
    pub fn for_point(point: Vec3, depth: usize, root_scale: f32) -> Self {
        let mut code = Self::root();
        let mut bounds = AABox::new(Vec3::ZERO, root_scale);
        for _ in 0..depth.min(MAX_OCTAL_DEPTH) {
            let octant = octant_for(&bounds, point);
            code.0.push(octant);
            let half = bounds.scale * 0.5;
            bounds = AABox::new(bounds.corner + octant_offset(octant) * half, half);
        }
        code
    }
}

impl fmt::Display for OctalCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return write!(f, "<root>");
        }
        for octant in self.0.iter() {
            write!(f, "{octant}")?;
        }
        Ok(())
    }
}

/// Unit offset of an octant's corner relative to its parent's corner.
pub(crate) fn octant_offset(octant: u8) -> Vec3 {
    Vec3::new(
        if octant & 0b100 != 0 { 1.0 } else { 0.0 },
        if octant & 0b010 != 0 { 1.0 } else { 0.0 },
        if octant & 0b001 != 0 { 1.0 } else { 0.0 },
    )
}

/// Octant of `bounds` that holds `point`.
pub(crate) fn octant_for(bounds: &AABox, point: Vec3) -> u8 {
    let center = bounds.center();
    let mut octant = 0;
    if point.x >= center.x {
        octant |= 0b100;
    }
    if point.y >= center.y {
        octant |= 0b010;
    }
    if point.z >= center.z {
        octant |= 0b001;
    }
    octant
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_box_contains_is_half_open() {
        let cube = AABox::new(Vec3::ZERO, 10.0);
        assert!(cube.contains(Vec3::new(0.0, 0.0, 0.0)));
        assert!(cube.contains(Vec3::new(9.99, 5.0, 5.0)));
        assert!(!cube.contains(Vec3::new(10.0, 5.0, 5.0)));
        assert!(!cube.contains(Vec3::new(-0.01, 5.0, 5.0)));
    }

    #[test]
    fn test_box_touches_shared_face() {
        let a = AABox::new(Vec3::ZERO, 1.0);
        let b = AABox::new(Vec3::new(1.0, 0.0, 0.0), 1.0);
        let c = AABox::new(Vec3::new(2.5, 0.0, 0.0), 1.0);
        assert!(a.touches(&b));
        assert!(!a.touches(&c));
    }

    #[test]
    fn test_octal_code_bounding_box() {
        let code = OctalCode::from_octants(&[0b111, 0b000]);
        let bounds = code.bounding_box(8.0);
        assert_eq!(bounds.corner, Vec3::new(4.0, 4.0, 4.0));
        assert_eq!(bounds.scale, 2.0);
    }

    #[test]
    fn test_octal_code_for_point_matches_box() {
        let point = Vec3::new(3.0, 7.5, 0.5);
        let code = OctalCode::for_point(point, 4, 8.0);
        assert_eq!(code.depth(), 4);
        assert!(code.bounding_box(8.0).contains(point));
    }

    #[test]
    fn test_octal_code_ancestry() {
        let parent = OctalCode::from_octants(&[3, 5]);
        let child = parent.child(7);
        assert!(parent.is_ancestor_of(&child));
        assert!(parent.is_ancestor_of(&parent));
        assert!(!child.is_ancestor_of(&parent));
        assert!(OctalCode::root().is_ancestor_of(&child));
        assert_eq!(child.parent(), Some(parent));
    }
}
