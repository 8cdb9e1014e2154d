//! Spherical geodesy used by the cell tree.
//!
//! Poses are `(lon, lat, radius)` with angles in radians and the radius
//! measured from the Earth center. Cartesian output uses the physics
//! convention with `y` as the polar axis.

use std::f64::consts::PI;

use super::Vec3;

/// WGS84 semi-major axis (meters).
pub const WGS84_A: f64 = 6_378_137.0;
/// Sphere radius every address and LOD heuristic is scaled from.
pub const EARTH_RADIUS: f64 = WGS84_A;

pub const LON_MIN: f64 = -PI;
pub const LON_MAX: f64 = PI;
pub const LAT_MIN: f64 = -PI / 2.0;
pub const LAT_MAX: f64 = PI / 2.0;
/// Altitude band relative to the sphere surface (meters).
pub const ALT_MIN: f64 = -(PI * EARTH_RADIUS) / 1024.0;
pub const ALT_MAX: f64 = (PI * EARTH_RADIUS) / 1024.0;

pub const LON_RANGE: f64 = LON_MAX - LON_MIN;
pub const LAT_RANGE: f64 = LAT_MAX - LAT_MIN;
pub const ALT_RANGE: f64 = ALT_MAX - ALT_MIN;

/// Closest a viewpoint may get to the Earth center.
pub const VIEW_RADIUS_MIN: f64 = EARTH_RADIUS * 0.75;
/// Farthest a viewpoint may get from the Earth center.
pub const VIEW_RADIUS_MAX: f64 = EARTH_RADIUS * 3.0;

/// Default additive term of the ideal-depth falloff. Useful values sit in
/// `[9.3, 9.7]`; larger means finer cells and more data.
pub const DEFAULT_DETAIL_BIAS: f64 = 9.3;
/// The ideal depth never drops below this.
pub const MIN_DETAIL_DEPTH: f64 = 5.0;
/// Levels the server may still expand below a queried cell.
pub const SERVER_TREE_DEPTH: u32 = 7;

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct SphericalPose {
    pub lon: f64,
    pub lat: f64,
    pub radius: f64,
}

impl SphericalPose {
    pub fn new(lon: f64, lat: f64, radius: f64) -> Self {
        Self { lon, lat, radius }
    }
}

pub fn spherical_to_cartesian(pose: SphericalPose) -> Vec3 {
    let cos_lat = pose.lat.cos();
    Vec3::new(
        pose.radius * cos_lat * pose.lon.sin(),
        pose.radius * pose.lat.sin(),
        pose.radius * cos_lat * pose.lon.cos(),
    )
}

pub fn cartesian_to_spherical(p: Vec3) -> SphericalPose {
    let radius = p.length();
    if radius == 0.0 {
        return SphericalPose::new(0.0, 0.0, 0.0);
    }
    let lat = (p.y / radius).clamp(-1.0, 1.0).asin();
    let lon = p.x.atan2(p.z);
    SphericalPose::new(lon, lat, radius)
}

pub fn distance(a: Vec3, b: Vec3) -> f64 {
    (a - b).length()
}

/// Radius around the viewpoint beyond which cells are culled.
///
/// Grows with `radius` (distance of the viewpoint from the Earth center) but
/// is pulled in sharply near the surface.
pub fn distance_threshold(radius: f64) -> f64 {
    let normal = radius / EARTH_RADIUS - 1.0;
    radius * (1.0 - 0.75 * (-PI * normal * normal).exp())
}

/// Continuous depth a cell at `dist` meters should be drawn at.
pub fn ideal_depth(dist: f64, space_param: u32, bias: f64) -> f64 {
    let ceiling = f64::from(space_param) - f64::from(SERVER_TREE_DEPTH) - 2.0;
    let normal = (EARTH_RADIUS / 2.0 / (dist * 30.0)).log2() + bias;

    // Not `f64::clamp`: a small space parameter can put the ceiling under the floor.
    if normal < MIN_DETAIL_DEPTH {
        MIN_DETAIL_DEPTH
    } else if normal > ceiling {
        ceiling
    } else {
        normal
    }
}

/// Whether a cell at depth `scale` is fine enough for its distance, i.e. it
/// should be fetched instead of subdivided further.
pub fn enough_detail(dist: f64, space_param: u32, scale: usize) -> bool {
    enough_detail_with_bias(dist, space_param, scale, DEFAULT_DETAIL_BIAS)
}

pub fn enough_detail_with_bias(dist: f64, space_param: u32, scale: usize, bias: f64) -> bool {
    ideal_depth(dist, space_param, bias) - (scale as f64) < 1.0
}

/// The point traversal measures distances from.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Viewpoint {
    pose: SphericalPose,
    position: Vec3,
}

impl Viewpoint {
    /// Builds a viewpoint, clamping the radius into the allowed view band.
    pub fn from_pose(pose: SphericalPose) -> Self {
        let radius = pose.radius.clamp(VIEW_RADIUS_MIN, VIEW_RADIUS_MAX);
        let pose = SphericalPose::new(pose.lon, pose.lat, radius);
        Self {
            pose,
            position: spherical_to_cartesian(pose),
        }
    }

    pub fn from_cartesian(position: Vec3) -> Self {
        Self::from_pose(cartesian_to_spherical(position))
    }

    pub fn pose(&self) -> SphericalPose {
        self.pose
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }

    pub fn radius(&self) -> f64 {
        self.pose.radius
    }
}
