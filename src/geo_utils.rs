//! # Geographic Utilities
//!
//! Distance and bounding-box helpers used by the geofence matcher.
//!
//! ## Overview
//!
//! | Function | Description |
//! |----------|-------------|
//! | [`haversine_distance`] | Great-circle distance between two GPS points |
//! | [`within_radius`] | Inclusive radius test around a center point |
//! | [`meters_to_degrees`] | Convert meters to approximate degrees at a latitude |
//! | [`compute_bounds`] | Bounding box of a GPS track |
//! | [`radius_bounds`] | Bounding box enclosing a circle around a point |
//! | [`bounds_overlap`] | Check if two bounding boxes overlap |
//!
//! ## Example
//!
//! ```rust
//! use segment_leaderboard::{GpsPoint, geo_utils};
//!
//! let summit = GpsPoint::new(39.1822403, -106.8761047);
//! let sample = GpsPoint::new(39.1830, -106.8761);
//!
//! let dist = geo_utils::haversine_distance(&summit, &sample);
//! println!("Sample is {:.0}m from the summit", dist);
//! assert!(geo_utils::within_radius(&summit, &sample, 305.0));
//! ```
//!
//! ## Coordinate System
//!
//! All functions expect WGS84 coordinates (latitude/longitude in degrees), the
//! same convention the activity streams use.

use geo::{Distance, Haversine, Point};
use crate::{Bounds, GpsPoint};

/// Slack added to radius comparisons so a sample sitting exactly on the
/// boundary is not lost to floating-point round-off.
const BOUNDARY_TOLERANCE_METERS: f64 = 1e-6;

/// Growth factor applied to geofence bounding boxes.
pub const RADIUS_BOUNDS_PADDING: f64 = 1.1;

/// Mean Earth radius used by [`geo::Haversine`].
pub const EARTH_RADIUS_METERS: f64 = 6_371_008.8;

/// Below this cosine of latitude a degree of longitude is treated as zero
/// width.
pub const POLAR_COS_EPSILON: f64 = 1e-9;

// =============================================================================
// Distance Functions
// =============================================================================

/// Calculate the great-circle distance between two GPS points using the Haversine formula.
///
/// Returns the distance in meters along the Earth's surface (spherical Earth,
/// mean radius 6,371 km).
///
/// # Example
///
/// ```rust
/// use segment_leaderboard::{GpsPoint, geo_utils};
///
/// let london = GpsPoint::new(51.5074, -0.1278);
/// let paris = GpsPoint::new(48.8566, 2.3522);
///
/// let distance = geo_utils::haversine_distance(&london, &paris);
/// assert!((distance - 343_560.0).abs() < 1000.0); // ~344 km
/// ```
#[inline]
pub fn haversine_distance(p1: &GpsPoint, p2: &GpsPoint) -> f64 {
    let point1 = Point::new(p1.longitude, p1.latitude);
    let point2 = Point::new(p2.longitude, p2.latitude);
    Haversine::distance(point1, point2)
}

/// Check whether `point` lies within `radius_meters` of `center`.
///
/// The boundary is inclusive: a point exactly `radius_meters` away matches.
#[inline]
pub fn within_radius(center: &GpsPoint, point: &GpsPoint, radius_meters: f64) -> bool {
    haversine_distance(center, point) <= radius_meters + BOUNDARY_TOLERANCE_METERS
}

/// Convert meters to approximate degrees of longitude at a given latitude.
///
/// Returns a single, conservative value (the longitude scale, which is the
/// larger of the two away from the equator) so it is safe for square search
/// areas.
///
/// # Notes
///
/// - At the equator, 1 degree ≈ 111,195 meters on the haversine sphere
/// - Within [`POLAR_COS_EPSILON`] of a pole every longitude is in reach, so
///   the full 360° span is returned
#[inline]
pub fn meters_to_degrees(meters: f64, latitude: f64) -> f64 {
    let cos_lat = latitude.to_radians().cos();
    if cos_lat < POLAR_COS_EPSILON {
        return 360.0;
    }
    (meters / (EARTH_RADIUS_METERS * cos_lat)).to_degrees()
}

// =============================================================================
// Bounding Box Functions
// =============================================================================

/// Compute the bounding box of a GPS track.
///
/// Returns `None` for an empty track.
///
/// # Example
///
/// ```rust
/// use segment_leaderboard::{GpsPoint, geo_utils};
///
/// let track = vec![
///     GpsPoint::new(51.5000, -0.1300),
///     GpsPoint::new(51.5100, -0.1200),
///     GpsPoint::new(51.5050, -0.1250),
/// ];
///
/// let bounds = geo_utils::compute_bounds(&track).unwrap();
/// assert_eq!(bounds.min_lat, 51.5000);
/// assert_eq!(bounds.max_lng, -0.1200);
/// ```
pub fn compute_bounds(points: &[GpsPoint]) -> Option<Bounds> {
    if points.is_empty() {
        return None;
    }

    let mut min_lat = f64::MAX;
    let mut max_lat = f64::MIN;
    let mut min_lng = f64::MAX;
    let mut max_lng = f64::MIN;

    for p in points {
        min_lat = min_lat.min(p.latitude);
        max_lat = max_lat.max(p.latitude);
        min_lng = min_lng.min(p.longitude);
        max_lng = max_lng.max(p.longitude);
    }

    Some(Bounds { min_lat, max_lat, min_lng, max_lng })
}

/// Bounding box that encloses every point within `radius_meters` of `center`.
///
/// The longitude half-width is the widest extent of the spherical cap,
/// `asin(sin(r / R) / cos φ)`, so it stays exact close to the poles. Padded by
/// [`RADIUS_BOUNDS_PADDING`] so samples on the boundary survive round-off.
///
/// Returns `None` when the circle reaches a pole or crosses the ±180°
/// meridian. No single lat/lng box describes those fences; callers check
/// every sample instead.
pub fn radius_bounds(center: &GpsPoint, radius_meters: f64) -> Option<Bounds> {
    let angular = radius_meters * RADIUS_BOUNDS_PADDING / EARTH_RADIUS_METERS;
    let lat_delta = angular.to_degrees();

    let min_lat = center.latitude - lat_delta;
    let max_lat = center.latitude + lat_delta;
    if min_lat <= -90.0 || max_lat >= 90.0 {
        return None;
    }

    let sin_ratio = angular.sin() / center.latitude.to_radians().cos();
    if sin_ratio >= 1.0 {
        return None;
    }
    let lng_delta = sin_ratio.asin().to_degrees();

    let min_lng = center.longitude - lng_delta;
    let max_lng = center.longitude + lng_delta;
    if min_lng < -180.0 || max_lng > 180.0 {
        return None;
    }

    Some(Bounds { min_lat, max_lat, min_lng, max_lng })
}

/// Check if two bounding boxes overlap, with an optional buffer.
///
/// Used as a cheap pre-filter: a track whose bounds do not reach a geofence's
/// bounds cannot have any sample inside it.
pub fn bounds_overlap(a: &Bounds, b: &Bounds, buffer_meters: f64, reference_lat: f64) -> bool {
    let buffer_deg = meters_to_degrees(buffer_meters, reference_lat);

    !(a.max_lat + buffer_deg < b.min_lat ||
      b.max_lat + buffer_deg < a.min_lat ||
      a.max_lng + buffer_deg < b.min_lng ||
      b.max_lng + buffer_deg < a.min_lng)
}

// =============================================================================
// Unit Tests
// =============================================================================
