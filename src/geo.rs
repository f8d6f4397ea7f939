//! Distance between two fixes.

use crate::sample::Sample;

/// Mean Earth radius used by the haversine formula.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Great-circle distance between two coordinates, in meters.
pub fn haversine_distance_m(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let dlat = (lat2 - lat1).to_radians();
    let dlon = (lon2 - lon1).to_radians();
    let a = (dlat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (dlon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_M * c
}

/// Distance travelled between two samples, in meters.
pub fn distance_between(from: &Sample, to: &Sample) -> f64 {
    haversine_distance_m(from.latitude, from.longitude, to.latitude, to.longitude)
}

/// Latitude reached by moving `meters` due north from `lat`.
///
/// Inverse of [`haversine_distance_m`] along a meridian; handy for building
/// fixes a known distance apart.
pub fn offset_north(lat: f64, meters: f64) -> f64 {
    lat + (meters / EARTH_RADIUS_M).to_degrees()
}
