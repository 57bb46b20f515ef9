use crate::types::PositionSample;

/// Mean radius of the earth in metres
pub const EARTH_RADIUS_METRES: f64 = 6_371_000.0;

/// Great-circle surface distance in metres between two samples using the
/// [haversine formula](https://en.wikipedia.org/wiki/Haversine_formula).
///
/// This is an approximation: the earth is treated as a perfect sphere and
/// elevation is ignored.
pub fn haversine_distance(from: &PositionSample, to: &PositionSample) -> f64 {
    let lat1 = from.latitude_deg().to_radians();
    let lat2 = to.latitude_deg().to_radians();
    let lat_diff = lat2 - lat1;
    let lon_diff = (to.longitude_deg() - from.longitude_deg()).to_radians();

    let a = (lat_diff / 2.0).sin().powi(2)
        + lat1.cos() * lat2.cos() * (lon_diff / 2.0).sin().powi(2);
    // rounding may push `a` marginally above 1 for antipodal points
    2.0 * EARTH_RADIUS_METRES * a.sqrt().min(1.0).asin()
}
