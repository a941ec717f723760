use serde::Serialize;

use crate::gpx_types::GpxPoint;

/// Mean Earth radius for great-circle distances.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Haversine distance between two points in kilometers.
///
/// Identical coordinates give exactly `0.0`.
pub fn distance(a: &GpxPoint, b: &GpxPoint) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let delta_lat = (b.lat - a.lat).to_radians();
    let delta_lon = (b.lon - a.lon).to_radians();

    let h = (delta_lat / 2.0).sin().powi(2)
        + lat1.cos() * lat2.cos() * (delta_lon / 2.0).sin().powi(2);
    // Rounding can push h just past 1 for antipodal points
    let h = h.clamp(0.0, 1.0);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());

    EARTH_RADIUS_KM * c
}

/// Sum of the distances between consecutive points, in kilometers.
pub fn total_distance(points: &[GpxPoint]) -> f64 {
    points.windows(2).map(|w| distance(&w[0], &w[1])).sum()
}

/// Slope-corrected distance between two points in kilometers.
///
/// The hypotenuse of the horizontal distance and the elevation change.
/// When either point has no elevation the change is unknown and the
/// horizontal distance is returned.
pub fn grade_adjusted_distance(a: &GpxPoint, b: &GpxPoint) -> f64 {
    let horizontal = distance(a, b);
    match (a.ele, b.ele) {
        (Some(e1), Some(e2)) => horizontal.hypot((e2 - e1) / 1000.0),
        _ => horizontal,
    }
}

/// Elevation statistics of a point sequence.
///
/// Every field is `None` when no point carries an elevation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ElevationSummary {
    pub max: Option<f64>,
    pub min: Option<f64>,
    pub avg: Option<f64>,
    /// Total climb, as a positive number of meters.
    pub pos: Option<f64>,
    /// Total descent, as a positive number of meters.
    pub neg: Option<f64>,
}

/// Elevation statistics over the points that carry an elevation.
///
/// An elevation of `0.0` is a real elevation. Gain and loss only count
/// steps between adjacent points that both have one.
pub fn elevation_summary(points: &[GpxPoint]) -> ElevationSummary {
    let mut count = 0usize;
    let mut sum = 0.0;
    let mut max = f64::NEG_INFINITY;
    let mut min = f64::INFINITY;
    let mut pos = 0.0;
    let mut neg = 0.0;

    for (i, ele) in points.iter().enumerate().filter_map(|(i, p)| Some((i, p.ele?))) {
        count += 1;
        sum += ele;
        max = max.max(ele);
        min = min.min(ele);

        if let Some(next) = points.get(i + 1).and_then(|p| p.ele) {
            let diff = next - ele;
            if diff > 0.0 {
                pos += diff;
            } else if diff < 0.0 {
                neg += diff;
            }
        }
    }

    if count == 0 {
        return ElevationSummary::default();
    }

    ElevationSummary {
        max: Some(max),
        min: Some(min),
        avg: Some(sum / count as f64),
        pos: Some(f64::abs(pos)),
        neg: Some(f64::abs(neg)),
    }
}
