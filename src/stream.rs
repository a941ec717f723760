use serde::Serialize;
use serde_json::Value as JsonValue;

use crate::geometry::{distance, grade_adjusted_distance};
use crate::gpx_types::GpxPoint;
use crate::options::StreamOptions;

/// Parallel series aligned with the points they were derived from.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamData {
    /// Kilometers from the previous point.
    pub distance: Vec<f64>,
    /// Elevation of the point in meters.
    pub altitude: Vec<Option<f64>>,
    /// Slope-corrected kilometers from the previous point.
    pub grade_adjusted_distance: Vec<f64>,
    /// Seconds since the previous point; `None` if either time is missing.
    pub elapsed_time: Vec<Option<f64>>,
    /// 1 when the step from the previous point counts as moving, else 0.
    pub moving_time: Vec<u8>,
    /// Same as `distance` on moving steps, 0 on stationary ones.
    pub moving_distance: Vec<f64>,
    pub extension: Vec<Option<JsonValue>>,
}

impl StreamData {
    fn with_capacity(n: usize) -> Self {
        Self {
            distance: Vec::with_capacity(n),
            altitude: Vec::with_capacity(n),
            grade_adjusted_distance: Vec::with_capacity(n),
            elapsed_time: Vec::with_capacity(n),
            moving_time: Vec::with_capacity(n),
            moving_distance: Vec::with_capacity(n),
            extension: Vec::with_capacity(n),
        }
    }

    pub fn len(&self) -> usize {
        self.distance.len()
    }

    pub fn is_empty(&self) -> bool {
        self.distance.is_empty()
    }

    /// Sum of the moving distances, in kilometers.
    pub fn total_moving_distance(&self) -> f64 {
        self.moving_distance.iter().sum()
    }
}

/// Derive per-point series from `points`.
///
/// Moving detection reads each step as one second long, so a step of `d`
/// kilometers is a speed of `d * 3600` km/h compared against
/// `opts.speed_threshold_kph`. Points without elevation, time or extensions
/// produce `None` at their index.
pub fn to_stream_data(points: &[GpxPoint], opts: &StreamOptions<'_>) -> StreamData {
    let mut stream = StreamData::with_capacity(points.len());
    let Some(first) = points.first() else {
        return stream;
    };

    stream.distance.push(0.0);
    stream.altitude.push(first.ele);
    stream.grade_adjusted_distance.push(0.0);
    stream.elapsed_time.push(Some(0.0));
    stream.moving_time.push(0);
    stream.moving_distance.push(0.0);
    stream.extension.push(process_extension(first, opts));

    for pair in points.windows(2) {
        let (prev, point) = (&pair[0], &pair[1]);
        let dist = distance(prev, point);
        let moving = dist * 3600.0 > opts.speed_threshold_kph;

        stream.distance.push(dist);
        stream.altitude.push(point.ele);
        stream
            .grade_adjusted_distance
            .push(grade_adjusted_distance(prev, point));
        stream.elapsed_time.push(elapsed_seconds(prev, point));
        stream.moving_time.push(u8::from(moving));
        stream.moving_distance.push(if moving { dist } else { 0.0 });
        stream.extension.push(process_extension(point, opts));
    }

    stream
}

fn elapsed_seconds(prev: &GpxPoint, point: &GpxPoint) -> Option<f64> {
    let delta = point.timestamp()? - prev.timestamp()?;
    Some(delta.num_milliseconds().abs() as f64 / 1000.0)
}

fn process_extension(point: &GpxPoint, opts: &StreamOptions<'_>) -> Option<JsonValue> {
    let raw = point.extensions.as_ref()?;
    Some(match opts.extension_processor {
        Some(process) => process(raw),
        None => raw.clone(),
    })
}
