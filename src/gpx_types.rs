use std::borrow::Cow;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::geometry::{ElevationSummary, elevation_summary, total_distance};

/// Parsed GPX document.
///
/// Tracks are always present (possibly several); waypoints and routes are
/// `None` when the document has no such element at all.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GpxDocument {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub creator: Option<String>,
    pub metadata: GpxMetadata,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub waypoints: Option<Vec<GpxPoint>>,
    pub tracks: Vec<GpxTrack>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub routes: Option<Vec<GpxRoute>>,
}

impl GpxDocument {
    pub fn waypoints(&self) -> &[GpxPoint] {
        self.waypoints.as_deref().unwrap_or_default()
    }

    pub fn routes(&self) -> &[GpxRoute] {
        self.routes.as_deref().unwrap_or_default()
    }
}

/// Document-level `<metadata>`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GpxMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub desc: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keywords: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<GpxAuthor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link: Option<GpxLink>,
}

/// `<author>` of the document.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GpxAuthor {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<GpxEmail>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link: Option<GpxLink>,
}

/// `<email id="..." domain="..."/>`
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GpxEmail {
    pub id: String,
    pub domain: String,
}

/// A GPX link element.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GpxLink {
    pub href: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub link_type: Option<String>,
}

/// A single GPX point (used for wpt, rtept, trkpt).
///
/// Deserializes from `{lat, lon, ele?, time?, ...}` objects, the shape the
/// JS calculation entry points accept.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GpxPoint {
    pub lat: f64,
    pub lon: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ele: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cmt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub desc: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub src: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sym: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub point_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link: Option<GpxLink>,
    /// Contents of `<extensions>`, kept as the adapter produced them.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extensions: Option<JsonValue>,
}

impl GpxPoint {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self {
            lat,
            lon,
            ..Default::default()
        }
    }

    pub fn with_ele(mut self, ele: f64) -> Self {
        self.ele = Some(ele);
        self
    }

    pub fn with_time(mut self, time: impl Into<String>) -> Self {
        self.time = Some(time.into());
        self
    }

    /// The point's `<time>` as a UTC instant.
    ///
    /// Accepts RFC 3339 and zone-less ISO 8601 date-times; the latter are
    /// taken as UTC. Returns `None` when the time is absent or unreadable.
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        let raw = self.time.as_deref()?.trim();
        if let Ok(t) = DateTime::parse_from_rfc3339(raw) {
            return Some(t.with_timezone(&Utc));
        }
        match NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
            Ok(t) => Some(t.and_utc()),
            Err(e) => {
                tracing::trace!("Unreadable point time '{}': {}", raw, e);
                None
            }
        }
    }
}

/// A GPX route (<rte>).
#[derive(Debug, Clone, Default, Serialize)]
pub struct GpxRoute {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cmt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub desc: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub src: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link: Option<GpxLink>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub number: Option<u32>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub route_type: Option<String>,
    pub points: Vec<GpxPoint>,
}

impl GpxRoute {
    /// Total distance in kilometers.
    pub fn distance(&self) -> f64 {
        total_distance(&self.points)
    }

    pub fn elevation(&self) -> ElevationSummary {
        elevation_summary(&self.points)
    }
}

/// A GPX track (<trk>).
#[derive(Debug, Clone, Default, Serialize)]
pub struct GpxTrack {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cmt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub desc: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub src: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link: Option<GpxLink>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub number: Option<u32>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub track_type: Option<String>,
    pub segments: Vec<GpxSegment>,
}

impl GpxTrack {
    /// All points of the track, segments concatenated in document order.
    ///
    /// Borrows when the track has at most one segment.
    pub fn points(&self) -> Cow<'_, [GpxPoint]> {
        match self.segments.as_slice() {
            [] => Cow::Borrowed(&[][..]),
            [only] => Cow::Borrowed(only.points.as_slice()),
            segments => Cow::Owned(
                segments
                    .iter()
                    .flat_map(|s| s.points.iter().cloned())
                    .collect(),
            ),
        }
    }

    pub fn point_count(&self) -> usize {
        self.segments.iter().map(|s| s.points.len()).sum()
    }

    /// Total distance in kilometers, segments joined end to end.
    pub fn distance(&self) -> f64 {
        total_distance(&self.points())
    }

    pub fn elevation(&self) -> ElevationSummary {
        elevation_summary(&self.points())
    }
}

/// A GPX track segment (<trkseg>).
#[derive(Debug, Clone, Default, Serialize)]
pub struct GpxSegment {
    pub points: Vec<GpxPoint>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_timestamp_rfc3339() {
        let pt = GpxPoint::new(0.0, 0.0).with_time("2025-01-01T06:00:00Z");
        assert_eq!(
            pt.timestamp(),
            Some(Utc.with_ymd_and_hms(2025, 1, 1, 6, 0, 0).unwrap())
        );

        let pt = GpxPoint::new(0.0, 0.0).with_time("2025-01-01T08:00:00+02:00");
        assert_eq!(
            pt.timestamp(),
            Some(Utc.with_ymd_and_hms(2025, 1, 1, 6, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_timestamp_without_zone_is_utc() {
        let pt = GpxPoint::new(0.0, 0.0).with_time("2020-01-12T21:32:52");
        assert_eq!(
            pt.timestamp(),
            Some(Utc.with_ymd_and_hms(2020, 1, 12, 21, 32, 52).unwrap())
        );
    }

    #[test]
    fn test_timestamp_missing_or_invalid() {
        assert_eq!(GpxPoint::new(0.0, 0.0).timestamp(), None);
        assert_eq!(GpxPoint::new(0.0, 0.0).with_time("yesterday").timestamp(), None);
    }

    #[test]
    fn test_track_points_concatenate_segments() {
        let track = GpxTrack {
            segments: vec![
                GpxSegment {
                    points: vec![GpxPoint::new(1.0, 1.0), GpxPoint::new(2.0, 2.0)],
                },
                GpxSegment {
                    points: vec![GpxPoint::new(3.0, 3.0)],
                },
            ],
            ..Default::default()
        };
        let points = track.points();
        assert_eq!(points.len(), 3);
        assert_eq!(track.point_count(), 3);
        assert_eq!(points[2].lat, 3.0);
    }

    #[test]
    fn test_single_segment_points_are_borrowed() {
        let track = GpxTrack {
            segments: vec![GpxSegment {
                points: vec![GpxPoint::new(1.0, 1.0)],
            }],
            ..Default::default()
        };
        assert!(matches!(track.points(), Cow::Borrowed(_)));
    }
}
