use geojson::{Feature, FeatureCollection, Geometry, Value};
use serde::Serialize;
use serde_json::{Map, Value as JsonValue};

use crate::gpx_types::*;
use crate::options::{ConvertOptions, CoordinateMode, GpxElementType};

/// Feature collection whose coordinates are point objects.
///
/// Properties borrow from the source document, so the collection cannot
/// outlive it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeoJson<'a> {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub features: Vec<GeoJsonFeature<'a>>,
    pub properties: CollectionProperties<'a>,
}

/// Document metadata exposed on the collection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CollectionProperties<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub desc: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<&'a GpxAuthor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link: Option<&'a GpxLink>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeoJsonFeature<'a> {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub geometry: PointGeometry<'a>,
    pub properties: FeatureProperties<'a>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum GeometryKind {
    LineString,
    Point,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PointGeometry<'a> {
    #[serde(rename = "type")]
    pub kind: GeometryKind,
    pub coordinates: Vec<GeoJsonPoint<'a>>,
}

/// One coordinate of a [`GeoJsonFeature`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GeoJsonPoint<'a> {
    pub lon: f64,
    pub lat: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ele: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time: Option<&'a str>,
}

/// Descriptive fields of the track, route or waypoint behind a feature.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FeatureProperties<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cmt: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub desc: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub src: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub number: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link: Option<&'a GpxLink>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sym: Option<&'a str>,
}

/// Output of [`convert`], in whichever coordinate mode was requested.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Converted<'a> {
    Points(GeoJson<'a>),
    Positions(FeatureCollection),
}

/// Convert a document according to `opts.coordinates`.
///
/// Only `Points` mode yields exactly one feature per track, route and
/// waypoint. `Positions` mode drops tracks and routes without points.
pub fn convert<'a>(doc: &'a GpxDocument, opts: &ConvertOptions) -> Converted<'a> {
    match opts.coordinates {
        CoordinateMode::Points => Converted::Points(to_geojson_with(doc, opts)),
        CoordinateMode::Positions => Converted::Positions(to_feature_collection(doc, opts)),
    }
}

/// Project a document onto point-object features.
///
/// One LineString per track, then one per route, then one Point per
/// waypoint, so the feature count is the sum of the three.
pub fn to_geojson(doc: &GpxDocument) -> GeoJson<'_> {
    to_geojson_with(doc, &ConvertOptions::default())
}

/// Like [`to_geojson`], honoring the `types` filter of `opts`.
pub fn to_geojson_with<'a>(doc: &'a GpxDocument, opts: &ConvertOptions) -> GeoJson<'a> {
    let mut features = Vec::new();

    if opts.should_include(GpxElementType::Track) {
        for trk in &doc.tracks {
            features.push(GeoJsonFeature {
                kind: "Feature",
                geometry: PointGeometry {
                    kind: GeometryKind::LineString,
                    coordinates: trk
                        .segments
                        .iter()
                        .flat_map(|s| &s.points)
                        .map(geo_point)
                        .collect(),
                },
                properties: FeatureProperties {
                    name: trk.name.as_deref(),
                    cmt: trk.cmt.as_deref(),
                    desc: trk.desc.as_deref(),
                    src: trk.src.as_deref(),
                    number: trk.number,
                    link: trk.link.as_ref(),
                    kind: trk.track_type.as_deref(),
                    sym: None,
                },
            });
        }
    }

    if opts.should_include(GpxElementType::Route) {
        for rte in doc.routes() {
            features.push(GeoJsonFeature {
                kind: "Feature",
                geometry: PointGeometry {
                    kind: GeometryKind::LineString,
                    coordinates: rte.points.iter().map(geo_point).collect(),
                },
                properties: FeatureProperties {
                    name: rte.name.as_deref(),
                    cmt: rte.cmt.as_deref(),
                    desc: rte.desc.as_deref(),
                    src: rte.src.as_deref(),
                    number: rte.number,
                    link: rte.link.as_ref(),
                    kind: rte.route_type.as_deref(),
                    sym: None,
                },
            });
        }
    }

    if opts.should_include(GpxElementType::Waypoint) {
        for wpt in doc.waypoints() {
            features.push(GeoJsonFeature {
                kind: "Feature",
                geometry: PointGeometry {
                    kind: GeometryKind::Point,
                    coordinates: vec![GeoJsonPoint {
                        time: None,
                        ..geo_point(wpt)
                    }],
                },
                properties: FeatureProperties {
                    name: wpt.name.as_deref(),
                    cmt: wpt.cmt.as_deref(),
                    desc: wpt.desc.as_deref(),
                    sym: wpt.sym.as_deref(),
                    ..Default::default()
                },
            });
        }
    }

    let meta = &doc.metadata;
    GeoJson {
        kind: "FeatureCollection",
        features,
        properties: CollectionProperties {
            name: meta.name.as_deref(),
            desc: meta.desc.as_deref(),
            time: meta.time.as_deref(),
            author: meta.author.as_ref(),
            link: meta.link.as_ref(),
        },
    }
}

fn geo_point(pt: &GpxPoint) -> GeoJsonPoint<'_> {
    GeoJsonPoint {
        lon: pt.lon,
        lat: pt.lat,
        ele: pt.ele,
        time: pt.time.as_deref(),
    }
}

/// Convert a document to a strict GeoJSON FeatureCollection with
/// `[lon, lat]` / `[lon, lat, ele]` positions.
///
/// Features follow the same order as [`to_geojson`]. Elements without any
/// point produce no feature, and single-point tracks and routes become
/// Point features.
pub fn to_feature_collection(doc: &GpxDocument, opts: &ConvertOptions) -> FeatureCollection {
    let mut features = Vec::new();

    if opts.should_include(GpxElementType::Track) {
        features.extend(doc.tracks.iter().filter_map(|trk| track_to_feature(trk, opts)));
    }

    if opts.should_include(GpxElementType::Route) {
        for rte in doc.routes() {
            if rte.points.len() >= 2 {
                features.push(route_to_feature(rte, opts));
            } else if let [only] = rte.points.as_slice() {
                features.push(single_point_feature(only, "route", opts));
            }
        }
    }

    if opts.should_include(GpxElementType::Waypoint) {
        for wpt in doc.waypoints() {
            features.push(single_point_feature(wpt, "waypoint", opts));
        }
    }

    let foreign_members = if opts.include_metadata {
        let props = metadata_props(&doc.metadata);
        (!props.is_empty()).then(|| {
            let mut members = Map::new();
            members.insert("properties".to_string(), JsonValue::Object(props));
            members
        })
    } else {
        None
    };

    FeatureCollection {
        bbox: None,
        features,
        foreign_members,
    }
}

fn metadata_props(meta: &GpxMetadata) -> Map<String, JsonValue> {
    let mut props = Map::new();
    insert_optional(&mut props, "name", &meta.name);
    insert_optional(&mut props, "desc", &meta.desc);
    insert_optional(&mut props, "time", &meta.time);
    if let Some(author) = &meta.author {
        if let Ok(value) = serde_json::to_value(author) {
            props.insert("author".to_string(), value);
        }
    }
    insert_link(&mut props, &meta.link);
    props
}

fn line_feature(coords: Vec<Vec<f64>>, props: Map<String, JsonValue>) -> Feature {
    feature(Value::LineString(coords), props)
}

fn feature(value: Value, props: Map<String, JsonValue>) -> Feature {
    Feature {
        bbox: None,
        geometry: Some(Geometry::new(value)),
        id: None,
        properties: Some(props),
        foreign_members: None,
    }
}

fn route_to_feature(rte: &GpxRoute, opts: &ConvertOptions) -> Feature {
    let coords: Vec<Vec<f64>> = rte
        .points
        .iter()
        .map(|pt| point_coords(pt, opts.include_elevation))
        .collect();

    let mut props = Map::new();
    props.insert(
        "gpxType".to_string(),
        JsonValue::String("route".to_string()),
    );

    if opts.include_metadata {
        insert_optional(&mut props, "name", &rte.name);
        insert_optional(&mut props, "cmt", &rte.cmt);
        insert_optional(&mut props, "desc", &rte.desc);
        insert_optional(&mut props, "src", &rte.src);
        insert_optional(&mut props, "type", &rte.route_type);
        if let Some(n) = rte.number {
            props.insert("number".to_string(), JsonValue::Number(n.into()));
        }
        insert_link(&mut props, &rte.link);
    }

    if opts.include_time {
        insert_coordinate_times(&mut props, &rte.points);
    }

    line_feature(coords, props)
}

/// One feature per track: LineString for a single segment, MultiLineString
/// for several, Point when the whole track is one point.
fn track_to_feature(trk: &GpxTrack, opts: &ConvertOptions) -> Option<Feature> {
    let segments: Vec<&GpxSegment> = trk.segments.iter().filter(|s| !s.points.is_empty()).collect();

    match segments.as_slice() {
        [] => None,
        [only] if only.points.len() == 1 => {
            Some(single_point_feature(&only.points[0], "track", opts))
        }
        [only] => {
            let coords = only
                .points
                .iter()
                .map(|pt| point_coords(pt, opts.include_elevation))
                .collect();
            let mut props = build_track_props(trk, opts);
            if opts.include_time {
                insert_coordinate_times(&mut props, &only.points);
            }
            Some(line_feature(coords, props))
        }
        many => {
            let line_strings: Vec<Vec<Vec<f64>>> = many
                .iter()
                .map(|seg| {
                    seg.points
                        .iter()
                        .map(|pt| point_coords(pt, opts.include_elevation))
                        .collect()
                })
                .collect();
            let mut props = build_track_props(trk, opts);

            if opts.include_time {
                let all_times: Vec<JsonValue> = many
                    .iter()
                    .map(|seg| JsonValue::Array(point_times(&seg.points)))
                    .collect();
                let any_time = many
                    .iter()
                    .any(|seg| seg.points.iter().any(|pt| pt.time.is_some()));
                if any_time {
                    insert_times(&mut props, JsonValue::Array(all_times));
                }
            }

            Some(feature(Value::MultiLineString(line_strings), props))
        }
    }
}

fn single_point_feature(pt: &GpxPoint, gpx_type: &str, opts: &ConvertOptions) -> Feature {
    let coords = point_coords(pt, opts.include_elevation);

    let mut props = Map::new();
    props.insert(
        "gpxType".to_string(),
        JsonValue::String(gpx_type.to_string()),
    );

    if opts.include_metadata {
        insert_point_metadata(&mut props, pt);
    }

    feature(Value::Point(coords), props)
}

fn build_track_props(trk: &GpxTrack, opts: &ConvertOptions) -> Map<String, JsonValue> {
    let mut props = Map::new();
    props.insert(
        "gpxType".to_string(),
        JsonValue::String("track".to_string()),
    );

    if opts.include_metadata {
        insert_optional(&mut props, "name", &trk.name);
        insert_optional(&mut props, "cmt", &trk.cmt);
        insert_optional(&mut props, "desc", &trk.desc);
        insert_optional(&mut props, "src", &trk.src);
        insert_optional(&mut props, "type", &trk.track_type);
        if let Some(n) = trk.number {
            props.insert("number".to_string(), JsonValue::Number(n.into()));
        }
        insert_link(&mut props, &trk.link);
    }

    props
}

/// Build [lon, lat] or [lon, lat, ele] coordinate array.
fn point_coords(pt: &GpxPoint, include_elevation: bool) -> Vec<f64> {
    match (include_elevation, pt.ele) {
        (true, Some(ele)) => vec![pt.lon, pt.lat, ele],
        _ => vec![pt.lon, pt.lat],
    }
}

fn insert_point_metadata(props: &mut Map<String, JsonValue>, pt: &GpxPoint) {
    insert_optional(props, "name", &pt.name);
    insert_optional(props, "cmt", &pt.cmt);
    insert_optional(props, "desc", &pt.desc);
    insert_optional(props, "src", &pt.src);
    insert_optional(props, "sym", &pt.sym);
    insert_optional(props, "type", &pt.point_type);
    if let Some(ele) = pt.ele.and_then(serde_json::Number::from_f64) {
        props.insert("ele".to_string(), JsonValue::Number(ele));
    }
    insert_optional(props, "time", &pt.time);
    insert_link(props, &pt.link);
}

fn insert_optional(props: &mut Map<String, JsonValue>, key: &str, value: &Option<String>) {
    if let Some(v) = value {
        props.insert(key.to_string(), JsonValue::String(v.clone()));
    }
}

fn insert_link(props: &mut Map<String, JsonValue>, link: &Option<GpxLink>) {
    if let Some(link) = link {
        let mut link_obj = Map::new();
        link_obj.insert("href".to_string(), JsonValue::String(link.href.clone()));
        if let Some(ref t) = link.text {
            link_obj.insert("text".to_string(), JsonValue::String(t.clone()));
        }
        if let Some(ref lt) = link.link_type {
            link_obj.insert("type".to_string(), JsonValue::String(lt.clone()));
        }
        props.insert("link".to_string(), JsonValue::Object(link_obj));
    }
}

fn point_times(points: &[GpxPoint]) -> Vec<JsonValue> {
    points
        .iter()
        .map(|pt| match &pt.time {
            Some(t) => JsonValue::String(t.clone()),
            None => JsonValue::Null,
        })
        .collect()
}

fn insert_coordinate_times(props: &mut Map<String, JsonValue>, points: &[GpxPoint]) {
    // Only include if at least one time is present
    if points.iter().any(|pt| pt.time.is_some()) {
        insert_times(props, JsonValue::Array(point_times(points)));
    }
}

fn insert_times(props: &mut Map<String, JsonValue>, times: JsonValue) {
    let mut coord_props = Map::new();
    coord_props.insert("times".to_string(), times);
    props.insert(
        "coordinateProperties".to_string(),
        JsonValue::Object(coord_props),
    );
}
