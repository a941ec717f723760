use serde_json::{Map, Value};

use crate::error::{GpxError, Result};
use crate::gpx_types::*;
use crate::xml_tree::{self, TEXT_KEY};

type Fields = Map<String, Value>;

/// Parse a GPX XML string into a [`GpxDocument`].
///
/// Fails when the XML is malformed, when there is no `<gpx>` root or when
/// the root has no `<trk>`. `<wpt>` and `<rte>` are optional and stay `None`
/// when absent.
pub fn parse_gpx(xml: &str) -> Result<GpxDocument> {
    let mut roots = xml_tree::parse_text_tree(xml)?;
    let root = roots.remove("gpx").ok_or(GpxError::MissingRoot)?;
    let fields = match &root {
        Value::Object(fields) => fields,
        _ => return Err(GpxError::MissingTracks),
    };

    let tracks = fields.get("trk").ok_or(GpxError::MissingTracks)?;
    let doc = GpxDocument {
        version: fields.get("version").and_then(text),
        creator: fields.get("creator").and_then(text),
        metadata: fields
            .get("metadata")
            .and_then(first)
            .and_then(Value::as_object)
            .map(parse_metadata)
            .unwrap_or_default(),
        waypoints: fields
            .get("wpt")
            .map(|v| map_sequence(v, |wpt| parse_point(wpt, "wpt")))
            .transpose()?,
        tracks: map_sequence(tracks, parse_track)?,
        routes: fields
            .get("rte")
            .map(|v| map_sequence(v, parse_route))
            .transpose()?,
    };

    tracing::debug!(
        tracks = doc.tracks.len(),
        routes = doc.routes().len(),
        waypoints = doc.waypoints().len(),
        "Parsed GPX document"
    );

    Ok(doc)
}

/// Items of a value that may hold one element or an array of them.
fn sequence(value: &Value) -> &[Value] {
    match value {
        Value::Array(items) => items,
        single => std::slice::from_ref(single),
    }
}

fn first(value: &Value) -> Option<&Value> {
    sequence(value).first()
}

fn map_sequence<T>(value: &Value, f: impl Fn(&Value) -> Result<T>) -> Result<Vec<T>> {
    sequence(value).iter().map(f).collect()
}

/// Text of a leaf as written in the document.
fn text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Object(fields) => fields.get(TEXT_KEY).and_then(text),
        Value::Array(items) => items.first().and_then(text),
        _ => None,
    }
}

fn number(value: &Value) -> Option<f64> {
    match value {
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|v| v.is_finite()),
        Value::Object(fields) => fields.get(TEXT_KEY).and_then(number),
        Value::Array(items) => items.first().and_then(number),
        _ => None,
    }
}

fn field_text(fields: &Fields, key: &str) -> Option<String> {
    fields.get(key).and_then(text)
}

fn field_number(fields: &Fields, key: &str) -> Option<f64> {
    fields.get(key).and_then(number)
}

fn field_index(fields: &Fields, key: &str) -> Option<u32> {
    field_number(fields, key)
        .filter(|n| n.fract() == 0.0 && *n >= 0.0 && *n <= f64::from(u32::MAX))
        .map(|n| n as u32)
}

fn parse_metadata(fields: &Fields) -> GpxMetadata {
    GpxMetadata {
        name: field_text(fields, "name"),
        desc: field_text(fields, "desc"),
        time: field_text(fields, "time"),
        keywords: field_text(fields, "keywords"),
        author: fields
            .get("author")
            .and_then(first)
            .and_then(Value::as_object)
            .map(parse_author),
        link: parse_link(fields),
    }
}

fn parse_author(fields: &Fields) -> GpxAuthor {
    GpxAuthor {
        name: field_text(fields, "name"),
        email: fields
            .get("email")
            .and_then(first)
            .and_then(Value::as_object)
            .map(|email| GpxEmail {
                id: field_text(email, "id").unwrap_or_default(),
                domain: field_text(email, "domain").unwrap_or_default(),
            }),
        link: parse_link(fields),
    }
}

/// First `<link>` child of an element. GPX allows several; later ones are ignored.
fn parse_link(fields: &Fields) -> Option<GpxLink> {
    let link = fields.get("link").and_then(first)?;
    Some(match link {
        Value::Object(link) => GpxLink {
            href: field_text(link, "href").unwrap_or_default(),
            text: field_text(link, "text"),
            link_type: field_text(link, "type"),
        },
        // <link>url</link> without attributes
        other => GpxLink {
            href: text(other)?,
            ..Default::default()
        },
    })
}

/// Parse a point element (wpt, rtept, trkpt).
fn parse_point(value: &Value, element: &'static str) -> Result<GpxPoint> {
    let fields = value.as_object().ok_or(GpxError::InvalidPoint {
        element,
        reason: "missing lat/lon attributes",
    })?;
    let lat = field_number(fields, "lat").ok_or(GpxError::InvalidPoint {
        element,
        reason: "missing or non-numeric lat",
    })?;
    let lon = field_number(fields, "lon").ok_or(GpxError::InvalidPoint {
        element,
        reason: "missing or non-numeric lon",
    })?;

    Ok(GpxPoint {
        lat,
        lon,
        ele: field_number(fields, "ele"),
        time: field_text(fields, "time"),
        name: field_text(fields, "name"),
        cmt: field_text(fields, "cmt"),
        desc: field_text(fields, "desc"),
        src: field_text(fields, "src"),
        sym: field_text(fields, "sym"),
        point_type: field_text(fields, "type"),
        link: parse_link(fields),
        extensions: fields
            .get("extensions")
            .filter(|ext| !matches!(ext, Value::String(s) if s.is_empty()))
            .map(|ext| xml_tree::coerce_tree(ext.clone())),
    })
}

/// Parse a <rte> element.
fn parse_route(value: &Value) -> Result<GpxRoute> {
    let Some(fields) = value.as_object() else {
        return Ok(GpxRoute::default());
    };

    Ok(GpxRoute {
        name: field_text(fields, "name"),
        cmt: field_text(fields, "cmt"),
        desc: field_text(fields, "desc"),
        src: field_text(fields, "src"),
        link: parse_link(fields),
        number: field_index(fields, "number"),
        route_type: field_text(fields, "type"),
        points: match fields.get("rtept") {
            Some(points) => map_sequence(points, |pt| parse_point(pt, "rtept"))?,
            None => Vec::new(),
        },
    })
}

/// Parse a <trk> element. Segments without points are dropped.
fn parse_track(value: &Value) -> Result<GpxTrack> {
    let Some(fields) = value.as_object() else {
        return Ok(GpxTrack::default());
    };

    let mut segments = Vec::new();
    for seg in fields.get("trkseg").map(sequence).unwrap_or_default() {
        let Some(points) = seg.get("trkpt") else {
            continue;
        };
        segments.push(GpxSegment {
            points: map_sequence(points, |pt| parse_point(pt, "trkpt"))?,
        });
    }

    Ok(GpxTrack {
        name: field_text(fields, "name"),
        cmt: field_text(fields, "cmt"),
        desc: field_text(fields, "desc"),
        src: field_text(fields, "src"),
        link: parse_link(fields),
        number: field_index(fields, "number"),
        track_type: field_text(fields, "type"),
        segments,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_minimal_track() {
        let xml = r#"<?xml version="1.0"?>
<gpx version="1.1">
  <trk><trkseg><trkpt lat="35.6762" lon="139.6503"/></trkseg></trk>
</gpx>"#;
        let doc = parse_gpx(xml).unwrap();
        assert_eq!(doc.tracks.len(), 1);
        let pt = &doc.tracks[0].segments[0].points[0];
        assert!((pt.lat - 35.6762).abs() < 1e-10);
        assert!((pt.lon - 139.6503).abs() < 1e-10);
        assert_eq!(pt.ele, None);
        assert_eq!(doc.version.as_deref(), Some("1.1"));
    }

    #[test]
    fn test_waypoint_with_children() {
        let xml = r#"<?xml version="1.0"?>
<gpx version="1.1">
  <wpt lat="35.6762" lon="139.6503">
    <ele>40.5</ele>
    <time>2025-01-01T00:00:00Z</time>
    <name>Tokyo Tower</name>
    <desc>A famous landmark</desc>
    <cmt>Comment</cmt>
    <src>GPS</src>
    <sym>Flag</sym>
    <type>POI</type>
  </wpt>
  <trk/>
</gpx>"#;
        let doc = parse_gpx(xml).unwrap();
        let pt = &doc.waypoints()[0];
        assert!((pt.ele.unwrap() - 40.5).abs() < 1e-10);
        assert_eq!(pt.time.as_deref(), Some("2025-01-01T00:00:00Z"));
        assert_eq!(pt.name.as_deref(), Some("Tokyo Tower"));
        assert_eq!(pt.desc.as_deref(), Some("A famous landmark"));
        assert_eq!(pt.cmt.as_deref(), Some("Comment"));
        assert_eq!(pt.src.as_deref(), Some("GPS"));
        assert_eq!(pt.sym.as_deref(), Some("Flag"));
        assert_eq!(pt.point_type.as_deref(), Some("POI"));
    }

    #[test]
    fn test_single_and_repeated_tracks_are_sequences() {
        let one = parse_gpx("<gpx><trk><name>A</name></trk></gpx>").unwrap();
        assert_eq!(one.tracks.len(), 1);
        assert_eq!(one.tracks[0].name.as_deref(), Some("A"));

        let two = parse_gpx("<gpx><trk><name>A</name></trk><trk><name>B</name></trk></gpx>").unwrap();
        assert_eq!(two.tracks.len(), 2);
        assert_eq!(two.tracks[1].name.as_deref(), Some("B"));
    }

    #[test]
    fn test_absent_waypoints_and_routes() {
        let doc = parse_gpx("<gpx><trk/></gpx>").unwrap();
        assert!(doc.waypoints.is_none());
        assert!(doc.routes.is_none());
        assert!(doc.waypoints().is_empty());
        assert_eq!(doc.tracks.len(), 1);
        assert!(doc.tracks[0].segments.is_empty());
    }

    #[test]
    fn test_single_route_is_sequence() {
        let xml = r#"<gpx>
  <rte>
    <name>Test Route</name>
    <number>3</number>
    <rtept lat="35.0" lon="139.0"/>
    <rtept lat="36.0" lon="140.0"/>
    <rtept lat="37.0" lon="141.0"/>
  </rte>
  <trk/>
</gpx>"#;
        let doc = parse_gpx(xml).unwrap();
        let routes = doc.routes.as_ref().unwrap();
        assert_eq!(routes.len(), 1);
        assert_eq!(routes[0].name.as_deref(), Some("Test Route"));
        assert_eq!(routes[0].number, Some(3));
        assert_eq!(routes[0].points.len(), 3);
    }

    #[test]
    fn test_multi_segment_track() {
        let xml = r#"<gpx>
  <trk>
    <trkseg>
      <trkpt lat="35.0" lon="139.0"/>
      <trkpt lat="35.001" lon="139.001"/>
    </trkseg>
    <trkseg></trkseg>
    <trkseg>
      <trkpt lat="36.0" lon="140.0"/>
    </trkseg>
  </trk>
</gpx>"#;
        let doc = parse_gpx(xml).unwrap();
        let track = &doc.tracks[0];
        assert_eq!(track.segments.len(), 2);
        assert_eq!(track.segments[0].points.len(), 2);
        assert_eq!(track.segments[1].points.len(), 1);
        assert_eq!(track.points().len(), 3);
    }

    #[test]
    fn test_metadata() {
        let xml = r#"<gpx>
  <metadata>
    <name>GPX DEMO</name>
    <desc>A full featured gpx demo file</desc>
    <author>
      <name>Demo Author</name>
      <email id="demo" domain="example.com"/>
      <link href="http://example.com"><type>Web</type></link>
    </author>
    <link href="http://example.com">
      <text>Author website</text>
      <type>Web</type>
    </link>
    <time>2020-01-12T21:32:52</time>
  </metadata>
  <trk/>
</gpx>"#;
        let doc = parse_gpx(xml).unwrap();
        let meta = &doc.metadata;
        assert_eq!(meta.name.as_deref(), Some("GPX DEMO"));
        assert_eq!(meta.time.as_deref(), Some("2020-01-12T21:32:52"));
        let author = meta.author.as_ref().unwrap();
        assert_eq!(author.name.as_deref(), Some("Demo Author"));
        let email = author.email.as_ref().unwrap();
        assert_eq!((email.id.as_str(), email.domain.as_str()), ("demo", "example.com"));
        assert_eq!(author.link.as_ref().unwrap().link_type.as_deref(), Some("Web"));
        let link = meta.link.as_ref().unwrap();
        assert_eq!(link.href, "http://example.com");
        assert_eq!(link.text.as_deref(), Some("Author website"));
    }

    #[test]
    fn test_missing_metadata_is_empty() {
        let doc = parse_gpx("<gpx><trk/></gpx>").unwrap();
        assert_eq!(doc.metadata, GpxMetadata::default());
    }

    #[test]
    fn test_numeric_text_fields_stay_text() {
        let xml = r#"<gpx><wpt lat="1" lon="2"><name>42</name><ele>0</ele></wpt><trk/></gpx>"#;
        let doc = parse_gpx(xml).unwrap();
        let pt = &doc.waypoints()[0];
        assert_eq!(pt.name.as_deref(), Some("42"));
        assert_eq!(pt.ele, Some(0.0));
        assert_eq!((pt.lat, pt.lon), (1.0, 2.0));
    }

    #[test]
    fn test_text_fields_keep_spelling() {
        let xml = r#"<gpx version="1.0" creator="app 2.10">
  <trk><name>007</name><desc>2.50</desc><number>04</number></trk>
</gpx>"#;
        let doc = parse_gpx(xml).unwrap();
        assert_eq!(doc.version.as_deref(), Some("1.0"));
        assert_eq!(doc.creator.as_deref(), Some("app 2.10"));
        assert_eq!(doc.tracks[0].name.as_deref(), Some("007"));
        assert_eq!(doc.tracks[0].desc.as_deref(), Some("2.50"));
        assert_eq!(doc.tracks[0].number, Some(4));
    }

    #[test]
    fn test_extensions_kept_opaque() {
        let xml = r#"<gpx>
  <trk><trkseg>
    <trkpt lat="35.0" lon="139.0">
      <extensions>
        <gpxtpx:TrackPointExtension xmlns:gpxtpx="http://www.garmin.com/xmlschemas/TrackPointExtension/v1">
          <gpxtpx:hr>150</gpxtpx:hr>
          <gpxtpx:cad>80</gpxtpx:cad>
        </gpxtpx:TrackPointExtension>
      </extensions>
    </trkpt>
    <trkpt lat="35.1" lon="139.0"><extensions/></trkpt>
  </trkseg></trk>
</gpx>"#;
        let doc = parse_gpx(xml).unwrap();
        let points = doc.tracks[0].points();
        let ext = points[0].extensions.as_ref().unwrap();
        assert_eq!(ext["gpxtpx:TrackPointExtension"]["gpxtpx:hr"], json!(150));
        assert_eq!(ext["gpxtpx:TrackPointExtension"]["gpxtpx:cad"], json!(80));
        assert_eq!(points[1].extensions, None);
    }

    #[test]
    fn test_cdata_and_entities() {
        let xml = r#"<gpx>
  <wpt lat="35.0" lon="139.0"><name><![CDATA[Test & Name]]></name><desc>Caf&#233; &amp; Bar</desc></wpt>
  <trk/>
</gpx>"#;
        let doc = parse_gpx(xml).unwrap();
        assert_eq!(doc.waypoints()[0].name.as_deref(), Some("Test & Name"));
        assert_eq!(doc.waypoints()[0].desc.as_deref(), Some("Café & Bar"));
    }

    #[test]
    fn test_missing_root() {
        assert!(matches!(
            parse_gpx("<kml><trk/></kml>"),
            Err(GpxError::MissingRoot)
        ));
    }

    #[test]
    fn test_missing_tracks() {
        let xml = r#"<gpx version="1.1"><wpt lat="1" lon="2"/></gpx>"#;
        assert!(matches!(parse_gpx(xml), Err(GpxError::MissingTracks)));
        assert!(matches!(parse_gpx("<gpx/>"), Err(GpxError::MissingTracks)));
    }

    #[test]
    fn test_point_without_coordinates() {
        let xml = r#"<gpx><wpt><name>Bad - no coords</name></wpt><trk/></gpx>"#;
        assert!(matches!(
            parse_gpx(xml),
            Err(GpxError::InvalidPoint { element: "wpt", .. })
        ));

        let xml = r#"<gpx><trk><trkseg><trkpt lat="north" lon="1"/></trkseg></trk></gpx>"#;
        assert!(matches!(
            parse_gpx(xml),
            Err(GpxError::InvalidPoint { element: "trkpt", .. })
        ));
    }

    #[test]
    fn test_malformed_xml() {
        assert!(matches!(parse_gpx("<gpx><trk></gpx>"), Err(GpxError::XmlParse(_))));
        assert!(parse_gpx("<gpx><trk>").is_err());
        assert!(parse_gpx("").is_err());
    }

    #[test]
    fn test_single_root_only() {
        assert!(matches!(
            parse_gpx("<gpx><trk/></gpx>trailing garbage"),
            Err(GpxError::ContentOutsideRoot)
        ));
        assert!(matches!(
            parse_gpx("<junk/><gpx><trk/></gpx>"),
            Err(GpxError::MultipleRoots(_))
        ));
        assert!(matches!(
            parse_gpx("<gpx><trk/></gpx><gpx><trk/></gpx>"),
            Err(GpxError::MultipleRoots(_))
        ));
    }
}
