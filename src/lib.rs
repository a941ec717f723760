pub mod converter;
pub mod error;
pub mod geometry;
pub mod gpx_types;
pub mod options;
pub mod parser;
pub mod stream;
pub mod xml_tree;

use std::cell::Cell;

use js_sys::{Function, Promise, Reflect};
use serde::Serialize;
use serde_json::Value as JsonValue;
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;

pub use crate::converter::{GeoJson, to_feature_collection, to_geojson};
pub use crate::error::GpxError;
pub use crate::geometry::{
    ElevationSummary, distance, elevation_summary, grade_adjusted_distance, total_distance,
};
pub use crate::gpx_types::*;
pub use crate::options::{ConvertOptions, CoordinateMode, StreamOptions};
pub use crate::parser::parse_gpx;
pub use crate::stream::{StreamData, to_stream_data};

use crate::options::{ExtensionProcessor, StreamSettings};

/// Parse a GPX string into a document object.
///
/// The returned promise rejects with the error message when the document is
/// malformed or has no track.
#[wasm_bindgen(js_name = parseGpx)]
pub fn parse_gpx_js(gpx_string: &str) -> Promise {
    console_error_panic_hook::set_once();

    match parse_logged(gpx_string).and_then(|doc| to_js(&doc)) {
        Ok(doc) => Promise::resolve(&doc),
        Err(e) => Promise::reject(&e),
    }
}

/// Convert GPX string to GeoJSON, returned as a JS object.
#[wasm_bindgen(js_name = gpxToGeoJson)]
pub fn gpx_to_geojson(gpx_string: &str, options: JsValue) -> Result<JsValue, JsValue> {
    console_error_panic_hook::set_once();

    let opts = parse_options(options)?;
    let doc = parse_logged(gpx_string)?;
    to_js(&converter::convert(&doc, &opts))
}

/// Convert GPX string to GeoJSON, returned as a JSON string.
#[wasm_bindgen(js_name = gpxToGeoJsonString)]
pub fn gpx_to_geojson_string(gpx_string: &str, options: JsValue) -> Result<String, JsValue> {
    console_error_panic_hook::set_once();

    let opts = parse_options(options)?;
    let doc = parse_logged(gpx_string)?;
    serde_json::to_string(&converter::convert(&doc, &opts))
        .map_err(|e| JsValue::from_str(&e.to_string()))
}

/// Total distance in kilometers along an array of `{lat, lon}` points.
#[wasm_bindgen(js_name = calculateTotalDistance)]
pub fn calculate_total_distance(points: JsValue) -> Result<f64, JsValue> {
    Ok(total_distance(&parse_points(points)?))
}

/// Elevation summary `{max, min, avg, pos, neg}` of an array of points.
#[wasm_bindgen(js_name = calculateElevation)]
pub fn calculate_elevation(points: JsValue) -> Result<JsValue, JsValue> {
    to_js(&elevation_summary(&parse_points(points)?))
}

/// Per-point series for an array of points.
///
/// `options` may carry `speedThreshold` (km/h) and an `extensionProcessor`
/// function applied to each point's extensions.
#[wasm_bindgen(js_name = toStreamJson)]
pub fn to_stream_json(points: JsValue, options: JsValue) -> Result<JsValue, JsValue> {
    console_error_panic_hook::set_once();

    let points = parse_points(points)?;
    let settings: StreamSettings = if options.is_undefined() || options.is_null() {
        StreamSettings::default()
    } else {
        serde_wasm_bindgen::from_value(options.clone())
            .map_err(|e| JsValue::from_str(&e.to_string()))?
    };

    let callback = extension_callback(&options)?;
    // First error raised by the callback; later points are not retried
    let failure: Cell<Option<JsValue>> = Cell::new(None);
    let processor = callback.as_ref().map(|f| {
        let failure = &failure;
        move |ext: &JsonValue| -> JsonValue {
            match call_processor(f, ext) {
                Ok(value) => value,
                Err(e) => {
                    let first = failure.take().unwrap_or(e);
                    failure.set(Some(first));
                    JsonValue::Null
                }
            }
        }
    });
    let opts = settings.with_processor(processor.as_ref().map(|p| p as ExtensionProcessor<'_>));

    let stream = to_stream_data(&points, &opts);
    if let Some(e) = failure.take() {
        tracing::warn!("extensionProcessor failed: {:?}", e);
        return Err(e);
    }
    to_js(&stream)
}

fn call_processor(f: &Function, ext: &JsonValue) -> Result<JsonValue, JsValue> {
    let out = f.call1(&JsValue::NULL, &to_js(ext)?)?;
    serde_wasm_bindgen::from_value(out).map_err(|e| JsValue::from_str(&e.to_string()))
}

fn parse_logged(gpx_string: &str) -> Result<GpxDocument, JsValue> {
    parse_gpx(gpx_string).map_err(|e| {
        tracing::warn!("Failed to parse GPX: {}", e);
        JsValue::from(e)
    })
}

fn parse_options(options: JsValue) -> Result<ConvertOptions, JsValue> {
    if options.is_undefined() || options.is_null() {
        Ok(ConvertOptions::default())
    } else {
        serde_wasm_bindgen::from_value(options).map_err(|e| JsValue::from_str(&e.to_string()))
    }
}

fn parse_points(points: JsValue) -> Result<Vec<GpxPoint>, JsValue> {
    serde_wasm_bindgen::from_value(points).map_err(|e| JsValue::from_str(&e.to_string()))
}

fn extension_callback(options: &JsValue) -> Result<Option<Function>, JsValue> {
    if !options.is_object() {
        return Ok(None);
    }
    let value = Reflect::get(options, &JsValue::from_str("extensionProcessor"))?;
    if value.is_undefined() || value.is_null() {
        return Ok(None);
    }
    value
        .dyn_into::<Function>()
        .map(Some)
        .map_err(|_| JsValue::from_str("extensionProcessor must be a function"))
}

/// Serialize with plain JS objects for maps, as JSON would.
fn to_js<T: Serialize + ?Sized>(value: &T) -> Result<JsValue, JsValue> {
    value
        .serialize(&serde_wasm_bindgen::Serializer::json_compatible())
        .map_err(|e| JsValue::from_str(&e.to_string()))
}
