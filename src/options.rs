use serde::Deserialize;
use serde_json::Value as JsonValue;

/// Default speed above which a point counts as moving, in km/h.
pub const DEFAULT_SPEED_THRESHOLD_KPH: f64 = 5.3;

/// Options for GPX to GeoJSON conversion.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConvertOptions {
    /// Shape of feature coordinates (default: point objects)
    #[serde(default)]
    pub coordinates: CoordinateMode,

    /// Include elevation as the 3rd position value (default: true)
    #[serde(default = "default_true")]
    pub include_elevation: bool,

    /// Include timestamps in coordinateProperties.times (default: true)
    #[serde(default = "default_true")]
    pub include_time: bool,

    /// Include metadata (name, desc, etc.) in properties (default: true)
    #[serde(default = "default_true")]
    pub include_metadata: bool,

    /// Which GPX element types to convert (default: all)
    #[serde(default)]
    pub types: Option<Vec<GpxElementType>>,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self {
            coordinates: CoordinateMode::default(),
            include_elevation: true,
            include_time: true,
            include_metadata: true,
            types: None,
        }
    }
}

impl ConvertOptions {
    pub fn should_include(&self, element_type: GpxElementType) -> bool {
        match &self.types {
            None => true,
            Some(types) => types.contains(&element_type),
        }
    }
}

/// How feature coordinates are written.
///
/// `Points` keeps every coordinate as a `{lon, lat, ele, time}` object.
/// `Positions` writes strict GeoJSON `[lon, lat, ele]` arrays; the
/// `include*` options only apply to this mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CoordinateMode {
    #[default]
    Points,
    Positions,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GpxElementType {
    Waypoint,
    Route,
    Track,
}

fn default_true() -> bool {
    true
}

/// Transforms a point's raw `<extensions>` value before it lands in a stream.
pub type ExtensionProcessor<'a> = &'a dyn Fn(&JsonValue) -> JsonValue;

/// Options for [`to_stream_data`](crate::stream::to_stream_data).
#[derive(Clone, Copy)]
pub struct StreamOptions<'a> {
    pub speed_threshold_kph: f64,
    pub extension_processor: Option<ExtensionProcessor<'a>>,
}

impl Default for StreamOptions<'_> {
    fn default() -> Self {
        Self {
            speed_threshold_kph: DEFAULT_SPEED_THRESHOLD_KPH,
            extension_processor: None,
        }
    }
}

impl std::fmt::Debug for StreamOptions<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamOptions")
            .field("speed_threshold_kph", &self.speed_threshold_kph)
            .field("extension_processor", &self.extension_processor.is_some())
            .finish()
    }
}

/// The serializable part of [`StreamOptions`], as received from JS.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamSettings {
    #[serde(default)]
    pub speed_threshold: Option<f64>,
}

impl StreamSettings {
    pub fn with_processor<'a>(&self, processor: Option<ExtensionProcessor<'a>>) -> StreamOptions<'a> {
        StreamOptions {
            speed_threshold_kph: self.speed_threshold.unwrap_or(DEFAULT_SPEED_THRESHOLD_KPH),
            extension_processor: processor,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_convert_options_defaults() {
        let opts: ConvertOptions = serde_json::from_str("{}").unwrap();
        assert_eq!(opts.coordinates, CoordinateMode::Points);
        assert!(opts.include_elevation);
        assert!(opts.include_time);
        assert!(opts.include_metadata);
        assert!(opts.should_include(GpxElementType::Route));
    }

    #[test]
    fn test_convert_options_camel_case() {
        let opts: ConvertOptions = serde_json::from_str(
            r#"{"coordinates":"positions","includeElevation":false,"types":["track"]}"#,
        )
        .unwrap();
        assert_eq!(opts.coordinates, CoordinateMode::Positions);
        assert!(!opts.include_elevation);
        assert!(opts.should_include(GpxElementType::Track));
        assert!(!opts.should_include(GpxElementType::Waypoint));
    }

    #[test]
    fn test_stream_settings() {
        let settings: StreamSettings = serde_json::from_str("{}").unwrap();
        assert_eq!(settings.with_processor(None).speed_threshold_kph, 5.3);

        let settings: StreamSettings = serde_json::from_str(r#"{"speedThreshold":0}"#).unwrap();
        assert_eq!(settings.with_processor(None).speed_threshold_kph, 0.0);
    }
}
