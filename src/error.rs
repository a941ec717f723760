use quick_xml::events::attributes::AttrError;
use wasm_bindgen::JsValue;

/// Errors raised while turning GPX text into a [`GpxDocument`](crate::gpx_types::GpxDocument).
///
/// Every variant means the document as a whole is unusable; missing
/// elevations or timestamps on individual points are never reported here.
#[derive(Debug, thiserror::Error)]
pub enum GpxError {
    #[error("XML parse error: {0}")]
    XmlParse(#[from] quick_xml::Error),

    #[error("XML attribute error: {0}")]
    XmlAttribute(#[from] AttrError),

    #[error("Unexpected end of document inside <{0}>")]
    UnclosedElement(String),

    #[error("Document contains no XML element")]
    Empty,

    #[error("Unexpected content outside the root element")]
    ContentOutsideRoot,

    #[error("Unexpected second root element <{0}>")]
    MultipleRoots(String),

    #[error("Missing <gpx> root element")]
    MissingRoot,

    #[error("Missing <trk> element in <gpx>")]
    MissingTracks,

    #[error("Invalid <{element}>: {reason}")]
    InvalidPoint {
        element: &'static str,
        reason: &'static str,
    },
}

pub type Result<T> = std::result::Result<T, GpxError>;

impl From<GpxError> for JsValue {
    fn from(e: GpxError) -> Self {
        JsValue::from_str(&e.to_string())
    }
}
