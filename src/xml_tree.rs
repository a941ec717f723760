use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use serde_json::{Map, Number, Value};

use crate::error::{GpxError, Result};

/// Key holding an element's own text when it also has attributes or children.
pub const TEXT_KEY: &str = "_";

/// An element whose end tag has not been read yet.
struct OpenElement {
    name: String,
    fields: Map<String, Value>,
    text: String,
}

impl OpenElement {
    fn from_start(start: &BytesStart<'_>) -> Result<Self> {
        let mut fields = Map::new();
        for attr in start.attributes() {
            let attr = attr?;
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let raw = String::from_utf8_lossy(&attr.value);
            let value = quick_xml::escape::unescape(&raw)
                .map(|v| v.into_owned())
                .unwrap_or_else(|_| raw.to_string());
            insert_child(&mut fields, key, Value::String(value.trim().to_string()));
        }

        Ok(Self {
            name: String::from_utf8_lossy(start.name().as_ref()).into_owned(),
            fields,
            text: String::new(),
        })
    }

    fn into_value(self) -> (String, Value) {
        let text = self.text.trim();
        let value = match (self.fields.is_empty(), text.is_empty()) {
            (true, _) => Value::String(text.to_string()),
            (false, true) => Value::Object(self.fields),
            (false, false) => {
                let mut fields = self.fields;
                fields.insert(TEXT_KEY.to_string(), Value::String(text.to_string()));
                Value::Object(fields)
            }
        };
        (self.name, value)
    }
}

/// Parse XML text into a map from the root element name to its value, with
/// numeric names and values coerced to numbers.
///
/// Attributes and child elements share one object, a repeated child name
/// maps to an array in document order, text is trimmed and kept under
/// [`TEXT_KEY`] when the element also has fields, and empty elements become
/// `""`.
pub fn parse_tree(xml: &str) -> Result<Map<String, Value>> {
    Ok(coerce_fields(parse_text_tree(xml)?))
}

/// Same shape as [`parse_tree`], with every name and leaf kept as the text
/// written in the document.
pub fn parse_text_tree(xml: &str) -> Result<Map<String, Value>> {
    let mut reader = Reader::from_str(xml);
    let mut stack: Vec<OpenElement> = Vec::new();
    let mut roots = Map::new();

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                let element = OpenElement::from_start(&e)?;
                check_single_root(&stack, &roots, &element)?;
                stack.push(element);
            }
            Event::Empty(e) => {
                let element = OpenElement::from_start(&e)?;
                check_single_root(&stack, &roots, &element)?;
                let (name, value) = element.into_value();
                attach(&mut stack, &mut roots, name, value);
            }
            Event::End(_) => {
                if let Some(element) = stack.pop() {
                    let (name, value) = element.into_value();
                    attach(&mut stack, &mut roots, name, value);
                }
            }
            Event::Text(e) => {
                let text = String::from_utf8_lossy(e.as_ref());
                match stack.last_mut() {
                    Some(top) => top.text.push_str(&text),
                    None if is_blank(&text) => {}
                    None => return Err(GpxError::ContentOutsideRoot),
                }
            }
            Event::CData(e) => match stack.last_mut() {
                Some(top) => top.text.push_str(&String::from_utf8_lossy(e.as_ref())),
                None => return Err(GpxError::ContentOutsideRoot),
            },
            Event::GeneralRef(e) => {
                let Some(top) = stack.last_mut() else {
                    return Err(GpxError::ContentOutsideRoot);
                };
                if let Ok(Some(ch)) = e.resolve_char_ref() {
                    top.text.push(ch);
                } else if let Some(ch) = predefined_entity(e.as_ref()) {
                    top.text.push(ch);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if let Some(open) = stack.pop() {
        return Err(GpxError::UnclosedElement(open.name));
    }
    if roots.is_empty() {
        return Err(GpxError::Empty);
    }

    Ok(roots)
}

/// A document has exactly one top-level element.
fn check_single_root(
    stack: &[OpenElement],
    roots: &Map<String, Value>,
    element: &OpenElement,
) -> Result<()> {
    if stack.is_empty() && !roots.is_empty() {
        return Err(GpxError::MultipleRoots(element.name.clone()));
    }
    Ok(())
}

fn is_blank(text: &str) -> bool {
    text.chars().all(|c| c.is_whitespace() || c == '\u{feff}')
}

fn attach(stack: &mut [OpenElement], roots: &mut Map<String, Value>, name: String, value: Value) {
    match stack.last_mut() {
        Some(parent) => insert_child(&mut parent.fields, name, value),
        None => insert_child(roots, name, value),
    }
}

/// Insert `value` under `key`, turning the entry into an array once the key repeats.
fn insert_child(fields: &mut Map<String, Value>, key: String, value: Value) {
    match fields.get_mut(&key) {
        Some(Value::Array(items)) => items.push(value),
        Some(existing) => {
            let first = existing.take();
            *existing = Value::Array(vec![first, value]);
        }
        None => {
            fields.insert(key, value);
        }
    }
}

fn predefined_entity(name: &[u8]) -> Option<char> {
    match name {
        b"amp" => Some('&'),
        b"lt" => Some('<'),
        b"gt" => Some('>'),
        b"quot" => Some('"'),
        b"apos" => Some('\''),
        _ => None,
    }
}

/// Convert text to a JSON number when it is lexically a finite number.
pub fn coerce_value(text: &str) -> Value {
    match parse_number(text) {
        Some(n) => Value::Number(n),
        None => Value::String(text.to_string()),
    }
}

/// Coerce every leaf and name of a text tree the way [`parse_tree`] does.
pub fn coerce_tree(value: Value) -> Value {
    match value {
        Value::String(text) => coerce_value(&text),
        Value::Array(items) => Value::Array(items.into_iter().map(coerce_tree).collect()),
        Value::Object(fields) => Value::Object(coerce_fields(fields)),
        other => other,
    }
}

fn coerce_fields(fields: Map<String, Value>) -> Map<String, Value> {
    let mut coerced = Map::new();
    for (key, value) in fields {
        let name = coerce_name(&key);
        // Names such as "1" and "1.0" collapse into one repeated child
        match coerce_tree(value) {
            Value::Array(items) => {
                for item in items {
                    insert_child(&mut coerced, name.clone(), item);
                }
            }
            single => insert_child(&mut coerced, name, single),
        }
    }
    coerced
}

/// Names stay strings in the tree; numeric names are normalized to their number form.
fn coerce_name(name: &str) -> String {
    match parse_number(name) {
        Some(n) => n.to_string(),
        None => name.to_string(),
    }
}

fn parse_number(text: &str) -> Option<Number> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    let value = text.parse::<f64>().ok().filter(|v| v.is_finite())?;
    // Integers up to 2^53 are exact in f64
    if value.fract() == 0.0 && value.abs() < 9_007_199_254_740_992.0 {
        Some(Number::from(value as i64))
    } else {
        Number::from_f64(value)
    }
}
