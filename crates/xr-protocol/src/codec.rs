//! XML-RPC codec
//!
//! Requests and responses are small, so decoding builds a lightweight
//! element tree first and interprets it second. Text between container
//! elements is ignored, which keeps pretty-printed documents working.

use std::io::Cursor;

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

use crate::error::ProtocolError;
use crate::value::Value;

/// A decoded `<methodCall>`
#[derive(Debug, Clone, PartialEq)]
pub struct MethodCall {
    /// Dotted method name, e.g. `VM.get_all`
    pub method: String,
    /// Positional parameters
    pub params: Vec<Value>,
}

/// Encode a `<methodCall>` document
pub fn encode_call(method: &str, params: &[Value]) -> Result<String, ProtocolError> {
    let mut w = XmlWriter::new()?;
    w.start("methodCall")?;
    w.element("methodName", method)?;
    w.start("params")?;
    for param in params {
        w.start("param")?;
        w.value(param)?;
        w.end("param")?;
    }
    w.end("params")?;
    w.end("methodCall")?;
    w.finish()
}

/// Encode a successful `<methodResponse>` carrying one value
pub fn encode_response(value: &Value) -> Result<String, ProtocolError> {
    let mut w = XmlWriter::new()?;
    w.start("methodResponse")?;
    w.start("params")?;
    w.start("param")?;
    w.value(value)?;
    w.end("param")?;
    w.end("params")?;
    w.end("methodResponse")?;
    w.finish()
}

/// Encode a `<fault>` response
pub fn encode_fault(code: i64, message: &str) -> Result<String, ProtocolError> {
    let fault = Value::structure([
        ("faultCode", Value::Int(code)),
        ("faultString", Value::from(message)),
    ]);

    let mut w = XmlWriter::new()?;
    w.start("methodResponse")?;
    w.start("fault")?;
    w.value(&fault)?;
    w.end("fault")?;
    w.end("methodResponse")?;
    w.finish()
}

/// Decode a `<methodResponse>` into its single value
///
/// A `<fault>` response is reported as [`ProtocolError::Fault`].
pub fn decode_response(xml: &str) -> Result<Value, ProtocolError> {
    let root = parse_tree(xml)?;
    root.expect_name("methodResponse")?;

    if let Some(fault) = root.find("fault") {
        let value = decode_value(fault.child("value")?)?;
        let code = value.get("faultCode").and_then(Value::as_i64).unwrap_or_default();
        let message = value
            .get("faultString")
            .map(|v| v.to_string())
            .unwrap_or_default();
        return Err(ProtocolError::Fault { code, message });
    }

    let param = root.child("params")?.child("param")?;
    decode_value(param.child("value")?)
}

/// Decode a `<methodCall>` document
pub fn decode_call(xml: &str) -> Result<MethodCall, ProtocolError> {
    let root = parse_tree(xml)?;
    root.expect_name("methodCall")?;

    let method = root.child("methodName")?.text.trim().to_string();
    let params = match root.find("params") {
        Some(params) => params
            .children
            .iter()
            .map(|param| {
                param.expect_name("param")?;
                decode_value(param.child("value")?)
            })
            .collect::<Result<Vec<_>, _>>()?,
        None => Vec::new(),
    };

    Ok(MethodCall { method, params })
}

/// Minimal element tree node
#[derive(Debug, Default)]
struct Element {
    name: String,
    text: String,
    children: Vec<Element>,
}

impl Element {
    fn new(name: String) -> Self {
        Self {
            name,
            ..Default::default()
        }
    }

    fn find(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.name == name)
    }

    fn child(&self, name: &'static str) -> Result<&Element, ProtocolError> {
        self.find(name).ok_or(ProtocolError::MissingElement(name))
    }

    fn expect_name(&self, name: &'static str) -> Result<(), ProtocolError> {
        if self.name == name {
            Ok(())
        } else {
            Err(ProtocolError::UnexpectedElement {
                expected: name,
                found: self.name.clone(),
            })
        }
    }
}

fn parse_tree(xml: &str) -> Result<Element, ProtocolError> {
    let mut reader = Reader::from_str(xml);
    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                stack.push(Element::new(String::from_utf8_lossy(e.name().as_ref()).into_owned()));
            }
            Event::Empty(e) => {
                let element = Element::new(String::from_utf8_lossy(e.name().as_ref()).into_owned());
                attach(&mut stack, &mut root, element)?;
            }
            Event::End(_) => {
                let element = stack
                    .pop()
                    .ok_or_else(|| ProtocolError::Xml("unbalanced closing tag".into()))?;
                attach(&mut stack, &mut root, element)?;
            }
            Event::Text(t) => {
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&t.unescape()?);
                }
            }
            Event::CData(c) => {
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&String::from_utf8_lossy(&c.into_inner()));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !stack.is_empty() {
        return Err(ProtocolError::Xml(format!(
            "unexpected end of document at position {}",
            reader.buffer_position()
        )));
    }

    root.ok_or_else(|| ProtocolError::Xml("empty document".into()))
}

fn attach(
    stack: &mut [Element],
    root: &mut Option<Element>,
    element: Element,
) -> Result<(), ProtocolError> {
    match stack.last_mut() {
        Some(parent) => parent.children.push(element),
        None if root.is_none() => *root = Some(element),
        None => return Err(ProtocolError::Xml("multiple root elements".into())),
    }
    Ok(())
}

fn decode_value(element: &Element) -> Result<Value, ProtocolError> {
    element.expect_name("value")?;

    // An untyped <value> is a string
    let typed = match element.children.first() {
        Some(typed) => typed,
        None => return Ok(Value::String(element.text.clone())),
    };

    let text = typed.text.trim();
    match typed.name.as_str() {
        "string" => Ok(Value::String(typed.text.clone())),
        "int" | "i4" | "i8" => text
            .parse::<i64>()
            .map(Value::Int)
            .map_err(|_| invalid("int", text)),
        "boolean" => match text {
            "1" | "true" => Ok(Value::Bool(true)),
            "0" | "false" => Ok(Value::Bool(false)),
            _ => Err(invalid("boolean", text)),
        },
        "double" => text
            .parse::<f64>()
            .map(Value::Double)
            .map_err(|_| invalid("double", text)),
        "dateTime.iso8601" => Ok(Value::DateTime(text.to_string())),
        "base64" => Ok(Value::Base64(text.to_string())),
        "nil" => Ok(Value::Nil),
        "struct" => {
            let mut members = std::collections::BTreeMap::new();
            for member in &typed.children {
                member.expect_name("member")?;
                let name = member.child("name")?.text.clone();
                let value = decode_value(member.child("value")?)?;
                members.insert(name, value);
            }
            Ok(Value::Struct(members))
        }
        "array" => {
            let data = typed.child("data")?;
            data.children
                .iter()
                .map(decode_value)
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array)
        }
        other => Err(ProtocolError::UnknownType(other.to_string())),
    }
}

fn invalid(kind: &'static str, value: &str) -> ProtocolError {
    ProtocolError::InvalidValue {
        kind,
        value: value.to_string(),
    }
}

/// Thin wrapper mapping writer failures into [`ProtocolError::Encode`]
struct XmlWriter {
    inner: Writer<Cursor<Vec<u8>>>,
}

impl XmlWriter {
    fn new() -> Result<Self, ProtocolError> {
        let mut inner = Writer::new(Cursor::new(Vec::new()));
        inner
            .write_event(Event::Decl(BytesDecl::new("1.0", None, None)))
            .map_err(encode_err)?;
        Ok(Self { inner })
    }

    fn start(&mut self, name: &str) -> Result<(), ProtocolError> {
        self.inner
            .write_event(Event::Start(BytesStart::new(name)))
            .map_err(encode_err)
    }

    fn end(&mut self, name: &str) -> Result<(), ProtocolError> {
        self.inner
            .write_event(Event::End(BytesEnd::new(name)))
            .map_err(encode_err)
    }

    fn empty(&mut self, name: &str) -> Result<(), ProtocolError> {
        self.inner
            .write_event(Event::Empty(BytesStart::new(name)))
            .map_err(encode_err)
    }

    fn text(&mut self, text: &str) -> Result<(), ProtocolError> {
        self.inner
            .write_event(Event::Text(BytesText::new(text)))
            .map_err(encode_err)
    }

    fn element(&mut self, name: &str, text: &str) -> Result<(), ProtocolError> {
        self.start(name)?;
        self.text(text)?;
        self.end(name)
    }

    fn value(&mut self, value: &Value) -> Result<(), ProtocolError> {
        self.start("value")?;
        match value {
            Value::Int(i) => {
                let tag = if i32::try_from(*i).is_ok() { "int" } else { "i8" };
                self.element(tag, &i.to_string())?;
            }
            Value::Bool(b) => self.element("boolean", if *b { "1" } else { "0" })?,
            Value::String(s) => self.element("string", s)?,
            Value::Double(d) => {
                if !d.is_finite() {
                    return Err(ProtocolError::Encode(format!("non-finite double {}", d)));
                }
                self.element("double", &d.to_string())?;
            }
            Value::DateTime(s) => self.element("dateTime.iso8601", s)?,
            Value::Base64(s) => self.element("base64", s)?,
            Value::Struct(members) => {
                self.start("struct")?;
                for (name, member) in members {
                    self.start("member")?;
                    self.element("name", name)?;
                    self.value(member)?;
                    self.end("member")?;
                }
                self.end("struct")?;
            }
            Value::Array(items) => {
                self.start("array")?;
                self.start("data")?;
                for item in items {
                    self.value(item)?;
                }
                self.end("data")?;
                self.end("array")?;
            }
            Value::Nil => self.empty("nil")?,
        }
        self.end("value")
    }

    fn finish(self) -> Result<String, ProtocolError> {
        String::from_utf8(self.inner.into_inner().into_inner())
            .map_err(|e| ProtocolError::Encode(e.to_string()))
    }
}

fn encode_err<E: std::fmt::Display>(err: E) -> ProtocolError {
    ProtocolError::Encode(err.to_string())
}
