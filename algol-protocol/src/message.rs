//! Admin messages: identifier, options, feedback and properties.

use crate::error::ProtocolError;
use std::collections::BTreeMap;
use std::fmt;
use std::fmt::Write as _;

/// Property carrying the opaque payload of a raw message.
pub const DATA_PROPERTY: &str = "Data";

/// Property carrying the human-readable outcome of a confirmed request.
pub const STATUS_PROPERTY: &str = "Status";

/// Property carrying the reason a request was rejected.
pub const ERROR_PROPERTY: &str = "Error";

/// Outcome reported by the responder of a message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Feedback {
    #[default]
    Unassigned = 0,
    Ok = 1,
    Error = 2,
    InvalidRequest = 3,
    InvalidCredentials = 4,
}

impl Feedback {
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn is_ok(self) -> bool {
        self == Feedback::Ok
    }
}

impl TryFrom<u8> for Feedback {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, ProtocolError> {
        match value {
            0 => Ok(Feedback::Unassigned),
            1 => Ok(Feedback::Ok),
            2 => Ok(Feedback::Error),
            3 => Ok(Feedback::InvalidRequest),
            4 => Ok(Feedback::InvalidCredentials),
            other => Err(ProtocolError::InvalidFeedback(other)),
        }
    }
}

impl fmt::Display for Feedback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Feedback::Unassigned => write!(f, "unassigned"),
            Feedback::Ok => write!(f, "ok"),
            Feedback::Error => write!(f, "error"),
            Feedback::InvalidRequest => write!(f, "invalid_request"),
            Feedback::InvalidCredentials => write!(f, "invalid_credentials"),
        }
    }
}

/// Message options bitfield.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct MessageOptions(u8);

impl MessageOptions {
    /// The payload is a single opaque "Data" property, not key/value pairs.
    pub const RAW: u8 = 1 << 0;

    pub fn new() -> Self {
        Self(0)
    }

    pub fn with_raw(mut self) -> Self {
        self.0 |= Self::RAW;
        self
    }

    pub fn is_raw(&self) -> bool {
        self.0 & Self::RAW != 0
    }

    pub fn contains(&self, bits: u8) -> bool {
        self.0 & bits == bits
    }

    pub fn bits(&self) -> u8 {
        self.0
    }

    /// Builds options from raw bits. Unknown bits are carried through untouched.
    pub fn from_bits(bits: u8) -> Self {
        Self(bits)
    }
}

/// A request or response exchanged with the admin console.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Command or event name.
    pub identifier: String,
    /// Option flags.
    pub options: MessageOptions,
    /// Outcome set by the responder.
    pub feedback: Feedback,
    properties: BTreeMap<String, Vec<u8>>,
    length: u32,
    checksum: u32,
}

impl Message {
    pub fn new(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            options: MessageOptions::new(),
            feedback: Feedback::Unassigned,
            properties: BTreeMap::new(),
            length: 0,
            checksum: 0,
        }
    }

    pub fn with_feedback(mut self, feedback: Feedback) -> Self {
        self.feedback = feedback;
        self
    }

    pub fn with_options(mut self, options: MessageOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.set_property(key, value);
        self
    }

    /// Sets a property, replacing any previous value under the same key.
    pub fn set_property(&mut self, key: impl Into<String>, value: impl ToString) {
        self.properties.insert(key.into(), value.to_string().into_bytes());
    }

    /// Sets a property to an arbitrary byte string.
    pub fn set_property_bytes(&mut self, key: impl Into<String>, value: impl Into<Vec<u8>>) {
        self.properties.insert(key.into(), value.into());
    }

    pub fn with_property_bytes(mut self, key: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        self.set_property_bytes(key, value);
        self
    }

    /// Returns the property as text, or `None` if it is absent or not UTF-8.
    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties
            .get(key)
            .and_then(|value| std::str::from_utf8(value).ok())
    }

    pub fn property_bytes(&self, key: &str) -> Option<&[u8]> {
        self.properties.get(key).map(Vec::as_slice)
    }

    /// Returns the property value, or an empty string when it is absent or
    /// not UTF-8.
    pub fn get(&self, key: &str) -> &str {
        self.property(key).unwrap_or("")
    }

    pub fn has_property(&self, key: &str) -> bool {
        self.properties.contains_key(key)
    }

    pub fn remove_property(&mut self, key: &str) -> Option<Vec<u8>> {
        self.properties.remove(key)
    }

    pub fn properties(&self) -> &BTreeMap<String, Vec<u8>> {
        &self.properties
    }

    pub fn has_option(&self, bits: u8) -> bool {
        self.options.contains(bits)
    }

    pub fn is_raw(&self) -> bool {
        self.options.is_raw()
    }

    /// Serialized payload length observed when this message was decoded.
    pub fn length(&self) -> u32 {
        self.length
    }

    /// Payload checksum observed when this message was decoded.
    pub fn checksum(&self) -> u32 {
        self.checksum
    }

    pub(crate) fn set_wire_info(&mut self, length: u32, checksum: u32) {
        self.length = length;
        self.checksum = checksum;
    }

    /// Serializes the properties into the wire payload.
    ///
    /// Raw messages carry the "Data" property verbatim; all others are
    /// flattened into `k1,v1,k2,v2,...` without escaping.
    ///
    /// An empty "Data" encodes as an empty payload, so it decodes as a raw
    /// message with no "Data" property at all.
    pub fn payload(&self) -> Result<Vec<u8>, ProtocolError> {
        if self.properties.is_empty() {
            return Ok(Vec::new());
        }

        if self.is_raw() {
            return self
                .property_bytes(DATA_PROPERTY)
                .map(<[u8]>::to_vec)
                .ok_or(ProtocolError::MissingField(DATA_PROPERTY));
        }

        let mut flat = Vec::new();
        for (key, value) in &self.properties {
            if !flat.is_empty() {
                flat.push(b',');
            }
            flat.extend_from_slice(key.as_bytes());
            flat.push(b',');
            flat.extend_from_slice(value);
        }
        Ok(flat)
    }

    /// Rebuilds the properties from a wire payload.
    pub(crate) fn load_payload(&mut self, payload: &[u8]) -> Result<(), ProtocolError> {
        if payload.is_empty() {
            return Ok(());
        }

        if self.is_raw() {
            self.set_property_bytes(DATA_PROPERTY, payload);
            return Ok(());
        }

        let tokens: Vec<&[u8]> = payload.split(|&b| b == b',').collect();
        if tokens.len() % 2 != 0 {
            return Err(ProtocolError::OddPropertyCount(tokens.len()));
        }
        for pair in tokens.chunks_exact(2) {
            let key = std::str::from_utf8(pair[0])
                .map_err(|_| ProtocolError::InvalidUtf8("property key"))?;
            self.set_property_bytes(key, pair[1]);
        }
        Ok(())
    }

    /// Renders a human-readable description for diagnostics.
    pub fn dump(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "uid: {}", self.identifier);
        let _ = writeln!(out, "unformatted? {}", if self.is_raw() { "yes" } else { "no" });
        let _ = writeln!(
            out,
            "feedback: {} ({})",
            self.feedback,
            self.feedback.as_u8()
        );
        let _ = writeln!(out, "length: {}", self.length);
        let _ = writeln!(out, "CRC: {}", self.checksum);
        let _ = writeln!(out, "properties count: {}", self.properties.len());
        out.push_str("properties: \n");
        for (key, value) in &self.properties {
            let _ = writeln!(out, "\t{} : {}", key, String::from_utf8_lossy(value));
        }
        out
    }
}

impl Default for Message {
    fn default() -> Self {
        Self::new("Unidentified Message")
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.identifier)
    }
}
