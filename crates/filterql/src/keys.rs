/// Telemetry field keys
///
/// A field key names a telemetry attribute together with where it lives
/// (its field context) and what it holds (its data type). Keys are written
/// in expressions as `[context.]name[:datatype]`.
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Telemetry signal a key belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Signal {
    Traces,
    Logs,
    Metrics,
    #[default]
    #[serde(rename = "")]
    Unspecified,
}

impl Signal {
    pub fn as_str(&self) -> &'static str {
        match self {
            Signal::Traces => "traces",
            Signal::Logs => "logs",
            Signal::Metrics => "metrics",
            Signal::Unspecified => "",
        }
    }
}

impl FromStr for Signal {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "traces" | "trace" => Ok(Signal::Traces),
            "logs" | "log" => Ok(Signal::Logs),
            "metrics" | "metric" => Ok(Signal::Metrics),
            "" => Ok(Signal::Unspecified),
            other => Err(format!("unknown signal: {}", other)),
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Namespace that disambiguates a field name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldContext {
    Resource,
    Scope,
    #[serde(alias = "tag", alias = "attributes", alias = "point")]
    Attribute,
    Span,
    Log,
    Metric,
    Trace,
    Event,
    Body,
    #[default]
    #[serde(rename = "")]
    Unspecified,
}

impl FieldContext {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldContext::Resource => "resource",
            FieldContext::Scope => "scope",
            FieldContext::Attribute => "attribute",
            FieldContext::Span => "span",
            FieldContext::Log => "log",
            FieldContext::Metric => "metric",
            FieldContext::Trace => "trace",
            FieldContext::Event => "event",
            FieldContext::Body => "body",
            FieldContext::Unspecified => "",
        }
    }

    /// Look up a context by name, accepting historical synonyms.
    pub fn from_name(name: &str) -> Option<FieldContext> {
        let context = match name.to_ascii_lowercase().as_str() {
            "resource" => FieldContext::Resource,
            "scope" => FieldContext::Scope,
            "attribute" | "attributes" | "tag" | "point" => FieldContext::Attribute,
            "span" => FieldContext::Span,
            "log" => FieldContext::Log,
            "metric" => FieldContext::Metric,
            "trace" => FieldContext::Trace,
            "event" => FieldContext::Event,
            "body" => FieldContext::Body,
            _ => return None,
        };
        Some(context)
    }

    pub fn is_specified(&self) -> bool {
        *self != FieldContext::Unspecified
    }
}

impl fmt::Display for FieldContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Logical data type of a field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldDataType {
    #[serde(alias = "str")]
    String,
    #[serde(alias = "boolean")]
    Bool,
    #[serde(
        alias = "int",
        alias = "int64",
        alias = "float",
        alias = "float64",
        alias = "double"
    )]
    Number,
    #[default]
    #[serde(rename = "")]
    Unspecified,
}

impl FieldDataType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldDataType::String => "string",
            FieldDataType::Bool => "bool",
            FieldDataType::Number => "number",
            FieldDataType::Unspecified => "",
        }
    }

    /// Look up a data type by name. All integer and float spellings are
    /// folded into `Number`.
    pub fn from_name(name: &str) -> Option<FieldDataType> {
        let data_type = match name.to_ascii_lowercase().as_str() {
            "string" | "str" => FieldDataType::String,
            "bool" | "boolean" => FieldDataType::Bool,
            "number" | "num" | "int" | "int8" | "int16" | "int32" | "int64" | "uint"
            | "uint8" | "uint16" | "uint32" | "uint64" | "float" | "float32" | "float64"
            | "double" => FieldDataType::Number,
            _ => return None,
        };
        Some(data_type)
    }

    pub fn is_specified(&self) -> bool {
        *self != FieldDataType::Unspecified
    }
}

impl fmt::Display for FieldDataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Storage type of a value inside the JSON body column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JsonDataType {
    #[serde(rename = "String")]
    String,
    #[serde(rename = "Int64")]
    Int64,
    #[serde(rename = "Float64")]
    Float64,
    #[serde(rename = "Bool")]
    Bool,
    #[serde(rename = "Array(String)")]
    ArrayString,
    #[serde(rename = "Array(Int64)")]
    ArrayInt64,
    #[serde(rename = "Array(Float64)")]
    ArrayFloat64,
    #[serde(rename = "Array(Bool)")]
    ArrayBool,
}

impl JsonDataType {
    pub fn as_str(&self) -> &'static str {
        match self {
            JsonDataType::String => "String",
            JsonDataType::Int64 => "Int64",
            JsonDataType::Float64 => "Float64",
            JsonDataType::Bool => "Bool",
            JsonDataType::ArrayString => "Array(String)",
            JsonDataType::ArrayInt64 => "Array(Int64)",
            JsonDataType::ArrayFloat64 => "Array(Float64)",
            JsonDataType::ArrayBool => "Array(Bool)",
        }
    }

    pub fn is_array(&self) -> bool {
        matches!(
            self,
            JsonDataType::ArrayString
                | JsonDataType::ArrayInt64
                | JsonDataType::ArrayFloat64
                | JsonDataType::ArrayBool
        )
    }
}

/// Skip index defined over a column backing a key
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexDescriptor {
    #[serde(rename = "type")]
    pub kind: String,
    pub column_expression: String,
    #[serde(default)]
    pub index_expression: String,
}

/// A telemetry field key
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryFieldKey {
    pub name: String,
    #[serde(default)]
    pub signal: Signal,
    #[serde(default)]
    pub field_context: FieldContext,
    #[serde(default)]
    pub field_data_type: FieldDataType,
    #[serde(default)]
    pub materialized: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub indexes: Vec<IndexDescriptor>,
    #[serde(default, rename = "jsonDataType", skip_serializing_if = "Option::is_none")]
    pub json_data_type: Option<JsonDataType>,
}

impl TelemetryFieldKey {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_context(mut self, context: FieldContext) -> Self {
        self.field_context = context;
        self
    }

    pub fn with_data_type(mut self, data_type: FieldDataType) -> Self {
        self.field_data_type = data_type;
        self
    }

    pub fn with_signal(mut self, signal: Signal) -> Self {
        self.signal = signal;
        self
    }

    pub fn with_materialized(mut self, materialized: bool) -> Self {
        self.materialized = materialized;
        self
    }

    /// Two keys are the same field when name, context and data type agree.
    pub fn same_field(&self, other: &TelemetryFieldKey) -> bool {
        self.name == other.name
            && self.field_context == other.field_context
            && self.field_data_type == other.field_data_type
    }

    /// Render the key back into expression syntax: `[context.]name[:datatype]`.
    pub fn to_key_text(&self) -> String {
        let mut text = String::new();
        if self.field_context.is_specified() {
            text.push_str(self.field_context.as_str());
            text.push('.');
        }
        text.push_str(&self.name);
        if self.field_data_type.is_specified() {
            text.push(':');
            text.push_str(self.field_data_type.as_str());
        }
        text
    }
}

impl fmt::Display for TelemetryFieldKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "name={}", self.name)?;
        if self.field_context.is_specified() {
            write!(f, ",context={}", self.field_context)?;
        }
        if self.field_data_type.is_specified() {
            write!(f, ",datatype={}", self.field_data_type)?;
        }
        if self.materialized {
            write!(f, ",materialized=true")?;
        }
        if let Some(json_type) = &self.json_data_type {
            write!(f, ",jsondatatype={}", json_type.as_str())?;
        }
        Ok(())
    }
}

/// Parse key text of the form `[context.]name[:datatype]`.
///
/// The context prefix and data type suffix are stripped only when they name
/// a known context or type; anything else stays part of the name.
pub fn parse_key(text: &str) -> TelemetryFieldKey {
    let mut key = TelemetryFieldKey::default();
    let mut parts: Vec<&str> = text.split('.').collect();

    if parts.len() > 1 {
        if let Some(context) = FieldContext::from_name(parts[0]) {
            key.field_context = context;
            parts.remove(0);
        }
    }

    let last = parts.pop().unwrap_or_default();
    let mut stem = last;
    if let Some(idx) = last.rfind(':') {
        if let Some(data_type) = FieldDataType::from_name(&last[idx + 1..]) {
            key.field_data_type = data_type;
            stem = &last[..idx];
        }
    }
    parts.push(stem);

    key.name = parts.join(".");
    key
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_name() {
        let key = parse_key("service.name");
        assert_eq!(key.name, "service.name");
        assert_eq!(key.field_context, FieldContext::Unspecified);
        assert_eq!(key.field_data_type, FieldDataType::Unspecified);
    }

    #[test]
    fn test_parse_context_and_type() {
        let key = parse_key("resource.service.name:string");
        assert_eq!(key.name, "service.name");
        assert_eq!(key.field_context, FieldContext::Resource);
        assert_eq!(key.field_data_type, FieldDataType::String);
    }

    #[test]
    fn test_parse_synonyms() {
        let key = parse_key("tag.http.status_code:int64");
        assert_eq!(key.field_context, FieldContext::Attribute);
        assert_eq!(key.field_data_type, FieldDataType::Number);
        assert_eq!(key.name, "http.status_code");

        let key = parse_key("Point.value:DOUBLE");
        assert_eq!(key.field_context, FieldContext::Attribute);
        assert_eq!(key.field_data_type, FieldDataType::Number);
        assert_eq!(key.name, "value");
    }

    #[test]
    fn test_context_alone_is_a_name() {
        let key = parse_key("resource");
        assert_eq!(key.name, "resource");
        assert_eq!(key.field_context, FieldContext::Unspecified);
    }

    #[test]
    fn test_unknown_suffix_stays_in_name() {
        let key = parse_key("http.url:port");
        assert_eq!(key.name, "http.url:port");
        assert_eq!(key.field_data_type, FieldDataType::Unspecified);
    }

    #[test]
    fn test_body_key() {
        let key = parse_key("body.status");
        assert_eq!(key.field_context, FieldContext::Body);
        assert_eq!(key.name, "status");
    }

    #[test]
    fn test_display() {
        let key = TelemetryFieldKey::new("duration")
            .with_context(FieldContext::Attribute)
            .with_data_type(FieldDataType::Number)
            .with_materialized(true);
        assert_eq!(
            key.to_string(),
            "name=duration,context=attribute,datatype=number,materialized=true"
        );
        assert_eq!(TelemetryFieldKey::new("x").to_string(), "name=x");
    }

    #[test]
    fn test_key_text_round_trip() {
        for text in ["attribute.http.method:string", "duration", "span.kind"] {
            let key = parse_key(text);
            assert_eq!(parse_key(&key.to_key_text()), key);
        }
    }

    #[test]
    fn test_deserialize_catalogue_entry() {
        let key: TelemetryFieldKey = serde_json::from_str(
            r#"{"name":"http.method","signal":"traces","fieldContext":"tag","fieldDataType":"str"}"#,
        )
        .unwrap();
        assert_eq!(key.field_context, FieldContext::Attribute);
        assert_eq!(key.field_data_type, FieldDataType::String);
        assert_eq!(key.signal, Signal::Traces);
        assert!(!key.materialized);
    }
}
