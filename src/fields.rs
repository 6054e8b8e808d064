use crate::error::{MapperError, Result};
use crate::value::{format_timestamp, Value};
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Local type of a column
#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
    Text,
    Uuid,
    Integer,
    Float,
    Boolean,
    Timestamp,
    List(Box<FieldDescriptor>),
    Set(Box<FieldDescriptor>),
    Map(Box<FieldDescriptor>, Box<FieldDescriptor>),
}

impl FieldKind {
    pub fn is_collection(&self) -> bool {
        matches!(self, FieldKind::List(_) | FieldKind::Set(_) | FieldKind::Map(_, _))
    }

    /// Empty value used when a collection column is null
    fn empty_collection(&self) -> Option<Value> {
        match self {
            FieldKind::List(_) => Some(Value::List(Vec::new())),
            FieldKind::Set(_) => Some(Value::Set(Vec::new())),
            FieldKind::Map(_, _) => Some(Value::Map(Vec::new())),
            _ => None,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            FieldKind::Text => "text",
            FieldKind::Uuid => "uuid",
            FieldKind::Integer => "integer",
            FieldKind::Float => "float",
            FieldKind::Boolean => "boolean",
            FieldKind::Timestamp => "timestamp",
            FieldKind::List(_) => "list",
            FieldKind::Set(_) => "set",
            FieldKind::Map(_, _) => "map",
        }
    }
}

/// Default for a field: a fixed value or a generator called per record
#[derive(Clone)]
pub enum DefaultValue {
    Value(Value),
    Thunk(Arc<dyn Fn() -> Value + Send + Sync>),
}

impl DefaultValue {
    pub fn resolve(&self) -> Value {
        match self {
            DefaultValue::Value(v) => v.clone(),
            DefaultValue::Thunk(f) => f(),
        }
    }
}

impl fmt::Debug for DefaultValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DefaultValue::Value(v) => f.debug_tuple("Value").field(v).finish(),
            DefaultValue::Thunk(_) => write!(f, "Thunk(..)"),
        }
    }
}

impl PartialEq for DefaultValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (DefaultValue::Value(a), DefaultValue::Value(b)) => a == b,
            (DefaultValue::Thunk(a), DefaultValue::Thunk(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

/// Type contract of one column
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDescriptor {
    pub wire_type: String,
    pub kind: FieldKind,
    pub required: bool,
    pub default: Option<DefaultValue>,
    pub partition_key: bool,
    pub clustering_key: bool,
    pub indexed: bool,
}

impl FieldDescriptor {
    fn new(kind: FieldKind, wire_type: impl Into<String>) -> Self {
        Self {
            wire_type: wire_type.into(),
            kind,
            required: false,
            default: None,
            partition_key: false,
            clustering_key: false,
            indexed: false,
        }
    }

    /// Descriptor for a column read from the database catalog.
    ///
    /// The wire type is kept verbatim. Types the registry does not model
    /// (`decimal`, `blob`, `inet`, ...) are given the `Text` kind.
    pub fn from_wire_type(raw: &str) -> Self {
        let wire_type = raw.trim().to_string();
        let kind = parse_kind(&normalize_wire_type(raw));
        Self::new(kind, wire_type)
    }

    pub fn wire_type_name(&self) -> &str {
        &self.wire_type
    }

    pub fn is_collection(&self) -> bool {
        self.kind.is_collection()
    }

    pub fn is_key(&self) -> bool {
        self.partition_key || self.clustering_key
    }

    /// Resolve the declared default, calling the generator if there is one
    pub fn default_value(&self) -> Option<Value> {
        self.default.as_ref().map(DefaultValue::resolve)
    }

    /// Convert a wire value into the local representation
    pub fn to_local(&self, name: &str, wire: &JsonValue) -> Result<Value> {
        self.decode(name, wire)
    }

    /// Convert a local value into its wire representation
    pub fn to_wire(&self, name: &str, value: &Value) -> Result<JsonValue> {
        self.encode(name, value)
    }

    /// Check that a local value can be written to this column
    pub fn validate_value(&self, name: &str, value: &Value) -> Result<()> {
        self.encode(name, value).map(|_| ())
    }

    fn decode(&self, path: &str, wire: &JsonValue) -> Result<Value> {
        if wire.is_null() {
            return Ok(self.kind.empty_collection().unwrap_or(Value::Null));
        }

        match &self.kind {
            FieldKind::Text => wire
                .as_str()
                .map(|s| Value::Text(s.to_string()))
                .ok_or_else(|| mismatch(path, "text", wire)),
            FieldKind::Uuid => wire
                .as_str()
                .and_then(|s| Uuid::parse_str(s).ok())
                .map(Value::Uuid)
                .ok_or_else(|| mismatch(path, "uuid", wire)),
            FieldKind::Integer => wire
                .as_i64()
                .map(Value::Integer)
                .ok_or_else(|| mismatch(path, "integer", wire)),
            FieldKind::Float => wire
                .as_f64()
                .map(Value::Float)
                .ok_or_else(|| mismatch(path, "float", wire)),
            FieldKind::Boolean => wire
                .as_bool()
                .map(Value::Boolean)
                .ok_or_else(|| mismatch(path, "boolean", wire)),
            FieldKind::Timestamp => decode_timestamp(wire)
                .map(Value::Timestamp)
                .ok_or_else(|| mismatch(path, "timestamp", wire)),
            FieldKind::List(inner) => {
                let items = wire.as_array().ok_or_else(|| mismatch(path, "list", wire))?;
                let mut result = Vec::with_capacity(items.len());
                for (i, item) in items.iter().enumerate() {
                    result.push(inner.decode_element(&format!("{}[{}]", path, i), item)?);
                }
                Ok(Value::List(result))
            }
            FieldKind::Set(inner) => {
                let items = wire.as_array().ok_or_else(|| mismatch(path, "set", wire))?;
                let mut result = Vec::with_capacity(items.len());
                for (i, item) in items.iter().enumerate() {
                    result.push(inner.decode_element(&format!("{}[{}]", path, i), item)?);
                }
                Ok(Value::set(result))
            }
            FieldKind::Map(key_field, value_field) => {
                let mut entries = Vec::new();
                match wire {
                    JsonValue::Object(object) => {
                        for (k, v) in object {
                            let key_path = format!("{}{{key {:?}}}", path, k);
                            let key = key_field.decode_element(&key_path, &key_from_str(&key_field.kind, k))?;
                            let value = value_field.decode_element(&format!("{}[{:?}]", path, k), v)?;
                            entries.push((key, value));
                        }
                    }
                    JsonValue::Array(pairs) => {
                        for (i, pair) in pairs.iter().enumerate() {
                            let (k, v) = match pair.as_array().map(Vec::as_slice) {
                                Some([k, v]) => (k, v),
                                _ => return Err(mismatch(&format!("{}[{}]", path, i), "[key, value] pair", pair)),
                            };
                            let key = key_field.decode_element(&format!("{}{{key {}}}", path, k), k)?;
                            let value = value_field.decode_element(&format!("{}[{}]", path, k), v)?;
                            entries.push((key, value));
                        }
                    }
                    _ => return Err(mismatch(path, "map", wire)),
                }
                Ok(Value::map(entries))
            }
        }
    }

    fn decode_element(&self, path: &str, wire: &JsonValue) -> Result<Value> {
        if wire.is_null() {
            return Err(MapperError::conversion(path, "collections cannot contain null"));
        }
        self.decode(path, wire)
    }

    fn encode(&self, path: &str, value: &Value) -> Result<JsonValue> {
        if value.is_null() {
            return Ok(JsonValue::Null);
        }

        match (&self.kind, value) {
            (FieldKind::Text, Value::Text(s)) => Ok(JsonValue::String(s.clone())),
            (FieldKind::Uuid, Value::Uuid(u)) => Ok(JsonValue::String(u.to_string())),
            (FieldKind::Uuid, Value::Text(s)) => Uuid::parse_str(s)
                .map(|u| JsonValue::String(u.to_string()))
                .map_err(|_| value_mismatch(path, &self.kind, value)),
            (FieldKind::Integer, Value::Integer(i)) => {
                if self.wire_type == "int" && i32::try_from(*i).is_err() {
                    return Err(MapperError::conversion(
                        path,
                        format!("{} is out of range for int", i),
                    ));
                }
                Ok(JsonValue::Number((*i).into()))
            }
            (FieldKind::Float, Value::Float(f)) => serde_json::Number::from_f64(*f)
                .map(JsonValue::Number)
                .ok_or_else(|| MapperError::conversion(path, format!("{} is not a finite number", f))),
            (FieldKind::Float, Value::Integer(i)) => Ok(JsonValue::Number((*i).into())),
            (FieldKind::Boolean, Value::Boolean(b)) => Ok(JsonValue::Bool(*b)),
            (FieldKind::Timestamp, Value::Timestamp(ts)) => Ok(JsonValue::String(format_timestamp(ts))),
            (FieldKind::Timestamp, Value::Text(s)) => DateTime::parse_from_rfc3339(s)
                .map(|ts| JsonValue::String(format_timestamp(&ts.with_timezone(&Utc))))
                .map_err(|_| value_mismatch(path, &self.kind, value)),
            (FieldKind::List(inner), Value::List(items) | Value::Set(items))
            | (FieldKind::Set(inner), Value::List(items) | Value::Set(items)) => {
                let mut result = Vec::with_capacity(items.len());
                for (i, item) in items.iter().enumerate() {
                    result.push(inner.encode_element(&format!("{}[{}]", path, i), item)?);
                }
                if matches!(self.kind, FieldKind::Set(_)) {
                    let mut unique: Vec<JsonValue> = Vec::with_capacity(result.len());
                    for item in result {
                        if !unique.contains(&item) {
                            unique.push(item);
                        }
                    }
                    return Ok(JsonValue::Array(unique));
                }
                Ok(JsonValue::Array(result))
            }
            (FieldKind::Map(key_field, value_field), Value::Map(entries)) => {
                let mut pairs = Vec::with_capacity(entries.len());
                for (k, v) in entries {
                    let rendered = k.to_json();
                    let key = key_field.encode_element(&format!("{}{{key {}}}", path, rendered), k)?;
                    let value = value_field.encode_element(&format!("{}[{}]", path, rendered), v)?;
                    pairs.push((key, value));
                }
                if pairs.iter().all(|(k, _)| k.is_string()) {
                    Ok(JsonValue::Object(
                        pairs
                            .into_iter()
                            .filter_map(|(k, v)| k.as_str().map(|k| (k.to_string(), v)))
                            .collect(),
                    ))
                } else {
                    Ok(JsonValue::Array(
                        pairs.into_iter().map(|(k, v)| JsonValue::Array(vec![k, v])).collect(),
                    ))
                }
            }
            _ => Err(value_mismatch(path, &self.kind, value)),
        }
    }

    fn encode_element(&self, path: &str, value: &Value) -> Result<JsonValue> {
        if value.is_null() {
            return Err(MapperError::conversion(path, "collections cannot contain null"));
        }
        self.encode(path, value)
    }

    /// Inner descriptors of collections carry no column options
    fn validate_inner(&self) -> Result<()> {
        if self.required || self.default.is_some() || self.is_key() || self.indexed {
            return Err(MapperError::Validation(
                "collection element types cannot carry required, default, key or index options"
                    .to_string(),
            ));
        }
        match &self.kind {
            FieldKind::List(inner) | FieldKind::Set(inner) => inner.validate_inner(),
            FieldKind::Map(k, v) => {
                k.validate_inner()?;
                v.validate_inner()
            }
            _ => Ok(()),
        }
    }
}

fn mismatch(path: &str, expected: &str, wire: &JsonValue) -> MapperError {
    MapperError::conversion(path, format!("cannot convert {} to {}", wire, expected))
}

fn value_mismatch(path: &str, kind: &FieldKind, value: &Value) -> MapperError {
    MapperError::conversion(
        path,
        format!("expected {} value, got {} ({:?})", kind.name(), value.type_name(), value),
    )
}

fn decode_timestamp(wire: &JsonValue) -> Option<DateTime<Utc>> {
    match wire {
        JsonValue::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|ts| ts.with_timezone(&Utc)),
        JsonValue::Number(n) => n.as_i64().and_then(DateTime::from_timestamp_millis),
        _ => None,
    }
}

/// JSON object keys are strings; recover the typed key before decoding
fn key_from_str(kind: &FieldKind, key: &str) -> JsonValue {
    match kind {
        FieldKind::Integer | FieldKind::Float | FieldKind::Boolean => {
            serde_json::from_str(key).unwrap_or_else(|_| JsonValue::String(key.to_string()))
        }
        _ => JsonValue::String(key.to_string()),
    }
}

/// Collapse driver-reported type synonyms so equal types compare equal
pub fn normalize_wire_type(raw: &str) -> String {
    let compact: String = raw
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_ascii_lowercase();
    normalize_compact(&compact)
}

fn normalize_compact(ty: &str) -> String {
    if let (Some(open), true) = (ty.find('<'), ty.ends_with('>')) {
        let base = &ty[..open];
        let args = split_type_args(&ty[open + 1..ty.len() - 1]);

        if base == "frozen" && args.len() == 1 {
            return normalize_compact(args[0]);
        }

        let args: Vec<String> = args.into_iter().map(normalize_compact).collect();
        return format!("{}<{}>", base, args.join(","));
    }

    match ty {
        "varchar" | "ascii" | "json" => "text",
        "varint" | "smallint" | "tinyint" => "int",
        "timeuuid" => "uuid",
        other => other,
    }
    .to_string()
}

/// Split `a,map<b,c>` on top-level commas only
fn split_type_args(args: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;

    for (i, c) in args.char_indices() {
        match c {
            '<' => depth += 1,
            '>' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(&args[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&args[start..]);
    parts
}

fn parse_kind(normalized: &str) -> FieldKind {
    if let (Some(open), true) = (normalized.find('<'), normalized.ends_with('>')) {
        let args = split_type_args(&normalized[open + 1..normalized.len() - 1]);
        let inner = |i: usize| Box::new(FieldDescriptor::from_wire_type(args.get(i).copied().unwrap_or("text")));

        return match &normalized[..open] {
            "list" => FieldKind::List(inner(0)),
            "set" => FieldKind::Set(inner(0)),
            "map" => FieldKind::Map(inner(0), inner(1)),
            _ => FieldKind::Text,
        };
    }

    match normalized {
        "uuid" => FieldKind::Uuid,
        "int" | "bigint" | "counter" => FieldKind::Integer,
        "float" | "double" => FieldKind::Float,
        "boolean" => FieldKind::Boolean,
        "timestamp" => FieldKind::Timestamp,
        _ => FieldKind::Text,
    }
}

/// Field declaration, validated into a [`FieldDescriptor`] by [`Field::build`]
#[derive(Debug, Clone)]
pub struct Field {
    descriptor: FieldDescriptor,
    primary_key: bool,
}

impl Field {
    fn scalar(kind: FieldKind, wire_type: &str) -> Self {
        Self {
            descriptor: FieldDescriptor::new(kind, wire_type),
            primary_key: false,
        }
    }

    pub fn text() -> Self {
        Self::scalar(FieldKind::Text, "text")
    }

    pub fn uuid() -> Self {
        Self::scalar(FieldKind::Uuid, "uuid")
    }

    pub fn integer() -> Self {
        Self::scalar(FieldKind::Integer, "int")
    }

    pub fn bigint() -> Self {
        Self::scalar(FieldKind::Integer, "bigint")
    }

    pub fn float() -> Self {
        Self::scalar(FieldKind::Float, "float")
    }

    pub fn double() -> Self {
        Self::scalar(FieldKind::Float, "double")
    }

    pub fn boolean() -> Self {
        Self::scalar(FieldKind::Boolean, "boolean")
    }

    pub fn timestamp() -> Self {
        Self::scalar(FieldKind::Timestamp, "timestamp")
    }

    pub fn list(inner: Field) -> Self {
        let wire_type = format!("list<{}>", inner.descriptor.wire_type);
        Self {
            descriptor: FieldDescriptor::new(FieldKind::List(Box::new(inner.descriptor)), wire_type),
            primary_key: false,
        }
    }

    pub fn set(inner: Field) -> Self {
        let wire_type = format!("set<{}>", inner.descriptor.wire_type);
        Self {
            descriptor: FieldDescriptor::new(FieldKind::Set(Box::new(inner.descriptor)), wire_type),
            primary_key: false,
        }
    }

    pub fn map(key: Field, value: Field) -> Self {
        let wire_type = format!("map<{},{}>", key.descriptor.wire_type, value.descriptor.wire_type);
        Self {
            descriptor: FieldDescriptor::new(
                FieldKind::Map(Box::new(key.descriptor), Box::new(value.descriptor)),
                wire_type,
            ),
            primary_key: false,
        }
    }

    /// Mark as primary key: a partition key unless also marked clustering
    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    pub fn partition_key(mut self) -> Self {
        self.descriptor.partition_key = true;
        self
    }

    pub fn clustering_key(mut self) -> Self {
        self.descriptor.clustering_key = true;
        self
    }

    pub fn index(mut self) -> Self {
        self.descriptor.indexed = true;
        self
    }

    pub fn required(mut self) -> Self {
        self.descriptor.required = true;
        self
    }

    pub fn default(mut self, value: impl Into<Value>) -> Self {
        self.descriptor.default = Some(DefaultValue::Value(value.into()));
        self
    }

    pub fn default_with<F>(mut self, generator: F) -> Self
    where
        F: Fn() -> Value + Send + Sync + 'static,
    {
        self.descriptor.default = Some(DefaultValue::Thunk(Arc::new(generator)));
        self
    }

    /// Default to the current time when the record is written
    pub fn default_now(self) -> Self {
        self.default_with(|| Value::Timestamp(Utc::now()))
    }

    /// Validate the declaration and produce the immutable descriptor
    pub fn build(self) -> Result<FieldDescriptor> {
        let mut descriptor = self.descriptor;

        if self.primary_key && !descriptor.clustering_key {
            descriptor.partition_key = true;
        }

        if descriptor.required && descriptor.default.is_some() {
            return Err(MapperError::Validation(
                "a field cannot be both required and have a default".to_string(),
            ));
        }

        if descriptor.partition_key && descriptor.clustering_key {
            return Err(MapperError::Validation(
                "a field cannot be both a partition key and a clustering key".to_string(),
            ));
        }

        if descriptor.is_collection() && descriptor.is_key() {
            return Err(MapperError::Validation(format!(
                "collection type {} cannot be part of the primary key",
                descriptor.wire_type
            )));
        }

        match &descriptor.kind {
            FieldKind::List(inner) | FieldKind::Set(inner) => inner.validate_inner()?,
            FieldKind::Map(k, v) => {
                k.validate_inner()?;
                v.validate_inner()?;
            }
            _ => {}
        }

        if let Some(DefaultValue::Value(value)) = &descriptor.default {
            descriptor
                .validate_value("default", value)
                .map_err(|e| MapperError::Validation(format!("invalid default: {}", e)))?;
        }

        if self.primary_key
            && descriptor.kind == FieldKind::Uuid
            && descriptor.default.is_none()
            && !descriptor.required
        {
            descriptor.default = Some(DefaultValue::Thunk(Arc::new(|| Value::Uuid(Uuid::new_v4()))));
        }

        Ok(descriptor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn test_scalar_wire_types() {
        assert_eq!(Field::text().build().unwrap().wire_type_name(), "text");
        assert_eq!(Field::uuid().build().unwrap().wire_type_name(), "uuid");
        assert_eq!(Field::integer().build().unwrap().wire_type_name(), "int");
        assert_eq!(Field::bigint().build().unwrap().wire_type_name(), "bigint");
        assert_eq!(Field::float().build().unwrap().wire_type_name(), "float");
        assert_eq!(Field::double().build().unwrap().wire_type_name(), "double");
        assert_eq!(Field::boolean().build().unwrap().wire_type_name(), "boolean");
        assert_eq!(Field::timestamp().build().unwrap().wire_type_name(), "timestamp");
    }

    #[test]
    fn test_collection_wire_types() {
        let tags = Field::list(Field::text()).build().unwrap();
        assert_eq!(tags.wire_type_name(), "list<text>");

        let scores = Field::map(Field::text(), Field::list(Field::integer())).build().unwrap();
        assert_eq!(scores.wire_type_name(), "map<text,list<int>>");

        let roles = Field::set(Field::uuid()).build().unwrap();
        assert_eq!(roles.wire_type_name(), "set<uuid>");
    }

    #[test]
    fn test_required_and_default_rejected() {
        let err = Field::text().required().default("x").build().unwrap_err();
        assert!(matches!(err, MapperError::Validation(_)));
    }

    #[test]
    fn test_primary_key_is_partition_key() {
        let id = Field::integer().primary_key().build().unwrap();
        assert!(id.partition_key);
        assert!(!id.clustering_key);

        let ts = Field::timestamp().primary_key().clustering_key().build().unwrap();
        assert!(!ts.partition_key);
        assert!(ts.clustering_key);
    }

    #[test]
    fn test_uuid_primary_key_generates_default() {
        let id = Field::uuid().primary_key().build().unwrap();
        let first = id.default_value().unwrap();
        let second = id.default_value().unwrap();

        assert!(first.as_uuid().is_some());
        assert_ne!(first, second);

        let plain = Field::uuid().build().unwrap();
        assert!(plain.default.is_none());
    }

    #[test]
    fn test_collection_key_rejected() {
        let err = Field::list(Field::text()).primary_key().build().unwrap_err();
        assert!(matches!(err, MapperError::Validation(_)));
    }

    #[test]
    fn test_invalid_default_rejected() {
        let err = Field::integer().default("ten").build().unwrap_err();
        assert!(matches!(err, MapperError::Validation(_)));
    }

    #[test]
    fn test_scalar_round_trip() {
        let ts = Utc.with_ymd_and_hms(2024, 5, 17, 12, 30, 45).unwrap()
            + chrono::Duration::milliseconds(123);
        let cases = vec![
            (Field::text(), Value::from("hello")),
            (Field::uuid(), Value::Uuid(Uuid::new_v4())),
            (Field::integer(), Value::Integer(-42)),
            (Field::bigint(), Value::Integer(9_000_000_000)),
            (Field::float(), Value::Float(2.5)),
            (Field::double(), Value::Float(-0.125)),
            (Field::boolean(), Value::Boolean(true)),
            (Field::timestamp(), Value::Timestamp(ts)),
        ];

        for (field, value) in cases {
            let field = field.build().unwrap();
            let wire = field.to_wire("f", &value).unwrap();
            assert_eq!(field.to_local("f", &wire).unwrap(), value);
        }
    }

    #[test]
    fn test_null_converts_to_empty_collection() {
        let list = Field::list(Field::text()).build().unwrap();
        let set = Field::set(Field::text()).build().unwrap();
        let map = Field::map(Field::text(), Field::integer()).build().unwrap();
        let text = Field::text().build().unwrap();

        assert_eq!(list.to_local("l", &JsonValue::Null).unwrap(), Value::List(vec![]));
        assert_eq!(set.to_local("s", &JsonValue::Null).unwrap(), Value::Set(vec![]));
        assert_eq!(map.to_local("m", &JsonValue::Null).unwrap(), Value::Map(vec![]));
        assert_eq!(text.to_local("t", &JsonValue::Null).unwrap(), Value::Null);
    }

    #[test]
    fn test_text_rejects_non_string() {
        let text = Field::text().build().unwrap();
        let err = text.to_local("name", &json!(5)).unwrap_err();
        assert!(matches!(err, MapperError::Conversion { field, .. } if field == "name"));
    }

    #[test]
    fn test_list_element_error_names_position() {
        let list = Field::list(Field::integer()).build().unwrap();
        let err = list.to_local("scores", &json!([1, 2, "three"])).unwrap_err();
        assert!(matches!(err, MapperError::Conversion { field, .. } if field == "scores[2]"));

        let err = list
            .to_wire("scores", &Value::List(vec![Value::Integer(1), Value::from("x")]))
            .unwrap_err();
        assert!(matches!(err, MapperError::Conversion { field, .. } if field == "scores[1]"));
    }

    #[test]
    fn test_map_conversion() {
        let map = Field::map(Field::text(), Field::integer()).build().unwrap();
        let local = map.to_local("counts", &json!({"a": 1, "b": 2})).unwrap();
        assert_eq!(
            local,
            Value::Map(vec![
                (Value::from("a"), Value::Integer(1)),
                (Value::from("b"), Value::Integer(2)),
            ])
        );
        assert_eq!(map.to_wire("counts", &local).unwrap(), json!({"a": 1, "b": 2}));

        let err = map.to_local("counts", &json!({"a": "one"})).unwrap_err();
        assert!(matches!(err, MapperError::Conversion { field, .. } if field.starts_with("counts[")));
    }

    #[test]
    fn test_map_with_integer_keys() {
        let map = Field::map(Field::integer(), Field::text()).build().unwrap();
        let local = map.to_local("names", &json!({"1": "one"})).unwrap();
        assert_eq!(local, Value::Map(vec![(Value::Integer(1), Value::from("one"))]));
        assert_eq!(map.to_wire("names", &local).unwrap(), json!([[1, "one"]]));
    }

    #[test]
    fn test_set_deduplicates() {
        let set = Field::set(Field::text()).build().unwrap();
        let local = set.to_local("tags", &json!(["a", "b", "a"])).unwrap();
        assert_eq!(local, Value::Set(vec![Value::from("a"), Value::from("b")]));
    }

    #[test]
    fn test_int_range_checked() {
        let int = Field::integer().build().unwrap();
        assert!(int.to_wire("n", &Value::Integer(i64::from(i32::MAX) + 1)).is_err());

        let big = Field::bigint().build().unwrap();
        assert!(big.to_wire("n", &Value::Integer(i64::from(i32::MAX) + 1)).is_ok());
    }

    #[test]
    fn test_uuid_accepts_text() {
        let id = Field::uuid().build().unwrap();
        let wire = id
            .to_wire("id", &Value::from("67e55044-10b1-426f-9247-bb680e5fe0c8"))
            .unwrap();
        assert_eq!(wire, json!("67e55044-10b1-426f-9247-bb680e5fe0c8"));
        assert!(id.to_wire("id", &Value::from("not-a-uuid")).is_err());
    }

    #[test]
    fn test_normalize_wire_type() {
        assert_eq!(normalize_wire_type("varchar"), "text");
        assert_eq!(normalize_wire_type("ascii"), "text");
        assert_eq!(normalize_wire_type("varint"), "int");
        assert_eq!(normalize_wire_type("smallint"), "int");
        assert_eq!(normalize_wire_type("timeuuid"), "uuid");
        assert_eq!(normalize_wire_type("bigint"), "bigint");
        assert_eq!(normalize_wire_type("LIST<varchar>"), "list<text>");
        assert_eq!(normalize_wire_type("map<text, frozen<list<tinyint>>>"), "map<text,list<int>>");
    }

    #[test]
    fn test_from_wire_type() {
        let field = FieldDescriptor::from_wire_type("map<varchar, int>");
        assert_eq!(field.wire_type_name(), "map<varchar, int>");
        match field.kind {
            FieldKind::Map(k, v) => {
                assert_eq!(k.kind, FieldKind::Text);
                assert_eq!(v.kind, FieldKind::Integer);
            }
            other => panic!("expected map, got {:?}", other),
        }

        assert_eq!(FieldDescriptor::from_wire_type("decimal").kind, FieldKind::Text);
    }
}
