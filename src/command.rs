//! Inbound commands and per-kind payload schemas.

use serde_json::{Map, Value};

use crate::engine::{Arg, ArgList, MAX_ARGS};
use crate::error::{MessageError, PayloadError};

/// Kinds that start engine initialization. `init-wasm` is the legacy name.
pub const INIT_KINDS: [&str; 2] = ["init", "init-wasm"];

/// Fields that may carry the engine module bytes, in lookup order.
const MODULE_FIELDS: [&str; 2] = ["payload", "wasmBytes"];

#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Fields(Map<String, Value>),
    Module(Vec<u8>),
}

/// A tagged instruction from the control context.
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    kind: String,
    payload: Payload,
}

impl Command {
    pub fn new(kind: impl Into<String>, fields: Map<String, Value>) -> Self {
        Command {
            kind: kind.into(),
            payload: Payload::Fields(fields),
        }
    }

    /// A command with no payload fields, e.g. `all-notes-off`.
    pub fn bare(kind: impl Into<String>) -> Self {
        Command::new(kind, Map::new())
    }

    pub fn init(module: impl Into<Vec<u8>>) -> Self {
        Command {
            kind: INIT_KINDS[0].to_string(),
            payload: Payload::Module(module.into()),
        }
    }

    /// Parse a flat wire message: `{kind, ...fields}`.
    ///
    /// The tag is read from `kind`, falling back to `type`. Initialization
    /// messages carry their module as an array of byte values.
    pub fn from_value(value: Value) -> Result<Command, MessageError> {
        let Value::Object(mut fields) = value else {
            return Err(MessageError::NotAnObject);
        };
        let kind = match fields.remove("kind").or_else(|| fields.remove("type")) {
            Some(Value::String(kind)) => kind,
            _ => return Err(MessageError::MissingKind),
        };

        if INIT_KINDS.contains(&kind.as_str()) {
            let module = module_bytes(&fields)?;
            return Ok(Command {
                kind,
                payload: Payload::Module(module),
            });
        }

        Ok(Command {
            kind,
            payload: Payload::Fields(fields),
        })
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn is_init(&self) -> bool {
        INIT_KINDS.contains(&self.kind.as_str())
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        match &self.payload {
            Payload::Fields(fields) => fields.get(name),
            Payload::Module(_) => None,
        }
    }

    pub fn module(&self) -> Option<&[u8]> {
        match &self.payload {
            Payload::Module(bytes) => Some(bytes),
            Payload::Fields(_) => None,
        }
    }

    /// The payload as a JSON value, for diagnostics.
    pub fn payload_value(&self) -> Value {
        match &self.payload {
            Payload::Fields(fields) => Value::Object(fields.clone()),
            Payload::Module(bytes) => Value::from(bytes.len()),
        }
    }
}

fn module_bytes(fields: &Map<String, Value>) -> Result<Vec<u8>, MessageError> {
    let Some((field, value)) = MODULE_FIELDS
        .iter()
        .find_map(|name| fields.get(*name).map(|v| (*name, v)))
    else {
        // An empty module fails engine construction, which is where it gets reported.
        return Ok(Vec::new());
    };
    let Value::Array(items) = value else {
        return Err(MessageError::InvalidModuleBytes { field });
    };
    items
        .iter()
        .map(|item| {
            item.as_u64()
                .and_then(|b| u8::try_from(b).ok())
                .ok_or(MessageError::InvalidModuleBytes { field })
        })
        .collect()
}

/// Expected wire type of a payload field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    /// Any JSON number, narrowed to `f32`.
    Number,
    /// An integral number in `i32` range.
    Integer,
    /// A non-negative integral number.
    Index,
    /// A JSON boolean.
    Flag,
}

impl FieldType {
    fn describe(&self) -> &'static str {
        match self {
            FieldType::Number => "a number",
            FieldType::Integer => "an integer",
            FieldType::Index => "a non-negative integer",
            FieldType::Flag => "a boolean",
        }
    }
}

/// One required payload field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
    pub name: &'static str,
    /// Secondary wire name, consulted when `name` is absent.
    pub alias: Option<&'static str>,
    pub ty: FieldType,
}

impl Field {
    pub const fn number(name: &'static str) -> Self {
        Field {
            name,
            alias: None,
            ty: FieldType::Number,
        }
    }

    pub const fn integer(name: &'static str) -> Self {
        Field {
            name,
            alias: None,
            ty: FieldType::Integer,
        }
    }

    pub const fn index(name: &'static str) -> Self {
        Field {
            name,
            alias: None,
            ty: FieldType::Index,
        }
    }

    pub const fn flag(name: &'static str) -> Self {
        Field {
            name,
            alias: None,
            ty: FieldType::Flag,
        }
    }

    pub const fn or(self, alias: &'static str) -> Self {
        Field {
            alias: Some(alias),
            ..self
        }
    }

    /// The raw JSON value for this field, honoring the alias.
    pub fn lookup<'a>(&self, fields: &'a Map<String, Value>) -> Option<&'a Value> {
        let present = |v: &&Value| !v.is_null();
        fields
            .get(self.name)
            .filter(present)
            .or_else(|| self.alias.and_then(|a| fields.get(a)).filter(present))
    }

    fn extract(&self, kind: &'static str, value: &Value) -> Result<Arg, PayloadError> {
        let wrong_type = || PayloadError::WrongType {
            kind,
            field: self.name,
            expected: self.ty.describe(),
        };
        match self.ty {
            FieldType::Number => value
                .as_f64()
                .map(|v| Arg::Number(v as f32))
                .ok_or_else(wrong_type),
            FieldType::Integer => integral(value)
                .and_then(|v| i32::try_from(v).ok())
                .map(Arg::Integer)
                .ok_or_else(wrong_type),
            FieldType::Index => integral(value)
                .and_then(|v| usize::try_from(v).ok())
                .map(Arg::Index)
                .ok_or_else(wrong_type),
            FieldType::Flag => value.as_bool().map(Arg::Flag).ok_or_else(wrong_type),
        }
    }
}

/// Integral JSON numbers, including floats with no fractional part (`2.0`).
fn integral(value: &Value) -> Option<i64> {
    if let Some(v) = value.as_i64() {
        return Some(v);
    }
    let v = value.as_f64()?;
    if v.fract() == 0.0 && v >= i64::MIN as f64 && v <= i64::MAX as f64 {
        Some(v as i64)
    } else {
        None
    }
}

/// Validated arguments for one command, in schema order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Args(ArgList);

impl Args {
    /// Check `fields` against `schema`, rejecting the whole command on the first bad field.
    pub fn validate(
        kind: &'static str,
        schema: &[Field],
        fields: &Map<String, Value>,
    ) -> Result<Args, PayloadError> {
        debug_assert!(schema.len() <= MAX_ARGS);
        let mut items = [Arg::Number(0.0); MAX_ARGS];
        for (slot, field) in items.iter_mut().zip(schema) {
            let value = field.lookup(fields).ok_or(PayloadError::MissingField {
                kind,
                field: field.name,
            })?;
            *slot = field.extract(kind, value)?;
        }
        Ok(Args(ArgList::from_slice(&items[..schema.len()])))
    }

    pub fn number(&self, i: usize) -> f32 {
        match self.0.as_slice().get(i) {
            Some(Arg::Number(v)) => *v,
            _ => 0.0,
        }
    }

    pub fn integer(&self, i: usize) -> i32 {
        match self.0.as_slice().get(i) {
            Some(Arg::Integer(v)) => *v,
            _ => 0,
        }
    }

    pub fn index(&self, i: usize) -> usize {
        match self.0.as_slice().get(i) {
            Some(Arg::Index(v)) => *v,
            _ => 0,
        }
    }

    pub fn flag(&self, i: usize) -> bool {
        matches!(self.0.as_slice().get(i), Some(Arg::Flag(true)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("test payload must be an object"),
        }
    }

    #[test]
    fn parses_kind_and_fields() {
        let cmd = Command::from_value(json!({"kind": "cutoff", "value": 1200.0})).unwrap();
        assert_eq!(cmd.kind(), "cutoff");
        assert_eq!(cmd.field("value"), Some(&json!(1200.0)));
        assert!(cmd.field("kind").is_none(), "Tag should not remain in the payload");
        assert!(!cmd.is_init());
    }

    #[test]
    fn legacy_type_tag() {
        let cmd = Command::from_value(json!({"type": "note-off", "noteId": 3})).unwrap();
        assert_eq!(cmd.kind(), "note-off");
    }

    #[test]
    fn rejects_non_objects_and_missing_kind() {
        assert_eq!(
            Command::from_value(json!([1, 2])),
            Err(MessageError::NotAnObject)
        );
        assert_eq!(
            Command::from_value(json!({"value": 1})),
            Err(MessageError::MissingKind)
        );
        assert_eq!(
            Command::from_value(json!({"kind": 4})),
            Err(MessageError::MissingKind)
        );
    }

    #[test]
    fn init_carries_module_bytes() {
        let cmd = Command::from_value(json!({"kind": "init", "payload": [0, 97, 115, 109]})).unwrap();
        assert!(cmd.is_init());
        assert_eq!(cmd.module(), Some(&[0u8, 97, 115, 109][..]));

        let legacy = Command::from_value(json!({"type": "init-wasm", "wasmBytes": [1, 2]})).unwrap();
        assert!(legacy.is_init());
        assert_eq!(legacy.module(), Some(&[1u8, 2][..]));
    }

    #[test]
    fn init_rejects_non_byte_values() {
        assert_eq!(
            Command::from_value(json!({"kind": "init", "payload": [0, 300]})),
            Err(MessageError::InvalidModuleBytes { field: "payload" })
        );
        assert_eq!(
            Command::from_value(json!({"kind": "init", "payload": "AGFzbQ=="})),
            Err(MessageError::InvalidModuleBytes { field: "payload" })
        );
    }

    #[test]
    fn init_without_bytes_is_an_empty_module() {
        let cmd = Command::from_value(json!({"kind": "init"})).unwrap();
        assert_eq!(cmd.module(), Some(&[][..]));
    }

    #[test]
    fn validates_bundled_fields_in_order() {
        const ADSR: &[Field] = &[
            Field::number("attack"),
            Field::number("decay"),
            Field::number("sustain"),
            Field::number("release"),
        ];
        let payload = fields(json!({"release": 200, "attack": 5, "sustain": 0.7, "decay": 50}));
        let args = Args::validate("set-adsr", ADSR, &payload).unwrap();
        assert_eq!(args.number(0), 5.0);
        assert_eq!(args.number(1), 50.0);
        assert_eq!(args.number(2), 0.7);
        assert_eq!(args.number(3), 200.0);
    }

    #[test]
    fn missing_field_rejects_command() {
        const SUB: &[Field] = &[Field::number("level"), Field::number("detune")];
        let err = Args::validate("set-sub", SUB, &fields(json!({"level": 0.5}))).unwrap_err();
        assert_eq!(
            err,
            PayloadError::MissingField {
                kind: "set-sub",
                field: "detune"
            }
        );
    }

    #[test]
    fn null_counts_as_missing() {
        const VALUE: &[Field] = &[Field::number("value")];
        let err = Args::validate("cutoff", VALUE, &fields(json!({"value": null}))).unwrap_err();
        assert!(matches!(err, PayloadError::MissingField { .. }));
    }

    #[test]
    fn type_checks() {
        const NOTE: &[Field] = &[Field::integer("noteId")];
        const FLAG: &[Field] = &[Field::flag("value")];
        const INDEX: &[Field] = &[Field::index("value")];

        assert!(Args::validate("note-off", NOTE, &fields(json!({"noteId": "3"}))).is_err());
        assert!(Args::validate("note-off", NOTE, &fields(json!({"noteId": 3.5}))).is_err());
        assert!(Args::validate("note-off", NOTE, &fields(json!({"noteId": 5_000_000_000u64}))).is_err());
        assert_eq!(
            Args::validate("note-off", NOTE, &fields(json!({"noteId": 3.0})))
                .unwrap()
                .integer(0),
            3
        );
        assert!(Args::validate("chaos-enabled", FLAG, &fields(json!({"value": 1}))).is_err());
        assert!(Args::validate("chaos-enabled", FLAG, &fields(json!({"value": true}))).unwrap().flag(0));
        assert!(Args::validate("chaos-mode", INDEX, &fields(json!({"value": -1}))).is_err());
        assert_eq!(
            Args::validate("chaos-mode", INDEX, &fields(json!({"value": 2})))
                .unwrap()
                .index(0),
            2
        );
    }

    #[test]
    fn alias_is_consulted_when_primary_absent() {
        const SYNTH: &[Field] = &[Field::index("synthType").or("value")];
        let by_name = Args::validate("set-synth-type", SYNTH, &fields(json!({"synthType": 4}))).unwrap();
        let by_alias = Args::validate("set-synth-type", SYNTH, &fields(json!({"value": 2}))).unwrap();
        assert_eq!(by_name.index(0), 4);
        assert_eq!(by_alias.index(0), 2);
    }

    #[test]
    fn extra_fields_are_ignored() {
        const VALUE: &[Field] = &[Field::number("value")];
        let args = Args::validate("cutoff", VALUE, &fields(json!({"value": 1.0, "source": "knob"}))).unwrap();
        assert_eq!(args.number(0), 1.0);
    }
}
