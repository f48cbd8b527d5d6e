//! Input and output contracts.
//!
//! A contract is declared once, as a Rust struct deriving [`serde::Deserialize`],
//! [`serde::Serialize`], [`schemars::JsonSchema`] and [`garde::Validate`]. The same
//! struct is consumed twice:
//!
//! - as a runtime validator ([`Contract::validate_input`] / [`Contract::validate_output`])
//! - as the JSON Schema handed to the generative backend ([`Contract::schema`])
//!
//! so what is requested from the backend can never drift from what is accepted
//! back from it.
//!
//! # Example
//!
//! ```
//! use garde::Validate;
//! use schemars::JsonSchema;
//! use serde::{Deserialize, Serialize};
//! use toolflow::contract::Contract;
//!
//! #[derive(Debug, Deserialize, Serialize, JsonSchema, Validate)]
//! struct Greeting {
//!     /// Who to greet.
//!     #[garde(length(min = 1))]
//!     name: String,
//! }
//!
//! let contract = Contract::of::<Greeting>();
//! assert!(contract.validate_input(serde_json::json!({"name": "Ada"})).is_ok());
//!
//! let err = contract.validate_input(serde_json::json!({})).unwrap_err();
//! assert_eq!(err.field, "name");
//! ```

pub mod media;

pub use media::{DataUri, DataUriError};

use std::fmt;
use std::sync::Arc;

use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{Boundary, ContractError};

/// Path used when the offending value is the payload itself.
pub const ROOT_FIELD: &str = "$";

type ValidateFn = fn(Value, Boundary, &Value) -> Result<Validated, ContractError>;

/// A value that has passed a contract.
///
/// Only [`Contract`] can produce one. The wrapped JSON is re-serialized from the typed
/// contract struct, so unknown fields are gone and defaults are filled in.
#[derive(Debug, Clone, PartialEq)]
pub struct Validated(Value);

impl Validated {
    /// Borrow the validated JSON.
    pub fn as_value(&self) -> &Value {
        &self.0
    }

    /// Take the validated JSON.
    pub fn into_value(self) -> Value {
        self.0
    }

    /// Look up a top-level field.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    /// Deserialize into the contract's typed form.
    pub fn to_typed<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        T::deserialize(&self.0)
    }
}

/// The declared shape of a task's input or output.
#[derive(Clone)]
pub struct Contract {
    type_name: &'static str,
    schema: Value,
    validator: Result<Arc<jsonschema::Validator>, String>,
    validate: ValidateFn,
}

impl fmt::Debug for Contract {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Contract")
            .field("type_name", &self.type_name)
            .field("schema", &self.schema)
            .finish()
    }
}

impl Contract {
    /// Build the contract for `T`.
    pub fn of<T>() -> Self
    where
        T: JsonSchema + DeserializeOwned + Serialize + garde::Validate<Context = ()> + 'static,
    {
        let schema = generate_schema::<T>();
        let validator = jsonschema::validator_for(&schema)
            .map(Arc::new)
            .map_err(|e| e.to_string());
        Self {
            type_name: short_type_name::<T>(),
            schema,
            validator,
            validate: validate_as::<T>,
        }
    }

    /// The contract's JSON Schema, with `$ref`s inlined.
    pub fn schema(&self) -> &Value {
        &self.schema
    }

    /// Name of the Rust type behind the contract.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Validate raw caller input.
    pub fn validate_input(&self, raw: Value) -> Result<Validated, ContractError> {
        self.validate(raw, Boundary::Input)
    }

    /// Validate whatever came back from a backend or upstream.
    pub fn validate_output(&self, raw: Value) -> Result<Validated, ContractError> {
        self.validate(raw, Boundary::Output)
    }

    fn validate(&self, raw: Value, boundary: Boundary) -> Result<Validated, ContractError> {
        let validator = self.validator.as_ref().map_err(|reason| {
            ContractError::new(boundary, ROOT_FIELD, format!("contract schema is unusable: {reason}"))
        })?;
        if let Err(error) = validator.validate(&raw) {
            let (field, constraint) = describe_failure(&self.schema, &raw, &error);
            return Err(ContractError::new(boundary, field, constraint));
        }
        (self.validate)(raw, boundary, &self.schema)
    }
}

fn validate_as<T>(raw: Value, boundary: Boundary, schema: &Value) -> Result<Validated, ContractError>
where
    T: DeserializeOwned + Serialize + garde::Validate<Context = ()>,
{
    let typed: T = serde_json::from_value(raw)
        .map_err(|e| ContractError::new(boundary, ROOT_FIELD, e.to_string()))?;

    if let Err(report) = typed.validate() {
        let (field, constraint) = report
            .iter()
            .next()
            .map(|(path, error)| (path.to_string(), error.to_string()))
            .unwrap_or_else(|| (ROOT_FIELD.to_string(), report.to_string()));
        let field = if field.is_empty() {
            ROOT_FIELD.to_string()
        } else {
            wire_path(schema, &field)
        };
        return Err(ContractError::new(boundary, field, constraint));
    }

    serde_json::to_value(&typed)
        .map(Validated)
        .map_err(|e| ContractError::new(boundary, ROOT_FIELD, e.to_string()))
}

/// Translate a Rust field path (`customer_name[0]`) into wire names (`customerName[0]`).
fn wire_path(schema: &Value, rust_path: &str) -> String {
    let mut names = Vec::new();
    collect_property_names(schema, &mut names);
    rust_path
        .split('.')
        .map(|segment| {
            let (name, index) = segment
                .find('[')
                .map_or((segment, ""), |at| segment.split_at(at));
            let wire = names
                .iter()
                .find(|candidate| to_snake_case(candidate) == name)
                .map_or(name, |candidate| candidate.as_str());
            format!("{wire}{index}")
        })
        .collect::<Vec<_>>()
        .join(".")
}

fn collect_property_names(schema: &Value, names: &mut Vec<String>) {
    match schema {
        Value::Object(map) => {
            if let Some(properties) = map.get("properties").and_then(Value::as_object) {
                names.extend(properties.keys().cloned());
            }
            for value in map.values() {
                collect_property_names(value, names);
            }
        },
        Value::Array(items) => {
            for item in items {
                collect_property_names(item, names);
            }
        },
        _ => {},
    }
}

fn to_snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for ch in name.chars() {
        if ch.is_ascii_uppercase() {
            out.push('_');
            out.push(ch.to_ascii_lowercase());
        } else {
            out.push(ch);
        }
    }
    out
}

fn short_type_name<T>() -> &'static str {
    let full = std::any::type_name::<T>();
    full.rsplit("::").next().unwrap_or(full)
}

/// Generate an inlined JSON Schema for `T`.
pub fn generate_schema<T: JsonSchema>() -> Value {
    let schema = schemars::schema_for!(T);
    let json_schema = serde_json::to_value(&schema).unwrap_or_else(|_| {
        serde_json::json!({
            "type": "object",
            "properties": {},
            "additionalProperties": true
        })
    });
    normalize_schema(json_schema)
}

/// Inline every local `$ref` and drop the definitions table.
pub fn normalize_schema(mut schema: Value) -> Value {
    let definitions = schema
        .as_object_mut()
        .and_then(|root| {
            root.remove("$defs")
                .or_else(|| root.remove("definitions"))
        })
        .and_then(|defs| match defs {
            Value::Object(map) => Some(map),
            _ => None,
        })
        .unwrap_or_default();
    inline_refs(&mut schema, &definitions, 0);
    fold_const_choices(&mut schema);
    schema
}

/// Rewrite `oneOf`/`anyOf` lists made only of `const` branches (documented enum
/// variants) into a single `enum`.
fn fold_const_choices(node: &mut Value) {
    match node {
        Value::Object(map) => {
            for keyword in ["oneOf", "anyOf"] {
                let Some(Value::Array(branches)) = map.get(keyword) else {
                    continue;
                };
                let all_const = !branches.is_empty()
                    && branches
                        .iter()
                        .all(|b| b.get("const").is_some() && b.get("properties").is_none());
                if !all_const {
                    continue;
                }
                let options: Vec<Value> =
                    branches.iter().filter_map(|b| b.get("const").cloned()).collect();
                let shared_type = branches
                    .first()
                    .and_then(|b| b.get("type"))
                    .filter(|t| branches.iter().all(|b| b.get("type") == Some(*t)))
                    .cloned();
                map.remove(keyword);
                if let Some(shared_type) = shared_type {
                    map.entry("type").or_insert(shared_type);
                }
                map.insert("enum".to_string(), Value::Array(options));
            }
            for value in map.values_mut() {
                fold_const_choices(value);
            }
        },
        Value::Array(items) => {
            for item in items {
                fold_const_choices(item);
            }
        },
        _ => {},
    }
}

const MAX_REF_DEPTH: usize = 16;

fn inline_refs(node: &mut Value, definitions: &Map<String, Value>, depth: usize) {
    if depth > MAX_REF_DEPTH {
        return;
    }
    match node {
        Value::Object(map) => {
            let target = map
                .get("$ref")
                .and_then(Value::as_str)
                .and_then(|r| {
                    r.strip_prefix("#/$defs/")
                        .or_else(|| r.strip_prefix("#/definitions/"))
                })
                .and_then(|name| definitions.get(name))
                .cloned();
            if let Some(mut resolved) = target {
                inline_refs(&mut resolved, definitions, depth + 1);
                map.remove("$ref");
                if let Value::Object(resolved) = resolved {
                    for (key, value) in resolved {
                        map.entry(key).or_insert(value);
                    }
                }
            }
            for value in map.values_mut() {
                inline_refs(value, definitions, depth);
            }
        },
        Value::Array(items) => {
            for item in items {
                inline_refs(item, definitions, depth);
            }
        },
        _ => {},
    }
}

/// Turn a JSON Schema failure into a wire field and a constraint phrase.
fn describe_failure(
    schema: &Value,
    raw: &Value,
    error: &jsonschema::ValidationError<'_>,
) -> (String, String) {
    let instance_path = error.instance_path().to_string();
    let schema_path = error.schema_path().to_string();
    let field = pointer_to_field(&instance_path);
    let instance = raw.pointer(&instance_path);
    let keyword = schema_path.rsplit('/').next().unwrap_or_default();
    let rule = schema.pointer(&schema_path);

    let constraint = match (keyword, rule) {
        ("required", Some(Value::Array(names))) => {
            let missing = names
                .iter()
                .filter_map(Value::as_str)
                .find(|name| instance.and_then(|v| v.get(*name)).is_none());
            if let Some(name) = missing {
                return (join_path(&field, name), "is required".to_string());
            }
            error.to_string()
        },
        ("type", Some(expected)) => type_constraint(expected, instance),
        ("enum", Some(Value::Array(options))) => one_of_phrase(options),
        ("const", Some(expected)) => one_of_phrase(std::slice::from_ref(expected)),
        ("anyOf" | "oneOf", Some(Value::Array(branches))) => {
            let options = choice_options(branches);
            if options.is_empty() {
                error.to_string()
            } else {
                one_of_phrase(&options)
            }
        },
        ("minimum", Some(min)) => bound_phrase("≥", min),
        ("maximum", Some(max)) => bound_phrase("≤", max),
        ("minLength", Some(n)) => count_phrase("at least", n, "character"),
        ("maxLength", Some(n)) => count_phrase("at most", n, "character"),
        ("minItems", Some(n)) => count_phrase("at least", n, "item"),
        ("maxItems", Some(n)) => count_phrase("at most", n, "item"),
        _ => error.to_string(),
    };
    (field, constraint)
}

/// `/toppings/1` becomes `toppings[1]`, the empty pointer becomes `$`.
fn pointer_to_field(pointer: &str) -> String {
    let mut field = String::new();
    for segment in pointer.split('/').skip(1) {
        let segment = segment.replace("~1", "/").replace("~0", "~");
        if !segment.is_empty() && segment.bytes().all(|b| b.is_ascii_digit()) {
            field.push_str(&format!("[{segment}]"));
        } else {
            if !field.is_empty() {
                field.push('.');
            }
            field.push_str(&segment);
        }
    }
    if field.is_empty() {
        ROOT_FIELD.to_string()
    } else {
        field
    }
}

fn type_constraint(expected: &Value, instance: Option<&Value>) -> String {
    if instance.map_or(true, Value::is_null) {
        return "is required".to_string();
    }
    let wanted: Vec<&str> = match expected {
        Value::String(single) => vec![type_phrase(single)],
        Value::Array(many) => many
            .iter()
            .filter_map(Value::as_str)
            .filter(|t| *t != "null")
            .map(type_phrase)
            .collect(),
        _ => Vec::new(),
    };
    format!("must be {}", wanted.join(" or "))
}

fn one_of_phrase(options: &[Value]) -> String {
    let listed: Vec<String> = options
        .iter()
        .map(|o| o.as_str().map(str::to_string).unwrap_or_else(|| o.to_string()))
        .collect();
    format!("must be one of {{{}}}", listed.join(", "))
}

fn choice_options(branches: &[Value]) -> Vec<Value> {
    branches
        .iter()
        .flat_map(|branch| {
            branch
                .get("enum")
                .and_then(Value::as_array)
                .cloned()
                .or_else(|| branch.get("const").cloned().map(|c| vec![c]))
                .unwrap_or_default()
        })
        .collect()
}

fn bound_phrase(relation: &str, limit: &Value) -> String {
    let limit = limit.as_f64().map_or_else(|| limit.to_string(), |n| n.to_string());
    format!("must be {relation} {limit}")
}

fn count_phrase(bound: &str, limit: &Value, unit: &str) -> String {
    length_phrase(bound, limit.as_u64().unwrap_or_default(), unit)
}

fn length_phrase(bound: &str, n: u64, unit: &str) -> String {
    let plural = if n == 1 { "" } else { "s" };
    format!("must have {bound} {n} {unit}{plural}")
}

fn type_phrase(expected: &str) -> &'static str {
    match expected {
        "object" => "an object",
        "array" => "an array",
        "string" => "a string",
        "integer" => "an integer",
        "number" => "a number",
        "boolean" => "a boolean",
        _ => "a value",
    }
}

fn join_path(parent: &str, field: &str) -> String {
    if parent == ROOT_FIELD {
        field.to_string()
    } else {
        format!("{parent}.{field}")
    }
}
