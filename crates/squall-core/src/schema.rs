//! Runtime schema registry
//!
//! Routes carry optional contracts for path params, query params, headers,
//! payload, success and error values. Contracts are plain data: composing
//! route sets merges them, and handlers enforce them with the decode
//! helpers on `Context`.
//!
//! Merging widens. Scalar contracts (payload, success, error) merge into a
//! union; field contracts (path params, url params, headers) merge per field,
//! and a field present on both sides becomes the union of both.

use serde::Serialize;
use serde_json::{Map, Number, Value};
use std::collections::BTreeMap;

/// One validation failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Issue {
    /// Path to the invalid field (e.g., "payload.email", "id")
    pub path: String,
    /// Error message
    pub message: String,
}

impl Issue {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Schema types
#[derive(Debug, Clone, PartialEq)]
pub enum SchemaType {
    String,
    Number,
    Boolean,
    Object,
    Array,
    Any,
    /// Valid if any variant is
    Union(Vec<Schema>),
}

/// String format validators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StringFormat {
    Email,
    Url,
    Uuid,
    Date,
}

impl StringFormat {
    pub fn validate(&self, value: &str) -> bool {
        match self {
            StringFormat::Email => {
                let mut parts = value.split('@');
                match (parts.next(), parts.next(), parts.next()) {
                    (Some(local), Some(domain), None) => {
                        !local.is_empty()
                            && domain.contains('.')
                            && !value.contains(char::is_whitespace)
                    }
                    _ => false,
                }
            }
            StringFormat::Url => value.starts_with("http://") || value.starts_with("https://"),
            StringFormat::Uuid => {
                let groups: Vec<&str> = value.split('-').collect();
                groups.iter().map(|g| g.len()).eq([8, 4, 4, 4, 12])
                    && groups.iter().all(|g| g.chars().all(|c| c.is_ascii_hexdigit()))
            }
            StringFormat::Date => {
                // YYYY-MM-DD
                let groups: Vec<&str> = value.split('-').collect();
                groups.iter().map(|g| g.len()).eq([4, 2, 2])
                    && groups.iter().all(|g| g.chars().all(|c| c.is_ascii_digit()))
            }
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            StringFormat::Email => "email",
            StringFormat::Url => "url",
            StringFormat::Uuid => "uuid",
            StringFormat::Date => "date",
        }
    }
}

/// Schema definition
#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    pub schema_type: SchemaType,
    pub required: bool,
    pub nullable: bool,
    // String constraints
    pub min_length: Option<usize>,
    pub max_length: Option<usize>,
    pub format: Option<StringFormat>,
    pub enum_values: Option<Vec<String>>,
    // Number constraints
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub integer: bool,
    // Object constraints
    pub properties: Option<Fields>,
    pub additional_properties: bool,
    // Array constraints
    pub items: Option<Box<Schema>>,
    pub min_items: Option<usize>,
    pub max_items: Option<usize>,
}

/// Named field contracts
pub type Fields = BTreeMap<String, Schema>;

impl Default for Schema {
    fn default() -> Self {
        Self {
            schema_type: SchemaType::Any,
            required: true,
            nullable: false,
            min_length: None,
            max_length: None,
            format: None,
            enum_values: None,
            min: None,
            max: None,
            integer: false,
            properties: None,
            additional_properties: true,
            items: None,
            min_items: None,
            max_items: None,
        }
    }
}

// Builder methods
impl Schema {
    pub fn string() -> Self {
        Self {
            schema_type: SchemaType::String,
            ..Default::default()
        }
    }

    pub fn number() -> Self {
        Self {
            schema_type: SchemaType::Number,
            ..Default::default()
        }
    }

    pub fn integer() -> Self {
        Self {
            schema_type: SchemaType::Number,
            integer: true,
            ..Default::default()
        }
    }

    pub fn boolean() -> Self {
        Self {
            schema_type: SchemaType::Boolean,
            ..Default::default()
        }
    }

    pub fn object() -> Self {
        Self {
            schema_type: SchemaType::Object,
            properties: Some(Fields::new()),
            ..Default::default()
        }
    }

    pub fn array(items: Schema) -> Self {
        Self {
            schema_type: SchemaType::Array,
            items: Some(Box::new(items)),
            ..Default::default()
        }
    }

    pub fn any() -> Self {
        Self::default()
    }

    pub fn email() -> Self {
        Self::string().format(StringFormat::Email)
    }

    pub fn uuid() -> Self {
        Self::string().format(StringFormat::Uuid)
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    pub fn nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }

    pub fn min_length(mut self, len: usize) -> Self {
        self.min_length = Some(len);
        self
    }

    pub fn max_length(mut self, len: usize) -> Self {
        self.max_length = Some(len);
        self
    }

    pub fn format(mut self, format: StringFormat) -> Self {
        self.format = Some(format);
        self
    }

    pub fn enum_values<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.enum_values = Some(values.into_iter().map(Into::into).collect());
        self
    }

    pub fn min(mut self, min: f64) -> Self {
        self.min = Some(min);
        self
    }

    pub fn max(mut self, max: f64) -> Self {
        self.max = Some(max);
        self
    }

    pub fn property(mut self, name: impl Into<String>, schema: Schema) -> Self {
        self.properties
            .get_or_insert_with(Fields::new)
            .insert(name.into(), schema);
        self
    }

    pub fn additional_properties(mut self, allow: bool) -> Self {
        self.additional_properties = allow;
        self
    }

    pub fn min_items(mut self, min: usize) -> Self {
        self.min_items = Some(min);
        self
    }

    pub fn max_items(mut self, max: usize) -> Self {
        self.max_items = Some(max);
        self
    }

    /// Schema accepting anything either side accepts
    ///
    /// Nested unions are flattened and identical variants collapse.
    pub fn union(a: Schema, b: Schema) -> Schema {
        if a == b {
            return a;
        }
        let required = a.required && b.required;
        let nullable = a.nullable || b.nullable;

        let mut variants: Vec<Schema> = Vec::new();
        for schema in [a, b] {
            let flattened = match schema.schema_type {
                SchemaType::Union(inner) => inner,
                _ => vec![schema],
            };
            for variant in flattened {
                if !variants.contains(&variant) {
                    variants.push(variant);
                }
            }
        }

        if variants.len() == 1 {
            return variants.remove(0);
        }
        Schema {
            schema_type: SchemaType::Union(variants),
            required,
            nullable,
            ..Default::default()
        }
    }
}

/// Merge two field maps; shared fields become unions
pub fn merge_fields(a: &Fields, b: &Fields) -> Fields {
    let mut merged = a.clone();
    for (name, schema) in b {
        let field = match merged.remove(name) {
            Some(existing) => Schema::union(existing, schema.clone()),
            None => schema.clone(),
        };
        merged.insert(name.clone(), field);
    }
    merged
}

/// Contracts attached to a route
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Schemas {
    pub path_params: Option<Fields>,
    pub url_params: Option<Fields>,
    pub headers: Option<Fields>,
    pub payload: Option<Schema>,
    pub success: Option<Schema>,
    pub error: Option<Schema>,
}

impl Schemas {
    pub fn is_empty(&self) -> bool {
        *self == Schemas::default()
    }

    /// Widen with another set of contracts
    pub fn merge(&self, other: &Schemas) -> Schemas {
        Schemas {
            path_params: merge_field_slot(&self.path_params, &other.path_params),
            url_params: merge_field_slot(&self.url_params, &other.url_params),
            headers: merge_field_slot(&self.headers, &other.headers),
            payload: merge_scalar_slot(&self.payload, &other.payload),
            success: merge_scalar_slot(&self.success, &other.success),
            error: merge_scalar_slot(&self.error, &other.error),
        }
    }
}

fn merge_scalar_slot(a: &Option<Schema>, b: &Option<Schema>) -> Option<Schema> {
    match (a, b) {
        (Some(a), Some(b)) => Some(Schema::union(a.clone(), b.clone())),
        (a, b) => a.clone().or_else(|| b.clone()),
    }
}

fn merge_field_slot(a: &Option<Fields>, b: &Option<Fields>) -> Option<Fields> {
    match (a, b) {
        (Some(a), Some(b)) => Some(merge_fields(a, b)),
        (a, b) => a.clone().or_else(|| b.clone()),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn join(path: &str, key: &str) -> String {
    if path.is_empty() {
        key.to_string()
    } else {
        format!("{}.{}", path, key)
    }
}

/// Validate a value against a schema
pub fn validate(value: &Value, schema: &Schema, path: &str) -> Vec<Issue> {
    let mut issues = Vec::new();

    if value.is_null() {
        if !schema.nullable && schema.schema_type != SchemaType::Any {
            issues.push(Issue::new(path, "Value cannot be null"));
        }
        return issues;
    }

    match &schema.schema_type {
        SchemaType::String => match value.as_str() {
            Some(s) => validate_string(s, schema, path, &mut issues),
            None => issues.push(Issue::new(
                path,
                format!("Expected string, got {}", type_name(value)),
            )),
        },
        SchemaType::Number => match value.as_f64() {
            Some(n) => validate_number(n, schema, path, &mut issues),
            None => issues.push(Issue::new(
                path,
                format!("Expected number, got {}", type_name(value)),
            )),
        },
        SchemaType::Boolean => {
            if !value.is_boolean() {
                issues.push(Issue::new(
                    path,
                    format!("Expected boolean, got {}", type_name(value)),
                ));
            }
        }
        SchemaType::Object => match value.as_object() {
            Some(obj) => validate_object(obj, schema, path, &mut issues),
            None => issues.push(Issue::new(
                path,
                format!("Expected object, got {}", type_name(value)),
            )),
        },
        SchemaType::Array => match value.as_array() {
            Some(arr) => validate_array(arr, schema, path, &mut issues),
            None => issues.push(Issue::new(
                path,
                format!("Expected array, got {}", type_name(value)),
            )),
        },
        SchemaType::Union(variants) => {
            if !variants.iter().any(|v| validate(value, v, path).is_empty()) {
                issues.push(Issue::new(path, "Does not match any variant"));
            }
        }
        SchemaType::Any => {}
    }

    issues
}

fn validate_string(value: &str, schema: &Schema, path: &str, issues: &mut Vec<Issue>) {
    let len = value.chars().count();
    if let Some(min) = schema.min_length {
        if len < min {
            issues.push(Issue::new(path, format!("Minimum length is {}", min)));
        }
    }
    if let Some(max) = schema.max_length {
        if len > max {
            issues.push(Issue::new(path, format!("Maximum length is {}", max)));
        }
    }
    if let Some(format) = &schema.format {
        if !format.validate(value) {
            issues.push(Issue::new(path, format!("Invalid {} format", format.name())));
        }
    }
    if let Some(ref enum_values) = schema.enum_values {
        if !enum_values.iter().any(|v| v == value) {
            issues.push(Issue::new(
                path,
                format!("Must be one of: {}", enum_values.join(", ")),
            ));
        }
    }
}

fn validate_number(value: f64, schema: &Schema, path: &str, issues: &mut Vec<Issue>) {
    if schema.integer && value.fract() != 0.0 {
        issues.push(Issue::new(path, "Must be an integer"));
    }
    if let Some(min) = schema.min {
        if value < min {
            issues.push(Issue::new(path, format!("Minimum value is {}", min)));
        }
    }
    if let Some(max) = schema.max {
        if value > max {
            issues.push(Issue::new(path, format!("Maximum value is {}", max)));
        }
    }
}

fn validate_object(obj: &Map<String, Value>, schema: &Schema, path: &str, issues: &mut Vec<Issue>) {
    let Some(ref properties) = schema.properties else {
        return;
    };

    for (key, prop_schema) in properties {
        let prop_path = join(path, key);
        match obj.get(key) {
            Some(value) => issues.extend(validate(value, prop_schema, &prop_path)),
            None if prop_schema.required => issues.push(Issue::new(&prop_path, "Value is required")),
            None => {}
        }
    }

    if !schema.additional_properties {
        for key in obj.keys().filter(|k| !properties.contains_key(*k)) {
            issues.push(Issue::new(join(path, key), "Additional property not allowed"));
        }
    }
}

fn validate_array(arr: &[Value], schema: &Schema, path: &str, issues: &mut Vec<Issue>) {
    if let Some(min) = schema.min_items {
        if arr.len() < min {
            issues.push(Issue::new(path, format!("Minimum items is {}", min)));
        }
    }
    if let Some(max) = schema.max_items {
        if arr.len() > max {
            issues.push(Issue::new(path, format!("Maximum items is {}", max)));
        }
    }
    if let Some(ref items) = schema.items {
        for (i, item) in arr.iter().enumerate() {
            issues.extend(validate(item, items, &format!("{}[{}]", path, i)));
        }
    }
}

/// Coerce a raw string (path slot, query value, header) to the JSON shape
/// the schema expects
///
/// Strings that do not parse are kept as strings so validation reports the
/// type mismatch.
pub fn coerce(raw: &str, schema: &Schema) -> Value {
    match &schema.schema_type {
        SchemaType::Number => {
            if schema.integer {
                if let Ok(n) = raw.parse::<i64>() {
                    return Value::Number(n.into());
                }
            }
            raw.parse::<f64>()
                .ok()
                .and_then(Number::from_f64)
                .map(Value::Number)
                .unwrap_or_else(|| Value::String(raw.to_string()))
        }
        SchemaType::Boolean => match raw {
            "true" => Value::Bool(true),
            "false" => Value::Bool(false),
            _ => Value::String(raw.to_string()),
        },
        SchemaType::Union(variants) => variants
            .iter()
            .map(|v| coerce(raw, v))
            .find(|value| variants.iter().any(|v| validate(value, v, "").is_empty()))
            .unwrap_or_else(|| Value::String(raw.to_string())),
        _ => Value::String(raw.to_string()),
    }
}

/// Decode string pairs against field contracts into a JSON object
///
/// Fields without a contract pass through as strings. Repeated keys keep
/// the last value.
pub fn decode_strings(
    fields: Option<&Fields>,
    pairs: &[(String, String)],
    path: &str,
) -> Result<Value, Vec<Issue>> {
    let mut object = Map::new();
    let mut issues = Vec::new();

    for (key, raw) in pairs {
        let value = match fields.and_then(|f| f.get(key)) {
            Some(schema) => coerce(raw, schema),
            None => Value::String(raw.clone()),
        };
        object.insert(key.clone(), value);
    }

    if let Some(fields) = fields {
        for (key, schema) in fields {
            let field_path = join(path, key);
            match object.get(key) {
                Some(value) => issues.extend(validate(value, schema, &field_path)),
                None if schema.required => issues.push(Issue::new(field_path, "Value is required")),
                None => {}
            }
        }
    }

    if issues.is_empty() {
        Ok(Value::Object(object))
    } else {
        Err(issues)
    }
}
