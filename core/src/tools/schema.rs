//! Argument schemas for tools.
//!
//! A schema is a flat list of named fields. It renders to JSON Schema for the
//! reasoning process and validates the payload the registry receives back.

use crate::error::FieldViolation;
use serde_json::{Map, Value, json};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgKind {
    String,
    StringList,
    Integer,
}

impl ArgKind {
    fn json_type(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::StringList => "array",
            Self::Integer => "integer",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rule {
    /// Strings must contain non-whitespace; lists must have at least one item.
    NonEmpty,
    MaxLen(usize),
    /// An absolute `http` or `https` URL.
    HttpUrl,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArgField {
    pub name: String,
    pub kind: ArgKind,
    pub description: String,
    pub required: bool,
    pub rules: Vec<Rule>,
}

impl ArgField {
    pub fn required(name: impl Into<String>, kind: ArgKind, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            description: description.into(),
            required: true,
            rules: vec![],
        }
    }

    pub fn optional(name: impl Into<String>, kind: ArgKind, description: impl Into<String>) -> Self {
        Self {
            required: false,
            ..Self::required(name, kind, description)
        }
    }

    pub fn rule(mut self, rule: Rule) -> Self {
        self.rules.push(rule);
        self
    }

    fn to_json_schema(&self) -> Value {
        let mut schema = json!({
            "type": self.kind.json_type(),
            "description": self.description,
        });
        if self.kind == ArgKind::StringList {
            schema["items"] = json!({ "type": "string" });
        }
        for rule in &self.rules {
            match (rule, self.kind) {
                (Rule::NonEmpty, ArgKind::StringList) => schema["minItems"] = json!(1),
                (Rule::NonEmpty, ArgKind::String) => schema["minLength"] = json!(1),
                (Rule::MaxLen(max), ArgKind::StringList) => schema["maxItems"] = json!(max),
                (Rule::MaxLen(max), ArgKind::String) => schema["maxLength"] = json!(max),
                (Rule::HttpUrl, ArgKind::String) => schema["format"] = json!("uri"),
                _ => {}
            }
        }
        schema
    }

    fn check(&self, value: &Value, violations: &mut Vec<FieldViolation>) {
        let field = self.name.as_str();
        match self.kind {
            ArgKind::String => {
                let Some(text) = value.as_str() else {
                    violations.push(FieldViolation::new(field, "must be a string"));
                    return;
                };
                self.check_string(field, text, violations);
            }
            ArgKind::StringList => {
                let Some(items) = value.as_array() else {
                    violations.push(FieldViolation::new(field, "must be a list of strings"));
                    return;
                };
                for rule in &self.rules {
                    match rule {
                        Rule::NonEmpty if items.is_empty() => {
                            violations.push(FieldViolation::new(field, "must not be empty"));
                        }
                        Rule::MaxLen(max) if items.len() > *max => violations.push(
                            FieldViolation::new(field, format!("must have at most {max} items")),
                        ),
                        _ => {}
                    }
                }
                for (i, item) in items.iter().enumerate() {
                    let item_field = format!("{field}[{i}]");
                    match item.as_str() {
                        Some(text) if text.trim().is_empty() => {
                            violations.push(FieldViolation::new(item_field, "must not be blank"));
                        }
                        Some(_) => {}
                        None => violations.push(FieldViolation::new(item_field, "must be a string")),
                    }
                }
            }
            ArgKind::Integer => {
                if value.as_i64().is_none() {
                    violations.push(FieldViolation::new(field, "must be an integer"));
                }
            }
        }
    }

    fn check_string(&self, field: &str, text: &str, violations: &mut Vec<FieldViolation>) {
        for rule in &self.rules {
            match rule {
                Rule::NonEmpty if text.trim().is_empty() => {
                    violations.push(FieldViolation::new(field, "must not be empty"));
                }
                Rule::MaxLen(max) if text.chars().count() > *max => violations.push(
                    FieldViolation::new(field, format!("must be at most {max} characters")),
                ),
                Rule::HttpUrl => {
                    let scheme_ok = reqwest::Url::parse(text)
                        .map(|url| matches!(url.scheme(), "http" | "https"))
                        .unwrap_or(false);
                    if !scheme_ok {
                        violations.push(FieldViolation::new(field, "must be an http(s) URL"));
                    }
                }
                _ => {}
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArgSchema {
    fields: Vec<ArgField>,
}

impl ArgSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, field: ArgField) -> Self {
        self.fields.push(field);
        self
    }

    pub fn fields(&self) -> &[ArgField] {
        &self.fields
    }

    pub fn to_json_schema(&self) -> Value {
        let properties: Map<String, Value> = self
            .fields
            .iter()
            .map(|f| (f.name.clone(), f.to_json_schema()))
            .collect();
        let required: Vec<&str> = self
            .fields
            .iter()
            .filter(|f| f.required)
            .map(|f| f.name.as_str())
            .collect();

        json!({
            "type": "object",
            "properties": properties,
            "required": required,
            "additionalProperties": false
        })
    }

    /// Collects every violation instead of stopping at the first one.
    pub fn validate(&self, args: &Value) -> Result<(), Vec<FieldViolation>> {
        let Some(object) = args.as_object() else {
            return Err(vec![FieldViolation::new("arguments", "must be a JSON object")]);
        };

        let mut violations = Vec::new();
        for key in object.keys() {
            if !self.fields.iter().any(|f| &f.name == key) {
                violations.push(FieldViolation::new(key.as_str(), "is not a known argument"));
            }
        }
        for field in &self.fields {
            match object.get(&field.name) {
                None | Some(Value::Null) if field.required => {
                    violations.push(FieldViolation::new(field.name.as_str(), "is required"));
                }
                None | Some(Value::Null) => {}
                Some(value) => field.check(value, &mut violations),
            }
        }

        if violations.is_empty() {
            Ok(())
        } else {
            Err(violations)
        }
    }
}
