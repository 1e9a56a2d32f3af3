//! Declarative inflation of XPath query results into structured values.
//!
//! An [`InflaterSpec`] is a table of named fields, each binding a name to an
//! XPath expression and an extraction kind:
//!
//! | Kind | Extracts |
//! |------|----------|
//! | text | text content of the matched node |
//! | attr | a named attribute of the matched node |
//! | obj  | a nested object, fields evaluated relative to the matched node |
//! | list | one nested object per matched node |
//!
//! The spec serves two sides of one transaction. [`fields_json`]
//! (InflaterSpec::fields_json) renders the descriptor table shipped to the
//! remote walker, which evaluates the XPath expressions against the live
//! document and returns a JSON tree shaped like the spec.
//! [`inflate`](InflaterSpec::inflate) then post-processes that tree on the
//! host: nested specs recurse, and per-field transform chains (date parsing,
//! custom closures) run over the extracted values.
//!
//! Specs are built once and reused; field names must be unique within a spec,
//! enforced when the builder is finalized.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use rustc_hash::FxHashSet;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value, json};

use crate::error::{Error, Result};

// ============================================================================
// Transform
// ============================================================================

/// A post-extraction value transform.
///
/// Transforms run host-side, after the remote walker has returned, in the
/// order they were attached to the field. Over a list value each transform is
/// applied element-wise.
pub type Transform = Box<dyn Fn(Value) -> Value + Send + Sync>;

/// Date format accepted by [`InflaterBuilder::date`].
const DATE_FORMAT: &str = "%m/%d/%Y";

/// Parses a string value as a calendar date, normalizing to `YYYY-MM-DD`.
///
/// Non-string and unparseable values pass through unchanged.
fn parse_date(value: Value) -> Value {
    match &value {
        Value::String(s) => match NaiveDate::parse_from_str(s, DATE_FORMAT) {
            Ok(date) => Value::String(date.format("%Y-%m-%d").to_string()),
            Err(_) => value,
        },
        _ => value,
    }
}

/// Parses a string value as a timestamp, normalizing to RFC 3339.
///
/// Accepts RFC 3339 and the common zoneless `YYYY-MM-DD HH:MM:SS` form
/// (taken as UTC). Non-string and unparseable values pass through unchanged.
fn parse_datetime(value: Value) -> Value {
    let Value::String(s) = &value else {
        return value;
    };

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Value::String(dt.to_rfc3339());
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Value::String(naive.and_utc().to_rfc3339());
    }
    value
}

// ============================================================================
// Field
// ============================================================================

/// Extraction kind of one field.
enum FieldKind {
    Text,
    Attr(String),
    Object(InflaterSpec),
    List(InflaterSpec),
}

impl FieldKind {
    fn wire_name(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Attr(_) => "attr",
            Self::Object(_) => "obj",
            Self::List(_) => "list",
        }
    }
}

/// One named field of a spec.
struct Field {
    name: String,
    xpath: String,
    kind: FieldKind,
    transforms: Vec<Transform>,
}

impl Field {
    fn descriptor(&self) -> Value {
        let mut entry = json!({
            "id": self.name,
            "type": self.kind.wire_name(),
            "xpath": self.xpath,
        });
        match &self.kind {
            FieldKind::Attr(attr_name) => {
                entry["attr"] = Value::String(attr_name.clone());
            }
            FieldKind::Object(sub) | FieldKind::List(sub) => {
                entry["obj"] = sub.fields_json();
            }
            FieldKind::Text => {}
        }
        entry
    }
}

// ============================================================================
// InflaterSpec
// ============================================================================

/// A finalized, reusable field table.
///
/// Built with [`InflaterSpec::builder`]; immutable afterwards.
pub struct InflaterSpec {
    fields: Vec<Field>,
}

impl fmt::Debug for InflaterSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InflaterSpec")
            .field(
                "fields",
                &self.fields.iter().map(|fld| &fld.name).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl InflaterSpec {
    /// Starts building a spec.
    #[must_use]
    pub fn builder() -> InflaterBuilder {
        InflaterBuilder { fields: Vec::new() }
    }

    /// Renders the descriptor table shipped to the remote walker.
    #[must_use]
    pub fn fields_json(&self) -> Value {
        Value::Array(self.fields.iter().map(Field::descriptor).collect())
    }

    /// Post-processes a walker result tree.
    ///
    /// An array input inflates element-wise to an array; anything else
    /// inflates to a single object. Fields absent from the input are simply
    /// skipped, matching the walker's behavior for unmatched XPath
    /// expressions.
    #[must_use]
    pub fn inflate(&self, value: &Value) -> Value {
        match value {
            Value::Array(items) => {
                Value::Array(items.iter().map(|item| self.inflate_one(item)).collect())
            }
            other => self.inflate_one(other),
        }
    }

    /// Inflates and deserializes into a typed result.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] when the inflated tree does not fit `T`.
    pub fn inflate_as<T: DeserializeOwned>(&self, value: &Value) -> Result<T> {
        Ok(serde_json::from_value(self.inflate(value))?)
    }

    fn inflate_one(&self, value: &Value) -> Value {
        let mut out = Map::new();

        for field in &self.fields {
            let Some(raw) = value.get(&field.name) else {
                continue;
            };

            let mut val = match &field.kind {
                FieldKind::Text | FieldKind::Attr(_) => raw.clone(),
                FieldKind::Object(sub) => sub.inflate(raw),
                FieldKind::List(sub) => match raw {
                    Value::Array(items) => {
                        Value::Array(items.iter().map(|item| sub.inflate(item)).collect())
                    }
                    other => sub.inflate(other),
                },
            };

            for transform in &field.transforms {
                val = match val {
                    Value::Array(items) => {
                        Value::Array(items.into_iter().map(transform).collect())
                    }
                    scalar => transform(scalar),
                };
            }

            out.insert(field.name.clone(), val);
        }

        Value::Object(out)
    }
}

// ============================================================================
// InflaterBuilder
// ============================================================================

/// Builder for an [`InflaterSpec`].
///
/// Field-adding methods register fields in call order; [`transform`]
/// (InflaterBuilder::transform) attaches to the most recently added field.
/// [`build`](InflaterBuilder::build) enforces name uniqueness.
pub struct InflaterBuilder {
    fields: Vec<Field>,
}

impl fmt::Debug for InflaterBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InflaterBuilder")
            .field("fields", &self.fields.len())
            .finish()
    }
}

impl InflaterBuilder {
    fn add(mut self, name: impl Into<String>, xpath: impl Into<String>, kind: FieldKind) -> Self {
        self.fields.push(Field {
            name: name.into(),
            xpath: xpath.into(),
            kind,
            transforms: Vec::new(),
        });
        self
    }

    /// Extracts the text content of the matched node.
    #[must_use]
    pub fn text(self, name: impl Into<String>, xpath: impl Into<String>) -> Self {
        self.add(name, xpath, FieldKind::Text)
    }

    /// Extracts a named attribute of the matched node.
    #[must_use]
    pub fn attr(
        self,
        name: impl Into<String>,
        xpath: impl Into<String>,
        attr_name: impl Into<String>,
    ) -> Self {
        self.add(name, xpath, FieldKind::Attr(attr_name.into()))
    }

    /// Extracts the `href` attribute of the matched node.
    #[must_use]
    pub fn href(self, name: impl Into<String>, xpath: impl Into<String>) -> Self {
        self.attr(name, xpath, "href")
    }

    /// Extracts text content parsed as a timestamp.
    ///
    /// The parse transform runs before any transforms attached afterwards.
    #[must_use]
    pub fn datetime(self, name: impl Into<String>, xpath: impl Into<String>) -> Self {
        self.text(name, xpath).transform(parse_datetime)
    }

    /// Extracts a named attribute parsed as a timestamp.
    #[must_use]
    pub fn datetime_attr(
        self,
        name: impl Into<String>,
        xpath: impl Into<String>,
        attr_name: impl Into<String>,
    ) -> Self {
        self.attr(name, xpath, attr_name).transform(parse_datetime)
    }

    /// Extracts text content parsed as a `MM/DD/YYYY` calendar date.
    #[must_use]
    pub fn date(self, name: impl Into<String>, xpath: impl Into<String>) -> Self {
        self.text(name, xpath).transform(parse_date)
    }

    /// Extracts a nested object rooted at the matched node.
    #[must_use]
    pub fn object(
        self,
        name: impl Into<String>,
        xpath: impl Into<String>,
        sub: InflaterSpec,
    ) -> Self {
        self.add(name, xpath, FieldKind::Object(sub))
    }

    /// Extracts one nested object per matched node.
    #[must_use]
    pub fn list(
        self,
        name: impl Into<String>,
        xpath: impl Into<String>,
        sub: InflaterSpec,
    ) -> Self {
        self.add(name, xpath, FieldKind::List(sub))
    }

    /// Attaches a transform to the most recently added field.
    ///
    /// Calling with no fields registered yet is a no-op.
    #[must_use]
    pub fn transform(mut self, f: impl Fn(Value) -> Value + Send + Sync + 'static) -> Self {
        if let Some(field) = self.fields.last_mut() {
            field.transforms.push(Box::new(f));
        }
        self
    }

    /// Finalizes the spec.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] when two fields share a name or a
    /// field has an empty name or XPath.
    pub fn build(self) -> Result<InflaterSpec> {
        let mut seen = FxHashSet::default();
        for field in &self.fields {
            if field.name.is_empty() {
                return Err(Error::invalid_argument("field name must not be empty"));
            }
            if field.xpath.is_empty() {
                return Err(Error::invalid_argument(format!(
                    "field '{}' has an empty xpath",
                    field.name
                )));
            }
            if !seen.insert(field.name.as_str()) {
                return Err(Error::invalid_argument(format!(
                    "field name '{}' already defined",
                    field.name
                )));
            }
        }
        Ok(InflaterSpec {
            fields: self.fields,
        })
    }
}

// ============================================================================
// Tests
// ============================================================================
