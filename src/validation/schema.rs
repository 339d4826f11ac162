//! Declarative input schemas.
//!
//! A [`Schema`] lists the fields a payload may contain. Checking a payload
//!
//! 1. rejects every property the schema does not declare,
//! 2. coerces each declared value to its [`Kind`] (`"42"` becomes `42` for an
//!    integer field),
//! 3. evaluates every [`Rule`] on the coerced value, recursing into nested
//!    objects and arrays,
//!
//! and collects all violations before failing.

use serde_json::{Map, Number, Value};

use super::date::parse_datetime;
use super::report::{ValidationErrors, ValidationReport};

/// Expected type of a value.
#[derive(Debug, Clone)]
pub enum Kind {
    String,
    Integer,
    Number,
    Boolean,
    /// ISO 8601 date or date-time, normalised to RFC 3339 in UTC.
    DateTime,
    Object(Schema),
    Array(Box<Kind>),
}

impl Kind {
    fn constraint(&self) -> &'static str {
        match self {
            Kind::String => "isString",
            Kind::Integer => "isInt",
            Kind::Number => "isNumber",
            Kind::Boolean => "isBoolean",
            Kind::DateTime => "isDateString",
            Kind::Object(_) => "isObject",
            Kind::Array(_) => "isArray",
        }
    }

    fn expectation(&self) -> &'static str {
        match self {
            Kind::String => "must be a string",
            Kind::Integer => "must be an integer number",
            Kind::Number => "must be a number conforming to the specified constraints",
            Kind::Boolean => "must be a boolean value",
            Kind::DateTime => "must be a valid ISO 8601 date string",
            Kind::Object(_) => "must be an object",
            Kind::Array(_) => "must be an array",
        }
    }

    /// Convert a scalar to this kind. `None` when it cannot be represented.
    fn coerce(&self, value: &Value) -> Option<Value> {
        match (self, value) {
            (Kind::String, Value::String(_)) => Some(value.clone()),
            (Kind::String, Value::Number(n)) => Some(Value::String(n.to_string())),
            (Kind::String, Value::Bool(b)) => Some(Value::String(b.to_string())),

            (Kind::Integer, Value::Number(n)) => integer_of(n).map(Value::from),
            (Kind::Integer, Value::String(s)) => s.trim().parse::<i64>().ok().map(Value::from),

            (Kind::Number, Value::Number(_)) => Some(value.clone()),
            (Kind::Number, Value::String(s)) => number_of(s.trim()).map(Value::Number),

            (Kind::Boolean, Value::Bool(_)) => Some(value.clone()),
            (Kind::Boolean, Value::String(s)) => match s.trim() {
                "true" | "1" => Some(Value::Bool(true)),
                "false" | "0" => Some(Value::Bool(false)),
                _ => None,
            },

            (Kind::DateTime, Value::String(s)) => {
                parse_datetime(s).map(|dt| Value::String(dt.to_rfc3339()))
            }

            _ => None,
        }
    }
}

fn integer_of(n: &Number) -> Option<i64> {
    n.as_i64().or_else(|| {
        n.as_f64()
            .filter(|f| f.fract() == 0.0 && *f >= i64::MIN as f64 && *f <= i64::MAX as f64)
            .map(|f| f as i64)
    })
}

fn number_of(s: &str) -> Option<Number> {
    if let Ok(i) = s.parse::<i64>() {
        return Some(Number::from(i));
    }
    s.parse::<f64>().ok().and_then(Number::from_f64)
}

/// A constraint evaluated on a coerced value.
///
/// Rules that do not apply to the value's type (a length rule on a number)
/// are ignored.
#[derive(Debug, Clone)]
pub enum Rule {
    MinLength(usize),
    MaxLength(usize),
    Min(f64),
    Max(f64),
    Email,
    NotBlank,
    OneOf(&'static [&'static str]),
    MinItems(usize),
    MaxItems(usize),
}

impl Rule {
    /// The violated constraint and its message, if `value` breaks this rule.
    fn check(&self, value: &Value, path: &str) -> Option<(&'static str, String)> {
        match (self, value) {
            (Rule::MinLength(min), Value::String(s)) if s.chars().count() < *min => Some((
                "minLength",
                format!("{path} must be longer than or equal to {min} characters"),
            )),
            (Rule::MaxLength(max), Value::String(s)) if s.chars().count() > *max => Some((
                "maxLength",
                format!("{path} must be shorter than or equal to {max} characters"),
            )),
            (Rule::Min(min), Value::Number(n)) if n.as_f64().is_some_and(|v| v < *min) => {
                Some(("min", format!("{path} must not be less than {min}")))
            }
            (Rule::Max(max), Value::Number(n)) if n.as_f64().is_some_and(|v| v > *max) => {
                Some(("max", format!("{path} must not be greater than {max}")))
            }
            (Rule::Email, Value::String(s)) if !is_email(s) => {
                Some(("isEmail", format!("{path} must be an email")))
            }
            (Rule::NotBlank, Value::String(s)) if s.trim().is_empty() => {
                Some(("isNotEmpty", format!("{path} should not be empty")))
            }
            (Rule::OneOf(allowed), Value::String(s)) if !allowed.contains(&s.as_str()) => Some((
                "isIn",
                format!(
                    "{path} must be one of the following values: {}",
                    allowed.join(", ")
                ),
            )),
            (Rule::MinItems(min), Value::Array(items)) if items.len() < *min => Some((
                "arrayMinSize",
                format!("{path} must contain at least {min} elements"),
            )),
            (Rule::MaxItems(max), Value::Array(items)) if items.len() > *max => Some((
                "arrayMaxSize",
                format!("{path} must contain no more than {max} elements"),
            )),
            _ => None,
        }
    }
}

fn is_email(s: &str) -> bool {
    let Some((local, domain)) = s.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && !s.chars().any(char::is_whitespace)
        && domain.split('.').count() >= 2
        && domain.split('.').all(|label| !label.is_empty())
}

/// A declared property of a [`Schema`].
#[derive(Debug, Clone)]
pub struct Field {
    name: &'static str,
    kind: Kind,
    optional: bool,
    rules: Vec<Rule>,
    each: Vec<Rule>,
}

impl Field {
    pub fn new(name: &'static str, kind: Kind) -> Self {
        Self {
            name,
            kind,
            optional: false,
            rules: Vec::new(),
            each: Vec::new(),
        }
    }

    pub fn string(name: &'static str) -> Self {
        Self::new(name, Kind::String)
    }

    pub fn integer(name: &'static str) -> Self {
        Self::new(name, Kind::Integer)
    }

    pub fn number(name: &'static str) -> Self {
        Self::new(name, Kind::Number)
    }

    pub fn boolean(name: &'static str) -> Self {
        Self::new(name, Kind::Boolean)
    }

    pub fn datetime(name: &'static str) -> Self {
        Self::new(name, Kind::DateTime)
    }

    pub fn object(name: &'static str, schema: Schema) -> Self {
        Self::new(name, Kind::Object(schema))
    }

    pub fn array(name: &'static str, items: Kind) -> Self {
        Self::new(name, Kind::Array(Box::new(items)))
    }

    /// Absent or `null` values pass and are left out of the output.
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn rule(mut self, rule: Rule) -> Self {
        self.rules.push(rule);
        self
    }

    /// Rule applied to every element of an array field.
    pub fn each(mut self, rule: Rule) -> Self {
        self.each.push(rule);
        self
    }
}

/// Whitelist of fields accepted in an object.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    fields: Vec<Field>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }

    /// Validate `input`, returning the coerced object with declared fields only.
    ///
    /// # Errors
    ///
    /// Every undeclared property, type mismatch and rule violation found
    /// anywhere in the input.
    pub fn check(&self, input: &Map<String, Value>) -> Result<Map<String, Value>, ValidationErrors> {
        let (output, reports) = self.check_object(input, None);
        if reports.is_empty() {
            Ok(output)
        } else {
            Err(ValidationErrors::new(reports))
        }
    }

    fn check_object(
        &self,
        input: &Map<String, Value>,
        prefix: Option<&str>,
    ) -> (Map<String, Value>, Vec<ValidationReport>) {
        let mut output = Map::new();
        let mut reports = Vec::new();

        for field in &self.fields {
            let path = join(prefix, field.name);
            match input.get(field.name) {
                None | Some(Value::Null) if field.optional => {}
                None | Some(Value::Null) => reports.push(
                    ValidationReport::new(field.name, None).violation(
                        "isDefined",
                        format!("{path} should not be null or undefined"),
                    ),
                ),
                Some(raw) => {
                    match check_value(&field.kind, &field.rules, &field.each, raw, field.name, &path) {
                        Ok(value) => {
                            output.insert(field.name.to_owned(), value);
                        }
                        Err(report) => reports.push(report),
                    }
                }
            }
        }

        for (key, value) in input {
            if !self.fields.iter().any(|f| f.name == key) {
                let path = join(prefix, key);
                reports.push(
                    ValidationReport::new(key.as_str(), Some(value.clone()))
                        .violation("whitelistValidation", format!("property {path} should not exist")),
                );
            }
        }

        (output, reports)
    }
}

fn join(prefix: Option<&str>, name: &str) -> String {
    match prefix {
        Some(prefix) => format!("{prefix}.{name}"),
        None => name.to_owned(),
    }
}

fn check_value(
    kind: &Kind,
    rules: &[Rule],
    each: &[Rule],
    raw: &Value,
    property: &str,
    path: &str,
) -> Result<Value, ValidationReport> {
    let mut report = ValidationReport::new(property, Some(raw.clone()));

    let value = match (kind, raw) {
        (Kind::Object(schema), Value::Object(map)) => {
            let (output, children) = schema.check_object(map, Some(path));
            report.children = children;
            Value::Object(output)
        }
        (Kind::Array(items), Value::Array(elements)) => {
            let mut output = Vec::with_capacity(elements.len());
            for (index, element) in elements.iter().enumerate() {
                let index = index.to_string();
                let element_path = format!("{path}.{index}");
                match check_value(items, each, &[], element, &index, &element_path) {
                    Ok(value) => output.push(value),
                    Err(child) => report.children.push(child),
                }
            }
            Value::Array(output)
        }
        (Kind::Object(_) | Kind::Array(_), _) => {
            return Err(report.violation(kind.constraint(), format!("{path} {}", kind.expectation())));
        }
        (scalar, _) => match scalar.coerce(raw) {
            Some(value) => value,
            None => {
                return Err(report.violation(kind.constraint(), format!("{path} {}", kind.expectation())));
            }
        },
    };

    for rule in rules {
        if let Some((constraint, message)) = rule.check(&value, path) {
            report.push(constraint, message);
        }
    }

    if report.violations.is_empty() && report.children.is_empty() {
        Ok(value)
    } else {
        Err(report)
    }
}
