//! Schema-validation primitives used to sanitize incoming form data before
//! it reaches business logic. Pure functions over `serde_json::Value`.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("{field}: {message}")]
    Field { field: String, message: String },

    #[error("{0}")]
    Invalid(String),

    /// Aggregated per-field errors from object validation.
    #[error("validation failed for {} field(s)", .0.len())]
    Fields(HashMap<String, String>),
}

impl ValidationError {
    pub fn field(field: impl Into<String>, message: impl Into<String>) -> Self {
        ValidationError::Field {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        ValidationError::Invalid(message.into())
    }
}

/// Named pattern set for string validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pattern {
    Email,
    Url,
    UuidV4,
    Slug,
}

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}$").unwrap());
static URL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^https?://[^\s]+$").unwrap());
static UUID_V4_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-4[0-9a-fA-F]{3}-[89abAB][0-9a-fA-F]{3}-[0-9a-fA-F]{12}$")
        .unwrap()
});
static SLUG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-z0-9]+(?:-[a-z0-9]+)*$").unwrap());

static JS_SCHEME_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)javascript\s*:").unwrap());
static EVENT_HANDLER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bon\w+\s*=").unwrap());

impl Pattern {
    fn matches(&self, s: &str) -> bool {
        match self {
            Pattern::Email => EMAIL_RE.is_match(s),
            Pattern::Url => URL_RE.is_match(s),
            Pattern::UuidV4 => UUID_V4_RE.is_match(s),
            Pattern::Slug => SLUG_RE.is_match(s),
        }
    }

    fn describe(&self) -> &'static str {
        match self {
            Pattern::Email => "a valid email address",
            Pattern::Url => "a valid URL",
            Pattern::UuidV4 => "a valid UUID",
            Pattern::Slug => "a lowercase slug",
        }
    }
}

/// Strip characters and sequences that could smuggle markup or script into
/// downstream rendering: `<`, `>`, `javascript:` URLs, inline `on*=` handlers.
pub fn sanitize_html(input: &str) -> String {
    let without_angles: String = input.chars().filter(|c| *c != '<' && *c != '>').collect();
    let without_scheme = JS_SCHEME_RE.replace_all(&without_angles, "");
    EVENT_HANDLER_RE.replace_all(&without_scheme, "").into_owned()
}

pub trait Validate {
    type Output;

    fn validate(&self, raw: &Value) -> Result<Self::Output, ValidationError>;

    /// Treat `null`/missing as valid, pass through otherwise.
    fn optional(self) -> Optional<Self>
    where
        Self: Sized,
    {
        Optional(self)
    }
}

pub struct Optional<V>(V);

impl<V: Validate> Validate for Optional<V> {
    type Output = Option<V::Output>;

    fn validate(&self, raw: &Value) -> Result<Self::Output, ValidationError> {
        if raw.is_null() {
            return Ok(None);
        }
        self.0.validate(raw).map(Some)
    }
}

#[derive(Default)]
pub struct StringValidator {
    min_len: Option<usize>,
    max_len: Option<usize>,
    pattern: Option<Pattern>,
    regex: Option<Regex>,
    skip_sanitize: bool,
}

impl StringValidator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn min_len(mut self, n: usize) -> Self {
        self.min_len = Some(n);
        self
    }

    pub fn max_len(mut self, n: usize) -> Self {
        self.max_len = Some(n);
        self
    }

    pub fn pattern(mut self, pattern: Pattern) -> Self {
        self.pattern = Some(pattern);
        self
    }

    pub fn regex(mut self, regex: Regex) -> Self {
        self.regex = Some(regex);
        self
    }

    /// Disable the HTML sanitizer (on by default).
    pub fn raw(mut self) -> Self {
        self.skip_sanitize = true;
        self
    }
}

impl Validate for StringValidator {
    type Output = String;

    fn validate(&self, raw: &Value) -> Result<String, ValidationError> {
        let s = raw
            .as_str()
            .ok_or_else(|| ValidationError::invalid("must be a string"))?;

        let value = if self.skip_sanitize {
            s.to_string()
        } else {
            sanitize_html(s)
        };

        if let Some(min) = self.min_len {
            if value.chars().count() < min {
                return Err(ValidationError::invalid(format!(
                    "must be at least {min} characters"
                )));
            }
        }
        if let Some(max) = self.max_len {
            if value.chars().count() > max {
                return Err(ValidationError::invalid(format!(
                    "must be at most {max} characters"
                )));
            }
        }
        if let Some(pattern) = self.pattern {
            if !pattern.matches(&value) {
                return Err(ValidationError::invalid(format!(
                    "must be {}",
                    pattern.describe()
                )));
            }
        }
        if let Some(regex) = &self.regex {
            if !regex.is_match(&value) {
                return Err(ValidationError::invalid("does not match expected format"));
            }
        }

        Ok(value)
    }
}

#[derive(Default)]
pub struct NumberValidator {
    min: Option<f64>,
    max: Option<f64>,
    integer: bool,
    positive: bool,
}

impl NumberValidator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn min(mut self, n: f64) -> Self {
        self.min = Some(n);
        self
    }

    pub fn max(mut self, n: f64) -> Self {
        self.max = Some(n);
        self
    }

    pub fn integer(mut self) -> Self {
        self.integer = true;
        self
    }

    pub fn positive(mut self) -> Self {
        self.positive = true;
        self
    }
}

impl Validate for NumberValidator {
    type Output = f64;

    fn validate(&self, raw: &Value) -> Result<f64, ValidationError> {
        let n = raw
            .as_f64()
            .ok_or_else(|| ValidationError::invalid("must be a number"))?;

        if self.integer && n.fract() != 0.0 {
            return Err(ValidationError::invalid("must be an integer"));
        }
        if self.positive && n <= 0.0 {
            return Err(ValidationError::invalid("must be positive"));
        }
        if let Some(min) = self.min {
            if n < min {
                return Err(ValidationError::invalid(format!("must be at least {min}")));
            }
        }
        if let Some(max) = self.max {
            if n > max {
                return Err(ValidationError::invalid(format!("must be at most {max}")));
            }
        }

        Ok(n)
    }
}

#[derive(Default)]
pub struct BooleanValidator;

impl BooleanValidator {
    pub fn new() -> Self {
        Self
    }
}

impl Validate for BooleanValidator {
    type Output = bool;

    fn validate(&self, raw: &Value) -> Result<bool, ValidationError> {
        match raw {
            Value::Bool(b) => Ok(*b),
            Value::String(s) => match s.as_str() {
                "true" | "1" => Ok(true),
                "false" | "0" => Ok(false),
                _ => Err(ValidationError::invalid("must be a boolean")),
            },
            _ => Err(ValidationError::invalid("must be a boolean")),
        }
    }
}

pub struct ArrayValidator<V> {
    min_items: Option<usize>,
    max_items: Option<usize>,
    item: V,
}

impl<V> ArrayValidator<V> {
    pub fn new(item: V) -> Self {
        Self {
            min_items: None,
            max_items: None,
            item,
        }
    }

    pub fn min_items(mut self, n: usize) -> Self {
        self.min_items = Some(n);
        self
    }

    pub fn max_items(mut self, n: usize) -> Self {
        self.max_items = Some(n);
        self
    }
}

impl<V: Validate> Validate for ArrayValidator<V> {
    type Output = Vec<V::Output>;

    fn validate(&self, raw: &Value) -> Result<Vec<V::Output>, ValidationError> {
        let items = raw
            .as_array()
            .ok_or_else(|| ValidationError::invalid("must be an array"))?;

        if let Some(min) = self.min_items {
            if items.len() < min {
                return Err(ValidationError::invalid(format!(
                    "must contain at least {min} item(s)"
                )));
            }
        }
        if let Some(max) = self.max_items {
            if items.len() > max {
                return Err(ValidationError::invalid(format!(
                    "must contain at most {max} item(s)"
                )));
            }
        }

        let mut out = Vec::with_capacity(items.len());
        for (index, item) in items.iter().enumerate() {
            // Report the first offending index only.
            match self.item.validate(item) {
                Ok(v) => out.push(v),
                Err(e) => {
                    return Err(ValidationError::invalid(format!("item {index}: {e}")));
                }
            }
        }
        Ok(out)
    }
}

type FieldCheck = Box<dyn Fn(&Value) -> Result<(), ValidationError> + Send + Sync>;

/// Validates each declared field of a JSON object, aggregating all per-field
/// errors into one combined error rather than failing fast.
#[derive(Default)]
pub struct ObjectValidator {
    fields: Vec<(String, FieldCheck)>,
}

impl ObjectValidator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field<V>(mut self, name: &str, validator: V) -> Self
    where
        V: Validate + Send + Sync + 'static,
    {
        self.fields.push((
            name.to_string(),
            Box::new(move |raw| validator.validate(raw).map(|_| ())),
        ));
        self
    }
}

impl Validate for ObjectValidator {
    type Output = ();

    fn validate(&self, raw: &Value) -> Result<(), ValidationError> {
        let obj = raw
            .as_object()
            .ok_or_else(|| ValidationError::invalid("must be an object"))?;

        let mut errors = HashMap::new();
        for (name, check) in &self.fields {
            let field_value = obj.get(name).unwrap_or(&Value::Null);
            if let Err(e) = check(field_value) {
                let message = match e {
                    ValidationError::Invalid(m) => m,
                    other => other.to_string(),
                };
                errors.insert(name.clone(), message);
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::Fields(errors))
        }
    }
}
