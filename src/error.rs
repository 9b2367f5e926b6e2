//! Structured HTTP errors.
//!
//! Handlers fail by returning any error. The dispatcher looks for an
//! [`Error`] inside it; anything else is reported to the client as a
//! `500 Internal Server Error` whose message is the error's `Display` output.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use http::StatusCode;
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Deserialize, Serialize, Serializer};

use crate::entity::Headers;

/// The error type handlers return.
///
/// Any `std::error::Error + Send + Sync` converts into it, so `?` works on
/// whatever a handler calls.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// An error that carries an HTTP status.
///
/// The message is the cause's `Display` output, or the status's canonical
/// reason phrase when there is no cause.
///
/// ```rust
/// use restline::StatusCode;
/// use restline::{Error, FieldViolation};
///
/// let err = Error::msg(StatusCode::UNPROCESSABLE_ENTITY, "invalid user")
///     .with_header("retry-after", "0")
///     .with_detail(vec![FieldViolation::new("email", "is required")]);
///
/// assert_eq!(err.status(), StatusCode::UNPROCESSABLE_ENTITY);
/// assert_eq!(err.to_string(), "invalid user");
/// ```
#[derive(Debug)]
pub struct Error {
    status: StatusCode,
    headers: Headers,
    cause: Option<BoxError>,
    detail: Option<Detail>,
}

impl Error {
    pub fn new(status: StatusCode, cause: impl Into<BoxError>) -> Self {
        Self { status, headers: Vec::new(), cause: Some(cause.into()), detail: None }
    }

    /// An error whose cause is a plain message.
    pub fn msg(status: StatusCode, message: impl Into<String>) -> Self {
        Self::new(status, BasicError(message.into()))
    }

    /// An error with no cause; its message is the status's reason phrase.
    pub fn from_status(status: StatusCode) -> Self {
        Self { status, headers: Vec::new(), cause: None, detail: None }
    }

    pub fn with_headers(mut self, headers: Headers) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_detail(mut self, detail: impl ErrorDetail) -> Self {
        self.detail = detail.error_detail();
        self
    }

    pub fn status(&self) -> StatusCode { self.status }
    pub fn headers(&self) -> &[(String, String)] { &self.headers }
    pub fn detail(&self) -> Option<&Detail> { self.detail.as_ref() }

    pub fn cause(&self) -> Option<&(dyn std::error::Error + Send + Sync + 'static)> {
        self.cause.as_deref()
    }

    pub fn message(&self) -> String {
        match &self.cause {
            Some(c) => c.to_string(),
            None => self.status.canonical_reason().unwrap_or_default().to_owned(),
        }
    }

    /// The serializable body sent to clients that do not ask for HTML.
    pub fn body(&self) -> ErrorBody {
        ErrorBody {
            status: self.status.as_u16(),
            message: self.message(),
            detail: self.detail.clone(),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message())
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self.cause {
            Some(c) => Some(c.as_ref()),
            None => None,
        }
    }
}

impl From<StatusCode> for Error {
    fn from(status: StatusCode) -> Self {
        Self::from_status(status)
    }
}

#[derive(Debug)]
struct BasicError(String);

impl fmt::Display for BasicError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for BasicError {}

/// Wire shape of an error: `{"status":404,"message":"not found"}`, plus a
/// `detail` member when the error has one.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub status: u16,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none", skip_deserializing)]
    pub detail: Option<Detail>,
}

// ── Detail ────────────────────────────────────────────────────────────────────

/// Machine-readable supplement to an error.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Detail {
    /// Key / value pairs, kept in insertion order.
    Map(Vec<(String, String)>),
    /// An ordered list of field errors and plain values.
    List(Vec<Item>),
}

/// One element of a [`Detail::List`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Item {
    Field { field: String, message: String },
    Value(String),
}

impl Detail {
    pub fn map<K: fmt::Display, V: fmt::Display>(entries: impl IntoIterator<Item = (K, V)>) -> Self {
        Self::Map(entries.into_iter().map(|(k, v)| (k.to_string(), v.to_string())).collect())
    }

    pub fn fields<'a, F: FieldError + 'a>(fields: impl IntoIterator<Item = &'a F>) -> Self {
        Self::List(
            fields
                .into_iter()
                .map(|f| Item::Field { field: f.error_field().to_owned(), message: f.error_message() })
                .collect(),
        )
    }

    pub fn values<V: fmt::Display>(values: impl IntoIterator<Item = V>) -> Self {
        Self::List(values.into_iter().map(|v| Item::Value(v.to_string())).collect())
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Self::Map(m) => m.is_empty(),
            Self::List(l) => l.is_empty(),
        }
    }
}

impl Serialize for Detail {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Map(entries) => {
                let mut map = serializer.serialize_map(Some(entries.len()))?;
                for (k, v) in entries {
                    map.serialize_entry(k, v)?;
                }
                map.end()
            }
            Self::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
        }
    }
}

// ── Capabilities ──────────────────────────────────────────────────────────────

/// Implemented by values that can describe an error in structured form.
pub trait ErrorDetail {
    fn error_detail(&self) -> Option<Detail>;
}

/// Implemented by errors that concern a single named field.
pub trait FieldError {
    fn error_field(&self) -> &str;
    fn error_message(&self) -> String;
}

impl ErrorDetail for Error {
    fn error_detail(&self) -> Option<Detail> {
        self.detail.clone()
    }
}

impl ErrorDetail for Detail {
    fn error_detail(&self) -> Option<Detail> {
        Some(self.clone())
    }
}

impl<T: FieldError> ErrorDetail for Vec<T> {
    fn error_detail(&self) -> Option<Detail> {
        Some(Detail::fields(self))
    }
}

impl<K: fmt::Display, V: fmt::Display> ErrorDetail for BTreeMap<K, V> {
    fn error_detail(&self) -> Option<Detail> {
        Some(Detail::map(self))
    }
}

/// Entries are sorted by key so the rendered detail is stable.
impl<K: fmt::Display, V: fmt::Display, S> ErrorDetail for HashMap<K, V, S> {
    fn error_detail(&self) -> Option<Detail> {
        let mut entries: Vec<(String, String)> =
            self.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        entries.sort();
        Some(Detail::Map(entries))
    }
}

/// A ready-made [`FieldError`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldViolation {
    pub field: String,
    pub message: String,
}

impl FieldViolation {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self { field: field.into(), message: message.into() }
    }
}

impl FieldError for FieldViolation {
    fn error_field(&self) -> &str { &self.field }
    fn error_message(&self) -> String { self.message.clone() }
}

impl fmt::Display for FieldViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for FieldViolation {}
