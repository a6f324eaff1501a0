//! Error types and result definitions for sink operations.
//!
//! Provides an error system with classification, aggregation, and captured diagnostic metadata.
//! The [`SinkError`] type supports single errors, errors with additional detail, and multiple
//! aggregated errors, which is how a record that produced several statements reports the failure
//! of more than one of them.

use std::backtrace::Backtrace;
use std::borrow::Cow;
use std::error;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::panic::Location;
use std::sync::Arc;

/// Convenient result type for sink operations using [`SinkError`] as the error type.
pub type SinkResult<T> = Result<T, SinkError>;

/// Detailed payload stored for single [`SinkError`] instances.
#[derive(Debug, Clone)]
struct ErrorPayload {
    kind: ErrorKind,
    description: Cow<'static, str>,
    detail: Option<Cow<'static, str>>,
    source: Option<Arc<dyn error::Error + Send + Sync>>,
    location: &'static Location<'static>,
    backtrace: Arc<Backtrace>,
}

/// Main error type for sink operations.
///
/// [`SinkError`] can represent single errors, errors with additional detail, or multiple
/// aggregated errors. Errors are cheap to clone so that one failure can be reported both to the
/// delivery collaborator and to the logs.
#[derive(Debug, Clone)]
pub struct SinkError {
    repr: ErrorRepr,
}

#[derive(Debug, Clone)]
enum ErrorRepr {
    /// Single error payload holding rich metadata.
    Single(ErrorPayload),
    /// Multiple aggregated errors.
    ///
    /// Used when several statements derived from one record fail.
    Many {
        errors: Vec<SinkError>,
        location: &'static Location<'static>,
    },
}

/// The four failure families a record can run into, plus internal failures.
///
/// Only [`ErrorCategory::Configuration`] is unconditionally fatal; the other families are
/// subject to the per-record error tolerance policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Unresolvable mapping or unsupported conversion, detected at startup.
    Configuration,
    /// A mapped field is absent or its path is malformed.
    Mapping,
    /// A value could not be converted to its column type.
    Conversion,
    /// The database rejected or could not execute a statement.
    Execution,
    /// A bug or unexpected state inside the sink itself.
    Internal,
}

/// Specific categories of errors that can occur during sink operations.
#[derive(PartialEq, Eq, Copy, Clone, Debug, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    // Configuration Errors
    ConfigError,
    UnsupportedConversion,
    MissingTableSchema,
    UnknownColumn,
    InvalidMapping,

    // Mapping Errors
    MissingField,
    InvalidFieldPath,
    NullPrimaryKey,
    UnknownTopic,

    // Conversion Errors
    ConversionError,
    ValueOutOfRange,
    InvalidData,

    // Execution Errors
    DestinationQueryFailed,
    DestinationTimeout,
    DestinationConnectionFailed,

    // State Errors
    InvalidState,
    SubmissionPanic,

    // Serialization Errors
    IoError,
    SerializationError,
    DeserializationError,

    // Unknown / Uncategorized
    Unknown,
}

impl ErrorKind {
    /// Returns the failure family of this kind.
    pub fn category(&self) -> ErrorCategory {
        match self {
            ErrorKind::ConfigError
            | ErrorKind::UnsupportedConversion
            | ErrorKind::MissingTableSchema
            | ErrorKind::UnknownColumn
            | ErrorKind::InvalidMapping => ErrorCategory::Configuration,
            ErrorKind::MissingField
            | ErrorKind::InvalidFieldPath
            | ErrorKind::NullPrimaryKey
            | ErrorKind::UnknownTopic => ErrorCategory::Mapping,
            ErrorKind::ConversionError
            | ErrorKind::ValueOutOfRange
            | ErrorKind::InvalidData
            | ErrorKind::SerializationError
            | ErrorKind::DeserializationError => ErrorCategory::Conversion,
            ErrorKind::DestinationQueryFailed
            | ErrorKind::DestinationTimeout
            | ErrorKind::DestinationConnectionFailed => ErrorCategory::Execution,
            ErrorKind::InvalidState
            | ErrorKind::SubmissionPanic
            | ErrorKind::IoError
            | ErrorKind::Unknown => ErrorCategory::Internal,
        }
    }
}

impl SinkError {
    /// Returns the [`ErrorKind`] of this error.
    ///
    /// For multiple errors, returns the kind of the first error or [`ErrorKind::Unknown`]
    /// if the error list is empty.
    pub fn kind(&self) -> ErrorKind {
        match self.repr {
            ErrorRepr::Single(ref payload) => payload.kind,
            ErrorRepr::Many { ref errors, .. } => errors
                .first()
                .map(|err| err.kind())
                .unwrap_or(ErrorKind::Unknown),
        }
    }

    /// Returns all [`ErrorKind`]s present in this error.
    pub fn kinds(&self) -> Vec<ErrorKind> {
        match self.repr {
            ErrorRepr::Single(ref payload) => vec![payload.kind],
            ErrorRepr::Many { ref errors, .. } => errors
                .iter()
                .flat_map(|err| err.kinds())
                .collect::<Vec<_>>(),
        }
    }

    /// Returns the failure family of this error.
    ///
    /// For aggregated errors an execution failure dominates, since the only way to aggregate
    /// errors is through multiple submitted statements.
    pub fn category(&self) -> ErrorCategory {
        match self.repr {
            ErrorRepr::Single(ref payload) => payload.kind.category(),
            ErrorRepr::Many { ref errors, .. } => {
                let categories = errors.iter().map(|e| e.category()).collect::<Vec<_>>();
                if categories.contains(&ErrorCategory::Configuration) {
                    ErrorCategory::Configuration
                } else if categories
                    .iter()
                    .all(|category| *category == ErrorCategory::Execution)
                    && !categories.is_empty()
                {
                    ErrorCategory::Execution
                } else {
                    categories
                        .into_iter()
                        .find(|category| *category != ErrorCategory::Execution)
                        .unwrap_or(ErrorCategory::Internal)
                }
            }
        }
    }

    /// Returns the static description of this error.
    pub fn description(&self) -> &str {
        match self.repr {
            ErrorRepr::Single(ref payload) => &payload.description,
            ErrorRepr::Many { .. } => "multiple errors",
        }
    }

    /// Returns the detailed error information if available.
    ///
    /// For multiple errors, returns the detail of the first error that has one.
    pub fn detail(&self) -> Option<&str> {
        match self.repr {
            ErrorRepr::Single(ref payload) => payload.detail.as_deref(),
            ErrorRepr::Many { ref errors, .. } => errors.iter().find_map(|e| e.detail()),
        }
    }

    /// Returns the captured backtrace for this error.
    pub fn backtrace(&self) -> Option<&Backtrace> {
        match self.repr {
            ErrorRepr::Single(ref payload) => Some(payload.backtrace.as_ref()),
            ErrorRepr::Many { .. } => None,
        }
    }

    /// Returns the captured callsite location for this error.
    pub fn location(&self) -> &'static Location<'static> {
        match self.repr {
            ErrorRepr::Single(ref payload) => payload.location,
            ErrorRepr::Many { location, .. } => location,
        }
    }

    /// Attaches an originating [`error::Error`] to this error and returns the modified instance.
    ///
    /// Has no effect when called on aggregated errors because aggregates forward the first
    /// contained error as their source.
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: error::Error + Send + Sync + 'static,
    {
        if let ErrorRepr::Single(ref mut payload) = self.repr {
            payload.source = Some(Arc::new(source));
        }
        self
    }

    /// Prefixes the detail of this error with some context, such as the column being bound.
    ///
    /// Aggregated errors are returned unchanged.
    pub fn with_context(mut self, context: impl fmt::Display) -> Self {
        if let ErrorRepr::Single(ref mut payload) = self.repr {
            let detail = match payload.detail.take() {
                Some(detail) => format!("{context}: {detail}"),
                None => context.to_string(),
            };
            payload.detail = Some(Cow::Owned(detail));
        }
        self
    }

    /// Creates a [`SinkError`] from its components.
    #[track_caller]
    fn from_components(
        kind: ErrorKind,
        description: Cow<'static, str>,
        detail: Option<Cow<'static, str>>,
        source: Option<Arc<dyn error::Error + Send + Sync>>,
    ) -> Self {
        SinkError {
            repr: ErrorRepr::Single(ErrorPayload {
                kind,
                description,
                detail,
                source,
                location: Location::caller(),
                backtrace: Arc::new(Backtrace::capture()),
            }),
        }
    }
}

impl PartialEq for SinkError {
    fn eq(&self, other: &SinkError) -> bool {
        match (&self.repr, &other.repr) {
            (ErrorRepr::Single(a), ErrorRepr::Single(b)) => a.kind == b.kind,
            (
                ErrorRepr::Many {
                    errors: errors_a, ..
                },
                ErrorRepr::Many {
                    errors: errors_b, ..
                },
            ) => {
                errors_a.len() == errors_b.len()
                    && errors_a.iter().zip(errors_b.iter()).all(|(a, b)| a == b)
            }
            _ => false,
        }
    }
}

impl Hash for SinkError {
    /// Hashes the error using only its stable identifying components.
    ///
    /// Location, detail, source and backtrace are excluded so that errors of the same category
    /// produce the same hash.
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(&self.repr).hash(state);
        match &self.repr {
            ErrorRepr::Single(payload) => {
                payload.kind.hash(state);
                payload.description.hash(state);
            }
            ErrorRepr::Many { errors, .. } => {
                errors.len().hash(state);
                for error in errors {
                    error.hash(state);
                }
            }
        }
    }
}

impl fmt::Display for SinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        match &self.repr {
            ErrorRepr::Single(payload) => {
                let location = payload.location;
                write!(
                    f,
                    "[{:?}] {} @ {}:{}:{}",
                    payload.kind,
                    payload.description,
                    location.file(),
                    location.line(),
                    location.column()
                )?;

                write_detail(payload.detail.as_deref(), f, 1)?;
                write_backtrace(payload.backtrace.as_ref(), f, 1)?;

                Ok(())
            }
            ErrorRepr::Many { errors, location } => {
                let count = errors.len();
                write!(
                    f,
                    "[Many] {} error{} aggregated @ {}:{}:{}",
                    count,
                    if count == 1 { "" } else { "s" },
                    location.file(),
                    location.line(),
                    location.column()
                )?;

                if errors.is_empty() {
                    write!(f, "\n  (no inner errors provided)")?;
                } else {
                    for (index, error) in errors.iter().enumerate() {
                        let rendered = format!("{error}");
                        let mut lines = rendered.lines();
                        if let Some(first_line) = lines.next() {
                            write!(f, "\n  {}. {}", index + 1, first_line)?;
                        } else {
                            write!(f, "\n  {}.", index + 1)?;
                        }

                        for line in lines {
                            if line.is_empty() {
                                write!(f, "\n     ")?;
                            } else {
                                write!(f, "\n     {line}")?;
                            }
                        }
                    }
                }

                Ok(())
            }
        }
    }
}

impl error::Error for SinkError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match &self.repr {
            ErrorRepr::Single(payload) => payload
                .source
                .as_ref()
                .map(|source| source as &(dyn error::Error + 'static)),
            ErrorRepr::Many { errors, .. } => errors
                .first()
                .map(|error| error as &(dyn error::Error + 'static)),
        }
    }
}

/// Writes the captured backtrace with indentation.
fn write_backtrace(
    backtrace: &Backtrace,
    f: &mut fmt::Formatter<'_>,
    indent: usize,
) -> fmt::Result {
    let indent_str = "  ".repeat(indent);

    let rendered_backtrace = format!("{backtrace}");
    if !rendered_backtrace.trim().is_empty() {
        write!(f, "\n{indent_str}Backtrace:")?;
        for line in rendered_backtrace.lines() {
            if line.trim().is_empty() {
                write!(f, "\n{indent_str}  ")?;
            } else {
                write!(f, "\n{indent_str}  {line}")?;
            }
        }
    }

    Ok(())
}

/// Writes the detail block with indentation.
fn write_detail(detail: Option<&str>, f: &mut fmt::Formatter<'_>, indent: usize) -> fmt::Result {
    if let Some(detail) = detail {
        let indent_str = "  ".repeat(indent);
        if detail.trim().is_empty() {
            write!(f, "\n{indent_str}Detail: <empty>")?;
        } else {
            write!(f, "\n{indent_str}Detail:")?;
            for line in detail.lines() {
                if line.trim().is_empty() {
                    write!(f, "\n{indent_str}  ")?;
                } else {
                    write!(f, "\n{indent_str}  {line}")?;
                }
            }
        }
    }

    Ok(())
}

/// Creates a [`SinkError`] from an error kind and static description.
impl From<(ErrorKind, &'static str)> for SinkError {
    #[track_caller]
    fn from((kind, desc): (ErrorKind, &'static str)) -> SinkError {
        SinkError::from_components(kind, Cow::Borrowed(desc), None, None)
    }
}

/// Creates a [`SinkError`] from an error kind, static description, and dynamic detail.
impl<D> From<(ErrorKind, &'static str, D)> for SinkError
where
    D: Into<Cow<'static, str>>,
{
    #[track_caller]
    fn from((kind, desc, detail): (ErrorKind, &'static str, D)) -> SinkError {
        SinkError::from_components(kind, Cow::Borrowed(desc), Some(detail.into()), None)
    }
}

/// Creates a [`SinkError`] from a vector of errors for aggregation.
///
/// If the vector contains exactly one error, returns that error directly without wrapping it.
impl<E> From<Vec<E>> for SinkError
where
    E: Into<SinkError>,
{
    #[track_caller]
    fn from(errors: Vec<E>) -> SinkError {
        let location = Location::caller();

        let mut errors: Vec<SinkError> = errors.into_iter().map(Into::into).collect();

        if errors.len() == 1 {
            return errors.pop().expect("just checked length is 1");
        }

        SinkError {
            repr: ErrorRepr::Many { errors, location },
        }
    }
}

/// Generates a `From` conversion for a foreign error with a fixed kind and description.
macro_rules! impl_from_source {
    ($source:ty, $kind:expr, $description:literal) => {
        impl From<$source> for SinkError {
            #[track_caller]
            fn from(err: $source) -> SinkError {
                let detail = err.to_string();
                SinkError::from_components(
                    $kind,
                    Cow::Borrowed($description),
                    Some(Cow::Owned(detail)),
                    Some(Arc::new(err)),
                )
            }
        }
    };
}

impl_from_source!(std::io::Error, ErrorKind::IoError, "I/O operation failed");
impl_from_source!(
    std::num::ParseIntError,
    ErrorKind::ConversionError,
    "Integer parsing failed"
);
impl_from_source!(
    std::num::ParseFloatError,
    ErrorKind::ConversionError,
    "Float parsing failed"
);
impl_from_source!(
    chrono::ParseError,
    ErrorKind::ConversionError,
    "Datetime parsing failed"
);
impl_from_source!(uuid::Error, ErrorKind::ConversionError, "UUID parsing failed");
impl_from_source!(
    base64::DecodeError,
    ErrorKind::ConversionError,
    "Base64 decoding failed"
);
impl_from_source!(
    bigdecimal::ParseBigDecimalError,
    ErrorKind::ConversionError,
    "Decimal parsing failed"
);
impl_from_source!(
    std::net::AddrParseError,
    ErrorKind::ConversionError,
    "Inet address parsing failed"
);

/// Converts [`serde_json::Error`] to [`SinkError`] with the appropriate error kind.
impl From<serde_json::Error> for SinkError {
    #[track_caller]
    fn from(err: serde_json::Error) -> SinkError {
        let (kind, description) = match err.classify() {
            serde_json::error::Category::Io => (ErrorKind::IoError, "JSON I/O operation failed"),
            serde_json::error::Category::Syntax
            | serde_json::error::Category::Data
            | serde_json::error::Category::Eof => (
                ErrorKind::DeserializationError,
                "JSON deserialization failed",
            ),
        };

        let detail = err.to_string();
        SinkError::from_components(
            kind,
            Cow::Borrowed(description),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}
