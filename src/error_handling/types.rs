use std::fmt;

#[derive(Debug)]
pub enum ConfigError {
    IoError(std::io::Error),
    TomlError(String),
    BadIPFormatting(String),
    NotInRange(String),
    MissingValue(String),
    DuplicateMachine(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "IO error: {}", e),
            ConfigError::TomlError(e) => write!(f, "TOML parsing error: {}", e),
            ConfigError::BadIPFormatting(e) => write!(f, "IP formatting error: {}", e),
            ConfigError::NotInRange(e) => write!(f, "Value out of range: {}", e),
            ConfigError::MissingValue(e) => write!(f, "Missing value: {}", e),
            ConfigError::DuplicateMachine(e) => write!(f, "Duplicate machine id: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::IoError(err)
    }
}

#[derive(Debug)]
pub enum StorageError {
    ConnectionFailed(String),
    WriteFailed(String),
    ReadFailed(String),
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::ConnectionFailed(e) => write!(f, "Storage connection failed: {}", e),
            StorageError::WriteFailed(e) => write!(f, "Storage write failed: {}", e),
            StorageError::ReadFailed(e) => write!(f, "Storage read failed: {}", e),
        }
    }
}

impl std::error::Error for StorageError {}

/// Failures of the address-range codec.
///
/// Both variants carry the offending literal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    InvalidAddressFormat(String),
    InvalidRangeFormat(String),
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodecError::InvalidAddressFormat(lit) => {
                write!(f, "unable to parse '{}': invalid ip address / range", lit)
            }
            CodecError::InvalidRangeFormat(lit) => write!(
                f,
                "unable to convert '{}' to int interval: '{}' is not a valid CIDR: invalid ip address / range",
                lit, lit
            ),
        }
    }
}

impl std::error::Error for CodecError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterError {
    UnknownFilterKey { key: String, value: String },
    TypeConversionError { value: String, reason: String },
    DurationParseError(String),
    Codec(CodecError),
}

impl fmt::Display for FilterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterError::UnknownFilterKey { key, value } => write!(
                f,
                "Filter parameter '{}' is unknown (={}): invalid filter",
                key, value
            ),
            FilterError::TypeConversionError { value, reason } => write!(
                f,
                "'{}' is not a boolean: {}: unable to parse type",
                value, reason
            ),
            FilterError::DurationParseError(e) => write!(f, "while parsing duration: {}", e),
            FilterError::Codec(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for FilterError {}

impl From<CodecError> for FilterError {
    fn from(err: CodecError) -> Self {
        FilterError::Codec(err)
    }
}

#[derive(Debug)]
pub enum IngestError {
    MalformedInput(String),
    EmptyBatch,
    /// Field paths in reporting order, e.g. `scenario`, `source.value`.
    MissingRequiredField(Vec<String>),
    InvalidField(String),
    InvalidDecision(CodecError),
    Storage(StorageError),
}

impl fmt::Display for IngestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IngestError::MalformedInput(e) => write!(f, "{}", e),
            IngestError::EmptyBatch => write!(f, "no alert in request body"),
            IngestError::MissingRequiredField(fields) => {
                write!(f, "validation failure list:")?;
                for field in fields {
                    write!(f, "\n{} in body is required", field)?;
                }
                Ok(())
            }
            IngestError::InvalidField(e) => write!(f, "validation failure list:\n{}", e),
            IngestError::InvalidDecision(e) => write!(f, "invalid decision: {}", e),
            IngestError::Storage(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for IngestError {}

impl From<StorageError> for IngestError {
    fn from(err: StorageError) -> Self {
        IngestError::Storage(err)
    }
}

impl From<CodecError> for IngestError {
    fn from(err: CodecError) -> Self {
        IngestError::InvalidDecision(err)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    Unauthorized(String),
    ForbiddenOrigin(String),
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthError::Unauthorized(e) => write!(f, "{}", e),
            AuthError::ForbiddenOrigin(addr) => {
                write!(f, "access forbidden from this IP ({})", addr)
            }
        }
    }
}

impl std::error::Error for AuthError {}

#[derive(Debug)]
pub enum WebError {
    BindFailed(String),
    ServerFailed(String),
}

impl fmt::Display for WebError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WebError::BindFailed(e) => write!(f, "Web server bind failed: {}", e),
            WebError::ServerFailed(e) => write!(f, "Web server failed: {}", e),
        }
    }
}

impl std::error::Error for WebError {}
