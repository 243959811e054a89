//! Errors generated by the compiler. Mirrors the shape of the error type
//! used throughout the pipeline: a boxed kind plus an optional source
//! location, fail-fast at the point the invariant was violated.

use crate::SourceLoc;

/// Convenience wrapper for the result type threaded through every pass.
pub type AsnResult<T> = std::result::Result<T, Error>;

#[derive(Clone)]
pub struct Error {
    kind: Box<ErrorKind>,
    loc: Option<SourceLoc>,
}

impl Error {
    pub fn with_loc(mut self, loc: SourceLoc) -> Self {
        self.loc = Some(loc);
        self
    }

    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    /// Stable message-id string used by callers that need to branch on
    /// error kind without matching on `ErrorKind`.
    pub fn kind_id(&self) -> &'static str {
        self.kind.id()
    }

    fn new(kind: ErrorKind) -> Self {
        Error {
            kind: Box::new(kind),
            loc: None,
        }
    }

    pub fn out_of_range<S: ToString>(msg: S) -> Self {
        Self::new(ErrorKind::OutOfRange(msg.to_string()))
    }
    pub fn type_mismatch<S: ToString>(msg: S) -> Self {
        Self::new(ErrorKind::TypeMismatch(msg.to_string()))
    }
    pub fn missing_module_context<S: ToString>(msg: S) -> Self {
        Self::new(ErrorKind::MissingModuleContext(msg.to_string()))
    }
    pub fn leaked_predicate<S: ToString>(msg: S) -> Self {
        Self::new(ErrorKind::LeakedPredicate(msg.to_string()))
    }
    pub fn missing_predicate_metadata<S: ToString>(msg: S) -> Self {
        Self::new(ErrorKind::MissingPredicateMetadata(msg.to_string()))
    }
    pub fn name_conflict<S: ToString>(msg: S) -> Self {
        Self::new(ErrorKind::NameConflict(msg.to_string()))
    }
    pub fn unsupported_width<S: ToString>(msg: S) -> Self {
        Self::new(ErrorKind::UnsupportedWidth(msg.to_string()))
    }
    pub fn patch_application_failed<S: ToString>(msg: S) -> Self {
        Self::new(ErrorKind::PatchApplicationFailed(msg.to_string()))
    }
    pub fn toolchain_missing<S: ToString>(msg: S) -> Self {
        Self::new(ErrorKind::ToolchainMissing(msg.to_string()))
    }
    pub fn internal<S: ToString>(msg: S) -> Self {
        Self::new(ErrorKind::Internal(msg.to_string()))
    }
}

impl std::fmt::Debug for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(loc) = &self.loc {
            write!(f, "{loc}: {}", self.kind)
        } else {
            write!(f, "{}", self.kind)
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(self, f)
    }
}

impl std::error::Error for Error {}

/// The full catalog of user-facing error kinds, plus the ambient
/// `Io`/`Internal` additions a real implementation needs (file I/O during
/// emission, and invariant violations that indicate a compiler bug rather
/// than a user mistake).
#[derive(Clone)]
pub enum ErrorKind {
    OutOfRange(String),
    TypeMismatch(String),
    MissingModuleContext(String),
    LeakedPredicate(String),
    MissingPredicateMetadata(String),
    NameConflict(String),
    UnsupportedWidth(String),
    PatchApplicationFailed(String),
    ToolchainMissing(String),
    Io(String),
    Internal(String),
}

impl ErrorKind {
    pub fn id(&self) -> &'static str {
        use ErrorKind::*;
        match self {
            OutOfRange(_) => "OutOfRange",
            TypeMismatch(_) => "TypeMismatch",
            MissingModuleContext(_) => "MissingModuleContext",
            LeakedPredicate(_) => "LeakedPredicate",
            MissingPredicateMetadata(_) => "MissingPredicateMetadata",
            NameConflict(_) => "NameConflict",
            UnsupportedWidth(_) => "UnsupportedWidth",
            PatchApplicationFailed(_) => "PatchApplicationFailed",
            ToolchainMissing(_) => "ToolchainMissing",
            Io(_) => "Io",
            Internal(_) => "Internal",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        use ErrorKind::*;
        match self {
            OutOfRange(m) => write!(f, "[OutOfRange] {m}"),
            TypeMismatch(m) => write!(f, "[TypeMismatch] {m}"),
            MissingModuleContext(m) => write!(f, "[MissingModuleContext] {m}"),
            LeakedPredicate(m) => write!(f, "[LeakedPredicate] {m}"),
            MissingPredicateMetadata(m) => {
                write!(f, "[MissingPredicateMetadata] {m}")
            }
            NameConflict(m) => write!(f, "[NameConflict] {m}"),
            UnsupportedWidth(m) => write!(f, "[UnsupportedWidth] {m}"),
            PatchApplicationFailed(m) => {
                write!(f, "[PatchApplicationFailed] {m}")
            }
            ToolchainMissing(m) => write!(f, "[ToolchainMissing] {m}"),
            Io(m) => write!(f, "{m}"),
            Internal(m) => write!(f, "[Internal] {m}"),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::new(ErrorKind::Io(format!("IO error: {e}")))
    }
}
