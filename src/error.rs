//! Host-facing error type (spec §7). Mirrors the teacher's `JSError` shape:
//! one `thiserror` enum distinguishing guest exceptions that escaped the
//! root frame from genuine host/IO failures. Internal invariant violations
//! (§7.3) are never represented here — they panic, by design.

use crate::value::Value;

#[derive(thiserror::Error, Debug)]
pub enum EngineError {
    /// A guest exception (`Completion::Throw`) that unwound past the root
    /// `Program` frame, converted to the guest error's `name`/`message`.
    #[error("{name}: {message}")]
    GuestException { name: String, message: String },

    /// A sandboxed regex operation exceeded `REGEXP_THREAD_TIMEOUT`.
    #[error("regex timed out: {pattern}")]
    RegexTimeout { pattern: String },

    /// `REGEXP_MODE == 0` and the guest program attempted a regex operation.
    #[error("regular expressions are disabled (REGEXP_MODE = 0)")]
    RegexDisabled,

    /// The host-supplied AST JSON did not deserialize into the schema of §6.1.
    #[error("malformed AST: {0}")]
    ParseError(#[from] serde_json::Error),

    /// Direct `eval()` was called but no `SourceParser` was configured.
    #[error("eval() requires a configured source parser")]
    EvalUnsupported,

    /// The step machine was driven (`step`/`run`) while `paused_` was set.
    #[error("cannot step a paused interpreter")]
    SteppedWhilePaused,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    pub fn from_guest_value(name: impl Into<String>, message: impl Into<String>) -> Self {
        EngineError::GuestException {
            name: name.into(),
            message: message.into(),
        }
    }
}

/// A guest-visible exception class, used by `throw_exception` to build the
/// guest Error object before it ever becomes a host-facing `EngineError`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GuestErrorClass {
    Error,
    TypeError,
    RangeError,
    ReferenceError,
    SyntaxError,
    EvalError,
    URIError,
}

impl GuestErrorClass {
    pub fn name(self) -> &'static str {
        match self {
            GuestErrorClass::Error => "Error",
            GuestErrorClass::TypeError => "TypeError",
            GuestErrorClass::RangeError => "RangeError",
            GuestErrorClass::ReferenceError => "ReferenceError",
            GuestErrorClass::SyntaxError => "SyntaxError",
            GuestErrorClass::EvalError => "EvalError",
            GuestErrorClass::URIError => "URIError",
        }
    }
}

/// What a single `throw_exception` call carries before it is turned into a
/// guest Error object and folded into the unwind machinery.
pub enum ThrowPayload {
    Class(GuestErrorClass, String),
    Value(Value),
}
