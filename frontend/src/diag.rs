// diag.rs — Error taxonomy and stable diagnostic codes
//
// Every failure in the front-end is a `SpecError`. Errors are never
// recovered internally: they propagate to the caller, which decides how to
// present them (the CLI prints `render()` and exits non-zero).
//
// Preconditions: none (types only).
// Postconditions: none (types only).
// Failure modes: none.
// Side effects: none.

use std::fmt;

use thiserror::Error;

// ── Diagnostic code ──────────────────────────────────────────────────────

/// A stable diagnostic code (e.g., `E0101`).
///
/// Codes are `&'static str` constants defined in the `codes` module. Once
/// assigned, a code keeps its meaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DiagCode(pub &'static str);

impl fmt::Display for DiagCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

pub mod codes {
    use super::DiagCode;

    // Schema
    pub const E0101: DiagCode = DiagCode("E0101"); // missing required key
    pub const E0102: DiagCode = DiagCode("E0102"); // type mismatch
    pub const E0103: DiagCode = DiagCode("E0103"); // unrecognized key or tag
    pub const E0104: DiagCode = DiagCode("E0104"); // temporary key left behind
    pub const E0105: DiagCode = DiagCode("E0105"); // hyphen/underscore alias
    pub const E0106: DiagCode = DiagCode("E0106"); // key group cardinality
    pub const E0107: DiagCode = DiagCode("E0107"); // reserved key
    pub const E0108: DiagCode = DiagCode("E0108"); // value not castable here

    // Combination
    pub const E0201: DiagCode = DiagCode("E0201");

    // Processors
    pub const E0301: DiagCode = DiagCode("E0301"); // ordering violation
    pub const E0302: DiagCode = DiagCode("E0302"); // processor failure

    // Lookup and structural validity
    pub const E0401: DiagCode = DiagCode("E0401");
    pub const E0402: DiagCode = DiagCode("E0402");

    // Expressions
    pub const E0501: DiagCode = DiagCode("E0501");

    // Loading
    pub const E0601: DiagCode = DiagCode("E0601");
}

// ── Error classes ────────────────────────────────────────────────────────

/// Coarse error class, used by callers that only care about the category
/// of a failure (missing/aliased keys vs. invalid values vs. pipeline misuse).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Key,
    Value,
    Type,
    Processor,
    Io,
}

// ── SpecError ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Error)]
pub enum SpecError {
    #[error(
        "Missing required key \"{key}\" in {path}. Required keys not found: {missing:?}. Found keys: {found:?}"
    )]
    MissingKey {
        path: String,
        key: String,
        missing: Vec<String>,
        found: Vec<String>,
    },

    #[error("Value {value} for \"{key}\" in {path} is not any of the expected types: {expected}")]
    TypeMismatch {
        path: String,
        key: String,
        value: String,
        expected: String,
    },

    #[error("Could not cast \"{key}\" in {path}: {reason}")]
    Cast {
        path: String,
        key: String,
        reason: String,
    },

    #[error("Unrecognized {what} \"{key}\" in {path}. Recognized {what}s: {recognized:?}")]
    Unrecognized {
        path: String,
        what: &'static str,
        key: String,
        recognized: Vec<String>,
    },

    #[error(
        "Found {what} \"{key}\" in {path}. This should have been removed or transformed by {processor}, but was not."
    )]
    LeftoverKey {
        path: String,
        what: &'static str,
        key: String,
        processor: String,
    },

    #[error("Key \"{key}\" is an alias for \"{existing}\" in {path}. Use \"{existing}\" instead.")]
    AliasKey {
        path: String,
        key: String,
        existing: String,
    },

    #[error("Key \"{key}\" is reserved and can not be set in {path}")]
    ReservedKey { path: String, key: String },

    #[error("Expected {rule} of {keys:?} in {path}, found {found:?}")]
    KeyGroup {
        path: String,
        rule: &'static str,
        keys: Vec<String>,
        found: Vec<String>,
    },

    #[error("{reason} (in {path})")]
    Combine { path: String, reason: String },

    #[error(
        "{before} must run before {after}. Add {before} to the processor list ahead of {after}."
    )]
    Ordering { before: String, after: String },

    #[error("{processor}: {message}")]
    Processor { processor: String, message: String },

    #[error("Could not find {what} \"{name}\". Available: {available:?}")]
    Lookup {
        what: &'static str,
        name: String,
        available: Vec<String>,
    },

    #[error("{message} (in {path})")]
    Invalid { path: String, message: String },

    #[error("Failed to evaluate \"{expression}\" in {path}: {reason}")]
    Expression {
        path: String,
        expression: String,
        reason: String,
    },

    #[error("Failed to load {source_name}: {message}")]
    Load {
        source_name: String,
        message: String,
    },

    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<SpecError>,
    },
}

pub type Result<T> = std::result::Result<T, SpecError>;

impl SpecError {
    /// Stable diagnostic code for this error.
    pub fn code(&self) -> DiagCode {
        match self {
            SpecError::MissingKey { .. } => codes::E0101,
            SpecError::TypeMismatch { .. } => codes::E0102,
            SpecError::Unrecognized { .. } => codes::E0103,
            SpecError::LeftoverKey { .. } => codes::E0104,
            SpecError::AliasKey { .. } => codes::E0105,
            SpecError::KeyGroup { .. } => codes::E0106,
            SpecError::ReservedKey { .. } => codes::E0107,
            SpecError::Cast { .. } => codes::E0108,
            SpecError::Combine { .. } => codes::E0201,
            SpecError::Ordering { .. } => codes::E0301,
            SpecError::Processor { .. } => codes::E0302,
            SpecError::Lookup { .. } => codes::E0401,
            SpecError::Invalid { .. } => codes::E0402,
            SpecError::Expression { .. } => codes::E0501,
            SpecError::Load { .. } => codes::E0601,
            SpecError::Context { source, .. } => source.code(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            SpecError::MissingKey { .. }
            | SpecError::AliasKey { .. }
            | SpecError::KeyGroup { .. } => ErrorKind::Key,
            SpecError::TypeMismatch { .. } | SpecError::Cast { .. } => ErrorKind::Type,
            SpecError::Ordering { .. } | SpecError::Processor { .. } => ErrorKind::Processor,
            SpecError::Load { .. } => ErrorKind::Io,
            SpecError::Context { source, .. } => source.kind(),
            _ => ErrorKind::Value,
        }
    }

    /// Remediation hint, when one is generic enough to state.
    pub fn hint(&self) -> Option<String> {
        match self {
            SpecError::Unrecognized { .. } => Some(
                "check the spelling, or include \"ignore\" in the key name to keep it unvalidated"
                    .to_string(),
            ),
            SpecError::AliasKey { existing, .. } => {
                Some(format!("rename the key to \"{existing}\""))
            }
            SpecError::Ordering { before, .. } => {
                Some(format!("list {before} earlier in the processor list"))
            }
            SpecError::Context { source, .. } => source.hint(),
            _ => None,
        }
    }

    /// Wrap this error with a leading context message.
    pub fn context(self, context: impl Into<String>) -> SpecError {
        SpecError::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Innermost error beneath any context wrappers.
    pub fn root(&self) -> &SpecError {
        match self {
            SpecError::Context { source, .. } => source.root(),
            other => other,
        }
    }

    /// Render as `error[CODE]: message` plus an optional hint line.
    pub fn render(&self) -> String {
        let mut out = format!("error[{}]: {}", self.code(), self);
        if let Some(hint) = self.hint() {
            out.push_str("\n  hint: ");
            out.push_str(&hint);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_with_hint() {
        let e = SpecError::AliasKey {
            path: "Temporal".into(),
            key: "no-temporal-reuse".into(),
            existing: "no_temporal_reuse".into(),
        };
        assert_eq!(
            e.render(),
            "error[E0105]: Key \"no-temporal-reuse\" is an alias for \"no_temporal_reuse\" in Temporal. \
             Use \"no_temporal_reuse\" instead.\n  hint: rename the key to \"no_temporal_reuse\""
        );
    }

    #[test]
    fn context_preserves_code_and_kind() {
        let e = SpecError::Combine {
            path: "Specification".into(),
            reason: "conflict".into(),
        }
        .context("Failed to combine duplicate element in key [variables]");
        assert_eq!(e.code(), codes::E0201);
        assert_eq!(e.kind(), ErrorKind::Value);
        assert!(matches!(e.root(), SpecError::Combine { .. }));
        assert_eq!(
            e.to_string(),
            "Failed to combine duplicate element in key [variables]: conflict (in Specification)"
        );
    }

    #[test]
    fn kinds_follow_taxonomy() {
        let missing = SpecError::MissingKey {
            path: "Storage".into(),
            key: "name".into(),
            missing: vec!["name".into()],
            found: vec![],
        };
        assert_eq!(missing.kind(), ErrorKind::Key);
        let ordering = SpecError::Ordering {
            before: "References2Copies".into(),
            after: "ConstraintAttacher".into(),
        };
        assert_eq!(ordering.kind(), ErrorKind::Processor);
        assert_eq!(ordering.code(), codes::E0301);
    }
}
