//! Rich diagnostic error types for the forward chainer.
//!
//! Each subsystem defines its own error type with miette `#[diagnostic]` derives,
//! providing error codes and help text. Only [`ChainerError`] ever reaches the
//! caller of a run: knowledge-base and rule errors raised while stepping are
//! absorbed and logged by the step executor.

use miette::Diagnostic;
use thiserror::Error;

// ---------------------------------------------------------------------------
// Knowledge base errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum KbError {
    #[error("unknown fact: {fact_id}")]
    #[diagnostic(
        code(akh::kb::unknown_fact),
        help(
            "The fact id does not exist in this knowledge base. \
             Add the fact first, or check that it came from the same knowledge base."
        )
    )]
    UnknownFact { fact_id: u64 },

    #[error("fact allocator exhausted: cannot allocate more than u64::MAX facts")]
    #[diagnostic(
        code(akh::kb::exhausted),
        help("The fact id space is exhausted. Check for runaway rule productions.")
    )]
    AllocatorExhausted,

    #[error("malformed atom: {message}")]
    #[diagnostic(
        code(akh::kb::malformed_atom),
        help("Nodes need a non-empty kind and name; links need a non-empty kind.")
    )]
    MalformedAtom { message: String },

    #[error("execution of rule '{rule_name}' failed: {message}")]
    #[diagnostic(
        code(akh::kb::execution),
        help(
            "The rule could not be executed against the knowledge base. \
             Check that every variable in the conclusion is bound by a premise."
        )
    )]
    Execution { rule_name: String, message: String },
}

// ---------------------------------------------------------------------------
// Rule errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum RuleError {
    #[error("rule parse error in rule '{rule_name}': {message}")]
    #[diagnostic(
        code(akh::rule::parse),
        help("Rules must specify valid patterns. Use '$' prefix for variables.")
    )]
    Parse { rule_name: String, message: String },

    #[error("syntax error at byte {position}: {message}")]
    #[diagnostic(
        code(akh::rule::syntax),
        help(
            "Expressions are written as `Kind:name` nodes, `$X` or `$X:Kind` variables, \
             and `(Kind child ...)` links."
        )
    )]
    Syntax { position: usize, message: String },

    #[error("invalid truth value for rule '{rule_name}': mean {mean}, confidence {confidence}")]
    #[diagnostic(
        code(akh::rule::truth_value),
        help("Both the mean and the confidence of a truth value must lie in [0.0, 1.0].")
    )]
    InvalidTruthValue {
        rule_name: String,
        mean: f64,
        confidence: f64,
    },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Kb(#[from] KbError),
}

// ---------------------------------------------------------------------------
// Chainer errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum ChainerError {
    #[error("invalid source: {message}")]
    #[diagnostic(
        code(akh::chainer::invalid_source),
        help(
            "The starting fact must exist in the knowledge base before the \
             chainer is built. Add it with `KnowledgeBase::add` first."
        )
    )]
    InvalidSource { message: String },

    #[error("invalid chainer configuration: {message}")]
    #[diagnostic(
        code(akh::chainer::invalid_config),
        help("`jobs` must be at least 1 and `complexity-penalty` must be a finite, non-negative number.")
    )]
    InvalidConfig { message: String },

    #[error("could not read rule base {path}")]
    #[diagnostic(
        code(akh::chainer::rule_base_io),
        help("Check that the rule base file exists and is readable.")
    )]
    RuleBaseIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed rule base {name}: {message}")]
    #[diagnostic(
        code(akh::chainer::rule_base_format),
        help(
            "A rule base is a TOML document with an optional `name`, a `[config]` \
             table, and a `rules` string in the `@rule` text format."
        )
    )]
    RuleBaseFormat { name: String, message: String },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Kb(#[from] KbError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Rule(#[from] RuleError),
}

/// Result type for knowledge-base operations.
pub type KbResult<T> = std::result::Result<T, KbError>;

/// Result type for rule parsing and construction.
pub type RuleResult<T> = std::result::Result<T, RuleError>;

/// Convenience alias for functions returning chainer results.
pub type ChainerResult<T> = std::result::Result<T, ChainerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kb_error_converts_to_chainer_error() {
        let err = KbError::UnknownFact { fact_id: 7 };
        let chainer: ChainerError = err.into();
        assert!(matches!(
            chainer,
            ChainerError::Kb(KbError::UnknownFact { fact_id: 7 })
        ));
    }

    #[test]
    fn rule_error_wraps_kb_error() {
        let rule_err: RuleError = KbError::AllocatorExhausted.into();
        assert!(matches!(rule_err, RuleError::Kb(KbError::AllocatorExhausted)));
    }

    #[test]
    fn error_display_messages_are_descriptive() {
        let err = RuleError::InvalidTruthValue {
            rule_name: "deduction".into(),
            mean: 1.5,
            confidence: 0.2,
        };
        let msg = format!("{err}");
        assert!(msg.contains("deduction"));
        assert!(msg.contains("1.5"));
    }
}
