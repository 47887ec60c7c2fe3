//! Match expression evaluation.
//!
//! When the credential store reports newly-added credentials it carries a
//! match expression describing which targets they apply to. The registry
//! re-evaluates its pending (unresolved) targets against that expression and
//! attempts immediate resolution for matches, so a newly-supplied credential
//! unblocks a target without waiting for the next retry tick.

use beacon_model::ServiceRef;
use regex::Regex;
use thiserror::Error;

/// Errors from evaluating a match expression.
#[derive(Debug, Error)]
pub enum MatchError {
    /// The expression could not be compiled.
    #[error("invalid match expression: {0}")]
    InvalidExpression(#[from] regex::Error),
}

/// External match evaluator collaborator.
pub trait MatchEvaluator: Send + Sync {
    /// Evaluates `expression` against one target.
    fn matches(&self, expression: &str, target: &ServiceRef)
        -> std::result::Result<bool, MatchError>;
}

/// Default evaluator: the expression is a regex screened against the
/// target's connect URI and effective alias.
pub struct UriMatcher;

impl MatchEvaluator for UriMatcher {
    fn matches(
        &self,
        expression: &str,
        target: &ServiceRef,
    ) -> std::result::Result<bool, MatchError> {
        let re = Regex::new(expression)?;
        Ok(re.is_match(&target.connect_uri) || re.is_match(target.effective_alias()))
    }
}
