//! Named response checks.
//!
//! A check is a pure predicate over `(status_code, body, latency)`. Checks
//! are declared in the config as `[[check]]` blocks and deserialize into
//! [`CheckKind`]; custom predicates can be registered programmatically by
//! implementing [`CheckPredicate`].
//!
//! ```toml
//! [[check]]
//! name = "status was 200"
//! type = "status_equals"
//! status = 200
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::loadtest::config::duration_str;

/// The parts of a response a check may inspect.
#[derive(Debug, Clone, Copy)]
pub struct ResponseView<'a> {
    /// HTTP status code.
    pub status: u16,
    /// Response body, present only when at least one check asked for it.
    pub body: Option<&'a str>,
    /// Time from request start until the response (and body, if read) arrived.
    pub latency: Duration,
}

/// A pure boolean predicate over a response.
pub trait CheckPredicate: Send + Sync + fmt::Debug {
    /// Evaluate the predicate.
    fn evaluate(&self, response: &ResponseView<'_>) -> bool;

    /// Whether the executor must read the response body for this predicate.
    fn needs_body(&self) -> bool {
        false
    }
}

/// Built-in predicates available from the config file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CheckKind {
    /// Status code equals `status`.
    StatusEquals { status: u16 },
    /// Status code is one of `statuses`.
    StatusIn { statuses: Vec<u16> },
    /// Body contains `text`.
    BodyContains { text: String },
    /// Latency is strictly below `max`.
    LatencyBelow {
        #[serde(with = "duration_str")]
        max: Duration,
    },
}

impl CheckPredicate for CheckKind {
    fn evaluate(&self, response: &ResponseView<'_>) -> bool {
        match self {
            Self::StatusEquals { status } => response.status == *status,
            Self::StatusIn { statuses } => statuses.contains(&response.status),
            Self::BodyContains { text } => response.body.is_some_and(|b| b.contains(text.as_str())),
            Self::LatencyBelow { max } => response.latency < *max,
        }
    }

    fn needs_body(&self) -> bool {
        matches!(self, Self::BodyContains { .. })
    }
}

/// A `[[check]]` block as written in the config file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct CheckConfig {
    /// Display name; also the key for per-check metrics.
    pub name: String,
    /// The predicate.
    #[serde(flatten)]
    pub kind: CheckKind,
}

/// A named check ready for evaluation.
#[derive(Debug, Clone)]
pub struct Check {
    name: String,
    predicate: Arc<dyn CheckPredicate>,
}

impl Check {
    /// Creates a check from any predicate.
    pub fn new(name: impl Into<String>, predicate: impl CheckPredicate + 'static) -> Self {
        Self {
            name: name.into(),
            predicate: Arc::new(predicate),
        }
    }

    /// The check's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Evaluate against a response.
    pub fn evaluate(&self, response: &ResponseView<'_>) -> bool {
        self.predicate.evaluate(response)
    }

    /// Whether the response body is required.
    pub fn needs_body(&self) -> bool {
        self.predicate.needs_body()
    }
}

impl From<&CheckConfig> for Check {
    fn from(config: &CheckConfig) -> Self {
        Self::new(config.name.clone(), config.kind.clone())
    }
}
