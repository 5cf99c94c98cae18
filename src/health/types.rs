//! Health check results and the aggregate decision

use std::fmt;

use serde::Serialize;

/// Outcome class of a single check
#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CheckStatus {
    Pass,
    Warn,
    Fail,
}

impl fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CheckStatus::Pass => f.write_str("PASS"),
            CheckStatus::Warn => f.write_str("WARN"),
            CheckStatus::Fail => f.write_str("FAIL"),
        }
    }
}

/// Whether a mutation may go ahead
#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Decision {
    Proceed,
    Warn,
    Block,
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Decision::Proceed => f.write_str("PROCEED"),
            Decision::Warn => f.write_str("WARN"),
            Decision::Block => f.write_str("BLOCK"),
        }
    }
}

/// Outcome of one named check
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct HealthCheckResult {
    pub name: String,
    pub status: CheckStatus,
    /// 0..=100
    pub score: u8,
    pub message: String,
    pub details: Vec<String>,
    /// Whether a FAIL here blocks the overall decision
    pub is_blocking: bool,
}

impl HealthCheckResult {
    pub fn new(
        name: &str,
        status: CheckStatus,
        score: u8,
        message: impl Into<String>,
        is_blocking: bool,
    ) -> Self {
        Self {
            name: name.to_string(),
            status,
            score: score.min(100),
            message: message.into(),
            details: Vec::new(),
            is_blocking,
        }
    }

    pub fn with_details(mut self, details: Vec<String>) -> Self {
        self.details = details;
        self
    }

    /// A check that could not gather its data.
    ///
    /// Missing data is never treated as healthy nor as a hard failure.
    pub fn degraded(name: &str, message: impl Into<String>, guidance: &str, is_blocking: bool) -> Self {
        Self::new(name, CheckStatus::Warn, super::checks::DEGRADED_SCORE, message, is_blocking)
            .with_details(vec![guidance.to_string()])
    }

    pub fn blocks(&self) -> bool {
        self.status == CheckStatus::Fail && self.is_blocking
    }
}

/// Aggregate of one evaluation pass
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct HealthSummary {
    pub results: Vec<HealthCheckResult>,
    pub overall_score: u8,
    pub decision: Decision,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

impl HealthSummary {
    pub fn from_results(results: Vec<HealthCheckResult>) -> Self {
        let overall_score = if results.is_empty() {
            0
        } else {
            let total: u32 = results.iter().map(|r| u32::from(r.score)).sum();
            (total / results.len() as u32) as u8
        };

        let mut warnings = Vec::new();
        let mut errors = Vec::new();
        for r in &results {
            match r.status {
                CheckStatus::Fail if r.is_blocking => {
                    errors.push(format!("{}: {}", r.name, r.message))
                }
                CheckStatus::Fail | CheckStatus::Warn => {
                    warnings.push(format!("{}: {}", r.name, r.message))
                }
                CheckStatus::Pass => {}
            }
        }

        let decision = if results.iter().any(HealthCheckResult::blocks) {
            Decision::Block
        } else if !warnings.is_empty() {
            Decision::Warn
        } else {
            Decision::Proceed
        };

        Self {
            results,
            overall_score,
            decision,
            warnings,
            errors,
        }
    }

    pub fn result(&self, name: &str) -> Option<&HealthCheckResult> {
        self.results.iter().find(|r| r.name == name)
    }

    /// One line naming the decision and the messages that drove it
    pub fn reason(&self) -> String {
        match self.decision {
            Decision::Block => self.errors.join("; "),
            Decision::Warn => self.warnings.join("; "),
            Decision::Proceed => format!("all checks passed (score {})", self.overall_score),
        }
    }
}

impl fmt::Display for HealthSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for r in &self.results {
            writeln!(f, "[{}] {} ({}): {}", r.status, r.name, r.score, r.message)?;
            for d in &r.details {
                writeln!(f, "    - {d}")?;
            }
        }
        write!(
            f,
            "Overall score: {} -> {}",
            self.overall_score, self.decision
        )
    }
}
