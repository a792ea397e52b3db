//! Priority levels for notifications
//!
//! The priority decides how a send is scheduled:
//! - HIGH: bypasses throttling and batching, always dispatched solo and immediately
//! - MEDIUM: default; subject to the throttle window and optional batching
//! - LOW: same scheduling as MEDIUM, forwarded to the backend as-is

/// Priority level for notifications
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Priority {
    type Err = String;

    /// Case-insensitive; accepts the wire names only.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "low" => Ok(Priority::Low),
            "medium" => Ok(Priority::Medium),
            "high" => Ok(Priority::High),
            other => Err(format!("unknown priority: {other} (expected low, medium or high)")),
        }
    }
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
        }
    }

    /// High priority is the single override flag: it exempts a send from
    /// both the rate limiter and the batch queue.
    pub fn bypasses_scheduling(&self) -> bool {
        matches!(self, Priority::High)
    }
}
