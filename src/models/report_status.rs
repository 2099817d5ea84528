use serde::{Deserialize, Serialize};
use std::fmt;

/// Status of a report node. `Running` is transient, every other value is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReportNodeStatus {
    /// Infrastructure or unexpected failure
    TechnicalError,
    /// A dispatched unit of work reported a business failure
    Failed,
    /// Cooperative cancellation
    Interrupted,
    Passed,
    /// Filter or flag driven, not an error
    Skipped,
    /// Placeholder status of skeleton nodes
    Norun,
    Running,
}

impl ReportNodeStatus {
    pub const ALL: [ReportNodeStatus; 7] = [
        Self::TechnicalError,
        Self::Failed,
        Self::Interrupted,
        Self::Passed,
        Self::Skipped,
        Self::Norun,
        Self::Running,
    ];

    /// Most severe first
    pub fn default_severity_order() -> [ReportNodeStatus; 7] {
        Self::ALL
    }

    /// Failures halt sequential composition unless a continue policy says otherwise
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed | Self::TechnicalError)
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Running)
    }

    fn index(&self) -> usize {
        match self {
            Self::TechnicalError => 0,
            Self::Failed => 1,
            Self::Interrupted => 2,
            Self::Passed => 3,
            Self::Skipped => 4,
            Self::Norun => 5,
            Self::Running => 6,
        }
    }
}

impl fmt::Display for ReportNodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TechnicalError => write!(f, "TECHNICAL_ERROR"),
            Self::Failed => write!(f, "FAILED"),
            Self::Interrupted => write!(f, "INTERRUPTED"),
            Self::Passed => write!(f, "PASSED"),
            Self::Skipped => write!(f, "SKIPPED"),
            Self::Norun => write!(f, "NORUN"),
            Self::Running => write!(f, "RUNNING"),
        }
    }
}

impl std::str::FromStr for ReportNodeStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "TECHNICAL_ERROR" => Ok(Self::TechnicalError),
            "FAILED" => Ok(Self::Failed),
            "INTERRUPTED" => Ok(Self::Interrupted),
            "PASSED" => Ok(Self::Passed),
            "SKIPPED" => Ok(Self::Skipped),
            "NORUN" => Ok(Self::Norun),
            "RUNNING" => Ok(Self::Running),
            _ => Err(format!("Invalid report node status: {s}")),
        }
    }
}

/// Ranking used to fold child statuses into a parent status.
///
/// Every status appears exactly once; a lower rank is more severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeverityOrder {
    ranks: [u8; 7],
}

impl SeverityOrder {
    pub fn new(order: Vec<ReportNodeStatus>) -> Result<Self, String> {
        if order.len() != ReportNodeStatus::ALL.len() {
            return Err(format!(
                "expected {} statuses, got {}",
                ReportNodeStatus::ALL.len(),
                order.len()
            ));
        }

        let mut ranks = [u8::MAX; 7];
        for (rank, status) in order.iter().enumerate() {
            let slot = &mut ranks[status.index()];
            if *slot != u8::MAX {
                return Err(format!("status {status} listed more than once"));
            }
            *slot = rank as u8;
        }
        Ok(Self { ranks })
    }

    pub fn rank(&self, status: ReportNodeStatus) -> u8 {
        self.ranks[status.index()]
    }

    pub fn most_severe(&self, a: ReportNodeStatus, b: ReportNodeStatus) -> ReportNodeStatus {
        if self.rank(b) < self.rank(a) {
            b
        } else {
            a
        }
    }

    /// Most severe status of the sequence, `Passed` when empty
    pub fn compose<I>(&self, statuses: I) -> ReportNodeStatus
    where
        I: IntoIterator<Item = ReportNodeStatus>,
    {
        statuses
            .into_iter()
            .reduce(|acc, s| self.most_severe(acc, s))
            .unwrap_or(ReportNodeStatus::Passed)
    }
}

impl Default for SeverityOrder {
    fn default() -> Self {
        let mut ranks = [0u8; 7];
        for (rank, status) in ReportNodeStatus::default_severity_order().iter().enumerate() {
            ranks[status.index()] = rank as u8;
        }
        Self { ranks }
    }
}

/// Running fold of child statuses into a parent status
#[derive(Debug, Clone)]
pub struct StatusComposer {
    order: SeverityOrder,
    status: ReportNodeStatus,
}

impl StatusComposer {
    pub fn new(initial: ReportNodeStatus, order: SeverityOrder) -> Self {
        Self {
            order,
            status: initial,
        }
    }

    pub fn add(&mut self, status: ReportNodeStatus) {
        self.status = self.order.most_severe(self.status, status);
    }

    pub fn status(&self) -> ReportNodeStatus {
        self.status
    }
}
