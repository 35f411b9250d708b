//! Deployment reports

use super::state::{ServiceRecord, ServiceState};
use serde::Serialize;

/// Services grouped by state at the time of the report
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeploymentReport {
    pub running: Vec<String>,
    pub starting: Vec<String>,
    pub crashed: Vec<String>,
    pub pending: Vec<String>,
    pub stopped: Vec<String>,
}

impl DeploymentReport {
    pub fn from_records(records: &[ServiceRecord]) -> Self {
        let mut report = Self::default();
        for record in records {
            let bucket = match record.state {
                ServiceState::Running => &mut report.running,
                ServiceState::Starting => &mut report.starting,
                ServiceState::Crashed => &mut report.crashed,
                ServiceState::Pending => &mut report.pending,
                ServiceState::Stopped => &mut report.stopped,
            };
            bucket.push(record.name.clone());
        }
        report
    }

    /// Whether every service is running
    pub fn is_healthy(&self) -> bool {
        self.starting.is_empty()
            && self.crashed.is_empty()
            && self.pending.is_empty()
            && self.stopped.is_empty()
    }
}

impl std::fmt::Display for DeploymentReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let groups = [
            ("running", &self.running),
            ("starting", &self.starting),
            ("crashed", &self.crashed),
            ("pending", &self.pending),
            ("stopped", &self.stopped),
        ];

        let mut first = true;
        for (label, names) in groups {
            if names.is_empty() {
                continue;
            }
            if !first {
                writeln!(f)?;
            }
            write!(f, "  {:<9} {}", label, names.join(", "))?;
            first = false;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::supervisor::StateTable;

    #[test]
    fn test_report_groups_by_state() {
        let table = StateTable::new();
        table.reset(["database", "messageq", "workers"]).unwrap();
        table.transition("database", ServiceState::Starting).unwrap();
        table.transition("database", ServiceState::Running).unwrap();
        table.transition("messageq", ServiceState::Starting).unwrap();
        table.transition("messageq", ServiceState::Crashed).unwrap();

        let report = DeploymentReport::from_records(&table.snapshot().unwrap());
        assert_eq!(report.running, vec!["database"]);
        assert_eq!(report.crashed, vec!["messageq"]);
        assert_eq!(report.pending, vec!["workers"]);
        assert!(!report.is_healthy());

        let text = report.to_string();
        assert!(text.contains("crashed   messageq"));
        assert!(!text.contains("stopped"));
    }
}
