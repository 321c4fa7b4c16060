use serde::{Deserialize, Serialize};

use crate::domain::{ReturnRecord, ReturnStatus};

/// Number of returns per status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub pending: usize,
    pub approved: usize,
    pub rejected: usize,
    pub received: usize,
    pub processed: usize,
    pub cancelled: usize,
}

impl StatusCounts {
    pub fn from_records(records: &[ReturnRecord]) -> Self {
        let mut counts = Self::default();
        for record in records {
            match record.status {
                ReturnStatus::Pending => counts.pending += 1,
                ReturnStatus::Approved => counts.approved += 1,
                ReturnStatus::Rejected => counts.rejected += 1,
                ReturnStatus::Received => counts.received += 1,
                ReturnStatus::Processed => counts.processed += 1,
                ReturnStatus::Cancelled => counts.cancelled += 1,
            }
        }
        counts
    }

    pub fn total(&self) -> usize {
        self.pending + self.approved + self.rejected + self.received + self.processed + self.cancelled
    }

    /// Returns that still need someone to act on them.
    pub fn open(&self) -> usize {
        self.pending + self.approved + self.received
    }
}
