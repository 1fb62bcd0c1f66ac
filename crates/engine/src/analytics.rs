use fantasia_domain::{SessionResult, StageRecord};
use serde::{Deserialize, Serialize};

use crate::scoring::PerformanceReport;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionAnalytics {
    pub stage_id: String,
    pub result: SessionResult,
    pub report: PerformanceReport,
}

impl SessionAnalytics {
    pub fn new(stage_id: impl Into<String>, result: SessionResult, report: PerformanceReport) -> Self {
        Self {
            stage_id: stage_id.into(),
            result,
            report,
        }
    }

    pub fn update_record(&self, record: &mut StageRecord) {
        record.plays += 1;
        if self.result == SessionResult::Clear {
            record.clears += 1;
        }
        record.best_score = record.best_score.max(self.report.score);
        record.best_accuracy = record.best_accuracy.max(self.report.accuracy);
    }
}
