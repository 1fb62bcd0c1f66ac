use fantasia_domain::HitGrade;
use serde::{Deserialize, Serialize};

const PERFECT_POINTS: u64 = 100;
const GOOD_POINTS: u64 = 70;
/// Extra points per full ten-hit streak.
const COMBO_POINTS: u64 = 10;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PerformanceReport {
    pub accuracy: f32,
    pub perfect_hits: u32,
    pub good_hits: u32,
    pub misses: u32,
    pub early_hits: u32,
    pub late_hits: u32,
    pub max_combo: u32,
    pub score: u64,
}

impl PerformanceReport {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn judged(&self) -> u32 {
        self.perfect_hits + self.good_hits + self.misses
    }
}

/// Tallies judgments into points. Grades weight the score only; damage ignores them.
#[derive(Debug, Clone, Default)]
pub struct ScoringEngine {
    report: PerformanceReport,
    combo: u32,
}

impl ScoringEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn points_for(grade: HitGrade, combo: u32) -> u64 {
        let base = match grade {
            HitGrade::Perfect => PERFECT_POINTS,
            HitGrade::Good => GOOD_POINTS,
        };
        base + COMBO_POINTS * (combo / 10) as u64
    }

    /// Records a hit `offset_ms` away from the nominal time; returns the points awarded.
    pub fn record_hit(&mut self, grade: HitGrade, offset_ms: f64) -> u64 {
        self.combo += 1;
        let report = &mut self.report;
        report.max_combo = report.max_combo.max(self.combo);
        match grade {
            HitGrade::Perfect => report.perfect_hits += 1,
            HitGrade::Good => report.good_hits += 1,
        }
        if offset_ms < 0.0 {
            report.early_hits += 1;
        } else if offset_ms > 0.0 {
            report.late_hits += 1;
        }
        let points = Self::points_for(grade, self.combo);
        report.score += points;
        self.refresh_accuracy();
        points
    }

    pub fn record_miss(&mut self) {
        self.combo = 0;
        self.report.misses += 1;
        self.refresh_accuracy();
    }

    pub fn combo(&self) -> u32 {
        self.combo
    }

    pub fn report(&self) -> &PerformanceReport {
        &self.report
    }

    fn refresh_accuracy(&mut self) {
        let judged = self.report.judged();
        self.report.accuracy = if judged == 0 {
            0.0
        } else {
            (self.report.perfect_hits + self.report.good_hits) as f32 / judged as f32
        };
    }
}
