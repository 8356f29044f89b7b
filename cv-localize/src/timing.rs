use log::*;
use std::time::Duration;

/// A mean updated one sample at a time.
#[derive(Debug, Copy, Clone, Default, PartialEq)]
pub struct RunningMean {
    pub mean: f64,
    pub samples: u32,
}

impl RunningMean {
    pub fn add(&mut self, value: f64) {
        let n = self.samples as f64;
        self.mean = self.mean * n / (n + 1.0) + value / (n + 1.0);
        self.samples += 1;
    }
}

/// Average wall clock time in seconds spent in each stage of localization.
#[derive(Debug, Copy, Clone, Default, PartialEq)]
pub struct StageTimings {
    pub assign: RunningMean,
    pub matching: RunningMean,
    pub voting: RunningMean,
    pub selection: RunningMean,
    pub total: RunningMean,
}

/// The time one query spent in each stage.
#[derive(Debug, Copy, Clone, Default, PartialEq)]
pub struct QueryTimings {
    pub assign: Duration,
    pub matching: Duration,
    pub voting: Duration,
    pub selection: Duration,
}

impl QueryTimings {
    pub fn total(&self) -> Duration {
        self.assign + self.matching + self.voting + self.selection
    }
}

impl StageTimings {
    pub fn record(&mut self, query: &QueryTimings) {
        self.assign.add(query.assign.as_secs_f64());
        self.matching.add(query.matching.as_secs_f64());
        self.voting.add(query.voting.as_secs_f64());
        self.selection.add(query.selection.as_secs_f64());
        self.total.add(query.total().as_secs_f64());
    }

    pub fn log(&self) {
        info!(
            "average times over {} queries: assign {:.4}s, matching {:.4}s, voting {:.4}s, selection {:.4}s, total {:.4}s",
            self.total.samples,
            self.assign.mean,
            self.matching.mean,
            self.voting.mean,
            self.selection.mean,
            self.total.mean
        );
    }
}
