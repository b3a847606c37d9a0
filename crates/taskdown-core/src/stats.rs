use std::collections::BTreeMap;

use serde::Serialize;

use crate::task::Task;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LaneCount {
    pub total: usize,
    pub open: usize,
    pub done: usize,
}

impl LaneCount {
    fn add(&mut self, task: &Task) {
        self.total += 1;
        if task.completed {
            self.done += 1;
        } else {
            self.open += 1;
        }
    }
}

/// Aggregate counts over an already-filtered task set. Lane keys are the
/// literal field values, with the same `(no <field>)` sentinel the grouping
/// operation uses for missing values.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StatsReport {
    pub total: LaneCount,
    pub by_project: BTreeMap<String, LaneCount>,
    pub by_bucket: BTreeMap<String, LaneCount>,
    pub by_area: BTreeMap<String, LaneCount>,
}

pub fn collect_stats(tasks: &[&Task]) -> StatsReport {
    let mut report = StatsReport::default();
    for task in tasks {
        report.total.add(task);
        report
            .by_project
            .entry(task.project_id.clone())
            .or_default()
            .add(task);
        report
            .by_bucket
            .entry(
                task.bucket
                    .clone()
                    .unwrap_or_else(|| "(no bucket)".to_string()),
            )
            .or_default()
            .add(task);
        report
            .by_area
            .entry(task.area.clone().unwrap_or_else(|| "(no area)".to_string()))
            .or_default()
            .add(task);
    }
    report
}
