//! Terminal progress for a convergence run.
//!
//! A spinner names the resource being worked on; finished resources are
//! printed above it as one line each.

use crate::ui;
use converge::{NotificationRecord, Phase, ProgressCallback, Resource, ResourceId, RunOutcome, Status};
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

pub struct RunProgress {
    pb: ProgressBar,
    total: usize,
    current: usize,
    quiet: bool,
}

impl RunProgress {
    pub fn new(quiet: bool) -> Self {
        let pb = if quiet {
            ProgressBar::hidden()
        } else {
            let pb = ProgressBar::new_spinner();
            if let Ok(style) = ProgressStyle::default_spinner().template("  {spinner:.green} {msg}") {
                pb.set_style(style);
            }
            pb.enable_steady_tick(Duration::from_millis(100));
            pb
        };
        Self {
            pb,
            total: 0,
            current: 0,
            quiet,
        }
    }

    fn print(&self, line: &str) {
        self.pb.suspend(|| println!("{line}"));
    }

    pub fn finish(&self) {
        self.pb.finish_and_clear();
    }
}

fn phase_label(phase: Phase) -> &'static str {
    match phase {
        Phase::Guards => "checking guards",
        Phase::Querying => "querying",
        Phase::Applying => "applying",
    }
}

impl ProgressCallback for RunProgress {
    fn on_run_start(&mut self, total: usize) {
        self.total = total;
    }

    fn on_resource_start(&mut self, index: usize, resource: &Resource) {
        self.current = index + 1;
        self.pb
            .set_message(format!("[{}/{}] {}", self.current, self.total, resource.id));
    }

    fn on_phase(&mut self, id: &ResourceId, phase: Phase) {
        self.pb.set_message(format!(
            "[{}/{}] {} ({})",
            self.current,
            self.total,
            id,
            phase_label(phase)
        ));
    }

    fn on_resource_complete(&mut self, outcome: &RunOutcome) {
        if !self.quiet || outcome.status == Status::Failed {
            self.print(&ui::outcome_line(outcome));
        }
    }

    fn on_notification(&mut self, record: &NotificationRecord) {
        if !self.quiet || record.status == Status::Failed {
            self.print(&ui::notification_line(record));
        }
    }
}
