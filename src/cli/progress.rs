use std::fmt::Display;
use std::time::Duration;

use anyhow::Result;
use colored::Colorize;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum StepKey {
    VerifySession,
    CheckHealth,
    AnalyzeNetlist,
    Simulate,
    SaveArtifacts,
}

impl StepKey {
    fn desc(&self) -> &'static str {
        match self {
            StepKey::VerifySession => "Verify session",
            StepKey::CheckHealth => "Check backend health",
            StepKey::AnalyzeNetlist => "Analyze netlist",
            StepKey::Simulate => "Run simulation",
            StepKey::SaveArtifacts => "Save waveforms",
        }
    }
}

#[derive(PartialEq, Eq)]
pub enum StepStatus {
    Done,
    Pending,
    InProgress,
    Skipped,
    Failed,
}

pub struct StepContext {
    step_num: usize,
    steps: Vec<Step>,
}

pub struct Step {
    key: StepKey,
    progress_bar: ProgressBar,
}

impl StepContext {
    pub fn new(keys: &[StepKey]) -> Self {
        let mp = MultiProgress::new();
        let width = format!("{}", keys.len()).len();
        let mut steps = Vec::with_capacity(keys.len());
        for (i, &key) in keys.iter().enumerate() {
            let progress_bar = mp.add(ProgressBar::new_spinner());
            let mut step = Step { key, progress_bar };
            let msg = format!("[{:width$}/{:width$}] {}", i + 1, keys.len(), key.desc());
            step.set_status(StepStatus::Pending, Some(msg));
            steps.push(step);
        }
        if let Some(first) = steps.first_mut() {
            first.set_status(StepStatus::InProgress, None);
        }
        StepContext { step_num: 0, steps }
    }

    #[inline]
    pub fn current_step(&mut self) -> Option<&mut Step> {
        self.steps.get_mut(self.step_num)
    }

    /// Marks the current and all remaining steps as failed or skipped if
    /// `res` is an error.
    pub fn check<T>(&mut self, res: Result<T>) -> Result<T> {
        if res.is_err() {
            if let Some(current_step) = self.current_step() {
                current_step.set_status(StepStatus::Failed, None);
                self.step_num += 1;
                while let Some(current_step) = self.current_step() {
                    current_step.set_status(StepStatus::Skipped, None);
                    self.step_num += 1;
                }
            }
            println!();
        }
        res
    }

    pub fn finish(&mut self, key: StepKey) {
        match self.current_step() {
            Some(current_step) if current_step.key == key => {
                current_step.set_status(StepStatus::Done, None);
                self.step_num += 1;
                if let Some(next) = self.current_step() {
                    next.set_status(StepStatus::InProgress, None);
                }
            }
            Some(current_step) => {
                log::warn!(
                    "step {:?} finished while {:?} was in progress",
                    key,
                    current_step.key
                );
            }
            None => log::warn!("step {key:?} finished after all steps completed"),
        }
    }
}

fn format_template(spinner: bool, status: impl Display) -> String {
    if spinner {
        format!("{{spinner:.green}} {:16} {{msg}}", status)
    } else {
        format!("  {:16} {{msg}}", status)
    }
}

impl Step {
    fn set_status(&mut self, status: StepStatus, msg: Option<String>) {
        let status_template = match status {
            StepStatus::Done => format_template(false, "Done".green().bold()),
            StepStatus::Failed => format_template(false, "Failed".bright_white().on_red().bold()),
            StepStatus::InProgress => format_template(true, "In Progress".bright_white().bold()),
            StepStatus::Pending => format_template(true, "Pending".blue().bold()),
            StepStatus::Skipped => format_template(false, "Skipped".yellow().bold()),
        };
        if let Ok(style) = ProgressStyle::with_template(&status_template) {
            self.progress_bar.set_style(style);
        }

        if let Some(msg) = msg {
            self.progress_bar.set_message(msg);
        }

        if status == StepStatus::InProgress {
            self.progress_bar
                .enable_steady_tick(Duration::from_millis(200));
        } else if status != StepStatus::Pending {
            self.progress_bar.finish();
        }
    }
}
