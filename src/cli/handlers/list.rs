//! List command handler
//!
//! Prints the job table. Works offline: the registry is built over an
//! in-memory store, since only the configuration decides job state.

use std::fmt::Write;
use std::sync::Arc;

use crate::config::settings::Settings;
use crate::error::AppResult;
use crate::jobs::{JobRegistry, JobState};
use crate::repositories::{MemoryStore, Repositories};
use crate::state::AppState;

pub struct ListCommandHandler {
    config: Settings,
}

impl ListCommandHandler {
    pub fn new(config: Settings) -> Self {
        Self { config }
    }

    pub fn execute(&self) -> AppResult<()> {
        let executor = AppState::executor(
            &self.config,
            Repositories::in_memory(Arc::new(MemoryStore::new())),
        )?;
        print!("{}", render_table(executor.registry()));
        Ok(())
    }
}

/// One line per job: name, state, schedule, and the reason a job is
/// misconfigured.
pub fn render_table(registry: &JobRegistry) -> String {
    let width = registry
        .entries()
        .iter()
        .map(|entry| entry.name.len())
        .max()
        .unwrap_or(0)
        .max(4);

    let mut out = String::new();
    let _ = writeln!(out, "{:<width$}  {:<13}  SCHEDULE", "NAME", "STATE");
    for entry in registry.entries() {
        let schedule = entry.schedule.as_deref().unwrap_or("-");
        let _ = write!(out, "{:<width$}  {:<13}  {}", entry.name, entry.state.label(), schedule);
        if let JobState::Misconfigured(reason) = &entry.state {
            let _ = write!(out, "  ({})", reason);
        }
        out.push('\n');
    }
    out
}
