//! Process-local workflow counters.
//! Tracks how many conversations entered and left each workflow kind; written to the log
//! on every enter/exit and summarized when the console shuts down.
use std::collections::HashMap;
use std::sync::{Mutex, OnceLock};

static WORKFLOW_COUNTERS: OnceLock<Mutex<HashMap<String, WorkflowCounter>>> = OnceLock::new();

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WorkflowCounter {
    pub entries: u64,
    pub exits: u64,
    pub currently_active: u64,
    pub concurrent_peak: u64,
}

fn counter_lock() -> &'static Mutex<HashMap<String, WorkflowCounter>> {
    WORKFLOW_COUNTERS.get_or_init(|| Mutex::new(HashMap::new()))
}

fn with_counter<F: FnOnce(&mut WorkflowCounter)>(slug: &str, f: F) -> WorkflowCounter {
    // A poisoned lock only means another thread panicked mid-update; the counts are still usable.
    let mut guard = match counter_lock().lock() {
        Ok(g) => g,
        Err(poisoned) => poisoned.into_inner(),
    };
    let counter = guard.entry(slug.to_string()).or_default();
    f(counter);
    *counter
}

pub fn record_workflow_entry(slug: &str) -> WorkflowCounter {
    with_counter(slug, |c| {
        c.entries = c.entries.saturating_add(1);
        c.currently_active = c.currently_active.saturating_add(1);
        if c.currently_active > c.concurrent_peak {
            c.concurrent_peak = c.currently_active;
        }
    })
}

pub fn record_workflow_exit(slug: &str) -> WorkflowCounter {
    with_counter(slug, |c| {
        c.exits = c.exits.saturating_add(1);
        if c.currently_active > 0 {
            c.currently_active -= 1;
        }
    })
}

pub fn workflow_counters_snapshot() -> HashMap<String, WorkflowCounter> {
    match counter_lock().lock() {
        Ok(g) => g.clone(),
        Err(poisoned) => poisoned.into_inner().clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn workflow_entry_exit_updates_counters() {
        // unique slug so parallel tests touching other workflows do not interfere
        let slug = "metrics-test-wizard";
        let entry = record_workflow_entry(slug);
        assert_eq!(entry.entries, 1);
        assert_eq!(entry.currently_active, 1);
        assert_eq!(entry.concurrent_peak, 1);

        let second = record_workflow_entry(slug);
        assert_eq!(second.currently_active, 2);
        assert_eq!(second.concurrent_peak, 2);

        record_workflow_exit(slug);
        let exit = record_workflow_exit(slug);
        assert_eq!(exit.exits, 2);
        assert_eq!(exit.currently_active, 0);
        assert_eq!(exit.concurrent_peak, 2);

        let snap = workflow_counters_snapshot();
        assert_eq!(snap.get(slug).map(|c| c.entries), Some(2));
    }

    #[test]
    fn exit_without_entry_does_not_underflow() {
        let c = record_workflow_exit("metrics-test-orphan");
        assert_eq!(c.currently_active, 0);
        assert_eq!(c.exits, 1);
    }
}
