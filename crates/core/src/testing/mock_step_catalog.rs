//! Mock step catalog for testing.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::steps::{StepCatalog, StepDefinition};

#[derive(Debug, Default)]
struct Inner {
    next: HashMap<(String, u32), StepDefinition>,
    entries: HashMap<String, StepDefinition>,
    lookups: Vec<(String, u32)>,
}

/// Mock implementation of the StepCatalog trait.
///
/// Every step is final unless a successor was registered with
/// [`MockStepCatalog::set_next`]. Lookups are recorded.
#[derive(Debug, Default)]
pub struct MockStepCatalog {
    inner: Mutex<Inner>,
}

impl MockStepCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    fn inner(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register `next_method` as the step after `step_order` in `template`.
    pub fn set_next(&self, template: &str, step_order: u32, next_method: &str) {
        self.inner().next.insert(
            (template.to_string(), step_order),
            StepDefinition {
                method: next_method.to_string(),
                config: serde_json::Value::Null,
            },
        );
    }

    /// Register the entry step of a template.
    pub fn set_entry(&self, template: &str, method: &str) {
        self.inner().entries.insert(
            template.to_string(),
            StepDefinition {
                method: method.to_string(),
                config: serde_json::Value::Null,
            },
        );
    }

    /// `(template, step_order)` pairs looked up so far.
    pub fn lookups(&self) -> Vec<(String, u32)> {
        self.inner().lookups.clone()
    }
}

impl StepCatalog for MockStepCatalog {
    fn next_step(&self, template: &str, step_order: u32) -> Option<StepDefinition> {
        let mut inner = self.inner();
        inner.lookups.push((template.to_string(), step_order));
        inner.next.get(&(template.to_string(), step_order)).cloned()
    }

    fn entry_step(&self, template: &str) -> Option<StepDefinition> {
        self.inner().entries.get(template).cloned()
    }
}
