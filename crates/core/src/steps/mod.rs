//! Step definitions: what runs after a completed step.

mod catalog;

pub use catalog::{PipelineTemplate, StaticStepCatalog, StepCatalog, StepDefinition};
