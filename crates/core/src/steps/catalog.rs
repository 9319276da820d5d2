//! Step catalog trait and the configuration-backed implementation.

use serde::{Deserialize, Serialize};

/// One step of a pipeline template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepDefinition {
    /// Step-type selector passed to the provider.
    pub method: String,
    /// Parameters passed to the provider unchanged.
    #[serde(default)]
    pub config: serde_json::Value,
}

/// Named, ordered list of steps (`[[pipelines]]` in the config file).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineTemplate {
    pub name: String,
    pub steps: Vec<StepDefinition>,
}

/// Lookup of step definitions.
pub trait StepCatalog: Send + Sync {
    /// The step that follows `step_order` in the named template, or `None`
    /// when that step is the last one or the template is unknown.
    fn next_step(&self, template: &str, step_order: u32) -> Option<StepDefinition>;

    /// First step of the named template.
    fn entry_step(&self, template: &str) -> Option<StepDefinition>;
}

/// Catalog built from configured pipeline templates.
#[derive(Debug, Clone, Default)]
pub struct StaticStepCatalog {
    templates: Vec<PipelineTemplate>,
}

impl StaticStepCatalog {
    pub fn new(templates: Vec<PipelineTemplate>) -> Self {
        Self { templates }
    }

    pub fn templates(&self) -> &[PipelineTemplate] {
        &self.templates
    }

    fn template(&self, name: &str) -> Option<&PipelineTemplate> {
        self.templates.iter().find(|t| t.name == name)
    }
}

impl StepCatalog for StaticStepCatalog {
    fn next_step(&self, template: &str, step_order: u32) -> Option<StepDefinition> {
        self.template(template)
            .and_then(|t| t.steps.get(step_order as usize + 1).cloned())
    }

    fn entry_step(&self, template: &str) -> Option<StepDefinition> {
        self.template(template)
            .and_then(|t| t.steps.first().cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn step(method: &str) -> StepDefinition {
        StepDefinition {
            method: method.to_string(),
            config: serde_json::Value::Null,
        }
    }

    fn catalog() -> StaticStepCatalog {
        StaticStepCatalog::new(vec![
            PipelineTemplate {
                name: "protect".to_string(),
                steps: vec![
                    StepDefinition {
                        method: "cloak".to_string(),
                        config: json!({"intensity": "high"}),
                    },
                    step("watermark"),
                    step("verify"),
                ],
            },
            PipelineTemplate {
                name: "quick".to_string(),
                steps: vec![step("cloak"), step("verify")],
            },
        ])
    }

    #[test]
    fn test_next_step_follows_template() {
        let c = catalog();
        assert_eq!(c.next_step("protect", 0).unwrap().method, "watermark");
        assert_eq!(c.next_step("protect", 1).unwrap().method, "verify");
    }

    #[test]
    fn test_last_step_has_no_successor() {
        let c = catalog();
        assert!(c.next_step("protect", 2).is_none());
        assert!(c.next_step("quick", 1).is_none());
    }

    #[test]
    fn test_templates_sharing_a_first_step_stay_apart() {
        let c = catalog();
        // Both templates start with "cloak"; each keeps its own successor.
        assert_eq!(c.next_step("quick", 0).unwrap().method, "verify");
        assert_eq!(c.next_step("protect", 0).unwrap().method, "watermark");
    }

    #[test]
    fn test_unknown_template_or_position() {
        let c = catalog();
        assert!(c.next_step("missing", 0).is_none());
        assert!(c.next_step("protect", 5).is_none());
    }

    #[test]
    fn test_entry_step() {
        let c = catalog();
        let entry = c.entry_step("protect").unwrap();
        assert_eq!(entry.method, "cloak");
        assert_eq!(entry.config, json!({"intensity": "high"}));
        assert!(c.entry_step("missing").is_none());
    }

    #[test]
    fn test_deserialize_template_without_config() {
        let toml = r#"
            name = "protect"
            steps = [{ method = "cloak", config = { intensity = "low" } }, { method = "verify" }]
        "#;
        let template: PipelineTemplate = toml::from_str(toml).unwrap();
        assert_eq!(template.steps.len(), 2);
        assert_eq!(template.steps[0].config, json!({"intensity": "low"}));
        assert_eq!(template.steps[1].config, serde_json::Value::Null);
    }
}
