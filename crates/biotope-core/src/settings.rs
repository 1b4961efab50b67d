//! Read-only tree view of the configuration for inspection tools.

use crate::{ConfigurationCatalog, Result};
use serde::Serialize;
use serde_json::Value;

/// One node of the settings tree: either a leaf holding a rendered value or
/// a branch with children.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SettingsNode {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<SettingsNode>,
}

impl SettingsNode {
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    pub fn child(&self, name: &str) -> Option<&SettingsNode> {
        self.children.iter().find(|c| c.name == name)
    }

    /// Walk a dotted path such as `species.plant.max_lifespan`
    pub fn find(&self, path: &str) -> Option<&SettingsNode> {
        path.split('.')
            .try_fold(self, |node, segment| node.child(segment))
    }

    /// Build a tree from an arbitrary JSON value
    pub fn from_value(name: impl Into<String>, value: &Value) -> Self {
        let name = name.into();
        match value {
            Value::Object(map) => SettingsNode {
                name,
                value: None,
                children: map
                    .iter()
                    .map(|(key, child)| SettingsNode::from_value(key.clone(), child))
                    .collect(),
            },
            Value::Array(items) => SettingsNode {
                name,
                value: None,
                children: items
                    .iter()
                    .enumerate()
                    .map(|(index, item)| {
                        // Named entries (species) are addressed by name
                        let label = item
                            .get("name")
                            .and_then(Value::as_str)
                            .map(str::to_string)
                            .unwrap_or_else(|| index.to_string());
                        SettingsNode::from_value(label, item)
                    })
                    .collect(),
            },
            Value::String(s) => SettingsNode::leaf(name, s.clone()),
            other => SettingsNode::leaf(name, other.to_string()),
        }
    }

    fn leaf(name: String, value: String) -> Self {
        SettingsNode {
            name,
            value: Some(value),
            children: Vec::new(),
        }
    }
}

impl ConfigurationCatalog {
    /// Nested key/value view of every parameter
    pub fn settings_tree(&self) -> Result<SettingsNode> {
        let value = serde_json::to_value(self)?;
        Ok(SettingsNode::from_value("settings", &value))
    }
}
