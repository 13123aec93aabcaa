use std::collections::HashMap;

use crate::stats::null_as_default;

/// One entry of `GET /containers/json`.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct ListedContainer {
    #[serde(deserialize_with = "null_as_default")]
    pub names: Vec<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub labels: HashMap<String, String>,
}

/// Response of `GET /containers/{name}/json`, reduced to what the poller needs.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct InspectedContainer {
    pub name: String,
    #[serde(deserialize_with = "null_as_default")]
    pub config: InspectedConfig,
}

#[derive(Debug, Default, serde::Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct InspectedConfig {
    #[serde(deserialize_with = "null_as_default")]
    pub labels: HashMap<String, String>,
}

/// One record of `GET /events`.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct Event {
    #[serde(rename = "Type")]
    pub kind: String,
    #[serde(rename = "Action")]
    pub action: String,
    /// Pre-1.22 API field carrying the action.
    pub status: String,
    /// Pre-1.22 API field carrying the container id.
    pub id: String,
    #[serde(rename = "Actor")]
    pub actor: Actor,
}

#[derive(Debug, Default, serde::Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct Actor {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(deserialize_with = "null_as_default")]
    pub attributes: HashMap<String, String>,
}

impl Event {
    /// The action, falling back to the legacy `status` field.
    pub fn action(&self) -> &str {
        if self.action.is_empty() {
            &self.status
        } else {
            &self.action
        }
    }

    /// Whether the event concerns a container. Legacy events carry no type.
    pub fn is_container(&self) -> bool {
        self.kind == "container" || (self.kind.is_empty() && !self.id.is_empty())
    }

    /// The container the event is about: its name if reported, otherwise its id.
    pub fn subject(&self) -> Option<&str> {
        self.actor
            .attributes
            .get("name")
            .map(String::as_str)
            .filter(|name| !name.is_empty())
            .or_else(|| Some(self.actor.id.as_str()).filter(|id| !id.is_empty()))
            .or_else(|| Some(self.id.as_str()).filter(|id| !id.is_empty()))
    }
}
