//! Home Assistant tools: entity discovery, device control, scene triggers.
//!
//! All three talk to the Home Assistant REST API with a long-lived access
//! token. When the integration is unconfigured they return an error string
//! so the model can tell the user, instead of failing at startup.

use crate::config::HomeAssistantConfig;
use crate::error::{AssistantError, Result};
use crate::tools::{Tool, optional_str, require_str};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

/// Per-request timeout against the Home Assistant API.
const HA_TIMEOUT: Duration = Duration::from_secs(10);

/// Cap on listed entities to keep results readable for the model.
const MAX_LISTED_ENTITIES: usize = 50;

const UNCONFIGURED: &str = "Error: Home Assistant is not configured. \
    Set home_assistant.url and home_assistant.token (or the \
    MALONE_HOME_ASSISTANT_URL / MALONE_HOME_ASSISTANT_TOKEN environment variables).";

#[derive(Debug, Deserialize)]
struct EntityState {
    entity_id: String,
    state: String,
    #[serde(default)]
    attributes: serde_json::Value,
}

/// Shared request plumbing for the HA tools.
struct HaApi {
    config: HomeAssistantConfig,
    http: reqwest::Client,
}

impl HaApi {
    fn configured(&self) -> bool {
        !self.config.url.trim().is_empty() && !self.config.token.trim().is_empty()
    }

    async fn get_states(&self) -> Result<Vec<EntityState>> {
        let url = format!("{}/api/states", self.config.url.trim_end_matches('/'));
        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.config.token)
            .timeout(HA_TIMEOUT)
            .send()
            .await
            .map_err(|e| AssistantError::Tool(format!("Home Assistant request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AssistantError::Tool(format!(
                "Home Assistant returned {status}"
            )));
        }
        response
            .json()
            .await
            .map_err(|e| AssistantError::Tool(format!("invalid states response: {e}")))
    }

    async fn call_service(&self, service: &str, data: serde_json::Value) -> Result<()> {
        let url = format!(
            "{}/api/services/{service}",
            self.config.url.trim_end_matches('/')
        );
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.config.token)
            .timeout(HA_TIMEOUT)
            .json(&data)
            .send()
            .await
            .map_err(|e| AssistantError::Tool(format!("Home Assistant request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AssistantError::Tool(format!(
                "Home Assistant returned {status} for {service}"
            )));
        }
        Ok(())
    }
}

/// Lists available Home Assistant entities.
pub struct HaListEntitiesTool {
    api: HaApi,
}

impl HaListEntitiesTool {
    /// Create the tool with its config and a shared HTTP client.
    pub fn new(config: HomeAssistantConfig, http: reqwest::Client) -> Self {
        Self {
            api: HaApi { config, http },
        }
    }
}

#[async_trait]
impl Tool for HaListEntitiesTool {
    fn name(&self) -> &str {
        "ha_list_entities"
    }

    fn description(&self) -> &str {
        "List available Home Assistant entities (devices). Optionally filter by \
         domain (light, switch, climate, sensor, etc). Returns entity_id, \
         friendly name, and current state."
    }

    fn parameters(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "domain": {
                    "type": "string",
                    "description": "Filter by entity domain: light, switch, climate, sensor, \
                        binary_sensor, media_player, automation, scene, cover, fan, lock. \
                        Leave empty to list all."
                }
            },
            "required": []
        })
    }

    async fn execute(&self, args: serde_json::Value) -> Result<String> {
        if !self.api.configured() {
            return Ok(UNCONFIGURED.to_owned());
        }
        let domain = optional_str(&args, "domain");

        let mut states = self.api.get_states().await?;
        if !domain.is_empty() {
            let prefix = format!("{domain}.");
            states.retain(|s| s.entity_id.starts_with(&prefix));
        }

        let lines: Vec<String> = states
            .iter()
            .take(MAX_LISTED_ENTITIES)
            .map(|entity| {
                let name = entity
                    .attributes
                    .get("friendly_name")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default();
                format!("  {}: {} ({name})", entity.entity_id, entity.state)
            })
            .collect();

        if lines.is_empty() {
            return Ok(if domain.is_empty() {
                "No entities found.".to_owned()
            } else {
                format!("No entities found for domain {domain}.")
            });
        }
        Ok(format!(
            "Found {} entities:\n{}",
            lines.len(),
            lines.join("\n")
        ))
    }
}

/// Controls a Home Assistant device.
pub struct HaControlDeviceTool {
    api: HaApi,
}

impl HaControlDeviceTool {
    /// Create the tool with its config and a shared HTTP client.
    pub fn new(config: HomeAssistantConfig, http: reqwest::Client) -> Self {
        Self {
            api: HaApi { config, http },
        }
    }
}

#[async_trait]
impl Tool for HaControlDeviceTool {
    fn name(&self) -> &str {
        "ha_control_device"
    }

    fn description(&self) -> &str {
        "Control a Home Assistant device. Supports turning on/off lights, \
         switches, fans, covers, locks, and setting climate temperature. \
         Use ha_list_entities first to discover available entity IDs."
    }

    fn parameters(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "entity_id": {
                    "type": "string",
                    "description": "The entity ID to control (e.g. 'light.living_room')"
                },
                "action": {
                    "type": "string",
                    "description": "Action to perform: 'turn_on', 'turn_off', 'toggle', \
                        'set_temperature', 'set_brightness'"
                },
                "value": {
                    "type": "string",
                    "description": "Optional value for the action: temperature, \
                        brightness 0-255, or color name."
                }
            },
            "required": ["entity_id", "action"]
        })
    }

    async fn execute(&self, args: serde_json::Value) -> Result<String> {
        if !self.api.configured() {
            return Ok(UNCONFIGURED.to_owned());
        }
        let entity_id = require_str(&args, "entity_id")?;
        let action = require_str(&args, "action")?;
        let value = optional_str(&args, "value");

        let domain = entity_id.split('.').next().unwrap_or_default();
        let mut data = serde_json::json!({"entity_id": entity_id});

        let service = match action {
            "set_temperature" if !value.is_empty() => {
                let temperature: f64 = value.parse().map_err(|_| {
                    AssistantError::Tool(format!("temperature '{value}' is not a number"))
                })?;
                data["temperature"] = serde_json::json!(temperature);
                "climate/set_temperature".to_owned()
            }
            "set_brightness" if !value.is_empty() => {
                let brightness: u8 = value.parse().map_err(|_| {
                    AssistantError::Tool(format!("brightness '{value}' is not in 0-255"))
                })?;
                data["brightness"] = serde_json::json!(brightness);
                format!("{domain}/turn_on")
            }
            "turn_on" | "turn_off" | "toggle" => format!("{domain}/{action}"),
            other => {
                return Ok(format!(
                    "Error: unknown action '{other}'. Use: turn_on, turn_off, toggle, \
                     set_temperature, set_brightness."
                ));
            }
        };

        self.api.call_service(&service, data).await?;
        Ok(if value.is_empty() {
            format!("OK: {action} on {entity_id}")
        } else {
            format!("OK: {action} on {entity_id} (value: {value})")
        })
    }
}

/// Triggers a Home Assistant scene or automation.
pub struct HaTriggerSceneTool {
    api: HaApi,
}

impl HaTriggerSceneTool {
    /// Create the tool with its config and a shared HTTP client.
    pub fn new(config: HomeAssistantConfig, http: reqwest::Client) -> Self {
        Self {
            api: HaApi { config, http },
        }
    }
}

#[async_trait]
impl Tool for HaTriggerSceneTool {
    fn name(&self) -> &str {
        "ha_trigger_scene"
    }

    fn description(&self) -> &str {
        "Trigger a Home Assistant scene or automation. Use ha_list_entities \
         with domain 'scene' or 'automation' to find available ones."
    }

    fn parameters(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "entity_id": {
                    "type": "string",
                    "description": "The scene or automation entity_id (e.g. 'scene.movie_night')"
                }
            },
            "required": ["entity_id"]
        })
    }

    async fn execute(&self, args: serde_json::Value) -> Result<String> {
        if !self.api.configured() {
            return Ok(UNCONFIGURED.to_owned());
        }
        let entity_id = require_str(&args, "entity_id")?;

        let service = match entity_id.split('.').next() {
            Some("scene") => "scene/turn_on",
            Some("automation") => "automation/trigger",
            _ => {
                return Ok(format!(
                    "Error: entity '{entity_id}' is not a scene or automation."
                ));
            }
        };

        self.api
            .call_service(service, serde_json::json!({"entity_id": entity_id}))
            .await?;
        Ok(format!("OK: triggered {entity_id}"))
    }
}
