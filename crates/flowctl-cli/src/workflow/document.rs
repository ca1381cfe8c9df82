//! Resource documents exchanged with the management API.

use serde_json::{Map, Value};

use crate::client::{CliError, CliResult};

const OAUTH_SETTINGS_POINTER: &str = "/properties/connectionParameters/token/oauthSettings";

/// Flow run state accepted by the management API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FlowState {
    Started,
    Stopped,
}

impl FlowState {
    pub(crate) const fn as_str(self) -> &'static str {
        match self {
            Self::Started => "Started",
            Self::Stopped => "Stopped",
        }
    }
}

/// Property edits applied to a copy of the fetched document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct PropertyOverrides {
    pub(crate) display_name: Option<String>,
    pub(crate) description: Option<String>,
    pub(crate) state: Option<FlowState>,
    /// Connection-only: automatic OAuth token refresh.
    pub(crate) auto_refresh: Option<bool>,
}

impl PropertyOverrides {
    pub(crate) const fn is_empty(&self) -> bool {
        self.display_name.is_none()
            && self.description.is_none()
            && self.state.is_none()
            && self.auto_refresh.is_none()
    }
}

/// JSON body of a flow, connector or connection.
///
/// Object key order is preserved so that documents round-trip unchanged
/// through edit and backup.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ResourceDocument(Value);

impl ResourceDocument {
    /// Wrap a document returned by the service.
    pub(crate) const fn fetched(value: Value) -> Self {
        Self(value)
    }

    /// Empty document used as the baseline when diffing a creation.
    pub(crate) fn empty() -> Self {
        Self(Value::Object(Map::new()))
    }

    /// Parse operator-supplied text into a document that may be submitted.
    pub(crate) fn parse_replacement(text: &str, origin: &str) -> CliResult<Self> {
        let value: Value = serde_json::from_str(text).map_err(|err| {
            CliError::parse(format!(
                "{origin}: {err} (line {}, column {})",
                err.line(),
                err.column()
            ))
        })?;
        Self::replacement(value, origin)
    }

    /// Validate a value as a submittable document: a JSON object carrying a
    /// `properties` object.
    pub(crate) fn replacement(value: Value, origin: &str) -> CliResult<Self> {
        let Some(object) = value.as_object() else {
            return Err(CliError::parse(format!(
                "{origin}: expected a JSON object at the top level"
            )));
        };
        match object.get("properties") {
            Some(Value::Object(_)) => Ok(Self(value)),
            Some(_) => Err(CliError::parse(format!(
                "{origin}: \"properties\" must be a JSON object"
            ))),
            None => Err(CliError::parse(format!(
                "{origin}: missing required \"properties\" object"
            ))),
        }
    }

    pub(crate) const fn as_value(&self) -> &Value {
        &self.0
    }

    pub(crate) fn into_value(self) -> Value {
        self.0
    }

    fn str_at(&self, pointer: &str) -> Option<&str> {
        self.0.pointer(pointer).and_then(Value::as_str)
    }

    /// Service identifier (`name`).
    pub(crate) fn name(&self) -> Option<&str> {
        self.str_at("/name")
    }

    pub(crate) fn display_name(&self) -> Option<&str> {
        self.str_at("/properties/displayName")
    }

    #[cfg(test)]
    pub(crate) fn state(&self) -> Option<&str> {
        self.str_at("/properties/state")
    }

    /// Whether a connector document describes a custom (tenant-owned) connector.
    pub(crate) fn is_custom_connector(&self) -> bool {
        self.0
            .pointer("/properties/isCustomApi")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    pub(crate) fn has_oauth_settings(&self) -> bool {
        self.0
            .pointer(OAUTH_SETTINGS_POINTER)
            .is_some_and(Value::is_object)
    }

    /// Copy with `overrides` applied; every other field is untouched.
    pub(crate) fn with_overrides(&self, overrides: &PropertyOverrides) -> Self {
        let mut value = self.0.clone();
        if let Value::Object(root) = &mut value {
            let properties = root
                .entry("properties")
                .or_insert_with(|| Value::Object(Map::new()));
            if let Value::Object(properties) = properties {
                if let Some(name) = &overrides.display_name {
                    properties.insert("displayName".into(), Value::String(name.clone()));
                }
                if let Some(description) = &overrides.description {
                    properties.insert("description".into(), Value::String(description.clone()));
                }
                if let Some(state) = overrides.state {
                    properties.insert("state".into(), Value::String(state.as_str().into()));
                }
                if let Some(enabled) = overrides.auto_refresh {
                    properties.insert("enableAutoRefresh".into(), Value::Bool(enabled));
                }
            }
        }
        Self(value)
    }

    /// Copy carrying an OAuth client secret, for submission only.
    pub(crate) fn with_oauth_secret(&self, secret: &str) -> Self {
        let mut value = self.0.clone();
        if let Some(Value::Object(settings)) = value.pointer_mut(OAUTH_SETTINGS_POINTER) {
            settings.insert("clientSecret".into(), Value::String(secret.to_string()));
        }
        Self(value)
    }

    /// JSON merge patch (RFC 7396) turning `original` into this document.
    /// Unchanged members are omitted, removed ones are sent as `null`, and
    /// arrays are replaced whole.
    pub(crate) fn merge_patch_from(&self, original: &Self) -> Value {
        merge_patch(&original.0, &self.0).unwrap_or_else(|| Value::Object(Map::new()))
    }

    pub(crate) fn to_pretty_string(&self) -> CliResult<String> {
        serde_json::to_string_pretty(&self.0)
            .map(|mut text| {
                text.push('\n');
                text
            })
            .map_err(|err| CliError::failure(anyhow::anyhow!("failed to format JSON: {err}")))
    }
}

/// Merge patch from `before` to `after`, or `None` when they are equal.
fn merge_patch(before: &Value, after: &Value) -> Option<Value> {
    if before == after {
        return None;
    }
    let (Value::Object(before), Value::Object(after)) = (before, after) else {
        return Some(after.clone());
    };

    let mut patch = Map::new();
    for (key, value) in after {
        match before.get(key) {
            Some(previous) => {
                if let Some(change) = merge_patch(previous, value) {
                    patch.insert(key.clone(), change);
                }
            }
            None => {
                patch.insert(key.clone(), value.clone());
            }
        }
    }
    for key in before.keys() {
        if !after.contains_key(key) {
            patch.insert(key.clone(), Value::Null);
        }
    }
    Some(Value::Object(patch))
}
