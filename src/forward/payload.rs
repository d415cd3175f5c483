//! Chat payload shaping before it goes upstream

use serde_json::{Map, Value};

use crate::error::RelayError;

/// Model prefixes of the reasoning families that need a different request shape
const REASONING_PREFIXES: &[&str] = &["o1", "o3", "o4"];

/// Legacy reasoning models that reject the `developer` role
const LEGACY_REASONING_PREFIXES: &[&str] = &["o1-mini", "o1-preview"];

const LOGIT_BIAS_LIMIT: i64 = 100;

/// Opaque chat-completion request body
#[derive(Debug, Clone, PartialEq)]
pub struct ChatPayload(Map<String, Value>);

impl ChatPayload {
    pub fn from_value(value: Value) -> Result<Self, RelayError> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(RelayError::InvalidPayload(format!(
                "expected a JSON object, got {}",
                json_type(&other)
            ))),
        }
    }

    pub fn model(&self) -> Option<&str> {
        self.0.get("model").and_then(Value::as_str)
    }

    pub fn is_streaming(&self) -> bool {
        self.0.get("stream").and_then(Value::as_bool).unwrap_or(false)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }

    /// Strip the routing prefix and apply every backend-specific adjustment
    pub fn prepare(mut self) -> Result<Self, RelayError> {
        let model = self.strip_routing_prefix()?;
        if is_reasoning_model(&model) {
            tracing::debug!(model = %model, "Reshaping payload for reasoning model");
            self.reshape_for_reasoning(&model);
        }
        self.normalize_logit_bias()?;
        Ok(self)
    }

    /// `<prefix>.<model>` becomes `<model>`; returns the stripped model
    fn strip_routing_prefix(&mut self) -> Result<String, RelayError> {
        let model = self
            .model()
            .ok_or_else(|| RelayError::InvalidPayload("model must be a string".to_string()))?;
        let (_, stripped) = model.split_once('.').ok_or_else(|| {
            RelayError::InvalidPayload(format!("model '{}' has no routing prefix", model))
        })?;
        let stripped = stripped.to_string();
        self.0.insert("model".to_string(), Value::String(stripped.clone()));
        Ok(stripped)
    }

    fn reshape_for_reasoning(&mut self, model: &str) {
        if let Some(max_tokens) = self.0.remove("max_tokens") {
            self.0.insert("max_completion_tokens".to_string(), max_tokens);
        }

        let model = model.to_lowercase();
        let replacement = if LEGACY_REASONING_PREFIXES.iter().any(|p| model.starts_with(p)) {
            "user"
        } else {
            "developer"
        };

        if let Some(first) = self
            .0
            .get_mut("messages")
            .and_then(Value::as_array_mut)
            .and_then(|messages| messages.first_mut())
            .and_then(Value::as_object_mut)
        {
            if first.get("role").and_then(Value::as_str) == Some("system") {
                first.insert("role".to_string(), Value::String(replacement.to_string()));
            }
        }
    }

    fn normalize_logit_bias(&mut self) -> Result<(), RelayError> {
        let Some(bias) = self.0.remove("logit_bias") else {
            return Ok(());
        };
        if let Some(normalized) = normalize_logit_bias(bias)? {
            self.0.insert("logit_bias".to_string(), Value::Object(normalized));
        }
        Ok(())
    }
}

pub fn is_reasoning_model(model: &str) -> bool {
    let model = model.to_lowercase();
    REASONING_PREFIXES.iter().any(|p| model.starts_with(p))
}

/// Turn `"token:bias,token:bias"` or an object into `{token: bias}` with clamped biases
///
/// An empty string means "no bias" and yields `None`.
pub fn normalize_logit_bias(value: Value) -> Result<Option<Map<String, Value>>, RelayError> {
    match value {
        Value::Null => Ok(None),
        Value::String(s) if s.trim().is_empty() => Ok(None),
        Value::String(s) => {
            let mut out = Map::new();
            for pair in s.split(',') {
                let (token, bias) = pair.split_once(':').ok_or_else(|| {
                    RelayError::InvalidPayload(format!("logit_bias entry '{}' is not token:bias", pair))
                })?;
                let bias: i64 = bias.trim().parse().map_err(|_| {
                    RelayError::InvalidPayload(format!("logit_bias value '{}' is not an integer", bias.trim()))
                })?;
                out.insert(token.trim().to_string(), clamp_bias(bias));
            }
            Ok(Some(out))
        }
        Value::Object(map) => {
            let mut out = Map::new();
            for (token, bias) in map {
                let bias = bias.as_f64().ok_or_else(|| {
                    RelayError::InvalidPayload(format!("logit_bias value for '{}' is not a number", token))
                })?;
                out.insert(token, clamp_bias(bias.round() as i64));
            }
            Ok(Some(out))
        }
        other => Err(RelayError::InvalidPayload(format!(
            "logit_bias must be a string or an object, got {}",
            json_type(&other)
        ))),
    }
}

fn clamp_bias(bias: i64) -> Value {
    Value::from(bias.clamp(-LOGIT_BIAS_LIMIT, LOGIT_BIAS_LIMIT))
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
