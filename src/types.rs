//! Shared data types for experiment structures and session history.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A researcher-authored frame node, kept as raw JSON.
pub type FrameSpec = Map<String, Value>;

/// Parameter name to value, accumulated down the frame tree.
pub type ParameterContext = Map<String, Value>;

/// Condition records keyed by frame key (inside the expander) or by
/// `<index>_<frameKey>` (in parser output).
pub type Conditions = Map<String, Value>;

/// The full authored experiment: frame definitions plus the top-level order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExperimentStructure {
    #[serde(default)]
    pub frames: Map<String, Value>,
    #[serde(default)]
    pub sequence: Vec<String>,
}

impl ExperimentStructure {
    pub fn from_json(value: Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }
}

/// A prior session's record, owned by the calling application.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PastSession {
    #[serde(default)]
    pub conditions: Conditions,
    #[serde(default, rename = "expData")]
    pub exp_data: Map<String, Value>,
}

impl PastSession {
    /// Whether any frame in this session's data carries `marker` as its frame key.
    ///
    /// Frame IDs look like `<index>-<frameKey>` or `<index>-<frameKey>-<subIndex>`;
    /// only those two shapes match, so `physics` does not match `0-physics-intro`.
    pub fn has_completed(&self, marker: &str) -> bool {
        self.exp_data.keys().any(|frame_id| {
            let Some((index, key)) = frame_id.split_once('-') else {
                return false;
            };
            if !is_index(index) {
                return false;
            }
            match key.strip_prefix(marker) {
                Some("") => true,
                Some(rest) => rest.strip_prefix('-').map(is_index).unwrap_or(false),
                None => false,
            }
        })
    }

    /// Condition recorded under `condition_key`, falling back to any key for the
    /// same frame at a different sequence position.
    pub fn condition_for(&self, condition_key: &str, frame_key: &str) -> Option<&Value> {
        if let Some(value) = self.conditions.get(condition_key) {
            return Some(value);
        }
        let suffix = format!("_{}", frame_key);
        self.conditions
            .iter()
            .find(|(key, _)| {
                key.strip_suffix(&suffix)
                    .map(is_index)
                    .unwrap_or(false)
            })
            .map(|(_, value)| value)
    }
}

fn is_index(text: &str) -> bool {
    !text.is_empty() && text.chars().all(|c| c.is_ascii_digit())
}

/// Participant attributes the samplers may consult.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    /// Age in days at the time of the session.
    pub age_in_days: Option<u32>,
}

/// One fully resolved frame, ready for rendering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedFrame {
    pub id: String,
    #[serde(flatten)]
    pub properties: Map<String, Value>,
}

impl ResolvedFrame {
    pub fn kind(&self) -> Option<&str> {
        self.properties.get("kind").and_then(Value::as_str)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }
}
