//! `increment-conditions`: session-to-session counterbalancing.
//!
//! The most recent past session that completed this frame supplies the previous
//! condition; each field is advanced by one modulo its range. Without usable
//! history every field is drawn uniformly. The condition fields are exposed as
//! parameters to the `frameList` sub-tree.

use super::{Randomizer, RandomizerRequest, Selection};
use crate::error::ConfigurationError;
use crate::parser::expand::{common_properties, list_property, merge_over, Expander, KEY_FRAME_LIST};
use crate::parser::substitute::ResolutionPass;
use rand::rngs::StdRng;
use rand::Rng;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::debug;

pub const KEY_CONDITION_MODULI: &str = "conditionModuli";
pub const KEY_COMPLETION_MARKER: &str = "completionMarker";

/// Valid range of one condition field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Modulus {
    /// A single integer in `0..n`.
    Scalar(u64),
    /// An array whose element `i` lies in `0..n[i]`.
    PerElement(Vec<u64>),
}

impl Modulus {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Array(items) => items
                .iter()
                .map(|item| item.as_u64().filter(|n| *n > 0))
                .collect::<Option<Vec<_>>>()
                .map(Modulus::PerElement),
            other => other.as_u64().filter(|n| *n > 0).map(Modulus::Scalar),
        }
    }

    fn increment(&self, previous: &Value) -> Option<Value> {
        match self {
            Modulus::Scalar(n) => previous.as_u64().map(|v| Value::from((v + 1) % n)),
            Modulus::PerElement(ns) => {
                let items = previous.as_array()?;
                if items.len() != ns.len() {
                    return None;
                }
                items
                    .iter()
                    .zip(ns)
                    .map(|(item, n)| item.as_u64().map(|v| Value::from((v + 1) % n)))
                    .collect::<Option<Vec<_>>>()
                    .map(Value::Array)
            }
        }
    }

    fn sample(&self, rng: &mut StdRng) -> Value {
        match self {
            Modulus::Scalar(n) => Value::from(rng.gen_range(0..*n)),
            Modulus::PerElement(ns) => {
                Value::Array(ns.iter().map(|n| Value::from(rng.gen_range(0..*n))).collect())
            }
        }
    }
}

/// Field ranges used when a node does not supply `conditionModuli`.
pub fn default_moduli() -> BTreeMap<String, Modulus> {
    BTreeMap::from([
        ("startType".to_string(), Modulus::Scalar(24)),
        ("showStay".to_string(), Modulus::Scalar(20)),
        ("whichObjects".to_string(), Modulus::PerElement(vec![720; 4])),
    ])
}

/// Advance every field of `previous` by one, wrapping at its modulus. `None`
/// when `previous` does not match the table's shape.
pub fn next_condition(
    previous: &Value,
    moduli: &BTreeMap<String, Modulus>,
) -> Option<Map<String, Value>> {
    moduli
        .iter()
        .map(|(field, modulus)| {
            let next = modulus.increment(previous.get(field)?)?;
            Some((field.clone(), next))
        })
        .collect()
}

#[derive(Debug, Clone, Copy, Default)]
pub struct IncrementConditions;

impl IncrementConditions {
    fn moduli(
        &self,
        request: &RandomizerRequest<'_>,
    ) -> Result<BTreeMap<String, Modulus>, ConfigurationError> {
        let Some(raw) = request.node.get(KEY_CONDITION_MODULI) else {
            return Ok(default_moduli());
        };
        let table = raw
            .as_object()
            .filter(|table| !table.is_empty())
            .ok_or_else(|| request.malformed("conditionModuli must be a non-empty object"))?;
        table
            .iter()
            .map(|(field, value)| {
                Modulus::from_value(value)
                    .map(|modulus| (field.clone(), modulus))
                    .ok_or_else(|| {
                        request.malformed(format!(
                            "conditionModuli.{} must be a positive integer or list of them",
                            field
                        ))
                    })
            })
            .collect()
    }

    /// Previous condition from the most recent session that completed this frame.
    ///
    /// Completion is read from frame IDs, which carry the top-level sequence key,
    /// so a nested sampler without `completionMarker` looks for that key.
    fn history<'a>(&self, request: &RandomizerRequest<'a>) -> Option<&'a Value> {
        let marker = request
            .node
            .get(KEY_COMPLETION_MARKER)
            .and_then(Value::as_str)
            .unwrap_or(request.sequence_key);
        request
            .past_sessions
            .iter()
            .find(|session| session.has_completed(marker))
            .and_then(|session| session.condition_for(request.condition_key, request.frame_key))
    }
}

impl Randomizer for IncrementConditions {
    fn name(&self) -> &str {
        "increment-conditions"
    }

    fn select(
        &self,
        request: &RandomizerRequest<'_>,
        expander: &Expander<'_>,
        pass: &mut ResolutionPass<'_>,
    ) -> Result<Selection, ConfigurationError> {
        let moduli = self.moduli(request)?;

        let incremented = self
            .history(request)
            .and_then(|previous| next_condition(previous, &moduli));
        let condition = match incremented {
            Some(condition) => {
                debug!(frame = %request.frame_key, "Advancing condition from previous session");
                condition
            }
            None => moduli
                .iter()
                .map(|(field, modulus)| (field.clone(), modulus.sample(pass.rng())))
                .collect(),
        };

        let members = list_property(request.frame_key, request.node, KEY_FRAME_LIST)?
            .filter(|members| !members.is_empty())
            .ok_or_else(|| ConfigurationError::EmptyOptions {
                frame: request.frame_key.to_string(),
                reason: "frameList is missing or empty".to_string(),
            })?;
        let common = common_properties(request.frame_key, request.node)?;
        let context = merge_over(request.context, &condition);
        let expansion = expander.expand_members(
            request.frame_key,
            members.iter().enumerate(),
            common,
            &context,
            pass,
        )?;

        Ok(Selection {
            expansion,
            condition: Value::Object(condition),
        })
    }
}
