//! `random-parameter-set`: weighted choice of one parameter set, which is then
//! merged into the context used to expand the shared `frameList`.
//!
//! `parameterSetWeights` is either a flat list (one weight per set) or a list of
//! age brackets `{minAge, maxAge, weights}` in days, inclusive on both ends.
//! With `conditionForAdditionalSessions: "persist"` a participant who already has
//! a recorded choice keeps it.

use super::{Randomizer, RandomizerRequest, Selection};
use crate::error::ConfigurationError;
use crate::parser::expand::{common_properties, list_property, merge_over, Expander, KEY_FRAME_LIST};
use crate::parser::substitute::ResolutionPass;
use crate::types::Participant;
use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;
use serde_json::{json, Map, Value};
use tracing::debug;

pub const KEY_PARAMETER_SETS: &str = "parameterSets";
pub const KEY_PARAMETER_SET_WEIGHTS: &str = "parameterSetWeights";
pub const KEY_ADDITIONAL_SESSIONS: &str = "conditionForAdditionalSessions";

#[derive(Debug, Clone, Copy, Default)]
pub struct RandomParameterSet;

/// Pick the weight list that applies to this participant.
fn weights_for(
    request: &RandomizerRequest<'_>,
    participant: Participant,
    set_count: usize,
) -> Result<Option<Vec<f64>>, ConfigurationError> {
    let Some(raw) = request.node.get(KEY_PARAMETER_SET_WEIGHTS) else {
        return Ok(None);
    };
    let entries = raw
        .as_array()
        .ok_or_else(|| request.malformed("parameterSetWeights must be an array"))?;

    let weights = if entries.iter().all(Value::is_object) && !entries.is_empty() {
        let age = participant.age_in_days.ok_or_else(|| ConfigurationError::EmptyOptions {
            frame: request.frame_key.to_string(),
            reason: "age-bracketed weights need the participant's age".to_string(),
        })?;
        let bracket = entries
            .iter()
            .find(|bracket| {
                let min = bracket.get("minAge").and_then(Value::as_u64).unwrap_or(0);
                let max = bracket.get("maxAge").and_then(Value::as_u64).unwrap_or(u64::MAX);
                (min..=max).contains(&u64::from(age))
            })
            .ok_or_else(|| ConfigurationError::EmptyOptions {
                frame: request.frame_key.to_string(),
                reason: format!("no parameterSetWeights bracket covers age {} days", age),
            })?;
        bracket
            .get("weights")
            .and_then(Value::as_array)
            .ok_or_else(|| request.malformed("age bracket is missing its weights array"))?
            .clone()
    } else {
        entries.clone()
    };

    let weights = weights
        .iter()
        .map(|w| {
            w.as_f64()
                .filter(|w| *w >= 0.0)
                .ok_or_else(|| request.malformed("weights must be non-negative numbers"))
        })
        .collect::<Result<Vec<f64>, _>>()?;

    if weights.len() != set_count {
        return Err(request.malformed(format!(
            "expected {} weights, found {}",
            set_count,
            weights.len()
        )));
    }
    Ok(Some(weights))
}

impl Randomizer for RandomParameterSet {
    fn name(&self) -> &str {
        "random-parameter-set"
    }

    fn select(
        &self,
        request: &RandomizerRequest<'_>,
        expander: &Expander<'_>,
        pass: &mut ResolutionPass<'_>,
    ) -> Result<Selection, ConfigurationError> {
        let sets = request
            .node
            .get(KEY_PARAMETER_SETS)
            .and_then(Value::as_array)
            .filter(|sets| !sets.is_empty())
            .ok_or_else(|| ConfigurationError::EmptyOptions {
                frame: request.frame_key.to_string(),
                reason: "parameterSets is missing or empty".to_string(),
            })?;

        let persist = request
            .node
            .get(KEY_ADDITIONAL_SESSIONS)
            .and_then(Value::as_str)
            == Some("persist");
        let persisted = persist
            .then(|| request.previous_condition())
            .flatten()
            .and_then(|condition| condition.get("conditionNum"))
            .and_then(Value::as_u64)
            .map(|n| n as usize)
            .filter(|n| *n < sets.len());

        let chosen = match persisted {
            Some(chosen) => {
                debug!(frame = %request.frame_key, chosen, "Reusing persisted parameter set");
                chosen
            }
            None => match weights_for(request, expander.participant(), sets.len())? {
                Some(weights) => {
                    let distribution = WeightedIndex::new(&weights).map_err(|_| {
                        ConfigurationError::EmptyOptions {
                            frame: request.frame_key.to_string(),
                            reason: "all parameter set weights are zero".to_string(),
                        }
                    })?;
                    distribution.sample(pass.rng())
                }
                None => pass.rng().gen_range(0..sets.len()),
            },
        };

        let parameter_set = sets[chosen]
            .as_object()
            .ok_or_else(|| request.malformed("parameter sets must be objects"))?;
        let context: Map<String, Value> = merge_over(request.context, parameter_set);

        let members = list_property(request.frame_key, request.node, KEY_FRAME_LIST)?
            .filter(|members| !members.is_empty())
            .ok_or_else(|| ConfigurationError::EmptyOptions {
                frame: request.frame_key.to_string(),
                reason: "frameList is missing or empty".to_string(),
            })?;
        let common = common_properties(request.frame_key, request.node)?;
        let expansion = expander.expand_members(
            request.frame_key,
            members.iter().enumerate(),
            common,
            &context,
            pass,
        )?;

        Ok(Selection {
            expansion,
            condition: json!({
                "conditionNum": chosen,
                "parameterSet": sets[chosen],
            }),
        })
    }
}
