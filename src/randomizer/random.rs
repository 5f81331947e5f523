//! `random`: one option chosen uniformly.

use super::{Randomizer, RandomizerRequest, Selection};
use crate::error::ConfigurationError;
use crate::parser::expand::{common_properties, Expander};
use crate::parser::substitute::ResolutionPass;
use rand::Rng;
use serde_json::json;

#[derive(Debug, Clone, Copy, Default)]
pub struct RandomChoice;

impl Randomizer for RandomChoice {
    fn name(&self) -> &str {
        "random"
    }

    fn select(
        &self,
        request: &RandomizerRequest<'_>,
        expander: &Expander<'_>,
        pass: &mut ResolutionPass<'_>,
    ) -> Result<Selection, ConfigurationError> {
        let options = request.options()?;
        let common = common_properties(request.frame_key, request.node)?;
        let chosen = pass.rng().gen_range(0..options.len());

        let expansion = expander.expand_members(
            request.frame_key,
            [(chosen, &options[chosen])],
            common,
            request.context,
            pass,
        )?;

        Ok(Selection {
            expansion,
            condition: json!({ "conditionNum": chosen }),
        })
    }
}
