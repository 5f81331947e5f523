//! `permute`: every option, in a uniformly shuffled order.

use super::{Randomizer, RandomizerRequest, Selection};
use crate::error::ConfigurationError;
use crate::parser::expand::{common_properties, Expander};
use crate::parser::substitute::ResolutionPass;
use rand::seq::SliceRandom;
use serde_json::json;

#[derive(Debug, Clone, Copy, Default)]
pub struct Permute;

impl Randomizer for Permute {
    fn name(&self) -> &str {
        "permute"
    }

    fn select(
        &self,
        request: &RandomizerRequest<'_>,
        expander: &Expander<'_>,
        pass: &mut ResolutionPass<'_>,
    ) -> Result<Selection, ConfigurationError> {
        let options = request.options()?;
        let common = common_properties(request.frame_key, request.node)?;

        let mut order: Vec<usize> = (0..options.len()).collect();
        order.shuffle(pass.rng());

        let expansion = expander.expand_members(
            request.frame_key,
            order.iter().map(|&index| (index, &options[index])),
            common,
            request.context,
            pass,
        )?;

        Ok(Selection {
            expansion,
            condition: json!({ "order": order }),
        })
    }
}
