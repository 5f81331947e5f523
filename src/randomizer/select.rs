//! `select`: fixed option(s) named by `whichFrames`, typically driven by a
//! parameter so the choice can be made upstream.

use super::{Randomizer, RandomizerRequest, Selection};
use crate::error::ConfigurationError;
use crate::parser::expand::{common_properties, Expander};
use crate::parser::substitute::ResolutionPass;
use serde_json::{json, Value};

pub const KEY_WHICH_FRAMES: &str = "whichFrames";

#[derive(Debug, Clone, Copy, Default)]
pub struct Select;

fn as_index(
    request: &RandomizerRequest<'_>,
    value: &Value,
    len: usize,
) -> Result<usize, ConfigurationError> {
    let index = value.as_u64().ok_or_else(|| {
        request.malformed("whichFrames must be a non-negative integer or a list of them")
    })? as usize;
    if index >= len {
        return Err(ConfigurationError::PlaceholderIndexOutOfRange {
            placeholder: format!("{}.{}", request.frame_key, KEY_WHICH_FRAMES),
            index,
            len,
        });
    }
    Ok(index)
}

impl Randomizer for Select {
    fn name(&self) -> &str {
        "select"
    }

    fn select(
        &self,
        request: &RandomizerRequest<'_>,
        expander: &Expander<'_>,
        pass: &mut ResolutionPass<'_>,
    ) -> Result<Selection, ConfigurationError> {
        let options = request.options()?;
        let common = common_properties(request.frame_key, request.node)?;
        let raw = request
            .node
            .get(KEY_WHICH_FRAMES)
            .ok_or_else(|| request.malformed("select requires whichFrames"))?;
        let which = pass.substitute(raw, request.context)?;

        let indices = match &which {
            Value::Array(items) => items
                .iter()
                .map(|item| as_index(request, item, options.len()))
                .collect::<Result<Vec<_>, _>>()?,
            single => vec![as_index(request, single, options.len())?],
        };

        let expansion = expander.expand_members(
            request.frame_key,
            indices.iter().map(|&index| (index, &options[index])),
            common,
            request.context,
            pass,
        )?;

        Ok(Selection {
            expansion,
            condition: json!({ KEY_WHICH_FRAMES: which }),
        })
    }
}
