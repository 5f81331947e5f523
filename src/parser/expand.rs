//! Frame group expansion: turns one frame-tree node into a flat, ordered list of
//! resolved frame definitions plus the condition records chosen along the way.

use crate::error::ConfigurationError;
use crate::parser::substitute::ResolutionPass;
use crate::randomizer::{RandomizerRegistry, RandomizerRequest};
use crate::types::{Conditions, FrameSpec, ParameterContext, Participant, PastSession};
use serde_json::{Map, Value};
use tracing::debug;

pub const KEY_KIND: &str = "kind";
pub const KEY_ID: &str = "id";
pub const KEY_PARAMETERS: &str = "parameters";
pub const KEY_FRAME_LIST: &str = "frameList";
pub const KEY_FRAME_OPTIONS: &str = "frameOptions";
pub const KEY_COMMON_PROPERTIES: &str = "commonFrameProperties";
pub const KEY_SAMPLER: &str = "sampler";

/// Result of expanding one node.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Expansion {
    /// Resolved frames in traversal order, without assigned IDs.
    pub frames: Vec<FrameSpec>,
    /// Condition records keyed by the frame key of the randomizer that made them.
    pub conditions: Conditions,
}

impl Expansion {
    /// Append another expansion, keeping frame order. Later conditions win.
    pub fn extend(&mut self, other: Expansion) {
        self.frames.extend(other.frames);
        self.conditions.extend(other.conditions);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NodeKind<'a> {
    Leaf,
    Group,
    Randomizer(&'a str),
}

fn classify<'a>(key: &str, node: &'a FrameSpec) -> Result<NodeKind<'a>, ConfigurationError> {
    if let Some(sampler) = node.get(KEY_SAMPLER) {
        return sampler
            .as_str()
            .map(NodeKind::Randomizer)
            .ok_or_else(|| ConfigurationError::MalformedFrame {
                frame: key.to_string(),
                reason: "sampler must be a string".to_string(),
            });
    }
    if node.contains_key(KEY_FRAME_LIST) {
        return Ok(NodeKind::Group);
    }
    if node.contains_key(KEY_KIND) {
        return Ok(NodeKind::Leaf);
    }
    Err(ConfigurationError::MalformedFrame {
        frame: key.to_string(),
        reason: "expected one of kind, frameList or sampler".to_string(),
    })
}

/// Merge `overrides` over `base`; keys in `overrides` win.
pub fn merge_over(base: &Map<String, Value>, overrides: &Map<String, Value>) -> Map<String, Value> {
    let mut merged = base.clone();
    for (key, value) in overrides {
        merged.insert(key.clone(), value.clone());
    }
    merged
}

/// The node's own `parameters` merged over the inherited context.
pub fn scoped_context(
    key: &str,
    node: &FrameSpec,
    inherited: &ParameterContext,
) -> Result<ParameterContext, ConfigurationError> {
    match node.get(KEY_PARAMETERS) {
        None | Some(Value::Null) => Ok(inherited.clone()),
        Some(Value::Object(own)) => Ok(merge_over(inherited, own)),
        Some(_) => Err(ConfigurationError::MalformedFrame {
            frame: key.to_string(),
            reason: "parameters must be an object".to_string(),
        }),
    }
}

/// Read an array-valued property such as `frameList` or `frameOptions`.
pub fn list_property<'a>(
    key: &str,
    node: &'a FrameSpec,
    property: &str,
) -> Result<Option<&'a Vec<Value>>, ConfigurationError> {
    match node.get(property) {
        None => Ok(None),
        Some(Value::Array(items)) => Ok(Some(items)),
        Some(_) => Err(ConfigurationError::MalformedFrame {
            frame: key.to_string(),
            reason: format!("{} must be an array", property),
        }),
    }
}

/// Read the optional `commonFrameProperties` object.
pub fn common_properties<'a>(
    key: &str,
    node: &'a FrameSpec,
) -> Result<Option<&'a FrameSpec>, ConfigurationError> {
    match node.get(KEY_COMMON_PROPERTIES) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Object(common)) => Ok(Some(common)),
        Some(_) => Err(ConfigurationError::MalformedFrame {
            frame: key.to_string(),
            reason: "commonFrameProperties must be an object".to_string(),
        }),
    }
}

/// Key for a member of a group or randomizer: its own `id` if it has one,
/// otherwise `<parentKey>-<index>`.
pub fn member_key(parent_key: &str, index: usize, member: &FrameSpec) -> String {
    member
        .get(KEY_ID)
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| format!("{}-{}", parent_key, index))
}

/// Recursive expander shared by the parser and every randomizer strategy.
///
/// The expander holds only read-only inputs; all per-pass mutable state lives in
/// the `ResolutionPass` threaded through each call.
pub struct Expander<'a> {
    registry: &'a RandomizerRegistry,
    past_sessions: &'a [PastSession],
    participant: Participant,
}

impl<'a> Expander<'a> {
    pub fn new(
        registry: &'a RandomizerRegistry,
        past_sessions: &'a [PastSession],
        participant: Participant,
    ) -> Self {
        Self {
            registry,
            past_sessions,
            participant,
        }
    }

    pub fn participant(&self) -> Participant {
        self.participant
    }

    /// Expand a node into resolved frames and condition records.
    pub fn expand(
        &self,
        key: &str,
        node: &FrameSpec,
        context: &ParameterContext,
        pass: &mut ResolutionPass<'_>,
    ) -> Result<Expansion, ConfigurationError> {
        match classify(key, node)? {
            NodeKind::Leaf => self.expand_leaf(key, node, context, pass),
            NodeKind::Group => self.expand_group(key, node, context, pass),
            NodeKind::Randomizer(sampler) => {
                self.expand_randomizer(key, sampler, node, context, pass)
            }
        }
    }

    /// Expand a JSON value that must be a frame object.
    pub fn expand_value(
        &self,
        key: &str,
        value: &Value,
        context: &ParameterContext,
        pass: &mut ResolutionPass<'_>,
    ) -> Result<Expansion, ConfigurationError> {
        let node = value
            .as_object()
            .ok_or_else(|| ConfigurationError::MalformedFrame {
                frame: key.to_string(),
                reason: "frame definition must be an object".to_string(),
            })?;
        self.expand(key, node, context, pass)
    }

    /// Expand a list of members in order, each with `common` merged underneath.
    pub fn expand_members<'m, I>(
        &self,
        parent_key: &str,
        members: I,
        common: Option<&FrameSpec>,
        context: &ParameterContext,
        pass: &mut ResolutionPass<'_>,
    ) -> Result<Expansion, ConfigurationError>
    where
        I: IntoIterator<Item = (usize, &'m Value)>,
    {
        let mut expansion = Expansion::default();
        for (index, member) in members {
            let own = member
                .as_object()
                .ok_or_else(|| ConfigurationError::MalformedFrame {
                    frame: format!("{}-{}", parent_key, index),
                    reason: "list members must be objects".to_string(),
                })?;
            let merged = match common {
                Some(common) => merge_over(common, own),
                None => own.clone(),
            };
            let child_key = member_key(parent_key, index, &merged);
            expansion.extend(self.expand(&child_key, &merged, context, pass)?);
        }
        Ok(expansion)
    }

    fn expand_leaf(
        &self,
        key: &str,
        node: &FrameSpec,
        context: &ParameterContext,
        pass: &mut ResolutionPass<'_>,
    ) -> Result<Expansion, ConfigurationError> {
        let context = scoped_context(key, node, context)?;
        let mut resolved = Map::with_capacity(node.len());
        for (property, value) in node {
            if property == KEY_PARAMETERS {
                continue;
            }
            resolved.insert(property.clone(), pass.substitute(value, &context)?);
        }
        Ok(Expansion {
            frames: vec![resolved],
            conditions: Conditions::new(),
        })
    }

    fn expand_group(
        &self,
        key: &str,
        node: &FrameSpec,
        context: &ParameterContext,
        pass: &mut ResolutionPass<'_>,
    ) -> Result<Expansion, ConfigurationError> {
        let context = scoped_context(key, node, context)?;
        let members = list_property(key, node, KEY_FRAME_LIST)?.into_iter().flatten();
        let common = common_properties(key, node)?;
        self.expand_members(key, members.enumerate(), common, &context, pass)
    }

    fn expand_randomizer(
        &self,
        key: &str,
        sampler: &str,
        node: &FrameSpec,
        context: &ParameterContext,
        pass: &mut ResolutionPass<'_>,
    ) -> Result<Expansion, ConfigurationError> {
        let strategy =
            self.registry
                .get(sampler)
                .ok_or_else(|| ConfigurationError::UnknownSampler {
                    frame: key.to_string(),
                    sampler: sampler.to_string(),
                })?;

        let context = scoped_context(key, node, context)?;
        let condition_key = format!("{}_{}", pass.sequence_index(), key);
        let sequence_key = pass.sequence_key().unwrap_or(key).to_string();
        let request = RandomizerRequest {
            frame_key: key,
            sequence_key: &sequence_key,
            condition_key: &condition_key,
            node,
            context: &context,
            past_sessions: self.past_sessions,
            participant: self.participant,
        };

        let selection = strategy.select(&request, self, pass)?;
        debug!(
            frame = %key,
            sampler = %sampler,
            frames = selection.expansion.frames.len(),
            "Randomizer selection made"
        );

        let mut expansion = selection.expansion;
        expansion
            .conditions
            .insert(key.to_string(), selection.condition);
        Ok(expansion)
    }
}
