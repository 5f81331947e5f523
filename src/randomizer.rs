//! Randomizer strategies
//!
//! Pluggable samplers invoked at `sampler` nodes. Each strategy picks a sub-tree
//! (or parameter set), expands it through the shared [`Expander`], and reports a
//! condition record that later sessions can look up under the same key.

use crate::error::ConfigurationError;
use crate::parser::expand::{
    list_property, Expander, Expansion, KEY_FRAME_LIST, KEY_FRAME_OPTIONS,
};
use crate::parser::substitute::ResolutionPass;
use crate::types::{FrameSpec, ParameterContext, Participant, PastSession};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

pub mod increment;
pub mod parameter_set;
pub mod permute;
pub mod random;
pub mod select;

pub use increment::IncrementConditions;
pub use parameter_set::RandomParameterSet;
pub use permute::Permute;
pub use random::RandomChoice;
pub use select::Select;

/// Everything a strategy may look at when making its choice.
#[derive(Debug, Clone, Copy)]
pub struct RandomizerRequest<'a> {
    /// Key of the randomizer node within its parent.
    pub frame_key: &'a str,
    /// Top-level `sequence` key whose frame IDs this randomizer's frames end up under.
    pub sequence_key: &'a str,
    /// `<sequenceIndex>_<frameKey>`, the key this choice is recorded under.
    pub condition_key: &'a str,
    /// The randomizer node as authored.
    pub node: &'a FrameSpec,
    /// Inherited context with the node's own `parameters` merged in.
    pub context: &'a ParameterContext,
    /// Prior sessions, most recent first.
    pub past_sessions: &'a [PastSession],
    pub participant: Participant,
}

impl<'a> RandomizerRequest<'a> {
    /// The selectable options: `frameOptions`, falling back to `frameList`.
    ///
    /// Empty option lists are a configuration error.
    pub fn options(&self) -> Result<&'a Vec<Value>, ConfigurationError> {
        let options = match list_property(self.frame_key, self.node, KEY_FRAME_OPTIONS)? {
            Some(options) => Some(options),
            None => list_property(self.frame_key, self.node, KEY_FRAME_LIST)?,
        };
        match options {
            Some(options) if !options.is_empty() => Ok(options),
            _ => Err(ConfigurationError::EmptyOptions {
                frame: self.frame_key.to_string(),
                reason: "frameOptions/frameList is missing or empty".to_string(),
            }),
        }
    }

    /// Most recent prior condition recorded for this randomizer, if any.
    pub fn previous_condition(&self) -> Option<&'a Value> {
        self.past_sessions
            .iter()
            .find_map(|session| session.condition_for(self.condition_key, self.frame_key))
    }

    pub fn malformed(&self, reason: impl Into<String>) -> ConfigurationError {
        ConfigurationError::MalformedFrame {
            frame: self.frame_key.to_string(),
            reason: reason.into(),
        }
    }
}

/// A strategy's choice: the expanded frames plus the condition to record.
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    pub expansion: Expansion,
    pub condition: Value,
}

/// Randomizer strategy trait
pub trait Randomizer: Send + Sync {
    /// Name used in the `sampler` field.
    fn name(&self) -> &str;

    /// Choose and expand. Nested sub-trees go back through `expander`.
    fn select(
        &self,
        request: &RandomizerRequest<'_>,
        expander: &Expander<'_>,
        pass: &mut ResolutionPass<'_>,
    ) -> Result<Selection, ConfigurationError>;
}

/// Sampler name to strategy.
#[derive(Clone, Default)]
pub struct RandomizerRegistry {
    strategies: HashMap<String, Arc<dyn Randomizer>>,
}

impl RandomizerRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding every built-in strategy.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(Permute));
        registry.register(Arc::new(RandomChoice));
        registry.register(Arc::new(Select));
        registry.register(Arc::new(RandomParameterSet));
        registry.register(Arc::new(IncrementConditions));
        registry
    }

    /// Register a strategy, replacing any existing one with the same name.
    pub fn register(&mut self, strategy: Arc<dyn Randomizer>) {
        self.strategies.insert(strategy.name().to_string(), strategy);
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Randomizer>> {
        self.strategies.get(name)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.strategies.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl std::fmt::Debug for RandomizerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RandomizerRegistry")
            .field("strategies", &self.names())
            .finish()
    }
}
