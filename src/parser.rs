//! Experiment Parser
//!
//! Walks the top-level `sequence` against the `frames` map, expands each entry,
//! assigns final frame IDs and aggregates randomizer conditions.
//!
//! IDs are `<index>-<key>` when an entry yields one frame and
//! `<index>-<key>-<subIndex>` otherwise. Conditions are keyed
//! `<index>_<frameKey>` so a later session's randomizer can find its own prior
//! choice.

use crate::error::ConfigurationError;
use crate::randomizer::RandomizerRegistry;
use crate::types::{
    Conditions, ExperimentStructure, ParameterContext, Participant, PastSession, ResolvedFrame,
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

pub mod expand;
pub mod substitute;

pub use expand::{Expander, Expansion};
pub use substitute::{PlaceholderPolicy, ResolutionPass};

/// Resolved frame sequence plus the conditions chosen while producing it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParseOutput {
    pub frames: Vec<ResolvedFrame>,
    pub conditions: Conditions,
}

/// Parser options.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParserConfig {
    #[serde(default)]
    pub placeholder_policy: PlaceholderPolicy,
    /// Fixed seed for reproducible randomization; entropy when unset.
    #[serde(default)]
    pub seed: Option<u64>,
}

/// Experiment parser
pub struct ExperimentParser {
    structure: ExperimentStructure,
    past_sessions: Vec<PastSession>,
    participant: Participant,
    registry: RandomizerRegistry,
    policy: PlaceholderPolicy,
    rng: StdRng,
}

impl ExperimentParser {
    /// Parser with the built-in randomizers and entropy-seeded randomness.
    ///
    /// `past_sessions` must be ordered most recent first.
    pub fn new(structure: ExperimentStructure, past_sessions: Vec<PastSession>) -> Self {
        Self {
            structure,
            past_sessions,
            participant: Participant::default(),
            registry: RandomizerRegistry::with_builtins(),
            policy: PlaceholderPolicy::default(),
            rng: StdRng::from_entropy(),
        }
    }

    /// Build from raw JSON.
    pub fn from_json(
        structure: Value,
        past_sessions: Vec<PastSession>,
    ) -> Result<Self, ConfigurationError> {
        Ok(Self::new(ExperimentStructure::from_json(structure)?, past_sessions))
    }

    pub fn with_config(mut self, config: &ParserConfig) -> Self {
        self.policy = config.placeholder_policy;
        if let Some(seed) = config.seed {
            self.rng = StdRng::seed_from_u64(seed);
        }
        self
    }

    pub fn with_participant(mut self, participant: Participant) -> Self {
        self.participant = participant;
        self
    }

    pub fn with_registry(mut self, registry: RandomizerRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    /// Expand the whole sequence.
    pub fn parse(&mut self) -> Result<ParseOutput, ConfigurationError> {
        let expander = Expander::new(&self.registry, &self.past_sessions, self.participant);
        let mut output = ParseOutput::default();

        for (index, key) in self.structure.sequence.iter().enumerate() {
            let node = self
                .structure
                .frames
                .get(key)
                .ok_or_else(|| ConfigurationError::UnknownFrame(key.clone()))?;

            let mut pass =
                ResolutionPass::new(index, self.policy, &mut self.rng).with_sequence_key(key);
            let expansion =
                expander.expand_value(key, node, &ParameterContext::new(), &mut pass)?;
            debug!(
                index,
                frame = %key,
                frames = expansion.frames.len(),
                "Expanded sequence entry"
            );

            let single = expansion.frames.len() == 1;
            for (sub_index, mut properties) in expansion.frames.into_iter().enumerate() {
                properties.remove(expand::KEY_ID);
                let id = if single {
                    format!("{}-{}", index, key)
                } else {
                    format!("{}-{}-{}", index, key, sub_index)
                };
                output.frames.push(ResolvedFrame { id, properties });
            }

            for (frame_key, condition) in expansion.conditions {
                output
                    .conditions
                    .insert(format!("{}_{}", index, frame_key), condition);
            }
        }

        info!(
            sequence_len = self.structure.sequence.len(),
            frames = output.frames.len(),
            conditions = output.conditions.len(),
            "Experiment parsed"
        );
        Ok(output)
    }
}
