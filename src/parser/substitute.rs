//! Parameter substitution: resolves `NAME`, `NAME#N`, `NAME#RAND`, `NAME#PERM`
//! and `NAME#UNIQ` placeholders against a parameter context.

use crate::error::ConfigurationError;
use crate::types::ParameterContext;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

/// What to do with a `NAME#...` placeholder whose NAME is not in context.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaceholderPolicy {
    /// Log a warning and leave the literal string in place.
    #[default]
    Lenient,
    /// Fail the parse with `ConfigurationError::UnresolvedPlaceholder`.
    Strict,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Selector {
    Index(usize),
    Rand,
    Perm,
    Uniq,
}

/// Split `NAME#SUFFIX` into its parts. Returns `None` for strings that are not
/// tagged placeholders.
fn parse_tagged(text: &str) -> Option<(&str, Selector)> {
    let (name, suffix) = text.rsplit_once('#')?;
    let is_name = |c: char| c.is_alphanumeric() || matches!(c, '_' | '-' | '.');
    if name.is_empty() || !name.chars().all(is_name) {
        return None;
    }
    let selector = match suffix {
        "RAND" => Selector::Rand,
        "PERM" => Selector::Perm,
        "UNIQ" => Selector::Uniq,
        digits if !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()) => {
            Selector::Index(digits.parse().ok()?)
        }
        _ => return None,
    };
    Some((name, selector))
}

struct Permutation {
    name: String,
    source: Vec<Value>,
    shuffled: Value,
}

struct UniqCursor {
    name: String,
    source: Vec<Value>,
    order: Vec<usize>,
    next: usize,
}

/// Per-pass substitution state.
///
/// One pass covers the full expansion of a single top-level sequence entry.
/// `#PERM` orders and `#UNIQ` draws are shared by every resolution within the
/// pass and never leak into the next one.
pub struct ResolutionPass<'r> {
    sequence_index: usize,
    sequence_key: Option<String>,
    policy: PlaceholderPolicy,
    rng: &'r mut StdRng,
    permutations: Vec<Permutation>,
    uniq: Vec<UniqCursor>,
}

impl<'r> ResolutionPass<'r> {
    pub fn new(sequence_index: usize, policy: PlaceholderPolicy, rng: &'r mut StdRng) -> Self {
        Self {
            sequence_index,
            sequence_key: None,
            policy,
            rng,
            permutations: Vec::new(),
            uniq: Vec::new(),
        }
    }

    /// Record the top-level `sequence` key this pass expands.
    pub fn with_sequence_key(mut self, key: impl Into<String>) -> Self {
        self.sequence_key = Some(key.into());
        self
    }

    pub fn sequence_index(&self) -> usize {
        self.sequence_index
    }

    pub fn sequence_key(&self) -> Option<&str> {
        self.sequence_key.as_deref()
    }

    /// Random source for samplers running inside this pass.
    pub fn rng(&mut self) -> &mut StdRng {
        &mut *self.rng
    }

    /// Substitute every placeholder in `value`, returning a new structure.
    pub fn substitute(
        &mut self,
        value: &Value,
        context: &ParameterContext,
    ) -> Result<Value, ConfigurationError> {
        match value {
            Value::String(text) => self.substitute_str(text, context),
            Value::Array(items) => items
                .iter()
                .map(|item| self.substitute(item, context))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            Value::Object(fields) => {
                let mut out = Map::with_capacity(fields.len());
                for (key, field) in fields {
                    out.insert(key.clone(), self.substitute(field, context)?);
                }
                Ok(Value::Object(out))
            }
            other => Ok(other.clone()),
        }
    }

    fn substitute_str(
        &mut self,
        text: &str,
        context: &ParameterContext,
    ) -> Result<Value, ConfigurationError> {
        if let Some(replacement) = context.get(text) {
            return Ok(replacement.clone());
        }

        let Some((name, selector)) = parse_tagged(text) else {
            return Ok(Value::String(text.to_string()));
        };

        let Some(parameter) = context.get(name) else {
            return match self.policy {
                PlaceholderPolicy::Lenient => {
                    warn!(placeholder = %text, "Unresolved placeholder left in frame");
                    Ok(Value::String(text.to_string()))
                }
                PlaceholderPolicy::Strict => {
                    Err(ConfigurationError::UnresolvedPlaceholder(text.to_string()))
                }
            };
        };

        let items = parameter
            .as_array()
            .ok_or_else(|| ConfigurationError::PlaceholderNotIndexable {
                placeholder: text.to_string(),
            })?;

        match selector {
            Selector::Index(index) => items.get(index).cloned().ok_or_else(|| {
                ConfigurationError::PlaceholderIndexOutOfRange {
                    placeholder: text.to_string(),
                    index,
                    len: items.len(),
                }
            }),
            Selector::Rand => {
                ensure_non_empty(text, items)?;
                let index = self.rng.gen_range(0..items.len());
                Ok(items[index].clone())
            }
            Selector::Perm => Ok(self.permutation(name, items)),
            Selector::Uniq => {
                ensure_non_empty(text, items)?;
                Ok(self.next_unique(name, items))
            }
        }
    }

    fn permutation(&mut self, name: &str, items: &[Value]) -> Value {
        if let Some(existing) = self
            .permutations
            .iter()
            .find(|p| p.name == name && p.source == items)
        {
            return existing.shuffled.clone();
        }
        let mut shuffled = items.to_vec();
        shuffled.shuffle(&mut *self.rng);
        let shuffled = Value::Array(shuffled);
        self.permutations.push(Permutation {
            name: name.to_string(),
            source: items.to_vec(),
            shuffled: shuffled.clone(),
        });
        shuffled
    }

    /// Draw the next unused element for `name`. When every element has been
    /// handed out the order is reshuffled and drawing starts over.
    fn next_unique(&mut self, name: &str, items: &[Value]) -> Value {
        let position = match self
            .uniq
            .iter()
            .position(|c| c.name == name && c.source == items)
        {
            Some(position) => position,
            None => {
                let mut order: Vec<usize> = (0..items.len()).collect();
                order.shuffle(&mut *self.rng);
                self.uniq.push(UniqCursor {
                    name: name.to_string(),
                    source: items.to_vec(),
                    order,
                    next: 0,
                });
                self.uniq.len() - 1
            }
        };

        let cursor = &mut self.uniq[position];
        if cursor.next >= cursor.order.len() {
            cursor.order.shuffle(&mut *self.rng);
            cursor.next = 0;
        }
        let index = cursor.order[cursor.next];
        cursor.next += 1;
        items[index].clone()
    }
}

fn ensure_non_empty(placeholder: &str, items: &[Value]) -> Result<(), ConfigurationError> {
    if items.is_empty() {
        return Err(ConfigurationError::EmptyOptions {
            frame: placeholder.to_string(),
            reason: "placeholder references an empty array".to_string(),
        });
    }
    Ok(())
}
