//! Integration tests for experiment structure resolution

use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::Arc;
use studyplayer::error::ConfigurationError;
use studyplayer::parser::expand::common_properties;
use studyplayer::parser::{
    Expander, ExperimentParser, ParseOutput, ParserConfig, PlaceholderPolicy, ResolutionPass,
};
use studyplayer::randomizer::{Randomizer, RandomizerRegistry, RandomizerRequest, Selection};
use studyplayer::types::{Participant, PastSession};

fn parse(structure: Value) -> ParseOutput {
    parse_with(structure, Vec::new(), Participant::default())
}

fn parse_with(structure: Value, past: Vec<PastSession>, participant: Participant) -> ParseOutput {
    ExperimentParser::from_json(structure, past)
        .unwrap()
        .with_participant(participant)
        .with_seed(7)
        .parse()
        .unwrap()
}

fn ids(output: &ParseOutput) -> Vec<&str> {
    output.frames.iter().map(|f| f.id.as_str()).collect()
}

#[test]
fn test_leaf_frames_are_numbered_by_sequence_position() {
    let output = parse(json!({
        "frames": {
            "aVideo": { "kind": "exp-video", "source": "intro.mp4" },
            "aSound": { "kind": "exp-audio" }
        },
        "sequence": ["aVideo", "aSound"]
    }));
    assert_eq!(ids(&output), vec!["0-aVideo", "1-aSound"]);
    assert_eq!(output.frames[0].get("source"), Some(&json!("intro.mp4")));
}

#[test]
fn test_repeated_sequence_entries_get_distinct_ids() {
    let output = parse(json!({
        "frames": { "rest": { "kind": "exp-rest" } },
        "sequence": ["rest", "rest", "rest"]
    }));
    assert_eq!(ids(&output), vec!["0-rest", "1-rest", "2-rest"]);
}

#[test]
fn test_group_common_properties_apply_to_members() {
    let output = parse(json!({
        "frames": {
            "instructions": {
                "frameList": [
                    { "text": "Welcome" },
                    { "text": "Let's begin" }
                ],
                "commonFrameProperties": { "kind": "exp-lookit-text" }
            }
        },
        "sequence": ["instructions"]
    }));
    assert_eq!(ids(&output), vec!["0-instructions-0", "0-instructions-1"]);
    for frame in &output.frames {
        assert_eq!(frame.kind(), Some("exp-lookit-text"));
    }
    assert_eq!(output.frames[1].get("text"), Some(&json!("Let's begin")));
}

#[test]
fn test_member_properties_override_common_properties() {
    let output = parse(json!({
        "frames": {
            "block": {
                "frameList": [
                    { "text": "plain" },
                    { "kind": "exp-lookit-video", "video": "clip.mp4" }
                ],
                "commonFrameProperties": { "kind": "exp-lookit-text", "showNext": true }
            }
        },
        "sequence": ["block"]
    }));
    assert_eq!(output.frames[0].kind(), Some("exp-lookit-text"));
    assert_eq!(output.frames[1].kind(), Some("exp-lookit-video"));
    assert_eq!(output.frames[1].get("showNext"), Some(&json!(true)));
}

#[test]
fn test_unknown_sequence_key_fails() {
    let err = ExperimentParser::from_json(
        json!({ "frames": {}, "sequence": ["missing"] }),
        Vec::new(),
    )
    .unwrap()
    .parse()
    .unwrap_err();
    assert_eq!(err, ConfigurationError::UnknownFrame("missing".to_string()));
}

#[test]
fn test_unknown_sampler_fails() {
    let err = ExperimentParser::from_json(
        json!({
            "frames": { "r": { "sampler": "coin-flip", "frameOptions": [{ "kind": "a" }] } },
            "sequence": ["r"]
        }),
        Vec::new(),
    )
    .unwrap()
    .parse()
    .unwrap_err();
    assert!(matches!(
        err,
        ConfigurationError::UnknownSampler { sampler, .. } if sampler == "coin-flip"
    ));
}

#[test]
fn test_group_parameters_feed_placeholders() {
    let output = parse(json!({
        "frames": {
            "trials": {
                "parameters": {
                    "IMAGES": ["cat.png", "dog.png", "fish.png"],
                    "PROMPT": "Look!"
                },
                "commonFrameProperties": { "kind": "exp-lookit-images" },
                "frameList": [
                    { "images": "IMAGES#PERM", "caption": "PROMPT", "first": "IMAGES#0" },
                    { "images": "IMAGES#PERM", "caption": "Literal text #1" }
                ]
            }
        },
        "sequence": ["trials"]
    }));

    let first = output.frames[0].get("images").unwrap();
    let second = output.frames[1].get("images").unwrap();
    assert_eq!(first, second, "PERM draws are shared within one pass");
    let mut sorted: Vec<&str> = first
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_str().unwrap())
        .collect();
    sorted.sort_unstable();
    assert_eq!(sorted, vec!["cat.png", "dog.png", "fish.png"]);

    assert_eq!(output.frames[0].get("caption"), Some(&json!("Look!")));
    assert_eq!(output.frames[0].get("first"), Some(&json!("cat.png")));
    assert_eq!(
        output.frames[1].get("caption"),
        Some(&json!("Literal text #1"))
    );
    for frame in &output.frames {
        assert!(frame.get("parameters").is_none());
        assert!(frame.get("id").is_none());
    }
}

#[test]
fn test_strict_policy_rejects_unresolved_placeholder() {
    let structure = json!({
        "frames": { "intro": { "kind": "exp-lookit-text", "text": "GREETING#RAND" } },
        "sequence": ["intro"]
    });

    let lenient = parse(structure.clone());
    assert_eq!(lenient.frames[0].get("text"), Some(&json!("GREETING#RAND")));

    let err = ExperimentParser::from_json(structure, Vec::new())
        .unwrap()
        .with_config(&ParserConfig {
            placeholder_policy: PlaceholderPolicy::Strict,
            seed: Some(1),
        })
        .parse()
        .unwrap_err();
    assert!(matches!(err, ConfigurationError::UnresolvedPlaceholder(_)));
}

#[test]
fn test_nested_randomizer_conditions_use_member_key() {
    let output = parse(json!({
        "frames": {
            "intro": { "kind": "exp-lookit-text" },
            "session": {
                "frameList": [
                    { "kind": "exp-lookit-text", "text": "ready" },
                    {
                        "id": "order",
                        "sampler": "permute",
                        "frameOptions": [
                            { "kind": "exp-a" },
                            { "kind": "exp-b" },
                            { "kind": "exp-c" }
                        ]
                    }
                ]
            }
        },
        "sequence": ["intro", "session"]
    }));

    assert_eq!(
        ids(&output),
        vec![
            "0-intro",
            "1-session-0",
            "1-session-1",
            "1-session-2",
            "1-session-3"
        ]
    );
    let order = output.conditions["1_order"]["order"].as_array().unwrap();
    let mut positions: Vec<u64> = order.iter().map(|v| v.as_u64().unwrap()).collect();

    let kinds: Vec<&str> = output.frames[2..]
        .iter()
        .map(|f| f.kind().unwrap())
        .collect();
    let expected: Vec<&str> = positions
        .iter()
        .map(|&i| ["exp-a", "exp-b", "exp-c"][i as usize])
        .collect();
    assert_eq!(kinds, expected);

    positions.sort_unstable();
    assert_eq!(positions, vec![0, 1, 2]);
}

#[test]
fn test_same_seed_reproduces_selection() {
    let structure = json!({
        "frames": {
            "pick": {
                "sampler": "random",
                "frameOptions": [
                    { "kind": "exp-a" },
                    { "kind": "exp-b" },
                    { "kind": "exp-c" },
                    { "kind": "exp-d" }
                ]
            }
        },
        "sequence": ["pick", "pick"]
    });
    let first = parse(structure.clone());
    let second = parse(structure);
    assert_eq!(first, second);
    assert!(first.conditions.contains_key("0_pick"));
    assert!(first.conditions.contains_key("1_pick"));
}

#[test]
fn test_increment_conditions_continue_from_past_session() {
    let previous = json!({ "startType": 22, "showStay": 18, "whichObjects": [262, 88, 718, 18] });
    let past: Vec<PastSession> = serde_json::from_value(json!([
        {
            "conditions": { "1_physics": previous },
            "expData": { "0-intro": {}, "1-physics-0": { "completed": true } }
        }
    ]))
    .unwrap();

    let output = parse_with(
        json!({
            "frames": {
                "intro": { "kind": "exp-lookit-text" },
                "physics": {
                    "sampler": "increment-conditions",
                    "frameList": [
                        {
                            "kind": "exp-physics",
                            "startType": "startType",
                            "objects": "whichObjects"
                        }
                    ]
                }
            },
            "sequence": ["intro", "physics"]
        }),
        past,
        Participant::default(),
    );

    assert_eq!(
        output.conditions["1_physics"],
        json!({ "startType": 23, "showStay": 19, "whichObjects": [263, 89, 719, 19] })
    );
    assert_eq!(output.frames[1].get("startType"), Some(&json!(23)));
    assert_eq!(output.frames[1].get("objects"), Some(&json!([263, 89, 719, 19])));
}

#[test]
fn test_parameter_set_by_participant_age() {
    let structure = json!({
        "frames": {
            "stimuli": {
                "sampler": "random-parameter-set",
                "frameList": [{ "kind": "exp-video", "video": "STIMULUS" }],
                "parameterSets": [
                    { "STIMULUS": "infant.mp4" },
                    { "STIMULUS": "toddler.mp4" }
                ],
                "parameterSetWeights": [
                    { "minAge": 0, "maxAge": 365, "weights": [1, 0] },
                    { "minAge": 366, "maxAge": 1500, "weights": [0, 1] }
                ]
            }
        },
        "sequence": ["stimuli"]
    });

    let infant = parse_with(
        structure.clone(),
        Vec::new(),
        Participant {
            age_in_days: Some(200),
        },
    );
    assert_eq!(infant.frames[0].get("video"), Some(&json!("infant.mp4")));
    assert_eq!(infant.conditions["0_stimuli"]["conditionNum"], json!(0));

    let toddler = parse_with(
        structure,
        Vec::new(),
        Participant {
            age_in_days: Some(700),
        },
    );
    assert_eq!(toddler.frames[0].get("video"), Some(&json!("toddler.mp4")));
}

#[test]
fn test_parse_output_serializes_flat_frames() {
    let output = parse(json!({
        "frames": { "intro": { "kind": "exp-lookit-text", "title": "Hello" } },
        "sequence": ["intro"]
    }));
    let value = serde_json::to_value(&output).unwrap();
    assert_eq!(
        value["frames"][0],
        json!({ "id": "0-intro", "kind": "exp-lookit-text", "title": "Hello" })
    );
}

fn physics_sampler() -> Value {
    json!({
        "sampler": "increment-conditions",
        "frameList": [{ "kind": "exp-physics", "startType": "startType" }]
    })
}

#[test]
fn test_nested_increment_sampler_continues_from_group_frame() {
    let past: Vec<PastSession> = serde_json::from_value(json!([
        {
            "conditions": {
                "0_phys": { "startType": 22, "showStay": 18, "whichObjects": [262, 88, 718, 18] }
            },
            "expData": { "0-block": { "completed": true } }
        }
    ]))
    .unwrap();

    let mut member = physics_sampler();
    member["id"] = json!("phys");
    for seed in 0..5 {
        let output = ExperimentParser::from_json(
            json!({
                "frames": { "block": { "frameList": [member.clone()] } },
                "sequence": ["block"]
            }),
            past.clone(),
        )
        .unwrap()
        .with_seed(seed)
        .parse()
        .unwrap();

        assert_eq!(ids(&output), vec!["0-block"]);
        assert_eq!(
            output.conditions["0_phys"],
            json!({ "startType": 23, "showStay": 19, "whichObjects": [263, 89, 719, 19] })
        );
    }
}

#[test]
fn test_increment_skips_session_that_only_reached_similar_frame() {
    let past: Vec<PastSession> = serde_json::from_value(json!([
        {
            "conditions": {
                "1_physics": { "startType": 5, "showStay": 5, "whichObjects": [5, 5, 5, 5] }
            },
            "expData": { "0-physics-intro": {} }
        },
        {
            "conditions": {
                "1_physics": { "startType": 22, "showStay": 18, "whichObjects": [262, 88, 718, 18] }
            },
            "expData": { "0-physics-intro": {}, "1-physics": {} }
        }
    ]))
    .unwrap();

    let output = parse_with(
        json!({
            "frames": {
                "physics-intro": { "kind": "exp-lookit-text" },
                "physics": physics_sampler()
            },
            "sequence": ["physics-intro", "physics"]
        }),
        past,
        Participant::default(),
    );
    assert_eq!(
        output.conditions["1_physics"],
        json!({ "startType": 23, "showStay": 19, "whichObjects": [263, 89, 719, 19] })
    );
}

#[test]
fn test_uniq_and_perm_are_shared_across_group_members() {
    let members: Vec<Value> = (0..4)
        .map(|_| json!({ "image": "IMG#UNIQ", "order": "ORDER#PERM" }))
        .collect();
    let output = parse(json!({
        "frames": {
            "trials": {
                "parameters": {
                    "IMG": ["a.png", "b.png", "c.png", "d.png"],
                    "ORDER": [1, 2, 3, 4, 5, 6]
                },
                "commonFrameProperties": { "kind": "exp-lookit-images" },
                "frameList": members
            }
        },
        "sequence": ["trials", "trials"]
    }));
    assert_eq!(output.frames.len(), 8);

    for entry in output.frames.chunks(4) {
        let images: HashSet<&str> = entry
            .iter()
            .map(|frame| frame.get("image").unwrap().as_str().unwrap())
            .collect();
        assert_eq!(images.len(), 4, "each entry draws every image once");

        let first_order = entry[0].get("order").unwrap();
        assert!(entry.iter().all(|frame| frame.get("order") == Some(first_order)));
    }
}

/// Study-specific sampler that always takes the first option.
struct FirstOption;

impl Randomizer for FirstOption {
    fn name(&self) -> &str {
        "first-option"
    }

    fn select(
        &self,
        request: &RandomizerRequest<'_>,
        expander: &Expander<'_>,
        pass: &mut ResolutionPass<'_>,
    ) -> Result<Selection, ConfigurationError> {
        let options = request.options()?;
        let common = common_properties(request.frame_key, request.node)?;
        let expansion = expander.expand_members(
            request.frame_key,
            options.iter().enumerate().take(1),
            common,
            request.context,
            pass,
        )?;
        Ok(Selection {
            expansion,
            condition: json!({ "picked": 0, "of": options.len() }),
        })
    }
}

#[test]
fn test_custom_sampler_registered_on_parser() {
    let mut registry = RandomizerRegistry::with_builtins();
    registry.register(Arc::new(FirstOption));
    assert!(registry.names().contains(&"first-option"));

    let output = ExperimentParser::from_json(
        json!({
            "frames": {
                "intro": { "kind": "exp-lookit-text" },
                "custom": {
                    "sampler": "first-option",
                    "commonFrameProperties": { "kind": "exp-video" },
                    "frameOptions": [{ "video": "first.mp4" }, { "video": "second.mp4" }]
                }
            },
            "sequence": ["intro", "custom"]
        }),
        Vec::new(),
    )
    .unwrap()
    .with_registry(registry)
    .with_seed(3)
    .parse()
    .unwrap();

    assert_eq!(ids(&output), vec!["0-intro", "1-custom"]);
    assert_eq!(output.frames[1].kind(), Some("exp-video"));
    assert_eq!(output.frames[1].get("video"), Some(&json!("first.mp4")));
    assert_eq!(output.conditions["1_custom"], json!({ "picked": 0, "of": 2 }));
}
