/// Engine integration tests: full sessions through the public pipeline.

use chrono::{TimeDelta, Utc};
use forest_flow::core::config::EngineConfig;
use forest_flow::core::graph::StoryGraph;
use forest_flow::core::store::StoreError;
use forest_flow::core::traversal::TraversalError;
use forest_flow::schema::session::{PersonalityTrait, SessionId, SessionProfile};
use forest_flow::schema::view::ChoiceRequest;
use forest_flow::{PipelineError, StoryEngine};
use std::sync::{Arc, Barrier};
use std::thread;

fn forest() -> StoryEngine {
    StoryEngine::builder().build().unwrap()
}

fn crossroads() -> StoryEngine {
    StoryEngine::builder()
        .story_path("tests/fixtures/crossroads.ron")
        .config_path("tests/fixtures/engine.ron")
        .build()
        .unwrap()
}

fn fixed_profile() -> SessionProfile {
    SessionProfile {
        traits: vec![
            PersonalityTrait::Practical,
            PersonalityTrait::Bold,
            PersonalityTrait::Detailed,
        ],
        styles: vec!["medieval".to_string(), "bright".to_string(), "whimsical".to_string()],
    }
}

#[test]
fn end_to_end_good_ending() {
    let engine = forest();
    let id = SessionId::new("player-one");
    let view = engine.open(Some(&id), 1).unwrap();
    assert_eq!(view.node_id, "start");
    assert_eq!(view.score, 0);

    let expected = [
        ("deep_forest", 1),
        ("grateful_creature", 3),
        ("hidden_treasure", 4),
        ("amulet_power", 6),
    ];
    for (node, score) in expected {
        let view = engine.choose(&id, 0, 1).unwrap();
        assert_eq!(view.node_id, node);
        assert_eq!(view.score, score);
        assert!(!view.is_end);
    }

    let state = engine.session(&id).unwrap();
    assert_eq!(state.tally("curious"), 1);
    assert_eq!(state.tally("kind"), 1);
    assert_eq!(state.tally("adventurous"), 1);
    assert_eq!(state.tally("risk-taker"), 1);

    // Score 6 with kind + adventurous against no negative tags: good pool,
    // and "player-one" hashes to index 0 of it.
    let ending = engine.choose(&id, 0, 1).unwrap();
    assert!(ending.is_end);
    assert_eq!(ending.node_id, "heroic_savior_ending");
    assert_eq!(ending.ending_category.as_deref(), Some("Heroic Savior"));
    assert_eq!(ending.score, 7);
    assert!(ending.choices.is_empty());
    assert!(ending.ending_art.is_some());

    let state = engine.session(&id).unwrap();
    assert_eq!(state.path().len(), 6);
    assert_eq!(state.history().len(), 5);
}

#[test]
fn same_path_different_sessions_land_on_their_own_ending() {
    let engine = forest();
    let mut endings = Vec::new();
    for name in ["player-one", "bob", "alice"] {
        let id = SessionId::new(name);
        engine.open(Some(&id), 1).unwrap();
        let mut view = engine.choose(&id, 0, 1).unwrap();
        while !view.is_end {
            view = engine.choose(&id, 0, 1).unwrap();
        }
        endings.push(view.node_id);
    }
    assert_eq!(
        endings,
        ["heroic_savior_ending", "wise_mage_ending", "forest_guardian_ending"]
    );
}

#[test]
fn no_choices_after_an_ending() {
    let engine = forest();
    let id = SessionId::new("done");
    engine.open(Some(&id), 1).unwrap();
    for index in [1, 1, 0] {
        engine.choose(&id, index, 1).unwrap();
    }
    let before = engine.session(&id).unwrap();
    let err = engine.choose(&id, 0, 1).unwrap_err();
    assert!(matches!(
        err,
        PipelineError::Traversal(TraversalError::InvalidChoice { available: 0, .. })
    ));
    assert_eq!(engine.session(&id).unwrap().path(), before.path());
}

#[test]
fn invalid_choice_leaves_session_unchanged() {
    let engine = forest();
    let id = SessionId::new("clumsy");
    engine.open(Some(&id), 1).unwrap();
    engine.choose(&id, 0, 1).unwrap();

    let err = engine.choose(&id, 7, 1).unwrap_err();
    assert!(matches!(
        err,
        PipelineError::Traversal(TraversalError::InvalidChoice { index: 7, available: 2, .. })
    ));
    let state = engine.session(&id).unwrap();
    assert_eq!(state.current_node(), "deep_forest");
    assert_eq!(state.score(), 1);
    assert_eq!(state.history().len(), 1);
}

#[test]
fn unknown_session_is_rejected() {
    let engine = forest();
    let ghost = SessionId::new("ghost");
    assert!(matches!(
        engine.choose(&ghost, 0, 1),
        Err(PipelineError::Store(StoreError::InvalidSession(_)))
    ));
    assert!(matches!(
        engine.share_card(&ghost, 1),
        Err(PipelineError::Store(StoreError::InvalidSession(_)))
    ));
    assert!(matches!(
        engine.submit(&ghost, &ChoiceRequest::new(0), 1),
        Err(PipelineError::Store(StoreError::InvalidSession(_)))
    ));
    assert_eq!(engine.session_count(), 0);
}

#[test]
fn submit_parses_request_body() {
    let engine = forest();
    let id = SessionId::new("json-body");
    engine.open(Some(&id), 1).unwrap();

    let request: ChoiceRequest = serde_json::from_str(r#"{"choice_index": 1}"#).unwrap();
    assert_eq!(engine.submit(&id, &request, 1).unwrap().node_id, "forest_edge");

    let empty: ChoiceRequest = serde_json::from_str("{}").unwrap();
    assert!(matches!(
        engine.submit(&id, &empty, 1),
        Err(PipelineError::MissingChoice)
    ));
    assert_eq!(engine.session(&id).unwrap().history().len(), 1);
}

#[test]
fn reset_discards_progress() {
    let engine = forest();
    let id = SessionId::new("again");
    engine.open(Some(&id), 1).unwrap();
    engine.choose(&id, 0, 1).unwrap();
    engine.choose(&id, 0, 1).unwrap();

    let fresh = engine.reset(Some(&id), 1).unwrap();
    assert_eq!(fresh.node_id, "start");
    assert_eq!(fresh.score, 0);
    let state = engine.session(&id).unwrap();
    assert!(state.sentiment().is_empty());
    assert_eq!(state.path(), ["start".to_string()]);
    assert!(state.history().is_empty());
    assert_eq!(engine.session_count(), 1);
}

#[test]
fn repeated_reset_yields_independent_sessions() {
    let engine = forest();
    let a = engine.reset(None, 1).unwrap();
    let b = engine.reset(None, 1).unwrap();
    assert_ne!(a.session_id, b.session_id);

    engine.choose(&a.session_id, 0, 1).unwrap();
    let b_state = engine.session(&b.session_id).unwrap();
    assert_eq!(b_state.score(), 0);
    assert!(b_state.sentiment().is_empty());
    assert_eq!(engine.session_count(), 2);
}

#[test]
fn first_choice_at_start_is_never_personalized() {
    let engine = forest();
    let authored = engine.graph().lookup("start").unwrap().choices[0].text.clone();
    for name in ["alice", "bob", "carol", "dave"] {
        let view = engine.open(Some(&SessionId::new(name)), 1).unwrap();
        assert_eq!(view.choices[0].text, authored);
        assert_eq!(view.choices[0].index, 0);
        assert_eq!(view.choices[1].index, 1);
    }
}

#[test]
fn sessions_diverge() {
    let engine = forest();
    let alice = SessionId::new("alice");
    let bob = SessionId::new("bob");
    let a = engine.reset_with_profile(&alice, fixed_profile(), 9).unwrap();
    let b = engine.reset_with_profile(&bob, fixed_profile(), 9).unwrap();

    assert_eq!(a.image_seed, 504535);
    assert_eq!(b.image_seed, 878708);
    assert_ne!(a.image_prompt, b.image_prompt);
    assert_ne!(a.image_url, b.image_url);
}

#[test]
fn replay_is_deterministic() {
    let first = forest();
    let second = forest();
    let id = SessionId::new("replay");

    let mut views = Vec::new();
    for engine in [&first, &second] {
        engine.reset_with_profile(&id, fixed_profile(), 11).unwrap();
        let mut trail = Vec::new();
        for index in [0, 1, 1] {
            trail.push(engine.choose(&id, index, 11).unwrap());
        }
        views.push(trail);
    }
    assert_eq!(views[0], views[1]);
    assert_eq!(views[0].last().unwrap().node_id, "tree_climb");
}

#[test]
fn image_seed_depends_on_path() {
    let engine = forest();
    let id = SessionId::new("paths");
    // Two ways to reach forest_edge.
    engine.reset_with_profile(&id, fixed_profile(), 1).unwrap();
    let direct = engine.choose(&id, 1, 1).unwrap();

    engine.reset_with_profile(&id, fixed_profile(), 1).unwrap();
    for index in [0, 1, 1] {
        engine.choose(&id, index, 1).unwrap();
    }
    let around = engine.choose(&id, 1, 1).unwrap();

    assert_eq!(direct.node_id, "forest_edge");
    assert_eq!(around.node_id, "forest_edge");
    assert_ne!(direct.image_seed, around.image_seed);
}

#[test]
fn share_card_for_finished_session() {
    let engine = forest();
    let id = SessionId::new("player-one");
    engine.reset_with_profile(&id, fixed_profile(), 3).unwrap();
    for _ in 0..5 {
        engine.choose(&id, 0, 3).unwrap();
    }

    let card = engine.share_card(&id, 3).unwrap();
    assert_eq!(card.ending_category, "Heroic Savior");
    assert_eq!(card.score, 7);
    assert!(card.prompt.starts_with(
        "Manga style, 4-panel comic strip telling the story of a curious, kind, adventurous adventurer who achieved the 'Heroic Savior' ending with a score of 7, "
    ));
    assert!(card.prompt.contains("medieval, bright, whimsical, warm light"));
    assert!(card.image_url.starts_with("https://image.pollinations.ai/prompt/Manga%20style"));
}

#[test]
fn fixture_story_and_config() {
    let engine = crossroads();
    assert_eq!(engine.config().share_title, "Crossroads");
    assert_eq!(engine.config().session_ttl_secs, 3600);

    let id = SessionId::new("traveller");
    let view = engine.open(Some(&id), 5).unwrap();
    assert_eq!(view.node_id, "crossroads");
    assert!(view.image_url.starts_with("https://render.example/prompt/"));

    // -1 selfish, +2 kind: score 1 with tied tags at the bridge.
    engine.choose(&id, 1, 5).unwrap();
    engine.choose(&id, 1, 5).unwrap();
    let ending = engine.choose(&id, 0, 5).unwrap();
    assert_eq!(ending.node_id, "wanderer_end");
    assert_eq!(ending.score, 3);

    let card = engine.share_card(&id, 5).unwrap();
    assert!(card.prompt.contains("story of a selfish, kind, bold adventurer"));
    assert!(card.prompt.ends_with("with title 'Crossroads' and score displayed"));
}

#[test]
fn fixture_outcomes() {
    let engine = crossroads();
    let walk = |name: &str, choices: &[usize]| {
        let id = SessionId::new(name);
        engine.open(Some(&id), 1).unwrap();
        let mut last = None;
        for &index in choices {
            last = Some(engine.choose(&id, index, 1).unwrap());
        }
        last.unwrap().node_id
    };
    assert_eq!(walk("good", &[0, 0]), "hero_end");
    assert_eq!(walk("bad", &[1, 0]), "bandit_end");
    assert_eq!(walk("neutral", &[1, 1, 1]), "wanderer_end");
}

#[test]
fn idle_sessions_are_evicted() {
    let engine = crossroads();
    let id = SessionId::new("sleepy");
    engine.open(Some(&id), 1).unwrap();
    assert_eq!(engine.evict_expired(Utc::now()), 0);
    assert_eq!(engine.evict_expired(Utc::now() + TimeDelta::hours(2)), 1);
    assert_eq!(engine.session_count(), 0);
    assert!(engine.view(&id, 1).is_err());
}

#[test]
fn view_serializes_for_transport() {
    let engine = forest();
    let view = engine.open(Some(&SessionId::new("wire")), 8).unwrap();
    let json = serde_json::to_value(&view).unwrap();
    assert_eq!(json["session_id"], "wire");
    assert_eq!(json["node_id"], "start");
    assert_eq!(json["choices"][1]["index"], 1);
    assert!(json.get("ending_art").is_none());
}

#[test]
fn concurrent_sessions_do_not_interfere() {
    let engine = Arc::new(forest());
    let handles: Vec<_> = (0..8)
        .map(|i| {
            let engine = Arc::clone(&engine);
            thread::spawn(move || {
                let id = SessionId::new(format!("player-{}", i));
                engine.open(Some(&id), 1).unwrap();
                for _ in 0..4 {
                    engine.choose(&id, 0, 1).unwrap();
                }
                engine.session(&id).unwrap()
            })
        })
        .collect();

    for handle in handles {
        let state = handle.join().unwrap();
        assert_eq!(state.current_node(), "amulet_power");
        assert_eq!(state.score(), 6);
        assert_eq!(state.path().len(), 5);
    }
    assert_eq!(engine.session_count(), 8);
}

#[test]
fn concurrent_choices_on_one_session_are_serialized() {
    let engine = Arc::new(forest());
    let id = SessionId::new("contended");
    engine.open(Some(&id), 1).unwrap();

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let engine = Arc::clone(&engine);
            let id = id.clone();
            thread::spawn(move || engine.choose(&id, 0, 1).map(|v| v.node_id))
        })
        .collect();
    let mut reached: Vec<String> = handles
        .into_iter()
        .map(|h| h.join().unwrap().unwrap())
        .collect();
    reached.sort();

    assert_eq!(
        reached,
        ["amulet_power", "deep_forest", "grateful_creature", "hidden_treasure"]
    );
    let state = engine.session(&id).unwrap();
    assert_eq!(state.score(), 6);
    assert_eq!(state.path().len(), state.history().len() + 1);
}

#[test]
fn first_contact_open_never_discards_a_choice() {
    let engine = Arc::new(forest());
    for i in 0..200 {
        let id = SessionId::new(format!("race-{}", i));
        let barrier = Arc::new(Barrier::new(2));

        let chooser = {
            let (engine, id, barrier) = (Arc::clone(&engine), id.clone(), Arc::clone(&barrier));
            thread::spawn(move || {
                barrier.wait();
                engine.open(Some(&id), 1).unwrap();
                engine.choose(&id, 0, 1).is_ok()
            })
        };
        let opener = {
            let (engine, id, barrier) = (Arc::clone(&engine), id.clone(), Arc::clone(&barrier));
            thread::spawn(move || {
                barrier.wait();
                engine.open(Some(&id), 1).unwrap();
            })
        };

        let chose = chooser.join().unwrap();
        opener.join().unwrap();
        assert!(chose);
        let state = engine.session(&id).unwrap();
        assert_eq!(state.history().len(), 1, "choice lost for {}", id);
        assert_eq!(state.current_node(), "deep_forest");
    }
    assert_eq!(engine.session_count(), 200);
}

#[test]
fn builtin_story_loads_from_disk_too() {
    let graph = StoryGraph::load_from_ron(std::path::Path::new("story_data/mystic_forest.ron")).unwrap();
    let engine = StoryEngine::builder()
        .with_graph(graph)
        .with_config(EngineConfig::default().with_share_title("From Disk"))
        .build()
        .unwrap();
    assert_eq!(engine.graph().len(), 23);
    assert_eq!(engine.config().share_title, "From Disk");
}
