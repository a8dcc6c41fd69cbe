//! End-to-end record and replay scenarios.

use std::sync::Arc;

use proptest::prelude::*;

use delve::core::rng::Seed;
use delve::game::action::{Action, ActorKind};
use delve::game::level::Level;
use delve::game::rules::Rules;
use delve::game::state::{Behavior, Direction, GameState, MonsterId, MonsterTemplate, Player, Position};
use delve::replay::{DebuggerState, Reconstructor, ReplayDebugger, ReplayError, ReplayRecord};
use delve::session::{FileStore, LiveSession, ReplayStore, SaveNotice};
use delve::EngineConfig;

fn reconstructor() -> Reconstructor {
    Reconstructor::new(Arc::new(Rules::default()))
}

/// Play a script live, returning every state the player saw and the record.
fn play_live(initial: GameState, seed: &str, script: &[Action]) -> (Vec<GameState>, ReplayRecord) {
    let (mut live, _notices) = LiveSession::from_state(initial, Seed::from(seed), &EngineConfig::default());
    let mut states = vec![live.state().clone()];
    for action in script {
        states.push(live.dispatch(action.clone()).clone());
    }
    (states, live.finish())
}

fn goblin_room() -> GameState {
    let goblin = MonsterTemplate::named("goblin").unwrap();
    GameState::new(Player::new("Ada", Position::new(5, 5), 16, 900), Level::open_room(14, 10))
        .with_monster(goblin, Position::new(8, 5), Behavior::Guard)
}

/// Goblin already in reach, so every turn draws from the generator.
fn goblin_in_reach() -> GameState {
    let goblin = MonsterTemplate::named("goblin").unwrap();
    GameState::new(Player::new("Ada", Position::new(5, 5), 16, 900), Level::open_room(14, 10))
        .with_monster(goblin, Position::new(6, 5), Behavior::Guard)
}

// =============================================================================
// SCENARIOS
// =============================================================================

#[test]
fn test_move_move_attack_replays_identically() {
    let initial = goblin_room();
    assert_eq!(initial.player.gold, 0);
    let script = [
        Action::step(Direction::Right),
        Action::step(Direction::Right),
        Action::attack(MonsterId(1)),
    ];
    let (live, record) = play_live(initial, "test-seed", &script);
    assert_eq!(live[2].player.position, Position::new(7, 5));
    assert_eq!(record.actions.len(), 3);
    assert_eq!(record.actions[2].action_kind, "ATTACK");
    assert_eq!(record.actions[2].payload["target"], "monster-1");

    let result = reconstructor().reconstruct(record).unwrap();
    assert!(result.is_complete());
    assert!(result.is_trusted());
    assert_eq!(result.states.len(), live.len());
    for (replayed, seen) in result.states.iter().zip(&live) {
        assert_eq!(**replayed, *seen);
    }

    let last = result.final_state().unwrap();
    assert_eq!(last.player.position, Position::new(7, 5));
    assert_eq!(last.player.hp, live[3].player.hp);
    assert_eq!(last.messages, live[3].messages);
    assert!(last.messages.iter().any(|m| m.contains("goblin")));
}

#[test]
fn test_blocked_move_is_recorded_and_replayed() {
    let initial = GameState::new(
        Player::new("Ada", Position::new(5, 5), 16, 900),
        Level::open_room(14, 10).with_wall(Position::new(8, 5)),
    );
    let script = [
        Action::step(Direction::Right),
        Action::step(Direction::Right),
        Action::step(Direction::Right),
        Action::step(Direction::Down),
    ];
    let (live, record) = play_live(initial, "test-seed", &script);

    let turns: Vec<u64> = record.actions.iter().map(|a| a.turn_number).collect();
    assert_eq!(turns, vec![1, 2, 3, 4]);
    assert_eq!(record.actions[2].action_kind, "MOVE");
    assert_eq!(record.actions[2].payload["direction"], "right");

    let result = reconstructor().reconstruct(record).unwrap();
    assert!(result.is_trusted());
    assert_eq!(result.states[3], result.states[2]);
    assert_eq!(result.states[3].player.position, Position::new(7, 5));
    assert_eq!(result.states[4].player.position, Position::new(7, 6));
    assert_eq!(*result.states[4], live[4]);
}

#[test]
fn test_debugger_walks_a_recorded_game() {
    let script = [
        Action::step(Direction::Right),
        Action::step(Direction::Right),
        Action::attack(MonsterId(1)),
    ];
    let (live, record) = play_live(goblin_room(), "test-seed", &script);

    let mut debugger = ReplayDebugger::new(reconstructor());
    let view = debugger.open(record).unwrap();
    assert_eq!(*view.state, live[0]);
    assert_eq!(debugger.state(), DebuggerState::Ready);

    let view = debugger.jump_to(3).unwrap();
    assert_eq!(*view.state, live[3]);
    assert!(!view.has_next);

    let draws = debugger.replay_draws();
    for expected in live[..3].iter().rev() {
        let view = debugger.step_backward().unwrap();
        assert_eq!(*view.state, *expected);
    }
    assert_eq!(debugger.replay_draws(), draws);

    debugger.close();
    assert_eq!(debugger.state(), DebuggerState::Closed);
}

// =============================================================================
// FAILURE MODES
// =============================================================================

#[test]
fn test_truncated_log_is_refused() {
    let (_, mut record) = play_live(goblin_room(), "test-seed", &[Action::Rest, Action::Rest, Action::Rest]);
    record.actions.pop();
    assert!(matches!(reconstructor().reconstruct(record), Err(ReplayError::IncompleteLog(_))));
}

#[test]
fn test_corrupt_snapshot_returns_partial_states() {
    let (_, record) = play_live(goblin_in_reach(), "test-seed", &[Action::Rest, Action::Rest, Action::Rest]);
    assert_ne!(record.actions[0].random_snapshot_before, record.actions[1].random_snapshot_before);
    let good = record.actions[1].random_snapshot_before.clone();
    let bad = good.replacen("/1:", "/7:", 1);
    let text = record.to_json().unwrap().replacen(&good, &bad, 1);

    let loaded = ReplayRecord::from_json(&text).unwrap();
    let result = reconstructor().reconstruct(loaded).unwrap();
    assert_eq!(result.states.len(), 2);
    assert!(matches!(
        result.error,
        Some(ReplayError::RandomStateCorrupt { action_index: 1, turn: 2, .. })
    ));
}

#[test]
fn test_foreign_snapshot_format_in_file_returns_partial_states() {
    let (_, record) = play_live(goblin_in_reach(), "test-seed", &[Action::Rest, Action::Rest, Action::Rest]);
    let good = record.actions[2].random_snapshot_before.clone();
    assert_ne!(record.actions[1].random_snapshot_before, good);
    let bad = good.replacen("xs128p/", "pcg64/", 1);
    let text = record.to_json().unwrap().replacen(&good, &bad, 1);

    let loaded = ReplayRecord::from_json(&text).unwrap();
    let result = reconstructor().reconstruct(loaded).unwrap();
    assert_eq!(result.states.len(), 3);
    assert!(matches!(
        result.error,
        Some(ReplayError::RandomStateCorrupt { action_index: 2, turn: 3, .. })
    ));
}

#[test]
fn test_unknown_kind_in_file_halts_replay() {
    let (_, record) = play_live(goblin_room(), "test-seed", &[Action::Rest, Action::Rest]);
    let text = record.to_json().unwrap().replacen("\"REST\"", "\"CAST_SPELL\"", 1);

    let loaded = ReplayRecord::from_json(&text).unwrap();
    let result = reconstructor().reconstruct(loaded).unwrap();
    assert_eq!(result.states.len(), 1);
    assert_eq!(result.error, Some(ReplayError::UnknownActionKind("CAST_SPELL".into())));
}

#[test]
fn test_json_uses_camel_case_fields() {
    let (_, record) = play_live(goblin_room(), "test-seed", &[Action::step(Direction::Up)]);
    let value: serde_json::Value = serde_json::from_str(&record.to_json().unwrap()).unwrap();
    assert!(value.get("gameId").is_some());
    assert!(value.get("initialState").is_some());
    assert!(value.get("summaryMetadata").is_some());
    let entry = &value["actions"][0];
    assert_eq!(entry["turnNumber"], 1);
    assert_eq!(entry["actionKind"], "MOVE");
    assert_eq!(entry["actorKind"], "player");
    assert!(entry["randomSnapshotBefore"].as_str().unwrap().starts_with("xs128p/1:"));
}

// =============================================================================
// PERSISTENCE
// =============================================================================

#[tokio::test]
async fn test_saved_file_replays_to_live_state() {
    let dir = std::env::temp_dir().join(format!("delve-scenario-{}", uuid::Uuid::new_v4()));
    let store = Arc::new(FileStore::new(&dir));
    let (live, mut notices) = LiveSession::new("Ada", Seed::from("test-seed"), &EngineConfig::default());
    let mut live = live.with_store(store.clone());

    for direction in [Direction::Right, Direction::Down, Direction::Left, Direction::Up] {
        live.dispatch(Action::step(direction));
        live.dispatch(Action::Rest);
    }
    live.dispatch(Action::Save);
    assert!(matches!(notices.recv().await, Some(SaveNotice::Saved { turn: 9, actions: 9, .. })));

    let loaded = store.load(live.game_id()).await.unwrap();
    let result = reconstructor().reconstruct(loaded).unwrap();
    assert!(result.is_trusted());
    assert_eq!(**result.final_state().unwrap(), *live.state());

    tokio::fs::remove_dir_all(&dir).await.ok();
}

// =============================================================================
// PROPERTIES
// =============================================================================

fn any_action() -> impl Strategy<Value = Action> {
    prop_oneof![
        4 => (0..Direction::ALL.len()).prop_map(|i| Action::step(Direction::ALL[i])),
        1 => Just(Action::Rest),
        1 => Just(Action::PickUp),
        1 => Just(Action::Descend),
        1 => (1u32..4).prop_map(|n| Action::attack(MonsterId(n))),
        1 => Just(Action::RevealMap),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_any_game_replays_to_the_same_states(seed in any::<u64>(), script in prop::collection::vec(any_action(), 0..60)) {
        let mut config = EngineConfig::default();
        config.rules.wanderer_interval = 7;
        let (mut live, _notices) = LiveSession::new("Ada", Seed::from(seed), &config);
        for action in &script {
            live.dispatch(action.clone());
        }
        let expected = live.state().clone();
        let record = live.finish();

        // System actions share the player's turn
        for pair in record.actions.windows(2) {
            if pair[1].actor_kind == ActorKind::System {
                prop_assert_eq!(pair[1].turn_number, pair[0].turn_number);
            }
        }

        let result = Reconstructor::new(Arc::new(config.rules.clone())).reconstruct(record).unwrap();
        prop_assert!(result.is_complete());
        prop_assert!(result.is_trusted());
        prop_assert_eq!(&**result.final_state().unwrap(), &expected);
    }
}
