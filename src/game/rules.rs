//! Reference Rule Set
//!
//! Movement, melee, hunger, stairs and wandering monsters.
//!
//! Every function here takes the current state by reference and returns the
//! next state. Randomness comes only from the generator passed in, and
//! monsters always act in id order.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::core::rng::DeterministicRng;
use crate::game::level::generate;
use crate::game::state::{
    Behavior, Direction, GameState, MonsterId, Outcome, Player, Position, BESTIARY,
};

/// Tunable rule constants.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Rules {
    /// Starting and maximum hit points
    pub player_hp: i32,
    /// Starting nutrition
    pub starting_nutrition: u32,
    /// Nutrition spent per world turn
    pub hunger_per_turn: u32,
    /// Nutrition level that triggers the hunger warning
    pub hungry_threshold: u32,
    /// Player hit chance in percent
    pub player_hit_chance: u32,
    /// Player damage range
    pub player_damage: (i32, i32),
    /// Hit points recovered per rest
    pub rest_heal: i32,
    /// Distance at which hunters notice the player
    pub hunt_radius: i32,
    /// World turns between wandering monster spawns (0 disables)
    pub wanderer_interval: u64,
    /// Taking the stairs on this depth wins the game
    pub win_depth: u32,
    /// Generated level width
    pub level_width: i32,
    /// Generated level height
    pub level_height: i32,
    /// Pillar count range
    pub pillars: (i32, i32),
    /// Gold piles per level
    pub gold_piles: u32,
    /// Gold per pile, upper bound scales with depth
    pub gold_amount: (i32, i32),
    /// Base monster count per level
    pub monsters_per_level: u32,
}

impl Default for Rules {
    fn default() -> Self {
        Self {
            player_hp: 16,
            starting_nutrition: 900,
            hunger_per_turn: 1,
            hungry_threshold: 150,
            player_hit_chance: 75,
            player_damage: (2, 5),
            rest_heal: 1,
            hunt_radius: 6,
            wanderer_interval: 25,
            win_depth: 5,
            level_width: 24,
            level_height: 14,
            pillars: (3, 8),
            gold_piles: 3,
            gold_amount: (5, 15),
            monsters_per_level: 2,
        }
    }
}

impl Rules {
    /// Whether the world clock moving from `before` to `after` crossed a
    /// wandering monster spawn point.
    pub fn wanderer_due(&self, before: u64, after: u64) -> bool {
        self.wanderer_interval > 0
            && after > before
            && after / self.wanderer_interval > before / self.wanderer_interval
    }
}

// =============================================================================
// NEW GAME
// =============================================================================

/// Generate depth 1 and place a fresh character on it.
pub fn new_game(name: &str, rules: &Rules, rng: &mut DeterministicRng) -> GameState {
    let generated = generate(1, rules, rng);
    let player = Player::new(name, generated.start, rules.player_hp, rules.starting_nutrition);
    let mut state = GameState::new(player, generated.level);
    for (template, position) in generated.monsters {
        let behavior = pick_behavior(rng);
        state.spawn(template, position, behavior);
    }
    state.say(format!("Welcome, {}, to the dungeon.", name));
    state
}

fn pick_behavior(rng: &mut DeterministicRng) -> Behavior {
    if rng.chance(1, 2) {
        Behavior::Guard
    } else {
        Behavior::Hunt
    }
}

// =============================================================================
// PLAYER ACTIONS
// =============================================================================

/// Step in a direction. Bumping a monster attacks it; bumping a wall does
/// nothing and takes no time.
pub fn move_player(state: &GameState, direction: Direction, rng: &mut DeterministicRng, rules: &Rules) -> GameState {
    let mut next = state.clone();
    if next.is_finished() {
        return next;
    }

    let target = next.player.position.step(direction);
    if let Some(id) = next.monster_at(target).map(|m| m.id) {
        strike(&mut next, id, rng, rules);
        end_turn(&mut next, rng, rules);
        return next;
    }
    if !next.level.is_passable(target) {
        return next;
    }

    next.player.position = target;
    if let Some(&amount) = next.level.gold.get(&target) {
        next.say(format!("You see {} gold pieces here.", amount));
    }
    end_turn(&mut next, rng, rules);
    next
}

/// Melee a specific adjacent monster. Unknown or distant targets are a no-op.
pub fn attack(state: &GameState, target: MonsterId, rng: &mut DeterministicRng, rules: &Rules) -> GameState {
    let mut next = state.clone();
    if next.is_finished() {
        return next;
    }
    let in_reach = next
        .monsters
        .get(&target)
        .map(|m| m.position.is_adjacent(next.player.position))
        .unwrap_or(false);
    if !in_reach {
        return next;
    }

    strike(&mut next, target, rng, rules);
    end_turn(&mut next, rng, rules);
    next
}

/// Pick up gold underfoot.
pub fn pick_up(state: &GameState, rng: &mut DeterministicRng, rules: &Rules) -> GameState {
    let mut next = state.clone();
    if next.is_finished() {
        return next;
    }
    match next.level.gold.remove(&next.player.position) {
        Some(amount) => {
            next.player.gold += amount;
            next.say(format!("You pick up {} gold pieces.", amount));
            end_turn(&mut next, rng, rules);
        }
        None => next.say("There is nothing here to pick up."),
    }
    next
}

/// Take the stairs down. The last staircase ends the run as a win.
pub fn descend(state: &GameState, rng: &mut DeterministicRng, rules: &Rules) -> GameState {
    let mut next = state.clone();
    if next.is_finished() {
        return next;
    }
    if next.level.stairs != Some(next.player.position) {
        next.say("There are no stairs here.");
        return next;
    }

    if next.depth >= rules.win_depth {
        next.outcome = Outcome::Won;
        next.moves += 1;
        next.say(format!("You escape the dungeon with {} gold!", next.player.gold));
        return next;
    }

    next.depth += 1;
    let generated = generate(next.depth, rules, rng);
    next.level = generated.level;
    next.player.position = generated.start;
    next.monsters.clear();
    for (template, position) in generated.monsters {
        let behavior = pick_behavior(rng);
        next.spawn(template, position, behavior);
    }
    next.say(format!("You descend to level {}.", next.depth));
    end_turn(&mut next, rng, rules);
    next
}

/// Wait a turn and recover a little.
pub fn rest(state: &GameState, rng: &mut DeterministicRng, rules: &Rules) -> GameState {
    let mut next = state.clone();
    if next.is_finished() {
        return next;
    }
    next.player.hp = (next.player.hp + rules.rest_heal).min(next.player.max_hp);
    end_turn(&mut next, rng, rules);
    next
}

// =============================================================================
// SYSTEM ACTIONS
// =============================================================================

/// Bring a hunting monster onto the level, out of the player's reach.
pub fn spawn_wanderer(state: &GameState, rng: &mut DeterministicRng) -> GameState {
    let mut next = state.clone();
    if next.is_finished() {
        return next;
    }

    let player = next.player.position;
    let candidates: Vec<Position> = next
        .level
        .floor_cells()
        .into_iter()
        .filter(|p| next.is_free(*p) && p.distance(player) > 3)
        .collect();
    let Some(position) = rng.choose(&candidates).copied() else {
        return next;
    };

    let roster = &BESTIARY[..(next.depth as usize + 1).min(BESTIARY.len())];
    if let Some(template) = rng.choose(roster) {
        next.spawn(template, position, Behavior::Hunt);
        next.say("You hear something moving nearby.");
    }
    next
}

// =============================================================================
// TURN RESOLUTION
// =============================================================================

/// Player melee against one monster.
fn strike(state: &mut GameState, id: MonsterId, rng: &mut DeterministicRng, rules: &Rules) {
    let Some(name) = state.monsters.get(&id).map(|m| m.name.clone()) else {
        return;
    };

    if !rng.chance(rules.player_hit_chance, 100) {
        state.say(format!("You miss the {}.", name));
        return;
    }

    let damage = rng.next_int_range(rules.player_damage.0, rules.player_damage.1);
    let killed = match state.monsters.get_mut(&id) {
        Some(monster) => {
            monster.hp -= damage;
            monster.hp <= 0
        }
        None => return,
    };

    if killed {
        state.monsters.remove(&id);
        state.player.kills += 1;
        state.say(format!("You kill the {}!", name));
    } else {
        state.say(format!("You hit the {} for {}.", name, damage));
    }
}

/// Advance the world clock: monsters act in id order, then hunger.
fn end_turn(state: &mut GameState, rng: &mut DeterministicRng, rules: &Rules) {
    state.moves += 1;
    monster_turns(state, rng, rules);
    if state.player.is_alive() {
        hunger(state, rules);
    }
}

fn monster_turns(state: &mut GameState, rng: &mut DeterministicRng, rules: &Rules) {
    let ids: Vec<MonsterId> = state.monsters.keys().copied().collect();
    for id in ids {
        if !state.player.is_alive() {
            break;
        }
        let Some(monster) = state.monsters.get(&id).cloned() else {
            continue;
        };
        let player = state.player.position;

        if monster.position.is_adjacent(player) {
            if rng.chance(monster.hit_chance, 100) {
                let damage = rng.next_int_range(monster.damage_min, monster.damage_max);
                state.player.hp -= damage;
                state.say(format!("The {} hits you for {}.", monster.name, damage));
                if !state.player.is_alive() {
                    die(state, &monster.name);
                }
            } else {
                state.say(format!("The {} misses you.", monster.name));
            }
            continue;
        }

        if monster.behavior == Behavior::Hunt && monster.position.distance(player) <= rules.hunt_radius {
            let occupied: BTreeSet<Position> = state.monsters.values().map(|m| m.position).collect();
            if let Some(direction) = Direction::toward(monster.position, player) {
                let step = monster.position.step(direction);
                if state.level.is_passable(step) && step != player && !occupied.contains(&step) {
                    if let Some(m) = state.monsters.get_mut(&id) {
                        m.position = step;
                    }
                }
            }
        }
    }
}

fn hunger(state: &mut GameState, rules: &Rules) {
    let before = state.player.nutrition;
    state.player.nutrition = before.saturating_sub(rules.hunger_per_turn);

    if before > rules.hungry_threshold && state.player.nutrition <= rules.hungry_threshold {
        state.say("You are getting hungry.");
    }
    if state.player.nutrition == 0 {
        state.player.hp -= 1;
        state.say("You are starving.");
        if !state.player.is_alive() {
            die(state, "starvation");
        }
    }
}

fn die(state: &mut GameState, cause: &str) {
    state.outcome = Outcome::Died;
    state.say(format!("You die... killed by {}.", cause));
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::level::Level;
    use crate::game::state::MonsterTemplate;

    fn room() -> GameState {
        GameState::new(Player::new("Tester", Position::new(5, 5), 16, 900), Level::open_room(12, 10))
    }

    fn goblin() -> &'static MonsterTemplate {
        MonsterTemplate::named("goblin").unwrap()
    }

    #[test]
    fn test_move_into_open_floor() {
        let state = room();
        let mut rng = DeterministicRng::new(1);
        let next = move_player(&state, Direction::Right, &mut rng, &Rules::default());
        assert_eq!(next.player.position, Position::new(6, 5));
        assert_eq!(next.moves, 1);
        assert_eq!(next.player.nutrition, 899);
    }

    #[test]
    fn test_blocked_move_is_identical_and_draws_nothing() {
        let state = GameState::new(
            Player::new("Tester", Position::new(10, 5), 16, 900),
            Level::open_room(12, 10),
        );
        let mut rng = DeterministicRng::new(1);
        let snap = rng.snapshot();
        let next = move_player(&state, Direction::Right, &mut rng, &Rules::default());
        assert_eq!(next, state);
        assert_eq!(rng.snapshot(), snap);
    }

    #[test]
    fn test_bump_attacks_monster() {
        let state = room().with_monster(goblin(), Position::new(6, 5), Behavior::Guard);
        let mut rng = DeterministicRng::new(3);
        let next = move_player(&state, Direction::Right, &mut rng, &Rules::default());
        assert_eq!(next.player.position, Position::new(5, 5));
        assert!(next.messages[0].contains("goblin"));
    }

    #[test]
    fn test_attack_out_of_reach_is_noop() {
        let state = room().with_monster(goblin(), Position::new(9, 5), Behavior::Guard);
        let mut rng = DeterministicRng::new(3);
        let next = attack(&state, MonsterId(1), &mut rng, &Rules::default());
        assert_eq!(next, state);
    }

    #[test]
    fn test_certain_kill() {
        let rules = Rules {
            player_hit_chance: 100,
            player_damage: (50, 50),
            ..Rules::default()
        };
        let state = room().with_monster(goblin(), Position::new(6, 5), Behavior::Guard);
        let next = attack(&state, MonsterId(1), &mut DeterministicRng::new(9), &rules);
        assert!(next.monsters.is_empty());
        assert_eq!(next.player.kills, 1);
        assert_eq!(next.messages, vec!["You kill the goblin!".to_string()]);
    }

    #[test]
    fn test_hunter_closes_in() {
        let state = room().with_monster(goblin(), Position::new(9, 5), Behavior::Hunt);
        let next = rest(&state, &mut DeterministicRng::new(4), &Rules::default());
        assert_eq!(next.monsters[&MonsterId(1)].position, Position::new(8, 5));
    }

    #[test]
    fn test_guard_holds_position() {
        let state = room().with_monster(goblin(), Position::new(9, 5), Behavior::Guard);
        let next = rest(&state, &mut DeterministicRng::new(4), &Rules::default());
        assert_eq!(next.monsters[&MonsterId(1)].position, Position::new(9, 5));
    }

    #[test]
    fn test_pick_up_gold() {
        let mut state = room();
        state.level = state.level.clone().with_gold(Position::new(5, 5), 12);
        let next = pick_up(&state, &mut DeterministicRng::new(1), &Rules::default());
        assert_eq!(next.player.gold, 12);
        assert!(next.level.gold.is_empty());

        let again = pick_up(&next, &mut DeterministicRng::new(1), &Rules::default());
        assert_eq!(again.player.gold, 12);
        assert_eq!(again.moves, next.moves);
    }

    #[test]
    fn test_starvation_kills() {
        let mut state = room();
        state.player.nutrition = 1;
        state.player.hp = 1;
        let next = rest(&state, &mut DeterministicRng::new(1), &Rules { rest_heal: 0, ..Rules::default() });
        assert_eq!(next.outcome, Outcome::Died);

        // Nothing happens after death
        let after = move_player(&next, Direction::Left, &mut DeterministicRng::new(1), &Rules::default());
        assert_eq!(after, next);
    }

    #[test]
    fn test_descend_regenerates_level() {
        let mut state = room();
        state.level = state.level.clone().with_stairs(Position::new(5, 5));
        let next = descend(&state, &mut DeterministicRng::new(7), &Rules::default());
        assert_eq!(next.depth, 2);
        assert_ne!(next.level, state.level);
    }

    #[test]
    fn test_descend_last_stairs_wins() {
        let mut state = room();
        state.depth = 5;
        state.level = state.level.clone().with_stairs(Position::new(5, 5));
        let next = descend(&state, &mut DeterministicRng::new(7), &Rules::default());
        assert_eq!(next.outcome, Outcome::Won);
    }

    #[test]
    fn test_spawn_wanderer_keeps_distance() {
        let state = room();
        let next = spawn_wanderer(&state, &mut DeterministicRng::new(11));
        let monster = next.monsters.values().next().expect("spawned");
        assert!(monster.position.distance(state.player.position) > 3);
        assert_eq!(monster.behavior, Behavior::Hunt);
    }

    #[test]
    fn test_wanderer_due() {
        let rules = Rules { wanderer_interval: 10, ..Rules::default() };
        assert!(!rules.wanderer_due(8, 9));
        assert!(rules.wanderer_due(9, 10));
        assert!(!rules.wanderer_due(10, 10));
        assert!(!Rules { wanderer_interval: 0, ..Rules::default() }.wanderer_due(9, 10));
    }

    #[test]
    fn test_new_game_is_seeded() {
        let rules = Rules::default();
        let a = new_game("Ada", &rules, &mut DeterministicRng::new(5));
        let b = new_game("Ada", &rules, &mut DeterministicRng::new(5));
        assert_eq!(a, b);
        assert_eq!(a.player.hp, rules.player_hp);
    }
}
