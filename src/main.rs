//! Delve CLI
//!
//! Play a scripted game, then verify or step through saved replays.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use delve::{
    core::rng::{DeterministicRng, Seed},
    game::{
        action::Action,
        state::{Direction, GameState},
    },
    replay::{DebuggerView, Reconstructor, ReplayDebugger},
    session::{FileStore, LiveSession, SaveNotice},
    EngineConfig, VERSION,
};

#[derive(Parser, Debug)]
#[command(name = "delve")]
#[command(about = "Record, replay and inspect deterministic dungeon runs", long_about = None)]
struct Args {
    /// Engine config file (JSON)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Play a scripted game, save it and verify its replay
    Play {
        /// Session seed (number or text)
        #[arg(short, long, default_value = "42")]
        seed: String,

        /// Player turns to play
        #[arg(short, long, default_value = "200")]
        turns: u64,

        /// Character name
        #[arg(short, long, default_value = "Rogue")]
        name: String,

        /// Save directory (defaults to the configured one)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Reconstruct a saved replay and check its checkpoints
    Verify {
        /// Replay file
        file: PathBuf,
    },

    /// Show the state of a saved replay at one cursor position
    Inspect {
        /// Replay file
        file: PathBuf,

        /// Cursor position (actions applied)
        #[arg(short, long, default_value = "0")]
        turn: usize,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    let default_level = if args.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber).context("failed to set tracing subscriber")?;

    let config = match &args.config {
        Some(path) => EngineConfig::from_file(path)?,
        None => EngineConfig::default(),
    };
    info!("Delve v{}", VERSION);

    match args.command {
        Command::Play { seed, turns, name, out } => {
            let dir = out.unwrap_or_else(|| config.save_dir.clone());
            play(&config, Seed::from(seed.as_str()), turns, &name, dir).await
        }
        Command::Verify { file } => verify(&config, &file).await,
        Command::Inspect { file, turn } => inspect(&config, &file, turn).await,
    }
}

/// Stand-in player: fights what is adjacent, grabs gold, takes stairs,
/// otherwise wanders. Draws from its own generator, never the session's.
fn choose_action(state: &GameState, policy: &mut DeterministicRng) -> Action {
    let here = state.player.position;
    if let Some(monster) = state.monsters.values().find(|m| m.position.is_adjacent(here)) {
        return Action::attack(monster.id);
    }
    if state.level.gold.contains_key(&here) {
        return Action::PickUp;
    }
    if state.level.stairs == Some(here) {
        return Action::Descend;
    }
    if let Some(direction) = state.level.stairs.and_then(|stairs| Direction::toward(here, stairs)) {
        if policy.chance(2, 3) {
            return Action::step(direction);
        }
    }
    match policy.choose(&Direction::ALL) {
        Some(direction) => Action::step(*direction),
        None => Action::Rest,
    }
}

async fn play(config: &EngineConfig, seed: Seed, turns: u64, name: &str, dir: PathBuf) -> anyhow::Result<()> {
    info!("=== Playing {} turns, seed {} ===", turns, seed);
    let store = Arc::new(FileStore::new(&dir));
    let (session, mut notices) = LiveSession::new(name, seed.clone(), config);
    let mut session = session.with_store(store.clone());
    let mut policy = DeterministicRng::new(seed.to_u64() ^ 0x9e37_79b9_7f4a_7c15);

    while session.turn() < turns && !session.state().is_finished() {
        let action = choose_action(session.state(), &mut policy);
        session.dispatch(action);
    }
    session.dispatch(Action::Save);
    let final_turn = session.turn();

    // Autosaves may report first
    loop {
        match notices.recv().await {
            Some(SaveNotice::Saved { turn, .. }) if turn == final_turn => break,
            Some(SaveNotice::Saved { .. }) => continue,
            Some(other) => bail!("save did not complete: {:?}", other),
            None => bail!("save notice channel closed"),
        }
    }

    let live_final = session.state().clone();
    let record = session.finish();
    let path = store.path_for(record.game_id);
    info!(
        "Saved {} actions over {} turns to {}",
        record.actions.len(),
        final_turn,
        path.display()
    );
    info!(
        "Outcome: {:?} on depth {} with {} gold, {} kills",
        live_final.outcome, live_final.depth, live_final.player.gold, live_final.player.kills
    );

    info!("=== Verifying Determinism ===");
    let result = Reconstructor::from_config(config).with_horizon(None).reconstruct(record)?;
    if let Some(e) = &result.error {
        bail!("replay halted: {}", e);
    }
    let replayed = result.final_state().context("replay produced no states")?;
    let live_hash = live_final.digest()?;
    let replay_hash = replayed.digest()?;
    info!("Live State Hash:   {}", live_hash);
    info!("Replay State Hash: {}", replay_hash);

    if live_hash == replay_hash && result.is_trusted() {
        info!("DETERMINISM VERIFIED: Hashes match!");
        Ok(())
    } else {
        bail!("DETERMINISM FAILURE: {} checkpoint mismatches", result.violations.len())
    }
}

async fn verify(config: &EngineConfig, file: &Path) -> anyhow::Result<()> {
    let record = FileStore::read_file(file)
        .await
        .with_context(|| format!("cannot load {}", file.display()))?;
    info!(
        "Replay {}: {} actions, {} turns, {} checkpoints",
        record.game_id,
        record.actions.len(),
        record.summary_metadata.turn_count,
        record.checkpoints.len()
    );

    let result = Reconstructor::from_config(config).reconstruct(record)?;
    for violation in &result.violations {
        warn!("{}", violation);
    }
    if let Some(e) = &result.error {
        bail!("replay halted after {} actions: {}", result.actions_applied(), e);
    }
    if result.truncated {
        warn!("stopped at the configured horizon after {} actions", result.actions_applied());
    }
    if !result.is_trusted() {
        bail!("{} checkpoint mismatches, replay is untrusted", result.violations.len());
    }

    info!("Replay verified: {} actions applied", result.actions_applied());
    Ok(())
}

async fn inspect(config: &EngineConfig, file: &Path, turn: usize) -> anyhow::Result<()> {
    let record = FileStore::read_file(file)
        .await
        .with_context(|| format!("cannot load {}", file.display()))?;
    let mut debugger = ReplayDebugger::new(Reconstructor::from_config(config));
    debugger.open(record)?;
    let view = debugger.jump_to(turn)?;
    print_view(&view);
    debugger.close();
    Ok(())
}

fn print_view(view: &DebuggerView) {
    let state = &view.state;
    let player = &state.player;
    println!("cursor {} (turn {})", view.turn, view.turn_number);
    println!(
        "{} at {} hp {}/{} gold {} nutrition {} depth {} moves {}",
        player.name, player.position, player.hp, player.max_hp, player.gold, player.nutrition, state.depth, state.moves
    );
    for monster in state.monsters.values() {
        println!("  {} {} at {} hp {}", monster.id, monster.name, monster.position, monster.hp);
    }
    let recent = state.messages.len().saturating_sub(5);
    for message in &state.messages[recent..] {
        println!("  > {}", message);
    }
    if !view.trusted {
        println!("warning: checksum mismatch seen, replay untrusted");
    }
}
