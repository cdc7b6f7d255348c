//! Headless Turn Runner
//!
//! Plays a seeded skirmish against the in-process battlefield and prints one
//! JSON line per coordination pass, followed by the performance report.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::Serialize;

use skirmish_ai::battlefield::{BattlefieldSnapshot, UnitAttributes, UnitView};
use skirmish_ai::controller::SkillLevel;
use skirmish_ai::coordinator::{Coordinator, PerformanceReport, TurnResult};
use skirmish_ai::core::{EngineConfig, EngineError, GridSize, Position, Result, TeamId, UnitId};
use skirmish_ai::llm::LlmClient;
use skirmish_ai::strategy::Archetype;
use skirmish_ai::tools::{LocalBattlefield, TurnResolution};

/// Headless Turn Runner - AI-controlled side against a stationary opponent
#[derive(Parser, Debug)]
#[command(name = "turn_runner")]
#[command(about = "Run coordination passes against a local battlefield and report timings")]
struct Args {
    /// Units on the controlled side
    #[arg(long, default_value_t = 4)]
    allies: u32,

    /// Units on the opposing side
    #[arg(long, default_value_t = 4)]
    enemies: u32,

    /// Turns to play before stopping
    #[arg(long, default_value_t = 10)]
    turns: u32,

    /// Archetype for every controlled unit
    #[arg(long, default_value = "tactical")]
    archetype: String,

    /// Skill level for every controlled unit
    #[arg(long, default_value = "strategic")]
    skill: String,

    /// Random seed for deterministic layouts
    #[arg(long)]
    seed: Option<u64>,

    /// TOML file overriding engine defaults
    #[arg(long)]
    config: Option<PathBuf>,

    /// Make every state read fail, to exercise the degraded path
    #[arg(long)]
    fail_state: bool,

    /// Ask the reasoning backend (LLM_API_KEY, LLM_API_URL, LLM_MODEL) to explain executed actions
    #[arg(long)]
    narrate: bool,

    /// Output format: json or text
    #[arg(long, default_value = "json")]
    format: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TurnLine<'a> {
    turn: u32,
    result: &'a TurnResult,
    resolution: &'a TurnResolution,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Summary {
    seed: u64,
    turns_played: u32,
    allies_alive: usize,
    enemies_alive: usize,
    report: PerformanceReport,
}

const ALLY_TEAM: TeamId = TeamId(0);
const ENEMY_TEAM: TeamId = TeamId(1);
const ENEMY_ID_OFFSET: u32 = 1000;

fn random_unit(rng: &mut ChaCha8Rng, id: UnitId, team: TeamId, position: Position) -> UnitView {
    let max_hp = rng.gen_range(40..=70);
    UnitView::new(id, team, position)
        .with_hp(max_hp, max_hp)
        .with_attributes(UnitAttributes {
            attack: rng.gen_range(8..=14),
            defense: rng.gen_range(3..=8),
            move_range: rng.gen_range(2..=4),
            attack_range: if rng.gen_bool(0.25) { 3 } else { 1 },
        })
}

/// Allies start in the two left columns, enemies in the two right ones
fn generate_battlefield(rng: &mut ChaCha8Rng, allies: u32, enemies: u32) -> BattlefieldSnapshot {
    let height = allies.max(enemies).max(4) as i32 * 2;
    let width = 16;
    let mut left: Vec<Position> = (0..height).flat_map(|y| [Position::new(0, y), Position::new(1, y)]).collect();
    let mut right: Vec<Position> = (0..height)
        .flat_map(|y| [Position::new(width - 1, y), Position::new(width - 2, y)])
        .collect();
    left.shuffle(rng);
    right.shuffle(rng);

    let mut units = Vec::new();
    for (i, pos) in left.into_iter().take(allies as usize).enumerate() {
        units.push(random_unit(rng, UnitId(i as u32 + 1), ALLY_TEAM, pos));
    }
    for (i, pos) in right.into_iter().take(enemies as usize).enumerate() {
        units.push(random_unit(rng, UnitId(ENEMY_ID_OFFSET + i as u32), ENEMY_TEAM, pos));
    }
    BattlefieldSnapshot::new(units, GridSize::new(width as u32, height as u32), 1)
}

fn print_text(turn: u32, result: &TurnResult, resolution: &TurnResolution) {
    println!(
        "turn {turn}: {} units in {:.1} ms (quality {:.2}), {} moves, {} attacks, {} defeated",
        result.len(),
        result.timing_ms,
        result.coordination_quality,
        resolution.moves_applied,
        resolution.attacks_applied,
        resolution.units_defeated,
    );
    for (unit, entry) in &result.per_unit_actions {
        println!("  unit {unit}: {:?} via {} - {}", entry.action.kind, entry.source, entry.action.rationale);
    }
    for warning in &result.warnings {
        println!("  warning: {warning}");
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("skirmish_ai=info")),
        )
        .init();

    let args = Args::parse();
    let json = match args.format.as_str() {
        "json" => true,
        "text" => false,
        other => return Err(EngineError::Config(format!("unknown output format '{other}'"))),
    };
    let archetype: Archetype = args.archetype.parse()?;
    let skill: SkillLevel = args.skill.parse()?;
    let mut config = match &args.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };
    config.coordinator.narrate |= args.narrate;

    let seed = args.seed.unwrap_or_else(rand::random);
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let snapshot = generate_battlefield(&mut rng, args.allies, args.enemies);
    let field = Arc::new(LocalBattlefield::with_damage(snapshot, config.damage.clone()));
    field.set_fail_state(args.fail_state);

    let narrate = config.coordinator.narrate;
    let mut coordinator = Coordinator::new(config, field.clone())?;
    if narrate {
        coordinator = coordinator.with_reasoning(Arc::new(LlmClient::from_env()?));
    }
    let controlled: Vec<UnitId> = (1..=args.allies).map(UnitId).collect();
    for &unit in &controlled {
        coordinator.configure_unit(unit, archetype, skill);
    }
    tracing::info!(seed, allies = args.allies, enemies = args.enemies, "Starting skirmish");

    let mut turns_played = 0;
    for turn in 1..=args.turns {
        let state = field.snapshot();
        let alive: Vec<UnitId> = controlled
            .iter()
            .copied()
            .filter(|id| state.unit(*id).is_some_and(|u| u.is_alive()))
            .collect();
        if alive.is_empty() || state.enemies_of(ALLY_TEAM).next().is_none() {
            break;
        }

        let result = coordinator.execute_turn(&alive).await;
        let resolution = field.advance_turn();
        turns_played = turn;
        if json {
            println!(
                "{}",
                serde_json::to_string(&TurnLine {
                    turn,
                    result: &result,
                    resolution: &resolution,
                })?
            );
        } else {
            print_text(turn, &result, &resolution);
            for unit in result.per_unit_actions.keys() {
                if let Some(text) = coordinator.narration(*unit) {
                    println!("  unit {unit} latest rationale: {text}");
                }
            }
        }
    }

    let state = field.snapshot();
    let summary = Summary {
        seed,
        turns_played,
        allies_alive: state.allies_of(ALLY_TEAM).count(),
        enemies_alive: state.enemies_of(ALLY_TEAM).count(),
        report: coordinator.get_performance_report(),
    };
    if json {
        println!("{}", serde_json::to_string(&summary)?);
    } else {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    }
    Ok(())
}
