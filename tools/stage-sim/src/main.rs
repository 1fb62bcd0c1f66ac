mod player;

use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{bail, Result};
use clap::Parser;
use fantasia_domain::{EngineEvent, SessionClock, StageConfig, StageLoader, StageRecord};
use fantasia_engine::{input_channel, GameSession, InputQueue, MidiBridge, MidiManager};
use serde::Serialize;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::player::AutoPlayer;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Play a stage with a scripted player and print the event stream"
)]
struct Args {
    /// Stage file (.json, .yaml or .yml)
    stage: Option<PathBuf>,
    /// Spacing between clock ticks in milliseconds
    #[arg(long, default_value_t = 16.0)]
    tick_ms: f64,
    /// Play each chord this many ms after its nominal time
    #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
    offset_ms: f64,
    /// Sit out every Nth target
    #[arg(long)]
    miss_every: Option<usize>,
    /// Give up after this much raw time
    #[arg(long, default_value_t = 300_000.0)]
    max_ms: f64,
    /// Pace ticks against the wall clock instead of simulated time
    #[arg(long)]
    realtime: bool,
    /// Take notes from this MIDI input port instead of the scripted player (implies --realtime)
    #[arg(long)]
    midi: Option<String>,
    /// List MIDI input ports and exit
    #[arg(long)]
    list_midi: bool,
}

#[derive(Serialize)]
struct EventLine<'a> {
    t_ms: f64,
    #[serde(flatten)]
    event: &'a EngineEvent,
}

fn emit(now_ms: f64, events: &[EngineEvent]) -> Result<()> {
    for event in events {
        println!("{}", serde_json::to_string(&EventLine { t_ms: now_ms, event })?);
    }
    Ok(())
}

fn simulate(session: &mut GameSession, player: &mut AutoPlayer, args: &Args) -> Result<()> {
    emit(0.0, &session.start(0.0))?;
    let mut now = 0.0;
    while !session.phase().is_terminal() && now <= args.max_ms {
        let inputs = player.respond(session, now);
        emit(now, &session.update(now, inputs))?;
        now += args.tick_ms;
    }
    Ok(())
}

async fn run_realtime(
    session: &mut GameSession,
    mut player: Option<AutoPlayer>,
    mut queue: Option<InputQueue>,
    clock: SessionClock,
    args: &Args,
) -> Result<()> {
    let mut ticker = tokio::time::interval(Duration::from_secs_f64(args.tick_ms / 1000.0));
    emit(0.0, &session.start(clock.elapsed_ms()))?;
    loop {
        ticker.tick().await;
        let now = clock.elapsed_ms();
        if session.phase().is_terminal() || now > args.max_ms {
            break;
        }
        let mut inputs = queue.as_mut().map(InputQueue::drain).unwrap_or_default();
        if let Some(player) = player.as_mut() {
            inputs.extend(player.respond(session, now));
        }
        emit(now, &session.update(now, inputs))?;
    }
    Ok(())
}

fn load_stage(args: &Args) -> Result<StageConfig> {
    let Some(path) = args.stage.as_ref() else {
        bail!("a stage file is required");
    };
    let stage = StageLoader::load(path)?;
    info!(stage = %stage.id, title = %stage.title, mode = ?stage.mode, "loaded stage");
    Ok(stage)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    if args.list_midi {
        for device in MidiManager::list_inputs()? {
            println!("{}", device.name);
        }
        return Ok(());
    }
    if args.tick_ms <= 0.0 {
        bail!("tick interval must be positive");
    }

    let stage = load_stage(&args)?;
    let mut session = GameSession::new(&stage)?;
    let player = AutoPlayer::new(args.offset_ms, args.miss_every);

    if let Some(port) = args.midi.as_deref() {
        let clock = SessionClock::with_origin(Instant::now(), 0.0);
        let (sender, queue) = input_channel(256);
        let bridge = MidiBridge::connect(port, sender, clock)?;
        info!(port = bridge.port(), "playing from midi");
        run_realtime(&mut session, None, Some(queue), clock, &args).await?;
    } else if args.realtime {
        let clock = SessionClock::with_origin(Instant::now(), 0.0);
        run_realtime(&mut session, Some(player), None, clock, &args).await?;
    } else {
        let mut player = player;
        simulate(&mut session, &mut player, &args)?;
    }

    let Some(analytics) = session.analytics() else {
        warn!(phase = ?session.phase(), "stage did not finish before the time limit");
        session.stop();
        println!("{}", serde_json::to_string_pretty(&session.snapshot())?);
        return Ok(());
    };
    let mut record = StageRecord::new(stage.id.clone());
    analytics.update_record(&mut record);
    println!("{}", serde_json::to_string_pretty(&analytics)?);
    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({
            "record": record,
            "unlocks_next": record.unlocks_next(stage.required_clears_for_next),
        }))?
    );
    Ok(())
}
