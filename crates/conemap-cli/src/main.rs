//! `conemap` – replay a recorded range-sensor log through one layer.
//!
//! ```text
//! conemap replay <config.toml> <readings.jsonl>
//! ```
//!
//! 1. Installs tracing (`RUST_LOG`, `CONEMAP_LOG_FORMAT`, optional OTLP).
//! 2. Loads the TOML config and builds the static frame graph.
//! 3. A tokio task streams the JSON-lines log into the layer's buffer; each
//!    line is `{"range": {...}}` or `{"scan": {...}}`.
//! 4. Update cycles run at `map.update_frequency` until the log is exhausted
//!    and the buffer is empty, or until Ctrl-C.
//! 5. Prints the shared map and a summary.

mod config;
mod render;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use colored::Colorize;
use conemap_middleware::{ReadingBuffer, ScanSlot};
use conemap_perception::bounds::Bounds;
use conemap_perception::costmap::{FREE_SPACE, LETHAL_OBSTACLE, NO_INFORMATION, ObstacleMap};
use conemap_perception::transform::TfEngine;
use conemap_runtime::{CycleReport, RangeSensorLayer, init_tracing};
use conemap_types::{LaserScan, RangeReading};
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};

use crate::config::{MapSettings, ReplayConfig};

/// Widest map rendering, in characters.
const RENDER_COLUMNS: u32 = 100;

/// One line of the replay log.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
enum LogRecord {
    Range(RangeReading),
    Scan(LaserScan),
}

/// What the producer read from the log.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct FeedStats {
    ranges: usize,
    scans: usize,
    invalid: usize,
}

fn main() -> ExitCode {
    let _guard = init_tracing("conemap");

    let args: Vec<String> = std::env::args().skip(1).collect();
    let (config_path, log_path) = match args.as_slice() {
        [cmd, config, log] if cmd == "replay" => (PathBuf::from(config), PathBuf::from(log)),
        [cmd, ..] if cmd == "help" || cmd == "--help" || cmd == "-h" => {
            print_usage();
            return ExitCode::SUCCESS;
        }
        _ => {
            print_usage();
            return ExitCode::from(2);
        }
    };

    let cfg = match config::load_from(&config_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            println!("{}: {}", "Config error".red(), e);
            return ExitCode::FAILURE;
        }
    };

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            println!("{}: {}", "Failed to start runtime".red(), e);
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(replay(cfg, &log_path)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            println!("{}: {}", "Replay failed".red(), e);
            ExitCode::FAILURE
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Replay
// ─────────────────────────────────────────────────────────────────────────────

async fn replay(cfg: ReplayConfig, log_path: &Path) -> Result<(), String> {
    let frames = cfg.build_transforms();
    let robot = robot_position(&frames, &cfg.map);
    let mut master = centred_master(&cfg.map, robot);

    let mut layer = RangeSensorLayer::new(cfg.layer.clone(), cfg.map.global_frame.clone(), frames, &master)
        .map_err(|e| format!("layer rejected its settings: {e}"))?;
    let buffer = layer.buffer();

    let file = tokio::fs::File::open(log_path)
        .await
        .map_err(|e| format!("Failed to open log at {}: {}", log_path.display(), e))?;
    let mut producer = tokio::spawn(feed(BufReader::new(file), buffer.clone(), layer.scan_slot()));

    info!(
        log = %log_path.display(),
        period_ms = cfg.map.cycle_period().as_millis() as u64,
        rolling_window = cfg.map.rolling_window,
        "replay started"
    );

    let mut ticker = tokio::time::interval(cfg.map.cycle_period());
    let mut ctrl_c = std::pin::pin!(tokio::signal::ctrl_c());
    let mut ctrl_c_armed = true;
    let mut feed_stats: Option<FeedStats> = None;
    let mut totals = CycleReport::default();
    let mut cycles = 0usize;
    let mut interrupted = false;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let report = run_cycle(&mut layer, &mut master, &cfg.map, robot);
                accumulate(&mut totals, &report);
                cycles += 1;
                if feed_stats.is_some() && buffer.is_empty() {
                    break;
                }
            }
            joined = &mut producer, if feed_stats.is_none() => {
                feed_stats = Some(match joined {
                    Ok(Ok(stats)) => stats,
                    Ok(Err(e)) => {
                        error!(error = %e, "reading the replay log failed; finishing with what arrived");
                        FeedStats::default()
                    }
                    Err(e) => {
                        error!(error = %e, "replay producer task failed");
                        FeedStats::default()
                    }
                });
            }
            signal = &mut ctrl_c, if ctrl_c_armed => {
                match signal {
                    Ok(()) => {
                        println!();
                        println!("{}", "⚠  Ctrl-C received – stopping replay …".yellow().bold());
                        interrupted = true;
                        break;
                    }
                    Err(e) => {
                        warn!(error = %e, "Failed to listen for Ctrl-C; replay runs to the end of the log");
                        ctrl_c_armed = false;
                    }
                }
            }
        }
    }

    if feed_stats.is_none() {
        producer.abort();
    }

    println!();
    render::print_map(&master, RENDER_COLUMNS);
    print_summary(&master, &totals, cycles, feed_stats, interrupted, layer.is_current());
    Ok(())
}

/// Stream log lines into the layer's hand-off points.
async fn feed<R>(reader: R, buffer: ReadingBuffer, scans: ScanSlot) -> std::io::Result<FeedStats>
where
    R: tokio::io::AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut stats = FeedStats::default();
    let mut line_no = 0usize;

    while let Some(line) = lines.next_line().await? {
        line_no += 1;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<LogRecord>(&line) {
            Ok(LogRecord::Range(reading)) => {
                buffer.push(reading);
                stats.ranges += 1;
            }
            Ok(LogRecord::Scan(scan)) => {
                scans.publish(scan);
                stats.scans += 1;
            }
            Err(e) => {
                warn!(line = line_no, error = %e, "skipping invalid log line");
                stats.invalid += 1;
            }
        }
        // Let the cycle interleave with a long log.
        tokio::task::yield_now().await;
    }

    Ok(stats)
}

fn run_cycle(
    layer: &mut RangeSensorLayer<TfEngine>,
    master: &mut ObstacleMap,
    map: &MapSettings,
    robot: (f64, f64),
) -> CycleReport {
    let mut bounds = Bounds::empty();
    let report = layer.update_bounds(robot.0, robot.1, map.rolling_window, &mut bounds);
    if bounds.is_empty() {
        return report;
    }

    let (min_i, min_j, max_i, max_j) = master.cell_window(bounds.min_x, bounds.min_y, bounds.max_x, bounds.max_y);
    if let Err(e) = layer.update_costs(master, min_i, min_j, max_i, max_j) {
        error!(error = %e, "merge into the shared map failed");
    }
    report
}

fn accumulate(totals: &mut CycleReport, report: &CycleReport) {
    totals.accepted += report.accepted;
    totals.dropped += report.dropped;
    totals.malformed += report.malformed;
    totals.untransformable += report.untransformable;
    totals.cells_updated += report.cells_updated;
}

// ─────────────────────────────────────────────────────────────────────────────
// Map placement
// ─────────────────────────────────────────────────────────────────────────────

/// Robot position in the global frame; only consulted for rolling windows.
/// Frames are static, so one lookup holds for the whole replay.
fn robot_position(frames: &TfEngine, map: &MapSettings) -> (f64, f64) {
    if !map.rolling_window {
        return (0.0, 0.0);
    }
    match frames.lookup(&map.global_frame, &map.robot_frame) {
        Some(pose) => (pose.translation.x, pose.translation.y),
        None => {
            warn!(
                global_frame = %map.global_frame,
                robot_frame = %map.robot_frame,
                "robot frame not reachable; centring the rolling window on the global origin"
            );
            (0.0, 0.0)
        }
    }
}

/// The shared map, re-centred on the robot when the window rolls.
fn centred_master(map: &MapSettings, robot: (f64, f64)) -> ObstacleMap {
    if !map.rolling_window {
        return map.build_master();
    }
    let half_x = f64::from(map.size_x) * map.resolution / 2.0;
    let half_y = f64::from(map.size_y) * map.resolution / 2.0;
    ObstacleMap::new(map.size_x, map.size_y, map.resolution, robot.0 - half_x, robot.1 - half_y)
}

// ─────────────────────────────────────────────────────────────────────────────
// Output
// ─────────────────────────────────────────────────────────────────────────────

fn print_summary(
    master: &ObstacleMap,
    totals: &CycleReport,
    cycles: usize,
    feed: Option<FeedStats>,
    interrupted: bool,
    current: bool,
) {
    let status = if interrupted {
        "interrupted".yellow()
    } else {
        "complete".green()
    };
    println!();
    println!("  Replay {} after {} cycle(s)", status.bold(), cycles);
    if let Some(feed) = feed {
        println!(
            "  Log:       {} range, {} scan, {} invalid line(s)",
            feed.ranges, feed.scans, feed.invalid
        );
    }
    println!(
        "  Readings:  {} fused, {} dropped, {} malformed, {} untransformable",
        totals.accepted.to_string().bold(),
        totals.dropped,
        totals.malformed,
        totals.untransformable
    );
    println!("  Updates:   {} cell update(s)", totals.cells_updated);
    println!(
        "  Map:       {} obstacle, {} free, {} unknown",
        master.count(LETHAL_OBSTACLE).to_string().red(),
        master.count(FREE_SPACE).to_string().green(),
        master.count(NO_INFORMATION)
    );
    let freshness = if current { "current".green() } else { "stale".yellow() };
    println!("  Layer:     {}", freshness);
    println!();
}

fn print_usage() {
    println!("{} {}", "conemap".bold(), format!("v{}", env!("CARGO_PKG_VERSION")).dimmed());
    println!();
    println!("  Usage: {} <config.toml> <readings.jsonl>", "conemap replay".bold().cyan());
    println!();
    println!("  Each log line is one JSON object:");
    println!("    {}", r#"{"range": {"frame_id": "sonar", "stamp": "...", "range": 1.2, ...}}"#.dimmed());
    println!("    {}", r#"{"scan": {"stamp": "...", "ranges": [1.0, "inf", ...]}}"#.dimmed());
}
