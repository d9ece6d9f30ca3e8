//! `run` subcommand: replay a scenario script and print the event stream.

use std::path::Path;
use std::sync::atomic::Ordering;
use std::time::Duration;

use super::{RUNNING, Result, RunSummaryJson, Script, kv, kv_width, load_config, sim};
use telltale_lib::events::TimedEvent;

/// Sleep slice while pacing, so Ctrl+C is noticed promptly.
const PACE_SLICE_MS: u64 = 50;

/// Sleep through `from..to` of virtual time. Returns `false` once Ctrl+C was hit.
fn pace_realtime(from_ms: u64, to_ms: u64) -> bool {
    let mut remaining = to_ms.saturating_sub(from_ms);
    while remaining > 0 {
        if !RUNNING.load(Ordering::SeqCst) {
            return false;
        }
        let slice = remaining.min(PACE_SLICE_MS);
        std::thread::sleep(Duration::from_millis(slice));
        remaining -= slice;
    }
    RUNNING.load(Ordering::SeqCst)
}

fn print_event(event: &TimedEvent, json: bool) {
    if json {
        match serde_json::to_string(event) {
            Ok(line) => println!("{line}"),
            Err(e) => log::error!("[engine] cannot serialize event: {e}"),
        }
    } else {
        println!("{:>8} ms  {}", event.at_ms, event.event);
    }
}

pub(super) fn cmd_run(
    script_path: &Path,
    until: Option<u64>,
    realtime: bool,
    json: bool,
    custom_config: Option<&Path>,
) -> Result<()> {
    let config = load_config(custom_config);
    let script = Script::load(script_path)?;
    let until_ms = until.unwrap_or(script.end_ms() + sim::DEFAULT_SETTLE_MS);
    let mut engine = sim::engine_from_config(&config)?;

    log::info!(
        "[engine] {} command(s), {} indicator(s), running to {until_ms} ms",
        script.steps().len(),
        engine.registry().len()
    );

    let sink = |event: &TimedEvent| print_event(event, json);
    let summary = if realtime {
        sim::run(&mut engine, &script, until_ms, pace_realtime, sink)
    } else {
        sim::run(
            &mut engine,
            &script,
            until_ms,
            |_, _| RUNNING.load(Ordering::SeqCst),
            sink,
        )
    };

    if summary.rejected > 0 {
        log::warn!("[engine] {} command(s) rejected", summary.rejected);
    }

    if json {
        let output = RunSummaryJson { summary };
        match serde_json::to_string(&output) {
            Ok(line) => println!("{line}"),
            Err(e) => log::error!("[engine] cannot serialize summary: {e}"),
        }
        return Ok(());
    }

    let w = kv_width(&["Stopped at:", "Commands:", "Rejected:", "Events:"], &[]);
    println!();
    let stopped = if summary.interrupted {
        format!("{} ms (interrupted)", summary.end_ms)
    } else {
        format!("{} ms", summary.end_ms)
    };
    kv("Stopped at:", stopped, w);
    kv("Commands:", summary.commands, w);
    kv("Rejected:", summary.rejected, w);
    kv("Events:", summary.events, w);
    Ok(())
}
