//! Simulated ball exchange
//!
//! Writes a generated request/reply exchange into an interval store from a
//! producer thread and prints every view while it is being written, then
//! once more after the history is closed.
//!
//! Usage:
//!   simulate_exchange [--requesters <count>] [--rounds <count>]
//!
//! Example:
//!   simulate_exchange --requesters 3 --rounds 20

use proc_trace_core::{
    ArrowProvider, EntityProvider, IntervalStore, ProcessingState, ProcessingStatesProvider,
    ProcessingStatisticsProvider, ProgressMonitor, QueryParameters, StatsConfig, StatsProvider,
    StyleRegistry, Timestamp, Value,
};
use std::env;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

const STEP: Timestamp = 1_000_000;

fn parse_flag(args: &[String], name: &str, default: usize) -> usize {
    args.iter()
        .position(|a| a == name)
        .and_then(|i| args.get(i + 1))
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Every round, each requester hands one id to the receiver, which
/// processes a number and replies
fn produce(
    store: &IntervalStore,
    requesters: usize,
    rounds: usize,
) -> proc_trace_core::Result<()> {
    let receiver = store.attribute_or_add(&["Receiver", "r1"])?;
    let mut time = 0;
    for round in 0..rounds {
        for r in 0..requesters {
            let name = format!("R{}", r);
            let id = (round % 4).to_string();
            let requester = store.attribute_or_add(&["Requester", name.as_str()])?;
            let state = store.attribute_or_add(&["Requester", name.as_str(), id.as_str()])?;
            let number =
                store.attribute_or_add(&["Requester", name.as_str(), id.as_str(), "number"])?;

            store.modify_attribute(time, ProcessingState::Initializing.into(), state)?;
            store.modify_attribute(time + STEP, ProcessingState::Processing.into(), requester)?;
            store.modify_attribute(time + 2 * STEP, Value::Text(name.clone()), receiver)?;
            store.modify_attribute(time + 3 * STEP, ProcessingState::Processing.into(), state)?;
            let processed = Value::Long((round * 7 + r) as i64 % 50);
            store.modify_attribute(time + 3 * STEP, processed, number)?;
            store.modify_attribute(time + 5 * STEP, Value::Absent, receiver)?;
            store.modify_attribute(time + 6 * STEP, ProcessingState::Waiting.into(), state)?;
            store.modify_attribute(time + 6 * STEP, ProcessingState::Waiting.into(), requester)?;
            time += 7 * STEP;
            thread::sleep(Duration::from_millis(5));
        }
    }
    store.close_history(time)
}

fn main() {
    let args: Vec<String> = env::args().collect();
    let requesters = parse_flag(&args, "--requesters", 2);
    let rounds = parse_flag(&args, "--rounds", 10);

    let store = Arc::new(IntervalStore::new("simulated", 0));
    let writer = {
        let store = Arc::clone(&store);
        thread::spawn(move || produce(&store, requesters, rounds))
    };

    let styles = Arc::new(StyleRegistry::new());
    let states = ProcessingStatesProvider::new(Arc::clone(&store), styles);
    while !store.is_built() {
        let params = QueryParameters::new().with_time_range(0, store.current_end_time(), 200);
        let arrows = states.fetch_arrows(&params);
        println!(
            "[{:?}] end={} arrows={} unmatched={}",
            arrows.status,
            store.current_end_time(),
            arrows.model.as_ref().map_or(0, |m| m.arrows.len()),
            arrows.model.as_ref().map_or(0, |m| m.misses.len())
        );
        thread::sleep(Duration::from_millis(20));
    }

    match writer.join() {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            eprintln!("Producer failed: {}", e);
            return;
        }
        Err(_) => {
            eprintln!("Producer panicked");
            return;
        }
    }

    println!("\n=== ENTITIES ===");
    let params = QueryParameters::new().with_time_range(0, store.current_end_time(), 500);
    if let Some(tree) = states.fetch_tree(&params).model {
        for entity in &tree.entities {
            println!("{:>4} {:<12} parent={:?}", entity.id, entity.name(), entity.parent_id);
        }
    }

    println!("\n=== STATISTICS ===");
    let stats = ProcessingStatisticsProvider::new(Arc::clone(&store), StatsConfig::new());
    let response = stats.fetch_statistics(&QueryParameters::new(), &ProgressMonitor::new());
    if let Some(report) = response.model {
        for (key, s) in &report.stats {
            println!(
                "{:<8} count={:<4} min={:?} max={:?} mean={:.3}",
                key, s.count, s.min, s.max, s.mean
            );
        }
    }
}
