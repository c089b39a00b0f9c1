use anyhow::Result;
use clap::Parser;
use jouler::{
    cli::Cli,
    config::ProfilerConfig,
    engine::PowerAttributionEngine,
    report::sink_for,
    thread_clock::{OsThreadClock, Tid},
};
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Initialize tracing subscriber: TRACE with --debug, otherwise warnings only
fn init_tracing(debug: bool) {
    let level = if debug {
        tracing::Level::TRACE
    } else {
        tracing::Level::WARN
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.into()))
        .with_writer(std::io::stderr)
        .try_init();
}

fn print_banner(config: &ProfilerConfig, threads: usize) {
    println!("Jouler v{} - per-thread CPU power attribution", env!("CARGO_PKG_VERSION"));
    println!(
        "sampling every {}ms, power rating {}W, output {:?}, {} worker thread(s)",
        config.sampling_interval_ms, config.power_rating_watts, config.output, threads
    );
}

fn fib(n: u32) -> u64 {
    if n < 2 {
        n as u64
    } else {
        fib(n - 1) + fib(n - 2)
    }
}

/// Busy loop of a random length
fn compute(engine: &PowerAttributionEngine) -> u64 {
    let _scope = engine.scope("demo.Worker.compute");
    let rounds = rand::thread_rng().gen_range(50_000..200_000u64);
    let mut acc = 0u64;
    for i in 0..rounds {
        acc = acc.wrapping_mul(6364136223846793005).wrapping_add(i);
    }
    std::hint::black_box(acc)
}

fn pause(engine: &PowerAttributionEngine) {
    let _scope = engine.scope("demo.Worker.pause");
    std::thread::sleep(Duration::from_millis(1));
}

/// One frame per level, each doing a little recursive arithmetic
fn descend(engine: &PowerAttributionEngine, level: u32) -> u64 {
    let _scope = engine.scope("demo.Math.descend");
    let here = fib(level.min(20));
    if level == 0 {
        here
    } else {
        here + descend(engine, level - 1)
    }
}

fn worker(engine: &PowerAttributionEngine, iterations: usize, depth: u32) -> Tid {
    let tid = engine.clock().current_tid();
    let _run = engine.scope("demo.Worker.run");
    for _ in 0..iterations {
        compute(engine);
        pause(engine);
        std::hint::black_box(descend(engine, depth));
    }
    tid
}

fn main() -> Result<()> {
    let args = Cli::parse();

    if args.threads == 0 {
        anyhow::bail!("Invalid value for --threads: 0 (must be >= 1)");
    }

    init_tracing(args.debug);

    let mut config = ProfilerConfig::load(args.config.as_deref())?;
    args.apply_to(&mut config);

    print_banner(&config, args.threads);

    let sink = sink_for(&config);
    let engine = PowerAttributionEngine::new(config, Arc::new(OsThreadClock::new()), sink)?;

    let (iterations, depth) = (args.iterations, args.depth);
    let shared = &engine;
    let tids: Vec<Tid> = std::thread::scope(|s| {
        let handles: Vec<_> = (0..args.threads)
            .map(|_| s.spawn(move || worker(shared, iterations, depth)))
            .collect();
        handles.into_iter().filter_map(|h| h.join().ok()).collect()
    });

    for tid in &tids {
        match engine.get_thread_cpu_power(*tid) {
            Some(power) => println!("thread {}: {:.6} W", tid, power),
            None => println!("thread {}: no power estimate", tid),
        }
    }

    engine.shutdown();
    println!("Jouler finished: {} thread(s) profiled", tids.len());
    Ok(())
}
