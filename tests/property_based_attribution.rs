//! Property-based tests for attribution math and call nesting
//!
//! Core properties tested:
//! 1. Proportional allocation sums to the thread power
//! 2. Zero total CPU time attributes zero power everywhere
//! 3. Thread power is never negative or non-finite
//! 4. Well-nested call sequences empty the stack exactly once
//! 5. Timer elapsed time excludes suspended intervals

use jouler::config::ProfilerConfig;
use jouler::engine::PowerAttributionEngine;
use jouler::report::CollectingSink;
use jouler::statistics::{attribute_power, power_share, thread_power, MethodStatistics};
use jouler::thread_clock::{ManualThreadClock, ThreadTimes};
use jouler::timer::Timer;
use proptest::prelude::*;
use std::collections::HashMap;
use std::sync::Arc;

fn stats_from(cpu: &[u64]) -> HashMap<String, MethodStatistics> {
    cpu.iter()
        .enumerate()
        .map(|(i, c)| {
            let name = format!("m{}", i);
            let mut s = MethodStatistics::new(name.clone(), 1);
            s.add_time(1);
            s.add_cpu_time(*c);
            (name, s)
        })
        .collect()
}

/// Well-nested enter/exit sequence: `true` = enter, `false` = exit
fn nested_sequence() -> impl Strategy<Value = Vec<bool>> {
    prop::collection::vec(any::<bool>(), 0..60).prop_map(|raw| {
        let mut seq = vec![true];
        let mut depth = 1usize;
        for enter in raw {
            if enter {
                seq.push(true);
                depth += 1;
            } else if depth > 1 {
                seq.push(false);
                depth -= 1;
            }
        }
        seq.extend(std::iter::repeat(false).take(depth));
        seq
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn prop_allocation_sums_to_thread_power(
        cpu in prop::collection::vec(0u64..1_000_000_000, 1..20),
        power in 0.0f64..1_000.0,
    ) {
        let mut stats = stats_from(&cpu);
        let total = attribute_power(&mut stats, power);
        let sum: f64 = stats.values().map(|s| s.attributed_power).sum();

        if total > 0 {
            prop_assert!((sum - power).abs() <= 1e-9 * power.max(1.0));
        } else {
            prop_assert!(stats.values().all(|s| s.attributed_power == 0.0));
        }
        prop_assert!(stats.values().all(|s| s.attributed_power >= 0.0));
    }

    #[test]
    fn prop_equal_cpu_gets_equal_power(
        cpu in 1u64..1_000_000,
        copies in 2usize..8,
        power in 0.0f64..100.0,
    ) {
        let mut stats = stats_from(&vec![cpu; copies]);
        attribute_power(&mut stats, power);
        let first = stats["m0"].attributed_power;
        prop_assert!(stats.values().all(|s| s.attributed_power == first));
    }

    #[test]
    fn prop_zero_total_is_zero_share(cpu in 0u64..1_000, power in 0.0f64..100.0) {
        prop_assert_eq!(power_share(cpu, 0, power), 0.0);
    }

    #[test]
    fn prop_thread_power_non_negative_and_finite(
        rating in -10.0f64..100.0,
        cpu in any::<u64>(),
        cycle in any::<u64>(),
    ) {
        let p = thread_power(rating, cpu, cycle);
        prop_assert!(p.is_finite());
        prop_assert!(p >= 0.0);
        if cycle == 0 {
            prop_assert_eq!(p, 0.0);
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(50))]

    #[test]
    fn prop_nested_calls_empty_stack_once(seq in nested_sequence(), cpu_step in 0u64..10_000) {
        let clock = Arc::new(ManualThreadClock::new());
        clock.set(1, ThreadTimes::new(0, 0));
        let sink = Arc::new(CollectingSink::new());
        let config = ProfilerConfig { sampling_interval_ms: 50, ..ProfilerConfig::default() };
        let engine = PowerAttributionEngine::new(config, clock.clone(), sink.clone()).unwrap();

        let mut stack = Vec::new();
        let mut empties = 0;
        let mut entered = 0u64;
        for enter in seq {
            clock.advance(1, cpu_step, cpu_step / 2);
            if enter {
                stack.push(engine.enter_method(&format!("N.m{}", stack.len() % 3), 1).unwrap());
                entered += 1;
            } else {
                let handle = stack.pop().unwrap();
                engine.exit_method(handle).unwrap();
                if engine.stack_depth(1) == Some(0) {
                    empties += 1;
                }
            }
        }

        prop_assert_eq!(empties, 1);
        prop_assert_eq!(sink.reports().len(), 1);
        let report = engine.thread_report(1).unwrap();
        let counted: u64 = report.methods.iter().map(|m| m.count).sum();
        prop_assert_eq!(counted, entered);
    }

    #[test]
    fn prop_suspended_interval_excluded(pause_ms in 5u64..20) {
        let mut timer = Timer::new();
        timer.start().unwrap();
        timer.suspend().unwrap();
        std::thread::sleep(std::time::Duration::from_millis(pause_ms));
        timer.resume().unwrap();
        timer.stop().unwrap();
        prop_assert!(timer.elapsed() < pause_ms * 1_000_000);
    }
}
