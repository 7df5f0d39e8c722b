//! Adaptive multiplier control: direction lock, bounds, replay.

#![allow(clippy::arithmetic_side_effects)]

use chrono::{DateTime, TimeZone, Utc};
use veronica_core::Decision;
use veronica_policy::{AdaptiveBudgetHook, AdaptiveConfig, AdjustAction};

fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).single().expect("valid timestamp")
}

fn hook_without_cooldown() -> AdaptiveBudgetHook {
    AdaptiveBudgetHook::new(AdaptiveConfig {
        cooldown_seconds: 0,
        ..AdaptiveConfig::default()
    })
}

#[test]
fn direction_lock_scenario() {
    let hook = hook_without_cooldown();

    // Three HALT events tighten the multiplier.
    for _ in 0..3 {
        hook.feed_event_at(Decision::Halt, at(0));
    }
    assert_eq!(hook.adjust_at(at(1)), AdjustAction::Tighten);
    let tightened = hook.multiplier();

    // No new events, no cooldown: loosen is blocked, not applied.
    assert_eq!(hook.adjust_at(at(2)), AdjustAction::DirectionLocked);
    assert!((hook.multiplier() - tightened).abs() < 1e-9);

    let events = hook.drain_staged_events();
    assert!(events
        .iter()
        .any(|e| e.event_type == "ADAPTIVE_DIRECTION_LOCKED"));
}

#[test]
fn multiplier_stays_in_bounds_through_arbitrary_history() {
    let hook = hook_without_cooldown();
    for round in 0_i64..60 {
        if round % 2 == 0 {
            for _ in 0..3 {
                hook.feed_event_at(Decision::Halt, at(round * 700));
            }
        }
        hook.adjust_at(at(round * 700 + 1));
        let m = hook.multiplier();
        assert!((0.6..=1.2).contains(&m), "multiplier {m} escaped bounds");
        let eff = hook.effective_multiplier();
        assert!((0.6..=1.2).contains(&eff), "effective {eff} escaped bounds");
    }
}

#[test]
fn smoothing_caps_large_tighten_steps() {
    let hook = AdaptiveBudgetHook::new(AdaptiveConfig {
        cooldown_seconds: 0,
        tighten_pct: 0.5,
        max_step_pct: 0.05,
        ..AdaptiveConfig::default()
    });
    for _ in 0..3 {
        hook.feed_event_at(Decision::Halt, at(0));
    }
    hook.adjust_at(at(1));
    // The configured 0.5 step was silently capped at 0.05.
    assert!((hook.multiplier() - 0.95).abs() < 1e-9);
}

#[test]
fn cooldown_blocks_second_adjustment() {
    let hook = AdaptiveBudgetHook::new(AdaptiveConfig::default());
    for _ in 0..3 {
        hook.feed_event_at(Decision::Halt, at(0));
    }
    assert_eq!(hook.adjust_at(at(1)), AdjustAction::Tighten);
    for _ in 0..3 {
        hook.feed_event_at(Decision::Halt, at(100));
    }
    assert_eq!(hook.adjust_at(at(101)), AdjustAction::CooldownBlocked);
    // Once the cooldown has elapsed, a fresh burst tightens again.
    for _ in 0..3 {
        hook.feed_event_at(Decision::Halt, at(900));
    }
    assert_eq!(hook.adjust_at(at(902)), AdjustAction::Tighten);
}

#[test]
fn export_import_export_round_trip() {
    let hook = hook_without_cooldown();
    for _ in 0..3 {
        hook.feed_event_at(Decision::Halt, at(0));
    }
    hook.adjust_at(at(1));

    let exported = hook.export_control_state();

    let replica = hook_without_cooldown();
    replica.import_control_state(exported.clone());
    let re_exported = replica.export_control_state();

    assert_eq!(re_exported, exported);

    // And the JSON form round-trips too.
    let json = serde_json::to_string(&exported).expect("serialize");
    let parsed: veronica_policy::AdaptiveControlState =
        serde_json::from_str(&json).expect("parse");
    assert_eq!(parsed, exported);
}
