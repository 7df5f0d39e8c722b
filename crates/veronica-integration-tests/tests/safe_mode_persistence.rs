//! SAFE_MODE survives process restarts; atomic writes never tear.

#![allow(clippy::arithmetic_side_effects)]

use std::sync::Arc;

use veronica_core::{ChainMetadata, Decision, ExecutionConfig};
use veronica_runtime::{CallOptions, ExecutionContext};
use veronica_safemode::{load_or_default, write_atomic, KernelState, SafeModeController};

#[tokio::test]
async fn safe_mode_persists_across_reinstantiation() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("kernel_state.json");

    // Operator flips the kill switch; the process dies without ceremony.
    {
        let controller = SafeModeController::with_path(&path);
        controller.transition_at(KernelState::SafeMode, "operator kill switch", 1000.0);
        assert_eq!(controller.total_transitions(), 1);
    }

    // A fresh process loads the same file.
    let controller = Arc::new(SafeModeController::with_path(&path));
    assert_eq!(controller.current_state(), KernelState::SafeMode);
    assert_eq!(controller.total_transitions(), 1);

    // Every wrapped call returns HALT regardless of budget.
    let ctx = ExecutionContext::builder(
        ChainMetadata::new("org-1", "agents", "svc"),
        ExecutionConfig::new(100.0, 50, 10).expect("valid config"),
    )
    .with_safemode(Arc::clone(&controller))
    .build();

    for _ in 0..3 {
        let outcome = ctx
            .wrap_tool_call(CallOptions::new("anything"), |_token| async {
                Ok::<_, String>(())
            })
            .await;
        assert_eq!(outcome.decision(), Decision::Halt);
        assert_eq!(outcome.reason(), Some("safe_mode"));
    }

    // Explicit operator transition is required to resume.
    controller.transition_at(KernelState::Idle, "operator resume", 2000.0);
    assert_eq!(controller.total_transitions(), 2);
    let outcome = ctx
        .wrap_tool_call(CallOptions::new("anything"), |_token| async {
            Ok::<_, String>(())
        })
        .await;
    assert!(outcome.is_allowed());
}

#[test]
fn atomic_write_is_old_or_new_never_torn() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("kernel_state.json");

    let old = veronica_safemode::PersistedState {
        total_transitions: 1,
        ..veronica_safemode::PersistedState::default()
    };
    write_atomic(&path, &old).expect("first write");

    let new = veronica_safemode::PersistedState {
        current_state: KernelState::SafeMode,
        total_transitions: 2,
        ..veronica_safemode::PersistedState::default()
    };
    write_atomic(&path, &new).expect("second write");

    // After each completed write the file parses fully — there is no
    // intermediate truncated form to observe on disk.
    let loaded = load_or_default(&path);
    assert_eq!(loaded, new);
}

#[test]
fn corrupt_state_file_degrades_to_blank() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("kernel_state.json");
    std::fs::write(&path, b"\x00\x01 not json").expect("write garbage");

    let controller = SafeModeController::with_path(&path);
    assert_eq!(controller.current_state(), KernelState::Idle);
    assert_eq!(controller.total_transitions(), 0);
}

#[test]
fn fail_counts_and_cooldowns_round_trip() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("kernel_state.json");

    {
        let controller = SafeModeController::with_path(&path);
        controller.record_failure("provider-a");
        controller.record_failure("provider-a");
        controller.set_cooldown("provider-a", 5000.5);
        controller.transition_at(KernelState::Cooldown, "provider-a cooling", 4000.0);
    }

    let reloaded = SafeModeController::with_path(&path);
    let snapshot = reloaded.snapshot();
    assert_eq!(snapshot.fail_counts.get("provider-a"), Some(&2));
    assert_eq!(snapshot.active_cooldowns.get("provider-a"), Some(&5000.5));
    assert_eq!(snapshot.current_state, KernelState::Cooldown);
    assert!(reloaded.cooldown_active("provider-a", 4999.0));
    assert!(!reloaded.cooldown_active("provider-a", 5001.0));
}
