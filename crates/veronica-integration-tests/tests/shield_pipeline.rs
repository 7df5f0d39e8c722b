//! Policy hooks evaluated through the wrap path.

#![allow(clippy::arithmetic_side_effects)]

use std::sync::Arc;

use veronica_core::{ChainMetadata, Decision, ExecutionConfig};
use veronica_policy::{BudgetWindow, BudgetWindowConfig};
use veronica_runtime::{CallOptions, ExecutionContext};
use veronica_shield::{ShieldPipeline, UrlLengthPolicy};

fn context_with_pipeline(pipeline: ShieldPipeline) -> Arc<ExecutionContext> {
    ExecutionContext::builder(
        ChainMetadata::new("org-1", "agents", "svc"),
        ExecutionConfig::new(10.0, 100, 10).expect("valid config"),
    )
    .with_pipeline(Arc::new(pipeline))
    .build()
}

#[tokio::test]
async fn oversized_url_is_quarantined_before_dispatch() {
    let pipeline = ShieldPipeline::new().with_hook(Arc::new(UrlLengthPolicy::new()));
    let ctx = context_with_pipeline(pipeline);

    let long_url = format!("https://example.com/{}", "q".repeat(3000));
    let mut dispatched = false;
    let outcome = ctx
        .wrap_tool_call(CallOptions::new("fetch").with_url(long_url), |_token| {
            dispatched = true;
            async { Ok::<_, String>(()) }
        })
        .await;

    assert_eq!(outcome.decision(), Decision::Quarantine);
    assert!(!dispatched, "quarantined calls never reach the network");

    let events = ctx.events_snapshot();
    let quarantine: Vec<_> = events
        .iter()
        .filter(|e| e.event_type == "url_too_long")
        .collect();
    assert_eq!(quarantine.len(), 1);
    assert_eq!(quarantine[0].hook, "url_length_policy");
}

#[tokio::test]
async fn short_url_passes_the_same_pipeline() {
    let pipeline = ShieldPipeline::new().with_hook(Arc::new(UrlLengthPolicy::new()));
    let ctx = context_with_pipeline(pipeline);

    let outcome = ctx
        .wrap_tool_call(
            CallOptions::new("fetch").with_url("https://example.com"),
            |_token| async { Ok::<_, String>(()) },
        )
        .await;
    assert!(outcome.is_allowed());
}

#[tokio::test]
async fn call_window_degrades_then_halts() {
    let window = BudgetWindow::new(
        BudgetWindowConfig::new(4, 3600)
            .with_degrade_threshold(0.5)
            .with_downgrade("big-model", "small-model"),
    );
    let pipeline = ShieldPipeline::new().with_hook(Arc::new(window));
    let ctx = context_with_pipeline(pipeline);

    let run = |model: &str| {
        let options = CallOptions::new("plan").with_model(model);
        let ctx = Arc::clone(&ctx);
        async move {
            ctx.wrap_llm_call(options, |_token| async { Ok::<_, String>(()) })
                .await
        }
    };

    // Calls 1-2 are under the 50% threshold.
    assert!(run("big-model").await.is_allowed());
    assert!(run("big-model").await.is_allowed());

    // Calls 3-4 are in the degrade zone: suppressed with DEGRADE so the
    // caller can substitute the suggested model.
    let third = run("big-model").await;
    assert_eq!(third.decision(), Decision::Degrade);
    let fourth = run("big-model").await;
    assert_eq!(fourth.decision(), Decision::Degrade);

    // Call 5 finds the window full.
    let fifth = run("big-model").await;
    assert_eq!(fifth.decision(), Decision::Halt);

    let events = ctx.events_snapshot();
    assert!(events.iter().any(|e| e.event_type == "call_rate_degrade"));
    assert!(events.iter().any(|e| e.event_type == "call_rate_exceeded"));
    assert!(events
        .iter()
        .filter(|e| e.event_type == "call_rate_degrade")
        .any(|e| e.reason.contains("small-model")));
}
