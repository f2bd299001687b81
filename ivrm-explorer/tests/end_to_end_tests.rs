//! End-to-end exploration of one menu
//!
//! Drives the passes by hand in the order the scheduler would, from a new
//! target to a completed one.

mod helpers;

use helpers::{insert_target, TestHarness};
use ivrm_explorer::db;
use ivrm_explorer::models::{DialPayload, DigitPath, TargetStatus};
use ivrm_explorer::services::reconciliation::{
    run_backfill_pass, run_convergence_pass, run_dispatch_pass, run_seed_pass,
    run_summary_pass, run_tree_seed_pass, DispatchOutcome,
};

#[tokio::test]
async fn test_new_target_is_explored_to_completion() {
    let h = TestHarness::new().await.unwrap();
    let target = insert_target(&h.pool, "18005551234").await.unwrap();
    assert_eq!(target.status, TargetStatus::New);

    // Seed: one root item with an empty payload
    assert_eq!(run_seed_pass(&h.ctx).await.unwrap(), 1);
    let items = db::queue::list_for_target(&h.pool, target.id).await.unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].payload.to_canonical_json().unwrap(), "[]");

    // Dispatch: first call record
    assert!(matches!(
        run_dispatch_pass(&h.ctx).await.unwrap(),
        DispatchOutcome::Completed { .. }
    ));
    assert_eq!(db::call_records::count_for_target(&h.pool, target.id).await.unwrap(), 1);

    // Backfill: the root menu offers digit 1
    let root_text = "Press 1 for sales";
    h.analyzer.push_transcript(root_text);
    h.analyzer
        .set_options(root_text, r#"[{"digit":"1","action":"sales","submenu":false}]"#);
    assert_eq!(run_backfill_pass(&h.ctx).await.unwrap(), 1);

    let sequences = db::sequences::list_for_target(&h.pool, target.id).await.unwrap();
    assert_eq!(sequences.len(), 1);
    assert_eq!(sequences[0].digits.to_canonical_json().unwrap(), r#"["1"]"#);

    let items = db::queue::list_for_target(&h.pool, target.id).await.unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(
        items[0].payload.to_canonical_json().unwrap(),
        r#"[{"digit":"1","delay":5}]"#
    );

    // Dispatch the follow-up: second record tied to the digit-1 payload
    assert!(matches!(
        run_dispatch_pass(&h.ctx).await.unwrap(),
        DispatchOutcome::Completed { .. }
    ));
    let records = db::call_records::list_for_target(&h.pool, target.id).await.unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(
        records[1].payload.to_canonical_json().unwrap(),
        r#"[{"digit":"1","delay":5}]"#
    );

    let calls = h.executor.calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[1].1, DialPayload::from_path(&DigitPath::parse_hyphenated("1").unwrap(), 5));

    // The sales line is a leaf
    h.analyzer.push_transcript("You have reached sales. Please hold for the next agent.");
    assert_eq!(run_backfill_pass(&h.ctx).await.unwrap(), 1);
    assert_eq!(run_tree_seed_pass(&h.ctx).await.unwrap(), 0);

    // Summary, then quiet convergence cycles
    let summary = "Main menu with one option: 1 for sales.";
    h.analyzer.set_summary(summary);
    h.analyzer
        .set_options(summary, r#"[{"digit":"1","action":"sales","submenu":false}]"#);
    assert_eq!(run_summary_pass(&h.ctx).await.unwrap(), 1);

    let target = db::targets::get_target(&h.pool, target.id).await.unwrap().unwrap();
    let map = target.digit_map.expect("digit map built from summary");
    assert_eq!(map.get("1").unwrap().action, "sales");
    assert_eq!(
        db::sequences::count_unexplored_for_target(&h.pool, target.id).await.unwrap(),
        0,
        "rebuild keeps dialed paths explored"
    );

    for _ in 0..h.config.recovery.converge_after_cycles {
        run_convergence_pass(&h.ctx).await.unwrap();
    }

    let target = db::targets::get_target(&h.pool, target.id).await.unwrap().unwrap();
    assert_eq!(target.status, TargetStatus::Completed);
    assert_eq!(h.executor.calls().len(), 2, "no path dialed twice");
}
