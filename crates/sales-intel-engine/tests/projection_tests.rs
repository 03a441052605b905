//! Projection behavior over the event log: stage changes, rebuilds from
//! the log, soft-delete resurrection, and TTL read repair.

mod common;

use chrono::{Duration as ChronoDuration, Utc};
use common::{employee, env, lead, partner, user_id, Env};
use sales_intel_core::models::{EntityType, EventType, SyncJobStatus, TriggerSource};
use std::collections::BTreeMap;

use sales_intel_engine::events::Event;
use sales_intel_engine::store::AccessMatrix;

async fn seed(env: &Env) {
    env.source
        .set(
            EntityType::User,
            vec![
                employee(10, "Alice", "alice@corp.io", None),
                employee(20, "Bob", "bob@corp.io", Some(10)),
                employee(30, "Carol", "carol@corp.io", None),
            ],
        )
        .await;
    env.source
        .set(
            EntityType::Account,
            vec![partner(301, "Acme", "Berlin", "Germany")],
        )
        .await;
    env.service.run_sync("seed", TriggerSource::Manual).await.unwrap();

    env.backbone
        .commands
        .change_user_role("carol@corp.io", "super_admin")
        .await
        .unwrap();

    env.source
        .set(
            EntityType::Opportunity,
            vec![lead(201, "OppA", 200, 301, 50_000.0, "Proposal")],
        )
        .await;
    env.service.run_sync("seed", TriggerSource::Manual).await.unwrap();
}

#[tokio::test]
async fn stage_change_and_reassignment_move_revenue() {
    let env = env().await;
    seed(&env).await;

    let alice = user_id(&env.backbone, "alice@corp.io").await;
    let bob = user_id(&env.backbone, "bob@corp.io").await;
    let carol = user_id(&env.backbone, "carol@corp.io").await;

    // The deal closes under Bob.
    env.source
        .set(
            EntityType::Opportunity,
            vec![lead(201, "OppA", 200, 301, 50_000.0, "Closed Won")],
        )
        .await;
    env.service.run_sync("close", TriggerSource::Manual).await.unwrap();

    let bob_metrics = env.backbone.dashboard_queries.dashboard_metrics(&bob).await.unwrap();
    assert_eq!(bob_metrics.won_revenue, 50_000.0);
    assert_eq!(bob_metrics.won_count, 1);
    assert_eq!(bob_metrics.pipeline_value, 0.0);

    // The source reassigns the won deal to Alice.
    env.source
        .set(
            EntityType::Opportunity,
            vec![lead(201, "OppA", 100, 301, 50_000.0, "Closed Won")],
        )
        .await;
    env.service.run_sync("reassign", TriggerSource::Manual).await.unwrap();

    let view = env
        .backbone
        .opportunities
        .by_source_id("201")
        .await
        .unwrap()
        .unwrap();
    assert!(!view.visible_to(&bob), "previous owner keeps no visibility");
    assert!(view.visible_to(&alice));
    assert!(view.visible_to(&carol), "super-admin always sees it");

    // The previous owner's numbers drop, the new owner's rise, without
    // waiting for any TTL: the event history names both of them.
    let bob_metrics = env.backbone.dashboard_queries.dashboard_metrics(&bob).await.unwrap();
    assert_eq!(bob_metrics.won_revenue, 0.0);
    assert_eq!(bob_metrics.total_opportunities, 0);

    let alice_metrics = env.backbone.dashboard_queries.dashboard_metrics(&alice).await.unwrap();
    assert_eq!(alice_metrics.won_revenue, 50_000.0);
    assert_eq!(alice_metrics.won_count, 1);
}

#[tokio::test]
async fn command_reassignment_updates_visibility_and_matrices() {
    let env = env().await;
    seed(&env).await;

    let alice = user_id(&env.backbone, "alice@corp.io").await;
    let bob = user_id(&env.backbone, "bob@corp.io").await;

    env.backbone
        .commands
        .reassign_opportunity("201", 100)
        .await
        .unwrap();

    let view = env
        .backbone
        .opportunities
        .by_source_id("201")
        .await
        .unwrap()
        .unwrap();
    assert!(view.visible_to(&alice));
    assert!(!view.visible_to(&bob));

    let bob_matrix = env.backbone.access_queries.access_matrix(&bob).await.unwrap();
    assert!(bob_matrix.accessible_opportunities.is_empty());
    let alice_matrix = env.backbone.access_queries.access_matrix(&alice).await.unwrap();
    assert_eq!(alice_matrix.accessible_opportunities, vec!["201"]);
}

#[tokio::test]
async fn rebuild_from_log_reproduces_incremental_state() {
    let env = env().await;
    seed(&env).await;
    env.backbone
        .commands
        .change_opportunity_stage("201", "Closed Won")
        .await
        .unwrap();

    let bob = user_id(&env.backbone, "bob@corp.io").await;

    // Capture the incrementally produced state, keyed by stable fields.
    let profiles_before: BTreeMap<String, (bool, Option<i64>)> = {
        let mut map = BTreeMap::new();
        for email in ["alice@corp.io", "bob@corp.io", "carol@corp.io"] {
            let p = env.backbone.profiles.by_email(email).await.unwrap().unwrap();
            map.insert(email.to_string(), (p.is_super_admin, p.odoo.employee_id));
        }
        map
    };
    let view_before = env
        .backbone
        .opportunities
        .by_source_id("201")
        .await
        .unwrap()
        .unwrap();
    let bob_matrix_before = env.backbone.access_queries.access_matrix(&bob).await.unwrap();
    let bob_metrics_before = env
        .backbone
        .dashboard_queries
        .dashboard_metrics(&bob)
        .await
        .unwrap();

    // Wipe every view and replay the log.
    for projection in env.backbone.runtime.projections() {
        projection.truncate().await.unwrap();
    }
    assert_eq!(env.backbone.profiles.count().await.unwrap(), 0);

    let outcomes = env.backbone.runtime.rebuild_all(None).await.unwrap();
    assert!(outcomes.values().all(|o| o.errors == 0));

    // Same shape, same numbers; only the generated UUIDs differ.
    for (email, before) in &profiles_before {
        let p = env.backbone.profiles.by_email(email).await.unwrap().unwrap();
        assert_eq!(&(p.is_super_admin, p.odoo.employee_id), before, "{email}");
    }

    let view_after = env
        .backbone
        .opportunities
        .by_source_id("201")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(view_after.stage, view_before.stage);
    assert_eq!(view_after.value, view_before.value);
    assert_eq!(
        view_after.visible_to_user_ids.len(),
        view_before.visible_to_user_ids.len()
    );

    let bob_after = user_id(&env.backbone, "bob@corp.io").await;
    let bob_matrix_after = env
        .backbone
        .access_queries
        .access_matrix(&bob_after)
        .await
        .unwrap();
    assert_eq!(
        bob_matrix_after.accessible_opportunities,
        bob_matrix_before.accessible_opportunities
    );

    let bob_metrics_after = env
        .backbone
        .dashboard_queries
        .dashboard_metrics(&bob_after)
        .await
        .unwrap();
    assert_eq!(bob_metrics_after.won_revenue, bob_metrics_before.won_revenue);
    assert_eq!(bob_metrics_after.pipeline_value, bob_metrics_before.pipeline_value);
    assert_eq!(bob_metrics_after.by_stage, bob_metrics_before.by_stage);
}

#[tokio::test]
async fn soft_deleted_opportunity_resurrects_on_resync() {
    let env = env().await;
    seed(&env).await;

    env.backbone
        .commands
        .delete_opportunity("201", "odoo_deleted")
        .await
        .unwrap();

    let deleted = env
        .backbone
        .opportunities
        .by_source_id("201")
        .await
        .unwrap()
        .unwrap();
    assert!(!deleted.is_active);
    assert!(deleted.deleted_at.is_some());
    assert_eq!(deleted.delete_reason.as_deref(), Some("odoo_deleted"));

    // Deletion does not hide the document from audit reads, but it leaves
    // every visibility query.
    let bob = user_id(&env.backbone, "bob@corp.io").await;
    assert!(env
        .backbone
        .visibility
        .opportunities_visible_to(&bob)
        .await
        .unwrap()
        .is_empty());

    // The record reappears in the source (with an edit) and resurrects.
    env.source
        .set(
            EntityType::Opportunity,
            vec![lead(201, "OppA", 200, 301, 55_000.0, "Proposal")],
        )
        .await;
    let job = env.service.run_sync("resync", TriggerSource::Manual).await.unwrap();
    assert_eq!(job.status, SyncJobStatus::Completed);

    let revived = env
        .backbone
        .opportunities
        .by_source_id("201")
        .await
        .unwrap()
        .unwrap();
    assert!(revived.is_active);
    assert!(revived.deleted_at.is_none());
    assert_eq!(revived.value, 55_000.0);
    assert_eq!(revived.id, deleted.id, "soft delete preserves identity");
}

#[tokio::test]
async fn stale_matrix_entries_are_rebuilt_on_read() {
    let env = env().await;
    seed(&env).await;

    let bob = user_id(&env.backbone, "bob@corp.io").await;
    let fresh = env.backbone.access_queries.access_matrix(&bob).await.unwrap();

    // Age the entry past the freshness window but inside the expiry.
    env.backbone
        .matrices
        .put(AccessMatrix {
            computed_at: Utc::now() - ChronoDuration::seconds(400),
            accessible_opportunities: vec!["stale".into()],
            ..fresh
        })
        .await
        .unwrap();

    let repaired = env.backbone.access_queries.access_matrix(&bob).await.unwrap();
    assert_eq!(repaired.accessible_opportunities, vec!["201"]);
    assert!(repaired.age_seconds() < 5);
}

#[tokio::test]
async fn rebuild_status_tracks_unprocessed_events() {
    let env = env().await;
    seed(&env).await;

    let status = env
        .backbone
        .runtime
        .rebuild_status("DashboardMetricsProjection")
        .await
        .unwrap();
    assert!(status.is_up_to_date, "live dispatch marks every event");
    assert_eq!(status.behind, 0);

    // Append without publishing: the projection falls behind until the
    // next rebuild pass.
    env.backbone
        .event_store
        .append(Event::new(
            EventType::OdooOpportunitySynced,
            sales_intel_core::models::AggregateType::Opportunity,
            "opportunity-999",
            serde_json::json!({"id": 999, "stage_name": "New"}),
        ))
        .await
        .unwrap();

    let status = env
        .backbone
        .runtime
        .rebuild_status("DashboardMetricsProjection")
        .await
        .unwrap();
    assert!(!status.is_up_to_date);
    assert_eq!(status.behind, 1);

    let outcome = env
        .backbone
        .runtime
        .rebuild_from_events("DashboardMetricsProjection", None)
        .await
        .unwrap();
    assert!(outcome.processed >= 1);
    assert_eq!(outcome.errors, 0);

    let status = env
        .backbone
        .runtime
        .rebuild_status("DashboardMetricsProjection")
        .await
        .unwrap();
    assert!(status.is_up_to_date);
}
