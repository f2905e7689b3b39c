use chrono::{Duration, Utc};
use serde_json::json;
use server::config::GcConfig;

use crate::common::{TestApp, routes, sha_hex, state_doc};

const OWNER: &str = "acct1";

/// Seed a device, its trail and one step, all referencing `content` through
/// their state documents. Returns the storage id of the uploaded object.
async fn seed_fleet(app: &TestApp, device_id: &str, content: &[u8]) -> String {
    let storage_id = app.upload(OWNER, content, "rootfs.squashfs").await;
    let doc = state_doc(&[("rootfs.squashfs", &sha_hex(content))]);

    app.seed_device(device_id).await;
    app.seed_trail(device_id, OWNER, doc.clone()).await;
    app.seed_step(device_id, 1, OWNER, doc).await;
    storage_id
}

#[tokio::test]
async fn mark_device_cascades_to_trail() {
    let app = TestApp::spawn().await;
    let storage_id = seed_fleet(&app, "dev1", b"fleet content").await;

    let res = app.put_empty(&routes::mark_device("dev1")).await;

    assert_eq!(res.status, 200, "{}", res.text());
    assert_eq!(res.body["status"], 1);
    assert_eq!(res.body["devices_marked"], 1);

    let device = app.find_device("dev1").await.unwrap();
    assert!(device.garbage);
    assert!(device.garbage_removal_at.is_some());
    assert!(!device.gc_processed);

    let trail = app.find_trail("dev1").await.unwrap();
    assert!(trail.garbage);
    assert_eq!(trail.used_objects, json!([storage_id]));
}

#[tokio::test]
async fn mark_unknown_device_is_not_found() {
    let app = TestApp::spawn().await;

    let res = app.put_empty(&routes::mark_device("no-such-device")).await;

    assert_eq!(res.status, 404);
    assert_eq!(res.body["code"], "NOT_FOUND");
}

#[tokio::test]
async fn mark_device_warns_on_missing_trail() {
    let app = TestApp::spawn().await;
    app.seed_device("trailless").await;

    let res = app.put_empty(&routes::mark_device("trailless")).await;

    assert_eq!(res.status, 200);
    assert_eq!(res.body["status"], 1);
    assert_eq!(res.body["warnings"][0]["code"], "TRAIL_MISSING");
}

#[tokio::test]
async fn process_trails_collects_unreferenced_objects() {
    let app = TestApp::spawn().await;
    let storage_id = seed_fleet(&app, "dev1", b"collectable").await;

    app.put_empty(&routes::mark_device("dev1")).await;
    let res = app.put_empty(routes::PROCESS_TRAILS).await;

    assert_eq!(res.status, 200, "{}", res.text());
    assert_eq!(res.body["status"], 1);
    assert_eq!(res.body["trails_processed"], 1);

    // The whole fleet for this object is garbage, so it gets collected.
    let object = app.find_object(&storage_id).await.unwrap();
    assert!(object.garbage);
    assert!(object.garbage_removal_at.is_some());

    // Child steps were re-marked for their own processing pass.
    let step = app.find_step("dev1-1").await.unwrap();
    assert!(step.garbage);
    assert!(!step.gc_processed);
}

#[tokio::test]
async fn referenced_objects_survive_processing() {
    let app = TestApp::spawn().await;
    let content = b"shared by two devices";
    let storage_id = seed_fleet(&app, "dev1", content).await;

    // A second, live device references the same object.
    let doc = state_doc(&[("rootfs.squashfs", &sha_hex(content))]);
    app.seed_device("dev2").await;
    app.seed_trail("dev2", OWNER, doc).await;
    // Usage counting reads used_objects, so materialize dev2's references.
    app.put_empty(routes::POPULATE_TRAILS).await;

    app.put_empty(&routes::mark_device("dev1")).await;
    let res = app.put_empty(routes::PROCESS_TRAILS).await;

    assert_eq!(res.status, 200);
    assert_eq!(res.body["status"], 1);
    assert_eq!(res.body["objects_ignored"], json!([storage_id]));
    assert_eq!(res.body["warnings"][0]["code"], "OBJECT_IN_USE");

    let object = app.find_object(&storage_id).await.unwrap();
    assert!(!object.garbage);
}

#[tokio::test]
async fn step_reference_alone_keeps_object_alive() {
    let app = TestApp::spawn().await;
    let content = b"pinned by a step";
    let storage_id = app.upload(OWNER, content, "rootfs.squashfs").await;
    let doc = state_doc(&[("rootfs.squashfs", &sha_hex(content))]);

    app.seed_device("dev1").await;
    app.seed_trail("dev1", OWNER, doc.clone()).await;

    // The only live referencer is a step on another, unmarked device.
    app.seed_device("dev2").await;
    app.seed_trail("dev2", OWNER, state_doc(&[])).await;
    app.seed_step("dev2", 3, OWNER, doc).await;
    app.put_empty(routes::POPULATE_STEPS).await;

    app.put_empty(&routes::mark_device("dev1")).await;
    let res = app.put_empty(routes::PROCESS_TRAILS).await;

    assert_eq!(res.status, 200, "{}", res.text());
    assert_eq!(res.body["status"], 1);
    assert_eq!(res.body["objects_ignored"], json!([storage_id]));
    assert_eq!(res.body["warnings"][0]["code"], "OBJECT_IN_USE");

    let object = app.find_object(&storage_id).await.unwrap();
    assert!(!object.garbage);
    assert_eq!(
        app.find_step("dev2-3").await.unwrap().used_objects,
        json!([storage_id])
    );
}

#[tokio::test]
async fn full_pipeline_removes_the_fleet() {
    let app = TestApp::spawn().await;
    let storage_id = seed_fleet(&app, "dev1", b"doomed content").await;

    app.put_empty(&routes::mark_device("dev1")).await;
    app.put_empty(routes::PROCESS_DEVICES).await;
    app.put_empty(routes::PROCESS_TRAILS).await;
    app.put_empty(routes::PROCESS_STEPS).await;

    let res = app.delete(routes::SWEEP).await;

    assert_eq!(res.status, 200, "{}", res.text());
    assert_eq!(res.body["status"], 1);
    assert_eq!(res.body["devices_removed"], 1);
    assert_eq!(res.body["trails_removed"], 1);
    assert_eq!(res.body["steps_removed"], 1);
    assert_eq!(res.body["objects_removed"], 1);

    assert!(app.find_device("dev1").await.is_none());
    assert!(app.find_trail("dev1").await.is_none());
    assert!(app.find_step("dev1-1").await.is_none());
    assert!(app.find_object(&storage_id).await.is_none());
    assert!(!app.object_file(&storage_id).exists());
}

#[tokio::test]
async fn pipeline_is_idempotent() {
    let app = TestApp::spawn().await;
    seed_fleet(&app, "dev1", b"marked twice").await;

    app.put_empty(&routes::mark_device("dev1")).await;
    app.put_empty(&routes::mark_device("dev1")).await;
    app.put_empty(routes::PROCESS_TRAILS).await;

    // Nothing left pending on the second pass.
    let res = app.put_empty(routes::PROCESS_TRAILS).await;
    assert_eq!(res.body["trails_processed"], 0);
}

#[tokio::test]
async fn sweep_skips_unprocessed_marks() {
    let app = TestApp::spawn().await;
    seed_fleet(&app, "dev1", b"still pending").await;

    // Marked but never processed.
    app.put_empty(&routes::mark_device("dev1")).await;
    let res = app.delete(routes::SWEEP).await;

    assert_eq!(res.status, 200);
    assert_eq!(res.body["devices_removed"], 0);
    assert_eq!(res.body["trails_removed"], 0);
    assert!(app.find_device("dev1").await.is_some());
}

#[tokio::test]
async fn sweep_honors_the_grace_period() {
    let app = TestApp::spawn_with_gc(GcConfig {
        grace_period: "48h".to_string(),
        unclaimed_expiry: "30d".to_string(),
        remove_garbage: true,
    })
    .await;
    seed_fleet(&app, "dev1", b"too early").await;

    app.put_empty(&routes::mark_device("dev1")).await;
    app.put_empty(routes::PROCESS_DEVICES).await;
    app.put_empty(routes::PROCESS_TRAILS).await;
    app.put_empty(routes::PROCESS_STEPS).await;

    let res = app.delete(routes::SWEEP).await;

    assert_eq!(res.status, 200);
    assert_eq!(res.body["devices_removed"], 0);
    assert_eq!(res.body["objects_removed"], 0);
    assert!(app.find_device("dev1").await.is_some());
}

#[tokio::test]
async fn disabled_sweep_removes_nothing() {
    let app = TestApp::spawn_with_gc(GcConfig {
        grace_period: "0s".to_string(),
        unclaimed_expiry: "30d".to_string(),
        remove_garbage: false,
    })
    .await;
    let storage_id = seed_fleet(&app, "dev1", b"protected").await;

    app.put_empty(&routes::mark_device("dev1")).await;
    app.put_empty(routes::PROCESS_DEVICES).await;
    app.put_empty(routes::PROCESS_TRAILS).await;
    app.put_empty(routes::PROCESS_STEPS).await;

    let res = app.delete(routes::SWEEP).await;

    assert_eq!(res.status, 200);
    assert_eq!(res.body["warnings"][0]["code"], "SWEEP_DISABLED");
    assert_eq!(res.body["devices_removed"], 0);
    assert_eq!(res.body["objects_removed"], 0);
    assert!(app.find_device("dev1").await.is_some());
    assert!(app.object_file(&storage_id).exists());
}

#[tokio::test]
async fn unclaimed_devices_are_marked_after_expiry() {
    let app = TestApp::spawn().await;

    app.seed_device_with("stale", "challenge-abc", Utc::now() - Duration::days(40))
        .await;
    app.seed_trail("stale", OWNER, state_doc(&[])).await;
    app.seed_device_with("fresh", "challenge-def", Utc::now() - Duration::days(1))
        .await;
    app.seed_device("claimed").await;

    let res = app.put_empty(routes::MARK_UNCLAIMED).await;

    assert_eq!(res.status, 200, "{}", res.text());
    assert_eq!(res.body["devices_marked"], 1);
    assert!(app.find_device("stale").await.unwrap().garbage);
    assert!(!app.find_device("fresh").await.unwrap().garbage);
    assert!(!app.find_device("claimed").await.unwrap().garbage);
    assert!(app.find_trail("stale").await.unwrap().garbage);
}

#[tokio::test]
async fn orphan_trails_are_marked() {
    let app = TestApp::spawn().await;

    app.seed_trail("vanished-device", OWNER, state_doc(&[])).await;
    app.seed_device("alive").await;
    app.seed_trail("alive", OWNER, state_doc(&[])).await;

    let res = app.put_empty(routes::MARK_TRAILS).await;

    assert_eq!(res.status, 200);
    assert_eq!(res.body["trails_marked"], 1);
    assert!(app.find_trail("vanished-device").await.unwrap().garbage);
    assert!(!app.find_trail("alive").await.unwrap().garbage);
}

#[tokio::test]
async fn populate_recomputes_trail_references() {
    let app = TestApp::spawn().await;
    let content = b"tracked late";
    let storage_id = app.upload(OWNER, content, "rootfs.squashfs").await;

    app.seed_device("dev1").await;
    app.seed_trail(
        "dev1",
        OWNER,
        state_doc(&[("rootfs.squashfs", &sha_hex(content))]),
    )
    .await;

    let res = app.put_empty(routes::POPULATE_TRAILS).await;

    assert_eq!(res.status, 200, "{}", res.text());
    assert_eq!(res.body["trails_populated"], 1);
    let trail = app.find_trail("dev1").await.unwrap();
    assert_eq!(trail.used_objects, json!([storage_id]));
}

#[tokio::test]
async fn populate_flags_broken_references() {
    let app = TestApp::spawn().await;

    app.seed_device("dev1").await;
    app.seed_trail(
        "dev1",
        OWNER,
        state_doc(&[("rootfs.squashfs", "not-a-sha256")]),
    )
    .await;

    let res = app.put_empty(routes::POPULATE_TRAILS).await;

    assert_eq!(res.status, 200);
    assert_eq!(res.body["status"], 1);
    assert_eq!(res.body["warnings"][0]["code"], "INVALID_REFERENCES");
    assert_eq!(
        app.find_trail("dev1").await.unwrap().used_objects,
        json!([])
    );
}

#[tokio::test]
async fn populate_rescues_referenced_garbage_objects() {
    use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, sea_query::Expr};
    use server::entity::storage_object;

    let app = TestApp::spawn().await;
    let content = b"back from the dead";
    let storage_id = app.upload(OWNER, content, "rootfs.squashfs").await;

    app.seed_device("dev1").await;
    app.seed_step("dev1", 2, OWNER, state_doc(&[("rootfs.squashfs", &sha_hex(content))]))
        .await;

    storage_object::Entity::update_many()
        .col_expr(storage_object::Column::Garbage, Expr::value(true))
        .col_expr(
            storage_object::Column::GarbageRemovalAt,
            Expr::value(Utc::now()),
        )
        .filter(storage_object::Column::StorageId.eq(&storage_id))
        .exec(&app.db)
        .await
        .unwrap();

    let res = app.put_empty(routes::POPULATE_STEPS).await;

    assert_eq!(res.status, 200, "{}", res.text());
    assert_eq!(res.body["steps_populated"], 1);
    let object = app.find_object(&storage_id).await.unwrap();
    assert!(!object.garbage);
    assert!(object.garbage_removal_at.is_none());
}

#[tokio::test]
async fn invalid_state_document_is_reported_during_mark() {
    let app = TestApp::spawn().await;

    app.seed_device("dev1").await;
    // No format marker at all.
    app.seed_trail("dev1", OWNER, json!({"kernel.img": "00"})).await;

    let res = app.put_empty(&routes::mark_device("dev1")).await;

    assert_eq!(res.status, 200);
    let codes: Vec<&str> = res.body["warnings"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|w| w["code"].as_str())
        .collect();
    assert!(codes.contains(&"INVALID_STATE_DOCUMENT"));
    assert!(codes.contains(&"INVALID_REFERENCES"));
}
