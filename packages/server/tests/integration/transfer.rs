use chrono::Duration;
use server::utils::token::{TransferMethod, sign};

use crate::common::{TOKEN_SECRET, TestApp, routes, sha_hex, storage_id_for};

const OWNER: &str = "acct1";

#[tokio::test]
async fn upload_then_download_round_trip() {
    let app = TestApp::spawn().await;
    let content = b"firmware image v1";

    let storage_id = app.upload(OWNER, content, "firmware.img").await;
    assert!(app.object_file(&storage_id).exists());

    let token = app.get_token(&storage_id, content.len() as i64, "firmware.img");
    let res = app.get(&routes::object(&token)).await;

    assert_eq!(res.status, 200, "{}", res.text());
    assert_eq!(res.bytes, content);
    assert_eq!(res.header("content-length"), content.len().to_string());
    assert!(res.header("content-disposition").contains("firmware.img"));
}

#[tokio::test]
async fn upload_records_catalog_entry() {
    let app = TestApp::spawn().await;
    let content = b"catalogued bytes";

    let storage_id = app.upload(OWNER, content, "rootfs.squashfs").await;

    let object = app.find_object(&storage_id).await.expect("row missing");
    assert_eq!(object.owner, OWNER);
    assert_eq!(object.size, content.len() as i64);
    assert_eq!(object.digest, sha_hex(content));
    assert_eq!(object.name, "rootfs.squashfs");
    assert!(!object.garbage);
}

#[tokio::test]
async fn digest_mismatch_discards_upload() {
    let app = TestApp::spawn().await;
    let content = b"what actually arrives";

    // Token promises the digest of different content of the same length.
    let other = b"what was promised  !!";
    assert_eq!(content.len(), other.len());
    let token = sign(
        TOKEN_SECRET,
        &storage_id_for(OWNER, other),
        TransferMethod::Put,
        content.len() as i64,
        &sha_hex(other),
        "fw.img",
        Duration::minutes(5),
    )
    .unwrap();

    let res = app.put_bytes(&routes::object(&token), content.to_vec()).await;

    assert_eq!(res.status, 400, "{}", res.text());
    assert_eq!(res.error_code(), "INTEGRITY_ERROR");
    assert!(!app.object_file(&storage_id_for(OWNER, other)).exists());
    assert!(app.find_object(&storage_id_for(OWNER, other)).await.is_none());
}

#[tokio::test]
async fn short_body_is_an_integrity_error() {
    let app = TestApp::spawn().await;
    let content = b"only ten b";

    let token = sign(
        TOKEN_SECRET,
        &storage_id_for(OWNER, content),
        TransferMethod::Put,
        100,
        &sha_hex(content),
        "fw.img",
        Duration::minutes(5),
    )
    .unwrap();

    let res = app.put_bytes(&routes::object(&token), content.to_vec()).await;

    assert_eq!(res.status, 400, "{}", res.text());
    assert_eq!(res.error_code(), "INTEGRITY_ERROR");
}

#[tokio::test]
async fn trailing_bytes_are_an_integrity_error() {
    let app = TestApp::spawn().await;
    let content = b"declared portion";

    // Token matches the declared portion exactly; the body carries more.
    let token = app.put_token(OWNER, content, "fw.img");
    let mut body = content.to_vec();
    body.extend_from_slice(b" plus trailing junk");

    let res = app.put_bytes(&routes::object(&token), body).await;

    assert_eq!(res.status, 400, "{}", res.text());
    assert_eq!(res.error_code(), "INTEGRITY_ERROR");
    assert!(!app.object_file(&storage_id_for(OWNER, content)).exists());
    assert!(app.find_object(&storage_id_for(OWNER, content)).await.is_none());
}

#[tokio::test]
async fn oversized_declaration_is_rejected() {
    let app = TestApp::spawn().await;

    // Test servers cap objects at 8 MiB.
    let token = sign(
        TOKEN_SECRET,
        &storage_id_for(OWNER, b"x"),
        TransferMethod::Put,
        64 * 1024 * 1024,
        &sha_hex(b"x"),
        "huge.img",
        Duration::minutes(5),
    )
    .unwrap();

    let res = app.put_bytes(&routes::object(&token), b"x".to_vec()).await;

    assert_eq!(res.status, 400, "{}", res.text());
    assert_eq!(res.error_code(), "VALIDATION_ERROR");
}

#[tokio::test]
async fn wrong_method_token_is_forbidden() {
    let app = TestApp::spawn().await;
    let content = b"method matters";
    let storage_id = app.upload(OWNER, content, "fw.img").await;

    // GET token used for upload.
    let get_token = app.get_token(&storage_id, content.len() as i64, "fw.img");
    let res = app
        .put_bytes(&routes::object(&get_token), content.to_vec())
        .await;
    assert_eq!(res.status, 403);
    assert_eq!(res.error_code(), "TOKEN_INVALID");

    // PUT token used for download.
    let put_token = app.put_token(OWNER, content, "fw.img");
    let res = app.get(&routes::object(&put_token)).await;
    assert_eq!(res.status, 403);
    assert_eq!(res.error_code(), "TOKEN_INVALID");
}

#[tokio::test]
async fn garbage_token_is_forbidden() {
    let app = TestApp::spawn().await;

    let res = app.put_bytes(&routes::object("not-a-token"), vec![1, 2, 3]).await;
    assert_eq!(res.status, 403);
    assert_eq!(res.error_code(), "TOKEN_INVALID");
}

#[tokio::test]
async fn foreign_secret_token_is_forbidden() {
    let app = TestApp::spawn().await;
    let content = b"signed elsewhere";

    let token = sign(
        "some-other-secret",
        &storage_id_for(OWNER, content),
        TransferMethod::Put,
        content.len() as i64,
        &sha_hex(content),
        "fw.img",
        Duration::minutes(5),
    )
    .unwrap();

    let res = app.put_bytes(&routes::object(&token), content.to_vec()).await;
    assert_eq!(res.status, 403);
    assert_eq!(res.error_code(), "TOKEN_INVALID");
}

#[tokio::test]
async fn download_of_unstored_object_is_not_found() {
    let app = TestApp::spawn().await;

    let token = app.get_token(&storage_id_for(OWNER, b"never uploaded"), 14, "f");
    let res = app.get(&routes::object(&token)).await;

    assert_eq!(res.status, 404, "{}", res.text());
    assert_eq!(res.error_code(), "NOT_FOUND");
}

#[tokio::test]
async fn reupload_is_idempotent_and_revives_garbage() {
    use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, sea_query::Expr};
    use server::entity::storage_object;

    let app = TestApp::spawn().await;
    let content = b"evergreen content";

    let storage_id = app.upload(OWNER, content, "fw.img").await;

    storage_object::Entity::update_many()
        .col_expr(storage_object::Column::Garbage, Expr::value(true))
        .col_expr(
            storage_object::Column::GarbageRemovalAt,
            Expr::value(chrono::Utc::now()),
        )
        .filter(storage_object::Column::StorageId.eq(&storage_id))
        .exec(&app.db)
        .await
        .unwrap();

    let again = app.upload(OWNER, content, "fw.img").await;
    assert_eq!(again, storage_id);

    let object = app.find_object(&storage_id).await.unwrap();
    assert!(!object.garbage);
    assert!(object.garbage_removal_at.is_none());
}

#[tokio::test]
async fn same_content_is_isolated_per_owner() {
    let app = TestApp::spawn().await;
    let content = b"shared bytes";

    let id_a = app.upload("acct-a", content, "fw.img").await;
    let id_b = app.upload("acct-b", content, "fw.img").await;

    assert_ne!(id_a, id_b);
    assert!(app.object_file(&id_a).exists());
    assert!(app.object_file(&id_b).exists());

    // A token scoped to one owner never serves the other's copy.
    let token = app.get_token(&id_a, content.len() as i64, "fw.img");
    let res = app.get(&routes::object(&token)).await;
    assert_eq!(res.status, 200);
    assert_eq!(res.bytes, content);
}

#[tokio::test]
async fn healthz_reports_ok() {
    let app = TestApp::spawn().await;

    let res = app.get(routes::HEALTHZ).await;
    assert_eq!(res.status, 200);
    assert_eq!(res.body["status"], "ok");
}
