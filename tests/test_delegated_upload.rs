mod helpers;

use axum::http::StatusCode;
use helpers::{PostServer, Reply, TEST_BUCKET, body, full_api_config, post_only_config};
use s3os::{InMemoryStorage, OsSession, S3Driver, S3OsInfo, S3Session, StorageError};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

async fn post_only_driver(server: &PostServer) -> S3Driver {
    S3Driver::new(post_only_config(&server.url)).await.unwrap()
}

#[tokio::test]
async fn test_post_upload_success() {
    let server = PostServer::start(Reply::default()).await;
    let driver = post_only_driver(&server).await;
    let session = driver.new_session("streamB");
    let info = session.get_info();

    let url = session
        .save_data("seg1.ts", body(b"segment bytes"), &HashMap::new(), None)
        .await
        .unwrap();
    assert_eq!(url, format!("{}/{}/streamB/seg1.ts", server.url, TEST_BUCKET));

    let posts = server.posts();
    assert_eq!(posts.len(), 1);
    let post = &posts[0];

    assert_eq!(post.path, format!("/{}", TEST_BUCKET));
    assert_eq!(post.fields["acl"], "public-read");
    assert_eq!(post.fields["Content-Type"], "video/mp2t");
    assert_eq!(post.fields["key"], "streamB/${filename}");
    assert_eq!(post.fields["policy"], info.policy);
    assert_eq!(post.fields["x-amz-algorithm"], "AWS4-HMAC-SHA256");
    assert_eq!(post.fields["x-amz-credential"], info.credential);
    assert_eq!(post.fields["x-amz-date"], info.x_amz_date);
    assert_eq!(post.fields["x-amz-signature"], info.signature);
    assert_eq!(post.fields.len(), 8);

    assert_eq!(post.file_name.as_deref(), Some("seg1.ts"));
    assert_eq!(post.file, b"segment bytes");
    assert_eq!(post.field_order.last().map(String::as_str), Some("file"));
}

#[tokio::test]
async fn test_post_upload_nested_name() {
    let server = PostServer::start(Reply::default()).await;
    let driver = post_only_driver(&server).await;
    let session = driver.new_session("streamB");

    let url = session
        .save_data("720p/seg2.ts", body(b"x"), &HashMap::new(), None)
        .await
        .unwrap();
    assert!(url.ends_with("/streamB/720p/seg2.ts"));

    let post = &server.posts()[0];
    assert_eq!(post.fields["key"], "streamB/720p/${filename}");
    assert_eq!(post.file_name.as_deref(), Some("seg2.ts"));
}

#[tokio::test]
async fn test_grant_handoff_to_external_session() {
    let server = PostServer::start(Reply::default()).await;
    let driver = post_only_driver(&server).await;
    let origin = driver.new_session("streamB");

    // The grant travels as JSON to another process
    let wire = serde_json::to_string(&origin.get_info()).unwrap();
    let info: S3OsInfo = serde_json::from_str(&wire).unwrap();
    assert_eq!(info, origin.get_info());

    let remote = S3Session::from_info(info.clone());
    assert!(remote.is_external());
    assert!(!origin.is_external());
    assert_eq!(remote.get_info(), info);

    origin
        .save_data("a.ts", body(b"from origin"), &HashMap::new(), None)
        .await
        .unwrap();
    let url = remote
        .save_data("b.ts", body(b"from remote"), &HashMap::new(), None)
        .await
        .unwrap();
    assert_eq!(url, format!("{}/streamB/b.ts", info.host));

    let posts = server.posts();
    assert_eq!(posts.len(), 2);
    for field in ["policy", "x-amz-credential", "x-amz-date", "x-amz-signature", "key"] {
        assert_eq!(posts[0].fields[field], posts[1].fields[field], "{}", field);
    }
    assert_eq!(posts[1].file, b"from remote");

    assert!(matches!(
        remote.read_data("streamB/a.ts").await,
        Err(StorageError::NotImplemented)
    ));
    assert!(matches!(
        remote.list_files(None, None).await,
        Err(StorageError::NotImplemented)
    ));
}

#[tokio::test]
async fn test_grant_from_full_api_custom_host() {
    let server = PostServer::start(Reply::default()).await;
    let mut config = full_api_config();
    config.host = Some(server.url.clone());
    let driver = S3Driver::with_backend(config, Arc::new(InMemoryStorage::new()));
    let origin = driver.new_session("streamA");
    assert!(origin.has_full_api());

    let info = origin.get_info();
    assert_eq!(info.host, format!("{}/{}", server.url, TEST_BUCKET));

    let remote = S3Session::from_info(info);
    let url = remote
        .save_data("seg1.ts", body(b"handed over"), &HashMap::new(), None)
        .await
        .unwrap();
    assert_eq!(url, origin.abs_url("streamA/seg1.ts"));

    let posts = server.posts();
    assert_eq!(posts.len(), 1);
    assert_eq!(posts[0].path, format!("/{}", TEST_BUCKET));
    assert_eq!(posts[0].fields["key"], "streamA/${filename}");
}

#[tokio::test]
async fn test_error_body_on_ok_response() {
    let error_xml = "<Error><Code>AccessDenied</Code><Message>Policy expired</Message></Error>";
    let server = PostServer::start(Reply {
        status: StatusCode::OK,
        body: error_xml.to_string(),
        ..Default::default()
    })
    .await;
    let driver = post_only_driver(&server).await;
    let session = driver.new_session("streamB");

    let err = session
        .save_data("seg1.ts", body(b"data"), &HashMap::new(), None)
        .await
        .unwrap_err();

    match err {
        StorageError::UploadRejected(detail) => assert_eq!(detail, error_xml),
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn test_error_status_without_body() {
    let server = PostServer::start(Reply {
        status: StatusCode::FORBIDDEN,
        ..Default::default()
    })
    .await;
    let driver = post_only_driver(&server).await;
    let session = driver.new_session("streamB");

    let err = session
        .save_data("seg1.ts", body(b"data"), &HashMap::new(), None)
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::UploadRejected(_)));
    assert!(err.to_string().contains("403"));
}

#[tokio::test]
async fn test_post_upload_timeout() {
    let server = PostServer::start(Reply {
        delay: Duration::from_secs(5),
        ..Default::default()
    })
    .await;
    let driver = post_only_driver(&server).await;
    let session = driver.new_session("streamB");

    let err = session
        .save_data(
            "seg1.ts",
            body(b"data"),
            &HashMap::new(),
            Some(Duration::from_millis(200)),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::Timeout(_)));
    assert!(err.is_timeout());
}

#[tokio::test]
async fn test_unreachable_endpoint_is_transport_error() {
    let session = S3Session::from_info(S3OsInfo {
        host: "http://127.0.0.1:9".to_string(),
        key: "streamB".to_string(),
        policy: "e30=".to_string(),
        signature: "00".to_string(),
        credential: "AKID/20240101/us-east-1/s3/aws4_request".to_string(),
        x_amz_date: "20240101T000000Z".to_string(),
    });

    let err = session
        .save_data("seg1.ts", body(b"data"), &HashMap::new(), None)
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::Transport(_)));
}
