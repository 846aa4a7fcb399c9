//! gRPC E2E tests: a generated client against a live server.
//!
//! Each test uses its own port.

use pretty_assertions::assert_eq;
use tonic::Code;

use ann_service::pb;
use e2e_tests::{GrpcHarness, TestHarness};

fn object(id: &str, vector: Vec<f32>) -> Option<pb::ObjectVector> {
    Some(pb::ObjectVector {
        id: id.to_string(),
        vector,
        timestamp: 0,
    })
}

fn insert(id: &str, vector: Vec<f32>) -> pb::InsertRequest {
    pb::InsertRequest {
        vector: object(id, vector),
        config: None,
    }
}

fn search_config(num: u32) -> Option<pb::SearchConfig> {
    Some(pb::SearchConfig {
        request_id: "q".to_string(),
        num,
        ..Default::default()
    })
}

#[tokio::test(flavor = "multi_thread")]
async fn test_insert_commit_search_over_grpc() {
    let server = GrpcHarness::start(TestHarness::new(3), 50301).await;
    let mut client = server.client().await;

    let location = client
        .insert(insert("a", vec![1.0, 2.0, 3.0]))
        .await
        .unwrap()
        .into_inner();
    assert_eq!(location.uuid, "a");
    client.insert(insert("b", vec![3.0, 2.0, 1.0])).await.unwrap();

    client
        .create_index(pb::CreateIndexRequest { pool_size: 1 })
        .await
        .unwrap();
    let count = client.index_info(pb::Empty {}).await.unwrap().into_inner();
    assert_eq!((count.stored, count.uncommitted), (2, 0));

    let resp = client
        .search(pb::SearchRequest {
            vector: vec![1.0, 2.0, 3.1],
            config: search_config(1),
        })
        .await
        .unwrap()
        .into_inner();
    assert_eq!(resp.results[0].id, "a");

    let by_id = client
        .linear_search_by_id(pb::SearchByIdRequest {
            id: "b".to_string(),
            config: search_config(2),
        })
        .await
        .unwrap()
        .into_inner();
    assert_eq!(by_id.results[0].id, "b");
    assert_eq!(by_id.results.len(), 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_error_codes_over_grpc() {
    let server = GrpcHarness::start(TestHarness::new(3), 50302).await;
    let mut client = server.client().await;

    let status = client
        .create_index(pb::CreateIndexRequest { pool_size: 0 })
        .await
        .unwrap_err();
    assert_eq!(status.code(), Code::FailedPrecondition);

    client.insert(insert("a", vec![1.0, 1.0, 1.0])).await.unwrap();
    let status = client
        .insert(insert("a", vec![1.0, 1.0, 1.0]))
        .await
        .unwrap_err();
    assert_eq!(status.code(), Code::AlreadyExists);

    let status = client
        .insert(insert("", vec![1.0, 1.0, 1.0]))
        .await
        .unwrap_err();
    assert_eq!(status.code(), Code::InvalidArgument);

    let status = client
        .get_object(pb::ObjectId {
            id: "missing".to_string(),
        })
        .await
        .unwrap_err();
    assert_eq!(status.code(), Code::NotFound);

    client
        .create_index(pb::CreateIndexRequest { pool_size: 0 })
        .await
        .unwrap();
    let status = client
        .search(pb::SearchRequest {
            vector: vec![1.0, 1.0],
            config: search_config(1),
        })
        .await
        .unwrap_err();
    assert_eq!(status.code(), Code::InvalidArgument);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_multi_search_by_id_over_grpc() {
    let server = GrpcHarness::start(TestHarness::new(4), 50303).await;
    server.harness.insert_random("v", 30, 21);
    let mut client = server.client().await;
    client
        .create_index(pb::CreateIndexRequest { pool_size: 8 })
        .await
        .unwrap();

    let requests = (0..5)
        .map(|i| pb::SearchByIdRequest {
            id: format!("v-{}", i),
            config: Some(pb::SearchConfig {
                request_id: format!("q{}", i),
                num: 3,
                ..Default::default()
            }),
        })
        .collect();
    let resp = client
        .multi_linear_search_by_id(pb::MultiSearchByIdRequest { requests })
        .await
        .unwrap()
        .into_inner();

    assert_eq!(resp.responses.len(), 5);
    for (i, r) in resp.responses.iter().enumerate() {
        assert_eq!(r.request_id, format!("q{}", i));
        assert_eq!(r.results[0].id, format!("v-{}", i));
    }

    let requests = vec![
        pb::SearchByIdRequest {
            id: "v-0".to_string(),
            config: search_config(1),
        },
        pb::SearchByIdRequest {
            id: "nope".to_string(),
            config: search_config(1),
        },
    ];
    let status = client
        .multi_search_by_id(pb::MultiSearchByIdRequest { requests })
        .await
        .unwrap_err();
    assert_eq!(status.code(), Code::NotFound);
    assert!(status.message().contains("nope"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_stream_list_object_and_remove_by_timestamp() {
    let server = GrpcHarness::start(TestHarness::new(2), 50304).await;
    let mut client = server.client().await;

    for (i, ts) in [10_i64, 20, 30].iter().enumerate() {
        client
            .insert(pb::InsertRequest {
                vector: Some(pb::ObjectVector {
                    id: format!("t{}", i),
                    vector: vec![i as f32, 0.0],
                    timestamp: 0,
                }),
                config: Some(pb::InsertConfig {
                    skip_strict_exist_check: false,
                    timestamp: *ts,
                }),
            })
            .await
            .unwrap();
    }
    client
        .create_index(pb::CreateIndexRequest { pool_size: 0 })
        .await
        .unwrap();

    let mut stream = client
        .stream_list_object(pb::ListObjectRequest {})
        .await
        .unwrap()
        .into_inner();
    let mut ids = Vec::new();
    while let Some(obj) = stream.message().await.unwrap() {
        ids.push((obj.id, obj.timestamp));
    }
    assert_eq!(
        ids,
        vec![
            ("t0".to_string(), 10),
            ("t1".to_string(), 20),
            ("t2".to_string(), 30)
        ]
    );

    // Records with timestamp <= 20
    let removed = client
        .remove_by_timestamp(pb::RemoveByTimestampRequest {
            timestamps: vec![pb::Timestamp {
                timestamp: 20,
                operator: pb::timestamp::Operator::Ge as i32,
            }],
        })
        .await
        .unwrap()
        .into_inner();
    assert_eq!(removed.locations.len(), 2);

    client
        .create_and_save_index(pb::CreateIndexRequest { pool_size: 0 })
        .await
        .unwrap();
    let meta = client
        .get_object_meta(pb::ObjectId {
            id: "t2".to_string(),
        })
        .await
        .unwrap()
        .into_inner();
    assert_eq!(meta.timestamp, 30);
    let count = client.index_info(pb::Empty {}).await.unwrap().into_inner();
    assert_eq!(count.stored, 1);
    assert_eq!(count.save_count, 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_update_timestamp_and_flush_over_grpc() {
    let server = GrpcHarness::start(TestHarness::new(2), 50305).await;
    let mut client = server.client().await;

    client
        .insert(pb::InsertRequest {
            vector: object("a", vec![1.0, 0.0]),
            config: Some(pb::InsertConfig {
                skip_strict_exist_check: false,
                timestamp: 100,
            }),
        })
        .await
        .unwrap();

    let status = client
        .update_timestamp(pb::UpdateTimestampRequest {
            id: "a".to_string(),
            timestamp: 50,
            force: false,
        })
        .await
        .unwrap_err();
    assert_eq!(status.code(), Code::InvalidArgument);

    client
        .update_timestamp(pb::UpdateTimestampRequest {
            id: "a".to_string(),
            timestamp: 200,
            force: false,
        })
        .await
        .unwrap();
    let meta = client
        .get_object_meta(pb::ObjectId { id: "a".to_string() })
        .await
        .unwrap()
        .into_inner();
    assert_eq!(meta.timestamp, 200);

    let count = client.flush(pb::Empty {}).await.unwrap().into_inner();
    assert_eq!((count.stored, count.uncommitted), (0, 0));
    let status = client
        .exists(pb::ObjectId { id: "a".to_string() })
        .await
        .unwrap_err();
    assert_eq!(status.code(), Code::NotFound);
}
