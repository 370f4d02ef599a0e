//! HTTP-level behavior of the LTS and SWR clients

use ams_cloud::RemoteOutcome;
use ams_cloud_huawei::{HttpLtsApi, HttpSwrApi, LtsApi, RegistryApi, Signer};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header_exists, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn lts(server: &MockServer) -> HttpLtsApi {
    HttpLtsApi::new(&server.uri(), "proj", Signer::new("ak", "sk")).unwrap()
}

#[tokio::test]
async fn create_stream_returns_vendor_id() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v2/proj/groups/g1/streams"))
        .and(header_exists("X-Sdk-Date"))
        .and(header_exists("Authorization"))
        .and(body_partial_json(json!({"log_stream_name": "s1", "ttl_in_days": 7})))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"log_stream_id": "sid-1"})))
        .expect(1)
        .mount(&server)
        .await;

    let outcome = lts(&server).await.create_stream("g1", "s1", Some(7)).await.unwrap();
    assert_eq!(outcome, RemoteOutcome::Success("sid-1".to_string()));
}

#[tokio::test]
async fn duplicate_stream_is_already_exists() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v2/proj/groups/g1/streams"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "request_id": "req-1",
            "error_code": "LTS.0205",
            "error_msg": "The log stream name already exists"
        })))
        .mount(&server)
        .await;

    let outcome = lts(&server).await.create_stream("g1", "s1", None).await.unwrap();
    match outcome {
        RemoteOutcome::AlreadyExists(error) => {
            assert_eq!(error.request_id, "req-1");
            assert_eq!(error.status, 400);
        }
        other => panic!("unexpected outcome {:?}", other),
    }
}

#[tokio::test]
async fn list_streams_decodes_entries() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v2/proj/groups/g1/streams"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "log_streams": [
                {"log_stream_id": "a", "log_stream_name": "one", "creation_time": 1},
                {"log_stream_id": "b", "log_stream_name": "two", "creation_time": 2}
            ]
        })))
        .mount(&server)
        .await;

    let streams = lts(&server)
        .await
        .list_streams("g1")
        .await
        .unwrap()
        .into_result()
        .unwrap();
    assert_eq!(streams.len(), 2);
    assert_eq!(streams[1].log_stream_id, "b");
}

#[tokio::test]
async fn delete_stream_outcomes() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/v2/proj/groups/g1/streams/ok"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/v2/proj/groups/g1/streams/gone"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error_code": "LTS.0208", "error_msg": "The log stream does not exist"
        })))
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/v2/proj/groups/g1/streams/busy"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error_code": "LTS.0207", "error_msg": "associated by transfer"
        })))
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/v2/proj/groups/g1/streams/broken"))
        .respond_with(ResponseTemplate::new(500).set_body_string("upstream failure"))
        .mount(&server)
        .await;

    let api = lts(&server).await;
    assert_eq!(
        api.delete_stream("g1", "ok").await.unwrap(),
        RemoteOutcome::Success(())
    );
    assert!(matches!(
        api.delete_stream("g1", "gone").await.unwrap(),
        RemoteOutcome::NotFound(_)
    ));
    assert!(matches!(
        api.delete_stream("g1", "busy").await.unwrap(),
        RemoteOutcome::Associated(_)
    ));
    match api.delete_stream("g1", "broken").await.unwrap() {
        RemoteOutcome::Other(error) => {
            assert_eq!(error.status, 500);
            assert_eq!(error.message, "upstream failure");
        }
        other => panic!("unexpected outcome {:?}", other),
    }
}

#[tokio::test]
async fn create_rule_reads_first_array_item() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v2/proj/lts/aom-mapping"))
        .and(query_param("isBatch", "false"))
        .and(body_partial_json(json!({"project_id": "proj", "rule_name": "AMS-log-p-a-stg-zeus"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"project_id": "proj", "rule_id": "rule-1", "rule_name": "AMS-log-p-a-stg-zeus"}
        ])))
        .mount(&server)
        .await;

    let cluster = ams_cloud::ClusterConfig::default();
    let rule = ams_cloud_huawei::MappingRule::for_container(
        "AMS-log-p-a-stg-zeus",
        &cluster,
        "stg",
        "p-a",
        "sid",
        "sname",
    );
    let outcome = lts(&server).await.create_rule(&rule).await.unwrap();
    assert_eq!(outcome, RemoteOutcome::Success("rule-1".to_string()));
}

#[tokio::test]
async fn rule_errors_use_nested_shape() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/v2/proj/lts/aom-mapping"))
        .and(query_param("id", "rule-x"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "message": {"code": "LTS.0745", "details": "invalid rule id"}
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v2/proj/lts/aom-mapping"))
        .and(query_param("log_group_name", "gname"))
        .and(query_param("log_stream_name", "sname"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"rule_id": "rule-1", "rule_name": "r",
             "rule_info": {"files": [{"file_name": "__ALL_FILES__",
                "log_stream_info": {"target_log_stream_id": "sid"}}]}}
        ])))
        .mount(&server)
        .await;

    let api = lts(&server).await;
    match api.delete_rule("rule-x").await.unwrap() {
        RemoteOutcome::NotFound(error) => assert_eq!(error.message, "invalid rule id"),
        other => panic!("unexpected outcome {:?}", other),
    }

    let rules = api
        .list_rules("gname", "sname")
        .await
        .unwrap()
        .into_result()
        .unwrap();
    assert!(rules[0].targets_stream("sid"));
}

#[tokio::test]
async fn swr_missing_repository_is_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v2/manage/namespaces/qt-apps/repos/missing"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "errorCode": "SVCSTG.SWR.4040000", "errorMessage": "repo not found"
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v2/manage/namespaces/qt-apps/repos/shop/tags"))
        .and(query_param("order_column", "updated_at"))
        .and(query_param("order_type", "desc"))
        .and(query_param("offset", "20"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"image_id": "i1", "Tag": "v9", "repo_id": 3, "digest": "sha256:1", "size": 10,
             "created": "2024-05-01T00:00:00Z", "updated": "2024-05-02T00:00:00Z"}
        ])))
        .mount(&server)
        .await;

    let api = HttpSwrApi::new(&server.uri(), Signer::new("ak", "sk")).unwrap();
    assert!(matches!(
        api.image_count("qt-apps", "missing").await.unwrap(),
        RemoteOutcome::NotFound(_)
    ));

    let tags = api
        .list_tags("qt-apps", "shop", 20, 20)
        .await
        .unwrap()
        .into_result()
        .unwrap();
    assert_eq!(tags.len(), 1);
    assert_eq!(tags[0].tag, "v9");
}
