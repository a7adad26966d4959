//! End-to-end behaviour against a mock ManageIQ server.

use crate::client::ClientConfig;
use crate::error::ApiError;
use crate::filters::Q;
use crate::resource::{ActionArgs, ActionOutcome, Actionable, ReloadOptions};
use crate::types::Attribute;
use crate::wait::WaitConfig;
use crate::{Client, Credentials};
use futures::StreamExt;
use mockito::{Matcher, Mock, Server, ServerGuard};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn credentials() -> Credentials {
    Credentials::new("admin", "smartvm")
}

fn json_mock(server: &mut ServerGuard, method: &str, path: &str, body: Value) -> Mock {
    server
        .mock(method, path)
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(body.to_string())
}

async fn root_mock(server: &mut ServerGuard) -> Mock {
    let url = server.url();
    json_mock(
        server,
        "GET",
        "/api",
        json!({
            "name": "API",
            "description": "REST API",
            "version": "1.0",
            "versions": [
                {"name": "1.0", "href": format!("{}/api/v1.0", url)},
                {"name": "10.0", "href": format!("{}/api/v10.0", url)},
                {"name": "2.0", "href": format!("{}/api/v2.0", url)}
            ],
            "collections": [
                {"name": "vms", "href": format!("{}/api/vms", url), "description": "Virtual Machines"},
                {"name": "service_requests", "href": format!("{}/api/service_requests", url), "description": "Service Requests"}
            ]
        }),
    )
    .create_async()
    .await
}

async fn connect(server: &mut ServerGuard) -> Client {
    init_tracing();
    root_mock(server).await;
    Client::connect(&format!("{}/api", server.url()), credentials())
        .await
        .unwrap()
}

fn vm_record(url: &str, id: u32) -> Value {
    json!({
        "id": id.to_string(),
        "href": format!("{}/api/vms/{}", url, id),
        "name": format!("vm{}", id),
        "host_id": "5",
        "created_on": "2017-01-12T10:14:56Z"
    })
}

#[tokio::test]
async fn test_bootstrap_reads_root_manifest() {
    let mut server = Server::new_async().await;
    let client = connect(&mut server).await;

    assert_eq!(client.version(), Some("1.0"));
    assert_eq!(client.versions(), vec!["10.0", "2.0", "1.0"]);
    assert_eq!(client.latest_version().as_deref(), Some("10.0"));
    assert!(!client.on_latest_version());
    assert_eq!(client.attribute("description"), Some(&json!("REST API")));
    assert!(client.attribute("collections").is_none());

    assert_eq!(client.collections().names(), vec!["vms", "service_requests"]);
    assert!(client.collections().contains("vms"));
    let vms = client.collection("vms").unwrap();
    assert_eq!(vms.href(), format!("{}/api/vms", server.url()));
    assert_eq!(vms.description(), Some("Virtual Machines"));
    assert!(client.collection("zones").unwrap_err().is_not_found());
}

#[tokio::test]
async fn test_api_version_bootstraps_alternate_root() {
    let mut server = Server::new_async().await;
    let client = connect(&mut server).await;
    let v2 = json_mock(&mut server, "GET", "/api/v2.0", json!({"version": "2.0", "collections": []}))
        .expect(1)
        .create_async()
        .await;

    let other = client.api_version("2.0").await.unwrap();
    assert_eq!(other.version(), Some("2.0"));
    assert!(other.collections().is_empty());
    v2.assert_async().await;

    assert!(client.api_version("3.0").await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn test_first_attribute_access_fetches_once() {
    let mut server = Server::new_async().await;
    let url = server.url();
    let client = connect(&mut server).await;
    let vm_mock = server
        .mock("GET", "/api/vms/1")
        .with_header("content-type", "application/json")
        .with_body(vm_record(&url, 1).to_string())
        .expect(1)
        .create_async()
        .await;

    let mut vm = client.get_entity("vms", 1, None).await.unwrap();
    assert!(vm.is_incomplete());
    assert_eq!(vm.href(), format!("{}/api/vms/1", url));

    assert_eq!(vm.get("name").await.unwrap().as_str(), Some("vm1"));
    assert!(!vm.is_incomplete());
    assert_eq!(vm.get("name").await.unwrap().as_str(), Some("vm1"));

    let created = vm.get("created_on").await.unwrap();
    assert_eq!(created.as_timestamp().unwrap().to_rfc3339(), "2017-01-12T10:14:56+00:00");

    let host = vm.linked("host").await.unwrap();
    assert_eq!(host.href(), format!("{}/api/hosts/5", url));
    assert_eq!(host.collection().name, "hosts");
    assert!(host.is_incomplete());

    vm_mock.assert_async().await;
}

#[tokio::test]
async fn test_scoped_reloads_merge_fields() {
    let mut server = Server::new_async().await;
    let url = server.url();
    let client = connect(&mut server).await;
    let name_mock = server
        .mock("GET", "/api/vms/2")
        .match_query(Matcher::UrlEncoded("attributes".into(), "name".into()))
        .with_body(json!({"id": "2", "href": format!("{}/api/vms/2", url), "name": "db"}).to_string())
        .expect(1)
        .create_async()
        .await;
    let vendor_mock = server
        .mock("GET", "/api/vms/2")
        .match_query(Matcher::UrlEncoded("attributes".into(), "vendor".into()))
        .with_body(json!({"id": "2", "href": format!("{}/api/vms/2", url), "vendor": "redhat"}).to_string())
        .expect(1)
        .create_async()
        .await;

    let mut vm = client.get_entity("vms", 2, Some(&["name"][..])).await.unwrap();
    assert_eq!(vm.field("name").and_then(Attribute::as_str), Some("db"));

    vm.reload_with(ReloadOptions::new().attributes(["vendor"])).await.unwrap();
    assert_eq!(vm.field("name").and_then(Attribute::as_str), Some("db"));
    assert_eq!(vm.field("vendor").and_then(Attribute::as_str), Some("redhat"));

    name_mock.assert_async().await;
    vendor_mock.assert_async().await;
}

#[tokio::test]
async fn test_collection_counts_load_once() {
    let mut server = Server::new_async().await;
    let url = server.url();
    let client = connect(&mut server).await;
    let page = server
        .mock("GET", "/api/vms")
        .with_body(
            json!({
                "name": "vms",
                "count": 12,
                "subcount": 2,
                "resources": [
                    {"href": format!("{}/api/vms/1", url)},
                    {"href": format!("{}/api/vms/2", url)}
                ]
            })
            .to_string(),
        )
        .expect(1)
        .create_async()
        .await;

    let mut vms = client.collection("vms").unwrap();
    assert_eq!(vms.count().await.unwrap(), 12);
    assert_eq!(vms.subcount().await.unwrap(), 2);

    let entities: Vec<_> = vms.all().await.unwrap().collect::<Result<_, _>>().unwrap();
    assert_eq!(entities.len(), 2);
    assert!(entities.iter().all(|e| e.is_incomplete()));

    page.assert_async().await;
}

#[tokio::test]
async fn test_collection_name_mismatch() {
    let mut server = Server::new_async().await;
    let client = connect(&mut server).await;
    json_mock(
        &mut server,
        "GET",
        "/api/vms",
        json!({"name": "hosts", "count": 0, "subcount": 0, "resources": []}),
    )
    .create_async()
    .await;

    let mut vms = client.collection("vms").unwrap();
    let err = vms.reload().await.unwrap_err();
    assert!(matches!(err, ApiError::NameMismatch { ref actual, .. } if actual == "hosts"));
    assert!(!vms.is_loaded());
}

#[tokio::test]
async fn test_stream_reloads_each_entity() {
    let mut server = Server::new_async().await;
    let url = server.url();
    let client = connect(&mut server).await;
    server
        .mock("GET", "/api/vms")
        .match_query(Matcher::UrlEncoded("expand".into(), "resources".into()))
        .with_body(
            json!({
                "name": "vms",
                "count": 1,
                "subcount": 1,
                "resources": [vm_record(&url, 3)]
            })
            .to_string(),
        )
        .create_async()
        .await;
    let reload = json_mock(&mut server, "GET", "/api/vms/3", vm_record(&url, 3))
        .expect(1)
        .create_async()
        .await;

    let mut vms = client.collection("vms").unwrap();
    let entities: Vec<_> = vms.stream().await.unwrap().collect().await;
    assert_eq!(entities.len(), 1);
    let vm = entities.into_iter().next().unwrap().unwrap();
    assert_eq!(vm.field("name").and_then(Attribute::as_str), Some("vm3"));
    reload.assert_async().await;
}

async fn filter_mock(server: &mut ServerGuard, expression: &str, resources: Value) -> Mock {
    server
        .mock("GET", "/api/vms")
        .match_query(Matcher::UrlEncoded("filter[]".into(), expression.into()))
        .with_body(
            json!({
                "name": "vms",
                "count": 20,
                "subcount": resources.as_array().map(Vec::len).unwrap_or_default(),
                "resources": resources
            })
            .to_string(),
        )
        .create_async()
        .await
}

#[tokio::test]
async fn test_collection_get_by_match_count() {
    let mut server = Server::new_async().await;
    let url = server.url();
    let client = connect(&mut server).await;
    filter_mock(&mut server, "name='none'", json!([])).await;
    filter_mock(&mut server, "name='one'", json!([{"href": format!("{}/api/vms/7", url)}])).await;
    filter_mock(
        &mut server,
        "name='many'",
        json!([
            {"href": format!("{}/api/vms/8", url)},
            {"href": format!("{}/api/vms/9", url)}
        ]),
    )
    .await;
    json_mock(&mut server, "GET", "/api/vms/7", vm_record(&url, 7)).create_async().await;
    json_mock(&mut server, "GET", "/api/vms/8", vm_record(&url, 8)).create_async().await;

    let vms = client.collection("vms").unwrap();

    let err = vms.get([("name", json!("none"))]).await.unwrap_err();
    assert!(err.is_not_found());
    assert!(err.to_string().contains("No such 'vms'"));

    let vm = vms.get([("name", json!("one"))]).await.unwrap();
    assert_eq!(vm.field("name").and_then(Attribute::as_str), Some("vm7"));

    let vm = vms.get([("name", json!("many"))]).await.unwrap();
    assert_eq!(vm.href(), format!("{}/api/vms/8", url));

    let found = vms.filter(&Q::eq("name", json!("many"))).await.unwrap();
    assert_eq!(found.count(), 20);
    assert_eq!(found.subcount(), 2);
    assert_eq!(found.entities().len(), 2);
}

#[tokio::test]
async fn test_domain_error_payload() {
    let mut server = Server::new_async().await;
    let client = connect(&mut server).await;
    json_mock(
        &mut server,
        "GET",
        "/api/vms/3",
        json!({"error": {"klass": "Err", "message": "bad"}}),
    )
    .create_async()
    .await;

    let mut vm = client.get_entity("vms", 3, None).await.unwrap();
    let err = vm.reload().await.unwrap_err();
    assert!(err.is_domain());
    assert_eq!(err.to_string(), "Err: bad");

    assert!(!vm.exists().await.unwrap());
}

#[tokio::test]
async fn test_wait_not_exists_returns_once_gone() {
    let mut server = Server::new_async().await;
    let client = connect(&mut server).await;
    json_mock(
        &mut server,
        "GET",
        "/api/vms/4",
        json!({"status": 404, "error": "Record not found"}),
    )
    .create_async()
    .await;

    let mut vm = client.get_entity("vms", 4, None).await.unwrap();
    let config = WaitConfig::default()
        .timeout(Duration::from_secs(5))
        .interval(Duration::from_millis(10));
    assert!(vm.wait_not_exists(config).await.is_ok());
}

#[tokio::test]
async fn test_non_json_get_is_decode_error() {
    let mut server = Server::new_async().await;
    let client = connect(&mut server).await;
    server
        .mock("GET", "/api/vms/5")
        .with_body("<html>oops</html>")
        .create_async()
        .await;

    let err = client.get("/api/vms/5", &[]).await.unwrap_err();
    assert!(matches!(err, ApiError::Decode(ref body) if body.contains("oops")));
}

#[tokio::test]
async fn test_connection_failure_is_surfaced() {
    init_tracing();
    let config = ClientConfig {
        max_retries: 1,
        ..Default::default()
    };
    let err = Client::connect_with_config("http://127.0.0.1:1/api", credentials(), config)
        .await
        .unwrap_err();
    assert!(err.is_retryable(), "unexpected error {:?}", err);
}

#[tokio::test]
async fn test_declared_subcollection_is_looked_up() {
    let mut server = Server::new_async().await;
    let url = server.url();
    let client = connect(&mut server).await;
    let vm_mock = json_mock(&mut server, "GET", "/api/vms/6", vm_record(&url, 6))
        .expect(2)
        .create_async()
        .await;
    let tags = json_mock(
        &mut server,
        "GET",
        "/api/vms/6/tags",
        json!({"name": "tags", "count": 1, "subcount": 1, "resources": []}),
    )
    .expect(1)
    .create_async()
    .await;

    let mut vm = client.get_entity("vms", 6, None).await.unwrap();
    let collection = vm.get("tags").await.unwrap();
    assert_eq!(
        collection.as_collection().unwrap().href,
        format!("{}/api/vms/6/tags", url)
    );

    let err = vm.get("bogus").await.unwrap_err();
    assert!(err.is_not_found());

    tags.assert_async().await;
    vm_mock.assert_async().await;
}

#[tokio::test]
async fn test_entity_action_invocation() {
    let mut server = Server::new_async().await;
    let url = server.url();
    let client = connect(&mut server).await;
    let mut record = vm_record(&url, 10);
    record["actions"] = json!([
        {"name": "start", "method": "post", "href": format!("{}/api/vms/10", url)}
    ]);
    json_mock(&mut server, "GET", "/api/vms/10", record).create_async().await;
    let start = server
        .mock("POST", "/api/vms/10")
        .match_body(Matcher::Json(json!({"action": "start"})))
        .with_body(json!({"success": true, "message": "VM starting"}).to_string())
        .expect(1)
        .create_async()
        .await;

    let mut vm = client.get_entity("vms", 10, None).await.unwrap();
    assert!(vm.has_action("start").await.unwrap());
    assert!(!vm.has_action("stop").await.unwrap());

    let outcome = vm.execute_action("start", ActionArgs::new()).await.unwrap();
    let results = outcome.into_results().unwrap();
    assert_eq!(results[0].message().unwrap()["message"], "VM starting");

    assert!(vm.execute_action("stop", ActionArgs::new()).await.unwrap_err().is_not_found());
    start.assert_async().await;
}

#[tokio::test]
async fn test_collection_bulk_action() {
    let mut server = Server::new_async().await;
    let url = server.url();
    let client = connect(&mut server).await;
    json_mock(
        &mut server,
        "GET",
        "/api/vms",
        json!({
            "name": "vms",
            "count": 2,
            "subcount": 2,
            "resources": [],
            "actions": [{"name": "retire", "method": "post", "href": format!("{}/api/vms", url)}]
        }),
    )
    .create_async()
    .await;
    server
        .mock("POST", "/api/vms")
        .match_body(Matcher::Json(json!({
            "action": "retire",
            "resources": [
                {"href": format!("{}/api/vms/1", url), "date": "2030-01-01"},
                {"href": format!("{}/api/vms/2", url), "date": "2030-01-01"}
            ]
        })))
        .with_body(
            json!({"results": [
                {"id": 1, "name": "vm1"},
                {"message": "retirement queued", "success": true}
            ]})
            .to_string(),
        )
        .create_async()
        .await;

    let vm1 = client.get_entity("vms", 1, None).await.unwrap();
    let vm2 = client.get_entity("vms", 2, None).await.unwrap();
    let mut vms = client.collection("vms").unwrap();
    let args = ActionArgs::new().resource(&vm1).resource(&vm2).field("date", "2030-01-01");

    let outcome = vms.execute_action("retire", args).await.unwrap();
    let ActionOutcome::Many(results) = outcome else {
        panic!("expected bulk results");
    };
    let results: Vec<_> = results.collect::<Result<_, _>>().unwrap();
    let entity = results[0].clone().into_entity().unwrap();
    assert_eq!(entity.href(), format!("{}/api/vms/1", url));
    assert_eq!(entity.field("name").and_then(Attribute::as_str), Some("vm1"));
    assert_eq!(results[1].message().unwrap()["success"], true);
}

#[tokio::test]
async fn test_blank_action_response_is_empty() {
    let mut server = Server::new_async().await;
    let url = server.url();
    let client = connect(&mut server).await;
    let mut record = vm_record(&url, 11);
    record["actions"] = json!([
        {"name": "delete", "method": "delete", "href": format!("{}/api/vms/11", url)}
    ]);
    json_mock(&mut server, "GET", "/api/vms/11", record).create_async().await;
    server
        .mock("DELETE", "/api/vms/11")
        .with_status(204)
        .create_async()
        .await;

    let mut vm = client.get_entity("vms", 11, None).await.unwrap();
    let outcome = vm.execute_action("delete", ActionArgs::new()).await.unwrap();
    assert!(matches!(outcome, ActionOutcome::Empty));
}

#[tokio::test]
async fn test_relative_hrefs_resolve_against_entry_point() {
    init_tracing();
    let mut server = Server::new_async().await;
    json_mock(
        &mut server,
        "GET",
        "/api",
        json!({
            "collections": [{"name": "vms", "href": "/api/vms", "description": "VMs"}],
            "version": "1.0",
            "versions": []
        }),
    )
    .create_async()
    .await;
    let page = json_mock(
        &mut server,
        "GET",
        "/api/vms",
        json!({"name": "vms", "count": 0, "subcount": 0, "resources": []}),
    )
    .expect(1)
    .create_async()
    .await;

    let client = Client::connect(&format!("{}/api/", server.url()), credentials())
        .await
        .unwrap();
    assert_eq!(client.version(), Some("1.0"));
    assert!(client.versions().is_empty());
    assert!(!client.on_latest_version());

    let mut vms = client.collection("vms").unwrap();
    assert_eq!(vms.href(), "/api/vms");
    assert_eq!(vms.count().await.unwrap(), 0);
    page.assert_async().await;
}

#[tokio::test]
async fn test_missing_name_on_incomplete_entity_fetches_once() {
    let mut server = Server::new_async().await;
    let url = server.url();
    let client = connect(&mut server).await;
    let vm_mock = json_mock(&mut server, "GET", "/api/vms/13", vm_record(&url, 13))
        .expect(1)
        .create_async()
        .await;

    let mut vm = client.get_entity("vms", 13, None).await.unwrap();
    let err = vm.get("power_state").await.unwrap_err();
    assert!(err.is_not_found());
    assert_eq!(err.to_string(), "No such attribute/subcollection power_state");

    vm_mock.assert_async().await;
}

#[tokio::test]
async fn test_first_subcollection_access_fetches_entity_once() {
    let mut server = Server::new_async().await;
    let url = server.url();
    let client = connect(&mut server).await;
    let vm_mock = json_mock(&mut server, "GET", "/api/vms/14", vm_record(&url, 14))
        .expect(1)
        .create_async()
        .await;
    let tags = json_mock(
        &mut server,
        "GET",
        "/api/vms/14/tags",
        json!({"name": "tags", "count": 0, "subcount": 0, "resources": []}),
    )
    .expect(1)
    .create_async()
    .await;

    let mut vm = client.get_entity("vms", 14, None).await.unwrap();
    let tags_collection = vm.subcollection("tags").await.unwrap();
    assert_eq!(tags_collection.href(), format!("{}/api/vms/14/tags", url));
    assert!(!tags_collection.is_loaded());

    vm_mock.assert_async().await;
    tags.assert_async().await;
}

#[tokio::test]
async fn test_failed_materialization_leaves_entity_untouched() {
    let mut server = Server::new_async().await;
    let url = server.url();
    let client = connect(&mut server).await;
    let mut record = vm_record(&url, 12);
    record["created_on"] = json!("yesterday");
    json_mock(&mut server, "GET", "/api/vms/12", record).create_async().await;

    let mut vm = client.get_entity("vms", 12, None).await.unwrap();
    let err = vm.reload().await.unwrap_err();
    assert!(matches!(err, ApiError::MalformedData(_)));

    assert!(vm.is_incomplete());
    assert_eq!(vm.raw().len(), 1);
    assert!(vm.attributes().is_empty());
    assert_eq!(vm.href(), format!("{}/api/vms/12", url));
}

#[tokio::test]
async fn test_root_without_version() {
    init_tracing();
    let mut server = Server::new_async().await;
    json_mock(&mut server, "GET", "/api", json!({"collections": [], "name": "API"}))
        .create_async()
        .await;

    let client = Client::connect(&format!("{}/api", server.url()), credentials())
        .await
        .unwrap();
    assert_eq!(client.version(), None);
    assert_eq!(client.latest_version(), None);
    assert!(client.on_latest_version());
    assert_eq!(client.attribute("name"), Some(&json!("API")));
    assert!(client.collections().is_empty());
}

#[tokio::test]
async fn test_indexed_access_reloads_entity() {
    let mut server = Server::new_async().await;
    let url = server.url();
    let client = connect(&mut server).await;
    let page = json_mock(
        &mut server,
        "GET",
        "/api/vms",
        json!({
            "name": "vms",
            "count": 2,
            "subcount": 2,
            "resources": [
                {"href": format!("{}/api/vms/1", url)},
                {"href": format!("{}/api/vms/2", url)}
            ]
        }),
    )
    .expect(1)
    .create_async()
    .await;
    let second = json_mock(&mut server, "GET", "/api/vms/2", vm_record(&url, 2))
        .expect(1)
        .create_async()
        .await;

    let mut vms = client.collection("vms").unwrap();
    let vm = vms.nth(1).await.unwrap();
    assert!(!vm.is_incomplete());
    assert_eq!(vm.field("name").and_then(Attribute::as_str), Some("vm2"));

    assert!(vms.nth(5).await.unwrap_err().is_not_found());

    page.assert_async().await;
    second.assert_async().await;
}

#[tokio::test]
async fn test_all_is_restartable_without_refetch() {
    let mut server = Server::new_async().await;
    let url = server.url();
    let client = connect(&mut server).await;
    let page = json_mock(
        &mut server,
        "GET",
        "/api/vms",
        json!({
            "name": "vms",
            "count": 2,
            "subcount": 2,
            "resources": [vm_record(&url, 1), vm_record(&url, 2)]
        }),
    )
    .expect(1)
    .create_async()
    .await;

    let mut vms = client.collection("vms").unwrap();
    let entities = vms.all().await.unwrap();
    let restarted = entities.clone();

    let first: Vec<String> = entities.map(|e| e.unwrap().href().to_string()).collect();
    let second: Vec<String> = restarted.map(|e| e.unwrap().href().to_string()).collect();
    assert_eq!(first, second);
    assert_eq!(first.len(), 2);

    assert_eq!(vms.all().await.unwrap().count(), 2);
    page.assert_async().await;
}

#[tokio::test]
async fn test_search_result_stream_reloads_each_match() {
    let mut server = Server::new_async().await;
    let url = server.url();
    let client = connect(&mut server).await;
    filter_mock(
        &mut server,
        "vendor='redhat'",
        json!([
            {"href": format!("{}/api/vms/8", url)},
            {"href": format!("{}/api/vms/9", url)}
        ]),
    )
    .await;
    let eight = json_mock(&mut server, "GET", "/api/vms/8", vm_record(&url, 8))
        .expect(1)
        .create_async()
        .await;
    let nine = json_mock(&mut server, "GET", "/api/vms/9", vm_record(&url, 9))
        .expect(1)
        .create_async()
        .await;

    let vms = client.collection("vms").unwrap();
    let found = vms.find_by([("vendor", json!("redhat"))]).await.unwrap();
    let entities: Vec<_> = found.into_stream().collect().await;
    let names: Vec<_> = entities
        .into_iter()
        .map(|e| e.unwrap().field("name").and_then(Attribute::as_str).map(str::to_string))
        .collect();
    assert_eq!(names, vec![Some("vm8".to_string()), Some("vm9".to_string())]);

    eight.assert_async().await;
    nine.assert_async().await;
}

/// Serve `/api` on a raw socket, hanging up on the first `drops` connections.
async fn flaky_root(drops: u32) -> (String, Arc<AtomicU32>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let accepted = Arc::new(AtomicU32::new(0));
    let counter = accepted.clone();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            if counter.fetch_add(1, Ordering::SeqCst) < drops {
                drop(socket);
                continue;
            }

            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                match socket.read(&mut buf).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => request.extend_from_slice(&buf[..n]),
                }
            }

            let body = r#"{"version": "1.0", "collections": []}"#;
            let response = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                body.len(),
                body
            );
            let _ = socket.write_all(response.as_bytes()).await;
            let _ = socket.shutdown().await;
        }
    });

    (format!("http://{}/api", addr), accepted)
}

#[tokio::test]
async fn test_dropped_connections_are_retried_until_success() {
    init_tracing();
    let (entry_point, accepted) = flaky_root(2).await;

    let client = Client::connect(&entry_point, credentials()).await.unwrap();
    assert_eq!(client.version(), Some("1.0"));
    assert_eq!(accepted.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_dropped_connections_exhaust_retry_budget() {
    init_tracing();
    let (entry_point, accepted) = flaky_root(u32::MAX).await;

    let err = Client::connect_with_config(&entry_point, credentials(), ClientConfig::default())
        .await
        .unwrap_err();
    assert!(err.is_retryable(), "unexpected error {:?}", err);
    assert_eq!(accepted.load(Ordering::SeqCst), 3);
}
