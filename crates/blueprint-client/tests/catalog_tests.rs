use std::time::{Duration, Instant};

use blueprint_client::{CurseForgeClient, ModrinthClient};
use blueprint_core::addons::{AddonCatalog, Taxonomy};
use blueprint_core::config::HttpConfig;
use blueprint_core::error::AppError;
use pretty_assertions::assert_eq;
use serde_json::json;
use wiremock::matchers::{header, method, path, path_regex, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn fast_config() -> HttpConfig {
    HttpConfig {
        timeout: Duration::from_secs(5),
        max_retries: 3,
        retry_base_delay: Duration::from_millis(1),
    }
}

fn curseforge(server: &MockServer) -> CurseForgeClient {
    CurseForgeClient::with_config(&server.uri(), "cf-key", &fast_config()).unwrap()
}

fn modrinth(server: &MockServer) -> ModrinthClient {
    ModrinthClient::with_config(&server.uri(), &fast_config()).unwrap()
}

#[tokio::test]
async fn curseforge_search_sends_filters_and_key() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/mods/search"))
        .and(header("x-api-key", "cf-key"))
        .and(query_param("gameId", "432"))
        .and(query_param("classId", "6"))
        .and(query_param("searchFilter", "create"))
        .and(query_param("index", "50"))
        .and(query_param("pageSize", "25"))
        .and(query_param("sortField", "downloadCount"))
        .and(query_param("sortOrder", "desc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{"id": 328085, "name": "Create"}],
            "pagination": {"index": 50, "pageSize": 25}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let mods = curseforge(&server).search_mods(50, 25, "create").await.unwrap();
    assert_eq!(mods.len(), 1);
    assert_eq!(mods[0].id, 328085);
}

#[tokio::test]
async fn curseforge_retries_rate_limit() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/mods/search"))
        .respond_with(ResponseTemplate::new(429))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/mods/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": []})))
        .mount(&server)
        .await;

    let mods = curseforge(&server).search_mods(0, 10, "create").await.unwrap();
    assert!(mods.is_empty());
}

#[tokio::test]
async fn curseforge_rate_limit_exhausts_retries() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/mods/search"))
        .respond_with(ResponseTemplate::new(429))
        .expect(3)
        .mount(&server)
        .await;

    let err = curseforge(&server)
        .search_mods(0, 10, "create")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::RetriesExhausted { attempts: 3 }));
}

#[tokio::test]
async fn curseforge_server_error_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/mods/search"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;

    let err = curseforge(&server)
        .search_mods(0, 10, "create")
        .await
        .unwrap_err();
    assert!(err.to_string().contains("HTTP 500"));
}

#[tokio::test]
async fn curseforge_categories_excluding_modpacks() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/categories"))
        .and(query_param("gameId", "432"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [
                {"id": 412, "name": "Technology", "slug": "technology"},
                {"id": 4471, "name": "Modpacks", "slug": "modpacks"},
                {"id": 420, "name": "Storage", "slug": "storage"}
            ]
        })))
        .mount(&server)
        .await;

    let client = curseforge(&server);
    assert_eq!(client.categories().await.unwrap().len(), 3);
    assert_eq!(
        client.categories_excluding_modpacks().await.unwrap(),
        vec![412, 420]
    );
}

#[tokio::test]
async fn curseforge_fetch_page_attaches_descriptions() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/mods/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [
                {"id": 1, "name": "Create"},
                {"id": 2, "name": "Broken Description"}
            ]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/mods/1/description"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"data": "<p>Gears</p>"})),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/mods/2/description"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let page = curseforge(&server)
        .fetch_page(0, 2, "create", &Taxonomy::default())
        .await
        .unwrap();

    assert_eq!(page.fetched, 2);
    assert_eq!(page.addons.len(), 2);
    assert_eq!(page.addons[0].body, "<p>Gears</p>");
    assert_eq!(page.addons[1].body, "");
}

#[tokio::test]
async fn curseforge_request_delay_spaces_description_lookups() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/mods/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{"id": 1, "name": "Create"}, {"id": 2, "name": "Flywheel"}]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/mods/\d+/description$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": "<p>x</p>"})))
        .expect(2)
        .mount(&server)
        .await;

    let client = curseforge(&server).with_request_delay(Duration::from_millis(150));
    let started = Instant::now();
    let page = client
        .fetch_page(0, 2, "create", &Taxonomy::default())
        .await
        .unwrap();

    // One search and two description lookups, each waiting on the previous.
    assert_eq!(page.addons.len(), 2);
    assert!(started.elapsed() >= Duration::from_millis(300));
}

#[tokio::test]
async fn modrinth_search_uses_mod_facet() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .and(query_param("query", "create"))
        .and(query_param("limit", "20"))
        .and(query_param("offset", "40"))
        .and(query_param("facets", r#"[["project_type:mod"]]"#))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "hits": [{"project_id": "LNytGWDc", "title": "Create"}],
            "offset": 40,
            "limit": 20,
            "total_hits": 41
        })))
        .expect(1)
        .mount(&server)
        .await;

    let hits = modrinth(&server).search_mods(40, 20, "create").await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].project_id.as_deref(), Some("LNytGWDc"));
}

#[tokio::test]
async fn modrinth_project_and_dependencies() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/project/create"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "LNytGWDc",
            "slug": "create",
            "title": "Create",
            "body": "# Create"
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/project/LNytGWDc/dependencies"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "projects": [{"id": "P7dR8mSH"}],
            "versions": []
        })))
        .mount(&server)
        .await;

    let client = modrinth(&server);
    let project = client.project("create").await.unwrap();
    assert_eq!(project.body.as_deref(), Some("# Create"));

    let deps = client.dependencies("LNytGWDc").await.unwrap();
    assert_eq!(deps.projects.len(), 1);
    assert!(deps.versions.is_empty());
}

#[tokio::test]
async fn modrinth_consecutive_requests_are_spaced() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/project/create"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "LNytGWDc",
            "slug": "create",
            "title": "Create"
        })))
        .expect(3)
        .mount(&server)
        .await;

    let client = modrinth(&server).with_request_delay(Duration::from_millis(100));
    let started = Instant::now();
    for _ in 0..3 {
        client.project("create").await.unwrap();
    }
    assert!(started.elapsed() >= Duration::from_millis(200));
}

#[tokio::test]
async fn modrinth_fetch_page_normalizes_hits() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "hits": [
                {
                    "project_id": "LNytGWDc",
                    "slug": "create",
                    "title": "Create",
                    "categories": ["technology", "forge"],
                    "versions": ["1.20.1"]
                },
                {"downloads": 1}
            ]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/project/create"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "LNytGWDc",
            "body": "Long body"
        })))
        .mount(&server)
        .await;

    let page = modrinth(&server)
        .fetch_page(0, 2, "create", &Taxonomy::default())
        .await
        .unwrap();

    assert_eq!(page.fetched, 2);
    assert_eq!(page.filtered(), 1);
    let addon = &page.addons[0];
    assert_eq!(addon.body, "Long body");
    assert_eq!(addon.loaders, vec!["forge"]);
    assert_eq!(addon.categories, vec!["technology"]);
}
