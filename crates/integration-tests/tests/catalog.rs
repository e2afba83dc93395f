//! Category tree and facet index integration tests.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use wavecart::error::Error;
use wavecart::shop::{FACET_GROUP_COLOR, SIMPLE_COLOR_FACETS, ShopApi};
use wavecart::{ApiClient, Config, Credentials, MemoryCache};
use wavecart_core::CategoryId;
use wavecart_integration_tests::{on_command, respond, test_shop};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn category_tree_payload() -> serde_json::Value {
    json!([
        {
            "id": 16077, "name": "Damen", "active": true, "position": 1,
            "sub_categories": [
                { "id": 16078, "name": "Shirts", "active": true, "position": 1,
                  "sub_categories": [] },
                { "id": 16079, "name": "Sale", "active": true, "position": 2,
                  "sub_categories": [] }
            ]
        },
        {
            "id": 16080, "name": "Herren", "active": true, "position": 2,
            "sub_categories": [
                { "id": 16081, "name": "Shirts", "active": true, "position": 1,
                  "sub_categories": [] }
            ]
        }
    ])
}

async fn mount_facets(server: &MockServer) {
    on_command("facet_types")
        .respond_with(respond("facet_types", json!([1, 2])))
        .mount(server)
        .await;
    on_command("facets")
        .respond_with(respond(
            "facets",
            json!({
                "facet": [
                    { "id": 570, "group_id": 1, "group_name": "color",
                      "name": "rot", "value": "rot" },
                    { "id": 168, "group_id": 1, "group_name": "color",
                      "name": "blau", "value": "blau" },
                    { "id": 22, "group_id": 2, "group_name": "size",
                      "name": "XS", "value": "XS" }
                ]
            }),
        ))
        .mount(server)
        .await;
}

#[tokio::test]
async fn category_tree_is_fetched_once_and_indexed() {
    let server = MockServer::start().await;
    on_command("category_tree")
        .respond_with(respond("category_tree", category_tree_payload()))
        .expect(1)
        .mount(&server)
        .await;

    let shop = test_shop(&server.uri());
    let roots = shop.categories().await.unwrap();
    assert_eq!(roots.len(), 2);
    assert_eq!(roots[0].name, "Damen");

    // id lookup reaches into the tree, name lookup is last-wins
    let sale = shop.category_by_id(CategoryId::from(16079)).await.unwrap();
    assert_eq!(sale.parent, Some(CategoryId::from(16077)));
    let shirts = shop.category_by_name("Shirts").await.unwrap();
    assert_eq!(shirts.id, CategoryId::from(16081));

    // a second access runs against the index, not the API
    shop.categories().await.unwrap();
    assert!(matches!(
        shop.category_by_id(CategoryId::from(99)).await,
        Err(Error::NotFound(_))
    ));
}

#[tokio::test]
async fn category_tree_round_trips_through_external_cache() {
    let server = MockServer::start().await;
    on_command("category_tree")
        .respond_with(respond("category_tree", category_tree_payload()))
        .expect(1)
        .mount(&server)
        .await;

    let cache: Arc<MemoryCache> = Arc::new(MemoryCache::new(64, Duration::from_secs(60)));
    let api = || {
        ApiClient::new(
            Credentials::new("110", "test-token"),
            Config {
                entry_point_url: format!("{}/api", server.uri()),
                ..Config::default()
            },
        )
        .unwrap()
    };

    let first = ShopApi::with_cache(api(), cache.clone());
    first.categories().await.unwrap();

    // a fresh client instance rebuilds its index from the cache
    let second = ShopApi::with_cache(api(), cache);
    let roots = second.categories().await.unwrap();
    assert_eq!(roots.len(), 2);
}

#[tokio::test]
async fn facet_index_resolves_groups_by_id_and_name() {
    let server = MockServer::start().await;
    mount_facets(&server).await;

    let shop = test_shop(&server.uri());
    let groups = shop.facet_groups().await.unwrap();
    assert_eq!(groups.len(), 2);

    let color = shop.facet_group_by_key("color").await.unwrap();
    assert_eq!(color.id, FACET_GROUP_COLOR);
    assert_eq!(color.facet(570).unwrap().value().unwrap(), "rot");

    let size = shop.facet_group_by_key("size").await.unwrap();
    assert_eq!(size.facet(22).unwrap().name().unwrap(), "XS");

    assert!(matches!(
        shop.facet_group_by_key("no-such-group").await,
        Err(Error::NotFound(_))
    ));
}

#[tokio::test]
async fn simple_colors_resolve_against_the_color_group() {
    let server = MockServer::start().await;
    let facets: Vec<serde_json::Value> = SIMPLE_COLOR_FACETS
        .iter()
        .map(|id| {
            json!({ "id": id, "group_id": 1, "group_name": "color",
                    "name": format!("farbe_{id}"), "value": format!("farbe_{id}") })
        })
        .collect();
    on_command("facet_types")
        .respond_with(respond("facet_types", json!([1])))
        .mount(&server)
        .await;
    on_command("facets")
        .respond_with(respond("facets", json!({ "facet": facets })))
        .mount(&server)
        .await;

    let shop = test_shop(&server.uri());
    let colors = shop.simple_colors().await.unwrap();
    assert_eq!(colors.len(), 19);
    assert_eq!(colors[0].name().unwrap(), "farbe_570");
}

#[tokio::test]
async fn simple_colors_fail_when_a_listed_color_is_absent() {
    let server = MockServer::start().await;
    // the shop only carries two of the listed colors
    mount_facets(&server).await;

    let shop = test_shop(&server.uri());
    assert!(matches!(
        shop.simple_colors().await,
        Err(Error::NotFound(_))
    ));
}

#[tokio::test]
async fn remote_errors_surface_as_typed_errors() {
    let server = MockServer::start().await;
    on_command("category_tree")
        .respond_with(respond(
            "category_tree",
            json!({ "error_message": "app not allowed", "error_code": 403 }),
        ))
        .mount(&server)
        .await;

    let shop = test_shop(&server.uri());
    assert!(matches!(
        shop.categories().await,
        Err(Error::Remote { code: Some(403), .. })
    ));
}

#[tokio::test]
async fn http_failures_surface_as_transport_errors() {
    let server = MockServer::start().await;
    Mock::given(wiremock::matchers::method("POST"))
        .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
        .mount(&server)
        .await;

    let shop = test_shop(&server.uri());
    match shop.categories().await {
        Err(Error::Transport { status, message }) => {
            assert_eq!(status, Some(502));
            assert!(message.contains("bad gateway"));
        }
        other => panic!("expected transport error, got {other:?}"),
    }
}
