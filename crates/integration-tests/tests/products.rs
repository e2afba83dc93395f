//! Product fetching and lazy hydration integration tests.

#![allow(clippy::unwrap_used)]

use serde_json::json;
use wavecart::error::Error;
use wavecart::shop::ShopApi;
use wavecart::{ApiClient, Config, Credentials};
use wavecart_core::{Price, ProductId};
use wavecart_integration_tests::{on_command, respond, test_shop};
use wiremock::MockServer;
use wiremock::matchers::body_string_contains;

#[tokio::test]
async fn products_by_id_returns_handles() {
    let server = MockServer::start().await;
    on_command("products")
        .respond_with(respond(
            "products",
            json!({
                "ids": {
                    "227838": { "id": 227838, "name": "Blusenshirt", "active": true,
                                "sale": false },
                    "287677": { "id": 287677, "name": "Boxershorts", "active": true,
                                "sale": true }
                }
            }),
        ))
        .mount(&server)
        .await;

    let shop = test_shop(&server.uri());
    let products = shop
        .products_by_id(&[ProductId::from(227838), ProductId::from(287677)], None)
        .await
        .unwrap();
    assert_eq!(products.len(), 2);
    assert_eq!(products[0].name().await.unwrap(), "Blusenshirt");
    assert!(products[1].sale().await.unwrap());
}

#[tokio::test]
async fn rejected_ids_surface_as_partial_failure() {
    let server = MockServer::start().await;
    on_command("products")
        .respond_with(respond(
            "products",
            json!({
                "ids": {
                    "227838": { "id": 227838, "name": "Blusenshirt" },
                    "999999": { "error_message": "product not found",
                                "error_code": 404 }
                }
            }),
        ))
        .mount(&server)
        .await;

    let shop = test_shop(&server.uri());
    let result = shop
        .products_by_id(&[ProductId::from(227838), ProductId::from(999_999)], None)
        .await;
    match result {
        Err(Error::ProductsPartialFailure { found, failed }) => {
            assert_eq!(found.len(), 1);
            assert_eq!(found[0].id(), ProductId::from(227838));
            assert_eq!(failed, vec![(ProductId::from(999_999), "product not found".to_string())]);
        }
        other => panic!("expected partial failure, got {other:?}"),
    }
}

#[tokio::test]
async fn absent_fields_hydrate_on_demand() {
    let server = MockServer::start().await;
    // the hydration request names the missing field; the initial fetch
    // does not ask for descriptions
    on_command("products")
        .and(body_string_contains("description_long"))
        .respond_with(respond(
            "products",
            json!({
                "ids": {
                    "227838": {
                        "id": 227838,
                        "description_short": "Kurz",
                        "description_long": "Lang",
                        "sale": false
                    }
                }
            }),
        ))
        .expect(1)
        .mount(&server)
        .await;
    on_command("products")
        .respond_with(respond(
            "products",
            json!({ "ids": { "227838": { "id": 227838, "name": "Blusenshirt",
                                          "active": true, "sale": false } } }),
        ))
        .expect(1)
        .mount(&server)
        .await;

    let shop = test_shop(&server.uri());
    let products = shop
        .products_by_id(&[ProductId::from(227838)], None)
        .await
        .unwrap();
    let product = &products[0];

    // already loaded, no second request
    assert_eq!(product.name().await.unwrap(), "Blusenshirt");

    // triggers exactly one hydration carrying the detail bundle
    assert_eq!(product.description_long().await.unwrap(), "Lang");
    assert_eq!(product.description_short().await.unwrap(), "Kurz");
}

#[tokio::test]
async fn hydration_is_refused_when_auto_fetch_is_off() {
    let server = MockServer::start().await;
    on_command("products")
        .respond_with(respond(
            "products",
            json!({ "ids": { "227838": { "id": 227838, "sale": false } } }),
        ))
        .expect(1)
        .mount(&server)
        .await;

    let api = ApiClient::new(
        Credentials::new("110", "test-token"),
        Config {
            entry_point_url: format!("{}/api", server.uri()),
            auto_fetch: false,
            ..Config::default()
        },
    )
    .unwrap();
    let shop = ShopApi::new(api);

    let products = shop
        .products_by_id(&[ProductId::from(227838)], None)
        .await
        .unwrap();
    assert!(matches!(
        products[0].name().await,
        Err(Error::FieldNotLoaded(field)) if field == "name"
    ));
}

#[tokio::test]
async fn variants_expose_typed_fields_and_attributes() {
    let server = MockServer::start().await;
    on_command("facet_types")
        .respond_with(respond("facet_types", json!([1])))
        .mount(&server)
        .await;
    on_command("facets")
        .respond_with(respond(
            "facets",
            json!({
                "facet": [{ "id": 570, "group_id": 1, "group_name": "color",
                            "name": "rot", "value": "rot" }]
            }),
        ))
        .mount(&server)
        .await;
    on_command("products")
        .respond_with(respond(
            "products",
            json!({
                "ids": {
                    "227838": {
                        "id": 227838,
                        "variants": [{
                            "id": 4760437,
                            "ean": "8806159322381",
                            "price": 3990,
                            "quantity": 3,
                            "default": true,
                            "attributes_1": [570, 999],
                            "first_sale_date": "2013-05-17 10:44:59",
                            "images": [{ "hash": "c0d7ba1a", "mime": "image/jpeg" }]
                        }]
                    }
                }
            }),
        ))
        .mount(&server)
        .await;

    let shop = test_shop(&server.uri());
    let products = shop
        .products_by_id(&[ProductId::from(227838)], None)
        .await
        .unwrap();
    let variants = products[0].variants().await.unwrap();
    assert_eq!(variants.len(), 1);

    let variant = &variants[0];
    assert_eq!(variant.price().unwrap(), Price::from_cents(3990));
    assert_eq!(variant.quantity().unwrap(), 3);
    assert!(variant.first_sale_date().unwrap().is_some());
    assert_eq!(
        variant.images()[0].url(Some(50), None).unwrap(),
        "http://cdn.mary-paul.de/file/c0d7ba1a?width=50"
    );

    // known attribute ids resolve, unknown ones become placeholders
    let attributes = variant.attributes().await.unwrap();
    let colors = attributes.by_group_name("color").unwrap();
    assert_eq!(colors[0].name().unwrap(), "rot");
    assert_eq!(colors[1].name().unwrap(), "unknown_999");
}

#[tokio::test]
async fn derived_fields_hydrate_without_the_detail_bundle() {
    let server = MockServer::start().await;
    // a variants fetch must ask for variants alone, not drag the
    // description bundle along
    on_command("products")
        .and(body_string_contains("\"variants\""))
        .and(body_string_contains("description_short"))
        .respond_with(respond("products", json!({ "ids": {} })))
        .expect(0)
        .mount(&server)
        .await;
    on_command("products")
        .and(body_string_contains("\"variants\""))
        .respond_with(respond(
            "products",
            json!({
                "ids": {
                    "227838": {
                        "id": 227838,
                        "variants": [{ "id": 4760437, "price": 3990 }]
                    }
                }
            }),
        ))
        .expect(1)
        .mount(&server)
        .await;
    on_command("products")
        .respond_with(respond(
            "products",
            json!({ "ids": { "227838": { "id": 227838, "sale": false } } }),
        ))
        .mount(&server)
        .await;

    let shop = test_shop(&server.uri());
    let products = shop
        .products_by_id(&[ProductId::from(227838)], None)
        .await
        .unwrap();
    let variants = products[0].variants().await.unwrap();
    assert_eq!(variants.len(), 1);
}

#[tokio::test]
async fn styles_resolve_to_sibling_products() {
    let server = MockServer::start().await;
    on_command("products")
        .and(body_string_contains("\"styles\""))
        .respond_with(respond(
            "products",
            json!({
                "ids": {
                    "227838": {
                        "id": 227838,
                        "styles": [{ "id": 227839, "name": "Blusenshirt blau",
                                     "sale": false }]
                    }
                }
            }),
        ))
        .expect(1)
        .mount(&server)
        .await;
    on_command("products")
        .respond_with(respond(
            "products",
            json!({ "ids": { "227838": { "id": 227838, "sale": false } } }),
        ))
        .mount(&server)
        .await;

    let shop = test_shop(&server.uri());
    let products = shop
        .products_by_id(&[ProductId::from(227838)], None)
        .await
        .unwrap();
    let styles = products[0].styles().await.unwrap();
    assert_eq!(styles.len(), 1);
    assert_eq!(styles[0].id(), ProductId::from(227839));
}

#[tokio::test]
async fn products_resolve_by_ean() {
    let server = MockServer::start().await;
    on_command("products_eans")
        .respond_with(respond(
            "products_eans",
            json!({ "eans": [{ "id": 287677, "name": "Boxershorts", "sale": false }] }),
        ))
        .mount(&server)
        .await;

    let shop = test_shop(&server.uri());
    let products = shop
        .products_by_ean(&["8806159322381"], None)
        .await
        .unwrap();
    assert_eq!(products.len(), 1);
    assert_eq!(products[0].id(), ProductId::from(287677));
}
