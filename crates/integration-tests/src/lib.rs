//! Shared harness for the SDK integration tests.
//!
//! Every test runs the real client against a [`wiremock`] server that
//! plays the shop API: requests land on `POST /api` as a one element
//! command envelope, responses mirror it. The helpers here build clients
//! pointed at the mock server and envelope-shaped responses.

use serde_json::{Map, Value};
use wavecart::api::ApiClient;
use wavecart::config::{Config, Credentials};
use wavecart::shop::ShopApi;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockBuilder, ResponseTemplate};

/// App id used by all tests.
pub const TEST_APP_ID: &str = "110";

/// Session id used by all tests.
pub const TEST_SESSION: &str = "test-session";

/// Client configuration pointed at the mock server.
#[must_use]
pub fn test_config(server_uri: &str) -> Config {
    Config {
        entry_point_url: format!("{server_uri}/api"),
        ..Config::default()
    }
}

/// A shop client talking to the mock server.
#[must_use]
pub fn test_shop(server_uri: &str) -> ShopApi {
    ShopApi::new(test_api(server_uri))
}

/// A raw API client talking to the mock server.
///
/// # Panics
///
/// Panics when the HTTP client cannot be built.
#[must_use]
pub fn test_api(server_uri: &str) -> ApiClient {
    ApiClient::new(
        Credentials::new(TEST_APP_ID, "test-token"),
        test_config(server_uri),
    )
    .expect("client construction cannot fail for valid config")
}

/// Wrap `payload` in the response envelope for `command`.
#[must_use]
pub fn envelope(command: &str, payload: Value) -> Value {
    let mut entry = Map::new();
    entry.insert(command.to_string(), payload);
    Value::Array(vec![Value::Object(entry)])
}

/// A 200 response carrying `payload` enveloped for `command`.
#[must_use]
pub fn respond(command: &str, payload: Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(envelope(command, payload))
}

/// A mock matching the API call for `command`.
///
/// The request body is the compact serialized envelope, so the quoted
/// command name appears verbatim exactly for the matching command
/// (`"category"` does not match a `category_tree` body).
#[must_use]
pub fn on_command(command: &str) -> MockBuilder {
    Mock::given(method("POST"))
        .and(path("/api"))
        .and(body_string_contains(format!("\"{command}\"")))
}
