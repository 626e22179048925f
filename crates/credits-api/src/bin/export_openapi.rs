//! OpenAPI Schema Export Binary
//!
//! Prints the OpenAPI specification as JSON to stdout.
//!
//! Usage:
//!   cargo run -p credits-api --bin export-openapi > openapi.json

use credits_api::openapi::ApiDoc;
use utoipa::OpenApi;

fn main() {
    let openapi_json = ApiDoc::openapi()
        .to_pretty_json()
        .expect("Failed to serialize OpenAPI spec to JSON");

    println!("{}", openapi_json);
}
