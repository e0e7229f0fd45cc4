//! services/api/src/bin/openapi.rs
//!
//! Writes the OpenAPI document for the REST API to disk, for client
//! codegen and for review in CI.

use api_lib::web::rest::ApiDoc;
use utoipa::OpenApi;

const OUTPUT_PATH: &str = "openapi.json";

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let document = ApiDoc::openapi().to_pretty_json()?;
    std::fs::write(OUTPUT_PATH, document)?;
    println!("OpenAPI document written to {OUTPUT_PATH}");
    Ok(())
}
