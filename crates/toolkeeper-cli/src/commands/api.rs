use clap::Args;
use toolkeeper_core::api::{Body, Method, RequestConfig};

use super::{print_json, AppContext, CliResult};

#[derive(Args)]
pub struct ApiArgs {
    /// HTTP method (GET, POST, PUT, PATCH, DELETE)
    method: String,
    /// Endpoint path, e.g. /api/tools
    endpoint: String,
    /// JSON request body
    #[arg(long)]
    body: Option<String>,
    /// Extra header as NAME:VALUE (repeatable)
    #[arg(long = "header", short = 'H')]
    headers: Vec<String>,
}

pub async fn run(args: ApiArgs) -> CliResult {
    let method = Method::from_bytes(args.method.to_uppercase().as_bytes())
        .map_err(|_| format!("invalid method: {}", args.method))?;

    let mut config = RequestConfig::new(method);
    if let Some(raw) = args.body {
        let value: serde_json::Value =
            serde_json::from_str(&raw).map_err(|e| format!("--body is not valid JSON: {e}"))?;
        config = config.body(Body::Json(value));
    }
    for header in &args.headers {
        let (name, value) = header
            .split_once(':')
            .ok_or_else(|| format!("header must be NAME:VALUE, got '{header}'"))?;
        config = config.header(name.trim(), value.trim());
    }

    let ctx = AppContext::load().await?;
    let response = ctx.client.request(&args.endpoint, config).await?;
    print_json(&response)
}
