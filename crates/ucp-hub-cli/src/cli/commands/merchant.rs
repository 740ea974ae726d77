//! `ucp-hub discover|search|resolve|call` - merchant-facing commands.
//!
//! Each invocation is its own session, so every command discovers the
//! merchant first.

use anyhow::Result;
use tracing::info;
use ucp_hub::{HubConfig, HubError, UcpProxy};

use super::super::args::{CallArgs, DiscoverArgs, ResolveArgs, SearchArgs};
use super::{discovered_proxy, merchant_url, print_json};

pub async fn discover(config: HubConfig, args: DiscoverArgs) -> Result<()> {
    let url = merchant_url(&args.merchant, &config)?;
    let proxy = UcpProxy::from_config(config)?;
    let summaries = proxy.discover(&url).await?;
    info!(capabilities = summaries.len(), "discovery complete");
    print_json(&summaries)
}

pub async fn search(config: HubConfig, args: SearchArgs) -> Result<()> {
    let proxy = discovered_proxy(config, &args.merchant).await?;
    print_json(&proxy.search(&args.query).await)
}

pub async fn resolve(config: HubConfig, args: ResolveArgs) -> Result<()> {
    let proxy = discovered_proxy(config, &args.merchant).await?;
    print_json(&proxy.resolve(&args.name).await?)
}

pub async fn call(config: HubConfig, args: CallArgs) -> Result<()> {
    let call_args: serde_json::Value = serde_json::from_str(&args.args)
        .map_err(|e| HubError::InvalidArguments {
            name: args.name.clone(),
            message: format!("--args is not valid JSON: {}", e),
        })?;

    let proxy = discovered_proxy(config, &args.merchant).await?;

    if let (Some(handler), Some(amount), Some(currency)) =
        (&args.handler, &args.amount, &args.currency)
    {
        proxy
            .select_payment_method(handler, amount, currency)
            .await?;
    }

    let outcome = proxy.call(&args.name, call_args).await?;
    print_json(&outcome)
}
