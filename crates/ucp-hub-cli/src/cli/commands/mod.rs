use std::path::Path;

use anyhow::Result;
use serde::Serialize;
use ucp_hub::{HubConfig, HubError, UcpProxy};

use super::args::MerchantArgs;

pub mod dispatch;
pub mod key;
pub mod mandate;
pub mod merchant;

pub use dispatch::dispatch;

pub(crate) fn load_config(path: Option<&Path>) -> Result<HubConfig> {
    Ok(HubConfig::load(path)?)
}

/// Merchant URL from the flag, else from config.
pub(crate) fn merchant_url(args: &MerchantArgs, config: &HubConfig) -> Result<String> {
    args.url
        .clone()
        .or_else(|| config.server_url.clone())
        .ok_or_else(|| {
            HubError::Config {
                message: "no merchant URL: pass --url or set server_url".to_string(),
            }
            .into()
        })
}

/// Proxy with the given merchant already discovered.
pub(crate) async fn discovered_proxy(
    config: HubConfig,
    merchant: &MerchantArgs,
) -> Result<UcpProxy> {
    let url = merchant_url(merchant, &config)?;
    let proxy = UcpProxy::from_config(config)?;
    proxy.discover(&url).await?;
    Ok(proxy)
}

pub(crate) fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
