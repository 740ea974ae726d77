//! `ucp-hub mandate` - issue a payment mandate without a merchant.

use std::time::Duration;

use anyhow::Result;
use ucp_hub::{Currency, HubConfig, Signer};

use super::super::args::MandateArgs;
use super::print_json;

pub fn run(config: HubConfig, args: MandateArgs) -> Result<()> {
    let signer = Signer::from_config(&config)?;
    let ttl = args
        .ttl_secs
        .map(Duration::from_secs)
        .unwrap_or_else(|| config.mandate_ttl());

    let currency = Currency::from_code(&args.currency)?;
    let amount_minor = currency.parse_amount(&args.amount)?;
    let mandate = signer.issue_mandate(&args.handler, amount_minor, currency.code(), ttl)?;

    print_json(&mandate)
}
