use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "ucp-hub",
    version,
    about = "Capability hub for UCP merchants: discovery, signed calls and payment mandates"
)]
pub struct Cli {
    /// YAML config file (default: $UCP_CONFIG_PATH, then ./config.yaml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    pub json_logs: bool,

    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Fetch a merchant manifest and list capability summaries
    Discover(DiscoverArgs),
    /// Search discovered capabilities by keyword
    Search(SearchArgs),
    /// Show the full schema of one capability
    Resolve(ResolveArgs),
    /// Invoke a capability with signed headers
    Call(CallArgs),
    /// Issue a payment mandate
    Mandate(MandateArgs),
    /// Generate an Ed25519 signing key (PKCS#8 PEM)
    Keygen(KeygenArgs),
    /// Print the public signing key as a JWK
    Jwk,
}

#[derive(Args, Debug, Clone)]
pub struct MerchantArgs {
    /// Merchant base URL (default: server_url from config)
    #[arg(long)]
    pub url: Option<String>,
}

#[derive(Args, Debug)]
pub struct DiscoverArgs {
    #[command(flatten)]
    pub merchant: MerchantArgs,
}

#[derive(Args, Debug)]
pub struct SearchArgs {
    #[command(flatten)]
    pub merchant: MerchantArgs,

    /// Keywords or part of a capability name
    #[arg(long)]
    pub query: String,
}

#[derive(Args, Debug)]
pub struct ResolveArgs {
    #[command(flatten)]
    pub merchant: MerchantArgs,

    /// Capability name (e.g., dev.ucp.shopping.checkout)
    #[arg(long)]
    pub name: String,
}

#[derive(Args, Debug)]
pub struct CallArgs {
    #[command(flatten)]
    pub merchant: MerchantArgs,

    /// Capability name
    #[arg(long)]
    pub name: String,

    /// Arguments as a JSON object
    #[arg(long, default_value = "{}")]
    pub args: String,

    /// Arm a payment mandate for this handler before calling
    #[arg(long, requires_all = ["amount", "currency"])]
    pub handler: Option<String>,

    /// Mandate amount as a decimal (e.g., 10.00)
    #[arg(long, requires = "handler")]
    pub amount: Option<String>,

    /// Mandate currency (ISO 4217)
    #[arg(long, requires = "handler")]
    pub currency: Option<String>,
}

#[derive(Args, Debug)]
pub struct MandateArgs {
    /// Payment handler id
    #[arg(long)]
    pub handler: String,

    /// Amount as a decimal (e.g., 10.00)
    #[arg(long)]
    pub amount: String,

    /// ISO 4217 currency code
    #[arg(long)]
    pub currency: String,

    /// Lifetime in seconds (default: mandate_ttl_secs from config)
    #[arg(long)]
    pub ttl_secs: Option<u64>,
}

#[derive(Args, Debug)]
pub struct KeygenArgs {
    /// Output path for the private key
    #[arg(long, default_value = "hub_signing_key.pem")]
    pub out: PathBuf,

    /// Force overwrite existing file
    #[arg(long, short)]
    pub force: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_call_mandate_flags_go_together() {
        let parsed = Cli::try_parse_from([
            "ucp-hub", "call", "--name", "shop.checkout", "--handler", "gpay",
        ]);
        assert!(parsed.is_err());

        let parsed = Cli::try_parse_from([
            "ucp-hub",
            "call",
            "--name",
            "shop.checkout",
            "--handler",
            "gpay",
            "--amount",
            "10.00",
            "--currency",
            "USD",
        ])
        .unwrap();
        match parsed.cmd {
            Command::Call(args) => {
                assert_eq!(args.args, "{}");
                assert_eq!(args.amount.as_deref(), Some("10.00"));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let parsed =
            Cli::try_parse_from(["ucp-hub", "jwk", "--config", "hub.yaml", "--json-logs"]).unwrap();
        assert!(parsed.json_logs);
        assert_eq!(parsed.config, Some(PathBuf::from("hub.yaml")));
    }
}
