//! `ucp-hub keygen` / `ucp-hub jwk` - signing key management.

use anyhow::{Context, Result};
use ucp_hub::{HubConfig, Signer};

use super::super::args::KeygenArgs;
use super::print_json;

pub fn keygen(args: KeygenArgs) -> Result<()> {
    if args.out.exists() && !args.force {
        anyhow::bail!(
            "signing key already exists: {} (use --force to overwrite)",
            args.out.display()
        );
    }
    if let Some(parent) = args.out.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory: {}", parent.display()))?;
    }

    let signer = Signer::generate()?;
    signer.write_pkcs8_pem(&args.out)?;

    print_json(&serde_json::json!({
        "key_id": signer.key_id(),
        "path": args.out.display().to_string(),
    }))
}

pub fn jwk(config: HubConfig) -> Result<()> {
    let signer = Signer::from_config(&config)?;
    print_json(&signer.public_jwk())
}
