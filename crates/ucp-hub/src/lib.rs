//! Capability hub between an AI orchestrator and UCP merchants.
//!
//! This crate implements the hub side of the Universal Commerce Protocol,
//! providing:
//!
//! - Merchant discovery from the well-known manifest
//! - A capability registry with just-in-time schema disclosure
//! - Ed25519 request signing with per-call idempotency keys
//! - Operation shape inference (create / update / transition)
//! - Retries that never duplicate a merchant side effect
//! - Scoped payment mandates (handler, amount, currency, expiry)
//!
//! # Quick Start
//!
//! ```no_run
//! use ucp_hub::{HubConfig, UcpProxy};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let proxy = UcpProxy::from_config(HubConfig::load(None)?)?;
//!
//! // Summaries only; no schemas yet
//! proxy.discover("https://shop.example.com").await?;
//! let hits = proxy.search("checkout").await;
//!
//! // Disclose the schema of the one capability we need
//! let checkout = proxy.resolve(&hits[0].name).await?;
//! println!("schema: {}", checkout.input_schema);
//!
//! proxy.select_payment_method("gpay", "10.00", "USD").await?;
//! let outcome = proxy
//!     .call(&checkout.name, serde_json::json!({"currency": "USD"}))
//!     .await?;
//! println!("created: {}", outcome.body);
//! # Ok(())
//! # }
//! ```
//!
//! # Configuration
//!
//! | Environment Variable | Description |
//! |---------------------|-------------|
//! | `UCP_CONFIG_PATH` | YAML config file (default: `./config.yaml` if present) |
//! | `UCP_AGENT_PROFILE` | Profile sent as `UCP-Agent: profile=...` |
//! | `UCP_SERVER_URL` | Default merchant base URL |
//! | `UCP_HTTP_TIMEOUT_MS` | Per-attempt timeout (default: 10000) |
//! | `UCP_MAX_RETRIES` | Retries on 5xx/transport failure (default: 2) |
//! | `UCP_REQUIRE_TLS` | Require https for non-local merchants (default: true) |
//! | `UCP_SIGNING_KEY_PATH` | PKCS#8 PEM Ed25519 key (ephemeral if unset) |

pub mod canonicalize;
pub mod config;
pub mod currency;
mod digest;
pub mod error;
pub mod mandate;
pub mod proxy;
pub mod registry;
pub mod signer;
pub mod types;

// Re-export main types
pub use config::HubConfig;
pub use currency::Currency;
pub use error::{ErrorKind, ErrorReport, HubError, HubResult};
pub use mandate::{MandatePayload, MandateVerifier, PaymentMandate};
pub use proxy::{
    CallOutcome, CallShape, PreparedCall, ShapeRule, SignedRequest, UcpProxy, ACTION_ARG, ID_ARG,
};
pub use registry::CapabilityRegistry;
pub use signer::{compute_key_id_from_key, verify_signature, Signer};
pub use types::{
    Capability, CapabilityState, CapabilitySummary, Manifest, ManifestCapability, OperationKind,
    PaymentHandler,
};

// Canonical signing input
pub use canonicalize::{canonical_request_bytes, to_canonical_jcs_bytes};
