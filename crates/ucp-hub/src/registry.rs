//! Capability registry with just-in-time schema disclosure.
//!
//! `register` (driven by discovery) and `search` only ever hand out
//! [`CapabilitySummary`] values. The full input schema leaves the registry
//! through [`CapabilityRegistry::resolve`], which moves the capability from
//! `Discovered` to `Disclosed`.
//!
//! Each merchant endpoint has its own session behind its own
//! mutex. The endpoint map lock is only held long enough to find or swap a
//! session, so work on one merchant never waits on another.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

use crate::error::{HubError, HubResult};
use crate::types::{
    Capability, CapabilityState, CapabilitySummary, Manifest, ManifestCapability, PaymentHandler,
};

/// Words too common to be useful search keywords.
const STOPWORDS: &[&str] = &[
    "and", "are", "for", "from", "into", "its", "the", "this", "that", "with", "via", "all",
];

/// Per-endpoint discovery state.
#[derive(Debug)]
struct MerchantSession {
    endpoint: String,
    protocol_version: Option<String>,
    capabilities: Vec<Capability>,
    index: HashMap<String, usize>,
    disclosed: HashSet<String>,
    payment_handlers: Vec<PaymentHandler>,
    discovered_at: DateTime<Utc>,
}

impl MerchantSession {
    fn from_manifest(
        endpoint: &str,
        manifest: Manifest,
        max_capabilities: usize,
    ) -> HubResult<Self> {
        let malformed = |message: String| HubError::Discovery {
            endpoint: endpoint.to_string(),
            message,
        };

        let entries = manifest.ucp.capabilities;
        if entries.is_empty() {
            return Err(malformed("manifest lists no capabilities".to_string()));
        }
        if entries.len() > max_capabilities {
            return Err(malformed(format!(
                "manifest lists {} capabilities, limit is {}",
                entries.len(),
                max_capabilities
            )));
        }

        let mut capabilities = Vec::with_capacity(entries.len());
        let mut index = HashMap::with_capacity(entries.len());
        for entry in entries {
            let name = entry.name.trim().to_string();
            if name.is_empty() {
                return Err(malformed("capability with empty name".to_string()));
            }
            if index.contains_key(&name) {
                return Err(malformed(format!("duplicate capability name: {name}")));
            }
            index.insert(name.clone(), capabilities.len());
            capabilities.push(capability_from_entry(endpoint, name, entry));
        }

        Ok(Self {
            endpoint: endpoint.to_string(),
            protocol_version: manifest.ucp.version,
            capabilities,
            index,
            disclosed: HashSet::new(),
            payment_handlers: manifest.payment.map(|p| p.handlers).unwrap_or_default(),
            discovered_at: Utc::now(),
        })
    }

    fn summaries(&self) -> Vec<CapabilitySummary> {
        self.capabilities.iter().map(Capability::summary).collect()
    }

    fn get(&self, name: &str) -> Option<&Capability> {
        self.index.get(name).map(|&i| &self.capabilities[i])
    }

    fn state(&self, name: &str) -> Option<CapabilityState> {
        self.get(name).map(|_| {
            if self.disclosed.contains(name) {
                CapabilityState::Disclosed
            } else {
                CapabilityState::Discovered
            }
        })
    }
}

fn capability_from_entry(endpoint: &str, name: String, entry: ManifestCapability) -> Capability {
    let resource_path = entry
        .resource
        .as_deref()
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .map(|r| {
            if r.starts_with('/') {
                r.to_string()
            } else {
                format!("/{r}")
            }
        })
        .unwrap_or_else(|| default_resource_path(&name));

    let keywords = derive_keywords(&name, entry.description.as_deref(), &entry.keywords);

    Capability {
        version: entry.version,
        description: entry.description,
        spec_url: entry.spec,
        input_schema: entry
            .input_schema
            .unwrap_or_else(|| serde_json::json!({"type": "object"})),
        resource_path,
        operation_kind: entry.operation,
        action: entry.action.filter(|a| !a.trim().is_empty()),
        keywords,
        endpoint: endpoint.to_string(),
        name,
    }
}

/// `dev.ucp.shopping.checkout` -> `/checkout`
fn default_resource_path(name: &str) -> String {
    let last = name.rsplit('.').next().unwrap_or(name);
    format!("/{}", last.replace('_', "-"))
}

fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
}

fn derive_keywords(name: &str, description: Option<&str>, declared: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut keywords = Vec::new();

    let from_description = description
        .into_iter()
        .flat_map(tokenize)
        .filter(|t| t.chars().count() >= 3 && !STOPWORDS.contains(&t.as_str()));

    for keyword in tokenize(name)
        .chain(declared.iter().flat_map(|k| tokenize(k)))
        .chain(from_description)
    {
        if seen.insert(keyword.clone()) {
            keywords.push(keyword);
        }
    }
    keywords
}

/// Relevance of one capability for the given query tokens; 0 means no match.
fn score(capability: &Capability, tokens: &[String], whole_query: &str) -> u32 {
    let name = capability.name.to_lowercase();
    let segments: Vec<String> = tokenize(&capability.name).collect();

    let mut total = 0;
    for token in tokens {
        total += if segments.iter().any(|s| s == token) {
            3
        } else if capability.keywords.iter().any(|k| k == token) {
            2
        } else if name.contains(token.as_str())
            || capability.keywords.iter().any(|k| k.starts_with(token.as_str()))
        {
            1
        } else {
            0
        };
    }

    if total > 0 && tokens.len() > 1 && name.contains(whole_query) {
        total += 1;
    }
    total
}

/// Session handle; `generation` orders sessions by discovery time.
#[derive(Debug, Clone)]
struct SessionHandle {
    generation: u64,
    session: Arc<Mutex<MerchantSession>>,
}

/// Registry of discovered capabilities, one session per merchant endpoint.
#[derive(Debug)]
pub struct CapabilityRegistry {
    sessions: RwLock<HashMap<String, SessionHandle>>,
    generation: AtomicU64,
    max_capabilities: usize,
}

impl CapabilityRegistry {
    pub fn new(max_capabilities: usize) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            generation: AtomicU64::new(0),
            max_capabilities,
        }
    }

    /// Replace the session for `endpoint` with the capabilities in `manifest`.
    ///
    /// The previous session (and its disclosed set) is dropped wholesale only
    /// once the new manifest has been fully validated.
    pub async fn register(
        &self,
        endpoint: &str,
        manifest: Manifest,
    ) -> HubResult<Vec<CapabilitySummary>> {
        let session = MerchantSession::from_manifest(endpoint, manifest, self.max_capabilities)?;
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let summaries = session.summaries();

        info!(
            endpoint = %endpoint,
            capabilities = summaries.len(),
            payment_handlers = session.payment_handlers.len(),
            protocol_version = session.protocol_version.as_deref().unwrap_or("unversioned"),
            discovered_at = %session.discovered_at,
            generation,
            "registered merchant capabilities"
        );

        let handle = SessionHandle {
            generation,
            session: Arc::new(Mutex::new(session)),
        };
        self.sessions
            .write()
            .await
            .insert(endpoint.to_string(), handle);

        Ok(summaries)
    }

    /// Token search over names and keywords of every session.
    pub async fn search(&self, query: &str) -> Vec<CapabilitySummary> {
        let tokens: Vec<String> = tokenize(query).collect();
        if tokens.is_empty() {
            return Vec::new();
        }
        let whole_query = query.trim().to_lowercase();

        let mut hits: Vec<(u32, u64, usize, CapabilitySummary)> = Vec::new();
        for handle in self.sessions_newest_first().await {
            let session = handle.session.lock().await;
            for (position, capability) in session.capabilities.iter().enumerate() {
                let relevance = score(capability, &tokens, &whole_query);
                if relevance > 0 {
                    hits.push((relevance, handle.generation, position, capability.summary()));
                }
            }
        }

        hits.sort_by(|a, b| b.0.cmp(&a.0).then(b.1.cmp(&a.1)).then(a.2.cmp(&b.2)));
        debug!(query = %query, matches = hits.len(), "capability search");
        hits.into_iter().map(|(_, _, _, summary)| summary).collect()
    }

    /// Full capability, marking it disclosed.
    pub async fn resolve(&self, name: &str) -> HubResult<Capability> {
        for handle in self.sessions_newest_first().await {
            let mut session = handle.session.lock().await;
            if let Some(capability) = session.get(name).cloned() {
                if session.disclosed.insert(name.to_string()) {
                    debug!(name = %name, endpoint = %session.endpoint, "capability disclosed");
                }
                return Ok(capability);
            }
        }
        Err(HubError::UnknownCapability {
            name: name.to_string(),
        })
    }

    /// Full capability for dispatch, without disclosing it to the caller.
    pub(crate) async fn lookup(&self, name: &str) -> HubResult<Capability> {
        for handle in self.sessions_newest_first().await {
            let session = handle.session.lock().await;
            if let Some(capability) = session.get(name) {
                return Ok(capability.clone());
            }
        }
        Err(HubError::UnknownCapability {
            name: name.to_string(),
        })
    }

    /// Lifecycle state of `name` in the newest session that knows it.
    pub async fn state(&self, name: &str) -> Option<CapabilityState> {
        for handle in self.sessions_newest_first().await {
            if let Some(state) = handle.session.lock().await.state(name) {
                return Some(state);
            }
        }
        None
    }

    /// Endpoint and payment handlers of the most recently discovered merchant.
    pub async fn latest_payment_handlers(&self) -> Option<(String, Vec<PaymentHandler>)> {
        let newest = self.sessions_newest_first().await.into_iter().next()?;
        let session = newest.session.lock().await;
        Some((session.endpoint.clone(), session.payment_handlers.clone()))
    }

    pub async fn endpoints(&self) -> Vec<String> {
        let mut endpoints: Vec<String> = self.sessions.read().await.keys().cloned().collect();
        endpoints.sort();
        endpoints
    }

    /// Snapshot of session handles, most recent discovery first.
    async fn sessions_newest_first(&self) -> Vec<SessionHandle> {
        let mut handles: Vec<SessionHandle> =
            self.sessions.read().await.values().cloned().collect();
        handles.sort_by(|a, b| b.generation.cmp(&a.generation));
        handles
    }
}

impl Default for CapabilityRegistry {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn manifest(value: serde_json::Value) -> Manifest {
        serde_json::from_value(value).unwrap()
    }

    fn shop_manifest() -> Manifest {
        manifest(json!({
            "ucp": {
                "version": "2026-01-11",
                "capabilities": [
                    {
                        "name": "shop.checkout",
                        "description": "Create and manage checkout sessions\nLong details",
                        "input_schema": {"type": "object", "required": ["currency"]},
                        "resource": "/checkout",
                        "operation": "create"
                    },
                    {
                        "name": "shop.order",
                        "description": "Track placed orders",
                        "keywords": ["fulfillment"]
                    },
                    {
                        "name": "dev.ucp.shopping.discount_codes",
                        "description": "Apply promotional codes to a cart"
                    }
                ]
            },
            "payment": {"handlers": [{"id": "gpay", "name": "com.google.pay"}]}
        }))
    }

    async fn registry_with_shop() -> CapabilityRegistry {
        let registry = CapabilityRegistry::default();
        registry
            .register("http://merchant.test", shop_manifest())
            .await
            .unwrap();
        registry
    }

    #[tokio::test]
    async fn test_register_returns_summaries_only() {
        let registry = CapabilityRegistry::default();
        let summaries = registry
            .register("http://merchant.test", shop_manifest())
            .await
            .unwrap();

        assert_eq!(summaries.len(), 3);
        assert_eq!(summaries[0].name, "shop.checkout");
        assert_eq!(summaries[0].description, "Create and manage checkout sessions");
        assert_eq!(summaries[0].endpoint, "http://merchant.test");

        assert_eq!(
            registry.state("shop.checkout").await,
            Some(CapabilityState::Discovered)
        );
    }

    #[tokio::test]
    async fn test_resolve_discloses() {
        let registry = registry_with_shop().await;

        let capability = registry.resolve("shop.checkout").await.unwrap();
        assert_eq!(capability.input_schema["required"][0], "currency");
        assert_eq!(capability.resource_path, "/checkout");
        assert_eq!(
            registry.state("shop.checkout").await,
            Some(CapabilityState::Disclosed)
        );
        assert_eq!(
            registry.state("shop.order").await,
            Some(CapabilityState::Discovered)
        );
    }

    #[tokio::test]
    async fn test_lookup_does_not_disclose() {
        let registry = registry_with_shop().await;
        registry.lookup("shop.order").await.unwrap();
        assert_eq!(
            registry.state("shop.order").await,
            Some(CapabilityState::Discovered)
        );
    }

    #[tokio::test]
    async fn test_resolve_unknown() {
        let registry = CapabilityRegistry::default();
        assert!(matches!(
            registry.resolve("shop.checkout").await,
            Err(HubError::UnknownCapability { .. })
        ));

        let registry = registry_with_shop().await;
        assert!(matches!(
            registry.resolve("shop.refund").await,
            Err(HubError::UnknownCapability { .. })
        ));
        assert_eq!(registry.state("shop.refund").await, None);
    }

    #[tokio::test]
    async fn test_default_resource_path_and_schema() {
        let registry = registry_with_shop().await;
        let order = registry.resolve("shop.order").await.unwrap();
        assert_eq!(order.resource_path, "/order");
        assert_eq!(order.input_schema, json!({"type": "object"}));

        let codes = registry
            .resolve("dev.ucp.shopping.discount_codes")
            .await
            .unwrap();
        assert_eq!(codes.resource_path, "/discount-codes");
    }

    #[tokio::test]
    async fn test_search_by_keyword_and_partial_name() {
        let registry = registry_with_shop().await;

        let names = |hits: Vec<CapabilitySummary>| -> Vec<String> {
            hits.into_iter().map(|s| s.name).collect()
        };

        assert_eq!(names(registry.search("checkout").await), ["shop.checkout"]);
        assert_eq!(names(registry.search("CHECK").await), ["shop.checkout"]);
        assert_eq!(names(registry.search("fulfillment").await), ["shop.order"]);
        assert_eq!(
            names(registry.search("promotional").await),
            ["dev.ucp.shopping.discount_codes"]
        );
        assert!(registry.search("refund").await.is_empty());
        assert!(registry.search("  ").await.is_empty());
    }

    #[tokio::test]
    async fn test_search_ranks_exact_segment_first() {
        let registry = CapabilityRegistry::default();
        registry
            .register(
                "http://merchant.test",
                manifest(json!({"ucp": {"capabilities": [
                    {"name": "shop.cart_summary", "description": "Summarize the order in a cart"},
                    {"name": "shop.order"},
                ]}})),
            )
            .await
            .unwrap();

        let hits = registry.search("order").await;
        assert_eq!(hits[0].name, "shop.order");
        assert_eq!(hits[1].name, "shop.cart_summary");
    }

    #[tokio::test]
    async fn test_search_never_returns_schema() {
        let registry = registry_with_shop().await;
        let hits = registry.search("checkout").await;
        let json = serde_json::to_value(&hits).unwrap();
        assert!(json[0].get("input_schema").is_none());
        assert_eq!(
            registry.state("shop.checkout").await,
            Some(CapabilityState::Discovered)
        );
    }

    #[tokio::test]
    async fn test_rediscovery_replaces_session() {
        let registry = registry_with_shop().await;
        registry.resolve("shop.checkout").await.unwrap();

        registry
            .register(
                "http://merchant.test",
                manifest(json!({"ucp": {"capabilities": [{"name": "shop.checkout"}]}})),
            )
            .await
            .unwrap();

        assert!(registry.resolve("shop.order").await.is_err());
        assert_eq!(
            registry.state("shop.checkout").await,
            Some(CapabilityState::Discovered)
        );
        assert_eq!(
            registry.latest_payment_handlers().await,
            Some(("http://merchant.test".to_string(), vec![]))
        );
    }

    #[tokio::test]
    async fn test_failed_rediscovery_keeps_previous_session() {
        let registry = registry_with_shop().await;
        let err = registry
            .register(
                "http://merchant.test",
                manifest(json!({"ucp": {"capabilities": []}})),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, HubError::Discovery { .. }));
        assert!(registry.resolve("shop.order").await.is_ok());
    }

    #[tokio::test]
    async fn test_malformed_manifests_rejected() {
        let registry = CapabilityRegistry::new(2);

        let duplicate = manifest(json!({"ucp": {"capabilities": [
            {"name": "shop.checkout"}, {"name": "shop.checkout"}
        ]}}));
        assert!(matches!(
            registry.register("http://a.test", duplicate).await,
            Err(HubError::Discovery { .. })
        ));

        let blank = manifest(json!({"ucp": {"capabilities": [{"name": "  "}]}}));
        assert!(matches!(
            registry.register("http://a.test", blank).await,
            Err(HubError::Discovery { .. })
        ));

        let too_many = manifest(json!({"ucp": {"capabilities": [
            {"name": "a.one"}, {"name": "a.two"}, {"name": "a.three"}
        ]}}));
        assert!(matches!(
            registry.register("http://a.test", too_many).await,
            Err(HubError::Discovery { .. })
        ));

        assert!(registry.endpoints().await.is_empty());
    }

    #[tokio::test]
    async fn test_latest_session_wins_name_clash() {
        let registry = CapabilityRegistry::default();
        registry
            .register(
                "http://first.test",
                manifest(json!({"ucp": {"capabilities": [{"name": "shop.checkout"}]},
                    "payment": {"handlers": [{"id": "gpay"}]}})),
            )
            .await
            .unwrap();
        registry
            .register(
                "http://second.test",
                manifest(json!({"ucp": {"capabilities": [{"name": "shop.checkout"}]},
                    "payment": {"handlers": [{"id": "shop_pay"}]}})),
            )
            .await
            .unwrap();

        let capability = registry.resolve("shop.checkout").await.unwrap();
        assert_eq!(capability.endpoint, "http://second.test");

        let (endpoint, handlers) = registry.latest_payment_handlers().await.unwrap();
        assert_eq!(endpoint, "http://second.test");
        assert_eq!(handlers[0].id, "shop_pay");

        let hits = registry.search("checkout").await;
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].endpoint, "http://second.test");

        assert_eq!(
            registry.endpoints().await,
            ["http://first.test", "http://second.test"]
        );
    }

    #[test]
    fn test_derive_keywords() {
        let keywords = derive_keywords(
            "dev.ucp.shopping.checkout",
            Some("Create the checkout for a cart"),
            &["Buy-Now".to_string()],
        );
        assert_eq!(
            keywords,
            ["dev", "ucp", "shopping", "checkout", "buy", "now", "create", "cart"]
        );
    }
}
