//! Protocol types: the discovery manifest and the capabilities parsed from it.

use serde::{Deserialize, Serialize};

/// Response from `GET {base}/.well-known/ucp`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub ucp: ManifestBody,

    /// Payment handlers the merchant accepts.
    #[serde(default)]
    pub payment: Option<PaymentSection>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestBody {
    /// Protocol version (date-stamped, e.g. "2026-01-11").
    #[serde(default)]
    pub version: Option<String>,

    pub capabilities: Vec<ManifestCapability>,
}

/// One capability entry as published by the merchant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestCapability {
    /// Namespaced name (e.g., "dev.ucp.shopping.checkout").
    pub name: String,

    #[serde(default)]
    pub version: Option<String>,

    #[serde(default)]
    pub description: Option<String>,

    /// Link to the human-readable capability spec.
    #[serde(default)]
    pub spec: Option<String>,

    /// JSON schema of accepted fields.
    #[serde(default)]
    pub input_schema: Option<serde_json::Value>,

    /// Resource path template (e.g., "/checkout-sessions/{id}").
    #[serde(default)]
    pub resource: Option<String>,

    /// Declared operation kind.
    #[serde(default)]
    pub operation: Option<OperationKind>,

    /// Transition name for `operation: transition`.
    #[serde(default)]
    pub action: Option<String>,

    /// Extra search terms.
    #[serde(default)]
    pub keywords: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PaymentSection {
    #[serde(default)]
    pub handlers: Vec<PaymentHandler>,
}

/// A payment handler advertised by the merchant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentHandler {
    pub id: String,

    #[serde(default)]
    pub name: Option<String>,
}

/// How a call maps onto the merchant's resource model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    /// `POST /{resource}`
    Create,
    /// `PUT /{resource}/{id}`
    Update,
    /// `POST /{resource}/{id}/{action}`
    Transition,
}

/// Disclosure lifecycle of a capability within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CapabilityState {
    /// Known by name and one-line description only.
    Discovered,
    /// Full input schema has been handed to the caller.
    Disclosed,
}

/// A discovered capability with its full schema.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Capability {
    pub name: String,
    pub version: Option<String>,
    pub description: Option<String>,
    pub spec_url: Option<String>,
    pub input_schema: serde_json::Value,
    pub resource_path: String,
    pub operation_kind: Option<OperationKind>,
    pub action: Option<String>,
    pub keywords: Vec<String>,

    /// Merchant base URL this capability was discovered at.
    pub endpoint: String,
}

impl Capability {
    /// Dot-separated segments of the name, lowercased.
    pub fn name_segments(&self) -> impl Iterator<Item = String> + '_ {
        self.name
            .split(|c: char| !c.is_ascii_alphanumeric())
            .filter(|s| !s.is_empty())
            .map(str::to_ascii_lowercase)
    }

    /// Checkout-class calls are the only ones a payment mandate rides on.
    pub fn is_checkout_class(&self) -> bool {
        self.name_segments().any(|s| s == "checkout")
    }

    pub fn summary(&self) -> CapabilitySummary {
        CapabilitySummary {
            name: self.name.clone(),
            description: one_line(self.description.as_deref()),
            version: self.version.clone(),
            endpoint: self.endpoint.clone(),
        }
    }
}

/// Lightweight view of a capability; never carries the schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CapabilitySummary {
    pub name: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    pub endpoint: String,
}

const SUMMARY_MAX_CHARS: usize = 200;

fn one_line(description: Option<&str>) -> String {
    let first = description
        .and_then(|d| d.lines().map(str::trim).find(|l| !l.is_empty()))
        .unwrap_or("");
    if first.chars().count() > SUMMARY_MAX_CHARS {
        let mut cut: String = first.chars().take(SUMMARY_MAX_CHARS - 1).collect();
        cut.push('…');
        cut
    } else {
        first.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn capability(name: &str, description: Option<&str>) -> Capability {
        Capability {
            name: name.to_string(),
            version: None,
            description: description.map(String::from),
            spec_url: None,
            input_schema: serde_json::json!({"type": "object"}),
            resource_path: "/x".to_string(),
            operation_kind: None,
            action: None,
            keywords: Vec::new(),
            endpoint: "http://merchant.test".to_string(),
        }
    }

    #[test]
    fn test_manifest_parses_minimal_entry() {
        let manifest: Manifest = serde_json::from_value(serde_json::json!({
            "ucp": {"capabilities": [{"name": "shop.checkout", "unknown": 1}]}
        }))
        .unwrap();

        let cap = &manifest.ucp.capabilities[0];
        assert_eq!(cap.name, "shop.checkout");
        assert!(cap.operation.is_none());
        assert!(cap.keywords.is_empty());
        assert!(manifest.payment.is_none());
    }

    #[test]
    fn test_operation_kind_wire_names() {
        let kind: OperationKind = serde_json::from_str("\"transition\"").unwrap();
        assert_eq!(kind, OperationKind::Transition);
        assert!(serde_json::from_str::<OperationKind>("\"delete\"").is_err());
    }

    #[test]
    fn test_checkout_class() {
        assert!(capability("dev.ucp.shopping.checkout", None).is_checkout_class());
        assert!(capability("shop.checkout", None).is_checkout_class());
        assert!(!capability("shop.checkouts_report", None).is_checkout_class());
        assert!(!capability("shop.order", None).is_checkout_class());
    }

    #[test]
    fn test_summary_is_one_line() {
        let cap = capability(
            "shop.checkout",
            Some("\n  Create checkout sessions\nSecond line with details"),
        );
        let summary = cap.summary();
        assert_eq!(summary.description, "Create checkout sessions");

        let json = serde_json::to_value(&summary).unwrap();
        assert!(json.get("input_schema").is_none());
    }

    #[test]
    fn test_summary_truncates_long_description() {
        let long = "x".repeat(500);
        let cap = capability("shop.checkout", Some(&long));
        assert_eq!(cap.summary().description.chars().count(), SUMMARY_MAX_CHARS);
    }
}
