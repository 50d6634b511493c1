//! Best-effort MX deliverability probe.
//!
//! Registration asks whether the address's domain publishes MX records
//! before creating the account. The probe is advisory: resolver failures
//! count as deliverable so a flaky DNS path never blocks sign-ups. Only a
//! definitive "no records" answer rejects the address.

use async_trait::async_trait;
use hickory_resolver::config::{ResolverConfig, ResolverOpts};
use hickory_resolver::error::ResolveErrorKind;
use hickory_resolver::TokioAsyncResolver;

/// Answers whether a mail domain looks deliverable.
#[async_trait]
pub trait MxProbe: Send + Sync {
    async fn is_deliverable(&self, domain: &str) -> bool;
}

/// [`MxProbe`] backed by a real DNS resolver.
pub struct DnsMxProbe {
    resolver: TokioAsyncResolver,
}

impl DnsMxProbe {
    /// Create a probe using the system's default upstream servers.
    pub fn new() -> Self {
        Self {
            resolver: TokioAsyncResolver::tokio(
                ResolverConfig::default(),
                ResolverOpts::default(),
            ),
        }
    }
}

impl Default for DnsMxProbe {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MxProbe for DnsMxProbe {
    async fn is_deliverable(&self, domain: &str) -> bool {
        match self.resolver.mx_lookup(domain).await {
            Ok(lookup) => lookup.iter().next().is_some(),
            Err(err) => match err.kind() {
                ResolveErrorKind::NoRecordsFound { .. } => false,
                _ => {
                    tracing::warn!(
                        target: "accounts.mx.probe_failed",
                        domain = %domain,
                        error = %err,
                        "MX probe failed, treating domain as deliverable"
                    );
                    true
                }
            },
        }
    }
}
