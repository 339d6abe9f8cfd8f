//! Optional persistence adapter, surfaced as a status probe only. Disabled
//! by default; no connection is ever opened from the core.

use crate::config::PersistenceConfig;
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct PersistenceStatus {
    pub enabled: bool,
    pub configured: bool,
}

pub fn probe(config: &PersistenceConfig) -> PersistenceStatus {
    PersistenceStatus {
        enabled: config.enabled,
        configured: config.url.as_deref().is_some_and(|url| !url.trim().is_empty()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_by_default() {
        let status = probe(&PersistenceConfig {
            enabled: false,
            url: None,
        });
        assert!(!status.enabled);
        assert!(!status.configured);
    }

    #[test]
    fn configured_requires_a_nonempty_url() {
        let status = probe(&PersistenceConfig {
            enabled: true,
            url: Some("  ".to_string()),
        });
        assert!(status.enabled);
        assert!(!status.configured);

        let status = probe(&PersistenceConfig {
            enabled: true,
            url: Some("postgres://localhost/csp".to_string()),
        });
        assert!(status.configured);
    }
}
