//! Outbound HTTP client shared by the broker, catalog and forwarding calls

use std::time::Duration;

use crate::config::AppConfig;

const CONNECT_TIMEOUT_SECS: u64 = 10;

/// Build an HTTP client with TLS configuration
///
/// Timeouts are applied per request, since the broker, the model catalog
/// and chat completions each have their own budget.
pub fn build_http_client(config: &AppConfig) -> Result<reqwest::Client, Box<dyn std::error::Error>> {
    let mut client_builder = reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
        .pool_max_idle_per_host(10);

    if let Some(ref tls) = config.backend.tls {
        if tls.accept_invalid_certs {
            client_builder = client_builder.danger_accept_invalid_certs(true);
            tracing::warn!("TLS: Accepting invalid certificates (use only for development/testing)");
        }

        if let Some(ref ca_path) = tls.ca_cert_path {
            let ca_cert = std::fs::read(ca_path)?;
            let ca_cert = reqwest::Certificate::from_pem(&ca_cert)?;
            client_builder = client_builder.add_root_certificate(ca_cert);
            tracing::info!("TLS: Loaded custom CA certificate from {}", ca_path);
        }
    }

    Ok(client_builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TlsConfig;

    #[test]
    fn test_build_default_client() {
        assert!(build_http_client(&AppConfig::default()).is_ok());
    }

    #[test]
    fn test_build_fails_on_missing_ca() {
        let mut config = AppConfig::default();
        config.backend.tls = Some(TlsConfig {
            accept_invalid_certs: false,
            ca_cert_path: Some("/nonexistent/ca.pem".to_string()),
        });
        assert!(build_http_client(&config).is_err());
    }
}
