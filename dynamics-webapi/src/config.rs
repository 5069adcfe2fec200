//! Client configuration with builder pattern
//!
//! Client-wide defaults that the header composer falls back to when a request
//! is silent, plus the server address. Loadable from the environment (with
//! `.env` support) or a TOML document.

use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

const DEFAULT_API_VERSION: &str = "9.2";

/// Client-wide configuration
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    /// Organization root, e.g. `https://org.crm.dynamics.com`
    pub server_url: String,
    pub api_version: String,
    /// Default per-request timeout
    pub timeout: Option<Duration>,
    /// Default for `Prefer: return=representation`
    pub return_representation: bool,
    /// Default for `Prefer: odata.include-annotations`
    pub include_annotations: Option<String>,
    /// Default for `Prefer: odata.maxpagesize`
    pub max_page_size: Option<u32>,
    /// Default `MSCRMCallerID`
    pub impersonate: Option<String>,
    /// Default `CallerObjectId`
    pub impersonate_aad: Option<String>,
    pub bypass: BypassConfig,
}

/// Configuration for bypassing Dynamics 365 custom business logic
///
/// These options allow bypassing plugins, workflows, and Power Automate flows
/// on every request the client sends. Useful for data migrations and bulk operations.
///
/// Note: Most bypass options require the user to have the `prvBypassCustomBusinessLogic`
/// privilege in Dynamics 365. Only `power_automate_flows` bypass requires no special privilege.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BypassConfig {
    /// Bypass synchronous custom plugins and real-time workflows
    pub custom_sync: bool,
    /// Bypass asynchronous custom plugins and workflows (not Power Automate flows)
    pub custom_async: bool,
    /// Bypass specific plugin steps by GUID
    pub step_ids: Vec<String>,
    /// Bypass Power Automate flows triggered by Dataverse events (no privilege required)
    pub power_automate_flows: bool,
}

impl BypassConfig {
    /// Check if any bypass options are enabled
    pub fn is_enabled(&self) -> bool {
        self.custom_sync
            || self.custom_async
            || !self.step_ids.is_empty()
            || self.power_automate_flows
    }

    /// Create a config that bypasses all custom logic (plugins, workflows, flows)
    pub fn all() -> Self {
        Self {
            custom_sync: true,
            custom_async: true,
            step_ids: Vec::new(),
            power_automate_flows: true,
        }
    }

    /// Headers expressing this configuration
    pub fn headers(&self) -> Vec<(&'static str, String)> {
        use crate::api::constants::headers;

        let mut result = Vec::new();

        let mut logic = Vec::new();
        if self.custom_sync {
            logic.push("CustomSync");
        }
        if self.custom_async {
            logic.push("CustomAsync");
        }
        if !logic.is_empty() {
            result.push((headers::BYPASS_BUSINESS_LOGIC_EXECUTION, logic.join(",")));
        }

        if !self.step_ids.is_empty() {
            result.push((headers::BYPASS_BUSINESS_LOGIC_STEP_IDS, self.step_ids.join(",")));
        }

        if self.power_automate_flows {
            result.push((headers::SUPPRESS_CALLBACK_EXPANDER_JOB, "true".to_string()));
        }

        result
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: String::new(),
            api_version: DEFAULT_API_VERSION.to_string(),
            timeout: None,
            return_representation: false,
            include_annotations: None,
            max_page_size: None,
            impersonate: None,
            impersonate_aad: None,
            bypass: BypassConfig::default(),
        }
    }
}

/// On-disk shape of the configuration
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ConfigFile {
    server_url: String,
    api_version: Option<String>,
    timeout_ms: Option<u64>,
    return_representation: bool,
    include_annotations: Option<String>,
    max_page_size: Option<u32>,
    impersonate: Option<String>,
    impersonate_aad: Option<String>,
    bypass: BypassConfig,
}

impl ClientConfig {
    /// Create a new builder for ClientConfig
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::new()
    }

    /// Base URL of the Web API endpoint, always ending in `/`
    pub fn web_api_url(&self) -> String {
        format!(
            "{}/api/data/v{}/",
            self.server_url.trim_end_matches('/'),
            self.api_version
        )
    }

    /// Load from the process environment, reading a `.env` file first when present
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load from any variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let server_url = lookup("DYNAMICS_URL")
            .filter(|url| !url.trim().is_empty())
            .context("DYNAMICS_URL is not set")?;

        let mut builder = ClientConfig::builder().server_url(server_url);

        if let Some(version) = lookup("DYNAMICS_API_VERSION") {
            builder = builder.api_version(version);
        }
        if let Some(timeout) = lookup("DYNAMICS_TIMEOUT_MS") {
            let ms: u64 = timeout
                .trim()
                .parse()
                .with_context(|| format!("DYNAMICS_TIMEOUT_MS is not a number: {}", timeout))?;
            builder = builder.timeout(Duration::from_millis(ms));
        }
        if let Some(flag) = lookup("DYNAMICS_RETURN_REPRESENTATION") {
            let enabled: bool = flag
                .trim()
                .parse()
                .with_context(|| format!("DYNAMICS_RETURN_REPRESENTATION is not a boolean: {}", flag))?;
            builder = builder.return_representation(enabled);
        }
        if let Some(annotations) = lookup("DYNAMICS_INCLUDE_ANNOTATIONS") {
            builder = builder.include_annotations(annotations);
        }
        if let Some(size) = lookup("DYNAMICS_MAX_PAGE_SIZE") {
            let size: u32 = size
                .trim()
                .parse()
                .with_context(|| format!("DYNAMICS_MAX_PAGE_SIZE is not a number: {}", size))?;
            builder = builder.max_page_size(size);
        }
        if let Some(user) = lookup("DYNAMICS_IMPERSONATE") {
            builder = builder.impersonate(user);
        }

        Ok(builder.build())
    }

    /// Parse a TOML document
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let file: ConfigFile = toml::from_str(source).context("Failed to parse client config")?;
        if file.server_url.trim().is_empty() {
            anyhow::bail!("server_url is required in client config");
        }

        Ok(Self {
            server_url: file.server_url,
            api_version: file.api_version.unwrap_or_else(|| DEFAULT_API_VERSION.to_string()),
            timeout: file.timeout_ms.map(Duration::from_millis),
            return_representation: file.return_representation,
            include_annotations: file.include_annotations,
            max_page_size: file.max_page_size,
            impersonate: file.impersonate,
            impersonate_aad: file.impersonate_aad,
            bypass: file.bypass,
        })
    }
}

/// Builder for ClientConfig
#[derive(Debug)]
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: ClientConfig::default(),
        }
    }

    pub fn server_url(mut self, url: impl Into<String>) -> Self {
        self.config.server_url = url.into();
        self
    }

    pub fn api_version(mut self, version: impl Into<String>) -> Self {
        self.config.api_version = version.into();
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = Some(timeout);
        self
    }

    pub fn return_representation(mut self, enabled: bool) -> Self {
        self.config.return_representation = enabled;
        self
    }

    pub fn include_annotations(mut self, annotations: impl Into<String>) -> Self {
        self.config.include_annotations = Some(annotations.into());
        self
    }

    pub fn max_page_size(mut self, size: u32) -> Self {
        self.config.max_page_size = Some(size);
        self
    }

    pub fn impersonate(mut self, user_id: impl Into<String>) -> Self {
        self.config.impersonate = Some(user_id.into());
        self
    }

    pub fn impersonate_aad(mut self, object_id: impl Into<String>) -> Self {
        self.config.impersonate_aad = Some(object_id.into());
        self
    }

    /// Configure bypass settings
    pub fn bypass_config(mut self, bypass: BypassConfig) -> Self {
        self.config.bypass = bypass;
        self
    }

    /// Enable bypassing all custom business logic (sync, async, and Power Automate)
    pub fn bypass_all_custom_logic(mut self) -> Self {
        self.config.bypass = BypassConfig::all();
        self
    }

    /// Build the final configuration
    pub fn build(self) -> ClientConfig {
        self.config
    }
}

impl Default for ClientConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = ClientConfig::default();

        assert_eq!(config.api_version, "9.2");
        assert!(!config.return_representation);
        assert!(config.timeout.is_none());
        assert!(!config.bypass.is_enabled());
    }

    #[test]
    fn test_builder_pattern() {
        let config = ClientConfig::builder()
            .server_url("https://org.crm.dynamics.com/")
            .api_version("9.1")
            .return_representation(true)
            .max_page_size(100)
            .timeout(Duration::from_secs(30))
            .bypass_all_custom_logic()
            .build();

        assert_eq!(config.web_api_url(), "https://org.crm.dynamics.com/api/data/v9.1/");
        assert!(config.return_representation);
        assert_eq!(config.max_page_size, Some(100));
        assert_eq!(config.timeout, Some(Duration::from_secs(30)));
        assert!(config.bypass.is_enabled());
    }

    #[test]
    fn test_from_lookup() {
        let vars: HashMap<&str, &str> = [
            ("DYNAMICS_URL", "https://org.crm4.dynamics.com"),
            ("DYNAMICS_TIMEOUT_MS", "5000"),
            ("DYNAMICS_RETURN_REPRESENTATION", "true"),
            ("DYNAMICS_INCLUDE_ANNOTATIONS", "*"),
        ]
        .into_iter()
        .collect();

        let config = ClientConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string())).unwrap();

        assert_eq!(config.server_url, "https://org.crm4.dynamics.com");
        assert_eq!(config.timeout, Some(Duration::from_millis(5000)));
        assert!(config.return_representation);
        assert_eq!(config.include_annotations.as_deref(), Some("*"));
        assert_eq!(config.api_version, "9.2");
    }

    #[test]
    fn test_from_lookup_requires_url() {
        let err = ClientConfig::from_lookup(|_| None).unwrap_err();
        assert!(err.to_string().contains("DYNAMICS_URL"));
    }

    #[test]
    fn test_from_lookup_rejects_bad_numbers() {
        let result = ClientConfig::from_lookup(|k| match k {
            "DYNAMICS_URL" => Some("https://org".to_string()),
            "DYNAMICS_MAX_PAGE_SIZE" => Some("lots".to_string()),
            _ => None,
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_from_toml() {
        let config = ClientConfig::from_toml_str(
            r#"
            server_url = "https://org.crm.dynamics.com"
            timeout_ms = 1000
            max_page_size = 25

            [bypass]
            custom_sync = true
            step_ids = ["00000000-0000-0000-0000-000000000003"]
            "#,
        )
        .unwrap();

        assert_eq!(config.timeout, Some(Duration::from_millis(1000)));
        assert_eq!(config.max_page_size, Some(25));
        assert!(config.bypass.custom_sync);
        assert_eq!(config.bypass.step_ids.len(), 1);
    }

    #[test]
    fn test_bypass_headers() {
        let headers = BypassConfig::all().headers();
        assert_eq!(
            headers,
            vec![
                ("MSCRM.BypassBusinessLogicExecution", "CustomSync,CustomAsync".to_string()),
                ("MSCRM.SuppressCallbackRegistrationExpanderJob", "true".to_string()),
            ]
        );
        assert!(BypassConfig::default().headers().is_empty());
    }
}
