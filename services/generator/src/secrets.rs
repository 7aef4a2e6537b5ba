//! Generation API keys, fetched from the secrets store.

use anyhow::{Context, Result};
use aws_config::BehaviorVersion;
use aws_sdk_secretsmanager::Client as SecretsClient;
use serde::Deserialize;
use tracing::info;

use crate::config::SecretsConfig;

/// API keys for the generation backends. A missing key disables the
/// corresponding backend rather than failing startup.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiKeys {
    #[serde(rename = "STABILITY_API_KEY", default)]
    pub stability: Option<String>,
    #[serde(rename = "SINKIN_API_KEY", default)]
    pub sinkin: Option<String>,
}

/// Fetch and parse the API-key secret.
pub async fn fetch_api_keys(config: &SecretsConfig) -> Result<ApiKeys> {
    let aws_config = aws_config::defaults(BehaviorVersion::latest())
        .region(aws_config::Region::new(config.region.clone()))
        .load()
        .await;
    let client = SecretsClient::new(&aws_config);

    let response = client
        .get_secret_value()
        .secret_id(&config.secret_name)
        .send()
        .await
        .context("Failed to fetch API key secret")?;

    let payload = response
        .secret_string()
        .context("API key secret has no string payload")?;
    let keys: ApiKeys =
        serde_json::from_str(payload).context("API key secret is not valid JSON")?;

    info!(
        stability = keys.stability.is_some(),
        sinkin = keys.sinkin.is_some(),
        "Loaded generation API keys"
    );
    Ok(keys)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keys_parse_with_extra_fields() {
        let keys: ApiKeys = serde_json::from_str(
            r#"{"STABILITY_API_KEY": "sk-1", "OPENAI_API_KEY": "sk-2"}"#,
        )
        .unwrap();
        assert_eq!(keys.stability.as_deref(), Some("sk-1"));
        assert_eq!(keys.sinkin, None);
    }
}
