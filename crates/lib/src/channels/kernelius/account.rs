//! Account resolution: merge `channels.kernelius` down to one effective account.
//!
//! Two config shapes are supported without the caller knowing which is in use: a single account
//! flattened at the top level, and named accounts under `accounts`. A named override is used when
//! one exists for the requested id; otherwise the top-level settings are the account.

use crate::config::{Config, KerneliusAccountConfig, KerneliusConfig};
use serde::Serialize;

/// Account id used when the caller does not name one.
pub const DEFAULT_ACCOUNT_ID: &str = "default";

/// Public Forge API base.
pub const DEFAULT_API_URL: &str = "https://forge-api.kernelius.com";

/// Webhook listener path when neither `webhookPath` nor `webhookUrl` says otherwise.
pub const DEFAULT_WEBHOOK_PATH: &str = "/kernelius";

/// One effective account after lookup and defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedAccount {
    pub account_id: String,
    pub enabled: bool,
    pub api_url: String,
    pub api_key: Option<String>,
    pub webhook_secret: Option<String>,
    pub webhook_path: Option<String>,
    pub webhook_url: Option<String>,
}

impl ResolvedAccount {
    /// API key, if set and non-blank.
    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref().map(str::trim).filter(|k| !k.is_empty())
    }

    /// HTTP path the webhook listener for this account binds to.
    pub fn webhook_path(&self) -> String {
        resolve_webhook_path(self.webhook_path.as_deref(), self.webhook_url.as_deref())
    }
}

/// Serializable account summary for status output.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountDescription {
    pub account_id: String,
    pub enabled: bool,
    pub configured: bool,
    pub api_url: String,
}

/// Which config slot supplied an account's settings.
enum AccountSource<'a> {
    Named(&'a KerneliusAccountConfig),
    TopLevel(&'a KerneliusConfig),
    Unconfigured,
}

impl<'a> AccountSource<'a> {
    fn lookup(channel: Option<&'a KerneliusConfig>, account_id: &str) -> Self {
        let Some(channel) = channel else {
            return AccountSource::Unconfigured;
        };
        match channel.accounts.as_ref().and_then(|a| a.get(account_id)) {
            Some(named) => AccountSource::Named(named),
            None => AccountSource::TopLevel(channel),
        }
    }
}

fn effective_account_id(account_id: Option<&str>) -> &str {
    account_id
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .unwrap_or(DEFAULT_ACCOUNT_ID)
}

/// Resolve the effective account for `account_id` (default account when `None` or blank).
pub fn resolve_account(config: &Config, account_id: Option<&str>) -> ResolvedAccount {
    let account_id = effective_account_id(account_id).to_string();
    let source = AccountSource::lookup(config.channels.kernelius.as_ref(), &account_id);
    let (enabled, api_url, api_key, webhook_secret, webhook_path, webhook_url) = match source {
        AccountSource::Named(a) => (
            a.enabled,
            a.api_url.clone(),
            a.api_key.clone(),
            a.webhook_secret.clone(),
            a.webhook_path.clone(),
            a.webhook_url.clone(),
        ),
        AccountSource::TopLevel(c) => (
            c.enabled,
            c.api_url.clone(),
            c.api_key.clone(),
            c.webhook_secret.clone(),
            c.webhook_path.clone(),
            c.webhook_url.clone(),
        ),
        AccountSource::Unconfigured => (None, None, None, None, None, None),
    };
    ResolvedAccount {
        account_id,
        enabled: enabled != Some(false),
        api_url: api_url
            .map(|u| u.trim().trim_end_matches('/').to_string())
            .filter(|u| !u.is_empty())
            .unwrap_or_else(|| DEFAULT_API_URL.to_string()),
        api_key,
        webhook_secret: webhook_secret.filter(|s| !s.is_empty()),
        webhook_path,
        webhook_url,
    }
}

/// Account ids known to the config: named account keys, else the default id when the channel section exists.
pub fn list_account_ids(config: &Config) -> Vec<String> {
    match config.channels.kernelius.as_ref() {
        None => Vec::new(),
        Some(KerneliusConfig {
            accounts: Some(accounts),
            ..
        }) => accounts.keys().cloned().collect(),
        Some(_) => vec![DEFAULT_ACCOUNT_ID.to_string()],
    }
}

pub fn default_account_id() -> &'static str {
    DEFAULT_ACCOUNT_ID
}

/// An account is configured once it has an API key.
pub fn is_configured(account: &ResolvedAccount) -> bool {
    account.api_key().is_some()
}

pub fn describe_account(account: &ResolvedAccount) -> AccountDescription {
    AccountDescription {
        account_id: account.account_id.clone(),
        enabled: account.enabled,
        configured: is_configured(account),
        api_url: account.api_url.clone(),
    }
}

/// Set `enabled` on the named account slot if it exists, else on the top-level channel config.
pub fn set_account_enabled<'a>(
    config: &'a mut Config,
    account_id: Option<&str>,
    enabled: bool,
) -> &'a mut Config {
    let account_id = effective_account_id(account_id);
    let channel = config.channels.kernelius.get_or_insert_with(Default::default);
    match channel.accounts.as_mut().and_then(|a| a.get_mut(account_id)) {
        Some(named) => named.enabled = Some(enabled),
        None => channel.enabled = Some(enabled),
    }
    config
}

/// Remove a named account. The default account cannot be deleted; that call is a no-op.
pub fn delete_account<'a>(config: &'a mut Config, account_id: Option<&str>) -> &'a mut Config {
    let Some(account_id) = account_id.map(str::trim).filter(|id| !id.is_empty()) else {
        return config;
    };
    if account_id == DEFAULT_ACCOUNT_ID {
        return config;
    }
    if let Some(accounts) = config
        .channels
        .kernelius
        .as_mut()
        .and_then(|c| c.accounts.as_mut())
    {
        if accounts.remove(account_id).is_some() {
            log::info!("kernelius: deleted account {}", account_id);
        }
    }
    config
}

/// Webhook listener path: explicit `webhook_path` (made absolute), else the path of `webhook_url`,
/// else `/kernelius`.
pub fn resolve_webhook_path(webhook_path: Option<&str>, webhook_url: Option<&str>) -> String {
    if let Some(path) = webhook_path.map(str::trim).filter(|p| !p.is_empty()) {
        return if path.starts_with('/') {
            path.to_string()
        } else {
            format!("/{}", path)
        };
    }
    if let Some(url) = webhook_url.map(str::trim).filter(|u| !u.is_empty()) {
        return match reqwest::Url::parse(url) {
            Ok(parsed) if !parsed.path().is_empty() => parsed.path().to_string(),
            Ok(_) => DEFAULT_WEBHOOK_PATH.to_string(),
            Err(e) => {
                log::debug!("kernelius: ignoring unparsable webhookUrl {}: {}", url, e);
                DEFAULT_WEBHOOK_PATH.to_string()
            }
        };
    }
    DEFAULT_WEBHOOK_PATH.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn config_with(channel: KerneliusConfig) -> Config {
        let mut config = Config::default();
        config.channels.kernelius = Some(channel);
        config
    }

    fn named(accounts: &[(&str, KerneliusAccountConfig)]) -> KerneliusConfig {
        KerneliusConfig {
            accounts: Some(
                accounts
                    .iter()
                    .map(|(id, a)| (id.to_string(), a.clone()))
                    .collect::<BTreeMap<_, _>>(),
            ),
            ..Default::default()
        }
    }

    #[test]
    fn absent_config_resolves_defaults() {
        let account = resolve_account(&Config::default(), None);
        assert_eq!(account.account_id, DEFAULT_ACCOUNT_ID);
        assert!(account.enabled);
        assert_eq!(account.api_url, DEFAULT_API_URL);
        assert!(account.api_key.is_none());
        assert!(!is_configured(&account));
    }

    #[test]
    fn no_account_id_ignores_named_overrides() {
        let config = config_with(named(&[(
            "x",
            KerneliusAccountConfig {
                api_key: Some("k".to_string()),
                ..Default::default()
            },
        )]));
        let default = resolve_account(&config, None);
        assert_eq!(default.account_id, DEFAULT_ACCOUNT_ID);
        assert!(default.api_key.is_none());

        let x = resolve_account(&config, Some("x"));
        assert_eq!(x.account_id, "x");
        assert_eq!(x.api_key.as_deref(), Some("k"));
    }

    #[test]
    fn flattened_top_level_is_the_account() {
        let config = config_with(KerneliusConfig {
            enabled: Some(false),
            api_url: Some("https://forge.example.com/".to_string()),
            api_key: Some("top".to_string()),
            webhook_secret: Some("s".to_string()),
            ..Default::default()
        });
        let account = resolve_account(&config, Some("anything"));
        assert_eq!(account.account_id, "anything");
        assert!(!account.enabled);
        assert_eq!(account.api_url, "https://forge.example.com");
        assert_eq!(account.api_key.as_deref(), Some("top"));
        assert_eq!(account.webhook_secret.as_deref(), Some("s"));
    }

    #[test]
    fn named_override_does_not_inherit_top_level() {
        let mut channel = named(&[("x", KerneliusAccountConfig::default())]);
        channel.api_key = Some("top".to_string());
        let account = resolve_account(&config_with(channel), Some("x"));
        assert!(account.api_key.is_none());
        assert_eq!(account.api_url, DEFAULT_API_URL);
    }

    #[test]
    fn blank_api_key_is_not_configured() {
        let config = config_with(KerneliusConfig {
            api_key: Some("  ".to_string()),
            ..Default::default()
        });
        assert!(!is_configured(&resolve_account(&config, None)));
    }

    #[test]
    fn list_ids_by_shape() {
        assert!(list_account_ids(&Config::default()).is_empty());
        assert_eq!(
            list_account_ids(&config_with(KerneliusConfig::default())),
            vec![DEFAULT_ACCOUNT_ID.to_string()]
        );
        let config = config_with(named(&[
            ("b", KerneliusAccountConfig::default()),
            ("a", KerneliusAccountConfig::default()),
        ]));
        assert_eq!(list_account_ids(&config), vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn set_enabled_writes_named_slot_when_present() {
        let mut config = config_with(named(&[("x", KerneliusAccountConfig::default())]));
        set_account_enabled(&mut config, Some("x"), false);
        let channel = config.channels.kernelius.as_ref().unwrap();
        assert_eq!(channel.accounts.as_ref().unwrap()["x"].enabled, Some(false));
        assert_eq!(channel.enabled, None);

        set_account_enabled(&mut config, Some("y"), false);
        assert_eq!(config.channels.kernelius.as_ref().unwrap().enabled, Some(false));
    }

    #[test]
    fn set_enabled_creates_channel_section() {
        let mut config = Config::default();
        set_account_enabled(&mut config, None, true);
        assert_eq!(config.channels.kernelius.unwrap().enabled, Some(true));
    }

    #[test]
    fn delete_refuses_default_account() {
        let mut config = config_with(named(&[
            (DEFAULT_ACCOUNT_ID, KerneliusAccountConfig::default()),
            ("x", KerneliusAccountConfig::default()),
        ]));
        delete_account(&mut config, Some(DEFAULT_ACCOUNT_ID));
        delete_account(&mut config, None);
        assert_eq!(list_account_ids(&config).len(), 2);
        delete_account(&mut config, Some("x"));
        assert_eq!(list_account_ids(&config), vec![DEFAULT_ACCOUNT_ID.to_string()]);
    }

    #[test]
    fn webhook_path_resolution() {
        assert_eq!(resolve_webhook_path(Some("hooks/forge"), None), "/hooks/forge");
        assert_eq!(resolve_webhook_path(Some(" /x "), Some("https://h/y")), "/x");
        assert_eq!(resolve_webhook_path(None, Some("https://h.example/in/forge")), "/in/forge");
        assert_eq!(resolve_webhook_path(None, Some("https://h.example")), "/");
        assert_eq!(resolve_webhook_path(Some(""), Some("not a url")), DEFAULT_WEBHOOK_PATH);
        assert_eq!(resolve_webhook_path(None, None), DEFAULT_WEBHOOK_PATH);
    }

    #[test]
    fn default_id_is_used_for_the_flattened_shape() {
        let config = config_with(KerneliusConfig::default());
        assert_eq!(list_account_ids(&config), vec![default_account_id().to_string()]);
        assert_eq!(resolve_account(&config, None).account_id, default_account_id());
    }

    #[test]
    fn describe_reports_configured() {
        let config = config_with(KerneliusConfig {
            api_key: Some("k".to_string()),
            ..Default::default()
        });
        let d = describe_account(&resolve_account(&config, None));
        assert!(d.configured);
        assert_eq!(
            serde_json::to_value(&d).unwrap(),
            serde_json::json!({
                "accountId": "default",
                "enabled": true,
                "configured": true,
                "apiUrl": DEFAULT_API_URL,
            })
        );
    }
}
