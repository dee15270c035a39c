//! Shared helper functions for CLI commands
//!
//! Configuration layering for command-line overrides, the login step every
//! network command starts with, and small text utilities.

use miette::{miette, IntoDiagnostic, Result};

use crate::cli::GlobalOpts;
use crate::core::Config;
use crate::upload::{Credentials, DigitClient, UreqTransport};

/// Configuration from files and environment, then command-line flags
pub fn load_config(global: &GlobalOpts) -> Config {
    let mut config = Config::load();
    apply_overrides(&mut config, global);
    config
}

/// Command-line flags win over every other source
pub fn apply_overrides(config: &mut Config, global: &GlobalOpts) {
    if let Some(url) = &global.url {
        config.base_url = Some(url.clone());
    }
    if let Some(username) = &global.username {
        config.username = Some(username.clone());
    }
    if let Some(tenant) = &global.tenant {
        config.target_tenant = Some(tenant.clone());
    }
    if let Some(root) = &global.root_tenant {
        config.root_tenant = Some(root.clone());
    }
}

/// Password from configuration, or an interactive prompt
pub fn password(config: &Config) -> Result<String> {
    if let Some(p) = config.password.as_ref().filter(|p| !p.is_empty()) {
        return Ok(p.clone());
    }
    if !console::user_attended_stderr() {
        return Err(miette!(
            "No password configured. Set DIGIT_PASSWORD or run interactively"
        ));
    }
    dialoguer::Password::new()
        .with_prompt(format!("Password for {}", config.username()))
        .interact()
        .into_diagnostic()
}

/// Log in to the configured gateway
pub fn connect(config: &Config) -> Result<DigitClient<UreqTransport>> {
    let password = password(config)?;
    let base_url = config.base_url();
    let mut client = DigitClient::new(UreqTransport::new(config.timeout()), &base_url);
    let creds = Credentials::new(&config.username(), &password, &config.root_tenant());
    client
        .login(&creds)
        .map_err(|e| miette!("Login to {} failed: {}", base_url, e))?;
    Ok(client)
}

/// Truncate a string to max_len characters, adding "..." if truncated
pub fn truncate_str(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

/// Flatten a value onto one TSV field
///
/// Template headers carry embedded newlines and tabs would split the field.
pub fn escape_tsv(s: &str) -> String {
    s.replace(['\t', '\n', '\r'], " ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_str() {
        assert_eq!(truncate_str("hello", 10), "hello");
        assert_eq!(truncate_str("hello world", 8), "hello...");
        assert_eq!(truncate_str("hi", 2), "hi");
        assert_eq!(truncate_str("ಬೆಂಗಳೂರು ನಗರ", 6), "ಬೆಂ...");
    }

    #[test]
    fn test_escape_tsv() {
        assert_eq!(escape_tsv("plain"), "plain");
        assert_eq!(
            escape_tsv("Tenant Code*\n(To be filled by ADMIN)"),
            "Tenant Code* (To be filled by ADMIN)"
        );
        assert_eq!(escape_tsv("a\tb"), "a b");
    }

    #[test]
    fn test_overrides_win() {
        let mut config = Config {
            base_url: Some("http://from-file".into()),
            target_tenant: Some("pg.old".into()),
            ..Default::default()
        };
        let global = GlobalOpts {
            url: Some("http://from-flag".into()),
            tenant: Some("pg.citya".into()),
            ..Default::default()
        };
        apply_overrides(&mut config, &global);
        assert_eq!(config.base_url(), "http://from-flag");
        assert_eq!(config.target_tenant(), "pg.citya");
        assert_eq!(config.root_tenant(), Config::DEFAULT_ROOT_TENANT);
    }

    #[test]
    fn test_password_from_config() {
        let config = Config {
            password: Some("secret".into()),
            ..Default::default()
        };
        assert_eq!(password(&config).unwrap(), "secret");
    }
}
