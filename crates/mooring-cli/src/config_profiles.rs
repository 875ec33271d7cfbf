//! Persistent CLI profile configuration.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use mooring_core::RemoteConfig;
use serde::{Deserialize, Serialize};

const CONFIG_FILE_NAME: &str = "cli-config.json";

pub const ENV_PROFILE: &str = "MOORING_PROFILE";
pub const ENV_API_URL: &str = "MOORING_API_URL";
pub const ENV_API_TOKEN: &str = "MOORING_API_TOKEN";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CliProfilesConfig {
    #[serde(default = "default_config_version")]
    pub version: u32,
    #[serde(default)]
    pub active_profile: Option<String>,
    #[serde(default)]
    pub profiles: BTreeMap<String, CliProfile>,
}

#[derive(Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CliProfile {
    #[serde(default)]
    pub api_base_url: Option<String>,
    #[serde(default)]
    pub auth_token: Option<String>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl std::fmt::Debug for CliProfile {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("CliProfile")
            .field("api_base_url", &self.api_base_url)
            .field(
                "auth_token",
                &self.auth_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

const fn default_config_version() -> u32 {
    1
}

pub fn default_config_path() -> Result<PathBuf, String> {
    dirs::config_dir()
        .map(|dir| dir.join("mooring").join(CONFIG_FILE_NAME))
        .ok_or_else(|| "Failed to resolve CLI config directory".to_string())
}

pub fn normalize_text_option(value: Option<String>) -> Option<String> {
    mooring_core::util::normalize_text_option(value)
}

pub fn normalize_profile_name(value: Option<&str>) -> Option<String> {
    let value = value?;
    let value = value.trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

impl CliProfilesConfig {
    pub fn load() -> Result<Self, String> {
        Self::load_from_path(&default_config_path()?)
    }

    pub fn load_from_path(path: &Path) -> Result<Self, String> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path)
            .map_err(|error| format!("Failed to read config at {}: {}", path.display(), error))?;
        let mut config = serde_json::from_str::<Self>(&raw)
            .map_err(|error| format!("Failed to parse config at {}: {}", path.display(), error))?;
        config.normalize();
        Ok(config)
    }

    pub fn save(&self) -> Result<PathBuf, String> {
        let path = default_config_path()?;
        self.save_to_path(&path)?;
        Ok(path)
    }

    pub fn save_to_path(&self, path: &Path) -> Result<(), String> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|error| {
                format!(
                    "Failed to create config directory {}: {}",
                    parent.display(),
                    error
                )
            })?;
        }

        let mut normalized = self.clone();
        normalized.normalize();
        let serialized = serde_json::to_string_pretty(&normalized)
            .map_err(|error| format!("Failed to serialize config: {error}"))?;
        std::fs::write(path, serialized)
            .map_err(|error| format!("Failed to write config at {}: {}", path.display(), error))
    }

    /// Explicit name, then `MOORING_PROFILE`, then the active profile, then `default`.
    pub fn resolve_profile_name(&self, explicit: Option<&str>) -> String {
        self.resolve_profile_name_with_env(explicit, std::env::var(ENV_PROFILE).ok().as_deref())
    }

    pub fn resolve_profile_name_with_env(
        &self,
        explicit: Option<&str>,
        env_profile: Option<&str>,
    ) -> String {
        normalize_profile_name(explicit)
            .or_else(|| normalize_profile_name(env_profile))
            .or_else(|| normalize_profile_name(self.active_profile.as_deref()))
            .unwrap_or_else(|| "default".to_string())
    }

    pub fn profile(&self, name: &str) -> Option<&CliProfile> {
        self.profiles.get(name)
    }

    pub fn profile_mut_or_default(&mut self, name: &str) -> &mut CliProfile {
        self.profiles.entry(name.to_string()).or_default()
    }

    fn normalize(&mut self) {
        self.active_profile = normalize_profile_name(self.active_profile.as_deref());
        for profile in self.profiles.values_mut() {
            profile.normalize();
        }
    }
}

impl CliProfile {
    pub fn api_base_url(&self) -> Option<String> {
        normalize_text_option(self.api_base_url.clone())
    }

    pub fn auth_token(&self) -> Option<String> {
        normalize_text_option(self.auth_token.clone())
    }

    fn normalize(&mut self) {
        self.api_base_url = normalize_text_option(self.api_base_url.clone());
        self.auth_token = normalize_text_option(self.auth_token.clone());
        self.timeout_secs = self.timeout_secs.filter(|secs| *secs > 0);
    }
}

/// Build the remote configuration; environment values win over the profile.
///
/// Returns `None` when no base URL is known from either source.
pub fn remote_config_from(
    env_url: Option<String>,
    env_token: Option<String>,
    profile: Option<&CliProfile>,
) -> Result<Option<RemoteConfig>, String> {
    let Some(base_url) =
        normalize_text_option(env_url).or_else(|| profile.and_then(CliProfile::api_base_url))
    else {
        return Ok(None);
    };

    let mut config = RemoteConfig::new(base_url);
    if let Some(token) =
        normalize_text_option(env_token).or_else(|| profile.and_then(CliProfile::auth_token))
    {
        config = config.with_auth_token(token);
    }
    if let Some(secs) = profile.and_then(|profile| profile.timeout_secs) {
        config.timeout_secs = secs;
    }

    config
        .normalized()
        .map(Some)
        .map_err(|error| error.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(url: &str, token: Option<&str>) -> CliProfile {
        CliProfile {
            api_base_url: Some(url.to_string()),
            auth_token: token.map(str::to_string),
            timeout_secs: None,
        }
    }

    #[test]
    fn normalize_profile_name_rejects_empty() {
        assert_eq!(normalize_profile_name(None), None);
        assert_eq!(normalize_profile_name(Some(" ")), None);
    }

    #[test]
    fn config_roundtrip_preserves_profiles() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mooring").join(CONFIG_FILE_NAME);

        let mut config = CliProfilesConfig {
            version: 1,
            active_profile: Some(" default ".to_string()),
            profiles: BTreeMap::new(),
        };
        config.profiles.insert(
            "default".to_string(),
            CliProfile {
                api_base_url: Some(" https://api.example.com ".to_string()),
                auth_token: Some("  ".to_string()),
                timeout_secs: Some(0),
            },
        );

        config.save_to_path(&path).unwrap();
        let loaded = CliProfilesConfig::load_from_path(&path).unwrap();
        assert_eq!(loaded.active_profile.as_deref(), Some("default"));
        let profile = loaded.profile("default").unwrap();
        assert_eq!(profile.api_base_url.as_deref(), Some("https://api.example.com"));
        assert_eq!(profile.auth_token, None);
        assert_eq!(profile.timeout_secs, None);
    }

    #[test]
    fn resolve_profile_name_prefers_explicit_then_env_then_active() {
        let config = CliProfilesConfig {
            version: 1,
            active_profile: Some("work".to_string()),
            profiles: BTreeMap::new(),
        };
        assert_eq!(
            config.resolve_profile_name_with_env(Some("mobile"), Some("ci")),
            "mobile"
        );
        assert_eq!(config.resolve_profile_name_with_env(None, Some("ci")), "ci");
        assert_eq!(config.resolve_profile_name_with_env(None, None), "work");
        assert_eq!(
            CliProfilesConfig::default().resolve_profile_name_with_env(None, Some(" ")),
            "default"
        );
    }

    #[test]
    fn remote_config_env_overrides_profile() {
        let stored = profile("https://profile.example.com/", Some("profile-token"));

        let config = remote_config_from(
            Some("https://env.example.com".to_string()),
            None,
            Some(&stored),
        )
        .unwrap()
        .unwrap();
        assert_eq!(config.base_url, "https://env.example.com");
        assert_eq!(config.auth_token.as_deref(), Some("profile-token"));

        let config = remote_config_from(None, Some("env-token".to_string()), Some(&stored))
            .unwrap()
            .unwrap();
        assert_eq!(config.base_url, "https://profile.example.com");
        assert_eq!(config.auth_token.as_deref(), Some("env-token"));
    }

    #[test]
    fn remote_config_absent_without_url() {
        assert_eq!(remote_config_from(None, Some("t".to_string()), None), Ok(None));
        assert!(remote_config_from(Some("ftp://nope".to_string()), None, None).is_err());
    }

    #[test]
    fn profile_debug_redacts_token() {
        let debug = format!("{:?}", profile("https://api.example.com", Some("secret")));
        assert!(!debug.contains("secret"));
    }
}
