use std::env;

use crate::cli::ConfigCommands;
use crate::commands::common::load_remote_config;
use crate::config_profiles::{
    normalize_text_option, remote_config_from, CliProfile, CliProfilesConfig, ENV_API_URL,
};
use crate::error::CliError;

pub fn run_config(command: ConfigCommands, global_profile: Option<&str>) -> Result<(), CliError> {
    match command {
        ConfigCommands::Init {
            profile,
            api_url,
            auth_token,
            timeout_secs,
            no_activate,
        } => run_config_init(
            profile.as_deref().or(global_profile),
            api_url,
            auth_token,
            timeout_secs,
            no_activate,
        ),
        ConfigCommands::Show => run_config_show(global_profile),
    }
}

#[allow(clippy::needless_pass_by_value)]
pub fn run_config_init(
    profile_name: Option<&str>,
    api_url: Option<String>,
    auth_token: Option<String>,
    timeout_secs: Option<u64>,
    no_activate: bool,
) -> Result<(), CliError> {
    let mut config = CliProfilesConfig::load().map_err(CliError::Config)?;
    let profile_name = config.resolve_profile_name(profile_name);
    let existing = config.profile(&profile_name).cloned().unwrap_or_default();

    let merged = merge_profile(
        &existing,
        api_url,
        auth_token,
        timeout_secs,
        env::var(ENV_API_URL).ok(),
    );
    if merged.timeout_secs == Some(0) {
        return Err(CliError::Config("timeout_secs must be positive".to_string()));
    }
    remote_config_from(None, None, Some(&merged)).map_err(CliError::Config)?;

    *config.profile_mut_or_default(&profile_name) = merged;
    if !no_activate {
        config.active_profile = Some(profile_name.clone());
    }

    let path = config.save().map_err(CliError::Config)?;
    println!(
        "Profile '{}' initialized at {}",
        profile_name,
        path.display()
    );

    let has_url = config
        .profile(&profile_name)
        .and_then(CliProfile::api_base_url)
        .is_some();
    if has_url {
        println!("Remote sync for '{profile_name}' is ready. Run `mooring sync`.");
    } else {
        println!("Profile '{profile_name}' is missing: api_url");
    }

    Ok(())
}

/// Explicit flags win, then the environment, then the stored profile.
pub fn merge_profile(
    existing: &CliProfile,
    api_url: Option<String>,
    auth_token: Option<String>,
    timeout_secs: Option<u64>,
    env_api_url: Option<String>,
) -> CliProfile {
    CliProfile {
        api_base_url: normalize_text_option(api_url)
            .or_else(|| normalize_text_option(env_api_url))
            .or_else(|| existing.api_base_url()),
        auth_token: normalize_text_option(auth_token).or_else(|| existing.auth_token()),
        timeout_secs: timeout_secs.or(existing.timeout_secs),
    }
}

fn run_config_show(profile: Option<&str>) -> Result<(), CliError> {
    match load_remote_config(profile)? {
        Some(remote) => {
            println!("Remote:  {}", remote.base_url);
            println!(
                "Token:   {}",
                if remote.auth_token.is_some() { "set" } else { "none" }
            );
            println!("Timeout: {}s", remote.timeout_secs);
        }
        None => println!("Remote:  not configured"),
    }
    Ok(())
}
