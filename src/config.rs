use std::path::PathBuf;

use crate::tokens::duration::parse_duration;

pub const DEFAULT_ISSUER: &str = "PanelBase";
pub const DEFAULT_SESSION_DURATION: &str = "P1D";
pub const DEFAULT_MAX_API_TOKENS: usize = 10;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    /// redb file holding token metadata and the revocation ledger.
    pub token_db_path: PathBuf,
    pub users_file: PathBuf,
    /// Emit JSON log lines instead of the human-readable format.
    /// Set via PANEL_LOG_FORMAT=json.
    pub log_json: bool,
    pub tokens: TokenSettings,
}

/// Knobs shared by the issuer and the validator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenSettings {
    /// `iss` claim written on issue and required on validation.
    pub issuer: String,
    /// Lifetime of login session tokens, as a `P..Y..M..D` period.
    pub session_duration: String,
    /// Live API tokens one principal may hold. 0 = unlimited.
    pub max_api_tokens: usize,
    /// Accept a validly signed token that has no metadata record.
    /// Off by default: an untracked token cannot be revoked.
    pub allow_untracked_tokens: bool,
}

impl Default for TokenSettings {
    fn default() -> Self {
        Self {
            issuer: DEFAULT_ISSUER.to_string(),
            session_duration: DEFAULT_SESSION_DURATION.to_string(),
            max_api_tokens: DEFAULT_MAX_API_TOKENS,
            allow_untracked_tokens: false,
        }
    }
}

fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(false)
}

pub fn load() -> anyhow::Result<Config> {
    dotenvy::dotenv().ok();

    let session_duration = std::env::var("PANEL_SESSION_DURATION")
        .unwrap_or_else(|_| DEFAULT_SESSION_DURATION.into());
    if let Err(e) = parse_duration(&session_duration) {
        anyhow::bail!("PANEL_SESSION_DURATION is invalid: {}", e);
    }

    let tokens = TokenSettings {
        issuer: std::env::var("PANEL_ISSUER")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_ISSUER.into()),
        session_duration,
        max_api_tokens: std::env::var("PANEL_MAX_API_TOKENS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_MAX_API_TOKENS),
        allow_untracked_tokens: env_flag("PANEL_ALLOW_UNTRACKED_TOKENS"),
    };

    if tokens.allow_untracked_tokens {
        eprintln!("⚠️  PANEL_ALLOW_UNTRACKED_TOKENS is set: tokens without a metadata record will be accepted and cannot be revoked.");
    }

    Ok(Config {
        port: std::env::var("PANEL_PORT")
            .unwrap_or_else(|_| "8080".into())
            .parse()
            .unwrap_or(8080),
        token_db_path: std::env::var("PANEL_TOKEN_DB")
            .unwrap_or_else(|_| "configs/tokens.db".into())
            .into(),
        users_file: std::env::var("PANEL_USERS_FILE")
            .unwrap_or_else(|_| "configs/users.json".into())
            .into(),
        log_json: std::env::var("PANEL_LOG_FORMAT")
            .map(|v| v.eq_ignore_ascii_case("json"))
            .unwrap_or(false),
        tokens,
    })
}
