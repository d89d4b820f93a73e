use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use panel_auth::config::{self, Config};
use panel_auth::directory::MemoryDirectory;
use panel_auth::models::scope::{authorize_scope, ScopeNode};
use panel_auth::models::token::Audience;
use panel_auth::store::embedded::EmbeddedStore;
use panel_auth::store::TokenStore;
use panel_auth::tokens::{IssueRequest, TokenUpdate};
use panel_auth::{api, AppState};

mod cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = config::load()?;
    init_tracing(cfg.log_json);

    let args = cli::Cli::parse();

    let result = match args.command {
        Some(cli::Commands::Serve { port }) => {
            let port = port.unwrap_or(cfg.port);
            run_server(cfg, port).await
        }
        Some(cli::Commands::Token { command }) => {
            let state = build_state(&cfg)?;
            handle_token_command(command, &state).await
        }
        None => {
            let port = cfg.port;
            run_server(cfg, port).await
        }
    };

    if let Err(ref e) = result {
        eprintln!("Error: {:?}", e);
    }
    result
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| "panel_auth=debug,tower_http=debug".into()),
    );
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

fn build_state(cfg: &Config) -> anyhow::Result<Arc<AppState>> {
    let store: Arc<dyn TokenStore> = Arc::new(
        EmbeddedStore::open(&cfg.token_db_path)
            .with_context(|| format!("opening token store {}", cfg.token_db_path.display()))?,
    );
    let directory = Arc::new(MemoryDirectory::from_json_file(&cfg.users_file)?);
    if directory.is_empty() {
        tracing::warn!(path = %cfg.users_file.display(), "users file defines no principals");
    }
    Ok(Arc::new(AppState::new(store, directory, cfg.tokens.clone())))
}

async fn run_server(cfg: Config, port: u16) -> anyhow::Result<()> {
    tracing::info!("Opening token store and users file...");
    let state = build_state(&cfg)?;

    let app = api::app_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(issuer = %cfg.tokens.issuer, "panel-auth listening on {}", addr);
    axum::serve(listener, app).await?;

    Ok(())
}

fn parse_audience(raw: &str) -> anyhow::Result<Audience> {
    raw.parse::<Audience>().map_err(anyhow::Error::from)
}

async fn handle_token_command(cmd: cli::TokenCommands, state: &Arc<AppState>) -> anyhow::Result<()> {
    match cmd {
        cli::TokenCommands::Create {
            user,
            name,
            description,
            duration,
            scopes,
            session,
        } => {
            let principal = state
                .directory
                .find_by_username(&user)
                .ok_or_else(|| anyhow::anyhow!("User not found: {}", user))?;

            let scopes = if scopes.is_empty() {
                None
            } else {
                Some(ScopeNode::from_scope_strings(&scopes)?)
            };

            let request = if session {
                IssueRequest {
                    name: name.unwrap_or_else(|| principal.display_name().to_string()),
                    audience: Audience::WebSession,
                    scopes,
                    duration: duration
                        .unwrap_or_else(|| state.issuer.settings().session_duration.clone()),
                    description,
                }
            } else {
                IssueRequest {
                    name: name.context("--name is required for API tokens")?,
                    audience: Audience::Api,
                    scopes,
                    duration: duration.unwrap_or_default(),
                    description,
                }
            };

            let issued = state.issuer.issue(&principal, request)?;
            println!(
                "Token created:\n  ID:      {}\n  Expires: {}\n  Use:     Authorization: Bearer {}",
                issued.jti,
                issued.metadata.expires_at.to_rfc3339(),
                issued.token
            );
        }
        cli::TokenCommands::List { user, audience } => {
            let principal = state
                .directory
                .find_by_username(&user)
                .ok_or_else(|| anyhow::anyhow!("User not found: {}", user))?;
            let audience = audience.as_deref().map(parse_audience).transpose()?;

            let tokens = state.tokens.list(&principal.id, audience)?;
            if tokens.is_empty() {
                println!("No tokens found.");
            } else {
                println!("{:<38} {:<20} {:<12} {:<26}", "ID", "NAME", "AUDIENCE", "EXPIRES");
                for t in tokens {
                    println!(
                        "{:<38} {:<20} {:<12} {:<26}",
                        t.jti,
                        t.name,
                        t.audience,
                        t.expires_at.to_rfc3339()
                    );
                }
            }
        }
        cli::TokenCommands::Show { id } => {
            let record = state
                .store
                .get(&id)?
                .ok_or_else(|| anyhow::anyhow!("Token not found: {}", id))?;
            println!("{}", serde_json::to_string_pretty(&record)?);
        }
        cli::TokenCommands::Update {
            id,
            name,
            description,
        } => {
            let record = state
                .store
                .get(&id)?
                .ok_or_else(|| anyhow::anyhow!("Token not found: {}", id))?;
            state.tokens.update(
                &record.metadata.owner_id,
                &id,
                TokenUpdate { name, description },
            )?;
            println!("Token updated.");
        }
        cli::TokenCommands::Revoke { id } => {
            if state.store.get(&id)?.is_none() {
                println!("Token not found.");
            } else {
                state.store.revoke(&id)?;
                println!("Token revoked.");
            }
        }
        cli::TokenCommands::Verify {
            token,
            audience,
            scope,
        } => {
            let audience = parse_audience(&audience)?;
            let claims = state.validator.validate(&token, audience).await?;
            println!("{}", serde_json::to_string_pretty(&claims)?);

            if let Some(scope) = scope {
                if authorize_scope(&claims.scopes, &scope) {
                    println!("Scope '{}': granted", scope);
                } else {
                    anyhow::bail!("Scope '{}': denied", scope);
                }
            }
        }
    }
    Ok(())
}
