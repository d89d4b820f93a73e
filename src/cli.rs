use clap::{Parser, Subcommand};

/// panel-auth: admin panel token service
#[derive(Parser)]
#[command(name = "panel-auth", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP server
    Serve {
        /// Port to bind (defaults to PANEL_PORT)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Manage tokens
    Token {
        #[command(subcommand)]
        command: TokenCommands,
    },
}

#[derive(Subcommand)]
pub enum TokenCommands {
    /// Issue a token for a user
    Create {
        /// Username the token is issued to
        #[arg(long)]
        user: String,
        #[arg(long)]
        name: Option<String>,
        /// Free-form note stored with the token
        #[arg(long, default_value = "")]
        description: String,
        /// Lifetime as a P..Y..M..D period, e.g. P30D
        #[arg(long)]
        duration: Option<String>,
        /// Scope in path:action form; repeatable. Omit to inherit the user's scopes.
        #[arg(long = "scope")]
        scopes: Vec<String>,
        /// Issue a web-session token instead of an API token
        #[arg(long)]
        session: bool,
    },
    /// List a user's non-revoked tokens
    List {
        #[arg(long)]
        user: String,
        /// api or web-session
        #[arg(long)]
        audience: Option<String>,
    },
    /// Show one token's metadata
    Show {
        #[arg(long)]
        id: String,
    },
    /// Change a token's name and/or description
    Update {
        #[arg(long)]
        id: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        description: Option<String>,
    },
    /// Revoke a token
    Revoke {
        #[arg(long)]
        id: String,
    },
    /// Validate a signed token and optionally check a scope
    Verify {
        #[arg(long)]
        token: String,
        /// api or web-session
        #[arg(long, default_value = "api")]
        audience: String,
        /// Scope in path:action form
        #[arg(long)]
        scope: Option<String>,
    },
}
