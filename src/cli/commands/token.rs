use anyhow::Context;
use clap::Subcommand;
use serde::Serialize;

use super::load_config;
use crate::auth::{Claims, TokenService, TokenSubject};
use crate::cli::utils::output;
use crate::cli::OutputFormat;

#[derive(Subcommand)]
pub enum TokenCommands {
    #[command(about = "Sign a token with the configured JWT secret")]
    Issue {
        #[arg(long, help = "Tenant id")]
        tenant: i64,
        #[arg(long, help = "Restaurant id (omit for a tenant-wide token)")]
        restaurant: Option<i64>,
        #[arg(long, default_value_t = 1, help = "User id")]
        user_id: i64,
        #[arg(long, default_value = "shardctl@localhost", help = "User email")]
        email: String,
        #[arg(long, default_value = "admin", help = "Role")]
        role: String,
    },

    #[command(about = "Validate a token and print its claims")]
    Inspect {
        #[arg(help = "Token (without the Bearer prefix)")]
        token: String,
    },
}

#[derive(Debug, Serialize)]
struct IssuedToken {
    token: String,
    claims: Claims,
}

pub fn handle(cmd: TokenCommands, output_format: OutputFormat) -> anyhow::Result<()> {
    let config = load_config()?;
    let tokens = TokenService::from_config(&config.security).context("token service unavailable")?;

    match cmd {
        TokenCommands::Issue {
            tenant,
            restaurant,
            user_id,
            email,
            role,
        } => {
            let token = tokens.issue(TokenSubject {
                user_id,
                email,
                tenant_id: tenant,
                restaurant_id: restaurant,
                role,
            })?;
            let claims = tokens.validate(&token)?;
            let issued = IssuedToken { token, claims };

            output(output_format, &issued, || {
                println!("{}", issued.token);
                if let Some(expires) = issued.claims.expires_at() {
                    eprintln!("expires {}", expires.to_rfc3339());
                }
            })
        }
        TokenCommands::Inspect { token } => {
            let claims = tokens.validate(token.trim())?;

            output(output_format, &claims, || {
                println!("user_id:       {}", claims.user_id);
                println!("email:         {}", claims.email);
                println!("tenant_id:     {}", claims.tenant_id);
                println!("restaurant_id: {}", claims.restaurant_id);
                println!("role:          {}", claims.role);
                if let Some(expires) = claims.expires_at() {
                    println!("expires:       {}", expires.to_rfc3339());
                }
            })
        }
    }
}
