use anyhow::Result;
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tokenvault::config::Config;
use tokenvault::issuer::TokenIssuer;
use tokenvault::provider::Provider;
use tokenvault::provision;
use tokenvault::store::SecretStore;

#[derive(Parser)]
#[command(
    name = "tokenvault",
    about = "Encrypted credential store and access-token issuance"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create the secret store, or verify the schema of an existing one
    Init,
    /// Register an OAuth client, or rotate its credentials in place
    AddClient {
        /// Opaque client key, e.g. "ms_graph_prod"
        key: String,
        client_id: String,
        client_secret: String,
        /// "google" or "microsoft"
        provider: Provider,
    },
    /// Deactivate a client registration (kept, but skipped by lookups)
    DeactivateClient { key: String },
    /// Store a refresh token for a user under a client key
    AddUser {
        username: String,
        client_key: String,
        refresh_token: String,
    },
    /// Revoke all of a user's tokens
    Revoke { username: String },
    /// Mint an access token and print it to stdout
    Token {
        username: String,
        /// Client key, required when the user has tokens under several clients
        #[arg(long)]
        client: Option<String>,
    },
    /// List client registrations (secrets are not shown)
    List,
    /// Print a fresh store encryption key
    GenKey,
    /// Seal the plaintext store into an encrypted blob
    Encrypt {
        /// Leave the plaintext store in place after sealing
        #[arg(long)]
        keep_plaintext: bool,
    },
    /// Restore the plaintext store from an encrypted blob
    Decrypt,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tokenvault=info".into()),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;

    match cli.command {
        Command::Init => {
            SecretStore::open(&config.db_path)?;
            println!("Secret store ready at {}", config.db_path.display());
        }
        Command::AddClient {
            key,
            client_id,
            client_secret,
            provider,
        } => {
            let store = SecretStore::open(&config.db_path)?;
            store.upsert_client(&key, &client_id, &client_secret, provider)?;
            println!("Client '{}' registered for {}", key, provider);
        }
        Command::DeactivateClient { key } => {
            let store = SecretStore::open(&config.db_path)?;
            store.deactivate_client(&key)?;
            println!("Client '{}' deactivated", key);
        }
        Command::AddUser {
            username,
            client_key,
            refresh_token,
        } => {
            let store = SecretStore::open(&config.db_path)?;
            store.upsert_user_token(&username, &client_key, &refresh_token)?;
            println!("Refresh token stored for '{}' under '{}'", username, client_key);
        }
        Command::Revoke { username } => {
            let store = SecretStore::open(&config.db_path)?;
            store.revoke_token(&username)?;
            println!("Tokens revoked for '{}'", username);
        }
        Command::Token { username, client } => {
            let store = Arc::new(SecretStore::open(&config.db_path)?);
            let issuer = TokenIssuer::new(store, config.issuer.clone())?;
            let access = match client {
                Some(client_key) => {
                    issuer
                        .get_access_token_for_client(&username, &client_key)
                        .await?
                }
                None => issuer.get_access_token(&username).await?,
            };
            println!("{}", access.token);
        }
        Command::List => {
            let store = SecretStore::open(&config.db_path)?;
            for client in store.list_clients()? {
                println!(
                    "{}\t{}\t{}\t{}\t{}",
                    client.key,
                    client.provider,
                    client.client_id,
                    if client.active { "active" } else { "inactive" },
                    client.created_at.to_rfc3339(),
                );
            }
        }
        Command::GenKey => {
            println!("{}", tokenvault::codec::generate_key());
            eprintln!("Save this key securely; a lost key cannot be recovered.");
        }
        Command::Encrypt { keep_plaintext } => {
            let key = provision::require_db_key()?;
            provision::encrypt_store(&config.db_path, &config.enc_path, &key, keep_plaintext)?;
            println!("Store sealed at {}", config.enc_path.display());
        }
        Command::Decrypt => {
            let key = provision::require_db_key()?;
            provision::decrypt_store(&config.enc_path, &config.db_path, &key)?;
            println!("Store restored at {}", config.db_path.display());
        }
    }

    Ok(())
}
