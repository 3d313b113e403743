//! velum-dm: Command-line front end for velum encrypted direct messages.
//!
//! Wraps the encryption session facade: key setup, rotation, legacy
//! migration, and message encrypt/decrypt against a local SQLite key
//! database. Output is JSON on stdout; logs go to stderr.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use velum_session::{EncryptedMessage, EncryptionSession, SessionConfig};

#[derive(Parser)]
#[command(name = "velum-dm")]
#[command(author, version, about = "Encrypted direct messaging for velum")]
#[command(propagate_version = true)]
struct Cli {
    /// Path to the SQLite key database (default: $VELUM_DB_PATH or velum.db)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Legacy flat-file key directory (default: $VELUM_LEGACY_DIR)
    #[arg(long, global = true)]
    legacy_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Set up encryption for a user, generating a key pair if needed
    Init {
        /// User to initialize
        user: String,
    },

    /// Show the session state for a user
    Status {
        /// User to inspect
        user: String,
    },

    /// List stored key pairs for a user (public material only)
    Keys {
        /// User whose key pairs to list
        user: String,
    },

    /// Generate a fresh key pair and make it current
    Rotate {
        /// User whose keys to rotate
        user: String,
    },

    /// Discard every stored key pair for a user (irreversible)
    Reset {
        /// User to reset
        user: String,
    },

    /// Encrypt a message for a recipient
    Encrypt {
        /// Message text
        message: String,

        /// Recipient user id, resolved through the local directory
        #[arg(short, long, conflicts_with = "recipient_key")]
        recipient: Option<String>,

        /// Explicit recipient public key (base64)
        #[arg(long)]
        recipient_key: Option<String>,
    },

    /// Decrypt a message envelope
    Decrypt {
        /// Receiving user
        user: String,

        /// Base64 ciphertext from the envelope
        #[arg(short, long)]
        ciphertext: String,

        /// Base64 IV from the envelope
        #[arg(short, long)]
        iv: String,
    },

    /// Move legacy flat-file keys into the key database
    Migrate {
        /// User whose legacy keys to migrate
        user: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = SessionConfig::from_env();
    if let Some(db) = cli.db {
        config = config.with_db_path(db);
    }
    if let Some(dir) = cli.legacy_dir {
        config = config.with_legacy_dir(dir);
    }

    let session = EncryptionSession::from_config(&config).await?;

    match cli.command {
        Commands::Init { user } => {
            cmd_init(&session, &user).await?;
        }
        Commands::Status { user } => {
            cmd_status(&session, &user).await?;
        }
        Commands::Keys { user } => {
            cmd_keys(&session, &user).await?;
        }
        Commands::Rotate { user } => {
            cmd_rotate(&session, &user).await?;
        }
        Commands::Reset { user } => {
            cmd_reset(&session, &user).await?;
        }
        Commands::Encrypt {
            message,
            recipient,
            recipient_key,
        } => {
            cmd_encrypt(
                &session,
                &message,
                recipient.as_deref(),
                recipient_key.as_deref(),
            )
            .await?;
        }
        Commands::Decrypt {
            user,
            ciphertext,
            iv,
        } => {
            cmd_decrypt(&session, &user, ciphertext, iv).await?;
        }
        Commands::Migrate { user } => {
            cmd_migrate(&session, &user).await?;
        }
    }

    Ok(())
}

async fn cmd_init(
    session: &EncryptionSession,
    user: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let info = session.initialize(user).await?;

    let output = serde_json::json!({
        "user": user,
        "key_id": info.key_id,
        "public_key": info.public_key,
    });

    println!("{}", serde_json::to_string_pretty(&output)?);

    Ok(())
}

async fn cmd_status(
    session: &EncryptionSession,
    user: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let state = session.status(user).await?;
    let has_keys = session.has_keys(user).await?;

    let output = serde_json::json!({
        "user": user,
        "state": state.to_string(),
        "has_keys": has_keys,
    });

    println!("{}", serde_json::to_string_pretty(&output)?);

    Ok(())
}

async fn cmd_keys(
    session: &EncryptionSession,
    user: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let keys = session.list_keys(user).await?;

    let output = serde_json::json!({
        "user": user,
        "count": keys.len(),
        "keys": keys,
    });

    println!("{}", serde_json::to_string_pretty(&output)?);

    Ok(())
}

async fn cmd_rotate(
    session: &EncryptionSession,
    user: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let info = session.rotate(user).await?;

    let output = serde_json::json!({
        "user": user,
        "key_id": info.key_id,
        "public_key": info.public_key,
    });

    println!("{}", serde_json::to_string_pretty(&output)?);

    Ok(())
}

async fn cmd_reset(
    session: &EncryptionSession,
    user: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    session.reset(user).await?;

    let output = serde_json::json!({
        "user": user,
        "reset": true,
    });

    println!("{}", serde_json::to_string_pretty(&output)?);

    Ok(())
}

async fn cmd_encrypt(
    session: &EncryptionSession,
    message: &str,
    recipient: Option<&str>,
    recipient_key: Option<&str>,
) -> Result<(), Box<dyn std::error::Error>> {
    let public_key = match (recipient, recipient_key) {
        (Some(user), None) => session
            .recipient_key(user)
            .await?
            .ok_or_else(|| format!("No published key for {user}"))?,
        (None, Some(key)) => key.to_string(),
        _ => return Err("Provide exactly one of --recipient or --recipient-key".into()),
    };

    let envelope = session.encrypt_message(message, &public_key).await?;

    let output = serde_json::json!({
        "recipient": recipient,
        "ciphertext": envelope.ciphertext,
        "iv": envelope.iv,
    });

    println!("{}", serde_json::to_string_pretty(&output)?);

    Ok(())
}

async fn cmd_decrypt(
    session: &EncryptionSession,
    user: &str,
    ciphertext: String,
    iv: String,
) -> Result<(), Box<dyn std::error::Error>> {
    let envelope = EncryptedMessage { ciphertext, iv };
    let plaintext = session.decrypt_message(&envelope, user).await?;

    let output = serde_json::json!({
        "user": user,
        "plaintext": plaintext,
    });

    println!("{}", serde_json::to_string_pretty(&output)?);

    Ok(())
}

async fn cmd_migrate(
    session: &EncryptionSession,
    user: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let count = session.migrate_legacy_keys(user).await?;

    let output = serde_json::json!({
        "user": user,
        "migrated_count": count,
    });

    println!("{}", serde_json::to_string_pretty(&output)?);

    Ok(())
}
