mod directory;

use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use tracing::info;
use whispr_core::config::load_config;
use whispr_core::contact::FileRegistry;
use whispr_core::keystore::KeyringKeyStore;
use whispr_core::{paths, SignIn, WhisprClient};

use crate::directory::{FileDirectory, IDENTITY_FILE_NAME};

#[derive(Parser)]
#[command(name = "whispr")]
#[command(about = "Whispr end-to-end keys and contacts", long_about = None)]
struct Cli {
    /// Data directory (defaults to the platform data dir, or $WHISPR_DATA_DIR)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Make sure this device holds a key pair and the public key is published
    SignIn {
        account: String,
    },

    /// Remove the private key from this device
    SignOut,

    /// Show key status and diagnostics
    Keys {
        account: String,
    },

    /// Write the human-readable key backup
    ExportKeys {
        account: String,

        /// Output file; printed to stdout when omitted
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Print the contact payload to encode in a QR code
    Share {
        account: String,
        email: String,

        #[arg(short, long)]
        name: Option<String>,
    },

    /// Add a contact from a scanned payload ("-" reads stdin)
    Add {
        payload: String,
    },

    /// List contacts
    List,

    /// Search contacts by name or email
    Search {
        query: String,
    },

    /// Remove a contact by id
    Remove {
        id: String,
    },

    /// Record a contact's presence
    SetStatus {
        email: String,

        #[arg(long)]
        online: bool,

        /// Epoch milliseconds; defaults to now
        #[arg(long)]
        last_seen: Option<i64>,
    },

    /// Accept a contact's changed public key
    ConfirmKey {
        email: String,
    },

    /// Encrypt a message for a contact
    Encrypt {
        email: String,
        message: String,
    },

    /// Decrypt a message addressed to this device
    Decrypt {
        ciphertext: String,
    },

    /// Print the contact list with keys redacted
    ExportContacts,

    /// Delete every contact
    ClearContacts,
}

fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn read_payload(arg: String) -> Result<String> {
    if arg != "-" {
        return Ok(arg);
    }
    let mut buf = String::new();
    std::io::stdin()
        .read_to_string(&mut buf)
        .context("reading payload from stdin")?;
    Ok(buf)
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();

    let data_dir = match cli.data_dir {
        Some(dir) => dir,
        None => paths::data_dir()?,
    };
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("creating {}", data_dir.display()))?;
    let config = load_config(&paths::config_path(&data_dir))?;
    info!(data_dir = %data_dir.display(), "whispr starting");

    let client = WhisprClient::from_config(
        &config,
        Arc::new(KeyringKeyStore::from_config(&config.keystore)),
        Arc::new(FileDirectory::new(data_dir.join(IDENTITY_FILE_NAME))),
        Arc::new(FileRegistry::new(paths::registry_dir(&data_dir))),
    )?;

    match cli.command {
        Commands::SignIn { account } => match client.sign_in(&account).await? {
            SignIn::ExistingKeys => println!("Existing keys in place for {account}"),
            SignIn::GeneratedKeys => println!("Generated and published new keys for {account}"),
        },

        Commands::SignOut => {
            client.sign_out().await?;
            println!("Private key removed from this device");
        }

        Commands::Keys { account } => {
            let keys = client.keys();
            let private = keys.get_private_key().await?;
            let public = keys.get_public_key(&account).await?;
            let info = private.as_ref().and_then(|p| keys.key_info(p));
            let report = serde_json::json!({
                "account": account,
                "hasPrivateKey": private.is_some(),
                "hasPublicKey": public.is_some(),
                "privateKeyLength": private.as_ref().map(|p| p.len()),
                "publicKeyLength": public.as_ref().map(String::len),
                "keyInfo": info,
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }

        Commands::ExportKeys { account, out } => {
            let doc = client.keys().export_document(&account, Utc::now()).await?;
            match out {
                Some(path) => {
                    std::fs::write(&path, doc)
                        .with_context(|| format!("writing {}", path.display()))?;
                    println!("Key export written to {}", path.display());
                }
                None => print!("{doc}"),
            }
        }

        Commands::Share {
            account,
            email,
            name,
        } => {
            let payload = client
                .share_contact(&account, &email, name.as_deref())
                .await?;
            println!("{payload}");
        }

        Commands::Add { payload } => {
            let record = client.accept_contact(&read_payload(payload)?).await?;
            println!("{}", serde_json::to_string_pretty(&record)?);
        }

        Commands::List => {
            let contacts = client.contacts().list().await?;
            println!("{}", serde_json::to_string_pretty(&contacts)?);
        }

        Commands::Search { query } => {
            let contacts = client.contacts().search(&query).await?;
            println!("{}", serde_json::to_string_pretty(&contacts)?);
        }

        Commands::Remove { id } => {
            if !client.contacts().remove(&id).await? {
                return Err(anyhow!("no contact with id {id}"));
            }
            println!("Removed {id}");
        }

        Commands::SetStatus {
            email,
            online,
            last_seen,
        } => {
            let seen = last_seen.unwrap_or_else(|| Utc::now().timestamp_millis());
            if !client
                .contacts()
                .update_status(&email, online, Some(seen))
                .await?
            {
                return Err(anyhow!("no contact registered for {email}"));
            }
            let online_now = client.contacts().online_count().await?;
            println!("Updated {email}; {online_now} contact(s) online");
        }

        Commands::ConfirmKey { email } => {
            if !client.contacts().confirm_key(&email).await? {
                return Err(anyhow!("no contact registered for {email}"));
            }
            println!("Key for {email} confirmed");
        }

        Commands::Encrypt { email, message } => {
            let ciphertext = client.encrypt_for(&email, &message).await?;
            client
                .contacts()
                .update_last_message(&email, &message, Utc::now().timestamp_millis(), true)
                .await?;
            println!("{ciphertext}");
        }

        Commands::Decrypt { ciphertext } => {
            let plaintext = client.decrypt(&ciphertext).await?;
            println!("{plaintext}");
        }

        Commands::ExportContacts => {
            println!("{}", client.contacts().export().await?);
        }

        Commands::ClearContacts => {
            client.contacts().clear().await?;
            println!("Contacts cleared");
        }
    }

    Ok(())
}
