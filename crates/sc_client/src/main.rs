use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

use sc_client::{
    init_tracing, ClientConfig, Collaborators, DeliveryPipeline, Draft, Inbound, LoopbackServer,
    SendPolicy, Session,
};
use sc_crypto::{KeyPair, PublicKey};
use sc_store::{MemoryKeyStore, PrivateKeyStore, SqliteKeyStore, Store, StoredKey, Vault};

const DEMO_ROOM: &str = "general";

#[derive(Parser)]
#[command(name = "secure-chat")]
#[command(about = "End-to-end encrypted chat core", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run alice, bob and carol against an in-process server
    Demo {
        /// Attach a generated file of this many bytes
        #[arg(long, default_value = "0")]
        attachment_bytes: usize,

        /// Corrupt the attachment blob before bob downloads it
        #[arg(long)]
        tamper_attachment: bool,

        /// Override SC_SEND_POLICY
        #[arg(long)]
        policy: Option<SendPolicy>,

        /// Keep alice's private key in the local vault instead of memory
        #[arg(long)]
        persist: bool,
    },

    /// Inspect or manage locally held private keys
    Keys {
        #[command(subcommand)]
        command: KeysCommand,
    },
}

#[derive(Subcommand)]
enum KeysCommand {
    /// Show the stored public key and its fingerprint
    Status {
        #[arg(long)]
        user: String,
    },

    /// Generate and store a keypair if none exists
    Generate {
        #[arg(long)]
        user: String,
    },

    /// Delete the stored private key
    Clear {
        #[arg(long)]
        user: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let mut config = ClientConfig::from_env()?;

    match cli.command {
        Commands::Demo {
            attachment_bytes,
            tamper_attachment,
            policy,
            persist,
        } => {
            if let Some(policy) = policy {
                config.send_policy = policy;
            }
            run_demo(config, attachment_bytes, tamper_attachment, persist).await?;
        }
        Commands::Keys { command } => run_keys(config, command).await?,
    }
    Ok(())
}

async fn open_store(config: &ClientConfig) -> Result<Store> {
    let vault = Vault::with_auto_lock(config.vault_auto_lock_secs);
    let store = Store::open(&config.db_path(), vault)
        .await
        .with_context(|| format!("opening {}", config.db_path().display()))?;
    Ok(store)
}

async fn unlocked_store(config: &ClientConfig) -> Result<Store> {
    let store = open_store(config).await?;
    let password = vault_password()?;
    store.unlock(password.as_bytes()).await?;
    Ok(store)
}

fn vault_password() -> Result<zeroize::Zeroizing<String>> {
    if let Ok(password) = std::env::var("SC_VAULT_PASSWORD") {
        return Ok(zeroize::Zeroizing::new(password));
    }
    let password = rpassword::prompt_password("Vault password: ")?;
    if password.is_empty() {
        bail!("empty vault password");
    }
    Ok(zeroize::Zeroizing::new(password))
}

async fn run_keys(config: ClientConfig, command: KeysCommand) -> Result<()> {
    match command {
        KeysCommand::Status { user } => {
            let keys = SqliteKeyStore::new(open_store(&config).await?);
            let status = match keys.public_key(&user).await? {
                Some(b64) => {
                    let public = PublicKey::from_b64(&b64)?;
                    serde_json::json!({
                        "user": user,
                        "publicKey": b64,
                        "fingerprint": public.fingerprint(),
                    })
                }
                None => serde_json::json!({ "user": user, "publicKey": null }),
            };
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
        KeysCommand::Generate { user } => {
            let keys = SqliteKeyStore::new(unlocked_store(&config).await?);
            let pair = match keys.load(&user).await? {
                Some(existing) => existing.key_pair(),
                None => {
                    let pair = KeyPair::generate()?;
                    keys.save(&user, &StoredKey::new(pair.private().clone())).await?;
                    pair
                }
            };
            println!("{} {}", pair.public_b64(), pair.public.fingerprint());
        }
        KeysCommand::Clear { user } => {
            let keys = SqliteKeyStore::new(unlocked_store(&config).await?);
            if keys.delete(&user).await? {
                println!("cleared private key for {user}");
            } else {
                println!("no private key stored for {user}");
            }
        }
    }
    Ok(())
}

async fn run_demo(config: ClientConfig, attachment_bytes: usize, tamper: bool, persist: bool) -> Result<()> {
    let server = LoopbackServer::new();
    server.create_room(DEMO_ROOM, &["alice", "bob"]);
    let collaborators = Collaborators::from_backend(server.clone());

    let alice_keys: Arc<dyn PrivateKeyStore> = if persist {
        Arc::new(SqliteKeyStore::new(unlocked_store(&config).await?))
    } else {
        Arc::new(MemoryKeyStore::new())
    };
    let alice = DeliveryPipeline::open(Session::new(
        "alice",
        config.clone(),
        alice_keys,
        collaborators.clone(),
    ))
    .await?;
    let bob = DeliveryPipeline::open(Session::new(
        "bob",
        config.clone(),
        Arc::new(MemoryKeyStore::new()),
        collaborators.clone(),
    ))
    .await?;
    // Not a member of the room.
    let carol = DeliveryPipeline::open(Session::new(
        "carol",
        config,
        Arc::new(MemoryKeyStore::new()),
        collaborators,
    ))
    .await?;

    for pipeline in [&alice, &bob, &carol] {
        let fingerprint = pipeline.custody().fingerprint().await?.unwrap_or_default();
        println!("{:<6} fingerprint {}", pipeline.user_id(), fingerprint);
    }

    let mut draft = Draft::text(DEMO_ROOM, "hello bob");
    if attachment_bytes > 0 {
        let bytes = (0..attachment_bytes).map(|i| (i % 251) as u8).collect();
        draft = draft.with_file("demo.bin", "application/octet-stream", bytes);
    }
    let outcome = alice.send(draft).await?;
    println!(
        "alice  sent {} (encrypted: {})",
        outcome.client_message_id, outcome.encrypted
    );
    if let Some(warning) = &outcome.warning {
        println!("alice  warning: {warning}");
    }

    for event in alice.drain().await {
        if let Inbound::Message { applied, .. } = event {
            println!("alice  echo {applied:?}");
        }
    }

    for event in bob.drain().await {
        let Inbound::Message { message, .. } = event else {
            continue;
        };
        println!("bob    <{}> {}", message.sender, message.text());
        for handle in &message.attachments {
            if tamper {
                server.corrupt_blob(&handle.meta.url, 0)?;
            }
            match handle.fetch(&*server).await {
                Ok(bytes) => println!("bob    attachment ok ({} bytes)", bytes.len()),
                Err(err) => println!("bob    attachment rejected: {err}"),
            }
        }
    }

    let stored = server.stored(DEMO_ROOM);
    if let Some(first) = stored.first() {
        let seen_by_carol = carol.render(first).await;
        println!("carol  {} ({:?})", seen_by_carol.text(), seen_by_carol.body);
        println!("server stored: {}", serde_json::to_string(first)?);
    }

    alice.close().await?;
    bob.close().await?;
    carol.close().await?;
    Ok(())
}
