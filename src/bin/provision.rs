//! Depot provisioner - namespace administration
//!
//! Registers app namespaces for the storage API and manages their secrets
//! and enablement. Point it at the same MongoDB the depot server uses.
//!
//! Usage:
//!   depot-provision create --namespace-id my-app --name "My App"
//!   depot-provision rotate --namespace-id my-app
//!   depot-provision disable --namespace-id my-app --message "Closed for maintenance"
//!   depot-provision list
//!
//! Environment variables:
//!   MONGODB_URI - MongoDB connection string (default: mongodb://localhost:27017)
//!   MONGODB_DB - Database name (default: depot)

use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use depot::auth::MongoNamespaceDirectory;
use depot::db::schemas::NamespaceDoc;
use depot::db::MongoClient;
use depot::types::DepotError;

#[derive(Parser, Debug)]
#[command(name = "depot-provision")]
#[command(about = "Namespace administration for the depot storage API")]
#[command(version)]
struct Args {
    /// MongoDB connection string
    #[arg(long, env = "MONGODB_URI", default_value = "mongodb://localhost:27017")]
    mongodb_uri: String,

    /// MongoDB database name
    #[arg(long, env = "MONGODB_DB", default_value = "depot")]
    mongodb_db: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Register a namespace and print its app secret
    Create {
        /// Caller-visible namespace id (the app segment in request paths)
        #[arg(long)]
        namespace_id: String,

        /// Display name; defaults to the namespace id
        #[arg(long)]
        name: Option<String>,

        /// App secret; generated when omitted
        #[arg(long)]
        secret: Option<String>,
    },

    /// Replace a namespace's app secret
    Rotate {
        #[arg(long)]
        namespace_id: String,

        /// New secret; generated when omitted
        #[arg(long)]
        secret: Option<String>,
    },

    /// Re-enable a disabled namespace
    Enable {
        #[arg(long)]
        namespace_id: String,
    },

    /// Disable a namespace without deleting anything
    Disable {
        #[arg(long)]
        namespace_id: String,

        /// Message returned to callers while disabled
        #[arg(long)]
        message: Option<String>,
    },

    /// Soft-delete a namespace
    Remove {
        #[arg(long)]
        namespace_id: String,
    },

    /// List live namespaces
    List,
}

#[tokio::main]
async fn main() {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,depot=debug")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let _ = dotenvy::dotenv();

    // Parse arguments
    let args = Args::parse();

    let mongo = match MongoClient::new(&args.mongodb_uri, &args.mongodb_db).await {
        Ok(client) => client,
        Err(e) => {
            error!("MongoDB connection failed: {}", e);
            std::process::exit(1);
        }
    };

    let directory = MongoNamespaceDirectory::new(mongo);

    if let Err(e) = run(&directory, args.command).await {
        error!("Provisioning failed: {}", e);
        std::process::exit(1);
    }
}

async fn run(directory: &MongoNamespaceDirectory, command: Command) -> Result<(), DepotError> {
    match command {
        Command::Create {
            namespace_id,
            name,
            secret,
        } => {
            let secret = secret.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
            let name = name.unwrap_or_else(|| namespace_id.clone());

            directory
                .create(NamespaceDoc::new(namespace_id.clone(), name, secret.clone()))
                .await?;

            info!("Namespace '{}' registered", namespace_id);
            println!("namespace: {}", namespace_id);
            println!("secret:    {}", secret);
        }

        Command::Rotate {
            namespace_id,
            secret,
        } => {
            let secret = secret.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

            if !directory.rotate_secret(&namespace_id, &secret).await? {
                return Err(DepotError::NotFound(namespace_id));
            }

            info!("Secret rotated for '{}'", namespace_id);
            println!("namespace: {}", namespace_id);
            println!("secret:    {}", secret);
        }

        Command::Enable { namespace_id } => {
            if !directory.set_enabled(&namespace_id, true, None).await? {
                return Err(DepotError::NotFound(namespace_id));
            }
            println!("namespace {} enabled", namespace_id);
        }

        Command::Disable {
            namespace_id,
            message,
        } => {
            if !directory
                .set_enabled(&namespace_id, false, message.as_deref())
                .await?
            {
                return Err(DepotError::NotFound(namespace_id));
            }
            println!("namespace {} disabled", namespace_id);
        }

        Command::Remove { namespace_id } => {
            if !directory.remove(&namespace_id).await? {
                return Err(DepotError::NotFound(namespace_id));
            }
            println!("namespace {} removed", namespace_id);
        }

        Command::List => {
            let namespaces = directory.list().await?;
            if namespaces.is_empty() {
                println!("no namespaces registered");
                return Ok(());
            }

            for ns in namespaces {
                let state = if !ns.is_enabled {
                    "disabled"
                } else if ns.status.as_deref() == Some("inactive") {
                    "inactive"
                } else {
                    "enabled"
                };
                println!("{}\t{}\t{}", ns.namespace_id, state, ns.name);
            }
        }
    }

    Ok(())
}
