//! CLI module for PMP Tag Cache
//!
//! Every subcommand opens the configured backend, performs one operation
//! and prints the result as JSON on stdout.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing::info;

use crate::config::AppConfig;
use crate::domain::{EntryTtl, Tag};
use crate::infrastructure::cache::CacheFactory;
use crate::infrastructure::logging;
use crate::infrastructure::services::TaggedCacheService;

/// PMP Tag Cache - Tag-aware cache over memory, Redis and disk backends
#[derive(Parser)]
#[command(name = "pmp-tag-cache")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Backend to use (memory, redis, disk)
    #[arg(long, global = true)]
    pub backend: Option<String>,

    /// Prefix of the tag index keys
    #[arg(long, global = true)]
    pub prefix: Option<String>,

    /// Redis connection URL
    #[arg(long, global = true)]
    pub redis_url: Option<String>,

    /// Directory for the disk backend
    #[arg(long, global = true)]
    pub disk_path: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Store a JSON value
    Set {
        key: String,
        /// Value as JSON text
        value: String,
        /// Time to live in seconds, 0 for none
        #[arg(long, default_value_t = 0)]
        ttl: u64,
        /// Tag to file the key under
        #[arg(long)]
        tag: Option<String>,
    },

    /// Print the value stored under a key
    Get { key: String },

    /// Delete a key and print the value it held
    Remove { key: String },

    /// Delete every key filed under the given tags
    RemoveTag {
        #[arg(required = true)]
        tags: Vec<String>,
    },

    /// List the keys filed under a tag
    Members { tag: String },

    /// List every key
    Keys,

    /// Print the number of entries
    Size,

    /// Print the remaining time to live of a key
    Ttl { key: String },

    /// Remove every entry
    Clear,
}

impl Cli {
    /// Layers command-line overrides on top of the loaded configuration
    fn apply_overrides(&self, config: &mut AppConfig) {
        if let Some(backend) = &self.backend {
            config.cache.backend = backend.clone();
        }
        if let Some(prefix) = &self.prefix {
            config.cache.prefix = prefix.clone();
        }
        if let Some(url) = &self.redis_url {
            config.cache.redis_url = Some(url.clone());
        }
        if let Some(path) = &self.disk_path {
            config.cache.disk_path = Some(path.clone());
        }
    }
}

/// Run a single cache command
pub async fn run(cli: Cli) -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let mut config = AppConfig::load().unwrap_or_default();
    cli.apply_overrides(&mut config);
    logging::init_logging(&config.logging);

    let service = open_service(&config).await?;

    let output = execute(&service, cli.command).await?;
    println!("{}", serde_json::to_string_pretty(&output)?);

    Ok(())
}

async fn open_service(config: &AppConfig) -> anyhow::Result<TaggedCacheService> {
    let cache_config = config.cache.to_cache_config()?;
    info!(backend = %cache_config.cache_type, "Opening cache");

    let cache = CacheFactory::new().create(&cache_config).await?;

    Ok(TaggedCacheService::with_config(
        cache,
        config.cache.to_tagged_config(),
    ))
}

async fn execute(
    service: &TaggedCacheService,
    command: Command,
) -> anyhow::Result<serde_json::Value> {
    use serde_json::{json, Value};

    let output = match command {
        Command::Set {
            key,
            value,
            ttl,
            tag,
        } => {
            let value: Value = serde_json::from_str(&value)?;
            let tag = tag.map(Tag::new);

            service
                .set(&key, &value, Duration::from_secs(ttl), tag.as_ref())
                .await?;
            json!({ "key": key, "stored": true })
        }
        Command::Get { key } => service.get::<Value>(&key).await?.unwrap_or(Value::Null),
        Command::Remove { key } => service.remove::<Value>(&key).await?.unwrap_or(Value::Null),
        Command::RemoveTag { tags } => {
            let tags: Vec<Tag> = tags.into_iter().map(Tag::new).collect();
            let removed = service.remove_by_tags(&tags).await?;
            json!({ "removed": removed })
        }
        Command::Members { tag } => {
            let members = service.tag_members(&Tag::new(tag)).await?;
            json!(members.into_keys())
        }
        Command::Keys => {
            let mut keys = service.keys().await?;
            keys.sort();
            json!(keys)
        }
        Command::Size => json!(service.size().await?),
        Command::Ttl { key } => match service.get_expire(&key).await? {
            Some(EntryTtl::Persistent) => json!({ "key": key, "ttl": "persistent" }),
            Some(EntryTtl::Expires(remaining)) => {
                json!({ "key": key, "ttl_ms": remaining.as_millis() as u64 })
            }
            None => Value::Null,
        },
        Command::Clear => {
            service.clear().await?;
            json!({ "cleared": true })
        }
    };

    Ok(output)
}
