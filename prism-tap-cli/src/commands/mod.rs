pub mod columns;
pub mod read;

pub use columns::run_columns;
pub use read::{run_read, ReadOptions};

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use prism_tap::TapConfig;
use std::collections::HashMap;
use std::path::PathBuf;

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Tab-separated cells
    Text,
    /// One JSON array per line
    Json,
}

/// Where to read from and what to project
#[derive(Args, Debug, Clone)]
pub struct SourceArgs {
    /// Elasticsearch node URL
    #[arg(long, env = "PRISM_TAP_NODES")]
    pub nodes: Option<String>,

    /// Index or index/type to read
    #[arg(short, long)]
    pub resource: Option<String>,

    /// `?q=...` URI query or JSON query DSL
    #[arg(short, long)]
    pub query: Option<String>,

    /// Tuple columns (comma-separated); inferred when omitted
    #[arg(short, long)]
    pub fields: Option<String>,

    /// Field mapping, e.g. `address:url`
    #[arg(short, long)]
    pub mapping: Option<String>,

    /// Documents per request
    #[arg(long)]
    pub page_size: Option<usize>,

    /// Fetch the next page while printing the current one
    #[arg(long)]
    pub prefetch: bool,

    /// TOML or YAML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Extra `key=value` settings, e.g. `-o es.scroll.keepalive=1m`
    #[arg(short = 'o', long = "option", value_parser = parse_key_val)]
    pub options: Vec<(String, String)>,
}

impl SourceArgs {
    /// Config file first, then `--option` pairs, then the dedicated flags.
    pub fn to_config(&self) -> Result<TapConfig> {
        let mut config = match &self.config {
            Some(path) => TapConfig::load(path)
                .with_context(|| format!("Failed to load config from {}", path.display()))?,
            None => TapConfig::default(),
        };

        let options: HashMap<String, String> = self.options.iter().cloned().collect();
        config
            .merge_overrides(&options)
            .context("Invalid --option value")?;

        let mut flags = HashMap::new();
        let pairs = [
            ("nodes", &self.nodes),
            ("resource", &self.resource),
            ("query", &self.query),
            ("projection", &self.fields),
            ("mapping", &self.mapping),
        ];
        for (key, value) in pairs {
            if let Some(value) = value {
                flags.insert(key.to_string(), value.clone());
            }
        }
        if let Some(page_size) = self.page_size {
            flags.insert("pageSize".to_string(), page_size.to_string());
        }
        if self.prefetch {
            flags.insert("prefetch".to_string(), "true".to_string());
        }
        config.merge_overrides(&flags)?;

        if config.resource.is_empty() {
            anyhow::bail!("No resource given; use --resource or set it in the config file");
        }
        Ok(config)
    }
}

fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{}'", s))?;
    Ok((key.trim().to_string(), value.to_string()))
}
