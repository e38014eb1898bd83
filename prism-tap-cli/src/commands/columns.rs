use anyhow::{Context, Result};
use prism_tap::ConnectorSource;

use super::{OutputFormat, SourceArgs};

/// Open the source, look at the first document and print the tuple columns.
pub async fn run_columns(args: SourceArgs, format: OutputFormat) -> Result<()> {
    let config = args.to_config()?;
    let mut source = ConnectorSource::from_config(config)?;
    let resource = source.config().resource.clone();
    source
        .open()
        .await
        .with_context(|| format!("Failed to open '{}'", resource))?;

    // Inferred columns are only known once a document was seen
    let peeked = source.has_next().await;
    let columns = source.columns().to_vec();
    source.close().await;
    peeked.context("Failed to fetch the first document")?;

    match format {
        OutputFormat::Text => {
            for column in &columns {
                println!("{}", column);
            }
        }
        OutputFormat::Json => println!("{}", serde_json::to_string(&columns)?),
    }
    if columns.is_empty() {
        tracing::warn!("No documents matched, columns could not be inferred");
    }
    Ok(())
}
