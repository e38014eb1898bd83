use anyhow::{Context, Result};
use prism_tap::{ConnectorSource, Tuple};
use std::io::{self, BufWriter, Write};

use super::{OutputFormat, SourceArgs};
use crate::progress::ReadProgress;

#[derive(Debug, Clone, Copy)]
pub struct ReadOptions {
    pub format: OutputFormat,
    pub limit: Option<usize>,
    pub header: bool,
    pub no_progress: bool,
}

/// Run read command
pub async fn run_read(args: SourceArgs, options: ReadOptions) -> Result<()> {
    let config = args.to_config()?;
    let mut source = ConnectorSource::from_config(config)?;
    let resource = source.config().resource.clone();
    source
        .open()
        .await
        .with_context(|| format!("Failed to open '{}'", resource))?;

    let progress = ReadProgress::new(source.stats().total_hits, options.no_progress);
    let mut out = BufWriter::new(io::stdout());

    let outcome = copy_tuples(&mut source, &mut out, options, &progress).await;
    let stats = source.stats();
    source.close().await;
    progress.finish();
    let count = outcome?;
    out.flush()?;

    tracing::info!(
        tuples = count,
        pages = stats.pages,
        documents = stats.documents,
        "Read completed"
    );
    Ok(())
}

async fn copy_tuples<W: Write>(
    source: &mut ConnectorSource,
    out: &mut W,
    options: ReadOptions,
    progress: &ReadProgress,
) -> Result<usize> {
    let mut count = 0usize;
    let mut header_pending = options.header && options.format == OutputFormat::Text;

    while options.limit.map_or(true, |limit| count < limit) {
        if !source.has_next().await.context("Failed to fetch documents")? {
            break;
        }
        if header_pending {
            writeln!(out, "{}", source.columns().join("\t"))?;
            header_pending = false;
        }
        let tuple = source.next().await?;
        write_tuple(out, &tuple, options.format)?;
        count += 1;
        progress.inc(1);
    }
    Ok(count)
}

fn write_tuple<W: Write>(out: &mut W, tuple: &Tuple, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Text => writeln!(out, "{}", tuple)?,
        OutputFormat::Json => writeln!(out, "{}", serde_json::to_string(&tuple.to_json())?)?,
    }
    Ok(())
}
