// Command handlers for the rowsearch CLI


use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

use crate::config::{Config, ensure_config_file, show_config};
use crate::documents::read_rows;
use crate::embeddings::{EmbeddingClient, HttpEmbeddingClient, ResilientEmbedder};
use crate::engine::RetrievalEngine;
use crate::index::SearchHit;

const EXIT_WORDS: [&str; 3] = ["exit", "quit", "bye"];

/// Engine wired to the configured HTTP provider and retry policy, with no index loaded
#[inline]
pub fn create_engine(config: &Config) -> Result<RetrievalEngine<HttpEmbeddingClient>> {
    let client = HttpEmbeddingClient::new(&config.embedding)
        .context("Invalid embedding provider configuration")?;
    Ok(RetrievalEngine::new(ResilientEmbedder::new(
        client,
        config.retry_policy(),
    )))
}

/// Write a default config file if needed, print the configuration and
/// optionally check that the provider is reachable.
#[inline]
pub fn configure(config: &Config, show: bool, check: bool) -> Result<()> {
    if ensure_config_file(config)? {
        eprintln!(
            "{} {}",
            style("Wrote default configuration to").green(),
            style(config.config_file_path().display()).cyan()
        );
    }

    if show || !check {
        show_config(config)?;
    }

    if check {
        check_provider(config)?;
    }

    Ok(())
}

#[inline]
pub fn check_provider(config: &Config) -> Result<()> {
    let client = HttpEmbeddingClient::new(&config.embedding)
        .context("Invalid embedding provider configuration")?;

    eprintln!("{}", style("Testing embedding provider...").yellow());
    client.health_check().with_context(|| {
        format!(
            "Embedding provider at {} failed the health check",
            client.base_url()
        )
    })?;
    eprintln!(
        "{}",
        style(format!(
            "✓ Provider reachable and model '{}' is available",
            client.model()
        ))
        .green()
    );

    Ok(())
}

/// Read the data file, embed every row and publish the index.
///
/// `batch_size` can only lower the configured provider batch size.
#[inline]
pub fn build_index(
    config: &Config,
    data: Option<&Path>,
    index: Option<&Path>,
    batch_size: Option<usize>,
) -> Result<()> {
    let data_path = data.map_or_else(|| config.index.data_path.clone(), Path::to_path_buf);
    let index_path = index.map_or_else(|| config.index_path(), Path::to_path_buf);

    let delimiter = config.index.delimiter_byte()?;
    let records = read_rows(&data_path, delimiter)
        .with_context(|| format!("Failed to read rows from {}", data_path.display()))?;
    info!("Read {} rows from {}", records.len(), data_path.display());

    let progress = ProgressBar::new(records.len() as u64).with_style(
        ProgressStyle::with_template("{spinner} [{pos}/{len}] Embedding documents {wide_bar}")
            .context("Invalid progress bar template")?,
    );

    let mut engine = create_engine(config)?.with_progress(progress);
    if let Some(batch_size) = batch_size {
        engine = engine.with_batch_size(batch_size);
    }
    let built = engine
        .build(&records, &index_path)
        .with_context(|| format!("Failed to build index at {}", index_path.display()))?;

    eprintln!(
        "{} Indexed {} documents (dimension {}) into {}",
        style("✓").green(),
        built.len(),
        built.dimension(),
        style(index_path.display()).cyan()
    );
    Ok(())
}

/// Engine with the persisted index loaded.
#[inline]
pub fn open_engine(
    config: &Config,
    index: Option<&Path>,
) -> Result<RetrievalEngine<HttpEmbeddingClient>> {
    let index_path: PathBuf = index.map_or_else(|| config.index_path(), Path::to_path_buf);
    let mut engine = create_engine(config)?;
    let loaded = engine
        .load_index(&index_path)
        .with_context(|| format!("Failed to load index from {}", index_path.display()))?;

    eprintln!(
        "{}",
        style(format!(
            "Loaded {} documents built {} with {}",
            loaded.len(),
            loaded.created_at().format("%Y-%m-%d %H:%M UTC"),
            loaded.model().unwrap_or("an unknown model")
        ))
        .dim()
    );
    Ok(engine)
}

#[inline]
pub fn run_query<C: EmbeddingClient, W: Write>(
    engine: &RetrievalEngine<C>,
    text: &str,
    k: usize,
    output: &mut W,
) -> Result<()> {
    let hits = engine.query(text, k)?;
    write_hits(output, &hits)?;
    Ok(())
}

/// Interactive query loop.
///
/// Reads one query per line until end of input or an exit word. A failed
/// query is reported and the loop keeps serving the same index.
#[inline]
pub fn run_chat<C: EmbeddingClient, R: BufRead, W: Write>(
    engine: &RetrievalEngine<C>,
    k: usize,
    mut input: R,
    output: &mut W,
) -> Result<()> {
    writeln!(
        output,
        "{}",
        style("Type a query, or 'exit' to leave.").dim()
    )?;

    let mut line = String::new();
    loop {
        write!(output, "{} ", style(">").bold().cyan())?;
        output.flush()?;

        line.clear();
        if input.read_line(&mut line)? == 0 {
            break;
        }

        let text = line.trim();
        if text.is_empty() {
            continue;
        }
        if is_exit_word(text) {
            break;
        }

        match engine.query(text, k) {
            Ok(hits) => write_hits(output, &hits)?,
            Err(e) => {
                warn!("Query failed: {}", e);
                writeln!(output, "{} {}: {}", style("✗").red(), e.kind(), e)?;
            }
        }
    }

    writeln!(output, "Goodbye")?;
    Ok(())
}

#[inline]
pub fn is_exit_word(text: &str) -> bool {
    let text = text.trim();
    EXIT_WORDS.iter().any(|word| text.eq_ignore_ascii_case(word))
}

/// Print ranked hits as `#1`, `#2`, ... followed by the document text.
#[inline]
pub fn write_hits<W: Write>(output: &mut W, hits: &[SearchHit]) -> std::io::Result<()> {
    if hits.is_empty() {
        return writeln!(output, "{}", style("No results").yellow());
    }

    for (rank, hit) in hits.iter().enumerate() {
        writeln!(
            output,
            "{} {}",
            style(format!("#{}", rank + 1)).bold(),
            style(format!(
                "(score {:.4}, document {})",
                hit.score, hit.document.id
            ))
            .dim()
        )?;
        for line in hit.document.content.lines() {
            writeln!(output, "   {line}")?;
        }
        writeln!(output)?;
    }
    Ok(())
}
