use anyhow::Result;

use crate::cli::output::{StatusInfo, get_formatter};
use crate::models::{Config, OutputFormat, VectorDriver};
use crate::services::{Embedder, EmbeddingClient, create_backend};

pub async fn handle_status(format: OutputFormat, verbose: bool) -> Result<()> {
    let config = Config::load()?;
    let formatter = get_formatter(format);

    let embedder = EmbeddingClient::new(&config.embedding)?;
    let embedding_connected = match embedder.health_check().await {
        Ok(_) => true,
        Err(e) => {
            if verbose {
                eprintln!("Embedding health check failed: {e}");
            }
            false
        }
    };

    let (vector_store_connected, chunk_count) =
        match create_backend(&config.vector_store, embedder.dimension()).await {
            Ok(index) => {
                let connected = index.health_check().await.unwrap_or(false);
                let count = if connected {
                    index.count().await.unwrap_or(0)
                } else {
                    0
                };
                (connected, count)
            }
            Err(e) => {
                if verbose {
                    eprintln!("Vector store connection failed: {e}");
                }
                (false, 0)
            }
        };

    let status = StatusInfo {
        embedding_url: embedder.base_url().to_string(),
        embedding_model: embedder.model_version().to_string(),
        embedding_connected,
        vector_store_driver: config.vector_store.driver.to_string(),
        vector_store_url: config.vector_store.url.clone(),
        vector_store_connected,
        chunk_count,
        table: config.vector_store.qualified_table_name(),
    };

    print!("{}", formatter.format_status(&status));

    if !embedding_connected || !vector_store_connected {
        eprintln!();
        if !embedding_connected {
            eprintln!(
                "Warning: embedding server not reachable at {}. Check embedding.url.",
                status.embedding_url
            );
        }
        if !vector_store_connected && config.vector_store.driver == VectorDriver::PostgreSQL {
            eprintln!("Warning: PostgreSQL not accessible. Check connection settings.");
        }
    }

    Ok(())
}
