//! Database statistics and health overview.
//!
//! Summarizes what the retriever can see (chunk and source counts) and
//! what conversation memory holds (threads, turns, route mix). Used by
//! `arag stats`.

use anyhow::Result;
use sqlx::Row;

use crate::config::Config;
use crate::pipeline;

/// Run the stats command: query the database and print a summary.
pub async fn run_stats(config: &Config) -> Result<()> {
    let pool = pipeline::open_database(config).await?;

    let total_chunks: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
        .fetch_one(&pool)
        .await?;

    let total_sources: i64 =
        sqlx::query_scalar("SELECT COUNT(DISTINCT source_reference) FROM chunks")
            .fetch_one(&pool)
            .await?;

    let total_threads: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM conversations")
        .fetch_one(&pool)
        .await?;

    let last_turn_ms: Option<i64> = sqlx::query_scalar("SELECT MAX(created_at) FROM turns")
        .fetch_one(&pool)
        .await?;

    let db_size = std::fs::metadata(&config.store.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("Adaptive RAG: Database Stats");
    println!("============================");
    println!();
    println!("  Database:    {}", config.store.path.display());
    println!("  Size:        {}", format_bytes(db_size));
    println!();
    println!("  Chunks:      {}", total_chunks);
    println!("  Sources:     {}", total_sources);
    println!("  Threads:     {}", total_threads);
    println!(
        "  Last turn:   {}",
        match last_turn_ms {
            Some(ms) => format_ts_ms(ms),
            None => "never".to_string(),
        }
    );

    // Per-route breakdown
    let route_rows = sqlx::query(
        "SELECT path_taken, COUNT(*) AS turn_count FROM turns GROUP BY path_taken ORDER BY path_taken",
    )
    .fetch_all(&pool)
    .await?;

    if !route_rows.is_empty() {
        println!();
        println!("  By route:");
        println!("  {:<12} {:>8}", "ROUTE", "TURNS");
        println!("  {}", "-".repeat(21));
        for row in &route_rows {
            let route: String = row.get("path_taken");
            let count: i64 = row.get("turn_count");
            println!("  {:<12} {:>8}", route, count);
        }
    }

    if config.memory.backend == "memory" {
        println!();
        println!("  Note: memory.backend = \"memory\"; conversations are not persisted.");
    }

    println!();

    pool.close().await;
    Ok(())
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

/// Render a millisecond timestamp as `YYYY-MM-DD HH:MM UTC`.
fn format_ts_ms(ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(ms)
        .map(|dt| dt.format("%Y-%m-%d %H:%M UTC").to_string())
        .unwrap_or_else(|| ms.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(3 * 1024 * 1024), "3.0 MB");
    }

    #[test]
    fn test_format_ts_ms() {
        assert_eq!(format_ts_ms(0), "1970-01-01 00:00 UTC");
        assert_eq!(format_ts_ms(1_700_000_000_000), "2023-11-14 22:13 UTC");
    }
}
