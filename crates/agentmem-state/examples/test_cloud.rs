//! Quick cloud connection test
//! Run with: cargo run --package agentmem-state --example test_cloud

use agentmem_state::{CloudConfig, MemoryRepository, SurrealMemoryRepository};

#[tokio::main]
async fn main() {
    // Load from environment
    dotenvy::dotenv().ok();

    println!("Testing SurrealDB Cloud connection...");

    let config = match CloudConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("✗ Missing environment variables: {}", e);
            std::process::exit(1);
        }
    };

    println!("  Endpoint: {}", config.endpoint);
    println!("  Namespace: {}", config.namespace);
    println!("  Database: {}", config.database);
    println!("  User: {}", config.username);
    println!("  Is Root: {}", config.is_root);

    let repo = match SurrealMemoryRepository::cloud(&config).await {
        Ok(repo) => repo,
        Err(e) => {
            eprintln!("\n✗ Connection failed: {}", e);
            std::process::exit(1);
        }
    };
    println!("\n✓ Connected and schema initialized");

    match repo.memory_stats("connection-check").await {
        Ok(stats) => println!("✓ Query round-trip ok ({} snapshots)", stats.snapshot_count),
        Err(e) => {
            eprintln!("✗ Query failed: {}", e);
            std::process::exit(1);
        }
    }
}
