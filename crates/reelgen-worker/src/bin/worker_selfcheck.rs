//! Pre-deployment check: environment, Redis and the asset bucket.

use reelgen_queue::JobQueue;
use reelgen_storage::R2Client;
use reelgen_worker::WorkerConfig;

const REQUIRED_ENV: &[&str] = &[
    "REDIS_URL",
    "GCP_PROJECT_ID",
    "R2_ENDPOINT_URL",
    "R2_ACCESS_KEY_ID",
    "R2_SECRET_ACCESS_KEY",
    "R2_BUCKET_NAME",
    "R2_PUBLIC_BASE_URL",
];

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = rustls::crypto::ring::default_provider().install_default();
    dotenvy::dotenv().ok();

    let config = WorkerConfig::from_env();
    println!(
        "worker-selfcheck: starting with upload_chunk_bytes={} bulk_concurrency={}",
        config.upload_chunk_bytes, config.bulk_concurrency
    );

    ensure_env_present(REQUIRED_ENV)?;
    ensure_redis().await?;
    ensure_bucket().await?;

    println!("worker-selfcheck: ok");
    Ok(())
}

fn ensure_env_present(vars: &[&str]) -> anyhow::Result<()> {
    let missing: Vec<&str> = vars
        .iter()
        .copied()
        .filter(|var| std::env::var(var).map(|v| v.is_empty()).unwrap_or(true))
        .collect();
    if !missing.is_empty() {
        anyhow::bail!("missing required env vars: {}", missing.join(", "));
    }
    Ok(())
}

async fn ensure_redis() -> anyhow::Result<()> {
    let queue = JobQueue::from_env()?;
    queue
        .ping()
        .await
        .map_err(|e| anyhow::anyhow!("redis not reachable: {}", e))?;
    println!("worker-selfcheck: redis ok");
    Ok(())
}

async fn ensure_bucket() -> anyhow::Result<()> {
    let storage = R2Client::from_env()?;
    storage
        .check_connectivity()
        .await
        .map_err(|e| anyhow::anyhow!("asset bucket not reachable: {}", e))?;
    println!("worker-selfcheck: bucket ok");
    Ok(())
}
