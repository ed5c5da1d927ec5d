//! CLI command implementations

use anyhow::{bail, Context};
use brook_core::{CacheConfig, CacheEvent, RangeDelivery, ResourceCache, ResourceKey};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::Write;
use std::path::PathBuf;
use url::Url;

fn parse_key(url: &str) -> anyhow::Result<ResourceKey> {
    Ok(ResourceKey(Url::parse(url).context("invalid resource URL")?))
}

/// Probe a resource's metadata and print it as JSON
pub async fn probe(url: &str) -> anyhow::Result<()> {
    let key = parse_key(url)?;
    let cache = ResourceCache::new(CacheConfig::default());
    let mut events = cache.subscribe();

    // A one-byte request is enough to start the fetch and pull headers
    let _handle = cache.submit_range_request(&key, 0, 1).await?;

    loop {
        match events.recv().await? {
            CacheEvent::MetadataLoaded { key: k, .. } if k == key => break,
            CacheEvent::Failed { key: k, error } if k == key => bail!("probe failed: {error}"),
            _ => {}
        }
    }

    let status = cache
        .resource_status(&key)
        .await
        .context("resource disappeared")?;
    println!("{}", serde_json::to_string_pretty(&status)?);

    cache.cancel_resource(&key).await;
    Ok(())
}

/// Fetch a byte range, writing it to a file or stdout
pub async fn fetch(
    url: &str,
    offset: u64,
    length: Option<u64>,
    output: Option<PathBuf>,
) -> anyhow::Result<()> {
    let key = parse_key(url)?;
    let cache = ResourceCache::new(CacheConfig::default());

    let bar = progress_bar(&cache);

    let mut writer: Box<dyn Write> = match &output {
        Some(path) => Box::new(std::fs::File::create(path).context("cannot create output file")?),
        None => Box::new(std::io::stdout()),
    };

    // When no length is given, learn the total size first and take the
    // rest of the resource from `offset`
    let (first_byte, length) = match length {
        Some(length) => (None, length),
        None => {
            let probe = cache.submit_range_request(&key, offset, 1).await?;
            let first = probe.collect().await?;
            let status = cache
                .resource_status(&key)
                .await
                .context("resource disappeared")?;
            let total = status
                .metadata
                .total_size
                .context("total size unknown; pass --length")?;
            (Some(first), total - offset - 1)
        }
    };

    let mut written = 0u64;
    if let Some(first) = first_byte {
        writer.write_all(&first)?;
        written += first.len() as u64;
    }

    if length > 0 {
        let mut handle = cache
            .submit_range_request(&key, offset + written, length)
            .await?;
        loop {
            match handle.recv().await {
                Some(RangeDelivery::Bytes(bytes)) => {
                    writer.write_all(&bytes)?;
                    written += bytes.len() as u64;
                }
                Some(RangeDelivery::Fulfilled) => break,
                Some(RangeDelivery::Failed(err)) => return Err(err.into()),
                None => bail!("download cancelled"),
            }
        }
    }

    writer.flush()?;
    bar.finish_and_clear();
    tracing::debug!(bytes = written, "range fetched");
    eprintln!("{} bytes written", written);

    cache.cancel_resource(&key).await;
    Ok(())
}

/// Stream a resource and print its events as JSON lines
pub async fn watch(url: &str) -> anyhow::Result<()> {
    let key = parse_key(url)?;
    let cache = ResourceCache::new(CacheConfig::default());
    let mut events = cache.subscribe();

    let _handle = cache.submit_range_request(&key, 0, 1).await?;

    loop {
        let event = events.recv().await?;
        match &event {
            CacheEvent::MetadataLoaded {
                total_size,
                content_type,
                ..
            } => println!(
                "{}",
                serde_json::json!({
                    "event": "metadata",
                    "total_size": total_size,
                    "content_type": content_type,
                })
            ),
            CacheEvent::Progress {
                downloaded,
                expected,
                ..
            } => println!(
                "{}",
                serde_json::json!({
                    "event": "progress",
                    "downloaded": downloaded,
                    "expected": expected,
                })
            ),
            CacheEvent::ReadyToPlay { .. } => {
                println!("{}", serde_json::json!({ "event": "ready_to_play" }))
            }
            CacheEvent::Complete { total_bytes, .. } => {
                println!(
                    "{}",
                    serde_json::json!({ "event": "complete", "total_bytes": total_bytes })
                );
                break;
            }
            CacheEvent::Failed { error, .. } => {
                println!(
                    "{}",
                    serde_json::json!({ "event": "failed", "error": error })
                );
                break;
            }
        }
    }

    Ok(())
}

/// Spawn a task mirroring progress events onto an indicatif bar
fn progress_bar(cache: &ResourceCache) -> ProgressBar {
    let bar = ProgressBar::new(0);
    bar.set_style(
        ProgressStyle::with_template("{bytes}/{total_bytes} [{bar:40}] {bytes_per_sec}")
            .expect("valid progress template"),
    );

    let mut events = cache.subscribe();
    let task_bar = bar.clone();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                CacheEvent::Progress {
                    downloaded,
                    expected,
                    ..
                } => {
                    if let Some(expected) = expected {
                        task_bar.set_length(expected);
                    }
                    task_bar.set_position(downloaded);
                }
                CacheEvent::Complete { .. } | CacheEvent::Failed { .. } => break,
                _ => {}
            }
        }
    });

    bar
}
