//! Test Client
//!
//! Sends an image to the classifier, or an image id to the postprocessing
//! service, and prints the response.
//!
//! ```text
//! submit_image classify <path> [url] [repeat]
//! submit_image process <image-id> [url]
//! ```

use anyhow::{bail, Context};
use reqwest::multipart::{Form, Part};
use serde_json::{json, Value};
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("submit_image=info".parse()?),
        )
        .init();

    // Parse arguments
    let args: Vec<String> = std::env::args().collect();
    let command = args.get(1).map(|s| s.as_str()).unwrap_or("");
    let target = match args.get(2) {
        Some(target) => target.as_str(),
        None => bail!("usage: submit_image (classify <path> | process <image-id>) [url]"),
    };

    let client = reqwest::Client::new();

    match command {
        "classify" => {
            let url = args
                .get(3)
                .map(|s| s.as_str())
                .unwrap_or("http://localhost:5000/prediction");
            let repeat: u32 = args.get(4).and_then(|s| s.parse().ok()).unwrap_or(1);
            classify(&client, Path::new(target), url, repeat).await
        }
        "process" => {
            let url = args
                .get(3)
                .map(|s| s.as_str())
                .unwrap_or("http://localhost:5001/images");
            process(&client, target, url).await
        }
        other => bail!("Unknown command \"{}\", expected classify or process", other),
    }
}

async fn classify(
    client: &reqwest::Client,
    path: &Path,
    url: &str,
    repeat: u32,
) -> anyhow::Result<()> {
    let data = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let filename = path
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_default();

    info!(url = %url, file = %filename, size = data.len(), repeat = repeat, "Submitting image");

    let mut latencies = Vec::with_capacity(repeat as usize);
    for i in 0..repeat.max(1) {
        let form = Form::new().part("file", Part::bytes(data.clone()).file_name(filename.clone()));

        let start = Instant::now();
        let response = client.post(url).multipart(form).send().await?;
        let elapsed = start.elapsed();
        latencies.push(elapsed);

        let status = response.status();
        let body: Value = response.json().await.unwrap_or(Value::Null);

        if status.is_success() {
            info!(
                request = i + 1,
                label = %body["label"],
                model = %body["model"],
                confidence = %body["confidence"],
                latency_ms = elapsed.as_millis(),
                "Prediction received"
            );
        } else {
            warn!(request = i + 1, status = %status, body = %body, "Prediction failed");
        }
    }

    if latencies.len() > 1 {
        let total: Duration = latencies.iter().sum();
        info!(
            requests = latencies.len(),
            avg_latency_ms = (total / latencies.len() as u32).as_millis(),
            "Completed"
        );
    }

    Ok(())
}

async fn process(client: &reqwest::Client, image_id: &str, url: &str) -> anyhow::Result<()> {
    info!(url = %url, image_id = %image_id, "Requesting postprocessing");

    let start = Instant::now();
    let response = client
        .post(url)
        .json(&json!({ "imageId": image_id }))
        .send()
        .await?;

    let status = response.status();
    let body: Value = response.json().await.unwrap_or(Value::Null);

    if status.is_success() {
        info!(
            status = %status,
            body = %body,
            latency_ms = start.elapsed().as_millis(),
            "Image processed"
        );
    } else {
        warn!(status = %status, body = %body, "Postprocessing failed");
    }

    Ok(())
}
