use anyhow::{bail, Context, Result};
use chrono::{DateTime, Local};
use log::info;
use std::path::{Path, PathBuf};

use crate::controller::ImageTransformer;
use crate::surface::SharedSurface;

/// Uploads one file without opening a window and saves the returned image.
pub async fn upload_file(
    controller: &ImageTransformer,
    surface: &SharedSurface,
    path: &Path,
    output: Option<PathBuf>,
) -> Result<PathBuf> {
    let outcome = transform(controller, surface, path, output).await;
    controller.shutdown().await;
    outcome
}

async fn transform(
    controller: &ImageTransformer,
    surface: &SharedSurface,
    path: &Path,
    output: Option<PathBuf>,
) -> Result<PathBuf> {
    if !controller.select_path(path).await {
        bail!("{}", surface.lock().error);
    }

    let Some(image) = controller.upload_selected().await else {
        bail!("{}", surface.lock().error);
    };

    if let Some(result) = surface.lock().result.as_ref() {
        for line in [
            &result.description,
            &result.toy_description,
            &result.main_object,
            &result.detected_objects,
        ]
        .into_iter()
        .flatten()
        {
            println!("{}", line);
        }
    }
    if let Some(url) = &image.image_url {
        println!("Image URL: {}", url);
    }

    let output = output.unwrap_or_else(|| default_output_path(Local::now(), &image.image));
    tokio::fs::write(&output, &image.image)
        .await
        .with_context(|| format!("Failed to save result to {}", output.display()))?;

    info!("Result saved to {}", output.display());
    Ok(output)
}

fn default_output_path(now: DateTime<Local>, image: &[u8]) -> PathBuf {
    let extension = image::guess_format(image)
        .ok()
        .and_then(|format| format.extensions_str().first().copied())
        .unwrap_or("jpg");
    PathBuf::from(format!("transformed_{}.{}", now.format("%Y%m%d_%H%M%S"), extension))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::testing::{jpeg_bytes, FakeDevices, FakeEndpoint};
    use base64::{engine::general_purpose::STANDARD, Engine};
    use chrono::TimeZone;
    use serde_json::json;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn controller(endpoint: FakeEndpoint) -> (ImageTransformer, SharedSurface) {
        let surface = SharedSurface::new();
        let controller = ImageTransformer::new(
            &Config::default(),
            Arc::new(surface.clone()),
            Arc::new(FakeDevices::unsupported()),
            Arc::new(endpoint),
        );
        (controller, surface)
    }

    #[test]
    fn test_default_output_path() {
        let now = Local.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();
        let path = default_output_path(now, &jpeg_bytes(2, 2));
        assert_eq!(path, PathBuf::from("transformed_20240309_140507.jpg"));

        let path = default_output_path(now, b"????");
        assert_eq!(path, PathBuf::from("transformed_20240309_140507.jpg"));
    }

    #[tokio::test]
    async fn test_upload_saves_result() {
        let returned = jpeg_bytes(5, 5);
        let (controller, surface) = controller(FakeEndpoint::replying(
            200,
            json!({"success": true, "image_bytes": STANDARD.encode(&returned), "description": "x"}),
        ));

        let dir = TempDir::new().unwrap();
        let input = dir.path().join("input.jpg");
        std::fs::write(&input, jpeg_bytes(8, 8)).unwrap();
        let output = dir.path().join("out.jpg");

        let saved = upload_file(&controller, &surface, &input, Some(output.clone())).await.unwrap();
        assert_eq!(saved, output);
        assert_eq!(std::fs::read(&output).unwrap(), returned);
    }

    #[tokio::test]
    async fn test_failure_carries_surface_message() {
        let (controller, surface) = controller(FakeEndpoint::replying(
            200,
            json!({"success": false, "error": "no object detected"}),
        ));

        let dir = TempDir::new().unwrap();
        let input = dir.path().join("input.png");
        std::fs::write(&input, jpeg_bytes(8, 8)).unwrap();

        let err = upload_file(&controller, &surface, &input, None).await.unwrap_err();
        assert_eq!(err.to_string(), "Error: no object detected");
    }

    #[tokio::test]
    async fn test_rejects_text_file() {
        let (controller, surface) = controller(FakeEndpoint::unreachable());
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("notes.txt");
        std::fs::write(&input, "hello").unwrap();

        let err = upload_file(&controller, &surface, &input, None).await.unwrap_err();
        assert_eq!(err.to_string(), "Please select an image file");
    }
}
