//! Pipeline artifact loader.
//!
//! Makes sure the artifact exists on local disk (downloading it once when
//! missing), deserializes it, and hands out the same cached pipeline for the
//! rest of the process lifetime. The artifact is trusted as downloaded: no
//! checksum or signature is verified.

use crate::config::ModelConfig;
use crate::error::LoaderError;
use crate::models::inference::OnnxPipeline;
use crate::models::pipeline::Pipeline;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::sync::OnceCell;
use tracing::{info, warn};

/// Turns a local artifact file into a pipeline
pub trait ArtifactFormat: Send + Sync {
    fn load(&self, path: &Path) -> Result<Arc<dyn Pipeline>, LoaderError>;
}

/// ONNX artifacts, loaded with ONNX Runtime
pub struct OnnxFormat {
    onnx_threads: usize,
}

impl OnnxFormat {
    pub fn new(onnx_threads: usize) -> Self {
        Self { onnx_threads }
    }
}

impl ArtifactFormat for OnnxFormat {
    fn load(&self, path: &Path) -> Result<Arc<dyn Pipeline>, LoaderError> {
        let pipeline = OnnxPipeline::load(path, self.onnx_threads)?;
        Ok(Arc::new(pipeline))
    }
}

/// Fetch-once, load-once holder of the inference pipeline
pub struct ModelLoader {
    url: String,
    path: PathBuf,
    download_timeout: Duration,
    format: Arc<dyn ArtifactFormat>,
    pipeline: OnceCell<Arc<dyn Pipeline>>,
}

impl ModelLoader {
    /// Create a loader for ONNX artifacts from configuration
    pub fn new(config: &ModelConfig) -> Self {
        Self::with_format(
            &config.url,
            &config.path,
            Duration::from_secs(config.download_timeout_secs),
            Arc::new(OnnxFormat::new(config.onnx_threads)),
        )
    }

    /// Create a loader with a custom artifact format
    pub fn with_format<P: AsRef<Path>>(
        url: &str,
        path: P,
        download_timeout: Duration,
        format: Arc<dyn ArtifactFormat>,
    ) -> Self {
        Self {
            url: url.to_string(),
            path: path.as_ref().to_path_buf(),
            download_timeout,
            format,
            pipeline: OnceCell::new(),
        }
    }

    /// Local artifact path
    pub fn artifact_path(&self) -> &Path {
        &self.path
    }

    /// Whether the pipeline has been loaded already
    pub fn is_loaded(&self) -> bool {
        self.pipeline.initialized()
    }

    /// Get the pipeline, fetching and loading it on first use.
    ///
    /// Concurrent first callers share one fetch and one load; every call
    /// returns the same `Arc`.
    pub async fn get_pipeline(&self) -> Result<Arc<dyn Pipeline>, LoaderError> {
        self.pipeline
            .get_or_try_init(|| self.fetch_and_load())
            .await
            .cloned()
    }

    async fn fetch_and_load(&self) -> Result<Arc<dyn Pipeline>, LoaderError> {
        let present = tokio::fs::try_exists(&self.path).await.unwrap_or(false);
        if present {
            info!(path = %self.path.display(), "Using cached pipeline artifact");
        } else {
            self.download().await?;
        }

        let format = self.format.clone();
        let path = self.path.clone();
        let pipeline = tokio::task::spawn_blocking(move || format.load(&path))
            .await
            .map_err(|e| LoaderError::Load {
                path: self.path.clone(),
                reason: e.to_string(),
            })??;

        info!(
            pipeline = %pipeline.name(),
            inputs = ?pipeline.input_columns(),
            "Pipeline ready"
        );
        Ok(pipeline)
    }

    /// Download the artifact into a `.part` file and move it into place once
    /// complete
    async fn download(&self) -> Result<(), LoaderError> {
        let part = part_path(&self.path);
        info!(url = %self.url, path = %self.path.display(), "Downloading pipeline artifact");

        match self.download_to(&part).await {
            Ok(bytes) => {
                tokio::fs::rename(&part, &self.path)
                    .await
                    .map_err(|e| self.download_err(e))?;
                info!(bytes = bytes, path = %self.path.display(), "Pipeline artifact downloaded");
                warn!(
                    url = %self.url,
                    "Pipeline artifact integrity is not verified; only use trusted artifact URLs"
                );
                Ok(())
            }
            Err(e) => {
                let _ = tokio::fs::remove_file(&part).await;
                Err(e)
            }
        }
    }

    async fn download_to(&self, part: &Path) -> Result<u64, LoaderError> {
        let client = reqwest::Client::builder()
            .timeout(self.download_timeout)
            .build()
            .map_err(|e| self.download_err(e))?;

        let mut response = client
            .get(&self.url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| self.download_err(e))?;
        let total = response.content_length();

        if let Some(parent) = part.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| self.download_err(e))?;
        }
        let mut file = tokio::fs::File::create(part)
            .await
            .map_err(|e| self.download_err(e))?;

        let mut downloaded: u64 = 0;
        let mut next_report = 10;
        while let Some(chunk) = response.chunk().await.map_err(|e| self.download_err(e))? {
            file.write_all(&chunk)
                .await
                .map_err(|e| self.download_err(e))?;
            downloaded += chunk.len() as u64;

            if let Some(total) = total.filter(|t| *t > 0) {
                let percent = downloaded * 100 / total;
                if percent >= next_report {
                    info!(
                        downloaded = downloaded,
                        total = total,
                        "Download progress: {}%",
                        percent
                    );
                    next_report = (percent / 10 + 1) * 10;
                }
            }
        }

        file.flush().await.map_err(|e| self.download_err(e))?;
        Ok(downloaded)
    }

    fn download_err<E: std::fmt::Display>(&self, e: E) -> LoaderError {
        LoaderError::Download {
            url: self.url.clone(),
            reason: e.to_string(),
        }
    }
}

fn part_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::pipeline::{PipelineError, ProbabilityMatrix};
    use crate::types::record::InventoryTable;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ConstantPipeline;

    impl Pipeline for ConstantPipeline {
        fn name(&self) -> &str {
            "constant"
        }

        fn input_columns(&self) -> Vec<String> {
            Vec::new()
        }

        fn predict_proba(
            &self,
            table: &InventoryTable,
        ) -> Result<ProbabilityMatrix, PipelineError> {
            ProbabilityMatrix::new(table.len(), 2, [0.5, 0.5].repeat(table.len()))
        }
    }

    /// Counts loads and records the artifact bytes it saw
    #[derive(Default)]
    struct CountingFormat {
        loads: AtomicUsize,
        seen: std::sync::Mutex<Vec<u8>>,
    }

    impl ArtifactFormat for CountingFormat {
        fn load(&self, path: &Path) -> Result<Arc<dyn Pipeline>, LoaderError> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            let bytes = std::fs::read(path).map_err(|e| LoaderError::Load {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
            *self.seen.lock().unwrap() = bytes;
            Ok(Arc::new(ConstantPipeline))
        }
    }

    #[tokio::test]
    async fn test_pipeline_is_cached() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pipe.onnx");
        std::fs::write(&path, b"artifact").unwrap();

        let format = Arc::new(CountingFormat::default());
        let loader = ModelLoader::with_format(
            "http://127.0.0.1:1/pipe.onnx",
            &path,
            Duration::from_secs(1),
            format.clone(),
        );

        assert!(!loader.is_loaded());
        let (first, second) = tokio::join!(loader.get_pipeline(), loader.get_pipeline());
        let third = loader.get_pipeline().await.unwrap();

        assert!(Arc::ptr_eq(&first.unwrap(), &third));
        assert!(Arc::ptr_eq(&second.unwrap(), &third));
        assert_eq!(format.loads.load(Ordering::SeqCst), 1);
        assert!(loader.is_loaded());
    }

    #[tokio::test]
    async fn test_unreachable_url_is_download_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("models").join("pipe.onnx");

        let format = Arc::new(CountingFormat::default());
        let loader = ModelLoader::with_format(
            "http://127.0.0.1:1/pipe.onnx",
            &path,
            Duration::from_secs(2),
            format.clone(),
        );

        match loader.get_pipeline().await {
            Err(LoaderError::Download { url, .. }) => {
                assert_eq!(url, "http://127.0.0.1:1/pipe.onnx")
            }
            Err(other) => panic!("expected download error, got {}", other),
            Ok(_) => panic!("unreachable artifact produced a pipeline"),
        }
        assert!(!path.exists());
        assert!(!part_path(&path).exists());
        assert_eq!(format.loads.load(Ordering::SeqCst), 0);
        assert!(!loader.is_loaded());
    }

    #[tokio::test]
    async fn test_missing_artifact_is_downloaded_verbatim() {
        let app = axum::Router::new().route(
            "/pipe.onnx",
            axum::routing::get(|| async { vec![7u8, 0, 255, 42] }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pipe.onnx");
        let format = Arc::new(CountingFormat::default());
        let loader = ModelLoader::with_format(
            &format!("http://{}/pipe.onnx", addr),
            &path,
            Duration::from_secs(5),
            format.clone(),
        );

        loader.get_pipeline().await.unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), vec![7u8, 0, 255, 42]);
        assert_eq!(*format.seen.lock().unwrap(), vec![7u8, 0, 255, 42]);
        assert!(!part_path(&path).exists());
    }

    #[tokio::test]
    async fn test_http_error_status_is_download_error() {
        let app = axum::Router::new();
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pipe.onnx");
        let loader = ModelLoader::with_format(
            &format!("http://{}/missing.onnx", addr),
            &path,
            Duration::from_secs(5),
            Arc::new(CountingFormat::default()),
        );

        assert!(matches!(
            loader.get_pipeline().await,
            Err(LoaderError::Download { .. })
        ));
        assert!(!path.exists());
    }

    #[test]
    fn test_part_path() {
        assert_eq!(
            part_path(Path::new("models/pipe.onnx")),
            PathBuf::from("models/pipe.onnx.part")
        );
    }
}
