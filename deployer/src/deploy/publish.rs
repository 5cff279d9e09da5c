//! Publishing build output behind an nginx container

use std::path::Path;
use std::sync::Arc;

use tracing::info;

use crate::containers::engine::{ContainerEngine, RunSpec};
use crate::containers::naming::ContainerNaming;
use crate::deploy::sink::LogSink;
use crate::errors::DeployerError;
use crate::filesys::dir::Dir;
use crate::storage::layout::StorageLayout;

/// Where nginx serves static content from
pub const NGINX_HTML_DIR: &str = "/usr/share/nginx/html";

/// Status shown for an app until the engine reports it
pub const FRESH_STATUS: &str = "Up just now";

/// Serving container settings
#[derive(Debug, Clone)]
pub struct PublishOptions {
    pub image: String,
    pub network: Option<String>,
    pub restart_policy: String,
}

impl Default for PublishOptions {
    fn default() -> Self {
        Self {
            image: "nginx:alpine".to_string(),
            network: None,
            restart_policy: "unless-stopped".to_string(),
        }
    }
}

/// A freshly published app
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedApp {
    pub app: String,
    pub container: String,
    pub status: String,
    pub url: Option<String>,
}

/// Copies build output into the app's artifact directory and replaces its
/// serving container
pub struct Publisher {
    engine: Arc<dyn ContainerEngine>,
    naming: ContainerNaming,
    layout: StorageLayout,
    options: PublishOptions,
}

impl Publisher {
    pub fn new(
        engine: Arc<dyn ContainerEngine>,
        naming: ContainerNaming,
        layout: StorageLayout,
        options: PublishOptions,
    ) -> Self {
        Self {
            engine,
            naming,
            layout,
            options,
        }
    }

    pub async fn publish(
        &self,
        app: &str,
        build_output: &Path,
        sink: &LogSink,
    ) -> Result<PublishedApp, DeployerError> {
        let source = Dir::new(build_output);
        if !source.exists().await {
            let dir_name = build_output
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| build_output.display().to_string());
            return Err(DeployerError::ArtifactMissing {
                dir_name,
                path: build_output.to_path_buf(),
            });
        }

        let target = self.layout.app_publish_dir(app);
        target.recreate().await?;
        let stats = source.copy_contents_to(&target).await?;
        sink.line(format!(
            "Copied {} files to {}",
            stats.files,
            target.path().display()
        ))
        .await;

        let container = self.naming.container_name(app);
        if self.engine.remove(&container).await? {
            sink.line(format!("Removed previous container {}", container))
                .await;
        }

        // Bind mounts need an absolute host path
        let mount_source = tokio::fs::canonicalize(target.path()).await?;
        let spec = RunSpec {
            name: container.clone(),
            image: self.options.image.clone(),
            mount_source,
            mount_target: NGINX_HTML_DIR.to_string(),
            network: self.options.network.clone(),
            restart_policy: self.options.restart_policy.clone(),
            labels: vec![("motion.app".to_string(), app.to_string())],
        };
        let id = self.engine.run(&spec).await?;
        info!("Published {} as {} ({})", app, container, id);

        Ok(PublishedApp {
            app: app.to_string(),
            container,
            status: FRESH_STATUS.to_string(),
            url: self.naming.public_url(app),
        })
    }
}
