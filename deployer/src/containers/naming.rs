//! Managed container names and public URLs

use url::Url;

pub const DEFAULT_CONTAINER_PREFIX: &str = "static_";

/// Maps app names to container names and links
#[derive(Debug, Clone)]
pub struct ContainerNaming {
    prefix: String,
    public_base_url: Option<Url>,
}

impl ContainerNaming {
    pub fn new(prefix: impl Into<String>, public_base_url: Option<Url>) -> Self {
        Self {
            prefix: prefix.into(),
            public_base_url: public_base_url.filter(|u| !u.cannot_be_a_base()),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn container_name(&self, app: &str) -> String {
        format!("{}{}", self.prefix, app)
    }

    /// App name of a managed container, `None` for anything else
    pub fn app_name<'a>(&self, container: &'a str) -> Option<&'a str> {
        container
            .strip_prefix(self.prefix.as_str())
            .filter(|app| !app.is_empty())
    }

    pub fn is_managed(&self, container: &str) -> bool {
        self.app_name(container).is_some()
    }

    /// `<base>/<app>` when a base URL is configured
    pub fn public_url(&self, app: &str) -> Option<String> {
        let mut url = self.public_base_url.clone()?;
        url.path_segments_mut().ok()?.pop_if_empty().push(app);
        Some(url.to_string())
    }
}

impl Default for ContainerNaming {
    fn default() -> Self {
        Self::new(DEFAULT_CONTAINER_PREFIX, None)
    }
}
