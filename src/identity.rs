use std::path::Path;
use tokio::fs;
use tracing::{debug, warn};
use uuid::Uuid;

/// Opaque per-installation identifier, created once and read on every event.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SiteIdentity(String);

impl SiteIdentity {
    pub fn generate() -> Self {
        Self(format!("site_{}", Uuid::new_v4().simple()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Reads the identity stored at `path`, creating and persisting a new one
    /// when the file is missing or blank.
    pub async fn load_or_create(path: &Path) -> std::io::Result<Self> {
        match fs::read_to_string(path).await {
            Ok(stored) if !stored.trim().is_empty() => {
                debug!("using existing site identity from {}", path.display());
                return Ok(Self(stored.trim().to_string()));
            }
            Ok(_) => warn!("site identity file {} is empty, regenerating", path.display()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => return Err(err),
        }

        let identity = Self::generate();
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }
        fs::write(path, identity.as_str()).await?;
        debug!("generated new site identity {}", identity.as_str());
        Ok(identity)
    }
}

impl From<String> for SiteIdentity {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl std::fmt::Display for SiteIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
