use crate::error::{ScopeError, ScopeResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_root")]
    pub root: PathBuf,

    #[serde(default = "default_pkg_dir")]
    pub pkg_dir: PathBuf,

    #[serde(default = "default_contents_file")]
    pub contents_file: PathBuf,

    #[serde(default = "default_overlay_dir")]
    pub overlay_dir: PathBuf,

    #[serde(default = "default_installed_overlay_dir")]
    pub installed_overlay_dir: PathBuf,

    #[serde(default = "default_repo_dir")]
    pub repo_dir: PathBuf,
}

fn default_root() -> PathBuf {
    PathBuf::from("/")
}

fn default_pkg_dir() -> PathBuf {
    PathBuf::from("var/sadm/pkg")
}

fn default_contents_file() -> PathBuf {
    PathBuf::from("var/sadm/install/contents")
}

fn default_overlay_dir() -> PathBuf {
    PathBuf::from("var/sadm/overlays")
}

fn default_installed_overlay_dir() -> PathBuf {
    PathBuf::from("var/sadm/overlays/installed")
}

fn default_repo_dir() -> PathBuf {
    PathBuf::from("etc/zap/repositories")
}

impl Config {
    pub fn load(config_path: Option<&str>) -> ScopeResult<Self> {
        let config_path = if let Some(path) = config_path {
            Some(PathBuf::from(path))
        } else {
            dirs::config_dir().map(|dir| dir.join("pkgscope").join("config.toml"))
        };

        match config_path {
            Some(path) if path.is_file() => {
                let content = std::fs::read_to_string(&path)?;
                let config: Config = toml::from_str(&content)?;
                Ok(config)
            }
            _ => Ok(Config::default()),
        }
    }

    pub fn for_root<P: Into<PathBuf>>(root: P) -> Self {
        Self {
            root: root.into(),
            ..Self::default()
        }
    }

    pub fn with_root<P: Into<PathBuf>>(mut self, root: P) -> Self {
        self.root = root.into();
        self
    }

    pub fn validate_root(&self) -> ScopeResult<()> {
        if std::fs::read_dir(&self.root).is_err() {
            return Err(ScopeError::UnreadableRoot(self.root.clone()));
        }
        Ok(())
    }

    pub fn pkg_dir(&self) -> PathBuf {
        self.root.join(&self.pkg_dir)
    }

    pub fn pkg_metadata_dir(&self, package: &str) -> PathBuf {
        self.pkg_dir().join(package)
    }

    pub fn pkginfo_file(&self, package: &str) -> PathBuf {
        self.pkg_metadata_dir(package).join("pkginfo")
    }

    pub fn depend_file(&self, package: &str) -> PathBuf {
        self.pkg_metadata_dir(package).join("install").join("depend")
    }

    pub fn contents_file(&self) -> PathBuf {
        self.root.join(&self.contents_file)
    }

    pub fn overlay_dir(&self) -> PathBuf {
        self.root.join(&self.overlay_dir)
    }

    pub fn overlay_file(&self, overlay: &str) -> PathBuf {
        self.overlay_dir().join(format!("{}.ovl", overlay))
    }

    pub fn overlay_pkgs_file(&self, overlay: &str) -> PathBuf {
        self.overlay_dir().join(format!("{}.pkgs", overlay))
    }

    pub fn overlay_installed_marker(&self, overlay: &str) -> PathBuf {
        self.root.join(&self.installed_overlay_dir).join(overlay)
    }

    pub fn repo_dir(&self) -> PathBuf {
        self.root.join(&self.repo_dir)
    }

    pub fn save(&self, path: &Path) -> ScopeResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| ScopeError::ConfigError(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            root: default_root(),
            pkg_dir: default_pkg_dir(),
            contents_file: default_contents_file(),
            overlay_dir: default_overlay_dir(),
            installed_overlay_dir: default_installed_overlay_dir(),
            repo_dir: default_repo_dir(),
        }
    }
}
