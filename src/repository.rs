use crate::config::Config;
use log::{info, warn};
use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;

#[derive(Debug, Clone, Serialize)]
pub struct CatalogEntry {
    pub name: String,
    pub version: String,
    pub depends: Vec<String>,
    pub size: u64,
    pub checksum: String,
}

#[derive(Debug, Default)]
pub struct RepositoryCatalog {
    name: String,
    entries: HashMap<String, CatalogEntry>,
}

impl RepositoryCatalog {
    // Catalog lines are name|version|depends|size|checksum; depends is a
    // whitespace-separated list inside its field. Short lines are skipped.
    pub fn parse(name: &str, content: &str) -> Self {
        let mut entries = HashMap::new();
        for line in content.lines() {
            let fields: Vec<&str> = line.split('|').collect();
            if fields.len() < 5 {
                continue;
            }
            let entry = CatalogEntry {
                name: fields[0].to_string(),
                version: fields[1].to_string(),
                depends: fields[2].split_whitespace().map(str::to_string).collect(),
                size: fields[3].parse().unwrap_or(0),
                checksum: fields[4].to_string(),
            };
            entries.insert(entry.name.clone(), entry);
        }
        Self {
            name: name.to_string(),
            entries,
        }
    }

    pub fn load(name: &str, path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(content) => Self::parse(name, &content),
            Err(e) => {
                warn!("No readable catalog for repository {}: {}", name, e);
                Self {
                    name: name.to_string(),
                    entries: HashMap::new(),
                }
            }
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn get(&self, package: &str) -> Option<&CatalogEntry> {
        self.entries.get(package)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.entries.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }
}

// Every locally cached <repo>.catalog under the repositories directory. No
// network access; a repository is whatever has been fetched to disk already.
pub fn load_catalogs(config: &Config) -> Vec<RepositoryCatalog> {
    let repo_dir = config.repo_dir();
    let mut catalogs = Vec::new();
    let entries = match std::fs::read_dir(&repo_dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!("Cannot enumerate repositories in {:?}: {}", repo_dir, e);
            return catalogs;
        }
    };
    for entry in entries.flatten() {
        let file_name = entry.file_name();
        let Some(name) = file_name.to_str().and_then(|f| f.strip_suffix(".catalog")) else {
            continue;
        };
        catalogs.push(RepositoryCatalog::load(name, &entry.path()));
    }
    catalogs.sort_by(|a, b| a.name.cmp(&b.name));
    info!("Loaded {} repository catalogs from {:?}", catalogs.len(), repo_dir);
    catalogs
}

#[derive(Debug, Clone, Serialize)]
pub struct AvailableVersion {
    pub repository: String,
    pub version: String,
    pub size: u64,
}

pub fn available_versions(catalogs: &[RepositoryCatalog], package: &str) -> Vec<AvailableVersion> {
    catalogs
        .iter()
        .filter_map(|catalog| {
            catalog.get(package).map(|entry| AvailableVersion {
                repository: catalog.name().to_string(),
                version: entry.version.clone(),
                size: entry.size,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const CATALOG: &str = "\
TRIBzsh|5.9|TRIBcsl TRIBncurses|1734003|abcdef0123
TRIBncurses|6.4|TRIBcsl|2048000|fedcba9876
broken line without pipes
short|field
";

    #[test]
    fn test_parse_catalog_lines() {
        let catalog = RepositoryCatalog::parse("release", CATALOG);
        assert_eq!(catalog.len(), 2);
        let zsh = catalog.get("TRIBzsh").unwrap();
        assert_eq!(zsh.version, "5.9");
        assert_eq!(zsh.depends, vec!["TRIBcsl", "TRIBncurses"]);
        assert_eq!(zsh.size, 1734003);
        assert!(catalog.get("TRIBnope").is_none());
        assert_eq!(catalog.names(), vec!["TRIBncurses", "TRIBzsh"]);
    }

    #[test]
    fn test_load_missing_catalog_is_empty() {
        let catalog = RepositoryCatalog::load("gone", Path::new("/no/such/catalog"));
        assert!(catalog.is_empty());
    }

    #[test]
    fn test_load_catalogs_and_available_versions() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::for_root(dir.path());
        fs::create_dir_all(config.repo_dir()).unwrap();
        fs::write(config.repo_dir().join("release.catalog"), CATALOG).unwrap();
        fs::write(
            config.repo_dir().join("extras.catalog"),
            "TRIBzsh|5.8|TRIBcsl|1700000|00ff00\n",
        )
        .unwrap();
        fs::write(config.repo_dir().join("notes.txt"), "ignored\n").unwrap();

        let catalogs = load_catalogs(&config);
        assert_eq!(catalogs.len(), 2);
        assert_eq!(catalogs[0].name(), "extras");

        let available = available_versions(&catalogs, "TRIBzsh");
        assert_eq!(available.len(), 2);
        assert_eq!(available[0].repository, "extras");
        assert_eq!(available[0].version, "5.8");
        assert_eq!(available[1].version, "5.9");

        assert!(available_versions(&catalogs, "TRIBmissing").is_empty());
    }
}
