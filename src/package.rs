use crate::{
    config::Config,
    dependency::{build_reverse_index, DependencySets, ReverseIndex},
    utils::{parse_key_value_lines, read_to_string_soft},
};
use log::{debug, info, warn};
use once_cell::sync::OnceCell;
use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;

#[derive(Debug)]
pub struct PackageRecord {
    name: String,
    info: HashMap<String, String>,
    installed: bool,
    depend_path: PathBuf,
    deps: OnceCell<DependencySets>,
    dependants: OnceCell<BTreeSet<String>>,
}

impl PackageRecord {
    pub fn load(config: &Config, name: &str) -> Self {
        let metadata_dir = config.pkg_metadata_dir(name);
        let installed = metadata_dir.is_dir();
        let info = match read_to_string_soft(&config.pkginfo_file(name)) {
            Some(content) => parse_key_value_lines(&content).into_iter().collect(),
            None => {
                warn!("No readable pkginfo for {}, treating metadata as empty", name);
                HashMap::new()
            }
        };
        Self {
            name: name.to_string(),
            info,
            installed,
            depend_path: config.depend_file(name),
            deps: OnceCell::new(),
            dependants: OnceCell::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_installed(&self) -> bool {
        self.installed
    }

    pub fn version(&self) -> Option<&str> {
        self.property("VERSION")
    }

    pub fn description(&self) -> Option<&str> {
        self.property("NAME")
    }

    pub fn property(&self, key: &str) -> Option<&str> {
        self.info.get(key).map(|s| s.as_str())
    }

    pub fn properties(&self) -> &HashMap<String, String> {
        &self.info
    }

    // All three relation sets come from one pass over the depend file, parsed
    // on first access and cached for the life of the record.
    fn deps(&self) -> &DependencySets {
        self.deps.get_or_init(|| DependencySets::load(&self.depend_path))
    }

    pub fn depends_on(&self) -> &BTreeSet<String> {
        &self.deps().depends_on
    }

    pub fn declared_dependents(&self) -> &BTreeSet<String> {
        &self.deps().declared_dependents
    }

    pub fn incompatible_with(&self) -> &BTreeSet<String> {
        &self.deps().incompatible_with
    }

    pub fn dependants(&self) -> Option<&BTreeSet<String>> {
        self.dependants.get()
    }

    fn attach_dependants(&self, dependants: BTreeSet<String>) {
        let _ = self.dependants.set(dependants);
    }
}

#[derive(Debug, Default)]
pub struct PackageCatalog {
    packages: HashMap<String, PackageRecord>,
    reverse: Option<ReverseIndex>,
}

impl PackageCatalog {
    pub fn load(config: &Config) -> Self {
        let pkg_dir = config.pkg_dir();
        let mut packages = HashMap::new();
        let entries = match std::fs::read_dir(&pkg_dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Cannot enumerate package metadata in {:?}: {}", pkg_dir, e);
                return Self::default();
            }
        };
        for entry in entries.flatten() {
            if !entry.path().is_dir() {
                continue;
            }
            let name = match entry.file_name().into_string() {
                Ok(name) => name,
                Err(_) => continue,
            };
            let record = PackageRecord::load(config, &name);
            packages.insert(name, record);
        }
        info!("Loaded {} installed packages from {:?}", packages.len(), pkg_dir);
        Self {
            packages,
            reverse: None,
        }
    }

    pub fn get(&self, name: &str) -> Option<&PackageRecord> {
        self.packages.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.packages.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.packages.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    pub fn iter(&self) -> impl Iterator<Item = &PackageRecord> {
        self.packages.values()
    }

    // Full pass over every package's forward set. Rebuilt from a fresh map on
    // each call; record-level sets are attached once and keep their first
    // (identical) value on later calls.
    pub fn compute_reverse_dependencies(&mut self) {
        let reverse = build_reverse_index(
            self.packages
                .values()
                .map(|record| (record.name(), record.deps())),
        );
        debug!("Reverse index covers {} target names", reverse.len());
        for record in self.packages.values() {
            let dependants = reverse.get(record.name()).cloned().unwrap_or_default();
            record.attach_dependants(dependants);
        }
        self.reverse = Some(reverse);
    }

    pub fn reverse_index(&self) -> Option<&ReverseIndex> {
        self.reverse.as_ref()
    }

    pub fn dependants_of(&self, name: &str) -> BTreeSet<String> {
        self.reverse
            .as_ref()
            .and_then(|reverse| reverse.get(name))
            .cloned()
            .unwrap_or_default()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::fs;

    pub(crate) fn write_package(
        config: &Config,
        name: &str,
        pkginfo: &str,
        depend: Option<&str>,
    ) {
        let dir = config.pkg_metadata_dir(name);
        fs::create_dir_all(dir.join("install")).unwrap();
        fs::write(config.pkginfo_file(name), pkginfo).unwrap();
        if let Some(depend) = depend {
            fs::write(config.depend_file(name), depend).unwrap();
        }
    }

    fn fixture_catalog() -> (tempfile::TempDir, Config) {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::for_root(dir.path());
        fs::create_dir_all(config.pkg_dir()).unwrap();
        (dir, config)
    }

    #[test]
    fn test_load_and_lookup() {
        let (_dir, config) = fixture_catalog();
        write_package(
            &config,
            "TRIBcsl",
            "PKG=TRIBcsl\nNAME=Core libraries\nVERSION=2.1\n",
            None,
        );
        let catalog = PackageCatalog::load(&config);
        assert_eq!(catalog.len(), 1);
        let record = catalog.get("TRIBcsl").unwrap();
        assert!(record.is_installed());
        assert_eq!(record.version(), Some("2.1"));
        assert_eq!(record.description(), Some("Core libraries"));
        assert!(catalog.get("TRIBnope").is_none());
    }

    #[test]
    fn test_missing_pkginfo_yields_empty_metadata() {
        let (_dir, config) = fixture_catalog();
        fs::create_dir_all(config.pkg_metadata_dir("TRIBbare")).unwrap();
        let catalog = PackageCatalog::load(&config);
        let record = catalog.get("TRIBbare").unwrap();
        assert!(record.properties().is_empty());
        assert!(record.is_installed());
    }

    #[test]
    fn test_names_sorted() {
        let (_dir, config) = fixture_catalog();
        write_package(&config, "TRIBzsh", "PKG=TRIBzsh\n", None);
        write_package(&config, "TRIBbash", "PKG=TRIBbash\n", None);
        let catalog = PackageCatalog::load(&config);
        assert_eq!(catalog.names(), vec!["TRIBbash", "TRIBzsh"]);
    }

    #[test]
    fn test_dependency_sets_parsed_once() {
        let (_dir, config) = fixture_catalog();
        write_package(&config, "TRIBa", "PKG=TRIBa\n", Some("P TRIBb\n"));
        let catalog = PackageCatalog::load(&config);
        let record = catalog.get("TRIBa").unwrap();
        assert!(record.depends_on().contains("TRIBb"));
        // Rewrite the depend file; the cached sets must not change.
        fs::write(config.depend_file("TRIBa"), "P TRIBc\n").unwrap();
        assert!(record.depends_on().contains("TRIBb"));
        assert!(!record.depends_on().contains("TRIBc"));
    }

    #[test]
    fn test_reverse_dependencies_round_trip() {
        let (_dir, config) = fixture_catalog();
        write_package(&config, "A", "PKG=A\n", Some("P B\n"));
        write_package(&config, "B", "PKG=B\n", Some("P C\n"));
        write_package(&config, "C", "PKG=C\n", None);
        let mut catalog = PackageCatalog::load(&config);
        catalog.compute_reverse_dependencies();

        for record in catalog.iter() {
            for target in record.depends_on() {
                assert!(
                    catalog.dependants_of(target).contains(record.name()),
                    "{} should be a dependant of {}",
                    record.name(),
                    target
                );
            }
        }
        assert!(catalog.dependants_of("B").contains("A"));
        assert!(catalog.dependants_of("C").contains("B"));
        assert!(catalog.dependants_of("A").is_empty());
    }

    #[test]
    fn test_reverse_dependencies_idempotent() {
        let (_dir, config) = fixture_catalog();
        write_package(&config, "A", "PKG=A\n", Some("P B\n"));
        write_package(&config, "B", "PKG=B\n", None);
        let mut catalog = PackageCatalog::load(&config);
        catalog.compute_reverse_dependencies();
        let first = catalog.reverse_index().unwrap().clone();
        catalog.compute_reverse_dependencies();
        let second = catalog.reverse_index().unwrap().clone();
        assert_eq!(first, second);
        assert_eq!(
            catalog.get("B").unwrap().dependants().unwrap(),
            &catalog.dependants_of("B")
        );
    }

    #[test]
    fn test_reverse_entry_for_missing_target() {
        let (_dir, config) = fixture_catalog();
        write_package(&config, "A", "PKG=A\n", Some("P GHOST\n"));
        let mut catalog = PackageCatalog::load(&config);
        catalog.compute_reverse_dependencies();
        assert!(catalog.get("GHOST").is_none());
        assert!(catalog.dependants_of("GHOST").contains("A"));
    }
}
