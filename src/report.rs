use crate::{
    config::Config,
    contents::{ContentsHandle, ContentsIndex, UsageSummary},
    error::ScopeResult,
    overlay::{Overlay, OverlayCatalog},
    package::PackageCatalog,
};
use log::info;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Serialize)]
pub struct DependencyReport {
    pub package: String,
    pub depends_on: BTreeSet<String>,
    pub declared_dependents: BTreeSet<String>,
    pub incompatible_with: BTreeSet<String>,
    pub actual_dependents: BTreeSet<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OverlayStatus {
    pub name: String,
    pub description: Option<String>,
    pub installed: bool,
    pub complete: bool,
    pub missing_overlays: Vec<String>,
    pub missing_packages: Vec<String>,
}

#[derive(Debug)]
pub struct Inspector {
    config: Config,
    packages: PackageCatalog,
    overlays: OverlayCatalog,
    contents: ContentsHandle,
}

impl Inspector {
    // Construct once per inspected root. The contents manifest is by far the
    // largest input, so its build starts first and runs while the package and
    // overlay catalogs load on this task.
    pub async fn load(config: Config) -> ScopeResult<Self> {
        config.validate_root()?;
        let contents = ContentsHandle::spawn(config.contents_file());
        let mut packages = PackageCatalog::load(&config);
        packages.compute_reverse_dependencies();
        let overlays = OverlayCatalog::load(&config);
        info!(
            "Inspector ready for root {:?}: {} packages, {} overlays",
            config.root,
            packages.len(),
            overlays.len()
        );
        Ok(Self {
            config,
            packages,
            overlays,
            contents,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn packages(&self) -> &PackageCatalog {
        &self.packages
    }

    pub fn overlays(&self) -> &OverlayCatalog {
        &self.overlays
    }

    pub fn contents(&self) -> Option<&ContentsIndex> {
        self.contents.get()
    }

    pub fn contents_ready(&self) -> bool {
        self.contents.ready()
    }

    pub async fn wait_for_contents(&self) -> ScopeResult<&ContentsIndex> {
        self.contents.wait().await
    }

    // actual_dependents always comes from the computed reverse index; the
    // record's own R lines are advisory and reported separately.
    pub fn dependency_report(&self, name: &str) -> Option<DependencyReport> {
        let record = self.packages.get(name)?;
        Some(DependencyReport {
            package: record.name().to_string(),
            depends_on: record.depends_on().clone(),
            declared_dependents: record.declared_dependents().clone(),
            incompatible_with: record.incompatible_with().clone(),
            actual_dependents: self.packages.dependants_of(name),
        })
    }

    pub fn missing_dependencies(&self) -> BTreeMap<String, BTreeSet<String>> {
        let mut missing: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for record in self.packages.iter() {
            for target in record.depends_on() {
                if !self.packages.contains(target) {
                    missing
                        .entry(target.clone())
                        .or_default()
                        .insert(record.name().to_string());
                }
            }
        }
        missing
    }

    pub fn overlay_status(&self, overlay: &Overlay) -> OverlayStatus {
        OverlayStatus {
            name: overlay.name().to_string(),
            description: overlay.description().map(str::to_string),
            installed: overlay.is_installed(),
            complete: overlay.is_complete(&self.packages),
            missing_overlays: overlay
                .missing_overlays()
                .iter()
                .map(|o| o.name().to_string())
                .collect(),
            missing_packages: overlay.missing_packages(&self.packages),
        }
    }

    // An overlay marked installed but missing pieces, or fully present but
    // never marked installed, is the state the diagnostics exist to surface.
    pub fn inconsistent_overlays(&self) -> Vec<OverlayStatus> {
        let mut statuses: Vec<OverlayStatus> = self
            .overlays
            .iter()
            .filter(|overlay| overlay.is_declared())
            .map(|overlay| self.overlay_status(overlay))
            .filter(|status| status.installed != status.complete)
            .collect();
        statuses.sort_by(|a, b| a.name.cmp(&b.name));
        statuses
    }

    pub fn package_usage(&self, name: &str) -> Option<UsageSummary> {
        let index = self.contents.get()?;
        let mut summary = index.package_usage(name)?;
        summary.description = self
            .packages
            .get(name)
            .and_then(|record| record.description())
            .map(str::to_string);
        Some(summary)
    }

    pub fn overlay_usage(&self, name: &str) -> Option<UsageSummary> {
        let index = self.contents.get()?;
        let overlay = self.overlays.get(name)?;
        Some(index.overlay_usage(overlay))
    }
}

pub fn space_line(summary: &UsageSummary) -> String {
    format!(
        "{} | {} | {} | {}",
        summary.bytes,
        summary.entries,
        summary.name,
        summary.description.as_deref().unwrap_or("")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::overlay::tests::{mark_overlay_installed, write_overlay};
    use crate::package::tests::write_package;
    use std::fs;

    fn fixture_root() -> (tempfile::TempDir, Config) {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::for_root(dir.path());
        fs::create_dir_all(config.pkg_dir()).unwrap();
        fs::create_dir_all(config.overlay_dir()).unwrap();
        (dir, config)
    }

    #[tokio::test]
    async fn test_missing_dependencies_scenario() {
        let (_dir, config) = fixture_root();
        write_package(&config, "A", "PKG=A\n", Some("P B\n"));
        write_package(&config, "B", "PKG=B\n", None);
        let inspector = Inspector::load(config.clone()).await.unwrap();
        assert!(inspector.missing_dependencies().is_empty());

        // Give B an unsatisfied dependency and reload.
        fs::write(config.depend_file("B"), "P C\n").unwrap();
        let inspector = Inspector::load(config).await.unwrap();
        let missing = inspector.missing_dependencies();
        assert_eq!(missing.len(), 1);
        assert_eq!(
            missing["C"],
            ["B".to_string()].into_iter().collect::<BTreeSet<String>>()
        );
    }

    #[tokio::test]
    async fn test_dependency_report_uses_computed_reverse() {
        let (_dir, config) = fixture_root();
        // A's R line advertises GHOST, but only B actually depends on A.
        write_package(&config, "A", "PKG=A\nNAME=Alpha\n", Some("R GHOST\n"));
        write_package(&config, "B", "PKG=B\n", Some("P A\n"));
        let inspector = Inspector::load(config).await.unwrap();
        let report = inspector.dependency_report("A").unwrap();
        assert_eq!(
            report.actual_dependents,
            ["B".to_string()].into_iter().collect::<BTreeSet<String>>()
        );
        assert_eq!(
            report.declared_dependents,
            ["GHOST".to_string()].into_iter().collect::<BTreeSet<String>>()
        );
        assert!(inspector.dependency_report("NOPE").is_none());
    }

    #[tokio::test]
    async fn test_inconsistent_overlays() {
        let (_dir, config) = fixture_root();
        write_package(&config, "TRIBok", "PKG=TRIBok\n", None);
        // Marked installed, but one member package is absent.
        write_overlay(&config, "broken", "VERSION=1\nNAME=Broken\n", "TRIBok\nTRIBgone\n");
        mark_overlay_installed(&config, "broken");
        // Fully present, but never marked installed.
        write_overlay(&config, "unmarked", "VERSION=1\n", "TRIBok\n");
        // Consistent: installed and complete.
        write_overlay(&config, "fine", "VERSION=1\n", "TRIBok\n");
        mark_overlay_installed(&config, "fine");

        let inspector = Inspector::load(config).await.unwrap();
        let inconsistent = inspector.inconsistent_overlays();
        let names: Vec<&str> = inconsistent.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["broken", "unmarked"]);
        let broken = &inconsistent[0];
        assert!(broken.installed && !broken.complete);
        assert_eq!(broken.missing_packages, vec!["TRIBgone"]);
        let unmarked = &inconsistent[1];
        assert!(!unmarked.installed && unmarked.complete);
    }

    #[tokio::test]
    async fn test_usage_and_space_line() {
        let (_dir, config) = fixture_root();
        write_package(&config, "pkgA", "PKG=pkgA\nNAME=The A package\n", None);
        write_overlay(&config, "editors", "VERSION=1\nNAME=Editors\n", "pkgA\npkgB\n");
        fs::create_dir_all(config.contents_file().parent().unwrap()).unwrap();
        fs::write(
            config.contents_file(),
            "/usr/bin/foo f none 0644 root bin 1024 0 1700000000 pkgA pkgB\n\
             /usr/bin/bar f none 0644 root bin 100 0 1700000000 pkgA\n",
        )
        .unwrap();

        let inspector = Inspector::load(config).await.unwrap();
        inspector.wait_for_contents().await.unwrap();

        let usage = inspector.package_usage("pkgA").unwrap();
        assert_eq!(usage.bytes, 1124);
        assert_eq!(usage.entries, 2);
        assert_eq!(
            space_line(&usage),
            "1124 | 2 | pkgA | The A package"
        );

        let overlay_usage = inspector.overlay_usage("editors").unwrap();
        assert_eq!(overlay_usage.bytes, 1124);
        assert_eq!(overlay_usage.entries, 2);
        assert_eq!(
            space_line(&overlay_usage),
            "1124 | 2 | editors | Editors"
        );
    }

    #[tokio::test]
    async fn test_unreadable_root_is_a_hard_failure() {
        let config = Config::for_root("/no/such/root/anywhere");
        assert!(Inspector::load(config).await.is_err());
    }
}
