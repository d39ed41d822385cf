use crate::{
    config::Config,
    package::PackageCatalog,
    utils::{parse_key_value_lines, read_to_string_soft},
};
use log::{debug, info, warn};
use once_cell::sync::OnceCell;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug)]
pub struct Overlay {
    name: String,
    data: OnceCell<OverlayData>,
}

#[derive(Debug, Default)]
struct OverlayData {
    version: Option<String>,
    description: Option<String>,
    services: Vec<String>,
    requires: Vec<Arc<Overlay>>,
    members: Vec<String>,
    installed: bool,
}

impl Overlay {
    fn stub(name: &str) -> Self {
        Self {
            name: name.to_string(),
            data: OnceCell::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> Option<&str> {
        self.data.get().and_then(|d| d.version.as_deref())
    }

    pub fn description(&self) -> Option<&str> {
        self.data.get().and_then(|d| d.description.as_deref())
    }

    pub fn services(&self) -> &[String] {
        self.data.get().map(|d| d.services.as_slice()).unwrap_or(&[])
    }

    pub fn requires(&self) -> &[Arc<Overlay>] {
        self.data.get().map(|d| d.requires.as_slice()).unwrap_or(&[])
    }

    pub fn members(&self) -> &[String] {
        self.data.get().map(|d| d.members.as_slice()).unwrap_or(&[])
    }

    pub fn is_installed(&self) -> bool {
        self.data.get().map(|d| d.installed).unwrap_or(false)
    }

    // False for a registry stub interned from a REQUIRES line whose own
    // declaration files never turned up.
    pub fn is_declared(&self) -> bool {
        self.data.get().is_some()
    }

    pub fn requires_overlay(&self, name: &str) -> bool {
        self.requires().iter().any(|o| o.name() == name)
    }

    pub fn contains_package(&self, name: &str) -> bool {
        self.members().iter().any(|m| m == name)
    }

    // Shallow completeness: only the install flags of directly required
    // overlays and directly listed member packages are consulted. Required
    // overlays' own completeness is not followed.
    pub fn is_complete(&self, packages: &PackageCatalog) -> bool {
        self.requires().iter().all(|overlay| overlay.is_installed())
            && self
                .members()
                .iter()
                .all(|member| packages.get(member).is_some_and(|p| p.is_installed()))
    }

    pub fn missing_overlays(&self) -> Vec<Arc<Overlay>> {
        self.requires()
            .iter()
            .filter(|overlay| !overlay.is_installed())
            .cloned()
            .collect()
    }

    pub fn missing_packages(&self, packages: &PackageCatalog) -> Vec<String> {
        self.members()
            .iter()
            .filter(|member| !packages.get(member).is_some_and(|p| p.is_installed()))
            .cloned()
            .collect()
    }
}

#[derive(Debug, Default)]
pub struct OverlayCatalog {
    overlays: HashMap<String, Arc<Overlay>>,
}

impl OverlayCatalog {
    // Two-phase load. Phase 1 registers a stub for every declared overlay (an
    // overlay exists only when both its .ovl and .pkgs files are present).
    // Phase 2 populates each declared overlay, interning REQUIRES references
    // through the registry so each name maps to exactly one Arc.
    pub fn load(config: &Config) -> Self {
        let overlay_dir = config.overlay_dir();
        let mut declared = Vec::new();
        match std::fs::read_dir(&overlay_dir) {
            Ok(entries) => {
                for entry in entries.flatten() {
                    let file_name = entry.file_name();
                    let Some(name) = file_name.to_str().and_then(|f| f.strip_suffix(".ovl"))
                    else {
                        continue;
                    };
                    if config.overlay_pkgs_file(name).is_file() {
                        declared.push(name.to_string());
                    } else {
                        warn!("Overlay {} has no package list, ignoring", name);
                    }
                }
            }
            Err(e) => {
                warn!("Cannot enumerate overlays in {:?}: {}", overlay_dir, e);
                return Self::default();
            }
        }
        declared.sort_unstable();

        let mut catalog = Self::default();
        for name in &declared {
            Self::intern(&mut catalog.overlays, name);
        }
        for name in &declared {
            catalog.populate(config, name);
        }
        info!(
            "Loaded {} overlays ({} registered names) from {:?}",
            declared.len(),
            catalog.overlays.len(),
            overlay_dir
        );
        catalog
    }

    fn intern(map: &mut HashMap<String, Arc<Overlay>>, name: &str) -> Arc<Overlay> {
        map.entry(name.to_string())
            .or_insert_with(|| Arc::new(Overlay::stub(name)))
            .clone()
    }

    fn populate(&mut self, config: &Config, name: &str) {
        let overlay = Self::intern(&mut self.overlays, name);
        let mut data = OverlayData::default();

        if let Some(content) = read_to_string_soft(&config.overlay_file(name)) {
            for (key, value) in parse_key_value_lines(&content) {
                match key.as_str() {
                    "VERSION" => data.version = Some(value),
                    "NAME" => data.description = Some(value),
                    "REQUIRES" => {
                        let required = Self::intern(&mut self.overlays, &value);
                        data.requires.push(required);
                    }
                    "SERVICES" => data.services.push(value),
                    _ => {}
                }
            }
        }

        if let Some(content) = read_to_string_soft(&config.overlay_pkgs_file(name)) {
            data.members = content
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty() && !line.starts_with('#'))
                .map(str::to_string)
                .collect();
        }

        data.installed = config.overlay_installed_marker(name).is_file();

        if overlay.data.set(data).is_err() {
            debug!("Overlay {} populated more than once, keeping first", name);
        }
    }

    pub fn get(&self, name: &str) -> Option<&Arc<Overlay>> {
        self.overlays.get(name)
    }

    pub fn len(&self) -> usize {
        self.overlays.len()
    }

    pub fn is_empty(&self) -> bool {
        self.overlays.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.overlays.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Overlay>> {
        self.overlays.values()
    }

    pub fn requiring(&self, name: &str) -> Vec<Arc<Overlay>> {
        self.overlays
            .values()
            .filter(|overlay| overlay.requires_overlay(name))
            .cloned()
            .collect()
    }

    pub fn containing_package(&self, package: &str) -> Vec<Arc<Overlay>> {
        self.overlays
            .values()
            .filter(|overlay| overlay.contains_package(package))
            .cloned()
            .collect()
    }

    pub fn containing_any(&self, packages: &[String]) -> Vec<Arc<Overlay>> {
        self.overlays
            .values()
            .filter(|overlay| packages.iter().any(|p| overlay.contains_package(p)))
            .cloned()
            .collect()
    }

    // Diagnostic only: completeness stays shallow, so a cycle cannot recurse,
    // but it is still a metadata defect worth surfacing.
    pub fn requires_cycles(&self) -> Vec<Vec<String>> {
        use petgraph::algo::tarjan_scc;
        use petgraph::graphmap::DiGraphMap;
        let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();
        for overlay in self.overlays.values() {
            graph.add_node(overlay.name());
            for required in overlay.requires() {
                graph.add_edge(overlay.name(), required.name(), ());
            }
        }
        let sccs = tarjan_scc(&graph);
        sccs.into_iter()
            .filter(|scc| scc.len() > 1)
            .map(|scc| {
                let mut names: Vec<String> = scc.into_iter().map(|s| s.to_string()).collect();
                names.sort_unstable();
                names
            })
            .collect()
    }
}
