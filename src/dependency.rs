use crate::utils::read_to_string_soft;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::path::Path;

#[derive(Debug, Clone, Default, Serialize)]
pub struct DependencySets {
    pub depends_on: BTreeSet<String>,
    pub declared_dependents: BTreeSet<String>,
    pub incompatible_with: BTreeSet<String>,
}

impl DependencySets {
    // depend(5) lines: one-letter relation code, package name, free text.
    // Anything shorter than two tokens carries no relation and is skipped.
    pub fn parse(content: &str) -> Self {
        let mut sets = DependencySets::default();
        for line in content.lines() {
            let mut tokens = line.split_whitespace();
            let code = match tokens.next() {
                Some(code) => code,
                None => continue,
            };
            let name = match tokens.next() {
                Some(name) => name.to_string(),
                None => continue,
            };
            match code {
                "P" => {
                    sets.depends_on.insert(name);
                }
                "R" => {
                    sets.declared_dependents.insert(name);
                }
                "I" => {
                    sets.incompatible_with.insert(name);
                }
                _ => {}
            }
        }
        sets
    }

    pub fn load(path: &Path) -> Self {
        match read_to_string_soft(path) {
            Some(content) => Self::parse(&content),
            None => DependencySets::default(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.depends_on.is_empty()
            && self.declared_dependents.is_empty()
            && self.incompatible_with.is_empty()
    }
}

pub type ReverseIndex = HashMap<String, BTreeSet<String>>;

// Keyed on the target name string rather than a record, so a package that is
// needed but not installed still has a reverse entry.
pub fn build_reverse_index<'a, I>(packages: I) -> ReverseIndex
where
    I: Iterator<Item = (&'a str, &'a DependencySets)>,
{
    let mut reverse: ReverseIndex = HashMap::new();
    for (name, sets) in packages {
        for target in &sets.depends_on {
            reverse
                .entry(target.clone())
                .or_default()
                .insert(name.to_string());
        }
    }
    reverse
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_depend_lines() {
        let content = "\
P SUNWcsl Core libraries
P SUNWcsr
R SUNWman On-line manual pages
I SUNWoldlib Obsolete libraries
";
        let sets = DependencySets::parse(content);
        assert_eq!(
            sets.depends_on,
            ["SUNWcsl", "SUNWcsr"]
                .iter()
                .map(|s| s.to_string())
                .collect::<BTreeSet<String>>()
        );
        assert_eq!(
            sets.declared_dependents,
            ["SUNWman"]
                .iter()
                .map(|s| s.to_string())
                .collect::<BTreeSet<String>>()
        );
        assert_eq!(
            sets.incompatible_with,
            ["SUNWoldlib"]
                .iter()
                .map(|s| s.to_string())
                .collect::<BTreeSet<String>>()
        );
    }

    #[test]
    fn test_parse_skips_malformed_and_unknown_lines() {
        let content = "P\n\nX SUNWfoo\nP SUNWcsl\n   \nnonsense\n";
        let sets = DependencySets::parse(content);
        assert_eq!(sets.depends_on.len(), 1);
        assert!(sets.depends_on.contains("SUNWcsl"));
        assert!(sets.declared_dependents.is_empty());
        assert!(sets.incompatible_with.is_empty());
    }

    #[test]
    fn test_load_missing_file_is_empty() {
        let sets = DependencySets::load(Path::new("/no/such/depend"));
        assert!(sets.is_empty());
    }

    #[test]
    fn test_reverse_index_keyed_on_target_names() {
        let mut a = DependencySets::default();
        a.depends_on.insert("B".to_string());
        a.depends_on.insert("C".to_string());
        let mut b = DependencySets::default();
        b.depends_on.insert("C".to_string());

        let entries = [("A", &a), ("B", &b)];
        let reverse = build_reverse_index(entries.iter().map(|(n, s)| (*n, *s)));

        assert_eq!(
            reverse["B"],
            ["A".to_string()].into_iter().collect::<BTreeSet<String>>()
        );
        assert_eq!(
            reverse["C"],
            ["A".to_string(), "B".to_string()]
                .into_iter()
                .collect::<BTreeSet<String>>()
        );
        // C is not itself a package in the input, but is still a key.
        assert!(reverse.contains_key("C"));
        assert!(!reverse.contains_key("A"));
    }
}
