// SPDX-License-Identifier: GPL-3.0-only

use std::collections::BTreeMap;
use std::fmt;

use tracing::info;

use crate::error::{ReplicationError, Result};
use crate::zfs::Zfs;

/// A volume (ZFS dataset) with its child volumes and snapshots
///
/// The root of a listed tree has an empty full name. Children are keyed by
/// their short name and always iterate in ascending name order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Volume {
    full_name: String,
    name: String,
    children: BTreeMap<String, Volume>,
    snapshots: Vec<String>,
}

fn split_first_segment(path: &str) -> (&str, Option<&str>) {
    match path.split_once('/') {
        Some((segment, rest)) => (segment, Some(rest)),
        None => (path, None),
    }
}

impl Volume {
    /// Empty root of a volume tree.
    pub fn root() -> Self {
        Self::default()
    }

    pub(crate) fn new(full_name: impl Into<String>) -> Self {
        let full_name = full_name.into();
        let name = match full_name.rsplit_once('/') {
            Some((_, name)) => name.to_string(),
            None => full_name.clone(),
        };

        Self {
            full_name,
            name,
            children: BTreeMap::new(),
            snapshots: Vec::new(),
        }
    }

    /// Slash separated path from the tree root.
    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    /// Last path segment.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Snapshot names, oldest first.
    pub fn snapshots(&self) -> &[String] {
        &self.snapshots
    }

    /// Direct children sorted by name.
    pub fn children(&self) -> impl Iterator<Item = &Volume> {
        self.children.values()
    }

    pub fn child(&self, name: &str) -> Option<&Volume> {
        self.children.get(name)
    }

    /// Number of volumes below this one, at any depth.
    pub fn descendants(&self) -> usize {
        self.children
            .values()
            .map(|child| 1 + child.descendants())
            .sum()
    }

    fn child_path(&self, name: &str) -> String {
        if self.full_name.is_empty() {
            name.to_string()
        } else {
            format!("{}/{}", self.full_name, name)
        }
    }

    /// Look up a descendant by its path relative to this volume.
    pub fn get(&self, path: &str) -> Result<&Volume> {
        let (segment, rest) = split_first_segment(path);
        let child = self
            .children
            .get(segment)
            .ok_or_else(|| ReplicationError::not_found(segment, &self.full_name))?;

        match rest {
            Some(rest) => child.get(rest),
            None => Ok(child),
        }
    }

    /// Mutable variant of [`Volume::get`].
    pub fn get_mut(&mut self, path: &str) -> Result<&mut Volume> {
        let (segment, rest) = split_first_segment(path);
        let full_name = &self.full_name;
        let child = self
            .children
            .get_mut(segment)
            .ok_or_else(|| ReplicationError::not_found(segment, full_name))?;

        match rest {
            Some(rest) => child.get_mut(rest),
            None => Ok(child),
        }
    }

    /// Return the child called `name`, creating the dataset first if it does
    /// not exist yet.
    ///
    /// # Panics
    ///
    /// Panics if `name` contains a `/`.
    pub fn create_if_missing(&mut self, zfs: &Zfs, name: &str) -> Result<&mut Volume> {
        assert!(
            !name.contains('/'),
            "slashes not allowed in volume names: {name}"
        );

        if !self.children.contains_key(name) {
            let full_name = self.child_path(name);
            zfs.create(&full_name)?;
            info!("Created volume {}", full_name);
        }

        Ok(self.insert_child(name))
    }

    /// Attach an empty child named `name` unless one exists already.
    pub(crate) fn insert_child(&mut self, name: &str) -> &mut Volume {
        let full_name = self.child_path(name);
        self.children
            .entry(name.to_string())
            .or_insert_with(|| Volume::new(full_name))
    }

    /// Append a snapshot; names already present are ignored.
    pub(crate) fn push_snapshot(&mut self, snapshot: &str) {
        if !self.snapshots.iter().any(|existing| existing == snapshot) {
            self.snapshots.push(snapshot.to_string());
        }
    }

    fn write_tree(&self, f: &mut fmt::Formatter<'_>, level: usize) -> fmt::Result {
        writeln!(f, "{} -> {}", "  ".repeat(level), self.name)?;
        for snapshot in &self.snapshots {
            writeln!(f, "{} @> {}", "  ".repeat(level + 2), snapshot)?;
        }
        for child in self.children.values() {
            child.write_tree(f, level + 1)?;
        }
        Ok(())
    }
}

impl fmt::Display for Volume {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.name)?;
        for child in self.children.values() {
            child.write_tree(f, 1)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::exec::testing::{Script, ScriptedRunner};

    fn tree() -> Volume {
        let mut root = Volume::root();
        let tank = root.insert_child("tank");
        tank.push_snapshot("s1");
        let a = tank.insert_child("a");
        a.insert_child("b");
        tank.insert_child("c");
        root
    }

    #[test]
    fn derives_short_name_from_full_name() {
        let volume = Volume::new("tank/a/b");
        assert_eq!(volume.full_name(), "tank/a/b");
        assert_eq!(volume.name(), "b");
        assert_eq!(Volume::new("tank").name(), "tank");
    }

    #[test]
    fn looks_up_nested_paths() {
        let root = tree();
        let b = root.get("tank/a/b").unwrap();
        assert_eq!(b.full_name(), "tank/a/b");
        assert_eq!(root.get("tank").unwrap().snapshots(), ["s1"]);
        assert_eq!(root.descendants(), 4);
    }

    #[test]
    fn lookup_failure_names_segment_and_parent() {
        let root = tree();
        assert_eq!(
            root.get("tank/x/y").unwrap_err().to_string(),
            "unable to find x in tank"
        );
        assert_eq!(root.get("pool").unwrap_err().to_string(), "unable to find pool");
    }

    #[test]
    fn children_iterate_in_name_order() {
        let mut root = Volume::root();
        let tank = root.insert_child("tank");
        for name in ["zeta", "alpha", "mid"] {
            tank.insert_child(name);
        }

        let names: Vec<_> = root.get("tank").unwrap().children().map(Volume::name).collect();
        assert_eq!(names, ["alpha", "mid", "zeta"]);
    }

    #[test]
    fn duplicate_snapshots_are_ignored() {
        let mut volume = Volume::new("tank");
        volume.push_snapshot("s1");
        volume.push_snapshot("s1");
        volume.push_snapshot("s2");
        assert_eq!(volume.snapshots(), ["s1", "s2"]);
    }

    #[test]
    fn create_if_missing_creates_once() {
        let runner = Arc::new(ScriptedRunner::new());
        let zfs = Zfs::new(runner.clone(), "zfs");
        let mut root = tree();
        let tank = root.get_mut("tank").unwrap();

        let created = tank.create_if_missing(&zfs, "d").unwrap();
        assert_eq!(created.full_name(), "tank/d");
        assert!(created.snapshots().is_empty());

        tank.create_if_missing(&zfs, "d").unwrap();
        tank.create_if_missing(&zfs, "a").unwrap();

        assert_eq!(runner.started(), ["zfs create tank/d"]);
    }

    #[test]
    fn create_if_missing_propagates_runner_failure() {
        let runner = Arc::new(
            ScriptedRunner::new().on("create", Script::exit(1).stderr("permission denied")),
        );
        let zfs = Zfs::new(runner, "zfs");
        let mut root = tree();

        let error = root
            .get_mut("tank")
            .unwrap()
            .create_if_missing(&zfs, "d")
            .unwrap_err();
        assert!(error.to_string().contains("permission denied"));
        assert!(root.get("tank/d").is_err());
    }

    #[test]
    #[should_panic(expected = "slashes not allowed")]
    fn create_if_missing_rejects_paths() {
        let zfs = Zfs::new(Arc::new(ScriptedRunner::new()), "zfs");
        let mut root = tree();
        let _ = root.create_if_missing(&zfs, "tank/x");
    }

    #[test]
    fn renders_indented_tree() {
        let rendered = tree().to_string();
        assert_eq!(
            rendered,
            "\n   -> tank\n       @> s1\n     -> a\n       -> b\n     -> c\n"
        );
    }
}
