//! Immutable route table snapshot
//!
//! Built from a [`Router`] on every reload and swapped in whole; requests
//! keep the snapshot they started with.

use crate::compose::CompiledSet;
use crate::router::Router;
use std::sync::Arc;

/// Compiled mounts behind a path trie
#[derive(Default)]
pub struct RouteTable {
    trie: squall_router::Router,
    sets: Vec<Arc<CompiledSet>>,
    patterns: Vec<String>,
}

impl RouteTable {
    pub fn compile(router: &Router) -> Self {
        let mut table = RouteTable::default();
        for mount in router.mounts() {
            let id = table.sets.len() as u32;
            table.trie.insert(&mount.pattern, id);
            table.sets.push(Arc::new(CompiledSet::compile(mount.routes.clone())));
            table.patterns.push(mount.pattern.clone());
        }
        table
    }

    /// Route set mounted at `path` with the captured slots
    pub fn lookup(&self, path: &str) -> Option<(Arc<CompiledSet>, Vec<(String, String)>)> {
        let m = self.trie.find(path)?;
        let set = self.sets.get(m.id as usize)?;
        Some((Arc::clone(set), m.slots))
    }

    /// Mounted patterns in mount order
    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    pub fn len(&self) -> usize {
        self.sets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }
}
