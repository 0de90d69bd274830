use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::principal::Principal;

type PrincipalMap = HashMap<String, Arc<Principal>>;

/// Concurrent index of principals keyed by name.
///
/// The index holds one immutable generation at a time. Bulk reloads build the
/// next generation off to the side and publish it with a single pointer swap,
/// so the write lock is only held for the swap itself and readers never see a
/// half-populated table.
#[derive(Debug, Clone, Default)]
pub struct PrincipalSet {
    inner: Arc<RwLock<Arc<PrincipalMap>>>,
}

/// One immutable generation of a [`PrincipalSet`].
///
/// Every lookup against the same snapshot resolves against the same
/// generation, no matter how many reloads happen meanwhile.
#[derive(Debug, Clone)]
pub struct Snapshot(Arc<PrincipalMap>);

impl PrincipalSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    pub fn get(&self, name: &str) -> Option<Arc<Principal>> {
        self.inner.read().get(name).cloned()
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot(self.inner.read().clone())
    }

    /// Insert or overwrite a single principal.
    ///
    /// Copy-on-write: snapshots taken before the call keep the old generation.
    pub fn insert(&self, principal: Principal) {
        let mut guard = self.inner.write();
        Arc::make_mut(&mut guard).insert(principal.name().to_string(), Arc::new(principal));
    }

    pub fn remove(&self, name: &str) -> Option<Arc<Principal>> {
        let mut guard = self.inner.write();
        if !guard.contains_key(name) {
            return None;
        }
        Arc::make_mut(&mut guard).remove(name)
    }

    /// Replace the whole index with `principals`.
    ///
    /// Later entries win over earlier ones with the same name. Returns the
    /// number of principals in the published generation.
    pub fn replace_all<I>(&self, principals: I) -> usize
    where
        I: IntoIterator<Item = Principal>,
    {
        let mut next = PrincipalMap::new();
        for principal in principals {
            let name = principal.name().to_string();
            if let Some(previous) = next.insert(name, Arc::new(principal)) {
                tracing::warn!(
                    name = previous.name(),
                    "duplicate principal name, keeping the last entry"
                );
            }
        }
        let count = next.len();

        *self.inner.write() = Arc::new(next);
        count
    }
}

impl Snapshot {
    pub fn get(&self, name: &str) -> Option<&Arc<Principal>> {
        self.0.get(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Principal names in this generation, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.0.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Principal>> {
        self.0.values()
    }
}
