//! Dense gene identifier indexing.
//!
//! Every gene in the feature table receives an index in `[0, N)` in order of
//! first occurrence. The other tables are translated into index space through
//! this mapping, and the mapping is exported as a JSON object so that later
//! runs (and the predictor) can recover node indices.

use anyhow::{bail, Context, Result};
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tracing::{info, warn};

/// What to do with identifiers that are absent from the mapping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnmappedPolicy {
    /// Fail naming the table and identifier
    #[default]
    Error,
    /// Drop the referencing row and log a warning
    Skip,
}

/// Bidirectional gene identifier <-> node index mapping
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GeneMapping {
    ids: Vec<String>,
    index: HashMap<String, usize>,
}

impl GeneMapping {
    /// Build a mapping from identifiers, assigning indices by first occurrence
    pub fn from_ids<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut mapping = Self::default();
        for id in ids {
            mapping.insert(id.as_ref());
        }
        mapping
    }

    /// Insert an identifier, returning its index (existing or new)
    pub fn insert(&mut self, id: &str) -> usize {
        if let Some(&idx) = self.index.get(id) {
            return idx;
        }
        let idx = self.ids.len();
        self.ids.push(id.to_string());
        self.index.insert(id.to_string(), idx);
        idx
    }

    /// Forward lookup
    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    /// Reverse lookup
    pub fn id_of(&self, index: usize) -> Option<&str> {
        self.ids.get(index).map(String::as_str)
    }

    /// Whether the identifier is mapped
    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// Number of mapped genes
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Whether the mapping is empty
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Identifiers in index order
    pub fn iter(&self) -> impl Iterator<Item = (usize, &str)> {
        self.ids.iter().enumerate().map(|(i, id)| (i, id.as_str()))
    }

    /// Translate an identifier from `table` under the given policy
    ///
    /// Returns `Ok(None)` when the identifier is unmapped and the policy is
    /// [`UnmappedPolicy::Skip`].
    pub fn translate(&self, id: &str, table: &str, policy: UnmappedPolicy) -> Result<Option<usize>> {
        match (self.index_of(id), policy) {
            (Some(idx), _) => Ok(Some(idx)),
            (None, UnmappedPolicy::Skip) => Ok(None),
            (None, UnmappedPolicy::Error) => {
                bail!("Gene {:?} referenced in {} is not in the feature table", id, table)
            }
        }
    }

    /// Translate a list of identifiers, dropping unmapped ones under `Skip`
    pub fn translate_all<S: AsRef<str>>(
        &self,
        ids: &[S],
        table: &str,
        policy: UnmappedPolicy,
    ) -> Result<Vec<usize>> {
        let mut indices = Vec::with_capacity(ids.len());
        let mut skipped = 0usize;

        for id in ids {
            match self.translate(id.as_ref(), table, policy)? {
                Some(idx) => indices.push(idx),
                None => skipped += 1,
            }
        }

        if skipped > 0 {
            warn!("Skipped {} unmapped gene(s) in {}", skipped, table);
        }
        Ok(indices)
    }

    /// Write the mapping as a JSON object `{id: index}` in index order
    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {:?}", parent))?;
        }

        let json = serde_json::to_string(self).context("Failed to serialize gene mapping")?;
        fs::write(path, json).with_context(|| format!("Failed to write mapping to {:?}", path))?;

        info!("Saved mapping of {} genes to {:?}", self.len(), path);
        Ok(())
    }

    /// Read a mapping written by [`GeneMapping::save_json`]
    pub fn load_json<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path)
            .with_context(|| format!("Failed to read mapping from {:?}", path))?;
        let raw: HashMap<String, usize> = serde_json::from_str(&json)
            .with_context(|| format!("Failed to parse mapping {:?}", path))?;

        Self::from_index_map(raw)
    }

    /// Rebuild from an `{id: index}` map, requiring indices to form `[0, N)`
    pub fn from_index_map(raw: HashMap<String, usize>) -> Result<Self> {
        let n = raw.len();
        let mut slots: Vec<Option<String>> = vec![None; n];

        for (id, idx) in raw {
            if idx >= n {
                bail!("Index {} for gene {:?} is out of range for {} genes", idx, id, n);
            }
            if let Some(existing) = &slots[idx] {
                bail!("Index {} assigned to both {:?} and {:?}", idx, existing, id);
            }
            slots[idx] = Some(id);
        }

        let ids: Vec<String> = slots.into_iter().flatten().collect();
        let index = ids.iter().enumerate().map(|(i, id)| (id.clone(), i)).collect();
        Ok(Self { ids, index })
    }
}

impl Serialize for GeneMapping {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.ids.len()))?;
        for (idx, id) in self.ids.iter().enumerate() {
            map.serialize_entry(id, &idx)?;
        }
        map.end()
    }
}
