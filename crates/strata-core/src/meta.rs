//! Inheritable per-object metadata
//!
//! Every object can carry a tree of namespaced metadata. The tree is
//! inherited through the object's prototype chain and cloned lazily
//! (copy-on-write) the first time a descendant needs to diverge: a write
//! never mutates a node an ancestor can see.
//!
//! Nodes live in the realm's arena and are referenced by [`MetaNodeId`];
//! ownership of every node is recorded explicitly, which keeps promotion
//! auditable. Inheritance is a parent chain between nodes: a promoted node
//! starts empty and falls through to the node it was cloned from, so sibling
//! keys remain shared with the ancestor until touched.

use crate::events::ListenerRecord;
use crate::realm::{FxIndexMap, ObjectId, Realm};
use crate::value::Value;
use crate::{Error, Result};

/// Metadata node identifier (index into the realm's meta arena)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MetaNodeId(pub(crate) u32);

/// One node of an object's metadata tree.
pub(crate) struct MetaNode {
    /// Object this node was created for. A node is only ever mutated
    /// through walks performed on behalf of its owner.
    pub(crate) owner: ObjectId,
    /// Node this one was cloned from; reads fall through to it.
    pub(crate) parent: Option<MetaNodeId>,
    /// Own entries, in insertion order.
    pub(crate) entries: FxIndexMap<String, MetaEntry>,
}

/// A single metadata entry.
#[derive(Clone, Debug)]
pub enum MetaEntry {
    /// A nested namespace node.
    Node(MetaNodeId),
    /// A leaf value.
    Value(Value),
    /// An event listener registration.
    Listener(ListenerRecord),
    /// Tombstone: shadows an inherited entry. Removal must stay visible to
    /// descendants, so entries are never actually deleted.
    Removed,
}

impl Realm {
    /// True only if the object's meta record was created directly for it,
    /// not inherited from a prototype.
    pub fn has_own_metadata(&self, obj: ObjectId) -> bool {
        self.object(obj).meta.is_some()
    }

    /// Read-only metadata walk.
    ///
    /// Walks the prototype chain to the nearest meta root, then follows
    /// `path` through inherited entries. Returns `None` (the empty sentinel)
    /// if any segment is missing or tombstoned, without creating anything.
    /// Callers must not mutate through a handle obtained here.
    pub fn metadata(&self, obj: ObjectId, path: &[&str]) -> Option<MetaNodeId> {
        let mut node = self.nearest_meta_root(obj)?;
        for key in path {
            match self.meta_get(node, key)? {
                MetaEntry::Node(id) => node = *id,
                _ => return None,
            }
        }
        Some(node)
    }

    /// Writable metadata walk with copy-on-write promotion.
    ///
    /// Ensures the object owns its top-level meta record first (promotion is
    /// parent-first), then for each key ensures a nested node exists,
    /// promoting any inherited node before descending. Mutations through the
    /// returned handle are visible to subsequent reads with the same or a
    /// longer path; ancestors never observe them.
    pub fn metadata_mut(&mut self, obj: ObjectId, path: &[&str]) -> Result<MetaNodeId> {
        let mut node = self.own_meta_root(obj);
        for key in path {
            node = self.ensure_child(obj, node, key)?;
        }
        Ok(node)
    }

    /// Value-level metadata access: the sanctioned external surface.
    ///
    /// Fails with [`Error::UnsupportedTarget`] for values that cannot carry
    /// metadata (anything but an object).
    pub fn metadata_for(
        &mut self,
        value: &Value,
        path: &[&str],
        writable: bool,
    ) -> Result<Option<MetaNodeId>> {
        let obj = value
            .as_object()
            .ok_or_else(|| Error::UnsupportedTarget(value.type_name().to_string()))?;
        if writable {
            Ok(Some(self.metadata_mut(obj, path)?))
        } else {
            Ok(self.metadata(obj, path))
        }
    }

    /// Look up an entry on a node, falling through the node's parent chain.
    /// A tombstone shadows: the walk stops and reports absence.
    pub fn meta_get(&self, node: MetaNodeId, key: &str) -> Option<&MetaEntry> {
        let mut cur = Some(node);
        while let Some(id) = cur {
            let n = self.meta(id);
            if let Some(entry) = n.entries.get(key) {
                return match entry {
                    MetaEntry::Removed => None,
                    other => Some(other),
                };
            }
            cur = n.parent;
        }
        None
    }

    /// Look up a leaf value entry (inherited)
    pub fn meta_get_value(&self, node: MetaNodeId, key: &str) -> Option<&Value> {
        match self.meta_get(node, key) {
            Some(MetaEntry::Value(v)) => Some(v),
            _ => None,
        }
    }

    /// Set an entry on a node.
    ///
    /// The node must have come from a writable walk for the object being
    /// updated; writing through a read-only handle would mutate state an
    /// ancestor shares.
    pub fn meta_set(&mut self, node: MetaNodeId, key: &str, entry: MetaEntry) {
        self.meta_mut(node).entries.insert(key.to_string(), entry);
    }

    /// Tombstone an entry on a node, shadowing any inherited value.
    pub fn meta_remove(&mut self, node: MetaNodeId, key: &str) {
        self.meta_set(node, key, MetaEntry::Removed);
    }

    /// Effective view of a node: own and inherited entries merged, ancestors
    /// first, descendants overriding in place. Tombstones are retained so
    /// callers can distinguish "shadowed" from "absent".
    pub fn merged_entries(&self, node: MetaNodeId) -> Vec<(String, MetaEntry)> {
        let mut chain = Vec::new();
        let mut cur = Some(node);
        while let Some(id) = cur {
            chain.push(id);
            cur = self.meta(id).parent;
        }
        let mut out: FxIndexMap<String, MetaEntry> = FxIndexMap::default();
        for id in chain.iter().rev() {
            for (key, entry) in &self.meta(*id).entries {
                out.insert(key.clone(), entry.clone());
            }
        }
        out.into_iter().collect()
    }

    /// Nearest meta root visible to `obj`, own or inherited.
    fn nearest_meta_root(&self, obj: ObjectId) -> Option<MetaNodeId> {
        let mut cur = Some(obj);
        while let Some(o) = cur {
            if let Some(m) = self.object(o).meta {
                return Some(m);
            }
            cur = self.object(o).proto;
        }
        None
    }

    /// Ensure `obj` owns its top-level meta record, cloning from the nearest
    /// ancestor root if it only inherited one so far.
    pub(crate) fn own_meta_root(&mut self, obj: ObjectId) -> MetaNodeId {
        if let Some(id) = self.object(obj).meta {
            return id;
        }
        let parent = self.nearest_meta_root(obj);
        let id = self.alloc_meta(MetaNode {
            owner: obj,
            parent,
            entries: FxIndexMap::default(),
        });
        self.object_mut(obj).meta = Some(id);
        id
    }

    /// Descend one key below `node` (which `obj` owns), promoting an
    /// inherited child before it is ever written through.
    fn ensure_child(&mut self, obj: ObjectId, node: MetaNodeId, key: &str) -> Result<MetaNodeId> {
        match self.meta_get(node, key).cloned() {
            Some(MetaEntry::Node(child)) => {
                if self.meta(child).owner == obj {
                    Ok(child)
                } else {
                    let promoted = self.alloc_meta(MetaNode {
                        owner: obj,
                        parent: Some(child),
                        entries: FxIndexMap::default(),
                    });
                    self.meta_set(node, key, MetaEntry::Node(promoted));
                    Ok(promoted)
                }
            }
            Some(_) => Err(Error::UnsupportedTarget(format!(
                "metadata key `{key}` holds a leaf entry"
            ))),
            None => {
                let fresh = self.alloc_meta(MetaNode {
                    owner: obj,
                    parent: None,
                    entries: FxIndexMap::default(),
                });
                self.meta_set(node, key, MetaEntry::Node(fresh));
                Ok(fresh)
            }
        }
    }

    fn alloc_meta(&mut self, node: MetaNode) -> MetaNodeId {
        let id = MetaNodeId(self.metas.len() as u32);
        self.metas.push(node);
        id
    }

    #[inline]
    pub(crate) fn meta(&self, id: MetaNodeId) -> &MetaNode {
        &self.metas[id.0 as usize]
    }

    #[inline]
    fn meta_mut(&mut self, id: MetaNodeId) -> &mut MetaNode {
        &mut self.metas[id.0 as usize]
    }
}
