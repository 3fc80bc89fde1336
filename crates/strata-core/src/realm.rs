//! Object and function arena
//!
//! A [`Realm`] owns every dynamic object, native function, and metadata node
//! created during a process run. Objects are referenced by [`ObjectId`] and
//! never freed, which makes arena indices stable process-lifetime identities
//! (the identity registry relies on this). Objects carry an optional
//! prototype link; slot lookup walks the prototype chain.

use std::collections::VecDeque;
use std::hash::BuildHasherDefault;
use std::rc::Rc;

use indexmap::IndexMap;
use rustc_hash::FxHasher;

use crate::events::{Deferred, EventContext};
use crate::meta::{MetaNode, MetaNodeId};
use crate::value::Value;
use crate::{Error, Result};

/// Insertion-ordered map used for object slots and metadata entries.
///
/// Iteration order is load-bearing: listener buckets must be invoked in
/// bind order.
pub(crate) type FxIndexMap<K, V> = IndexMap<K, V, BuildHasherDefault<FxHasher>>;

/// Object identifier (index into the realm's object arena)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectId(pub(crate) u32);

impl ObjectId {
    /// Raw arena index
    #[inline]
    pub const fn index(&self) -> u32 {
        self.0
    }
}

/// Function identifier (index into the realm's function table)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FunctionId(pub(crate) u32);

impl FunctionId {
    /// Raw table index
    #[inline]
    pub const fn index(&self) -> u32 {
        self.0
    }
}

/// Native function signature.
///
/// Functions receive the realm so they can read and mutate objects; the
/// dispatcher always detaches argument data from the metadata tree before
/// invoking, so callbacks never observe a partially-walked structure.
pub type NativeFn = Rc<dyn Fn(&mut Realm, Invocation) -> Result<Value>>;

/// Argument pack for a native function call.
pub struct Invocation {
    /// Receiver the function is invoked on.
    pub this: Value,
    /// Positional arguments.
    pub args: Vec<Value>,
    /// Event context when invoked by the dispatcher, `None` for plain calls.
    pub context: Option<Rc<EventContext>>,
}

/// Object instance (arena-allocated)
pub(crate) struct ObjectData {
    /// Prototype link (`None` for root objects)
    pub(crate) proto: Option<ObjectId>,
    /// Named slots, in insertion order
    pub(crate) slots: FxIndexMap<String, Value>,
    /// Own meta record root, if one was ever created for this object
    pub(crate) meta: Option<MetaNodeId>,
}

/// The arena owning all objects, functions, and metadata for a run.
pub struct Realm {
    objects: Vec<ObjectData>,
    functions: Vec<NativeFn>,
    pub(crate) metas: Vec<MetaNode>,
    pub(crate) deferred: VecDeque<Deferred>,
    pub(crate) defer_level: u32,
}

impl Realm {
    /// Create an empty realm
    pub fn new() -> Self {
        Self {
            objects: Vec::new(),
            functions: Vec::new(),
            metas: Vec::new(),
            deferred: VecDeque::new(),
            defer_level: 0,
        }
    }

    /// Create a new object with no prototype
    pub fn create_object(&mut self) -> ObjectId {
        self.alloc_object(None)
    }

    /// Create a new object inheriting from `proto`
    pub fn derive(&mut self, proto: ObjectId) -> ObjectId {
        self.alloc_object(Some(proto))
    }

    fn alloc_object(&mut self, proto: Option<ObjectId>) -> ObjectId {
        let id = ObjectId(self.objects.len() as u32);
        self.objects.push(ObjectData {
            proto,
            slots: FxIndexMap::default(),
            meta: None,
        });
        id
    }

    /// Get an object's prototype link
    pub fn proto(&self, obj: ObjectId) -> Option<ObjectId> {
        self.object(obj).proto
    }

    /// Register a native function and return its handle
    pub fn register_fn<F>(&mut self, f: F) -> FunctionId
    where
        F: Fn(&mut Realm, Invocation) -> Result<Value> + 'static,
    {
        let id = FunctionId(self.functions.len() as u32);
        self.functions.push(Rc::new(f));
        id
    }

    /// Invoke a registered function
    pub fn call(&mut self, func: FunctionId, inv: Invocation) -> Result<Value> {
        let f = self
            .functions
            .get(func.0 as usize)
            .cloned()
            .ok_or_else(|| Error::Callback(format!("unknown function #{}", func.0)))?;
        f(self, inv)
    }

    /// Read a slot defined directly on the object (no prototype walk)
    pub fn get_own(&self, obj: ObjectId, key: &str) -> Option<Value> {
        self.object(obj).slots.get(key).cloned()
    }

    /// Read a slot, walking the prototype chain; `Undefined` if absent.
    ///
    /// This is also how string-named listener methods resolve, so a method
    /// overridden on a descendant wins over the prototype's.
    pub fn get(&self, obj: ObjectId, key: &str) -> Value {
        let mut cur = Some(obj);
        while let Some(o) = cur {
            if let Some(v) = self.object(o).slots.get(key) {
                return v.clone();
            }
            cur = self.object(o).proto;
        }
        Value::Undefined
    }

    /// Write a slot directly on the object. Raw write: no change events
    /// (see [`Realm::set_prop`] for the observable variant).
    pub fn set(&mut self, obj: ObjectId, key: &str, value: Value) {
        self.object_mut(obj).slots.insert(key.to_string(), value);
    }

    #[inline]
    pub(crate) fn object(&self, obj: ObjectId) -> &ObjectData {
        &self.objects[obj.0 as usize]
    }

    #[inline]
    pub(crate) fn object_mut(&mut self, obj: ObjectId) -> &mut ObjectData {
        &mut self.objects[obj.0 as usize]
    }
}

impl Default for Realm {
    fn default() -> Self {
        Self::new()
    }
}
