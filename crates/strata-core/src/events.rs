//! Namespaced event dispatch
//!
//! Listeners are stored inside the metadata tree under a reserved
//! `listeners` namespace, so listener inheritance and tombstoned removal are
//! byproducts of metadata inheritance. Event names are colon-namespaced
//! (`"change:street"`); dispatch walks the namespace tree root-to-leaf, so a
//! listener bound at `"change"` fires before one bound at `"change:street"`,
//! and both fire for a `"change:street"` trigger.
//!
//! Deferrable listeners are queued and flushed only when the outermost
//! dispatch unwinds; a suspend counter keeps nested triggers and manual
//! [`Realm::suspend`]/[`Realm::resume`] batches from flushing early.

use std::fmt;
use std::rc::Rc;

use rustc_hash::FxHashSet;

use crate::meta::{MetaEntry, MetaNodeId};
use crate::realm::{FunctionId, Invocation, ObjectId, Realm};
use crate::value::Value;
use crate::{Error, Result};

/// Reserved metadata namespace for listener trees.
const LISTENERS_NS: &str = "listeners";
/// Reserved metadata namespace for watcher annotations.
const WATCHERS_NS: &str = "watchers";
/// Bucket key holding listener records at each namespace level.
const ALL_BUCKET: &str = "all";
/// Path terminator: listeners on the object itself.
const SELF_PATH: &str = "*";
/// Listener count key on a path node; drives the watcher annotation.
const COUNT_KEY: &str = "(count)";
/// Back-reference key inside a watcher group.
const WATCHER_KEY: &str = "(watcher)";

/// Join event name segments with the namespace separator.
pub fn event_name(parts: &[&str]) -> String {
    parts.join(":")
}

fn path_segments(path: &str) -> Vec<&str> {
    path.split('.')
        .filter(|s| !s.is_empty() && *s != SELF_PATH)
        .collect()
}

fn event_segments(event: &str) -> Vec<&str> {
    event.split(':').filter(|s| !s.is_empty()).collect()
}

/// Metadata path of the listener tree for a property path.
fn listeners_base(path: &str) -> Vec<&str> {
    let mut base = vec![LISTENERS_NS];
    base.extend(path_segments(path));
    base.push(SELF_PATH);
    base
}

/// A `*` segment names the object itself and may only terminate a path.
fn validate_path(path: &str) -> Result<()> {
    let mut segs = path.split('.').peekable();
    while let Some(seg) = segs.next() {
        if seg == SELF_PATH && segs.peek().is_some() {
            return Err(Error::InvalidPath(path.to_string()));
        }
    }
    Ok(())
}

/// How a listener's callable is found at invocation time.
#[derive(Clone, Debug)]
pub enum Method {
    /// A function value, invoked as-is.
    Direct(Value),
    /// A slot name resolved against the target when the event fires, not
    /// when it is bound, so the method can be swapped later.
    Named(String),
}

/// Argument rewriter applied before a listener is invoked.
pub type Transform = Rc<dyn Fn(&[Value]) -> Vec<Value>>;

/// One listener registration.
#[derive(Clone)]
pub struct ListenerRecord {
    /// Receiver the method is invoked on. `Undefined` is the sentinel for
    /// "the object the event fires on", filled in at dispatch.
    pub target: Value,
    /// The callable, direct or late-bound.
    pub method: Method,
    /// Optional pre-invocation argument rewriter.
    pub transform: Option<Transform>,
    /// Whether invocation may be deferred to the flush queue.
    pub deferrable: bool,
}

impl fmt::Debug for ListenerRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerRecord")
            .field("target", &self.target)
            .field("method", &self.method)
            .field("deferrable", &self.deferrable)
            .finish()
    }
}

/// Context of the dispatch a listener was invoked for.
///
/// Threaded explicitly through dispatch and stored with deferred entries,
/// so a deferred listener can still observe which event queued it after the
/// original stack frame is long gone.
#[derive(Clone, Debug)]
pub struct EventContext {
    /// Object the event was triggered on.
    pub target: ObjectId,
    /// Full namespaced event name.
    pub event: String,
    /// Trigger arguments before any per-listener transform.
    pub data: Vec<Value>,
    /// Object whose listener tree matched (the path owner).
    pub source: ObjectId,
    /// Property path the listener was attached through (`"*"` for the
    /// object itself).
    pub source_path: String,
}

/// A listener invocation postponed until dispatch unwinds.
pub(crate) struct Deferred {
    func: FunctionId,
    this: Value,
    args: Vec<Value>,
    context: Rc<EventContext>,
}

/// A listener registration request for [`Realm::bind`].
pub struct Binding {
    pub(crate) event: String,
    pub(crate) path: Option<String>,
    pub(crate) target: Option<Value>,
    pub(crate) method: Method,
    pub(crate) transform: Option<Transform>,
    pub(crate) deferrable: bool,
}

impl Binding {
    /// Bind `method` to an event name
    pub fn new(event: impl Into<String>, method: Method) -> Self {
        Self {
            event: event.into(),
            path: None,
            target: None,
            method,
            transform: None,
            deferrable: true,
        }
    }

    /// Attach the listener through a property path walked from the bind
    /// object (`"address"`, `"address.street"`)
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Receiver for the method; defaults to the object the event fires on
    pub fn target(mut self, target: Value) -> Self {
        self.target = Some(target);
        self
    }

    /// Rewrite arguments before invocation
    pub fn transform<F>(mut self, f: F) -> Self
    where
        F: Fn(&[Value]) -> Vec<Value> + 'static,
    {
        self.transform = Some(Rc::new(f));
        self
    }

    /// Run inline during dispatch instead of through the deferred queue
    pub fn immediate(mut self) -> Self {
        self.deferrable = false;
        self
    }
}

impl Realm {
    /// Register a listener on `obj`. Returns the object for chaining.
    ///
    /// Well-formed arguments never fail here; a method name that does not
    /// resolve is reported at invocation time, not at bind time.
    pub fn bind(&mut self, obj: ObjectId, binding: Binding) -> Result<ObjectId> {
        let Binding {
            event,
            path,
            target,
            method,
            transform,
            deferrable,
        } = binding;
        let path = path.unwrap_or_else(|| SELF_PATH.to_string());
        validate_path(&path)?;
        // A defaulted target is stored as the `Undefined` sentinel and
        // resolved to the triggered object at dispatch; the sentinel keys
        // the same bucket on every object in a prototype chain, so an
        // inherited registration can be unbound with the same defaults.
        let target = target.unwrap_or(Value::Undefined);

        let base = listeners_base(&path);
        let base_node = self.metadata_mut(obj, &base)?;
        let count = self.listener_count(base_node);
        self.meta_set(base_node, COUNT_KEY, MetaEntry::Value(Value::int(count + 1)));

        let target_key = self.identify(&target).into_key();
        let method_key = self.method_key(&method);
        let mut full = base;
        full.extend(event_segments(&event));
        full.push(ALL_BUCKET);
        full.push(&target_key);
        let bucket = self.metadata_mut(obj, &full)?;
        self.meta_set(
            bucket,
            &method_key,
            MetaEntry::Listener(ListenerRecord {
                target,
                method,
                transform,
                deferrable,
            }),
        );

        self.reset_watcher(obj, &path)?;
        Ok(obj)
    }

    /// Remove a listener matching the binding's event, path, target, and
    /// method.
    ///
    /// The record is tombstoned rather than deleted: the slot may be shared
    /// through inheritance, and removal must stay visible to descendants.
    /// Already-deferred invocations are not retracted.
    pub fn unbind(&mut self, obj: ObjectId, binding: &Binding) -> Result<ObjectId> {
        let path = binding.path.clone().unwrap_or_else(|| SELF_PATH.to_string());
        validate_path(&path)?;
        let target = binding.target.clone().unwrap_or(Value::Undefined);

        let base = listeners_base(&path);
        let target_key = self.identify(&target).into_key();
        let method_key = self.method_key(&binding.method);
        let mut full = base.clone();
        full.extend(event_segments(&binding.event));
        full.push(ALL_BUCKET);
        full.push(&target_key);

        // Nothing to do unless a live record is visible (own or inherited)
        let Some(bucket) = self.metadata(obj, &full) else {
            return Ok(obj);
        };
        if !matches!(self.meta_get(bucket, &method_key), Some(MetaEntry::Listener(_))) {
            return Ok(obj);
        }

        let bucket = self.metadata_mut(obj, &full)?;
        self.meta_remove(bucket, &method_key);

        let base_node = self.metadata_mut(obj, &base)?;
        let count = self.listener_count(base_node).saturating_sub(1);
        self.meta_set(base_node, COUNT_KEY, MetaEntry::Value(Value::int(count)));

        self.reset_watcher(obj, &path)?;
        Ok(obj)
    }

    /// Trigger an event on an object.
    ///
    /// Walks the object's watcher annotations, notifies every interested
    /// listener tree, then flushes the deferred queue once the outermost
    /// dispatch unwinds. Listener failures are isolated: every matched
    /// listener still runs and the first error is returned afterwards.
    pub fn trigger(&mut self, obj: ObjectId, event: &str, args: &[Value]) -> Result<()> {
        log::trace!("trigger `{}` on object#{}", event, obj.index());

        let mut interests: Vec<(ObjectId, String)> = Vec::new();
        let mut seen: FxHashSet<(ObjectId, String)> = FxHashSet::default();
        if let Some(watchers) = self.metadata(obj, &[WATCHERS_NS]) {
            for (_group_key, entry) in self.merged_entries(watchers) {
                let MetaEntry::Node(group) = entry else { continue };
                let backref = match self.meta_get(group, WATCHER_KEY) {
                    Some(MetaEntry::Value(Value::Object(o))) => *o,
                    _ => continue,
                };
                for (path, flag) in self.merged_entries(group) {
                    if path == WATCHER_KEY {
                        continue;
                    }
                    if !matches!(flag, MetaEntry::Value(Value::Bool(true))) {
                        continue;
                    }
                    // Self-path interest follows the triggered object, so an
                    // instance consults its own (inherited) listener tree
                    // rather than the prototype's directly.
                    let source = if path == SELF_PATH { obj } else { backref };
                    if seen.insert((source, path.clone())) {
                        interests.push((source, path));
                    }
                }
            }
        }

        // Dispatch runs suspended so inline listeners cannot flush mid-event
        self.defer_level += 1;
        let mut first_err = None;
        for (source, path) in interests {
            let ctx = Rc::new(EventContext {
                target: obj,
                event: event.to_string(),
                data: args.to_vec(),
                source,
                source_path: path.clone(),
            });
            if let Err(e) = self.notify(source, &path, event, args, &ctx) {
                first_err.get_or_insert(e);
            }
        }
        self.defer_level -= 1;

        let flushed = if self.defer_level == 0 {
            self.flush(false)
        } else {
            Ok(())
        };
        match first_err {
            Some(e) => Err(e),
            None => flushed,
        }
    }

    /// Suspend deferrable notifications; pair with [`Realm::resume`].
    pub fn suspend(&mut self) {
        self.defer_level += 1;
    }

    /// Resume deferrable notifications, flushing once the level reaches
    /// zero. The level clamps at zero: an unpaired `resume` is a no-op.
    pub fn resume(&mut self) -> Result<()> {
        self.defer_level = self.defer_level.saturating_sub(1);
        if self.defer_level == 0 {
            self.flush(false)
        } else {
            Ok(())
        }
    }

    /// Drain the deferred queue in FIFO order.
    ///
    /// Each batch runs at an elevated suspend level, so listeners invoked
    /// during the flush cannot reenter it; work they defer lands in the next
    /// batch. With `force`, drains even while suspended.
    pub fn flush(&mut self, force: bool) -> Result<()> {
        let mut first_err = None;
        while !self.deferred.is_empty() && (self.defer_level == 0 || force) {
            let batch: Vec<Deferred> = self.deferred.drain(..).collect();
            self.defer_level += 1;
            for entry in batch {
                let inv = Invocation {
                    this: entry.this,
                    args: entry.args,
                    context: Some(entry.context),
                };
                if let Err(e) = self.call(entry.func, inv) {
                    first_err.get_or_insert(e);
                }
            }
            self.defer_level -= 1;
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Tombstone the object's own listener storage.
    ///
    /// The object stops matching listeners it inherited; ancestors keep
    /// theirs.
    pub fn reset_listeners(&mut self, obj: ObjectId) {
        let root = self.own_meta_root(obj);
        self.meta_remove(root, LISTENERS_NS);
    }

    /// Notify the listener tree of `source` attached through `path`.
    fn notify(
        &mut self,
        source: ObjectId,
        path: &str,
        event: &str,
        args: &[Value],
        ctx: &Rc<EventContext>,
    ) -> Result<()> {
        let base = listeners_base(path);
        let Some(mut node) = self.metadata(source, &base) else {
            return Ok(());
        };
        let mut first_err = None;
        for seg in event_segments(event) {
            let next = match self.meta_get(node, seg) {
                Some(&MetaEntry::Node(id)) => id,
                _ => break,
            };
            node = next;
            if let Some(&MetaEntry::Node(bucket)) = self.meta_get(node, ALL_BUCKET) {
                if let Err(e) = self.notify_bucket(bucket, args, ctx) {
                    first_err.get_or_insert(e);
                }
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Invoke or defer every live record in a bucket.
    fn notify_bucket(
        &mut self,
        bucket: MetaNodeId,
        args: &[Value],
        ctx: &Rc<EventContext>,
    ) -> Result<()> {
        // Snapshot records first: listeners get `&mut Realm` and must not
        // observe a half-walked metadata tree.
        let mut records = Vec::new();
        for (_target_key, entry) in self.merged_entries(bucket) {
            let MetaEntry::Node(target_node) = entry else { continue };
            for (_method_key, entry) in self.merged_entries(target_node) {
                if let MetaEntry::Listener(rec) = entry {
                    records.push(rec);
                }
            }
        }

        let mut first_err = None;
        for rec in records {
            // The sentinel target stands for whichever object the event
            // actually fired on, not the object the listener was bound on.
            let this = if rec.target.is_undefined() {
                Value::object(ctx.target)
            } else {
                rec.target.clone()
            };
            let func = match self.resolve_method(&rec, &this, &ctx.event) {
                Ok(f) => f,
                Err(e) => {
                    first_err.get_or_insert(e);
                    continue;
                }
            };
            let args = match &rec.transform {
                Some(xform) => xform(args),
                None => args.to_vec(),
            };
            if rec.deferrable {
                self.deferred.push_back(Deferred {
                    func,
                    this,
                    args,
                    context: ctx.clone(),
                });
            } else {
                let inv = Invocation {
                    this,
                    args,
                    context: Some(ctx.clone()),
                };
                if let Err(e) = self.call(func, inv) {
                    first_err.get_or_insert(e);
                }
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Resolve a record's callable against the effective receiver; late
    /// binding happens here.
    fn resolve_method(&self, rec: &ListenerRecord, this: &Value, event: &str) -> Result<FunctionId> {
        let resolved = match &rec.method {
            Method::Direct(v) => v.clone(),
            Method::Named(name) => match this.as_object() {
                Some(target) => self.get(target, name),
                None => Value::Undefined,
            },
        };
        match resolved {
            Value::Function(f) => Ok(f),
            _ => Err(Error::ListenerResolution {
                event: event.to_string(),
                method: self.method_key(&rec.method),
            }),
        }
    }

    fn method_key(&self, method: &Method) -> String {
        match method {
            Method::Direct(v) => self.identify(v).into_key(),
            Method::Named(name) => self.identify(&Value::str(name.as_str())).into_key(),
        }
    }

    fn listener_count(&self, node: MetaNodeId) -> i64 {
        self.meta_get_value(node, COUNT_KEY)
            .and_then(Value::as_int)
            .unwrap_or(0)
    }

    /// Re-evaluate the watcher annotation on the current target of `path`.
    ///
    /// Runs on bind/unbind only, never on property writes: the annotation on
    /// the target marks whether anyone upstream is still interested, letting
    /// `trigger` skip dead paths cheaply.
    fn reset_watcher(&mut self, obj: ObjectId, path: &str) -> Result<()> {
        let target = if path == SELF_PATH {
            Some(obj)
        } else {
            self.get_path(obj, path).as_object()
        };
        let Some(target) = target else {
            return Ok(()); // no target to annotate
        };

        let count = self
            .metadata(obj, &listeners_base(path))
            .map(|node| self.listener_count(node))
            .unwrap_or(0);

        let group_key = self.identify(&Value::object(obj)).into_key();
        let group = self.metadata_mut(target, &[WATCHERS_NS, &group_key])?;
        self.meta_set(group, WATCHER_KEY, MetaEntry::Value(Value::object(obj)));
        self.meta_set(group, path, MetaEntry::Value(Value::bool(count > 0)));
        Ok(())
    }
}
