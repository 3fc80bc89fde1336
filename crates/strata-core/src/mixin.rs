//! Mixin engine
//!
//! A [`Mixin`] is a composable, idempotently-applicable increment of object
//! behavior: an ordered list of dependency mixins plus a body, which is
//! either a setup routine run once against the target or a property map
//! spliced onto it. Application is depth-first and dependency-first, and a
//! unit is applied at most once per object, including once per inheritance
//! chain: applied-marks live in metadata and are inherited like any other
//! metadata.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use rustc_hash::FxHashSet;

use crate::ident::generate_id;
use crate::meta::{MetaEntry, MetaNodeId};
use crate::realm::{Invocation, ObjectId, Realm};
use crate::value::Value;
use crate::{Error, Result};

/// Reserved metadata namespace holding applied-marks.
const MIXINS_NS: &str = "mixins";

/// A setup routine with its own stable identity.
///
/// The identity is tracked separately from any mixin that carries the
/// routine: the same routine reachable through two restructured units must
/// still run only once per object.
#[derive(Clone)]
pub struct Setup {
    pub(crate) ident: u64,
    pub(crate) run: Rc<dyn Fn(&mut Realm, ObjectId) -> Result<()>>,
}

impl Setup {
    /// Wrap a routine, minting its identity
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&mut Realm, ObjectId) -> Result<()> + 'static,
    {
        Self {
            ident: generate_id(),
            run: Rc::new(f),
        }
    }

    /// The routine's identity tag
    pub fn ident(&self) -> u64 {
        self.ident
    }
}

impl fmt::Debug for Setup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Setup").field("ident", &self.ident).finish()
    }
}

/// Body of a mixin.
#[derive(Clone, Debug)]
enum MixinBody {
    /// Run a setup routine once per object.
    Setup(Setup),
    /// Splice a property map onto the object.
    Properties(Vec<(String, Value)>),
    /// Composite-only mixin: dependencies, no body of its own.
    None,
}

struct MixinInner {
    ident: u64,
    deps: RefCell<Vec<Mixin>>,
    body: RefCell<MixinBody>,
}

/// A reusable increment of object behavior. Cheap to clone; clones share
/// identity.
#[derive(Clone)]
pub struct Mixin {
    inner: Rc<MixinInner>,
}

impl Mixin {
    fn from_body(deps: Vec<Mixin>, body: MixinBody) -> Self {
        Self {
            inner: Rc::new(MixinInner {
                ident: generate_id(),
                deps: RefCell::new(deps),
                body: RefCell::new(body),
            }),
        }
    }

    /// Create a mixin from a setup routine
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn(&mut Realm, ObjectId) -> Result<()> + 'static,
    {
        Self::from_setup(Setup::new(f))
    }

    /// Create a mixin from an existing setup routine, preserving the
    /// routine's identity
    pub fn from_setup(setup: Setup) -> Self {
        Self::from_body(Vec::new(), MixinBody::Setup(setup))
    }

    /// Create a mixin that splices a property map onto the target
    pub fn from_properties<K, I>(props: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        let props = props.into_iter().map(|(k, v)| (k.into(), v)).collect();
        Self::from_body(Vec::new(), MixinBody::Properties(props))
    }

    /// Create a composite mixin: dependencies only, no body
    pub fn composite(deps: Vec<Mixin>) -> Self {
        Self::from_body(deps, MixinBody::None)
    }

    /// Add a dependency, applied before this mixin's body
    pub fn depends_on(self, dep: &Mixin) -> Self {
        self.inner.deps.borrow_mut().push(dep.clone());
        self
    }

    /// Restructure the mixin in place, appending `more` as dependencies.
    ///
    /// An existing body is demoted into a dependency mixin first, keeping
    /// its setup identity, so objects that already ran the routine will not
    /// run it again. Objects the mixin was already applied to are not
    /// updated.
    pub fn reopen(&self, more: &[Mixin]) {
        let mut body = self.inner.body.borrow_mut();
        if !matches!(*body, MixinBody::None) {
            let demoted = Self::from_body(Vec::new(), std::mem::replace(&mut *body, MixinBody::None));
            self.inner.deps.borrow_mut().push(demoted);
        }
        drop(body);
        let mut deps = self.inner.deps.borrow_mut();
        for m in more {
            deps.push(m.clone());
        }
    }

    /// Coerce a dynamic value into a behavior unit.
    ///
    /// A function value becomes a setup routine invoked with the target as
    /// receiver; an object value is snapshotted into a property map. Any
    /// other value is a malformed argument.
    pub fn try_from_value(realm: &Realm, value: &Value) -> Result<Mixin> {
        match value {
            Value::Function(f) => {
                let f = *f;
                Ok(Mixin::from_fn(move |realm, obj| {
                    realm
                        .call(
                            f,
                            Invocation {
                                this: Value::object(obj),
                                args: Vec::new(),
                                context: None,
                            },
                        )
                        .map(|_| ())
                }))
            }
            Value::Object(o) => {
                let props: Vec<(String, Value)> = realm
                    .object(*o)
                    .slots
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect();
                Ok(Mixin::from_properties(props))
            }
            other => Err(Error::InvalidBehaviorUnit(format!(
                "expected a mixin, function, or object, got {}",
                other.type_name()
            ))),
        }
    }

    /// The unit's identity tag
    pub fn ident(&self) -> u64 {
        self.inner.ident
    }

    fn unit_key(&self) -> String {
        format!("(mixin:{})", self.inner.ident)
    }
}

impl fmt::Debug for Mixin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mixin")
            .field("ident", &self.inner.ident)
            .field("deps", &self.inner.deps.borrow().len())
            .finish()
    }
}

impl Realm {
    /// Apply behavior units to an object, dependencies first.
    ///
    /// Each unit is applied at most once per object; marks recorded in the
    /// `mixins` metadata namespace are inherited by future descendants, so
    /// an application on a prototype suppresses re-application on instances.
    /// Dependency cycles are a usage error; they are tolerated via a
    /// per-call visited set and surfaced as a warning.
    pub fn apply_mixins(&mut self, obj: ObjectId, units: &[Mixin]) -> Result<()> {
        let mut visited = FxHashSet::default();
        let mut stack = FxHashSet::default();
        for unit in units {
            self.apply_one(obj, unit, &mut visited, &mut stack)?;
        }
        Ok(())
    }

    fn apply_one(
        &mut self,
        obj: ObjectId,
        unit: &Mixin,
        visited: &mut FxHashSet<u64>,
        stack: &mut FxHashSet<u64>,
    ) -> Result<()> {
        // A unit still on the application stack means its dependency chain
        // loops back into itself. A repeat encounter off the stack is a
        // diamond and skips silently.
        if stack.contains(&unit.ident()) {
            log::warn!(
                "cyclic mixin dependency involving (mixin:{}); skipping re-entry",
                unit.ident()
            );
            return Ok(());
        }
        if !visited.insert(unit.ident()) {
            return Ok(());
        }

        let unit_key = unit.unit_key();
        let marks = self.metadata_mut(obj, &[MIXINS_NS])?;
        if self.meta_get(marks, &unit_key).is_some() {
            return Ok(());
        }
        // Mark before anything runs: a setup routine that indirectly
        // re-applies its own unit must observe the mark and stop.
        self.meta_set(marks, &unit_key, MetaEntry::Value(Value::bool(true)));

        stack.insert(unit.ident());
        let result = self.apply_deps_and_body(obj, unit, marks, visited, stack);
        stack.remove(&unit.ident());
        result
    }

    fn apply_deps_and_body(
        &mut self,
        obj: ObjectId,
        unit: &Mixin,
        marks: MetaNodeId,
        visited: &mut FxHashSet<u64>,
        stack: &mut FxHashSet<u64>,
    ) -> Result<()> {
        let deps: Vec<Mixin> = unit.inner.deps.borrow().clone();
        for dep in &deps {
            self.apply_one(obj, dep, visited, stack)?;
        }

        let body = unit.inner.body.borrow().clone();
        match body {
            MixinBody::None => Ok(()),
            MixinBody::Properties(props) => {
                // Last writer wins, in dependency-then-self order
                for (key, value) in props {
                    self.set(obj, &key, value);
                }
                Ok(())
            }
            MixinBody::Setup(setup) => {
                let setup_key = format!("(setup:{})", setup.ident);
                if self.meta_get(marks, &setup_key).is_some() {
                    return Ok(());
                }
                self.meta_set(marks, &setup_key, MetaEntry::Value(Value::bool(true)));
                (setup.run)(self, obj)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::sync::{Mutex, OnceLock};

    /// Warnings captured by the test logger, shared across tests; assertions
    /// filter by unit tag so concurrent tests cannot interfere.
    static WARNINGS: Mutex<Vec<String>> = Mutex::new(Vec::new());
    static CAPTURE: WarnCapture = WarnCapture;

    struct WarnCapture;

    impl log::Log for WarnCapture {
        fn enabled(&self, metadata: &log::Metadata<'_>) -> bool {
            metadata.level() <= log::Level::Warn
        }

        fn log(&self, record: &log::Record<'_>) {
            if record.level() == log::Level::Warn {
                WARNINGS.lock().unwrap().push(record.args().to_string());
            }
        }

        fn flush(&self) {}
    }

    fn install_warn_capture() {
        static INSTALLED: OnceLock<()> = OnceLock::new();
        INSTALLED.get_or_init(|| {
            let _ = log::set_logger(&CAPTURE);
            log::set_max_level(log::LevelFilter::Warn);
        });
    }

    fn warned_about(unit: &Mixin) -> bool {
        let tag = format!("(mixin:{})", unit.ident());
        WARNINGS.lock().unwrap().iter().any(|m| m.contains(&tag))
    }

    fn counting_mixin(log: &Rc<RefCell<Vec<&'static str>>>, name: &'static str) -> Mixin {
        let log = log.clone();
        Mixin::from_fn(move |_realm, _obj| {
            log.borrow_mut().push(name);
            Ok(())
        })
    }

    #[test]
    fn test_apply_is_idempotent() {
        let mut realm = Realm::new();
        let obj = realm.create_object();
        let log = Rc::new(RefCell::new(Vec::new()));
        let m = counting_mixin(&log, "m");

        realm.apply_mixins(obj, &[m.clone()]).unwrap();
        realm.apply_mixins(obj, &[m]).unwrap();
        assert_eq!(*log.borrow(), vec!["m"]);
    }

    #[test]
    fn test_dependencies_run_first() {
        let mut realm = Realm::new();
        let obj = realm.create_object();
        let log = Rc::new(RefCell::new(Vec::new()));
        let a = counting_mixin(&log, "a");
        let b = counting_mixin(&log, "b").depends_on(&a);

        realm.apply_mixins(obj, &[b]).unwrap();
        assert_eq!(*log.borrow(), vec!["a", "b"]);
    }

    #[test]
    fn test_diamond_applies_shared_dependency_once() {
        let mut realm = Realm::new();
        let obj = realm.create_object();
        let log = Rc::new(RefCell::new(Vec::new()));
        let base = counting_mixin(&log, "base");
        let left = counting_mixin(&log, "left").depends_on(&base);
        let right = counting_mixin(&log, "right").depends_on(&base);
        let top = Mixin::composite(vec![left, right]);

        realm.apply_mixins(obj, &[top]).unwrap();
        assert_eq!(*log.borrow(), vec!["base", "left", "right"]);
    }

    #[test]
    fn test_inherited_application_suppresses_rerun() {
        let mut realm = Realm::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        let m = counting_mixin(&log, "m");

        let proto = realm.create_object();
        realm.apply_mixins(proto, &[m.clone()]).unwrap();

        let instance = realm.derive(proto);
        realm.apply_mixins(instance, &[m]).unwrap();
        assert_eq!(*log.borrow(), vec!["m"]);
    }

    #[test]
    fn test_cycle_is_tolerated_and_warned() {
        install_warn_capture();
        let mut realm = Realm::new();
        let obj = realm.create_object();
        let log = Rc::new(RefCell::new(Vec::new()));
        let a = counting_mixin(&log, "a");
        let b = counting_mixin(&log, "b").depends_on(&a);
        a.reopen(std::slice::from_ref(&b)); // a -> b -> a

        realm.apply_mixins(obj, &[a.clone()]).unwrap();
        assert_eq!(*log.borrow(), vec!["a", "b"]);
        // The loop back into `a` was reported
        assert!(warned_about(&a));
    }

    #[test]
    fn test_diamond_is_not_reported_as_cycle() {
        install_warn_capture();
        let mut realm = Realm::new();
        let obj = realm.create_object();
        let log = Rc::new(RefCell::new(Vec::new()));
        let base = counting_mixin(&log, "base");
        let left = counting_mixin(&log, "left").depends_on(&base);
        let right = counting_mixin(&log, "right").depends_on(&base);
        let top = Mixin::composite(vec![left.clone(), right.clone()]);

        realm.apply_mixins(obj, &[top.clone()]).unwrap();
        assert_eq!(*log.borrow(), vec!["base", "left", "right"]);
        // Converging on a shared dependency is legal and stays silent
        for unit in [&base, &left, &right, &top] {
            assert!(!warned_about(unit));
        }
    }

    #[test]
    fn test_property_mixin_splices_keys() {
        let mut realm = Realm::new();
        let obj = realm.create_object();
        let dep = Mixin::from_properties(vec![("x", Value::int(1)), ("y", Value::int(2))]);
        let unit = Mixin::from_properties(vec![("x", Value::int(10))]).depends_on(&dep);

        realm.apply_mixins(obj, &[unit]).unwrap();
        // Self wins over dependency on collision
        assert_eq!(realm.get(obj, "x"), Value::int(10));
        assert_eq!(realm.get(obj, "y"), Value::int(2));
    }

    #[test]
    fn test_reopen_preserves_setup_identity() {
        let mut realm = Realm::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        let obj = realm.create_object();

        let m = counting_mixin(&log, "setup");
        realm.apply_mixins(obj, &[m.clone()]).unwrap();

        // Restructuring the unit must not re-run the routine it carried
        let extra = counting_mixin(&log, "extra");
        m.reopen(std::slice::from_ref(&extra));
        realm.apply_mixins(obj, &[m.clone()]).unwrap();
        // The reopened unit itself is already marked applied, so nothing runs
        assert_eq!(*log.borrow(), vec!["setup"]);

        // A fresh object gets both, old routine exactly once
        let fresh = realm.create_object();
        realm.apply_mixins(fresh, &[m]).unwrap();
        assert_eq!(*log.borrow(), vec!["setup", "setup", "extra"]);
    }

    #[test]
    fn test_setup_identity_shared_across_units() {
        let mut realm = Realm::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        let obj = realm.create_object();

        let routine = {
            let log = log.clone();
            Setup::new(move |_realm, _obj| {
                log.borrow_mut().push("routine");
                Ok(())
            })
        };
        let first = Mixin::from_setup(routine.clone());
        let second = Mixin::from_setup(routine);
        assert_ne!(first.ident(), second.ident());

        realm.apply_mixins(obj, &[first, second]).unwrap();
        assert_eq!(*log.borrow(), vec!["routine"]);
    }

    #[test]
    fn test_invalid_unit_value() {
        let realm = Realm::new();
        let err = Mixin::try_from_value(&realm, &Value::int(3)).unwrap_err();
        assert!(matches!(err, Error::InvalidBehaviorUnit(_)));
    }

    #[test]
    fn test_unit_from_object_value() {
        let mut realm = Realm::new();
        let hash = realm.create_object();
        realm.set(hash, "name", Value::str("unit"));
        let unit = Mixin::try_from_value(&realm, &Value::object(hash)).unwrap();

        let obj = realm.create_object();
        realm.apply_mixins(obj, &[unit]).unwrap();
        assert_eq!(realm.get(obj, "name"), Value::str("unit"));
    }
}
