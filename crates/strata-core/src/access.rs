//! Observable property access
//!
//! Thin accessor layer over raw slots: [`Realm::set_prop`] brackets the
//! write with `beforechange:<key>` and `change:<key>` triggers, and the
//! dotted-path walkers let callers (and the watcher annotation) reach
//! nested objects.

use crate::events::event_name;
use crate::realm::{ObjectId, Realm};
use crate::value::Value;
use crate::Result;

impl Realm {
    /// Walk a '.'-separated path from `obj`, reading each segment through
    /// the prototype chain. `Undefined` as soon as a segment is missing or
    /// not an object.
    pub fn get_path(&self, obj: ObjectId, path: &str) -> Value {
        let mut cur = Value::object(obj);
        for seg in path.split('.').filter(|s| !s.is_empty() && *s != "*") {
            let Some(o) = cur.as_object() else {
                return Value::Undefined;
            };
            cur = self.get(o, seg);
        }
        cur
    }

    /// Write a slot observably: triggers `beforechange:<key>`, writes, then
    /// triggers `change:<key>` with `(object, key)` as event data.
    pub fn set_prop(&mut self, obj: ObjectId, key: &str, value: Value) -> Result<()> {
        let data = [Value::object(obj), Value::str(key)];
        self.trigger(obj, &event_name(&["beforechange", key]), &data)?;
        self.set(obj, key, value);
        self.trigger(obj, &event_name(&["change", key]), &data)?;
        Ok(())
    }

    /// Observable write at the end of a dotted path; a no-op if any
    /// intermediate segment fails to resolve to an object.
    pub fn set_path(&mut self, obj: ObjectId, path: &str, value: Value) -> Result<()> {
        let (parent_path, key) = match path.rsplit_once('.') {
            Some((parent, key)) => (Some(parent), key),
            None => (None, path),
        };
        let target = match parent_path {
            Some(p) => self.get_path(obj, p),
            None => Value::object(obj),
        };
        match target.as_object() {
            Some(o) => self.set_prop(o, key, value),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{Binding, Method};
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn test_get_path() {
        let mut realm = Realm::new();
        let person = realm.create_object();
        let address = realm.create_object();
        realm.set(person, "address", Value::object(address));
        realm.set(address, "street", Value::str("4388 El Camino Real"));

        assert_eq!(
            realm.get_path(person, "address.street"),
            Value::str("4388 El Camino Real")
        );
        assert_eq!(realm.get_path(person, "address.city"), Value::Undefined);
        assert_eq!(realm.get_path(person, "missing.street"), Value::Undefined);
    }

    #[test]
    fn test_set_prop_triggers_change_events() {
        let mut realm = Realm::new();
        let obj = realm.create_object();
        let log = Rc::new(RefCell::new(Vec::new()));
        let before = {
            let log = log.clone();
            realm.register_fn(move |_realm, _inv| {
                log.borrow_mut().push("before");
                Ok(Value::Undefined)
            })
        };
        let after = {
            let log = log.clone();
            realm.register_fn(move |_realm, _inv| {
                log.borrow_mut().push("after");
                Ok(Value::Undefined)
            })
        };

        realm
            .bind(
                obj,
                Binding::new("beforechange:street", Method::Direct(Value::function(before)))
                    .immediate(),
            )
            .unwrap();
        realm
            .bind(
                obj,
                Binding::new("change:street", Method::Direct(Value::function(after)))
                    .immediate(),
            )
            .unwrap();

        realm
            .set_prop(obj, "street", Value::str("123 Main St."))
            .unwrap();
        assert_eq!(*log.borrow(), vec!["before", "after"]);
        assert_eq!(realm.get(obj, "street"), Value::str("123 Main St."));
    }

    #[test]
    fn test_set_path_writes_nested_slot() {
        let mut realm = Realm::new();
        let person = realm.create_object();
        let address = realm.create_object();
        realm.set(person, "address", Value::object(address));

        realm
            .set_path(person, "address.street", Value::str("123 Main St."))
            .unwrap();
        assert_eq!(realm.get(address, "street"), Value::str("123 Main St."));

        // Unresolvable parent path is a quiet no-op
        realm
            .set_path(person, "missing.street", Value::str("x"))
            .unwrap();
    }
}
