//! Groups with attachable group methods.
//!
//! A [`MethodGroup`] keeps an [`ElementRecord`] for each member in an arena,
//! and an arena handle next to each position of the collection. The record
//! holds the member's identifier and its handler for every
//! group method attached while it was a member. Calling a group method runs
//! each member's own handler in collection order.
//!
//! Members added after a method was attached have no handler for it, and a
//! call fails at the first such member. Handlers for the members before it
//! have already run by then.

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use arcstr::ArcStr;
use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{json_kind, Group};
use crate::arena::{Arena, Index};
use crate::error::{Error, Result};
use crate::id::{ElementId, IdScope, Ids, DEFAULT_ID_LEN};

/// A group method implementation for one element.
///
/// Receives the group the call was made on, the element, and the caller's
/// arguments.
pub type Handler<T, A> = Rc<dyn Fn(&Group<T>, &T, &A)>;

/// Wraps a closure as a [`Handler`].
pub fn handler<T, A, F>(f: F) -> Handler<T, A>
where
    F: Fn(&Group<T>, &T, &A) + 'static,
{
    Rc::new(f)
}

/// Per-element data kept alongside group membership.
pub struct ElementRecord<T, A> {
    element: T,
    id: ElementId,
    handlers: HashMap<ArcStr, Handler<T, A>>,
}

impl<T, A> ElementRecord<T, A> {
    pub fn id(&self) -> &ElementId {
        &self.id
    }

    pub fn element(&self) -> &T {
        &self.element
    }

    /// Returns `true` if this element has a handler for `method`.
    pub fn handles(&self, method: &str) -> bool {
        self.handlers.contains_key(method)
    }
}

impl<T: fmt::Debug, A> fmt::Debug for ElementRecord<T, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ElementRecord")
            .field("element", &self.element)
            .field("id", &self.id)
            .field("handlers", &self.handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Settings for a [`MethodGroup`].
#[derive(Clone, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GroupOptions {
    /// Length of generated element identifiers.
    pub id_len: usize,
    /// Registry element identifiers are drawn from.
    pub id_scope: IdScope,
}

impl Default for GroupOptions {
    fn default() -> Self {
        Self {
            id_len: DEFAULT_ID_LEN,
            id_scope: IdScope::Global,
        }
    }
}

impl GroupOptions {
    pub fn id_len(mut self, id_len: usize) -> Self {
        self.id_len = id_len;
        self
    }

    pub fn id_scope(mut self, id_scope: IdScope) -> Self {
        self.id_scope = id_scope;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.id_len == 0 {
            return Err(Error::InvalidIdLength);
        }
        Ok(())
    }
}

/// A [`Group`] whose members carry identifiers and per-member handlers for
/// attached group methods.
///
/// `A` is the argument type passed through a group method call.
pub struct MethodGroup<T, A> {
    group: Group<T>,
    records: Arena<ElementRecord<T, A>>,
    // Parallel to `group.collection`. Equal elements share a handle.
    handles: Vec<Index>,
    methods: IndexSet<ArcStr>,
    ids: Ids,
    options: GroupOptions,
}

impl<T: Clone + PartialEq, A> MethodGroup<T, A> {
    /// Creates a group from a copy of `collection`, then attaches each of
    /// `methods` in order.
    pub fn create<I, M, N>(collection: I, methods: M) -> Self
    where
        I: IntoIterator<Item = T>,
        M: IntoIterator<Item = (N, Handler<T, A>)>,
        N: Into<ArcStr>,
    {
        let mut group = Self::empty(GroupOptions::default());
        group.extend(collection);
        for (name, handler) in methods {
            group.attach_handler(name.into(), handler);
        }
        group
    }

    /// Creates an empty group with the given options.
    pub fn with_options(options: GroupOptions) -> Result<Self> {
        options.validate()?;
        Ok(Self::empty(options))
    }

    fn empty(options: GroupOptions) -> Self {
        MethodGroup {
            group: Group::default(),
            records: Arena::new(),
            handles: Vec::new(),
            methods: IndexSet::new(),
            ids: Ids::new(options.id_scope),
            options,
        }
    }

    fn admit(&mut self, element: &T) -> Result<Index> {
        let id = self.ids.issue(self.options.id_len)?;
        let record = ElementRecord {
            element: element.clone(),
            id: id.clone(),
            handlers: HashMap::new(),
        };
        let idx = self.records.insert(record).map_err(|_| Error::ArenaFull)?;
        tracing::trace!(%id, handle = ?idx, "admitted element");
        Ok(idx)
    }

    fn position(&self, element: &T) -> Option<usize> {
        self.group.collection.iter().position(|x| x == element)
    }

    /// Appends `item` unless an equal element is already present. Fails if
    /// no identifier can be issued for it.
    pub fn try_add(&mut self, item: T) -> Result<&mut Self> {
        if !self.group.contains(&item) {
            let idx = self.admit(&item)?;
            self.group.collection.push(item);
            self.handles.push(idx);
        }
        Ok(self)
    }

    /// Appends `item` unless an equal element is already present.
    ///
    /// New members get no handlers for methods attached before they joined.
    /// If the element cannot be given an identifier, it is skipped and a
    /// warning is logged.
    pub fn add(&mut self, item: T) -> &mut Self {
        if let Err(err) = self.try_add(item) {
            tracing::warn!(%err, "element not added to group");
        }
        self
    }

    /// Removes the first element equal to `item`. Its record is dropped
    /// once no equal element is left.
    pub fn remove(&mut self, item: &T) -> &mut Self {
        if let Some(pos) = self.position(item) {
            self.group.collection.remove(pos);
            let idx = self.handles.remove(pos);
            if !self.handles.contains(&idx) {
                if let Some(record) = self.records.remove(idx) {
                    tracing::trace!(id = %record.id, "dropped element record");
                }
            }
        }
        self
    }

    /// Replaces every element with `transform(element)`, in order.
    ///
    /// A mapped element equal to one the group already had keeps that
    /// element's record, with its identifier and handlers. Any other mapped
    /// element is a new member: it gets a fresh identifier and no handlers.
    /// Records of elements no longer present are dropped.
    pub fn map<F>(&mut self, transform: F) -> &mut Self
    where
        F: FnMut(T) -> T,
    {
        self.group.map(transform);
        let mapped = std::mem::take(&mut self.group.collection);
        let mut collection = Vec::with_capacity(mapped.len());
        let mut handles = Vec::with_capacity(mapped.len());
        for element in mapped {
            let known = self
                .records
                .iter()
                .find(|(_, record)| record.element == element)
                .map(|(idx, _)| idx);
            let idx = match known {
                Some(idx) => idx,
                None => match self.admit(&element) {
                    Ok(idx) => idx,
                    Err(err) => {
                        tracing::warn!(%err, "mapped element dropped from group");
                        continue;
                    }
                },
            };
            collection.push(element);
            handles.push(idx);
        }

        let stale = self
            .records
            .iter()
            .map(|(idx, _)| idx)
            .filter(|idx| !handles.contains(idx))
            .collect::<Vec<_>>();
        for idx in stale {
            if let Some(record) = self.records.remove(idx) {
                tracing::trace!(id = %record.id, "dropped element record");
            }
        }
        self.group.collection = collection;
        self.handles = handles;
        tracing::debug!(members = self.records.len(), "remapped element records");
        self
    }

    /// Attaches `method` as a group method, installing `implementation` as
    /// the handler of every current member.
    pub fn attach_method<N, F>(&mut self, method: N, implementation: F) -> &mut Self
    where
        N: Into<ArcStr>,
        F: Fn(&Group<T>, &T, &A) + 'static,
    {
        self.attach_handler(method.into(), Rc::new(implementation))
    }

    /// Like [`MethodGroup::attach_method`], for an existing [`Handler`].
    pub fn attach_handler(&mut self, method: ArcStr, handler: Handler<T, A>) -> &mut Self {
        for (_, record) in self.records.iter_mut() {
            record.handlers.insert(method.clone(), handler.clone());
        }
        tracing::debug!(%method, members = self.records.len(), "attached group method");
        self.methods.insert(method);
        self
    }

    /// Calls group method `method` with `args`: runs every member's handler,
    /// in collection order.
    ///
    /// Stops at the first member without a handler for `method` and returns
    /// [`Error::MissingHandler`].
    pub fn call(&self, method: &str, args: &A) -> Result<&Self> {
        if !self.methods.contains(method) {
            return Err(Error::UnknownMethod(method.into()));
        }
        for (element, idx) in self.group.iter().zip(&self.handles) {
            self.dispatch(method, *idx, element, args)?;
        }
        Ok(self)
    }

    /// Runs the handler of a single member for group method `method`.
    pub fn invoke(&self, method: &str, element: &T, args: &A) -> Result<()> {
        if !self.methods.contains(method) {
            return Err(Error::UnknownMethod(method.into()));
        }
        let pos = self.position(element).ok_or(Error::NotAMember)?;
        self.dispatch(method, self.handles[pos], element, args)
    }

    fn dispatch(&self, method: &str, idx: Index, element: &T, args: &A) -> Result<()> {
        let record = self.records.get(idx).ok_or(Error::NotAMember)?;
        match record.handlers.get(method) {
            Some(handler) => {
                handler(&self.group, element, args);
                Ok(())
            }
            None => {
                tracing::warn!(%method, id = %record.id, "member has no handler for group method");
                Err(Error::MissingHandler {
                    method: method.into(),
                    id: record.id.clone(),
                })
            }
        }
    }

    /// The record of the member equal to `element`, if any.
    pub fn record(&self, element: &T) -> Option<&ElementRecord<T, A>> {
        let pos = self.position(element)?;
        self.records.get(self.handles[pos])
    }

    pub fn id_of(&self, element: &T) -> Option<&ElementId> {
        self.record(element).map(ElementRecord::id)
    }

    /// Returns `true` if `element` is a member with a handler for `method`.
    pub fn has_handler(&self, element: &T, method: &str) -> bool {
        self.record(element)
            .map(|record| record.handles(method))
            .unwrap_or(false)
    }

    pub fn contains(&self, item: &T) -> bool {
        self.group.contains(item)
    }
}

impl<T, A> MethodGroup<T, A> {
    /// Runs `action` on every element, in order.
    pub fn for_each<F>(&self, action: F) -> &Self
    where
        F: FnMut(&T),
    {
        self.group.for_each(action);
        self
    }

    /// Returns a copy of the current elements.
    pub fn to_vec(&self) -> Vec<T>
    where
        T: Clone,
    {
        self.group.to_vec()
    }

    /// Names of attached group methods, in attachment order.
    pub fn methods(&self) -> impl Iterator<Item = &str> {
        self.methods.iter().map(ArcStr::as_str)
    }

    pub fn group(&self) -> &Group<T> {
        &self.group
    }

    pub fn options(&self) -> &GroupOptions {
        &self.options
    }

    pub fn len(&self) -> usize {
        self.group.len()
    }

    pub fn is_empty(&self) -> bool {
        self.group.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.group.iter()
    }

    pub fn version(&self) -> &'static str {
        self.group.version()
    }
}

impl<A> MethodGroup<Value, A> {
    /// Creates a group from the items of a JSON array. Any other JSON value
    /// gives an empty group.
    pub fn from_json(value: Value) -> Self {
        match value {
            Value::Array(items) => items.into_iter().collect(),
            other => {
                tracing::debug!(kind = json_kind(&other), "ignoring non-array group input");
                Self::empty(GroupOptions::default())
            }
        }
    }
}

impl<T: Clone + PartialEq, A> Default for MethodGroup<T, A> {
    fn default() -> Self {
        Self::empty(GroupOptions::default())
    }
}

impl<T: Clone + PartialEq, A> FromIterator<T> for MethodGroup<T, A> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut group = Self::default();
        group.extend(iter);
        group
    }
}

impl<T: Clone + PartialEq, A> Extend<T> for MethodGroup<T, A> {
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        for item in iter {
            self.add(item);
        }
    }
}

impl<T: fmt::Debug, A> fmt::Debug for MethodGroup<T, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodGroup")
            .field("group", &self.group)
            .field("records", &self.records)
            .field("handles", &self.handles)
            .field("methods", &self.methods)
            .field("options", &self.options)
            .finish()
    }
}

#[cfg(test)]
mod test {
    use std::cell::RefCell;

    use serde_json::json;
    use test_log::test;

    use super::*;

    type Calls = Rc<RefCell<Vec<(String, String)>>>;

    fn recorder(calls: &Calls) -> Handler<&'static str, &'static str> {
        let calls = calls.clone();
        handler(move |_: &Group<&'static str>, el: &&'static str, suffix: &&'static str| {
            calls.borrow_mut().push((el.to_string(), suffix.to_string()));
        })
    }

    fn pairs(calls: &Calls) -> Vec<(String, String)> {
        calls.borrow().clone()
    }

    fn pair(a: &str, b: &str) -> (String, String) {
        (a.to_string(), b.to_string())
    }

    #[test]
    fn greet_fans_out_in_order() {
        let calls = Calls::default();
        let group = MethodGroup::create(["a", "b"], [("greet", recorder(&calls))]);
        group.call("greet", &"!").unwrap();
        assert_eq!(pairs(&calls), vec![pair("a", "!"), pair("b", "!")]);
        assert_eq!(group.methods().collect::<Vec<_>>(), vec!["greet"]);
    }

    #[test]
    fn late_member_aborts_call() {
        let calls = Calls::default();
        let mut group = MethodGroup::create(["a", "b"], [("greet", recorder(&calls))]);
        group.add("c");
        assert!(!group.has_handler(&"c", "greet"));

        let err = group.call("greet", &"?").unwrap_err();
        assert_eq!(
            err,
            Error::MissingHandler {
                method: "greet".into(),
                id: group.id_of(&"c").unwrap().clone(),
            }
        );
        assert_eq!(pairs(&calls), vec![pair("a", "?"), pair("b", "?")]);
    }

    #[test]
    fn late_member_first_stops_everything() {
        let calls = Calls::default();
        let mut group = MethodGroup::create(["b"], [("greet", recorder(&calls))]);
        group.remove(&"b").add("c").add("b");
        assert!(group.call("greet", &"!").is_err());
        assert!(pairs(&calls).is_empty());
    }

    #[test]
    fn reattach_covers_late_members() {
        let calls = Calls::default();
        let mut group = MethodGroup::create(["a"], [("greet", recorder(&calls))]);
        group.add("b").attach_handler("greet".into(), recorder(&calls));
        group.call("greet", &"").unwrap();
        assert_eq!(pairs(&calls), vec![pair("a", ""), pair("b", "")]);
        assert_eq!(group.methods().count(), 1);
    }

    #[test]
    fn unknown_method() {
        let group: MethodGroup<u32, ()> = [1, 2].into_iter().collect();
        assert_eq!(
            group.call("nope", &()).unwrap_err(),
            Error::UnknownMethod("nope".into())
        );
        assert_eq!(
            group.invoke("nope", &1, &()).unwrap_err(),
            Error::UnknownMethod("nope".into())
        );
    }

    #[test]
    fn invoke_single_member() {
        let calls = Calls::default();
        let group = MethodGroup::create(["a", "b"], [("greet", recorder(&calls))]);
        group.invoke("greet", &"b", &"hi").unwrap();
        assert_eq!(pairs(&calls), vec![pair("b", "hi")]);
        assert_eq!(group.invoke("greet", &"z", &"hi"), Err(Error::NotAMember));
    }

    #[test]
    fn handler_sees_group() {
        let totals = Rc::new(RefCell::new(Vec::new()));
        let mut group = MethodGroup::<u32, u32>::create(vec![1, 2, 3], Vec::<(&str, _)>::new());
        let seen = totals.clone();
        group.attach_method("sum", move |g: &Group<u32>, el: &u32, k: &u32| {
            seen.borrow_mut().push(g.iter().sum::<u32>() + el * k);
        });
        group.call("sum", &10).unwrap();
        assert_eq!(*totals.borrow(), vec![16, 26, 36]);
    }

    #[test]
    fn records_follow_membership() {
        let mut group: MethodGroup<&str, ()> = MethodGroup::default();
        group.add("a").add("b").add("a");
        assert_eq!(group.records.len(), 2);
        assert!(group.id_of(&"a").is_some());

        let first = group.id_of(&"a").cloned().unwrap();
        let old = group.handles[0];
        group.remove(&"a");
        assert_eq!(group.records.len(), 1);
        assert_eq!(group.handles.len(), 1);
        assert!(group.id_of(&"a").is_none());
        assert!(group.record(&"a").is_none());
        assert!(group.records.get(old).is_none());

        // The freed slot is reused, but the old handle stays dead
        group.add("a");
        let second = group.id_of(&"a").cloned().unwrap();
        assert_ne!(first, second);
        assert_ne!(group.handles[1], old);
        assert!(group.records.get(old).is_none());
        assert_eq!(group.to_vec(), vec!["b", "a"]);
    }

    #[test]
    fn ids_are_distinct_across_groups() {
        let a: MethodGroup<u32, ()> = (0..100).collect();
        let b: MethodGroup<u32, ()> = (0..100).collect();
        let ids = (0..100)
            .flat_map(|i| [a.id_of(&i).cloned(), b.id_of(&i).cloned()])
            .collect::<std::collections::HashSet<_>>();
        assert_eq!(ids.len(), 200);
    }

    #[test]
    fn identity_map_keeps_records() {
        let hits = Rc::new(RefCell::new(0));
        let mut group: MethodGroup<u32, ()> = vec![1, 2].into_iter().collect();
        let counter = hits.clone();
        group.attach_method("ping", move |_: &Group<u32>, _: &u32, _: &()| {
            *counter.borrow_mut() += 1;
        });
        let before = group.id_of(&1).cloned();

        group.map(|x| x);
        assert_eq!(group.id_of(&1).cloned(), before);
        group.call("ping", &()).unwrap();
        assert_eq!(*hits.borrow(), 2);
    }

    #[test]
    fn map_keeps_known_records_and_admits_new_ones() {
        let calls = Calls::default();
        let mut group = MethodGroup::create(["a", "b"], [("greet", recorder(&calls))]);
        let a = group.id_of(&"a").cloned().unwrap();
        let b = group.id_of(&"b").cloned().unwrap();

        group.map(|el| if el == "b" { "c" } else { el });
        assert_eq!(group.to_vec(), vec!["a", "c"]);
        assert_eq!(group.records.len(), 2);
        assert_eq!(group.id_of(&"a"), Some(&a));
        assert!(group.has_handler(&"a", "greet"));
        assert!(!group.has_handler(&"c", "greet"));
        assert_ne!(group.id_of(&"c"), Some(&b));

        assert_eq!(
            group.call("greet", &"!").map(|_| ()),
            Err(Error::MissingHandler {
                method: "greet".into(),
                id: group.id_of(&"c").cloned().unwrap(),
            })
        );
        assert_eq!(pairs(&calls), vec![pair("a", "!")]);
    }

    #[test]
    fn equal_mapped_elements_share_a_record() {
        let mut group: MethodGroup<u32, ()> = vec![1, 2, 3].into_iter().collect();
        group.attach_method("ping", |_: &Group<u32>, _: &u32, _: &()| {});
        let one = group.id_of(&1).cloned().unwrap();

        group.map(|x| x % 2);
        assert_eq!(group.to_vec(), vec![1, 0, 1]);
        assert_eq!(group.records.len(), 2);
        assert_eq!(group.handles[0], group.handles[2]);

        // One equal element is left, so the record stays
        group.remove(&1);
        assert_eq!(group.to_vec(), vec![0, 1]);
        assert_eq!(group.id_of(&1), Some(&one));
        assert!(group.has_handler(&1, "ping"));
        assert_eq!(group.records.len(), 2);

        group.remove(&1);
        assert_eq!(group.to_vec(), vec![0]);
        assert!(group.id_of(&1).is_none());
        assert_eq!(group.records.len(), 1);
    }

    #[test]
    fn scoped_short_ids_exhaust() {
        let options = GroupOptions::default()
            .id_len(1)
            .id_scope(IdScope::Scoped);
        let mut group: MethodGroup<u32, ()> = MethodGroup::with_options(options).unwrap();
        group.extend(0..70);
        assert_eq!(group.len(), 62);
        assert!(!group.contains(&65));
        assert_eq!(
            group.try_add(65).map(|_| ()),
            Err(Error::IdSpaceExhausted { length: 1 })
        );
        // Duplicates are still a no-op rather than an error
        assert!(group.try_add(3).is_ok());
    }

    #[test]
    fn invalid_options() {
        let result = MethodGroup::<u32, ()>::with_options(GroupOptions::default().id_len(0));
        assert_eq!(result.map(|_| ()), Err(Error::InvalidIdLength));
    }

    #[test]
    fn options_from_partial_config() {
        let options: GroupOptions = serde_json::from_value(json!({ "id_scope": "scoped" })).unwrap();
        assert_eq!(options.id_len, DEFAULT_ID_LEN);
        assert_eq!(options.id_scope, IdScope::Scoped);
    }

    #[test]
    fn from_json() {
        let group = MethodGroup::<Value, ()>::from_json(json!([{"x": 1}, "y", {"x": 1}]));
        assert_eq!(group.to_vec(), vec![json!({"x": 1}), json!("y")]);
        assert!(group.id_of(&json!("y")).is_some());

        let group = MethodGroup::<Value, ()>::from_json(json!({"x": 1}));
        assert!(group.is_empty());
        assert_eq!(group.options(), &GroupOptions::default());
    }
}
