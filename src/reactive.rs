//! Minimal reactive substrate.
//!
//! [`Reactive`] wraps the mutable data root. Every read made through the resolver
//! records the dotted path it touched into the running [`EvalContext`]. An
//! [`Effect`] keeps the paths read by its last run; a mutation marks the effect
//! dirty when the mutated path overlaps one of them (either is a prefix of the
//! other). Dirty effects re-run once per [`Effect::flush`], however many
//! mutations were batched before it.

use log::trace;
use serde_json::{Map, Value};
use std::cell::RefCell;
use std::collections::BTreeSet;
use std::rc::{Rc, Weak};

use crate::context::EvalContext;
use crate::scope::{dependency_path, find_value};

/// Split a dotted path. The empty string addresses the root.
pub fn split_path(path: &str) -> Vec<&str> {
    if path.is_empty() {
        Vec::new()
    } else {
        path.split('.').collect()
    }
}

fn paths_overlap(dependency: &[String], mutated: &[&str]) -> bool {
    dependency.iter().zip(mutated).all(|(d, m)| d == m)
}

// ═══════════════════════════════════════════════════════════════════════════════
// DEPENDENCY SET
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencySet {
    paths: BTreeSet<Vec<String>>,
}

impl DependencySet {
    pub fn record(&mut self, segments: &[&str]) {
        self.paths
            .insert(segments.iter().map(|s| s.to_string()).collect());
    }

    pub fn overlaps(&self, mutated: &[&str]) -> bool {
        self.paths.iter().any(|dep| paths_overlap(dep, mutated))
    }

    pub fn contains(&self, path: &str) -> bool {
        let segments: Vec<String> = split_path(path).into_iter().map(String::from).collect();
        self.paths.contains(&segments)
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// OBSERVABLE
// ═══════════════════════════════════════════════════════════════════════════════

/// Shared mutable cell. Clones observe the same value.
#[derive(Debug, Clone, Default)]
pub struct Observable<T> {
    cell: Rc<RefCell<T>>,
}

impl<T: Clone> Observable<T> {
    pub fn new(value: T) -> Self {
        Self {
            cell: Rc::new(RefCell::new(value)),
        }
    }

    pub fn get(&self) -> T {
        self.cell.borrow().clone()
    }

    pub fn set(&self, value: T) {
        *self.cell.borrow_mut() = value;
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// REACTIVE DATA ROOT
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Default)]
pub(crate) struct EffectState {
    dependencies: DependencySet,
    dirty: bool,
}

#[derive(Debug)]
struct ReactiveInner {
    value: Value,
    version: u64,
    subscribers: Vec<Weak<RefCell<EffectState>>>,
}

/// Mutable JSON data root shared by the compiled tree and its owner.
#[derive(Debug, Clone)]
pub struct Reactive {
    inner: Rc<RefCell<ReactiveInner>>,
}

impl Default for Reactive {
    fn default() -> Self {
        Self::new(Value::Object(Map::new()))
    }
}

impl Reactive {
    pub fn new(value: Value) -> Self {
        Self {
            inner: Rc::new(RefCell::new(ReactiveInner {
                value,
                version: 0,
                subscribers: Vec::new(),
            })),
        }
    }

    pub fn snapshot(&self) -> Value {
        self.inner.borrow().value.clone()
    }

    /// Incremented by every mutation.
    pub fn version(&self) -> u64 {
        self.inner.borrow().version
    }

    /// Untracked read of a dotted path.
    pub fn get(&self, path: &str) -> Option<Value> {
        self.lookup(&split_path(path))
    }

    pub(crate) fn lookup(&self, segments: &[&str]) -> Option<Value> {
        find_value(&self.inner.borrow().value, segments)
    }

    /// Tracked read: records what `segments` depends on for the running evaluation.
    pub(crate) fn read(&self, ctx: &mut EvalContext, segments: &[&str]) -> Option<Value> {
        let inner = self.inner.borrow();
        ctx.record(dependency_path(&inner.value, segments));
        find_value(&inner.value, segments)
    }

    /// Write `value` at a dotted path, creating intermediate objects.
    /// Returns false when the path runs through a scalar or past the end of an array.
    pub fn set(&self, path: &str, value: Value) -> bool {
        let segments = split_path(path);
        let written = {
            let mut inner = self.inner.borrow_mut();
            assign(&mut inner.value, &segments, value)
        };
        if written {
            self.notify(&segments);
        }
        written
    }

    /// Remove the key or array element at a dotted path.
    pub fn remove(&self, path: &str) -> Option<Value> {
        let segments = split_path(path);
        let (last, parents) = segments.split_last()?;
        let removed = {
            let mut inner = self.inner.borrow_mut();
            let mut target = &mut inner.value;
            for segment in parents {
                target = match target {
                    Value::Object(map) => map.get_mut(*segment)?,
                    Value::Array(items) => items.get_mut(segment.parse::<usize>().ok()?)?,
                    _ => return None,
                };
            }
            match target {
                Value::Object(map) => map.shift_remove(*last),
                Value::Array(items) => {
                    let index = last.parse::<usize>().ok()?;
                    (index < items.len()).then(|| items.remove(index))
                }
                _ => None,
            }
        };
        if removed.is_some() {
            self.notify(&segments);
        }
        removed
    }

    /// Replace the whole root. Every subscriber is invalidated.
    pub fn replace(&self, value: Value) {
        self.inner.borrow_mut().value = value;
        self.notify(&[]);
    }

    pub(crate) fn subscribe(&self, state: &Rc<RefCell<EffectState>>) {
        self.inner
            .borrow_mut()
            .subscribers
            .push(Rc::downgrade(state));
    }

    fn notify(&self, segments: &[&str]) {
        let subscribers: Vec<Rc<RefCell<EffectState>>> = {
            let mut inner = self.inner.borrow_mut();
            inner.version += 1;
            inner.subscribers.retain(|weak| weak.strong_count() > 0);
            inner.subscribers.iter().filter_map(Weak::upgrade).collect()
        };
        for state in subscribers {
            let mut state = state.borrow_mut();
            if !state.dirty && state.dependencies.overlaps(segments) {
                trace!("[SchemaNative] mutation at '{}' invalidates effect", segments.join("."));
                state.dirty = true;
            }
        }
    }
}

fn assign(target: &mut Value, segments: &[&str], value: Value) -> bool {
    let Some((head, rest)) = segments.split_first() else {
        *target = value;
        return true;
    };
    match target {
        Value::Array(items) => {
            let Ok(index) = head.parse::<usize>() else {
                return false;
            };
            if index == items.len() {
                items.push(Value::Null);
            }
            match items.get_mut(index) {
                Some(slot) => assign(slot, rest, value),
                None => false,
            }
        }
        Value::Object(map) => {
            let slot = map.entry(head.to_string()).or_insert(Value::Null);
            assign(slot, rest, value)
        }
        Value::Null => {
            *target = Value::Object(Map::new());
            assign(target, segments, value)
        }
        _ => false,
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// EFFECT
// ═══════════════════════════════════════════════════════════════════════════════

/// A tracked computation over a [`Reactive`] root.
///
/// Runs once on construction. Afterwards it re-runs only from [`Effect::flush`],
/// and only if a mutation touched something the previous run read.
pub struct Effect<T> {
    state: Rc<RefCell<EffectState>>,
    run: Box<dyn FnMut(&mut EvalContext) -> T>,
    output: T,
    runs: u64,
}

impl<T> Effect<T> {
    pub fn new(source: &Reactive, mut run: impl FnMut(&mut EvalContext) -> T + 'static) -> Self {
        let state = Rc::new(RefCell::new(EffectState::default()));
        source.subscribe(&state);
        let mut ctx = EvalContext::new();
        let output = run(&mut ctx);
        state.borrow_mut().dependencies = ctx.take_dependencies();
        Self {
            state,
            run: Box::new(run),
            output,
            runs: 1,
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.state.borrow().dirty
    }

    /// Force a re-run on the next flush.
    pub fn invalidate(&self) {
        self.state.borrow_mut().dirty = true;
    }

    /// Re-run if dirty. Returns whether a run happened.
    pub fn flush(&mut self) -> bool {
        if !self.is_dirty() {
            return false;
        }
        let mut ctx = EvalContext::new();
        self.output = (self.run)(&mut ctx);
        debug_assert_eq!(ctx.depth(), 0, "iteration frames leaked out of evaluation");
        let mut state = self.state.borrow_mut();
        state.dependencies = ctx.take_dependencies();
        state.dirty = false;
        self.runs += 1;
        true
    }

    pub fn output(&self) -> &T {
        &self.output
    }

    pub fn runs(&self) -> u64 {
        self.runs
    }

    pub fn dependencies(&self) -> DependencySet {
        self.state.borrow().dependencies.clone()
    }
}
