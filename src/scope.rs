use serde_json::{Map, Value};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::context::{EvalContext, EvalFn, Frame};
use crate::reactive::{split_path, Observable, Reactive};

// ═══════════════════════════════════════════════════════════════════════════════
// SCOPE IDENTIFIERS
// ═══════════════════════════════════════════════════════════════════════════════

static SCOPE_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Identifier of one compiled node's scope. Only the compiler mints these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopeId(u64);

impl ScopeId {
    fn next() -> Self {
        ScopeId(SCOPE_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ScopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "scope_{}", self.0)
    }
}

/// Scope identifiers from the root down to one node.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScopePath(Vec<ScopeId>);

impl ScopePath {
    pub fn root() -> Self {
        Self::default()
    }

    /// This path extended by a freshly allocated identifier.
    pub fn child(&self) -> Self {
        let mut ids = self.0.clone();
        ids.push(ScopeId::next());
        ScopePath(ids)
    }

    pub fn innermost(&self) -> Option<ScopeId> {
        self.0.last().copied()
    }

    pub fn ids(&self) -> &[ScopeId] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// VALUE LOOKUP
// ═══════════════════════════════════════════════════════════════════════════════

fn step<'v>(value: &'v Value, segment: &str) -> Option<&'v Value> {
    match value {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    }
}

fn walk<'v>(candidate: &'v Value, segments: &[&str]) -> Option<&'v Value> {
    segments
        .iter()
        .try_fold(candidate, |current, segment| step(current, segment))
}

/// Path that a read of `segments` from `candidate` depends on. A synthetic
/// `length` depends on the whole collection so that appends and removals reach it.
pub(crate) fn dependency_path<'s, 'a>(candidate: &Value, segments: &'s [&'a str]) -> &'s [&'a str] {
    let Some((last, parents)) = segments.split_last() else {
        return segments;
    };
    if *last != "length" {
        return segments;
    }
    match walk(candidate, parents) {
        Some(Value::Array(_)) | Some(Value::String(_)) => parents,
        _ => segments,
    }
}

/// Walk `segments` from `candidate`.
///
/// The final segment must be present on its parent; a present `null` is found.
/// `length` on an array or string yields its length when no such key exists.
pub fn find_value(candidate: &Value, segments: &[&str]) -> Option<Value> {
    let Some((last, parents)) = segments.split_last() else {
        return Some(candidate.clone());
    };
    let current = walk(candidate, parents)?;
    if let Some(found) = step(current, last) {
        return Some(found.clone());
    }
    match (current, *last) {
        (Value::Array(items), "length") => Some(Value::from(items.len())),
        (Value::String(s), "length") => Some(Value::from(s.chars().count())),
        _ => None,
    }
}

/// Like [`find_value`] with a binding map as the candidate.
pub fn find_in_map(map: &Map<String, Value>, segments: &[&str]) -> Option<Value> {
    let (head, rest) = segments.split_first()?;
    map.get(*head).and_then(|value| find_value(value, rest))
}

// ═══════════════════════════════════════════════════════════════════════════════
// SCOPE STORE
// ═══════════════════════════════════════════════════════════════════════════════

/// `let` bindings keyed by scope identifier.
///
/// Clones share the same storage, so render closures compiled against a store see
/// bindings written after they were built.
#[derive(Debug, Clone, Default)]
pub struct ScopeStore {
    scopes: Rc<RefCell<HashMap<ScopeId, Map<String, Value>>>>,
}

impl ScopeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind one key in the innermost scope of `path`.
    pub fn set(&self, path: &ScopePath, key: &str, value: Value) {
        let Some(id) = path.innermost() else {
            return;
        };
        self.scopes
            .borrow_mut()
            .entry(id)
            .or_default()
            .insert(key.to_string(), value);
    }

    /// Shallow-merge `bindings` into the innermost scope of `path`.
    pub fn merge(&self, path: &ScopePath, bindings: &Map<String, Value>) {
        let Some(id) = path.innermost() else {
            return;
        };
        let mut scopes = self.scopes.borrow_mut();
        let scope = scopes.entry(id).or_default();
        for (key, value) in bindings {
            scope.insert(key.clone(), value.clone());
        }
    }

    pub fn get(&self, id: ScopeId) -> Option<Map<String, Value>> {
        self.scopes.borrow().get(&id).cloned()
    }

    /// Nearest scope on `path` that yields the token.
    pub fn lookup(&self, path: &ScopePath, segments: &[&str]) -> Option<Value> {
        let scopes = self.scopes.borrow();
        path.ids()
            .iter()
            .rev()
            .filter_map(|id| scopes.get(id))
            .filter(|bindings| !bindings.is_empty())
            .find_map(|bindings| find_in_map(bindings, segments))
    }

    pub fn len(&self) -> usize {
        self.scopes.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.scopes.borrow().is_empty()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// RESOLVER
// ═══════════════════════════════════════════════════════════════════════════════

/// Resolves dotted tokens against iteration frames, the scope chain and the data root.
#[derive(Debug, Clone)]
pub struct Resolver {
    store: ScopeStore,
    data: Reactive,
}

impl Resolver {
    pub fn new(store: ScopeStore, data: Reactive) -> Self {
        Self { store, data }
    }

    pub fn store(&self) -> &ScopeStore {
        &self.store
    }

    pub fn data(&self) -> &Reactive {
        &self.data
    }

    /// Lookup order: active iteration frames (innermost first), then the scopes on
    /// `path` (innermost first), then the data root. Only data-root reads are
    /// recorded as dependencies.
    pub fn resolve(&self, ctx: &mut EvalContext, path: &ScopePath, token: &str) -> Option<Value> {
        let segments = split_path(token);
        Self::from_frames(ctx.frames(), &segments)
            .or_else(|| self.resolve_persistent(ctx, path, &segments))
    }

    fn from_frames(frames: &[Frame], segments: &[&str]) -> Option<Value> {
        frames
            .iter()
            .rev()
            .find_map(|frame| find_in_map(frame, segments))
    }

    /// Scope chain, then the data root. Frames are not consulted.
    fn resolve_persistent(
        &self,
        ctx: &mut EvalContext,
        path: &ScopePath,
        segments: &[&str],
    ) -> Option<Value> {
        self.store
            .lookup(path, segments)
            .or_else(|| self.data.read(ctx, segments))
    }

    /// Getter for one token. Frame hits are returned as-is; scope and data hits
    /// become the last known value, which is returned when a later lookup finds
    /// nothing. Starts out `null`.
    pub fn token_getter(&self, path: &ScopePath, token: &str) -> EvalFn {
        let resolver = self.clone();
        let path = path.clone();
        let token = token.to_string();
        let last = Observable::new(Value::Null);
        Rc::new(move |ctx: &mut EvalContext| {
            let segments = split_path(&token);
            if let Some(value) = Self::from_frames(ctx.frames(), &segments) {
                return value;
            }
            if let Some(value) = resolver.resolve_persistent(ctx, &path, &segments) {
                last.set(value);
            }
            last.get()
        })
    }
}
