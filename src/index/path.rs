//! Discrimination trie over term shapes.
//!
//! Each node keys its children by an atom value, the variable marker or
//! the generic-list marker; a list is keyed by its operator atom when it
//! has one. Nodes record both the ids whose root path passes through
//! them and the ids terminating at each key, so queries can collect
//! whole subtrees cheaply.
//!
//! All three queries over-approximate: callers filter the returned ids
//! with `unify`/`match_terms`. Index operations never fail; missing keys
//! simply contribute nothing.

use rustc_hash::FxHashMap;
use smol_str::SmolStr;

use crate::base::Name;
use crate::term::{Term, TermKind};

/// Child key for one term position.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum PathKey {
    Atom(Name),
    Var,
    List,
}

fn key_of(term: &Term) -> PathKey {
    match term.kind() {
        TermKind::Atom(name) => PathKey::Atom(name.clone()),
        TermKind::Var(_) => PathKey::Var,
        TermKind::List(_) => match term.operator() {
            Some(op) => PathKey::Atom(op.clone()),
            None => PathKey::List,
        },
    }
}

#[derive(Debug, Default)]
struct PathNode {
    children: FxHashMap<PathKey, PathNode>,
    /// Ids whose path passes through this node.
    ids_below: Vec<SmolStr>,
    /// Ids terminating at this node's key.
    ids_here: Vec<SmolStr>,
}

impl PathNode {
    fn is_empty(&self) -> bool {
        self.children.is_empty() && self.ids_below.is_empty() && self.ids_here.is_empty()
    }

    fn collect_all(&self, out: &mut Vec<SmolStr>) {
        out.extend(self.ids_here.iter().cloned());
        out.extend(self.ids_below.iter().cloned());
    }

    fn collect_subtree(&self, out: &mut Vec<SmolStr>) {
        self.collect_all(out);
        for child in self.children.values() {
            child.collect_subtree(out);
        }
    }
}

fn push_unique(list: &mut Vec<SmolStr>, id: &SmolStr) {
    if !list.contains(id) {
        list.push(id.clone());
    }
}

fn remove_id(list: &mut Vec<SmolStr>, id: &str) {
    list.retain(|existing| existing != id);
}

/// Path index over assertion kifs.
#[derive(Debug, Default)]
pub struct PathIndex {
    root: PathNode,
}

impl PathIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index `term` under `id`.
    pub fn add(&mut self, term: &Term, id: &SmolStr) {
        add_rec(&mut self.root, term, id);
    }

    /// Remove `id`'s paths for `term`, pruning empty sub-nodes.
    pub fn remove(&mut self, term: &Term, id: &str) {
        remove_rec(&mut self.root, term, id);
    }

    /// Ids that may unify with `query`. Over-approximates.
    pub fn find_unifiable(&self, query: &Term) -> Vec<SmolStr> {
        let mut out = Vec::new();
        unifiable_rec(&self.root, query, &mut out);
        dedup(&mut out);
        out
    }

    /// Ids whose terms may be instances of `pattern`. Over-approximates.
    pub fn find_instances(&self, pattern: &Term) -> Vec<SmolStr> {
        let mut out = Vec::new();
        if pattern.is_var() {
            self.root.collect_subtree(&mut out);
        } else if let Some(child) = self.root.children.get(&key_of(pattern)) {
            child.collect_subtree(&mut out);
        }
        dedup(&mut out);
        out
    }

    /// Ids whose terms may generalize `query`. Over-approximates.
    pub fn find_generalizations(&self, query: &Term) -> Vec<SmolStr> {
        let mut out = Vec::new();
        generalizations_rec(&self.root, query, &mut out);
        dedup(&mut out);
        out
    }

    /// Every id terminating under the given root operator.
    pub fn ids_with_operator(&self, operator: &Name) -> Vec<SmolStr> {
        let mut out = Vec::new();
        if let Some(child) = self.root.children.get(&PathKey::Atom(operator.clone())) {
            child.collect_subtree(&mut out);
        }
        dedup(&mut out);
        out
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_empty()
    }
}

fn dedup(out: &mut Vec<SmolStr>) {
    let mut seen = rustc_hash::FxHashSet::default();
    out.retain(|id| seen.insert(id.clone()));
}

fn add_rec(node: &mut PathNode, term: &Term, id: &SmolStr) {
    let child = node.children.entry(key_of(term)).or_default();
    push_unique(&mut child.ids_here, id);
    if let Some(items) = term.items() {
        push_unique(&mut child.ids_below, id);
        for item in items {
            add_rec(child, item, id);
        }
    }
}

fn remove_rec(node: &mut PathNode, term: &Term, id: &str) {
    let key = key_of(term);
    if let Some(child) = node.children.get_mut(&key) {
        remove_id(&mut child.ids_here, id);
        if let Some(items) = term.items() {
            remove_id(&mut child.ids_below, id);
            for item in items {
                remove_rec(child, item, id);
            }
        }
        if child.is_empty() {
            node.children.remove(&key);
        }
    }
}

fn unifiable_rec(node: &PathNode, query: &Term, out: &mut Vec<SmolStr>) {
    // A variable in the index matches anything.
    if let Some(child) = node.children.get(&PathKey::Var) {
        child.collect_subtree(out);
    }
    match query.kind() {
        TermKind::Var(_) => {
            for child in node.children.values() {
                child.collect_subtree(out);
            }
        }
        TermKind::Atom(_) | TermKind::List(_) => {
            if query.is_list() {
                if let Some(child) = node.children.get(&PathKey::List) {
                    child.collect_subtree(out);
                }
            }
            if let Some(child) = node.children.get(&key_of(query)) {
                child.collect_subtree(out);
            }
        }
    }
}

fn generalizations_rec(node: &PathNode, query: &Term, out: &mut Vec<SmolStr>) {
    if let Some(child) = node.children.get(&PathKey::Var) {
        out.extend(child.ids_here.iter().cloned());
    }
    if query.is_list() {
        if let Some(child) = node.children.get(&PathKey::List) {
            out.extend(child.ids_here.iter().cloned());
        }
    }
    if let Some(child) = node.children.get(&key_of(query)) {
        out.extend(child.ids_here.iter().cloned());
        if let Some(items) = query.items() {
            for item in items {
                generalizations_rec(child, item, out);
            }
        }
    }
}
