//! Hierarchical scope trees and the authorization walk over them.
//!
//! A scope tree maps resource path segments to either nested trees, a set of
//! allowed actions, or the wildcard `"*"`. Paths are `:`-separated
//! (`"users:profile"`) and segments compare by exact string equality; the only
//! escape is `"*"`, either as a node value (grant everything below) or as a
//! sibling key consulted when a segment is absent.
//!
//! JSON form:
//! ```json
//! { "users": ["read", "update"], "api": "*", "themes": { "default": "read" } }
//! ```

use std::collections::{BTreeMap, BTreeSet};

use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Deserialize, Serialize, Serializer};

use crate::errors::AuthError;

pub const WILDCARD: &str = "*";
pub const PATH_SEPARATOR: char = ':';

/// One node of a scope tree.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "RawNode")]
pub enum ScopeNode {
    /// Everything at and below this node.
    Wildcard,
    /// A leaf listing the actions allowed on the resource.
    Actions(BTreeSet<String>),
    /// Nested resources keyed by path segment.
    Children(BTreeMap<String, ScopeNode>),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawNode {
    One(String),
    Many(Vec<String>),
    Nested(BTreeMap<String, ScopeNode>),
}

impl From<RawNode> for ScopeNode {
    fn from(raw: RawNode) -> Self {
        match raw {
            RawNode::One(s) if s == WILDCARD => ScopeNode::Wildcard,
            RawNode::One(s) => ScopeNode::Actions(BTreeSet::from([s])),
            RawNode::Many(v) => ScopeNode::Actions(v.into_iter().collect()),
            RawNode::Nested(m) => ScopeNode::Children(m),
        }
    }
}

impl Serialize for ScopeNode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ScopeNode::Wildcard => serializer.serialize_str(WILDCARD),
            ScopeNode::Actions(actions) => {
                let mut seq = serializer.serialize_seq(Some(actions.len()))?;
                for a in actions {
                    seq.serialize_element(a)?;
                }
                seq.end()
            }
            ScopeNode::Children(children) => {
                let mut map = serializer.serialize_map(Some(children.len()))?;
                for (k, v) in children {
                    map.serialize_entry(k, v)?;
                }
                map.end()
            }
        }
    }
}

impl Default for ScopeNode {
    /// The empty tree, which denies everything.
    fn default() -> Self {
        ScopeNode::Children(BTreeMap::new())
    }
}

/// Where a path walk ended up.
enum Reach<'a> {
    /// A wildcard was met on the way; the whole subtree is granted.
    Everything,
    /// The path was fully consumed and landed on this node.
    Node(&'a ScopeNode),
    Denied,
}

fn walk<'a>(root: &'a ScopeNode, segments: &[&str]) -> Reach<'a> {
    let mut node = root;
    for (i, segment) in segments.iter().enumerate() {
        let children = match node {
            ScopeNode::Wildcard => return Reach::Everything,
            // A leaf with path still left to consume.
            ScopeNode::Actions(_) => return Reach::Denied,
            ScopeNode::Children(children) => children,
        };

        match children.get(*segment) {
            Some(ScopeNode::Wildcard) => return Reach::Everything,
            Some(child) if i + 1 == segments.len() => return Reach::Node(child),
            Some(child) => node = child,
            None => {
                return match children.get(WILDCARD) {
                    Some(ScopeNode::Wildcard) => Reach::Everything,
                    Some(ScopeNode::Actions(a)) if a.contains(WILDCARD) => Reach::Everything,
                    _ => Reach::Denied,
                };
            }
        }
    }

    match node {
        ScopeNode::Wildcard => Reach::Everything,
        _ => Reach::Denied,
    }
}

fn split_path(path: &str) -> Option<Vec<&str>> {
    if path.is_empty() {
        return None;
    }
    Some(path.split(PATH_SEPARATOR).collect())
}

/// Does `tree` grant `action` on the resource at `path`?
pub fn authorize(tree: &ScopeNode, path: &str, action: &str) -> bool {
    let Some(segments) = split_path(path) else {
        return false;
    };

    match walk(tree, &segments) {
        Reach::Everything => true,
        Reach::Node(ScopeNode::Actions(actions)) => {
            actions.contains(action) || actions.contains(WILDCARD)
        }
        Reach::Node(_) | Reach::Denied => false,
    }
}

/// `authorize` for a combined `"path:action"` string, split at the last `:`.
pub fn authorize_scope(tree: &ScopeNode, scope: &str) -> bool {
    match scope.rsplit_once(PATH_SEPARATOR) {
        Some((path, action)) if !action.is_empty() => authorize(tree, path, action),
        _ => false,
    }
}

/// Does `tree` grant the entire subtree rooted at `path`?
fn grants_subtree(tree: &ScopeNode, path: &[String]) -> bool {
    if path.is_empty() {
        return matches!(tree, ScopeNode::Wildcard);
    }
    let segments: Vec<&str> = path.iter().map(String::as_str).collect();
    matches!(walk(tree, &segments), Reach::Everything)
}

/// A single grant in a tree: either one action at a path or a whole subtree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Grant {
    Action { path: Vec<String>, action: String },
    Subtree { path: Vec<String> },
}

impl ScopeNode {
    /// Every grant reachable in this tree.
    pub fn leaves(&self) -> Vec<Grant> {
        let mut out = Vec::new();
        collect_leaves(self, &mut Vec::new(), &mut out);
        out
    }

    /// True when every grant in `self` is also granted by `base`.
    ///
    /// A wildcard subtree in `self` needs a wildcard in `base` reached on the
    /// same path; an action set containing `"*"` at the same path does not
    /// cover deeper resources.
    pub fn is_subset_of(&self, base: &ScopeNode) -> bool {
        self.leaves().iter().all(|grant| match grant {
            Grant::Subtree { path } => grants_subtree(base, path),
            Grant::Action { path, action } => {
                // Root-level action sets have no resource path to check.
                !path.is_empty() && authorize(base, &path.join(":"), action)
            }
        })
    }

    /// Build a tree from `"resource:action"` strings, splitting at the last `:`.
    pub fn from_scope_strings<S: AsRef<str>>(scopes: &[S]) -> Result<Self, AuthError> {
        let mut root = BTreeMap::new();
        for raw in scopes {
            let scope = raw.as_ref().trim();
            let (path, action) = scope
                .rsplit_once(PATH_SEPARATOR)
                .filter(|(p, a)| !p.is_empty() && !a.is_empty())
                .ok_or_else(|| AuthError::InvalidScope(scope.to_string()))?;

            let segments: Vec<&str> = path.split(PATH_SEPARATOR).collect();
            if segments.iter().any(|s| s.is_empty()) {
                return Err(AuthError::InvalidScope(scope.to_string()));
            }
            insert_action(&mut root, &segments, action, scope)?;
        }
        Ok(ScopeNode::Children(root))
    }
}

fn insert_action(
    map: &mut BTreeMap<String, ScopeNode>,
    segments: &[&str],
    action: &str,
    scope: &str,
) -> Result<(), AuthError> {
    let (head, rest) = segments
        .split_first()
        .ok_or_else(|| AuthError::InvalidScope(scope.to_string()))?;

    if rest.is_empty() {
        let entry = map
            .entry(head.to_string())
            .or_insert_with(|| ScopeNode::Actions(BTreeSet::new()));
        return match entry {
            ScopeNode::Actions(actions) => {
                actions.insert(action.to_string());
                Ok(())
            }
            _ => Err(AuthError::InvalidScope(scope.to_string())),
        };
    }

    let entry = map
        .entry(head.to_string())
        .or_insert_with(|| ScopeNode::Children(BTreeMap::new()));
    match entry {
        ScopeNode::Children(children) => insert_action(children, rest, action, scope),
        _ => Err(AuthError::InvalidScope(scope.to_string())),
    }
}

fn collect_leaves(node: &ScopeNode, path: &mut Vec<String>, out: &mut Vec<Grant>) {
    match node {
        ScopeNode::Wildcard => out.push(Grant::Subtree { path: path.clone() }),
        ScopeNode::Actions(actions) => {
            for action in actions {
                out.push(Grant::Action {
                    path: path.clone(),
                    action: action.clone(),
                });
            }
        }
        ScopeNode::Children(children) => {
            for (segment, child) in children {
                path.push(segment.clone());
                collect_leaves(child, path, out);
                path.pop();
            }
        }
    }
}

// ── Tests ───────────────────────────────────────────────────────
