//! Compressed trie over fully-static route patterns.
//!
//! Every edge holds a compressed run of whole path segments (the same way a
//! radix tree compresses characters, but at segment granularity), so a chain
//! of single-child static segments like `/api/v1/users` collapses onto one
//! edge instead of three separate trie levels. Children of a node are kept
//! in a `Vec` sorted by their edge's first segment, so descending the trie is
//! a binary search rather than a hash lookup — cache-friendlier for the
//! typically small fan-out of a real route table.
//!
//! Handler ids are stored per `Method` at the node a pattern's segments
//! terminate on, so `GET /users` and `POST /users` share the same node.

use std::cmp::Ordering;

use crate::Method;
use crate::error::DispatchError;
use crate::router::HandlerId;

/// Outcome of matching a path against the static trie.
pub enum StaticMatch {
    /// The path and method both matched a registered route.
    Hit(HandlerId),
    /// The path matched a registered route, but not for this method. Carries
    /// the methods that *are* registered at this path, for a `405`'s `Allow`
    /// header.
    MethodNotAllowed(Vec<Method>),
    /// No registered route has this path at all.
    Miss,
}

#[derive(Debug)]
struct Node {
    /// The compressed run of static segments this edge represents, e.g.
    /// `["api", "v1", "users"]` for a collapsed `/api/v1/users` chain.
    segments: Vec<String>,
    /// Children, sorted by `children[i].segments[0]` for binary search.
    children: Vec<Node>,
    /// Handlers registered at this exact node, one per method. Linear-scanned
    /// since a single path rarely registers more than a handful of methods.
    routes: Vec<(Method, HandlerId)>,
}

impl Node {
    fn leaf(segments: Vec<String>) -> Self {
        Self {
            segments,
            children: Vec::new(),
            routes: Vec::new(),
        }
    }

    fn child_search_key<'a>(&self, first: &'a str) -> Result<usize, usize> {
        self.children
            .binary_search_by(|child| child.segments[0].as_str().cmp(first))
    }
}

/// Compressed trie over fully-static route patterns.
#[derive(Debug, Default)]
pub struct StaticTrie {
    root: Node,
}

impl StaticTrie {
    /// Creates an empty trie.
    pub fn new() -> Self {
        Self {
            root: Node::leaf(Vec::new()),
        }
    }

    /// Registers `handler_id` for `method` at the fully-static path made up
    /// of `segments` (already split, already validated as all-`Static` by
    /// the caller).
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::CapacityExceeded`] only in the degenerate
    /// case of a node accumulating an unreasonable number of method entries;
    /// in practice this never triggers for real route tables.
    pub fn insert(
        &mut self,
        segments: &[String],
        method: Method,
        handler_id: HandlerId,
    ) -> Result<(), DispatchError> {
        insert_into(&mut self.root, segments, method, handler_id)
    }

    /// Matches `segments` against the trie for `method`.
    pub fn match_route(&self, segments: &[&str], method: &Method) -> StaticMatch {
        match_node(&self.root, segments, method)
    }

    /// Returns `true` if any route (any method) is registered at this exact
    /// static path.
    pub fn has_path(&self, segments: &[&str]) -> bool {
        find_terminal(&self.root, segments).is_some()
    }

    /// Returns every method registered at this exact static path, regardless
    /// of which method the caller ultimately wants — used to build a `405`'s
    /// `Allow` header.
    pub fn methods_at(&self, segments: &[&str]) -> Vec<Method> {
        find_terminal(&self.root, segments)
            .map(|node| node.routes.iter().map(|(m, _)| m.clone()).collect())
            .unwrap_or_default()
    }

    /// Collects every registered `(path, method)` pair, for `Router::list_routes`.
    pub fn list_routes(&self) -> Vec<(String, Method)> {
        let mut out = Vec::new();
        collect(&self.root, String::new(), &mut out);
        out
    }
}

fn common_prefix_len(a: &[String], b: &[&str]) -> usize {
    a.iter()
        .zip(b.iter())
        .take_while(|(x, y)| x.as_str() == **y)
        .count()
}

fn insert_into(
    node: &mut Node,
    remaining: &[String],
    method: Method,
    handler_id: HandlerId,
) -> Result<(), DispatchError> {
    if remaining.is_empty() {
        if let Some(entry) = node.routes.iter_mut().find(|(m, _)| *m == method) {
            entry.1 = handler_id;
        } else {
            node.routes.push((method, handler_id));
        }
        return Ok(());
    }

    let remaining_borrowed: Vec<&str> = remaining.iter().map(String::as_str).collect();
    match node.child_search_key(remaining_borrowed[0]) {
        Ok(idx) => {
            let child = &mut node.children[idx];
            let shared = common_prefix_len(&child.segments, &remaining_borrowed);

            if shared == child.segments.len() {
                insert_into(child, &remaining[shared..], method, handler_id)
            } else {
                split_child(child, shared);
                insert_into(child, &remaining[shared..], method, handler_id)
            }
        }
        Err(insert_at) => {
            let mut leaf = Node::leaf(remaining.to_vec());
            insert_into(&mut leaf, &[], method, handler_id)?;
            node.children.insert(insert_at, leaf);
            Ok(())
        }
    }
}

/// Splits `child`'s edge at `shared` segments, inserting a new intermediate
/// node that owns the shared prefix and demotes the original child (now
/// holding only the suffix) beneath it.
fn split_child(child: &mut Node, shared: usize) {
    let suffix = child.segments.split_off(shared);
    let mut demoted = Node::leaf(suffix);
    std::mem::swap(&mut demoted.children, &mut child.children);
    std::mem::swap(&mut demoted.routes, &mut child.routes);
    child.children = vec![demoted];
}

fn match_node(node: &Node, remaining: &[&str], method: &Method) -> StaticMatch {
    match find_terminal(node, remaining) {
        Some(terminal) => {
            if let Some((_, id)) = terminal.routes.iter().find(|(m, _)| m == method) {
                StaticMatch::Hit(*id)
            } else if terminal.routes.is_empty() {
                StaticMatch::Miss
            } else {
                StaticMatch::MethodNotAllowed(
                    terminal.routes.iter().map(|(m, _)| m.clone()).collect(),
                )
            }
        }
        None => StaticMatch::Miss,
    }
}

fn find_terminal<'a>(node: &'a Node, remaining: &[&str]) -> Option<&'a Node> {
    if remaining.is_empty() {
        return Some(node);
    }

    let idx = node.child_search_key(remaining[0]).ok()?;
    let child = &node.children[idx];
    let shared = common_prefix_len(&child.segments, remaining);
    if shared != child.segments.len() {
        return None;
    }
    find_terminal(child, &remaining[shared..])
}

fn collect(node: &Node, prefix: String, out: &mut Vec<(String, Method)>) {
    let full = if node.segments.is_empty() {
        prefix.clone()
    } else {
        format!("{prefix}/{}", node.segments.join("/"))
    };

    for (method, _) in &node.routes {
        let path = if full.is_empty() { "/".to_string() } else { full.clone() };
        out.push((path, method.clone()));
    }

    for child in &node.children {
        collect(child, full.clone(), out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segs(path: &str) -> Vec<String> {
        path.split('/')
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }

    fn segs_ref(v: &[String]) -> Vec<&str> {
        v.iter().map(String::as_str).collect()
    }

    #[test]
    fn insert_and_match_exact() {
        let mut trie = StaticTrie::new();
        trie.insert(&segs("/users"), Method::Get, 1).unwrap();
        let s = segs("/users");
        assert!(matches!(
            trie.match_route(&segs_ref(&s), &Method::Get),
            StaticMatch::Hit(1)
        ));
    }

    #[test]
    fn miss_on_unregistered_path() {
        let mut trie = StaticTrie::new();
        trie.insert(&segs("/users"), Method::Get, 1).unwrap();
        let s = segs("/posts");
        assert!(matches!(
            trie.match_route(&segs_ref(&s), &Method::Get),
            StaticMatch::Miss
        ));
    }

    #[test]
    fn method_not_allowed_when_path_matches_other_method() {
        let mut trie = StaticTrie::new();
        trie.insert(&segs("/users"), Method::Get, 1).unwrap();
        let s = segs("/users");
        match trie.match_route(&segs_ref(&s), &Method::Post) {
            StaticMatch::MethodNotAllowed(methods) => assert_eq!(methods, vec![Method::Get]),
            _ => panic!("expected MethodNotAllowed"),
        }
    }

    #[test]
    fn shared_prefix_splits_into_compressed_edges() {
        let mut trie = StaticTrie::new();
        trie.insert(&segs("/api/v1/users"), Method::Get, 1).unwrap();
        trie.insert(&segs("/api/v1/posts"), Method::Get, 2).unwrap();
        trie.insert(&segs("/api/v2/users"), Method::Get, 3).unwrap();

        let a = segs("/api/v1/users");
        let b = segs("/api/v1/posts");
        let c = segs("/api/v2/users");
        assert!(matches!(trie.match_route(&segs_ref(&a), &Method::Get), StaticMatch::Hit(1)));
        assert!(matches!(trie.match_route(&segs_ref(&b), &Method::Get), StaticMatch::Hit(2)));
        assert!(matches!(trie.match_route(&segs_ref(&c), &Method::Get), StaticMatch::Hit(3)));
    }

    #[test]
    fn insert_prefix_of_existing_path() {
        let mut trie = StaticTrie::new();
        trie.insert(&segs("/api/v1/users"), Method::Get, 1).unwrap();
        trie.insert(&segs("/api"), Method::Get, 2).unwrap();

        let a = segs("/api");
        let b = segs("/api/v1/users");
        assert!(matches!(trie.match_route(&segs_ref(&a), &Method::Get), StaticMatch::Hit(2)));
        assert!(matches!(trie.match_route(&segs_ref(&b), &Method::Get), StaticMatch::Hit(1)));
    }

    #[test]
    fn second_method_same_path_shares_node() {
        let mut trie = StaticTrie::new();
        trie.insert(&segs("/users"), Method::Get, 1).unwrap();
        trie.insert(&segs("/users"), Method::Post, 2).unwrap();
        let s = segs("/users");
        assert!(matches!(trie.match_route(&segs_ref(&s), &Method::Get), StaticMatch::Hit(1)));
        assert!(matches!(trie.match_route(&segs_ref(&s), &Method::Post), StaticMatch::Hit(2)));
    }

    #[test]
    fn has_path_ignores_method() {
        let mut trie = StaticTrie::new();
        trie.insert(&segs("/users"), Method::Get, 1).unwrap();
        let s = segs("/users");
        assert!(trie.has_path(&segs_ref(&s)));
        let other = segs("/other");
        assert!(!trie.has_path(&segs_ref(&other)));
    }
}
