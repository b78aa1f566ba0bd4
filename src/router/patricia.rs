//! Radix-compressed trie over dynamic route patterns.
//!
//! Unlike [`super::static_trie::StaticTrie`], edges here carry a *segment
//! kind* rather than always being a literal string: a run of consecutive
//! [`RouteSegment::Static`] segments compresses onto one edge exactly like
//! the static trie, but `Param`, `Wildcard`, and `CatchAll` segments are
//! always singleton edges, since each one binds (or consumes) exactly one
//! position in the path.
//!
//! A node's children are keyed by *kind*, not by a parameter's bound name:
//! `/users/:id` and `/users/:slug` registered at the same structural
//! position share one child node (whichever pattern registers first wins
//! the bound name). This keeps one `Param` slot, one `Wildcard` slot, and
//! one `CatchAll` slot per node, alongside as many `Static` children as
//! there are distinct literal first segments.
//!
//! Matching descends depth-first, preferring `Static` children over `Param`
//! over `Wildcard` over `CatchAll` at every node — the same specificity
//! order used to break ties when more than one child could match — and
//! backtracks to the next-most-specific kind on a dead end.

use std::collections::HashMap;

use crate::Method;
use crate::router::HandlerId;
use crate::router::pattern::RouteSegment;

/// A successful patricia match: the handler to invoke and the parameters
/// captured while descending to it.
pub struct PatriciaHit {
    pub handler_id: HandlerId,
    pub params: HashMap<String, String>,
}

/// Outcome of matching a path against the patricia trie.
pub enum PatriciaMatch {
    Hit(PatriciaHit),
    Miss,
}

/// One edge out of a node: either a compressed run of static segments, or a
/// singleton dynamic segment.
#[derive(Debug, Clone)]
enum Edge {
    Static(Vec<String>),
    Param(String),
    Wildcard(Option<String>),
    CatchAll(String),
}

impl Edge {
    /// The dispatch key used to find this edge among a node's children.
    /// Static edges are keyed by their first literal segment; the three
    /// dynamic kinds each get one fixed key, so a node can hold at most one
    /// child of each dynamic kind regardless of bound name.
    fn key(&self) -> String {
        match self {
            Edge::Static(segments) => format!("s:{}", segments[0]),
            Edge::Param(_) => "p:".to_string(),
            Edge::Wildcard(_) => "w:".to_string(),
            Edge::CatchAll(_) => "c:".to_string(),
        }
    }
}

fn segment_key(segment: &RouteSegment) -> String {
    match segment {
        RouteSegment::Static(s) => format!("s:{s}"),
        RouteSegment::Param(_) => "p:".to_string(),
        RouteSegment::Wildcard(_) => "w:".to_string(),
        RouteSegment::CatchAll(_) => "c:".to_string(),
    }
}

/// A node's children, stored as a sorted-by-insertion small `Vec` below the
/// migration threshold and as a `HashMap` above it.
///
/// Migration is one-way: once a node promotes to `Large` it never demotes
/// back to `Small`, even if children are later removed (removal is not part
/// of this trie's contract — routes are replaced in place, never deleted).
#[derive(Debug)]
enum Children {
    Small(Vec<Node>),
    Large(HashMap<String, Node>),
}

impl Default for Children {
    fn default() -> Self {
        Children::Small(Vec::new())
    }
}

impl Children {
    fn get(&self, key: &str) -> Option<&Node> {
        match self {
            Children::Small(v) => v.iter().find(|n| n.edge.key() == key),
            Children::Large(m) => m.get(key),
        }
    }

    fn get_mut(&mut self, key: &str) -> Option<&mut Node> {
        match self {
            Children::Small(v) => v.iter_mut().find(|n| n.edge.key() == key),
            Children::Large(m) => m.get_mut(key),
        }
    }

    fn insert(&mut self, node: Node, threshold: usize) {
        match self {
            Children::Small(v) => {
                v.push(node);
                if v.len() > threshold {
                    let promoted = v.drain(..).map(|n| (n.edge.key(), n)).collect();
                    *self = Children::Large(promoted);
                }
            }
            Children::Large(m) => {
                m.insert(node.edge.key(), node);
            }
        }
    }

    fn find_static(&self, text: &str) -> Option<&Node> {
        self.get(&format!("s:{text}"))
    }

    fn find_param(&self) -> Option<&Node> {
        self.get("p:")
    }

    fn find_wildcard(&self) -> Option<&Node> {
        self.get("w:")
    }

    fn find_catchall(&self) -> Option<&Node> {
        self.get("c:")
    }
}

#[derive(Debug)]
struct Node {
    edge: Edge,
    children: Children,
    routes: Vec<(Method, HandlerId)>,
}

impl Node {
    fn new(edge: Edge) -> Self {
        Self {
            edge,
            children: Children::default(),
            routes: Vec::new(),
        }
    }
}

/// Radix-compressed trie over dynamic (non-fully-static) route patterns.
#[derive(Debug)]
pub struct PatriciaMatcher {
    root: Node,
    /// Number of children a node may hold in its small-vec representation
    /// before migrating to a hash map. Configurable via
    /// `router.small_children_threshold` (default 4).
    small_children_threshold: usize,
}

impl Default for PatriciaMatcher {
    fn default() -> Self {
        Self::new(4)
    }
}

impl PatriciaMatcher {
    /// Creates an empty matcher with the given small/large migration threshold.
    pub fn new(small_children_threshold: usize) -> Self {
        Self {
            root: Node::new(Edge::Static(vec![String::new()])),
            small_children_threshold,
        }
    }

    /// Registers `handler_id` for `method` at the given (already-validated,
    /// non-fully-static) pattern segments.
    pub fn insert(&mut self, segments: &[RouteSegment], method: Method, handler_id: HandlerId) {
        // The synthetic root edge above is never matched against — descend
        // straight into the real tree rooted at its (empty) children.
        insert_into(&mut self.root, segments, method, handler_id, self.small_children_threshold);
    }

    /// Matches `segments` against the trie for `method`.
    pub fn match_route(&self, segments: &[&str], method: &Method) -> PatriciaMatch {
        let mut params = HashMap::new();
        match match_node(&self.root, segments, method, &mut params) {
            Some(handler_id) => PatriciaMatch::Hit(PatriciaHit { handler_id, params }),
            None => PatriciaMatch::Miss,
        }
    }

    /// Collects every method registered at a path, regardless of whether any
    /// of them is the method actually being looked up — used to build a
    /// `405`'s `Allow` header when `match_route` misses.
    pub fn allowed_methods(&self, segments: &[&str]) -> Vec<Method> {
        let mut out = Vec::new();
        collect_methods(&self.root, segments, &mut out);
        out
    }
}

fn common_prefix_static<'a>(existing: &[String], remaining: &[&'a str]) -> usize {
    existing
        .iter()
        .zip(remaining.iter())
        .take_while(|(a, b)| a.as_str() == **b)
        .count()
}

/// Splits `child`'s static edge at `shared` segments, the same way
/// `static_trie::split_child` does: the shared prefix stays on `child`, and
/// everything after it (including `child`'s own children and routes) moves
/// onto a newly demoted node beneath it.
fn split_static_edge(child: &mut Node, shared: usize) {
    let Edge::Static(segments) = &mut child.edge else {
        unreachable!("split_static_edge called on a non-static edge");
    };
    let suffix = segments.split_off(shared);
    let mut demoted = Node::new(Edge::Static(suffix));
    std::mem::swap(&mut demoted.children, &mut child.children);
    std::mem::swap(&mut demoted.routes, &mut child.routes);
    child.children = Children::default();
    child.children.insert(demoted, usize::MAX); // never promotes on this single insert
}

fn upsert_route(node: &mut Node, method: Method, handler_id: HandlerId) {
    if let Some(entry) = node.routes.iter_mut().find(|(m, _)| *m == method) {
        entry.1 = handler_id;
    } else {
        node.routes.push((method, handler_id));
    }
}

fn insert_into(
    node: &mut Node,
    remaining: &[RouteSegment],
    method: Method,
    handler_id: HandlerId,
    threshold: usize,
) {
    let Some(first) = remaining.first() else {
        upsert_route(node, method, handler_id);
        return;
    };

    let key = segment_key(first);
    if node.children.get(&key).is_some() {
        let child = node.children.get_mut(&key).expect("checked above");
        match &child.edge {
            Edge::Static(existing) => {
                // Only compare the leading static run; stop the prefix scan
                // at the first non-static segment so `shared` never crosses
                // a kind boundary.
                let static_run: Vec<&str> = remaining
                    .iter()
                    .take_while(|s| matches!(s, RouteSegment::Static(_)))
                    .map(|s| match s {
                        RouteSegment::Static(s) => s.as_str(),
                        _ => unreachable!("take_while guarantees Static"),
                    })
                    .collect();
                let shared = common_prefix_static(existing, &static_run);
                if shared < existing.len() {
                    split_static_edge(child, shared);
                }
                insert_into(child, &remaining[shared..], method, handler_id, threshold);
            }
            Edge::Param(_) | Edge::Wildcard(_) => {
                insert_into(child, &remaining[1..], method, handler_id, threshold);
            }
            Edge::CatchAll(_) => {
                // Catch-all is always terminal; the pattern parser
                // guarantees nothing follows it.
                upsert_route(child, method, handler_id);
            }
        }
    } else {
        let new_child = build_chain(remaining, method, handler_id, threshold);
        node.children.insert(new_child, threshold);
    }
}

/// Builds a brand-new chain of nodes for `segments` with no existing tree to
/// splice into, attaching `handler_id` at the terminal node.
fn build_chain(segments: &[RouteSegment], method: Method, handler_id: HandlerId, threshold: usize) -> Node {
    let first = &segments[0];
    let (edge, consumed) = match first {
        RouteSegment::Static(_) => {
            let run: Vec<String> = segments
                .iter()
                .take_while(|s| matches!(s, RouteSegment::Static(_)))
                .map(|s| match s {
                    RouteSegment::Static(s) => s.clone(),
                    _ => unreachable!(),
                })
                .collect();
            let len = run.len();
            (Edge::Static(run), len)
        }
        RouteSegment::Param(name) => (Edge::Param(name.clone()), 1),
        RouteSegment::Wildcard(name) => (Edge::Wildcard(name.clone()), 1),
        RouteSegment::CatchAll(name) => (Edge::CatchAll(name.clone()), 1),
    };

    let mut node = Node::new(edge);
    if consumed == segments.len() {
        upsert_route(&mut node, method, handler_id);
    } else {
        let child = build_chain(&segments[consumed..], method, handler_id, threshold);
        node.children.insert(child, threshold);
    }
    node
}

fn match_node(
    node: &Node,
    remaining: &[&str],
    method: &Method,
    params: &mut HashMap<String, String>,
) -> Option<HandlerId> {
    if remaining.is_empty() {
        return node
            .routes
            .iter()
            .find(|(m, _)| m == method)
            .map(|(_, id)| *id);
    }

    if let Some(child) = node.children.find_static(remaining[0]) {
        if let Edge::Static(segs) = &child.edge {
            if remaining.len() >= segs.len() && segs.iter().zip(remaining.iter()).all(|(a, b)| a == b) {
                if let Some(hit) = match_node(child, &remaining[segs.len()..], method, params) {
                    return Some(hit);
                }
            }
        }
    }

    if let Some(child) = node.children.find_param() {
        if let Edge::Param(name) = &child.edge {
            if !remaining[0].is_empty() {
                params.insert(name.clone(), remaining[0].to_string());
                if let Some(hit) = match_node(child, &remaining[1..], method, params) {
                    return Some(hit);
                }
                params.remove(name);
            }
        }
    }

    if let Some(child) = node.children.find_wildcard() {
        if let Edge::Wildcard(name) = &child.edge {
            if !remaining[0].is_empty() {
                if let Some(name) = name {
                    params.insert(name.clone(), remaining[0].to_string());
                }
                if let Some(hit) = match_node(child, &remaining[1..], method, params) {
                    return Some(hit);
                }
                if let Some(name) = name {
                    params.remove(name);
                }
            }
        }
    }

    if let Some(child) = node.children.find_catchall() {
        if let Edge::CatchAll(name) = &child.edge {
            if let Some((_, id)) = child.routes.iter().find(|(m, _)| m == method) {
                params.insert(name.clone(), remaining.join("/"));
                return Some(*id);
            }
        }
    }

    None
}

fn collect_methods(node: &Node, remaining: &[&str], out: &mut Vec<Method>) {
    if remaining.is_empty() {
        for (m, _) in &node.routes {
            if !out.contains(m) {
                out.push(m.clone());
            }
        }
        return;
    }

    if let Some(child) = node.children.find_static(remaining[0]) {
        if let Edge::Static(segs) = &child.edge {
            if remaining.len() >= segs.len() && segs.iter().zip(remaining.iter()).all(|(a, b)| a == b) {
                collect_methods(child, &remaining[segs.len()..], out);
            }
        }
    }
    if let Some(child) = node.children.find_param() {
        if !remaining[0].is_empty() {
            collect_methods(child, &remaining[1..], out);
        }
    }
    if let Some(child) = node.children.find_wildcard() {
        if !remaining[0].is_empty() {
            collect_methods(child, &remaining[1..], out);
        }
    }
    if let Some(child) = node.children.find_catchall() {
        for (m, _) in &child.routes {
            if !out.contains(m) {
                out.push(m.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::pattern::RoutePattern;

    fn segs(pattern: &str) -> Vec<RouteSegment> {
        RoutePattern::parse(pattern).unwrap().segments().to_vec()
    }

    fn path_segs(path: &str) -> Vec<&str> {
        path.split('/').filter(|s| !s.is_empty()).collect()
    }

    #[test]
    fn param_capture() {
        let mut trie = PatriciaMatcher::default();
        trie.insert(&segs("/users/:id"), Method::Get, 1);
        let p = path_segs("/users/42");
        match trie.match_route(&p, &Method::Get) {
            PatriciaMatch::Hit(hit) => {
                assert_eq!(hit.handler_id, 1);
                assert_eq!(hit.params.get("id"), Some(&"42".to_string()));
            }
            PatriciaMatch::Miss => panic!("expected hit"),
        }
    }

    #[test]
    fn catch_all_joins_remaining_segments() {
        let mut trie = PatriciaMatcher::default();
        trie.insert(&segs("/files/**rest"), Method::Get, 1);
        let p = path_segs("/files/a/b/c");
        match trie.match_route(&p, &Method::Get) {
            PatriciaMatch::Hit(hit) => assert_eq!(hit.params.get("rest"), Some(&"a/b/c".to_string())),
            PatriciaMatch::Miss => panic!("expected hit"),
        }
    }

    #[test]
    fn wildcard_matches_exactly_one_segment() {
        let mut trie = PatriciaMatcher::default();
        trie.insert(&segs("/files/*"), Method::Get, 1);
        assert!(matches!(
            trie.match_route(&path_segs("/files/readme.txt"), &Method::Get),
            PatriciaMatch::Hit(_)
        ));
        assert!(matches!(
            trie.match_route(&path_segs("/files/a/b"), &Method::Get),
            PatriciaMatch::Miss
        ));
    }

    #[test]
    fn named_wildcard_captures_segment() {
        let mut trie = PatriciaMatcher::default();
        trie.insert(&segs("/files/*slug"), Method::Get, 1);
        match trie.match_route(&path_segs("/files/readme.txt"), &Method::Get) {
            PatriciaMatch::Hit(hit) => {
                assert_eq!(hit.params.get("slug"), Some(&"readme.txt".to_string()))
            }
            PatriciaMatch::Miss => panic!("expected hit"),
        }
    }

    #[test]
    fn empty_segment_cannot_bind_param() {
        let mut trie = PatriciaMatcher::default();
        trie.insert(&segs("/users/:id/x"), Method::Get, 1);
        // "/users//x" canonicalizes to segments ["users", "x"] upstream, but
        // if an empty segment ever reached here directly it must not bind.
        assert!(matches!(
            trie.match_route(&["users", "", "x"], &Method::Get),
            PatriciaMatch::Miss
        ));
    }

    #[test]
    fn two_params_same_position_share_node_first_name_wins() {
        let mut trie = PatriciaMatcher::default();
        trie.insert(&segs("/users/:id"), Method::Get, 1);
        trie.insert(&segs("/users/:slug"), Method::Post, 2);
        match trie.match_route(&path_segs("/users/42"), &Method::Get) {
            PatriciaMatch::Hit(hit) => assert_eq!(hit.params.get("id"), Some(&"42".to_string())),
            PatriciaMatch::Miss => panic!("expected hit"),
        }
        match trie.match_route(&path_segs("/users/42"), &Method::Post) {
            PatriciaMatch::Hit(hit) => {
                // First-bound name ("id") wins even though this route was
                // registered as ":slug".
                assert_eq!(hit.params.get("id"), Some(&"42".to_string()));
            }
            PatriciaMatch::Miss => panic!("expected hit"),
        }
    }

    #[test]
    fn static_beats_param_at_same_position() {
        let mut trie = PatriciaMatcher::default();
        trie.insert(&segs("/users/:id"), Method::Get, 1);
        trie.insert(&segs("/users/profile"), Method::Get, 2);
        match trie.match_route(&path_segs("/users/profile"), &Method::Get) {
            PatriciaMatch::Hit(hit) => assert_eq!(hit.handler_id, 2),
            PatriciaMatch::Miss => panic!("expected hit"),
        }
        match trie.match_route(&path_segs("/users/42"), &Method::Get) {
            PatriciaMatch::Hit(hit) => assert_eq!(hit.handler_id, 1),
            PatriciaMatch::Miss => panic!("expected hit"),
        }
    }

    #[test]
    fn small_to_large_migration_preserves_lookups() {
        let mut trie = PatriciaMatcher::new(4);
        for i in 0..10 {
            trie.insert(&segs(&format!("/r{i}/:id")), Method::Get, i as u64);
        }
        for i in 0..10 {
            let path = format!("/r{i}/42");
            match trie.match_route(&path_segs(&path), &Method::Get) {
                PatriciaMatch::Hit(hit) => assert_eq!(hit.handler_id, i as u64),
                PatriciaMatch::Miss => panic!("expected hit for {path}"),
            }
        }
    }

    #[test]
    fn allowed_methods_reports_other_registered_methods() {
        let mut trie = PatriciaMatcher::default();
        trie.insert(&segs("/users/:id"), Method::Get, 1);
        trie.insert(&segs("/users/:id"), Method::Post, 2);
        let methods = trie.allowed_methods(&path_segs("/users/42"));
        assert!(methods.contains(&Method::Get));
        assert!(methods.contains(&Method::Post));
    }

    #[test]
    fn shared_static_prefix_with_divergent_dynamic_tail() {
        let mut trie = PatriciaMatcher::default();
        trie.insert(&segs("/api/v1/users/:id"), Method::Get, 1);
        trie.insert(&segs("/api/v1/posts/:id"), Method::Get, 2);
        match trie.match_route(&path_segs("/api/v1/users/7"), &Method::Get) {
            PatriciaMatch::Hit(hit) => assert_eq!(hit.handler_id, 1),
            PatriciaMatch::Miss => panic!("expected hit"),
        }
        match trie.match_route(&path_segs("/api/v1/posts/7"), &Method::Get) {
            PatriciaMatch::Hit(hit) => assert_eq!(hit.handler_id, 2),
            PatriciaMatch::Miss => panic!("expected hit"),
        }
    }
}
