//! Router & route compilation (§2 component F, §3 "Route"/"Router", §4.2).

use std::collections::HashMap;
use std::sync::Arc;

use engine_http::Method;

use crate::error::{EngineError, EngineResult};
use crate::middleware::{Invocation, Middleware};
use crate::router::path_params::PathParams;

const URL_SEPARATOR: char = '/';
const CATCH_ALL: &str = "**";

/// A single segment of a compiled route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Component {
    Literal(String),
    Param(String),
    CatchAll,
}

/// (HTTP method, compiled path components) — §3 "Route".
#[derive(Debug, Clone)]
pub struct Route {
    pub method: Method,
    pub components: Vec<Component>,
}

impl Route {
    /// Compile a route from raw string components (§4.2 "Route
    /// compilation"): a component containing the URL separator is split
    /// into multiple components; `:name` becomes a named parameter; a
    /// trailing `**` becomes the catch-all and must be the final component.
    pub fn compile(method: Method, raw_components: &[&str]) -> EngineResult<Self> {
        let mut components = Vec::new();
        for (i, raw) in raw_components.iter().enumerate() {
            for (j, part) in raw.split(URL_SEPARATOR).filter(|p| !p.is_empty()).enumerate() {
                let is_last = i == raw_components.len() - 1 && j == raw.split(URL_SEPARATOR).filter(|p| !p.is_empty()).count() - 1;
                if part == CATCH_ALL {
                    if !is_last {
                        return Err(EngineError::invalid_app_config("catch-all `**` must be the final path component"));
                    }
                    components.push(Component::CatchAll);
                } else if let Some(name) = part.strip_prefix(':') {
                    components.push(Component::Param(name.to_string()));
                } else {
                    components.push(Component::Literal(part.to_string()));
                }
            }
        }
        Ok(Self { method, components })
    }

    /// True if every component is a plain literal (§4.2 "Shadow routes":
    /// GET→HEAD synthesis only applies to all-literal paths).
    pub fn is_all_literal(&self) -> bool {
        self.components.iter().all(|c| matches!(c, Component::Literal(_)))
    }
}

/// An endpoint: a unique name, its declared routes, the invocation, and its
/// ordered endpoint-scoped middlewares (§3 "Endpoint").
pub struct Endpoint {
    pub name: String,
    pub routes: Vec<Route>,
    pub invocation: Invocation,
    pub middlewares: Vec<Arc<dyn Middleware>>,
}

/// What a trie terminal resolves to at dispatch time (§3 "Cached Route").
#[derive(Clone)]
pub struct CachedRoute {
    pub endpoint_name: Arc<str>,
    pub invocation: Invocation,
    pub middlewares: Vec<Arc<dyn Middleware>>,
    /// True for synthesized GET→HEAD or middleware-declared shadow terminals.
    pub is_shadow: bool,
}

#[derive(Default)]
struct TrieNode {
    literal: HashMap<String, TrieNode>,
    param: Option<(String, Box<TrieNode>)>,
    catch_all: Option<Box<TrieNode>>,
    terminals: HashMap<Method, CachedRoute>,
}

impl TrieNode {
    fn child_for(&mut self, component: &Component) -> &mut TrieNode {
        match component {
            Component::Literal(lit) => self.literal.entry(lit.clone()).or_default(),
            Component::Param(name) => {
                if self.param.as_ref().map(|(n, _)| n != name).unwrap_or(false) {
                    // A different param name at the same position is allowed;
                    // the trie only tracks the most recently declared name,
                    // matching the source's single-param-per-position trie.
                }
                &mut self.param.get_or_insert_with(|| (name.clone(), Box::default())).1
            }
            Component::CatchAll => self.catch_all.get_or_insert_with(Box::default),
        }
    }
}

/// A trie over `[method, path-components…]` (§3 "Router").
#[derive(Default)]
pub struct Router {
    root: TrieNode,
    endpoint_names: std::collections::HashSet<String>,
}

/// The result of a successful trie lookup: the matched terminal plus any
/// params captured along the way.
pub struct Matched<'a> {
    pub route: &'a CachedRoute,
    pub params: PathParams,
    /// True when a HEAD request matched via fallback to a GET terminal
    /// rather than a synthesized HEAD shadow route (§4.2): the caller must
    /// discard the response body.
    pub via_head_fallback: bool,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a single compiled route pointing at a cached terminal.
    pub fn insert(&mut self, route: &Route, cached: CachedRoute) -> EngineResult<()> {
        let mut node = &mut self.root;
        for component in &route.components {
            node = node.child_for(component);
        }
        node.terminals.insert(route.method.clone(), cached);
        Ok(())
    }

    /// Register an endpoint's declared routes, plus synthesized shadow
    /// routes (§4.2 "Shadow routes"): a GET route over an all-literal path
    /// gets a HEAD terminal that short-circuits with an empty 200 OK, and
    /// any method a middleware declares via `shadow_route_methods` is
    /// synthesized pointing at an "OK" invocation that still traverses the
    /// middleware chain.
    ///
    /// Endpoint-name uniqueness (§3 invariant: "endpoint names are unique")
    /// is checked once per endpoint here, not per route — an endpoint's
    /// routes (plural, §3 "Endpoint") all share one name.
    pub fn register_endpoint(&mut self, endpoint: &Endpoint) -> EngineResult<()> {
        if !self.endpoint_names.insert(endpoint.name.clone()) {
            return Err(EngineError::forbidden(format!("duplicate endpoint name `{}`", endpoint.name)));
        }

        let endpoint_name: Arc<str> = Arc::from(endpoint.name.as_str());

        for route in &endpoint.routes {
            let cached = CachedRoute {
                endpoint_name: endpoint_name.clone(),
                invocation: endpoint.invocation.clone(),
                middlewares: endpoint.middlewares.clone(),
                is_shadow: false,
            };
            self.insert(route, cached)?;

            if route.method == Method::GET && route.is_all_literal() {
                let head_route = Route { method: Method::HEAD, components: route.components.clone() };
                let head_cached = CachedRoute {
                    endpoint_name: endpoint_name.clone(),
                    invocation: Invocation::Request(Arc::new(crate::router::ok_invocation::OkInvocation)),
                    middlewares: Vec::new(),
                    is_shadow: true,
                };
                self.insert(&head_route, head_cached)?;
            }

            for middleware in &endpoint.middlewares {
                for method in middleware.shadow_route_methods() {
                    let shadow_route = Route { method, components: route.components.clone() };
                    let shadow_cached = CachedRoute {
                        endpoint_name: endpoint_name.clone(),
                        invocation: Invocation::Request(Arc::new(crate::router::ok_invocation::OkInvocation)),
                        middlewares: endpoint.middlewares.clone(),
                        is_shadow: true,
                    };
                    self.insert(&shadow_route, shadow_cached)?;
                }
            }
        }
        Ok(())
    }

    /// Match a request, applying HEAD→GET fallback (§4.2): if no HEAD
    /// terminal exists, fall back to GET's terminal (the caller is
    /// responsible for discarding the response body).
    pub fn find(&self, method: &Method, path: &str) -> Option<Matched<'_>> {
        let segments: Vec<&str> = path.split(URL_SEPARATOR).filter(|s| !s.is_empty()).collect();

        if let Some(matched) = self.find_with_method(method, &segments, false) {
            return Some(matched);
        }
        if *method == Method::HEAD {
            return self.find_with_method(&Method::GET, &segments, true);
        }
        None
    }

    fn find_with_method<'a>(&'a self, method: &Method, segments: &[&str], via_head_fallback: bool) -> Option<Matched<'a>> {
        let mut params = PathParams::new();
        let node = Self::walk(&self.root, segments, &mut params)?;
        let route = node.terminals.get(method)?;
        Some(Matched { route, params, via_head_fallback })
    }

    fn walk<'a>(node: &'a TrieNode, segments: &[&str], params: &mut PathParams) -> Option<&'a TrieNode> {
        match segments.split_first() {
            None => Some(node),
            Some((head, tail)) => {
                if let Some(child) = node.literal.get(*head) {
                    if let Some(found) = Self::walk(child, tail, params) {
                        return Some(found);
                    }
                }
                if let Some((name, child)) = &node.param {
                    let mut speculative = params.clone();
                    speculative.insert(name.clone(), (*head).to_string());
                    if let Some(found) = Self::walk(child, tail, &mut speculative) {
                        *params = speculative;
                        return Some(found);
                    }
                }
                if let Some(catch_all) = &node.catch_all {
                    let mut speculative = params.clone();
                    speculative.set_catch_all(segments.join("/"));
                    return Self::walk(catch_all, &[], &mut speculative).inspect(|_| *params = speculative);
                }
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::RequestHandler;
    use async_trait::async_trait;
    use engine_http::{IntoResponse, Response, StatusCode};

    struct Noop;

    #[async_trait]
    impl RequestHandler for Noop {
        async fn call(&self, _ctx: &mut crate::context::Context) -> Response {
            StatusCode::OK.into_response()
        }
    }

    fn endpoint(name: &str, method: Method, raw: &[&str]) -> Endpoint {
        Endpoint {
            name: name.to_string(),
            routes: vec![Route::compile(method, raw).unwrap()],
            invocation: Invocation::Request(Arc::new(Noop)),
            middlewares: Vec::new(),
        }
    }

    #[test]
    fn matches_literal_path() {
        let mut router = Router::new();
        router.register_endpoint(&endpoint("health", Method::GET, &["health"])).unwrap();
        let matched = router.find(&Method::GET, "/health").unwrap();
        assert_eq!(&*matched.route.endpoint_name, "health");
    }

    #[test]
    fn captures_named_param() {
        let mut router = Router::new();
        router.register_endpoint(&endpoint("get_user", Method::GET, &["users", ":id"])).unwrap();
        let matched = router.find(&Method::GET, "/users/42").unwrap();
        assert_eq!(matched.params.get("id"), Some("42"));
    }

    #[test]
    fn splits_components_containing_separator() {
        let mut router = Router::new();
        router.register_endpoint(&endpoint("nested", Method::GET, &["a/b/c"])).unwrap();
        assert!(router.find(&Method::GET, "/a/b/c").is_some());
    }

    #[test]
    fn catch_all_captures_remaining_tail() {
        let mut router = Router::new();
        router.register_endpoint(&endpoint("files", Method::GET, &["static", "**"])).unwrap();
        let matched = router.find(&Method::GET, "/static/js/app.js").unwrap();
        assert_eq!(matched.params.catch_all(), Some("js/app.js"));
    }

    #[test]
    fn get_synthesizes_head_shadow() {
        let mut router = Router::new();
        router.register_endpoint(&endpoint("health", Method::GET, &["health"])).unwrap();
        let matched = router.find(&Method::HEAD, "/health").unwrap();
        assert!(matched.route.is_shadow);
    }

    #[test]
    fn head_falls_back_to_get_without_shadow() {
        let mut router = Router::new();
        router.register_endpoint(&endpoint("users", Method::GET, &["users", ":id"])).unwrap();
        // No all-literal path, so no HEAD shadow was synthesized; HEAD still
        // resolves via fallback to the GET terminal.
        let matched = router.find(&Method::HEAD, "/users/1").unwrap();
        assert!(!matched.route.is_shadow);
    }

    #[test]
    fn an_endpoint_with_multiple_routes_registers_cleanly() {
        let mut router = Router::new();
        let endpoint = Endpoint {
            name: "items".to_string(),
            routes: vec![
                Route::compile(Method::GET, &["items"]).unwrap(),
                Route::compile(Method::POST, &["items"]).unwrap(),
                Route::compile(Method::GET, &["items", ":id"]).unwrap(),
            ],
            invocation: Invocation::Request(Arc::new(Noop)),
            middlewares: Vec::new(),
        };
        router.register_endpoint(&endpoint).unwrap();

        assert_eq!(&*router.find(&Method::GET, "/items").unwrap().route.endpoint_name, "items");
        assert_eq!(&*router.find(&Method::POST, "/items").unwrap().route.endpoint_name, "items");
        assert_eq!(&*router.find(&Method::GET, "/items/1").unwrap().route.endpoint_name, "items");
    }

    #[test]
    fn duplicate_endpoint_name_is_forbidden() {
        let mut router = Router::new();
        router.register_endpoint(&endpoint("dup", Method::GET, &["a"])).unwrap();
        let err = router.register_endpoint(&endpoint("dup", Method::GET, &["b"])).unwrap_err();
        assert_eq!(err.base_kind().http_status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn unmatched_path_is_none() {
        let router = Router::new();
        assert!(router.find(&Method::GET, "/nope").is_none());
    }
}
