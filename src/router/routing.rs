//! Route table.
//!
//! Maps a method and a path onto a handler, extracting `:param` segments and
//! a trailing `/*` wildcard. The table also answers schema lookups for the
//! context's `validate`.

use crate::handler::Handler;
use crate::router::validation::Schema;
use hyper::Method;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Route parameters or query values by name.
pub type Params = HashMap<String, String>;

/// Name under which a trailing wildcard is captured.
pub const WILDCARD: &str = "*";

/// A route entry that maps a path template to a handler.
pub struct Route {
    /// HTTP method for this route.
    pub method: Method,
    /// Route path template (e.g., "/petBy/:id").
    pub path: String,
    /// Route priority (higher = more priority).
    pub priority: u32,
    /// Whether the route is enabled.
    pub enabled: bool,
    /// Body schema consulted by `validate`.
    pub schema: Option<Schema>,
    handler: Arc<dyn Handler>,
}

impl Route {
    /// Create a new route.
    pub fn new(method: Method, path: impl Into<String>, handler: impl Handler + 'static) -> Self {
        Self {
            method,
            path: path.into(),
            priority: 0,
            enabled: true,
            schema: None,
            handler: Arc::new(handler),
        }
    }

    /// Set the route priority.
    pub fn priority(mut self, priority: u32) -> Self {
        self.priority = priority;
        self
    }

    /// Set the enabled state.
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Attach a validation schema.
    pub fn schema(mut self, schema: Schema) -> Self {
        self.schema = Some(schema);
        self
    }

    pub fn handler(&self) -> Arc<dyn Handler> {
        self.handler.clone()
    }

    /// Match the request and extract its path parameters.
    pub fn match_path(&self, method: &Method, path: &str) -> Option<Params> {
        if !self.enabled || self.method != *method {
            return None;
        }

        let mut params = Params::new();
        if let Some(prefix) = self.path.strip_suffix("/*") {
            let rest = path.strip_prefix(prefix)?;
            if !(rest.is_empty() || rest.starts_with('/')) {
                return None;
            }
            params.insert(WILDCARD.to_string(), rest.trim_start_matches('/').to_string());
            return Some(params);
        }

        let route_segments: Vec<&str> = self.path.split('/').collect();
        let path_segments: Vec<&str> = path.split('/').collect();
        if route_segments.len() != path_segments.len() {
            return None;
        }

        for (route, actual) in route_segments.iter().zip(path_segments.iter()) {
            match route.strip_prefix(':') {
                Some(name) if !actual.is_empty() => {
                    params.insert(name.to_string(), actual.to_string());
                }
                Some(_) => return None,
                None if route == actual => {}
                None => return None,
            }
        }
        Some(params)
    }

    /// Check if this route matches the given method and path.
    pub fn matches(&self, method: &Method, path: &str) -> bool {
        self.match_path(method, path).is_some()
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("method", &self.method)
            .field("path", &self.path)
            .field("priority", &self.priority)
            .field("enabled", &self.enabled)
            .field("schema", &self.schema.is_some())
            .finish()
    }
}

/// A matched route with its parameters.
#[derive(Debug, Clone)]
pub struct RouteMatch {
    pub route: Arc<Route>,
    pub params: Params,
}

/// Route table built at startup and shared read-only afterwards.
#[derive(Debug, Default)]
pub struct RouteTable {
    routes: Vec<Arc<Route>>,
}

impl RouteTable {
    /// Create a new route table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a route to the table.
    pub fn add(&mut self, route: Route) {
        self.routes.push(Arc::new(route));
        // Sort by priority (highest first); stable, so insertion order breaks ties
        self.routes.sort_by(|a, b| b.priority.cmp(&a.priority));
    }

    /// Find a matching route for the given method and path.
    pub fn find(&self, method: &Method, path: &str) -> Option<RouteMatch> {
        self.routes.iter().find_map(|route| {
            route.match_path(method, path).map(|params| RouteMatch {
                route: route.clone(),
                params,
            })
        })
    }

    /// List all routes.
    pub fn list(&self) -> &[Arc<Route>] {
        &self.routes
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

/// Supplies the validation schema for a method and route template.
pub trait SchemaLookup: Send + Sync {
    fn schema(&self, method: &Method, path: &str) -> Option<&Schema>;
}

impl SchemaLookup for RouteTable {
    fn schema(&self, method: &Method, path: &str) -> Option<&Schema> {
        self.routes
            .iter()
            .find(|route| route.method == *method && route.path == path)
            .and_then(|route| route.schema.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;
    use crate::handler::{handler, HandlerFuture};
    use crate::router::validation::{FieldSchema, FieldType};

    fn noop(_ctx: &mut Context) -> HandlerFuture<'_> {
        Box::pin(async { Ok(()) })
    }

    fn route(method: Method, path: &str) -> Route {
        Route::new(method, path, handler(noop))
    }

    #[test]
    fn test_route_exact_match() {
        let route = route(Method::GET, "/pets");

        assert!(route.matches(&Method::GET, "/pets"));
        assert!(!route.matches(&Method::POST, "/pets"));
        assert!(!route.matches(&Method::GET, "/pets/1"));
    }

    #[test]
    fn test_route_param_match() {
        let route = route(Method::GET, "/petBy/:id");

        let params = route.match_path(&Method::GET, "/petBy/19388").unwrap();
        assert_eq!(params["id"], "19388");
        assert!(!route.matches(&Method::GET, "/petBy"));
        assert!(!route.matches(&Method::GET, "/petBy/"));
        assert!(!route.matches(&Method::GET, "/petBy/1/details"));
    }

    #[test]
    fn test_route_wildcard_match() {
        let route = route(Method::GET, "/assets/*");

        let params = route.match_path(&Method::GET, "/assets/img/dog.png").unwrap();
        assert_eq!(params[WILDCARD], "img/dog.png");
        assert!(route.matches(&Method::GET, "/assets"));
        assert!(!route.matches(&Method::GET, "/assetsx"));
        assert!(!route.matches(&Method::GET, "/other"));
    }

    #[test]
    fn test_disabled_route() {
        let route = route(Method::GET, "/pets").enabled(false);
        assert!(!route.matches(&Method::GET, "/pets"));
    }

    #[test]
    fn test_route_table_priority() {
        let mut table = RouteTable::new();
        table.add(route(Method::GET, "/pets/*").priority(0));
        table.add(route(Method::GET, "/pets/search").priority(10));

        let found = table.find(&Method::GET, "/pets/search").unwrap();
        assert_eq!(found.route.path, "/pets/search");
        assert!(found.params.is_empty());

        let found = table.find(&Method::GET, "/pets/other").unwrap();
        assert_eq!(found.route.path, "/pets/*");
        assert!(table.find(&Method::DELETE, "/pets/other").is_none());
    }

    #[test]
    fn test_schema_lookup_by_template() {
        let mut table = RouteTable::new();
        let schema = Schema::new().field("name", FieldSchema::new(FieldType::String));
        table.add(route(Method::POST, "/pets").schema(schema.clone()));
        table.add(route(Method::GET, "/pets"));

        assert_eq!(table.schema(&Method::POST, "/pets"), Some(&schema));
        assert_eq!(table.schema(&Method::GET, "/pets"), None);
        assert_eq!(table.schema(&Method::PUT, "/pets"), None);
    }
}
