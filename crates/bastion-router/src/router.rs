//! High-level router API.

use http::Method;

use crate::method_router::MethodRouter;
use crate::node::{Leaf, Node};
use crate::params::Params;
use crate::template::{PathTemplate, TemplateError};
use crate::RouteMatch;

/// A radix tree router from path templates to per-method values.
///
/// # Example
///
/// ```rust
/// use bastion_router::{MethodRouter, Router};
/// use http::Method;
///
/// let mut router = Router::new();
/// router.insert("/orders", MethodRouter::new().post("createOrder")).unwrap();
/// router.insert("/orders/{id}", MethodRouter::new().get("getOrder")).unwrap();
///
/// let m = router.match_route(&Method::GET, "/orders/42").unwrap();
/// assert_eq!(*m.value, "getOrder");
/// assert_eq!(m.params.get("id"), Some("42"));
/// assert!(router.match_route(&Method::DELETE, "/orders/42").is_none());
/// ```
///
/// # Route Priority
///
/// When multiple templates could match a path, the router prefers, segment
/// by segment:
///
/// 1. **Literal segments** (e.g., `/users/me`)
/// 2. **Variable segments** (e.g., `/users/{id}` or `/users/*`)
/// 3. **Catch-all segments** (e.g., `/users/**`)
///
/// Only templates registered for the request method are considered, so a
/// `POST` to `/users/me` falls through to `/users/**` when `/users/me` only
/// accepts `GET`.
#[derive(Debug, Clone)]
pub struct Router<T> {
    root: Node<T>,
    route_count: usize,
}

impl<T> Default for Router<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Router<T> {
    /// Creates a new empty router.
    #[must_use]
    pub fn new() -> Self {
        Self {
            root: Node::root(),
            route_count: 0,
        }
    }

    /// Parses `template` and inserts it.
    pub fn insert(&mut self, template: &str, methods: MethodRouter<T>) -> Result<(), TemplateError> {
        let parsed = PathTemplate::parse(template)?;
        self.insert_template(&parsed, methods);
        Ok(())
    }

    /// Inserts an already parsed template.
    pub fn insert_template(&mut self, template: &PathTemplate, methods: MethodRouter<T>) {
        self.root.insert(template, methods);
        self.route_count += 1;
    }

    /// Convenience method to add a single-method route.
    pub fn route(&mut self, method: &Method, template: &str, value: T) -> Result<(), TemplateError> {
        self.insert(template, MethodRouter::new().method(method, value))
    }

    /// Matches a method and path.
    #[must_use]
    pub fn match_route<'a>(&'a self, method: &Method, path: &'a str) -> Option<RouteMatch<'a, T>> {
        let mut params = Params::new();
        let leaf = self
            .root
            .find(path, &mut params, |leaf| leaf.methods.lookup(method).is_some())?;
        let value = leaf.methods.lookup(method)?;
        Some(RouteMatch {
            value,
            params,
            template: &leaf.template,
            specificity: leaf.specificity,
        })
    }

    /// Matches a path regardless of method.
    ///
    /// Useful for building `405 Method Not Allowed` responses.
    #[must_use]
    pub fn match_path<'a>(&'a self, path: &'a str) -> Option<(&'a MethodRouter<T>, Params<'a>)> {
        let mut params = Params::new();
        let leaf: &Leaf<T> = self.root.find(path, &mut params, |_| true)?;
        Some((&leaf.methods, params))
    }

    /// Returns the number of insert calls.
    #[must_use]
    pub fn len(&self) -> usize {
        self.route_count
    }

    /// Returns true if no routes are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.route_count == 0
    }
}
