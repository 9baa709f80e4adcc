//! Path templates and radix tree matching for Bastion.
//!
//! Endpoint rules name their paths with templates such as `/orders/{id}`
//! or `/actuator/**`. This crate parses those templates and indexes them
//! in a radix tree so that a request path is matched in time proportional
//! to its segment count rather than the number of rules.
//!
//! # Features
//!
//! - **Templates**: literals, `{var}`, `*`, `**` and `{*rest}`
//! - **Method-aware matching**: only templates registered for the request
//!   method are considered, with backtracking across branches
//! - **Specificity**: every match reports how specific its template is, so
//!   callers combining several routers can pick the best one
//! - **Borrowed parameters**: matching allocates nothing for paths with up
//!   to eight segments and four parameters
//!
//! # Example
//!
//! ```rust
//! use bastion_router::{MethodRouter, Router};
//! use http::Method;
//!
//! let mut router = Router::new();
//! router.insert("/orders/{id}", MethodRouter::new().get(0_usize)).unwrap();
//! router.insert("/orders/**", MethodRouter::new().any(1)).unwrap();
//!
//! let m = router.match_route(&Method::GET, "/orders/42").unwrap();
//! assert_eq!(*m.value, 0);
//!
//! let m = router.match_route(&Method::DELETE, "/orders/42").unwrap();
//! assert_eq!(*m.value, 1);
//! ```
//!
//! # Architecture
//!
//! ```text
//!                 (root)
//!                   │
//!               "orders"
//!                   │
//!         ┌─────────┴─────────┐
//!       "{id}"              "**"
//!         │                   │
//!       (leaf)              (leaf)
//!        [GET]              [any]
//! ```

#![forbid(unsafe_code)]

mod method_router;
mod node;
mod params;
mod router;
mod template;

pub use method_router::MethodRouter;
pub use node::{Leaf, Node, SegmentKind};
pub use params::Params;
pub use router::Router;
pub use template::{PathTemplate, Segment, Specificity, TemplateError};

/// A matched route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteMatch<'a, T> {
    /// The value registered for the request method.
    pub value: &'a T,
    /// Extracted path parameters.
    pub params: Params<'a>,
    /// The template that matched.
    pub template: &'a str,
    /// Specificity of the matched template.
    pub specificity: Specificity,
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::Method;

    #[test]
    fn test_basic_routing() {
        let mut router = Router::new();
        router.insert("/users", MethodRouter::new().get("listUsers")).unwrap();
        router.insert("/users/{id}", MethodRouter::new().get("getUser")).unwrap();

        let m = router.match_route(&Method::GET, "/users").unwrap();
        assert_eq!(*m.value, "listUsers");
        assert!(m.params.is_empty());

        let m = router.match_route(&Method::GET, "/users/123").unwrap();
        assert_eq!(*m.value, "getUser");
        assert_eq!(m.params.get("id"), Some("123"));
    }

    #[test]
    fn test_specificity_reported() {
        let mut router = Router::new();
        router.insert("/orders/{id}", MethodRouter::new().get(1)).unwrap();
        router.insert("/orders/**", MethodRouter::new().get(2)).unwrap();

        let exact = router.match_route(&Method::GET, "/orders/1").unwrap();
        let broad = router.match_route(&Method::GET, "/orders/1/items").unwrap();
        assert_eq!(*exact.value, 1);
        assert_eq!(*broad.value, 2);
        assert!(exact.specificity > broad.specificity);
    }

    #[test]
    fn test_anonymous_wildcards_capture_nothing() {
        let mut router = Router::new();
        router.insert("/static/*/**", MethodRouter::new().get(1)).unwrap();

        let m = router.match_route(&Method::GET, "/static/css/site.css").unwrap();
        assert!(m.params.is_empty());
    }
}
