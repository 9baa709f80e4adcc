//! Route descriptors and their security declarations.
//!
//! A service describes its routes as plain data. Each route may carry one
//! [`SecurityDeclaration`]; routes without one are left out of the published
//! rule set and fall back to "authenticated callers only" at the gateway.
//!
//! ```
//! use bastion_scanner::{RouteTable, SecurityDeclaration};
//!
//! let routes = RouteTable::new("/api")
//!     .get("/orders/{id}", SecurityDeclaration::secured(["ADMIN"]))
//!     .post("/orders", SecurityDeclaration::Public)
//!     .undeclared(["GET"], "/internal/stats")
//!     .into_routes();
//!
//! assert_eq!(routes.len(), 3);
//! assert!(routes[2].security.is_none());
//! ```

use std::collections::BTreeSet;

/// Access requirement attached to a route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecurityDeclaration {
    /// Open to anonymous callers.
    Public,
    /// Requires an authenticated caller holding one of `roles`.
    Secured {
        /// Accepted roles.
        roles: BTreeSet<String>,
    },
}

impl SecurityDeclaration {
    /// Builds a `Secured` declaration.
    pub fn secured<I, S>(roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Secured {
            roles: roles.into_iter().map(Into::into).collect(),
        }
    }

    /// Whether this is [`SecurityDeclaration::Public`].
    pub fn is_public(&self) -> bool {
        matches!(self, Self::Public)
    }
}

/// One route as seen by the service's own router.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteDescriptor {
    /// Name of the handler serving the route, used in logs.
    pub handler: String,
    /// Prefix shared by the service's routes.
    pub base_path: String,
    /// Route path relative to `base_path`.
    pub path: String,
    /// HTTP method tokens bound to the route.
    pub methods: Vec<String>,
    /// Security declaration, if any.
    pub security: Option<SecurityDeclaration>,
}

impl RouteDescriptor {
    /// Creates an undeclared route.
    pub fn new<I, M>(
        handler: impl Into<String>,
        base_path: impl Into<String>,
        path: impl Into<String>,
        methods: I,
    ) -> Self
    where
        I: IntoIterator<Item = M>,
        M: Into<String>,
    {
        Self {
            handler: handler.into(),
            base_path: base_path.into(),
            path: path.into(),
            methods: methods.into_iter().map(Into::into).collect(),
            security: None,
        }
    }

    /// Attaches a security declaration.
    pub fn with_security(mut self, security: SecurityDeclaration) -> Self {
        self.security = Some(security);
        self
    }
}

/// Fluent builder for a service's route list.
///
/// Every route added through the table shares its base path. Handler names
/// default to `"<METHODS> <path>"`; use [`RouteTable::push`] to name them.
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    base_path: String,
    routes: Vec<RouteDescriptor>,
}

impl RouteTable {
    /// Creates an empty table for routes under `base_path`.
    pub fn new(base_path: impl Into<String>) -> Self {
        Self {
            base_path: base_path.into(),
            routes: Vec::new(),
        }
    }

    /// Adds a `GET` route.
    pub fn get(self, path: &str, security: SecurityDeclaration) -> Self {
        self.route(["GET"], path, security)
    }

    /// Adds a `POST` route.
    pub fn post(self, path: &str, security: SecurityDeclaration) -> Self {
        self.route(["POST"], path, security)
    }

    /// Adds a `PUT` route.
    pub fn put(self, path: &str, security: SecurityDeclaration) -> Self {
        self.route(["PUT"], path, security)
    }

    /// Adds a `DELETE` route.
    pub fn delete(self, path: &str, security: SecurityDeclaration) -> Self {
        self.route(["DELETE"], path, security)
    }

    /// Adds a `PATCH` route.
    pub fn patch(self, path: &str, security: SecurityDeclaration) -> Self {
        self.route(["PATCH"], path, security)
    }

    /// Adds a route bound to several methods.
    pub fn route<I, M>(self, methods: I, path: &str, security: SecurityDeclaration) -> Self
    where
        I: IntoIterator<Item = M>,
        M: Into<String>,
    {
        let route = self.descriptor(methods, path).with_security(security);
        self.push(route)
    }

    /// Adds a route without any security declaration.
    pub fn undeclared<I, M>(self, methods: I, path: &str) -> Self
    where
        I: IntoIterator<Item = M>,
        M: Into<String>,
    {
        let route = self.descriptor(methods, path);
        self.push(route)
    }

    /// Adds a prepared descriptor as is.
    pub fn push(mut self, route: RouteDescriptor) -> Self {
        self.routes.push(route);
        self
    }

    /// The table's base path.
    pub fn base_path(&self) -> &str {
        &self.base_path
    }

    /// Routes added so far.
    pub fn routes(&self) -> &[RouteDescriptor] {
        &self.routes
    }

    /// Consumes the table.
    pub fn into_routes(self) -> Vec<RouteDescriptor> {
        self.routes
    }

    fn descriptor<I, M>(&self, methods: I, path: &str) -> RouteDescriptor
    where
        I: IntoIterator<Item = M>,
        M: Into<String>,
    {
        let methods: Vec<String> = methods.into_iter().map(Into::into).collect();
        let handler = format!("{} {}", methods.join(","), path);
        RouteDescriptor::new(handler, self.base_path.clone(), path, methods)
    }
}
