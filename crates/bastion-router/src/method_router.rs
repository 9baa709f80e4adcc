//! HTTP method-based dispatch for a single path template.
//!
//! [`MethodRouter`] maps HTTP methods to values (rule indices, handler ids)
//! for one template. An optional `any` slot answers for every method that
//! has no explicit entry.

use http::Method;

/// Maps HTTP methods to values for a single route.
///
/// # Example
///
/// ```rust
/// use bastion_router::MethodRouter;
/// use http::Method;
///
/// let router = MethodRouter::new().get(0_usize).post(1);
///
/// assert_eq!(router.lookup(&Method::GET), Some(&0));
/// assert_eq!(router.lookup(&Method::POST), Some(&1));
/// assert_eq!(router.lookup(&Method::DELETE), None);
/// ```
#[derive(Debug, Clone)]
pub struct MethodRouter<T> {
    get: Option<T>,
    post: Option<T>,
    put: Option<T>,
    delete: Option<T>,
    patch: Option<T>,
    head: Option<T>,
    options: Option<T>,
    trace: Option<T>,
    connect: Option<T>,
    any: Option<T>,
}

impl<T> Default for MethodRouter<T> {
    fn default() -> Self {
        Self {
            get: None,
            post: None,
            put: None,
            delete: None,
            patch: None,
            head: None,
            options: None,
            trace: None,
            connect: None,
            any: None,
        }
    }
}

impl<T> MethodRouter<T> {
    /// Creates a new empty method router.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a GET value.
    #[must_use]
    pub fn get(self, value: T) -> Self {
        self.method(&Method::GET, value)
    }

    /// Registers a POST value.
    #[must_use]
    pub fn post(self, value: T) -> Self {
        self.method(&Method::POST, value)
    }

    /// Registers a PUT value.
    #[must_use]
    pub fn put(self, value: T) -> Self {
        self.method(&Method::PUT, value)
    }

    /// Registers a DELETE value.
    #[must_use]
    pub fn delete(self, value: T) -> Self {
        self.method(&Method::DELETE, value)
    }

    /// Registers a PATCH value.
    #[must_use]
    pub fn patch(self, value: T) -> Self {
        self.method(&Method::PATCH, value)
    }

    /// Registers a value used for every method without its own entry.
    #[must_use]
    pub fn any(mut self, value: T) -> Self {
        self.any = Some(value);
        self
    }

    /// Registers a value for a specific method.
    ///
    /// Extension methods have no dedicated slot and are ignored; use
    /// [`MethodRouter::any`] to cover them.
    #[must_use]
    pub fn method(mut self, method: &Method, value: T) -> Self {
        if let Some(slot) = self.slot_mut(method) {
            *slot = Some(value);
        }
        self
    }

    /// Returns the value registered for `method`, falling back to `any`.
    #[must_use]
    pub fn lookup(&self, method: &Method) -> Option<&T> {
        let explicit = match *method {
            Method::GET => self.get.as_ref(),
            Method::POST => self.post.as_ref(),
            Method::PUT => self.put.as_ref(),
            Method::DELETE => self.delete.as_ref(),
            Method::PATCH => self.patch.as_ref(),
            Method::HEAD => self.head.as_ref(),
            Method::OPTIONS => self.options.as_ref(),
            Method::TRACE => self.trace.as_ref(),
            Method::CONNECT => self.connect.as_ref(),
            _ => None,
        };
        explicit.or(self.any.as_ref())
    }

    /// Merges another method router into this one.
    ///
    /// Entries already present are kept, so the first registration for a
    /// method wins.
    ///
    /// ```rust
    /// use bastion_router::MethodRouter;
    /// use http::Method;
    ///
    /// let mut router = MethodRouter::new().get("first");
    /// router.merge(MethodRouter::new().get("second").post("create"));
    ///
    /// assert_eq!(router.lookup(&Method::GET), Some(&"first"));
    /// assert_eq!(router.lookup(&Method::POST), Some(&"create"));
    /// ```
    pub fn merge(&mut self, other: MethodRouter<T>) {
        fn keep_first<T>(slot: &mut Option<T>, other: Option<T>) {
            if slot.is_none() {
                *slot = other;
            }
        }
        keep_first(&mut self.get, other.get);
        keep_first(&mut self.post, other.post);
        keep_first(&mut self.put, other.put);
        keep_first(&mut self.delete, other.delete);
        keep_first(&mut self.patch, other.patch);
        keep_first(&mut self.head, other.head);
        keep_first(&mut self.options, other.options);
        keep_first(&mut self.trace, other.trace);
        keep_first(&mut self.connect, other.connect);
        keep_first(&mut self.any, other.any);
    }

    /// Returns true if any method is registered.
    #[must_use]
    pub fn has_any_method(&self) -> bool {
        !self.allowed_methods().is_empty() || self.any.is_some()
    }

    /// Returns the methods with an explicit entry.
    #[must_use]
    pub fn allowed_methods(&self) -> Vec<Method> {
        [
            (&self.get, Method::GET),
            (&self.post, Method::POST),
            (&self.put, Method::PUT),
            (&self.delete, Method::DELETE),
            (&self.patch, Method::PATCH),
            (&self.head, Method::HEAD),
            (&self.options, Method::OPTIONS),
            (&self.trace, Method::TRACE),
            (&self.connect, Method::CONNECT),
        ]
        .into_iter()
        .filter(|(slot, _)| slot.is_some())
        .map(|(_, m)| m)
        .collect()
    }

    fn slot_mut(&mut self, method: &Method) -> Option<&mut Option<T>> {
        match *method {
            Method::GET => Some(&mut self.get),
            Method::POST => Some(&mut self.post),
            Method::PUT => Some(&mut self.put),
            Method::DELETE => Some(&mut self.delete),
            Method::PATCH => Some(&mut self.patch),
            Method::HEAD => Some(&mut self.head),
            Method::OPTIONS => Some(&mut self.options),
            Method::TRACE => Some(&mut self.trace),
            Method::CONNECT => Some(&mut self.connect),
            _ => None,
        }
    }
}
