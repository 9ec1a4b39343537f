//! A registered route: one path pattern plus per-method bindings.

use std::collections::HashMap;

use md5::{Digest, Md5};

use crate::events;
use crate::handler::BoxedHandler;
use crate::method::Method;
use crate::pattern::{Params, PathPattern};

/// Which binding slot an operation targets: a concrete method, or the
/// catch-all that answers any method without its own binding.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum BindKey {
    Method(Method),
    Any,
}

/// Auth requirement for one method binding.
///
/// A `Sequence` is tried in order with first-success-wins semantics; when
/// every hook in it fails, the *last* failure becomes the terminal error.
#[derive(Clone, Debug)]
pub enum AuthSpec {
    Single(String),
    Sequence(Vec<String>),
}

impl AuthSpec {
    /// An ordered list of scheme hooks to try in turn.
    pub fn any_of(hooks: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self::Sequence(hooks.into_iter().map(Into::into).collect())
    }
}

impl From<&str> for AuthSpec {
    fn from(hook: &str) -> Self {
        Self::Single(hook.to_owned())
    }
}

impl From<String> for AuthSpec {
    fn from(hook: String) -> Self {
        Self::Single(hook)
    }
}

impl<const N: usize> From<[&str; N]> for AuthSpec {
    fn from(hooks: [&str; N]) -> Self {
        Self::any_of(hooks)
    }
}

/// Named rate-limit hook plus the cost charged per invocation.
#[derive(Clone, Debug)]
pub struct RateLimitSpec {
    pub hook: String,
    pub cost: u32,
}

/// Everything bound to one method of a route.
pub(crate) struct MethodSpec {
    pub(crate) handler: BoxedHandler,
    pub(crate) auth: Option<AuthSpec>,
    pub(crate) rate_limit: Option<RateLimitSpec>,
}

// ── Route ─────────────────────────────────────────────────────────────────────

/// One route: identifier, compiled pattern, method bindings, and a
/// namespace allow-list.
///
/// Mutated only while its registration closure runs; finalized once before
/// matching begins, read-only afterwards.
pub struct Route {
    id: String,
    renamed: bool,
    pattern: PathPattern,
    bindings: HashMap<Method, MethodSpec>,
    any: Option<MethodSpec>,
    namespaces: Vec<String>,
    finished: bool,
}

impl Route {
    pub(crate) fn new(template: &str) -> Self {
        Self {
            id: short_hash(template),
            renamed: false,
            pattern: PathPattern::compile(template),
            bindings: HashMap::new(),
            any: None,
            namespaces: Vec::new(),
            finished: false,
        }
    }

    /// The route identifier: a deterministic hash of the template until
    /// renamed.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Applies a human-readable name. A route is renameable exactly once;
    /// later calls are ignored.
    pub(crate) fn rename(&mut self, name: &str) {
        if !self.renamed {
            self.id = name.to_owned();
            self.renamed = true;
        }
    }

    pub fn pattern(&self) -> &PathPattern {
        &self.pattern
    }

    pub(crate) fn bind(&mut self, key: BindKey, handler: BoxedHandler) {
        let spec = MethodSpec { handler, auth: None, rate_limit: None };
        match key {
            BindKey::Method(method) => {
                // Rebinding a method replaces the previous spec silently.
                self.bindings.insert(method, spec);
            }
            BindKey::Any => self.any = Some(spec),
        }
    }

    pub(crate) fn set_auth(&mut self, key: BindKey, auth: AuthSpec) {
        if let Some(spec) = self.spec_mut(key) {
            spec.auth = Some(auth);
        }
    }

    pub(crate) fn set_rate_limit(&mut self, key: BindKey, hook: &str, cost: u32) {
        if let Some(spec) = self.spec_mut(key) {
            spec.rate_limit = Some(RateLimitSpec { hook: hook.to_owned(), cost });
        }
    }

    pub(crate) fn set_namespaces(&mut self, namespaces: Vec<String>) {
        self.namespaces = namespaces;
    }

    pub fn namespaces(&self) -> &[String] {
        &self.namespaces
    }

    /// Finalizes the route: an empty namespace allow-list inherits the
    /// application's declared set, and every binding without an explicit
    /// rate limit gets the default hook at cost zero (invoked, never
    /// limiting).
    pub(crate) fn finish(&mut self, app_namespaces: &[String]) {
        if self.finished {
            return;
        }
        if self.namespaces.is_empty() {
            self.namespaces = app_namespaces.to_vec();
        }
        for spec in self.bindings.values_mut().chain(self.any.as_mut()) {
            if spec.rate_limit.is_none() {
                spec.rate_limit =
                    Some(RateLimitSpec { hook: events::RATE_LIMIT.to_owned(), cost: 0 });
            }
        }
        self.finished = true;
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// The binding that answers `method`: its own, else the catch-all.
    pub(crate) fn binding(&self, method: Method) -> Option<&MethodSpec> {
        self.bindings.get(&method).or(self.any.as_ref())
    }

    /// Mutable access to the spec bound to `key`, if present.
    fn spec_mut(&mut self, key: BindKey) -> Option<&mut MethodSpec> {
        match key {
            BindKey::Method(method) => self.bindings.get_mut(&method),
            BindKey::Any => self.any.as_mut(),
        }
    }

    /// Methods to advertise in the `Allow` header.
    pub fn available_methods(&self) -> Vec<Method> {
        if self.any.is_some() {
            return Method::ALL.to_vec();
        }
        Method::ALL
            .into_iter()
            .filter(|m| self.bindings.contains_key(m))
            .collect()
    }

    /// Namespace admission check.
    ///
    /// With a non-empty allow-list this is a plain membership test. With an
    /// empty one the route admits exactly the namespaces the application
    /// did NOT declare. Route finalization fills the allow-list whenever
    /// the application declares namespaces, so the asymmetric fallback only
    /// applies to namespace-less applications.
    pub fn is_valid_namespace(
        &self,
        request_ns: Option<&str>,
        app_namespaces: &[String],
    ) -> bool {
        if !self.namespaces.is_empty() {
            return request_ns.is_some_and(|ns| self.namespaces.iter().any(|n| n == ns));
        }
        match request_ns {
            Some(ns) => !app_namespaces.iter().any(|n| n == ns),
            None => true,
        }
    }

    pub fn is_valid_path(&self, path: &str) -> bool {
        self.pattern.matches(path)
    }

    pub fn params(&self, path: &str) -> Params {
        self.pattern.params(path)
    }
}

/// Deterministic short route id: the first 8 hex chars of the template's
/// MD5.
fn short_hash(template: &str) -> String {
    hex::encode(Md5::digest(template.as_bytes()))[..8].to_owned()
}
