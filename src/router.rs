//! HTTP route table.
//!
//! Resolves a method and a concrete path to a logical endpoint name. Static
//! routes are looked up first; templated routes (`/users/{id}`) are then
//! tried in declaration order and their parameters extracted.

use crate::error::RouteError;
use regex::Regex;
use std::collections::{HashMap, HashSet};

/// Prefix of context keys holding path parameters.
pub const PATH_PARAM_PREFIX: &str = "path.";

/// Prefix of context keys holding query parameters.
pub const QUERY_PARAM_PREFIX: &str = "query.";

/// A compiled route.
#[derive(Debug)]
pub enum Route {
    /// Exact path
    Static { endpoint: String, path: String },
    /// Path template with positional parameters
    Template {
        endpoint: String,
        template: String,
        params: Vec<String>,
        tester: Regex,
    },
}

impl Route {
    /// Endpoint name this route resolves to.
    pub fn endpoint(&self) -> &str {
        match self {
            Route::Static { endpoint, .. } | Route::Template { endpoint, .. } => endpoint,
        }
    }
}

/// Result of resolving a request path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteMatch {
    /// Logical endpoint name
    pub endpoint: String,
    /// Extracted parameters, keyed `path.<name>`
    pub params: HashMap<String, String>,
}

#[derive(Debug, Default)]
struct MethodRoutes {
    /// Every declared path, static or templated
    declared: HashSet<String>,
    statics: HashMap<String, Route>,
    templates: Vec<Route>,
}

/// Route table for one connector.
#[derive(Debug)]
pub struct Router {
    template_syntax: Regex,
    methods: HashMap<String, MethodRoutes>,
}

impl Router {
    /// Create an empty router.
    pub fn new() -> Result<Self, RouteError> {
        Ok(Self {
            template_syntax: Regex::new(r"\{(\w+)\}")?,
            methods: HashMap::new(),
        })
    }

    /// Register a route for `method` + `path`.
    pub fn add(&mut self, method: &str, path: &str, endpoint: &str) -> Result<(), RouteError> {
        let method = method.to_uppercase();
        let route = self.compile(path, endpoint)?;

        let routes = self.methods.entry(method.clone()).or_default();
        if !routes.declared.insert(path.to_string()) {
            return Err(RouteError::Duplicate {
                method,
                path: path.to_string(),
            });
        }

        match route {
            Route::Static { .. } => {
                routes.statics.insert(path.to_string(), route);
            }
            Route::Template { .. } => routes.templates.push(route),
        }
        Ok(())
    }

    fn compile(&self, path: &str, endpoint: &str) -> Result<Route, RouteError> {
        let mut params: Vec<String> = Vec::new();
        let mut pattern = String::from("^");
        let mut last = 0;

        for captures in self.template_syntax.captures_iter(path) {
            let (Some(whole), Some(name)) = (captures.get(0), captures.get(1)) else {
                continue;
            };
            let name = name.as_str().to_string();
            if params.contains(&name) {
                return Err(RouteError::RepeatedParam {
                    path: path.to_string(),
                    param: name,
                });
            }
            pattern.push_str(&regex::escape(&path[last..whole.start()]));
            pattern.push_str(r"(\w+)");
            last = whole.end();
            params.push(name);
        }

        if params.is_empty() {
            return Ok(Route::Static {
                endpoint: endpoint.to_string(),
                path: path.to_string(),
            });
        }

        pattern.push_str(&regex::escape(&path[last..]));
        pattern.push('$');

        Ok(Route::Template {
            endpoint: endpoint.to_string(),
            template: path.to_string(),
            params,
            tester: Regex::new(&pattern)?,
        })
    }

    /// Resolve a request. Static routes win over templates.
    pub fn resolve(&self, method: &str, path: &str) -> Option<RouteMatch> {
        let routes = self.methods.get(method)?;

        if let Some(route) = routes.statics.get(path) {
            return Some(RouteMatch {
                endpoint: route.endpoint().to_string(),
                params: HashMap::new(),
            });
        }

        for route in &routes.templates {
            let Route::Template {
                endpoint,
                params,
                tester,
                ..
            } = route
            else {
                continue;
            };
            if let Some(captures) = tester.captures(path) {
                let params = params
                    .iter()
                    .zip(captures.iter().skip(1))
                    .filter_map(|(name, value)| {
                        value.map(|v| (format!("{PATH_PARAM_PREFIX}{name}"), v.as_str().to_string()))
                    })
                    .collect();
                return Some(RouteMatch {
                    endpoint: endpoint.clone(),
                    params,
                });
            }
        }

        None
    }

    /// Number of registered routes.
    pub fn len(&self) -> usize {
        self.methods.values().map(|r| r.declared.len()).sum()
    }

    /// Whether no route is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Parse a query string into `query.<name>` context entries.
pub fn parse_query_string(query: &str) -> HashMap<String, String> {
    let mut params = HashMap::new();

    for part in query.split('&') {
        if part.is_empty() {
            continue;
        }
        let (key, value) = part.split_once('=').unwrap_or((part, ""));
        params.insert(
            format!("{QUERY_PARAM_PREFIX}{}", urlencoding_decode(key)),
            urlencoding_decode(value),
        );
    }

    params
}

/// Percent-decoding for form-encoded query components.
fn urlencoding_decode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'%' if i + 2 < bytes.len() => {
                let hex = std::str::from_utf8(&bytes[i + 1..i + 3])
                    .ok()
                    .filter(|h| h.bytes().all(|b| b.is_ascii_hexdigit()));
                match hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                    Some(byte) => {
                        out.push(byte);
                        i += 3;
                    }
                    None => {
                        out.push(b'%');
                        i += 1;
                    }
                }
            }
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            other => {
                out.push(other);
                i += 1;
            }
        }
    }

    String::from_utf8_lossy(&out).into_owned()
}
