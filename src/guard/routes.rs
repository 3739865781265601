// Route permission declarations
//
// Static table mapping path patterns to the roles allowed to view them.
// Patterns are literal paths with optional `:param` segments and an optional
// trailing `/*` covering the whole subtree. The first matching rule wins.
// Matching is case-insensitive and runs on the decoded, dot-resolved path,
// the same path the router ends up rendering.

use regex::{Regex, RegexBuilder};
use std::borrow::Cow;
use thiserror::Error;

use crate::guard::redirect::path_only;
use crate::guard::RequireRole;
use crate::session::Role;

/// Errors raised while declaring routes
#[derive(Debug, Error)]
pub enum RouteError {
    #[error("Route pattern must start with '/': {0}")]
    RelativePattern(String),

    #[error("Invalid route pattern {pattern}: {message}")]
    InvalidPattern { pattern: String, message: String },
}

/// Who may view a route
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Access {
    /// Anyone, signed in or not
    Public,
    /// Signed-in visitors, optionally restricted to a role set
    Protected(Option<RequireRole>),
}

/// One declared route
#[derive(Debug, Clone)]
pub struct RouteRule {
    pattern: String,
    matcher: Regex,
    access: Access,
}

impl RouteRule {
    fn compile(pattern: &str, access: Access) -> Result<Self, RouteError> {
        if !pattern.starts_with('/') {
            return Err(RouteError::RelativePattern(pattern.to_string()));
        }

        let (base, subtree) = match pattern.strip_suffix("/*") {
            Some(base) => (base, true),
            None => (pattern, false),
        };

        let mut source = String::from("^");
        for segment in base.split('/').filter(|s| !s.is_empty()) {
            source.push('/');
            if segment.starts_with(':') && segment.len() > 1 {
                source.push_str("[^/]+");
            } else {
                source.push_str(&regex::escape(segment));
            }
        }
        if subtree {
            source.push_str("(?:/.*)?");
        }
        if source == "^" {
            source.push('/');
        }
        source.push('$');

        let matcher = RegexBuilder::new(&source)
            .case_insensitive(true)
            .build()
            .map_err(|e| RouteError::InvalidPattern {
            pattern: pattern.to_string(),
            message: e.to_string(),
        })?;

        Ok(Self {
            pattern: pattern.to_string(),
            matcher,
            access,
        })
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn access(&self) -> &Access {
        &self.access
    }

    fn matches(&self, path: &str) -> bool {
        self.matcher.is_match(path)
    }
}

/// Immutable path -> permission table
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    rules: Vec<RouteRule>,
}

impl RouteTable {
    pub fn builder() -> RouteTableBuilder {
        RouteTableBuilder::default()
    }

    /// Access rule for a location; undeclared paths are public
    pub fn access_for(&self, location: &str) -> &Access {
        const PUBLIC: &Access = &Access::Public;
        self.lookup(location).map(RouteRule::access).unwrap_or(PUBLIC)
    }

    /// First rule matching the location's path
    pub fn lookup(&self, location: &str) -> Option<&RouteRule> {
        let path = normalize(location);
        self.rules.iter().find(|rule| rule.matches(&path))
    }

    pub fn rules(&self) -> &[RouteRule] {
        &self.rules
    }

    /// Routes of the dive shop front end
    pub fn dive_shop() -> Result<Self, RouteError> {
        Self::builder()
            .public("/")
            .public("/auth/*")
            .public("/forbidden")
            .public("/courses/*")
            .public("/rentals/*")
            .public("/trips/*")
            .public("/gallery")
            .restricted("/dashboard/admin/*", [Role::Admin])
            .restricted("/dashboard/staff/*", [Role::Admin, Role::Staff])
            .restricted("/dashboard/client/*", [Role::Client])
            .restricted("/checkout/*", [Role::Client])
            .authenticated("/dashboard")
            .authenticated("/bookings/:id")
            .authenticated("/profile")
            .build()
    }
}

/// Collects declarations; compilation errors surface from `build`
#[derive(Debug, Default)]
pub struct RouteTableBuilder {
    declarations: Vec<(String, Access)>,
}

impl RouteTableBuilder {
    pub fn public(mut self, pattern: &str) -> Self {
        self.declarations.push((pattern.to_string(), Access::Public));
        self
    }

    /// Any signed-in visitor
    pub fn authenticated(mut self, pattern: &str) -> Self {
        self.declarations
            .push((pattern.to_string(), Access::Protected(None)));
        self
    }

    /// Signed-in visitors holding one of `roles`
    pub fn restricted(mut self, pattern: &str, roles: impl IntoIterator<Item = Role>) -> Self {
        self.declarations.push((
            pattern.to_string(),
            Access::Protected(Some(RequireRole::new(roles))),
        ));
        self
    }

    pub fn build(self) -> Result<RouteTable, RouteError> {
        let rules = self
            .declarations
            .into_iter()
            .map(|(pattern, access)| RouteRule::compile(&pattern, access))
            .collect::<Result<Vec<_>, _>>()?;

        tracing::debug!("Declared {} routes", rules.len());
        Ok(RouteTable { rules })
    }
}

/// Canonical path of a location
///
/// Drops query and fragment, percent-decodes, collapses repeated slashes,
/// resolves `.`/`..` segments and strips the trailing slash.
pub(crate) fn normalize(location: &str) -> String {
    let raw = path_only(location);
    let decoded = urlencoding::decode(raw).unwrap_or(Cow::Borrowed(raw));

    let mut segments: Vec<&str> = Vec::new();
    for segment in decoded.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            segment => segments.push(segment),
        }
    }
    format!("/{}", segments.join("/"))
}
