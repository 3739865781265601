// Guard outcomes and redirect targets

use serde::Serialize;

/// Query parameter carrying the originally requested path
pub const RETURN_TO_PARAM: &str = "returnTo";

/// Navigation instruction produced by a guard
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Redirect {
    pub location: String,
    /// Replace the current history entry instead of pushing a new one
    pub replace: bool,
}

impl Redirect {
    /// History-replacing redirect
    pub fn replace(location: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            replace: true,
        }
    }
}

/// What a guarded view should do right now
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum GuardOutcome {
    /// Auth state not settled: show a neutral placeholder
    Loading,
    /// Show the protected content
    Render,
    /// Navigate elsewhere
    Redirect(Redirect),
}

impl GuardOutcome {
    pub fn is_render(&self) -> bool {
        matches!(self, GuardOutcome::Render)
    }

    pub fn redirect_location(&self) -> Option<&str> {
        match self {
            GuardOutcome::Redirect(redirect) => Some(&redirect.location),
            _ => None,
        }
    }
}

/// Sign-in location carrying the attempted path as `returnTo`
pub fn sign_in_location(sign_in_path: &str, attempted: &str) -> String {
    let separator = if sign_in_path.contains('?') { '&' } else { '?' };
    format!(
        "{}{}{}={}",
        sign_in_path,
        separator,
        RETURN_TO_PARAM,
        urlencoding::encode(attempted)
    )
}

/// Where to go after a successful sign-in
///
/// Reads `returnTo` from the sign-in page's query string. Only same-origin
/// paths are honoured; anything else, including a loop back to the sign-in
/// page, resolves to `/`.
pub fn return_destination(query: &str, sign_in_path: &str) -> String {
    let query = query.strip_prefix('?').unwrap_or(query);

    let raw = query.split('&').find_map(|pair| {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        (key == RETURN_TO_PARAM).then_some(value)
    });

    let Some(raw) = raw else {
        return "/".to_string();
    };

    // '+' is a space in form-encoded queries
    let decoded = match urlencoding::decode(&raw.replace('+', " ")) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => return "/".to_string(),
    };

    if !is_local_path(&decoded) || path_only(&decoded) == sign_in_path {
        tracing::debug!("Ignoring unsafe returnTo value: {}", decoded);
        return "/".to_string();
    }
    decoded
}

/// Path part of a location, without query or fragment
pub fn path_only(location: &str) -> &str {
    location
        .split(|c| c == '?' || c == '#')
        .next()
        .unwrap_or(location)
}

fn is_local_path(path: &str) -> bool {
    path.starts_with('/')
        && !path.starts_with("//")
        && !path.starts_with("/\\")
        && !path.chars().any(char::is_control)
}
