use std::fmt;
use std::str::FromStr;

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RouteError {
    #[error("Unknown route: {0}")]
    Unknown(String),

    #[error("Route {route} requires the '{param}' parameter")]
    MissingParameter { route: &'static str, param: &'static str },
}

/// Every screen the navigation layer can ask for.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Route {
    Home,
    Issues,
    NewIssue,
    Forums,
    Representatives,
    RepresentativeDetails { id: String },
    Settings,
    SignIn { return_to: Option<String> },
    SignUp,
    ForgotPassword,
}

impl Route {
    /// Parse an app path such as `/(tabs)/issues` or `/representative-details?id=3`.
    ///
    /// Layout groups like `(tabs)` and `(auth)` are ignored, as is a trailing slash.
    pub fn parse(raw: &str) -> Result<Self, RouteError> {
        let raw = raw.trim();
        let (path, query) = match raw.split_once('?') {
            Some((path, query)) => (path, Some(query)),
            None => (raw, None),
        };
        let param = |name: &str| -> Option<String> {
            query.and_then(|q| {
                q.split('&')
                    .filter_map(|pair| pair.split_once('='))
                    .find(|(key, _)| *key == name)
                    .map(|(_, value)| value.to_string())
                    .filter(|value| !value.is_empty())
            })
        };

        let segments: Vec<&str> = path
            .split('/')
            .filter(|s| !s.is_empty())
            .filter(|s| !(s.starts_with('(') && s.ends_with(')')))
            .collect();

        let route = match segments.as_slice() {
            [] | ["home"] => Route::Home,
            ["issues"] => Route::Issues,
            ["issues", "new"] => Route::NewIssue,
            ["forums"] => Route::Forums,
            ["representatives"] => Route::Representatives,
            ["representative-details"] => Route::RepresentativeDetails {
                id: param("id").ok_or(RouteError::MissingParameter {
                    route: "representative-details",
                    param: "id",
                })?,
            },
            ["settings"] => Route::Settings,
            ["sign-in"] => Route::SignIn { return_to: param("return_to") },
            ["sign-up"] => Route::SignUp,
            ["forgot-password"] => Route::ForgotPassword,
            _ => return Err(RouteError::Unknown(raw.to_string())),
        };
        Ok(route)
    }

    /// Canonical path, without layout groups.
    pub fn path(&self) -> String {
        match self {
            Route::Home => "/".to_string(),
            Route::Issues => "/issues".to_string(),
            Route::NewIssue => "/issues/new".to_string(),
            Route::Forums => "/forums".to_string(),
            Route::Representatives => "/representatives".to_string(),
            Route::RepresentativeDetails { id } => format!("/representative-details?id={}", id),
            Route::Settings => "/settings".to_string(),
            Route::SignIn { return_to: Some(target) } => format!("/sign-in?return_to={}", target),
            Route::SignIn { return_to: None } => "/sign-in".to_string(),
            Route::SignUp => "/sign-up".to_string(),
            Route::ForgotPassword => "/forgot-password".to_string(),
        }
    }

    /// Screen title, as shown in the tab bar and headers.
    pub fn title(&self) -> &'static str {
        match self {
            Route::Home => "Home",
            Route::Issues => "Issues",
            Route::NewIssue => "Report Issue",
            Route::Forums => "Forums",
            Route::Representatives => "Representatives",
            Route::RepresentativeDetails { .. } => "Representative",
            Route::Settings => "Settings",
            Route::SignIn { .. } => "Sign In",
            Route::SignUp => "Sign Up",
            Route::ForgotPassword => "Forgot Password",
        }
    }

    /// Auth screens are public; everything else needs a session.
    pub fn is_protected(&self) -> bool {
        !matches!(self, Route::SignIn { .. } | Route::SignUp | Route::ForgotPassword)
    }

    /// Where a denied navigation to this route is sent.
    pub fn sign_in_redirect(&self) -> Route {
        Route::SignIn { return_to: Some(self.path()) }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path())
    }
}

impl FromStr for Route {
    type Err = RouteError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Route::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_routes() -> Vec<Route> {
        vec![
            Route::Home,
            Route::Issues,
            Route::NewIssue,
            Route::Forums,
            Route::Representatives,
            Route::RepresentativeDetails { id: "3".to_string() },
            Route::Settings,
            Route::SignIn { return_to: None },
            Route::SignIn { return_to: Some("/forums".to_string()) },
            Route::SignUp,
            Route::ForgotPassword,
        ]
    }

    #[test]
    fn test_path_parses_back() {
        for route in all_routes() {
            assert_eq!(Route::parse(&route.path()), Ok(route.clone()), "{}", route);
        }
    }

    #[test]
    fn test_layout_groups_are_ignored() {
        assert_eq!(Route::parse("/(tabs)"), Ok(Route::Home));
        assert_eq!(Route::parse("/(tabs)/home"), Ok(Route::Home));
        assert_eq!(Route::parse("/(tabs)/issues"), Ok(Route::Issues));
        assert_eq!(Route::parse("/(tabs)/representatives/"), Ok(Route::Representatives));
        assert_eq!(Route::parse("/(auth)/sign-up"), Ok(Route::SignUp));
    }

    #[test]
    fn test_detail_route_needs_id() {
        assert!(matches!(
            Route::parse("/representative-details"),
            Err(RouteError::MissingParameter { param: "id", .. })
        ));
        assert_eq!(
            Route::parse("/representative-details?source=list&id=7"),
            Ok(Route::RepresentativeDetails { id: "7".to_string() })
        );
    }

    #[test]
    fn test_return_to_keeps_nested_query() {
        let redirect = Route::RepresentativeDetails { id: "3".to_string() }.sign_in_redirect();
        assert_eq!(redirect.path(), "/sign-in?return_to=/representative-details?id=3");
        assert_eq!(Route::parse(&redirect.path()), Ok(redirect));
    }

    #[test]
    fn test_unknown_route() {
        assert_eq!(Route::parse("/wallet"), Err(RouteError::Unknown("/wallet".to_string())));
    }

    #[test]
    fn test_protection() {
        assert!(Route::Home.is_protected());
        assert!(Route::Settings.is_protected());
        assert!(!Route::SignIn { return_to: None }.is_protected());
        assert!(!Route::SignUp.is_protected());
        assert!(!Route::ForgotPassword.is_protected());
    }
}
