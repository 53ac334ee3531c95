use crate::pvt::tools::config::AuthConfig;

/// Gatekeeper for the reconciliation entry points.
pub trait SessionAuthenticator {
    fn is_logged_in(&self) -> bool;

    /// URL that ends the session and returns the user to the application.
    fn logout_url(&self) -> String;
}

/// Session backed by an OpenID Connect provider.
#[derive(Debug, Clone)]
pub struct OidcSession {
    root_url: String,
    logout_endpoint: String,
    logged_in: bool,
}

impl OidcSession {
    pub fn new(config: &AuthConfig, logged_in: bool) -> Self {
        Self {
            root_url: config.root_url.trim_end_matches('/').to_string(),
            logout_endpoint: config.logout_endpoint.clone(),
            logged_in,
        }
    }
}

impl SessionAuthenticator for OidcSession {
    fn is_logged_in(&self) -> bool {
        self.logged_in
    }

    fn logout_url(&self) -> String {
        format!(
            "{}?post_logout_redirect_uri={}/?logout=yes",
            self.logout_endpoint, self.root_url
        )
    }
}
