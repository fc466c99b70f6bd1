use axum::response::Redirect;
use http::StatusCode;
use oidc_guard::{AuthProvider, GuardError};

/// Browser-facing conversion: every failure becomes a redirect.
///
/// Authentication failures go to the unauthorized route, everything else to the error route.
pub trait IntoGuardRedirect<T> {
    fn into_guard_redirect(self, provider: &AuthProvider) -> Result<T, Redirect>;
}

impl<T> IntoGuardRedirect<T> for Result<T, GuardError> {
    fn into_guard_redirect(self, provider: &AuthProvider) -> Result<T, Redirect> {
        self.map_err(|e| error_redirect(provider, &e))
    }
}

pub(crate) fn error_redirect(provider: &AuthProvider, error: &GuardError) -> Redirect {
    let routes = &provider.settings().auth_routes;
    let location = if error.is_authentication_failure() {
        routes.unauthorized.as_str()
    } else {
        routes.error.as_str()
    };
    tracing::debug!("Redirecting to {} after: {}", location, error);
    Redirect::to(location)
}

pub(crate) fn unauthorized_redirect(provider: &AuthProvider) -> Redirect {
    Redirect::to(&provider.settings().auth_routes.unauthorized)
}

/// API-facing conversion used by the bearer-token middlewares.
pub trait IntoResponseError<T> {
    fn into_response_error(self) -> Result<T, (StatusCode, String)>;
}

impl<T> IntoResponseError<T> for Result<T, GuardError> {
    fn into_response_error(self) -> Result<T, (StatusCode, String)> {
        self.map_err(|e| {
            let status = match e {
                GuardError::NotAuthenticated | GuardError::TokenValidation(_) => {
                    StatusCode::UNAUTHORIZED
                }
                GuardError::TokenAcquisition(_) | GuardError::DirectoryLookup(_) => {
                    StatusCode::BAD_GATEWAY
                }
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            };
            (status, e.to_string())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::response::IntoResponse;
    use http::header::LOCATION;
    use oidc_guard::test_utils::{sample_settings, test_provider};
    use oidc_guard::{IdentityError, TokenValidationError};

    fn location(redirect: Redirect) -> String {
        let response = redirect.into_response();
        response.headers()[LOCATION].to_str().unwrap().to_string()
    }

    #[test]
    fn test_authentication_failures_redirect_to_unauthorized() {
        let harness = test_provider(sample_settings()).unwrap();

        let result: Result<(), GuardError> = Err(GuardError::NotAuthenticated);
        let redirect = result.into_guard_redirect(&harness.provider).unwrap_err();
        assert_eq!(location(redirect), "/unauthorized");

        let result: Result<(), GuardError> =
            Err(GuardError::TokenValidation(TokenValidationError::NoMatchingKey));
        let redirect = result.into_guard_redirect(&harness.provider).unwrap_err();
        assert_eq!(location(redirect), "/unauthorized");
    }

    #[test]
    fn test_other_failures_redirect_to_error_route() {
        let harness = test_provider(sample_settings()).unwrap();

        let result: Result<(), GuardError> =
            Err(GuardError::TokenExchange("missing code".to_string()));
        let redirect = result.into_guard_redirect(&harness.provider).unwrap_err();
        assert_eq!(location(redirect), "/error");
    }

    #[test]
    fn test_status_mapping() {
        let result: Result<(), GuardError> = Err(GuardError::NotAuthenticated);
        assert_eq!(result.into_response_error().unwrap_err().0, StatusCode::UNAUTHORIZED);

        let result: Result<(), GuardError> = Err(GuardError::TokenAcquisition(
            IdentityError::Request("timeout".to_string()),
        ));
        assert_eq!(result.into_response_error().unwrap_err().0, StatusCode::BAD_GATEWAY);

        let result: Result<(), GuardError> = Err(GuardError::UnknownResource("x".to_string()));
        assert_eq!(
            result.into_response_error().unwrap_err().0,
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_success_passes_through() {
        let result: Result<&str, GuardError> = Ok("token");
        assert_eq!(result.into_response_error().unwrap(), "token");
    }
}
