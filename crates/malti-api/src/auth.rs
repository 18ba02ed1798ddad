//! Request authentication against the shared credential cache.

use actix_web::HttpRequest;

use malti_core::{CredentialCache, Identity, Permission};

use crate::error::AppError;

pub const API_KEY_HEADER: &str = "X-API-Key";

/// Resolve the request's API key to an identity without checking any
/// permission. Never compares keys itself; the cache owns that.
pub fn identify(req: &HttpRequest, credentials: &CredentialCache) -> Result<Identity, AppError> {
    let api_key = req
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|key| !key.is_empty())
        .ok_or(AppError::AuthMissing)?;

    credentials.validate(api_key).ok_or(AppError::AuthInvalid)
}

/// [`identify`], then require a permission on the resolved identity.
pub fn authenticate(
    req: &HttpRequest,
    credentials: &CredentialCache,
    required: Permission,
) -> Result<Identity, AppError> {
    let identity = identify(req, credentials)?;

    if !identity.has_permission(required) {
        return Err(AppError::AuthForbidden(required.as_str()));
    }

    Ok(identity)
}

#[cfg(test)]
mod tests {
    use actix_web::test::TestRequest;
    use tempfile::tempdir;

    use malti_core::{CredentialCache, IdentityKind, Permission};

    use super::{authenticate, API_KEY_HEADER};
    use crate::error::AppError;

    fn cache(dir: &std::path::Path) -> CredentialCache {
        let path = dir.join("malti.toml");
        std::fs::write(
            &path,
            r#"
[services.payments]
api_key = "svc-key"

[users.alice]
api_key = "user-key"
"#,
        )
        .expect("write config");
        CredentialCache::new(path)
    }

    #[test]
    fn missing_header_is_distinguished_from_invalid_key() {
        let dir = tempdir().expect("temp dir");
        let credentials = cache(dir.path());

        let bare = TestRequest::default().to_http_request();
        assert!(matches!(
            authenticate(&bare, &credentials, Permission::Ingest),
            Err(AppError::AuthMissing)
        ));

        let wrong = TestRequest::default()
            .insert_header((API_KEY_HEADER, "nope"))
            .to_http_request();
        assert!(matches!(
            authenticate(&wrong, &credentials, Permission::Ingest),
            Err(AppError::AuthInvalid)
        ));
    }

    #[test]
    fn permission_gate_separates_services_from_users() {
        let dir = tempdir().expect("temp dir");
        let credentials = cache(dir.path());

        let service_req = TestRequest::default()
            .insert_header((API_KEY_HEADER, "svc-key"))
            .to_http_request();
        let identity = authenticate(&service_req, &credentials, Permission::Ingest)
            .expect("service may ingest");
        assert_eq!(identity.kind, IdentityKind::Service);
        assert_eq!(identity.name, "payments");

        // Same key, read permission: forbidden rather than unauthorized.
        assert!(matches!(
            authenticate(&service_req, &credentials, Permission::Metrics),
            Err(AppError::AuthForbidden("metrics"))
        ));

        let user_req = TestRequest::default()
            .insert_header((API_KEY_HEADER, "user-key"))
            .to_http_request();
        assert!(authenticate(&user_req, &credentials, Permission::Metrics).is_ok());
        assert!(matches!(
            authenticate(&user_req, &credentials, Permission::Ingest),
            Err(AppError::AuthForbidden("ingest"))
        ));
    }
}
