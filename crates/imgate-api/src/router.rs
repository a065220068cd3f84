//! Request dispatch for the image surface.
//!
//! Checks run in a fixed order: `OPTIONS` is answered for any path, then the
//! method is checked, then the path is parsed.

use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::Method;
use axum::response::{IntoResponse, Response};
use imgate_models::ImagePath;
use tracing::debug;

use crate::error::ApiError;
use crate::handlers::{delete_image, get_image, head_image, preflight, put_image, ImageRequest};
use crate::state::AppState;

/// Methods served on image paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageMethod {
    Get,
    Head,
    Put,
    Delete,
}

/// Outcome of routing one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Preflight,
    Image { method: ImageMethod, path: ImagePath },
}

/// Resolve a method and path to a route.
pub fn resolve(method: &Method, path: &str) -> Result<Route, ApiError> {
    let method = match *method {
        Method::OPTIONS => return Ok(Route::Preflight),
        Method::GET => ImageMethod::Get,
        Method::HEAD => ImageMethod::Head,
        Method::PUT => ImageMethod::Put,
        Method::DELETE => ImageMethod::Delete,
        _ => return Err(ApiError::MethodNotAllowed),
    };

    let path = ImagePath::parse(path).map_err(|e| {
        debug!(error = %e, "Unroutable path");
        ApiError::NotFound
    })?;

    Ok(Route::Image { method, path })
}

/// Fallback handler serving every non-operational request.
pub async fn dispatch(State(state): State<AppState>, request: Request<Body>) -> Response {
    let route = match resolve(request.method(), request.uri().path()) {
        Ok(route) => route,
        Err(e) => return e.into_response(),
    };

    let (image, method) = match route {
        Route::Preflight => return preflight().into_response(),
        Route::Image { method, path } => (path, method),
    };

    let (parts, body) = request.into_parts();
    let cache_key = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| parts.uri.path().to_string());

    let req = ImageRequest {
        image: &image,
        cache_key: &cache_key,
        headers: &parts.headers,
    };

    match method {
        ImageMethod::Get => get_image(&state, &req).await.into_response(),
        ImageMethod::Head => head_image(&state, &req).await.into_response(),
        ImageMethod::Put => put_image(&state, &req, body).await.into_response(),
        ImageMethod::Delete => delete_image(&state, &req).await.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_on_any_path() {
        assert_eq!(resolve(&Method::OPTIONS, "/nope").unwrap(), Route::Preflight);
        assert_eq!(
            resolve(&Method::OPTIONS, "/images/u1/abcd.webp").unwrap(),
            Route::Preflight
        );
    }

    #[test]
    fn test_method_checked_before_path() {
        assert!(matches!(
            resolve(&Method::POST, "/nope"),
            Err(ApiError::MethodNotAllowed)
        ));
        assert!(matches!(
            resolve(&Method::PATCH, "/images/u1/abcd.webp"),
            Err(ApiError::MethodNotAllowed)
        ));
    }

    #[test]
    fn test_unmatched_path_is_not_found() {
        assert!(matches!(
            resolve(&Method::GET, "/images/u1/abcd"),
            Err(ApiError::NotFound)
        ));
        assert!(matches!(
            resolve(&Method::DELETE, "/images/u1/x/abcd.webp"),
            Err(ApiError::NotFound)
        ));
    }

    #[test]
    fn test_image_route() {
        let route = resolve(&Method::HEAD, "/images/u1/a.b.webp").unwrap();
        assert_eq!(
            route,
            Route::Image {
                method: ImageMethod::Head,
                path: ImagePath::new("u1", "a.b", "webp"),
            }
        );
    }
}
