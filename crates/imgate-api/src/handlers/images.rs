//! Image handlers.
//!
//! Invariant kept across PUT and DELETE: the origin holds an object for a
//! file hash iff its grant set is non-empty. The first grant uploads, the
//! last revocation deletes.

use axum::body::Body;
use axum::http::header::{
    ACCESS_CONTROL_ALLOW_ORIGIN, AUTHORIZATION, CACHE_CONTROL, CONTENT_LENGTH, CONTENT_TYPE,
};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use http_body_util::{BodyExt, LengthLimitError, Limited};
use imgate_models::{is_image_content_type, ImagePath, DEFAULT_IMAGE_CONTENT_TYPE};
use imgate_storage::{StorageError, StoredObject};
use subtle::ConstantTimeEq;
use tracing::{debug, info, warn};

use crate::cache::{CachedResponse, Lookup};
use crate::config::IMAGE_CACHE_TTL;
use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::state::AppState;

const IMAGE_CACHE_CONTROL: &str = "public, max-age=31536000";

/// The routed parts of an image request.
#[derive(Debug, Clone, Copy)]
pub struct ImageRequest<'a> {
    pub image: &'a ImagePath,
    /// Request path and query, as received
    pub cache_key: &'a str,
    pub headers: &'a HeaderMap,
}

/// Serve an image the requesting user holds a grant for.
pub async fn get_image(state: &AppState, req: &ImageRequest<'_>) -> CachedResponse {
    let fill = match state.cache.lookup(req.image, req.cache_key).await {
        Lookup::Hit(hit) => {
            debug!(key = req.cache_key, "Cache hit");
            return hit;
        }
        Lookup::Miss(fill) => fill,
    };

    if !has_access(state, req.image).await {
        // Denials are cached too so repeated lookups stay cheap.
        let response = ApiError::NotFound.to_cached();
        state
            .cache
            .populate(fill, response.clone(), state.config.negative_cache_ttl);
        return response;
    }

    let object = match state.storage.get_object(&req.image.file_hash).await {
        Ok(object) => object,
        Err(e) => {
            warn!(
                file_hash = %req.image.file_hash,
                error = %e,
                "Origin fetch failed"
            );
            return ApiError::NotFound.to_cached();
        }
    };

    let response = image_response(object);
    state.cache.populate(fill, response.clone(), IMAGE_CACHE_TTL);
    response
}

/// GET with the body dropped. Cache and access side effects are identical.
pub async fn head_image(state: &AppState, req: &ImageRequest<'_>) -> CachedResponse {
    get_image(state, req).await.without_body()
}

/// Upload an image, or grant access to one already stored.
pub async fn put_image(state: &AppState, req: &ImageRequest<'_>, body: Body) -> ApiResult<Response> {
    authorize(&state.config.upload_token, req.headers)?;

    let content_type = req
        .headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .filter(|ct| is_image_content_type(ct))
        .ok_or(ApiError::InvalidContentType)?
        .to_string();

    let max = state.config.max_upload_bytes;
    if declared_length(req.headers) > max as u64 {
        return Err(ApiError::PayloadTooLarge);
    }

    let ImagePath {
        user_id, file_hash, ..
    } = req.image;

    let already_stored = match state.acl.member_count(file_hash).await {
        Ok(count) => count > 0,
        Err(e) => {
            warn!(file_hash = %file_hash, error = %e, "Grant count failed, uploading");
            false
        }
    };

    if already_stored {
        state
            .acl
            .add(file_hash, user_id)
            .await
            .map_err(|e| ApiError::upstream("Failed to add user to image", e))?;
        state.cache.invalidate(req.image).await;

        info!(file_hash = %file_hash, user_id = %user_id, "Granted access to stored image");
        return Ok(no_content());
    }

    let data = read_body(body, max).await?;
    let size = data.len();

    state
        .storage
        .put_object(file_hash, data, &content_type)
        .await
        .map_err(|e| ApiError::upstream("Failed to upload image", e))?;

    state
        .acl
        .add(file_hash, user_id)
        .await
        .map_err(|e| ApiError::upstream("Failed to add user to image", e))?;

    state.cache.invalidate(req.image).await;

    info!(
        file_hash = %file_hash,
        user_id = %user_id,
        content_type = %content_type,
        size,
        "Uploaded image"
    );
    Ok(no_content())
}

/// Revoke the requesting user's grant, deleting the object with the last one.
pub async fn delete_image(state: &AppState, req: &ImageRequest<'_>) -> ApiResult<Response> {
    authorize(&state.config.upload_token, req.headers)?;

    let ImagePath {
        user_id, file_hash, ..
    } = req.image;

    if !has_access(state, req.image).await {
        return Err(ApiError::NotFound);
    }

    state
        .acl
        .remove(file_hash, user_id)
        .await
        .map_err(|e| ApiError::upstream("Failed to remove user from image", e))?;

    match state.acl.member_count(file_hash).await {
        Ok(0) => match state.storage.delete_object(file_hash).await {
            Ok(()) | Err(StorageError::NotFound(_)) => {
                info!(file_hash = %file_hash, "Deleted image after last grant removed");
            }
            Err(e) => return Err(ApiError::upstream("Failed to delete image", e)),
        },
        Ok(remaining) => {
            debug!(file_hash = %file_hash, remaining, "Image still shared, keeping origin object");
        }
        Err(e) => {
            warn!(
                file_hash = %file_hash,
                error = %e,
                "Grant count failed after revoke, origin delete skipped"
            );
        }
    }

    let dropped = state.cache.invalidate(req.image).await;
    if let Some(purge) = &state.purge {
        purge.schedule(&state.background, req.cache_key);
        for key in dropped.iter().filter(|key| key.as_str() != req.cache_key) {
            purge.schedule(&state.background, key);
        }
    }

    info!(file_hash = %file_hash, user_id = %user_id, "Revoked access to image");
    Ok(no_content())
}

/// Read-side grant check. Backend errors deny.
async fn has_access(state: &AppState, image: &ImagePath) -> bool {
    match state.acl.is_member(&image.file_hash, &image.user_id).await {
        Ok(true) => true,
        Ok(false) => {
            metrics::record_access_denied("denied");
            false
        }
        Err(e) => {
            metrics::record_access_denied("error");
            warn!(
                file_hash = %image.file_hash,
                user_id = %image.user_id,
                error = %e,
                "Access check failed, denying"
            );
            false
        }
    }
}

/// Compare the bearer token in constant time.
fn authorize(token: &str, headers: &HeaderMap) -> ApiResult<()> {
    let expected = format!("Bearer {}", token);
    match headers.get(AUTHORIZATION) {
        Some(value) if bool::from(value.as_bytes().ct_eq(expected.as_bytes())) => Ok(()),
        _ => Err(ApiError::Unauthorized),
    }
}

/// `Content-Length` as declared. Missing or unparseable counts as zero.
fn declared_length(headers: &HeaderMap) -> u64 {
    headers
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(0)
}

async fn read_body(body: Body, max: usize) -> ApiResult<Bytes> {
    let data = Limited::new(body, max)
        .collect()
        .await
        .map_err(|e| {
            if e.downcast_ref::<LengthLimitError>().is_some() {
                ApiError::PayloadTooLarge
            } else {
                warn!(error = %e, "Failed to read upload body");
                ApiError::InvalidBody
            }
        })?
        .to_bytes();

    if data.len() > max {
        return Err(ApiError::PayloadTooLarge);
    }
    Ok(data)
}

fn image_response(object: StoredObject) -> CachedResponse {
    let content_type = object
        .content_type
        .as_deref()
        .and_then(|ct| HeaderValue::from_str(ct).ok())
        .unwrap_or_else(|| HeaderValue::from_static(DEFAULT_IMAGE_CONTENT_TYPE));

    let mut headers = HeaderMap::new();
    headers.insert(CACHE_CONTROL, HeaderValue::from_static(IMAGE_CACHE_CONTROL));
    headers.insert(CONTENT_TYPE, content_type);
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));

    CachedResponse {
        status: StatusCode::OK,
        headers,
        body: object.body,
    }
}

fn no_content() -> Response {
    (StatusCode::NO_CONTENT, [(ACCESS_CONTROL_ALLOW_ORIGIN, "*")]).into_response()
}
