//! Image content-type helpers.

/// Media-type prefix accepted on upload.
pub const IMAGE_MEDIA_PREFIX: &str = "image/";

/// Content type served when the origin does not report one.
pub const DEFAULT_IMAGE_CONTENT_TYPE: &str = "image/webp";

/// Check whether a `Content-Type` value names an image.
///
/// Matching is a plain prefix test, so parameters such as
/// `image/png; charset=binary` are accepted.
pub fn is_image_content_type(content_type: &str) -> bool {
    content_type.starts_with(IMAGE_MEDIA_PREFIX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_image_types() {
        assert!(is_image_content_type("image/webp"));
        assert!(is_image_content_type("image/png; charset=binary"));
    }

    #[test]
    fn test_rejects_other_types() {
        assert!(!is_image_content_type("application/json"));
        assert!(!is_image_content_type("text/image/png"));
        assert!(!is_image_content_type(""));
        assert!(!is_image_content_type("Image/png"));
    }
}
