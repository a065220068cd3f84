//! Shared types for the imgate image gateway.
//!
//! This crate provides:
//! - The `/images/{user_id}/{file_hash}.{ext}` path grammar
//! - Image content-type helpers

pub mod content_type;
pub mod image_path;

pub use content_type::{is_image_content_type, DEFAULT_IMAGE_CONTENT_TYPE, IMAGE_MEDIA_PREFIX};
pub use image_path::{ImagePath, ImagePathError};
