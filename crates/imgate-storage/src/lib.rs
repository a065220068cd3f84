//! S3-compatible object store client.
//!
//! This crate provides:
//! - AWS Signature Version 4 request signing
//! - Object get/put/delete over plain HTTP
//! - The `ObjectStore` trait the gateway handlers depend on

pub mod client;
pub mod error;
pub mod metrics;
pub mod signer;

pub use client::{ObjectStore, S3Client, S3Config, StoredObject};
pub use error::{StorageError, StorageResult};
pub use signer::{Credentials, ObjectRequest, SigV4Signer, SignedRequest};
