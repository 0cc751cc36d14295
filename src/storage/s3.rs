//! AWS S3 object store.
//!
//! Keys are stored under an optional bucket prefix, `{prefix}/{key}`. The prefix is
//! stripped again when listing so the comment driver only ever sees its own layout.

use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_s3::Client;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use tracing::{debug, error};

use crate::error::{AppError, Result};
use crate::storage::ObjectStore;

const ENGINE: &str = "s3";

/// S3-backed object store.
#[derive(Clone)]
pub struct S3Objects {
    client: Client,
    bucket: String,
    prefix: String,
}

impl S3Objects {
    /// Create a new S3 object store instance.
    pub fn new(client: Client, bucket: impl Into<String>, prefix: Option<String>) -> Self {
        let prefix = prefix
            .map(|p| p.trim_matches('/').to_string())
            .filter(|p| !p.is_empty())
            .map(|p| format!("{p}/"))
            .unwrap_or_default();
        Self {
            client,
            bucket: bucket.into(),
            prefix,
        }
    }

    /// Build a client from the default credential chain for `region`.
    pub async fn connect(bucket: String, region: String, prefix: Option<String>) -> Self {
        let config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(region))
            .load()
            .await;
        Self::new(Client::new(&config), bucket, prefix)
    }

    fn full_key(&self, key: &str) -> String {
        format!("{}{key}", self.prefix)
    }

    fn failure<E>(&self, operation: &str, key: &str, err: E) -> AppError
    where
        E: std::error::Error,
    {
        let message = DisplayErrorContext(err).to_string();
        error!(operation, bucket = %self.bucket, key, error = %message, "S3 request failed");
        AppError::backend(ENGINE, operation, message)
    }
}

#[async_trait]
impl ObjectStore for S3Objects {
    fn engine(&self) -> &'static str {
        ENGINE
    }

    async fn put(&self, key: &str, body: Vec<u8>) -> Result<()> {
        let full = self.full_key(key);
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&full)
            .body(ByteStream::from(body))
            .content_type("application/json")
            .send()
            .await
            .map_err(|e| self.failure("put_object", &full, e))?;

        debug!("Wrote s3://{}/{}", self.bucket, full);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let full = self.full_key(key);
        let result = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(&full)
            .send()
            .await;

        match result {
            Ok(output) => {
                let bytes = output
                    .body
                    .collect()
                    .await
                    .map_err(|e| self.failure("get_object", &full, e))?;
                Ok(Some(bytes.into_bytes().to_vec()))
            }
            Err(err) => {
                let service_err = err.into_service_error();
                if service_err.is_no_such_key() {
                    Ok(None)
                } else {
                    Err(self.failure("get_object", &full, service_err))
                }
            }
        }
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let full = self.full_key(prefix);
        let mut pages = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .prefix(&full)
            .into_paginator()
            .send();

        let mut keys = Vec::new();
        while let Some(page) = pages.next().await {
            let page = page.map_err(|e| self.failure("list_objects_v2", &full, e))?;
            keys.extend(
                page.contents()
                    .iter()
                    .filter_map(|object| object.key())
                    .filter_map(|key| key.strip_prefix(&self.prefix))
                    .map(str::to_string),
            );
        }
        keys.sort();
        Ok(keys)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let full = self.full_key(key);
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(&full)
            .send()
            .await
            .map_err(|e| self.failure("delete_object", &full, e))?;

        debug!("Deleted s3://{}/{}", self.bucket, full);
        Ok(())
    }
}
