//! DynamoDB implementation of [`WideColumnTable`].

use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_dynamodb::Client;
use aws_sdk_dynamodb::error::{DisplayErrorContext, ProvideErrorMetadata};
use aws_sdk_dynamodb::types::{AttributeValue, ReturnValue, Select};
use tracing::{debug, error};

use crate::error::{AppError, Result};
use crate::storage::wide_column::{Item, QueryPlan, WideColumnTable};

const ENGINE: &str = "dynamodb";

/// A comments table in DynamoDB (or anything speaking its API, e.g. DynamoDB Local).
#[derive(Clone)]
pub struct DynamoTable {
    client: Client,
    table: String,
}

impl DynamoTable {
    pub fn new(client: Client, table: impl Into<String>) -> Self {
        Self {
            client,
            table: table.into(),
        }
    }

    /// Build a client from the default credential chain, optionally against a custom endpoint.
    pub async fn connect(table: String, region: String, endpoint: Option<String>) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest()).region(Region::new(region));
        if let Some(endpoint) = endpoint {
            loader = loader.endpoint_url(endpoint);
        }
        let config = loader.load().await;
        Self::new(Client::new(&config), table)
    }

    /// Classify an SDK failure, keeping the service error code when there is one.
    fn failure<E>(&self, operation: &str, err: E) -> AppError
    where
        E: ProvideErrorMetadata + std::error::Error,
    {
        let message = match (err.code(), err.message()) {
            (Some(code), Some(message)) => format!("{code}: {message}"),
            (Some(code), None) => code.to_string(),
            _ => DisplayErrorContext(&err).to_string(),
        };
        error!(operation, table = %self.table, error = %message, "DynamoDB request failed");
        AppError::backend(ENGINE, operation, message)
    }
}

#[async_trait]
impl WideColumnTable for DynamoTable {
    async fn put_item(&self, item: Item) -> Result<()> {
        self.client
            .put_item()
            .table_name(&self.table)
            .set_item(Some(item))
            .send()
            .await
            .map_err(|e| self.failure("put_item", e))?;
        Ok(())
    }

    async fn query(&self, plan: &QueryPlan) -> Result<Vec<Item>> {
        let mut pages = self
            .client
            .query()
            .table_name(&self.table)
            .set_index_name(plan.index_name().map(str::to_string))
            .key_condition_expression(plan.key_condition_expression())
            .set_filter_expression(plan.filter_expression().map(str::to_string))
            .set_expression_attribute_values(Some(plan.expression_values()))
            .into_paginator()
            .send();

        let mut items = Vec::new();
        while let Some(page) = pages.next().await {
            let page = page.map_err(|e| self.failure("query", e))?;
            items.extend(page.items().iter().cloned());
        }
        debug!(table = %self.table, count = items.len(), "queried comments");
        Ok(items)
    }

    async fn count(&self, plan: &QueryPlan) -> Result<usize> {
        let mut pages = self
            .client
            .query()
            .table_name(&self.table)
            .set_index_name(plan.index_name().map(str::to_string))
            .key_condition_expression(plan.key_condition_expression())
            .set_filter_expression(plan.filter_expression().map(str::to_string))
            .set_expression_attribute_values(Some(plan.expression_values()))
            .select(Select::Count)
            .into_paginator()
            .send();

        let mut total = 0;
        while let Some(page) = pages.next().await {
            let page = page.map_err(|e| self.failure("count", e))?;
            total += usize::try_from(page.count()).unwrap_or_default();
        }
        Ok(total)
    }

    async fn delete_item(&self, site_id: &str, comment_id: &str) -> Result<Option<Item>> {
        let output = self
            .client
            .delete_item()
            .table_name(&self.table)
            .key("SiteID", AttributeValue::S(site_id.to_string()))
            .key("CommentID", AttributeValue::S(comment_id.to_string()))
            .return_values(ReturnValue::AllOld)
            .send()
            .await
            .map_err(|e| self.failure("delete_item", e))?;

        Ok(output.attributes.filter(|old| !old.is_empty()))
    }
}
