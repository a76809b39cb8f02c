use std::collections::HashMap;

use async_trait::async_trait;
use aws_sdk_dynamodb::error::DisplayErrorContext;
use aws_sdk_dynamodb::types::AttributeValue;
use serde_json::{Number, Value};

use crate::adapters::store::{Page, PageFetcher, StoreError};
use crate::runtime::contract::{PartitionQuery, Record};
use crate::runtime::keys::selection_partition_key_condition;

pub type DynamoDbCursor = HashMap<String, AttributeValue>;

/// Queries the selection/partition index one page at a time.
pub struct DynamoDbPageFetcher {
    client: aws_sdk_dynamodb::Client,
    table_name: String,
    index_name: String,
    page_size: i32,
}

impl DynamoDbPageFetcher {
    pub fn new(
        client: aws_sdk_dynamodb::Client,
        table_name: impl Into<String>,
        index_name: impl Into<String>,
        page_size: i32,
    ) -> Self {
        Self {
            client,
            table_name: table_name.into(),
            index_name: index_name.into(),
            page_size,
        }
    }
}

#[async_trait]
impl PageFetcher for DynamoDbPageFetcher {
    type Cursor = DynamoDbCursor;

    async fn fetch_page(
        &self,
        query: &PartitionQuery,
        cursor: Option<DynamoDbCursor>,
    ) -> Result<Page<DynamoDbCursor>, StoreError> {
        let output = self
            .client
            .query()
            .table_name(&self.table_name)
            .index_name(&self.index_name)
            .key_condition_expression(selection_partition_key_condition())
            .expression_attribute_values(
                ":cid",
                AttributeValue::S(query.contest_id().to_string()),
            )
            .expression_attribute_values(
                ":spid",
                AttributeValue::S(query.selection_partition_key()),
            )
            .limit(self.page_size)
            .set_exclusive_start_key(cursor)
            .send()
            .await
            .map_err(|error| StoreError::Query(DisplayErrorContext(&error).to_string()))?;

        let records = output
            .items
            .unwrap_or_default()
            .into_iter()
            .map(item_to_record)
            .collect::<Result<Vec<_>, _>>()?;

        // An empty LastEvaluatedKey also marks the final page.
        match output.last_evaluated_key.filter(|key| !key.is_empty()) {
            Some(cursor) => Ok(Page::with_cursor(records, cursor)),
            None => Ok(Page::last(records)),
        }
    }
}

pub fn item_to_record(item: HashMap<String, AttributeValue>) -> Result<Record, StoreError> {
    item.into_iter()
        .map(|(name, value)| attribute_to_json(&name, value).map(|converted| (name, converted)))
        .collect()
}

fn attribute_to_json(name: &str, value: AttributeValue) -> Result<Value, StoreError> {
    let converted = match value {
        AttributeValue::S(text) => Value::String(text),
        AttributeValue::N(number) => Value::Number(parse_number(name, &number)?),
        AttributeValue::Bool(flag) => Value::Bool(flag),
        AttributeValue::Null(_) => Value::Null,
        AttributeValue::Ss(values) => Value::Array(values.into_iter().map(Value::String).collect()),
        AttributeValue::Ns(values) => Value::Array(
            values
                .iter()
                .map(|number| parse_number(name, number).map(Value::Number))
                .collect::<Result<_, _>>()?,
        ),
        AttributeValue::L(values) => Value::Array(
            values
                .into_iter()
                .map(|value| attribute_to_json(name, value))
                .collect::<Result<_, _>>()?,
        ),
        AttributeValue::M(map) => Value::Object(
            map.into_iter()
                .map(|(key, value)| {
                    let nested = format!("{name}.{key}");
                    attribute_to_json(&nested, value).map(|converted| (key, converted))
                })
                .collect::<Result<_, _>>()?,
        ),
        AttributeValue::B(_) | AttributeValue::Bs(_) => {
            return Err(unsupported(name, "binary values have no JSON form"))
        }
        _ => return Err(unsupported(name, "unknown attribute type")),
    };
    Ok(converted)
}

fn parse_number(name: &str, raw: &str) -> Result<Number, StoreError> {
    serde_json::from_str::<Number>(raw)
        .map_err(|_| unsupported(name, &format!("'{raw}' is not a JSON number")))
}

fn unsupported(name: &str, reason: &str) -> StoreError {
    StoreError::UnsupportedAttribute {
        attribute: name.to_string(),
        reason: reason.to_string(),
    }
}
