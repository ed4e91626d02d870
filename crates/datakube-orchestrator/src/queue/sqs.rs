//! SQS-backed queue client

use async_trait::async_trait;
use aws_sdk_sqs::{
    error::DisplayErrorContext,
    types::{Message, QueueAttributeName},
    Client,
};
use tracing::{debug, instrument, warn};

use super::{QueueClient, QueueError, QueueMessage, QueueResult, ReceiveOptions};

/// Queue client bound to one resolved SQS queue URL
#[derive(Clone)]
pub struct SqsQueue {
    client: Client,
    name: String,
    url: String,
}

impl SqsQueue {
    /// Resolve a queue name to its URL.
    ///
    /// Failing here is fatal for the caller: nothing can be consumed or recovered
    /// without a queue URL.
    #[instrument(skip(client))]
    pub async fn resolve(client: Client, name: &str) -> QueueResult<Self> {
        let output = client
            .get_queue_url()
            .queue_name(name)
            .send()
            .await
            .map_err(|e| QueueError::Resolve {
                name: name.to_string(),
                message: DisplayErrorContext(&e).to_string(),
            })?;

        let url = output
            .queue_url()
            .ok_or_else(|| QueueError::Resolve {
                name: name.to_string(),
                message: "response did not contain a queue URL".to_string(),
            })?
            .to_string();

        debug!(queue = %name, url = %url, "Resolved queue URL");

        Ok(Self {
            client,
            name: name.to_string(),
            url,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Convert an SDK message, dropping messages that cannot be deleted later.
fn into_queue_message(message: Message) -> Option<QueueMessage> {
    let Some(receipt_handle) = message.receipt_handle else {
        warn!(message_id = ?message.message_id, "Received message without receipt handle");
        return None;
    };

    Some(QueueMessage {
        id: message.message_id.unwrap_or_default(),
        body: message.body.unwrap_or_default(),
        receipt_handle,
        claimed_checksum: message.md5_of_body.unwrap_or_default(),
    })
}

#[async_trait]
impl QueueClient for SqsQueue {
    async fn receive(&self, options: &ReceiveOptions) -> QueueResult<Vec<QueueMessage>> {
        debug!(
            queue = %self.name,
            max_messages = options.max_messages,
            wait_time_secs = options.wait_time_secs,
            visibility_timeout_secs = options.visibility_timeout_secs,
            "Checking queue"
        );

        let output = self
            .client
            .receive_message()
            .queue_url(&self.url)
            .max_number_of_messages(options.max_messages)
            .wait_time_seconds(options.wait_time_secs)
            .visibility_timeout(options.visibility_timeout_secs)
            .send()
            .await
            .map_err(|e| QueueError::Receive(DisplayErrorContext(&e).to_string()))?;

        Ok(output
            .messages
            .unwrap_or_default()
            .into_iter()
            .filter_map(into_queue_message)
            .collect())
    }

    async fn delete(&self, receipt_handle: &str) -> QueueResult<()> {
        self.client
            .delete_message()
            .queue_url(&self.url)
            .receipt_handle(receipt_handle)
            .send()
            .await
            .map_err(|e| QueueError::Delete(DisplayErrorContext(&e).to_string()))?;

        Ok(())
    }

    async fn send(&self, body: &str) -> QueueResult<()> {
        let output = self
            .client
            .send_message()
            .queue_url(&self.url)
            .message_body(body)
            .send()
            .await
            .map_err(|e| QueueError::Send(DisplayErrorContext(&e).to_string()))?;

        debug!(queue = %self.name, message_id = ?output.message_id(), "Sent message");
        Ok(())
    }

    async fn approximate_count(&self) -> QueueResult<u64> {
        let output = self
            .client
            .get_queue_attributes()
            .queue_url(&self.url)
            .attribute_names(QueueAttributeName::ApproximateNumberOfMessages)
            .send()
            .await
            .map_err(|e| QueueError::Attributes(DisplayErrorContext(&e).to_string()))?;

        let raw = output
            .attributes()
            .and_then(|attrs| attrs.get(&QueueAttributeName::ApproximateNumberOfMessages))
            .map(String::as_str)
            .unwrap_or("0");

        raw.parse().map_err(|_| {
            QueueError::Attributes(format!("ApproximateNumberOfMessages is not a number: {raw}"))
        })
    }

    fn url(&self) -> &str {
        &self.url
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_message_without_receipt_handle_is_dropped() {
        let message = Message::builder().message_id("m-1").body("{}").build();
        assert!(into_queue_message(message).is_none());
    }

    #[test]
    fn test_message_conversion_keeps_checksum() {
        let message = Message::builder()
            .message_id("m-1")
            .receipt_handle("r-1")
            .md5_of_body("99914b932bd37a50b983c5e7c90ae93b")
            .body("{}")
            .build();

        let converted = into_queue_message(message).unwrap();
        assert_eq!(converted.id, "m-1");
        assert_eq!(converted.receipt_handle, "r-1");
        assert_eq!(converted.claimed_checksum, "99914b932bd37a50b983c5e7c90ae93b");
        assert_eq!(converted.body, "{}");
    }
}
