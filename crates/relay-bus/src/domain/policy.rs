//! # Queue Access Policy
//!
//! Builds the access-control document that lets a topic deliver into a
//! queue. The document grants `SQS:SendMessage` on the queue to any
//! principal, but only when the sender's ARN equals the topic's ARN.
//!
//! Building is pure and deterministic: identical inputs produce
//! byte-identical JSON, so the policy can be re-applied on every start and
//! audited by regeneration.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::resources::ResourceId;

/// Policy language version.
pub const POLICY_VERSION: &str = "2012-10-17";

/// Action granted to the topic.
pub const SEND_MESSAGE_ACTION: &str = "SQS:SendMessage";

/// Condition key matched against the topic ARN.
pub const SOURCE_ARN_KEY: &str = "aws:SourceArn";

const EFFECT_ALLOW: &str = "Allow";
const ANY_PRINCIPAL: &str = "*";
const POLICY_ID_SUFFIX: &str = "sqs-sns-write-policy";

/// Queue access policy document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PolicyDocument {
    pub version: String,
    pub id: String,
    pub statement: Vec<StatementEntry>,
}

/// One grant inside a [`PolicyDocument`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StatementEntry {
    pub effect: String,
    pub principal: String,
    pub action: Vec<String>,
    pub resource: String,
    pub condition: ConditionEntry,
}

/// Condition block of a [`StatementEntry`].
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ConditionEntry {
    #[serde(default)]
    pub arn_equals: BTreeMap<String, String>,
}

impl PolicyDocument {
    /// Authorize `topic` to send into `queue`.
    #[must_use]
    pub fn build(queue: &ResourceId, topic: &ResourceId) -> Self {
        Self {
            version: POLICY_VERSION.to_string(),
            id: format!("{queue}/{POLICY_ID_SUFFIX}"),
            statement: vec![StatementEntry {
                effect: EFFECT_ALLOW.to_string(),
                principal: ANY_PRINCIPAL.to_string(),
                action: vec![SEND_MESSAGE_ACTION.to_string()],
                resource: queue.to_string(),
                condition: ConditionEntry {
                    arn_equals: BTreeMap::from([(SOURCE_ARN_KEY.to_string(), topic.to_string())]),
                },
            }],
        }
    }

    /// Encode as the queue's `Policy` attribute value.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Returns true when some statement lets `source` send into `queue`.
    #[must_use]
    pub fn allows_send(&self, queue: &ResourceId, source: &ResourceId) -> bool {
        self.statement
            .iter()
            .any(|entry| entry.allows_send(queue.as_str(), source.as_str()))
    }
}

impl StatementEntry {
    fn allows_send(&self, queue: &str, source: &str) -> bool {
        let grants_send = self
            .action
            .iter()
            .any(|action| action.eq_ignore_ascii_case(SEND_MESSAGE_ACTION) || action == "*");
        let source_matches = self
            .condition
            .arn_equals
            .get(SOURCE_ARN_KEY)
            .map_or(true, |expected| expected == source);

        self.effect == EFFECT_ALLOW
            && self.principal == ANY_PRINCIPAL
            && grants_send
            && self.resource == queue
            && source_matches
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const QUEUE: &str = "arn:aws:sqs:us-east-1:123456789012:billing";
    const TOPIC: &str = "arn:aws:sns:us-east-1:123456789012:orders";

    fn policy() -> PolicyDocument {
        PolicyDocument::build(&ResourceId::new(QUEUE), &ResourceId::new(TOPIC))
    }

    #[test]
    fn test_build_shape() {
        let doc = policy();
        assert_eq!(doc.version, POLICY_VERSION);
        assert_eq!(doc.id, format!("{QUEUE}/sqs-sns-write-policy"));
        assert_eq!(doc.statement.len(), 1);

        let entry = &doc.statement[0];
        assert_eq!(entry.effect, "Allow");
        assert_eq!(entry.principal, "*");
        assert_eq!(entry.action, vec![SEND_MESSAGE_ACTION.to_string()]);
        assert_eq!(entry.resource, QUEUE);
        assert_eq!(entry.condition.arn_equals.get(SOURCE_ARN_KEY).map(String::as_str), Some(TOPIC));
    }

    #[test]
    fn test_build_is_byte_identical() {
        assert_eq!(policy().to_json().unwrap(), policy().to_json().unwrap());
    }

    #[test]
    fn test_wire_format() {
        let json = policy().to_json().unwrap();
        assert_eq!(
            json,
            format!(
                concat!(
                    r#"{{"Version":"2012-10-17","Id":"{q}/sqs-sns-write-policy","#,
                    r#""Statement":[{{"Effect":"Allow","Principal":"*","#,
                    r#""Action":["SQS:SendMessage"],"Resource":"{q}","#,
                    r#""Condition":{{"ArnEquals":{{"aws:SourceArn":"{t}"}}}}}}]}}"#
                ),
                q = QUEUE,
                t = TOPIC
            )
        );
        assert_eq!(PolicyDocument::from_json(&json).unwrap(), policy());
    }

    #[test]
    fn test_allows_only_the_bound_topic() {
        let doc = policy();
        let queue = ResourceId::new(QUEUE);

        assert!(doc.allows_send(&queue, &ResourceId::new(TOPIC)));
        assert!(!doc.allows_send(&queue, &ResourceId::new("arn:aws:sns:us-east-1:123456789012:other")));
        assert!(!doc.allows_send(
            &ResourceId::new("arn:aws:sqs:us-east-1:123456789012:other"),
            &ResourceId::new(TOPIC)
        ));
    }

    #[test]
    fn test_deny_statement_grants_nothing() {
        let mut doc = policy();
        doc.statement[0].effect = "Deny".to_string();
        assert!(!doc.allows_send(&ResourceId::new(QUEUE), &ResourceId::new(TOPIC)));
    }
}
