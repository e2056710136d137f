//! Object-created notifications in the S3 event document shape.

use serde::{Deserialize, Serialize};

/// A notification document as delivered by the object store.
///
/// Only the fields the pipeline reads are modelled; everything else in the
/// document is ignored during deserialization.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct S3Event {
    #[serde(rename = "Records", default)]
    pub records: Vec<S3EventRecord>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct S3EventRecord {
    /// e.g. `ObjectCreated:Put`
    #[serde(rename = "eventName", default, skip_serializing_if = "Option::is_none")]
    pub event_name: Option<String>,

    pub s3: S3Entity,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct S3Entity {
    pub bucket: S3Bucket,
    pub object: S3Object,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct S3Bucket {
    pub name: String,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct S3Object {
    /// Object key, URL-encoded with spaces as `+`.
    pub key: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<i64>,
}

/// A single file-arrival notification: one bucket, one still-encoded key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Notification {
    pub bucket: String,
    pub raw_key: String,
}

impl Notification {
    pub fn new(bucket: impl Into<String>, raw_key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            raw_key: raw_key.into(),
        }
    }
}

impl S3Event {
    /// The notification carried by the first record, if any.
    ///
    /// Invocations are framed as one record each; trailing records are not read.
    pub fn first_notification(&self) -> Option<Notification> {
        self.records
            .first()
            .map(|record| Notification::new(&record.s3.bucket.name, &record.s3.object.key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
{
  "Records": [
    {
      "eventVersion": "2.1",
      "eventSource": "aws:s3",
      "eventName": "ObjectCreated:Put",
      "s3": {
        "s3SchemaVersion": "1.0",
        "bucket": { "name": "docs", "arn": "arn:aws:s3:::docs" },
        "object": { "key": "inbox/invoice+1.pdf", "size": 20480, "eTag": "abc" }
      }
    },
    {
      "eventName": "ObjectCreated:Put",
      "s3": {
        "bucket": { "name": "other" },
        "object": { "key": "ignored.txt" }
      }
    }
  ]
}"#;

    #[test]
    fn first_record_is_the_notification() {
        let event: S3Event = serde_json::from_str(SAMPLE).unwrap();
        assert_eq!(event.records.len(), 2);
        assert_eq!(
            event.first_notification(),
            Some(Notification::new("docs", "inbox/invoice+1.pdf"))
        );
        assert_eq!(event.records[0].s3.object.size, Some(20480));
    }

    #[test]
    fn empty_document_has_no_notification() {
        let event: S3Event = serde_json::from_str("{}").unwrap();
        assert!(event.first_notification().is_none());
    }
}
