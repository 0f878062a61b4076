use serde::Deserialize;

/// Object-created notification as delivered by the trigger platform. Only the
/// fields the handler reads are modelled.
#[derive(Debug, Clone, Deserialize)]
pub struct S3Notification {
    #[serde(rename = "Records", default)]
    pub records: Vec<S3EventRecord>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct S3EventRecord {
    pub s3: S3Entity,
}

#[derive(Debug, Clone, Deserialize)]
pub struct S3Entity {
    pub bucket: S3Bucket,
    pub object: S3Object,
}

#[derive(Debug, Clone, Deserialize)]
pub struct S3Bucket {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct S3Object {
    pub key: String,
}

/// The single object an invocation is about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectTarget {
    pub bucket: String,
    pub key: String,
}

impl S3Notification {
    /// Bucket and key of the first record. Notification payloads have been
    /// seen with trailing whitespace on the key, so it is trimmed here.
    pub fn target(&self) -> Option<ObjectTarget> {
        self.records.first().map(|record| ObjectTarget {
            bucket: record.s3.bucket.name.trim().to_string(),
            key: record.s3.object.key.trim().to_string(),
        })
    }

    pub fn for_object(bucket: &str, key: &str) -> Self {
        Self {
            records: vec![S3EventRecord {
                s3: S3Entity {
                    bucket: S3Bucket {
                        name: bucket.to_string(),
                    },
                    object: S3Object {
                        key: key.to_string(),
                    },
                },
            }],
        }
    }
}
