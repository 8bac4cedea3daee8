use serde::{Serialize, Deserialize};
use chrono::{DateTime, Utc};

/// One entry of a bucket listing as the storage service returns it.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct StoredObject {
    pub name: String,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub metadata: Option<ObjectMetadata>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct ObjectMetadata {
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub mimetype: Option<String>,
    #[serde(default, rename = "cacheControl")]
    pub cache_control: Option<String>,
}

impl StoredObject {
    pub fn size(&self) -> u64 {
        self.metadata.as_ref().and_then(|m| m.size).unwrap_or(0)
    }
}

/// A stored object as shown on the drive page.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct FileItem {
    pub id: String,
    pub name: String,
    pub size: u64,
    pub size_label: String,
    pub url: String,
    pub created_at: DateTime<Utc>,
}
