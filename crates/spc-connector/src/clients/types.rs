//! Wire types of the source and destination APIs

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ============================================================================
// Microsoft Graph
// ============================================================================

/// A file or folder in a SharePoint document library
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriveItem {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub web_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified_date_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<FileFacet>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder: Option<FolderFacet>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_reference: Option<ItemReference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub list_item: Option<ListItem>,
}

impl DriveItem {
    pub fn mime_type(&self) -> Option<&str> {
        self.file.as_ref().and_then(|f| f.mime_type.as_deref())
    }

    pub fn drive_id(&self) -> Option<&str> {
        self.parent_reference
            .as_ref()
            .and_then(|p| p.drive_id.as_deref())
    }

    pub fn site_id(&self) -> Option<&str> {
        self.parent_reference
            .as_ref()
            .and_then(|p| p.site_id.as_deref())
    }

    pub fn list_item_fields(&self) -> Option<&Map<String, Value>> {
        self.list_item.as_ref().map(|l| &l.fields)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileFacet {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FolderFacet {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub child_count: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemReference {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub drive_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ListItem {
    #[serde(default)]
    pub fields: Map<String, Value>,
}

/// One discovered file and the configured site it came from.
///
/// This is the payload of a queued job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncItem {
    pub site_id: String,
    pub item: DriveItem,
}

impl SyncItem {
    /// Key identifying the file in file-diff requests and in the job queue
    pub fn diff_key(&self) -> String {
        format!("sharepoint_file_{}", self.item.id)
    }
}

// ============================================================================
// Unique ingestion API
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentRegistrationRequest {
    pub key: String,
    pub mime_type: String,
    pub owner_type: String,
    pub scope_id: String,
    pub source_owner_type: String,
    pub source_kind: String,
    pub source_name: String,
}

/// Content record returned by `contentUpsert`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisteredContent {
    pub id: String,
    pub key: String,
    #[serde(default)]
    pub byte_size: Option<i64>,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub owner_type: Option<String>,
    #[serde(default)]
    pub owner_id: Option<String>,
    #[serde(default)]
    pub write_url: Option<String>,
    #[serde(default)]
    pub read_url: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub internally_stored_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestionFinalizationRequest {
    pub key: String,
    pub mime_type: String,
    pub owner_type: String,
    pub byte_size: u64,
    pub scope_id: String,
    pub source_owner_type: String,
    pub source_name: String,
    pub source_kind: String,
    pub file_url: String,
    pub content_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalizedIngestion {
    pub id: String,
}

/// One entry of a file-diff request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileDiffItem {
    pub id: String,
    pub name: String,
    pub url: String,
    pub updated_at: String,
    pub key: String,
}

impl From<&SyncItem> for FileDiffItem {
    fn from(sync: &SyncItem) -> Self {
        Self {
            id: sync.item.id.clone(),
            name: sync.item.name.clone(),
            url: sync.item.web_url.clone(),
            updated_at: sync.item.last_modified_date_time.clone().unwrap_or_default(),
            key: sync.diff_key(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileDiffRequest {
    pub base_path: String,
    pub partial_key: String,
    pub source_kind: String,
    pub source_name: String,
    pub file_list: Vec<FileDiffItem>,
    pub scope: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileDiffResponse {
    #[serde(default)]
    pub new_and_updated_files: Vec<String>,
    #[serde(default)]
    pub deleted_files: Vec<String>,
    #[serde(default)]
    pub moved_files: Vec<String>,
}
