use serde::{Deserialize, Serialize};

/// A file written to the upload directory, waiting to be attached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagedFile {
    #[serde(rename = "name")]
    pub display_name: String,
    #[serde(rename = "path")]
    pub storage_path: String,
}

/// Entry of the upload directory listing.
#[derive(Debug, Clone, Serialize)]
pub struct UploadedFileInfo {
    pub name: String,
    pub path: String,
    pub size: u64,
    pub created: Option<String>,
}
