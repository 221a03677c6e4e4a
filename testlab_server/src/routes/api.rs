//! JSON bodies of the test API that are not domain types themselves.

use serde::{Deserialize, Serialize};

use crate::assets::DownloadUrl;

#[derive(Debug, Serialize, Deserialize)]
pub struct StartRunResponse {
    pub matrix_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DownloadsResponse {
    pub files: Vec<DownloadUrl>,
}
