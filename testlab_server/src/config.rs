//! Service configuration — loaded from environment variables.

#[derive(Clone, Debug, Default)]
pub struct TestlabConfig {
    /// Cloud project that owns the test matrices.
    pub project_id: String,
    /// OAuth access token for the Test Lab, Tool Results and Storage APIs.
    pub access_token: String,
    /// Base URL of the Test Lab API.
    pub testing_api_url: String,
    /// Base URL of the Tool Results API.
    pub toolresults_api_url: String,
    /// Bucket holding uploaded binaries and run results.
    pub bucket: String,
    /// HMAC key id used to sign asset URLs.
    pub hmac_access_id: String,
    /// HMAC key secret used to sign asset URLs.
    pub hmac_secret: String,
    /// Lifetime of signed asset URLs in seconds.
    pub signed_url_ttl_secs: u64,
    /// Segment write key; events are only logged when empty.
    pub segment_write_key: String,
    /// Segment tracking endpoint.
    pub segment_url: String,
}

impl TestlabConfig {
    pub fn from_env() -> Self {
        let project_id = std::env::var("TESTLAB_PROJECT_ID").unwrap_or_default();
        let access_token = std::env::var("TESTLAB_ACCESS_TOKEN").unwrap_or_default();
        let testing_api_url = std::env::var("TESTLAB_TESTING_API_URL")
            .unwrap_or_else(|_| "https://testing.googleapis.com".to_string());
        let toolresults_api_url = std::env::var("TESTLAB_TOOLRESULTS_API_URL")
            .unwrap_or_else(|_| "https://toolresults.googleapis.com".to_string());
        let bucket = std::env::var("TESTLAB_BUCKET").unwrap_or_default();
        let hmac_access_id = std::env::var("TESTLAB_HMAC_ACCESS_ID").unwrap_or_default();
        let hmac_secret = std::env::var("TESTLAB_HMAC_SECRET").unwrap_or_default();
        let signed_url_ttl_secs = std::env::var("TESTLAB_SIGNED_URL_TTL_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(3600);
        let segment_write_key = std::env::var("TESTLAB_SEGMENT_WRITE_KEY").unwrap_or_default();
        let segment_url = std::env::var("TESTLAB_SEGMENT_URL")
            .unwrap_or_else(|_| "https://api.segment.io/v1/track".to_string());

        if project_id.is_empty() || access_token.is_empty() {
            tracing::warn!(
                "TESTLAB_PROJECT_ID or TESTLAB_ACCESS_TOKEN not set -- remote test calls will fail"
            );
        }
        if bucket.is_empty() || hmac_access_id.is_empty() || hmac_secret.is_empty() {
            tracing::warn!("Asset bucket or HMAC key not set -- asset URLs unavailable");
        }
        if segment_write_key.is_empty() {
            tracing::warn!("TESTLAB_SEGMENT_WRITE_KEY not set -- analytics events will only be logged");
        }

        Self {
            project_id,
            access_token,
            testing_api_url,
            toolresults_api_url,
            bucket,
            hmac_access_id,
            hmac_secret,
            signed_url_ttl_secs,
            segment_write_key,
            segment_url,
        }
    }
}
