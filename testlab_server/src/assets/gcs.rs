//! Cloud Storage asset broker with V4 (HMAC key) signed URLs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::{Digest, Sha256};

use super::{object_path, results_prefix, AssetBroker, AssetError, AssetKind, DownloadUrl, UploadUrls};
use crate::config::TestlabConfig;

type HmacSha256 = Hmac<Sha256>;

const STORAGE_HOST: &str = "storage.googleapis.com";
const ALGORITHM: &str = "GOOG4-HMAC-SHA256";

/// Signs path-style V4 URLs with an HMAC key; `host` is the only signed header.
#[derive(Clone)]
pub struct UrlSigner {
    access_id: String,
    secret: String,
    ttl_secs: u64,
}

fn hmac_sha256(key: &[u8], data: &str) -> Result<Vec<u8>, AssetError> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|e| AssetError::Request(format!("invalid signing key: {e}")))?;
    mac.update(data.as_bytes());
    Ok(mac.finalize().into_bytes().to_vec())
}

/// RFC 3986 percent-encoding as Cloud Storage canonicalizes it.
fn uri_encode(input: &str, keep_slash: bool) -> String {
    let mut out = String::with_capacity(input.len());
    for byte in input.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                out.push(byte as char)
            }
            b'/' if keep_slash => out.push('/'),
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

impl UrlSigner {
    pub fn new(access_id: &str, secret: &str, ttl_secs: u64) -> Self {
        Self {
            access_id: access_id.to_string(),
            secret: secret.to_string(),
            ttl_secs,
        }
    }

    pub fn sign(
        &self,
        method: &str,
        bucket: &str,
        object: &str,
        now: DateTime<Utc>,
    ) -> Result<String, AssetError> {
        let date = now.format("%Y%m%d").to_string();
        let timestamp = now.format("%Y%m%dT%H%M%SZ").to_string();
        let scope = format!("{date}/auto/storage/goog4_request");
        let credential = format!("{}/{scope}", self.access_id);

        let mut params = vec![
            ("X-Goog-Algorithm", ALGORITHM.to_string()),
            ("X-Goog-Credential", credential),
            ("X-Goog-Date", timestamp.clone()),
            ("X-Goog-Expires", self.ttl_secs.to_string()),
            ("X-Goog-SignedHeaders", "host".to_string()),
        ];
        params.sort_by(|a, b| a.0.cmp(b.0));
        let query = params
            .iter()
            .map(|(k, v)| format!("{}={}", uri_encode(k, false), uri_encode(v, false)))
            .collect::<Vec<_>>()
            .join("&");

        let path = format!("/{}/{}", uri_encode(bucket, false), uri_encode(object, true));
        let canonical_request = format!(
            "{method}\n{path}\n{query}\nhost:{STORAGE_HOST}\n\nhost\nUNSIGNED-PAYLOAD"
        );
        let string_to_sign = format!(
            "{ALGORITHM}\n{timestamp}\n{scope}\n{}",
            hex::encode(Sha256::digest(canonical_request.as_bytes()))
        );

        let key = hmac_sha256(format!("GOOG4{}", self.secret).as_bytes(), &date)?;
        let key = hmac_sha256(&key, "auto")?;
        let key = hmac_sha256(&key, "storage")?;
        let key = hmac_sha256(&key, "goog4_request")?;
        let signature = hex::encode(hmac_sha256(&key, &string_to_sign)?);

        Ok(format!(
            "https://{STORAGE_HOST}{path}?{query}&X-Goog-Signature={signature}"
        ))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ObjectList {
    #[serde(default)]
    items: Vec<ObjectItem>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ObjectItem {
    name: String,
}

#[derive(Clone)]
pub struct GcsAssetBroker {
    http: reqwest::Client,
    bucket: String,
    access_token: String,
    signer: UrlSigner,
}

impl GcsAssetBroker {
    pub fn from_config(config: &TestlabConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            bucket: config.bucket.clone(),
            access_token: config.access_token.clone(),
            signer: UrlSigner::new(
                &config.hmac_access_id,
                &config.hmac_secret,
                config.signed_url_ttl_secs,
            ),
        }
    }

    fn ensure_configured(&self) -> Result<(), AssetError> {
        if self.bucket.is_empty() {
            return Err(AssetError::NotConfigured("TESTLAB_BUCKET"));
        }
        if self.signer.access_id.is_empty() || self.signer.secret.is_empty() {
            return Err(AssetError::NotConfigured("TESTLAB_HMAC_ACCESS_ID/TESTLAB_HMAC_SECRET"));
        }
        Ok(())
    }

    async fn list_objects(&self, prefix: &str) -> Result<Vec<String>, AssetError> {
        let url = format!("https://{STORAGE_HOST}/storage/v1/b/{}/o", self.bucket);
        let mut names = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut query = vec![
                ("prefix", prefix.to_string()),
                ("fields", "items(name),nextPageToken".to_string()),
            ];
            if let Some(token) = &page_token {
                query.push(("pageToken", token.clone()));
            }

            let resp = self
                .http
                .get(&url)
                .query(&query)
                .bearer_auth(&self.access_token)
                .send()
                .await
                .map_err(|e| AssetError::Request(e.to_string()))?;
            let status = resp.status();
            if !status.is_success() {
                let body = resp.text().await.unwrap_or_default();
                return Err(AssetError::Status {
                    status: status.as_u16(),
                    body,
                });
            }
            let page: ObjectList = resp
                .json()
                .await
                .map_err(|e| AssetError::Request(e.to_string()))?;

            names.extend(page.items.into_iter().map(|item| item.name));
            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        Ok(names)
    }
}

#[async_trait]
impl AssetBroker for GcsAssetBroker {
    async fn upload_urls(&self, build_slug: &str) -> Result<UploadUrls, AssetError> {
        self.ensure_configured()?;
        let now = Utc::now();
        let sign = |kind: AssetKind| {
            self.signer
                .sign("PUT", &self.bucket, &object_path(build_slug, kind), now)
        };

        Ok(UploadUrls {
            app_apk: sign(AssetKind::AppApk)?,
            test_apk: sign(AssetKind::TestApk)?,
            xctest_zip: sign(AssetKind::XcTestZip)?,
        })
    }

    async fn download_urls(&self, build_slug: &str) -> Result<Vec<DownloadUrl>, AssetError> {
        self.ensure_configured()?;
        let prefix = format!("{}/", results_prefix(build_slug));
        let now = Utc::now();

        self.list_objects(&prefix)
            .await?
            .into_iter()
            .map(|name| {
                self.signer
                    .sign("GET", &self.bucket, &name, now)
                    .map(|url| DownloadUrl { name, url })
            })
            .collect()
    }
}
