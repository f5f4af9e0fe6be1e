use crate::registry::{RegistryFile, RegistryProject, ReleaseType};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use reqwest::{header, Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

/// CurseForge class id for game mods
const MOD_CLASS_ID: u32 = 6;
const PAGE_SIZE: u32 = 50;
/// Default upper bound on file pages fetched per project
const MAX_PAGES: u32 = 40;

/// Client for a CurseForge-compatible REST API
pub struct HttpRegistryClient {
    base_url: String,
    game_id: u32,
    max_pages: u32,
    client: Client,
}

#[derive(Deserialize)]
struct CFListResponse<T> {
    data: Vec<T>,
    pagination: Option<CFPagination>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CFPagination {
    total_count: u32,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CFMod {
    id: u64,
    name: String,
    slug: String,
    links: Option<CFLinks>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CFLinks {
    website_url: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CFFile {
    id: u64,
    file_name: String,
    release_type: u8,
    #[serde(default)]
    game_versions: Vec<String>,
    file_date: DateTime<Utc>,
    download_url: Option<String>,
}

impl CFFile {
    fn into_registry_file(self) -> RegistryFile {
        let download_url = self
            .download_url
            .filter(|url| !url.is_empty())
            .unwrap_or_else(|| cdn_url(self.id, &self.file_name));

        RegistryFile {
            id: self.id,
            release_type: match self.release_type {
                2 => ReleaseType::Beta,
                3 => ReleaseType::Alpha,
                _ => ReleaseType::Release,
            },
            file_name: self.file_name,
            download_url,
            game_versions: self.game_versions,
            file_date: self.file_date,
        }
    }
}

/// CDN location of a file the API hides the download URL for
fn cdn_url(file_id: u64, file_name: &str) -> String {
    format!(
        "https://edge.forgecdn.net/files/{}/{}/{}",
        file_id / 1000,
        file_id % 1000,
        urlencoding::encode(file_name)
    )
}

impl HttpRegistryClient {
    pub fn new(base_url: String, api_key: Option<String>, game_id: u32, user_agent: &str) -> Result<Self> {
        let mut headers = header::HeaderMap::new();
        headers.insert(header::ACCEPT, header::HeaderValue::from_static("application/json"));
        if let Some(key) = api_key.filter(|k| !k.is_empty()) {
            let value = header::HeaderValue::from_str(&key)
                .map_err(|_| Error::Other("registry.api_key contains invalid characters".to_string()))?;
            headers.insert("x-api-key", value);
        }

        let client = Client::builder()
            .user_agent(user_agent)
            .default_headers(headers)
            .connect_timeout(Duration::from_secs(15))
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| Error::transport("Failed to build HTTP client", e))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            game_id,
            max_pages: MAX_PAGES,
            client,
        })
    }

    /// Cap the number of file pages fetched per project (at least one)
    pub fn with_max_pages(mut self, max_pages: u32) -> Self {
        self.max_pages = max_pages.max(1);
        self
    }

    /// Find a project by slug and list all of its files
    pub async fn get_project(&self, slug: &str) -> Result<RegistryProject> {
        let url = format!(
            "{}/v1/mods/search?gameId={}&classId={}&slug={}",
            self.base_url,
            self.game_id,
            MOD_CLASS_ID,
            urlencoding::encode(slug)
        );

        let search: CFListResponse<CFMod> = self.get_json(&url, slug).await?;
        let found = search
            .data
            .into_iter()
            .find(|m| m.slug == slug)
            .ok_or_else(|| Error::Resolution {
                slug: slug.to_string(),
                reason: "no project with this slug in the repository".to_string(),
            })?;

        debug!("Project {} has id {}", slug, found.id);
        let files = self.get_files(slug, found.id).await?;

        Ok(RegistryProject {
            id: found.id,
            slug: found.slug,
            name: found.name,
            url: found
                .links
                .and_then(|l| l.website_url)
                .unwrap_or_default(),
            files,
        })
    }

    async fn get_files(&self, slug: &str, project_id: u64) -> Result<Vec<RegistryFile>> {
        let mut files = Vec::new();
        let mut index = 0;
        let mut total = 0;

        for _ in 0..self.max_pages {
            let url = format!(
                "{}/v1/mods/{}/files?index={}&pageSize={}",
                self.base_url, project_id, index, PAGE_SIZE
            );
            let page: CFListResponse<CFFile> = self.get_json(&url, slug).await?;

            let count = page.data.len() as u32;
            files.extend(page.data.into_iter().map(CFFile::into_registry_file));

            total = page.pagination.map(|p| p.total_count).unwrap_or(0);
            if count < PAGE_SIZE || index + count >= total {
                break;
            }
            index += count;
        }

        if (files.len() as u32) < total {
            warn!(
                "Listed only {} of {} files for {}; the newest matching file may be missing",
                files.len(),
                total,
                slug
            );
        }

        debug!("Fetched {} file(s) for {}", files.len(), slug);
        Ok(files)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str, slug: &str) -> Result<T> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Error::transport(&format!("Cannot reach registry at {}", self.base_url), e))?;

        let status = response.status();

        if status == StatusCode::NOT_FOUND {
            return Err(Error::Resolution {
                slug: slug.to_string(),
                reason: "not found in the repository".to_string(),
            });
        }

        if !status.is_success() {
            let message = match status.as_u16() {
                401 | 403 => format!(
                    "Registry rejected the request (HTTP {}). Check registry.api_key or MODPACK_BUILDER_API_KEY.",
                    status.as_u16()
                ),
                500 | 502 | 503 | 504 => format!(
                    "Registry server error (HTTP {}). Please try again later.",
                    status.as_u16()
                ),
                _ => format!("Registry error: HTTP {}", status.as_u16()),
            };
            return Err(Error::Transport(message));
        }

        response
            .json()
            .await
            .map_err(|e| Error::Transport(format!("Failed to parse registry response: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    const SEARCH_JEI: &str = r#"{
        "data": [
            {"id": 238222, "name": "Just Enough Items", "slug": "jei",
             "links": {"websiteUrl": "https://www.curseforge.com/minecraft/mc-mods/jei"}}
        ],
        "pagination": {"index": 0, "pageSize": 50, "resultCount": 1, "totalCount": 1}
    }"#;

    fn client(server: &mockito::ServerGuard, key: Option<&str>) -> HttpRegistryClient {
        HttpRegistryClient::new(server.url(), key.map(str::to_string), 432, "modpack-builder-test").unwrap()
    }

    #[tokio::test]
    async fn test_get_project_maps_files() {
        let mut server = mockito::Server::new_async().await;
        let search = server
            .mock("GET", "/v1/mods/search")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("gameId".into(), "432".into()),
                Matcher::UrlEncoded("classId".into(), "6".into()),
                Matcher::UrlEncoded("slug".into(), "jei".into()),
            ]))
            .match_header("x-api-key", "secret")
            .with_body(SEARCH_JEI)
            .create_async()
            .await;
        let files = server
            .mock("GET", "/v1/mods/238222/files")
            .match_query(Matcher::Any)
            .with_body(
                r#"{
                    "data": [
                        {"id": 2995910, "fileName": "jei_1.12.2.jar", "releaseType": 1,
                         "gameVersions": ["1.12.2", "Forge"], "fileDate": "2020-06-24T10:00:00Z",
                         "downloadUrl": "https://edge.forgecdn.net/files/2995/910/jei_1.12.2.jar"},
                        {"id": 3040523, "fileName": "jei beta.jar", "releaseType": 2,
                         "gameVersions": ["1.12.2"], "fileDate": "2020-08-01T10:00:00Z",
                         "downloadUrl": null}
                    ],
                    "pagination": {"index": 0, "pageSize": 50, "resultCount": 2, "totalCount": 2}
                }"#,
            )
            .create_async()
            .await;

        let project = client(&server, Some("secret")).get_project("jei").await.unwrap();

        search.assert_async().await;
        files.assert_async().await;
        assert_eq!(project.id, 238222);
        assert_eq!(project.url, "https://www.curseforge.com/minecraft/mc-mods/jei");
        assert_eq!(project.files.len(), 2);
        assert_eq!(project.files[0].release_type, ReleaseType::Release);
        assert_eq!(project.files[1].release_type, ReleaseType::Beta);
        assert_eq!(
            project.files[1].download_url,
            "https://edge.forgecdn.net/files/3040/523/jei%20beta.jar"
        );
    }

    #[tokio::test]
    async fn test_files_are_paginated() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/v1/mods/search")
            .match_query(Matcher::Any)
            .with_body(SEARCH_JEI)
            .create_async()
            .await;

        let page = |start: u64, count: u64| {
            let data: Vec<String> = (start..start + count)
                .map(|id| {
                    format!(
                        r#"{{"id": {}, "fileName": "f{}.jar", "releaseType": 1, "gameVersions": ["1.12.2"],
                            "fileDate": "2020-01-01T00:00:00Z", "downloadUrl": "https://example.com/f{}.jar"}}"#,
                        id, id, id
                    )
                })
                .collect();
            format!(
                r#"{{"data": [{}], "pagination": {{"totalCount": 60}}}}"#,
                data.join(",")
            )
        };

        let first = server
            .mock("GET", "/v1/mods/238222/files")
            .match_query(Matcher::UrlEncoded("index".into(), "0".into()))
            .with_body(page(0, 50))
            .create_async()
            .await;
        let second = server
            .mock("GET", "/v1/mods/238222/files")
            .match_query(Matcher::UrlEncoded("index".into(), "50".into()))
            .with_body(page(50, 10))
            .create_async()
            .await;

        let project = client(&server, None).get_project("jei").await.unwrap();

        first.assert_async().await;
        second.assert_async().await;
        assert_eq!(project.files.len(), 60);
    }

    #[tokio::test]
    async fn test_file_listing_stops_at_page_cap() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/v1/mods/search")
            .match_query(Matcher::Any)
            .with_body(SEARCH_JEI)
            .create_async()
            .await;

        let data: Vec<String> = (0..50)
            .map(|id| {
                format!(
                    r#"{{"id": {}, "fileName": "f{}.jar", "releaseType": 1, "gameVersions": ["1.12.2"],
                        "fileDate": "2020-01-01T00:00:00Z", "downloadUrl": "https://example.com/f{}.jar"}}"#,
                    id, id, id
                )
            })
            .collect();
        let first = server
            .mock("GET", "/v1/mods/238222/files")
            .match_query(Matcher::UrlEncoded("index".into(), "0".into()))
            .with_body(format!(
                r#"{{"data": [{}], "pagination": {{"totalCount": 120}}}}"#,
                data.join(",")
            ))
            .create_async()
            .await;
        let second = server
            .mock("GET", "/v1/mods/238222/files")
            .match_query(Matcher::UrlEncoded("index".into(), "50".into()))
            .with_body(r#"{"data": [], "pagination": {"totalCount": 120}}"#)
            .expect(0)
            .create_async()
            .await;

        let project = client(&server, None)
            .with_max_pages(1)
            .get_project("jei")
            .await
            .unwrap();

        first.assert_async().await;
        second.assert_async().await;
        assert_eq!(project.files.len(), 50);
    }

    #[tokio::test]
    async fn test_unknown_slug_is_resolution_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/v1/mods/search")
            .match_query(Matcher::Any)
            .with_body(r#"{"data": [], "pagination": {"totalCount": 0}}"#)
            .create_async()
            .await;

        let err = client(&server, None).get_project("ghost").await.unwrap_err();
        assert!(matches!(err, Error::Resolution { ref slug, .. } if slug == "ghost"));
    }

    #[tokio::test]
    async fn test_server_error_is_transport_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/v1/mods/search")
            .match_query(Matcher::Any)
            .with_status(503)
            .create_async()
            .await;

        let err = client(&server, None).get_project("jei").await.unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
        assert!(err.to_string().contains("HTTP 503"));
    }

    #[tokio::test]
    async fn test_not_found_is_resolution_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/v1/mods/search")
            .match_query(Matcher::Any)
            .with_status(404)
            .create_async()
            .await;

        let err = client(&server, None).get_project("jei").await.unwrap_err();
        assert!(matches!(err, Error::Resolution { .. }));
    }

    #[test]
    fn test_cdn_fallback_url() {
        assert_eq!(
            cdn_url(2995910, "jei.jar"),
            "https://edge.forgecdn.net/files/2995/910/jei.jar"
        );
        assert_eq!(cdn_url(1001, "a.jar"), "https://edge.forgecdn.net/files/1/1/a.jar");
    }
}
