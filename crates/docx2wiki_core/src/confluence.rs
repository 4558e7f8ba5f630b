use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use reqwest::blocking::multipart::{Form, Part};
use reqwest::blocking::{Client, RequestBuilder, Response};
use serde::Serialize;
use serde_json::Value;

use crate::config::ConnectionSettings;

pub const PLACEHOLDER_BODY: &str = "<p>Import in progress</p>";
const STORAGE_REPRESENTATION: &str = "storage";

/// Confluence content operations used by the uploader.
pub trait ContentApi {
    /// Create a page with a placeholder body under `parent_id` (space root when `None`).
    fn create_page(
        &mut self,
        space_key: &str,
        title: &str,
        parent_id: Option<&str>,
    ) -> Result<CreatedPage>;
    fn upload_attachment(&mut self, page_id: &str, file: &Path) -> Result<()>;
    /// Replace the body of a page returned by `create_page`. Only one update
    /// per created page is supported: the version sent is `page.version + 1`.
    fn update_page(&mut self, page: &CreatedPage, title: &str, body: &str) -> Result<()>;
    fn request_count(&self) -> usize;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedPage {
    pub id: String,
    pub version: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreatePageRequest<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    title: &'a str,
    space: SpaceRef<'a>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    ancestors: Vec<AncestorRef<'a>>,
    body: StorageBody<'a>,
}

impl<'a> CreatePageRequest<'a> {
    pub fn new(space_key: &'a str, title: &'a str, parent_id: Option<&'a str>) -> Self {
        let ancestors = parent_id
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(|id| vec![AncestorRef { id }])
            .unwrap_or_default();
        Self {
            kind: "page",
            title,
            space: SpaceRef { key: space_key },
            ancestors,
            body: StorageBody::new(PLACEHOLDER_BODY),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct UpdatePageRequest<'a> {
    version: VersionRef,
    title: &'a str,
    #[serde(rename = "type")]
    kind: &'static str,
    body: StorageBody<'a>,
}

impl<'a> UpdatePageRequest<'a> {
    pub fn new(version: u64, title: &'a str, body: &'a str) -> Self {
        Self {
            version: VersionRef { number: version },
            title,
            kind: "page",
            body: StorageBody::new(body),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
struct SpaceRef<'a> {
    key: &'a str,
}

#[derive(Debug, Clone, Serialize)]
struct AncestorRef<'a> {
    id: &'a str,
}

#[derive(Debug, Clone, Serialize)]
struct VersionRef {
    number: u64,
}

#[derive(Debug, Clone, Serialize)]
struct StorageBody<'a> {
    storage: StorageValue<'a>,
}

impl<'a> StorageBody<'a> {
    fn new(value: &'a str) -> Self {
        Self {
            storage: StorageValue {
                value,
                representation: STORAGE_REPRESENTATION,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
struct StorageValue<'a> {
    value: &'a str,
    representation: &'static str,
}

pub struct ConfluenceClient {
    client: Client,
    settings: ConnectionSettings,
    request_count: usize,
}

impl ConfluenceClient {
    pub fn new(settings: ConnectionSettings) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(settings.timeout_ms))
            .user_agent(settings.user_agent.clone())
            .build()
            .context("failed to build Confluence HTTP client")?;
        Ok(Self {
            client,
            settings,
            request_count: 0,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.settings.base_url)
    }

    fn send(&mut self, request: RequestBuilder, url: &str) -> Result<Response> {
        self.request_count += 1;
        tracing::debug!(%url, "sending Confluence request");
        let response = request
            .basic_auth(&self.settings.username, Some(&self.settings.password))
            .send()
            .with_context(|| format!("failed to call {url}"))?;
        tracing::debug!(%url, status = %response.status(), "Confluence responded");
        Ok(response)
    }
}

impl ContentApi for ConfluenceClient {
    fn create_page(
        &mut self,
        space_key: &str,
        title: &str,
        parent_id: Option<&str>,
    ) -> Result<CreatedPage> {
        let url = self.endpoint("/rest/api/content");
        let payload = CreatePageRequest::new(space_key, title, parent_id);
        let request = self.client.post(&url).json(&payload);
        let response = self.send(request, &url)?;

        let status = response.status();
        let body = response
            .text()
            .context("failed to read page creation response")?;
        if !status.is_success() {
            bail!(
                "page creation failed with HTTP {status}: {}",
                body_or_placeholder(&body)
            );
        }
        parse_created_page(&body)
    }

    fn upload_attachment(&mut self, page_id: &str, file: &Path) -> Result<()> {
        let file_name = file
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .ok_or_else(|| anyhow::anyhow!("attachment has no file name: {}", file.display()))?;
        let bytes = fs::read(file).with_context(|| format!("failed to read {}", file.display()))?;
        let part = Part::bytes(bytes)
            .file_name(file_name.clone())
            .mime_str("application/octet-stream")
            .context("failed to build attachment part")?;
        let form = Form::new().part("file", part);

        let url = self.endpoint(&format!("/rest/api/content/{page_id}/child/attachment"));
        let request = self
            .client
            .post(&url)
            .header("X-Atlassian-Token", "no-check")
            .multipart(form);
        let response = self.send(request, &url)?;

        let status = response.status();
        let body = response
            .text()
            .context("failed to read attachment upload response")?;
        if !status.is_success() {
            bail!(
                "attachment upload of {file_name} failed with HTTP {status}: {}",
                body_or_placeholder(&body)
            );
        }
        Ok(())
    }

    fn update_page(&mut self, page: &CreatedPage, title: &str, body: &str) -> Result<()> {
        let url = self.endpoint(&format!("/rest/api/content/{}", page.id));
        let payload = UpdatePageRequest::new(page.version + 1, title, body);
        let request = self.client.put(&url).json(&payload);
        let response = self.send(request, &url)?;

        let status = response.status();
        let response_body = response
            .text()
            .context("failed to read page update response")?;
        if !status.is_success() {
            let rendered = serde_json::to_string_pretty(&payload).unwrap_or_default();
            bail!(
                "page update failed with HTTP {status}: {}\nupdate payload:\n{rendered}",
                body_or_placeholder(&response_body)
            );
        }
        Ok(())
    }

    fn request_count(&self) -> usize {
        self.request_count
    }
}

/// Extract the page id and version from a content-creation response.
pub fn parse_created_page(body: &str) -> Result<CreatedPage> {
    let payload: Value =
        serde_json::from_str(body).context("failed to decode page creation response")?;
    let id = match payload.get("id") {
        Some(Value::String(id)) if !id.trim().is_empty() => id.trim().to_string(),
        Some(Value::Number(id)) => id.to_string(),
        _ => bail!("page creation response has no page id"),
    };
    let version = payload
        .get("version")
        .and_then(|version| version.get("number"))
        .and_then(Value::as_u64)
        .unwrap_or(1);
    Ok(CreatedPage { id, version })
}

fn body_or_placeholder(body: &str) -> &str {
    if body.trim().is_empty() {
        "<empty body>"
    } else {
        body
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::io::{Read, Write};
    use std::net::{TcpListener, TcpStream};
    use std::thread::{self, JoinHandle};

    use serde_json::Value;
    use tempfile::tempdir;

    use super::{
        ConfluenceClient, ContentApi, CreatePageRequest, CreatedPage, PLACEHOLDER_BODY,
        UpdatePageRequest, parse_created_page,
    };
    use crate::config::ConnectionSettings;

    const TRICKY: &str = "Q3 \"final\" report \\ draft\nline two\t<b>&</b>";

    fn settings(base_url: String) -> ConnectionSettings {
        ConnectionSettings {
            base_url,
            username: "user".to_string(),
            password: "pass".to_string(),
            user_agent: "docx2wiki-test".to_string(),
            timeout_ms: 5_000,
        }
    }

    fn serve_once(status_line: &'static str, body: &'static str) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind listener");
        let address = listener.local_addr().expect("local addr");
        let handle = thread::spawn(move || {
            let (mut stream, _) = listener.accept().expect("accept");
            let request = read_request(&mut stream);
            let response = format!(
                "HTTP/1.1 {status_line}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            stream.write_all(response.as_bytes()).expect("write response");
            request
        });
        (format!("http://{address}"), handle)
    }

    fn read_request(stream: &mut TcpStream) -> String {
        let mut buffer = Vec::new();
        let mut chunk = [0u8; 8192];
        loop {
            let read = stream.read(&mut chunk).expect("read request");
            if read == 0 {
                break;
            }
            buffer.extend_from_slice(&chunk[..read]);
            let Some(header_end) = buffer.windows(4).position(|window| window == b"\r\n\r\n")
            else {
                continue;
            };
            let head = String::from_utf8_lossy(&buffer[..header_end]).to_ascii_lowercase();
            if head.contains("transfer-encoding: chunked") {
                if buffer.ends_with(b"0\r\n\r\n") {
                    break;
                }
                continue;
            }
            let length = head
                .lines()
                .find_map(|line| line.strip_prefix("content-length:"))
                .and_then(|value| value.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if buffer.len() >= header_end + 4 + length {
                break;
            }
        }
        String::from_utf8_lossy(&buffer).to_string()
    }

    fn header<'a>(request: &'a str, name: &str) -> Option<&'a str> {
        request.lines().find_map(|line| {
            let (key, value) = line.split_once(':')?;
            key.eq_ignore_ascii_case(name).then(|| value.trim())
        })
    }

    fn request_json(request: &str) -> Value {
        let (_, body) = request.split_once("\r\n\r\n").expect("request body");
        serde_json::from_str(body).expect("request body is json")
    }

    #[test]
    fn create_payload_round_trips_tricky_title() {
        let payload = CreatePageRequest::new("SUP", TRICKY, Some("73314635"));
        let encoded = serde_json::to_string(&payload).expect("serialize");
        let decoded: Value = serde_json::from_str(&encoded).expect("parse back");
        assert_eq!(decoded["title"], TRICKY);
        assert_eq!(decoded["type"], "page");
        assert_eq!(decoded["space"]["key"], "SUP");
        assert_eq!(decoded["ancestors"][0]["id"], "73314635");
        assert_eq!(decoded["body"]["storage"]["value"], PLACEHOLDER_BODY);
        assert_eq!(decoded["body"]["storage"]["representation"], "storage");
    }

    #[test]
    fn create_payload_omits_ancestors_without_parent() {
        for parent in [None, Some(""), Some("   ")] {
            let payload = CreatePageRequest::new("SUP", "Report", parent);
            let decoded = serde_json::to_value(&payload).expect("serialize");
            assert!(decoded.get("ancestors").is_none(), "parent {parent:?}");
        }
    }

    #[test]
    fn update_payload_round_trips_tricky_body() {
        let body = format!("<p>{TRICKY}</p>\n<ac:image><ri:attachment ri:filename=\"a.png\" /></ac:image>");
        let payload = UpdatePageRequest::new(2, TRICKY, &body);
        let encoded = serde_json::to_string(&payload).expect("serialize");
        let decoded: Value = serde_json::from_str(&encoded).expect("parse back");
        assert_eq!(decoded["title"], TRICKY);
        assert_eq!(decoded["version"]["number"], 2);
        assert_eq!(decoded["body"]["storage"]["value"], body.as_str());
    }

    #[test]
    fn parse_created_page_accepts_string_and_numeric_ids() {
        assert_eq!(
            parse_created_page(r#"{"id":"98765","version":{"number":1}}"#).expect("parse"),
            CreatedPage {
                id: "98765".to_string(),
                version: 1
            }
        );
        assert_eq!(
            parse_created_page(r#"{"id":42}"#).expect("parse"),
            CreatedPage {
                id: "42".to_string(),
                version: 1
            }
        );
        assert!(parse_created_page(r#"{"title":"x"}"#).is_err());
        assert!(parse_created_page("not json").is_err());
    }

    #[test]
    fn create_page_posts_json_with_basic_auth() {
        let (base_url, server) = serve_once(
            "200 OK",
            r#"{"id":"98765","type":"page","version":{"number":1}}"#,
        );
        let mut client = ConfluenceClient::new(settings(base_url)).expect("client");

        let page = client
            .create_page("SUP", "Say \"hi\"", Some("100"))
            .expect("create page");
        assert_eq!(page.id, "98765");
        assert_eq!(page.version, 1);
        assert_eq!(client.request_count(), 1);

        let request = server.join().expect("server thread");
        assert!(request.starts_with("POST /rest/api/content HTTP/1.1"));
        assert_eq!(header(&request, "authorization"), Some("Basic dXNlcjpwYXNz"));
        let sent = request_json(&request);
        assert_eq!(sent["title"], "Say \"hi\"");
        assert_eq!(sent["ancestors"][0]["id"], "100");
    }

    #[test]
    fn create_page_failure_reports_status_and_body() {
        let (base_url, server) = serve_once(
            "400 Bad Request",
            r#"{"message":"A page with this title already exists"}"#,
        );
        let mut client = ConfluenceClient::new(settings(base_url)).expect("client");
        let error = client
            .create_page("SUP", "Report", None)
            .expect_err("must fail");
        let message = error.to_string();
        assert!(message.contains("400"));
        assert!(message.contains("already exists"));
        server.join().expect("server thread");
    }

    #[test]
    fn update_page_sends_next_version_and_reports_payload_on_failure() {
        let (base_url, server) = serve_once("409 Conflict", "");
        let mut client = ConfluenceClient::new(settings(base_url)).expect("client");
        let page = CreatedPage {
            id: "555".to_string(),
            version: 1,
        };
        let error = client
            .update_page(&page, "Report", "<p>final</p>")
            .expect_err("must fail");
        let message = error.to_string();
        assert!(message.contains("409"));
        assert!(message.contains("<empty body>"));
        assert!(message.contains("\"number\": 2"));
        assert!(message.contains("<p>final</p>"));

        let request = server.join().expect("server thread");
        assert!(request.starts_with("PUT /rest/api/content/555 HTTP/1.1"));
        assert_eq!(request_json(&request)["version"]["number"], 2);
    }

    #[test]
    fn upload_attachment_posts_multipart_with_token_header() {
        let temp = tempdir().expect("tempdir");
        let image = temp.path().join("image1.png");
        fs::write(&image, b"\x89PNG fake").expect("write image");
        let (base_url, server) = serve_once("200 OK", r#"{"results":[]}"#);
        let mut client = ConfluenceClient::new(settings(base_url)).expect("client");

        client.upload_attachment("555", &image).expect("upload");

        let request = server.join().expect("server thread");
        assert!(request.starts_with("POST /rest/api/content/555/child/attachment HTTP/1.1"));
        assert_eq!(header(&request, "x-atlassian-token"), Some("no-check"));
        assert!(
            header(&request, "content-type")
                .is_some_and(|value| value.starts_with("multipart/form-data"))
        );
        assert!(request.contains("filename=\"image1.png\""));
        assert!(request.contains("application/octet-stream"));
    }

    #[test]
    fn unreachable_server_is_an_error_not_a_panic() {
        let mut client =
            ConfluenceClient::new(settings(String::new())).expect("client");
        let error = client
            .create_page("SUP", "Report", None)
            .expect_err("must fail");
        assert!(error.to_string().contains("failed to call"));
    }
}
