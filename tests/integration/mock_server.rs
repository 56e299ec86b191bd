use certificate_notary::digest;
use hyper::header::CONTENT_TYPE;
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Method, Request, Response, Server, StatusCode};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const BASE_TIMESTAMP: i64 = 1_700_000_000;

#[derive(Default)]
struct MockState {
    requests: Mutex<Vec<String>>,
    certificates: Mutex<Vec<Value>>,
    contents: Mutex<HashMap<String, (String, Vec<u8>)>>,
    registry_down: AtomicBool,
    upload_down: AtomicBool,
    registry_delay_ms: AtomicU64,
}

/// Registry + content gateway on one ephemeral port.
///
/// Registry: `POST /issue` (multipart `file`, hashed and pinned server-side),
/// `GET /verify/<hash>`, `GET /certificates`.
/// Gateway: `GET /ipfs/<cid>`, `POST /upload`.
#[derive(Clone, Default)]
pub struct MockRemote {
    state: Arc<MockState>,
}

impl MockRemote {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn start(&self) -> String {
        let state = self.state.clone();

        let make_svc = make_service_fn(move |_conn| {
            let state = state.clone();

            async move {
                Ok::<_, Infallible>(service_fn(move |req| handle_request(req, state.clone())))
            }
        });

        // Bind to random port
        let addr = SocketAddr::from(([127, 0, 0, 1], 0));
        let server = Server::bind(&addr).serve(make_svc);
        let actual_addr = server.local_addr();

        tokio::spawn(async move {
            if let Err(e) = server.await {
                eprintln!("Mock server error: {}", e);
            }
        });

        format!("http://{}", actual_addr)
    }

    pub fn requests(&self) -> Vec<String> {
        self.state.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self, prefix: &str) -> usize {
        self.requests()
            .iter()
            .filter(|r| r.starts_with(prefix))
            .count()
    }

    pub fn certificate_count(&self) -> usize {
        self.state.certificates.lock().unwrap().len()
    }

    pub fn set_registry_down(&self, down: bool) {
        self.state.registry_down.store(down, Ordering::SeqCst);
    }

    pub fn set_upload_down(&self, down: bool) {
        self.state.upload_down.store(down, Ordering::SeqCst);
    }

    pub fn set_registry_delay(&self, delay: Duration) {
        self.state
            .registry_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn put_content(&self, cid: &str, media_type: &str, bytes: &[u8]) {
        self.state
            .contents
            .lock()
            .unwrap()
            .insert(cid.to_string(), (media_type.to_string(), bytes.to_vec()));
    }

    /// Replace stored bytes while keeping the same identifier.
    pub fn tamper(&self, cid: &str, bytes: &[u8]) {
        let mut contents = self.state.contents.lock().unwrap();
        let entry = contents.get_mut(cid).expect("unknown cid");
        entry.1 = bytes.to_vec();
    }

    pub fn content(&self, cid: &str) -> Option<Vec<u8>> {
        self.state
            .contents
            .lock()
            .unwrap()
            .get(cid)
            .map(|(_, bytes)| bytes.clone())
    }
}

fn json_response(status: u16, body: Value) -> Response<Body> {
    let mut response = Response::new(Body::from(body.to_string()));
    *response.status_mut() = StatusCode::from_u16(status).unwrap();
    response
        .headers_mut()
        .insert(CONTENT_TYPE, "application/json".parse().unwrap());
    response
}

async fn handle_request(
    req: Request<Body>,
    state: Arc<MockState>,
) -> Result<Response<Body>, Infallible> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let content_type = req
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    state
        .requests
        .lock()
        .unwrap()
        .push(format!("{} {}", method, path));

    let body = hyper::body::to_bytes(req.into_body())
        .await
        .unwrap_or_default();

    let is_registry =
        path == "/issue" || path == "/certificates" || path.starts_with("/verify/");
    if is_registry {
        let delay = state.registry_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if state.registry_down.load(Ordering::SeqCst) {
            return Ok(json_response(
                503,
                json!({
                    "message": "Unable to verify certificate status",
                    "details": {"type": "ConnectionError", "reason": "node offline"}
                }),
            ));
        }
    }

    let response = match (&method, path.as_str()) {
        (&Method::POST, "/issue") => issue(&state, &content_type, &body),
        (&Method::GET, "/certificates") => {
            let mut listed = state.certificates.lock().unwrap().clone();
            listed.reverse();
            json_response(200, Value::Array(listed))
        }
        (&Method::GET, p) if p.starts_with("/verify/") => verify(&state, &p["/verify/".len()..]),
        (&Method::GET, p) if p.starts_with("/ipfs/") => fetch(&state, &p["/ipfs/".len()..]),
        (&Method::POST, "/upload") => upload(&state, &content_type, &body),
        _ => json_response(404, json!({"message": "Not Found"})),
    };

    Ok(response)
}

struct FormPart {
    name: String,
    filename: Option<String>,
    data: Vec<u8>,
}

fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    haystack
        .get(from..)?
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|i| i + from)
}

fn header_param(headers: &str, key: &str) -> Option<String> {
    let marker = format!("; {}=\"", key);
    let start = headers.find(&marker)? + marker.len();
    let end = headers[start..].find('"')? + start;
    Some(headers[start..end].to_string())
}

/// Minimal multipart/form-data reader; `None` for anything malformed.
fn parse_multipart(content_type: &str, body: &[u8]) -> Option<Vec<FormPart>> {
    let boundary = content_type
        .strip_prefix("multipart/form-data")?
        .split("boundary=")
        .nth(1)?
        .trim_matches('"');
    let delimiter = format!("--{}", boundary).into_bytes();

    let mut parts = Vec::new();
    let mut pos = find(body, &delimiter, 0)? + delimiter.len();
    loop {
        if body.get(pos..pos + 2) == Some(b"--".as_slice()) {
            return Some(parts);
        }
        pos += 2;
        let header_end = find(body, b"\r\n\r\n", pos)?;
        let headers = String::from_utf8_lossy(&body[pos..header_end]).to_string();
        let data_start = header_end + 4;
        let next = find(body, &delimiter, data_start)?;
        let data_end = next.checked_sub(2)?.max(data_start);

        parts.push(FormPart {
            name: header_param(&headers, "name")?,
            filename: header_param(&headers, "filename"),
            data: body[data_start..data_end].to_vec(),
        });
        pos = next + delimiter.len();
    }
}

fn bad_request() -> Response<Body> {
    let mut response = Response::new(Body::from(
        "<!doctype html>\n<title>400 Bad Request</title>\n<p>The browser (or proxy) sent a request that this server could not understand.</p>",
    ));
    *response.status_mut() = StatusCode::BAD_REQUEST;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, "text/html; charset=utf-8".parse().unwrap());
    response
}

fn text_field(parts: &[FormPart], name: &str) -> String {
    parts
        .iter()
        .find(|p| p.name == name)
        .map(|p| String::from_utf8_lossy(&p.data).to_string())
        .unwrap_or_default()
}

fn pin(state: &MockState, file: &[u8]) -> String {
    let cid = format!("Qm{}", &digest(file).as_str()[..20]);
    state
        .contents
        .lock()
        .unwrap()
        .insert(cid.clone(), ("application/octet-stream".to_string(), file.to_vec()));
    cid
}

fn issue(state: &MockState, content_type: &str, body: &[u8]) -> Response<Body> {
    let parts = match parse_multipart(content_type, body) {
        Some(parts) => parts,
        None => return bad_request(),
    };
    let file = match parts.iter().find(|p| p.name == "file") {
        Some(file) => file,
        None => return bad_request(),
    };

    // The registry hashes the uploaded bytes itself
    let hash = digest(&file.data).as_str().to_string();

    let mut certificates = state.certificates.lock().unwrap();
    if certificates.iter().any(|c| c["hash"] == hash.as_str()) {
        return json_response(409, json!({"message": "Certificate already exists", "hash": hash}));
    }

    if state.upload_down.load(Ordering::SeqCst) {
        return json_response(
            502,
            json!({
                "message": "Failed to upload certificate to IPFS",
                "details": "Failed to upload file to Pinata: quota exceeded"
            }),
        );
    }
    let cid = pin(state, &file.data);

    let timestamp = BASE_TIMESTAMP + certificates.len() as i64;
    certificates.push(json!({
        "hash": hash,
        "issuedTo": text_field(&parts, "issuedTo"),
        "issuedBy": text_field(&parts, "issuedBy"),
        "timestamp": timestamp,
        "cid": cid,
        "filename": file.filename,
    }));

    json_response(
        200,
        json!({
            "message": "Certificate issued successfully",
            "hash": hash,
            "txHash": "0xfeed",
            "cid": cid,
            "ipfs_url": format!("https://gateway.example/ipfs/{}", cid),
        }),
    )
}

fn verify(state: &MockState, hash: &str) -> Response<Body> {
    let certificates = state.certificates.lock().unwrap();
    match certificates.iter().find(|c| c["hash"] == hash) {
        // Single-hash lookups carry no content id, only the listing does
        Some(c) => json_response(
            200,
            json!({
                "valid": true,
                "details": {
                    "hash": c["hash"],
                    "issuedTo": c["issuedTo"],
                    "issuedBy": c["issuedBy"],
                    "timestamp": c["timestamp"],
                }
            }),
        ),
        None => json_response(
            200,
            json!({
                "valid": false,
                "details": {"hash": "", "issuedTo": "", "issuedBy": "", "timestamp": 0}
            }),
        ),
    }
}

fn fetch(state: &MockState, cid: &str) -> Response<Body> {
    if cid == "broken" {
        return json_response(500, json!({"message": "gateway exploded"}));
    }

    match state.contents.lock().unwrap().get(cid) {
        Some((media_type, bytes)) => {
            let mut response = Response::new(Body::from(bytes.clone()));
            response
                .headers_mut()
                .insert(CONTENT_TYPE, media_type.parse().unwrap());
            response
        }
        None => json_response(404, json!({"message": "no link named this"})),
    }
}

fn upload(state: &MockState, content_type: &str, body: &[u8]) -> Response<Body> {
    let parts = match parse_multipart(content_type, body) {
        Some(parts) => parts,
        None => {
            return json_response(400, json!({"message": "Missing file in request (multipart key 'file')."}))
        }
    };
    let file = match parts.iter().find(|p| p.name == "file") {
        Some(file) => file,
        None => {
            return json_response(400, json!({"message": "Missing file in request (multipart key 'file')."}))
        }
    };
    if file.filename.as_deref().unwrap_or_default().is_empty() {
        return json_response(400, json!({"message": "Uploaded file must have a filename."}));
    }

    if state.upload_down.load(Ordering::SeqCst) {
        return json_response(
            502,
            json!({"message": "Failed to upload file to Pinata", "details": "quota exceeded"}),
        );
    }

    let cid = pin(state, &file.data);
    json_response(200, json!({"IpfsHash": cid, "PinSize": file.data.len()}))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_server_starts() {
        let server = MockRemote::new();
        let url = server.start().await;

        assert!(url.starts_with("http://127.0.0.1:"));
    }

    #[test]
    fn test_parse_multipart_fields() {
        let body = b"--XyZ\r\nContent-Disposition: form-data; name=\"issuedTo\"\r\n\r\nalice\r\n--XyZ\r\nContent-Disposition: form-data; name=\"file\"; filename=\"a.pdf\"\r\n\r\n%PDF\r\n--XyZ--\r\n";
        let parts = parse_multipart("multipart/form-data; boundary=XyZ", body).unwrap();

        assert_eq!(parts.len(), 2);
        assert_eq!(text_field(&parts, "issuedTo"), "alice");
        assert_eq!(parts[1].filename.as_deref(), Some("a.pdf"));
        assert_eq!(parts[1].data, b"%PDF".to_vec());

        assert!(parse_multipart("application/json", b"{}").is_none());
    }

    #[tokio::test]
    async fn test_mock_server_records_requests() {
        let server = MockRemote::new();
        let url = server.start().await;

        let response = reqwest::get(format!("{}/certificates", url)).await.unwrap();

        assert_eq!(response.status().as_u16(), 200);
        assert_eq!(server.request_count("GET /certificates"), 1);
    }

    #[tokio::test]
    async fn test_issue_requires_multipart() {
        let server = MockRemote::new();
        let url = server.start().await;

        let response = reqwest::Client::new()
            .post(format!("{}/issue", url))
            .json(&json!({"hash": digest(b"hello")}))
            .send()
            .await
            .unwrap();

        assert_eq!(response.status().as_u16(), 400);
        assert_eq!(server.certificate_count(), 0);
    }
}
