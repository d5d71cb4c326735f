use crate::body::{self, ResponseBody};
use crate::detect;
use crate::err::Error;
use crate::routes::State;
use crate::store;
use http_body_util::BodyExt;
use hyper::body::{Body, Bytes};
use hyper::header::CONTENT_TYPE;
use hyper::{Request, Response, StatusCode};
use multer::{Constraints, Multipart, SizeLimit};
use std::io;

/// Allowance on top of the upload limit for multipart boundaries and small
/// non-file fields; the file part itself is still bounded at exactly the
/// configured maximum.
const FORM_OVERHEAD_BYTES: u64 = 64 * 1024;

#[derive(Debug, thiserror::Error)]
enum UploadError {
    #[error("request is not multipart/form-data")]
    NotMultipart,
    #[error("cannot parse multipart form: {0}")]
    Form(multer::Error),
    #[error("missing or unreadable `file` field")]
    InvalidFile,
    #[error("file exceeds maximum size of {max} bytes")]
    TooLarge { max: u64 },
    #[error("reading file content: {0}")]
    Read(multer::Error),
    #[error("no known extension for content type {0}")]
    NoExtension(String),
    #[error("writing file: {0}")]
    Write(io::Error),
}

impl UploadError {
    fn status(&self) -> StatusCode {
        match self {
            UploadError::NotMultipart | UploadError::Form(_) | UploadError::InvalidFile => {
                StatusCode::BAD_REQUEST
            }
            UploadError::TooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            UploadError::Read(_) | UploadError::NoExtension(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            UploadError::Write(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn public_message(&self) -> &'static str {
        match self {
            UploadError::NotMultipart | UploadError::Form(_) => "Cannot parse form",
            UploadError::InvalidFile => "Invalid file",
            UploadError::TooLarge { .. } => "File too large",
            UploadError::Read(_) | UploadError::NoExtension(_) => "Error reading file",
            UploadError::Write(_) => "Error saving file",
        }
    }
}

pub async fn post<B>(req: Request<B>, state: &State) -> Response<ResponseBody>
where
    B: Body<Data = Bytes> + Send + 'static,
    B::Error: Into<Error> + Send + 'static,
{
    let (parts, req_body) = req.into_parts();

    let boundary = parts
        .headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| multer::parse_boundary(value).ok());

    let stored = match boundary {
        Some(boundary) => store_file_part(req_body, &boundary, state).await,
        None => Err(UploadError::NotMultipart),
    };

    match stored {
        Ok(name) => {
            log::info!("POST {} -> [stored {}]", parts.uri, name);
            let mut resp = Response::new(body::full(name));
            *resp.status_mut() = StatusCode::CREATED;
            resp
        }
        Err(e) => {
            log::warn!("POST {} -> [{}]", parts.uri, e);
            let mut resp = Response::new(body::full(e.public_message()));
            *resp.status_mut() = e.status();
            resp
        }
    }
}

async fn store_file_part<B>(
    req_body: B,
    boundary: &str,
    state: &State,
) -> Result<String, UploadError>
where
    B: Body<Data = Bytes> + Send + 'static,
    B::Error: Into<Error> + Send + 'static,
{
    let constraints = Constraints::new().size_limit(
        SizeLimit::new()
            .whole_stream(state.max_upload_bytes.saturating_add(FORM_OVERHEAD_BYTES))
            .for_field("file", state.max_upload_bytes),
    );
    let form = Multipart::with_constraints(req_body.into_data_stream(), boundary, constraints);

    let content = read_file_field(form, state.max_upload_bytes).await?;
    let content_type = detect::content_type(&content);
    let extension = detect::extension_for(content_type)
        .ok_or_else(|| UploadError::NoExtension(content_type.to_string()))?;

    store::persist(&state.upload_dir, extension, &content)
        .await
        .map_err(UploadError::Write)
}

/// Pulls the `file` field out of the form, bounding its size to `max`
/// independently of the parser's own limits. Unrelated fields are drained
/// and ignored.
async fn read_file_field(mut form: Multipart<'_>, max: u64) -> Result<Bytes, UploadError> {
    loop {
        let mut field = match form.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => return Err(UploadError::InvalidFile),
            Err(e) => return Err(form_error(e, max)),
        };

        if field.name() != Some("file") {
            while field
                .chunk()
                .await
                .map_err(|e| form_error(e, max))?
                .is_some()
            {}
            continue;
        }

        // a value-only part carries no filename and is not a file upload
        if field.file_name().is_none() {
            return Err(UploadError::InvalidFile);
        }

        let mut content = Vec::new();
        loop {
            match field.chunk().await {
                Ok(Some(chunk)) => {
                    if content.len() as u64 + chunk.len() as u64 > max {
                        return Err(UploadError::TooLarge { max });
                    }
                    content.extend_from_slice(&chunk);
                }
                Ok(None) => return Ok(content.into()),
                Err(multer::Error::FieldSizeExceeded { .. }) => {
                    return Err(UploadError::TooLarge { max })
                }
                Err(e) => return Err(UploadError::Read(e)),
            }
        }
    }
}

fn form_error(e: multer::Error, max: u64) -> UploadError {
    match e {
        multer::Error::FieldSizeExceeded { .. } => UploadError::TooLarge { max },
        e => UploadError::Form(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::Full;
    use uuid::Uuid;

    const BOUNDARY: &str = "filepile-test-boundary";

    fn state(dir: &tempfile::TempDir, max_upload_bytes: u64) -> State {
        State {
            upload_dir: dir.path().to_path_buf(),
            max_upload_bytes,
        }
    }

    fn multipart_request(field_name: &str, content: &[u8]) -> Request<Full<Bytes>> {
        form_request(
            &format!("form-data; name=\"{}\"; filename=\"upload.bin\"", field_name),
            content,
        )
    }

    fn value_field_request(field_name: &str, content: &[u8]) -> Request<Full<Bytes>> {
        form_request(&format!("form-data; name=\"{}\"", field_name), content)
    }

    fn form_request(disposition: &str, content: &[u8]) -> Request<Full<Bytes>> {
        let mut form = Vec::new();
        form.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        form.extend_from_slice(
            format!("Content-Disposition: {}\r\n\r\n", disposition).as_bytes(),
        );
        form.extend_from_slice(content);
        form.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());

        Request::builder()
            .method("POST")
            .uri("/upload")
            .header(
                CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .body(Full::new(Bytes::from(form)))
            .unwrap()
    }

    async fn body_string(resp: Response<ResponseBody>) -> String {
        let collected = resp.into_body().collect().await.unwrap();
        String::from_utf8(collected.to_bytes().to_vec()).unwrap()
    }

    fn stored_files(dir: &tempfile::TempDir) -> Vec<String> {
        std::fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().into_string().unwrap())
            .collect()
    }

    #[tokio::test]
    async fn stores_text_with_a_sniffed_txt_name() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(&dir, 1024);

        let resp = post(multipart_request("file", b"plain text content"), &state).await;
        assert_eq!(resp.status(), StatusCode::CREATED);

        let name = body_string(resp).await;
        let (id, extension) = name.split_once('.').unwrap();
        assert!(Uuid::parse_str(id).is_ok());
        assert_eq!(extension, "txt");

        let stored = std::fs::read(dir.path().join(&name)).unwrap();
        assert_eq!(stored, b"plain text content");
    }

    #[tokio::test]
    async fn names_png_content_by_its_bytes_not_the_client() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(&dir, 1024);

        // filename in the form says .bin; the magic bytes say png
        let content = [0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a, 1, 2, 3];
        let resp = post(multipart_request("file", &content), &state).await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        assert!(body_string(resp).await.ends_with(".png"));
    }

    #[tokio::test]
    async fn rejects_a_file_over_the_limit_and_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(&dir, 100);

        let resp = post(multipart_request("file", &[b'a'; 101]), &state).await;
        assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(body_string(resp).await, "File too large");
        assert!(stored_files(&dir).is_empty());
    }

    #[tokio::test]
    async fn accepts_a_file_just_under_the_limit() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(&dir, 100);

        let resp = post(multipart_request("file", &[b'a'; 99]), &state).await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        assert_eq!(stored_files(&dir).len(), 1);
    }

    #[tokio::test]
    async fn rejects_a_form_without_a_file_field() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(&dir, 1024);

        let resp = post(multipart_request("attachment", b"content"), &state).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_string(resp).await, "Invalid file");
        assert!(stored_files(&dir).is_empty());
    }

    #[tokio::test]
    async fn rejects_a_file_field_without_a_filename() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(&dir, 1024);

        let resp = post(value_field_request("file", b"just a value"), &state).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_string(resp).await, "Invalid file");
        assert!(stored_files(&dir).is_empty());
    }

    #[tokio::test]
    async fn rejects_a_form_larger_than_the_stream_bound() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(&dir, 100);

        // drained non-file field pushes the whole stream past max + overhead
        let padding = vec![b'a'; (100 + FORM_OVERHEAD_BYTES) as usize + 1024];
        let resp = post(multipart_request("padding", &padding), &state).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_string(resp).await, "Cannot parse form");
        assert!(stored_files(&dir).is_empty());
    }

    #[tokio::test]
    async fn rejects_a_body_that_is_not_multipart() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(&dir, 1024);

        let req = Request::builder()
            .method("POST")
            .uri("/upload")
            .header(CONTENT_TYPE, "application/json")
            .body(Full::new(Bytes::from_static(b"{}")))
            .unwrap();

        let resp = post(req, &state).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_string(resp).await, "Cannot parse form");
        assert!(stored_files(&dir).is_empty());
    }

    #[tokio::test]
    async fn unknown_binary_content_is_a_server_error() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(&dir, 1024);

        let resp = post(multipart_request("file", &[0x00, 0x01, 0xfe]), &state).await;
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_string(resp).await, "Error reading file");
        assert!(stored_files(&dir).is_empty());
    }

    #[tokio::test]
    async fn identical_uploads_store_two_distinct_files() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(&dir, 1024);

        let first = body_string(post(multipart_request("file", b"same"), &state).await).await;
        let second = body_string(post(multipart_request("file", b"same"), &state).await).await;

        assert_ne!(first, second);
        assert_eq!(stored_files(&dir).len(), 2);
    }

    #[tokio::test]
    async fn write_failure_reports_a_server_error() {
        let dir = tempfile::tempdir().unwrap();
        let state = State {
            upload_dir: dir.path().join("missing"),
            max_upload_bytes: 1024,
        };

        let resp = post(multipart_request("file", b"content"), &state).await;
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_string(resp).await, "Error saving file");
    }
}
