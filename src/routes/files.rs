use crate::body::{self, ResponseBody};
use crate::routes::State;
use headers::{ContentLength, ContentType, HeaderMapExt, IfModifiedSince, LastModified};
use hyper::{Request, Response, StatusCode, Uri};
use std::path::{Component, Path, PathBuf};
use tokio::fs::File;

pub async fn get<B>(req: Request<B>, state: &State) -> Response<ResponseBody> {
    let relative = match resolve_path(req.uri().path()) {
        Some(relative) => relative,
        None => {
            log::warn!("GET {} -> [invalid path]", req.uri());
            let mut resp = Response::new(body::empty());
            *resp.status_mut() = StatusCode::NOT_FOUND;
            return resp;
        }
    };
    let path = state.upload_dir.join(relative);

    let metadata = match tokio::fs::metadata(&path).await {
        Ok(metadata) => metadata,
        Err(e) => {
            log::info!("GET {} -> [not found] {}", req.uri(), e);
            let mut resp = Response::new(body::empty());
            *resp.status_mut() = StatusCode::NOT_FOUND;
            return resp;
        }
    };

    if metadata.is_dir() {
        return index(&path, req.uri()).await;
    }

    let modified = metadata.modified().ok();
    if let (Some(since), Some(modified)) = (req.headers().typed_get::<IfModifiedSince>(), modified)
    {
        if !since.is_modified(modified) {
            log::info!("GET {} -> [not modified]", req.uri());
            let mut resp = Response::new(body::empty());
            *resp.status_mut() = StatusCode::NOT_MODIFIED;
            return resp;
        }
    }

    let file = match File::open(&path).await {
        Ok(file) => file,
        Err(e) => {
            log::warn!("GET {} -> [open error] {}", req.uri(), e);
            let mut resp = Response::new(body::empty());
            *resp.status_mut() = StatusCode::NOT_FOUND;
            return resp;
        }
    };

    log::info!("GET {} -> [found {} bytes]", req.uri(), metadata.len());
    let mut resp = Response::new(body::from_file(file));
    resp.headers_mut()
        .typed_insert(ContentType::from(
            mime_guess::from_path(&path).first_or_octet_stream(),
        ));
    resp.headers_mut().typed_insert(ContentLength(metadata.len()));
    if let Some(modified) = modified {
        resp.headers_mut().typed_insert(LastModified::from(modified));
    }
    resp
}

/// Maps a URL path to a path relative to the storage directory. Anything
/// that could escape the directory resolves to nothing.
fn resolve_path(uri_path: &str) -> Option<PathBuf> {
    let trimmed = uri_path.trim_start_matches('/');
    let mut relative = PathBuf::new();
    for component in Path::new(trimmed).components() {
        match component {
            Component::Normal(part) => relative.push(part),
            Component::CurDir => {}
            _ => return None,
        }
    }
    Some(relative)
}

async fn index(dir: &Path, uri: &Uri) -> Response<ResponseBody> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) => {
            log::warn!("GET {} -> [index error] {}", uri, e);
            let mut resp = Response::new(body::empty());
            *resp.status_mut() = StatusCode::NOT_FOUND;
            return resp;
        }
    };

    let mut files = Vec::new();
    while let Ok(Some(entry)) = entries.next_entry().await {
        let Ok(metadata) = entry.metadata().await else {
            continue;
        };
        if !metadata.is_file() {
            continue;
        }
        files.push((
            entry.file_name().to_string_lossy().into_owned(),
            metadata.len(),
        ));
    }
    files.sort();

    log::info!("GET {} -> [listing {} files]", uri, files.len());
    let files_listing = files
        .iter()
        .map(|(name, len)| {
            format!(
                concat!("<div>", "<a href=\"{name}\">{name}</a> ", "{len} bytes", "</div>"),
                name = name,
                len = len
            )
        })
        .collect::<Vec<_>>()
        .join("");
    let mut resp = Response::new(body::full(format!(
        concat!(
            "<!DOCTYPE html>",
            "<html>",
            "<head></head>",
            "<body>",
            "{files_listing}",
            "</body>",
            "</html>",
        ),
        files_listing = files_listing
    )));
    resp.headers_mut().typed_insert(ContentType::html());
    resp
}
