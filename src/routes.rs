use crate::body::{self, ResponseBody};
use hyper::body::Incoming;
use hyper::{Method, Request, Response, StatusCode};
use std::path::PathBuf;

mod files;
mod upload;

/// Configuration shared by both handlers, built once at startup.
pub struct State {
    pub upload_dir: PathBuf,
    pub max_upload_bytes: u64,
}

pub async fn respond_to_request(req: Request<Incoming>, state: &State) -> Response<ResponseBody> {
    match *req.method() {
        Method::POST if req.uri().path() == "/upload" => upload::post(req, state).await,
        Method::GET => files::get(req, state).await,
        _ => {
            log::warn!("{} {} -> [method not allowed]", req.method(), req.uri());
            let mut resp = Response::new(body::empty());
            *resp.status_mut() = StatusCode::METHOD_NOT_ALLOWED;
            resp
        }
    }
}
