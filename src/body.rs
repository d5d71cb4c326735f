use crate::err::Error;
use futures::TryStreamExt;
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Empty, Full, StreamBody};
use hyper::body::{Bytes, Frame};
use tokio::fs::File;
use tokio_util::io::ReaderStream;

pub type ResponseBody = BoxBody<Bytes, Error>;

pub fn empty() -> ResponseBody {
    Empty::<Bytes>::new()
        .map_err(|never| match never {})
        .boxed()
}

pub fn full(content: impl Into<Bytes>) -> ResponseBody {
    Full::new(content.into())
        .map_err(|never| match never {})
        .boxed()
}

pub fn from_file(file: File) -> ResponseBody {
    let stream = ReaderStream::with_capacity(file, 64 * 1024);
    // qualified: StreamBody is both a Stream and a Body, so a bare map_err
    // is ambiguous with TryStreamExt::map_err
    BodyExt::map_err(StreamBody::new(stream.map_ok(Frame::data)), Error::from).boxed()
}
