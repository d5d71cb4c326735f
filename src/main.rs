use std::net::SocketAddr;

mod body;
mod detect;
mod err;
mod http;
mod opt;
mod routes;
mod store;

#[tokio::main]
async fn main() -> Result<(), err::DisplayError> {
    let opt::Options {
        verbose,
        upload_dir,
        max_upload_size,
        port,
    } = clap::Parser::parse();

    env_logger::Builder::new()
        .filter_level(match verbose {
            0 => log::LevelFilter::Info,
            1 => log::LevelFilter::Debug,
            _ => log::LevelFilter::Trace,
        })
        .init();

    tokio::fs::create_dir_all(&upload_dir).await?;

    let state = routes::State {
        upload_dir,
        max_upload_bytes: max_upload_size,
    };

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    log::info!("Listening on: http://{}", addr);
    http::run_simple_server(addr, state, routes::respond_to_request).await?;

    Ok(())
}
