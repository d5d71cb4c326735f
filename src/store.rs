use std::io;
use std::path::Path;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

/// Writes content to the storage directory under a freshly generated name
/// and returns that name.
///
/// The file is opened with create-new semantics: an identifier collision
/// (however unlikely) fails instead of overwriting a stored file.
pub async fn persist(dir: &Path, extension: &str, content: &[u8]) -> Result<String, io::Error> {
    let name = format!("{}.{}", Uuid::new_v4(), extension);
    let path = dir.join(&name);

    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&path)
        .await?;
    file.write_all(content).await?;

    Ok(name)
}
