//! Content hashing of finished files.

use std::path::Path;

use tokio::io::AsyncReadExt;

use crate::error::{MediaError, MediaResult};

const CHUNK_SIZE: usize = 64 * 1024;

/// Lowercase hex MD5 of a file's bytes, read in chunks.
pub async fn md5_file(path: &Path) -> MediaResult<String> {
    let mut file = tokio::fs::File::open(path).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => MediaError::FileNotFound(path.to_path_buf()),
        _ => MediaError::Io(e),
    })?;

    let mut context = md5::Context::new();
    let mut buf = vec![0u8; CHUNK_SIZE];
    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        context.consume(&buf[..n]);
    }

    Ok(format!("{:x}", context.compute()))
}
