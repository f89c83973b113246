use std::path::Path;

use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};

use crate::error::{ChatError, Result};

/// Copy the banner file at `path` into `writer`, line by line, each line
/// terminated by `\n`. The file is opened fresh on every call. Nothing is
/// flushed here; the caller flushes after the name prompt.
pub async fn stream_banner<W>(path: &Path, writer: &mut W) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let banner_error = |source| ChatError::Banner {
        path: path.to_path_buf(),
        source,
    };

    let file = File::open(path).await.map_err(banner_error)?;
    let mut lines = BufReader::new(file).lines();

    while let Some(line) = lines.next_line().await.map_err(banner_error)? {
        writer.write_all(line.as_bytes()).await.map_err(banner_error)?;
        writer.write_all(b"\n").await.map_err(banner_error)?;
    }

    Ok(())
}
