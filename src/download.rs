use crate::order::DownloadOptions;
use crate::progress;
use anyhow::Result;
use futures_util::StreamExt;
use reqwest::header::RANGE;
use reqwest::{RequestBuilder, StatusCode};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

fn partial_path(dst: &Path) -> PathBuf {
    let mut name = dst.as_os_str().to_owned();
    name.push(".partial");
    PathBuf::from(name)
}

/// Streams the response of `request` to `dst`.
///
/// Bytes go to `<dst>.partial` first and the file is renamed once complete.
/// A leftover partial file is resumed with a range request when the server
/// honours it. Returns `false` without sending anything if `dst` exists and
/// overwriting is off.
pub async fn download(request: RequestBuilder, dst: &Path, options: &DownloadOptions) -> Result<bool> {
    if dst.exists() && !options.overwrite {
        info!("Skipping {}, file already exists", dst.display());
        return Ok(false);
    }
    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent)?;
    }

    let partial = partial_path(dst);
    let offset = fs::metadata(&partial).map(|m| m.len()).unwrap_or(0);
    let request = if offset > 0 {
        request.header(RANGE, format!("bytes={offset}-"))
    } else {
        request
    };

    let response = request.send().await?;
    if offset > 0 && response.status() == StatusCode::RANGE_NOT_SATISFIABLE {
        // the partial file already holds everything
        fs::rename(&partial, dst)?;
        info!("Downloaded {}", dst.display());
        return Ok(true);
    }
    let response = response.error_for_status()?;

    let resumed = offset > 0 && response.status() == StatusCode::PARTIAL_CONTENT;
    let start = if resumed { offset } else { 0 };
    if resumed {
        info!("Resuming {} from byte {}", dst.display(), offset);
    }

    let mut file = OpenOptions::new()
        .create(true)
        .write(true)
        .append(resumed)
        .truncate(!resumed)
        .open(&partial)?;

    let name = dst
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let total = response.content_length().map(|len| len + start);
    let bar = progress::download_bar(total, &name, options.show_progress);
    bar.set_position(start);

    let mut stream = response.bytes_stream();
    while let Some(bytes) = stream.next().await {
        let bytes = bytes?;
        file.write_all(&bytes)?;
        bar.inc(bytes.len() as u64);
    }
    file.flush()?;
    drop(file);
    bar.finish_and_clear();

    fs::rename(&partial, dst)?;
    info!("Downloaded {}", dst.display());
    Ok(true)
}
