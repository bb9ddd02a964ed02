use std::path::Path;
use tokio::process::Command;
use tracing::warn;

/// Converts PNG bytes to JPEG by shelling out to ffmpeg.
///
/// Returns `None` on any failure (ffmpeg missing, bad input, non-zero
/// exit); callers deliver the original PNG in that case rather than
/// failing the operation.
pub async fn png_to_jpeg(png: &[u8]) -> Option<Vec<u8>> {
    let dir = match tempfile::tempdir() {
        Ok(dir) => dir,
        Err(err) => {
            warn!(target = "flatlay.transcode", error = %err, "tempdir_failed");
            return None;
        }
    };
    let png_path = dir.path().join("frame.png");
    let jpg_path = dir.path().join("frame.jpg");

    if let Err(err) = tokio::fs::write(&png_path, png).await {
        warn!(target = "flatlay.transcode", error = %err, "write_failed");
        return None;
    }

    match run_ffmpeg(&png_path, &jpg_path).await {
        Ok(()) => tokio::fs::read(&jpg_path).await.ok(),
        Err(message) => {
            warn!(target = "flatlay.transcode", error = %message, "ffmpeg_failed");
            None
        }
    }
}

async fn run_ffmpeg(input: &Path, output: &Path) -> Result<(), String> {
    let status = Command::new("ffmpeg")
        .arg("-i")
        .arg(input)
        .args(["-q:v", "2", "-y"])
        .arg(output)
        .output()
        .await
        .map_err(|err| err.to_string())?;
    if status.status.success() {
        Ok(())
    } else {
        Err(format!("ffmpeg exited with {}", status.status))
    }
}
