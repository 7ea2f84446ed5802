//! Frame sampling from evidence files
//!
//! Images contribute exactly one frame. Videos are sampled at a fixed
//! frame-index stride through the ffmpeg command-line tools: one ffprobe
//! run for the total frame count, one ffmpeg run extracting the sampled
//! frames as JPEGs into a scratch directory.

use std::path::{Path, PathBuf};
use std::process::Command;
use thiserror::Error;

/// Video containers accepted as evidence
const VIDEO_EXTENSIONS: &[&str] = &["mp4", "avi", "mov", "mkv", "wmv", "flv", "webm", "m4v"];

/// Image formats accepted as evidence
const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "tiff", "tif", "webp"];

/// Frame sampling errors
#[derive(Debug, Error)]
pub enum SampleError {
    /// ffmpeg/ffprobe binary not found in PATH
    #[error("{0} binary not found in PATH")]
    BinaryNotFound(&'static str),

    /// ffprobe ran but did not yield a usable frame count
    #[error("Failed to probe video: {0}")]
    ProbeFailed(String),

    /// ffmpeg frame extraction failed
    #[error("Failed to extract frames: {0}")]
    ExtractionFailed(String),

    /// File is neither a supported image nor a supported video
    #[error("Unsupported file type: {0}")]
    UnsupportedType(String),

    /// I/O error (file read/write)
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Background task join failure
    #[error("Task join error: {0}")]
    JoinError(String),
}

/// Kind of evidence media
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Image,
    Video,
}

/// Sampled frames of one evidence file, ready for the inference stream
#[derive(Debug)]
pub struct SampledMedia {
    /// Encoded frames in index order
    pub frames: Vec<Vec<u8>>,
    /// Frames in the source before sampling (1 for images)
    pub total_frames: usize,
    pub kind: MediaKind,
}

/// Number of frames a stride-sampled video contributes
/// (indices 0, S, 2S, ... below `total_frames`)
pub fn sampled_frame_count(total_frames: usize, stride: usize) -> usize {
    let stride = stride.max(1);
    total_frames.div_ceil(stride)
}

/// Classify a file by extension; `None` when the extension is unknown
pub fn media_kind_from_extension(path: &Path) -> Option<MediaKind> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
        Some(MediaKind::Video)
    } else if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
        Some(MediaKind::Image)
    } else {
        None
    }
}

/// Frame sampler for evidence files
pub struct FrameSampler {
    frame_stride: usize,
}

impl FrameSampler {
    pub fn new(frame_stride: usize) -> Self {
        Self {
            frame_stride: frame_stride.max(1),
        }
    }

    /// Sample an evidence file into encoded frames.
    ///
    /// The media kind comes from the extension, falling back to content
    /// sniffing for unknown extensions; anything else is rejected before
    /// any decoding work.
    pub async fn sample(&self, path: &Path) -> Result<SampledMedia, SampleError> {
        let kind = match media_kind_from_extension(path) {
            Some(kind) => kind,
            None => sniff_media_kind(path).await?,
        };

        match kind {
            MediaKind::Image => {
                let bytes = tokio::fs::read(path).await?;
                Ok(SampledMedia {
                    frames: vec![bytes],
                    total_frames: 1,
                    kind,
                })
            }
            MediaKind::Video => self.sample_video(path).await,
        }
    }

    async fn sample_video(&self, path: &Path) -> Result<SampledMedia, SampleError> {
        let total_frames = probe_frame_count(path).await?;

        let scratch = std::env::temp_dir().join(format!("rangecoach_frames_{}", uuid::Uuid::new_v4()));
        tokio::fs::create_dir_all(&scratch).await?;

        let result = self.extract_frames(path, &scratch).await;

        // Scratch dir is removed on both paths before errors propagate
        let frames = match result {
            Ok(()) => read_frames_in_order(&scratch).await,
            Err(e) => {
                let _ = tokio::fs::remove_dir_all(&scratch).await;
                return Err(e);
            }
        };
        let _ = tokio::fs::remove_dir_all(&scratch).await;
        let frames = frames?;

        tracing::debug!(
            file = %path.display(),
            total_frames,
            sampled = frames.len(),
            stride = self.frame_stride,
            "Video sampled"
        );

        Ok(SampledMedia {
            frames,
            total_frames,
            kind: MediaKind::Video,
        })
    }

    async fn extract_frames(&self, path: &Path, scratch: &Path) -> Result<(), SampleError> {
        let input = path.to_path_buf();
        let pattern = scratch.join("frame_%06d.jpg");
        let filter = format!("select=not(mod(n\\,{}))", self.frame_stride);

        let output = tokio::task::spawn_blocking(move || {
            Command::new("ffmpeg")
                .arg("-v")
                .arg("error")
                .arg("-i")
                .arg(&input)
                .arg("-vf")
                .arg(&filter)
                .arg("-vsync")
                .arg("vfr")
                .arg("-q:v")
                .arg("2")
                .arg(&pattern)
                .output()
        })
        .await
        .map_err(|e| SampleError::JoinError(e.to_string()))?
        .map_err(|e| binary_error("ffmpeg", e))?;

        if !output.status.success() {
            return Err(SampleError::ExtractionFailed(format!(
                "exit code {:?}: {}",
                output.status.code(),
                String::from_utf8_lossy(&output.stderr)
            )));
        }
        Ok(())
    }
}

/// Count video frames with ffprobe
async fn probe_frame_count(path: &Path) -> Result<usize, SampleError> {
    let input = path.to_path_buf();
    let output = tokio::task::spawn_blocking(move || {
        Command::new("ffprobe")
            .arg("-v")
            .arg("error")
            .arg("-select_streams")
            .arg("v:0")
            .arg("-count_frames")
            .arg("-show_entries")
            .arg("stream=nb_read_frames")
            .arg("-of")
            .arg("csv=p=0")
            .arg(&input)
            .output()
    })
    .await
    .map_err(|e| SampleError::JoinError(e.to_string()))?
    .map_err(|e| binary_error("ffprobe", e))?;

    if !output.status.success() {
        return Err(SampleError::ProbeFailed(
            String::from_utf8_lossy(&output.stderr).into_owned(),
        ));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    stdout
        .trim()
        .parse::<usize>()
        .map_err(|_| SampleError::ProbeFailed(format!("unparseable frame count: {:?}", stdout)))
}

/// Read extracted frame files back in index order
async fn read_frames_in_order(scratch: &Path) -> Result<Vec<Vec<u8>>, SampleError> {
    let mut paths = Vec::new();
    let mut entries = tokio::fs::read_dir(scratch).await?;
    while let Some(entry) = entries.next_entry().await? {
        paths.push(entry.path());
    }
    paths.sort();

    let mut frames = Vec::with_capacity(paths.len());
    for path in paths {
        frames.push(tokio::fs::read(&path).await?);
    }
    Ok(frames)
}

/// Sniff the media kind from file content for unknown extensions
async fn sniff_media_kind(path: &Path) -> Result<MediaKind, SampleError> {
    let bytes = tokio::fs::read(path).await?;
    match infer::get(&bytes).map(|t| t.matcher_type()) {
        Some(infer::MatcherType::Image) => Ok(MediaKind::Image),
        Some(infer::MatcherType::Video) => Ok(MediaKind::Video),
        _ => Err(SampleError::UnsupportedType(path.display().to_string())),
    }
}

fn binary_error(binary: &'static str, e: std::io::Error) -> SampleError {
    if e.kind() == std::io::ErrorKind::NotFound {
        SampleError::BinaryNotFound(binary)
    } else {
        SampleError::ExtractionFailed(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stride_sampling_counts_match_frame_indices() {
        // Indices 0,2,4,6,8 of a 10-frame video
        assert_eq!(sampled_frame_count(10, 2), 5);
        assert_eq!(sampled_frame_count(9, 2), 5);
        assert_eq!(sampled_frame_count(1, 2), 1);
        assert_eq!(sampled_frame_count(0, 2), 0);
        assert_eq!(sampled_frame_count(10, 1), 10);
        assert_eq!(sampled_frame_count(10, 3), 4);
    }

    #[test]
    fn stride_zero_is_clamped_to_one() {
        assert_eq!(sampled_frame_count(7, 0), 7);
        assert_eq!(FrameSampler::new(0).frame_stride, 1);
    }

    #[test]
    fn extension_classification() {
        assert_eq!(
            media_kind_from_extension(Path::new("a/b/cx_left.mp4")),
            Some(MediaKind::Video)
        );
        assert_eq!(
            media_kind_from_extension(Path::new("a/b/cx_front.JPG")),
            Some(MediaKind::Image)
        );
        assert_eq!(media_kind_from_extension(Path::new("a/b/cx_left.txt")), None);
        assert_eq!(media_kind_from_extension(Path::new("a/b/noext")), None);
    }

    #[tokio::test]
    async fn image_sampling_yields_single_frame() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cx_front.jpg");
        tokio::fs::write(&path, b"jpeg-bytes").await.unwrap();

        let sampler = FrameSampler::new(2);
        let sampled = sampler.sample(&path).await.unwrap();
        assert_eq!(sampled.kind, MediaKind::Image);
        assert_eq!(sampled.total_frames, 1);
        assert_eq!(sampled.frames, vec![b"jpeg-bytes".to_vec()]);
    }

    #[tokio::test]
    async fn unknown_content_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.dat");
        tokio::fs::write(&path, b"plain text, not media").await.unwrap();

        let sampler = FrameSampler::new(2);
        match sampler.sample(&path).await {
            Err(SampleError::UnsupportedType(_)) => {}
            other => panic!("expected UnsupportedType, got {:?}", other.map(|s| s.kind)),
        }
    }
}
