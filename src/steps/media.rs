use std::path::{Path, PathBuf};

use bytes::Bytes;
use tracing::{debug, warn};

use crate::error::{AppError, ClassifiedError};

/// Hard upload limit of the transcription service.
pub const MAX_FILE_SIZE_MB: usize = 25;
pub const MAX_FILE_SIZE: usize = MAX_FILE_SIZE_MB * 1024 * 1024;

const AUDIO_SUBTYPES: &[&str] = &["mpeg", "mp3", "mpga", "wav", "webm", "m4a", "mp4", "ogg"];
const VIDEO_SUBTYPES: &[&str] = &["mp4", "webm", "quicktime", "x-msvideo", "mpeg"];

/// Extension → MIME type for files read from disk.
const EXTENSION_MIME: &[(&str, &str)] = &[
    ("mp3", "audio/mpeg"),
    ("mpga", "audio/mpeg"),
    ("wav", "audio/wav"),
    ("m4a", "audio/m4a"),
    ("ogg", "audio/ogg"),
    ("oga", "audio/ogg"),
    ("weba", "audio/webm"),
    ("mp4", "video/mp4"),
    ("m4v", "video/mp4"),
    ("webm", "video/webm"),
    ("mov", "video/quicktime"),
    ("avi", "video/x-msvideo"),
    ("mpeg", "video/mpeg"),
    ("mpg", "video/mpeg"),
];

/// An uploaded audio or video file.
#[derive(Debug, Clone)]
pub struct MediaUpload {
    pub file_name: String,
    pub mime_type: String,
    pub bytes: Bytes,
}

impl MediaUpload {
    pub fn new(file_name: impl Into<String>, mime_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            mime_type: mime_type.into(),
            bytes: Bytes::from(bytes),
        }
    }

    /// Reads a file from disk. The MIME type comes from `mime_override` or the
    /// file extension; unknown extensions become `application/octet-stream`
    /// and are rejected later by [`MediaUpload::validate`].
    pub fn from_path(path: &Path, mime_override: Option<&str>) -> Result<Self, AppError> {
        let bytes = std::fs::read(path)?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());
        let mime_type = mime_override
            .map(str::to_string)
            .or_else(|| {
                path.extension()
                    .and_then(|e| e.to_str())
                    .and_then(mime_for_extension)
                    .map(str::to_string)
            })
            .unwrap_or_else(|| "application/octet-stream".to_string());
        Ok(Self::new(file_name, mime_type, bytes))
    }

    pub fn size_mb(&self) -> f64 {
        self.bytes.len() as f64 / (1024.0 * 1024.0)
    }

    /// Checks the limits the transcription service enforces, without any I/O.
    pub fn validate(&self) -> Result<(), ClassifiedError> {
        if self.bytes.is_empty() {
            return Err(reject("File is empty. Please upload a valid audio or video file."));
        }

        if self.bytes.len() > MAX_FILE_SIZE {
            return Err(reject(format!(
                "File is too large ({:.2}MB). Maximum size is {MAX_FILE_SIZE_MB}MB. Please compress or use a shorter file.",
                self.size_mb()
            )));
        }

        if !is_supported_mime(&self.mime_type) {
            return Err(reject(format!(
                "Unsupported file format: {}. Upload an audio ({}) or video ({}) file.",
                self.mime_type,
                AUDIO_SUBTYPES.join(", "),
                VIDEO_SUBTYPES.join(", ")
            )));
        }

        debug!(
            file = %self.file_name,
            size_mb = self.size_mb(),
            mime = %self.mime_type,
            "upload validated"
        );
        Ok(())
    }
}

/// Reads every path before anything is submitted. A file that cannot be read
/// becomes its own failure; the rest of the batch is unaffected.
pub fn load_uploads(
    paths: &[PathBuf],
    mime_override: Option<&str>,
) -> Vec<(String, Result<MediaUpload, ClassifiedError>)> {
    paths
        .iter()
        .map(|path| {
            let label = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string());
            let upload = MediaUpload::from_path(path, mime_override)
                .map_err(|e| reject(format!("Could not read {}: {e}", path.display())));
            (label, upload)
        })
        .collect()
}

fn reject(message: impl Into<String>) -> ClassifiedError {
    let err = ClassifiedError::validation(message);
    warn!("upload rejected: {}", err.message());
    err
}

pub fn mime_for_extension(ext: &str) -> Option<&'static str> {
    let ext = ext.to_ascii_lowercase();
    EXTENSION_MIME
        .iter()
        .find(|(e, _)| *e == ext)
        .map(|(_, mime)| *mime)
}

/// `audio/*` or `video/*` with a subtype the service understands. MIME
/// parameters (`;codecs=opus`) are ignored.
pub fn is_supported_mime(mime: &str) -> bool {
    let essence = mime.split(';').next().unwrap_or_default().trim().to_ascii_lowercase();
    let Some((family, subtype)) = essence.split_once('/') else {
        return false;
    };
    let known = match family {
        "audio" => AUDIO_SUBTYPES,
        "video" => VIDEO_SUBTYPES,
        _ => return false,
    };
    known.iter().any(|s| subtype.contains(s))
}
