mod analysis;
mod media;
mod transcription;

pub use analysis::{AnalysisResult, AnalysisStep, HighlightSegment, format_timestamp};
pub use media::{MAX_FILE_SIZE, MAX_FILE_SIZE_MB, MediaUpload, load_uploads};
pub use transcription::{TranscriptionResult, TranscriptionStep};
