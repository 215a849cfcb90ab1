use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::Bytes;
use camrelay_settings::WorkerSettings;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::errors::PipelineError;
use crate::format::ImageFormat;

/// Result of analysing one frame, as sent back to the client.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Analysis {
    pub success: bool,
    pub caption: String,
    /// Image to display alongside the caption, as a data URI.
    pub image: String,
}

/// Turns one frame into an [`Analysis`].
#[async_trait]
pub trait Analyzer: Send + Sync + 'static {
    async fn analyze(&self, image: Bytes) -> Result<Analysis, PipelineError>;
}

/// Echoes the image back with a fixed caption.
#[derive(Clone, Debug)]
pub struct PlaceholderAnalyzer {
    caption: String,
    max_image_bytes: usize,
}

impl PlaceholderAnalyzer {
    pub fn new(caption: impl Into<String>, max_image_bytes: usize) -> Self {
        Self {
            caption: caption.into(),
            max_image_bytes,
        }
    }
}

impl From<&WorkerSettings> for PlaceholderAnalyzer {
    fn from(settings: &WorkerSettings) -> Self {
        Self::new(settings.caption.clone(), settings.max_image_bytes)
    }
}

#[async_trait]
impl Analyzer for PlaceholderAnalyzer {
    async fn analyze(&self, image: Bytes) -> Result<Analysis, PipelineError> {
        if image.is_empty() {
            return Err(PipelineError::EmptyFrame);
        }
        if image.len() > self.max_image_bytes {
            return Err(PipelineError::TooLarge {
                size: image.len(),
                limit: self.max_image_bytes,
            });
        }
        let format = ImageFormat::sniff(&image).ok_or(PipelineError::UnsupportedFormat)?;
        Ok(Analysis {
            success: true,
            caption: self.caption.clone(),
            image: format!("data:{};base64,{}", format.mime(), STANDARD.encode(&image)),
        })
    }
}

/// Serialise an analysis result for the wire. Failures become
/// `{"success": false, "error": ...}`.
pub fn encode_result(result: &Result<Analysis, PipelineError>) -> Bytes {
    let value = match result {
        Ok(analysis) => json!(analysis),
        Err(e) => json!({ "success": false, "error": e.to_string() }),
    };
    Bytes::from(value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const JPEG: &[u8] = &[0xff, 0xd8, 0xff, 0xe0, 0x00, 0x10, b'J', b'F', b'I', b'F'];

    fn analyzer() -> PlaceholderAnalyzer {
        PlaceholderAnalyzer::new("caption", 64)
    }

    #[tokio::test]
    async fn jpeg_comes_back_as_data_uri() {
        let analysis = analyzer().analyze(Bytes::from_static(JPEG)).await.unwrap();
        assert!(analysis.success);
        assert_eq!(analysis.caption, "caption");
        let encoded = analysis.image.strip_prefix("data:image/jpeg;base64,").unwrap();
        assert_eq!(STANDARD.decode(encoded).unwrap(), JPEG);
    }

    #[tokio::test]
    async fn rejects_empty_frames() {
        let err = analyzer().analyze(Bytes::new()).await.unwrap_err();
        assert!(matches!(err, PipelineError::EmptyFrame));
    }

    #[tokio::test]
    async fn rejects_oversized_images() {
        let mut big = JPEG.to_vec();
        big.resize(65, 0);
        let err = analyzer().analyze(Bytes::from(big)).await.unwrap_err();
        assert!(matches!(err, PipelineError::TooLarge { size: 65, limit: 64 }));
    }

    #[tokio::test]
    async fn rejects_non_images() {
        let err = analyzer().analyze(Bytes::from_static(b"plain text")).await.unwrap_err();
        assert!(matches!(err, PipelineError::UnsupportedFormat));
    }

    #[test]
    fn from_worker_settings() {
        let settings = WorkerSettings::default();
        let analyzer = PlaceholderAnalyzer::from(&settings);
        assert_eq!(analyzer.caption, settings.caption);
        assert_eq!(analyzer.max_image_bytes, settings.max_image_bytes);
    }

    #[test]
    fn encodes_success_and_failure() {
        let ok = encode_result(&Ok(Analysis {
            success: true,
            caption: "x".into(),
            image: "data:image/png;base64,AA==".into(),
        }));
        let parsed: serde_json::Value = serde_json::from_slice(&ok).unwrap();
        assert_eq!(parsed["success"], true);
        assert_eq!(parsed["caption"], "x");
        assert_eq!(parsed["image"], "data:image/png;base64,AA==");

        let failed = encode_result(&Err(PipelineError::UnsupportedFormat));
        let parsed: serde_json::Value = serde_json::from_slice(&failed).unwrap();
        assert_eq!(parsed["success"], false);
        assert_eq!(parsed["error"], "frame is not a supported image");
        assert!(parsed.get("caption").is_none());
    }
}
