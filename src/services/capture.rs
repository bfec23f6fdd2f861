// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Photo acquisition: camera sessions and uploaded images.
//!
//! A [`CaptureSession`] owns an open camera stream and stops it when dropped,
//! so every exit path (frame taken, step left, cancel, workflow dropped)
//! releases the device.

use async_trait::async_trait;
use base64::Engine;
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::error::AppError;

/// Largest image accepted from a capture or upload.
pub const MAX_IMAGE_BYTES: usize = 10 * 1024 * 1024;

/// Which camera to open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Facing {
    /// Environment-facing, for the tree photo
    Rear,
    /// User-facing, for the selfie
    Front,
}

/// A camera that can be opened for a live stream.
#[async_trait]
pub trait CameraDevice: Send + Sync {
    async fn open(&self, facing: Facing) -> Result<Box<dyn CameraStream>, AppError>;
}

/// An open camera stream.
#[async_trait]
pub trait CameraStream: Send + Sync {
    /// Grab one still frame encoded as JPEG.
    async fn capture_jpeg(&mut self) -> Result<Vec<u8>, AppError>;

    /// Release the device. Must be idempotent.
    fn stop(&mut self);
}

/// Exclusive hold on an open camera stream.
pub struct CaptureSession {
    facing: Facing,
    stream: Box<dyn CameraStream>,
}

impl CaptureSession {
    pub async fn open(camera: &dyn CameraDevice, facing: Facing) -> Result<Self, AppError> {
        let stream = camera.open(facing).await?;
        tracing::debug!(?facing, "Camera stream opened");
        Ok(Self { facing, stream })
    }

    pub fn facing(&self) -> Facing {
        self.facing
    }

    /// Capture one frame and release the stream, whatever the outcome.
    pub async fn capture(mut self) -> Result<Photo, AppError> {
        let bytes = self.stream.capture_jpeg().await?;
        drop(self);

        if sniff_image(&bytes) != Some(ImageFormat::Jpeg) {
            return Err(AppError::Device(
                "Camera returned a frame that is not a JPEG".to_string(),
            ));
        }
        Ok(Photo::InMemory {
            bytes,
            format: ImageFormat::Jpeg,
        })
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        self.stream.stop();
        tracing::debug!(facing = ?self.facing, "Camera stream released");
    }
}

/// Image formats accepted for uploads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    Jpeg,
    Png,
    Gif,
    Webp,
}

impl ImageFormat {
    pub fn mime(&self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "image/jpeg",
            ImageFormat::Png => "image/png",
            ImageFormat::Gif => "image/gif",
            ImageFormat::Webp => "image/webp",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "jpg",
            ImageFormat::Png => "png",
            ImageFormat::Gif => "gif",
            ImageFormat::Webp => "webp",
        }
    }
}

/// Detect the image format from its leading magic bytes.
pub fn sniff_image(bytes: &[u8]) -> Option<ImageFormat> {
    if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        Some(ImageFormat::Jpeg)
    } else if bytes.starts_with(b"\x89PNG\r\n\x1a\n") {
        Some(ImageFormat::Png)
    } else if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
        Some(ImageFormat::Gif)
    } else if bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        Some(ImageFormat::Webp)
    } else {
        None
    }
}

/// A photo held by the workflow: captured/uploaded bytes, or a stored reference.
#[derive(Debug, Clone, PartialEq)]
pub enum Photo {
    InMemory { bytes: Vec<u8>, format: ImageFormat },
    Stored(String),
}

impl Photo {
    /// Validate an uploaded file against its declared MIME type.
    pub fn from_upload(declared_mime: &str, bytes: Vec<u8>) -> Result<Self, AppError> {
        let declared = declared_mime.trim().to_ascii_lowercase();
        if !declared.starts_with("image/") {
            return Err(AppError::Validation(format!(
                "Please select an image file (got {})",
                declared_mime
            )));
        }
        if bytes.is_empty() {
            return Err(AppError::Validation("Image is empty".to_string()));
        }
        if bytes.len() > MAX_IMAGE_BYTES {
            return Err(AppError::Validation(format!(
                "Image exceeds {} MB",
                MAX_IMAGE_BYTES / (1024 * 1024)
            )));
        }
        let format = sniff_image(&bytes).ok_or_else(|| {
            AppError::Validation("File content is not a supported image".to_string())
        })?;
        Ok(Photo::InMemory { bytes, format })
    }

    /// Parse a `data:image/...;base64,...` URL.
    pub fn from_data_url(data_url: &str) -> Result<Self, AppError> {
        let rest = data_url
            .strip_prefix("data:")
            .ok_or_else(|| AppError::Validation("Expected a data URL".to_string()))?;
        let (header, payload) = rest
            .split_once(',')
            .ok_or_else(|| AppError::Validation("Malformed data URL".to_string()))?;
        let mime = header
            .strip_suffix(";base64")
            .ok_or_else(|| AppError::Validation("Data URL must be base64-encoded".to_string()))?;

        let bytes = base64::engine::general_purpose::STANDARD
            .decode(payload.trim())
            .map_err(|e| AppError::Validation(format!("Invalid base64 image data: {}", e)))?;

        Self::from_upload(mime, bytes)
    }

    pub fn is_stored(&self) -> bool {
        matches!(self, Photo::Stored(_))
    }

    pub fn stored_url(&self) -> Option<&str> {
        match self {
            Photo::Stored(url) => Some(url),
            Photo::InMemory { .. } => None,
        }
    }

    /// Content-addressed blob path: `trees/{user}/{field}/{sha256}.{ext}`.
    pub fn blob_path(user_id: &str, field: &str, bytes: &[u8], format: ImageFormat) -> String {
        let digest = hex::encode(Sha256::digest(bytes));
        format!(
            "trees/{}/{}/{}.{}",
            user_id,
            field,
            digest,
            format.extension()
        )
    }
}
