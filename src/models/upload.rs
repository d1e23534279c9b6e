use bytes::Bytes;
use garde::Validate;
use image::ImageFormat;

/// Limits the analysis service places on uploads.
#[derive(Debug, Clone, Copy)]
pub struct UploadLimits {
    pub max_image_bytes: usize,
}

impl Default for UploadLimits {
    fn default() -> Self {
        Self {
            max_image_bytes: 10 * 1024 * 1024,
        }
    }
}

/// An outfit image queued for analysis on behalf of one user.
///
/// Built through [`UploadRequest::new`], which validates the payload, so a
/// request held by the poller is always submittable.
#[derive(Debug, Clone, Validate)]
#[garde(context(UploadLimits))]
pub struct UploadRequest {
    #[garde(custom(image_within_limits))]
    image: Bytes,

    #[garde(length(min = 1), custom(not_blank))]
    user_id: String,

    /// `None` when the bytes don't match a known signature (HEIC, AVIF...).
    #[garde(skip)]
    format: Option<ImageFormat>,
}

impl UploadRequest {
    pub fn new(
        image: impl Into<Bytes>,
        user_id: impl Into<String>,
        limits: &UploadLimits,
    ) -> Result<Self, RequestError> {
        let image = image.into();
        let user_id = user_id.into();

        let format = image::guess_format(&image).ok();

        let request = Self {
            image,
            user_id,
            format,
        };
        request.validate_with(limits)?;
        Ok(request)
    }

    pub fn image(&self) -> &Bytes {
        &self.image
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn len(&self) -> usize {
        self.image.len()
    }

    pub fn is_empty(&self) -> bool {
        self.image.is_empty()
    }

    pub fn format(&self) -> Option<ImageFormat> {
        self.format
    }

    pub fn mime_type(&self) -> &'static str {
        self.format
            .map_or("application/octet-stream", |f| f.to_mime_type())
    }

    /// File name sent in the multipart part, e.g. "outfit.jpg".
    pub fn file_name(&self) -> String {
        let ext = self
            .format
            .and_then(|f| f.extensions_str().first().copied())
            .unwrap_or("bin");
        format!("outfit.{}", ext)
    }
}

fn image_within_limits(image: &Bytes, limits: &UploadLimits) -> garde::Result {
    if image.is_empty() {
        return Err(garde::Error::new("image payload is empty"));
    }
    if image.len() > limits.max_image_bytes {
        return Err(garde::Error::new(format!(
            "image is {} bytes, limit is {}",
            image.len(),
            limits.max_image_bytes
        )));
    }
    Ok(())
}

fn not_blank(value: &str, _limits: &UploadLimits) -> garde::Result {
    if value.trim().is_empty() {
        return Err(garde::Error::new("must not be blank"));
    }
    Ok(())
}

#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    #[error("Invalid upload request: {0}")]
    Invalid(#[from] garde::Report),
}
