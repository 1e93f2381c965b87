//! Page image references

/// A flyer page image, either by reference or inline
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageImage {
    /// Publicly reachable image URL
    Url(String),
    /// Base64-encoded image bytes
    Inline {
        /// Base64 payload
        data: String,
        /// MIME type ("image/jpeg")
        mime_type: String,
    },
}

impl PageImage {
    /// Image by URL
    pub fn url(url: impl Into<String>) -> Self {
        PageImage::Url(url.into())
    }

    /// Image by base64 payload
    pub fn inline(data: impl Into<String>, mime_type: impl Into<String>) -> Self {
        PageImage::Inline {
            data: data.into(),
            mime_type: mime_type.into(),
        }
    }

    /// Short description for logs (never the payload itself)
    pub fn describe(&self) -> String {
        match self {
            PageImage::Url(url) => url.clone(),
            PageImage::Inline { data, mime_type } => {
                format!("inline {} ({} bytes encoded)", mime_type, data.len())
            }
        }
    }
}
