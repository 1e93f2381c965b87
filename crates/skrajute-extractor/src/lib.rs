//! Skrajute Extractor
//!
//! Turns grocery flyer page images into structured promotions using a
//! vision-capable language model.
//!
//! # Architecture
//!
//! ```text
//! Page image → Prompt → VisionClient → Parser → Normalizer → ExtractionResult
//! ```
//!
//! # Key Features
//!
//! - **Two-pass reading**: a detection pass locates modules, a detail pass reads each box
//! - **Fallback**: a single unified pass when the detection response cannot be parsed
//! - **Tolerant parsing**: code fences, commentary and typographic quotes are handled
//! - **Normalization**: prices, units, categories and tags are canonicalized and scored
//! - **Sequential batches**: pages run one at a time with a cancellable delay
//!
//! # Example Usage
//!
//! ```
//! use skrajute_domain::{Catalog, PageImage};
//! use skrajute_extractor::{Extractor, ExtractorConfig};
//! use skrajute_llm::MockVisionClient;
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! # tokio_test::block_on(async {
//! let client = MockVisionClient::new(
//!     r#"{"promotions": [{"name": "Bananai", "price": "1.19", "unit": "kilogramas"}]}"#,
//! );
//! let extractor =
//!     Extractor::new(client, Arc::new(Catalog::default()), ExtractorConfig::default()).unwrap();
//!
//! let cancel = CancellationToken::new();
//! let result = extractor
//!     .extract_page(&cancel, "IKI", 1, &PageImage::url("https://cdn.example/iki/1.jpg"))
//!     .await;
//!
//! assert!(result.success);
//! assert_eq!(result.products[0].price, "1,19 €");
//! assert_eq!(result.promotions[0].unit.as_deref(), Some("kg"));
//! # });
//! ```

#![warn(missing_docs)]

mod config;
mod error;
mod extractor;
mod normalize;
mod parser;
mod prompt;
mod types;

#[cfg(test)]
mod tests;

pub use config::ExtractorConfig;
pub use error::{ExtractorError, Stage};
pub use extractor::Extractor;
pub use normalize::{clean_text, dedupe_tags, Normalizer, PageContext};
pub use parser::{parse_response, ParseError};
pub use prompt::PromptBuilder;
pub use types::{ExtractionResult, FlyerExtraction, ParsedPage};
