//! Skrajute Domain Layer
//!
//! This crate contains the value objects and boundary traits shared by every
//! other Skrajute crate. It holds no I/O and no pipeline logic.
//!
//! ## Key Concepts
//!
//! - **Promotion**: One detected flyer module with price, discount, loyalty or bundle semantics
//! - **PageMeta**: Per-page context reported by the vision model
//! - **ExtractedProduct**: Flattened, price-only projection kept for older consumers
//! - **Catalog**: Category vocabulary, unit synonyms and store contexts
//! - **VisionClient**: The external vision-model collaborator
//!
//! ## Architecture
//!
//! ```text
//! skrajute-domain ← skrajute-llm
//!                 ← skrajute-extractor
//!                 ← skrajute-gatekeeper
//! ```
//!
//! Infrastructure implementations (HTTP clients, mocks) live in other crates;
//! this crate only declares the traits they implement.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod catalog;
mod de;
pub mod image;
pub mod product;
pub mod promotion;
pub mod traits;
pub mod usage;

// Re-exports for convenience
pub use catalog::{Catalog, CatalogError, CatalogFile, CategoryKeywords};
pub use image::PageImage;
pub use product::ExtractedProduct;
pub use promotion::{BoundingBox, DiscountType, PageMeta, Promotion, PromotionType};
pub use traits::{VisionClient, VisionResponse};
pub use usage::{TokenUsage, UsageEvent, UsageSink};
