//! Request and response types for extraction

use crate::error::ExtractorError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use skrajute_domain::{ExtractedProduct, PageMeta, Promotion, TokenUsage};
use std::time::Duration;

/// Decoded model output for one page, before normalization
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ParsedPage {
    /// Page context reported by the model
    pub page_meta: PageMeta,
    /// Promotions in model order
    pub promotions: Vec<Promotion>,
}

/// Outcome of extracting one page
///
/// Failed pages are still fully populated (page number, timing, usage) with
/// `success == false` and the reason in `error`.
#[derive(Debug, Clone)]
pub struct ExtractionResult {
    /// 1-based page number
    pub page_number: u32,

    /// Normalized, scored promotions that passed the validity filter
    pub promotions: Vec<Promotion>,

    /// Legacy view: the priced subset of `promotions`, same order
    pub products: Vec<ExtractedProduct>,

    /// Page context (page number always set)
    pub page_meta: PageMeta,

    /// Number of promotions kept
    pub promotion_count: usize,

    /// Number of legacy products
    pub product_count: usize,

    /// When the extraction started
    pub started_at: DateTime<Utc>,

    /// When the extraction finished
    pub finished_at: DateTime<Utc>,

    /// Wall-clock time spent on the page
    pub elapsed: Duration,

    /// Tokens accumulated across every model call for the page
    pub usage: TokenUsage,

    /// Raw text of the last successful model call
    pub raw_response: Option<String>,

    /// Whether the page protocol reached its final state
    pub success: bool,

    /// Human-readable failure reason
    pub error: Option<String>,

    /// Structured failure reason
    pub failure: Option<ExtractorError>,

    /// Whether the unified fallback pass ran
    pub used_fallback: bool,
}

impl ExtractionResult {
    pub(crate) fn started(page_number: u32) -> Self {
        let now = Utc::now();
        Self {
            page_number,
            promotions: Vec::new(),
            products: Vec::new(),
            page_meta: PageMeta {
                page_number,
                ..Default::default()
            },
            promotion_count: 0,
            product_count: 0,
            started_at: now,
            finished_at: now,
            elapsed: Duration::ZERO,
            usage: TokenUsage::default(),
            raw_response: None,
            success: false,
            error: None,
            failure: None,
            used_fallback: false,
        }
    }

    pub(crate) fn succeed(&mut self, page_meta: PageMeta, promotions: Vec<Promotion>) {
        self.products = ExtractedProduct::from_promotions(&promotions);
        self.promotion_count = promotions.len();
        self.product_count = self.products.len();
        self.promotions = promotions;
        self.page_meta = page_meta;
        self.success = true;
    }

    pub(crate) fn fail(&mut self, error: ExtractorError) {
        self.error = Some(error.to_string());
        self.failure = Some(error);
        self.success = false;
    }

    pub(crate) fn finish(mut self, elapsed: Duration) -> Self {
        self.finished_at = Utc::now();
        self.elapsed = elapsed;
        self
    }

    /// Elapsed time in milliseconds
    pub fn duration_ms(&self) -> u64 {
        self.elapsed.as_millis() as u64
    }
}

/// Outcome of extracting a whole flyer
///
/// `pages` holds every page that completed, failed pages included. `error`
/// is set when the batch stopped early.
#[derive(Debug, Clone, Default)]
pub struct FlyerExtraction {
    /// Completed pages, in page order
    pub pages: Vec<ExtractionResult>,
    /// Why the batch stopped early
    pub error: Option<ExtractorError>,
}

impl FlyerExtraction {
    /// Whether every page was attempted
    pub fn is_complete(&self) -> bool {
        self.error.is_none()
    }

    /// Tokens across all pages
    pub fn total_tokens(&self) -> TokenUsage {
        let mut total = TokenUsage::default();
        for page in &self.pages {
            total += page.usage;
        }
        total
    }

    /// Number of pages that succeeded
    pub fn successful_pages(&self) -> usize {
        self.pages.iter().filter(|p| p.success).count()
    }

    /// Legacy products across all pages, in page order
    pub fn all_products(&self) -> Vec<&ExtractedProduct> {
        self.pages.iter().flat_map(|p| p.products.iter()).collect()
    }

    /// Promotions across all pages, in page order
    pub fn all_promotions(&self) -> Vec<&Promotion> {
        self.pages.iter().flat_map(|p| p.promotions.iter()).collect()
    }
}
