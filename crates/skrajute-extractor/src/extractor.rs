//! Core Extractor implementation
//!
//! One page runs a small state machine:
//!
//! ```text
//! Detect ──parse ok──▶ FillDetails ──▶ Done
//!    │
//!    └──parse failed──▶ FallbackUnified ──▶ Done
//! ```
//!
//! Model errors are terminal for the page. A batch runs pages one at a time
//! and turns page failures into failed results instead of stopping.

use crate::config::ExtractorConfig;
use crate::error::{ExtractorError, Stage};
use crate::normalize::{Normalizer, PageContext};
use crate::parser::{parse_response, ParseError};
use crate::prompt::PromptBuilder;
use crate::types::{ExtractionResult, FlyerExtraction, ParsedPage};
use skrajute_domain::{
    Catalog, PageImage, PageMeta, Promotion, TokenUsage, UsageEvent, UsageSink, VisionClient,
};
use std::sync::Arc;
use std::time::Instant;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// The Extractor turns flyer page images into normalized promotions
pub struct Extractor<C>
where
    C: VisionClient,
{
    client: Arc<C>,
    catalog: Arc<Catalog>,
    prompts: PromptBuilder,
    normalizer: Normalizer,
    config: ExtractorConfig,
    usage_sink: Option<Arc<dyn UsageSink>>,
}

impl<C> Extractor<C>
where
    C: VisionClient,
{
    /// Create a new Extractor
    ///
    /// Fails when `config` does not pass [`ExtractorConfig::validate`].
    pub fn new(
        client: C,
        catalog: Arc<Catalog>,
        config: ExtractorConfig,
    ) -> Result<Self, ExtractorError> {
        config.validate().map_err(ExtractorError::Config)?;
        Ok(Self {
            client: Arc::new(client),
            prompts: PromptBuilder::new(Arc::clone(&catalog)),
            normalizer: Normalizer::new(Arc::clone(&catalog))
                .with_raw_text_sample_len(config.raw_text_sample_len),
            catalog,
            config,
            usage_sink: None,
        })
    }

    /// Report one usage event per model call to `sink`
    pub fn with_usage_sink(mut self, sink: Arc<dyn UsageSink>) -> Self {
        self.usage_sink = Some(sink);
        self
    }

    /// Shared catalog (store contexts can be edited at runtime)
    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    /// Active configuration
    pub fn config(&self) -> &ExtractorConfig {
        &self.config
    }

    /// Extract promotions from one page
    ///
    /// Always returns a result; failures are reported through
    /// `success`, `error` and `failure`.
    pub async fn extract_page(
        &self,
        cancel: &CancellationToken,
        store_code: &str,
        page_number: u32,
        image: &PageImage,
    ) -> ExtractionResult {
        let clock = Instant::now();
        let mut result = ExtractionResult::started(page_number);

        info!(
            store = store_code,
            page = page_number,
            image = %image.describe(),
            "Starting page extraction"
        );

        match self
            .run_protocol(cancel, store_code, page_number, image, &mut result)
            .await
        {
            Ok(parsed) => {
                let context = PageContext {
                    store_code,
                    page_number,
                };
                let (meta, promotions) = self.normalizer.normalize_page(parsed, context);
                result.succeed(meta, promotions);
                info!(
                    store = store_code,
                    page = page_number,
                    promotions = result.promotion_count,
                    products = result.product_count,
                    tokens = result.usage.total_tokens,
                    fallback = result.used_fallback,
                    "Page extraction complete"
                );
            }
            Err(e) => {
                warn!(
                    store = store_code,
                    page = page_number,
                    error = %e,
                    "Page extraction failed"
                );
                result.page_meta = PageMeta {
                    store_code: Some(store_code.to_string()),
                    page_number,
                    ..Default::default()
                };
                result.fail(e);
            }
        }

        result.finish(clock.elapsed())
    }

    /// Extract every page of a flyer, strictly one page at a time
    ///
    /// Pages are numbered from 1 in input order. Cancellation stops the
    /// batch; completed pages are returned with the cancellation error and
    /// an interrupted page is left out.
    pub async fn extract_flyer(
        &self,
        cancel: &CancellationToken,
        store_code: &str,
        pages: &[PageImage],
    ) -> FlyerExtraction {
        let mut flyer = FlyerExtraction::default();
        info!(store = store_code, pages = pages.len(), "Starting flyer extraction");

        for (idx, image) in pages.iter().enumerate() {
            if idx > 0 {
                let delay = self.config.page_delay();
                tokio::select! {
                    _ = cancel.cancelled() => {
                        info!(store = store_code, completed = flyer.pages.len(), "Flyer extraction cancelled between pages");
                        flyer.error = Some(ExtractorError::Cancelled);
                        return flyer;
                    }
                    _ = tokio::time::sleep(delay) => {}
                }
            }
            if cancel.is_cancelled() {
                flyer.error = Some(ExtractorError::Cancelled);
                return flyer;
            }

            let page_number = u32::try_from(idx + 1).unwrap_or(u32::MAX);
            let result = self.extract_page(cancel, store_code, page_number, image).await;
            if result.failure.as_ref().is_some_and(ExtractorError::is_cancelled) {
                info!(
                    store = store_code,
                    page = page_number,
                    completed = flyer.pages.len(),
                    "Flyer extraction cancelled mid-page"
                );
                flyer.error = Some(ExtractorError::Cancelled);
                return flyer;
            }
            flyer.pages.push(result);
        }

        info!(
            store = store_code,
            pages = flyer.pages.len(),
            successful = flyer.successful_pages(),
            tokens = flyer.total_tokens().total_tokens,
            "Flyer extraction complete"
        );
        flyer
    }

    async fn run_protocol(
        &self,
        cancel: &CancellationToken,
        store_code: &str,
        page_number: u32,
        image: &PageImage,
        result: &mut ExtractionResult,
    ) -> Result<ParsedPage, ExtractorError> {
        let prompt = self.prompts.detection(store_code, page_number);
        let raw = self
            .call_model(cancel, Stage::Detection, image, &prompt, result)
            .await?;

        match parse_response(&raw) {
            Ok(detected) => {
                result.raw_response = Some(raw);
                debug!(
                    page = page_number,
                    detected = detected.promotions.len(),
                    "Detection pass parsed, filling details"
                );

                let prompt = self
                    .prompts
                    .detail_fill(store_code, page_number, &detected.promotions)?;
                let raw = self
                    .call_model(cancel, Stage::DetailFill, image, &prompt, result)
                    .await?;
                let filled = parse_response(&raw).map_err(|error| ExtractorError::Parse {
                    stage: Stage::DetailFill,
                    error,
                })?;
                result.raw_response = Some(raw);
                Ok(merge_detail_pass(detected, filled))
            }
            Err(detection) => {
                warn!(
                    page = page_number,
                    error = %detection,
                    "Detection response unparseable, falling back to unified prompt"
                );
                result.used_fallback = true;

                let prompt = self.prompts.unified(store_code, page_number);
                let raw = self
                    .call_model(cancel, Stage::Unified, image, &prompt, result)
                    .await
                    .map_err(|e| fallback_failed(e, detection.clone()))?;
                let parsed = parse_response(&raw).map_err(|error| {
                    fallback_failed(
                        ExtractorError::Parse {
                            stage: Stage::Unified,
                            error,
                        },
                        detection.clone(),
                    )
                })?;
                result.raw_response = Some(raw);
                Ok(parsed)
            }
        }
    }

    /// One cancellable, time-limited model call; reports usage either way
    async fn call_model(
        &self,
        cancel: &CancellationToken,
        stage: Stage,
        image: &PageImage,
        prompt: &str,
        result: &mut ExtractionResult,
    ) -> Result<String, ExtractorError> {
        debug!(stage = %stage, prompt_len = prompt.len(), "Calling vision model");
        let clock = Instant::now();

        let call = async {
            match image {
                PageImage::Url(url) => self.client.analyze_image(cancel, url, prompt).await,
                PageImage::Inline { data, mime_type } => {
                    self.client
                        .analyze_image_inline(cancel, data, mime_type, prompt)
                        .await
                }
            }
        };

        let outcome = tokio::select! {
            _ = cancel.cancelled() => Err(ExtractorError::Cancelled),
            response = timeout(self.config.call_timeout(), call) => match response {
                Err(_) => Err(ExtractorError::Timeout(stage)),
                Ok(Err(_)) if cancel.is_cancelled() => Err(ExtractorError::Cancelled),
                Ok(Err(e)) => Err(ExtractorError::Model {
                    stage,
                    message: e.to_string(),
                }),
                Ok(Ok(response)) => Ok(response),
            },
        };

        let duration_ms = clock.elapsed().as_millis() as u64;
        match outcome {
            Ok(response) => {
                result.usage += response.usage;
                self.report_usage(stage, response.usage, true, duration_ms);
                debug!(
                    stage = %stage,
                    tokens = response.usage.total_tokens,
                    response_len = response.content.len(),
                    duration_ms,
                    "Vision model responded"
                );
                Ok(response.content)
            }
            Err(e) => {
                self.report_usage(stage, TokenUsage::default(), false, duration_ms);
                Err(e)
            }
        }
    }

    fn report_usage(&self, stage: Stage, usage: TokenUsage, success: bool, duration_ms: u64) {
        let Some(sink) = &self.usage_sink else {
            return;
        };
        let model = self
            .config
            .model_name
            .clone()
            .unwrap_or_else(|| self.client.model_id().to_string());
        sink.record(UsageEvent {
            model,
            operation: stage.operation().to_string(),
            usage,
            cost: self.config.cost(&usage),
            success,
            duration_ms,
        });
    }
}

fn fallback_failed(fallback: ExtractorError, detection: ParseError) -> ExtractorError {
    if fallback.is_cancelled() {
        return fallback;
    }
    ExtractorError::FallbackFailed {
        fallback: Box::new(fallback),
        detection,
    }
}

/// Combine the detail pass with the detection pass it was built from
///
/// Records pair up by position when both passes return the same count; the
/// detail record wins and gaps are taken from the detected one.
pub(crate) fn merge_detail_pass(detected: ParsedPage, filled: ParsedPage) -> ParsedPage {
    let page_meta = merge_meta(filled.page_meta, detected.page_meta);

    if filled.promotions.is_empty() && !detected.promotions.is_empty() {
        warn!(
            detected = detected.promotions.len(),
            "Detail pass returned no promotions, keeping detection results"
        );
        return ParsedPage {
            page_meta,
            promotions: detected.promotions,
        };
    }

    if filled.promotions.len() != detected.promotions.len() {
        warn!(
            detected = detected.promotions.len(),
            filled = filled.promotions.len(),
            "Detail pass changed the promotion count, using detail results as returned"
        );
        return ParsedPage {
            page_meta,
            promotions: filled.promotions,
        };
    }

    let promotions = filled
        .promotions
        .into_iter()
        .zip(detected.promotions)
        .map(|(filled, detected)| merge_promotion(filled, detected))
        .collect();

    ParsedPage {
        page_meta,
        promotions,
    }
}

fn merge_promotion(mut filled: Promotion, detected: Promotion) -> Promotion {
    filled.name = filled.name.or(detected.name);
    filled.price = filled.price.or(detected.price);
    filled.discount_percent = filled.discount_percent.or(detected.discount_percent);
    filled.bounding_box = filled.bounding_box.or(detected.bounding_box);
    if filled.special_tags.is_empty() {
        filled.special_tags = detected.special_tags;
    }
    filled.loyalty_required |= detected.loyalty_required;
    filled
}

fn merge_meta(filled: PageMeta, detected: PageMeta) -> PageMeta {
    PageMeta {
        store_code: filled.store_code.or(detected.store_code),
        currency: filled.currency.or(detected.currency),
        locale: filled.locale.or(detected.locale),
        valid_from: filled.valid_from.or(detected.valid_from),
        valid_to: filled.valid_to.or(detected.valid_to),
        page_number: if filled.page_number == 0 {
            detected.page_number
        } else {
            filled.page_number
        },
        raw_text_sample: filled.raw_text_sample.or(detected.raw_text_sample),
    }
}
