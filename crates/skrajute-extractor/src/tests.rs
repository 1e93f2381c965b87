//! Integration tests for the Extractor

#[cfg(test)]
mod tests {
    use crate::{Extractor, ExtractorConfig, ExtractorError, ParseError, Stage};
    use skrajute_domain::{Catalog, PageImage, TokenUsage, UsageEvent, UsageSink};
    use skrajute_gatekeeper::{Gatekeeper, Severity, ValidationConfig};
    use skrajute_llm::{LlmError, MockVisionClient};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    const DETECTION: &str = r#"{
        "page_meta": {"store_code": "MAXIMA", "page_number": 0},
        "promotions": [
            {"promotion_type": "single_product", "name": "Pienas DVARO", "price": "0 99 €",
             "bounding_box": {"x": 0.05, "y": 0.1, "width": 0.4, "height": 0.3}},
            {"promotion_type": "category", "name": "Visa kava", "discount_pct": 50,
             "special_tags": ["AČIŪ"], "loyalty_required": true}
        ]
    }"#;

    const DETAILS: &str = r#"```json
    {
        "page_meta": {"valid_from": "2026-10-12", "valid_to": "2026-10-18"},
        "promotions": [
            {"promotion_type": "single_product", "name": "Pienas  DVARO 2,5 %", "brand": "DVARO",
             "unit": "vienetai", "unit_size": "1 l", "price": "0,99 €", "original_price": "1.29",
             "category_guess": "pieno produktai", "discount_type": "percentage", "discount_pct": 23},
            {"promotion_type": "category", "name": "Visa kava", "category_guess": "Bakalėja",
             "discount_type": "loyalty"}
        ]
    }
    ```"#;

    const FALLBACK: &str = r#"{
        "page_meta": {"store_code": "IKI"},
        "promotions": [
            {"name": "Obuoliai JONAGOLD", "price": "1,29 €", "unit": "kg"},
            {"name": "Visi sūriai", "discount_pct": 25}
        ]
    }"#;

    #[derive(Default)]
    struct RecordingSink {
        events: Mutex<Vec<UsageEvent>>,
    }

    impl UsageSink for RecordingSink {
        fn record(&self, event: UsageEvent) {
            self.events.lock().unwrap().push(event);
        }
    }

    fn fast_config() -> ExtractorConfig {
        ExtractorConfig {
            page_delay_ms: 0,
            ..Default::default()
        }
    }

    fn extractor(client: MockVisionClient) -> Extractor<MockVisionClient> {
        Extractor::new(client, Arc::new(Catalog::default()), fast_config()).unwrap()
    }

    fn page(n: u32) -> PageImage {
        PageImage::url(format!("https://cdn.example/maxima/{}.jpg", n))
    }

    #[tokio::test]
    async fn test_two_pass_extraction() {
        let client = MockVisionClient::default();
        client.push_response_with_usage(DETECTION, TokenUsage::new(1000, 200));
        client.push_response_with_usage(DETAILS, TokenUsage::new(1500, 400));
        let extractor = extractor(client.clone());

        let cancel = CancellationToken::new();
        let result = extractor.extract_page(&cancel, "MAXIMA", 2, &page(2)).await;

        assert!(result.success, "{:?}", result.error);
        assert!(!result.used_fallback);
        assert_eq!(client.call_count(), 2);
        assert_eq!(result.promotion_count, 2);
        assert_eq!(result.product_count, 1);
        assert_eq!(result.usage.total_tokens, 3100);

        let milk = &result.promotions[0];
        assert_eq!(milk.name.as_deref(), Some("Pienas DVARO 2,5 %"));
        assert_eq!(milk.unit.as_deref(), Some("vnt."));
        assert_eq!(milk.original_price.as_deref(), Some("1,29 €"));
        assert_eq!(milk.category_guess.as_deref(), Some("Pieno produktai ir kiaušiniai"));
        assert!(milk.bounding_box.is_some());

        let coffee = &result.promotions[1];
        assert_eq!(coffee.discount_percent, Some(50));
        assert!(coffee.loyalty_required);
        assert_eq!(coffee.special_tags, vec!["AČIŪ"]);

        assert_eq!(result.page_meta.page_number, 2);
        assert_eq!(result.page_meta.store_code.as_deref(), Some("MAXIMA"));
        assert!(result.page_meta.validity_window().is_some());
        assert!(result.raw_response.unwrap().contains("vienetai"));
    }

    #[tokio::test]
    async fn test_detail_prompt_carries_detected_boxes() {
        let client = MockVisionClient::default();
        client.push_response(DETECTION);
        client.push_response(DETAILS);
        let extractor = extractor(client.clone());

        let cancel = CancellationToken::new();
        extractor.extract_page(&cancel, "MAXIMA", 1, &page(1)).await;

        let calls = client.calls();
        assert!(calls[0].prompt.contains("strongest (numerically highest) discount wins"));
        assert!(calls[1].prompt.contains("Detected modules (2 in total)"));
        assert!(calls[1].prompt.contains("Visa kava"));
        assert_eq!(calls[0].image, calls[1].image);
    }

    #[tokio::test]
    async fn test_fallback_after_unparseable_detection() {
        let client = MockVisionClient::default();
        client.push_response("I could not find any structured data on this page.");
        client.push_response(FALLBACK);
        let extractor = extractor(client.clone());

        let cancel = CancellationToken::new();
        let result = extractor.extract_page(&cancel, "IKI", 1, &page(1)).await;

        assert!(result.success, "{:?}", result.error);
        assert!(result.used_fallback);
        assert_eq!(client.call_count(), 2);
        assert_eq!(result.products.len(), 1);
        assert_eq!(result.promotions.len(), 2);
        assert!(client.calls()[1].prompt.contains("single pass"));
        assert_eq!(result.page_meta.page_number, 1);
    }

    #[tokio::test]
    async fn test_fallback_failure_keeps_both_causes() {
        let client = MockVisionClient::default();
        client.push_response("no json here");
        client.push_error(LlmError::Communication("connection reset".to_string()));
        let extractor = extractor(client.clone());

        let cancel = CancellationToken::new();
        let result = extractor.extract_page(&cancel, "IKI", 4, &page(4)).await;

        assert!(!result.success);
        assert_eq!(result.page_number, 4);
        match result.failure {
            Some(ExtractorError::FallbackFailed { fallback, detection }) => {
                assert_eq!(detection, ParseError::NoJsonObject);
                assert!(matches!(
                    *fallback,
                    ExtractorError::Model { stage: Stage::Unified, .. }
                ));
            }
            other => panic!("unexpected failure: {:?}", other),
        }
        let error = result.error.unwrap();
        assert!(error.contains("connection reset"));
        assert!(error.contains("no JSON object"));
    }

    #[tokio::test]
    async fn test_fallback_parse_failure() {
        let client = MockVisionClient::new("still not json");
        let extractor = extractor(client.clone());

        let cancel = CancellationToken::new();
        let result = extractor.extract_page(&cancel, "IKI", 1, &page(1)).await;

        assert!(!result.success);
        assert_eq!(client.call_count(), 2);
        assert!(matches!(
            result.failure,
            Some(ExtractorError::FallbackFailed { .. })
        ));
    }

    #[tokio::test]
    async fn test_detection_model_error_is_terminal() {
        let client = MockVisionClient::default();
        client.push_error(LlmError::RateLimitExceeded);
        let extractor = extractor(client.clone());

        let cancel = CancellationToken::new();
        let result = extractor.extract_page(&cancel, "RIMI", 1, &page(1)).await;

        assert!(!result.success);
        assert_eq!(client.call_count(), 1);
        assert!(!result.used_fallback);
        assert!(matches!(
            result.failure,
            Some(ExtractorError::Model { stage: Stage::Detection, .. })
        ));
        assert_eq!(result.page_meta.store_code.as_deref(), Some("RIMI"));
    }

    #[tokio::test]
    async fn test_detail_parse_failure_is_terminal() {
        let client = MockVisionClient::default();
        client.push_response(DETECTION);
        client.push_response("Sorry, I cannot help with that.");
        let extractor = extractor(client.clone());

        let cancel = CancellationToken::new();
        let result = extractor.extract_page(&cancel, "MAXIMA", 1, &page(1)).await;

        assert!(!result.success);
        assert_eq!(client.call_count(), 2);
        assert!(matches!(
            result.failure,
            Some(ExtractorError::Parse { stage: Stage::DetailFill, .. })
        ));
        assert!(result.promotions.is_empty());
    }

    #[tokio::test]
    async fn test_inline_image_shares_protocol() {
        let client = MockVisionClient::default();
        client.push_response("garbage");
        client.push_response(FALLBACK);
        let extractor = extractor(client.clone());

        let cancel = CancellationToken::new();
        let image = PageImage::inline("QUJDRA==", "image/png");
        let result = extractor.extract_page(&cancel, "IKI", 1, &image).await;

        assert!(result.success);
        assert!(result.used_fallback);
        assert!(client.calls()[0].image.starts_with("data:image/png;base64,"));
    }

    #[tokio::test]
    async fn test_usage_events_per_call() {
        let client = MockVisionClient::default().with_model("gpt-4o");
        client.push_response_with_usage("not json", TokenUsage::new(2000, 0));
        client.push_response_with_usage(FALLBACK, TokenUsage::new(2000, 1000));
        let sink = Arc::new(RecordingSink::default());
        let config = ExtractorConfig {
            prompt_cost_per_1k: 0.001,
            completion_cost_per_1k: 0.002,
            ..fast_config()
        };
        let extractor = Extractor::new(client, Arc::new(Catalog::default()), config)
            .unwrap()
            .with_usage_sink(sink.clone());

        let cancel = CancellationToken::new();
        extractor.extract_page(&cancel, "IKI", 1, &page(1)).await;

        let events = sink.events.lock().unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].operation, "flyer_detection");
        assert_eq!(events[1].operation, "flyer_unified");
        assert_eq!(events[1].model, "gpt-4o");
        assert!(events.iter().all(|e| e.success));
        assert!((events[0].cost - 0.002).abs() < 1e-12);
        assert!((events[1].cost - 0.004).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_failed_call_reports_usage_event() {
        let client = MockVisionClient::default();
        client.push_error(LlmError::ModelNotAvailable("gpt-x".to_string()));
        let sink = Arc::new(RecordingSink::default());
        let config = ExtractorConfig {
            model_name: Some("vision-prod".to_string()),
            ..fast_config()
        };
        let extractor = Extractor::new(client, Arc::new(Catalog::default()), config)
            .unwrap()
            .with_usage_sink(sink.clone());

        let cancel = CancellationToken::new();
        extractor.extract_page(&cancel, "IKI", 1, &page(1)).await;

        let events = sink.events.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert!(!events[0].success);
        assert_eq!(events[0].model, "vision-prod");
        assert_eq!(events[0].usage, TokenUsage::default());
    }

    #[tokio::test]
    async fn test_call_timeout() {
        let client = MockVisionClient::default().with_latency(Duration::from_secs(30));
        let config = ExtractorConfig {
            call_timeout_secs: 1,
            ..fast_config()
        };
        let extractor = Extractor::new(client, Arc::new(Catalog::default()), config).unwrap();

        let cancel = CancellationToken::new();
        let result = extractor.extract_page(&cancel, "IKI", 1, &page(1)).await;

        assert!(!result.success);
        assert_eq!(
            result.failure,
            Some(ExtractorError::Timeout(Stage::Detection))
        );
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = ExtractorConfig {
            call_timeout_secs: 0,
            ..fast_config()
        };
        let result = Extractor::new(
            MockVisionClient::default(),
            Arc::new(Catalog::default()),
            config,
        );
        assert!(matches!(result, Err(ExtractorError::Config(_))));

        let config = ExtractorConfig::from_toml("call_timeout_secs = 0").unwrap();
        let result = Extractor::new(
            MockVisionClient::default(),
            Arc::new(Catalog::default()),
            config,
        );
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_per_unit_price_passes_validation() {
        let client = MockVisionClient::new(
            r#"{"promotions": [
                {"name": "Bananai", "price": "1,19 €/kg", "unit": "kg", "discount_pct": 20},
                {"name": "Dviratis KROSS", "promotion_type": "equipment", "price": "1 299,99 €"}
            ]}"#,
        );
        let extractor = extractor(client);

        let cancel = CancellationToken::new();
        let result = extractor.extract_page(&cancel, "IKI", 1, &page(1)).await;

        assert!(result.success, "{:?}", result.error);
        let bananas = &result.promotions[0];
        assert_eq!(bananas.price.as_deref(), Some("1,19 €"));
        assert_eq!(bananas.price_per_unit.as_deref(), Some("1,19 €/kg"));
        let prices: Vec<_> = result.products.iter().map(|p| p.price.as_str()).collect();
        assert_eq!(prices, vec!["1,19 €", "1299,99 €"]);

        let gatekeeper = Gatekeeper::new(
            ValidationConfig::permissive(),
            Arc::clone(extractor.catalog()),
        )
        .unwrap();
        let report = gatekeeper.validate(&result.products);

        assert!(report.invalid.is_empty(), "{:?}", report.invalid);
        assert_eq!(report.issues_with(Severity::Critical).count(), 0);
        assert_eq!(report.valid[0].price, "1.19 €");
        assert_eq!(report.valid[1].price, "1299.99 €");
    }

    #[tokio::test]
    async fn test_legacy_products_are_priced_subset_in_order() {
        let client = MockVisionClient::new(
            r#"{"promotions": [
                {"name": "A", "price": "1,00 €"},
                {"name": "B", "discount_pct": 10},
                {"name": "C", "price": "2.00"},
                {"name": "D", "special_tags": ["1+1"]},
                {"name": "E", "price": "3 €"}
            ]}"#,
        );
        let extractor = extractor(client);

        let cancel = CancellationToken::new();
        let result = extractor.extract_page(&cancel, "NORFA", 1, &page(1)).await;

        let names: Vec<_> = result.products.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["A", "C", "E"]);
        assert_eq!(result.promotion_count, 5);
        assert_eq!(result.products[1].price, "2,00 €");
    }

    #[tokio::test]
    async fn test_flyer_pages_sequential_and_failures_kept() {
        let client = MockVisionClient::new(FALLBACK);
        client.push_response(FALLBACK);
        client.push_response(FALLBACK);
        client.push_error(LlmError::Communication("timeout".to_string()));
        let extractor = extractor(client.clone());

        let cancel = CancellationToken::new();
        let pages = vec![page(1), page(2), page(3)];
        let flyer = extractor.extract_flyer(&cancel, "IKI", &pages).await;

        assert!(flyer.is_complete());
        assert_eq!(flyer.pages.len(), 3);
        assert_eq!(flyer.successful_pages(), 2);
        let numbers: Vec<_> = flyer.pages.iter().map(|p| p.page_number).collect();
        assert_eq!(numbers, vec![1, 2, 3]);
        assert!(!flyer.pages[1].success);
        assert_eq!(flyer.all_products().len(), 2);

        let images: Vec<_> = client.calls().into_iter().map(|c| c.image).collect();
        assert!(images[0].ends_with("/1.jpg"));
        assert!(images.last().unwrap().ends_with("/3.jpg"));
    }

    #[tokio::test]
    async fn test_flyer_cancelled_during_delay() {
        let client = MockVisionClient::new(FALLBACK);
        let config = ExtractorConfig {
            page_delay_ms: 30_000,
            ..Default::default()
        };
        let extractor = Extractor::new(client.clone(), Arc::new(Catalog::default()), config).unwrap();

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let pages = vec![page(1), page(2), page(3)];
        let flyer = extractor.extract_flyer(&cancel, "IKI", &pages).await;

        assert_eq!(flyer.pages.len(), 1);
        assert!(flyer.pages[0].success);
        assert_eq!(flyer.error, Some(ExtractorError::Cancelled));
        assert_eq!(client.call_count(), 2);
    }

    #[tokio::test]
    async fn test_flyer_cancelled_mid_page_omits_page() {
        let client = MockVisionClient::new(FALLBACK).with_latency(Duration::from_secs(30));
        let extractor = extractor(client);

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let flyer = extractor.extract_flyer(&cancel, "IKI", &[page(1), page(2)]).await;

        assert!(flyer.pages.is_empty());
        assert_eq!(flyer.error, Some(ExtractorError::Cancelled));
    }

    #[tokio::test]
    async fn test_store_context_edit_reaches_prompts() {
        let client = MockVisionClient::default();
        let extractor = extractor(client.clone());
        extractor
            .catalog()
            .add_store_context("aibe", "Aibė shops print prices in red boxes.");

        let cancel = CancellationToken::new();
        extractor.extract_page(&cancel, "AIBE", 1, &page(1)).await;

        assert!(client.calls()[0].prompt.contains("red boxes"));
    }
}
