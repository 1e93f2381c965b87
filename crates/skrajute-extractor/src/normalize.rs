//! Promotion normalization, scoring and filtering
//!
//! Runs after every successful parse. Every transformation here is a fixed
//! point on its own output, so normalizing twice changes nothing.

use crate::types::ParsedPage;
use regex::Regex;
use skrajute_domain::{Catalog, PageMeta, Promotion};
use std::sync::{Arc, LazyLock};
use tracing::debug;

static EUR_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\beur\b").expect("valid regex"));

static AMOUNT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{1,3}(?:[ .]\d{3})+|\d{1,7})(?:\s*[.,]\s*|\s+)(\d{1,2})$")
        .expect("valid regex")
});

static WHOLE_AMOUNT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{1,3}(?:[ .]\d{3})+|\d{1,7})$").expect("valid regex")
});

static UNKNOWN_WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bunknown\b").expect("valid regex"));

static CANONICAL_AMOUNT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+,\d+$").expect("valid regex"));

/// Trim and collapse internal whitespace; `None` when nothing is left
pub fn clean_text(raw: &str) -> Option<String> {
    let cleaned = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    (!cleaned.is_empty()).then_some(cleaned)
}

/// Trim tags, drop empty ones, de-duplicate case-insensitively
///
/// The first spelling of each tag wins and order is preserved.
pub fn dedupe_tags(tags: &[String]) -> Vec<String> {
    let mut seen = Vec::new();
    let mut kept = Vec::new();
    for tag in tags {
        let tag = tag.trim();
        if tag.is_empty() {
            continue;
        }
        let key = tag.to_lowercase();
        if !seen.contains(&key) {
            seen.push(key);
            kept.push(tag.to_string());
        }
    }
    kept
}

/// Call context used to backfill page metadata
#[derive(Debug, Clone, Copy)]
pub struct PageContext<'a> {
    /// Store the flyer belongs to
    pub store_code: &'a str,
    /// 1-based page number
    pub page_number: u32,
}

/// Cleans, scores and filters decoded promotions
#[derive(Debug, Clone)]
pub struct Normalizer {
    catalog: Arc<Catalog>,
    raw_text_sample_len: usize,
}

impl Normalizer {
    /// Create a normalizer over a shared catalog
    pub fn new(catalog: Arc<Catalog>) -> Self {
        Self {
            catalog,
            raw_text_sample_len: 200,
        }
    }

    /// Limit the characters kept in `PageMeta::raw_text_sample`
    pub fn with_raw_text_sample_len(mut self, len: usize) -> Self {
        self.raw_text_sample_len = len;
        self
    }

    /// Normalize a decoded page: clean meta, clean and score every promotion,
    /// drop promotions that carry no offer
    pub fn normalize_page(
        &self,
        page: ParsedPage,
        context: PageContext<'_>,
    ) -> (PageMeta, Vec<Promotion>) {
        let meta = self.normalize_meta(page.page_meta, context);
        let total = page.promotions.len();
        let promotions: Vec<Promotion> = page
            .promotions
            .into_iter()
            .map(|p| self.normalize_promotion(p))
            .filter(|p| {
                let keep = self.is_offer(p);
                if !keep {
                    debug!(name = ?p.name, "Dropping promotion without price, percent, bundle or loyalty marker");
                }
                keep
            })
            .collect();

        debug!(
            page = meta.page_number,
            kept = promotions.len(),
            dropped = total - promotions.len(),
            "Normalized page"
        );
        (meta, promotions)
    }

    /// Clean one promotion and recompute its confidence
    pub fn normalize_promotion(&self, mut promotion: Promotion) -> Promotion {
        promotion.name = promotion.name.as_deref().and_then(clean_text);
        promotion.brand = promotion.brand.as_deref().and_then(clean_text);
        promotion.unit_size = promotion.unit_size.as_deref().and_then(clean_text);
        promotion.category_guess = promotion
            .category_guess
            .as_deref()
            .and_then(clean_text)
            .map(|c| match self.catalog.match_category(&c) {
                Some(canonical) => canonical.to_string(),
                None => c,
            });
        promotion.unit = promotion
            .unit
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .map(|u| self.catalog.normalize_unit(u));

        // A per-unit suffix only belongs on price_per_unit
        let (price, price_unit) = promotion
            .price
            .as_deref()
            .and_then(|p| self.split_price(p))
            .map_or((None, None), |(amount, unit)| (Some(amount), unit));
        promotion.price_per_unit = promotion
            .price_per_unit
            .as_deref()
            .and_then(|p| self.normalize_price(p))
            .or_else(|| {
                let amount = price.as_deref()?;
                price_unit.map(|unit| format!("{}/{}", amount, unit))
            });
        promotion.price = price;
        promotion.original_price = promotion
            .original_price
            .as_deref()
            .and_then(|p| self.split_price(p))
            .map(|(amount, _)| amount);

        promotion.discount_text = trimmed(promotion.discount_text);
        promotion.bundle_details = trimmed(promotion.bundle_details);
        promotion.discount_percent = promotion.discount_percent.filter(|p| (1..=99).contains(p));
        promotion.special_tags = dedupe_tags(&promotion.special_tags);
        promotion.bounding_box = promotion
            .bounding_box
            .filter(|b| b.is_normalized())
            .map(|b| b.clipped());

        promotion.confidence = self.score(&promotion);
        promotion
    }

    /// Canonical "D,DD €" form of a price; `None` when unparseable
    ///
    /// Accepts spaced decimals ("0 99"), grouped thousands ("1 299,99"),
    /// either separator, the currency on either side, and keeps a per-unit
    /// suffix ("3,99 €/kg").
    pub fn normalize_price(&self, raw: &str) -> Option<String> {
        let (price, per_unit) = self.split_price(raw)?;
        Some(match per_unit {
            Some(unit) => format!("{}/{}", price, unit),
            None => price,
        })
    }

    /// Canonical amount and the per-unit suffix, if any
    fn split_price(&self, raw: &str) -> Option<(String, Option<String>)> {
        let raw = raw.trim();
        let (amount, per_unit) = match raw.find('/') {
            Some(idx) => (&raw[..idx], clean_text(&raw[idx + 1..])),
            None => (raw, None),
        };

        let symbol = self.catalog.currency_symbol();
        let amount = amount.replace(symbol, " ");
        let amount = EUR_TOKEN.replace_all(&amount, " ");
        let amount = amount.trim();

        let (whole, fraction) = if let Some(caps) = AMOUNT.captures(amount) {
            (ungroup(&caps[1]), format!("{:0<2}", &caps[2]))
        } else if let Some(caps) = WHOLE_AMOUNT.captures(amount) {
            (ungroup(&caps[1]), "00".to_string())
        } else {
            return None;
        };

        Some((
            format!("{},{} {}", whole, fraction, symbol),
            per_unit.map(|unit| unit.replace(' ', "")),
        ))
    }

    /// Strict "digits,digits €" price
    pub fn has_price(&self, promotion: &Promotion) -> bool {
        promotion.price.as_deref().is_some_and(|price| {
            price
                .strip_suffix(self.catalog.currency_symbol())
                .map(str::trim_end)
                .is_some_and(|amount| CANONICAL_AMOUNT.is_match(amount))
        })
    }

    /// Whether the module carries any offer worth keeping
    pub fn is_offer(&self, promotion: &Promotion) -> bool {
        self.has_price(promotion)
            || promotion.has_percent()
            || promotion.is_bundle()
            || promotion.is_loyalty()
    }

    /// Heuristic completeness score in [0, 1]
    pub fn score(&self, promotion: &Promotion) -> f64 {
        let mut score: f64 = 0.5;
        if promotion.name.is_some() {
            score += 0.1;
        }
        if promotion.price.is_some() {
            score += 0.2;
        }
        if promotion.unit.is_some() || promotion.unit_size.is_some() {
            score += 0.05;
        }
        if promotion.brand.is_some() {
            score += 0.05;
        }
        if promotion.category_guess.is_some() {
            score += 0.05;
        }
        if self.has_price(promotion) {
            score += 0.05;
        }
        if promotion
            .name
            .as_deref()
            .is_some_and(|n| UNKNOWN_WORD.is_match(n))
        {
            score -= 0.2;
        }
        score.clamp(0.0, 1.0)
    }

    fn normalize_meta(&self, mut meta: PageMeta, context: PageContext<'_>) -> PageMeta {
        meta.store_code = meta
            .store_code
            .as_deref()
            .and_then(clean_text)
            .or_else(|| clean_text(context.store_code));
        meta.currency = meta.currency.as_deref().and_then(clean_text);
        meta.locale = meta.locale.as_deref().and_then(clean_text);
        meta.valid_from = meta.valid_from.as_deref().and_then(clean_text);
        meta.valid_to = meta.valid_to.as_deref().and_then(clean_text);
        if meta.page_number == 0 {
            meta.page_number = context.page_number;
        }
        meta.raw_text_sample = meta
            .raw_text_sample
            .as_deref()
            .and_then(clean_text)
            .map(|s| truncate_chars(&s, self.raw_text_sample_len));
        meta
    }
}

fn ungroup(whole: &str) -> String {
    whole.chars().filter(char::is_ascii_digit).collect()
}

fn trimmed(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use skrajute_domain::{BoundingBox, DiscountType};

    fn normalizer() -> Normalizer {
        Normalizer::new(Arc::new(Catalog::default()))
    }

    fn context() -> PageContext<'static> {
        PageContext {
            store_code: "MAXIMA",
            page_number: 4,
        }
    }

    #[test]
    fn test_price_round_trips() {
        let n = normalizer();
        assert_eq!(n.normalize_price("0 99 €").as_deref(), Some("0,99 €"));
        assert_eq!(n.normalize_price("2.50").as_deref(), Some("2,50 €"));
        assert_eq!(n.normalize_price("€ 3,10").as_deref(), Some("3,10 €"));
        assert_eq!(n.normalize_price("€3,10").as_deref(), Some("3,10 €"));
        assert_eq!(n.normalize_price("1,99 EUR").as_deref(), Some("1,99 €"));
        assert_eq!(n.normalize_price("2.5").as_deref(), Some("2,50 €"));
        assert_eq!(n.normalize_price("3 €").as_deref(), Some("3,00 €"));
        assert_eq!(n.normalize_price("4,49 € / kg").as_deref(), Some("4,49 €/kg"));
    }

    #[test]
    fn test_grouped_thousands() {
        let n = normalizer();
        assert_eq!(n.normalize_price("1 299,99 €").as_deref(), Some("1299,99 €"));
        assert_eq!(n.normalize_price("1.299,99 €").as_deref(), Some("1299,99 €"));
        assert_eq!(n.normalize_price("1 299 €").as_deref(), Some("1299,00 €"));
        assert_eq!(n.normalize_price("€ 12.345,5").as_deref(), Some("12345,50 €"));
        assert_eq!(n.normalize_price("1299,99 €").as_deref(), Some("1299,99 €"));
        assert_eq!(n.normalize_price("12 99").as_deref(), Some("12,99 €"));
    }

    #[test]
    fn test_per_unit_suffix_moves_off_price() {
        let n = normalizer();
        let promo = n.normalize_promotion(Promotion {
            price: Some("1,19 €/kg".to_string()),
            original_price: Some("1,49 € / kg".to_string()),
            ..Default::default()
        });
        assert_eq!(promo.price.as_deref(), Some("1,19 €"));
        assert_eq!(promo.original_price.as_deref(), Some("1,49 €"));
        assert_eq!(promo.price_per_unit.as_deref(), Some("1,19 €/kg"));
        assert!(n.has_price(&promo));

        let promo = n.normalize_promotion(Promotion {
            price: Some("2,39 €/vnt".to_string()),
            price_per_unit: Some("4.78 EUR/kg".to_string()),
            ..Default::default()
        });
        assert_eq!(promo.price.as_deref(), Some("2,39 €"));
        assert_eq!(promo.price_per_unit.as_deref(), Some("4,78 €/kg"));
    }

    #[test]
    fn test_unparseable_price_becomes_none() {
        let n = normalizer();
        assert_eq!(n.normalize_price(""), None);
        assert_eq!(n.normalize_price("   "), None);
        assert_eq!(n.normalize_price("1+1"), None);
        assert_eq!(n.normalize_price("nemokamai"), None);
        assert_eq!(n.normalize_price("1,999 €"), None);
    }

    #[test]
    fn test_text_fields_cleaned() {
        let promo = normalizer().normalize_promotion(Promotion {
            name: Some("  Pienas \n  DVARO\t2,5 % ".to_string()),
            brand: Some("   ".to_string()),
            unit_size: Some(" 1   l ".to_string()),
            price: Some("0 99 €".to_string()),
            ..Default::default()
        });

        assert_eq!(promo.name.as_deref(), Some("Pienas DVARO 2,5 %"));
        assert_eq!(promo.brand, None);
        assert_eq!(promo.unit_size.as_deref(), Some("1 l"));
        assert_eq!(promo.price.as_deref(), Some("0,99 €"));
    }

    #[test]
    fn test_unit_and_category_vocabulary() {
        let n = normalizer();
        let promo = n.normalize_promotion(Promotion {
            unit: Some("Kilogramas".to_string()),
            category_guess: Some("pieno produktai".to_string()),
            ..Default::default()
        });
        assert_eq!(promo.unit.as_deref(), Some("kg"));
        assert_eq!(promo.category_guess.as_deref(), Some("Pieno produktai ir kiaušiniai"));

        let promo = n.normalize_promotion(Promotion {
            unit: Some("dėžutė".to_string()),
            category_guess: Some("Elektronika".to_string()),
            ..Default::default()
        });
        assert_eq!(promo.unit.as_deref(), Some("dėžutė"));
        assert_eq!(promo.category_guess.as_deref(), Some("Elektronika"));
    }

    #[test]
    fn test_tags_deduplicated() {
        let tags = vec![
            " 1+1 ".to_string(),
            "".to_string(),
            "Tik su kortele".to_string(),
            "TIK SU KORTELE".to_string(),
            "1+1".to_string(),
        ];
        assert_eq!(dedupe_tags(&tags), vec!["1+1", "Tik su kortele"]);
    }

    #[test]
    fn test_discount_and_box_sanitized() {
        let promo = normalizer().normalize_promotion(Promotion {
            discount_percent: Some(100),
            bounding_box: Some(BoundingBox {
                x: 0.8,
                y: 0.5,
                width: 0.4,
                height: 0.2,
            }),
            ..Default::default()
        });
        assert_eq!(promo.discount_percent, None);
        let bbox = promo.bounding_box.unwrap();
        assert!((bbox.width - 0.2).abs() < 1e-9);

        let promo = normalizer().normalize_promotion(Promotion {
            bounding_box: Some(BoundingBox {
                x: 120.0,
                y: 40.0,
                width: 300.0,
                height: 200.0,
            }),
            ..Default::default()
        });
        assert_eq!(promo.bounding_box, None);
    }

    #[test]
    fn test_confidence_scoring() {
        let n = normalizer();
        let full = n.normalize_promotion(Promotion {
            name: Some("Sūris DŽIUGAS".to_string()),
            brand: Some("DŽIUGAS".to_string()),
            category_guess: Some("Pieno produktai ir kiaušiniai".to_string()),
            unit: Some("vnt.".to_string()),
            price: Some("2,99 €".to_string()),
            ..Default::default()
        });
        assert!((full.confidence - 1.0).abs() < 1e-9);

        let percent_only = n.normalize_promotion(Promotion {
            discount_percent: Some(30),
            ..Default::default()
        });
        assert!((percent_only.confidence - 0.5).abs() < 1e-9);

        let unknown = n.normalize_promotion(Promotion {
            name: Some("Unknown product".to_string()),
            ..Default::default()
        });
        assert!((unknown.confidence - 0.4).abs() < 1e-9);

        let unknownish = n.normalize_promotion(Promotion {
            name: Some("Unknownas vynas".to_string()),
            ..Default::default()
        });
        assert!((unknownish.confidence - 0.6).abs() < 1e-9);

        let shouted = n.normalize_promotion(Promotion {
            name: Some("Sultys (UNKNOWN)".to_string()),
            ..Default::default()
        });
        assert!((shouted.confidence - 0.4).abs() < 1e-9);
    }

    #[test]
    fn test_validity_filter() {
        let n = normalizer();
        let page = ParsedPage {
            page_meta: PageMeta::default(),
            promotions: vec![
                Promotion {
                    name: Some("Nothing".to_string()),
                    ..Default::default()
                },
                Promotion {
                    name: Some("Percent".to_string()),
                    discount_percent: Some(25),
                    ..Default::default()
                },
                Promotion {
                    name: Some("Bundle".to_string()),
                    special_tags: vec!["2+1".to_string()],
                    ..Default::default()
                },
                Promotion {
                    name: Some("Loyalty".to_string()),
                    discount_type: Some(DiscountType::Loyalty),
                    ..Default::default()
                },
                Promotion {
                    name: Some("Bad price".to_string()),
                    price: Some("kaina".to_string()),
                    ..Default::default()
                },
            ],
        };

        let (_, kept) = n.normalize_page(page, context());
        let names: Vec<_> = kept.iter().filter_map(|p| p.name.as_deref()).collect();
        assert_eq!(names, vec!["Percent", "Bundle", "Loyalty"]);
    }

    #[test]
    fn test_meta_backfilled_and_truncated() {
        let n = normalizer().with_raw_text_sample_len(5);
        let page = ParsedPage {
            page_meta: PageMeta {
                raw_text_sample: Some("Šviežia žuvis".to_string()),
                ..Default::default()
            },
            promotions: Vec::new(),
        };
        let (meta, _) = n.normalize_page(page, context());
        assert_eq!(meta.page_number, 4);
        assert_eq!(meta.store_code.as_deref(), Some("MAXIMA"));
        assert_eq!(meta.raw_text_sample.as_deref(), Some("Švież"));

        let page = ParsedPage {
            page_meta: PageMeta {
                page_number: 9,
                store_code: Some("IKI".to_string()),
                ..Default::default()
            },
            promotions: Vec::new(),
        };
        let (meta, _) = n.normalize_page(page, context());
        assert_eq!(meta.page_number, 9);
        assert_eq!(meta.store_code.as_deref(), Some("IKI"));
    }

    fn price_text() -> impl Strategy<Value = String> {
        prop_oneof![
            (0u32..1000, 0u32..100).prop_map(|(w, f)| format!("{} {:02} €", w, f)),
            (0u32..1000, 0u32..100).prop_map(|(w, f)| format!("{}.{:02}", w, f)),
            (0u32..1000, 0u32..100).prop_map(|(w, f)| format!("€ {},{:02}", w, f)),
            (0u32..1000, 0u32..10).prop_map(|(w, f)| format!("{},{} EUR/kg", w, f)),
            (1u32..100, 0u32..1000).prop_map(|(t, w)| format!("{}.{:03},99 €", t, w)),
            "[a-z ]{0,8}",
        ]
    }

    prop_compose! {
        fn arb_promotion()(
            name in proptest::option::of("[A-Za-ząčęėįšųūž ]{0,24}"),
            brand in proptest::option::of("[A-Z ]{0,10}"),
            category in proptest::option::of(prop_oneof![
                Just("gėrimai".to_string()),
                Just("Mėsa".to_string()),
                "[a-z ]{0,12}",
            ]),
            unit in proptest::option::of(prop_oneof![
                Just("vienetai".to_string()),
                Just("KG".to_string()),
                "[a-z.]{0,5}",
            ]),
            price in proptest::option::of(price_text()),
            discount in proptest::option::of(0u8..=120),
            tags in proptest::collection::vec("[ A-Z+1-3]{0,6}", 0..4),
            loyalty in any::<bool>(),
        ) -> Promotion {
            Promotion {
                name,
                brand,
                category_guess: category,
                unit,
                price,
                discount_percent: discount,
                special_tags: tags,
                loyalty_required: loyalty,
                ..Default::default()
            }
        }
    }

    proptest! {
        #[test]
        fn prop_normalization_is_idempotent(promotion in arb_promotion()) {
            let n = normalizer();
            let once = n.normalize_promotion(promotion);
            let twice = n.normalize_promotion(once.clone());
            prop_assert_eq!(once, twice);
        }

        #[test]
        fn prop_offerless_promotions_always_dropped(
            name in proptest::option::of("[A-Za-z ]{0,20}"),
            brand in proptest::option::of("[A-Z]{0,8}"),
        ) {
            let n = normalizer();
            let page = ParsedPage {
                page_meta: PageMeta::default(),
                promotions: vec![Promotion { name, brand, ..Default::default() }],
            };
            let (_, kept) = n.normalize_page(page, context());
            prop_assert!(kept.is_empty());
        }

        #[test]
        fn prop_percent_only_promotions_always_kept(
            name in proptest::option::of("[A-Za-z ]{0,20}"),
        ) {
            let n = normalizer();
            let page = ParsedPage {
                page_meta: PageMeta::default(),
                promotions: vec![Promotion { name, discount_percent: Some(25), ..Default::default() }],
            };
            let (_, kept) = n.normalize_page(page, context());
            prop_assert_eq!(kept.len(), 1);
        }
    }
}
