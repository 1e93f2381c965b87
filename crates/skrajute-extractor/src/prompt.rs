//! Vision-model prompt construction
//!
//! Every page prompt embeds the same output schema so the parser can map
//! detection, detail-fill and unified responses the same way.

use crate::error::ExtractorError;
use serde::Serialize;
use skrajute_domain::{
    BoundingBox, Catalog, DiscountType, ExtractedProduct, Promotion, PromotionType,
};
use std::sync::Arc;

/// Builds prompts for the vision model
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    catalog: Arc<Catalog>,
}

/// Coarse detection record echoed back to the model in the detail pass
#[derive(Serialize)]
struct DetectedBox<'a> {
    index: usize,
    promotion_type: &'static str,
    name: Option<&'a str>,
    discount_pct: Option<u8>,
    price: Option<&'a str>,
    special_tags: &'a [String],
    loyalty_required: bool,
    bounding_box: Option<&'a BoundingBox>,
}

impl PromptBuilder {
    /// Create a prompt builder over a shared catalog
    pub fn new(catalog: Arc<Catalog>) -> Self {
        Self { catalog }
    }

    /// First pass: enumerate every promotional module with coarse fields
    pub fn detection(&self, store_code: &str, page_number: u32) -> String {
        let mut prompt = String::new();
        prompt.push_str(DETECTION_INSTRUCTIONS);
        prompt.push_str("\n\n");
        prompt.push_str(&self.page_context(store_code, page_number));
        prompt.push_str(DETECTION_RULES);
        prompt.push_str("\n\n");
        prompt.push_str(&self.schema());
        prompt.push_str(OUTPUT_FORMAT_REMINDER);
        prompt
    }

    /// Second pass: read the details inside each detected box
    pub fn detail_fill(
        &self,
        store_code: &str,
        page_number: u32,
        detected: &[Promotion],
    ) -> Result<String, ExtractorError> {
        let boxes: Vec<DetectedBox<'_>> = detected
            .iter()
            .enumerate()
            .map(|(index, p)| DetectedBox {
                index,
                promotion_type: p.promotion_type.as_str(),
                name: p.name.as_deref(),
                discount_pct: p.discount_percent,
                price: p.price.as_deref(),
                special_tags: &p.special_tags,
                loyalty_required: p.loyalty_required,
                bounding_box: p.bounding_box.as_ref(),
            })
            .collect();

        let mut prompt = String::new();
        prompt.push_str(DETAIL_INSTRUCTIONS);
        prompt.push_str("\n\n");
        prompt.push_str(&self.page_context(store_code, page_number));
        prompt.push_str(&format!(
            "Detected modules ({} in total):\n{}\n\n",
            boxes.len(),
            serde_json::to_string_pretty(&boxes)?
        ));
        prompt.push_str(&DETAIL_RULES.replace("{count}", &boxes.len().to_string()));
        prompt.push_str("\n\n");
        prompt.push_str(&self.schema());
        prompt.push_str(OUTPUT_FORMAT_REMINDER);
        Ok(prompt)
    }

    /// Single-pass fallback covering detection and details at once
    pub fn unified(&self, store_code: &str, page_number: u32) -> String {
        let mut prompt = String::new();
        prompt.push_str(UNIFIED_INSTRUCTIONS);
        prompt.push_str("\n\n");
        prompt.push_str(&self.page_context(store_code, page_number));
        prompt.push_str(DETECTION_RULES);
        prompt.push_str("\n- Fill every field you can read inside each module; never invent values that are not printed.\n\n");
        prompt.push_str(&self.schema());
        prompt.push_str(OUTPUT_FORMAT_REMINDER);
        prompt
    }

    /// Transcribe all visible page text
    pub fn text_extraction(&self) -> String {
        format!(
            "{}\n\nReturn the text only, grouped by flyer module, one module per paragraph. \
             Keep prices exactly as printed (for example \"0,99 {}\").",
            TEXT_INSTRUCTIONS,
            self.catalog.currency_symbol()
        )
    }

    /// Pick a category for a product name
    pub fn classification(&self, product_name: &str) -> String {
        format!(
            "Classify this grocery product into exactly one category.\n\n\
             Product: {}\n\n\
             Categories:\n{}\n\n\
             Answer with the category name only, spelled exactly as listed. \
             Use \"{}\" when none fits.",
            product_name,
            bullet_list(self.catalog.categories()),
            self.catalog
                .categories()
                .last()
                .map(String::as_str)
                .unwrap_or_default()
        )
    }

    /// Sanity-check prices of extracted products
    pub fn price_analysis(&self, products: &[ExtractedProduct]) -> Result<String, ExtractorError> {
        Ok(format!(
            "Review the prices of these products extracted from a grocery flyer.\n\n\
             Products:\n{}\n\n\
             For each product check that the promotional price is lower than the original price, \
             that the discount matches the two prices, and that the amount is plausible for the unit. \
             Prices use a decimal comma and the \"{}\" symbol.\n\n\
             Return a JSON array with one object per product in input order: \
             {{\"index\": number, \"plausible\": boolean, \"problem\": string or null}}.\n\
             Return ONLY valid JSON.",
            serde_json::to_string_pretty(products)?,
            self.catalog.currency_symbol()
        ))
    }

    /// Review extracted products for reading errors
    pub fn quality_check(&self, products: &[ExtractedProduct]) -> Result<String, ExtractorError> {
        Ok(format!(
            "Compare these extracted products with the flyer page image.\n\n\
             Products:\n{}\n\n\
             Flag names with broken Lithuanian letters, prices that do not match the image, \
             wrong units and categories outside this list:\n{}\n\n\
             Return a JSON array with one object per product in input order: \
             {{\"index\": number, \"ok\": boolean, \"issues\": [string], \"corrected\": object or null}}.\n\
             Return ONLY valid JSON.",
            serde_json::to_string_pretty(products)?,
            bullet_list(self.catalog.categories())
        ))
    }

    fn page_context(&self, store_code: &str, page_number: u32) -> String {
        let mut context = format!("Store: {}\nPage: {}\n", store_code, page_number);
        if let Some(store) = self.catalog.store_context(store_code) {
            context.push_str(&format!("Store notes: {}\n", store));
        }
        context.push('\n');
        context
    }

    fn schema(&self) -> String {
        let promotion_types: Vec<&str> = PromotionType::ALL.iter().map(|t| t.as_str()).collect();
        let discount_types: Vec<&str> = DiscountType::ALL.iter().map(|t| t.as_str()).collect();
        let symbol = self.catalog.currency_symbol();

        format!(
            r#"Output schema:
{{
  "page_meta": {{
    "store_code": string or null,
    "currency": string or null (ISO code, e.g. "EUR"),
    "locale": string or null (e.g. "lt-LT"),
    "valid_from": string or null (YYYY-MM-DD),
    "valid_to": string or null (YYYY-MM-DD),
    "page_number": integer,
    "raw_text_sample": string or null (first words of the page)
  }},
  "promotions": [
    {{
      "promotion_type": one of {promotion_types:?},
      "name": string or null,
      "brand": string or null,
      "category_guess": string or null (one of the categories below),
      "unit": string or null (one of {units:?}),
      "unit_size": string or null (e.g. "500 g"),
      "price": string or null (e.g. "0,99 {symbol}"),
      "original_price": string or null,
      "price_per_unit": string or null (e.g. "4,98 {symbol}/kg"),
      "discount_pct": integer 1-99 or null,
      "discount_text": string or null (verbatim badge text),
      "discount_type": one of {discount_types:?} or null,
      "special_tags": [string],
      "loyalty_required": boolean,
      "bundle_details": string or null,
      "bounding_box": {{"x": 0-1, "y": 0-1, "width": 0-1, "height": 0-1}} or null,
      "confidence": number 0-1
    }}
  ]
}}

Null semantics: use null for any value that is not printed in the module. Use [] for no tags.
Bounding boxes are fractions of the page width and height, measured from the top-left corner.

Categories:
{categories}

"#,
            promotion_types = promotion_types,
            discount_types = discount_types,
            units = self.catalog.canonical_units(),
            symbol = symbol,
            categories = bullet_list(self.catalog.categories()),
        )
    }
}

fn bullet_list(items: &[String]) -> String {
    items
        .iter()
        .map(|item| format!("- {}", item))
        .collect::<Vec<_>>()
        .join("\n")
}

const DETECTION_INSTRUCTIONS: &str = "You are reading one page of a Lithuanian grocery store flyer.
Find every rectangular promotional module on the page: any module that shows a price, a percent badge, a bundle marker (such as \"1+1\" or \"3 už 2\") or a loyalty marker.";

const DETECTION_RULES: &str = "Rules:
- Report every module, in reading order (top to bottom, left to right).
- For each module fill only: promotion_type, name, discount_pct, price, special_tags, loyalty_required, bounding_box, confidence. Leave the other fields null.
- Modules with a percent badge but no price are valid promotions. Do not discard them.
- When several discount badges appear in one module, the strongest (numerically highest) discount wins. Never average them.
- A loyalty badge anywhere in the module sets loyalty_required to true.
- Preserve Lithuanian letters (ą, č, ę, ė, į, š, ų, ū, ž) exactly as printed.";

const DETAIL_INSTRUCTIONS: &str = "You are reading one page of a Lithuanian grocery store flyer.
The modules below were already located on this page. Read the details of each one.";

const DETAIL_RULES: &str = "Rules:
- Read only inside each given rectangle. Ignore text outside it.
- Fill brand, unit, unit_size, price, original_price, price_per_unit, discount_text, discount_type, category_guess, special_tags and bundle_details.
- Return exactly {count} promotions, in the same order as the input modules. Do not merge, split, add or drop modules.
- Never invent values that are not visible. Use null instead.
- Keep the strongest discount when a module has several badges, and keep loyalty_required true when a loyalty badge is present.
- Preserve Lithuanian letters (ą, č, ę, ė, į, š, ų, ū, ž) exactly as printed.";

const UNIFIED_INSTRUCTIONS: &str = "You are reading one page of a Lithuanian grocery store flyer.
Extract every promotional module on the page with all of its details in a single pass: any module that shows a price, a percent badge, a bundle marker (such as \"1+1\" or \"3 už 2\") or a loyalty marker.";

const TEXT_INSTRUCTIONS: &str = "Transcribe all readable text on this grocery flyer page.
Preserve Lithuanian letters (ą, č, ę, ė, į, š, ų, ū, ž) exactly as printed.";

const OUTPUT_FORMAT_REMINDER: &str =
    "Remember: Return ONLY valid JSON matching the schema, no markdown code blocks, no explanations.";
