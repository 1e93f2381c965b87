//! Promotion module
//!
//! A promotion is one rectangular flyer module carrying a price, a percent
//! badge, a bundle marker or a loyalty marker. Text fields hold the flyer's
//! own wording verbatim; the extractor normalizes them after decoding.

use crate::de;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Kind of flyer module
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromotionType {
    /// A single product with its own price
    #[default]
    SingleProduct,
    /// A discount on a whole product category
    Category,
    /// A discount on a brand's product line
    BrandLine,
    /// Household equipment or non-food goods
    Equipment,
    /// Multi-buy offers such as "1+1"
    Bundle,
    /// Offers gated by a loyalty card or app
    Loyalty,
}

impl PromotionType {
    /// All variants, in schema order
    pub const ALL: [PromotionType; 6] = [
        PromotionType::SingleProduct,
        PromotionType::Category,
        PromotionType::BrandLine,
        PromotionType::Equipment,
        PromotionType::Bundle,
        PromotionType::Loyalty,
    ];

    /// Wire name of the variant
    pub fn as_str(&self) -> &'static str {
        match self {
            PromotionType::SingleProduct => "single_product",
            PromotionType::Category => "category",
            PromotionType::BrandLine => "brand_line",
            PromotionType::Equipment => "equipment",
            PromotionType::Bundle => "bundle",
            PromotionType::Loyalty => "loyalty",
        }
    }

    /// Parse a wire name, tolerating case, spaces and dashes
    pub fn parse(s: &str) -> Option<Self> {
        let key = s.trim().to_lowercase().replace([' ', '-'], "_");
        Self::ALL.into_iter().find(|t| t.as_str() == key)
    }
}

/// How the discount is expressed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscountType {
    /// "-25%"
    Percentage,
    /// "-1 €"
    Absolute,
    /// "1+1", "3 for 2"
    Bundle,
    /// Price or discount requires a loyalty card
    Loyalty,
}

impl DiscountType {
    /// All variants, in schema order
    pub const ALL: [DiscountType; 4] = [
        DiscountType::Percentage,
        DiscountType::Absolute,
        DiscountType::Bundle,
        DiscountType::Loyalty,
    ];

    /// Wire name of the variant
    pub fn as_str(&self) -> &'static str {
        match self {
            DiscountType::Percentage => "percentage",
            DiscountType::Absolute => "absolute",
            DiscountType::Bundle => "bundle",
            DiscountType::Loyalty => "loyalty",
        }
    }

    /// Parse a wire name (case-insensitive)
    pub fn parse(s: &str) -> Option<Self> {
        let key = s.trim().to_lowercase();
        Self::ALL.into_iter().find(|t| t.as_str() == key)
    }
}

/// Rectangle in page-relative coordinates (0..1 on both axes)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    /// Left edge
    pub x: f64,
    /// Top edge
    pub y: f64,
    /// Width
    #[serde(alias = "w")]
    pub width: f64,
    /// Height
    #[serde(alias = "h")]
    pub height: f64,
}

impl BoundingBox {
    /// Whether every coordinate lies within the unit square
    pub fn is_normalized(&self) -> bool {
        [self.x, self.y, self.width, self.height]
            .iter()
            .all(|v| v.is_finite() && (0.0..=1.0).contains(v))
    }

    /// Shrink width and height so the box stays inside the page
    pub fn clipped(&self) -> Self {
        Self {
            x: self.x,
            y: self.y,
            width: self.width.min(1.0 - self.x),
            height: self.height.min(1.0 - self.y),
        }
    }
}

/// One detected flyer module
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Promotion {
    /// Module kind
    #[serde(default, deserialize_with = "de::promotion_type")]
    pub promotion_type: PromotionType,

    /// Product or offer name, verbatim; `None` when illegible
    #[serde(default, deserialize_with = "de::opt_string")]
    pub name: Option<String>,

    /// Brand name
    #[serde(default, deserialize_with = "de::opt_string")]
    pub brand: Option<String>,

    /// Category from the fixed vocabulary (or the model's guess)
    #[serde(default, alias = "category", deserialize_with = "de::opt_string")]
    pub category_guess: Option<String>,

    /// Sales unit ("kg", "vnt.")
    #[serde(default, deserialize_with = "de::opt_string")]
    pub unit: Option<String>,

    /// Package size ("500 g")
    #[serde(default, deserialize_with = "de::opt_string")]
    pub unit_size: Option<String>,

    /// Promotional price ("0,99 €")
    #[serde(default, deserialize_with = "de::opt_string")]
    pub price: Option<String>,

    /// Crossed-out regular price
    #[serde(default, deserialize_with = "de::opt_string")]
    pub original_price: Option<String>,

    /// Price per kg / l / unit
    #[serde(default, deserialize_with = "de::opt_string")]
    pub price_per_unit: Option<String>,

    /// Strongest percent badge in the module
    #[serde(
        default,
        rename = "discount_pct",
        alias = "discount_percent",
        deserialize_with = "de::opt_percent"
    )]
    pub discount_percent: Option<u8>,

    /// Discount wording, verbatim
    #[serde(default, deserialize_with = "de::opt_string")]
    pub discount_text: Option<String>,

    /// How the discount is expressed
    #[serde(default, deserialize_with = "de::discount_type")]
    pub discount_type: Option<DiscountType>,

    /// Short labels such as "1+1" or "TIK SU KORTELE"
    #[serde(default, deserialize_with = "de::string_list")]
    pub special_tags: Vec<String>,

    /// A loyalty badge appears anywhere in the module
    #[serde(default, deserialize_with = "de::lenient_bool")]
    pub loyalty_required: bool,

    /// Bundle wording ("Pirk 2, mokėk už 1")
    #[serde(default, deserialize_with = "de::opt_string")]
    pub bundle_details: Option<String>,

    /// Module location on the page
    #[serde(default, deserialize_with = "de::bounding_box")]
    pub bounding_box: Option<BoundingBox>,

    /// Heuristic completeness score, recomputed after normalization
    #[serde(default, deserialize_with = "de::lenient_f64")]
    pub confidence: f64,
}

impl Promotion {
    /// Percent discount strictly between 0 and 100
    pub fn has_percent(&self) -> bool {
        self.discount_percent.is_some_and(|p| p > 0 && p < 100)
    }

    /// Bundle offer, either by type or by a "N+M" tag
    pub fn is_bundle(&self) -> bool {
        self.discount_type == Some(DiscountType::Bundle)
            || self.special_tags.iter().any(|t| t.contains('+'))
    }

    /// Offer gated by a loyalty card
    pub fn is_loyalty(&self) -> bool {
        self.discount_type == Some(DiscountType::Loyalty) || self.loyalty_required
    }
}

/// Per-page context
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PageMeta {
    /// Store code ("MAXIMA")
    #[serde(default, deserialize_with = "de::opt_string")]
    pub store_code: Option<String>,

    /// ISO currency code
    #[serde(default, deserialize_with = "de::opt_string")]
    pub currency: Option<String>,

    /// Locale of the flyer text ("lt-LT")
    #[serde(default, deserialize_with = "de::opt_string")]
    pub locale: Option<String>,

    /// First day of the offer window (YYYY-MM-DD)
    #[serde(default, deserialize_with = "de::opt_string")]
    pub valid_from: Option<String>,

    /// Last day of the offer window (YYYY-MM-DD)
    #[serde(default, deserialize_with = "de::opt_string")]
    pub valid_to: Option<String>,

    /// 1-based page number; 0 when the model omitted it
    #[serde(default, deserialize_with = "de::page_number")]
    pub page_number: u32,

    /// Short sample of the page text, for debugging
    #[serde(default, deserialize_with = "de::opt_string")]
    pub raw_text_sample: Option<String>,
}

impl PageMeta {
    /// Offer window as dates, when both ends parse and are ordered
    pub fn validity_window(&self) -> Option<(NaiveDate, NaiveDate)> {
        let parse = |s: &Option<String>| {
            s.as_deref()
                .and_then(|s| NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").ok())
        };
        let from = parse(&self.valid_from)?;
        let to = parse(&self.valid_to)?;
        (from <= to).then_some((from, to))
    }
}
