//! Legacy product view
//!
//! Older consumers read a flat product record instead of a promotion. Only
//! priced promotions project into this view.

use crate::promotion::Promotion;
use serde::{Deserialize, Serialize};

/// Flattened, price-only projection of a [`Promotion`]
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ExtractedProduct {
    /// Product name (empty when the flyer text was illegible)
    pub name: String,
    /// Brand name
    pub brand: Option<String>,
    /// Category
    pub category: Option<String>,
    /// Promotional price
    pub price: String,
    /// Regular price
    pub original_price: Option<String>,
    /// Sales unit
    pub unit: Option<String>,
    /// Human-readable discount ("-25%")
    pub discount: Option<String>,
    /// Discount kind as its wire name
    pub discount_type: Option<String>,
    /// Special tags joined with ", "
    pub special_discount: Option<String>,
    /// Extraction confidence
    pub confidence: f64,
}

impl ExtractedProduct {
    /// Field names accepted by [`ExtractedProduct::field`]
    pub const FIELDS: [&'static str; 10] = [
        "name",
        "brand",
        "category",
        "price",
        "original_price",
        "unit",
        "discount",
        "discount_type",
        "special_discount",
        "confidence",
    ];

    /// Project a promotion; `None` when it carries no price
    pub fn from_promotion(promotion: &Promotion) -> Option<Self> {
        let price = promotion
            .price
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())?;

        let discount = promotion
            .discount_text
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .or_else(|| promotion.discount_percent.map(|p| format!("-{}%", p)));

        let special_discount = if promotion.special_tags.is_empty() {
            None
        } else {
            Some(promotion.special_tags.join(", "))
        };

        Some(Self {
            name: promotion.name.clone().unwrap_or_default(),
            brand: promotion.brand.clone(),
            category: promotion.category_guess.clone(),
            price: price.to_string(),
            original_price: promotion.original_price.clone(),
            unit: promotion.unit.clone(),
            discount,
            discount_type: promotion.discount_type.map(|t| t.as_str().to_string()),
            special_discount,
            confidence: promotion.confidence,
        })
    }

    /// Project a list of promotions, keeping relative order
    pub fn from_promotions(promotions: &[Promotion]) -> Vec<Self> {
        promotions.iter().filter_map(Self::from_promotion).collect()
    }

    /// Textual value of a field by name; `None` for absent or unknown fields
    pub fn field(&self, name: &str) -> Option<String> {
        match name {
            "name" => Some(self.name.clone()),
            "brand" => self.brand.clone(),
            "category" => self.category.clone(),
            "price" => Some(self.price.clone()),
            "original_price" => self.original_price.clone(),
            "unit" => self.unit.clone(),
            "discount" => self.discount.clone(),
            "discount_type" => self.discount_type.clone(),
            "special_discount" => self.special_discount.clone(),
            "confidence" => Some(self.confidence.to_string()),
            _ => None,
        }
    }
}
