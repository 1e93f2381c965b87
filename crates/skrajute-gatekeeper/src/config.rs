//! Gatekeeper configuration

use crate::GatekeeperError;
use serde::{Deserialize, Serialize};
use skrajute_domain::ExtractedProduct;

/// Configuration for validation rules
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// Confidence below this raises a warning
    pub min_confidence: f64,

    /// Prices above this raise a warning
    pub max_price: f64,

    /// Fields that must be non-empty
    pub required_fields: Vec<String>,

    /// Enable price parsing and range checks
    pub check_prices: bool,

    /// Enable category inference and normalization
    pub check_categories: bool,

    /// Reject products with warnings as well as critical issues
    pub strict_mode: bool,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            min_confidence: 0.5,
            max_price: 1000.0,
            required_fields: vec!["name".to_string(), "price".to_string()],
            check_prices: true,
            check_categories: true,
            strict_mode: false,
        }
    }
}

impl ValidationConfig {
    /// Create a permissive configuration (only a name is required)
    pub fn permissive() -> Self {
        Self {
            min_confidence: 0.0,
            max_price: 10_000.0,
            required_fields: vec!["name".to_string()],
            check_prices: true,
            check_categories: false,
            strict_mode: false,
        }
    }

    /// Create a strict configuration (warnings reject products)
    pub fn strict() -> Self {
        Self {
            min_confidence: 0.7,
            max_price: 500.0,
            required_fields: vec![
                "name".to_string(),
                "price".to_string(),
                "category".to_string(),
            ],
            check_prices: true,
            check_categories: true,
            strict_mode: true,
        }
    }

    /// Whether `field` must be non-empty
    pub fn requires(&self, field: &str) -> bool {
        self.required_fields.iter().any(|f| f == field)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), GatekeeperError> {
        if !(0.0..=1.0).contains(&self.min_confidence) {
            return Err(GatekeeperError::Config(
                "min_confidence must be between 0.0 and 1.0".to_string(),
            ));
        }
        if !self.max_price.is_finite() || self.max_price <= 0.0 {
            return Err(GatekeeperError::Config(
                "max_price must be a positive number".to_string(),
            ));
        }
        if let Some(unknown) = self
            .required_fields
            .iter()
            .find(|f| !ExtractedProduct::FIELDS.contains(&f.as_str()))
        {
            return Err(GatekeeperError::UnknownField(unknown.clone()));
        }
        Ok(())
    }

    /// Load configuration from TOML string
    pub fn from_toml(toml_str: &str) -> Result<Self, GatekeeperError> {
        let config: Self = toml::from_str(toml_str)
            .map_err(|e| GatekeeperError::Config(format!("Failed to parse TOML: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize configuration to TOML string
    pub fn to_toml(&self) -> Result<String, GatekeeperError> {
        toml::to_string_pretty(self)
            .map_err(|e| GatekeeperError::Config(format!("Failed to serialize to TOML: {}", e)))
    }
}
