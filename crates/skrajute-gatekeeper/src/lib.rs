//! Skrajute Gatekeeper
//!
//! Validates extracted products before publication.
//!
//! The Gatekeeper provides:
//! - Required-field, name, price, unit, category and confidence checks
//! - Corrections applied to a working copy (trimmed names, canonical prices,
//!   units and categories)
//! - Severity-weighted batch scoring
//! - Lenient and strict acceptance modes
//!
//! # Examples
//!
//! ```
//! use skrajute_domain::ExtractedProduct;
//! use skrajute_gatekeeper::Gatekeeper;
//!
//! let product = ExtractedProduct {
//!     name: "Sūris  DŽIUGAS".to_string(),
//!     price: "2,49 €".to_string(),
//!     unit: Some("vnt".to_string()),
//!     category: Some("dairy".to_string()),
//!     confidence: 0.9,
//!     ..Default::default()
//! };
//!
//! let result = Gatekeeper::default_config().validate(&[product]);
//! assert!(result.is_valid);
//! assert_eq!(result.valid[0].price, "2.49 €");
//! assert_eq!(result.valid[0].unit.as_deref(), Some("vnt."));
//! ```

#![warn(missing_docs)]

mod config;
mod error;
mod issue;
mod validator;

pub use config::ValidationConfig;
pub use error::GatekeeperError;
pub use issue::{Correction, Issue, IssueKind, Severity};
pub use validator::{
    Gatekeeper, InvalidProduct, ProductReport, Statistics, ValidationResult,
    VALID_SCORE_THRESHOLD,
};
