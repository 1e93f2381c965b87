//! Product validation and correction
//!
//! Each product is checked field by field. Validators report issues and
//! apply corrections to a working copy, so accepted products come back
//! cleaned.

use crate::issue::{Correction, Issue, IssueKind, Severity};
use crate::{GatekeeperError, ValidationConfig};
use regex::Regex;
use serde::{Deserialize, Serialize};
use skrajute_domain::{Catalog, ExtractedProduct};
use std::sync::{Arc, LazyLock};
use tracing::{debug, info};

static PRICE_AMOUNT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{1,3}(?:[ .]\d{3})+|\d{1,7})(?:(?:\s*[.,]\s*|\s+)(\d{1,2}))?$")
        .expect("valid regex")
});

static EUR_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\beur\b").expect("valid regex"));

const MAX_NAME_LENGTH: usize = 200;

/// Batch score at or above which the batch counts as valid
pub const VALID_SCORE_THRESHOLD: f64 = 0.70;

/// Aggregate counts for a validated batch
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Statistics {
    /// Products validated
    pub total_products: usize,
    /// Products accepted
    pub valid_products: usize,
    /// Products rejected
    pub invalid_products: usize,
    /// Critical issues found
    pub critical_issues: usize,
    /// Warnings found
    pub warning_issues: usize,
    /// Informational issues found
    pub info_issues: usize,
    /// Corrections applied
    pub corrections_applied: usize,
    /// Accepted share of the batch (0 for an empty batch)
    pub valid_rate: f64,
    /// Mean extraction confidence over the batch (0 for an empty batch)
    pub average_confidence: f64,
}

/// A rejected product and why it was rejected
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvalidProduct {
    /// Position in the validated batch
    pub index: usize,
    /// Product after corrections
    pub product: ExtractedProduct,
    /// Human-readable rejection reasons
    pub reasons: Vec<String>,
}

/// Outcome of validating one product
#[derive(Debug, Clone, PartialEq)]
pub struct ProductReport {
    /// Product after corrections
    pub product: ExtractedProduct,
    /// Everything the validators found
    pub issues: Vec<Issue>,
    /// Everything the validators changed
    pub corrections: Vec<Correction>,
    /// Issues that block acceptance under the current mode
    pub blocking: Vec<Issue>,
}

impl ProductReport {
    /// Whether the product goes to the valid set
    pub fn is_accepted(&self) -> bool {
        self.blocking.is_empty()
    }
}

/// Result of validating a batch of products
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationResult {
    /// Accepted products, corrected, in input order
    pub valid: Vec<ExtractedProduct>,
    /// Rejected products with reasons, in input order
    pub invalid: Vec<InvalidProduct>,
    /// All issues, in input order
    pub issues: Vec<Issue>,
    /// All corrections, in input order
    pub corrections: Vec<Correction>,
    /// Aggregate counts
    pub statistics: Statistics,
    /// Quality score (0.0-1.0)
    pub score: f64,
    /// Whether the batch can be published automatically
    pub is_valid: bool,
}

impl ValidationResult {
    /// Issues of one severity
    pub fn issues_with(&self, severity: Severity) -> impl Iterator<Item = &Issue> {
        self.issues.iter().filter(move |i| i.severity == severity)
    }

    /// One-line report of the batch
    pub fn summary(&self) -> String {
        let s = &self.statistics;
        format!(
            "{} products: {} valid, {} invalid; avg confidence {:.2}; {} critical, {} warnings, {} info; {} corrections; score {:.2} ({})",
            s.total_products,
            s.valid_products,
            s.invalid_products,
            s.average_confidence,
            s.critical_issues,
            s.warning_issues,
            s.info_issues,
            s.corrections_applied,
            self.score,
            if self.is_valid { "valid" } else { "needs review" }
        )
    }
}

struct Findings {
    index: usize,
    issues: Vec<Issue>,
    corrections: Vec<Correction>,
}

impl Findings {
    fn new(index: usize) -> Self {
        Self {
            index,
            issues: Vec::new(),
            corrections: Vec::new(),
        }
    }

    fn issue(
        &mut self,
        kind: IssueKind,
        severity: Severity,
        field: &str,
        value: &str,
        description: String,
        suggestion: Option<String>,
    ) {
        self.issues.push(Issue {
            kind,
            severity,
            field: field.to_string(),
            value: value.to_string(),
            description,
            suggestion,
            product_index: self.index,
        });
    }

    fn correct(&mut self, field: &str, original: &str, corrected: &str, reason: &str) {
        self.corrections.push(Correction {
            product_index: self.index,
            field: field.to_string(),
            original: original.to_string(),
            corrected: corrected.to_string(),
            reason: reason.to_string(),
        });
    }
}

/// The Gatekeeper validates extracted products before publication
#[derive(Debug, Clone)]
pub struct Gatekeeper {
    config: ValidationConfig,
    catalog: Arc<Catalog>,
}

impl Gatekeeper {
    /// Create a new Gatekeeper with the given configuration
    pub fn new(config: ValidationConfig, catalog: Arc<Catalog>) -> Result<Self, GatekeeperError> {
        config.validate()?;
        Ok(Self { config, catalog })
    }

    /// Create a Gatekeeper with default configuration and catalog
    pub fn default_config() -> Self {
        Self {
            config: ValidationConfig::default(),
            catalog: Arc::new(Catalog::default()),
        }
    }

    /// Active configuration
    pub fn config(&self) -> &ValidationConfig {
        &self.config
    }

    /// Validate a batch of products
    pub fn validate(&self, products: &[ExtractedProduct]) -> ValidationResult {
        let mut valid = Vec::new();
        let mut invalid = Vec::new();
        let mut issues = Vec::new();
        let mut corrections = Vec::new();

        for (index, product) in products.iter().enumerate() {
            let report = self.validate_product(index, product);
            if report.is_accepted() {
                valid.push(report.product);
            } else {
                debug!(
                    index,
                    name = %report.product.name,
                    blocking = report.blocking.len(),
                    "Product rejected"
                );
                invalid.push(InvalidProduct {
                    index,
                    product: report.product,
                    reasons: report.blocking.iter().map(Issue::to_string).collect(),
                });
            }
            issues.extend(report.issues);
            corrections.extend(report.corrections);
        }

        let count = |severity: Severity| issues.iter().filter(|i| i.severity == severity).count();
        let total = products.len();
        let (valid_rate, average_confidence) = if total == 0 {
            (0.0, 0.0)
        } else {
            (
                valid.len() as f64 / total as f64,
                products.iter().map(|p| p.confidence).sum::<f64>() / total as f64,
            )
        };
        let statistics = Statistics {
            total_products: total,
            valid_products: valid.len(),
            invalid_products: invalid.len(),
            critical_issues: count(Severity::Critical),
            warning_issues: count(Severity::Warning),
            info_issues: count(Severity::Info),
            corrections_applied: corrections.len(),
            valid_rate,
            average_confidence,
        };

        let penalty: f64 = [Severity::Critical, Severity::Warning, Severity::Info]
            .iter()
            .map(|s| count(*s) as f64 * s.penalty())
            .sum();
        let score = round_score((valid_rate - penalty).clamp(0.0, 1.0));
        let is_valid = score >= VALID_SCORE_THRESHOLD;

        let result = ValidationResult {
            valid,
            invalid,
            issues,
            corrections,
            statistics,
            score,
            is_valid,
        };
        info!(summary = %result.summary(), "Validated product batch");
        result
    }

    /// Validate one product; `index` tags its issues and corrections
    pub fn validate_product(&self, index: usize, product: &ExtractedProduct) -> ProductReport {
        let mut working = product.clone();
        let mut findings = Findings::new(index);

        self.check_name(&mut working, &mut findings);
        if self.config.check_prices {
            self.check_price(&mut working, &mut findings);
        }
        self.check_unit(&mut working, &mut findings);
        if self.config.check_categories {
            self.check_category(&mut working, &mut findings);
        }
        self.check_confidence(&working, &mut findings);
        self.check_required(&working, &mut findings);

        let blocking = findings
            .issues
            .iter()
            .filter(|issue| self.blocks(issue))
            .cloned()
            .collect();

        ProductReport {
            product: working,
            issues: findings.issues,
            corrections: findings.corrections,
            blocking,
        }
    }

    fn blocks(&self, issue: &Issue) -> bool {
        match issue.severity {
            Severity::Critical => true,
            Severity::Warning => self.config.strict_mode && issue.kind != IssueKind::LowConfidence,
            Severity::Info => false,
        }
    }

    fn check_required(&self, product: &ExtractedProduct, findings: &mut Findings) {
        for field in &self.config.required_fields {
            let missing = product
                .field(field)
                .map_or(true, |value| value.trim().is_empty());
            if missing {
                findings.issue(
                    IssueKind::MissingField,
                    Severity::Critical,
                    field,
                    "",
                    format!("required field '{}' is empty", field),
                    None,
                );
            }
        }
    }

    fn check_name(&self, product: &mut ExtractedProduct, findings: &mut Findings) {
        let original = product.name.clone();
        let trimmed = original.trim();
        if trimmed != original {
            findings.correct("name", &original, trimmed, "trimmed surrounding whitespace");
        }
        let collapsed = trimmed.split_whitespace().collect::<Vec<_>>().join(" ");
        if collapsed != trimmed {
            findings.correct("name", trimmed, &collapsed, "collapsed repeated whitespace");
        }
        product.name = collapsed;

        let length = product.name.chars().count();
        if length == 0 && self.config.requires("name") {
            return;
        }
        if length < 2 {
            findings.issue(
                IssueKind::NameTooShort,
                Severity::Critical,
                "name",
                &product.name,
                format!("name is too short ({} characters)", length),
                None,
            );
        } else if length > MAX_NAME_LENGTH {
            findings.issue(
                IssueKind::NameTooLong,
                Severity::Warning,
                "name",
                &product.name,
                format!("name is too long ({} characters, max {})", length, MAX_NAME_LENGTH),
                Some("shorten the name to the product title".to_string()),
            );
        }
        if length > 0 && !self.catalog.has_diacritics(&product.name) {
            findings.issue(
                IssueKind::NoDiacritics,
                Severity::Info,
                "name",
                &product.name,
                "name has no Lithuanian letters".to_string(),
                Some("check that diacritics were read correctly".to_string()),
            );
        }
    }

    fn check_price(&self, product: &mut ExtractedProduct, findings: &mut Findings) {
        let original = product.price.clone();
        if original.trim().is_empty() {
            if !self.config.requires("price") {
                findings.issue(
                    IssueKind::MissingPrice,
                    Severity::Critical,
                    "price",
                    &original,
                    "price is empty".to_string(),
                    None,
                );
            }
            return;
        }

        let symbol = self.catalog.currency_symbol();
        let Some((value, canonical)) = parse_price(&original, symbol) else {
            findings.issue(
                IssueKind::InvalidPrice,
                Severity::Critical,
                "price",
                &original,
                format!("price '{}' is not a positive amount", original),
                Some(format!("expected a price such as 1.99 {}", symbol)),
            );
            return;
        };

        if value > self.config.max_price {
            findings.issue(
                IssueKind::PriceTooHigh,
                Severity::Warning,
                "price",
                &original,
                format!("price {:.2} exceeds the maximum of {:.2}", value, self.config.max_price),
                None,
            );
        }
        if canonical != original {
            findings.correct("price", &original, &canonical, "canonical price format");
            product.price = canonical;
        }
    }

    fn check_unit(&self, product: &mut ExtractedProduct, findings: &mut Findings) {
        let accepted = format!("use one of: {}", self.catalog.canonical_units().join(", "));
        let Some(original) = product.unit.clone().filter(|u| !u.trim().is_empty()) else {
            findings.issue(
                IssueKind::MissingUnit,
                Severity::Warning,
                "unit",
                "",
                "unit is empty".to_string(),
                Some(accepted),
            );
            return;
        };

        let normalized = self.catalog.normalize_unit(&original);
        if normalized != original {
            findings.correct("unit", &original, &normalized, "unit synonym");
        }
        if !self.catalog.is_canonical_unit(&normalized) {
            findings.issue(
                IssueKind::InvalidUnit,
                Severity::Warning,
                "unit",
                &normalized,
                format!("unit '{}' is not recognized", normalized),
                Some(accepted),
            );
        }
        product.unit = Some(normalized);
    }

    fn check_category(&self, product: &mut ExtractedProduct, findings: &mut Findings) {
        let original = product.category.clone().unwrap_or_default();
        if original.trim().is_empty() {
            match self.catalog.infer_category(&product.name) {
                Some(inferred) => {
                    findings.correct("category", &original, inferred, "inferred from name");
                    product.category = Some(inferred.to_string());
                }
                None if self.config.requires("category") => {}
                None => findings.issue(
                    IssueKind::MissingCategory,
                    Severity::Warning,
                    "category",
                    "",
                    "category is empty and could not be inferred from the name".to_string(),
                    None,
                ),
            }
            return;
        }

        if let Some(canonical) = self.catalog.lookup_category(&original) {
            if canonical != original {
                findings.correct("category", &original, canonical, "canonical category");
                product.category = Some(canonical.to_string());
            }
        }
    }

    fn check_confidence(&self, product: &ExtractedProduct, findings: &mut Findings) {
        if product.confidence < self.config.min_confidence {
            findings.issue(
                IssueKind::LowConfidence,
                Severity::Warning,
                "confidence",
                &format!("{:.2}", product.confidence),
                format!(
                    "confidence {:.2} is below the minimum of {:.2}",
                    product.confidence, self.config.min_confidence
                ),
                None,
            );
        }
    }
}

/// Parse a price into its value and canonical "D.DD €" form
fn parse_price(raw: &str, symbol: &str) -> Option<(f64, String)> {
    let amount = raw.replace(symbol, " ");
    let amount = EUR_TOKEN.replace_all(&amount, " ");
    let caps = PRICE_AMOUNT.captures(amount.trim())?;

    let digits: String = caps[1].chars().filter(char::is_ascii_digit).collect();
    let whole = digits.trim_start_matches('0');
    let whole = if whole.is_empty() { "0" } else { whole };
    let fraction = caps
        .get(2)
        .map_or_else(|| "00".to_string(), |m| format!("{:0<2}", m.as_str()));

    let value: f64 = format!("{}.{}", whole, fraction).parse().ok()?;
    (value > 0.0).then(|| (value, format!("{}.{} {}", whole, fraction, symbol)))
}

fn round_score(score: f64) -> f64 {
    (score * 1e6).round() / 1e6
}
