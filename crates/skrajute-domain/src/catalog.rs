//! Catalog module
//!
//! Immutable reference data used by prompt construction, normalization and
//! validation: the category vocabulary, unit synonyms, category keywords,
//! the target alphabet's diacritics and per-store prompt context.
//!
//! Store contexts are the only runtime-editable part; they sit behind an
//! `RwLock` so a shared `Arc<Catalog>` can be updated while pipelines run.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::{PoisonError, RwLock};
use thiserror::Error;

/// Errors raised while loading a catalog
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CatalogError {
    /// TOML could not be parsed
    #[error("Failed to parse catalog: {0}")]
    Parse(String),

    /// Catalog data is inconsistent
    #[error("Invalid catalog: {0}")]
    Invalid(String),
}

/// Keywords that point at a category when they appear in a product name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryKeywords {
    /// Canonical category
    pub category: String,
    /// Lowercase name fragments
    pub keywords: Vec<String>,
}

/// Serializable catalog contents
///
/// Missing sections fall back to the built-in Lithuanian retail defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogFile {
    /// Currency symbol appended to prices
    pub currency_symbol: String,
    /// Letters that mark text as written in the target language
    pub diacritics: String,
    /// Category vocabulary, in match priority order
    pub categories: Vec<String>,
    /// Canonical unit → accepted synonyms
    pub units: BTreeMap<String, Vec<String>>,
    /// Alternative category names → canonical category
    pub category_aliases: BTreeMap<String, String>,
    /// Name keywords per category, in match priority order
    pub category_keywords: Vec<CategoryKeywords>,
    /// Store code → prompt context
    pub store_contexts: BTreeMap<String, String>,
}

impl Default for CatalogFile {
    fn default() -> Self {
        let strings = |items: &[&str]| items.iter().map(|s| s.to_string()).collect::<Vec<_>>();

        let units = [
            ("kg", &["kilogramas", "kilogramai", "kilogramų", "kilogram", "kilograms", "kilo"][..]),
            ("g", &["gr", "gramas", "gramai", "gramų", "gram", "grams"][..]),
            ("l", &["ltr", "litras", "litrai", "litrų", "liter", "litre", "litres"][..]),
            ("ml", &["mililitras", "mililitrai", "mililitrų"][..]),
            ("vnt.", &["vnt", "vienetas", "vienetai", "vienetų", "pcs", "pc", "piece", "pieces"][..]),
            ("pak.", &["pak", "pakuotė", "pakuotės", "pakelis", "pack"][..]),
            ("m", &["metras", "metrai", "metrų"][..]),
        ]
        .into_iter()
        .map(|(unit, synonyms)| (unit.to_string(), strings(synonyms)))
        .collect();

        let category_aliases = [
            ("meat", MEAT),
            ("fish", FISH),
            ("seafood", FISH),
            ("dairy", DAIRY),
            ("eggs", DAIRY),
            ("fruits", PRODUCE),
            ("vegetables", PRODUCE),
            ("produce", PRODUCE),
            ("bakery", BAKERY),
            ("bread", BAKERY),
            ("grocery", PANTRY),
            ("pantry", PANTRY),
            ("sweets", SWEETS),
            ("snacks", SWEETS),
            ("drinks", DRINKS),
            ("beverages", DRINKS),
            ("alcohol", ALCOHOL),
            ("frozen", FROZEN),
            ("household", HOUSEHOLD_CHEMICALS),
            ("cleaning", HOUSEHOLD_CHEMICALS),
            ("cosmetics", COSMETICS),
            ("hygiene", COSMETICS),
            ("baby", BABY),
            ("pets", PETS),
            ("home", HOME),
            ("other", OTHER),
        ]
        .into_iter()
        .map(|(alias, category)| (alias.to_string(), category.to_string()))
        .collect();

        let category_keywords = [
            (MEAT, &["mėsa", "kiaul", "jautien", "vištien", "kalakut", "kumpis", "dešr", "faršas", "sprandin", "šonin"][..]),
            (FISH, &["žuv", "lašiš", "silk", "krevet", "menk", "skumbr", "tuneć"][..]),
            (DAIRY, &["pienas", "pieno", "sūris", "sūrio", "jogurt", "varšk", "grietin", "sviest", "kefyr", "kiauš"][..]),
            (PRODUCE, &["obuol", "banan", "pomidor", "agurk", "bulv", "svogūn", "mork", "apelsin", "citrin", "vynuog", "kopūst", "braš"][..]),
            (BAKERY, &["duona", "batonas", "bandel", "pyrag", "kepin", "croissant"][..]),
            (PANTRY, &["miltai", "cukrus", "ryžiai", "makaron", "aliej", "kruop", "druska", "kava", "arbata", "padaž", "konserv"][..]),
            (SWEETS, &["šokolad", "saldain", "sausain", "traškuč", "vafl", "zefyr", "ledinuk"][..]),
            (ALCOHOL, &["alus", "vynas", "degtin", "brend", "viskis", "sidras", "džinas"][..]),
            (DRINKS, &["sultys", "vanduo", "limonad", "gaivus", "cola", "gėrim"][..]),
            (FROZEN, &["ledai", "šaldyt", "koldūn", "virtin"][..]),
            (HOUSEHOLD_CHEMICALS, &["skalbim", "ploviklis", "valiklis", "minkštiklis", "indų"][..]),
            (COSMETICS, &["šampūn", "dantų", "muilas", "dezodorant", "kremas", "dušo"][..]),
            (BABY, &["sauskelnės", "kūdik"][..]),
            (PETS, &["kačių", "šunų", "gyvūn"][..]),
            (HOME, &["puod", "keptuv", "rankšluost", "lemput"][..]),
        ]
        .into_iter()
        .map(|(category, keywords)| CategoryKeywords {
            category: category.to_string(),
            keywords: strings(keywords),
        })
        .collect();

        let store_contexts = [
            ("MAXIMA", "Maxima is the largest grocery chain in Lithuania. Prices marked with the \"AČIŪ\" card icon are available only to loyalty card holders."),
            ("IKI", "IKI is a Lithuanian supermarket chain. Offers marked \"Mano IKI\" require the loyalty card or app."),
            ("RIMI", "Rimi is a Baltic supermarket chain. Offers marked \"Mano RIMI\" require the loyalty card."),
            ("LIDL", "Lidl is a discount chain. Offers marked \"Lidl Plus\" require the Lidl Plus app."),
            ("NORFA", "Norfa is a Lithuanian discount chain without a loyalty card. Multi-buy offers such as \"1+1\" are common."),
        ]
        .into_iter()
        .map(|(code, context)| (code.to_string(), context.to_string()))
        .collect();

        Self {
            currency_symbol: "€".to_string(),
            diacritics: "ąčęėįšųūžĄČĘĖĮŠŲŪŽ".to_string(),
            categories: strings(&DEFAULT_CATEGORIES[..]),
            units,
            category_aliases,
            category_keywords,
            store_contexts,
        }
    }
}

const MEAT: &str = "Mėsa ir mėsos gaminiai";
const FISH: &str = "Žuvis ir jūros gėrybės";
const DAIRY: &str = "Pieno produktai ir kiaušiniai";
const PRODUCE: &str = "Vaisiai ir daržovės";
const BAKERY: &str = "Duona ir kepiniai";
const PANTRY: &str = "Bakalėja";
const SWEETS: &str = "Saldumynai ir užkandžiai";
const DRINKS: &str = "Gėrimai";
const ALCOHOL: &str = "Alkoholiniai gėrimai";
const FROZEN: &str = "Šaldyti produktai";
const HOUSEHOLD_CHEMICALS: &str = "Buitinė chemija";
const COSMETICS: &str = "Kosmetika ir higiena";
const BABY: &str = "Kūdikių prekės";
const PETS: &str = "Gyvūnų prekės";
const HOME: &str = "Namų ir laisvalaikio prekės";
const OTHER: &str = "Kita";

const DEFAULT_CATEGORIES: [&str; 16] = [
    MEAT, FISH, DAIRY, PRODUCE, BAKERY, PANTRY, SWEETS, DRINKS, ALCOHOL, FROZEN,
    HOUSEHOLD_CHEMICALS, COSMETICS, BABY, PETS, HOME, OTHER,
];

/// Reference data shared by the pipeline
#[derive(Debug)]
pub struct Catalog {
    currency_symbol: String,
    diacritics: String,
    categories: Vec<String>,
    canonical_units: Vec<String>,
    unit_synonyms: HashMap<String, String>,
    category_aliases: HashMap<String, String>,
    category_keywords: Vec<CategoryKeywords>,
    store_contexts: RwLock<HashMap<String, String>>,
}

impl Default for Catalog {
    fn default() -> Self {
        Self::build(CatalogFile::default())
    }
}

impl Catalog {
    /// Build a catalog from file contents, checking consistency
    pub fn from_file(file: CatalogFile) -> Result<Self, CatalogError> {
        if file.categories.is_empty() {
            return Err(CatalogError::Invalid("categories must not be empty".to_string()));
        }
        if file.currency_symbol.trim().is_empty() {
            return Err(CatalogError::Invalid("currency_symbol must not be empty".to_string()));
        }
        let known = |category: &str| file.categories.iter().any(|c| c == category);
        for (alias, category) in &file.category_aliases {
            if !known(category) {
                return Err(CatalogError::Invalid(format!(
                    "alias '{}' points at unknown category '{}'",
                    alias, category
                )));
            }
        }
        for entry in &file.category_keywords {
            if !known(&entry.category) {
                return Err(CatalogError::Invalid(format!(
                    "keywords reference unknown category '{}'",
                    entry.category
                )));
            }
        }
        Ok(Self::build(file))
    }

    /// Load a catalog from a TOML string
    pub fn from_toml(toml_str: &str) -> Result<Self, CatalogError> {
        let file: CatalogFile =
            toml::from_str(toml_str).map_err(|e| CatalogError::Parse(e.to_string()))?;
        Self::from_file(file)
    }

    fn build(file: CatalogFile) -> Self {
        let mut unit_synonyms = HashMap::new();
        let mut canonical_units = Vec::new();
        for (unit, synonyms) in file.units {
            unit_synonyms.insert(unit.to_lowercase(), unit.clone());
            for synonym in synonyms {
                unit_synonyms.insert(synonym.trim().to_lowercase(), unit.clone());
            }
            canonical_units.push(unit);
        }

        let category_aliases = file
            .category_aliases
            .into_iter()
            .map(|(alias, category)| (alias.trim().to_lowercase(), category))
            .collect();

        let category_keywords = file
            .category_keywords
            .into_iter()
            .map(|entry| CategoryKeywords {
                category: entry.category,
                keywords: entry.keywords.iter().map(|k| k.to_lowercase()).collect(),
            })
            .collect();

        let store_contexts = file
            .store_contexts
            .into_iter()
            .map(|(code, context)| (store_key(&code), context))
            .collect();

        Self {
            currency_symbol: file.currency_symbol,
            diacritics: file.diacritics,
            categories: file.categories,
            canonical_units,
            unit_synonyms,
            category_aliases,
            category_keywords,
            store_contexts: RwLock::new(store_contexts),
        }
    }

    /// Category vocabulary, in priority order
    pub fn categories(&self) -> &[String] {
        &self.categories
    }

    /// Canonical unit spellings
    pub fn canonical_units(&self) -> &[String] {
        &self.canonical_units
    }

    /// Currency symbol appended to prices
    pub fn currency_symbol(&self) -> &str {
        &self.currency_symbol
    }

    /// Map a unit synonym to its canonical form; unknown units pass through unchanged
    pub fn normalize_unit(&self, raw: &str) -> String {
        self.unit_synonyms
            .get(&raw.trim().to_lowercase())
            .cloned()
            .unwrap_or_else(|| raw.to_string())
    }

    /// Whether `unit` is one of the canonical spellings
    pub fn is_canonical_unit(&self, unit: &str) -> bool {
        self.canonical_units.iter().any(|u| u == unit)
    }

    /// Case-insensitive match against the vocabulary
    ///
    /// An exact match wins; otherwise the first category that contains the
    /// input, or is contained by it, is returned.
    pub fn match_category(&self, raw: &str) -> Option<&str> {
        let needle = raw.trim().to_lowercase();
        if needle.is_empty() {
            return None;
        }
        if let Some(exact) = self.categories.iter().find(|c| c.to_lowercase() == needle) {
            return Some(exact.as_str());
        }
        self.categories
            .iter()
            .find(|c| {
                let candidate = c.to_lowercase();
                candidate.contains(&needle) || needle.contains(&candidate)
            })
            .map(String::as_str)
    }

    /// Direct lookup (vocabulary or alias), then substring matching
    pub fn lookup_category(&self, raw: &str) -> Option<&str> {
        let key = raw.trim().to_lowercase();
        if let Some(exact) = self.categories.iter().find(|c| c.to_lowercase() == key) {
            return Some(exact.as_str());
        }
        if let Some(category) = self.category_aliases.get(&key) {
            return Some(category.as_str());
        }
        self.match_category(raw)
    }

    /// Infer a category from keywords in a product name
    pub fn infer_category(&self, name: &str) -> Option<&str> {
        let haystack = name.to_lowercase();
        self.category_keywords
            .iter()
            .find(|entry| entry.keywords.iter().any(|k| haystack.contains(k.as_str())))
            .map(|entry| entry.category.as_str())
    }

    /// Whether the text contains a letter from the target alphabet's diacritics
    pub fn has_diacritics(&self, text: &str) -> bool {
        text.chars().any(|c| self.diacritics.contains(c))
    }

    /// Prompt context for a store (case-insensitive code)
    pub fn store_context(&self, store_code: &str) -> Option<String> {
        self.store_contexts
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&store_key(store_code))
            .cloned()
    }

    /// Add or replace the prompt context for a store
    pub fn add_store_context(&self, store_code: &str, context: impl Into<String>) {
        self.store_contexts
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(store_key(store_code), context.into());
    }

    /// Known store codes, sorted
    pub fn store_codes(&self) -> Vec<String> {
        let mut codes: Vec<_> = self
            .store_contexts
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        codes.sort();
        codes
    }
}

fn store_key(code: &str) -> String {
    code.trim().to_uppercase()
}
