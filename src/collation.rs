//! Locale-aware name collation
//!
//! Names are compared level by level over their canonical decomposition:
//!
//! 1. primary: base characters, case folded, accents ignored
//! 2. secondary: combining marks attached to each base character
//! 3. tertiary: letter case (lowercase first unless the locale tailors upper first)
//! 4. identical: raw code point order
//!
//! Only identical strings collate equal, so the order is total over names.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Locales whose CLDR tailoring sorts uppercase before lowercase.
const UPPER_FIRST_LOCALES: &[&str] = &["da", "mt"];

const ROOT_LOCALE: &str = "root";

/// Which case variant sorts first at the tertiary level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaseFirst {
    Lower,
    Upper,
}

/// Name collator bound to a locale
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Collator {
    locale: String,
    case_first: CaseFirst,
}

impl Default for Collator {
    fn default() -> Self {
        Collator::new(ROOT_LOCALE)
    }
}

impl Collator {
    /// Create a collator for a locale tag such as `en_US.UTF-8`, `da-DK` or `fr`.
    ///
    /// Only the language subtag is significant. Empty, `C` and `POSIX` map to the root locale.
    pub fn new(locale: &str) -> Self {
        let locale = language_subtag(locale);
        let case_first = if UPPER_FIRST_LOCALES.contains(&locale.as_str()) {
            CaseFirst::Upper
        } else {
            CaseFirst::Lower
        };
        Collator { locale, case_first }
    }

    /// Collator for the process locale (`LC_ALL`, then `LC_COLLATE`, then `LANG`).
    pub fn system() -> Self {
        let tag = ["LC_ALL", "LC_COLLATE", "LANG"]
            .iter()
            .find_map(|var| std::env::var(var).ok().filter(|v| !v.is_empty()))
            .unwrap_or_default();
        Collator::new(&tag)
    }

    /// Override the locale's case ordering.
    pub fn with_case_first(mut self, case_first: CaseFirst) -> Self {
        self.case_first = case_first;
        self
    }

    pub fn locale(&self) -> &str {
        &self.locale
    }

    pub fn case_first(&self) -> CaseFirst {
        self.case_first
    }

    /// Comparator identity, persisted alongside stores that depend on it.
    pub fn name(&self) -> String {
        match self.case_first {
            CaseFirst::Lower => format!("nodedb.name-index.v1({})", self.locale),
            CaseFirst::Upper => format!("nodedb.name-index.v1({};upper-first)", self.locale),
        }
    }

    /// Compare two names under this collation.
    pub fn compare(&self, a: &str, b: &str) -> Ordering {
        if a == b {
            return Ordering::Equal;
        }
        let lhs = collation_elements(a);
        let rhs = collation_elements(b);

        let primary = lhs
            .iter()
            .map(CollationElement::primary)
            .cmp(rhs.iter().map(CollationElement::primary));
        if primary != Ordering::Equal {
            return primary;
        }

        // Equal primary keys imply equal element counts from here on.
        let secondary = lhs
            .iter()
            .map(|e| e.marks.as_slice())
            .cmp(rhs.iter().map(|e| e.marks.as_slice()));
        if secondary != Ordering::Equal {
            return secondary;
        }

        let tertiary = lhs
            .iter()
            .map(|e| e.upper)
            .cmp(rhs.iter().map(|e| e.upper));
        let tertiary = match self.case_first {
            CaseFirst::Lower => tertiary,
            CaseFirst::Upper => tertiary.reverse(),
        };
        if tertiary != Ordering::Equal {
            return tertiary;
        }

        a.cmp(b)
    }
}

fn language_subtag(tag: &str) -> String {
    let language = tag
        .split(|c| c == '_' || c == '-' || c == '.' || c == '@')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    match language.as_str() {
        "" | "c" | "posix" => ROOT_LOCALE.to_string(),
        _ => language,
    }
}

/// One base character with its attached marks
#[derive(Debug)]
struct CollationElement {
    class: CharClass,
    base: char,
    marks: Vec<char>,
    upper: bool,
}

impl CollationElement {
    fn new(base: char, upper: bool) -> Self {
        CollationElement {
            class: CharClass::of(base),
            base,
            marks: Vec::new(),
            upper,
        }
    }

    fn primary(&self) -> (CharClass, char) {
        (self.class, self.base)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum CharClass {
    Whitespace,
    Punctuation,
    Digit,
    Letter,
    Other,
}

impl CharClass {
    fn of(c: char) -> Self {
        if c.is_whitespace() {
            CharClass::Whitespace
        } else if c.is_numeric() {
            CharClass::Digit
        } else if c.is_alphabetic() {
            CharClass::Letter
        } else if c.is_control() {
            CharClass::Other
        } else {
            CharClass::Punctuation
        }
    }
}

fn collation_elements(name: &str) -> Vec<CollationElement> {
    let mut elements: Vec<CollationElement> = Vec::with_capacity(name.len());
    for c in name.nfd() {
        if is_combining_mark(c) {
            if let Some(last) = elements.last_mut() {
                last.marks.push(c);
                continue;
            }
        }
        let upper = c.is_uppercase();
        for folded in c.to_lowercase() {
            match elements.last_mut() {
                Some(last) if is_combining_mark(folded) => last.marks.push(folded),
                _ => elements.push(CollationElement::new(folded, upper)),
            }
        }
    }
    elements
}
