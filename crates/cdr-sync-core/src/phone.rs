//! Phone-number normalization.
//!
//! CRM records store phone numbers in whatever shape a person typed them:
//! with or without the leading trunk zero, with or without the country
//! calling code. [`normalize`] canonicalizes a raw string into E.164 under a
//! default-country assumption (Turkey), and [`NormalizedPhone::lookup_variants`]
//! produces the historical formats a CRM search should try.
//!
//! Normalization never fails loudly: an input that cannot be made into a
//! valid number yields `None`.

use phonenumber::country;
use phonenumber::Mode;

/// The numbering context assumed for numbers without a country code.
#[derive(Debug, Clone)]
pub struct DefaultCountry {
    pub id: country::Id,
    /// Calling code without `+`, e.g. `"90"`.
    pub calling_code: &'static str,
    /// Length of the national significant number.
    pub national_len: usize,
}

/// Turkey: `+90`, ten-digit national numbers, trunk prefix `0`.
pub const TURKEY: DefaultCountry = DefaultCountry {
    id: country::Id::TR,
    calling_code: "90",
    national_len: 10,
};

/// A phone number in canonical E.164 form.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NormalizedPhone {
    e164: String,
    country_code: String,
}

impl NormalizedPhone {
    /// The canonical form, e.g. `+905321234567`.
    pub fn as_str(&self) -> &str {
        &self.e164
    }

    pub fn into_string(self) -> String {
        self.e164
    }

    /// Calling code without `+`, e.g. `"90"`.
    pub fn country_code(&self) -> &str {
        &self.country_code
    }

    /// The national significant number, e.g. `5321234567`.
    pub fn national(&self) -> &str {
        &self.e164[1 + self.country_code.len()..]
    }

    /// Textual forms to try, in preference order, when searching a CRM
    /// that stores numbers inconsistently:
    ///
    /// `+905321234567`, `905321234567`, `5321234567`, `05321234567`.
    pub fn lookup_variants(&self) -> Vec<String> {
        let mut variants = vec![
            self.e164.clone(),
            self.e164.trim_start_matches('+').to_string(),
            self.national().to_string(),
            format!("0{}", self.national()),
        ];
        let mut seen = std::collections::HashSet::new();
        variants.retain(|v| !v.is_empty() && seen.insert(v.clone()));
        variants
    }
}

impl std::fmt::Display for NormalizedPhone {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.e164)
    }
}

/// Normalize `raw` under the Turkish default-country assumption.
pub fn normalize(raw: &str) -> Option<NormalizedPhone> {
    normalize_with(raw, &TURKEY)
}

/// Normalize `raw`, assuming `default` when no country code is present.
///
/// Order of attempts:
/// 1. `+`-prefixed input parsed as an international number;
/// 2. trunk-zero national form (`0` + national number);
/// 3. bare calling-code form (`90` + national number);
/// 4. as-is, zero-stripped, code-stripped, and `+`code-stripped, each parsed
///    in the default country's context.
///
/// The first candidate the numbering plan reports as valid wins.
pub fn normalize_with(raw: &str, default: &DefaultCountry) -> Option<NormalizedPhone> {
    let cleaned = clean(raw);
    if cleaned.is_empty() {
        tracing::warn!(raw, "no valid phone format found");
        return None;
    }

    let plus_code = format!("+{}", default.calling_code);
    let mut attempts: Vec<(Option<country::Id>, String)> = Vec::new();

    if cleaned.starts_with('+') {
        attempts.push((None, cleaned.clone()));
    }
    if let Some(rest) = cleaned.strip_prefix('0') {
        if cleaned.len() == default.national_len + 1 {
            attempts.push((None, format!("{}{}", plus_code, rest)));
        }
    }
    if cleaned.starts_with(default.calling_code)
        && cleaned.len() == default.calling_code.len() + default.national_len
    {
        attempts.push((None, format!("+{}", cleaned)));
    }

    let variants = [
        cleaned.clone(),
        cleaned.strip_prefix('0').unwrap_or(&cleaned).to_string(),
        cleaned
            .strip_prefix(default.calling_code)
            .unwrap_or(&cleaned)
            .to_string(),
        cleaned.strip_prefix(&plus_code).unwrap_or(&cleaned).to_string(),
    ];
    attempts.extend(variants.into_iter().map(|v| (Some(default.id.clone()), v)));

    let found = attempts
        .iter()
        .find_map(|(country, candidate)| parse_valid(country.clone(), candidate));

    if found.is_none() {
        tracing::warn!(raw, "no valid phone format found");
    }
    found
}

/// Whether `raw` can be normalized at all.
pub fn is_valid(raw: &str) -> bool {
    normalize(raw).is_some()
}

/// Human-readable international form, e.g. `+90 532 123 45 67`.
///
/// Falls back to `raw` unchanged when the number cannot be normalized.
pub fn to_display_form(raw: &str) -> String {
    normalize(raw)
        .and_then(|n| phonenumber::parse(None, n.as_str()).ok())
        .map(|p| p.format().mode(Mode::International).to_string())
        .unwrap_or_else(|| raw.to_string())
}

fn clean(raw: &str) -> String {
    let stripped: String = raw
        .chars()
        .filter(|c| !c.is_whitespace() && !matches!(c, '(' | ')' | '-'))
        .collect();
    match urlencoding::decode(&stripped) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => stripped,
    }
}

fn parse_valid(country: Option<country::Id>, candidate: &str) -> Option<NormalizedPhone> {
    // Vanity letters are not dialable in call records.
    if candidate.is_empty() || candidate.chars().any(|c| c.is_alphabetic()) {
        return None;
    }
    let parsed = phonenumber::parse(country, candidate).ok()?;
    if !phonenumber::is_valid(&parsed) {
        return None;
    }
    Some(NormalizedPhone {
        e164: parsed.format().mode(Mode::E164).to_string(),
        country_code: parsed.code().value().to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn turkish_mobile_forms_agree() {
        for raw in [
            "05382752273",
            "5382752273",
            "905382752273",
            "+905382752273",
            "0538 275 22 73",
            "(0538) 275-22-73",
            "%2B905382752273",
        ] {
            let n = normalize(raw).unwrap_or_else(|| panic!("{} should normalize", raw));
            assert_eq!(n.as_str(), "+905382752273", "input {}", raw);
        }
    }

    #[test]
    fn garbage_is_none() {
        assert_eq!(normalize("not-a-number"), None);
        assert_eq!(normalize(""), None);
        assert_eq!(normalize("   "), None);
        assert_eq!(normalize("1002"), None);
        assert!(!is_valid("12"));
    }

    #[test]
    fn foreign_numbers_keep_their_country() {
        let n = normalize("+1 650-253-0000").unwrap();
        assert_eq!(n.as_str(), "+16502530000");
        assert_eq!(n.country_code(), "1");
        assert_eq!(n.national(), "6502530000");
    }

    #[test]
    fn lookup_variants_in_order() {
        let n = normalize("05321234567").unwrap();
        assert_eq!(
            n.lookup_variants(),
            vec![
                "+905321234567".to_string(),
                "905321234567".to_string(),
                "5321234567".to_string(),
                "05321234567".to_string(),
            ]
        );
    }

    #[test]
    fn display_form_falls_back_to_raw() {
        assert_eq!(to_display_form("garbage"), "garbage");
        let shown = to_display_form("05382752273");
        assert!(shown.starts_with("+90 "), "got {}", shown);
        assert_eq!(shown.replace(' ', ""), "+905382752273");
    }

    #[test]
    fn normalization_is_deterministic() {
        assert_eq!(normalize("05382752273"), normalize("05382752273"));
    }
}
