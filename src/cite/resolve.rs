//! Citation-label resolution: canonicalize near-miss labels, then map them
//! to source URLs through the scraped-source catalog, the local-asset rules,
//! and a normalized containment fallback.

use std::sync::LazyLock;

use regex::Regex;

/// Scraped government pages the model may cite by display label.
pub const SCRAPED_SOURCES: &[(&str, &str)] = &[
    (
        "Services Australia (Age Pension)",
        "https://www.servicesaustralia.gov.au/age-pension",
    ),
    (
        "ATO (Superannuation \u{2013} Withdrawing and using your super)",
        "https://www.ato.gov.au/individuals-and-families/super-for-individuals-and-families/super/withdrawing-and-using-your-super",
    ),
    (
        "ATO (Tax on super income streams)",
        "https://www.ato.gov.au/tax-rates-and-codes/key-superannuation-rates-and-thresholds/super-income-stream-tax-tables",
    ),
    (
        "MoneySmart (Retirement income sources)",
        "https://moneysmart.gov.au/retirement-income-sources",
    ),
    (
        "MoneySmart (Tax and super)",
        "https://moneysmart.gov.au/how-super-works/tax-and-super",
    ),
];

/// Local data assets mapped to the public page each was taken from.
pub const SOURCE_URLS: &[(&str, &str)] = &[
    (
        "ABS_Retirement_Comparison.xlsx",
        "https://www.abs.gov.au/statistics/labour/employment-and-unemployment/retirement-and-retirement-intentions-australia/latest-release",
    ),
    ("ATO.txt", "https://www.ato.gov.au/"),
    (
        "dss-demographics-2021-sa2-june-2025.csv",
        "https://data.gov.au/data/dataset/dss-payment-demographic-data",
    ),
    (
        "Leaving_The_Workforce.json",
        "https://www.ato.gov.au/individuals-and-families/jobs-and-employment-types/working-as-an-employee/leaving-the-workforce",
    ),
    ("SuperConsumersAustralia.txt", "https://superconsumers.com.au/research/"),
    (
        "Transition_Retirement_Plans.xlsx",
        "https://moneysmart.gov.au/retirement-income-sources",
    ),
];

/// Ordered label-pattern rules for citations naming local assets, optionally
/// qualified by a sheet suffix or a trailing parenthetical.
static LABEL_RULES: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    vec![
        (
            Regex::new(r"(?i)^DSS_Demographics\.csv(?:\s*/\s*.*)?(?:\s*\(.*\))?$").unwrap(),
            "https://data.gov.au/data/dataset/dss-income-support-recipients-monthly-time-series",
        ),
        (
            Regex::new(r"(?i)^ABS_Retirement_Comparison\.xlsx(?:\s*/\s*.+?)?(?:\s*\(.*\))?$")
                .unwrap(),
            "https://www.abs.gov.au/statistics/labour/employment-and-unemployment/retirement-and-retirement-intentions-australia",
        ),
        (
            Regex::new(r"(?i)^Transition_Retirement_Plans\.xlsx(?:\s*/\s*.+?)?(?:\s*\(.*\))?$")
                .unwrap(),
            "https://www.ato.gov.au/api/public/content/0-74828496-dead-4b1a-8503-ffbe95d37398?1755658690387",
        ),
        (
            Regex::new(r"(?i)^(?:guide1|ATO)\.txt(?:\s*/\s*.*)?(?:\s*\(.*\))?$").unwrap(),
            "https://www.ato.gov.au/individuals-and-families/jobs-and-employment-types/working-as-an-employee/leaving-the-workforce",
        ),
        (
            Regex::new(r"(?i)^SuperConsumersAustralia\.txt(?:\s*/\s*.*)?(?:\s*\(.*\))?$").unwrap(),
            "https://superconsumers.com.au/research/superannuation-death-benefit-delays-you-dont-get-paid-faster-if-you-pay-higher-fees/",
        ),
        (
            Regex::new(r"(?i)^Leaving_The_Workforce\.json(?:\s*/\s*.*)?(?:\s*\(.*\))?$").unwrap(),
            "https://www.ato.gov.au/individuals-and-families/jobs-and-employment-types/working-as-an-employee/leaving-the-workforce",
        ),
    ]
});

/// File-name patterns that map loader asset names onto `SOURCE_URLS` keys,
/// tolerant of case and separator drift. Longest pattern match wins.
static CANONICAL_FILE_KEYS: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    vec![
        (Regex::new(r"(?i)\bato\.txt\b").unwrap(), "ATO.txt"),
        (
            Regex::new(r"(?i)\bsuperconsumersaustralia\.txt\b").unwrap(),
            "SuperConsumersAustralia.txt",
        ),
        (
            Regex::new(r"(?i)\bleaving_the_workforce\.json\b").unwrap(),
            "Leaving_The_Workforce.json",
        ),
        (
            Regex::new(r"(?i)\babs_retirement_comparison\.xlsx\b").unwrap(),
            "ABS_Retirement_Comparison.xlsx",
        ),
        (
            Regex::new(r"(?i)\btransition_retirement_plans\.xlsx\b").unwrap(),
            "Transition_Retirement_Plans.xlsx",
        ),
        (
            Regex::new(r"(?i)\bdss\s*demographics\b").unwrap(),
            "dss-demographics-2021-sa2-june-2025.csv",
        ),
        (
            Regex::new(r"(?i)\bdss[-_\s]?demographics[-_\s]?2021[-_\s]?sa2[-_\s]?june[-_\s]?2025\.csv\b")
                .unwrap(),
            "dss-demographics-2021-sa2-june-2025.csv",
        ),
    ]
});

fn normalize(s: &str) -> String {
    s.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Normalize known near-miss phrasings onto the catalog's exact labels.
/// Anything unrecognized passes through trimmed.
pub fn canonicalize_label(raw: &str) -> String {
    let s = raw.trim();
    let lower = s.to_lowercase();
    if lower.contains("moneysmart") && lower.contains("tax") {
        return "MoneySmart (Tax and super)".to_string();
    }
    if lower.contains("moneysmart") && lower.contains("retirement income") {
        return "MoneySmart (Retirement income sources)".to_string();
    }
    if lower.contains("ato") && lower.contains("income stream") {
        return "ATO (Tax on super income streams)".to_string();
    }
    if lower.contains("ato") && lower.contains("withdrawing") {
        return "ATO (Superannuation \u{2013} Withdrawing and using your super)".to_string();
    }
    s.to_string()
}

/// Map a loader asset name onto its `SOURCE_URLS` key. The most specific
/// (longest) pattern match wins; unmatched names fall back to a normalized
/// containment scan over the keys.
pub fn canonical_source_key(name: &str) -> Option<&'static str> {
    let mut best: Option<(&'static str, usize)> = None;
    for (re, key) in CANONICAL_FILE_KEYS.iter() {
        if let Some(m) = re.find(name) {
            let len = m.end() - m.start();
            if best.map_or(true, |(_, best_len)| len > best_len) {
                best = Some((key, len));
            }
        }
    }
    if let Some((key, _)) = best {
        return Some(key);
    }

    let n = normalize(name);
    let mut fallback: Option<(&'static str, usize)> = None;
    for (key, _) in SOURCE_URLS {
        let nk = normalize(key);
        if !nk.is_empty() && n.contains(&nk) {
            if fallback.map_or(true, |(_, best_len)| nk.len() > best_len) {
                fallback = Some((key, nk.len()));
            }
        }
    }
    fallback.map(|(key, _)| key)
}

/// URL a loader asset name resolves to, if any.
pub fn source_url(name: &str) -> Option<&'static str> {
    let key = canonical_source_key(name)?;
    SOURCE_URLS
        .iter()
        .find(|(k, _)| *k == key)
        .map(|(_, url)| *url)
}

/// Resolve one citation label to a URL: canonicalize, then exact catalog
/// match, then the ordered label rules, then normalized containment against
/// every catalog key (longest key wins). `None` means render unlinked.
pub fn resolve_label(raw: &str) -> Option<&'static str> {
    let label = canonicalize_label(raw);

    if let Some((_, url)) = SCRAPED_SOURCES.iter().find(|(l, _)| *l == label) {
        return Some(url);
    }

    for (re, url) in LABEL_RULES.iter() {
        if re.is_match(&label) {
            return Some(url);
        }
    }

    let n = normalize(&label);
    if n.is_empty() {
        return None;
    }
    let mut best: Option<(&'static str, usize)> = None;
    for (key, url) in SCRAPED_SOURCES.iter().chain(SOURCE_URLS.iter()) {
        let nk = normalize(key);
        if !nk.is_empty() && n.contains(&nk) {
            if best.map_or(true, |(_, best_len)| nk.len() > best_len) {
                best = Some((url, nk.len()));
            }
        }
    }
    best.map(|(url, _)| url)
}

/// Resolve a list of raw labels, deduplicating while preserving order:
/// catalog matches first, then rule matches, mirroring citation priority.
pub fn labels_to_urls(labels: &[String]) -> Vec<String> {
    let mut urls: Vec<String> = Vec::new();

    for raw in labels {
        let label = canonicalize_label(raw);
        if let Some((_, url)) = SCRAPED_SOURCES.iter().find(|(l, _)| *l == label) {
            if !urls.iter().any(|u| u == url) {
                urls.push(url.to_string());
            }
        }
    }
    for raw in labels {
        let label = canonicalize_label(raw);
        for (re, url) in LABEL_RULES.iter() {
            if re.is_match(&label) {
                if !urls.iter().any(|u| u == url) {
                    urls.push(url.to_string());
                }
                break;
            }
        }
    }
    urls
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_catalog_label_resolves() {
        assert_eq!(
            resolve_label("Services Australia (Age Pension)"),
            Some("https://www.servicesaustralia.gov.au/age-pension")
        );
    }

    #[test]
    fn test_canonicalize_near_miss_phrasings() {
        assert_eq!(
            canonicalize_label("MoneySmart tax and super page"),
            "MoneySmart (Tax and super)"
        );
        assert_eq!(
            canonicalize_label("ATO tax on super income streams"),
            "ATO (Tax on super income streams)"
        );
        assert_eq!(canonicalize_label("  Something Else "), "Something Else");
    }

    #[test]
    fn test_rule_match_with_sheet_suffix() {
        assert_eq!(
            resolve_label("ABS_Retirement_Comparison.xlsx / Sheet1"),
            Some("https://www.abs.gov.au/statistics/labour/employment-and-unemployment/retirement-and-retirement-intentions-australia")
        );
        assert_eq!(
            resolve_label("DSS_Demographics.csv"),
            Some("https://data.gov.au/data/dataset/dss-income-support-recipients-monthly-time-series")
        );
    }

    #[test]
    fn test_rule_match_tolerates_snippet_suffix() {
        assert!(resolve_label("ATO.txt (snippets 3)").is_some());
        assert!(resolve_label("guide1.txt").is_some());
    }

    #[test]
    fn test_fuzzy_containment_fallback() {
        // No exact label, no rule, but the normalized catalog key is
        // contained in the normalized label.
        assert_eq!(
            resolve_label("the SuperConsumersAustralia txt file"),
            Some("https://superconsumers.com.au/research/")
        );
    }

    #[test]
    fn test_unresolvable_label_is_none() {
        assert_eq!(resolve_label("Totally Unknown Source"), None);
        assert_eq!(resolve_label(""), None);
    }

    #[test]
    fn test_resolution_is_deterministic() {
        let a = resolve_label("ABS_Retirement_Comparison.xlsx / Table 5");
        for _ in 0..3 {
            assert_eq!(resolve_label("ABS_Retirement_Comparison.xlsx / Table 5"), a);
        }
    }

    #[test]
    fn test_labels_to_urls_dedups_and_orders_catalog_first() {
        let labels = vec![
            "ATO.txt".to_string(),
            "Services Australia (Age Pension)".to_string(),
            "Services Australia (Age Pension)".to_string(),
        ];
        let urls = labels_to_urls(&labels);
        assert_eq!(urls.len(), 2);
        assert_eq!(urls[0], "https://www.servicesaustralia.gov.au/age-pension");
        assert!(urls[1].contains("ato.gov.au"));
    }

    #[test]
    fn test_source_url_for_loader_names() {
        assert_eq!(source_url("ATO.txt"), Some("https://www.ato.gov.au/"));
        assert_eq!(
            source_url("ABS_Retirement_Comparison.xlsx / Sheet1"),
            Some("https://www.abs.gov.au/statistics/labour/employment-and-unemployment/retirement-and-retirement-intentions-australia/latest-release")
        );
        assert!(source_url("random.bin").is_none());
    }
}
