//! Location extraction from dispatch messages.
//!
//! A dispatch message mixes incident terminology, street grammar, unit codes
//! and map references in one uppercase line. Extraction runs a fixed,
//! ordered list of structural patterns from most to least specific and
//! returns the first candidate that survives the reject filter. The order
//! is a behavioral contract: reordering changes the output on ambiguous
//! input.

use std::sync::OnceLock;

use regex::Regex;

/// Incident terminology that must never be mistaken for a place name.
/// Matching is prefix-anchored and case-sensitive.
const REJECT_KEYWORDS: &[&str] = &[
    "FIRE",
    "GRASS",
    "HOUSE",
    "BATTERY",
    "STRUCTURE",
    "VEHICLE",
    "UNDEFINED",
    "SPREADING",
    "INCIDENT",
    "STRIKE",
    "TEAM",
    "CODE",
    "TANKER",
    "REQUIRED",
    "ASSEMBLE",
    "ALERT",
    "NOW",
    "EXTINGUISHED",
    "ISSUING",
    "SMOKE",
    "COLUMN",
    "ALARM",
    "OPERATING",
    "LEAKING",
    "DOWN",
    "POWERLINES",
    "SPREAD",
    "BUSH",
    "SCRUB",
];

/// Street-type suffixes recognized by the address patterns.
const STREET_TYPES: &str = "RD|ROAD|ST|STREET|AV|AVE|AVENUE|CT|COURT|CR|CRES|CRESCENT|DR|DRIVE|\
                            GR|GROVE|HWY|HIGHWAY|LN|LANE|PL|PLACE|TCE|TERRACE|TRK|TRACK|CL|CLOSE|\
                            PDE|PARADE|WAY";

/// Dispatch-area unit codes like `BACC1` or `FMEL301`.
const REGION_CODE: &str = r"\b[A-Z]{3,5}\d{1,3}\b";

/// Melway-style grid references (`M 337 J9`) or a bracketed 6-digit map ref.
const GRID_REF: &str = r"\bM ?\d{1,3} ?[A-Z]\d{1,2}\b|\(\d{6}\)";

/// Which structural pattern a rule implements, in evaluation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RuleKind {
    /// "ASSEMBLE AT <desc> STATION|SHOWGROUNDS|RESERVE ... <suburb> /"
    AssemblyPoint,
    /// "<number> <street with type suffix> <suburb> /"
    NumberedStreet,
    /// "CNR <road1>/<road2> <suburb> <region or grid>"
    Corner,
    /// "<road> RD <suburb>" before a slash, region code or grid ref
    BareRoad,
    /// "AT <description> <number> <street> <suburb>"
    AtAddress,
    /// Uppercase run immediately before a region code or grid ref
    BeforeRegion,
    /// Uppercase run immediately before a bare slash
    BeforeSlash,
}

struct Rule {
    kind: RuleKind,
    regex: Regex,
}

fn rules() -> &'static [Rule] {
    static RULES: OnceLock<Vec<Rule>> = OnceLock::new();
    RULES.get_or_init(|| {
        let boundary = format!("(?:/|{REGION_CODE}|{GRID_REF})");
        let specs = [
            (
                RuleKind::AssemblyPoint,
                r"ASSEMBLE AT [A-Z0-9 ]+? (?:FIRE STATION|STATION|SHOWGROUNDS|RESERVE) ([A-Z][A-Z ]*?) ?/"
                    .to_string(),
            ),
            (
                RuleKind::NumberedStreet,
                format!(r"\b\d+[A-Z]? ([A-Z][A-Z ]*? (?:{STREET_TYPES})) ([A-Z][A-Z ]*?) ?/"),
            ),
            (
                RuleKind::Corner,
                format!(
                    r"\bCNR ([A-Z][A-Z ]*?)/([A-Z][A-Z ]*? (?:{STREET_TYPES})) ([A-Z][A-Z ]*?) ?(?:{REGION_CODE}|{GRID_REF})"
                ),
            ),
            (
                RuleKind::BareRoad,
                format!(r"\b([A-Z][A-Z ]*?) RD ([A-Z][A-Z ]*?) ?{boundary}"),
            ),
            (
                RuleKind::AtAddress,
                format!(
                    r"\bAT [A-Z][A-Z0-9 ]*? (\d+[A-Z]? [A-Z][A-Z ]*? (?:{STREET_TYPES})) ([A-Z][A-Z ]*?) ?{boundary}"
                ),
            ),
            (
                RuleKind::BeforeRegion,
                format!(r"([A-Z][A-Z0-9 ]{{2,28}}[A-Z]) (?:{REGION_CODE}|{GRID_REF})"),
            ),
            (
                RuleKind::BeforeSlash,
                r"([A-Z][A-Z0-9 ]{2,28}[A-Z0-9]) ?/".to_string(),
            ),
        ];

        specs
            .into_iter()
            .map(|(kind, pattern)| Rule {
                kind,
                regex: Regex::new(&pattern).expect("location pattern"),
            })
            .collect()
    })
}

fn remnant_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s[A-Z]\d*$").expect("remnant regex"))
}

/// Extract a best-guess location from a normalized dispatch message.
///
/// Pure function of its input: the same message always yields the same
/// result. Returns `None` when no pattern produces an acceptable candidate;
/// callers treat that as a normal outcome, not a failure.
pub fn extract(message: &str) -> Option<String> {
    for rule in rules() {
        if let Some(location) = apply(rule, message) {
            return Some(location);
        }
    }
    None
}

fn apply(rule: &Rule, message: &str) -> Option<String> {
    let caps = rule.regex.captures(message)?;
    match rule.kind {
        RuleKind::AssemblyPoint => {
            let mut suburb = caps[1].trim().to_string();
            // Dispatchers run the street's "ST" into the suburb often enough
            // that a long remainder is trusted over names that are
            // legitimately "ST ..."
            if let Some(rest) = suburb.strip_prefix("ST ") {
                if rest.len() > 3 {
                    suburb = rest.to_string();
                }
            }
            let suburb = accept(&suburb)?;
            Some(title_case(&suburb))
        }
        RuleKind::NumberedStreet => {
            let street = accept(caps[1].trim())?;
            let suburb = accept(caps[2].trim())?;
            Some(format!("{}, {}", title_case(&street), title_case(&suburb)))
        }
        RuleKind::Corner => {
            let suburb = accept(caps[3].trim())?;
            Some(title_case(&suburb))
        }
        RuleKind::BareRoad => {
            // The run before " RD" reaches back to the start of the message
            // text, so take trailing words the same way the fallbacks do.
            let road = scan_suffix(caps[1].trim(), Some(3))?;
            let suburb = accept(caps[2].trim())?;
            Some(format!("{} Rd, {}", title_case(&road), title_case(&suburb)))
        }
        RuleKind::AtAddress => {
            let address = accept(caps[1].trim())?;
            let suburb = accept(caps[2].trim())?;
            Some(format!("{}, {}", title_case(&address), title_case(&suburb)))
        }
        RuleKind::BeforeRegion => {
            let suburb = scan_suffix(caps[1].trim(), None)?;
            Some(title_case(&suburb))
        }
        RuleKind::BeforeSlash => {
            let suburb = scan_suffix(caps[1].trim(), Some(3))?;
            Some(title_case(&suburb))
        }
    }
}

/// Run the reject filter and tail cleanup over a raw candidate.
fn accept(candidate: &str) -> Option<String> {
    if is_rejected(candidate) {
        return None;
    }
    let cleaned = strip_remnant(candidate);
    if cleaned.trim().len() < 3 {
        return None;
    }
    Some(cleaned)
}

/// Whether a candidate starts with incident terminology.
fn is_rejected(candidate: &str) -> bool {
    REJECT_KEYWORDS.iter().any(|k| candidate.starts_with(k))
}

/// Drop trailing single-letter-plus-digits tokens (grid reference remnants
/// like " M3") from an accepted candidate.
fn strip_remnant(candidate: &str) -> String {
    let mut text = candidate.trim().to_string();
    while let Some(m) = remnant_re().find(&text) {
        text.truncate(m.start());
    }
    text
}

/// Right-to-left word scan over an uppercase run: keep extending the
/// trailing word sequence while words are neither rejected terminology nor
/// digit-bearing codes, capped at `max_words` when given. Candidates
/// shorter than four characters are noise.
fn scan_suffix(run: &str, max_words: Option<usize>) -> Option<String> {
    let cleaned = strip_remnant(run);
    let words: Vec<&str> = cleaned.split_whitespace().collect();
    let mut start = words.len();
    while start > 0 && !scan_stops_at(words[start - 1]) {
        start -= 1;
        if let Some(cap) = max_words {
            if words.len() - start == cap {
                break;
            }
        }
    }
    if start == words.len() {
        return None;
    }
    let candidate = words[start..].join(" ");
    if candidate.len() < 4 {
        return None;
    }
    Some(candidate)
}

fn scan_stops_at(word: &str) -> bool {
    is_rejected(word) || word.chars().any(|c| c.is_ascii_digit())
}

/// Uppercase-first display casing, word by word.
fn title_case(s: &str) -> String {
    s.split(' ')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_string() + &chars.as_str().to_lowercase(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numbered_street_address() {
        let msg = "@@ALERT GRASS FIRE 230 CHURCHILL RD YARRAWONGA / F123456789";
        assert_eq!(extract(msg), Some("Churchill Rd, Yarrawonga".to_string()));
    }

    #[test]
    fn test_numbered_street_with_multi_word_name() {
        let msg = "@@ALERT STRUCTURE FIRE 12 OLD DOOKIE RD SHEPPARTON / F987654321";
        assert_eq!(extract(msg), Some("Old Dookie Rd, Shepparton".to_string()));
    }

    #[test]
    fn test_assembly_point_suburb() {
        let msg = "@@ALERT ASSEMBLE AT MAIN STREET FIRE STATION NAGAMBIE / F111222333";
        assert_eq!(extract(msg), Some("Nagambie".to_string()));
    }

    #[test]
    fn test_assembly_point_strips_long_st_prefix() {
        let msg = "@@ALERT ASSEMBLE AT RECREATION RESERVE ST ARNAUD / F111222333";
        assert_eq!(extract(msg), Some("Arnaud".to_string()));
    }

    #[test]
    fn test_assembly_point_keeps_short_st_remainder() {
        let msg = "@@ALERT ASSEMBLE AT RECREATION RESERVE ST IVE / F111222333";
        assert_eq!(extract(msg), Some("St Ive".to_string()));
    }

    #[test]
    fn test_corner_of_two_roads() {
        let msg = "@@ALERT GRASS FIRE CNR HIGH ST/BROKEN RIVER RD BENALLA BACC1 F123123123";
        assert_eq!(extract(msg), Some("Benalla".to_string()));
    }

    #[test]
    fn test_bare_road_before_grid_ref() {
        let msg = "@@ALERT BUSHFIRE SPREADING MURPHYS RD EUROA M 33 J9 F555000111";
        assert_eq!(extract(msg), Some("Murphys Rd, Euroa".to_string()));
    }

    #[test]
    fn test_at_description_keeps_street_number() {
        let msg = "@@ALERT ALARM AT THE OLD MILL 45 FOREST DR GEMBROOK BACC2 F444555666";
        assert_eq!(extract(msg), Some("45 Forest Dr, Gembrook".to_string()));
    }

    #[test]
    fn test_fallback_before_region_code() {
        let msg = "@@ALERT GRASS FIRE TRUCK REQUIRED NAGAMBIE BACC1 F123456789";
        assert_eq!(extract(msg), Some("Nagambie".to_string()));
    }

    #[test]
    fn test_fallback_before_slash_caps_three_words() {
        let msg = "@@ALERT SMOKE SIGHTED NEAR WARBY RANGES UPPER / F222333444";
        assert_eq!(extract(msg), Some("Warby Ranges Upper".to_string()));
    }

    #[test]
    fn test_ordering_street_address_beats_fallback() {
        // Matches both the numbered-address pattern and the region-code
        // fallback; the more specific pattern must win.
        let msg = "@@ALERT GRASS FIRE 230 CHURCHILL RD YARRAWONGA / NEAR LAKE MULWALA BACC1";
        assert_eq!(extract(msg), Some("Churchill Rd, Yarrawonga".to_string()));
    }

    #[test]
    fn test_reject_filter_never_yields_incident_terms() {
        let msg = "@@ALERT STRUCTURE FIRE TRUCK REQUIRED ASSEMBLE BACC1 F123456789";
        let result = extract(msg);
        assert_ne!(result.as_deref(), Some("Required"));
        assert_ne!(result.as_deref(), Some("Assemble"));
    }

    #[test]
    fn test_grid_remnant_stripped_from_tail() {
        let msg = "@@ALERT GRASS FIRE KANGAROO FLAT M3 / F123456789";
        assert_eq!(extract(msg), Some("Kangaroo Flat".to_string()));
    }

    #[test]
    fn test_no_location_yields_none() {
        assert_eq!(extract("@@ALERT PUMP OPERATING"), None);
        assert_eq!(extract(""), None);
    }

    #[test]
    fn test_deterministic_over_repeated_calls() {
        let msg = "@@ALERT GRASS FIRE 230 CHURCHILL RD YARRAWONGA / F123456789";
        let first = extract(msg);
        for _ in 0..10 {
            assert_eq!(extract(msg), first);
        }
    }

    #[test]
    fn test_short_candidates_rejected_as_noise() {
        // Trailing run before the slash is under four characters
        let msg = "@@ALERT SMOKE ISSUING YEA / F123456789";
        assert_eq!(extract(msg), None);
    }
}
