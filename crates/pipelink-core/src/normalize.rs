//! Company/client name canonicalization
//!
//! Activities and deals are entered by different people, so the same company
//! shows up as "Acme Corp", "ACME CORP.", "acme corporation ltd" and so on.
//! Everything that compares names runs over this normalized form.

/// Legal-entity suffixes stripped from the end of a name. Only trailing
/// tokens are removed so "Corp of Engineers" keeps its "Corp".
const LEGAL_SUFFIXES: &[&str] = &[
    "ltd",
    "limited",
    "inc",
    "incorporated",
    "llc",
    "llp",
    "corp",
    "corporation",
    "co",
    "company",
    "gmbh",
    "plc",
    "sa",
    "ag",
    "pty",
    "bv",
    "srl",
];

/// Canonicalize a raw company/client name for comparison.
///
/// Lower-cases, strips punctuation, collapses whitespace, and removes
/// trailing legal-entity suffixes. Pure function; malformed or empty input
/// normalizes to the empty string.
pub fn normalize_name(raw: &str) -> String {
    let lowered: String = raw
        .to_lowercase()
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c.is_whitespace() {
                c
            } else {
                ' '
            }
        })
        .collect();

    let mut tokens: Vec<&str> = lowered.split_whitespace().collect();

    // Strip trailing legal suffixes, possibly several ("co ltd")
    while let Some(last) = tokens.last() {
        if tokens.len() > 1 && LEGAL_SUFFIXES.contains(last) {
            tokens.pop();
        } else {
            break;
        }
    }

    tokens.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_case_and_punctuation() {
        assert_eq!(normalize_name("ACME CORP."), "acme");
        assert_eq!(normalize_name("Acme Corp"), "acme");
        assert_eq!(normalize_name("acme,  inc."), "acme");
    }

    #[test]
    fn test_whitespace_collapse() {
        assert_eq!(normalize_name("  Globex   Industries  "), "globex industries");
    }

    #[test]
    fn test_stacked_suffixes() {
        assert_eq!(normalize_name("Initech Co. Ltd."), "initech");
        assert_eq!(normalize_name("Hooli GmbH"), "hooli");
    }

    #[test]
    fn test_suffix_only_name_is_kept() {
        // A name that IS a suffix token shouldn't normalize to nothing
        assert_eq!(normalize_name("Limited"), "limited");
    }

    #[test]
    fn test_suffix_in_the_middle_is_kept() {
        assert_eq!(normalize_name("Corp of Engineers"), "corp of engineers");
    }

    #[test]
    fn test_empty_and_garbage() {
        assert_eq!(normalize_name(""), "");
        assert_eq!(normalize_name("   "), "");
        assert_eq!(normalize_name("!!!***"), "");
    }
}
