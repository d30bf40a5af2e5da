//! Decides whether an installed version is hit by a vulnerability.
//!
//! Both the installed version and the feed's ranges are loose strings; they
//! go through [`range::normalize`] before being evaluated against each other.
//! When anything fails to parse the decision is fail-unsafe: the error is
//! returned together with a conservative verdict, and callers adopt that
//! verdict instead of dropping the package from the report.

use semver::{Version, VersionReq};

use crate::model::Vulnerability;
use crate::parse::{range, ParseError};

/// A range or version could not be evaluated.
#[derive(Debug, thiserror::Error)]
pub enum RangeEvalError {
    #[error(transparent)]
    Normalize(#[from] ParseError),
    #[error("invalid semver in {0:?}")]
    Semver(String, #[source] semver::Error),
}

/// The matcher could not decide and fell back to a conservative verdict.
///
/// `verdict` is what the caller must treat the package as: `true` (impacted)
/// when the installed version or the vulnerable range failed to evaluate,
/// `false` when the fixed range did. Callers must check the error, never just
/// the verdict.
#[derive(Debug, thiserror::Error)]
#[error("cannot decide whether {package}@{installed} is impacted, assuming impacted={verdict}")]
pub struct ImpactError {
    pub package: String,
    pub installed: String,
    pub verdict: bool,
    #[source]
    pub source: RangeEvalError,
}

/// Tests whether `installed` falls inside the vulnerability's vulnerable
/// range and outside its fixed range.
///
/// The vulnerable range is consulted first: a version outside it is not
/// impacted, whatever the fixed range says. Inside it, an empty fixed range
/// means impacted; otherwise the fix wins when the version satisfies it.
///
/// # Errors
///
/// Fail-unsafe, and asymmetric on purpose: an unparseable installed version
/// or vulnerable range errors with `verdict = true` (assume vulnerable), but
/// an unparseable fixed range errors with `verdict = false`, since a broken
/// fix declaration must not manufacture a finding on its own. The asymmetry
/// is surprising but load-bearing for compatibility; do not "fix" it.
pub fn is_impacted(
    module: &str,
    installed: &str,
    vulnerability: &Vulnerability,
) -> Result<bool, ImpactError> {
    let fail = |verdict: bool, source: RangeEvalError| ImpactError {
        package: module.to_string(),
        installed: installed.to_string(),
        verdict,
        source,
    };

    let version = match parse_installed(installed) {
        Ok(version) => version,
        Err(err) => return Err(fail(true, err)),
    };

    let in_vulnerable = match range_contains(&version, &vulnerability.vulnerable_range) {
        Ok(hit) => hit,
        Err(err) => return Err(fail(true, err)),
    };
    if !in_vulnerable {
        return Ok(false);
    }

    if vulnerability.fixed_range.is_empty() {
        return Ok(true);
    }

    match range_contains(&version, &vulnerability.fixed_range) {
        Ok(fixed) => Ok(!fixed),
        Err(err) => Err(fail(false, err)),
    }
}

fn parse_installed(installed: &str) -> Result<Version, RangeEvalError> {
    let normalized = range::normalize(installed)?;
    Version::parse(&normalized).map_err(|err| RangeEvalError::Semver(normalized, err))
}

/// Evaluates membership of a concrete version in a loose range string.
pub fn range_contains(version: &Version, loose: &str) -> Result<bool, RangeEvalError> {
    let canonical = range::normalize(loose)?;
    for group in canonical.split(" || ") {
        if group_matches(version, group)? {
            return Ok(true);
        }
    }
    Ok(false)
}

/// One OR alternative: either a hyphen range or AND-ed comparators.
fn group_matches(version: &Version, group: &str) -> Result<bool, RangeEvalError> {
    if let Some((lo, hi)) = group.split_once(" - ") {
        let lo = parse_exact(lo)?;
        let hi = parse_exact(hi)?;
        return Ok(*version >= lo && *version <= hi);
    }
    for term in group.split(", ") {
        if !term_matches(version, term)? {
            return Ok(false);
        }
    }
    Ok(true)
}

fn term_matches(version: &Version, term: &str) -> Result<bool, RangeEvalError> {
    if let Some(rest) = term.strip_prefix("!=").or_else(|| term.strip_prefix('!')) {
        let excluded = parse_exact(rest)?;
        return Ok(*version != excluded);
    }
    // A bare, fully-specified version is an exact match, not a caret range.
    if term.starts_with(|c: char| c.is_ascii_digit()) && !has_wildcard_component(term) {
        let exact = parse_exact(term)?;
        return Ok(*version == exact);
    }
    let req =
        VersionReq::parse(term).map_err(|err| RangeEvalError::Semver(term.to_string(), err))?;
    Ok(req.matches(version))
}

fn parse_exact(text: &str) -> Result<Version, RangeEvalError> {
    Version::parse(text).map_err(|err| RangeEvalError::Semver(text.to_string(), err))
}

/// X-range detection on a canonical term: wildcard in a component position,
/// not inside a prerelease (`2.0.0-x` is a concrete version).
fn has_wildcard_component(term: &str) -> bool {
    let core = term.split(['-', '+']).next().unwrap_or(term);
    core.split('.').any(|c| matches!(c, "x" | "X" | "*"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vuln(vulnerable: &str, fixed: &str) -> Vulnerability {
        Vulnerability {
            vulnerable_range: vulnerable.to_string(),
            fixed_range: fixed.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_impacted_inside_vulnerable_range() {
        assert!(is_impacted("aaaa", "1.0.5", &vuln("^1.0.0", "")).unwrap());
    }

    #[test]
    fn test_not_impacted_when_fix_applies() {
        assert!(!is_impacted("aaaa", "1.0.5", &vuln("^1.0.0", ">1.0.4")).unwrap());
    }

    #[test]
    fn test_not_impacted_outside_vulnerable_range() {
        assert!(!is_impacted("aaaa", "1.0.5", &vuln("<1.0.0", "")).unwrap());
    }

    #[test]
    fn test_impacted_when_fix_not_reached() {
        assert!(is_impacted("aaaa", "1.0.5", &vuln("^1.0.0", ">=1.0.6")).unwrap());
    }

    #[test]
    fn test_invalid_installed_version_assumes_impacted() {
        let err = is_impacted("aaaa", "invalid version", &vuln("^1.0.0", "")).unwrap_err();
        assert!(err.verdict);
    }

    #[test]
    fn test_invalid_vulnerable_range_assumes_impacted() {
        let err = is_impacted("aaaa", "1.0.0", &vuln("invalid version", "")).unwrap_err();
        assert!(err.verdict);
    }

    #[test]
    fn test_invalid_fixed_range_reports_error_with_false_verdict() {
        let err = is_impacted("aaaa", "1.0.5", &vuln("^1.0.0", "invalid version")).unwrap_err();
        assert!(!err.verdict);
    }

    #[test]
    fn test_fixed_range_not_consulted_outside_vulnerable_range() {
        // The vulnerable-range check comes first, so a broken fixed range
        // never surfaces for versions that are not vulnerable at all.
        assert!(!is_impacted("aaaa", "0.9.0", &vuln("^1.0.0", "invalid version")).unwrap());
    }

    #[test]
    fn test_loose_ranges_are_normalized_before_evaluation() {
        assert!(is_impacted("aaaa", "1.1.0", &vuln(">=1.1 <=1.2", "")).unwrap());
        assert!(is_impacted("aaaa", "0.8.0-beta-1", &vuln("0.8.beta-1", "")).unwrap());
        assert!(!is_impacted("aaaa", "1.1.2", &vuln(">=1.1.0, <=1.1.1", "")).unwrap());
    }

    #[test]
    fn test_or_groups_and_hyphen_ranges() {
        let v = vuln(">=1.3.0 <1.3.2 || >=1.4.0 <1.4.11", "");
        assert!(is_impacted("aaaa", "1.3.1", &v).unwrap());
        assert!(is_impacted("aaaa", "1.4.2", &v).unwrap());
        assert!(!is_impacted("aaaa", "1.3.5", &v).unwrap());

        let h = vuln("1.1.0 - 1.1.1", "");
        assert!(is_impacted("aaaa", "1.1.0", &h).unwrap());
        assert!(is_impacted("aaaa", "1.1.1", &h).unwrap());
        assert!(!is_impacted("aaaa", "1.1.2", &h).unwrap());
    }

    #[test]
    fn test_bare_version_ranges_match_exactly() {
        assert!(is_impacted("aaaa", "2.0.0", &vuln("2.0.0 || 2.1.0", "")).unwrap());
        assert!(!is_impacted("aaaa", "2.0.1", &vuln("2.0.0 || 2.1.0", "")).unwrap());
    }

    #[test]
    fn test_negated_terms_exclude_one_version() {
        assert!(!is_impacted("aaaa", "1.0.0", &vuln("!1.0.0", "")).unwrap());
        assert!(is_impacted("aaaa", "1.0.1", &vuln("!1.0.0", "")).unwrap());
    }

    #[test]
    fn test_x_range_membership() {
        assert!(is_impacted("aaaa", "1.1.7", &vuln("1.1.x", "")).unwrap());
        assert!(!is_impacted("aaaa", "1.2.0", &vuln("1.1.x", "")).unwrap());
    }

    #[test]
    fn test_wildcard_installed_version_is_fail_unsafe() {
        // "*" survives normalization but is no concrete version.
        let err = is_impacted("aaaa", "*", &vuln("^1.0.0", "")).unwrap_err();
        assert!(err.verdict);
    }
}
