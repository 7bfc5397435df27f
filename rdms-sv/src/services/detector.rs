//! Filename-based sample identifier detection
//!
//! Pure function over (filename, configured rule). Patterns are compiled
//! and validated when the project rule is written (`validate_rule`), so a
//! bad pattern is rejected at configuration time and never silently
//! disables detection in the ingest path.

use serde::Serialize;

use crate::error::ApiError;

/// The only rule type currently supported
pub const RULE_TYPE_FILENAME_REGEX: &str = "filename_regex";

/// Capture group name the rule convention prefers
const SAMPLE_ID_GROUP: &str = "sample_id";

/// Identifier extraction rule configured on a project
#[derive(Debug, Clone)]
pub struct DetectionRule {
    pub rule_type: String,
    pub pattern: String,
}

/// Outcome of running detection against one filename
#[derive(Debug, Clone, Serialize)]
pub struct Detection {
    pub detected_sample_id: Option<String>,
    pub configured: bool,
    pub match_success: bool,
    pub explanation: String,
}

/// Validate a rule at configuration time.
///
/// Rejects unknown rule types and uncompilable patterns with a validation
/// error so they never reach the detection path.
pub fn validate_rule(rule_type: &str, pattern: &str) -> Result<(), ApiError> {
    if rule_type != RULE_TYPE_FILENAME_REGEX {
        return Err(ApiError::Validation(format!(
            "Unsupported sample ID rule type: {}",
            rule_type
        )));
    }

    regex::Regex::new(pattern)
        .map(|_| ())
        .map_err(|e| ApiError::Validation(format!("Invalid sample ID regex: {}", e)))
}

/// Run detection for one filename against an optional rule.
///
/// Operates on the basename so watcher-relative paths behave the same as
/// bare filenames. Prefers the named capture group `sample_id`, falls back
/// to the first positional group, and treats "matched but no capture
/// group" as no detection rather than an error.
pub fn detect(filename: &str, rule: Option<&DetectionRule>) -> Detection {
    let basename = basename(filename);

    let Some(rule) = rule else {
        return Detection {
            detected_sample_id: None,
            configured: false,
            match_success: false,
            explanation: "No sample ID extraction rule configured for this project".to_string(),
        };
    };

    if rule.rule_type != RULE_TYPE_FILENAME_REGEX {
        return Detection {
            detected_sample_id: None,
            configured: false,
            match_success: false,
            explanation: format!("Unsupported rule type: {}", rule.rule_type),
        };
    }

    // Rules are validated at configuration time; a pattern that fails to
    // compile here indicates the stored config predates validation.
    let re = match regex::Regex::new(&rule.pattern) {
        Ok(re) => re,
        Err(e) => {
            return Detection {
                detected_sample_id: None,
                configured: true,
                match_success: false,
                explanation: format!("Invalid regex pattern: {}", e),
            };
        }
    };

    let Some(caps) = re.captures(basename) else {
        return Detection {
            detected_sample_id: None,
            configured: true,
            match_success: false,
            explanation: format!(
                "Regex '{}' did not match filename '{}'",
                rule.pattern, basename
            ),
        };
    };

    let captured = caps
        .name(SAMPLE_ID_GROUP)
        .map(|m| m.as_str())
        .or_else(|| caps.get(1).map(|m| m.as_str()));

    match captured {
        Some(sample_id) if !sample_id.is_empty() => Detection {
            detected_sample_id: Some(sample_id.to_string()),
            configured: true,
            match_success: true,
            explanation: format!("Extracted '{}' from '{}' using regex", sample_id, basename),
        },
        _ => Detection {
            detected_sample_id: None,
            configured: true,
            match_success: false,
            explanation: "Regex matched but no capture group found \
                 (use named group (?P<sample_id>...) or group 1)"
                .to_string(),
        },
    }
}

fn basename(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(pattern: &str) -> DetectionRule {
        DetectionRule {
            rule_type: RULE_TYPE_FILENAME_REGEX.to_string(),
            pattern: pattern.to_string(),
        }
    }

    #[test]
    fn named_group_is_preferred() {
        let r = rule(r"(?P<sample_id>SAMPLE-\d+)");
        let d = detect("SAMPLE-001_reads.fastq", Some(&r));
        assert_eq!(d.detected_sample_id.as_deref(), Some("SAMPLE-001"));
        assert!(d.configured);
        assert!(d.match_success);
    }

    #[test]
    fn no_match_reports_configured_rule() {
        let r = rule(r"(?P<sample_id>SAMPLE-\d+)");
        let d = detect("nomatch.txt", Some(&r));
        assert_eq!(d.detected_sample_id, None);
        assert!(d.configured);
        assert!(!d.match_success);
        assert!(d.explanation.contains("did not match"));
    }

    #[test]
    fn positional_group_is_the_fallback() {
        let r = rule(r"^(S\d+)_");
        let d = detect("S42_run1.raw", Some(&r));
        assert_eq!(d.detected_sample_id.as_deref(), Some("S42"));
    }

    #[test]
    fn match_without_capture_group_is_no_detection() {
        let r = rule(r"SAMPLE-\d+");
        let d = detect("SAMPLE-001.raw", Some(&r));
        assert_eq!(d.detected_sample_id, None);
        assert!(!d.match_success);
        assert!(d.explanation.contains("no capture group"));
    }

    #[test]
    fn no_rule_means_not_configured() {
        let d = detect("anything.raw", None);
        assert_eq!(d.detected_sample_id, None);
        assert!(!d.configured);
    }

    #[test]
    fn detection_uses_the_basename() {
        let r = rule(r"(?P<sample_id>SAMPLE-\d+)");
        let d = detect("runs/2026-08/SAMPLE-007_reads.fastq", Some(&r));
        assert_eq!(d.detected_sample_id.as_deref(), Some("SAMPLE-007"));
    }

    #[test]
    fn rule_validation_rejects_bad_patterns_up_front() {
        assert!(validate_rule(RULE_TYPE_FILENAME_REGEX, r"(?P<sample_id>S\d+)").is_ok());
        assert!(validate_rule(RULE_TYPE_FILENAME_REGEX, r"(unclosed").is_err());
        assert!(validate_rule("path_glob", r".*").is_err());
    }
}
