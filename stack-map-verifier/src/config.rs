//! `VerifierConfig`: the `-Xverify[:opt[,opt...]]` option table from `SPEC_FULL.md` §6.
//!
//! Grounded in texture on `rhojvm`'s own small hand-rolled CLI option parsers (plain
//! `match`-over-`&str`, no `clap`): this option grammar is a niche, VM-internal surface rather than
//! a user-facing CLI, so a tiny hand-rolled split-and-match parser matches the teacher's own choice
//! of tool for equally small jobs, rather than pulling in a full argument-parsing crate for seven
//! flags.

use crate::error::VerifyError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifierConfig {
    /// `all`: disables bootstrap-class skipping and enables strict mode.
    pub strict: bool,
    /// `opt`/`noopt`: the merger's local-liveness optimization (`SPEC_FULL.md` §4.5).
    pub local_liveness_optimization: bool,
    /// `nofallback`: disables the `ignoreStackMaps` retry path.
    pub allow_fallback: bool,
    /// `ignorestackmaps`: always synthesize maps via the branch-map builder, never trust the
    /// class file's own `StackMapTable`.
    pub ignore_stack_maps: bool,
    /// `excludeattribute=NAME`, may be given more than once.
    pub excluded_attributes: Vec<String>,
    pub bootclasspath_static: bool,
    pub do_protected_access_check: bool,
    pub verbose_verification: bool,
    pub verify_error_details: bool,
    /// `classRelationshipVerifier`; mutually exclusive with `strict`.
    pub class_relationship_verifier: bool,
}
impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            strict: false,
            local_liveness_optimization: true,
            allow_fallback: true,
            ignore_stack_maps: false,
            excluded_attributes: Vec::new(),
            bootclasspath_static: false,
            do_protected_access_check: false,
            verbose_verification: false,
            verify_error_details: false,
            class_relationship_verifier: false,
        }
    }
}
impl VerifierConfig {
    /// Parses the comma-separated option list following `-Xverify:`. `input` excludes the
    /// `-Xverify` prefix and leading colon; an empty string is the bare `-Xverify` form and keeps
    /// every default.
    pub fn parse_options(input: &str) -> Result<Self, VerifyError> {
        let mut config = Self::default();
        if input.is_empty() {
            return Ok(config);
        }

        for opt in input.split(',') {
            let opt = opt.trim();
            if opt.is_empty() {
                continue;
            }

            if let Some(name) = opt.strip_prefix("excludeattribute=") {
                config.excluded_attributes.push(name.to_owned());
                continue;
            }

            match opt {
                "all" => config.strict = true,
                "opt" => config.local_liveness_optimization = true,
                "noopt" => config.local_liveness_optimization = false,
                "nofallback" => config.allow_fallback = false,
                "ignorestackmaps" => config.ignore_stack_maps = true,
                "bootclasspathstatic" => config.bootclasspath_static = true,
                "doProtectedAccessCheck" => config.do_protected_access_check = true,
                "verboseVerification" => config.verbose_verification = true,
                "verifyErrorDetails" => config.verify_error_details = true,
                "classRelationshipVerifier" => config.class_relationship_verifier = true,
                _ => return Err(VerifyError::BadOption(unrecognized_option_message(opt))),
            }
        }

        if config.class_relationship_verifier && config.strict {
            return Err(VerifyError::BadOption("classRelationshipVerifier is mutually exclusive with all"));
        }

        Ok(config)
    }
}

/// `VerifyError::BadOption` carries a `&'static str` (matching this crate's no-allocation error
/// style); the offending option text itself is dropped rather than echoed, since this is a rare
/// startup-time misconfiguration rather than a per-frame hot path.
fn unrecognized_option_message(_opt: &str) -> &'static str {
    "unrecognized -Xverify option"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_option_string_keeps_defaults() {
        let config = VerifierConfig::parse_options("").unwrap();
        assert_eq!(config, VerifierConfig::default());
    }

    #[test]
    fn noopt_disables_local_liveness() {
        let config = VerifierConfig::parse_options("noopt").unwrap();
        assert!(!config.local_liveness_optimization);
    }

    #[test]
    fn excludeattribute_accumulates_repeated_values() {
        let config = VerifierConfig::parse_options("excludeattribute=Foo,excludeattribute=Bar").unwrap();
        assert_eq!(config.excluded_attributes, vec!["Foo".to_owned(), "Bar".to_owned()]);
    }

    #[test]
    fn unknown_option_is_rejected() {
        assert!(VerifierConfig::parse_options("bogus").is_err());
    }

    #[test]
    fn strict_and_class_relationship_verifier_conflict() {
        assert!(VerifierConfig::parse_options("all,classRelationshipVerifier").is_err());
    }
}
