use crate::error::ValidationError;
use crate::shortcode::ShortCode;
use serde::{Deserialize, Serialize};

const OWNER_MAX_LENGTH: usize = 20;

/// Input of `CreateShortURL`, exactly as received from the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateShortUrlParams {
    pub owner: String,
    pub long_url: String,
    /// Code requested by the caller. `None` and `Some("")` both mean
    /// "generate one for me".
    #[serde(default)]
    pub preferred_code: Option<String>,
}

impl CreateShortUrlParams {
    pub fn new(owner: impl Into<String>, long_url: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            long_url: long_url.into(),
            preferred_code: None,
        }
    }

    pub fn with_preferred_code(mut self, code: impl Into<String>) -> Self {
        self.preferred_code = Some(code.into());
        self
    }

    /// The preferred code, if one was actually supplied.
    pub fn preferred(&self) -> Option<&str> {
        self.preferred_code.as_deref().filter(|code| !code.is_empty())
    }
}

/// Field-level input validation, supplied by the surrounding system.
pub trait Validator<T: ?Sized>: Send + Sync + 'static {
    fn validate(&self, value: &T) -> Result<(), ValidationError>;
}

/// The stock rule set for [`CreateShortUrlParams`].
///
/// - `owner`: required, `[A-Za-z0-9_]+`, at most 20 characters
/// - `long_url`: required, absolute `http`/`https` URL with a host
/// - `preferred_code`: optional, see [`ShortCode::validate`]
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultValidator;

impl DefaultValidator {
    fn is_web_url(candidate: &str) -> bool {
        match url::Url::parse(candidate) {
            Ok(parsed) => {
                matches!(parsed.scheme(), "http" | "https")
                    && parsed.host_str().is_some_and(|host| !host.is_empty())
            }
            Err(_) => false,
        }
    }
}

impl Validator<CreateShortUrlParams> for DefaultValidator {
    fn validate(&self, params: &CreateShortUrlParams) -> Result<(), ValidationError> {
        let mut errors = ValidationError::default();

        if params.owner.is_empty() {
            errors.push("owner", "required");
        } else {
            if !params
                .owner
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_')
            {
                errors.push("owner", "username");
            }
            if params.owner.chars().count() > OWNER_MAX_LENGTH {
                errors.push("owner", "max");
            }
        }

        if params.long_url.is_empty() {
            errors.push("long_url", "required");
        } else if !Self::is_web_url(&params.long_url) {
            errors.push("long_url", "url");
        }

        if let Some(code) = params.preferred() {
            if ShortCode::validate(code).is_err() {
                errors.push("preferred_code", "short_code");
            }
        }

        errors.into_result()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn constraints(err: &ValidationError) -> Vec<(&'static str, &'static str)> {
        err.violations()
            .iter()
            .map(|v| (v.field, v.constraint))
            .collect()
    }

    #[test]
    fn accepts_well_formed_params() {
        let params = CreateShortUrlParams::new("alice_01", "https://example.com/a?b=c");
        assert!(DefaultValidator.validate(&params).is_ok());

        let params = params.with_preferred_code("my-code");
        assert!(DefaultValidator.validate(&params).is_ok());
    }

    #[test]
    fn empty_preferred_code_means_generated() {
        let params = CreateShortUrlParams::new("alice", "http://example.com").with_preferred_code("");
        assert!(params.preferred().is_none());
        assert!(DefaultValidator.validate(&params).is_ok());
    }

    #[test]
    fn reports_missing_fields() {
        let err = DefaultValidator
            .validate(&CreateShortUrlParams::new("", ""))
            .unwrap_err();
        assert_eq!(
            constraints(&err),
            vec![("owner", "required"), ("long_url", "required")]
        );
    }

    #[test]
    fn rejects_bad_owner() {
        let err = DefaultValidator
            .validate(&CreateShortUrlParams::new("bob smith", "https://example.com"))
            .unwrap_err();
        assert_eq!(constraints(&err), vec![("owner", "username")]);

        let err = DefaultValidator
            .validate(&CreateShortUrlParams::new(
                "a".repeat(21),
                "https://example.com",
            ))
            .unwrap_err();
        assert_eq!(constraints(&err), vec![("owner", "max")]);
    }

    #[test]
    fn rejects_non_web_urls() {
        for url in [
            "not-a-valid-url",
            "ftp://example.com/file",
            "mailto:someone@example.com",
            "https://",
        ] {
            let err = DefaultValidator
                .validate(&CreateShortUrlParams::new("alice", url))
                .unwrap_err();
            assert_eq!(constraints(&err), vec![("long_url", "url")], "{url}");
        }
    }

    #[test]
    fn rejects_malformed_preferred_code() {
        let params =
            CreateShortUrlParams::new("alice", "https://example.com").with_preferred_code("a b");
        let err = DefaultValidator.validate(&params).unwrap_err();
        assert_eq!(constraints(&err), vec![("preferred_code", "short_code")]);
    }
}
