//! Error taxonomy for note service calls.
//!
//! Every failure reported by a [`NoteStore`](crate::store::NoteStore) is a
//! [`ServiceError`]. Rejections carry the service's numeric [`ErrorCode`],
//! which [`categorize`] folds into a small set of [`ErrorCategory`] values,
//! each with a fixed human-readable explanation.
//!
//! | Variant | Raised when |
//! |---------|-------------|
//! | [`ServiceError::Unreachable`] | connection refused, DNS failure, timeout |
//! | [`ServiceError::User`] | the request was rejected (validation, quota, auth) |
//! | [`ServiceError::System`] | the service failed or throttled the request |
//! | [`ServiceError::NotFound`] | a guid no longer exists |
//! | [`ServiceError::Protocol`] | the response could not be understood |

use thiserror::Error;

/// Numeric error codes used by the note service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    Unknown = 1,
    BadDataFormat = 2,
    PermissionDenied = 3,
    InternalError = 4,
    DataRequired = 5,
    LimitReached = 6,
    QuotaReached = 7,
    InvalidAuth = 8,
    AuthExpired = 9,
    DataConflict = 10,
    EnmlValidation = 11,
    ShardUnavailable = 12,
    LenTooShort = 13,
    LenTooLong = 14,
    TooFew = 15,
    TooMany = 16,
    UnsupportedOperation = 17,
    TakenDown = 18,
    RateLimitReached = 19,
}

impl ErrorCode {
    /// Map a wire code onto [`ErrorCode`]; unrecognised numbers become `Unknown`.
    pub fn from_code(code: i32) -> Self {
        match code {
            2 => ErrorCode::BadDataFormat,
            3 => ErrorCode::PermissionDenied,
            4 => ErrorCode::InternalError,
            5 => ErrorCode::DataRequired,
            6 => ErrorCode::LimitReached,
            7 => ErrorCode::QuotaReached,
            8 => ErrorCode::InvalidAuth,
            9 => ErrorCode::AuthExpired,
            10 => ErrorCode::DataConflict,
            11 => ErrorCode::EnmlValidation,
            12 => ErrorCode::ShardUnavailable,
            13 => ErrorCode::LenTooShort,
            14 => ErrorCode::LenTooLong,
            15 => ErrorCode::TooFew,
            16 => ErrorCode::TooMany,
            17 => ErrorCode::UnsupportedOperation,
            18 => ErrorCode::TakenDown,
            19 => ErrorCode::RateLimitReached,
            _ => ErrorCode::Unknown,
        }
    }

    pub fn code(self) -> i32 {
        self as i32
    }

    /// Wire name, e.g. `AUTH_EXPIRED`.
    pub fn name(self) -> &'static str {
        match self {
            ErrorCode::Unknown => "UNKNOWN",
            ErrorCode::BadDataFormat => "BAD_DATA_FORMAT",
            ErrorCode::PermissionDenied => "PERMISSION_DENIED",
            ErrorCode::InternalError => "INTERNAL_ERROR",
            ErrorCode::DataRequired => "DATA_REQUIRED",
            ErrorCode::LimitReached => "LIMIT_REACHED",
            ErrorCode::QuotaReached => "QUOTA_REACHED",
            ErrorCode::InvalidAuth => "INVALID_AUTH",
            ErrorCode::AuthExpired => "AUTH_EXPIRED",
            ErrorCode::DataConflict => "DATA_CONFLICT",
            ErrorCode::EnmlValidation => "ENML_VALIDATION",
            ErrorCode::ShardUnavailable => "SHARD_UNAVAILABLE",
            ErrorCode::LenTooShort => "LEN_TOO_SHORT",
            ErrorCode::LenTooLong => "LEN_TOO_LONG",
            ErrorCode::TooFew => "TOO_FEW",
            ErrorCode::TooMany => "TOO_MANY",
            ErrorCode::UnsupportedOperation => "UNSUPPORTED_OPERATION",
            ErrorCode::TakenDown => "TAKEN_DOWN",
            ErrorCode::RateLimitReached => "RATE_LIMIT_REACHED",
        }
    }

    /// Sentence-case label for messages: `AUTH_EXPIRED` becomes `Auth expired`.
    pub fn display_name(self) -> String {
        let spaced = self.name().replace('_', " ").to_lowercase();
        let mut chars = spaced.chars();
        match chars.next() {
            Some(first) => first.to_uppercase().chain(chars).collect(),
            None => String::new(),
        }
    }
}

/// Coarse grouping of [`ErrorCode`]s.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    Server,
    Data,
    Permission,
    Auth,
    Contents,
}

impl ErrorCategory {
    pub fn explanation(self) -> &'static str {
        match self {
            ErrorCategory::Server => "Internal server error",
            ErrorCategory::Data => "User supplied data is invalid or conflicting",
            ErrorCategory::Permission => {
                "Action not allowed, permission denied or limits exceeded"
            }
            ErrorCategory::Auth => "Authorisation error, consider re-configuring the token",
            ErrorCategory::Contents => "Illegal note contents",
        }
    }
}

/// The single code-to-category table.
pub fn categorize(code: ErrorCode) -> ErrorCategory {
    use ErrorCode::*;
    match code {
        Unknown | InternalError | ShardUnavailable | UnsupportedOperation => ErrorCategory::Server,
        BadDataFormat | DataRequired | DataConflict | LenTooShort | LenTooLong | TooFew
        | TooMany => ErrorCategory::Data,
        PermissionDenied | LimitReached | QuotaReached | TakenDown | RateLimitReached => {
            ErrorCategory::Permission
        }
        InvalidAuth | AuthExpired => ErrorCategory::Auth,
        EnmlValidation => ErrorCategory::Contents,
    }
}

/// Failure of a remote note service call.
#[derive(Debug, Clone, Error)]
pub enum ServiceError {
    #[error("note service unreachable: {0}")]
    Unreachable(String),

    #[error("note service rejected the request [{}]: {parameter}", .code.display_name())]
    User { code: ErrorCode, parameter: String },

    #[error("note service error [{}]: {message}", .code.display_name())]
    System { code: ErrorCode, message: String },

    #[error("not found [{identifier} = {key}]")]
    NotFound { identifier: String, key: String },

    #[error("unexpected response from note service: {0}")]
    Protocol(String),
}

impl ServiceError {
    pub fn user(code: ErrorCode, parameter: impl Into<String>) -> Self {
        ServiceError::User {
            code,
            parameter: parameter.into(),
        }
    }

    pub fn not_found(identifier: impl Into<String>, key: impl Into<String>) -> Self {
        ServiceError::NotFound {
            identifier: identifier.into(),
            key: key.into(),
        }
    }

    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            ServiceError::User { code, .. } | ServiceError::System { code, .. } => Some(*code),
            _ => None,
        }
    }

    pub fn category(&self) -> Option<ErrorCategory> {
        self.code().map(categorize)
    }

    /// The token is invalid or expired; re-authenticating may help.
    pub fn is_auth_error(&self) -> bool {
        self.category() == Some(ErrorCategory::Auth)
    }

    /// Worth re-entering the same operation unchanged.
    pub fn is_transient(&self) -> bool {
        match self {
            ServiceError::Unreachable(_) => true,
            ServiceError::System { code, .. } => matches!(
                code,
                ErrorCode::RateLimitReached | ErrorCode::ShardUnavailable | ErrorCode::InternalError
            ),
            _ => false,
        }
    }

    /// The service turned the request down without acting on it, so sending
    /// it again cannot apply it twice.
    pub fn is_refusal(&self) -> bool {
        self.is_auth_error() || self.code() == Some(ErrorCode::RateLimitReached)
    }

    /// Human-readable explanation, suitable for showing to the user.
    pub fn explain(&self) -> String {
        match self {
            ServiceError::Unreachable(_) => "The note service seems unreachable.\n\
                 Please check your connection and retry."
                .to_string(),
            ServiceError::User { code, parameter } => {
                if categorize(*code) == ErrorCategory::Contents {
                    explain_contents(parameter)
                } else {
                    categorize(*code).explanation().to_string()
                }
            }
            ServiceError::System { code, .. } => format!(
                "The note service cannot perform the requested action:\n{}",
                categorize(*code).explanation()
            ),
            ServiceError::NotFound { identifier, .. } => {
                let what = identifier.split('.').next().unwrap_or(identifier);
                format!("Cannot find {}", what)
            }
            ServiceError::Protocol(detail) => format!(
                "The note service answered with something unexpected:\n{}",
                detail
            ),
        }
    }
}

/// Explain an ENML validation failure.
///
/// The service reports these as `Element type "font2" ...` or
/// `Attribute "class" ... element type "pre"`; the quoted parts name the
/// offending element and attribute.
fn explain_contents(parameter: &str) -> String {
    let explanation = "The contents of the note are not valid.\n";
    let parts: Vec<&str> = parameter.split('"').collect();
    let what = parts.first().map(|p| p.trim().to_lowercase()).unwrap_or_default();

    match (what.as_str(), parts.get(1), parts.get(3)) {
        ("element type", Some(element), _) => format!(
            "{}The inline HTML tag '{}' is not allowed in notes.",
            explanation, element
        ),
        ("attribute", Some(&"class"), Some(element)) => format!(
            "{}The note contains a '{}' HTML tag with a 'class' attribute; \
             this is not allowed in a note.\n\
             Please use inline 'style' attributes or customise the \
             [markdown.inline_css] setting.",
            explanation, element
        ),
        ("attribute", Some(attribute), Some(element)) => format!(
            "{}The note contains a '{}' HTML tag with a '{}' attribute; \
             this is not allowed in a note.",
            explanation, element, attribute
        ),
        _ => format!("{}{}", explanation, parameter),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_code_round_trips_through_its_number() {
        for n in 1..=19 {
            assert_eq!(ErrorCode::from_code(n).code(), n);
        }
        assert_eq!(ErrorCode::from_code(0), ErrorCode::Unknown);
        assert_eq!(ErrorCode::from_code(404), ErrorCode::Unknown);
    }

    #[test]
    fn categorize_groups_codes() {
        assert_eq!(categorize(ErrorCode::AuthExpired), ErrorCategory::Auth);
        assert_eq!(categorize(ErrorCode::InvalidAuth), ErrorCategory::Auth);
        assert_eq!(categorize(ErrorCode::QuotaReached), ErrorCategory::Permission);
        assert_eq!(categorize(ErrorCode::LenTooLong), ErrorCategory::Data);
        assert_eq!(categorize(ErrorCode::EnmlValidation), ErrorCategory::Contents);
        assert_eq!(categorize(ErrorCode::ShardUnavailable), ErrorCategory::Server);
    }

    #[test]
    fn display_name_is_sentence_case() {
        assert_eq!(ErrorCode::AuthExpired.display_name(), "Auth expired");
        assert_eq!(ErrorCode::Unknown.display_name(), "Unknown");
    }

    #[test]
    fn explains_class_attribute_violation() {
        let err = ServiceError::user(
            ErrorCode::EnmlValidation,
            "Attribute \"class\" must be declared for element type \"pre\".",
        );
        let msg = err.explain();
        assert!(msg.contains("'pre' HTML tag with a 'class' attribute"));
        assert!(msg.contains("inline_css"));
    }

    #[test]
    fn explains_disallowed_element() {
        let err = ServiceError::user(
            ErrorCode::EnmlValidation,
            "Element type \"script\" must be declared.",
        );
        assert!(err
            .explain()
            .contains("The inline HTML tag 'script' is not allowed"));
    }

    #[test]
    fn explains_not_found_with_object_name() {
        let err = ServiceError::not_found("Note.guid", "abc");
        assert_eq!(err.explain(), "Cannot find Note");
    }

    #[test]
    fn auth_and_transient_flags() {
        assert!(ServiceError::user(ErrorCode::AuthExpired, "token").is_auth_error());
        assert!(!ServiceError::user(ErrorCode::DataRequired, "Note.title").is_auth_error());
        assert!(ServiceError::Unreachable("dns".into()).is_transient());
        assert!(ServiceError::System {
            code: ErrorCode::RateLimitReached,
            message: "slow down".into()
        }
        .is_transient());
        assert!(!ServiceError::not_found("Note.guid", "x").is_transient());
    }

    #[test]
    fn only_refusals_are_safe_to_resend() {
        assert!(ServiceError::user(ErrorCode::InvalidAuth, "token").is_refusal());
        assert!(ServiceError::System {
            code: ErrorCode::RateLimitReached,
            message: "slow down".into()
        }
        .is_refusal());
        assert!(!ServiceError::Unreachable("timed out".into()).is_refusal());
        assert!(!ServiceError::System {
            code: ErrorCode::InternalError,
            message: "oops".into()
        }
        .is_refusal());
    }

    #[test]
    fn display_keeps_the_raw_diagnostic() {
        let err = ServiceError::user(ErrorCode::LenTooLong, "Note.title");
        assert_eq!(
            err.to_string(),
            "note service rejected the request [Len too long]: Note.title"
        );
    }

    #[test]
    fn user_error_explanation_uses_category() {
        let err = ServiceError::user(ErrorCode::QuotaReached, "Accounting.uploadLimit");
        assert_eq!(
            err.explain(),
            "Action not allowed, permission denied or limits exceeded"
        );
    }
}
