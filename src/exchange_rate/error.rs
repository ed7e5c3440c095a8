use std::fmt;

use rust_decimal::Decimal;

use crate::currency::CurrencyCode;

/// The error types reported by the exchange rate provider in its `error-type` field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiErrorKind {
    /// The provider does not support one of the currencies.
    UnsupportedCode,
    /// The request URL was not understood.
    MalformedRequest,
    /// The API key is not valid.
    InvalidKey,
    /// The account's email address has not been confirmed.
    InactiveAccount,
    /// The account has used up its requests for the month.
    QuotaReached,
    /// One of the currency codes does not exist.
    UnknownCode,
    /// An error type this client does not know about.
    Other(String),
}

impl ApiErrorKind {
    /// Map the provider's `error-type` string onto a kind.
    pub fn from_error_type(error_type: &str) -> Self {
        match error_type {
            "unsupported-code" => Self::UnsupportedCode,
            "malformed-request" => Self::MalformedRequest,
            "invalid-key" => Self::InvalidKey,
            "inactive-account" => Self::InactiveAccount,
            "quota-reached" => Self::QuotaReached,
            "unknown-code" => Self::UnknownCode,
            other => Self::Other(other.to_owned()),
        }
    }
}

impl fmt::Display for ApiErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnsupportedCode => write!(f, "the supplied currency code is not supported"),
            Self::MalformedRequest => write!(f, "the request format is invalid"),
            Self::InvalidKey => write!(f, "the API key is not valid"),
            Self::InactiveAccount => write!(f, "the account email address was not confirmed"),
            Self::QuotaReached => write!(f, "the API request quota has been reached"),
            Self::UnknownCode => write!(f, "unknown currency code provided"),
            Self::Other(error_type) => write!(f, "unknown API error: {error_type}"),
        }
    }
}

/// Errors from looking up an exchange rate.
#[derive(Debug, thiserror::Error, Clone, PartialEq)]
pub enum ExchangeRateError {
    /// No API key was configured for the exchange rate provider.
    #[error("an exchange rate API key is required")]
    MissingApiKey,

    /// The request could not be sent or no response arrived in time.
    #[error("exchange rate request failed: {0}")]
    RequestFailed(String),

    /// The provider responded with a non-success HTTP status.
    #[error("exchange rate request failed with status: {0}")]
    HttpStatus(u16),

    /// The provider reported an error in the response body.
    #[error("exchange rate API error: {0}")]
    Api(ApiErrorKind),

    /// The response body could not be understood.
    #[error("invalid exchange rate response: {0}")]
    InvalidResponse(String),

    /// The converted amount does not fit in a decimal.
    #[error("converting {amount} {from} to {to} overflowed")]
    ConversionOverflow {
        /// The amount being converted.
        amount: Decimal,
        /// The currency converted from.
        from: CurrencyCode,
        /// The currency converted to.
        to: CurrencyCode,
    },
}

impl From<reqwest::Error> for ExchangeRateError {
    fn from(error: reqwest::Error) -> Self {
        tracing::error!("exchange rate request error: {error:#?}");
        ExchangeRateError::RequestFailed(error.to_string())
    }
}
