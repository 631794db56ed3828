// ═══════════════════════════════════════════════════════════════════
// Error Tests: CoreError variants, Display formatting, From impls
// ═══════════════════════════════════════════════════════════════════

use watchfolio_core::errors::CoreError;

// ── Display formatting ──────────────────────────────────────────────

mod display {
    use super::*;

    #[test]
    fn api() {
        let err = CoreError::Api {
            provider: "Yahoo Finance".into(),
            message: "HTTP 502".into(),
        };
        assert_eq!(err.to_string(), "API error (Yahoo Finance): HTTP 502");
    }

    #[test]
    fn network() {
        let err = CoreError::Network("connection reset".into());
        assert_eq!(err.to_string(), "Network error: connection reset");
    }

    #[test]
    fn rate_limited() {
        let err = CoreError::RateLimited {
            provider: "Alpha Vantage".into(),
        };
        assert_eq!(err.to_string(), "Rate limit reached for Alpha Vantage");
    }

    #[test]
    fn no_provider() {
        let err = CoreError::NoProvider("AAPL".into());
        assert_eq!(err.to_string(), "No quote source available for AAPL");
    }

    #[test]
    fn invalid_price() {
        let err = CoreError::InvalidPrice {
            symbol: "MSFT".into(),
            price: -1.5,
        };
        assert_eq!(
            err.to_string(),
            "Invalid price for MSFT: -1.5 (must be finite and positive)"
        );
    }

    #[test]
    fn invalid_price_nan() {
        let err = CoreError::InvalidPrice {
            symbol: "MSFT".into(),
            price: f64::NAN,
        };
        assert!(err.to_string().contains("NaN"));
    }

    #[test]
    fn price_not_available() {
        let err = CoreError::PriceNotAvailable {
            symbol: "TSLA".into(),
            date: "latest".into(),
        };
        assert_eq!(err.to_string(), "Price not available for TSLA at latest");
    }

    #[test]
    fn validation() {
        let err = CoreError::ValidationError("symbol empty".into());
        assert_eq!(err.to_string(), "Validation failed: symbol empty");
    }

    #[test]
    fn config() {
        let err = CoreError::Config("batch_size must be at least 1".into());
        assert_eq!(
            err.to_string(),
            "Invalid configuration: batch_size must be at least 1"
        );
    }

    #[test]
    fn serialization() {
        let err = CoreError::Serialization("oops".into());
        assert_eq!(err.to_string(), "Serialization error: oops");
    }

    #[test]
    fn deserialization() {
        let err = CoreError::Deserialization("unexpected EOF".into());
        assert_eq!(err.to_string(), "Deserialization error: unexpected EOF");
    }
}

// ── From impls ──────────────────────────────────────────────────────

mod conversions {
    use super::*;

    #[test]
    fn from_serde_json_error() {
        let json_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err: CoreError = json_err.into();
        assert!(matches!(err, CoreError::Deserialization(_)));
    }

    #[test]
    fn question_mark_propagates_serde_error() {
        fn parse(s: &str) -> Result<u32, CoreError> {
            Ok(serde_json::from_str(s)?)
        }
        assert!(parse("12").is_ok());
        assert!(matches!(parse("\"x\""), Err(CoreError::Deserialization(_))));
    }

    #[test]
    fn error_is_debug_and_std_error() {
        fn assert_std_error<E: std::error::Error + Send + Sync + 'static>(_: &E) {}
        let err = CoreError::Network("x".into());
        assert_std_error(&err);
        assert!(format!("{err:?}").contains("Network"));
    }
}
