//! Error handling foundation shared by the toolbar crates.
//!
//! Only the `Result` alias lives here. Each crate owns its domain error
//! enums and returns them wrapped in a rootcause `Report` where the error
//! travels up to the application.

use rootcause::Report;

/// A Result type alias using rootcause's Report for error handling.
pub type Result<T, C = ()> = std::result::Result<T, Report<C>>;

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Boom;

    impl std::fmt::Display for Boom {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "boom")
        }
    }

    impl std::error::Error for Boom {}

    fn fails() -> Result<(), Boom> {
        Err(Boom)?;
        Ok(())
    }

    #[test]
    fn result_type_works() {
        let ok: Result<i32, Boom> = Ok(42);
        assert_eq!(ok.expect("should be ok"), 42);
    }

    #[test]
    fn domain_error_converts_into_report() {
        let err = fails().unwrap_err();
        assert!(err.to_string().contains("boom"));
    }
}
