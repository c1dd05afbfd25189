pub mod url_validation;
pub use url_validation::{HTTP_SCHEMES, UrlValidationError, WS_SCHEMES, validate_endpoint_url};
