// Generic cross-cutting helpers shared by handlers and services.

pub mod password;
pub mod validation;

pub use password::{hash_password, verify_password, PasswordError};
pub use validation::{trim_and_validate_field, trim_optional_field};
