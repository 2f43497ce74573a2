// Services module - business logic layer for the application.

pub mod anomaly;
pub mod audit;
pub mod background_tasks;
pub mod email;
pub mod encryption;
pub mod failed_login;
pub mod fingerprint;
pub mod jwt;
pub mod payment;
pub mod payment_http;
pub mod rate_limit;
pub mod session_store;
pub mod two_factor;

pub use anomaly::{AnomalyError, AnomalyResult, AnomalyScorer};
pub use audit::{AuditServiceError, AuditWriter};
pub use background_tasks::initialize_background_tasks;
pub use email::{EmailError, EmailService};
pub use encryption::{EncryptionError, FieldCipher};
pub use failed_login::{FailedLoginError, FailedLoginRecord, FailedLoginTracker};
pub use fingerprint::{detect_automation, enhanced_fingerprint, legacy_fingerprint, AutomationResult, RequestSignals};
pub use jwt::{JwtConfig, JwtError, JwtService};
pub use payment::{PaymentError, PaymentGateway, ProductCatalog};
pub use payment_http::{HttpProductCatalog, StripePaymentGateway};
pub use rate_limit::{RateLimitConfig, RateLimitError, RateLimitResult, RateLimitService, RateLimitTier};
pub use session_store::{SessionStoreError, SessionStore};
pub use two_factor::{TwoFactorError, TwoFactorService};
