// Application state shared across handlers.
use std::sync::Arc;

use crate::{
    app_config::AppConfig,
    db::DieselPool,
    services::{
        encryption::FieldCipher,
        failed_login::FailedLoginTracker,
        payment::{PaymentGateway, ProductCatalog},
        AuditWriter, EmailService, JwtService, RateLimitService, TwoFactorService,
    },
    RedisPool,
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub diesel_pool: DieselPool,
    pub redis_pool: RedisPool,
    pub jwt_service: Arc<JwtService>,
    pub rate_limit_service: Arc<RateLimitService>,
    pub failed_login_tracker: Arc<FailedLoginTracker>,
    pub audit_writer: Arc<AuditWriter>,
    pub two_factor_service: Arc<TwoFactorService>,
    pub field_cipher: Arc<FieldCipher>,
    pub email_service: Arc<EmailService>,
    pub payment_gateway: Arc<dyn PaymentGateway>,
    pub product_catalog: Arc<dyn ProductCatalog>,
}
