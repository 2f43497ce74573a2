// @generated manually, kept in the Diesel CLI style this codebase otherwise uses.

diesel::table! {
    use diesel::sql_types::*;
    use diesel::pg::sql_types::*;

    users (id) {
        id -> Uuid,
        #[max_length = 320]
        email -> Varchar,
        password_hash -> Text,
        #[max_length = 20]
        role -> Varchar,
        #[max_length = 20]
        provider -> Varchar,
        token_version -> Int4,
        is_active -> Bool,
        email_verified -> Bool,
        #[max_length = 64]
        email_verification_token -> Nullable<Varchar>,
        email_verification_expires_at -> Nullable<Timestamptz>,
        #[max_length = 64]
        password_reset_token -> Nullable<Varchar>,
        password_reset_expires_at -> Nullable<Timestamptz>,
        password_history -> Jsonb,
        two_factor_enabled -> Bool,
        two_factor_secret_encrypted -> Nullable<Bytea>,
        two_factor_backup_codes -> Jsonb,
        #[max_length = 64]
        two_factor_temp_token -> Nullable<Varchar>,
        two_factor_temp_token_expires_at -> Nullable<Timestamptz>,
        failed_login_attempts -> Int4,
        account_locked_until -> Nullable<Timestamptz>,
        trusted_devices -> Jsonb,
        login_history -> Jsonb,
        #[max_length = 255]
        full_name -> Varchar,
        last_password_change -> Nullable<Timestamptz>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    use diesel::sql_types::*;
    use diesel::pg::sql_types::*;

    refresh_sessions (id) {
        id -> Uuid,
        user_id -> Uuid,
        #[max_length = 64]
        token_hash -> Varchar,
        #[max_length = 64]
        family -> Varchar,
        #[max_length = 255]
        device_id -> Nullable<Varchar>,
        #[max_length = 255]
        device_name -> Nullable<Varchar>,
        user_agent -> Nullable<Text>,
        ip_address -> Nullable<Text>,
        location -> Nullable<Text>,
        created_at -> Timestamptz,
        last_used_at -> Nullable<Timestamptz>,
        expires_at -> Timestamptz,
        revoked -> Bool,
        #[max_length = 64]
        revoked_reason -> Nullable<Varchar>,
        revoked_at -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    use diesel::sql_types::*;
    use diesel::pg::sql_types::*;

    audit_logs (id) {
        id -> Uuid,
        timestamp -> Timestamptz,
        #[max_length = 64]
        event_type -> Varchar,
        user_id -> Nullable<Uuid>,
        #[max_length = 128]
        action -> Varchar,
        #[max_length = 128]
        resource -> Varchar,
        #[max_length = 255]
        resource_id -> Nullable<Varchar>,
        changes -> Nullable<Jsonb>,
        metadata -> Jsonb,
        #[max_length = 16]
        result -> Varchar,
        error_message -> Nullable<Text>,
        risk_score -> Nullable<Int4>,
        #[max_length = 64]
        signature -> Varchar,
        #[max_length = 64]
        previous_hash -> Nullable<Varchar>,
    }
}

diesel::table! {
    use diesel::sql_types::*;
    use diesel::pg::sql_types::*;

    orders (id) {
        id -> Uuid,
        user_id -> Uuid,
        items -> Jsonb,
        total_amount -> Int4,
        #[max_length = 3]
        currency -> Varchar,
        #[max_length = 20]
        status -> Varchar,
        #[max_length = 255]
        payment_intent_id -> Nullable<Varchar>,
        #[max_length = 255]
        client_secret -> Nullable<Varchar>,
        shipping_address -> Nullable<Jsonb>,
        ip_address -> Nullable<Text>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::joinable!(refresh_sessions -> users (user_id));
diesel::joinable!(orders -> users (user_id));

diesel::allow_tables_to_appear_in_same_query!(
    audit_logs,
    orders,
    refresh_sessions,
    users,
);
