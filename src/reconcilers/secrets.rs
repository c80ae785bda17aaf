// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Scheduled secret rotation.
//!
//! When `spec.secretRotation.enabled` is set, the controller asks
//! [`is_rotation_due`] on every pass and calls [`rotate_secrets`] when the interval
//! has elapsed since `status.lastSecretRotationTime`.
//!
//! # Strategies
//!
//! | Strategy | Keys | Parameters (`strategyConfig`) |
//! |----------|------|-------------------------------|
//! | `default` | `username`, `password` | `passwordLength`, `username` |
//! | `database` | `db-username`, `db-password`, `db-url` | `dbType`, `dbHost`, `dbPort`, `dbName`, `passwordLength` |
//! | `api-key` | `api-key`, `api-secret` | `keyLength`, `secretLength` |
//! | `tls` | `tls.crt`, `tls.key` (placeholders) | `commonName` |
//!
//! Every map also carries `rotated-at` and `rotation-id`. Unknown strategy names
//! fall back to `default`.
//!
//! # Write semantics
//!
//! A missing secret is created with ownership metadata and rotation annotations.
//! An existing secret gets the new keys merged over its data, keeping unrelated
//! keys, and is replaced.

use crate::cluster::ClusterApi;
use crate::constants::{
    DEFAULT_API_KEY_BYTES, DEFAULT_API_SECRET_BYTES, DEFAULT_MYSQL_PORT, DEFAULT_PASSWORD_LENGTH,
    DEFAULT_POSTGRES_PORT, MAX_GENERATED_LENGTH, USERNAME_SUFFIX_BOUND,
};
use crate::context::Context;
use crate::crd::{AppConfig, SecretRotationSpec};
use crate::errors::ReconcileError;
use crate::labels::{
    ANNOTATION_ROTATION_ID, ANNOTATION_ROTATION_LAST_ROTATED, ANNOTATION_ROTATION_STRATEGY,
};
use crate::metrics;
use crate::reconcilers::finalizers::{ResourceKind, ResourceRef};
use crate::reconcilers::resources::{app_namespace, child_metadata};
use crate::reconcilers::retry::retry_with_backoff_if;
use crate::source::SourceFetcher;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::ByteString;
use rand::rngs::OsRng;
use rand::{Rng, RngCore};
use std::collections::BTreeMap;
use std::str::FromStr;
use tracing::{debug, info, warn};

/// Characters a generated password is drawn from.
pub const PASSWORD_ALPHABET: &[u8] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789!@#$%^&*()-_=+[]{}|;:,.<>?";

/// Key holding the rotation timestamp in every generated map.
pub const KEY_ROTATED_AT: &str = "rotated-at";

/// Key holding the rotation identifier in every generated map.
pub const KEY_ROTATION_ID: &str = "rotation-id";

/// Credential generation strategy.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RotationStrategy {
    Default,
    Database,
    ApiKey,
    /// Placeholder certificate material.
    Tls,
}

impl RotationStrategy {
    /// Resolve a strategy name, ignoring case. Unknown names map to [`Self::Default`].
    #[must_use]
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "default" | "" => Self::Default,
            "database" => Self::Database,
            "api-key" => Self::ApiKey,
            "tls" => Self::Tls,
            other => {
                warn!(strategy = %other, "Unknown rotation strategy, falling back to default");
                Self::Default
            }
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::Database => "database",
            Self::ApiKey => "api-key",
            Self::Tls => "tls",
        }
    }
}

/// Everything a strategy may use to generate credentials.
#[derive(Clone, Copy, Debug)]
pub struct StrategyInput<'a> {
    pub app_name: &'a str,
    pub namespace: &'a str,
    /// `spec.secretRotation.strategyConfig`
    pub params: &'a BTreeMap<String, String>,
}

impl StrategyInput<'_> {
    fn param(&self, key: &str) -> Option<&str> {
        self.params
            .get(key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    /// Numeric parameter, falling back to `default` when absent, unparseable or zero.
    fn numeric<T>(&self, key: &str, default: T) -> T
    where
        T: FromStr + PartialOrd + Default + Copy,
    {
        let Some(raw) = self.param(key) else {
            return default;
        };
        match raw.parse::<T>() {
            Ok(value) if value > T::default() => value,
            _ => {
                warn!(parameter = %key, value = %raw, "Invalid strategy parameter, using default");
                default
            }
        }
    }

    /// Length parameter, also falling back to `default` above [`MAX_GENERATED_LENGTH`].
    fn length(&self, key: &str, default: usize) -> usize {
        let value = self.numeric(key, default);
        if value > MAX_GENERATED_LENGTH {
            warn!(parameter = %key, value, max = MAX_GENERATED_LENGTH, "Strategy parameter too large, using default");
            return default;
        }
        value
    }
}

/// Rotation is due when there is no valid previous timestamp or
/// `now > last + interval_hours`. An interval past the representable date range is
/// never due.
#[must_use]
pub fn is_rotation_due(last_rotation: Option<&str>, interval_hours: u32, now: DateTime<Utc>) -> bool {
    let Some(raw) = last_rotation else {
        return true;
    };
    let last = match DateTime::parse_from_rfc3339(raw) {
        Ok(ts) => ts.with_timezone(&Utc),
        Err(e) => {
            warn!(timestamp = %raw, error = %e, "Malformed lastSecretRotationTime, rotating");
            return true;
        }
    };
    ChronoDuration::try_hours(i64::from(interval_hours))
        .and_then(|interval| last.checked_add_signed(interval))
        .is_some_and(|next| now > next)
}

/// Random password of `length` characters from [`PASSWORD_ALPHABET`], using the OS CSPRNG.
#[must_use]
pub fn generate_password(length: usize) -> String {
    (0..length)
        .map(|_| char::from(PASSWORD_ALPHABET[OsRng.gen_range(0..PASSWORD_ALPHABET.len())]))
        .collect()
}

/// Lowercase alphanumerics of `app_name`, `_`, and a random hex suffix below `0x1000`.
#[must_use]
pub fn generate_username(app_name: &str) -> String {
    let suffix = OsRng.gen_range(0..USERNAME_SUFFIX_BOUND);
    format!("{}_{suffix:x}", sanitize(app_name))
}

/// `length` random bytes, URL-safe base64 without padding.
#[must_use]
pub fn generate_token(length: usize) -> String {
    let mut bytes = vec![0u8; length];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

fn sanitize(value: &str) -> String {
    value
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

fn database_url(input: &StrategyInput<'_>) -> String {
    let db_type = match input.param("dbType").map(str::to_ascii_lowercase).as_deref() {
        None | Some("postgresql" | "postgres") => "postgresql",
        Some("mysql") => "mysql",
        Some(other) => {
            warn!(db_type = %other, "Unknown dbType, using postgresql");
            "postgresql"
        }
    };
    let default_port = if db_type == "mysql" {
        DEFAULT_MYSQL_PORT
    } else {
        DEFAULT_POSTGRES_PORT
    };
    let host = input
        .param("dbHost")
        .map_or_else(|| format!("db.{}.svc.cluster.local", input.namespace), str::to_string);
    let port: u16 = input.numeric("dbPort", default_port);
    let db_name = input
        .param("dbName")
        .map_or_else(|| sanitize(input.app_name), str::to_string);

    format!("jdbc:{db_type}://{host}:{port}/{db_name}")
}

/// Generate a fresh credential map, including `rotated-at` and `rotation-id`.
#[must_use]
pub fn generate_credentials(
    strategy: RotationStrategy,
    input: &StrategyInput<'_>,
) -> BTreeMap<String, String> {
    let password_length = input.length("passwordLength", DEFAULT_PASSWORD_LENGTH);
    let mut data = BTreeMap::new();

    match strategy {
        RotationStrategy::Default => {
            let username = input
                .param("username")
                .map_or_else(|| generate_username(input.app_name), str::to_string);
            data.insert("username".to_string(), username);
            data.insert("password".to_string(), generate_password(password_length));
        }
        RotationStrategy::Database => {
            data.insert("db-username".to_string(), generate_username(input.app_name));
            data.insert("db-password".to_string(), generate_password(password_length));
            data.insert("db-url".to_string(), database_url(input));
        }
        RotationStrategy::ApiKey => {
            data.insert(
                "api-key".to_string(),
                generate_token(input.length("keyLength", DEFAULT_API_KEY_BYTES)),
            );
            data.insert(
                "api-secret".to_string(),
                generate_token(input.length("secretLength", DEFAULT_API_SECRET_BYTES)),
            );
        }
        RotationStrategy::Tls => {
            let common_name = input.param("commonName").map_or_else(
                || format!("{}.{}.svc", input.app_name, input.namespace),
                str::to_string,
            );
            data.insert(
                "tls.crt".to_string(),
                format!("placeholder-certificate-data CN={common_name}"),
            );
            data.insert("tls.key".to_string(), "placeholder-key-data".to_string());
        }
    }

    data.insert(KEY_ROTATED_AT.to_string(), Utc::now().to_rfc3339());
    data.insert(KEY_ROTATION_ID.to_string(), uuid::Uuid::new_v4().to_string());
    data
}

fn rotation_annotations(
    credentials: &BTreeMap<String, String>,
    strategy: RotationStrategy,
) -> BTreeMap<String, String> {
    let mut annotations = BTreeMap::from([(
        ANNOTATION_ROTATION_STRATEGY.to_string(),
        strategy.as_str().to_string(),
    )]);
    if let Some(rotated_at) = credentials.get(KEY_ROTATED_AT) {
        annotations.insert(ANNOTATION_ROTATION_LAST_ROTATED.to_string(), rotated_at.clone());
    }
    if let Some(id) = credentials.get(KEY_ROTATION_ID) {
        annotations.insert(ANNOTATION_ROTATION_ID.to_string(), id.clone());
    }
    annotations
}

fn encode(credentials: BTreeMap<String, String>) -> impl Iterator<Item = (String, ByteString)> {
    credentials
        .into_iter()
        .map(|(k, v)| (k, ByteString(v.into_bytes())))
}

/// New secret holding `credentials`.
///
/// # Errors
///
/// Fails when ownership metadata cannot be derived from `app`.
pub fn build_secret(
    app: &AppConfig,
    name: &str,
    credentials: BTreeMap<String, String>,
    strategy: RotationStrategy,
) -> Result<Secret, ReconcileError> {
    let mut metadata = child_metadata(app, name)?;
    metadata.annotations = Some(rotation_annotations(&credentials, strategy));
    Ok(Secret {
        metadata,
        data: Some(encode(credentials).collect()),
        type_: Some("Opaque".to_string()),
        ..Secret::default()
    })
}

/// Merge `credentials` into `existing`: same keys overwritten, other keys kept,
/// rotation annotations refreshed.
#[must_use]
pub fn merge_into_secret(
    mut existing: Secret,
    credentials: BTreeMap<String, String>,
    strategy: RotationStrategy,
) -> Secret {
    let annotations = rotation_annotations(&credentials, strategy);
    existing
        .metadata
        .annotations
        .get_or_insert_with(BTreeMap::new)
        .extend(annotations);
    existing
        .data
        .get_or_insert_with(BTreeMap::new)
        .extend(encode(credentials));
    existing
}

/// Write fresh credentials to one secret, creating it when missing.
async fn rotate_target<C, F>(
    ctx: &Context<C, F>,
    app: &AppConfig,
    namespace: &str,
    target: &str,
    strategy: RotationStrategy,
    input: &StrategyInput<'_>,
) -> Result<(), ReconcileError>
where
    C: ClusterApi,
    F: SourceFetcher,
{
    let credentials = generate_credentials(strategy, input);

    match ctx.cluster.get::<Secret>(namespace, target).await? {
        None => {
            let secret = build_secret(app, target, credentials, strategy)?;
            ctx.cluster.create(namespace, &secret).await?;
            info!(namespace = %namespace, secret = %target, strategy = strategy.as_str(), "Created rotated secret");
            metrics::record_resource_created("Secret");
        }
        Some(existing) => {
            let secret = merge_into_secret(existing, credentials, strategy);
            ctx.cluster.replace(namespace, target, &secret).await?;
            info!(namespace = %namespace, secret = %target, strategy = strategy.as_str(), "Rotated existing secret");
            metrics::record_resource_updated("Secret");
        }
    }

    metrics::record_secret_rotation(strategy.as_str());
    Ok(())
}

/// Write fresh credentials to every rotation target of `app`.
///
/// Each target is retried on its own with the API retry policy, so a failing target
/// never rotates the ones before it a second time. Every target written is pushed
/// to `rotated`, including those written before a failure.
///
/// # Errors
///
/// Returns the first target error left after retries; later targets are skipped.
pub async fn rotate_secrets<C, F>(
    ctx: &Context<C, F>,
    app: &AppConfig,
    rotated: &mut Vec<ResourceRef>,
) -> Result<(), ReconcileError>
where
    C: ClusterApi,
    F: SourceFetcher,
{
    let default_spec = SecretRotationSpec::default();
    let spec = app.spec.secret_rotation.as_ref().unwrap_or(&default_spec);
    let namespace = app_namespace(app)?;
    let strategy = RotationStrategy::from_name(&spec.strategy);
    let input = StrategyInput {
        app_name: &app.spec.app_name,
        namespace: &namespace,
        params: &spec.strategy_config,
    };

    for target in app.rotation_targets() {
        retry_with_backoff_if(
            || rotate_target(ctx, app, &namespace, &target, strategy, &input),
            &ctx.settings.api_retry,
            ReconcileError::is_retryable,
            &format!("rotate secret {namespace}/{target}"),
        )
        .await?;
        rotated.push(ResourceRef::new(ResourceKind::Secret, namespace.as_str(), target));
    }

    debug!(namespace = %namespace, count = rotated.len(), "Secret rotation complete");
    Ok(())
}

#[cfg(test)]
#[path = "secrets_tests.rs"]
mod secrets_tests;
