// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Schema version upgrades for `AppConfig` objects.
//!
//! Every `AppConfig` carries its schema version in the
//! `microservice.example.com/version` label. Older schemas encoded some settings as
//! annotations; the routines in [`UPGRADE_CHAIN`] move those into the spec and drop
//! the annotations.
//!
//! | Recorded version | Action |
//! |------------------|--------|
//! | none | stamp current, no conversion |
//! | current | nothing |
//! | known older | run its routine, stamp current |
//! | unknown | run every routine in order, stamp current |
//!
//! A performed conversion must be persisted before anything else is reconciled.

use crate::constants::CURRENT_SCHEMA_VERSION;
use crate::crd::{AppConfig, NetworkPolicySpec};
use crate::labels::{
    ANNOTATION_LEGACY_ENABLE_NETWORK_POLICY, ANNOTATION_LEGACY_SECRET_ROTATION_SOURCE,
    LABEL_SCHEMA_VERSION,
};
use tracing::{info, warn};

/// Result of [`upgrade_to_current`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Conversion {
    /// The object was modified and must be persisted.
    Performed,
    /// Nothing to persist beyond a possibly stamped label.
    NotPerformed,
}

/// Upgrade routine for one legacy schema version.
pub type UpgradeFn = fn(&mut AppConfig);

/// Legacy versions and their upgrade routines, oldest first.
pub const UPGRADE_CHAIN: &[(&str, UpgradeFn)] = &[
    ("v1alpha1", upgrade_from_v1alpha1),
    ("v1beta1", upgrade_from_v1beta1),
];

/// Recorded schema version, if any.
#[must_use]
pub fn schema_version(app: &AppConfig) -> Option<&str> {
    app.metadata
        .labels
        .as_ref()
        .and_then(|labels| labels.get(LABEL_SCHEMA_VERSION))
        .map(String::as_str)
}

fn stamp_current(app: &mut AppConfig) {
    app.metadata.labels.get_or_insert_with(Default::default).insert(
        LABEL_SCHEMA_VERSION.to_string(),
        CURRENT_SCHEMA_VERSION.to_string(),
    );
}

fn take_annotation(app: &mut AppConfig, key: &str) -> Option<String> {
    app.metadata.annotations.as_mut()?.remove(key)
}

/// v1alpha1 stored `enableNetworkPolicy: "true"` as an annotation.
pub fn upgrade_from_v1alpha1(app: &mut AppConfig) {
    let Some(raw) = take_annotation(app, ANNOTATION_LEGACY_ENABLE_NETWORK_POLICY) else {
        return;
    };
    if raw.trim().eq_ignore_ascii_case("true") {
        app.spec
            .network_policy
            .get_or_insert_with(NetworkPolicySpec::default)
            .enabled = true;
    }
    info!(resource = %app.registry_key(), "Converted legacy enableNetworkPolicy annotation");
}

/// v1beta1 stored a single rotation source as the `secretRotationSource` annotation.
pub fn upgrade_from_v1beta1(app: &mut AppConfig) {
    if app.spec.secret_rotation.is_none() {
        return;
    }
    let Some(source) = take_annotation(app, ANNOTATION_LEGACY_SECRET_ROTATION_SOURCE) else {
        return;
    };
    if let Some(rotation) = app.spec.secret_rotation.as_mut() {
        if !source.is_empty() {
            rotation.sources = vec![source];
        }
    }
    info!(resource = %app.registry_key(), "Converted legacy secretRotationSource annotation");
}

/// Bring `app` to the current schema version in place.
pub fn upgrade_to_current(app: &mut AppConfig) -> Conversion {
    let Some(version) = schema_version(app).map(str::to_string) else {
        stamp_current(app);
        return Conversion::NotPerformed;
    };
    if version == CURRENT_SCHEMA_VERSION {
        return Conversion::NotPerformed;
    }

    match UPGRADE_CHAIN.iter().find(|(v, _)| *v == version) {
        Some((_, upgrade)) => upgrade(app),
        None => {
            warn!(
                resource = %app.registry_key(),
                version = %version,
                "Unknown schema version, applying every upgrade"
            );
            for (_, upgrade) in UPGRADE_CHAIN {
                upgrade(app);
            }
        }
    }

    stamp_current(app);
    info!(
        resource = %app.registry_key(),
        from = %version,
        to = CURRENT_SCHEMA_VERSION,
        "Upgraded AppConfig schema"
    );
    Conversion::Performed
}

#[cfg(test)]
#[path = "upgrade_tests.rs"]
mod upgrade_tests;
