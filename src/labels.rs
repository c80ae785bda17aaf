// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Common label and annotation constants used across all reconcilers.
//!
//! This module defines standard Kubernetes labels and operator-specific
//! labels/annotations to ensure consistency across all resources created by
//! the controller.

// ============================================================================
// Kubernetes Standard Labels
// https://kubernetes.io/docs/concepts/overview/working-with-objects/common-labels/
// ============================================================================

/// Standard label for the tool being used to manage the operation of an application
pub const K8S_MANAGED_BY: &str = "app.kubernetes.io/managed-by";

/// Value for `app.kubernetes.io/managed-by` on every child resource of an `AppConfig`
pub const MANAGED_BY_APPCONFIG_OPERATOR: &str = "microservice-bootstrap-operator";

/// Plain `app` label carrying the application name; also the network policy pod selector
pub const LABEL_APP: &str = "app";

// ============================================================================
// AppConfig Labels
// ============================================================================

/// Schema version recorded on an `AppConfig`
pub const LABEL_SCHEMA_VERSION: &str = "microservice.example.com/version";

// ============================================================================
// Finalizers
// ============================================================================

/// Finalizer guarding `AppConfig` deletion until child cleanup ran
pub const FINALIZER_APP_CONFIG: &str = "microservice.example.com/finalizer";

// ============================================================================
// Legacy Annotations (consumed by the schema upgrader)
// ============================================================================

/// `v1alpha1` boolean annotation that became `spec.networkPolicy.enabled`
pub const ANNOTATION_LEGACY_ENABLE_NETWORK_POLICY: &str = "enableNetworkPolicy";

/// `v1beta1` single-value annotation that became `spec.secretRotation.sources`
pub const ANNOTATION_LEGACY_SECRET_ROTATION_SOURCE: &str = "secretRotationSource";

// ============================================================================
// Secret Rotation Annotations
// ============================================================================

/// Timestamp of the last rotation written to a managed secret
pub const ANNOTATION_ROTATION_LAST_ROTATED: &str = "secretRotation.microservice.github.io/last-rotated";

/// Identifier of the last rotation written to a managed secret
pub const ANNOTATION_ROTATION_ID: &str = "secretRotation.microservice.github.io/rotation-id";

/// Strategy that produced the current secret contents
pub const ANNOTATION_ROTATION_STRATEGY: &str = "secretRotation.microservice.github.io/strategy";
