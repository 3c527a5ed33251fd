// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
// Version information for the Arena Node

/// Full version string with feature description
pub const VERSION: &str = "v1.0.0-consensus-settlement-2025-11-03";

/// Semantic version number
pub const VERSION_NUMBER: &str = "1.0.0";

/// Major version number
pub const VERSION_MAJOR: u32 = 1;

/// Minor version number
pub const VERSION_MINOR: u32 = 0;

/// Patch version number
pub const VERSION_PATCH: u32 = 0;

/// Build date
pub const BUILD_DATE: &str = "2025-11-03";

/// Supported features in this version
pub const FEATURES: &[&str] = &[
    "weighted-worker-selection",
    "majority-consensus",
    "local-fallback",
    "outcome-repair",
    "elo-ladder",
    "pari-mutuel-settlement",
    "scheduled-contests",
    "json-snapshots",
];

/// Get formatted version string for logging
pub fn get_version_string() -> String {
    format!("Arena Node {} ({})", VERSION_NUMBER, BUILD_DATE)
}

/// Get full version info for API responses
pub fn get_version_info() -> serde_json::Value {
    serde_json::json!({
        "version": VERSION_NUMBER,
        "build": VERSION,
        "date": BUILD_DATE,
        "features": FEATURES,
    })
}
