//! BLE Advertising
//!
//! Builds the advertise request from settings and tracks which attempt the
//! platform's completion callback belongs to.

use crate::domain::error::PlatformError;
use crate::domain::models::{AdvertiseConfig, AdvertiseOutcome, AdvertisingStatus};
use crate::domain::settings::AdvertisingSettings;
use crate::infrastructure::bluetooth::protocol;
use anyhow::Result;
use tracing::{error, info};

/// Advertise failure codes as reported by the platform
pub mod failure_code {
    pub const DATA_TOO_LARGE: i32 = 1;
    pub const TOO_MANY_ADVERTISERS: i32 = 2;
    pub const ALREADY_STARTED: i32 = 3;
    pub const INTERNAL_ERROR: i32 = 4;
    pub const FEATURE_UNSUPPORTED: i32 = 5;

    /// Human readable reason for a failure code
    pub fn describe(code: i32) -> &'static str {
        match code {
            DATA_TOO_LARGE => "advertise data too large",
            TOO_MANY_ADVERTISERS => "too many advertisers",
            ALREADY_STARTED => "advertising already started",
            INTERNAL_ERROR => "internal error",
            FEATURE_UNSUPPORTED => "advertising not supported",
            _ => "unknown error",
        }
    }
}

/// Build the platform request from the configured advertising settings
pub fn advertise_config(settings: &AdvertisingSettings) -> Result<AdvertiseConfig> {
    Ok(AdvertiseConfig {
        mode: settings.mode,
        tx_power: settings.tx_power,
        connectable: settings.connectable,
        include_device_name: settings.include_device_name,
        service_uuid: protocol::parse_service_uuid(&settings.service_uuid)?,
    })
}

/// Latest advertising status plus the attempt it belongs to
#[derive(Debug, Default)]
pub struct AdvertisingTracker {
    status: AdvertisingStatus,
    attempt: u64,
}

impl AdvertisingTracker {
    pub fn status(&self) -> AdvertisingStatus {
        self.status
    }

    /// Start a new attempt and return its id
    pub fn begin(&mut self) -> u64 {
        self.attempt += 1;
        self.status = AdvertisingStatus::Pending;
        self.attempt
    }

    pub fn deny(&mut self) {
        self.status = AdvertisingStatus::PermissionDenied;
    }

    /// Record an immediate platform refusal for `attempt`
    pub fn reject(&mut self, attempt: u64, err: &PlatformError) {
        if attempt != self.attempt {
            return;
        }
        error!("BLE Advertising could not start: {}", err);
        self.status = match err {
            PlatformError::Failed { code } => AdvertisingStatus::Failed(*code),
            PlatformError::NotRegistered | PlatformError::Rejected(_) => AdvertisingStatus::Unsupported,
        };
    }

    /// Record the completion callback for `attempt`. Completions for an
    /// attempt that has since been superseded are ignored.
    pub fn complete(&mut self, attempt: u64, outcome: AdvertiseOutcome) {
        if attempt != self.attempt {
            info!("Ignoring completion of superseded advertise attempt {}", attempt);
            return;
        }
        self.status = match outcome {
            AdvertiseOutcome::Success => {
                info!("BLE Advertising started successfully");
                AdvertisingStatus::Active
            }
            AdvertiseOutcome::Failure(code) => {
                error!(
                    "BLE Advertising failed: {} ({})",
                    failure_code::describe(code),
                    code
                );
                AdvertisingStatus::Failed(code)
            }
        };
    }
}
