// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

use crate::error::{LoomError, Result};

use super::Settings;

impl Settings {
    /// Reject values the rest of the crate cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.indexer.extensions.is_empty() {
            return Err(LoomError::Config(
                "indexer.extensions must list at least one extension".into(),
            ));
        }
        if self.storage.connect_attempts == 0 {
            return Err(LoomError::Config(
                "storage.connect_attempts must be at least 1".into(),
            ));
        }
        if self.storage.base_delay_ms > self.storage.max_delay_ms {
            return Err(LoomError::Config(format!(
                "storage.base_delay_ms ({}) exceeds storage.max_delay_ms ({})",
                self.storage.base_delay_ms, self.storage.max_delay_ms
            )));
        }
        if self.session.undo_capacity == 0 {
            return Err(LoomError::Config(
                "session.undo_capacity must be at least 1".into(),
            ));
        }
        let threshold = self.session.compression_threshold;
        if !(0.0..=1.0).contains(&threshold) || threshold.is_nan() {
            return Err(LoomError::Config(format!(
                "session.compression_threshold must be within 0..=1, got {}",
                threshold
            )));
        }
        if self.session.context_window_tokens == 0 {
            return Err(LoomError::Config(
                "session.context_window_tokens must be positive".into(),
            ));
        }
        if self.agent.max_tool_rounds == 0 {
            return Err(LoomError::Config(
                "agent.max_tool_rounds must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings_are_valid() {
        assert!(Settings::default().validate().is_ok());
    }

    #[test]
    fn test_zero_undo_capacity_rejected() {
        let mut settings = Settings::default();
        settings.session.undo_capacity = 0;
        let err = settings.validate().unwrap_err();
        assert!(err.to_string().contains("undo_capacity"));
    }

    #[test]
    fn test_backoff_order_rejected() {
        let mut settings = Settings::default();
        settings.storage.base_delay_ms = 5000;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_empty_extensions_rejected() {
        let mut settings = Settings::default();
        settings.indexer.extensions.clear();
        assert!(settings.validate().is_err());
    }
}
