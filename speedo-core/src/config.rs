//! Environment configuration of a speedo node
use envconfig::Envconfig;

use crate::window::{
    EngineSettings, ShardRouting, SlidingWindows, WatermarkPolicy, WindowConfigError,
};

#[derive(Debug, Envconfig)]
pub struct SpeedoConfig {
    #[envconfig(nested)]
    pub window: WindowConfig,

    #[envconfig(nested)]
    pub engine: EngineConfig,

    #[envconfig(nested)]
    pub control: ControlConfig,
}

#[derive(Debug, Envconfig)]
pub struct WindowConfig {
    /// Length of a window in milliseconds
    #[envconfig(from = "SPEEDO_WINDOW_SIZE_MS", default = "300000")]
    pub size_ms: i64,
    /// Distance between window starts in milliseconds
    #[envconfig(from = "SPEEDO_WINDOW_SLIDE_MS", default = "60000")]
    pub slide_ms: i64,
    /// How far behind the latest event time samples are still accepted
    #[envconfig(from = "SPEEDO_ALLOWED_LAG_MS", default = "0")]
    pub allowed_lag_ms: i64,
    /// Only advance the watermark when a new slide frame is entered
    #[envconfig(from = "SPEEDO_EMIT_BY_FRAME", default = "true")]
    pub emit_by_frame: bool,
}

#[derive(Debug, Envconfig)]
pub struct EngineConfig {
    /// Worker shards of the windowing engine
    #[envconfig(from = "SPEEDO_SHARDS", default = "4")]
    pub shards: usize,
    /// `key` or `round-robin`
    #[envconfig(from = "SPEEDO_SHARD_ROUTING", default = "key")]
    pub routing: ShardRouting,
    /// max messages queued per shard
    #[envconfig(from = "SPEEDO_CHANNEL_CAPACITY", default = "1024")]
    pub channel_capacity: usize,
}

#[derive(Debug, Envconfig)]
pub struct ControlConfig {
    /// Serialized dispatcher partitions
    #[envconfig(from = "SPEEDO_DISPATCH_PARTITIONS", default = "3")]
    pub dispatch_partitions: usize,
    /// Log every change of the position namespace
    #[envconfig(from = "SPEEDO_LOG_POSITIONS", default = "false")]
    pub log_positions: bool,
}

impl Default for SpeedoConfig {
    fn default() -> Self {
        Self {
            window: WindowConfig {
                size_ms: 300_000,
                slide_ms: 60_000,
                allowed_lag_ms: 0,
                emit_by_frame: true,
            },
            engine: EngineConfig {
                shards: 4,
                routing: ShardRouting::Key,
                channel_capacity: 1024,
            },
            control: ControlConfig {
                dispatch_partitions: 3,
                log_positions: false,
            },
        }
    }
}

impl WindowConfig {
    pub fn sliding_windows(&self) -> Result<SlidingWindows, WindowConfigError> {
        SlidingWindows::from_millis(self.size_ms, self.slide_ms)
    }

    pub fn watermark_policy(&self, windows: &SlidingWindows) -> WatermarkPolicy {
        let policy = WatermarkPolicy::with_fixed_lag(self.allowed_lag_ms);
        if self.emit_by_frame {
            policy.emit_by_frame(windows)
        } else {
            policy
        }
    }
}

impl SpeedoConfig {
    /// Validated settings of the windowing engine
    pub fn engine_settings(&self) -> Result<EngineSettings, WindowConfigError> {
        let windows = self.window.sliding_windows()?;
        Ok(EngineSettings::builder()
            .windows(windows)
            .watermark(self.window.watermark_policy(&windows))
            .shards(self.engine.shards)
            .routing(self.engine.routing)
            .channel_capacity(self.engine.channel_capacity)
            .build())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn environment_defaults_match_default() {
        let from_env = SpeedoConfig::init_from_hashmap(&HashMap::new()).unwrap();
        let default = SpeedoConfig::default();
        assert_eq!(from_env.window.size_ms, default.window.size_ms);
        assert_eq!(from_env.window.slide_ms, default.window.slide_ms);
        assert_eq!(from_env.window.allowed_lag_ms, default.window.allowed_lag_ms);
        assert_eq!(from_env.window.emit_by_frame, default.window.emit_by_frame);
        assert_eq!(from_env.engine.shards, default.engine.shards);
        assert_eq!(from_env.engine.routing, default.engine.routing);
        assert_eq!(
            from_env.engine.channel_capacity,
            default.engine.channel_capacity
        );
        assert_eq!(
            from_env.control.dispatch_partitions,
            default.control.dispatch_partitions
        );
        assert_eq!(from_env.control.log_positions, default.control.log_positions);
    }

    #[test]
    fn reads_overrides() {
        let env = HashMap::from([
            ("SPEEDO_WINDOW_SIZE_MS".to_owned(), "120000".to_owned()),
            ("SPEEDO_WINDOW_SLIDE_MS".to_owned(), "30000".to_owned()),
            ("SPEEDO_SHARD_ROUTING".to_owned(), "round-robin".to_owned()),
            ("SPEEDO_SHARDS".to_owned(), "2".to_owned()),
        ]);
        let config = SpeedoConfig::init_from_hashmap(&env).unwrap();
        let settings = config.engine_settings().unwrap();
        assert_eq!(settings.windows().size(), 120_000);
        assert_eq!(settings.windows().slide(), 30_000);
        assert_eq!(settings.windows().windows_per_sample(), 4);
        assert_eq!(settings.routing(), ShardRouting::RoundRobin);
        assert_eq!(settings.shards(), 2);
    }

    #[test]
    fn rejects_invalid_windows() {
        let mut config = SpeedoConfig::default();
        config.window.slide_ms = 0;
        assert!(matches!(
            config.engine_settings(),
            Err(WindowConfigError::NonPositiveSlide(0))
        ));
    }

    #[test]
    fn rejects_unknown_routing() {
        let env = HashMap::from([("SPEEDO_SHARD_ROUTING".to_owned(), "random".to_owned())]);
        assert!(SpeedoConfig::init_from_hashmap(&env).is_err());
    }
}
