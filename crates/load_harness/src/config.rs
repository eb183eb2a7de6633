//! Scenario definitions and the `LoadTestConfig` they expand into
//! (spec.md §4.6, grounded in
//! `original_source/services/voice-gateway/tests/load/config.py`'s
//! `TestScenario` / `LoadTestConfig.from_scenario`).

use std::time::Duration;

use clap::ValueEnum;

/// How a virtual user picks its next audio file from the shared pool
/// (spec.md §4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
#[value(rename_all = "kebab-case")]
pub enum SelectionStrategy {
    RoundRobin,
    Random,
    Sequential,
}

/// Pre-defined load test scenarios (spec.md §4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
#[value(rename_all = "kebab-case")]
pub enum Scenario {
    Baseline,
    Light,
    Medium,
    Heavy,
    Spike,
    Endurance,
}

impl Scenario {
    /// The (max_users, ramp_up, hold, ramp_down, requests_per_user, think_time)
    /// tuple for this scenario, verbatim from spec.md §4.6 / §2 C6.
    fn defaults(self) -> ScenarioDefaults {
        match self {
            Scenario::Baseline => ScenarioDefaults {
                max_users: 1,
                ramp_up: Duration::ZERO,
                hold: Duration::from_secs(30),
                ramp_down: Duration::ZERO,
                requests_per_user: 10,
                think_time: Duration::from_secs(2),
            },
            Scenario::Light => ScenarioDefaults {
                max_users: 5,
                ramp_up: Duration::from_secs(10),
                hold: Duration::from_secs(120),
                ramp_down: Duration::from_secs(5),
                requests_per_user: 0,
                think_time: Duration::from_secs(2),
            },
            Scenario::Medium => ScenarioDefaults {
                max_users: 20,
                ramp_up: Duration::from_secs(30),
                hold: Duration::from_secs(300),
                ramp_down: Duration::from_secs(10),
                requests_per_user: 0,
                think_time: Duration::from_millis(1500),
            },
            Scenario::Heavy => ScenarioDefaults {
                max_users: 50,
                ramp_up: Duration::from_secs(60),
                hold: Duration::from_secs(300),
                ramp_down: Duration::from_secs(15),
                requests_per_user: 0,
                think_time: Duration::from_secs(1),
            },
            Scenario::Spike => ScenarioDefaults {
                max_users: 100,
                ramp_up: Duration::from_secs(5),
                hold: Duration::from_secs(30),
                ramp_down: Duration::from_secs(5),
                requests_per_user: 0,
                think_time: Duration::from_millis(500),
            },
            Scenario::Endurance => ScenarioDefaults {
                max_users: 20,
                ramp_up: Duration::from_secs(30),
                hold: Duration::from_secs(1800),
                ramp_down: Duration::from_secs(10),
                requests_per_user: 0,
                think_time: Duration::from_secs(3),
            },
        }
    }
}

struct ScenarioDefaults {
    max_users: u32,
    ramp_up: Duration,
    hold: Duration,
    ramp_down: Duration,
    requests_per_user: u32,
    think_time: Duration,
}

/// Fully resolved load test configuration (spec.md §4.6).
#[derive(Debug, Clone)]
pub struct LoadTestConfig {
    pub target_url: String,
    pub audio_dir: String,
    pub sample_rate: u32,
    pub language_code: String,
    pub strategy: SelectionStrategy,

    pub max_users: u32,
    pub ramp_up: Duration,
    pub hold: Duration,
    pub ramp_down: Duration,

    /// 0 means unlimited (run until `hold` elapses).
    pub requests_per_user: u32,
    pub think_time: Duration,
    pub request_timeout: Duration,

    pub chunk_size: usize,
    pub chunk_delay: Duration,

    pub output_file: Option<String>,
}

impl LoadTestConfig {
    pub fn from_scenario(scenario: Scenario, target_url: String, audio_dir: String) -> Self {
        let d = scenario.defaults();
        Self {
            target_url,
            audio_dir,
            sample_rate: 16_000,
            language_code: "en-US".to_string(),
            strategy: SelectionStrategy::RoundRobin,
            max_users: d.max_users,
            ramp_up: d.ramp_up,
            hold: d.hold,
            ramp_down: d.ramp_down,
            requests_per_user: d.requests_per_user,
            think_time: d.think_time,
            request_timeout: Duration::from_secs(60),
            chunk_size: 4096,
            chunk_delay: Duration::from_millis(10),
            output_file: None,
        }
    }

    /// Total wall-clock duration of the ramp-up/hold/ramp-down schedule.
    pub fn total_duration(&self) -> Duration {
        self.ramp_up + self.hold + self.ramp_down
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn baseline_matches_spec() {
        let cfg = LoadTestConfig::from_scenario(Scenario::Baseline, "ws://x".to_string(), "./audio".to_string());
        assert_eq!(cfg.max_users, 1);
        assert_eq!(cfg.requests_per_user, 10);
        assert_eq!(cfg.hold, Duration::from_secs(30));
    }

    #[test]
    fn spike_ramps_up_fast_to_a_hundred_users() {
        let cfg = LoadTestConfig::from_scenario(Scenario::Spike, "ws://x".to_string(), "./audio".to_string());
        assert_eq!(cfg.max_users, 100);
        assert_eq!(cfg.ramp_up, Duration::from_secs(5));
        assert_eq!(cfg.hold, Duration::from_secs(30));
    }

    #[test]
    fn endurance_holds_for_thirty_minutes() {
        let cfg = LoadTestConfig::from_scenario(Scenario::Endurance, "ws://x".to_string(), "./audio".to_string());
        assert_eq!(cfg.hold, Duration::from_secs(1800));
    }

    #[test]
    fn total_duration_sums_all_three_phases() {
        let cfg = LoadTestConfig::from_scenario(Scenario::Light, "ws://x".to_string(), "./audio".to_string());
        assert_eq!(cfg.total_duration(), cfg.ramp_up + cfg.hold + cfg.ramp_down);
    }
}
