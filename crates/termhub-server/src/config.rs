//! Command-line and environment configuration.

use std::net::SocketAddr;
use std::time::Duration;

use clap::Parser;
use termhub_pty::RegistryConfig;

#[derive(Debug, Clone, Parser)]
#[command(name = "termhub", version, about = "Remote multiplexed terminal sessions over HTTP")]
pub struct Config {
    /// Address to listen on
    #[arg(long, env = "TERMHUB_BIND", default_value = "127.0.0.1:8000")]
    pub bind: SocketAddr,

    /// Seconds of inactivity before a session is reaped
    #[arg(long, env = "TERMHUB_SESSION_TIMEOUT_SECS", default_value_t = 1800)]
    pub session_timeout_secs: u64,

    /// Sessions a single caller may own at once
    #[arg(long, env = "TERMHUB_MAX_SESSIONS_PER_CALLER", default_value_t = 20)]
    pub max_sessions_per_caller: usize,

    /// Output chunks retained per session
    #[arg(long, env = "TERMHUB_MAX_OUTPUT_CHUNKS", default_value_t = 10_000)]
    pub max_output_chunks: usize,

    /// Read timeout of the per-session pump loop, in milliseconds
    #[arg(
        long,
        env = "TERMHUB_POLL_INTERVAL_MS",
        default_value_t = 100,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub poll_interval_ms: u64,

    /// How often streaming connections check for new output, in milliseconds
    #[arg(
        long,
        env = "TERMHUB_STREAM_INTERVAL_MS",
        default_value_t = 50,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub stream_interval_ms: u64,

    /// Seconds between idle-session sweeps
    #[arg(
        long,
        env = "TERMHUB_REAP_INTERVAL_SECS",
        default_value_t = 60,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub reap_interval_secs: u64,
}

impl Config {
    pub fn registry_config(&self) -> RegistryConfig {
        RegistryConfig {
            session_timeout: Duration::from_secs(self.session_timeout_secs),
            max_sessions_per_caller: self.max_sessions_per_caller,
            max_output_chunks: self.max_output_chunks,
            read_timeout: Duration::from_millis(self.poll_interval_ms),
            reap_interval: Duration::from_secs(self.reap_interval_secs),
        }
    }

    pub fn stream_interval(&self) -> Duration {
        Duration::from_millis(self.stream_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_defaults() {
        let config = Config::try_parse_from([
            "termhub",
            "--bind",
            "0.0.0.0:9100",
            "--session-timeout-secs",
            "60",
            "--max-sessions-per-caller",
            "3",
            "--max-output-chunks",
            "500",
            "--poll-interval-ms",
            "25",
            "--stream-interval-ms",
            "10",
            "--reap-interval-secs",
            "5",
        ])
        .unwrap();

        assert_eq!(config.bind, "0.0.0.0:9100".parse::<SocketAddr>().unwrap());
        assert_eq!(config.stream_interval(), Duration::from_millis(10));

        let registry = config.registry_config();
        assert_eq!(registry.session_timeout, Duration::from_secs(60));
        assert_eq!(registry.max_sessions_per_caller, 3);
        assert_eq!(registry.max_output_chunks, 500);
        assert_eq!(registry.read_timeout, Duration::from_millis(25));
        assert_eq!(registry.reap_interval, Duration::from_secs(5));
    }

    #[test]
    fn test_rejects_invalid_bind_address() {
        assert!(Config::try_parse_from(["termhub", "--bind", "not-an-address"]).is_err());
    }

    #[test]
    fn test_rejects_zero_intervals() {
        for flag in ["--poll-interval-ms", "--stream-interval-ms", "--reap-interval-secs"] {
            let result = Config::try_parse_from(["termhub", flag, "0"]);
            assert!(result.is_err(), "{flag} 0 was accepted");
        }
        assert!(Config::try_parse_from(["termhub", "--poll-interval-ms", "1"]).is_ok());
    }

    #[test]
    fn test_command_definition() {
        use clap::CommandFactory;
        Config::command().debug_assert();
    }
}
