//! Server configuration.
//!
//! Every option is a CLI flag; the connection-level ones also fall back to
//! `DENGON_*` environment variables.

use std::{str::FromStr, time::Duration};

use clap::Parser;
use thiserror::Error;

use crate::{
    domain::{ChatId, UserId},
    infrastructure::{
        bridge::{DEFAULT_PUBLISH_TIMEOUT, DEFAULT_TOPIC},
        rate_limiter::RateLimitPolicy,
    },
};

/// Minimum length of the token signing secret
pub const MIN_JWT_SECRET_BYTES: usize = 32;

/// Invalid configuration
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("JWT secret must be at least {min} bytes (got {actual})")]
    SecretTooShort { min: usize, actual: usize },

    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    #[error("redis url must start with redis:// or rediss:// (got {0})")]
    InvalidRedisUrl(String),

    #[error("invalid chat seed '{0}', expected <chat_id>=<user_id>,<user_id>,...")]
    InvalidChatSeed(String),
}

/// Chat created in the in-memory store at startup: `<chat_id>=<user_id>,...`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatSeed {
    pub chat: ChatId,
    pub members: Vec<UserId>,
}

impl FromStr for ChatSeed {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ConfigError::InvalidChatSeed(s.to_string());
        let (chat, members) = s.split_once('=').ok_or_else(invalid)?;
        let chat = chat.trim().parse::<u64>().map_err(|_| invalid())?;
        let members = members
            .split(',')
            .map(|member| member.trim().parse::<u64>().map(UserId::new))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| invalid())?;
        Ok(Self {
            chat: ChatId::new(chat),
            members,
        })
    }
}

/// Command-line and environment configuration of one server instance
#[derive(Debug, Clone, Parser)]
#[command(name = "dengon-server", version, about = "Real-time chat delivery server")]
pub struct ServerConfig {
    /// Address to bind
    #[arg(long, env = "DENGON_HOST", default_value = "127.0.0.1")]
    pub host: String,

    /// Port to bind (0 picks a free port)
    #[arg(short, long, env = "DENGON_PORT", default_value_t = 8080)]
    pub port: u16,

    /// HMAC secret used to verify session tokens
    #[arg(long, env = "DENGON_JWT_SECRET", hide_env_values = true)]
    pub jwt_secret: String,

    /// Redis URL for the cross-instance bridge; in-process bus when absent
    #[arg(long, env = "DENGON_REDIS_URL")]
    pub redis_url: Option<String>,

    /// Pub/sub topic shared by all instances
    #[arg(long, default_value = DEFAULT_TOPIC)]
    pub bridge_topic: String,

    /// Milliseconds allowed for one bridge publish before it is dropped
    #[arg(long, default_value_t = DEFAULT_PUBLISH_TIMEOUT.as_millis() as u64)]
    pub bridge_publish_timeout_ms: u64,

    /// Outbound frames buffered per session before it is evicted
    #[arg(long, default_value_t = 256)]
    pub mailbox_capacity: usize,

    /// Largest inbound frame accepted, in bytes
    #[arg(long, default_value_t = 512 * 1024)]
    pub max_message_bytes: usize,

    /// Seconds without a pong before a session is considered dead
    #[arg(long, default_value_t = 60)]
    pub pong_wait_secs: u64,

    /// Seconds allowed for a single write to complete
    #[arg(long, default_value_t = 10)]
    pub write_wait_secs: u64,

    /// Failed handshakes allowed per window
    #[arg(long, default_value_t = 5)]
    pub login_max_attempts: u32,

    /// Failure counting window, in seconds
    #[arg(long, default_value_t = 900)]
    pub login_window_secs: u64,

    /// Lockout duration, in seconds
    #[arg(long, default_value_t = 900)]
    pub login_lockout_secs: u64,

    /// Interval between rate-limit cleanup sweeps, in seconds
    #[arg(long, default_value_t = 60)]
    pub login_sweep_secs: u64,

    /// Seed a chat in the in-memory store, e.g. `--chat 1=7,8,9` (repeatable)
    #[arg(long = "chat", value_name = "ID=MEMBERS")]
    pub chats: Vec<ChatSeed>,
}

/// Per-session timing and sizing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    pub write_wait: Duration,
    pub pong_wait: Duration,
    /// Always shorter than `pong_wait`
    pub ping_period: Duration,
    pub max_message_bytes: usize,
    pub mailbox_capacity: usize,
}

impl SessionConfig {
    /// Derive the ping period (9/10 of `pong_wait`) from the other settings.
    pub fn new(
        write_wait: Duration,
        pong_wait: Duration,
        max_message_bytes: usize,
        mailbox_capacity: usize,
    ) -> Self {
        Self {
            write_wait,
            pong_wait,
            ping_period: pong_wait * 9 / 10,
            max_message_bytes,
            mailbox_capacity,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::new(
            Duration::from_secs(10),
            Duration::from_secs(60),
            512 * 1024,
            256,
        )
    }
}

impl ServerConfig {
    /// Reject values the server cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.jwt_secret.len() < MIN_JWT_SECRET_BYTES {
            return Err(ConfigError::SecretTooShort {
                min: MIN_JWT_SECRET_BYTES,
                actual: self.jwt_secret.len(),
            });
        }

        let positive = [
            ("mailbox-capacity", self.mailbox_capacity as u64),
            ("max-message-bytes", self.max_message_bytes as u64),
            ("pong-wait-secs", self.pong_wait_secs),
            ("write-wait-secs", self.write_wait_secs),
            ("bridge-publish-timeout-ms", self.bridge_publish_timeout_ms),
            ("login-max-attempts", u64::from(self.login_max_attempts)),
            ("login-window-secs", self.login_window_secs),
            ("login-lockout-secs", self.login_lockout_secs),
            ("login-sweep-secs", self.login_sweep_secs),
        ];
        if let Some((name, _)) = positive.iter().find(|(_, value)| *value == 0) {
            return Err(ConfigError::Zero(*name));
        }

        if let Some(url) = &self.redis_url
            && !(url.starts_with("redis://") || url.starts_with("rediss://"))
        {
            return Err(ConfigError::InvalidRedisUrl(url.clone()));
        }

        Ok(())
    }

    /// `host:port` to bind.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig::new(
            Duration::from_secs(self.write_wait_secs),
            Duration::from_secs(self.pong_wait_secs),
            self.max_message_bytes,
            self.mailbox_capacity,
        )
    }

    pub fn bridge_publish_timeout(&self) -> Duration {
        Duration::from_millis(self.bridge_publish_timeout_ms)
    }

    pub fn rate_limit_policy(&self) -> RateLimitPolicy {
        RateLimitPolicy {
            max_attempts: self.login_max_attempts,
            window: Duration::from_secs(self.login_window_secs),
            lockout: Duration::from_secs(self.login_lockout_secs),
            sweep_interval: Duration::from_secs(self.login_sweep_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "0123456789abcdef0123456789abcdef";

    fn parse(args: &[&str]) -> ServerConfig {
        let mut argv = vec!["dengon-server", "--jwt-secret", SECRET];
        argv.extend_from_slice(args);
        ServerConfig::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_defaults() {
        // テスト項目: 指定がなければ既定値が使われる
        // when (操作):
        let config = parse(&[]);

        // then (期待する結果):
        assert!(config.validate().is_ok());
        assert_eq!(config.bridge_topic, "dengon:fanout");
        assert_eq!(config.bridge_publish_timeout(), DEFAULT_PUBLISH_TIMEOUT);
        let session = config.session_config();
        assert_eq!(session.write_wait, Duration::from_secs(10));
        assert_eq!(session.pong_wait, Duration::from_secs(60));
        assert_eq!(session.ping_period, Duration::from_secs(54));
        assert_eq!(session.max_message_bytes, 512 * 1024);
        assert_eq!(session.mailbox_capacity, 256);
        assert_eq!(config.rate_limit_policy(), RateLimitPolicy::default());
    }

    #[test]
    fn test_ping_period_is_shorter_than_pong_wait() {
        // テスト項目: ping 間隔は常に pong 待ち時間より短い
        // when (操作):
        let session = parse(&["--pong-wait-secs", "1"]).session_config();

        // then (期待する結果):
        assert_eq!(session.ping_period, Duration::from_millis(900));
        assert!(session.ping_period < session.pong_wait);
    }

    #[test]
    fn test_short_secret_is_rejected() {
        // テスト項目: 短すぎる署名鍵は設定エラーになる
        // given (前提条件):
        let config =
            ServerConfig::try_parse_from(["dengon-server", "--jwt-secret", "short"]).unwrap();

        // when (操作):
        let result = config.validate();

        // then (期待する結果):
        assert_eq!(
            result,
            Err(ConfigError::SecretTooShort { min: 32, actual: 5 })
        );
    }

    #[test]
    fn test_zero_values_are_rejected() {
        // テスト項目: 0 を許さない設定値に 0 を指定すると設定エラーになる
        // when (操作):
        let result = parse(&["--mailbox-capacity", "0"]).validate();

        // then (期待する結果):
        assert_eq!(result, Err(ConfigError::Zero("mailbox-capacity")));
    }

    #[test]
    fn test_chat_seeds_are_parsed() {
        // テスト項目: --chat で指定したチャットとメンバーが読み込まれる
        // when (操作):
        let config = parse(&["--chat", "1=7,8,9", "--chat", "2=7"]);

        // then (期待する結果):
        assert_eq!(
            config.chats,
            vec![
                ChatSeed {
                    chat: ChatId::new(1),
                    members: vec![UserId::new(7), UserId::new(8), UserId::new(9)],
                },
                ChatSeed {
                    chat: ChatId::new(2),
                    members: vec![UserId::new(7)],
                },
            ]
        );
    }

    #[test]
    fn test_malformed_chat_seed_is_rejected() {
        // テスト項目: 形式の誤ったチャット指定はパースエラーになる
        // when (操作):
        let result = ServerConfig::try_parse_from([
            "dengon-server",
            "--jwt-secret",
            SECRET,
            "--chat",
            "1:7,8",
        ]);

        // then (期待する結果):
        assert!(result.is_err());
    }

    #[test]
    fn test_invalid_redis_url_is_rejected() {
        // テスト項目: redis スキーム以外の URL は設定エラーになる
        // when (操作):
        let result = parse(&["--redis-url", "http://localhost:6379"]).validate();

        // then (期待する結果):
        assert!(matches!(result, Err(ConfigError::InvalidRedisUrl(_))));
    }
}
