//! Per-IP failed-attempt log with progressive delays and lockouts.
//!
//! The log is a JSON object keyed by client IP, kept next to the user files.
//! Every check garbage-collects it: attempts older than the window are
//! dropped, expired lockouts are lifted, and entries left with neither are
//! removed.
//!
//! The pure functions take `now` (unix seconds) so the policy can be driven
//! without touching the clock. [`Throttle`] wraps them with file I/O.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::BruteForceSettings;
use crate::error::ApiError;

pub const LOG_FILE: &str = ".brute_force_log.json";

#[derive(Debug, Default, Clone, Serialize, Deserialize, PartialEq)]
pub struct BruteForceEntry {
    #[serde(default, deserialize_with = "attempt_list")]
    pub attempts: Vec<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lockout_until: Option<i64>,
}

pub type BruteForceLog = BTreeMap<String, BruteForceEntry>;

/// Attempts may have been written as an index-keyed object.
fn attempt_list<'de, D>(deserializer: D) -> Result<Vec<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Attempts {
        List(Vec<i64>),
        Map(BTreeMap<String, i64>),
    }

    Ok(match Attempts::deserialize(deserializer)? {
        Attempts::List(list) => list,
        Attempts::Map(map) => map.into_values().collect(),
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThrottleStatus {
    Allowed { delay: Duration },
    Locked { remaining: i64 },
}

pub fn cleanup(log: &mut BruteForceLog, window: i64, now: i64) {
    log.retain(|_, entry| {
        entry.attempts.retain(|&at| now - at < window);
        if entry.lockout_until.is_some_and(|until| until < now) {
            entry.lockout_until = None;
        }
        !entry.attempts.is_empty() || entry.lockout_until.is_some()
    });
}

/// `delay * 2^(attempts - max_attempts)` capped at `max_delay`, zero below
/// the threshold.
pub fn delay_for(attempts: usize, policy: &BruteForceSettings) -> Duration {
    if attempts < policy.max_attempts {
        return Duration::ZERO;
    }
    let extra = u32::try_from(attempts - policy.max_attempts).unwrap_or(u32::MAX);
    let factor = 1u64.checked_shl(extra).unwrap_or(u64::MAX);
    Duration::from_secs(policy.delay.saturating_mul(factor).min(policy.max_delay))
}

pub fn evaluate(
    log: &BruteForceLog,
    ip: &str,
    policy: &BruteForceSettings,
    now: i64,
) -> ThrottleStatus {
    let Some(entry) = log.get(ip) else {
        return ThrottleStatus::Allowed { delay: Duration::ZERO };
    };
    if let Some(until) = entry.lockout_until.filter(|&until| until > now) {
        return ThrottleStatus::Locked { remaining: until - now };
    }
    ThrottleStatus::Allowed {
        delay: delay_for(entry.attempts.len(), policy),
    }
}

pub fn register_failure(log: &mut BruteForceLog, ip: &str, policy: &BruteForceSettings, now: i64) {
    let entry = log.entry(ip.to_string()).or_default();
    entry.attempts.push(now);
    if policy.lockout_attempts > 0 && entry.attempts.len() >= policy.lockout_attempts {
        entry.lockout_until = Some(now + policy.lockout_duration);
    }
}

/// File-backed throttle. Read-modify-write cycles are serialized within the
/// process.
#[derive(Debug)]
pub struct Throttle {
    path: PathBuf,
    policy: BruteForceSettings,
    guard: Mutex<()>,
}

impl Throttle {
    pub fn new(notes_dir: &Path, policy: BruteForceSettings) -> Self {
        Self {
            path: notes_dir.join(LOG_FILE),
            policy,
            guard: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn check(&self, ip: &str) -> Result<ThrottleStatus, ApiError> {
        self.check_at(ip, chrono::Utc::now().timestamp())
    }

    pub fn check_at(&self, ip: &str, now: i64) -> Result<ThrottleStatus, ApiError> {
        if !self.policy.enabled {
            return Ok(ThrottleStatus::Allowed { delay: Duration::ZERO });
        }
        let _guard = self.guard.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut log = self.load();
        cleanup(&mut log, self.policy.window, now);
        self.save(&log)?;
        Ok(evaluate(&log, ip, &self.policy, now))
    }

    pub fn record_failure(&self, ip: &str) -> Result<(), ApiError> {
        self.record_failure_at(ip, chrono::Utc::now().timestamp())
    }

    pub fn record_failure_at(&self, ip: &str, now: i64) -> Result<(), ApiError> {
        if !self.policy.enabled {
            return Ok(());
        }
        let _guard = self.guard.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut log = self.load();
        cleanup(&mut log, self.policy.window, now);
        register_failure(&mut log, ip, &self.policy, now);
        debug!(ip, attempts = log[ip].attempts.len(), "recorded failed attempt");
        if log[ip].lockout_until.is_some() {
            warn!(ip, "client locked out");
        }
        self.save(&log)
    }

    /// Forgets every failure recorded for `ip`.
    pub fn clear(&self, ip: &str) -> Result<(), ApiError> {
        if !self.policy.enabled {
            return Ok(());
        }
        let _guard = self.guard.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut log = self.load();
        if log.remove(ip).is_some() {
            self.save(&log)?;
        }
        Ok(())
    }

    /// Unreadable files and entries are treated as empty.
    pub fn load(&self) -> BruteForceLog {
        let Ok(raw) = fs::read_to_string(&self.path) else {
            return BruteForceLog::new();
        };
        let Ok(Value::Object(entries)) = serde_json::from_str::<Value>(&raw) else {
            warn!(file = %self.path.display(), "ignoring malformed brute force log");
            return BruteForceLog::new();
        };
        entries
            .into_iter()
            .filter_map(|(ip, entry)| serde_json::from_value(entry).ok().map(|entry| (ip, entry)))
            .collect()
    }

    fn save(&self, log: &BruteForceLog) -> Result<(), ApiError> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir)?;
        }
        fs::write(&self.path, serde_json::to_string_pretty(log)?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> BruteForceSettings {
        BruteForceSettings {
            enabled: true,
            window: 900,
            max_attempts: 5,
            delay: 2,
            max_delay: 30,
            lockout_attempts: 20,
            lockout_duration: 3600,
        }
    }

    #[test]
    fn test_delay_schedule() {
        let policy = policy();
        assert_eq!(delay_for(0, &policy), Duration::ZERO);
        assert_eq!(delay_for(4, &policy), Duration::ZERO);
        assert_eq!(delay_for(5, &policy), Duration::from_secs(2));
        assert_eq!(delay_for(6, &policy), Duration::from_secs(4));
        assert_eq!(delay_for(8, &policy), Duration::from_secs(16));
        assert_eq!(delay_for(9, &policy), Duration::from_secs(30));
        assert_eq!(delay_for(500, &policy), Duration::from_secs(30));
    }

    #[test]
    fn test_delay_is_monotonic_up_to_cap() {
        for (base, cap, threshold) in [(2, 30, 5), (1, 1, 0), (3, 1000, 2), (0, 10, 1)] {
            let policy = BruteForceSettings {
                delay: base,
                max_delay: cap,
                max_attempts: threshold,
                ..policy()
            };
            let mut previous = Duration::ZERO;
            for attempts in 0..200 {
                let delay = delay_for(attempts, &policy);
                assert!(delay >= previous, "delay dropped at {attempts} attempts");
                assert!(delay <= Duration::from_secs(cap));
                previous = delay;
            }
        }
    }

    #[test]
    fn test_cleanup_prunes_old_and_expired() {
        let mut log = BruteForceLog::new();
        log.insert(
            "1.1.1.1".into(),
            BruteForceEntry { attempts: vec![100, 950], lockout_until: None },
        );
        log.insert(
            "2.2.2.2".into(),
            BruteForceEntry { attempts: vec![10], lockout_until: Some(500) },
        );
        log.insert(
            "3.3.3.3".into(),
            BruteForceEntry { attempts: vec![], lockout_until: Some(5000) },
        );

        cleanup(&mut log, 900, 1000);

        assert_eq!(log["1.1.1.1"].attempts, vec![950]);
        assert!(!log.contains_key("2.2.2.2"));
        assert_eq!(log["3.3.3.3"].lockout_until, Some(5000));
    }

    #[test]
    fn test_lockout_after_threshold() {
        let policy = BruteForceSettings { lockout_attempts: 3, ..policy() };
        let mut log = BruteForceLog::new();
        for now in [10, 11] {
            register_failure(&mut log, "ip", &policy, now);
        }
        assert!(matches!(evaluate(&log, "ip", &policy, 12), ThrottleStatus::Allowed { .. }));

        register_failure(&mut log, "ip", &policy, 12);
        assert_eq!(log["ip"].lockout_until, Some(12 + 3600));
        assert_eq!(
            evaluate(&log, "ip", &policy, 100),
            ThrottleStatus::Locked { remaining: 3512 }
        );
    }

    #[test]
    fn test_lockout_disabled_with_zero() {
        let policy = BruteForceSettings { lockout_attempts: 0, ..policy() };
        let mut log = BruteForceLog::new();
        for now in 0..50 {
            register_failure(&mut log, "ip", &policy, now);
        }
        assert_eq!(log["ip"].lockout_until, None);
    }

    #[test]
    fn test_throttle_file_cycle() {
        let dir = tempfile::tempdir().unwrap();
        let throttle = Throttle::new(dir.path(), BruteForceSettings { max_attempts: 2, ..policy() });

        for _ in 0..3 {
            throttle.record_failure_at("9.9.9.9", 1000).unwrap();
        }
        assert_eq!(
            throttle.check_at("9.9.9.9", 1001).unwrap(),
            ThrottleStatus::Allowed { delay: Duration::from_secs(4) }
        );
        assert_eq!(
            throttle.check_at("8.8.8.8", 1001).unwrap(),
            ThrottleStatus::Allowed { delay: Duration::ZERO }
        );

        throttle.clear("9.9.9.9").unwrap();
        assert!(throttle.load().is_empty());
    }

    #[test]
    fn test_check_collects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let throttle = Throttle::new(dir.path(), policy());
        throttle.record_failure_at("1.2.3.4", 0).unwrap();
        throttle.check_at("5.6.7.8", 10_000).unwrap();
        assert!(throttle.load().is_empty());
    }

    #[test]
    fn test_malformed_log_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let throttle = Throttle::new(dir.path(), policy());

        fs::write(throttle.path(), "not json").unwrap();
        assert!(throttle.load().is_empty());

        fs::write(
            throttle.path(),
            r#"{"1.1.1.1":{"attempts":{"0":5,"2":7}},"2.2.2.2":"broken"}"#,
        )
        .unwrap();
        let log = throttle.load();
        assert_eq!(log.len(), 1);
        assert_eq!(log["1.1.1.1"].attempts, vec![5, 7]);
    }

    #[test]
    fn test_disabled_throttle_is_inert() {
        let dir = tempfile::tempdir().unwrap();
        let throttle = Throttle::new(dir.path(), BruteForceSettings { enabled: false, ..policy() });
        for _ in 0..30 {
            throttle.record_failure("ip").unwrap();
        }
        assert_eq!(
            throttle.check("ip").unwrap(),
            ThrottleStatus::Allowed { delay: Duration::ZERO }
        );
        assert!(!throttle.path().exists());
    }
}
