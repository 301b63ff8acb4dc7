use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize)]
pub struct EffectiveConfig {
    pub ui: UiConfig,
    pub diagnostic: DiagnosticConfig,
    pub executor: ExecutorConfig,
    pub log: LogConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_path: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UiConfig {
    pub color: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticConfig {
    pub program: String,
    pub timeout_secs: u64,
    pub join_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExecutorConfig {
    pub program: String,
    pub subcommand: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub poll_interval_ms: u64,
    pub idle_timeout_ms: u64,
    pub hard_timeout_secs: u64,
    pub grace_period_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct LogConfig {
    pub enabled: bool,
}

impl Default for EffectiveConfig {
    fn default() -> Self {
        Self {
            ui: UiConfig { color: true },
            diagnostic: DiagnosticConfig {
                program: "k8sgpt".to_string(),
                timeout_secs: 900,
                join_timeout_ms: 2000,
            },
            executor: ExecutorConfig {
                program: "kubectl".to_string(),
                subcommand: "ai".to_string(),
                model: None,
                poll_interval_ms: 100,
                idle_timeout_ms: 3000,
                hard_timeout_secs: 300,
                grace_period_ms: 2000,
            },
            log: LogConfig { enabled: true },
            config_path: None,
        }
    }
}

/// Upper bound for every configured duration, so deadlines computed from
/// them stay representable.
pub const MAX_DURATION: Duration = Duration::from_secs(7 * 24 * 60 * 60);

fn secs(value: u64) -> Duration {
    Duration::from_secs(value).min(MAX_DURATION)
}

fn millis(value: u64) -> Duration {
    Duration::from_millis(value).min(MAX_DURATION)
}

impl EffectiveConfig {
    pub fn diagnostic_options(&self, verbose: bool) -> crate::diagnostic::DiagnosticOptions {
        crate::diagnostic::DiagnosticOptions {
            program: self.diagnostic.program.clone(),
            timeout: secs(self.diagnostic.timeout_secs),
            join_timeout: millis(self.diagnostic.join_timeout_ms),
            verbose,
        }
    }

    pub fn executor_command(&self) -> crate::executor::ExecutorCommand {
        crate::executor::ExecutorCommand {
            program: self.executor.program.clone(),
            subcommand: self.executor.subcommand.clone(),
            model: self.executor.model.clone(),
        }
    }

    pub fn monitor_options(&self) -> crate::executor::MonitorOptions {
        crate::executor::MonitorOptions {
            poll_interval: millis(self.executor.poll_interval_ms.max(1)),
            idle_timeout: millis(self.executor.idle_timeout_ms),
            hard_timeout: secs(self.executor.hard_timeout_secs),
            grace_period: millis(self.executor.grace_period_ms),
            join_timeout: millis(self.diagnostic.join_timeout_ms),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    ui: Option<RawUiConfig>,
    diagnostic: Option<RawDiagnosticConfig>,
    executor: Option<RawExecutorConfig>,
    log: Option<RawLogConfig>,
}

#[derive(Debug, Deserialize)]
struct RawUiConfig {
    color: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct RawDiagnosticConfig {
    program: Option<String>,
    timeout_secs: Option<u64>,
    join_timeout_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct RawExecutorConfig {
    program: Option<String>,
    subcommand: Option<String>,
    model: Option<String>,
    poll_interval_ms: Option<u64>,
    idle_timeout_ms: Option<u64>,
    hard_timeout_secs: Option<u64>,
    grace_period_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct RawLogConfig {
    enabled: Option<bool>,
}

pub fn default_config_path(home_dir: &Path) -> PathBuf {
    home_dir.join(".config/k8s2ai/config.toml")
}

pub fn load(config_path: Option<&Path>, home_dir: &Path) -> Result<EffectiveConfig> {
    load_with_env(config_path, home_dir, |key| std::env::var(key).ok())
}

/// [`load`] with an explicit environment lookup.
pub fn load_with_env(
    config_path: Option<&Path>,
    home_dir: &Path,
    env: impl Fn(&str) -> Option<String>,
) -> Result<EffectiveConfig> {
    let mut cfg = EffectiveConfig::default();

    let path = config_path
        .map(ToOwned::to_owned)
        .or_else(|| {
            env("K8S2AI_CONFIG")
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from)
        })
        .unwrap_or_else(|| default_config_path(home_dir));

    if path.exists() {
        let s = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let raw: RawConfig = toml::from_str(&s)
            .with_context(|| format!("failed to parse config file (TOML): {}", path.display()))?;
        apply_raw_config(&mut cfg, raw);
        cfg.config_path = Some(path.display().to_string());
    }

    apply_env_overrides(&mut cfg, &env)?;

    Ok(cfg)
}

fn apply_raw_config(cfg: &mut EffectiveConfig, raw: RawConfig) {
    if let Some(ui) = raw.ui {
        if let Some(color) = ui.color {
            cfg.ui.color = color;
        }
    }

    if let Some(diagnostic) = raw.diagnostic {
        if let Some(program) = diagnostic.program.filter(|p| !p.trim().is_empty()) {
            cfg.diagnostic.program = program;
        }
        if let Some(timeout_secs) = diagnostic.timeout_secs {
            cfg.diagnostic.timeout_secs = timeout_secs;
        }
        if let Some(join_timeout_ms) = diagnostic.join_timeout_ms {
            cfg.diagnostic.join_timeout_ms = join_timeout_ms;
        }
    }

    if let Some(executor) = raw.executor {
        if let Some(program) = executor.program.filter(|p| !p.trim().is_empty()) {
            cfg.executor.program = program;
        }
        if let Some(subcommand) = executor.subcommand.filter(|s| !s.trim().is_empty()) {
            cfg.executor.subcommand = subcommand;
        }
        if let Some(model) = executor.model {
            cfg.executor.model = Some(model).filter(|m| !m.trim().is_empty());
        }
        if let Some(poll_interval_ms) = executor.poll_interval_ms {
            cfg.executor.poll_interval_ms = poll_interval_ms;
        }
        if let Some(idle_timeout_ms) = executor.idle_timeout_ms {
            cfg.executor.idle_timeout_ms = idle_timeout_ms;
        }
        if let Some(hard_timeout_secs) = executor.hard_timeout_secs {
            cfg.executor.hard_timeout_secs = hard_timeout_secs;
        }
        if let Some(grace_period_ms) = executor.grace_period_ms {
            cfg.executor.grace_period_ms = grace_period_ms;
        }
    }

    if let Some(log) = raw.log {
        if let Some(enabled) = log.enabled {
            cfg.log.enabled = enabled;
        }
    }
}

fn apply_env_overrides(
    cfg: &mut EffectiveConfig,
    env: &impl Fn(&str) -> Option<String>,
) -> Result<()> {
    if let Some(v) = env("K8S2AI_UI_COLOR") {
        cfg.ui.color = parse_bool(&v).with_context(|| "K8S2AI_UI_COLOR")?;
    }
    if env("NO_COLOR").is_some_and(|v| !v.is_empty()) {
        cfg.ui.color = false;
    }
    if let Some(v) = env("K8S2AI_DIAGNOSTIC_BIN") {
        let v = v.trim();
        if !v.is_empty() {
            cfg.diagnostic.program = v.to_string();
        }
    }
    if let Some(v) = env("K8S2AI_DIAGNOSTIC_TIMEOUT_SECS") {
        cfg.diagnostic.timeout_secs = parse_u64(&v).with_context(|| "K8S2AI_DIAGNOSTIC_TIMEOUT_SECS")?;
    }
    if let Some(v) = env("K8S2AI_EXECUTOR_BIN") {
        let v = v.trim();
        if !v.is_empty() {
            cfg.executor.program = v.to_string();
        }
    }
    if let Some(v) = env("K8S2AI_MODEL") {
        let v = v.trim();
        if !v.is_empty() {
            cfg.executor.model = Some(v.to_string());
        }
    }
    if let Some(v) = env("K8S2AI_IDLE_TIMEOUT_MS") {
        cfg.executor.idle_timeout_ms = parse_u64(&v).with_context(|| "K8S2AI_IDLE_TIMEOUT_MS")?;
    }
    if let Some(v) = env("K8S2AI_HARD_TIMEOUT_SECS") {
        cfg.executor.hard_timeout_secs = parse_u64(&v).with_context(|| "K8S2AI_HARD_TIMEOUT_SECS")?;
    }
    if let Some(v) = env("K8S2AI_GRACE_PERIOD_MS") {
        cfg.executor.grace_period_ms = parse_u64(&v).with_context(|| "K8S2AI_GRACE_PERIOD_MS")?;
    }
    if let Some(v) = env("K8S2AI_POLL_INTERVAL_MS") {
        cfg.executor.poll_interval_ms = parse_u64(&v).with_context(|| "K8S2AI_POLL_INTERVAL_MS")?;
    }
    if let Some(v) = env("K8S2AI_LOG_ENABLED") {
        cfg.log.enabled = parse_bool(&v).with_context(|| "K8S2AI_LOG_ENABLED")?;
    }

    Ok(())
}

fn parse_u64(s: &str) -> Result<u64> {
    s.trim()
        .parse::<u64>()
        .map_err(|_| anyhow::anyhow!("invalid number: {s} (expected a non-negative integer)"))
}

fn parse_bool(s: &str) -> Result<bool> {
    let s = s.trim().to_ascii_lowercase();
    match s.as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(anyhow::anyhow!(
            "invalid boolean: {s} (expected true|false|1|0|yes|no|on|off)"
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU64, Ordering};

    fn make_temp_home() -> PathBuf {
        static SEQ: AtomicU64 = AtomicU64::new(0);
        let seq = SEQ.fetch_add(1, Ordering::Relaxed);
        let home = std::env::temp_dir().join(format!(
            "k8s2ai-config-test-{}-{seq}",
            std::process::id()
        ));
        let _ = std::fs::remove_dir_all(&home);
        std::fs::create_dir_all(&home).expect("create home");
        home
    }

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    fn write_default_config(home: &Path, body: &str) {
        let path = default_config_path(home);
        std::fs::create_dir_all(path.parent().expect("parent")).expect("create config dir");
        std::fs::write(path, body).expect("write config");
    }

    #[test]
    fn missing_file_yields_defaults() {
        let home = make_temp_home();
        let cfg = load_with_env(None, &home, env_of(&[])).expect("load");
        assert_eq!(cfg.diagnostic.program, "k8sgpt");
        assert_eq!(cfg.executor.program, "kubectl");
        assert_eq!(cfg.executor.subcommand, "ai");
        assert_eq!(cfg.executor.idle_timeout_ms, 3000);
        assert_eq!(cfg.executor.hard_timeout_secs, 300);
        assert!(cfg.ui.color);
        assert!(cfg.log.enabled);
        assert!(cfg.config_path.is_none());
        let _ = std::fs::remove_dir_all(&home);
    }

    #[test]
    fn env_overrides_file() {
        let home = make_temp_home();
        write_default_config(
            &home,
            "[executor]\nmodel = \"from-file\"\nidle_timeout_ms = 5000\n\n[log]\nenabled = false\n",
        );
        let cfg = load_with_env(
            None,
            &home,
            env_of(&[("K8S2AI_MODEL", "from-env"), ("K8S2AI_LOG_ENABLED", "yes")]),
        )
        .expect("load");
        assert_eq!(cfg.executor.model.as_deref(), Some("from-env"));
        assert_eq!(cfg.executor.idle_timeout_ms, 5000);
        assert!(cfg.log.enabled);
        assert!(cfg.config_path.is_some());
        let _ = std::fs::remove_dir_all(&home);
    }

    #[test]
    fn explicit_path_wins_over_env_path() {
        let home = make_temp_home();
        let a = home.join("a.toml");
        let b = home.join("b.toml");
        std::fs::write(&a, "[diagnostic]\nprogram = \"k8sgpt-a\"\n").expect("write a");
        std::fs::write(&b, "[diagnostic]\nprogram = \"k8sgpt-b\"\n").expect("write b");
        let env_path = b.display().to_string();
        let env_path = env_path.as_str();

        let cfg = load_with_env(Some(&a), &home, env_of(&[("K8S2AI_CONFIG", env_path)]))
            .expect("load");
        assert_eq!(cfg.diagnostic.program, "k8sgpt-a");

        let cfg = load_with_env(None, &home, env_of(&[("K8S2AI_CONFIG", env_path)]))
            .expect("load");
        assert_eq!(cfg.diagnostic.program, "k8sgpt-b");
        let _ = std::fs::remove_dir_all(&home);
    }

    #[test]
    fn no_color_disables_color() {
        let home = make_temp_home();
        let cfg = load_with_env(
            None,
            &home,
            env_of(&[("K8S2AI_UI_COLOR", "on"), ("NO_COLOR", "1")]),
        )
        .expect("load");
        assert!(!cfg.ui.color);
        let cfg = load_with_env(None, &home, env_of(&[("NO_COLOR", "")])).expect("load");
        assert!(cfg.ui.color);
        let _ = std::fs::remove_dir_all(&home);
    }

    #[test]
    fn invalid_values_are_errors() {
        let home = make_temp_home();
        let err = load_with_env(None, &home, env_of(&[("K8S2AI_UI_COLOR", "maybe")]))
            .expect_err("invalid bool");
        assert!(format!("{err:#}").contains("K8S2AI_UI_COLOR"));
        let err = load_with_env(None, &home, env_of(&[("K8S2AI_IDLE_TIMEOUT_MS", "-5")]))
            .expect_err("invalid number");
        assert!(format!("{err:#}").contains("K8S2AI_IDLE_TIMEOUT_MS"));

        write_default_config(&home, "[executor]\nidle_timeout_ms = \"soon\"\n");
        assert!(load_with_env(None, &home, env_of(&[])).is_err());
        let _ = std::fs::remove_dir_all(&home);
    }

    #[test]
    fn options_follow_config() {
        let mut cfg = EffectiveConfig::default();
        cfg.executor.poll_interval_ms = 0;
        cfg.executor.grace_period_ms = 250;
        let opts = cfg.monitor_options();
        assert_eq!(opts.poll_interval, Duration::from_millis(1));
        assert_eq!(opts.grace_period, Duration::from_millis(250));
        assert_eq!(opts.hard_timeout, Duration::from_secs(300));
        assert_eq!(cfg.diagnostic_options(false).timeout, Duration::from_secs(900));
    }

    #[test]
    fn huge_durations_are_capped() {
        let home = make_temp_home();
        let max = u64::MAX.to_string();
        let cfg = load_with_env(
            None,
            &home,
            env_of(&[
                ("K8S2AI_DIAGNOSTIC_TIMEOUT_SECS", max.as_str()),
                ("K8S2AI_HARD_TIMEOUT_SECS", max.as_str()),
                ("K8S2AI_GRACE_PERIOD_MS", max.as_str()),
            ]),
        )
        .expect("load");
        let diag = cfg.diagnostic_options(false);
        assert_eq!(diag.timeout, MAX_DURATION);
        let mut raw = cfg.clone();
        raw.diagnostic.join_timeout_ms = u64::MAX;
        assert_eq!(raw.diagnostic_options(false).join_timeout, MAX_DURATION);

        let opts = cfg.monitor_options();
        assert_eq!(opts.hard_timeout, MAX_DURATION);
        assert_eq!(opts.grace_period, MAX_DURATION);
        assert!(std::time::Instant::now().checked_add(MAX_DURATION).is_some());
        let _ = std::fs::remove_dir_all(&home);
    }
}
