//! Configuration vault – reads/writes `~/.parley/config.toml`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use parley_runtime::{AgentConfig, NegotiationConfig, PromptSet};
use parley_types::ParleyError;
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

/// Persisted configuration stored in `~/.parley/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct Config {
    /// Base URL of the OpenAI-compatible model server.
    #[serde(default = "default_llm_url")]
    pub llm_base_url: String,

    /// Model used for negotiation utterances and classification.
    #[serde(default = "default_chat_model")]
    pub chat_model: String,

    /// Vision model used for perception.
    #[serde(default = "default_vision_model")]
    pub vision_model: String,

    /// Bearer token for hosted model servers. Wiped from memory on drop.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub api_key: String,

    /// Upper bound on any single model request.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// The mission goal (root subgoal).
    #[serde(default = "default_goal")]
    pub goal: String,

    /// Steps toward the goal, first executed first.
    #[serde(default)]
    pub subgoals: Vec<String>,

    #[serde(default = "default_tick_interval")]
    pub tick_interval_ms: u64,

    /// Bounded wait for each human reply.
    #[serde(default = "default_listen")]
    pub listen_secs: u64,

    #[serde(default = "default_silence_limit")]
    pub silence_limit_secs: u64,

    #[serde(default = "default_max_negative")]
    pub max_negative: u32,

    #[serde(default = "default_max_elapsed_negative")]
    pub max_elapsed_negative_secs: u64,

    /// Turns kept in the generation context.
    #[serde(default = "default_max_history")]
    pub max_history: usize,

    #[serde(default = "default_forward_step")]
    pub forward_step_m: f32,

    /// Still image re-read by the file-backed camera on every capture.
    #[serde(default = "default_camera_image")]
    pub camera_image: PathBuf,

    /// Overrides for the negotiation prompts.
    #[serde(default)]
    pub prompts: PromptSet,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("llm_base_url", &self.llm_base_url)
            .field("chat_model", &self.chat_model)
            .field("vision_model", &self.vision_model)
            .field(
                "api_key",
                if self.api_key.is_empty() { &"<not set>" } else { &"<redacted>" },
            )
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("goal", &self.goal)
            .field("subgoals", &self.subgoals)
            .field("tick_interval_ms", &self.tick_interval_ms)
            .field("listen_secs", &self.listen_secs)
            .field("silence_limit_secs", &self.silence_limit_secs)
            .field("max_negative", &self.max_negative)
            .field("max_elapsed_negative_secs", &self.max_elapsed_negative_secs)
            .field("max_history", &self.max_history)
            .field("forward_step_m", &self.forward_step_m)
            .field("camera_image", &self.camera_image)
            .finish_non_exhaustive()
    }
}

impl Drop for Config {
    fn drop(&mut self) {
        self.api_key.zeroize();
    }
}

fn default_llm_url() -> String {
    "http://localhost:11434".to_string()
}
fn default_chat_model() -> String {
    "llama3".to_string()
}
fn default_vision_model() -> String {
    "llava".to_string()
}
fn default_request_timeout() -> u64 {
    30
}
fn default_goal() -> String {
    "reach the main entrance".to_string()
}
fn default_tick_interval() -> u64 {
    1_000
}
fn default_listen() -> u64 {
    5
}
fn default_silence_limit() -> u64 {
    10
}
fn default_max_negative() -> u32 {
    5
}
fn default_max_elapsed_negative() -> u64 {
    40
}
fn default_max_history() -> usize {
    40
}
fn default_forward_step() -> f32 {
    0.5
}
fn default_camera_image() -> PathBuf {
    PathBuf::from("camera.jpg")
}

impl Default for Config {
    fn default() -> Self {
        Self {
            llm_base_url: default_llm_url(),
            chat_model: default_chat_model(),
            vision_model: default_vision_model(),
            api_key: String::new(),
            request_timeout_secs: default_request_timeout(),
            goal: default_goal(),
            subgoals: Vec::new(),
            tick_interval_ms: default_tick_interval(),
            listen_secs: default_listen(),
            silence_limit_secs: default_silence_limit(),
            max_negative: default_max_negative(),
            max_elapsed_negative_secs: default_max_elapsed_negative(),
            max_history: default_max_history(),
            forward_step_m: default_forward_step(),
            camera_image: default_camera_image(),
            prompts: PromptSet::default(),
        }
    }
}

impl Config {
    pub fn api_key(&self) -> Option<String> {
        (!self.api_key.is_empty()).then(|| self.api_key.clone())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }

    pub fn agent_config(&self) -> AgentConfig {
        let mut agent = AgentConfig::new(self.goal.clone());
        agent.plan = self.subgoals.clone();
        agent.listen_timeout = Duration::from_secs(self.listen_secs);
        agent.forward_step = self.forward_step_m;
        agent
    }

    pub fn negotiation_config(&self) -> NegotiationConfig {
        let mut negotiation = NegotiationConfig::new(self.goal.clone());
        negotiation.max_history = self.max_history;
        negotiation.silence_limit = Duration::from_secs(self.silence_limit_secs);
        negotiation.max_negative = self.max_negative;
        negotiation.max_elapsed_negative = Duration::from_secs(self.max_elapsed_negative_secs);
        negotiation.prompts = self.prompts.clone();
        negotiation
    }
}

/// Return the path to `~/.parley/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".parley").join("config.toml")
}

/// Load the config at `path` with `PARLEY_*` overrides applied. A missing
/// file yields the defaults.
pub fn load_from(path: &Path) -> Result<Config, ParleyError> {
    let mut cfg = if path.exists() {
        let raw = fs::read_to_string(path).map_err(|e| {
            ParleyError::Config(format!("failed to read {}: {e}", path.display()))
        })?;
        toml::from_str(&raw).map_err(|e| {
            ParleyError::Config(format!("failed to parse {}: {e}", path.display()))
        })?
    } else {
        Config::default()
    };
    apply_env_overrides(&mut cfg);
    Ok(cfg)
}

/// Apply `PARLEY_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `PARLEY_LLM_URL` | `llm_base_url` |
/// | `PARLEY_MODEL` | `chat_model` |
/// | `PARLEY_VISION_MODEL` | `vision_model` |
/// | `PARLEY_API_KEY` | `api_key` |
/// | `PARLEY_GOAL` | `goal` |
/// | `PARLEY_TICK_MS` | `tick_interval_ms` |
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("PARLEY_LLM_URL") {
        cfg.llm_base_url = v;
    }
    if let Ok(v) = std::env::var("PARLEY_MODEL") {
        cfg.chat_model = v;
    }
    if let Ok(v) = std::env::var("PARLEY_VISION_MODEL") {
        cfg.vision_model = v;
    }
    if let Ok(v) = std::env::var("PARLEY_API_KEY") {
        cfg.api_key.zeroize();
        cfg.api_key = v;
    }
    if let Ok(v) = std::env::var("PARLEY_GOAL") {
        cfg.goal = v;
    }
    if let Ok(v) = std::env::var("PARLEY_TICK_MS")
        && let Ok(ms) = v.parse::<u64>()
    {
        cfg.tick_interval_ms = ms;
    }
}

/// Save the config to `path`, creating its directory if necessary.
pub fn save_to(cfg: &Config, path: &Path) -> Result<(), ParleyError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| ParleyError::Config(format!("failed to create config directory: {e}")))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700)).map_err(|e| {
                ParleyError::Config(format!("failed to set config directory permissions: {e}"))
            })?;
        }
    }
    let raw = toml::to_string_pretty(cfg)
        .map_err(|e| ParleyError::Config(format!("failed to serialize config: {e}")))?;
    let write_err =
        |e: std::io::Error| ParleyError::Config(format!("failed to write {}: {e}", path.display()));
    #[cfg(unix)]
    {
        use std::io::Write;
        use std::os::unix::fs::OpenOptionsExt;
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .and_then(|mut f| f.write_all(raw.as_bytes()))
            .map_err(write_err)?;
    }
    #[cfg(not(unix))]
    fs::write(path, raw).map_err(write_err)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_redacts_api_key() {
        let mut cfg = Config::default();
        cfg.api_key = "sk-super-secret".to_string();
        let debug_str = format!("{cfg:?}");
        assert!(!debug_str.contains("sk-super-secret"));
        assert!(debug_str.contains("<redacted>"));
        assert!(format!("{:?}", Config::default()).contains("<not set>"));
    }

    #[cfg(unix)]
    #[test]
    fn config_file_has_restrictive_permissions() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());
        save_to(&Config::default(), &path).expect("save");

        let file_mode = std::fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(file_mode, 0o600);
        let dir_mode = std::fs::metadata(path.parent().unwrap())
            .unwrap()
            .permissions()
            .mode()
            & 0o777;
        assert_eq!(dir_mode, 0o700);
    }

    #[test]
    fn roundtrip_keeps_mission_and_prompts() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());
        let mut cfg = Config::default();
        cfg.goal = "enter office 12".into();
        cfg.subgoals = vec!["reach the corridor".into(), "find door 12".into()];
        cfg.prompts.robot_name = "Rover".into();
        save_to(&cfg, &path).expect("save");

        let loaded = load_from(&path).expect("load");
        assert_eq!(loaded.goal, "enter office 12");
        assert_eq!(loaded.subgoals, cfg.subgoals);
        assert_eq!(loaded.prompts.robot_name, "Rover");
        assert_eq!(loaded.max_negative, 5);
    }

    #[test]
    fn missing_file_means_defaults() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let cfg = load_from(&dir.path().join("absent.toml")).expect("defaults");
        assert_eq!(cfg.listen_secs, 5);
        assert_eq!(cfg.silence_limit_secs, 10);
        assert_eq!(cfg.max_history, 40);
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "goal = \"deliver mail\"\nmax_negative = 3\n").unwrap();
        let cfg = load_from(&path).expect("load");
        assert_eq!(cfg.goal, "deliver mail");
        assert_eq!(cfg.max_negative, 3);
        assert_eq!(cfg.vision_model, "llava");
        assert_eq!(cfg.prompts, PromptSet::default());
    }

    #[test]
    fn malformed_file_is_a_config_error() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "max_negative = \"many\"").unwrap();
        assert!(matches!(load_from(&path), Err(ParleyError::Config(_))));
    }

    #[test]
    fn derived_runtime_configs() {
        let mut cfg = Config::default();
        cfg.subgoals = vec!["a".into()];
        cfg.listen_secs = 7;
        cfg.max_elapsed_negative_secs = 90;
        let agent = cfg.agent_config();
        assert_eq!(agent.plan, vec!["a".to_string()]);
        assert_eq!(agent.listen_timeout, Duration::from_secs(7));
        let negotiation = cfg.negotiation_config();
        assert_eq!(negotiation.max_elapsed_negative, Duration::from_secs(90));
        assert_eq!(negotiation.goal, cfg.goal);
    }

    #[test]
    fn config_path_points_to_parley_dir() {
        let p = config_path_for_home("/home/testuser");
        assert!(p.ends_with(".parley/config.toml"));
    }

    #[test]
    fn env_overrides_apply_and_ignore_bad_numbers() {
        // SAFETY: the only test in this crate touching these variables.
        unsafe {
            std::env::set_var("PARLEY_MODEL", "mistral");
            std::env::set_var("PARLEY_TICK_MS", "not-a-number");
        }
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.chat_model, "mistral");
        assert_eq!(cfg.tick_interval_ms, 1_000);

        unsafe { std::env::set_var("PARLEY_TICK_MS", "250") };
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.tick_interval_ms, 250);
        unsafe {
            std::env::remove_var("PARLEY_MODEL");
            std::env::remove_var("PARLEY_TICK_MS");
        }
    }
}
