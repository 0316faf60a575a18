//! Full-file config parsing against the documented TOML layout.

use kg_domain::config::{Config, ConfigSeverity, OutputErrorPolicy, PipelineErrorPolicy};

const EXAMPLE: &str = r#"
[providers.input]
enabled_inputs = ["console"]
auto_restart = true
restart_interval_secs = 3

[providers.input.console]
prompt = "> "

[providers.decision]
active_provider = "rule_engine"
available_providers = ["rule_engine", "maicore", "local_llm"]
decide_timeout_secs = 30

[providers.decision.rule_engine]
rules_file = "rules.toml"

[providers.decision.maicore]
url = "ws://127.0.0.1:8000/ws"

[providers.output]
enabled_outputs = ["subtitle", "tts"]
concurrent_rendering = true
error_handling = "continue"
render_timeout_secs = 10

[pipelines.input.rate_limit]
enabled = true
priority = 100
error_handling = "continue"
timeout_secs = 0.5
window_secs = 60
max_global_per_window = 60
max_per_user_per_window = 1

[pipelines.input.similarity]
enabled = true
priority = 500
threshold = 0.85
time_window_secs = 30

[pipelines.output.profanity]
enabled = true
priority = 100
words = ["badword"]

[pipelines.output.length_limit]
enabled = true
priority = 200
max_chars = 220

[llm]
backend = "openai"
model = "gpt-4o-mini"
api_key_env = "OPENAI_API_KEY"
temperature = 0.7
max_tokens = 512
max_retries = 3
retry_delay_ms = 500

[llm_fast]
backend = "ollama"
model = "qwen2.5:3b"

[flow.emotion_expressions.happy]
mouth_smile = 1.0

[server]
bind = "127.0.0.1:9900"

[prompts]
templates_dir = "prompts"
"#;

#[test]
fn example_config_parses_cleanly() {
    let config: Config = toml::from_str(EXAMPLE).expect("example config must parse");

    assert_eq!(config.providers.input.enabled_inputs, vec!["console"]);
    assert_eq!(config.providers.decision.active_provider, "rule_engine");
    assert_eq!(
        config.providers.output.error_handling,
        OutputErrorPolicy::Continue
    );

    let rate_limit = &config.pipelines.input["rate_limit"];
    assert_eq!(rate_limit.priority, Some(100));
    assert_eq!(rate_limit.error_handling, PipelineErrorPolicy::Continue);
    assert_eq!(rate_limit.opt::<u64>("max_per_user_per_window"), Some(1));

    let llm = config.llm.as_ref().unwrap();
    assert_eq!(llm.model, "gpt-4o-mini");
    assert_eq!(llm.max_retries, 3);

    assert!(config.server.is_some());
}

#[test]
fn example_config_validates_without_errors() {
    let config: Config = toml::from_str(EXAMPLE).unwrap();
    let errors: Vec<_> = config
        .validate()
        .into_iter()
        .filter(|i| i.severity == ConfigSeverity::Error)
        .collect();
    assert!(errors.is_empty(), "unexpected errors: {errors:?}");
}

#[test]
fn per_provider_tables_reach_the_right_domain() {
    let config: Config = toml::from_str(EXAMPLE).unwrap();
    let maicore = config
        .providers
        .decision
        .provider_config
        .get("maicore")
        .unwrap();
    assert_eq!(
        maicore.get("url").and_then(|v| v.as_str()),
        Some("ws://127.0.0.1:8000/ws")
    );
}

#[test]
fn empty_file_is_a_valid_config() {
    let config: Config = toml::from_str("").unwrap();
    assert!(config.llm.is_none());
    assert!(config.server.is_none());
}
