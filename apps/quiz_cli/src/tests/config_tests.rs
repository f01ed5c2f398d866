use super::*;

use std::collections::HashMap;

fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let vars: HashMap<String, String> = pairs
        .iter()
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect();
    move |key| vars.get(key).cloned()
}

#[test]
fn defaults_point_at_local_backend() {
    let settings = settings_from_sources(None, env_from(&[])).expect("settings");
    assert_eq!(settings, Settings::default());
    assert_eq!(settings.payment_base_url(), "http://127.0.0.1:5002");
}

#[test]
fn file_overrides_defaults_and_env_overrides_file() {
    let file = r#"
        api_url = "http://quiz.local:8080/"
        payment_url = "https://pay.local"
        merchant_name = "Quiz Shop"
        event_bus_capacity = 4
    "#;
    let settings = settings_from_sources(
        Some(file),
        env_from(&[("APP__API_URL", "http://override:9000"), ("QUIZ_API_URL", "http://ignored")]),
    )
    .expect("settings");

    assert_eq!(settings.api_base_url, "http://override:9000");
    assert_eq!(settings.payment_base_url(), "https://pay.local");
    assert_eq!(settings.merchant_display_name, "Quiz Shop");
    assert_eq!(settings.event_bus_capacity, 4);
}

#[test]
fn trailing_slash_is_trimmed() {
    let settings = settings_from_sources(Some(r#"api_url = "http://quiz.local:8080/""#), env_from(&[]))
        .expect("settings");
    assert_eq!(settings.api_base_url, "http://quiz.local:8080");
}

#[test]
fn invalid_values_are_rejected() {
    assert!(settings_from_sources(None, env_from(&[("QUIZ_API_URL", "not a url")])).is_err());
    assert!(
        settings_from_sources(None, env_from(&[("APP__EVENT_BUS_CAPACITY", "many")])).is_err()
    );
    assert!(settings_from_sources(None, env_from(&[("APP__EVENT_BUS_CAPACITY", "0")])).is_err());
    assert!(settings_from_sources(Some("api_url = 5"), env_from(&[])).is_err());
}
