use std::time::Duration;

use tollgate::{BackoffConfig, Config};

#[test]
fn delay_is_non_decreasing_and_capped() {
    let configs = [
        BackoffConfig::new(),
        BackoffConfig::new()
            .base_backoff(Duration::from_millis(250))
            .max_backoff(Duration::from_secs(30))
            .multiplier(1.5),
        BackoffConfig::new()
            .base_backoff(Duration::from_secs(1))
            .max_backoff(Duration::from_secs(1))
            .multiplier(3.0),
        BackoffConfig::new().multiplier(1.0),
    ];

    for config in &configs {
        let mut previous = Duration::ZERO;
        for attempt in 0..64 {
            let delay = config.delay_for_attempt(attempt);
            assert!(delay >= previous, "{config:?} decreased at attempt {attempt}");
            assert!(delay <= config.max_backoff, "{config:?} exceeded cap");
            previous = delay;
        }
    }
}

#[test]
fn schedule_for_documented_defaults() {
    let config = BackoffConfig::new().max_retries(4);
    let total: Duration = (0..config.max_retries)
        .map(|k| config.delay_for_attempt(k))
        .sum();
    // 5 + 10 + 20 + 40
    assert_eq!(total, Duration::from_secs(75));
}

#[test]
fn jittered_delay_stays_within_factor() {
    let config = BackoffConfig::new().jitter_factor(0.25);
    for attempt in 0..6 {
        let base = config.delay_for_attempt(attempt);
        for _ in 0..50 {
            let delay = config.effective_delay(attempt, None);
            assert!(delay >= base.mul_f64(0.75) && delay <= base.mul_f64(1.25));
        }
    }
}

#[test]
fn backoff_section_loads_from_toml() {
    let config = Config::from_toml_str(
        r#"
        [backoff]
        base_backoff_secs = 2
        max_backoff_secs = 30.5
        multiplier = 3.0
        jitter_factor = 0.0
        max_retries = 2
        "#,
    )
    .unwrap();
    let backoff = config.backoff;
    assert_eq!(backoff.base_backoff, Duration::from_secs(2));
    assert_eq!(backoff.max_backoff, Duration::from_millis(30_500));
    assert_eq!(backoff.max_retries, 2);
    assert_eq!(backoff.delay_for_attempt(2), Duration::from_secs(18));
}

#[test]
fn invalid_backoff_section_is_rejected() {
    assert!(Config::from_toml_str("[backoff]\njitter_factor = 1.5\n").is_err());
}
