//! The validated, immutable definition of one run.

use std::sync::Arc;
use std::time::Duration;

use crate::loadtest::check::Check;
use crate::loadtest::config::LoadTestConfig;
use crate::loadtest::error::LoadTestError;
use crate::loadtest::executor::RequestTemplate;
use crate::loadtest::scheduler::StageScheduler;
use crate::loadtest::template::{TemplateParams, UrlTemplate};
use crate::loadtest::threshold::ThresholdConfig;

/// Everything a [`RunController`](crate::loadtest::engine::RunController)
/// needs. Built once before the run and never mutated afterwards.
#[derive(Debug, Clone)]
pub struct RunProfile {
    pub scheduler: StageScheduler,
    pub request: Arc<RequestTemplate>,
    pub params: Arc<TemplateParams>,
    pub checks: Arc<[Check]>,
    pub thresholds: Vec<ThresholdConfig>,
    pub grace_period: Duration,
    pub tick_interval: Duration,
    /// The target URL with every placeholder resolved.
    pub target: url::Url,
}

impl RunProfile {
    /// Validate `config` and bind it to resolved template parameters.
    ///
    /// Fails if the config is invalid, a placeholder has no value, or the
    /// rendered URL is not an absolute http(s) URL.
    pub fn from_config(config: &LoadTestConfig, params: TemplateParams) -> Result<Self, LoadTestError> {
        config.validate()?;
        let scheduler = StageScheduler::new(config.stage.clone())?;
        let url = UrlTemplate::parse(config.settings.target_url.clone());
        let target = url.render_url(&params)?;

        Ok(Self {
            scheduler,
            request: Arc::new(RequestTemplate {
                url,
                timeout: config.settings.request_timeout,
                iteration_sleep: config.settings.iteration_sleep,
            }),
            params: Arc::new(params),
            checks: config.check.iter().map(Check::from).collect(),
            thresholds: config.threshold.clone(),
            grace_period: config.settings.grace_period,
            tick_interval: config.settings.tick_interval,
            target,
        })
    }

    /// Resolve template parameters (explicit overrides first, then `lookup`)
    /// and build the profile.
    pub fn resolve<F>(
        config: &LoadTestConfig,
        overrides: &[(String, String)],
        lookup: F,
    ) -> Result<Self, LoadTestError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let url = UrlTemplate::parse(config.settings.target_url.clone());
        let params = TemplateParams::resolve(&url, overrides, lookup)?;
        Self::from_config(config, params)
    }

    /// Append a programmatic check (e.g. a custom
    /// [`CheckPredicate`](crate::loadtest::check::CheckPredicate)).
    pub fn with_check(mut self, check: Check) -> Self {
        let mut checks: Vec<Check> = self.checks.iter().cloned().collect();
        checks.push(check);
        self.checks = checks.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loadtest::check::{CheckConfig, CheckKind};
    use crate::loadtest::config::{Settings, Stage};

    fn config(url: &str, stages: Vec<Stage>) -> LoadTestConfig {
        LoadTestConfig {
            settings: Settings::with_target(url),
            stage: stages,
            check: vec![CheckConfig {
                name: "status was 200".to_string(),
                kind: CheckKind::StatusEquals { status: 200 },
            }],
            threshold: vec![],
        }
    }

    #[test]
    fn test_profile_resolves_params() {
        let cfg = config(
            "http://${ALB_DNS}/load?duration=1",
            vec![Stage::new(Duration::from_secs(60), 50)],
        );
        let overrides = vec![("ALB_DNS".to_string(), "lb.internal".to_string())];
        let profile = RunProfile::resolve(&cfg, &overrides, |_| None).unwrap();
        assert_eq!(profile.target.as_str(), "http://lb.internal/load?duration=1");
        assert_eq!(profile.checks.len(), 1);
        assert_eq!(profile.scheduler.max_target(), 50);
        assert_eq!(profile.request.iteration_sleep, Duration::from_secs(1));
    }

    #[test]
    fn test_unresolved_param_is_config_error() {
        let cfg = config("http://${ALB_DNS}/load", vec![Stage::new(Duration::from_secs(1), 1)]);
        let err = RunProfile::resolve(&cfg, &[], |_| None).unwrap_err();
        assert!(matches!(err, LoadTestError::UnresolvedParam { .. }));
    }

    #[test]
    fn test_zero_duration_stage_is_config_error() {
        let cfg = config(
            "http://localhost/",
            vec![Stage::new(Duration::from_secs(10), 2), Stage::new(Duration::ZERO, 5)],
        );
        let err = RunProfile::from_config(&cfg, TemplateParams::new()).unwrap_err();
        assert!(matches!(err, LoadTestError::ConfigValidation { .. }));
    }

    #[test]
    fn test_with_check_appends() {
        let cfg = config("http://localhost/", vec![Stage::new(Duration::from_secs(1), 1)]);
        let profile = RunProfile::from_config(&cfg, TemplateParams::new())
            .unwrap()
            .with_check(Check::new("ok-ish", CheckKind::StatusIn { statuses: vec![200, 204] }));
        let names: Vec<&str> = profile.checks.iter().map(Check::name).collect();
        assert_eq!(names, vec!["status was 200", "ok-ish"]);
    }
}
