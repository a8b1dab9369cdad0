/// Engine acquisition strategy
///
/// Turns a capability profile into an ordered plan of candidate attempts and
/// runs it until one attempt binds a session. The plan is built by a fixed
/// list of candidate generators per path (API-only, constrained, standard);
/// each generator is a pure function of the profile, so the whole ladder can
/// be inspected without touching hardware.

use crate::device::DeviceProvider;
use crate::engine::{EngineBackend, UNIVERSAL_KEYWORD};
use crate::profile::{ArchClass, CandidateConfig, CapabilityProfile};
use crate::session::BoundSession;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum AcquisitionError {
    #[error("API-only acquisition failed after {attempts} attempts")]
    ApiModeFailed { attempts: usize },

    #[error("Constrained-architecture acquisition failed after {attempts} attempts")]
    ConstrainedArchFailed { attempts: usize },

    #[error("Exhausted all {attempts} acquisition candidates")]
    ExhaustedAllCandidates { attempts: usize },

    #[error("A wake word session is already bound")]
    AlreadyBound,
}

/// Retry budget for a primary keyword that is advertised but fails to build
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub primary_retries: u32,

    #[serde(with = "duration_ms")]
    pub retry_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            primary_retries: 3,
            retry_delay: Duration::from_millis(500),
        }
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

/// Which branch of the ladder a profile selects
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquisitionPath {
    ApiOnly,
    Constrained,
    Standard,
}

impl AcquisitionPath {
    pub fn for_profile(profile: &CapabilityProfile) -> Self {
        if profile.api_only {
            AcquisitionPath::ApiOnly
        } else if profile.arch == ArchClass::Constrained {
            AcquisitionPath::Constrained
        } else {
            AcquisitionPath::Standard
        }
    }

    fn exhausted(&self, attempts: usize) -> AcquisitionError {
        match self {
            AcquisitionPath::ApiOnly => AcquisitionError::ApiModeFailed { attempts },
            AcquisitionPath::Constrained => AcquisitionError::ConstrainedArchFailed { attempts },
            AcquisitionPath::Standard => AcquisitionError::ExhaustedAllCandidates { attempts },
        }
    }

    fn generators(&self) -> &'static [Generator] {
        match self {
            AcquisitionPath::ApiOnly => API_ONLY_LADDER,
            AcquisitionPath::Constrained => CONSTRAINED_LADDER,
            AcquisitionPath::Standard => STANDARD_LADDER,
        }
    }
}

/// One planned attempt, with the pause to take before it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attempt {
    pub candidate: CandidateConfig,
    pub delay: Duration,
}

impl Attempt {
    fn now(candidate: CandidateConfig) -> Self {
        Self {
            candidate,
            delay: Duration::ZERO,
        }
    }
}

/// The complete, ordered ladder for one profile
#[derive(Debug, Clone)]
pub struct AcquisitionPlan {
    pub path: AcquisitionPath,
    pub attempts: Vec<Attempt>,
}

struct PlanContext<'a> {
    profile: &'a CapabilityProfile,
    access_key: &'a str,
    primary: &'a str,
    primary_available: bool,
    policy: RetryPolicy,
}

type Generator = fn(&PlanContext<'_>) -> Vec<Attempt>;

const API_ONLY_LADDER: &[Generator] = &[primary_keyword, fallback_keywords];

const CONSTRAINED_LADDER: &[Generator] = &[system_library_fallbacks, custom_model];

const STANDARD_LADDER: &[Generator] = &[
    available_primary,
    custom_model_without_primary,
    fallback_keywords,
    primary_retries,
    trimmed_universal,
];

fn primary_keyword(ctx: &PlanContext<'_>) -> Vec<Attempt> {
    vec![Attempt::now(CandidateConfig::builtin(ctx.access_key, ctx.primary))]
}

fn fallback_keywords(ctx: &PlanContext<'_>) -> Vec<Attempt> {
    ctx.profile
        .fallback_keywords
        .iter()
        .map(|label| Attempt::now(CandidateConfig::builtin(ctx.access_key, label.as_str())))
        .collect()
}

fn system_library_fallbacks(ctx: &PlanContext<'_>) -> Vec<Attempt> {
    if !ctx.profile.use_system_libraries {
        return Vec::new();
    }
    ctx.profile
        .fallback_keywords
        .iter()
        .map(|label| {
            Attempt::now(
                CandidateConfig::builtin(ctx.access_key, label.as_str())
                    .with_library(ctx.profile.library_path.clone()),
            )
        })
        .collect()
}

fn custom_model(ctx: &PlanContext<'_>) -> Vec<Attempt> {
    ctx.profile
        .existing_custom_model()
        .map(|path| Attempt::now(CandidateConfig::model_file(ctx.access_key, path)))
        .into_iter()
        .collect()
}

fn available_primary(ctx: &PlanContext<'_>) -> Vec<Attempt> {
    if ctx.primary_available {
        primary_keyword(ctx)
    } else {
        Vec::new()
    }
}

fn custom_model_without_primary(ctx: &PlanContext<'_>) -> Vec<Attempt> {
    if ctx.primary_available {
        Vec::new()
    } else {
        custom_model(ctx)
    }
}

fn primary_retries(ctx: &PlanContext<'_>) -> Vec<Attempt> {
    if !ctx.primary_available {
        return Vec::new();
    }
    (0..ctx.policy.primary_retries)
        .map(|_| Attempt {
            candidate: CandidateConfig::builtin(ctx.access_key, ctx.primary),
            delay: ctx.policy.retry_delay,
        })
        .collect()
}

fn trimmed_universal(ctx: &PlanContext<'_>) -> Vec<Attempt> {
    vec![Attempt::now(CandidateConfig::builtin(
        ctx.access_key.trim(),
        UNIVERSAL_KEYWORD,
    ))]
}

/// Selects and binds a working (engine, device) pair
pub struct AcquisitionStrategy<'a> {
    backend: &'a dyn EngineBackend,
    devices: &'a dyn DeviceProvider,
    access_key: String,
    policy: RetryPolicy,
}

impl<'a> AcquisitionStrategy<'a> {
    pub fn new(
        backend: &'a dyn EngineBackend,
        devices: &'a dyn DeviceProvider,
        access_key: impl Into<String>,
    ) -> Self {
        Self {
            backend,
            devices,
            access_key: access_key.into(),
            policy: RetryPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Build the ordered attempt list for `profile` without running it
    pub fn plan(&self, profile: &CapabilityProfile, primary_keyword: &str) -> AcquisitionPlan {
        let path = AcquisitionPath::for_profile(profile);
        let primary_available =
            path == AcquisitionPath::Standard && self.backend.is_available(primary_keyword);

        let ctx = PlanContext {
            profile,
            access_key: &self.access_key,
            primary: primary_keyword,
            primary_available,
            policy: self.policy,
        };

        let attempts = path
            .generators()
            .iter()
            .flat_map(|generate| generate(&ctx))
            .collect();

        AcquisitionPlan { path, attempts }
    }

    /// Try candidates in priority order until one binds a session
    pub fn acquire(
        &self,
        profile: &CapabilityProfile,
        primary_keyword: &str,
    ) -> Result<BoundSession, AcquisitionError> {
        let plan = self.plan(profile, primary_keyword);
        info!(
            "Acquiring wake word engine via {} ({:?} path, {} candidates)",
            self.backend.name(),
            plan.path,
            plan.attempts.len()
        );

        if plan.path == AcquisitionPath::Standard {
            self.self_test();
        }

        let total = plan.attempts.len();
        for (i, attempt) in plan.attempts.iter().enumerate() {
            if !attempt.delay.is_zero() {
                debug!("Waiting {:?} before retry", attempt.delay);
                std::thread::sleep(attempt.delay);
            }

            let candidate = &attempt.candidate;
            match BoundSession::bind(self.backend, self.devices, candidate, profile.device_index) {
                Ok(session) => {
                    info!(
                        "Attempt {}/{} succeeded with {}{}",
                        i + 1,
                        total,
                        candidate.keyword,
                        library_note(candidate)
                    );
                    return Ok(session);
                }
                Err(e) => {
                    warn!(
                        "Attempt {}/{} with {}{} failed: {}",
                        i + 1,
                        total,
                        candidate.keyword,
                        library_note(candidate),
                        e
                    );
                }
            }
        }

        let err = plan.path.exhausted(total);
        warn!("{}", err);
        Err(err)
    }

    /// Check the backend can build anything at all; failures are only logged
    fn self_test(&self) {
        let probe = CandidateConfig::builtin(self.access_key.as_str(), UNIVERSAL_KEYWORD);
        match self.backend.create(&probe) {
            Ok(engine) => {
                debug!(
                    "Backend self-test passed ({} Hz, {} samples/frame)",
                    engine.sample_rate(),
                    engine.frame_length()
                );
            }
            Err(e) => warn!("Backend self-test failed: {}", e),
        }
    }
}

fn library_note(candidate: &CandidateConfig) -> String {
    candidate
        .library_path
        .as_ref()
        .map(|p| format!(" (library {})", p.display()))
        .unwrap_or_default()
}
