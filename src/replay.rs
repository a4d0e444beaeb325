//! Scripted sessions against the simulated browser.
//!
//! A script is JSON lines, one step per line:
//!
//! ```text
//! {"at_ms": 0, "action": "start", "max_warnings": 3}
//! {"at_ms": 1200, "action": "browser", "event": {"type": "window_blur"}}
//! {"at_ms": 4000, "action": "faces", "count": 2}
//! ```
//!
//! Between steps the clock moves in fixed increments so every interval timer
//! fires at its own deadline.

use crate::audit::SharedAuditLog;
use crate::config::ProctorConfig;
use crate::core::lifecycle::{LifecycleController, LifecyclePhase, SubmissionNotice};
use crate::error::ScriptError;
use crate::monitor::{KeyboardGuard, MonitorSet, Sensors};
use crate::platform::{
    BrowserEvent, BrowserInfo, FullscreenPolicy, MediaKind, SensorFeed, SimulatedPlatform,
};
use crate::reporter::ViolationReporter;
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

/// Clock step between script actions.
pub const RESOLUTION_MS: i64 = 100;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptStep {
    /// Offset from the start of the script
    pub at_ms: u64,
    #[serde(flatten)]
    pub action: ScriptAction,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ScriptAction {
    Start {
        #[serde(default)]
        session_id: Option<String>,
        #[serde(default)]
        test_id: Option<String>,
        #[serde(default)]
        max_warnings: Option<u32>,
    },
    Browser {
        event: BrowserEvent,
    },
    Permission {
        media: MediaKind,
        granted: bool,
    },
    Faces {
        count: u32,
    },
    Audio {
        label: String,
        confidence: f64,
    },
    Gaze {
        label: String,
        confidence: f64,
    },
    Brightness {
        level: f64,
    },
    /// What the browser reports about itself; checked at the next start
    BrowserInfo {
        browser_name: String,
        #[serde(default)]
        browser_version: Option<String>,
        #[serde(default)]
        user_agent: Option<String>,
    },
    /// Change how the browser answers fullscreen requests
    FullscreenPolicy {
        policy: FullscreenPolicy,
    },
    Submit,
    End,
}

/// Parse a JSON-lines script. Blank lines and `#` comments are skipped.
pub fn parse_script(input: &str) -> Result<Vec<ScriptStep>, ScriptError> {
    let mut steps: Vec<ScriptStep> = Vec::new();
    for (index, raw) in input.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let step = parse_step(line, index + 1)?;
        if let Some(previous) = steps.last() {
            if step.at_ms < previous.at_ms {
                return Err(ScriptError::OutOfOrder {
                    line: index + 1,
                    at_ms: step.at_ms,
                });
            }
        }
        steps.push(step);
    }
    Ok(steps)
}

/// Parse a single script line.
pub fn parse_step(line: &str, line_number: usize) -> Result<ScriptStep, ScriptError> {
    serde_json::from_str(line).map_err(|source| ScriptError::Parse {
        line: line_number,
        source,
    })
}

/// How a replay ended.
#[derive(Debug, Clone, Serialize)]
pub struct ReplaySummary {
    pub steps: usize,
    pub elapsed_ms: i64,
    pub phase: LifecyclePhase,
    pub warnings_remaining: u32,
    pub keys_blocked: u32,
    pub fullscreen_requests: u32,
    pub submission: Option<SubmissionNotice>,
}

/// Drives a [`LifecycleController`] over a simulated browser.
pub struct ReplayRunner {
    controller: LifecycleController<SimulatedPlatform>,
    feed: SensorFeed,
    base: DateTime<Utc>,
    clock: DateTime<Utc>,
    max_warnings: u32,
    steps: usize,
}

impl ReplayRunner {
    pub fn new(
        config: &ProctorConfig,
        reporter: Box<dyn ViolationReporter>,
        audit: SharedAuditLog,
        base: DateTime<Utc>,
    ) -> Self {
        let feed = SensorFeed::new();
        let monitors = MonitorSet::from_config(
            config,
            Sensors::from_feed(&feed, config.lighting.clone()),
        );
        let controller =
            LifecycleController::new(config, SimulatedPlatform::new(), monitors, reporter, audit);
        Self {
            controller,
            feed,
            base,
            clock: base,
            max_warnings: config.max_warnings,
            steps: 0,
        }
    }

    /// Move the clock forward to `target`, letting timers fire on the way.
    pub fn advance_to(&mut self, target: DateTime<Utc>) {
        let step = TimeDelta::milliseconds(RESOLUTION_MS);
        while self.clock < target {
            self.clock = (self.clock + step).min(target);
            self.controller.advance(self.clock);
        }
    }

    /// Apply one action at the current clock.
    pub fn apply(&mut self, action: &ScriptAction) {
        let now = self.clock;
        self.steps += 1;
        match action {
            ScriptAction::Start {
                session_id,
                test_id,
                max_warnings,
            } => {
                let session_id = session_id
                    .clone()
                    .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
                let test_id = test_id.clone().unwrap_or_else(|| "replay".to_string());
                let budget = max_warnings.unwrap_or(self.max_warnings);
                if let Err(e) = self.controller.start(session_id, test_id, budget, now) {
                    tracing::warn!(error = %e, "start ignored");
                }
            }
            ScriptAction::Browser { event } => {
                self.controller.platform_mut().apply(event);
                let prevented = self.controller.handle_event(event.clone(), now);
                if prevented {
                    tracing::debug!(?event, "default action cancelled");
                }
            }
            ScriptAction::Permission { media, granted } => {
                self.controller
                    .platform_mut()
                    .set_permission(*media, *granted);
            }
            ScriptAction::Faces { count } => self.feed.set_faces(*count),
            ScriptAction::Audio { label, confidence } => {
                self.feed.set_audio(label.clone(), *confidence)
            }
            ScriptAction::Gaze { label, confidence } => {
                self.feed.set_gaze(label.clone(), *confidence)
            }
            ScriptAction::Brightness { level } => self.feed.set_brightness(*level),
            ScriptAction::BrowserInfo {
                browser_name,
                browser_version,
                user_agent,
            } => {
                self.controller.platform_mut().set_browser(BrowserInfo {
                    browser_name: browser_name.clone(),
                    browser_version: browser_version.clone(),
                    user_agent: user_agent.clone(),
                });
            }
            ScriptAction::FullscreenPolicy { policy } => {
                self.controller
                    .platform_mut()
                    .set_fullscreen_policy(*policy);
            }
            ScriptAction::Submit => {
                if let Err(e) = self.controller.submit(now) {
                    tracing::warn!(error = %e, "submit ignored");
                }
            }
            ScriptAction::End => {
                self.controller.end();
            }
        }
    }

    /// Advance to the step's offset, then apply it.
    pub fn run_step(&mut self, step: &ScriptStep) {
        let offset = i64::try_from(step.at_ms).unwrap_or(i64::MAX);
        self.advance_to(self.base + TimeDelta::milliseconds(offset));
        self.apply(&step.action);
    }

    pub fn run(&mut self, steps: &[ScriptStep]) -> ReplaySummary {
        for step in steps {
            self.run_step(step);
        }
        self.summary()
    }

    pub fn summary(&self) -> ReplaySummary {
        ReplaySummary {
            steps: self.steps,
            elapsed_ms: (self.clock - self.base).num_milliseconds(),
            phase: self.controller.phase(),
            warnings_remaining: self.controller.warnings_remaining(),
            keys_blocked: self
                .controller
                .monitors()
                .get::<KeyboardGuard>()
                .map(|guard| guard.blocked())
                .unwrap_or(0),
            fullscreen_requests: self.controller.platform().fullscreen_requests(),
            submission: self.controller.last_submission().cloned(),
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock
    }

    pub fn feed(&self) -> &SensorFeed {
        &self.feed
    }

    pub fn controller(&self) -> &LifecycleController<SimulatedPlatform> {
        &self.controller
    }

    pub fn controller_mut(&mut self) -> &mut LifecycleController<SimulatedPlatform> {
        &mut self.controller
    }
}
