//! End-to-end timed challenge flows driven by a virtual clock.

use std::sync::{Arc, Mutex};

use casetrail_core::challenge::{
    BodyCompletion, ChallengeBody, ChallengeContext, ChallengeEvent, ChallengeHost, CountdownTimer,
    FinalScore, NoopBody, RevealEvent, RevealStage, TimedChallengeContainer, TimerConfig,
    TimerEvent, TimerListener, UrgencyChange, UrgencyLevel,
};
use casetrail_core::clock::VirtualClock;
use casetrail_core::config::TrainingConfig;
use casetrail_core::{ChallengeError, ChallengeState};
use serde_json::json;

#[derive(Default)]
struct Log(Arc<Mutex<Vec<String>>>);

impl Log {
    fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

impl TimerListener for Log {
    fn on_warning(&mut self, time_left: u32) {
        self.0.lock().unwrap().push(format!("warning:{time_left}"));
    }
    fn on_critical(&mut self, time_left: u32) {
        self.0.lock().unwrap().push(format!("critical:{time_left}"));
    }
    fn on_complete(&mut self) {
        self.0.lock().unwrap().push("complete".into());
    }
}

impl ChallengeHost for Log {
    fn on_complete(&mut self, result: &FinalScore) {
        self.0.lock().unwrap().push(format!("complete:{}", result.final_score));
    }
    fn on_time_up(&mut self, result: &FinalScore) {
        self.0.lock().unwrap().push(format!("time_up:{}", result.final_score));
    }
    fn on_urgency_change(&mut self, change: &UrgencyChange) {
        self.0.lock().unwrap().push(format!("urgency:{}", change.level.as_str()));
    }
    fn on_animation_complete(&mut self) {
        self.0.lock().unwrap().push("animation_complete".into());
    }
}

fn shared_log() -> (Arc<Mutex<Vec<String>>>, Log) {
    let inner = Arc::new(Mutex::new(Vec::new()));
    (Arc::clone(&inner), Log(inner))
}

#[test]
fn ten_second_countdown_fires_thresholds_in_order() {
    let clock = VirtualClock::new();
    let (entries, log) = shared_log();
    let mut timer = CountdownTimer::new(TimerConfig::new(10).unwrap(), clock.shared())
        .with_listener(Box::new(log));

    clock.advance_secs(7);
    timer.pump();
    assert_eq!(*entries.lock().unwrap(), vec!["warning:3"]);

    clock.advance_secs(2);
    timer.pump();
    assert_eq!(*entries.lock().unwrap(), vec!["warning:3", "critical:1"]);

    clock.advance_secs(1);
    timer.pump();
    clock.advance_secs(5);
    timer.pump();
    let all = entries.lock().unwrap().clone();
    assert_eq!(all, vec!["warning:3", "critical:1", "complete"]);
    assert!(!timer.is_running());
}

#[test]
fn immediate_completion_reports_once() {
    let clock = VirtualClock::new();
    let (entries, host) = shared_log();
    let config = TrainingConfig::default().challenge_config(60, "Seize the laptop").unwrap();
    let mut challenge =
        TimedChallengeContainer::new(config, Box::new(NoopBody), Box::new(host), clock.shared())
            .unwrap();

    challenge.start_challenge().unwrap();
    let result = challenge.report_complete(0.8, json!({ "answers": 4 })).unwrap();

    assert_eq!(challenge.state(), ChallengeState::Completed);
    assert!(result.score.total_score <= 100);
    assert!(!result.timed_out);
    let completions = entries
        .lock()
        .unwrap()
        .iter()
        .filter(|e| e.starts_with("complete:"))
        .count();
    assert_eq!(completions, 1);

    let err = challenge.report_complete(1.0, json!(null)).unwrap_err();
    assert!(matches!(err, ChallengeError::InvalidTransition { .. }));
}

#[test]
fn configured_challenge_runs_through_auto_continued_reveal() {
    let mut settings = TrainingConfig::default();
    settings.set("reveal.auto_continue_ms", "2000").unwrap();

    let clock = VirtualClock::new();
    let (entries, host) = shared_log();
    let config = settings.challenge_config(60, "Trace the wallet").unwrap();
    let mut challenge =
        TimedChallengeContainer::new(config, Box::new(NoopBody), Box::new(host), clock.shared())
            .unwrap();

    challenge.start_challenge().unwrap();
    challenge.track_action("select_exchange", json!({ "exchange": "A" })).unwrap();
    clock.advance_secs(20);
    let ticks = challenge
        .pump()
        .into_iter()
        .filter(|e| matches!(e, ChallengeEvent::Timer { .. }))
        .count();
    assert_eq!(ticks, 20);
    assert_eq!(challenge.timer().time_left(), 40);

    let result = challenge.report_complete(0.9, json!(null)).unwrap();
    // 0.4 * 100 + 0.4 * 100 + 0.2 * 90 = 98, plus 30% bonus for finishing in a third of the time
    assert_eq!(result.score.total_score, 98);
    assert_eq!(result.bonus.unwrap().bonus_percentage, 30);
    assert_eq!(result.final_score, 127);
    assert_eq!(result.actions_count, 1);

    let reveal_events = |events: Vec<ChallengeEvent>| -> Vec<RevealEvent> {
        events
            .into_iter()
            .filter_map(|e| match e {
                ChallengeEvent::Reveal { event } => Some(event),
                _ => None,
            })
            .collect()
    };

    assert!(reveal_events(challenge.pump()).is_empty());
    clock.advance(500);
    assert_eq!(reveal_events(challenge.pump()), vec![RevealEvent::Shown]);
    clock.advance(1_000);
    assert_eq!(reveal_events(challenge.pump()), vec![RevealEvent::DetailsRevealed]);
    clock.advance(2_000);
    assert_eq!(reveal_events(challenge.pump()), vec![RevealEvent::Continued]);
    clock.advance(500);
    assert_eq!(reveal_events(challenge.pump()), vec![RevealEvent::AnimationComplete]);
    clock.advance(10_000);
    assert!(reveal_events(challenge.pump()).is_empty());

    let reveal = challenge.reveal().unwrap();
    assert_eq!(reveal.stage(), RevealStage::Complete);
    assert_eq!(reveal.summary().final_score, 127);

    let log = entries.lock().unwrap();
    assert_eq!(log.iter().filter(|e| *e == "animation_complete").count(), 1);
    assert_eq!(log.first().map(String::as_str), Some("complete:127"));
}

#[test]
fn running_out_of_time_scores_a_timeout() {
    let clock = VirtualClock::new();
    let (entries, host) = shared_log();
    let config = TrainingConfig::default()
        .challenge_config(10, "Preserve the logs")
        .unwrap()
        .with_auto_start(true);
    let mut challenge =
        TimedChallengeContainer::new(config, Box::new(NoopBody), Box::new(host), clock.shared())
            .unwrap();
    assert_eq!(challenge.state(), ChallengeState::Active);

    clock.advance_secs(12);
    let events = challenge.pump();

    let result = events
        .iter()
        .find_map(|e| match e {
            ChallengeEvent::TimedOut { result } => Some(result.clone()),
            _ => None,
        })
        .expect("timeout result");
    assert_eq!(challenge.state(), ChallengeState::Timeout);
    assert!(result.timed_out);
    assert!(result.bonus.is_none());
    assert_eq!(result.score.completion_score, 50);
    assert_eq!(result.score.speed_score, 0);
    assert_eq!(result.score.accuracy_score, 0);
    assert_eq!(result.final_score, 20);
    assert_eq!(challenge.indicator().level(), UrgencyLevel::Critical);

    assert_eq!(
        Log(entries).entries(),
        vec!["urgency:warning", "urgency:critical", "time_up:20"]
    );
    assert!(challenge.report_complete(1.0, json!(null)).is_err());
}

#[test]
fn paused_time_is_not_charged() {
    let clock = VirtualClock::new();
    let config = TrainingConfig::default().challenge_config(30, "Image the drive").unwrap();
    let mut challenge = TimedChallengeContainer::new(
        config,
        Box::new(NoopBody),
        Box::new(casetrail_core::challenge::NoopHost),
        clock.shared(),
    )
    .unwrap();

    challenge.start_challenge().unwrap();
    clock.advance_secs(5);
    challenge.pump();
    challenge.pause_challenge().unwrap();
    assert!(challenge.is_paused());

    clock.advance_secs(120);
    challenge.pump();
    assert_eq!(challenge.timer().time_left(), 25);
    assert_eq!(challenge.state(), ChallengeState::Active);

    challenge.resume_challenge().unwrap();
    clock.advance_secs(5);
    challenge.pump();
    assert_eq!(challenge.timer().time_left(), 20);

    let result = challenge.report_complete(1.0, json!(null)).unwrap();
    assert!((result.score.time_used - 10.0).abs() < 1e-9);
}

#[test]
fn reset_allows_a_fresh_attempt() {
    let clock = VirtualClock::new();
    let config = ChallengeConfigFixture::quick();
    let mut challenge = TimedChallengeContainer::new(
        config,
        Box::new(NoopBody),
        Box::new(casetrail_core::challenge::NoopHost),
        clock.shared(),
    )
    .unwrap();

    challenge.start_challenge().unwrap();
    let first = challenge.report_complete(0.5, json!(null)).unwrap();
    assert_eq!(challenge.reset_challenge(), ChallengeEvent::Reset);
    assert_eq!(challenge.state(), ChallengeState::Ready);
    assert!(challenge.result().is_none());
    assert!(challenge.reveal().is_none());
    assert_eq!(challenge.timer().time_left(), 15);

    challenge.start_challenge().unwrap();
    let second = challenge.report_complete(0.5, json!(null)).unwrap();
    assert_ne!(first.attempt_id, second.attempt_id);
}

#[test]
fn completion_reported_after_the_limit_is_a_timeout() {
    let clock = VirtualClock::new();
    let (entries, host) = shared_log();
    let config = TrainingConfig::default().challenge_config(10, "Freeze the account").unwrap();
    let mut challenge =
        TimedChallengeContainer::new(config, Box::new(NoopBody), Box::new(host), clock.shared())
            .unwrap();

    challenge.start_challenge().unwrap();
    clock.advance_secs(25);

    let err = challenge.track_action("late_click", json!(null)).unwrap_err();
    assert!(matches!(
        err,
        ChallengeError::InvalidTransition { from: ChallengeState::Timeout, .. }
    ));
    assert!(challenge.actions().is_empty());

    let err = challenge.report_complete(1.0, json!(null)).unwrap_err();
    assert!(matches!(
        err,
        ChallengeError::InvalidTransition { from: ChallengeState::Timeout, .. }
    ));
    assert_eq!(challenge.state(), ChallengeState::Timeout);

    let result = challenge.result().unwrap();
    assert!(result.timed_out);
    assert!(result.bonus.is_none());
    assert!((result.score.time_used - 10.0).abs() < 1e-9);

    let log = Log(entries).entries();
    assert!(log.contains(&"time_up:20".to_string()));
    assert!(!log.iter().any(|e| e.starts_with("complete:")));

    // Events produced while catching up are still delivered by the next pump.
    let events = challenge.pump();
    let ticks = events
        .iter()
        .filter(|e| matches!(e, ChallengeEvent::Timer { event: TimerEvent::Tick { .. } }))
        .count();
    assert_eq!(ticks, 10);
    assert_eq!(
        events
            .iter()
            .filter(|e| matches!(e, ChallengeEvent::TimedOut { .. }))
            .count(),
        1
    );
    assert!(challenge.pump().iter().all(|e| !matches!(e, ChallengeEvent::Timer { .. })));
}

#[test]
fn completion_within_the_limit_without_pumping_is_scored() {
    let clock = VirtualClock::new();
    let config = TrainingConfig::default().challenge_config(10, "Freeze the account").unwrap();
    let mut challenge = TimedChallengeContainer::new(
        config,
        Box::new(NoopBody),
        Box::new(casetrail_core::challenge::NoopHost),
        clock.shared(),
    )
    .unwrap();

    challenge.start_challenge().unwrap();
    clock.advance_secs(6);
    let result = challenge.report_complete(1.0, json!(null)).unwrap();

    assert_eq!(challenge.state(), ChallengeState::Completed);
    assert!((result.score.time_used - 6.0).abs() < 1e-9);
    assert_eq!(challenge.timer().time_left(), 4);
}

/// Finishes on its own once the countdown shows `finish_at` or less.
struct SelfReportingBody {
    finish_at: u32,
    ready: bool,
}

impl ChallengeBody for SelfReportingBody {
    fn on_tick(&mut self, ctx: &ChallengeContext) {
        if ctx.time_left <= self.finish_at {
            self.ready = true;
        }
    }

    fn take_completion(&mut self) -> Option<BodyCompletion> {
        if !std::mem::take(&mut self.ready) {
            return None;
        }
        Some(BodyCompletion {
            accuracy: 1.0,
            data: json!({ "source": "body" }),
        })
    }
}

#[test]
fn body_can_report_its_own_completion() {
    let clock = VirtualClock::new();
    let (entries, host) = shared_log();
    let config = TrainingConfig::default().challenge_config(10, "Match the hashes").unwrap();
    let body = SelfReportingBody {
        finish_at: 7,
        ready: false,
    };
    let mut challenge =
        TimedChallengeContainer::new(config, Box::new(body), Box::new(host), clock.shared())
            .unwrap();

    challenge.start_challenge().unwrap();
    clock.advance_secs(2);
    assert!(challenge
        .pump()
        .iter()
        .all(|e| !matches!(e, ChallengeEvent::Completed { .. })));

    clock.advance_secs(3);
    let result = challenge
        .pump()
        .into_iter()
        .find_map(|e| match e {
            ChallengeEvent::Completed { result } => Some(result),
            _ => None,
        })
        .expect("body completion");

    assert_eq!(challenge.state(), ChallengeState::Completed);
    assert!((result.score.time_used - 5.0).abs() < 1e-9);
    assert_eq!(result.score.total_score, 100);
    assert_eq!(result.final_score, 120);
    assert_eq!(result.additional_data, json!({ "source": "body" }));
    assert_eq!(Log(entries).entries(), vec!["complete:120"]);
}

#[test]
fn indicator_follows_configured_thresholds() {
    let mut settings = TrainingConfig::default();
    settings.set("timer.warning_percent", "40").unwrap();

    let clock = VirtualClock::new();
    let (entries, host) = shared_log();
    let config = settings.challenge_config(10, "Review the CCTV").unwrap();
    let mut challenge =
        TimedChallengeContainer::new(config, Box::new(NoopBody), Box::new(host), clock.shared())
            .unwrap();

    challenge.start_challenge().unwrap();
    clock.advance_secs(5);
    assert!(challenge.pump().iter().all(|e| !matches!(e, ChallengeEvent::Urgency { .. })));

    clock.advance_secs(1);
    let events = challenge.pump();
    assert!(events.iter().any(|e| matches!(
        e,
        ChallengeEvent::Timer {
            event: TimerEvent::Warning { time_left: 4 }
        }
    )));
    let change = events
        .iter()
        .find_map(|e| match e {
            ChallengeEvent::Urgency { change } => Some(change.clone()),
            _ => None,
        })
        .expect("urgency change");
    assert_eq!(change.level, UrgencyLevel::Warning);
    assert_eq!(change.time_left, 4);
    assert_eq!(challenge.timer().snapshot().urgency, UrgencyLevel::Warning);
    assert_eq!(Log(entries).entries(), vec!["urgency:warning"]);
}

struct ChallengeConfigFixture;

impl ChallengeConfigFixture {
    fn quick() -> casetrail_core::ChallengeConfig {
        casetrail_core::ChallengeConfig::new(15, "Quick triage").unwrap()
    }
}
