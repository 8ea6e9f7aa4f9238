use casetrail_core::challenge::{
    ChallengeEvent, NoopBody, NoopHost, RevealStage, TimedChallengeContainer,
};
use casetrail_core::clock::VirtualClock;
use casetrail_core::TrainingConfig;
use clap::Subcommand;
use serde_json::json;

/// Reveal stages are polled at this step once the attempt has ended.
const REVEAL_STEP_MS: u64 = 100;
/// Upper bound on simulated reveal time when nobody acknowledges.
const REVEAL_BUDGET_MS: u64 = 60_000;

#[derive(Subcommand)]
pub enum ChallengeAction {
    /// Run one attempt on a virtual clock and print the outcome as JSON
    Simulate {
        /// Time limit in seconds
        #[arg(long)]
        limit: u32,
        /// Challenge title
        #[arg(long, default_value = "Simulated challenge")]
        title: String,
        /// Second at which the attempt is completed; omit to let time run out
        #[arg(long)]
        complete_at: Option<u32>,
        /// Accuracy reported on completion
        #[arg(long, default_value = "1.0")]
        accuracy: f64,
        /// Second at which to pause
        #[arg(long)]
        pause_at: Option<u32>,
        /// Seconds to stay paused
        #[arg(long, default_value = "0")]
        pause_for: u32,
        /// Include every event in the output
        #[arg(long)]
        events: bool,
    },
}

pub fn run(action: ChallengeAction) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        ChallengeAction::Simulate {
            limit,
            title,
            complete_at,
            accuracy,
            pause_at,
            pause_for,
            events,
        } => {
            let config = TrainingConfig::load_or_default();
            let clock = VirtualClock::new();
            let mut challenge = TimedChallengeContainer::new(
                config.challenge_config(limit, title)?,
                Box::new(NoopBody),
                Box::new(NoopHost),
                clock.shared(),
            )?;

            let mut log = vec![challenge.start_challenge()?];
            let mut second = 0;
            while !challenge.state().is_terminal() {
                if complete_at == Some(second) {
                    challenge.report_complete(accuracy, serde_json::Value::Null)?;
                    break;
                }
                if pause_at == Some(second) && pause_for > 0 {
                    challenge.pause_challenge()?;
                    clock.advance_secs(u64::from(pause_for));
                    log.extend(challenge.pump());
                    challenge.resume_challenge()?;
                }
                clock.advance_secs(1);
                second += 1;
                log.extend(challenge.pump());
            }

            let mut waited = 0;
            while waited < REVEAL_BUDGET_MS
                && challenge.reveal().is_some_and(|r| !r.is_complete())
            {
                if challenge.reveal().map(|r| r.stage()) == Some(RevealStage::Details) {
                    log.extend(challenge.acknowledge_result());
                }
                clock.advance(REVEAL_STEP_MS);
                waited += REVEAL_STEP_MS;
                log.extend(challenge.pump());
            }

            let mut out = json!({
                "state": challenge.state(),
                "result": challenge.result(),
                "summary": challenge.reveal().map(|r| r.summary()),
            });
            if events {
                out["events"] = serde_json::to_value(&log)?;
            } else {
                let ticks = log
                    .iter()
                    .filter(|e| matches!(e, ChallengeEvent::Timer { .. }))
                    .count();
                out["timerEvents"] = json!(ticks);
            }
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
    }
    Ok(())
}
