use casetrail_core::challenge::{
    calculate_time_bonus, calculate_timer_score, calculate_urgency_level, remaining_percentage,
    ScoreInput,
};
use casetrail_core::TrainingConfig;
use clap::Subcommand;
use serde_json::json;

#[derive(Subcommand)]
pub enum ScoreAction {
    /// Score one attempt using the configured weights
    Calc {
        /// Time limit in seconds
        #[arg(long)]
        limit: u32,
        /// Seconds used
        #[arg(long)]
        used: f64,
        /// Accuracy between 0.0 and 1.0
        #[arg(long, default_value = "1.0")]
        accuracy: f64,
        /// Treat the attempt as not completed
        #[arg(long)]
        incomplete: bool,
    },
    /// Time bonus for a base score
    Bonus {
        #[arg(long)]
        limit: u32,
        #[arg(long)]
        used: f64,
        #[arg(long)]
        base: u32,
    },
    /// Urgency level for the remaining time
    Urgency {
        /// Seconds left
        #[arg(long)]
        left: u32,
        /// Total seconds
        #[arg(long)]
        total: u32,
    },
}

pub fn run(action: ScoreAction) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        ScoreAction::Calc {
            limit,
            used,
            accuracy,
            incomplete,
        } => {
            let config = TrainingConfig::load_or_default();
            let input = ScoreInput::new(limit, used, accuracy, !incomplete)
                .with_weights(config.scoring_weights());
            let result = calculate_timer_score(input);
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        ScoreAction::Bonus { limit, used, base } => {
            let bonus = calculate_time_bonus(limit, used, base);
            println!("{}", serde_json::to_string_pretty(&bonus)?);
        }
        ScoreAction::Urgency { left, total } => {
            let level = calculate_urgency_level(left, total);
            let out = json!({
                "level": level,
                "percentage": remaining_percentage(left, total),
            });
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
    }
    Ok(())
}
