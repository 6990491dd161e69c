//! Ordered recommendation rules. Each rule inspects the computed metrics
//! and optionally contributes one line of advice.

use chrono::Duration;

use super::{Mttr, RankedCount, VolumeTrend};

pub const WELL_TUNED: &str = "Alerting looks well-tuned. No action needed.";

/// Inputs available to every rule.
#[derive(Debug, Clone)]
pub struct RuleContext<'a> {
    pub total: usize,
    pub active: usize,
    pub top_condition: Option<&'a RankedCount>,
    pub trend: VolumeTrend,
    pub mttr: &'a Mttr,
}

type Rule = fn(&RuleContext<'_>) -> Option<String>;

/// Evaluated top to bottom.
const RULES: &[Rule] = &[
    mostly_active,
    dominant_condition,
    high_volume,
    slow_resolution,
];

pub fn recommend(ctx: &RuleContext<'_>) -> Vec<String> {
    let advice: Vec<String> = RULES.iter().filter_map(|rule| rule(ctx)).collect();
    if advice.is_empty() {
        vec![WELL_TUNED.to_string()]
    } else {
        advice
    }
}

/// More than half of all incidents are still open.
fn mostly_active(ctx: &RuleContext<'_>) -> Option<String> {
    (ctx.total > 0 && ctx.active * 2 > ctx.total).then(|| {
        format!(
            "{} of {} alerts are still active. Review alert thresholds to cut noise.",
            ctx.active, ctx.total
        )
    })
}

/// A single condition produces more than 30% of all incidents.
fn dominant_condition(ctx: &RuleContext<'_>) -> Option<String> {
    let top = ctx.top_condition?;
    (ctx.total > 0 && top.count * 10 > ctx.total * 3).then(|| {
        let share = top.count as f64 / ctx.total as f64 * 100.0;
        format!(
            "'{}' accounts for {:.0}% of alerts. Investigate this condition first.",
            top.name, share
        )
    })
}

fn high_volume(ctx: &RuleContext<'_>) -> Option<String> {
    (ctx.trend == VolumeTrend::High).then(|| {
        "Alert volume is high. Consider consolidating related conditions.".to_string()
    })
}

/// Mean time to resolution above four hours.
fn slow_resolution(ctx: &RuleContext<'_>) -> Option<String> {
    let mean = ctx.mttr.mean()?;
    (mean > Duration::hours(4)).then(|| {
        format!(
            "Mean time to resolution is {}. Review escalation paths and runbooks.",
            ctx.mttr
        )
    })
}
