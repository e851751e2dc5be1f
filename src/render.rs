use itertools::Itertools;
use owo_colors::OwoColorize;

use crate::explain::ExplanationNode;
use crate::game::HandState;
use crate::pipeline::PipelineOutput;
use crate::report::{EQUITY_BUCKET_LABELS, Side, StrategyReport};

const TOP_COMBOS: usize = 5;

/// Terminal rendering for `analyze` and `normalize`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Renderer {
    pub no_color: bool,
}

impl Renderer {
    pub fn new(no_color: bool) -> Self {
        Self { no_color }
    }

    pub fn output(&self, output: &PipelineOutput) -> String {
        let mut sections = vec![self.state(output.state())];
        match output.explanation() {
            Some(explanation) => sections.push(self.explanation(explanation)),
            None => sections.push(self.report(output.report())),
        }
        sections.join("\n\n")
    }

    pub fn state(&self, state: &HandState) -> String {
        let hero = state
            .hole_cards
            .map(|cards| cards.iter().map(|card| card.pretty()).join(" "))
            .unwrap_or_else(|| "--".to_string());
        let board = state.board().iter().map(|card| card.pretty()).join(" ");
        let line = state.preflop_action.join(" > ");

        if self.no_color {
            format!(
                "Spot {} | Hero {} | Board {} | Pot {}bb | Stack {}bb | Preflop {}",
                state.street(),
                hero,
                board,
                state.pot_before_flop,
                state.effective_stack,
                line
            )
        } else {
            format!(
                "{} {} {} {} {} {} {} {}bb {} {}bb {} {}",
                "Spot".bold().cyan(),
                state.street(),
                "Hero".bold().white(),
                hero.bold().yellow(),
                "Board".bold().white(),
                board.bold().blue(),
                "Pot".bold().white(),
                state.pot_before_flop,
                "Stack".bold().white(),
                state.effective_stack,
                "Preflop".bold().white(),
                line
            )
        }
    }

    pub fn explanation(&self, explanation: &ExplanationNode) -> String {
        if self.no_color {
            return explanation.render_plain();
        }
        explanation
            .flatten()
            .iter()
            .map(|line| {
                let indent = "  ".repeat(line.depth);
                match &line.value {
                    Some(value) => format!("{indent}{}: {value}", line.label.bold().green()),
                    None => format!("{indent}{}", line.label.bold().magenta()),
                }
            })
            .join("\n")
    }

    pub fn report(&self, report: &StrategyReport) -> String {
        let mut lines = Vec::new();
        for side in [Side::Hero, Side::Villain] {
            lines.push(self.side_summary(report, side));
            for (combo, stats) in report.top_combos(side, TOP_COMBOS) {
                lines.push(format!(
                    "  {combo:<6} EV {:>7.2}  Equity {:>5.1}%  EQR {:.2}",
                    stats.ev,
                    stats.equity * 100.0,
                    stats.eqr
                ));
            }
        }
        lines.push(self.heading("Buckets"));
        for (label, hero, villain) in itertools::izip!(
            EQUITY_BUCKET_LABELS,
            report.hero_equity_buckets,
            report.villain_equity_buckets
        ) {
            lines.push(format!("  {label:<7} Hero {hero:>5.1}  Villain {villain:>5.1}"));
        }
        if let Some(actions) = &report.legal_actions {
            lines.push(format!("{} {}", self.heading("Actions"), actions.join(", ")));
        }
        lines.join("\n")
    }

    fn side_summary(&self, report: &StrategyReport, side: Side) -> String {
        let title = match side {
            Side::Hero => "Hero",
            Side::Villain => "Villain",
        };
        let equity = report
            .range_equity(side)
            .map(|equity| format!("{:.1}%", equity * 100.0))
            .unwrap_or_else(|| "--".to_string());
        format!(
            "{} {} combos, range equity {equity}",
            self.heading(title),
            report.side(side).len()
        )
    }

    fn heading(&self, text: &str) -> String {
        if self.no_color {
            text.to_string()
        } else {
            text.bold().cyan().to_string()
        }
    }
}
