//! Human-readable summaries of a [`ResultSet`].
//!
//! Significance stars use a fixed 5% level; interval labels follow the
//! configured `alpha`.

use crate::result::{EffectRow, ResultSet};
use std::fmt;

const STAR_LEVEL: f64 = 0.05;

fn star(p_value: Option<f64>) -> &'static str {
    if p_value.is_some_and(|p| p < STAR_LEVEL) {
        "*"
    } else {
        ""
    }
}

fn format_p(p_value: Option<f64>) -> String {
    p_value.map_or_else(|| "n/a".to_string(), |p| format!("{p:.4}"))
}

fn format_ci(lower: f64, upper: f64) -> String {
    format!("[{lower:.4}, {upper:.4}]")
}

impl ResultSet {
    fn ci_label(&self) -> String {
        format!("{:.0}% CI", (1.0 - self.config().alpha) * 100.0)
    }

    fn header_lines(&self) -> [String; 3] {
        let config = self.config();
        [
            format!(
                "Control group: {} | Method: {} | Anticipation: {} | Base period: {}",
                config.control_group, config.estimation_method, config.anticipation, config.base_period
            ),
            format!(
                "Units: {} | Periods: {} | Clusters: {} | Cohorts: {}",
                self.n_units(),
                self.n_periods(),
                self.n_clusters(),
                self.cohort_sizes().len()
            ),
            format!("Inference: {}", self.inference_method()),
        ]
    }

    /// Format as ASCII table for terminal display.
    pub fn to_ascii_table(&self) -> String {
        let mut output = String::new();
        let ci_label = self.ci_label();

        output.push_str("\nStaggered Difference-in-Differences\n");
        for line in self.header_lines() {
            output.push_str(&line);
            output.push('\n');
        }
        output.push_str(&"=".repeat(80));
        output.push('\n');

        if let Some(overall) = self.overall() {
            output.push_str("\nOverall ATT:\n");
            output.push_str(&"-".repeat(80));
            output.push('\n');
            output.push_str(&format!("  ATT:                      {:.4}{}\n", overall.estimate, star(overall.p_value)));
            output.push_str(&format!("  Std. Error:               {:.4}\n", overall.se));
            output.push_str(&format!(
                "  {:<26}{}\n",
                format!("{ci_label}:"),
                format_ci(overall.ci_lower, overall.ci_upper)
            ));
            output.push_str(&format!("  p-value:                  {}\n", format_p(overall.p_value)));
        }

        if !self.event_study().is_empty() {
            output.push_str("\nEvent Study:\n");
            output.push_str(&"-".repeat(80));
            output.push('\n');
            output.push_str(&format!(
                "{:<12} {:>12} {:>12} {:>28} {:>10}\n",
                "Event Time", "ATT", "SE", ci_label, "Cohorts"
            ));
            output.push_str(&"-".repeat(80));
            output.push('\n');
            for row in self.event_study() {
                output.push_str(&format!(
                    "{:<12} {:>12.4} {:>12.4} {:>28} {:>10}{}\n",
                    row.event_time,
                    row.estimate,
                    row.se,
                    format_ci(row.ci_lower, row.ci_upper),
                    row.n_cohorts,
                    star(row.p_value)
                ));
            }
        }

        if !self.groups().is_empty() {
            output.push_str("\nEffects by Cohort:\n");
            output.push_str(&"-".repeat(80));
            output.push('\n');
            output.push_str(&format!(
                "{:<12} {:>12} {:>12} {:>28} {:>10}\n",
                "Cohort", "ATT", "SE", ci_label, "Units"
            ));
            output.push_str(&"-".repeat(80));
            output.push('\n');
            for row in self.groups() {
                output.push_str(&format!(
                    "{:<12} {:>12.4} {:>12.4} {:>28} {:>10}{}\n",
                    row.group,
                    row.estimate,
                    row.se,
                    format_ci(row.ci_lower, row.ci_upper),
                    row.cohort_size,
                    star(row.p_value)
                ));
            }
        }

        output.push_str("\nGroup-Time Effects:\n");
        output.push_str(&"-".repeat(80));
        output.push('\n');
        output.push_str(&format!(
            "{:<8} {:<8} {:>12} {:>12} {:>28} {:>8}\n",
            "Group", "Time", "ATT(g,t)", "SE", ci_label, "N"
        ));
        output.push_str(&"-".repeat(80));
        output.push('\n');
        for row in self.group_time() {
            output.push_str(&format!(
                "{:<8} {:<8} {:>12.4} {:>12.4} {:>28} {:>8}{}\n",
                row.group,
                row.time,
                row.att,
                row.se,
                format_ci(row.ci_lower, row.ci_upper),
                row.n_treated + row.n_control,
                star(row.p_value)
            ));
        }

        if !self.skipped().is_empty() {
            output.push_str(&format!("\nSkipped Cells ({}):\n", self.skipped().len()));
            output.push_str(&"-".repeat(80));
            output.push('\n');
            for cell in self.skipped() {
                output.push_str(&format!("  ATT({},{}): {}\n", cell.group, cell.time, cell.reason));
            }
        }

        if !self.diagnostics().is_empty() {
            output.push_str("\nDiagnostics:\n");
            output.push_str(&"-".repeat(80));
            output.push('\n');
            for diagnostic in self.diagnostics() {
                output.push_str(&format!("  - {diagnostic}\n"));
            }
        }

        output.push_str(&"=".repeat(80));
        output.push('\n');
        output.push_str("* p < 0.05\n");

        output
    }

    /// Format as Markdown for documentation.
    pub fn to_markdown(&self) -> String {
        let mut output = String::new();
        let ci_label = self.ci_label();

        output.push_str("# Staggered Difference-in-Differences\n\n");
        for line in self.header_lines() {
            output.push_str(&format!("- {line}\n"));
        }
        output.push('\n');

        if let Some(overall) = self.overall() {
            output.push_str("## Overall ATT\n\n");
            output.push_str(&format!("- **ATT:** {:.4}{}\n", overall.estimate, star(overall.p_value)));
            output.push_str(&format!("- **Std. Error:** {:.4}\n", overall.se));
            output.push_str(&format!(
                "- **{ci_label}:** {}\n",
                format_ci(overall.ci_lower, overall.ci_upper)
            ));
            output.push_str(&format!("- **p-value:** {}\n\n", format_p(overall.p_value)));
        }

        if !self.event_study().is_empty() {
            output.push_str("## Event Study\n\n");
            output.push_str(&format!("| Event Time | ATT | SE | {ci_label} | Cohorts |\n"));
            output.push_str("|------------|-----|----|--------|---------|\n");
            for row in self.event_study() {
                output.push_str(&format!(
                    "| {} | {:.4}{} | {:.4} | {} | {} |\n",
                    row.event_time,
                    row.estimate,
                    star(row.p_value),
                    row.se,
                    format_ci(row.ci_lower, row.ci_upper),
                    row.n_cohorts
                ));
            }
            output.push('\n');
        }

        if !self.groups().is_empty() {
            output.push_str("## Effects by Cohort\n\n");
            output.push_str(&format!("| Cohort | ATT | SE | {ci_label} | Units |\n"));
            output.push_str("|--------|-----|----|--------|-------|\n");
            for row in self.groups() {
                output.push_str(&format!(
                    "| {} | {:.4}{} | {:.4} | {} | {} |\n",
                    row.group,
                    row.estimate,
                    star(row.p_value),
                    row.se,
                    format_ci(row.ci_lower, row.ci_upper),
                    row.cohort_size
                ));
            }
            output.push('\n');
        }

        output.push_str("## Group-Time Effects\n\n");
        output.push_str(&format!("| Group | Time | ATT(g,t) | SE | {ci_label} |\n"));
        output.push_str("|-------|------|----------|----|--------|\n");
        for row in self.group_time() {
            output.push_str(&format!(
                "| {} | {} | {:.4}{} | {:.4} | {} |\n",
                row.group,
                row.time,
                row.att,
                star(row.p_value),
                row.se,
                format_ci(row.ci_lower, row.ci_upper)
            ));
        }

        if !self.diagnostics().is_empty() {
            output.push_str("\n## Diagnostics\n\n");
            for diagnostic in self.diagnostics() {
                output.push_str(&format!("- {diagnostic}\n"));
            }
        }

        output
    }
}

impl fmt::Display for ResultSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Staggered DiD: {} cells, {} skipped ({})",
            self.group_time().len(),
            self.skipped().len(),
            self.inference_method()
        )?;
        if let Some(EffectRow { estimate, se, .. }) = self.overall() {
            writeln!(f, "  Overall ATT: {estimate:.4} (SE {se:.4})")?;
        }
        for row in self.event_study() {
            writeln!(
                f,
                "  e = {:>3}: {:.4} (SE {:.4}){}",
                row.event_time,
                row.estimate,
                row.se,
                star(row.p_value)
            )?;
        }
        Ok(())
    }
}

/// Overall effect per anticipation window.
///
/// # Arguments
///
/// * `runs` - Anticipation value and the result set fitted with it
pub fn sweep_table(runs: &[(u32, ResultSet)]) -> String {
    let mut output = String::new();

    output.push_str("\nAnticipation Sensitivity\n");
    output.push_str(&"=".repeat(80));
    output.push('\n');
    output.push_str(&format!(
        "{:<14} {:>12} {:>12} {:>28} {:>8}\n",
        "Anticipation", "ATT", "SE", "CI", "Cells"
    ));
    output.push_str(&"-".repeat(80));
    output.push('\n');

    for (anticipation, results) in runs {
        match results.overall() {
            Some(overall) => output.push_str(&format!(
                "{:<14} {:>12.4} {:>12.4} {:>28} {:>8}{}\n",
                anticipation,
                overall.estimate,
                overall.se,
                format_ci(overall.ci_lower, overall.ci_upper),
                results.group_time().len(),
                star(overall.p_value)
            )),
            None => output.push_str(&format!(
                "{:<14} {:>12} {:>12} {:>28} {:>8}\n",
                anticipation,
                "n/a",
                "n/a",
                "",
                results.group_time().len()
            )),
        }
    }

    output.push_str(&"=".repeat(80));
    output.push('\n');
    output
}
