// src/report.rs
//
// Server-rendered, fixed-layout single-page score report. The template
// is an SVG with placeholders; domain rows are generated and spliced in.

use std::sync::OnceLock;

use regex::Regex;

use crate::scoring::DomainTally;

/// Displayed uncertainty around the total score.
pub const SCORE_DELTA: i32 = 30;

const TOTAL_FLOOR: i32 = 400;
const TOTAL_CEILING: i32 = 1600;

/// Coarse per-domain performance indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PerformanceBand {
    Developing,
    Proficient,
    Advanced,
}

impl PerformanceBand {
    pub fn for_tally(correct: i32, total: i32) -> Self {
        if total <= 0 {
            return PerformanceBand::Developing;
        }
        let fraction = correct as f64 / total as f64;
        if fraction < 0.5 {
            PerformanceBand::Developing
        } else if fraction < 0.8 {
            PerformanceBand::Proficient
        } else {
            PerformanceBand::Advanced
        }
    }

    fn label(self) -> &'static str {
        match self {
            PerformanceBand::Developing => "Developing",
            PerformanceBand::Proficient => "Proficient",
            PerformanceBand::Advanced => "Advanced",
        }
    }

    fn color(self) -> &'static str {
        match self {
            PerformanceBand::Developing => "#B45309",
            PerformanceBand::Proficient => "#1D4ED8",
            PerformanceBand::Advanced => "#15803D",
        }
    }
}

pub struct ReportInput {
    pub student_name: String,
    pub test_title: String,
    pub completed_on: String,
    pub total: i32,
    pub verbal: i32,
    pub quant: i32,
    pub domains: Vec<DomainTally>,
    /// Scannable pointer to further practice resources.
    pub resources_code: String,
}

const REPORT_TEMPLATE: &str = r##"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 800 600" width="800" height="600">
  <rect width="800" height="600" fill="#FFFFFF"/>
  <rect x="20" y="20" width="760" height="560" fill="none" stroke="#1E3A8A" stroke-width="3"/>
  <rect x="28" y="28" width="744" height="544" fill="none" stroke="#3B82F6" stroke-width="1"/>

  <text x="400" y="75" text-anchor="middle" font-family="Georgia, serif" font-size="30" font-weight="bold" fill="#1E3A8A" letter-spacing="2">SCORE REPORT</text>
  <text x="400" y="98" text-anchor="middle" font-family="monospace" font-size="11" fill="#475569" letter-spacing="4">{{TEST}}</text>
  <line x1="120" y1="112" x2="680" y2="112" stroke="#1E3A8A" stroke-width="2"/>

  <text x="400" y="148" text-anchor="middle" font-family="Georgia, serif" font-size="24" font-weight="bold" fill="#0F172A">{{STUDENT}}</text>
  <text x="400" y="170" text-anchor="middle" font-family="Georgia, serif" font-size="12" fill="#475569">Completed {{DATE}}</text>

  <g transform="translate(400, 240)">
    <text x="0" y="0" text-anchor="middle" font-family="Georgia, serif" font-size="56" font-weight="bold" fill="#1E3A8A">{{TOTAL}}</text>
    <text x="0" y="26" text-anchor="middle" font-family="Georgia, serif" font-size="13" fill="#475569">Score range {{RANGE_LOW}}&#8211;{{RANGE_HIGH}}</text>
  </g>

  <g transform="translate(230, 320)">
    <rect x="-110" y="-28" width="220" height="56" fill="none" stroke="#3B82F6" stroke-width="1" rx="4"/>
    <text x="0" y="-4" text-anchor="middle" font-family="monospace" font-size="10" fill="#475569" letter-spacing="2">READING AND WRITING</text>
    <text x="0" y="20" text-anchor="middle" font-family="Georgia, serif" font-size="24" font-weight="bold" fill="#0F172A">{{VERBAL}}</text>
  </g>
  <g transform="translate(570, 320)">
    <rect x="-110" y="-28" width="220" height="56" fill="none" stroke="#3B82F6" stroke-width="1" rx="4"/>
    <text x="0" y="-4" text-anchor="middle" font-family="monospace" font-size="10" fill="#475569" letter-spacing="2">MATH</text>
    <text x="0" y="20" text-anchor="middle" font-family="Georgia, serif" font-size="24" font-weight="bold" fill="#0F172A">{{QUANT}}</text>
  </g>

  <text x="120" y="395" font-family="monospace" font-size="10" fill="#475569" letter-spacing="2">PERFORMANCE BY DOMAIN</text>
  <line x1="120" y1="402" x2="680" y2="402" stroke="#CBD5E1" stroke-width="1"/>
{{DOMAIN_ROWS}}

  <text x="400" y="556" text-anchor="middle" font-family="monospace" font-size="11" fill="#1E3A8A">Further practice: {{CODE}}</text>
</svg>"##;

/// Render the report. Pure string assembly; all user-controlled fields
/// are XML-escaped.
pub fn render_report(input: &ReportInput) -> String {
    let low = (input.total - SCORE_DELTA).max(TOTAL_FLOOR);
    let high = (input.total + SCORE_DELTA).min(TOTAL_CEILING);

    let mut rows = String::new();
    for (i, tally) in input.domains.iter().take(6).enumerate() {
        let y = 424 + (i as i32) * 22;
        let band = PerformanceBand::for_tally(tally.correct, tally.total);
        rows.push_str(&format!(
            r##"  <text x="120" y="{y}" font-family="Georgia, serif" font-size="13" fill="#0F172A">{name}</text>
  <text x="520" y="{y}" text-anchor="end" font-family="Georgia, serif" font-size="13" fill="#475569">{correct}/{total}</text>
  <text x="680" y="{y}" text-anchor="end" font-family="Georgia, serif" font-size="13" font-weight="bold" fill="{color}">{label}</text>
"##,
            y = y,
            name = escape_xml(&tally.domain),
            correct = tally.correct,
            total = tally.total,
            color = band.color(),
            label = band.label(),
        ));
    }

    REPORT_TEMPLATE
        .replace("{{STUDENT}}", &escape_xml(&input.student_name))
        .replace("{{TEST}}", &escape_xml(&input.test_title))
        .replace("{{DATE}}", &escape_xml(&input.completed_on))
        .replace("{{TOTAL}}", &input.total.to_string())
        .replace("{{RANGE_LOW}}", &low.to_string())
        .replace("{{RANGE_HIGH}}", &high.to_string())
        .replace("{{VERBAL}}", &input.verbal.to_string())
        .replace("{{QUANT}}", &input.quant.to_string())
        .replace("{{DOMAIN_ROWS}}", &rows)
        .replace("{{CODE}}", &escape_xml(&input.resources_code))
}

/// Download filename derived from the score and the sanitized name.
pub fn report_filename(student_name: &str, total: i32) -> String {
    static SANITIZER: OnceLock<Regex> = OnceLock::new();
    let sanitizer = SANITIZER.get_or_init(|| Regex::new(r"[^A-Za-z0-9]+").expect("valid regex"));

    let name = sanitizer
        .replace_all(student_name.trim(), "_")
        .trim_matches('_')
        .to_string();
    let name = if name.is_empty() {
        "student".to_string()
    } else {
        name
    };
    format!("{}_{}_score_report.svg", total, name)
}

fn escape_xml(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input() -> ReportInput {
        ReportInput {
            student_name: "Ana María".to_string(),
            test_title: "Practice Test 4".to_string(),
            completed_on: "2026-03-14".to_string(),
            total: 1310,
            verbal: 660,
            quant: 650,
            domains: vec![
                DomainTally {
                    domain: "Algebra".to_string(),
                    correct: 9,
                    total: 10,
                },
                DomainTally {
                    domain: "Craft & Structure".to_string(),
                    correct: 3,
                    total: 8,
                },
            ],
            resources_code: "satprep.example/r/42".to_string(),
        }
    }

    #[test]
    fn bands_discretize_at_the_edges() {
        assert_eq!(
            PerformanceBand::for_tally(4, 10),
            PerformanceBand::Developing
        );
        assert_eq!(
            PerformanceBand::for_tally(5, 10),
            PerformanceBand::Proficient
        );
        assert_eq!(PerformanceBand::for_tally(8, 10), PerformanceBand::Advanced);
        assert_eq!(
            PerformanceBand::for_tally(0, 0),
            PerformanceBand::Developing
        );
    }

    #[test]
    fn report_carries_scores_and_range() {
        let svg = render_report(&input());
        assert!(svg.contains("1310"));
        assert!(svg.contains("1280"));
        assert!(svg.contains("1340"));
        assert!(svg.contains("Ana María"));
        assert!(svg.contains("Craft &amp; Structure"));
        assert!(!svg.contains("{{"));
    }

    #[test]
    fn range_is_clamped_to_the_scale() {
        let mut top = input();
        top.total = 1590;
        let svg = render_report(&top);
        assert!(svg.contains("1560&#8211;1600"));
    }

    #[test]
    fn filename_is_sanitized() {
        assert_eq!(
            report_filename("Ana María / O'Neil", 1310),
            "1310_Ana_Mar_a_O_Neil_score_report.svg"
        );
        assert_eq!(report_filename("  ", 980), "980_student_score_report.svg");
    }
}
