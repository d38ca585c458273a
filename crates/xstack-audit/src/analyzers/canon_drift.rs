use crate::analyzer::{Analyzer, AnalyzerContext};
use crate::finding::{Classification, Finding, RecommendedAction, Severity};
use once_cell::sync::Lazy;
use pulldown_cmark::{Event, HeadingLevel, Parser, Tag, TagEnd};
use regex::Regex;
use std::collections::BTreeMap;

const ID: &str = "canon_drift";
const DOCS_ROOT: &str = "docs";

static NORMATIVE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?:MUST(?: NOT)?|SHALL(?: NOT)?|REQUIRED|NEVER)\b").expect("static regex is valid")
});

static ANCHOR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\bINV-[A-Z0-9][A-Z0-9_-]*|\brefuse\.[a-z0-9_.]+|\btests?/[\w./-]+|\btest_[a-z0-9_]+")
        .expect("static regex is valid")
});

/// Normative docs without an enforcement anchor, and duplicate doc titles
#[derive(Debug, Clone, Copy, Default)]
pub struct CanonDriftAnalyzer;

/// What one markdown document says
#[derive(Debug, Default)]
struct DocScan {
    title: Option<String>,
    normative_lines: Vec<u32>,
}

fn line_of(text: &str, offset: usize) -> u32 {
    let upto = text.get(..offset).unwrap_or(text);
    u32::try_from(upto.matches('\n').count() + 1).unwrap_or(u32::MAX)
}

fn scan_markdown(text: &str) -> DocScan {
    let mut scan = DocScan::default();
    let mut in_title = false;
    let mut title = String::new();
    let mut in_code = false;

    for (event, range) in Parser::new(text).into_offset_iter() {
        match event {
            Event::Start(Tag::Heading { level: HeadingLevel::H1, .. }) if scan.title.is_none() => {
                in_title = true;
            }
            Event::End(TagEnd::Heading(HeadingLevel::H1)) if in_title => {
                in_title = false;
                scan.title = Some(std::mem::take(&mut title));
            }
            Event::Start(Tag::CodeBlock(_)) => in_code = true,
            Event::End(TagEnd::CodeBlock) => in_code = false,
            Event::Text(fragment) => {
                if in_title {
                    title.push_str(&fragment);
                }
                if !in_code && NORMATIVE.is_match(&fragment) {
                    scan.normative_lines.push(line_of(text, range.start));
                }
            }
            Event::Code(fragment) if in_title => title.push_str(&fragment),
            _ => {}
        }
    }
    scan.normative_lines.dedup();
    scan
}

fn normalize_title(title: &str) -> String {
    title
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

impl Analyzer for CanonDriftAnalyzer {
    fn id(&self) -> &'static str {
        ID
    }

    fn watch_prefixes(&self) -> Vec<String> {
        vec![DOCS_ROOT.to_owned()]
    }

    fn run(&self, ctx: &AnalyzerContext) -> Vec<Finding> {
        let mut findings = Vec::new();
        let mut titles: BTreeMap<String, Vec<&str>> = BTreeMap::new();

        for path in ctx.files_under(DOCS_ROOT).filter(|p| p.ends_with(".md")) {
            let Some(text) = ctx.read_text(path) else {
                continue;
            };
            let scan = scan_markdown(&text);

            if let (Some(&first), Some(&last)) =
                (scan.normative_lines.first(), scan.normative_lines.last())
            {
                if !ANCHOR.is_match(&text) {
                    findings.push(
                        Finding::new(ID, "unanchored_normative", Severity::Warn, 0.65, path)
                            .at_lines(first, last)
                            .suggest(Classification::TodoBlocked, RecommendedAction::AddRule)
                            .with_evidence(format!(
                                "{} normative statement(s) without invariant id or test reference",
                                scan.normative_lines.len()
                            )),
                    );
                }
            }

            if let Some(title) = scan.title.as_deref().map(normalize_title) {
                if !title.is_empty() {
                    titles.entry(title).or_default().push(path);
                }
            }
        }

        for (title, paths) in titles {
            if paths.len() < 2 {
                continue;
            }
            for (idx, path) in paths.iter().enumerate().skip(1) {
                let mut finding = Finding::new(ID, "duplicate_title", Severity::Warn, 0.60, *path)
                    .suggest(Classification::Superseded, RecommendedAction::DocFix)
                    .with_evidence(format!("title \"{title}\" also used by {}", paths[0]));
                for (other_idx, other) in paths.iter().enumerate() {
                    if other_idx != idx {
                        finding = finding.with_related_path(*other);
                    }
                }
                findings.push(finding);
            }
        }
        findings
    }
}
