//! Static source scanner (spec §4.1). Pattern-matches plugin source
//! text against a fixed list of eval-equivalent, process-control, and
//! reflection constructs. A high-severity finding blocks `load`; a
//! medium or info finding is recorded in the audit log but does not.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanSeverity {
    Info,
    Medium,
    High,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanFinding {
    pub severity: ScanSeverity,
    pub pattern: String,
    pub description: String,
}

struct Rule {
    pattern: &'static str,
    severity: ScanSeverity,
    description: &'static str,
}

const RULES: &[Rule] = &[
    Rule {
        pattern: "eval(",
        severity: ScanSeverity::High,
        description: "dynamic code evaluation",
    },
    Rule {
        pattern: "exec(",
        severity: ScanSeverity::High,
        description: "dynamic code execution",
    },
    Rule {
        pattern: "Command::new",
        severity: ScanSeverity::High,
        description: "spawns an external process",
    },
    Rule {
        pattern: "std::process::",
        severity: ScanSeverity::High,
        description: "references the process-control module",
    },
    Rule {
        pattern: "/etc/passwd",
        severity: ScanSeverity::High,
        description: "reads a sensitive system file",
    },
    Rule {
        pattern: "rm -rf",
        severity: ScanSeverity::High,
        description: "recursive force delete",
    },
    Rule {
        pattern: "ptrace",
        severity: ScanSeverity::High,
        description: "process tracing/debugging primitive",
    },
    Rule {
        pattern: "transmute",
        severity: ScanSeverity::Medium,
        description: "unchecked type reinterpretation",
    },
    Rule {
        pattern: "dlopen",
        severity: ScanSeverity::Medium,
        description: "dynamic library loading",
    },
    Rule {
        pattern: "unsafe ",
        severity: ScanSeverity::Medium,
        description: "unsafe block",
    },
    Rule {
        pattern: "std::env::set_var",
        severity: ScanSeverity::Medium,
        description: "mutates process environment",
    },
    Rule {
        pattern: "TODO",
        severity: ScanSeverity::Info,
        description: "unfinished work marker",
    },
];

/// Scan a plugin's source text. Findings are returned in rule order,
/// not source order; callers needing line numbers should grep the
/// source for the reported pattern.
pub fn scan_source(source: &str) -> Vec<ScanFinding> {
    let mut findings = Vec::new();
    for rule in RULES {
        if source.contains(rule.pattern) {
            findings.push(ScanFinding {
                severity: rule.severity,
                pattern: rule.pattern.to_string(),
                description: rule.description.to_string(),
            });
        }
    }
    findings
}

pub fn highest_severity(findings: &[ScanFinding]) -> Option<ScanSeverity> {
    findings.iter().map(|f| f.severity).max()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_eval_as_high_severity() {
        let findings = scan_source("fn main() { eval(\"2+2\") }");
        assert_eq!(highest_severity(&findings), Some(ScanSeverity::High));
    }

    #[test]
    fn clean_source_has_no_findings() {
        let findings = scan_source("fn main() { println!(\"hi\"); }");
        assert!(findings.is_empty());
    }

    #[test]
    fn unsafe_is_medium_not_high() {
        let findings = scan_source("unsafe { *ptr }");
        assert_eq!(highest_severity(&findings), Some(ScanSeverity::Medium));
    }

    #[test]
    fn severity_ordering_picks_the_worst() {
        let findings = scan_source("unsafe { eval(\"x\") }");
        assert_eq!(highest_severity(&findings), Some(ScanSeverity::High));
    }
}
