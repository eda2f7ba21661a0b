//! Serialization of traced rules
//!
//! The text format is one dict-style record per line:
//!
//! ```text
//! {'OUT': ['a.o'], 'IN': ['a.c'], 'LINE': 3, 'PID': '20|21'}
//! ```
//!
//! The JSON format wraps the same records with a run summary.

use crate::diagnostics::Diagnostics;
use crate::rules::{Rule, RuleRegistry};
use crate::Pid;
use serde::{Deserialize, Serialize};
use std::io::{self, Write};

/// Serialized view of one rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleRecord {
    /// Sorted output paths
    #[serde(rename = "OUT")]
    pub outputs: Vec<String>,
    /// Sorted filtered dependency paths
    #[serde(rename = "IN")]
    pub inputs: Vec<String>,
    /// Trace line where the rule was created
    #[serde(rename = "LINE")]
    pub line: usize,
    /// Member pids joined with `|`
    #[serde(rename = "PID")]
    pub pids: String,
}

impl From<&Rule> for RuleRecord {
    fn from(rule: &Rule) -> Self {
        Self {
            outputs: rule.filtered_outputs().cloned().collect(),
            inputs: rule.filtered_dependencies().cloned().collect(),
            line: rule.creation_line,
            pids: rule.pid_list(),
        }
    }
}

/// Records for every rule in creation order
pub fn records(rules: &RuleRegistry) -> Vec<RuleRecord> {
    rules.iter().map(RuleRecord::from).collect()
}

/// Quote a string the way the dict-style record format does
fn quote(s: &str) -> String {
    let delim = if s.contains('\'') && !s.contains('"') {
        '"'
    } else {
        '\''
    };
    let mut out = String::with_capacity(s.len() + 2);
    out.push(delim);
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c == delim => {
                out.push('\\');
                out.push(c);
            }
            c if (c as u32) < 0x20 || c as u32 == 0x7f => {
                out.push_str(&format!("\\x{:02x}", c as u32));
            }
            c => out.push(c),
        }
    }
    out.push(delim);
    out
}

fn quote_list(items: &[String]) -> String {
    let quoted: Vec<String> = items.iter().map(|s| quote(s)).collect();
    format!("[{}]", quoted.join(", "))
}

impl RuleRecord {
    /// One-line dict-style rendering
    pub fn to_text(&self) -> String {
        format!(
            "{{'OUT': {}, 'IN': {}, 'LINE': {}, 'PID': {}}}",
            quote_list(&self.outputs),
            quote_list(&self.inputs),
            self.line,
            quote(&self.pids)
        )
    }
}

/// Write one text record per rule
pub fn write_text<W: Write>(out: &mut W, rules: &RuleRegistry) -> io::Result<()> {
    for record in records(rules) {
        writeln!(out, "{}", record.to_text())?;
    }
    Ok(())
}

/// Summary block of the JSON report
#[derive(Debug, Clone, Serialize)]
pub struct JsonSummary {
    pub rules: usize,
    pub logical_lines: u64,
    pub syscalls: u64,
    pub failed_syscalls: u64,
    pub unmatched_lines: usize,
    pub anomalies: usize,
    pub orphan_events: u64,
    pub out_of_tree: u64,
}

/// Root JSON output structure
#[derive(Debug, Clone, Serialize)]
pub struct JsonReport {
    /// Crate version that produced the report
    pub version: String,
    /// Format name
    pub format: String,
    pub root_pid: Pid,
    pub rules: Vec<RuleRecord>,
    pub summary: JsonSummary,
}

impl JsonReport {
    pub fn new(root_pid: Pid, rules: &RuleRegistry, diagnostics: &Diagnostics) -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            format: "depstrace-json-v1".to_string(),
            root_pid,
            rules: records(rules),
            summary: JsonSummary {
                rules: rules.len(),
                logical_lines: diagnostics.logical_lines,
                syscalls: diagnostics.total_syscalls(),
                failed_syscalls: diagnostics.total_failed(),
                unmatched_lines: diagnostics.unmatched_lines().count(),
                anomalies: diagnostics.anomalies.len(),
                orphan_events: diagnostics.total_orphan_events(),
                out_of_tree: diagnostics.out_of_tree,
            },
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> RuleRegistry {
        let mut registry = RuleRegistry::new();
        let id = registry.create(20, 3);
        let rule = registry.get_mut(id).unwrap();
        rule.add_pid(21);
        rule.add_dependency("b.h".to_string());
        rule.add_dependency("a.c".to_string());
        rule.add_dependency("a.o".to_string());
        rule.add_output("a.o".to_string());
        registry
    }

    #[test]
    fn test_text_record_format() {
        let mut buf = Vec::new();
        write_text(&mut buf, &registry()).unwrap();
        assert_eq!(
            String::from_utf8(buf).unwrap(),
            "{'OUT': ['a.o'], 'IN': ['a.c', 'b.h'], 'LINE': 3, 'PID': '20|21'}\n"
        );
    }

    #[test]
    fn test_empty_rule_text() {
        let mut registry = RuleRegistry::new();
        registry.create(7, 1);
        let record = RuleRecord::from(registry.iter().next().unwrap());
        assert_eq!(record.to_text(), "{'OUT': [], 'IN': [], 'LINE': 1, 'PID': '7'}");
    }

    #[test]
    fn test_quote_escapes() {
        assert_eq!(quote("plain"), "'plain'");
        assert_eq!(quote("it's"), "\"it's\"");
        assert_eq!(quote("a'b\"c"), "'a\\'b\"c'");
        assert_eq!(quote("tab\there"), "'tab\\there'");
        assert_eq!(quote("back\\slash"), "'back\\\\slash'");
    }

    #[test]
    fn test_json_report_fields() {
        let diagnostics = Diagnostics::new();
        let report = JsonReport::new(10, &registry(), &diagnostics);
        let json = report.to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["format"], "depstrace-json-v1");
        assert_eq!(value["root_pid"], 10);
        assert_eq!(value["rules"][0]["OUT"][0], "a.o");
        assert_eq!(value["rules"][0]["IN"][1], "b.h");
        assert_eq!(value["rules"][0]["LINE"], 3);
        assert_eq!(value["rules"][0]["PID"], "20|21");
        assert_eq!(value["summary"]["rules"], 1);
    }

    #[test]
    fn test_record_deserializes() {
        let record: RuleRecord =
            serde_json::from_str(r#"{"OUT":["x"],"IN":[],"LINE":2,"PID":"5"}"#).unwrap();
        assert_eq!(record.outputs, vec!["x"]);
        assert_eq!(record.line, 2);
    }
}
